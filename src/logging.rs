//! `tracing-subscriber` initializer for binaries and tests.
//!
//! Library code only ever emits `tracing` events (see `endpoint.rs`,
//! `establish.rs`); this module is the opt-in sink, grounded on the same
//! `tracing-subscriber` + `EnvFilter` stack the pack carries elsewhere
//! (`redhat-performance-rusty-comms`, `gattaca-com-flux`).

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber reading its filter from
/// `RUST_LOG`, defaulting to `info` when unset. Safe to call more than
/// once (e.g. from multiple test binaries); later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
