use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the reliable datagram transport and its establishment layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A connection-establishment strategy failed; the orchestrator may still
    /// try the next strategy in the order.
    #[error("connection issue: {0}")]
    ConnectionIssue(String),

    /// The peer never responded within the verification retry budget.
    #[error("no response from peer after {tries} tries ({elapsed:?})")]
    ConnectionNoResponse { tries: u32, elapsed: Duration },

    /// A received frame or control packet was malformed.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// An unexpected OS-level socket error.
    #[error("socket issue: {0}")]
    SocketIssue(#[from] std::io::Error),

    /// A blocking helper (e.g. `pop`, `block_until_verified`) exceeded its deadline.
    #[error("timed out after waiting {waited:?}")]
    Timeout { waited: Duration },

    /// A field (message id, part index, total parts) exceeded the width it is
    /// configured to be encoded in.
    #[error("value overflows its configured encoding width")]
    OverflowError,

    /// The outgoing-message table is at `EndpointConfig::max_concurrent_outgoing`.
    #[error("outgoing message queue is full")]
    QueueFull,
}

pub type Result<T> = std::result::Result<T, TransportError>;
