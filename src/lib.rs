//! # Hole Punch Transport
//!
//! A reliable, ordered-reassembly transport for peer-to-peer connections
//! established across NATs.
//!
//! This library provides a "Reliable UDP" style endpoint that fragments and
//! reassembles large messages, retransmits lost parts, and applies simple
//! flow control against a peer's receive buffer — plus the orchestration
//! layer that gets two such endpoints talking in the first place: NAT type
//! detection and a hole-punching strategy ladder.
//!
//! ## Architecture
//!
//! - **Endpoint**: a cooperative single-threaded scheduler loop per
//!   connection, driving frame reassembly, retransmission, and flow control.
//! - **Establishment**: an ordered strategy walk (local, cone punch,
//!   symmetric punch, ...) that turns two [`establish::ConnInfo`]s into a
//!   verified [`endpoint::Endpoint`].
//! - **Detection**: a small NAT-classification service and client used to
//!   build the `ConnInfo`s establishment consumes.
//! - **Envelope**: an optional four-slot JSON message shape applications can
//!   use atop the transport; the transport itself is payload-agnostic.

pub mod bitset;
pub mod command;
pub mod config;
pub mod control;
pub mod detection;
pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod establish;
pub mod flat_map;
pub mod frame;
pub mod id_alloc;
pub mod logging;
pub mod ports;
pub mod reassembly;
pub mod stream;

pub use bitset::BitSet;
pub use command::Command;
pub use config::EndpointConfig;
pub use control::ControlByte;
pub use detection::{DetectionClient, DetectionOutcome, DetectionServer, NatType};
pub use endpoint::{Endpoint, MessageCallback, MessageProgress};
pub use envelope::{Envelope, Slot};
pub use error::{Result, TransportError};
pub use establish::{start_connection, ConnInfo, EstablishConfig, PunchType, Strategy};
pub use frame::{Frame, MessageId, PartIndex};
pub use stream::StreamEndpoint;
