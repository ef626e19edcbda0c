use std::time::Duration;

use crate::error::{Result, TransportError};

/// Tunables for a single [`crate::endpoint::Endpoint`].
///
/// Centralizes every width/timeout/capacity mentioned in the component design
/// instead of scattering magic numbers through the scheduler loop, the way
/// `tox-sequenced/src/protocol.rs` collects its constants in one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Maximum size of a single on-wire datagram, header included.
    pub mtu: usize,
    /// Width, in bytes, of the big-endian `message_id` field.
    pub id_width: usize,
    /// Width, in bytes, of the big-endian `part_index`/`total_parts` fields.
    pub part_width: usize,
    /// Receiver-advertised watermark: total in-flight bytes the sender may
    /// have outstanding before it must pause and wait for a drain ack.
    pub peer_buffer_capacity: usize,
    /// Idle duration after which the endpoint sends an `0x00` heartbeat.
    pub max_idle_before_heartbeat: Duration,
    /// How long an incoming message waits for missing parts before a `0x07`
    /// request-missing sweep runs again.
    pub retransmit_latency: Duration,
    /// TTL for delivered-message tombstones, bounding the id-allocator skip-set.
    pub tombstone_ttl: Duration,
    /// Upper bound on concurrently in-flight outgoing messages.
    pub max_concurrent_outgoing: usize,
    /// Upper bound on concurrently in-progress incoming reassemblies.
    pub max_concurrent_incoming: usize,
    /// Capacity of the bounded outbound (pop) message queue.
    pub out_queue_capacity: usize,
    /// Sleep interval for an idle scheduler-loop tick.
    pub idle_sleep: Duration,
    /// Per-try timeout during the verification handshake.
    pub connect_try_timeout: Duration,
    /// Number of verification tries before giving up with `ConnectionNoResponse`.
    pub connect_try_limit: u32,
    /// OS-level socket receive buffer size, applied via `socket2` at bind time.
    pub socket_recv_buffer_bytes: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            mtu: 1024,
            id_width: 3,
            part_width: 3,
            peer_buffer_capacity: 40_000,
            max_idle_before_heartbeat: Duration::from_secs(20),
            retransmit_latency: Duration::from_secs(1),
            tombstone_ttl: Duration::from_secs(60),
            max_concurrent_outgoing: 256,
            max_concurrent_incoming: 256,
            out_queue_capacity: 256,
            idle_sleep: Duration::from_millis(10),
            connect_try_timeout: Duration::from_millis(100),
            connect_try_limit: 20,
            socket_recv_buffer_bytes: 1 << 20,
        }
    }
}

impl EndpointConfig {
    /// Fixed header length in bytes: `type(1) + id(id_width) + part(part_width) * 2`.
    pub fn header_len(&self) -> usize {
        1 + self.id_width + 2 * self.part_width
    }

    /// Maximum payload bytes per frame given the configured MTU.
    pub fn chunk_size(&self) -> usize {
        self.mtu.saturating_sub(self.header_len())
    }

    /// Largest `message_id` representable in `id_width` bytes.
    pub fn max_message_id(&self) -> u64 {
        (1u64 << (8 * self.id_width)) - 1
    }

    /// Largest `part_index`/`total_parts` representable in `part_width` bytes.
    pub fn max_parts(&self) -> u64 {
        (1u64 << (8 * self.part_width)) - 1
    }

    /// Rejects a configuration that cannot represent its own field widths
    /// within the configured MTU, at construction time rather than letting
    /// every individual `chunk`/`encode` call discover it independently.
    pub fn validate(&self) -> Result<()> {
        if self.id_width == 0 || self.id_width > 8 || self.part_width == 0 || self.part_width > 8 {
            return Err(TransportError::InvalidData(format!(
                "id_width/part_width must be in 1..=8, got {}/{}",
                self.id_width, self.part_width
            )));
        }
        if self.mtu <= self.header_len() {
            return Err(TransportError::InvalidData(format!(
                "mtu {} too small for header of {} bytes (id_width={}, part_width={})",
                self.mtu,
                self.header_len(),
                self.id_width,
                self.part_width
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_len_matches_field_widths() {
        let c = EndpointConfig::default();
        assert_eq!(c.header_len(), 1 + 3 + 3 + 3);
        assert_eq!(c.chunk_size(), c.mtu - c.header_len());
    }

    #[test]
    fn width_limits() {
        let mut c = EndpointConfig::default();
        c.id_width = 1;
        assert_eq!(c.max_message_id(), 255);
    }

    #[test]
    fn validate_rejects_mtu_too_small_for_header() {
        let mut c = EndpointConfig::default();
        c.mtu = c.header_len();
        assert!(c.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_width() {
        let mut c = EndpointConfig::default();
        c.id_width = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn validate_accepts_default() {
        assert!(EndpointConfig::default().validate().is_ok());
    }
}
