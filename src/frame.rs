use crate::config::EndpointConfig;
use crate::control::ControlByte;
use crate::error::{TransportError, Result};

/// Unique identifier for a reliable message, scoped to one endpoint.
///
/// Mirrors the newtype pattern `tox-sequenced/src/protocol.rs` uses for its
/// own `MessageId`/`FragmentIndex` (`protocol_newtype!`), without the
/// `ToxProto` derive this crate has no use for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MessageId(pub u32);

impl From<u32> for MessageId {
    fn from(v: u32) -> Self {
        MessageId(v)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a part within a message, or its total part count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PartIndex(pub u32);

impl From<u32> for PartIndex {
    fn from(v: u32) -> Self {
        PartIndex(v)
    }
}

/// A single on-wire data frame: `type || message_id || part_index || total_parts || payload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub control: ControlByte,
    pub message_id: MessageId,
    pub part_index: PartIndex,
    pub total_parts: PartIndex,
    pub payload: Vec<u8>,
}

/// Encodes `value` as `width` big-endian bytes, appended to `out`.
///
/// Grounded on `antt/data_structures.py`'s `itob_format`, which raises when
/// `number >= 256**length`; here that becomes `TransportError::OverflowError`.
fn put_be(out: &mut Vec<u8>, value: u64, width: usize) -> Result<()> {
    if width < 8 && value >= (1u64 << (8 * width)) {
        return Err(TransportError::OverflowError);
    }
    for shift in (0..width).rev() {
        out.push(((value >> (shift * 8)) & 0xff) as u8);
    }
    Ok(())
}

fn get_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

impl Frame {
    /// Encodes this frame's header and payload per `config`'s field widths.
    pub fn encode(&self, config: &EndpointConfig) -> Result<Vec<u8>> {
        if self.control.is_data() && self.payload.is_empty() {
            return Err(TransportError::InvalidData(
                "data frame must carry a non-empty payload".into(),
            ));
        }
        let mut out = Vec::with_capacity(config.header_len() + self.payload.len());
        out.push(self.control.as_byte());
        put_be(&mut out, self.message_id.0 as u64, config.id_width)?;
        put_be(&mut out, self.part_index.0 as u64, config.part_width)?;
        put_be(&mut out, self.total_parts.0 as u64, config.part_width)?;
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Decodes a single frame from `bytes`, per `config`'s field widths.
    ///
    /// Requires `bytes.len() > header_len()` — a buffer exactly equal to the
    /// header length is rejected because a data frame's payload must be
    /// non-empty (matches the source's `len(data) > header_len` guard).
    pub fn decode(bytes: &[u8], config: &EndpointConfig) -> Result<Self> {
        let header_len = config.header_len();
        if bytes.len() <= header_len {
            return Err(TransportError::InvalidData(format!(
                "frame too short: {} bytes, need > {}",
                bytes.len(),
                header_len
            )));
        }
        let control = ControlByte::from_byte(bytes[0])
            .ok_or_else(|| TransportError::InvalidData(format!("unknown control byte {:#04x}", bytes[0])))?;

        let mut offset = 1;
        let id = get_be(&bytes[offset..offset + config.id_width]) as u32;
        offset += config.id_width;
        let part = get_be(&bytes[offset..offset + config.part_width]) as u32;
        offset += config.part_width;
        let total = get_be(&bytes[offset..offset + config.part_width]) as u32;
        offset += config.part_width;

        if part >= total {
            return Err(TransportError::InvalidData(format!(
                "part_index {part} >= total_parts {total}"
            )));
        }

        Ok(Frame {
            control,
            message_id: MessageId(id),
            part_index: PartIndex(part),
            total_parts: PartIndex(total),
            payload: bytes[offset..].to_vec(),
        })
    }
}

/// Splits `payload` into MTU-sized [`Frame`]s under a freshly allocated
/// `message_id`. An empty payload yields an empty list; callers must guard.
pub fn chunk(
    message_id: MessageId,
    payload: &[u8],
    control: ControlByte,
    config: &EndpointConfig,
) -> Result<Vec<Frame>> {
    if payload.is_empty() {
        return Ok(Vec::new());
    }
    let chunk_size = config.chunk_size();
    if chunk_size == 0 {
        return Err(TransportError::InvalidData("mtu too small for header".into()));
    }
    let total_parts = payload.len().div_ceil(chunk_size);
    if total_parts as u64 > config.max_parts() {
        return Err(TransportError::OverflowError);
    }

    let mut frames = Vec::with_capacity(total_parts);
    for (idx, piece) in payload.chunks(chunk_size).enumerate() {
        frames.push(Frame {
            control,
            message_id,
            part_index: PartIndex(idx as u32),
            total_parts: PartIndex(total_parts as u32),
            payload: piece.to_vec(),
        });
    }
    Ok(frames)
}

/// Concatenates `parts[0..total_parts]`, assuming every index is present.
pub fn reassemble(parts: &mut Vec<(PartIndex, Vec<u8>)>) -> Vec<u8> {
    parts.sort_by_key(|(idx, _)| idx.0);
    parts.iter().flat_map(|(_, data)| data.iter().copied()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> EndpointConfig {
        EndpointConfig::default()
    }

    #[test]
    fn encode_decode_round_trip() {
        let c = cfg();
        let frame = Frame {
            control: ControlByte::Data,
            message_id: MessageId(42),
            part_index: PartIndex(1),
            total_parts: PartIndex(3),
            payload: vec![1, 2, 3, 4],
        };
        let bytes = frame.encode(&c).unwrap();
        let decoded = Frame::decode(&bytes, &c).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let c = cfg();
        let err = Frame::decode(&[0x05, 0, 0, 0], &c).unwrap_err();
        assert!(matches!(err, TransportError::InvalidData(_)));
    }

    #[test]
    fn encode_rejects_empty_data_payload() {
        let c = cfg();
        let frame = Frame {
            control: ControlByte::Data,
            message_id: MessageId(1),
            part_index: PartIndex(0),
            total_parts: PartIndex(1),
            payload: vec![],
        };
        assert!(frame.encode(&c).is_err());
    }

    #[test]
    fn chunk_exact_multiple_has_no_trailing_empty_part() {
        let c = cfg();
        let chunk_size = c.chunk_size();
        let payload = vec![7u8; chunk_size * 3];
        let frames = chunk(MessageId(1), &payload, ControlByte::Data, &c).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].payload.len(), chunk_size);
    }

    #[test]
    fn chunk_empty_payload_yields_no_frames() {
        let c = cfg();
        let frames = chunk(MessageId(1), &[], ControlByte::Data, &c).unwrap();
        assert!(frames.is_empty());
    }

    #[test]
    fn chunk_then_reassemble_round_trips() {
        let c = cfg();
        let payload: Vec<u8> = (0..500u32).map(|i| (i % 251) as u8).collect();
        let frames = chunk(MessageId(9), &payload, ControlByte::Data, &c).unwrap();
        let mut parts: Vec<(PartIndex, Vec<u8>)> =
            frames.into_iter().map(|f| (f.part_index, f.payload)).collect();
        assert_eq!(reassemble(&mut parts), payload);
    }

    #[test]
    fn mtu_twenty_fragments_eighty_byte_payload() {
        let mut c = cfg();
        c.mtu = 20;
        let payload = b"aoeu1234".repeat(10);
        assert_eq!(payload.len(), 80);
        let frames = chunk(MessageId(1), &payload, ControlByte::Data, &c).unwrap();
        let chunk_size = c.chunk_size();
        assert_eq!(frames.len(), payload.len().div_ceil(chunk_size));
        let mut parts: Vec<(PartIndex, Vec<u8>)> =
            frames.into_iter().map(|f| (f.part_index, f.payload)).collect();
        assert_eq!(reassemble(&mut parts), payload);
    }

    #[test]
    fn message_id_overflow_is_rejected() {
        let mut c = cfg();
        c.id_width = 1;
        let frame = Frame {
            control: ControlByte::Data,
            message_id: MessageId(256),
            part_index: PartIndex(0),
            total_parts: PartIndex(1),
            payload: vec![1],
        };
        assert!(matches!(frame.encode(&c), Err(TransportError::OverflowError)));
    }
}
