//! The JSON application envelope (component design §6).
//!
//! Grounded on `antt/data_structures.py`'s `Packet` class: four named slots
//! (`TYPE`, `VALUE`, `DATA`, `EXTRA`), each either a string or raw bytes. The
//! Python source stores byte-valued slots as plain JSON strings and expects
//! the caller to know which fields happen to hold bytes; here that knowledge
//! is made explicit on the wire via the companion `"... bytes"` boolean flags
//! described in §6, and each slot round-trips through [`hex`] rather than
//! lossily decoding as UTF-8. The transport itself never inspects this
//! envelope — it is a collaborator, not part of the wire protocol in §3/§4.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransportError};

/// One envelope slot: either a UTF-8 string or an opaque byte string.
///
/// Grounded on the Python `Packet`'s `storage` dict, whose values are
/// whatever the caller passed in (often `bytes`, sometimes `str`); this enum
/// makes that ambiguity explicit instead of silently coercing one into the
/// other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Text(String),
    Bytes(Vec<u8>),
}

impl Slot {
    fn empty() -> Self {
        Slot::Text(String::new())
    }
}

impl From<&str> for Slot {
    fn from(s: &str) -> Self {
        Slot::Text(s.to_string())
    }
}

impl From<String> for Slot {
    fn from(s: String) -> Self {
        Slot::Text(s)
    }
}

impl From<Vec<u8>> for Slot {
    fn from(b: Vec<u8>) -> Self {
        Slot::Bytes(b)
    }
}

/// The four-slot application envelope: `TYPE, VALUE, DATA, EXTRA`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub r#type: Slot,
    pub value: Slot,
    pub data: Slot,
    pub extra: Slot,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            r#type: Slot::empty(),
            value: Slot::empty(),
            data: Slot::empty(),
            extra: Slot::empty(),
        }
    }
}

impl Envelope {
    pub fn new(r#type: impl Into<Slot>, value: impl Into<Slot>, data: impl Into<Slot>, extra: impl Into<Slot>) -> Self {
        Self {
            r#type: r#type.into(),
            value: value.into(),
            data: data.into(),
            extra: extra.into(),
        }
    }

    /// Serializes to the JSON wire form described in §6.
    pub fn generate(&self) -> Vec<u8> {
        serde_json::to_vec(&WireEnvelope::from(self)).expect("envelope fields are always serializable")
    }

    /// Parses the JSON wire form produced by [`Envelope::generate`].
    ///
    /// An empty input mirrors the Python source's `Packet().parse(b"")`,
    /// which falls back to an all-empty default rather than erroring.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Ok(Envelope::default());
        }
        let wire: WireEnvelope = serde_json::from_slice(data)
            .map_err(|e| TransportError::InvalidData(format!("malformed envelope json: {e}")))?;
        wire.try_into()
    }
}

/// On-the-wire shape: exactly the keys named in §6, `SCREAMING_SNAKE` for the
/// slots and `"<slot> bytes"` for the hex-encoding flags.
#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(rename = "TYPE")]
    r#type: String,
    #[serde(rename = "VALUE")]
    value: String,
    #[serde(rename = "DATA")]
    data: String,
    #[serde(rename = "EXTRA")]
    extra: String,
    #[serde(rename = "type bytes")]
    type_bytes: bool,
    #[serde(rename = "value bytes")]
    value_bytes: bool,
    #[serde(rename = "data bytes")]
    data_bytes: bool,
    #[serde(rename = "extra bytes")]
    extra_bytes: bool,
}

fn encode_slot(slot: &Slot) -> (String, bool) {
    match slot {
        Slot::Text(s) => (s.clone(), false),
        Slot::Bytes(b) => (hex::encode(b), true),
    }
}

fn decode_slot(value: String, is_bytes: bool) -> Result<Slot> {
    if is_bytes {
        let bytes = hex::decode(&value)
            .map_err(|e| TransportError::InvalidData(format!("malformed hex envelope slot: {e}")))?;
        Ok(Slot::Bytes(bytes))
    } else {
        Ok(Slot::Text(value))
    }
}

impl From<&Envelope> for WireEnvelope {
    fn from(e: &Envelope) -> Self {
        let (r#type, type_bytes) = encode_slot(&e.r#type);
        let (value, value_bytes) = encode_slot(&e.value);
        let (data, data_bytes) = encode_slot(&e.data);
        let (extra, extra_bytes) = encode_slot(&e.extra);
        WireEnvelope {
            r#type,
            value,
            data,
            extra,
            type_bytes,
            value_bytes,
            data_bytes,
            extra_bytes,
        }
    }
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = TransportError;

    fn try_from(w: WireEnvelope) -> Result<Self> {
        Ok(Envelope {
            r#type: decode_slot(w.r#type, w.type_bytes)?,
            value: decode_slot(w.value, w.value_bytes)?,
            data: decode_slot(w.data, w.data_bytes)?,
            extra: decode_slot(w.extra, w.extra_bytes)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_text_slots() {
        let env = Envelope::new("greet", "hello", "", "");
        let parsed = Envelope::parse(&env.generate()).unwrap();
        assert_eq!(env, parsed);
    }

    #[test]
    fn round_trips_byte_slots() {
        let env = Envelope::new("data", vec![0u8, 1, 2, 255], "", "");
        let wire = env.generate();
        let json: serde_json::Value = serde_json::from_slice(&wire).unwrap();
        assert_eq!(json["value bytes"], true);
        let parsed = Envelope::parse(&wire).unwrap();
        assert_eq!(env, parsed);
    }

    #[test]
    fn empty_input_parses_as_default() {
        let parsed = Envelope::parse(&[]).unwrap();
        assert_eq!(parsed, Envelope::default());
    }

    #[test]
    fn malformed_json_is_invalid_data() {
        let err = Envelope::parse(b"not json").unwrap_err();
        assert!(matches!(err, TransportError::InvalidData(_)));
    }
}
