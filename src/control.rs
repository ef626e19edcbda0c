/// The leading byte of every on-wire datagram, used for dispatch in the
/// scheduler loop's receive step.
///
/// Grounded on the leading-byte switch in `antt/data_structures.py`'s
/// `SocketConnection.distribute_stored`, expressed here as a closed tagged
/// enum instead of that function's chain of `if data[0:1] == b"\x01"` checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlByte {
    /// `0x00` — idle keepalive.
    Heartbeat,
    /// `0x01` — "are you alive?" probe.
    AlivePing,
    /// `0x02` — alive / buffer-drain acknowledgement.
    AliveAck,
    /// `0x03` — connection syn.
    Syn,
    /// `0x04` — connection ack.
    Ack,
    /// `0x05` — standard data frame.
    Data,
    /// `0x06` — reserved alternate data frame.
    DataAlt,
    /// `0x07` — request-missing parts.
    RequestMissing,
    /// `0x08` — sender done-signal.
    SenderDone,
    /// `0x09` — receiver fully-built acknowledgement.
    ReceiverAck,
}

impl ControlByte {
    pub const fn as_byte(self) -> u8 {
        match self {
            ControlByte::Heartbeat => 0x00,
            ControlByte::AlivePing => 0x01,
            ControlByte::AliveAck => 0x02,
            ControlByte::Syn => 0x03,
            ControlByte::Ack => 0x04,
            ControlByte::Data => 0x05,
            ControlByte::DataAlt => 0x06,
            ControlByte::RequestMissing => 0x07,
            ControlByte::SenderDone => 0x08,
            ControlByte::ReceiverAck => 0x09,
        }
    }

    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(ControlByte::Heartbeat),
            0x01 => Some(ControlByte::AlivePing),
            0x02 => Some(ControlByte::AliveAck),
            0x03 => Some(ControlByte::Syn),
            0x04 => Some(ControlByte::Ack),
            0x05 => Some(ControlByte::Data),
            0x06 => Some(ControlByte::DataAlt),
            0x07 => Some(ControlByte::RequestMissing),
            0x08 => Some(ControlByte::SenderDone),
            0x09 => Some(ControlByte::ReceiverAck),
            _ => None,
        }
    }

    pub const fn is_data(self) -> bool {
        matches!(self, ControlByte::Data | ControlByte::DataAlt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_known_byte() {
        for b in 0x00u8..=0x09 {
            let cb = ControlByte::from_byte(b).expect("known control byte");
            assert_eq!(cb.as_byte(), b);
        }
    }

    #[test]
    fn unknown_byte_is_none() {
        assert!(ControlByte::from_byte(0xff).is_none());
    }
}
