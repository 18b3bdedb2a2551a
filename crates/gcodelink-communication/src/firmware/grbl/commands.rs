//! GRBL realtime signals and fixed commands

use std::fmt;

/// Run the homing cycle
pub const HOMING_COMMAND: &str = "$H";

/// Clear an alarm lock without homing
pub const UNLOCK_COMMAND: &str = "$X";

/// Single-byte commands the controller acts on immediately, outside the
/// line protocol. They are never acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RealtimeCommand {
    /// `?` status report request
    StatusQuery,
    /// `!` feed hold
    FeedHold,
    /// `~` cycle start / resume
    CycleResume,
    /// `0x18` (Ctrl-X) soft reset
    SoftReset,
}

impl RealtimeCommand {
    /// Wire byte for this command
    pub fn as_byte(self) -> u8 {
        match self {
            Self::StatusQuery => b'?',
            Self::FeedHold => b'!',
            Self::CycleResume => b'~',
            Self::SoftReset => 0x18,
        }
    }

    /// Map a wire byte back to a command
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'?' => Some(Self::StatusQuery),
            b'!' => Some(Self::FeedHold),
            b'~' => Some(Self::CycleResume),
            0x18 => Some(Self::SoftReset),
            _ => None,
        }
    }
}

impl fmt::Display for RealtimeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StatusQuery => write!(f, "status query"),
            Self::FeedHold => write!(f, "feed hold"),
            Self::CycleResume => write!(f, "cycle resume"),
            Self::SoftReset => write!(f, "soft reset"),
        }
    }
}

/// Whether a byte is a GRBL 1.1 extended realtime command: safety door,
/// jog cancel, feed/rapid/spindle overrides, and coolant toggles
///
/// No UTF-8 lead byte (`0xC2..=0xF4`) is in this set.
pub fn is_extended_realtime_byte(byte: u8) -> bool {
    matches!(byte, 0x84 | 0x85 | 0x90..=0x97 | 0x99..=0x9E | 0xA0 | 0xA1)
}

/// Whether a byte is a realtime command
///
/// Extended commands are passed through untouched.
pub fn is_realtime_byte(byte: u8) -> bool {
    RealtimeCommand::from_byte(byte).is_some() || is_extended_realtime_byte(byte)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realtime_bytes_round_trip() {
        for cmd in [
            RealtimeCommand::StatusQuery,
            RealtimeCommand::FeedHold,
            RealtimeCommand::CycleResume,
            RealtimeCommand::SoftReset,
        ] {
            assert_eq!(RealtimeCommand::from_byte(cmd.as_byte()), Some(cmd));
        }
    }

    #[test]
    fn test_is_realtime_byte() {
        assert!(is_realtime_byte(b'?'));
        assert!(is_realtime_byte(0x18));
        assert!(is_realtime_byte(0x85));
        assert!(is_realtime_byte(0x91));
        assert!(is_realtime_byte(0xA1));
        assert!(!is_realtime_byte(0x98));
        assert!(!is_realtime_byte(0xFF));
        for lead in 0xC2..=0xF4u8 {
            assert!(!is_realtime_byte(lead), "UTF-8 lead byte {:#x}", lead);
        }
        assert!(!is_realtime_byte(b'G'));
        assert!(!is_realtime_byte(b'\n'));
        assert!(!is_realtime_byte(b'$'));
    }
}
