//! GRBL line protocol
//!
//! Realtime signals and protocol constants, response classification, and
//! human-readable descriptions for error and alarm codes.

pub mod commands;
pub mod error_decoder;
pub mod response_parser;

pub use commands::{
    is_extended_realtime_byte, is_realtime_byte, RealtimeCommand, HOMING_COMMAND, UNLOCK_COMMAND,
};
pub use error_decoder::{decode_alarm, decode_error, describe_alarm, describe_error};
pub use response_parser::{ControllerResponse, GrblResponseParser};
