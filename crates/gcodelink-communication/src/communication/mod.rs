//! Byte-channel plumbing between the bridge and the motion controller
//!
//! - `serial`: real serial ports via the `serialport` crate
//! - `mock`: scripted in-memory link for tests and dry runs
//! - `framer`: byte stream to line framing
//! - `flow_control`: the single in-flight command slot

pub mod flow_control;
pub mod framer;
pub mod mock;
pub mod serial;

use serde::{Deserialize, Serialize};
use std::io;

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Parameters for opening a serial link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1-2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Hardware (RTS/CTS) flow control
    pub flow_control: bool,
    /// Read timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: false,
            timeout_ms: 10,
        }
    }
}

/// Low-level byte channel to the controller
///
/// Implementations must never block for longer than a few milliseconds:
/// the polling loop calls `read_available` on every tick.
pub trait SerialLink: Send {
    /// Write all bytes to the link
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read whatever is currently buffered, returning `Ok(0)` when nothing is
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Get the link name
    fn name(&self) -> String;

    /// Close the link
    fn close(&mut self) -> io::Result<()>;
}
