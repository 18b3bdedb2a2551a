//! # GCodeLink Communication
//!
//! Serial link plumbing and the GRBL line protocol for GCodeLink.
//! Frames the controller byte stream into lines, classifies responses,
//! and enforces the one-unacknowledged-command discipline.

pub mod communication;
pub mod firmware;

pub use communication::{
    flow_control::{CommandSource, FlowController, PendingCommand},
    framer::{FrameBatch, LinkFramer},
    mock::{MockLinkHandle, MockSerialLink},
    serial::{list_ports, RealSerialPort, SerialPortInfo},
    ConnectionParams, SerialLink, SerialParity,
};

pub use firmware::grbl::{
    commands::{RealtimeCommand, HOMING_COMMAND, UNLOCK_COMMAND},
    response_parser::{ControllerResponse, GrblResponseParser},
};
