//! Bridge between one interactive peer, the job streamer, and the
//! serial-attached motion controller.

pub mod console;
pub mod controller;
pub mod interactive;
pub mod status;
pub mod transport;

pub use console::{ConsoleEntry, ConsoleLevel, ConsoleLog, ConsolePolicy};
pub use controller::{ControlHandle, ControlRequest, Controller, ControllerOptions};
pub use interactive::{InteractiveRouter, RouteOutcome};
pub use status::{snapshot_json, SharedStatus, StatusPublisher};
pub use transport::{ChannelTransport, PeerEvent, PeerTransport, ScriptedTransport};
