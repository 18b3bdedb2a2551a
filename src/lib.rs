//! # GCodeLink
//!
//! A headless bridge for GRBL-class motion controllers:
//! - Transparent relay between one TCP peer and the serial controller
//! - Autonomous job streaming with homing before and after the program
//! - One unacknowledged command on the wire at any time
//! - Status snapshots and events for external collaborators
//!
//! ## Architecture
//!
//! 1. **gcodelink-core** - Job states, errors, status snapshot, event bus
//! 2. **gcodelink-communication** - Serial links, framing, GRBL protocol, flow control
//! 3. **gcodelink-job** - Program sources, eligibility filter, job state machine
//! 4. **gcodelink-settings** - Configuration files
//! 5. **gcodelink** - Bridge controller, peer transport, and the binary

pub mod bridge;

pub use bridge::{
    ChannelTransport, ControlHandle, ControlRequest, Controller, ControllerOptions, PeerEvent,
    PeerTransport, ScriptedTransport,
};

pub use gcodelink_core::{
    BridgeEvent, Error, EventBus, InteractiveEvent, JobEvent, JobFault, JobState, LinkEvent,
    Result, StatusSnapshot,
};

pub use gcodelink_communication::{
    list_ports, ConnectionParams, MockLinkHandle, MockSerialLink, RealSerialPort, SerialLink,
    SerialPortInfo,
};

pub use gcodelink_job::{FileProgramSource, MemoryProgramSource, ProgramSource};

pub use gcodelink_settings::{Config, EchoPolicy};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging
///
/// Honors `RUST_LOG`, defaulting to `info`. With `json` set, every event is
/// written as one JSON object per line for log shippers.
pub fn init_logging(json: bool) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_thread_names(true)
            .with_line_number(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}
