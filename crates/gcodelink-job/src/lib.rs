//! # GCodeLink Job
//!
//! Streams a stored G-code program to the controller without any peer
//! attached: homing, line-by-line execution under flow control,
//! pause/resume, final homing, and timeout-based fault detection.

pub mod gcode_filter;
pub mod program_source;
pub mod state_machine;

pub use gcode_filter::{count_eligible, eligible_command};
pub use program_source::{
    FileProgramSource, MemoryProgramSource, ProgramHandle, ProgramSource,
};
pub use state_machine::{JobConfig, JobStateMachine, JobTimeouts};
