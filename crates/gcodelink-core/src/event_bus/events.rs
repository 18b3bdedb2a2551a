//! Event type definitions for the event bus.
//!
//! This module defines all bridge events organized by category.
//! Events are cloneable and serializable for logging/replay.

use serde::{Deserialize, Serialize};

use crate::data::{JobFault, JobState, StatusSnapshot};

/// Root event enum for all bridge events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BridgeEvent {
    /// Autonomous job lifecycle
    Job(JobEvent),
    /// Controller link and protocol diagnostics
    Link(LinkEvent),
    /// Interactive peer session
    Interactive(InteractiveEvent),
    /// Status snapshot changed
    Status(StatusSnapshot),
}

impl BridgeEvent {
    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            BridgeEvent::Job(_) => EventCategory::Job,
            BridgeEvent::Link(_) => EventCategory::Link,
            BridgeEvent::Interactive(_) => EventCategory::Interactive,
            BridgeEvent::Status(_) => EventCategory::Status,
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            BridgeEvent::Job(e) => e.description(),
            BridgeEvent::Link(e) => e.description(),
            BridgeEvent::Interactive(e) => e.description(),
            BridgeEvent::Status(s) => format!(
                "Status: {} {}/{}",
                s.state, s.consumed_count, s.total_count
            ),
        }
    }
}

/// Event category for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Job lifecycle events.
    Job,
    /// Link and protocol events.
    Link,
    /// Interactive session events.
    Interactive,
    /// Status snapshot events.
    Status,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::Job => write!(f, "Job"),
            EventCategory::Link => write!(f, "Link"),
            EventCategory::Interactive => write!(f, "Interactive"),
            EventCategory::Status => write!(f, "Status"),
        }
    }
}

/// Job lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobEvent {
    /// Job state changed.
    StateChanged {
        /// Previous state.
        from: JobState,
        /// New state.
        to: JobState,
    },
    /// Streaming progress checkpoint.
    Progress {
        /// Lines sent so far.
        consumed: usize,
        /// Eligible lines in the program.
        total: usize,
    },
    /// Job entered `Error`.
    Faulted {
        /// Program identifier.
        identifier: String,
        /// Fault reason.
        fault: JobFault,
    },
    /// Job reached `Complete`.
    Completed {
        /// Program identifier.
        identifier: String,
        /// Program lines sent (homing commands excluded).
        lines_sent: usize,
    },
}

impl JobEvent {
    /// Get a short description of this event
    pub fn description(&self) -> String {
        match self {
            JobEvent::StateChanged { from, to } => format!("Job {} -> {}", from, to),
            JobEvent::Progress { consumed, total } => format!("Job progress {}/{}", consumed, total),
            JobEvent::Faulted { identifier, fault } => {
                format!("Job {} faulted: {}", identifier, fault)
            }
            JobEvent::Completed {
                identifier,
                lines_sent,
            } => format!("Job {} complete ({} lines)", identifier, lines_sent),
        }
    }
}

/// Controller link and protocol events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LinkEvent {
    /// Controller identified itself (startup banner).
    Banner {
        /// Banner text.
        text: String,
    },
    /// Controller rejected a command with `error:`.
    ResponseError {
        /// Error code as reported.
        code: String,
        /// Human-readable description.
        description: String,
    },
    /// Controller raised an alarm.
    Alarm {
        /// Alarm code as reported.
        code: String,
        /// Human-readable description.
        description: String,
    },
    /// Link activity flag flipped.
    ActivityChanged {
        /// Whether bytes were received within the activity window.
        active: bool,
    },
    /// The in-flight command slot was cleared without an acknowledgment.
    SlotReleased {
        /// The command that was pending.
        command: String,
        /// Why it was released.
        reason: String,
    },
    /// A hard reset was sent to the controller.
    HardReset,
}

impl LinkEvent {
    /// Get a short description of this event
    pub fn description(&self) -> String {
        match self {
            LinkEvent::Banner { text } => format!("Banner: {}", text),
            LinkEvent::ResponseError { code, description } => {
                format!("error:{} ({})", code, description)
            }
            LinkEvent::Alarm { code, description } => format!("ALARM:{} ({})", code, description),
            LinkEvent::ActivityChanged { active } => format!("Link active: {}", active),
            LinkEvent::SlotReleased { command, reason } => {
                format!("Released '{}': {}", command, reason)
            }
            LinkEvent::HardReset => "Hard reset".to_string(),
        }
    }
}

/// Interactive peer session events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InteractiveEvent {
    /// A peer connected.
    Connected {
        /// Peer address or label.
        peer: String,
    },
    /// The peer disconnected.
    Disconnected,
    /// A peer line was dropped because a command was already in flight.
    CommandRejected {
        /// The dropped line.
        line: String,
    },
    /// The partial-line buffer overflowed and was flushed as one command.
    OverflowFlushed {
        /// Number of bytes flushed.
        bytes: usize,
    },
}

impl InteractiveEvent {
    /// Get a short description of this event
    pub fn description(&self) -> String {
        match self {
            InteractiveEvent::Connected { peer } => format!("Peer connected: {}", peer),
            InteractiveEvent::Disconnected => "Peer disconnected".to_string(),
            InteractiveEvent::CommandRejected { line } => format!("Rejected: {}", line),
            InteractiveEvent::OverflowFlushed { bytes } => {
                format!("Overflow flush of {} bytes", bytes)
            }
        }
    }
}
