//! Data models for job lifecycle and bridge status
//!
//! This module provides:
//! - The job lifecycle state (`JobState`) and its legal transitions
//! - Fault reasons recorded when a job enters `Error`
//! - The read-only status snapshot handed to display/HTTP collaborators

use serde::{Deserialize, Serialize};
use std::fmt;

/// Autonomous job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JobState {
    /// No job loaded
    #[default]
    Idle,
    /// Initial homing cycle in progress
    PreHoming,
    /// Streaming program lines
    Running,
    /// Final homing cycle in progress
    PostHoming,
    /// Streaming suspended by feed hold
    Paused,
    /// Job finished
    Complete,
    /// Job aborted by a fault
    Error,
}

impl JobState {
    /// Check if a job is in progress (not idle and not terminal)
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobState::PreHoming | JobState::Running | JobState::PostHoming | JobState::Paused
        )
    }

    /// Check if a transition from this state to `target` is valid.
    ///
    /// - Idle only starts a job (PreHoming)
    /// - Any state may go to Error on a fault, except Idle and terminal states
    /// - Any state may go back to Idle (stop)
    /// - Complete/Error are left only through Idle
    pub fn can_transition_to(&self, target: JobState) -> bool {
        use JobState::*;
        if *self == target {
            return true;
        }
        match (self, target) {
            (_, Idle) => true,
            (Idle, PreHoming) => true,
            // Resource-not-found faults a start before any phase begins
            (Idle, Error) => true,
            (Idle, _) => false,
            (Complete | Error, _) => false,
            (_, Error) => true,
            (PreHoming, Running) => true,
            (Running, Paused | PostHoming) => true,
            (Paused, Running) => true,
            (PostHoming, Complete) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Idle => write!(f, "Idle"),
            JobState::PreHoming => write!(f, "PreHoming"),
            JobState::Running => write!(f, "Running"),
            JobState::PostHoming => write!(f, "PostHoming"),
            JobState::Paused => write!(f, "Paused"),
            JobState::Complete => write!(f, "Complete"),
            JobState::Error => write!(f, "Error"),
        }
    }
}

/// Reason a job entered the `Error` state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobFault {
    /// Requested program resource does not exist
    ResourceNotFound,
    /// Homing succeeded but the program could not be opened for streaming
    ResourceOpenFailed,
    /// Reading the next program line failed mid-stream
    ResourceReadFailed,
    /// No acknowledgment within the command timeout
    CommandTimeout,
    /// No acknowledgment within the homing timeout
    HomingTimeout,
    /// Controller reported an alarm while the job was active
    DeviceAlarm(String),
}

impl fmt::Display for JobFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobFault::ResourceNotFound => write!(f, "program not found"),
            JobFault::ResourceOpenFailed => write!(f, "program could not be opened"),
            JobFault::ResourceReadFailed => write!(f, "program read failed"),
            JobFault::CommandTimeout => write!(f, "command acknowledgment timed out"),
            JobFault::HomingTimeout => write!(f, "homing acknowledgment timed out"),
            JobFault::DeviceAlarm(code) => write!(f, "controller alarm {}", code),
        }
    }
}

/// Immutable snapshot of job and link status
///
/// Produced on demand for display and HTTP collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Current job state
    pub state: JobState,
    /// Program lines sent in the current job
    pub consumed_count: usize,
    /// Eligible program lines in the current job (0 until streaming starts)
    pub total_count: usize,
    /// Program identifier of the current or last job
    pub file_identifier: Option<String>,
    /// Whether the controller has sent anything recently
    pub link_active: bool,
    /// Whether an interactive peer is connected
    pub peer_connected: bool,
    /// Fault that put the job into `Error`, if any
    pub last_fault: Option<JobFault>,
}

impl StatusSnapshot {
    /// Job progress as a percentage of eligible lines sent
    pub fn progress_percent(&self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            (self.consumed_count as f64 / self.total_count as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_transitions() {
        use JobState::*;
        assert!(Idle.can_transition_to(PreHoming));
        assert!(Idle.can_transition_to(Error));
        assert!(!Idle.can_transition_to(Running));
        assert!(PreHoming.can_transition_to(Running));
        assert!(Running.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(Paused.can_transition_to(Error));
        assert!(PostHoming.can_transition_to(Complete));
        assert!(!Complete.can_transition_to(PreHoming));
        assert!(!Error.can_transition_to(Running));
        assert!(Error.can_transition_to(Idle));
        assert!(Complete.can_transition_to(Idle));
    }

    #[test]
    fn test_job_state_predicates() {
        assert!(JobState::Paused.is_active());
        assert!(!JobState::Idle.is_active());
        assert!(!JobState::Complete.is_active());
        assert!(!JobState::Error.is_active());
    }

    #[test]
    fn test_progress_percent() {
        let snapshot = StatusSnapshot {
            consumed_count: 1,
            total_count: 4,
            ..Default::default()
        };
        assert_eq!(snapshot.progress_percent(), 25.0);
        assert_eq!(StatusSnapshot::default().progress_percent(), 0.0);
    }
}
