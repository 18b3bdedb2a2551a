//! Job lifecycle state machine
//!
//! Drives an autonomous job through homing, streaming, and final homing.
//! The machine never reads the link itself: the polling loop routes the
//! job's own completions and any alarm to it, then calls [`tick`] once per
//! loop iteration. Every entry point takes the loop's `now` so timeouts are
//! deterministic.
//!
//! State changes and progress are collected as [`JobEvent`]s and drained by
//! the caller with [`JobStateMachine::drain_events`].
//!
//! [`tick`]: JobStateMachine::tick

use crate::gcode_filter::{count_eligible, eligible_command};
use crate::program_source::{ProgramHandle, ProgramSource};
use gcodelink_communication::{CommandSource, FlowController, RealtimeCommand, HOMING_COMMAND};
use gcodelink_core::{JobError, JobEvent, JobFault, JobState, Result, StatusSnapshot};
use std::time::{Duration, Instant};

/// Acknowledgment timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTimeouts {
    /// Bound for each homing cycle, counted from the start of the phase
    pub homing: Duration,
    /// Bound for each streamed program line
    pub command: Duration,
}

impl Default for JobTimeouts {
    fn default() -> Self {
        Self {
            homing: Duration::from_secs(60),
            command: Duration::from_secs(30),
        }
    }
}

/// Job behaviour settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobConfig {
    /// Acknowledgment timeouts
    pub timeouts: JobTimeouts,
    /// Emit a progress event every this many lines (minimum 1)
    pub progress_interval: usize,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            timeouts: JobTimeouts::default(),
            progress_interval: 10,
        }
    }
}

/// Autonomous job state machine
pub struct JobStateMachine {
    source: Box<dyn ProgramSource>,
    config: JobConfig,
    state: JobState,
    identifier: Option<String>,
    handle: Option<Box<dyn ProgramHandle>>,
    /// Line pulled from the program but not yet accepted by the link
    staged: Option<String>,
    consumed: usize,
    total: usize,
    phase_started: Option<Instant>,
    homing_sent: bool,
    awaiting_ack: bool,
    command_sent_at: Option<Instant>,
    last_fault: Option<JobFault>,
    events: Vec<JobEvent>,
}

impl JobStateMachine {
    /// Create an idle machine reading programs from `source`
    pub fn new(source: Box<dyn ProgramSource>, config: JobConfig) -> Self {
        Self {
            source,
            config: JobConfig {
                progress_interval: config.progress_interval.max(1),
                ..config
            },
            state: JobState::Idle,
            identifier: None,
            handle: None,
            staged: None,
            consumed: 0,
            total: 0,
            phase_started: None,
            homing_sent: false,
            awaiting_ack: false,
            command_sent_at: None,
            last_fault: None,
            events: Vec::new(),
        }
    }

    /// Start a job
    ///
    /// Only legal from `Idle`. The program is checked for existence only;
    /// a missing program moves the job straight to `Error` without sending
    /// anything. Homing is issued now, or on the first tick where the
    /// command slot is free.
    pub fn start(&mut self, identifier: &str, link: &mut FlowController, now: Instant) -> Result<()> {
        if self.state != JobState::Idle {
            return Err(JobError::InvalidTransition {
                current: self.state.to_string(),
                requested: "start".to_string(),
            }
            .into());
        }

        self.identifier = Some(identifier.to_string());
        self.consumed = 0;
        self.total = 0;
        self.last_fault = None;
        self.staged = None;
        self.awaiting_ack = false;
        self.homing_sent = false;

        if !self.source.exists(identifier) {
            tracing::error!("Program {} not found", identifier);
            self.fault(JobFault::ResourceNotFound);
            return Err(JobError::NotFound {
                identifier: identifier.to_string(),
            }
            .into());
        }

        tracing::info!("Starting job {}", identifier);
        self.phase_started = Some(now);
        self.transition(JobState::PreHoming);
        self.issue_homing(link, now);
        Ok(())
    }

    /// Advance the job by one loop iteration
    pub fn tick(&mut self, link: &mut FlowController, now: Instant) {
        match self.state {
            JobState::PreHoming | JobState::PostHoming => self.tick_homing(link, now),
            JobState::Running => self.tick_running(link, now),
            _ => {}
        }
    }

    fn tick_homing(&mut self, link: &mut FlowController, now: Instant) {
        let elapsed = self
            .phase_started
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or_default();

        if elapsed >= self.config.timeouts.homing {
            if self.state == JobState::PostHoming {
                tracing::warn!(
                    "Final homing not acknowledged after {:?}, completing anyway",
                    elapsed
                );
                self.complete();
            } else {
                tracing::error!("Homing not acknowledged after {:?}", elapsed);
                self.fault(JobFault::HomingTimeout);
            }
            return;
        }

        if !self.homing_sent {
            self.issue_homing(link, now);
        }
    }

    fn tick_running(&mut self, link: &mut FlowController, now: Instant) {
        if self.awaiting_ack {
            let elapsed = self
                .command_sent_at
                .map(|t| now.saturating_duration_since(t))
                .unwrap_or_default();
            if elapsed >= self.config.timeouts.command {
                tracing::error!("Program line not acknowledged after {:?}", elapsed);
                self.fault(JobFault::CommandTimeout);
            }
            return;
        }

        if self.staged.is_none() {
            match self.next_eligible() {
                Ok(Some(command)) => self.staged = Some(command),
                Ok(None) => {
                    self.close_handle();
                    tracing::info!("Program exhausted after {} lines", self.consumed);
                    self.phase_started = Some(now);
                    self.homing_sent = false;
                    self.transition(JobState::PostHoming);
                    self.issue_homing(link, now);
                    return;
                }
                Err(e) => {
                    tracing::error!("{}", e);
                    self.fault(JobFault::ResourceReadFailed);
                    return;
                }
            }
        }

        let Some(command) = self.staged.as_deref() else {
            return;
        };

        match link.try_send(command, CommandSource::Job, now) {
            Ok(true) => {
                self.staged = None;
                self.consumed += 1;
                self.awaiting_ack = true;
                self.command_sent_at = Some(now);
                if self.consumed % self.config.progress_interval == 0 || self.consumed == self.total
                {
                    self.events.push(JobEvent::Progress {
                        consumed: self.consumed,
                        total: self.total,
                    });
                }
            }
            Ok(false) => {}
            Err(e) => tracing::warn!("Program line not written, will retry: {}", e),
        }
    }

    fn next_eligible(&mut self) -> std::result::Result<Option<String>, JobError> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(None);
        };
        while let Some(raw) = handle.next_line()? {
            if let Some(command) = eligible_command(&raw) {
                return Ok(Some(command.to_string()));
            }
        }
        Ok(None)
    }

    fn issue_homing(&mut self, link: &mut FlowController, now: Instant) {
        match link.try_send(HOMING_COMMAND, CommandSource::Job, now) {
            Ok(true) => {
                self.homing_sent = true;
                self.awaiting_ack = true;
                self.command_sent_at = Some(now);
            }
            Ok(false) => tracing::debug!("Command slot busy, homing deferred"),
            Err(e) => tracing::warn!("Homing command not written, will retry: {}", e),
        }
    }

    /// Handle the acknowledgment of a command this job sent
    pub fn on_command_complete(&mut self) {
        if !self.awaiting_ack {
            tracing::debug!("Unexpected job acknowledgment in {}", self.state);
            return;
        }
        self.awaiting_ack = false;
        self.command_sent_at = None;

        match self.state {
            JobState::PreHoming => self.begin_streaming(),
            JobState::PostHoming => self.complete(),
            _ => {}
        }
    }

    fn begin_streaming(&mut self) {
        let Some(identifier) = self.identifier.clone() else {
            return;
        };

        let total = self
            .source
            .open(&identifier)
            .and_then(|mut handle| {
                let counted = count_eligible(handle.as_mut());
                handle.close();
                counted
            })
            .and_then(|total| self.source.open(&identifier).map(|handle| (total, handle)));

        match total {
            Ok((total, handle)) => {
                self.total = total;
                self.handle = Some(handle);
                tracing::info!("Streaming {} ({} lines)", identifier, total);
                self.transition(JobState::Running);
            }
            Err(e) => {
                tracing::error!("{}", e);
                let fault = match e {
                    JobError::ReadFailed { .. } => JobFault::ResourceReadFailed,
                    _ => JobFault::ResourceOpenFailed,
                };
                self.fault(fault);
            }
        }
    }

    /// Suspend streaming with a feed hold
    pub fn pause(&mut self, link: &mut FlowController) -> Result<()> {
        if self.state != JobState::Running {
            return Err(self.invalid("pause"));
        }
        link.send_realtime(RealtimeCommand::FeedHold)?;
        self.transition(JobState::Paused);
        Ok(())
    }

    /// Resume streaming after a pause
    ///
    /// The acknowledgment clock of a line in flight restarts now.
    pub fn resume(&mut self, link: &mut FlowController, now: Instant) -> Result<()> {
        if self.state != JobState::Paused {
            return Err(self.invalid("resume"));
        }
        link.send_realtime(RealtimeCommand::CycleResume)?;
        if self.awaiting_ack {
            self.command_sent_at = Some(now);
            link.restart_clock(now);
        }
        self.transition(JobState::Running);
        Ok(())
    }

    /// Abandon the job and reset the controller
    ///
    /// Legal from every state. Job state is cleared before the reset is
    /// attempted, so a link failure still leaves the job idle.
    pub fn stop(&mut self, link: &mut FlowController) -> Result<()> {
        tracing::info!("Stopping job in {}", self.state);
        self.close_handle();
        self.staged = None;
        self.awaiting_ack = false;
        self.homing_sent = false;
        self.command_sent_at = None;
        self.phase_started = None;
        self.transition(JobState::Idle);
        link.hard_reset()?;
        Ok(())
    }

    /// Handle a controller alarm
    ///
    /// Returns whether the alarm faulted the job.
    pub fn on_alarm(&mut self, code: &str) -> bool {
        if !self.state.is_active() {
            return false;
        }
        tracing::error!("Alarm {} during {}", code, self.state);
        self.fault(JobFault::DeviceAlarm(code.to_string()));
        true
    }

    fn complete(&mut self) {
        self.awaiting_ack = false;
        self.transition(JobState::Complete);
        self.events.push(JobEvent::Completed {
            identifier: self.identifier.clone().unwrap_or_default(),
            lines_sent: self.consumed,
        });
    }

    fn fault(&mut self, fault: JobFault) {
        self.close_handle();
        self.staged = None;
        self.awaiting_ack = false;
        self.command_sent_at = None;
        self.last_fault = Some(fault.clone());
        self.transition(JobState::Error);
        self.events.push(JobEvent::Faulted {
            identifier: self.identifier.clone().unwrap_or_default(),
            fault,
        });
    }

    fn close_handle(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
    }

    fn transition(&mut self, to: JobState) {
        let from = self.state;
        if from == to {
            return;
        }
        if !from.can_transition_to(to) {
            tracing::warn!("Unexpected job transition {} -> {}", from, to);
        }
        tracing::info!("Job {} -> {}", from, to);
        self.state = to;
        self.events.push(JobEvent::StateChanged { from, to });
    }

    fn invalid(&self, requested: &str) -> gcodelink_core::Error {
        JobError::InvalidTransition {
            current: self.state.to_string(),
            requested: requested.to_string(),
        }
        .into()
    }

    /// Take the events produced since the last call
    pub fn drain_events(&mut self) -> Vec<JobEvent> {
        std::mem::take(&mut self.events)
    }

    /// Current state
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Program lines sent in the current job
    pub fn consumed_count(&self) -> usize {
        self.consumed
    }

    /// Eligible lines in the current program
    pub fn total_count(&self) -> usize {
        self.total
    }

    /// Identifier of the current or last program
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// Fault of the last failed job
    pub fn last_fault(&self) -> Option<&JobFault> {
        self.last_fault.as_ref()
    }

    /// Whether a program handle is currently open
    pub fn has_open_program(&self) -> bool {
        self.handle.is_some()
    }

    /// Whether the job is waiting for one of its own acknowledgments
    pub fn is_awaiting_ack(&self) -> bool {
        self.awaiting_ack
    }

    /// Job settings
    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Job fields of a status snapshot
    pub fn snapshot(&self, link_active: bool, peer_connected: bool) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state,
            consumed_count: self.consumed,
            total_count: self.total,
            file_identifier: self.identifier.clone(),
            link_active,
            peer_connected,
            last_fault: self.last_fault.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program_source::MemoryProgramSource;
    use gcodelink_communication::{LinkFramer, MockLinkHandle, MockSerialLink};

    fn setup(lines: &[&str]) -> (JobStateMachine, FlowController, MockLinkHandle, MockProgram) {
        let source = MemoryProgramSource::new();
        source.insert("job.gcode", lines.iter().copied());
        let (link, handle) = MockSerialLink::new();
        let flow =
            FlowController::new(LinkFramer::new(Box::new(link))).with_reset_pause(Duration::ZERO);
        let job = JobStateMachine::new(Box::new(source.clone()), JobConfig::default());
        (job, flow, handle, source)
    }

    type MockProgram = MemoryProgramSource;

    fn ack(job: &mut JobStateMachine, flow: &mut FlowController) {
        let done = flow.on_ack().expect("command in flight");
        assert_eq!(done.source, CommandSource::Job);
        job.on_command_complete();
    }

    #[test]
    fn test_start_only_from_idle() {
        let (mut job, mut flow, _link, _src) = setup(&["G0"]);
        let now = Instant::now();
        job.start("job.gcode", &mut flow, now).unwrap();
        let err = job.start("job.gcode", &mut flow, now).unwrap_err();
        assert!(err.is_job_error());
    }

    #[test]
    fn test_homing_deferred_while_slot_busy() {
        let (mut job, mut flow, link, _src) = setup(&["G0"]);
        let t0 = Instant::now();

        flow.try_send("$$", CommandSource::Interactive, t0).unwrap();
        job.start("job.gcode", &mut flow, t0).unwrap();
        assert_eq!(job.state(), JobState::PreHoming);
        assert_eq!(link.written_lines(), vec!["$$"]);

        flow.on_ack();
        job.tick(&mut flow, t0 + Duration::from_millis(10));
        assert_eq!(link.written_lines(), vec!["$$", "$H"]);
        assert!(job.is_awaiting_ack());
    }

    #[test]
    fn test_pause_sends_feed_hold_and_keeps_slot() {
        let (mut job, mut flow, link, _src) = setup(&["G0 X1", "G0 X2"]);
        let t0 = Instant::now();
        job.start("job.gcode", &mut flow, t0).unwrap();
        ack(&mut job, &mut flow);
        job.tick(&mut flow, t0);
        assert_eq!(job.consumed_count(), 1);

        job.pause(&mut flow).unwrap();
        assert_eq!(job.state(), JobState::Paused);
        assert!(flow.is_awaiting_ack());
        assert_eq!(link.written().last(), Some(&b'!'));
        assert!(job.pause(&mut flow).is_err());
    }

    #[test]
    fn test_stop_from_idle_resets() {
        let (mut job, mut flow, link, _src) = setup(&[]);
        job.stop(&mut flow).unwrap();
        assert_eq!(job.state(), JobState::Idle);
        assert_eq!(link.written(), vec![0x18]);
        assert!(job.drain_events().is_empty());
    }

    #[test]
    fn test_unreadable_program_faults_after_homing() {
        let (mut job, mut flow, _link, src) = setup(&["G0"]);
        src.set_unreadable("job.gcode");
        let t0 = Instant::now();
        job.start("job.gcode", &mut flow, t0).unwrap();
        ack(&mut job, &mut flow);

        assert_eq!(job.state(), JobState::Error);
        assert_eq!(job.last_fault(), Some(&JobFault::ResourceOpenFailed));
    }

    #[test]
    fn test_progress_interval() {
        let lines: Vec<String> = (0..5).map(|i| format!("G0 X{}", i)).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let (_, mut flow, _link, src) = setup(&refs);
        let mut job = JobStateMachine::new(
            Box::new(src),
            JobConfig {
                progress_interval: 2,
                ..Default::default()
            },
        );
        let t0 = Instant::now();
        job.start("job.gcode", &mut flow, t0).unwrap();
        ack(&mut job, &mut flow);
        for _ in 0..5 {
            job.tick(&mut flow, t0);
            ack(&mut job, &mut flow);
        }

        let progress: Vec<usize> = job
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                JobEvent::Progress { consumed, .. } => Some(consumed),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![2, 4, 5]);
    }
}
