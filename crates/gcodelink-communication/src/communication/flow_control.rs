//! Single in-flight command flow control
//!
//! GRBL acknowledges every line with `ok` or `error:`. This coordinator
//! allows exactly one unacknowledged line on the wire at a time and records
//! which command source owns it, so the completion can be routed back.
//! Realtime bytes bypass the slot.

use super::framer::{FrameBatch, LinkFramer};
use crate::firmware::grbl::commands::RealtimeCommand;
use gcodelink_core::LinkError;
use std::fmt;
use std::time::{Duration, Instant};

/// Default pause after a soft reset before the slot is cleared
pub const DEFAULT_RESET_PAUSE: Duration = Duration::from_millis(100);

/// Origin of a line command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandSource {
    /// The autonomous program job
    Job,
    /// The interactive remote peer
    Interactive,
}

impl fmt::Display for CommandSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Job => write!(f, "job"),
            Self::Interactive => write!(f, "interactive"),
        }
    }
}

/// The command currently awaiting acknowledgment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    /// Command text without terminator
    pub text: String,
    /// When the command was written
    pub sent_at: Instant,
    /// Who sent it
    pub source: CommandSource,
}

impl PendingCommand {
    /// Time since the command was written
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.sent_at)
    }
}

/// Flow-control coordinator over a [`LinkFramer`]
pub struct FlowController {
    framer: LinkFramer,
    pending: Option<PendingCommand>,
    reset_pause: Duration,
    commands_sent: u64,
}

impl FlowController {
    /// Create a coordinator that owns the framer
    pub fn new(framer: LinkFramer) -> Self {
        Self {
            framer,
            pending: None,
            reset_pause: DEFAULT_RESET_PAUSE,
            commands_sent: 0,
        }
    }

    /// Set the pause used by [`hard_reset`](Self::hard_reset)
    pub fn with_reset_pause(mut self, pause: Duration) -> Self {
        self.reset_pause = pause;
        self
    }

    /// Send a line if the slot is free
    ///
    /// Returns `Ok(false)` without touching the link when a command is
    /// already in flight. The slot is only taken once the write succeeded.
    pub fn try_send(
        &mut self,
        line: &str,
        source: CommandSource,
        now: Instant,
    ) -> Result<bool, LinkError> {
        if self.pending.is_some() {
            return Ok(false);
        }

        let text = line.trim_end_matches(['\r', '\n']);
        let mut wire = Vec::with_capacity(text.len() + 1);
        wire.extend_from_slice(text.as_bytes());
        wire.push(b'\n');

        self.framer.send(&wire).map_err(|e| {
            tracing::error!("Failed to send command '{}': {}", text, e);
            e
        })?;

        tracing::debug!(">> {} ({})", text, source);
        self.pending = Some(PendingCommand {
            text: text.to_string(),
            sent_at: now,
            source,
        });
        self.commands_sent += 1;
        Ok(true)
    }

    /// Complete the in-flight command
    ///
    /// Called once per `ok` or `error:` line. An acknowledgment with no
    /// command in flight is ignored.
    pub fn on_ack(&mut self) -> Option<PendingCommand> {
        let completed = self.pending.take();
        if completed.is_none() {
            tracing::debug!("Acknowledgment with no command in flight");
        }
        completed
    }

    /// Clear the in-flight command without an acknowledgment
    pub fn release(&mut self, reason: &str) -> Option<PendingCommand> {
        let released = self.pending.take();
        if let Some(cmd) = &released {
            tracing::warn!("Released '{}' ({}) without ack: {}", cmd.text, cmd.source, reason);
        }
        released
    }

    /// Whether a command is awaiting acknowledgment
    pub fn is_awaiting_ack(&self) -> bool {
        self.pending.is_some()
    }

    /// The in-flight command, if any
    pub fn pending(&self) -> Option<&PendingCommand> {
        self.pending.as_ref()
    }

    /// Time since the in-flight command was sent
    pub fn elapsed_since_send(&self, now: Instant) -> Option<Duration> {
        self.pending.as_ref().map(|cmd| cmd.elapsed(now))
    }

    /// Restart the in-flight command's send clock
    pub fn restart_clock(&mut self, now: Instant) {
        if let Some(cmd) = self.pending.as_mut() {
            cmd.sent_at = now;
        }
    }

    /// Write a realtime command, ignoring the slot
    pub fn send_realtime(&mut self, command: RealtimeCommand) -> Result<(), LinkError> {
        tracing::debug!(">> realtime {}", command);
        self.framer.send(&[command.as_byte()])
    }

    /// Forward raw realtime bytes from the peer, ignoring the slot
    pub fn send_realtime_bytes(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.framer.send(bytes)
    }

    /// Soft reset the controller and clear the slot
    ///
    /// Blocks for the configured reset pause. The slot is cleared even if
    /// the reset byte could not be written.
    pub fn hard_reset(&mut self) -> Result<Option<PendingCommand>, LinkError> {
        tracing::info!("Hard reset");
        let written = self.framer.send(&[RealtimeCommand::SoftReset.as_byte()]);
        if !self.reset_pause.is_zero() {
            std::thread::sleep(self.reset_pause);
        }
        let discarded = self.pending.take();
        written.map(|_| discarded)
    }

    /// Read controller output
    pub fn poll(&mut self, now: Instant) -> Result<FrameBatch, LinkError> {
        self.framer.poll(now)
    }

    /// Number of line commands written
    pub fn commands_sent(&self) -> u64 {
        self.commands_sent
    }

    /// Access the framer
    pub fn framer(&self) -> &LinkFramer {
        &self.framer
    }

    /// Access the framer mutably
    pub fn framer_mut(&mut self) -> &mut LinkFramer {
        &mut self.framer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::mock::{MockLinkHandle, MockSerialLink};

    fn controller() -> (FlowController, MockLinkHandle) {
        let (link, handle) = MockSerialLink::new();
        let fc = FlowController::new(LinkFramer::new(Box::new(link)))
            .with_reset_pause(Duration::ZERO);
        (fc, handle)
    }

    #[test]
    fn test_second_send_is_refused() {
        let (mut fc, handle) = controller();
        let now = Instant::now();

        assert!(fc.try_send("G0 X1", CommandSource::Job, now).unwrap());
        assert!(!fc.try_send("G0 X2", CommandSource::Interactive, now).unwrap());
        assert_eq!(handle.written(), b"G0 X1\n");
        assert_eq!(fc.pending().map(|p| p.source), Some(CommandSource::Job));
    }

    #[test]
    fn test_ack_returns_owner() {
        let (mut fc, _handle) = controller();
        let now = Instant::now();

        fc.try_send("$X", CommandSource::Interactive, now).unwrap();
        let done = fc.on_ack().unwrap();
        assert_eq!(done.text, "$X");
        assert_eq!(done.source, CommandSource::Interactive);
        assert!(!fc.is_awaiting_ack());
        assert!(fc.on_ack().is_none());
    }

    #[test]
    fn test_failed_write_keeps_slot_free() {
        let (mut fc, handle) = controller();
        handle.set_fail_writes(true);

        assert!(fc.try_send("G1", CommandSource::Job, Instant::now()).is_err());
        assert!(!fc.is_awaiting_ack());
    }

    #[test]
    fn test_realtime_bypasses_slot() {
        let (mut fc, handle) = controller();
        let now = Instant::now();

        fc.try_send("G1 X5", CommandSource::Job, now).unwrap();
        fc.send_realtime(RealtimeCommand::FeedHold).unwrap();
        assert_eq!(handle.written(), b"G1 X5\n!");
        assert!(fc.is_awaiting_ack());
    }

    #[test]
    fn test_hard_reset_clears_slot() {
        let (mut fc, handle) = controller();
        fc.try_send("G1 X5", CommandSource::Job, Instant::now()).unwrap();

        let discarded = fc.hard_reset().unwrap();
        assert_eq!(discarded.map(|p| p.text), Some("G1 X5".to_string()));
        assert!(!fc.is_awaiting_ack());
        assert_eq!(handle.written().last(), Some(&0x18));
    }

    #[test]
    fn test_elapsed_and_restart() {
        let (mut fc, _handle) = controller();
        let t0 = Instant::now();
        assert_eq!(fc.elapsed_since_send(t0), None);

        fc.try_send("G4 P1", CommandSource::Job, t0).unwrap();
        assert_eq!(
            fc.elapsed_since_send(t0 + Duration::from_secs(5)),
            Some(Duration::from_secs(5))
        );

        fc.restart_clock(t0 + Duration::from_secs(5));
        assert_eq!(
            fc.elapsed_since_send(t0 + Duration::from_secs(6)),
            Some(Duration::from_secs(1))
        );
    }
}
