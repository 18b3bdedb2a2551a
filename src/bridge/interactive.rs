//! Interactive peer command routing
//!
//! Splits the peer's byte stream into realtime bytes, which go to the link
//! immediately, and command lines, which must win the command slot. Lines
//! that arrive while the slot is busy are dropped and reported back.
//!
//! Only the GRBL-defined extended codes count as realtime above `0x7F`, so a
//! line that starts with a multibyte UTF-8 character is forwarded intact.

use gcodelink_communication::{firmware::grbl::is_realtime_byte, CommandSource, FlowController};
use gcodelink_core::LinkError;
use std::time::Instant;

/// Default partial-line bound
pub const DEFAULT_MAX_LINE_LENGTH: usize = 128;

/// What happened to one peer payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteOutcome {
    /// Lines written to the controller
    pub forwarded: Vec<String>,
    /// Lines dropped because a command was in flight
    pub rejected: Vec<String>,
    /// Realtime bytes written to the controller
    pub realtime_bytes: usize,
    /// Size of a partial line flushed because it reached the bound
    pub overflow_flushed: Option<usize>,
}

/// Router for the single interactive peer
#[derive(Debug)]
pub struct InteractiveRouter {
    buffer: Vec<u8>,
    max_line_length: usize,
    reset_on_connect: bool,
    connected: bool,
}

impl InteractiveRouter {
    pub fn new(max_line_length: usize, reset_on_connect: bool) -> Self {
        Self {
            buffer: Vec::new(),
            max_line_length: max_line_length.max(1),
            reset_on_connect,
            connected: false,
        }
    }

    /// A peer attached; clears any stale partial line
    pub fn on_connect(&mut self, flow: &mut FlowController) -> Result<(), LinkError> {
        self.connected = true;
        self.buffer.clear();
        if self.reset_on_connect {
            flow.hard_reset()?;
        }
        Ok(())
    }

    /// The peer went away
    pub fn on_disconnect(&mut self) {
        self.connected = false;
        self.buffer.clear();
    }

    /// Route one payload from the peer
    pub fn on_data(
        &mut self,
        data: &[u8],
        flow: &mut FlowController,
        now: Instant,
    ) -> Result<RouteOutcome, LinkError> {
        let mut outcome = RouteOutcome::default();
        self.buffer.extend_from_slice(data);

        loop {
            self.forward_realtime_head(flow, &mut outcome)?;

            let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') else {
                break;
            };
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..pos]);
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            self.send_line(line, flow, now, &mut outcome)?;
        }

        if self.buffer.len() >= self.max_line_length {
            let raw = std::mem::take(&mut self.buffer);
            tracing::warn!("Peer line reached {} bytes without terminator, flushing", raw.len());
            outcome.overflow_flushed = Some(raw.len());
            let line = String::from_utf8_lossy(&raw).into_owned();
            self.send_line(&line, flow, now, &mut outcome)?;
        }

        Ok(outcome)
    }

    fn forward_realtime_head(
        &mut self,
        flow: &mut FlowController,
        outcome: &mut RouteOutcome,
    ) -> Result<(), LinkError> {
        let count = self
            .buffer
            .iter()
            .take_while(|&&b| is_realtime_byte(b))
            .count();
        if count == 0 {
            return Ok(());
        }
        let realtime: Vec<u8> = self.buffer.drain(..count).collect();
        flow.send_realtime_bytes(&realtime)?;
        outcome.realtime_bytes += count;
        Ok(())
    }

    fn send_line(
        &mut self,
        line: &str,
        flow: &mut FlowController,
        now: Instant,
        outcome: &mut RouteOutcome,
    ) -> Result<(), LinkError> {
        if flow.try_send(line, CommandSource::Interactive, now)? {
            outcome.forwarded.push(line.to_string());
        } else {
            tracing::warn!("Controller busy, dropped peer line '{}'", line);
            outcome.rejected.push(line.to_string());
        }
        Ok(())
    }

    /// Bytes held for an incomplete line
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}
