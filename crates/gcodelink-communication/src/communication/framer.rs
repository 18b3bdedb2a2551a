//! Link framer
//!
//! Turns the raw controller byte stream into discrete lines. Owns no
//! protocol semantics: it does not know what `ok` means, it only knows
//! that LF ends a line and CR is noise.

use super::SerialLink;
use gcodelink_core::LinkError;
use std::time::{Duration, Instant};

/// Default bound for a partial line held across polls
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

const READ_CHUNK: usize = 512;
const MAX_READS_PER_POLL: usize = 64;

/// Output of one [`LinkFramer::poll`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameBatch {
    /// Every byte received during this poll, verbatim
    pub raw: Vec<u8>,
    /// Complete, non-blank lines (CR stripped, trimmed)
    pub lines: Vec<String>,
}

impl FrameBatch {
    /// True when nothing was received
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Line framer over a [`SerialLink`]
pub struct LinkFramer {
    link: Box<dyn SerialLink>,
    accumulator: Vec<u8>,
    max_line_length: usize,
    last_activity: Option<Instant>,
    bytes_received: u64,
    bytes_sent: u64,
}

impl LinkFramer {
    /// Create a framer over the given link
    pub fn new(link: Box<dyn SerialLink>) -> Self {
        Self {
            link,
            accumulator: Vec::new(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            last_activity: None,
            bytes_received: 0,
            bytes_sent: 0,
        }
    }

    /// Set the bound for a partial line (minimum 1)
    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length.max(1);
        self
    }

    /// Write bytes verbatim to the link
    pub fn send(&mut self, data: &[u8]) -> Result<(), LinkError> {
        self.link
            .write_all(data)
            .map_err(|e| LinkError::WriteFailed {
                reason: e.to_string(),
            })?;
        self.bytes_sent += data.len() as u64;
        Ok(())
    }

    /// Read everything currently buffered and return the completed lines
    ///
    /// Never blocks; a partial line stays in the accumulator until a later
    /// poll delivers its terminator.
    pub fn poll(&mut self, now: Instant) -> Result<FrameBatch, LinkError> {
        let mut batch = FrameBatch::default();
        let mut buf = [0u8; READ_CHUNK];

        for _ in 0..MAX_READS_PER_POLL {
            let n = self
                .link
                .read_available(&mut buf)
                .map_err(|e| LinkError::ReadFailed {
                    reason: e.to_string(),
                })?;
            if n == 0 {
                break;
            }
            batch.raw.extend_from_slice(&buf[..n]);
        }

        if batch.raw.is_empty() {
            return Ok(batch);
        }

        self.last_activity = Some(now);
        self.bytes_received += batch.raw.len() as u64;

        for &byte in &batch.raw {
            match byte {
                b'\n' => self.finish_line(&mut batch.lines),
                b'\r' => {}
                _ => {
                    self.accumulator.push(byte);
                    if self.accumulator.len() >= self.max_line_length {
                        tracing::warn!(
                            "Controller line exceeded {} bytes without terminator, flushing",
                            self.max_line_length
                        );
                        self.finish_line(&mut batch.lines);
                    }
                }
            }
        }

        Ok(batch)
    }

    fn finish_line(&mut self, lines: &mut Vec<String>) {
        let bytes = std::mem::take(&mut self.accumulator);
        let line = String::from_utf8_lossy(&bytes);
        let line = line.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }

    /// Bytes held for an incomplete line
    pub fn pending_partial(&self) -> usize {
        self.accumulator.len()
    }

    /// Time of the last received byte
    pub fn last_activity(&self) -> Option<Instant> {
        self.last_activity
    }

    /// Whether a byte arrived within `window` of `now`
    pub fn is_active(&self, now: Instant, window: Duration) -> bool {
        self.last_activity
            .is_some_and(|t| now.saturating_duration_since(t) < window)
    }

    /// Total bytes received
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Total bytes sent
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Name of the underlying link
    pub fn link_name(&self) -> String {
        self.link.name()
    }

    /// Close the underlying link
    pub fn close(&mut self) -> Result<(), LinkError> {
        self.link.close().map_err(|e| LinkError::WriteFailed {
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::mock::MockSerialLink;

    #[test]
    fn test_partial_line_persists_across_polls() {
        let (link, handle) = MockSerialLink::new();
        let mut framer = LinkFramer::new(Box::new(link));
        let now = Instant::now();

        handle.push_inbound("o");
        let batch = framer.poll(now).unwrap();
        assert!(batch.lines.is_empty());
        assert_eq!(batch.raw, b"o");
        assert_eq!(framer.pending_partial(), 1);

        handle.push_inbound("k\r\nerror:2\r\n");
        let batch = framer.poll(now).unwrap();
        assert_eq!(batch.lines, vec!["ok", "error:2"]);
        assert_eq!(framer.pending_partial(), 0);
    }

    #[test]
    fn test_blank_lines_are_dropped() {
        let (link, handle) = MockSerialLink::new();
        let mut framer = LinkFramer::new(Box::new(link));

        handle.push_inbound("\r\n   \n\nok\n");
        let batch = framer.poll(Instant::now()).unwrap();
        assert_eq!(batch.lines, vec!["ok"]);
    }

    #[test]
    fn test_activity_tracking() {
        let (link, handle) = MockSerialLink::new();
        let mut framer = LinkFramer::new(Box::new(link));
        let t0 = Instant::now();
        let window = Duration::from_secs(2);

        assert!(!framer.is_active(t0, window));
        framer.poll(t0).unwrap();
        assert!(framer.last_activity().is_none());

        handle.push_inbound("?");
        framer.poll(t0).unwrap();
        assert!(framer.is_active(t0 + Duration::from_secs(1), window));
        assert!(!framer.is_active(t0 + Duration::from_secs(2), window));
        assert_eq!(framer.bytes_received(), 1);
    }

    #[test]
    fn test_runaway_line_is_flushed() {
        let (link, handle) = MockSerialLink::new();
        let mut framer = LinkFramer::new(Box::new(link)).with_max_line_length(4);

        handle.push_inbound("abcdefg");
        let batch = framer.poll(Instant::now()).unwrap();
        assert_eq!(batch.lines, vec!["abcd"]);
        assert_eq!(framer.pending_partial(), 3);
    }

    #[test]
    fn test_send_counts_bytes() {
        let (link, handle) = MockSerialLink::new();
        let mut framer = LinkFramer::new(Box::new(link));

        framer.send(b"$H\n").unwrap();
        assert_eq!(handle.written(), b"$H\n");
        assert_eq!(framer.bytes_sent(), 3);

        handle.set_fail_writes(true);
        assert!(matches!(
            framer.send(b"?"),
            Err(LinkError::WriteFailed { .. })
        ));
    }
}
