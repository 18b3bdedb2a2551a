//! Diagnostic console history
//!
//! Keeps the most recent banner, error, and alarm lines for a display
//! collaborator. Recording can be suppressed while a job is active or a
//! peer is connected, since either of those already has its own view of
//! the controller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// Kind of console entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConsoleLevel {
    /// Controller startup banner
    Banner,
    /// `error:` response
    Error,
    /// `ALARM:` response
    Alarm,
}

impl std::fmt::Display for ConsoleLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Banner => write!(f, "BANNER"),
            Self::Error => write!(f, "ERR"),
            Self::Alarm => write!(f, "ALARM"),
        }
    }
}

/// One recorded line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleEntry {
    /// Entry kind
    pub level: ConsoleLevel,
    /// Line text
    pub text: String,
    /// When the line was recorded
    pub timestamp: DateTime<Utc>,
}

impl ConsoleEntry {
    /// Create an entry stamped with the current time
    pub fn new(level: ConsoleLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// `[HH:MM:SS] [LEVEL] text`
    pub fn formatted(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp.format("%H:%M:%S"),
            self.level,
            self.text
        )
    }
}

/// When recording is allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsolePolicy {
    /// Entries kept
    pub capacity: usize,
    /// Skip recording while a job is active
    pub suppress_while_running: bool,
    /// Skip recording while a peer is connected
    pub suppress_while_connected: bool,
}

impl Default for ConsolePolicy {
    fn default() -> Self {
        Self {
            capacity: 50,
            suppress_while_running: true,
            suppress_while_connected: true,
        }
    }
}

/// Bounded console history
#[derive(Debug, Clone)]
pub struct ConsoleLog {
    entries: VecDeque<ConsoleEntry>,
    policy: ConsolePolicy,
}

impl ConsoleLog {
    pub fn new(policy: ConsolePolicy) -> Self {
        let policy = ConsolePolicy {
            capacity: policy.capacity.max(1),
            ..policy
        };
        Self {
            entries: VecDeque::with_capacity(policy.capacity),
            policy,
        }
    }

    /// Record a line unless the policy suppresses it
    ///
    /// Returns whether the line was kept.
    pub fn record(
        &mut self,
        level: ConsoleLevel,
        text: &str,
        job_active: bool,
        peer_connected: bool,
    ) -> bool {
        if (job_active && self.policy.suppress_while_running)
            || (peer_connected && self.policy.suppress_while_connected)
        {
            return false;
        }

        if self.entries.len() >= self.policy.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(ConsoleEntry::new(level, text));
        true
    }

    pub fn entries(&self) -> impl Iterator<Item = &ConsoleEntry> {
        self.entries.iter()
    }

    /// Formatted lines, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(ConsoleEntry::formatted).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let mut log = ConsoleLog::new(ConsolePolicy {
            capacity: 2,
            ..Default::default()
        });
        log.record(ConsoleLevel::Error, "error:1", false, false);
        log.record(ConsoleLevel::Error, "error:2", false, false);
        log.record(ConsoleLevel::Alarm, "ALARM:3", false, false);

        let texts: Vec<_> = log.entries().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["error:2", "ALARM:3"]);
    }

    #[test]
    fn test_suppression_policies() {
        let mut log = ConsoleLog::new(ConsolePolicy {
            capacity: 10,
            suppress_while_running: true,
            suppress_while_connected: false,
        });
        assert!(!log.record(ConsoleLevel::Error, "error:1", true, false));
        assert!(log.record(ConsoleLevel::Error, "error:1", false, true));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_formatted_entry() {
        let entry = ConsoleEntry::new(ConsoleLevel::Banner, "Grbl 1.1h");
        assert!(entry.formatted().ends_with("[BANNER] Grbl 1.1h"));
    }
}
