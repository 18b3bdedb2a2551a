//! Status publishing
//!
//! Keeps the latest [`StatusSnapshot`] where other threads can read it and
//! pushes it onto the event bus when it changes.

use gcodelink_core::{BridgeEvent, EventBus, StatusSnapshot};
use parking_lot::RwLock;
use std::sync::Arc;

/// Latest status, shared with control handles
pub type SharedStatus = Arc<RwLock<StatusSnapshot>>;

/// Change-driven status publisher
pub struct StatusPublisher {
    bus: Arc<EventBus>,
    latest: SharedStatus,
    published: Option<StatusSnapshot>,
}

impl StatusPublisher {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            latest: Arc::new(RwLock::new(StatusSnapshot::default())),
            published: None,
        }
    }

    /// Store the snapshot and publish it if it changed or `force` is set
    ///
    /// Returns whether an event was published.
    pub fn update(&mut self, snapshot: StatusSnapshot, force: bool) -> bool {
        *self.latest.write() = snapshot.clone();

        if !force && self.published.as_ref() == Some(&snapshot) {
            return false;
        }

        tracing::debug!(
            "Status: {} {}/{}",
            snapshot.state,
            snapshot.consumed_count,
            snapshot.total_count
        );
        let _ = self.bus.publish(BridgeEvent::Status(snapshot.clone()));
        self.published = Some(snapshot);
        true
    }

    /// Latest snapshot
    pub fn snapshot(&self) -> StatusSnapshot {
        self.latest.read().clone()
    }

    /// Shared handle to the latest snapshot
    pub fn shared(&self) -> SharedStatus {
        Arc::clone(&self.latest)
    }
}

/// Serialize a snapshot for the HTTP collaborator
pub fn snapshot_json(snapshot: &StatusSnapshot) -> serde_json::Result<String> {
    serde_json::to_string(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcodelink_core::{EventFilter, JobState};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_publishes_only_on_change() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        bus.subscribe(EventFilter::All, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut publisher = StatusPublisher::new(Arc::clone(&bus));
        let snapshot = StatusSnapshot::default();
        assert!(publisher.update(snapshot.clone(), false));
        assert!(!publisher.update(snapshot.clone(), false));
        assert!(publisher.update(snapshot.clone(), true));

        let running = StatusSnapshot {
            state: JobState::Running,
            ..snapshot
        };
        assert!(publisher.update(running, false));
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(publisher.snapshot().state, JobState::Running);
    }

    #[test]
    fn test_snapshot_json() {
        let snapshot = StatusSnapshot {
            state: JobState::Paused,
            consumed_count: 4,
            total_count: 10,
            file_identifier: Some("job.gcode".to_string()),
            ..Default::default()
        };
        let json: serde_json::Value =
            serde_json::from_str(&snapshot_json(&snapshot).unwrap()).unwrap();
        assert_eq!(json["state"], "Paused");
        assert_eq!(json["consumed_count"], 4);
        assert_eq!(json["file_identifier"], "job.gcode");
        assert!(json["last_fault"].is_null());
    }
}
