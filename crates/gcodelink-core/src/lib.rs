//! # GCodeLink Core
//!
//! Core types, errors, and the event bus shared by every GCodeLink crate.
//! Provides the job lifecycle model, the status snapshot handed to
//! external collaborators, and the notification channel between them.

pub mod data;
pub mod error;
pub mod event_bus;

pub use data::{JobFault, JobState, StatusSnapshot};

pub use error::{Error, JobError, LinkError, Result, TransportError};

pub use event_bus::{
    BridgeEvent, EventBus, EventCategory, EventFilter, InteractiveEvent, JobEvent, LinkEvent,
    SubscriptionId,
};
