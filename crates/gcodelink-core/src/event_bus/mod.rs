//! # Event Bus Module
//!
//! Explicit event notifications from the polling loop to registered
//! observers (display, status publisher, HTTP layer).
//!
//! - Publishers emit typed events without knowing subscribers
//! - Subscribers filter by category and run synchronously on the loop thread
//! - Async consumers take a broadcast receiver instead
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gcodelink_core::event_bus::{BridgeEvent, EventBus, EventCategory, EventFilter};
//!
//! let bus = EventBus::new();
//! let subscription = bus.subscribe(
//!     EventFilter::Categories(vec![EventCategory::Job]),
//!     |event| tracing::info!("{}", event.description()),
//! );
//! bus.unsubscribe(subscription);
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
