//! Broadcasting for real-time session events.
//!
//! Any embedding UI subscribes here to receive toasts, view refresh signals
//! and polling lifecycle changes.

pub mod events;

pub use events::{EventBroadcaster, NotificationLevel, SessionEvent, StopReason};
