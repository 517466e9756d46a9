//! Offline glue: the persisted queue of pending mutating actions
//!
//! See [`queue`] for the delivery contract (FIFO, at-least-once, bounded
//! retries, 24-hour expiry on reload).

mod queue;

pub use queue::{
    ActionDispatcher, DrainReport, OfflineQueue, PendingAction, PendingActionKind, QueueError,
    MAX_AGE_HOURS, MAX_ATTEMPTS,
};
