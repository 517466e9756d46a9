//! Offline action queue
//!
//! While the app is offline, mutating intents (credit consumption,
//! subscription changes, credit purchases) append here instead of calling
//! the network. The queue lives in memory and mirrors to a JSON file
//! guarded by an exclusive advisory lock, so two processes sharing the
//! data directory cannot double-drain it.
//!
//! Delivery is at-least-once and best-effort: FIFO within the queue, a
//! fixed retry budget per action, no idempotency key sent to the server.
//! An action that exhausts its budget is dropped with a logged warning.

use std::collections::VecDeque;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Dispatch attempts per action before it is dropped.
pub const MAX_ATTEMPTS: u32 = 3;
/// Persisted entries older than this are discarded on reload.
pub const MAX_AGE_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingActionKind {
    ConsumeCredits,
    CancelSubscription,
    ReactivateSubscription,
    UpdateSubscription,
    PurchaseCredits,
}

impl fmt::Display for PendingActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PendingActionKind::ConsumeCredits => "consume_credits",
            PendingActionKind::CancelSubscription => "cancel_subscription",
            PendingActionKind::ReactivateSubscription => "reactivate_subscription",
            PendingActionKind::UpdateSubscription => "update_subscription",
            PendingActionKind::PurchaseCredits => "purchase_credits",
        };
        write!(f, "{}", label)
    }
}

/// One queued client-side mutation awaiting network availability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: Uuid,
    pub kind: PendingActionKind,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub retries: u32,
}

impl PendingAction {
    pub fn new(kind: PendingActionKind, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            payload,
            timestamp: Utc::now(),
            retries: 0,
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.timestamp < Duration::hours(MAX_AGE_HOURS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue I/O error: {0}")]
    Io(String),
    #[error("queue serialization error: {0}")]
    Serialization(String),
}

/// Outcome of one drain pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub requeued: usize,
    pub dropped: usize,
}

/// Replays a queued action against its API call. Implemented by the flow
/// facade; tests inject scripted dispatchers.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn dispatch(&self, action: &PendingAction) -> Result<(), String>;
}

/// Persisted FIFO queue of pending actions.
pub struct OfflineQueue {
    dir: PathBuf,
    queue: Mutex<VecDeque<PendingAction>>,
}

impl OfflineQueue {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    fn queue_path(&self) -> PathBuf {
        self.dir.join("offline_queue.json")
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join("offline_queue.tmp")
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join("offline_queue.lock")
    }

    fn ensure_dir(&self) -> Result<(), QueueError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| QueueError::Io(format!("failed to create queue directory: {}", e)))
    }

    /// Acquire the exclusive advisory lock. The returned handle must stay
    /// alive while the persisted file is read or written.
    fn acquire_lock(&self) -> Result<File, QueueError> {
        self.ensure_dir()?;
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(|e| QueueError::Io(format!("failed to open queue lock file: {}", e)))?;
        lock_file
            .lock_exclusive()
            .map_err(|e| QueueError::Io(format!("failed to lock queue file: {}", e)))?;
        Ok(lock_file)
    }

    /// Load the persisted queue, discarding entries older than
    /// [`MAX_AGE_HOURS`]. Returns how many entries were kept.
    pub fn load(&self) -> Result<usize, QueueError> {
        let _lock = self.acquire_lock()?;
        let path = self.queue_path();
        if !path.exists() {
            return Ok(0);
        }

        let raw = fs::read_to_string(&path)
            .map_err(|e| QueueError::Io(format!("failed to read queue file: {}", e)))?;
        let entries: Vec<PendingAction> = serde_json::from_str(&raw)
            .map_err(|e| QueueError::Serialization(format!("failed to parse queue file: {}", e)))?;

        let now = Utc::now();
        let total = entries.len();
        let fresh: VecDeque<PendingAction> =
            entries.into_iter().filter(|a| a.is_fresh(now)).collect();
        let expired = total - fresh.len();
        if expired > 0 {
            warn!(expired, "discarded expired queued actions on reload");
        }

        let kept = fresh.len();
        *self.lock_queue() = fresh;
        Ok(kept)
    }

    /// Append an action and persist the queue.
    pub fn enqueue(
        &self,
        kind: PendingActionKind,
        payload: serde_json::Value,
    ) -> Result<PendingAction, QueueError> {
        let action = PendingAction::new(kind, payload);
        self.lock_queue().push_back(action.clone());
        self.persist()?;
        info!(id = %action.id, kind = %action.kind, "queued action while offline");
        Ok(action)
    }

    pub fn len(&self) -> usize {
        self.lock_queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_queue().is_empty()
    }

    /// Snapshot of the queued actions, FIFO order.
    pub fn entries(&self) -> Vec<PendingAction> {
        self.lock_queue().iter().cloned().collect()
    }

    /// Drop everything (sign-out) and persist the empty queue.
    pub fn clear(&self) -> Result<(), QueueError> {
        self.lock_queue().clear();
        self.persist()
    }

    /// Replay the queue in FIFO order through `dispatcher`.
    ///
    /// One pass over the actions queued at entry: success removes an
    /// action, failure increments its retry count and requeues it unless
    /// the attempt budget ([`MAX_ATTEMPTS`]) is exhausted, in which case it
    /// is dropped with a warning. Actions enqueued mid-drain wait for the
    /// next pass.
    pub async fn drain(&self, dispatcher: &dyn ActionDispatcher) -> Result<DrainReport, QueueError> {
        let pending: Vec<PendingAction> = {
            let mut queue = self.lock_queue();
            queue.drain(..).collect()
        };
        if pending.is_empty() {
            return Ok(DrainReport::default());
        }

        let mut report = DrainReport::default();
        let mut requeue = Vec::new();

        for mut action in pending {
            match dispatcher.dispatch(&action).await {
                Ok(()) => {
                    report.delivered += 1;
                    info!(id = %action.id, kind = %action.kind, "replayed queued action");
                }
                Err(e) => {
                    action.retries += 1;
                    if action.retries >= MAX_ATTEMPTS {
                        report.dropped += 1;
                        warn!(
                            id = %action.id,
                            kind = %action.kind,
                            attempts = action.retries,
                            error = %e,
                            "dropping queued action after exhausting retry budget"
                        );
                    } else {
                        report.requeued += 1;
                        requeue.push(action);
                    }
                }
            }
        }

        {
            let mut queue = self.lock_queue();
            for action in requeue {
                queue.push_back(action);
            }
        }
        self.persist()?;
        Ok(report)
    }

    /// Write the queue to disk atomically (temp file + rename) under the
    /// advisory lock.
    fn persist(&self) -> Result<(), QueueError> {
        let _lock = self.acquire_lock()?;
        let entries = self.entries();
        let json = serde_json::to_string_pretty(&entries)
            .map_err(|e| QueueError::Serialization(format!("failed to serialize queue: {}", e)))?;

        let temp_path = self.temp_path();
        fs::write(&temp_path, &json)
            .map_err(|e| QueueError::Io(format!("failed to write queue temp file: {}", e)))?;
        fs::rename(&temp_path, self.queue_path())
            .map_err(|e| QueueError::Io(format!("failed to rename queue file: {}", e)))?;
        Ok(())
    }

    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<PendingAction>> {
        self.queue.lock().unwrap_or_else(|poisoned| {
            warn!("offline queue lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}
