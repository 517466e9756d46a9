//! Billing snapshot persistence
//!
//! One JSON file under the data directory holds the non-transient store
//! fields (plans, subscription, balance, usage, UI flags) plus the pending
//! offline actions at save time, for session continuity across restarts.
//! Writes are atomic: temp file, then rename. The offline queue keeps its
//! own locked mirror; the snapshot copy is a fallback for a crash that
//! loses the queue file.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::types::{
    CreditBalance, Paginated, PaymentTransaction, SubscriptionPlan, UsageStats, UserSubscription,
};
use crate::offline::PendingAction;

const SNAPSHOT_FILE: &str = "billing_snapshot.json";
const SNAPSHOT_TEMP: &str = "billing_snapshot.tmp";

/// Serialized image of the non-transient store fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub plans: Option<Vec<SubscriptionPlan>>,
    #[serde(default)]
    pub subscription: Option<UserSubscription>,
    #[serde(default)]
    pub credits: Option<CreditBalance>,
    #[serde(default)]
    pub usage: Option<UsageStats>,
    #[serde(default)]
    pub history: Option<Paginated<PaymentTransaction>>,
    #[serde(default)]
    pub show_upgrade_prompt: bool,
    #[serde(default)]
    pub show_credit_warning: bool,
    #[serde(default)]
    pub pending_actions: Vec<PendingAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistError {
    #[error("snapshot I/O error: {0}")]
    Io(String),
    #[error("snapshot serialization error: {0}")]
    Serialization(String),
}

pub fn snapshot_path(dir: &Path) -> PathBuf {
    dir.join(SNAPSHOT_FILE)
}

/// Write the snapshot atomically under `dir`.
pub fn save(dir: &Path, snapshot: &StoreSnapshot) -> Result<(), PersistError> {
    fs::create_dir_all(dir)
        .map_err(|e| PersistError::Io(format!("failed to create data directory: {}", e)))?;

    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| PersistError::Serialization(format!("failed to serialize snapshot: {}", e)))?;

    let temp = dir.join(SNAPSHOT_TEMP);
    fs::write(&temp, &json)
        .map_err(|e| PersistError::Io(format!("failed to write snapshot temp file: {}", e)))?;
    fs::rename(&temp, snapshot_path(dir))
        .map_err(|e| PersistError::Io(format!("failed to rename snapshot file: {}", e)))?;
    debug!("billing snapshot saved");
    Ok(())
}

/// Load the snapshot, if one exists. Pending actions older than the queue's
/// 24-hour window are filtered out here as well, so a stale snapshot cannot
/// resurrect expired mutations. An unreadable file is discarded with a
/// warning rather than failing startup.
pub fn load(dir: &Path) -> Option<StoreSnapshot> {
    let path = snapshot_path(dir);
    if !path.exists() {
        return None;
    }
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("failed to read billing snapshot: {}", e);
            return None;
        }
    };
    let mut snapshot: StoreSnapshot = match serde_json::from_str(&raw) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!("discarding unreadable billing snapshot: {}", e);
            return None;
        }
    };

    let now = Utc::now();
    let before = snapshot.pending_actions.len();
    snapshot.pending_actions.retain(|action| {
        now - action.timestamp < chrono::Duration::hours(crate::offline::MAX_AGE_HOURS)
    });
    let expired = before - snapshot.pending_actions.len();
    if expired > 0 {
        warn!(expired, "dropped expired pending actions from snapshot");
    }

    Some(snapshot)
}

/// Delete the snapshot (sign-out reset).
pub fn clear(dir: &Path) {
    let path = snapshot_path(dir);
    if path.exists() {
        if let Err(e) = fs::remove_file(&path) {
            warn!("failed to remove billing snapshot: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock;
    use crate::offline::{PendingAction, PendingActionKind};
    use serde_json::json;
    use tempfile::TempDir;

    fn sample() -> StoreSnapshot {
        StoreSnapshot {
            plans: Some(mock::plans()),
            subscription: Some(mock::subscription()),
            credits: Some(mock::credits()),
            usage: Some(mock::usage()),
            history: None,
            show_upgrade_prompt: false,
            show_credit_warning: true,
            pending_actions: vec![PendingAction::new(
                PendingActionKind::ConsumeCredits,
                json!({"amount": 2}),
            )],
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let snapshot = sample();
        save(dir.path(), &snapshot).unwrap();

        let loaded = load(dir.path()).unwrap();
        assert_eq!(loaded.plans, snapshot.plans);
        assert_eq!(loaded.credits, snapshot.credits);
        assert!(loaded.show_credit_warning);
        assert_eq!(loaded.pending_actions.len(), 1);
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(load(dir.path()).is_none());
    }

    #[test]
    fn test_load_filters_expired_pending_actions() {
        let dir = TempDir::new().unwrap();
        let mut snapshot = sample();
        let mut stale = PendingAction::new(PendingActionKind::PurchaseCredits, json!({}));
        stale.timestamp = Utc::now() - chrono::Duration::hours(crate::offline::MAX_AGE_HOURS + 1);
        snapshot.pending_actions.push(stale);
        save(dir.path(), &snapshot).unwrap();

        let loaded = load(dir.path()).unwrap();
        assert_eq!(loaded.pending_actions.len(), 1);
        assert_eq!(
            loaded.pending_actions[0].kind,
            PendingActionKind::ConsumeCredits
        );
    }

    #[test]
    fn test_corrupt_snapshot_is_discarded() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(snapshot_path(dir.path()), "{ not json").unwrap();
        assert!(load(dir.path()).is_none());
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = TempDir::new().unwrap();
        save(dir.path(), &sample()).unwrap();
        clear(dir.path());
        assert!(load(dir.path()).is_none());
    }
}
