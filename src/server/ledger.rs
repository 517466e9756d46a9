//! Durable per-email usage ledger
//!
//! SQLite-backed record of subscription state and monthly usage per user,
//! keyed by email. Limit checks are atomic increment-and-check statements
//! (`UPDATE ... SET used = used + 1 WHERE used < cap`), so concurrent
//! deliveries cannot overshoot a cap and the counters survive restart.
//! Monthly counters roll over lazily the first time a check or event
//! observes a new calendar month.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("ledger I/O error: {0}")]
    Io(String),
}

/// Per-plan caps. Unknown plan names fall back to the free tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    pub monthly_generations: u64,
    pub regenerations_per_description: u64,
}

impl PlanLimits {
    pub fn for_plan(plan: &str) -> Self {
        match plan.trim().to_ascii_lowercase().as_str() {
            "starter" => Self {
                monthly_generations: 100,
                regenerations_per_description: 3,
            },
            "pro" => Self {
                monthly_generations: 500,
                regenerations_per_description: 5,
            },
            "scale" => Self {
                monthly_generations: 2000,
                regenerations_per_description: 10,
            },
            _ => Self {
                monthly_generations: 10,
                regenerations_per_description: 2,
            },
        }
    }
}

/// Action a client asks permission for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LedgerAction {
    Generation,
    Regeneration { description_id: String },
}

/// Allow/deny decision with remaining quota or a denial reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allowed { remaining: u64 },
    Denied { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

/// One user's ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerUser {
    pub email: String,
    pub plan: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    pub generations_used: u64,
    /// Calendar month the counters belong to, `YYYY-MM`
    pub period_month: String,
}

pub struct Ledger {
    conn: Mutex<Connection>,
}

impl Ledger {
    /// Open (or create) the ledger database at `path`.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| LedgerError::Io(format!("failed to create data dir: {}", e)))?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory ledger for tests.
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                email TEXT PRIMARY KEY,
                plan TEXT NOT NULL DEFAULT 'free',
                status TEXT NOT NULL DEFAULT 'none',
                subscription_id TEXT,
                generations_used INTEGER NOT NULL DEFAULT 0,
                period_month TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS regenerations (
                email TEXT NOT NULL,
                description_id TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                period_month TEXT NOT NULL,
                PRIMARY KEY (email, description_id)
            );
        "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn current_month() -> String {
        Utc::now().format("%Y-%m").to_string()
    }

    /// Apply a `subscription_created` or `subscription_updated` event.
    pub fn upsert_subscription(
        &self,
        email: &str,
        plan: &str,
        status: &str,
        subscription_id: Option<&str>,
    ) -> Result<(), LedgerError> {
        let conn = self.lock();
        let month = Self::current_month();
        conn.execute(
            r#"
            INSERT INTO users (email, plan, status, subscription_id, period_month, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(email) DO UPDATE SET
                plan = ?2,
                status = ?3,
                subscription_id = COALESCE(?4, subscription_id),
                updated_at = ?6
            "#,
            params![email, plan, status, subscription_id, month, Utc::now().to_rfc3339()],
        )?;
        info!(email, plan, status, "subscription upserted");
        Ok(())
    }

    /// Apply a `subscription_cancelled` event. The plan stays until the
    /// period ends; only the status flips.
    pub fn cancel_subscription(&self, email: &str) -> Result<(), LedgerError> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE users SET status = 'cancelled', updated_at = ?2 WHERE email = ?1",
            params![email, Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            warn!(email, "cancel event for unknown user");
        } else {
            info!(email, "subscription cancelled");
        }
        Ok(())
    }

    /// Apply an `order_created` event (one-off purchase; records the user if
    /// unseen).
    pub fn record_order(&self, email: &str, order_id: &str) -> Result<(), LedgerError> {
        let conn = self.lock();
        let month = Self::current_month();
        conn.execute(
            r#"
            INSERT INTO users (email, plan, status, period_month, updated_at)
            VALUES (?1, 'free', 'none', ?2, ?3)
            ON CONFLICT(email) DO UPDATE SET updated_at = ?3
            "#,
            params![email, month, Utc::now().to_rfc3339()],
        )?;
        info!(email, order_id, "order recorded");
        Ok(())
    }

    /// Look up one user's record.
    pub fn get_user(&self, email: &str) -> Result<Option<LedgerUser>, LedgerError> {
        let conn = self.lock();
        let user = conn
            .query_row(
                "SELECT email, plan, status, subscription_id, generations_used, period_month
                 FROM users WHERE email = ?1",
                params![email],
                |row| {
                    Ok(LedgerUser {
                        email: row.get(0)?,
                        plan: row.get(1)?,
                        status: row.get(2)?,
                        subscription_id: row.get(3)?,
                        generations_used: row.get::<_, i64>(4)? as u64,
                        period_month: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    /// Atomic increment-and-check: may this user perform `action` this
    /// month? An allowed decision has already consumed one unit of quota.
    pub fn can_perform(&self, email: &str, action: &LedgerAction) -> Result<Decision, LedgerError> {
        let conn = self.lock();
        let month = Self::current_month();

        // Unknown users get a free-tier row so the caps still apply
        conn.execute(
            r#"
            INSERT INTO users (email, plan, status, period_month, updated_at)
            VALUES (?1, 'free', 'none', ?2, ?3)
            ON CONFLICT(email) DO NOTHING
            "#,
            params![email, month, Utc::now().to_rfc3339()],
        )?;

        // Lazy monthly rollover
        let rolled = conn.execute(
            "UPDATE users SET generations_used = 0, period_month = ?2
             WHERE email = ?1 AND period_month <> ?2",
            params![email, month],
        )?;
        if rolled > 0 {
            debug!(email, month, "rolled monthly counters");
        }

        let plan: String = conn.query_row(
            "SELECT plan FROM users WHERE email = ?1",
            params![email],
            |row| row.get(0),
        )?;
        let limits = PlanLimits::for_plan(&plan);

        match action {
            LedgerAction::Generation => {
                let cap = limits.monthly_generations as i64;
                let changed = conn.execute(
                    "UPDATE users SET generations_used = generations_used + 1, updated_at = ?3
                     WHERE email = ?1 AND generations_used < ?2",
                    params![email, cap, Utc::now().to_rfc3339()],
                )?;
                if changed == 1 {
                    let used: i64 = conn.query_row(
                        "SELECT generations_used FROM users WHERE email = ?1",
                        params![email],
                        |row| row.get(0),
                    )?;
                    Ok(Decision::Allowed {
                        remaining: (cap - used).max(0) as u64,
                    })
                } else {
                    Ok(Decision::Denied {
                        reason: format!(
                            "Monthly generation limit of {} reached for the {} plan.",
                            limits.monthly_generations, plan
                        ),
                    })
                }
            }
            LedgerAction::Regeneration { description_id } => {
                let cap = limits.regenerations_per_description as i64;
                // Reset a stale per-description counter on month change
                conn.execute(
                    "UPDATE regenerations SET count = 0, period_month = ?3
                     WHERE email = ?1 AND description_id = ?2 AND period_month <> ?3",
                    params![email, description_id, month],
                )?;
                conn.execute(
                    r#"
                    INSERT INTO regenerations (email, description_id, count, period_month)
                    VALUES (?1, ?2, 0, ?3)
                    ON CONFLICT(email, description_id) DO NOTHING
                    "#,
                    params![email, description_id, month],
                )?;
                let changed = conn.execute(
                    "UPDATE regenerations SET count = count + 1
                     WHERE email = ?1 AND description_id = ?2 AND count < ?3",
                    params![email, description_id, cap],
                )?;
                if changed == 1 {
                    let used: i64 = conn.query_row(
                        "SELECT count FROM regenerations WHERE email = ?1 AND description_id = ?2",
                        params![email, description_id],
                        |row| row.get(0),
                    )?;
                    Ok(Decision::Allowed {
                        remaining: (cap - used).max(0) as u64,
                    })
                } else {
                    Ok(Decision::Denied {
                        reason: format!(
                            "Regeneration limit of {} reached for this description.",
                            limits.regenerations_per_description
                        ),
                    })
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("ledger lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_plan_limits_table() {
        assert_eq!(PlanLimits::for_plan("Pro").monthly_generations, 500);
        assert_eq!(PlanLimits::for_plan("starter").regenerations_per_description, 3);
        // Unknown plans get the free tier
        assert_eq!(PlanLimits::for_plan("enterprise").monthly_generations, 10);
        assert_eq!(PlanLimits::for_plan("").monthly_generations, 10);
    }

    #[test]
    fn test_generation_cap_enforced_atomically() {
        let ledger = Ledger::open_in_memory().unwrap();
        let email = "maker@example.com";
        // Free tier: 10 generations per month
        for i in 0..10u64 {
            let decision = ledger.can_perform(email, &LedgerAction::Generation).unwrap();
            match decision {
                Decision::Allowed { remaining } => assert_eq!(remaining, 9 - i),
                other => panic!("attempt {} unexpectedly denied: {:?}", i, other),
            }
        }
        // The 11th is denied
        let decision = ledger.can_perform(email, &LedgerAction::Generation).unwrap();
        assert!(!decision.is_allowed());
    }

    #[test]
    fn test_plan_upgrade_raises_cap() {
        let ledger = Ledger::open_in_memory().unwrap();
        let email = "maker@example.com";
        ledger
            .upsert_subscription(email, "pro", "active", Some("sub_1"))
            .unwrap();

        let decision = ledger.can_perform(email, &LedgerAction::Generation).unwrap();
        assert_eq!(decision, Decision::Allowed { remaining: 499 });

        let user = ledger.get_user(email).unwrap().unwrap();
        assert_eq!(user.plan, "pro");
        assert_eq!(user.generations_used, 1);
        assert_eq!(user.subscription_id.as_deref(), Some("sub_1"));
    }

    #[test]
    fn test_regeneration_caps_apply_per_description() {
        let ledger = Ledger::open_in_memory().unwrap();
        let email = "maker@example.com";
        let action_a = LedgerAction::Regeneration {
            description_id: "item_a".to_string(),
        };
        let action_b = LedgerAction::Regeneration {
            description_id: "item_b".to_string(),
        };

        // Free tier: 2 regenerations per description
        assert!(ledger.can_perform(email, &action_a).unwrap().is_allowed());
        assert!(ledger.can_perform(email, &action_a).unwrap().is_allowed());
        assert!(!ledger.can_perform(email, &action_a).unwrap().is_allowed());
        // A different description has its own counter
        assert!(ledger.can_perform(email, &action_b).unwrap().is_allowed());
    }

    #[test]
    fn test_counters_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.sqlite");
        let email = "maker@example.com";

        {
            let ledger = Ledger::open(&path).unwrap();
            for _ in 0..10 {
                assert!(ledger
                    .can_perform(email, &LedgerAction::Generation)
                    .unwrap()
                    .is_allowed());
            }
        }

        let reopened = Ledger::open(&path).unwrap();
        assert!(!reopened
            .can_perform(email, &LedgerAction::Generation)
            .unwrap()
            .is_allowed());
        assert_eq!(reopened.get_user(email).unwrap().unwrap().generations_used, 10);
    }

    #[test]
    fn test_monthly_rollover_resets_counters() {
        let ledger = Ledger::open_in_memory().unwrap();
        let email = "maker@example.com";
        for _ in 0..10 {
            ledger.can_perform(email, &LedgerAction::Generation).unwrap();
        }
        assert!(!ledger
            .can_perform(email, &LedgerAction::Generation)
            .unwrap()
            .is_allowed());

        // Pretend the row was written last month
        {
            let conn = ledger.lock();
            conn.execute(
                "UPDATE users SET period_month = '2000-01' WHERE email = ?1",
                params![email],
            )
            .unwrap();
        }

        let decision = ledger.can_perform(email, &LedgerAction::Generation).unwrap();
        assert_eq!(decision, Decision::Allowed { remaining: 9 });
    }

    #[test]
    fn test_cancel_flips_status_only() {
        let ledger = Ledger::open_in_memory().unwrap();
        let email = "maker@example.com";
        ledger
            .upsert_subscription(email, "pro", "active", Some("sub_1"))
            .unwrap();
        ledger.cancel_subscription(email).unwrap();

        let user = ledger.get_user(email).unwrap().unwrap();
        assert_eq!(user.status, "cancelled");
        assert_eq!(user.plan, "pro");

        // Cancelling an unknown user is a warning, not an error
        ledger.cancel_subscription("ghost@example.com").unwrap();
    }

    #[test]
    fn test_order_created_registers_user() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.record_order("buyer@example.com", "order_1").unwrap();
        let user = ledger.get_user("buyer@example.com").unwrap().unwrap();
        assert_eq!(user.plan, "free");
        assert!(ledger.get_user("nobody@example.com").unwrap().is_none());
    }
}
