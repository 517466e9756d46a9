//! Global billing state store
//!
//! A single explicit state-machine struct holding the mirrored billing data:
//! one [`Slice`] per domain (plans, subscription, credits, usage, history),
//! UI flags, and a watch channel that bumps a version on every mutation so
//! observers can re-render. All writes go through the action methods here;
//! callers dispatch actions and read snapshots.
//!
//! Concurrency rules: slice fetches take a generation token under the lock,
//! await the network without it, and settle under the lock again — a stale
//! settlement is dropped by the fence. `refresh_all` runs every slice fetch
//! concurrently and each settles independently, so one failing fetch never
//! blocks the rest.

mod persist;
mod resource;

pub use persist::{snapshot_path, PersistError, StoreSnapshot};
pub use resource::{FetchToken, Resource, Slice};

use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::types::{
    CreditBalance, Paginated, PaymentTransaction, SubscriptionPlan, UsageStats, UserSubscription,
};
use crate::api::{billing, ApiClient};
use crate::offline::PendingAction;

/// Page size used for the history slice.
pub const HISTORY_PER_PAGE: u32 = 20;

/// Mutable store state behind the lock.
#[derive(Debug, Default)]
struct StoreState {
    plans: Slice<Vec<SubscriptionPlan>>,
    /// `Ready(None)` means the fetch succeeded and the user has no
    /// subscription yet.
    subscription: Slice<Option<UserSubscription>>,
    credits: Slice<CreditBalance>,
    usage: Slice<UsageStats>,
    history: Slice<Paginated<PaymentTransaction>>,
    show_upgrade_prompt: bool,
    show_credit_warning: bool,
    version: u64,
}

/// Read-only view of the store for rendering.
#[derive(Debug, Clone)]
pub struct StoreView {
    pub plans: Resource<Vec<SubscriptionPlan>>,
    pub subscription: Resource<Option<UserSubscription>>,
    pub credits: Resource<CreditBalance>,
    pub usage: Resource<UsageStats>,
    pub history: Resource<Paginated<PaymentTransaction>>,
    pub show_upgrade_prompt: bool,
    pub show_credit_warning: bool,
    pub version: u64,
}

pub struct BillingStore {
    state: RwLock<StoreState>,
    notify: watch::Sender<u64>,
    /// Data directory for the persisted snapshot; `None` disables persistence
    /// (tests).
    data_dir: Option<PathBuf>,
}

impl BillingStore {
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            state: RwLock::new(StoreState::default()),
            notify,
            data_dir,
        }
    }

    /// Load the persisted snapshot, if any, and install its values.
    /// Returns the pending actions it carried so the caller can seed the
    /// offline queue when the queue's own file was lost.
    pub fn restore(&self) -> Vec<PendingAction> {
        let Some(dir) = &self.data_dir else {
            return Vec::new();
        };
        let Some(snapshot) = persist::load(dir) else {
            return Vec::new();
        };
        info!("restoring billing snapshot");
        let pending = snapshot.pending_actions.clone();
        self.hydrate(snapshot);
        pending
    }

    /// Install snapshot values as `Ready` slices.
    fn hydrate(&self, snapshot: StoreSnapshot) {
        {
            let mut state = self.write_state();
            if let Some(plans) = snapshot.plans {
                state.plans.set(plans);
            }
            if let Some(subscription) = snapshot.subscription {
                state.subscription.set(Some(subscription));
            }
            if let Some(credits) = snapshot.credits {
                state.credits.set(credits);
            }
            if let Some(usage) = snapshot.usage {
                state.usage.set(usage);
            }
            if let Some(history) = snapshot.history {
                state.history.set(history);
            }
            state.show_upgrade_prompt = snapshot.show_upgrade_prompt;
            state.show_credit_warning = snapshot.show_credit_warning;
        }
        self.bump();
    }

    /// Persist the non-transient fields plus the queue entries supplied by
    /// the caller.
    pub fn persist(&self, pending_actions: Vec<PendingAction>) -> Result<(), PersistError> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        let snapshot = {
            let state = self.read_state();
            StoreSnapshot {
                plans: state.plans.value().cloned(),
                subscription: state.subscription.value().cloned().flatten(),
                credits: state.credits.value().cloned(),
                usage: state.usage.value().cloned(),
                history: state.history.value().cloned(),
                show_upgrade_prompt: state.show_upgrade_prompt,
                show_credit_warning: state.show_credit_warning,
                pending_actions,
            }
        };
        persist::save(dir, &snapshot)
    }

    /// Clear everything (sign-out): slices back to `Idle`, flags off,
    /// snapshot file removed.
    pub fn reset(&self) {
        {
            let mut state = self.write_state();
            state.plans.reset();
            state.subscription.reset();
            state.credits.reset();
            state.usage.reset();
            state.history.reset();
            state.show_upgrade_prompt = false;
            state.show_credit_warning = false;
        }
        if let Some(dir) = &self.data_dir {
            persist::clear(dir);
        }
        self.bump();
        info!("billing store reset");
    }

    /// Current rendering snapshot.
    pub fn view(&self) -> StoreView {
        let state = self.read_state();
        StoreView {
            plans: state.plans.resource().clone(),
            subscription: state.subscription.resource().clone(),
            credits: state.credits.resource().clone(),
            usage: state.usage.resource().clone(),
            history: state.history.resource().clone(),
            show_upgrade_prompt: state.show_upgrade_prompt,
            show_credit_warning: state.show_credit_warning,
            version: state.version,
        }
    }

    /// Watch store versions; the value bumps on every mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    // --- slice refresh actions ---

    pub async fn refresh_plans(&self, client: &ApiClient) {
        let token = self.write_state().plans.begin();
        self.bump();
        let result = billing::fetch_plans(client).await;
        self.settle(|state| match result {
            Ok(plans) => state.plans.settle_ok(token, plans),
            Err(e) => state.plans.settle_err(token, e.to_string()),
        });
    }

    pub async fn refresh_subscription(&self, client: &ApiClient) {
        let token = self.write_state().subscription.begin();
        self.bump();
        let result = billing::fetch_subscription(client).await;
        self.settle(|state| {
            let settled = match result {
                Ok(subscription) => state.subscription.settle_ok(token, subscription),
                Err(e) => state.subscription.settle_err(token, e.to_string()),
            };
            if settled {
                state.show_upgrade_prompt = match state.subscription.value() {
                    Some(Some(subscription)) => !subscription.status.is_active(),
                    Some(None) => true,
                    None => state.show_upgrade_prompt,
                };
            }
            settled
        });
    }

    pub async fn refresh_credits(&self, client: &ApiClient) {
        let token = self.write_state().credits.begin();
        self.bump();
        let result = billing::fetch_credits(client).await;
        self.settle(|state| {
            let settled = match result {
                Ok(balance) => state.credits.settle_ok(token, balance),
                Err(e) => state.credits.settle_err(token, e.to_string()),
            };
            if settled {
                state.derive_credit_warning();
            }
            settled
        });
    }

    pub async fn refresh_usage(&self, client: &ApiClient) {
        let token = self.write_state().usage.begin();
        self.bump();
        let result = billing::fetch_usage(client).await;
        self.settle(|state| match result {
            Ok(usage) => state.usage.settle_ok(token, usage),
            Err(e) => state.usage.settle_err(token, e.to_string()),
        });
    }

    pub async fn refresh_history(&self, client: &ApiClient, page: u32) {
        let token = self.write_state().history.begin();
        self.bump();
        let result = billing::fetch_payment_history(client, page, HISTORY_PER_PAGE).await;
        self.settle(|state| match result {
            Ok(history) => state.history.settle_ok(token, history),
            Err(e) => state.history.settle_err(token, e.to_string()),
        });
    }

    /// Refresh every slice concurrently. Settle-all semantics: each fetch
    /// records success or failure on its own slice only.
    pub async fn refresh_all(&self, client: &ApiClient) {
        futures::join!(
            self.refresh_plans(client),
            self.refresh_subscription(client),
            self.refresh_credits(client),
            self.refresh_usage(client),
            self.refresh_history(client, 1),
        );
        debug!("bulk billing refresh settled");
    }

    // --- local mutations ---

    /// Optimistically consume `amount` credits.
    ///
    /// Returns `true` and decrements the local balance when the pre-decrement
    /// snapshot covers the amount; returns `false` and leaves the balance
    /// untouched otherwise (including when the balance was never fetched).
    /// The accounting invariant `used + current == total` is preserved. There
    /// is no rollback on later server disagreement; the next refresh or push
    /// message corrects any drift.
    pub fn consume_credits(&self, amount: u64) -> bool {
        let consumed = {
            let mut state = self.write_state();
            let allowed = state
                .credits
                .value()
                .is_some_and(|balance| balance.current_credits >= amount);
            if allowed {
                state.credits.update(|balance| {
                    balance.current_credits -= amount;
                    balance.used_credits += amount;
                });
                state.derive_credit_warning();
            }
            allowed
        };
        if consumed {
            self.bump();
            debug!(amount, "consumed credits optimistically");
        }
        consumed
    }

    /// Install a pushed balance without a re-fetch (credit-update message).
    pub fn apply_credit_patch(&self, balance: CreditBalance) {
        if !balance.is_consistent() {
            warn!(
                current = balance.current_credits,
                used = balance.used_credits,
                total = balance.total_credits,
                "pushed balance violates accounting invariant; applying anyway"
            );
        }
        {
            let mut state = self.write_state();
            state.credits.set(balance);
            state.derive_credit_warning();
        }
        self.bump();
    }

    /// Install a subscription returned by a mutation call.
    pub fn apply_subscription(&self, subscription: UserSubscription) {
        {
            let mut state = self.write_state();
            state.show_upgrade_prompt = !subscription.status.is_active();
            state.subscription.set(Some(subscription));
        }
        self.bump();
    }

    // --- UI flags ---

    pub fn set_upgrade_prompt(&self, show: bool) {
        self.write_state().show_upgrade_prompt = show;
        self.bump();
    }

    pub fn set_credit_warning(&self, show: bool) {
        self.write_state().show_credit_warning = show;
        self.bump();
    }

    // --- internals ---

    fn settle(&self, f: impl FnOnce(&mut StoreState) -> bool) {
        let settled = f(&mut self.write_state());
        if settled {
            self.bump();
        } else {
            debug!("dropped stale slice settlement");
        }
    }

    fn bump(&self) {
        let version = {
            let mut state = self.write_state();
            state.version += 1;
            state.version
        };
        let _ = self.notify.send(version);
    }

    fn read_state(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(|poisoned| {
            warn!("billing store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(|poisoned| {
            warn!("billing store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl StoreState {
    fn derive_credit_warning(&mut self) {
        if let Some(balance) = self.credits.value() {
            self.show_credit_warning = balance.is_low();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::CreditBalance;
    use crate::auth::SessionManager;
    use crate::config::AppConfig;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn mock_client() -> ApiClient {
        let config = AppConfig::from_lookup(|key| match key {
            "DESCRIPTA_USE_MOCK_API" => Some("1".to_string()),
            _ => None,
        });
        ApiClient::new(&config, Arc::new(SessionManager::new(None)))
    }

    fn store_with_balance(current: u64, used: u64, total: u64) -> BillingStore {
        let store = BillingStore::new(None);
        store.apply_credit_patch(CreditBalance {
            current_credits: current,
            used_credits: used,
            total_credits: total,
            reset_date: None,
        });
        store
    }

    #[test]
    fn test_consume_credits_happy_path() {
        let store = store_with_balance(10, 90, 100);
        assert!(store.consume_credits(3));

        let view = store.view();
        let balance = view.credits.value().unwrap();
        assert_eq!(balance.current_credits, 7);
        assert_eq!(balance.used_credits, 93);
        assert!(balance.is_consistent());
    }

    #[test]
    fn test_consume_credits_insufficient_balance_unchanged() {
        let store = store_with_balance(2, 98, 100);
        assert!(!store.consume_credits(3));

        let balance = store.view().credits.value().cloned().unwrap();
        assert_eq!(balance.current_credits, 2);
        assert_eq!(balance.used_credits, 98);
        assert!(balance.is_consistent());

        // Consuming exactly the remainder is allowed
        assert!(store.consume_credits(2));
        assert_eq!(store.view().credits.value().unwrap().current_credits, 0);
    }

    #[test]
    fn test_consume_credits_without_balance_fails() {
        let store = BillingStore::new(None);
        assert!(!store.consume_credits(1));
    }

    #[test]
    fn test_credit_warning_derives_from_low_balance() {
        let store = store_with_balance(60, 440, 500);
        assert!(!store.view().show_credit_warning);

        // Dropping to 10% of the grant raises the warning
        assert!(store.consume_credits(10));
        assert!(store.view().show_credit_warning);
    }

    #[tokio::test]
    async fn test_refresh_all_settles_every_slice() {
        let store = BillingStore::new(None);
        let client = mock_client();
        store.refresh_all(&client).await;

        let view = store.view();
        assert!(view.plans.is_ready());
        assert!(view.subscription.is_ready());
        assert!(view.credits.is_ready());
        assert!(view.usage.is_ready());
        assert!(view.history.is_ready());
        // Mock subscription is active, so no upgrade prompt
        assert!(!view.show_upgrade_prompt);
    }

    #[tokio::test]
    async fn test_version_bumps_notify_watchers() {
        let store = BillingStore::new(None);
        let mut rx = store.subscribe();
        let before = *rx.borrow_and_update();

        store.refresh_credits(&mock_client()).await;
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update() > before);
    }

    #[test]
    fn test_optimistic_decrement_fences_in_flight_fetch() {
        let store = store_with_balance(10, 0, 10);

        // Simulate a fetch issued before the local mutation
        let token = store.write_state().credits.begin();
        assert!(store.consume_credits(4));

        // The stale settlement must not clobber the optimistic balance
        let stale = CreditBalance {
            current_credits: 10,
            used_credits: 0,
            total_credits: 10,
            reset_date: None,
        };
        store.settle(|state| state.credits.settle_ok(token, stale));
        assert_eq!(store.view().credits.value().unwrap().current_credits, 6);
    }

    #[test]
    fn test_persist_and_restore_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = BillingStore::new(Some(dir.path().to_path_buf()));
        store.apply_credit_patch(CreditBalance {
            current_credits: 5,
            used_credits: 95,
            total_credits: 100,
            reset_date: None,
        });
        store.persist(Vec::new()).unwrap();

        let restored = BillingStore::new(Some(dir.path().to_path_buf()));
        let pending = restored.restore();
        assert!(pending.is_empty());
        let view = restored.view();
        assert_eq!(view.credits.value().unwrap().current_credits, 5);
        assert!(view.show_credit_warning);
    }

    #[test]
    fn test_reset_clears_state_and_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = BillingStore::new(Some(dir.path().to_path_buf()));
        store.apply_credit_patch(CreditBalance {
            current_credits: 1,
            used_credits: 0,
            total_credits: 1,
            reset_date: None,
        });
        store.persist(Vec::new()).unwrap();
        store.reset();

        assert!(store.view().credits.value().is_none());
        let fresh = BillingStore::new(Some(dir.path().to_path_buf()));
        assert!(fresh.restore().is_empty());
        assert!(fresh.view().credits.value().is_none());
    }
}
