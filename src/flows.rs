//! Flow facade
//!
//! The operations the UI pages compose, behind one `Engine`: submit product
//! batches and export results, read and mutate billing state through the
//! store, run the checkout security flow, queue mutations while offline and
//! replay them on reconnect, and react to real-time push messages. Errors
//! surface as `Result<T, String>` with the message already user-readable;
//! callers decide per-screen handling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::api::types::{
    AuditLogEntry, BatchResponse, CheckoutRequest, CheckoutSession, Paginated,
    PaymentTransaction, PortalSession, ProductInput, RateLimitStatus, SubscriptionPlan,
    UserProfile,
};
use crate::api::{audit, billing, generation, ApiClient};
use crate::auth::SessionManager;
use crate::config::AppConfig;
use crate::csvio;
use crate::offline::{
    ActionDispatcher, DrainReport, OfflineQueue, PendingAction, PendingActionKind,
};
use crate::realtime::{MessageHandler, RealtimeChannel, RealtimeMessage, Transport};
use crate::security::{
    checkout_checklist, ChecklistItem, ConfirmationTokens, FraudWarning, RedirectValidator,
    SecurityEvent, SecurityEventKind, SecurityLog, SuspiciousActivityMonitor,
};
use crate::store::{BillingStore, StoreView};

/// Outcome of a subscription mutation: applied immediately, or queued for
/// replay because the engine is offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    Queued,
}

/// Everything the checkout confirmation screen needs: the validated request,
/// the security checklist, any fraud warning, and the single-use token the
/// user's confirmation must echo back.
#[derive(Debug, Clone)]
pub struct CheckoutPreview {
    pub request: CheckoutRequest,
    pub checklist: Vec<ChecklistItem>,
    pub fraud_warning: Option<FraudWarning>,
    pub token: String,
    amount: f64,
}

pub struct Engine {
    config: AppConfig,
    session: Arc<SessionManager>,
    client: ApiClient,
    store: Arc<BillingStore>,
    queue: Arc<OfflineQueue>,
    online: AtomicBool,
    confirmations: ConfirmationTokens,
    fraud: SuspiciousActivityMonitor,
    redirects: RedirectValidator,
    security_log: SecurityLog,
}

impl Engine {
    pub fn new(config: AppConfig) -> Self {
        let session = Arc::new(SessionManager::new(config.identity.clone()));
        let client = ApiClient::new(&config, session.clone());
        let store = Arc::new(BillingStore::new(Some(config.data_dir.clone())));
        let queue = Arc::new(OfflineQueue::new(config.data_dir.clone()));
        let redirects = RedirectValidator::new(
            &config.allowed_redirect_origins,
            config.environment.is_production(),
        );
        Self {
            config,
            session,
            client,
            store,
            queue,
            online: AtomicBool::new(true),
            confirmations: ConfirmationTokens::new(),
            fraud: SuspiciousActivityMonitor::default(),
            redirects,
            security_log: SecurityLog::new(),
        }
    }

    /// Test constructor: mock API, no persistence.
    #[cfg(test)]
    pub(crate) fn mock(dir: std::path::PathBuf) -> Self {
        let config = AppConfig::from_lookup(|key| match key {
            "DESCRIPTA_USE_MOCK_API" => Some("1".to_string()),
            "DESCRIPTA_DATA_DIR" => Some(dir.display().to_string()),
            _ => None,
        });
        Self::new(config)
    }

    /// Restore persisted state on startup: the stored session, the billing
    /// snapshot, and the offline queue. Queue entries carried by the
    /// snapshot re-seed the queue when its own file was lost.
    pub fn restore(&self) -> Option<UserProfile> {
        let user = self.session.restore();
        let snapshot_pending = self.store.restore();

        let loaded = match self.queue.load() {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "failed to load offline queue");
                0
            }
        };
        if loaded == 0 && !snapshot_pending.is_empty() {
            info!(
                count = snapshot_pending.len(),
                "re-seeding offline queue from billing snapshot"
            );
            for action in snapshot_pending {
                if let Err(e) = self.queue.enqueue(action.kind, action.payload) {
                    warn!(error = %e, "failed to re-seed queued action");
                }
            }
        }
        user
    }

    /// Persist the billing snapshot together with the current queue entries.
    pub fn persist(&self) -> Result<(), String> {
        self.store
            .persist(self.queue.entries())
            .map_err(|e| e.to_string())
    }

    // --- identity ---

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, String> {
        let user = self
            .session
            .sign_in(email, password)
            .await
            .map_err(|e| e.to_string())?;
        self.store.refresh_all(&self.client).await;
        Ok(user)
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<UserProfile, String> {
        let user = self
            .session
            .sign_up(email, password, name)
            .await
            .map_err(|e| e.to_string())?;
        self.store.refresh_all(&self.client).await;
        Ok(user)
    }

    /// Sign out and tear down local state: store slices, snapshot, queue.
    pub async fn sign_out(&self) {
        self.session.sign_out().await;
        self.store.reset();
        if let Err(e) = self.queue.clear() {
            warn!(error = %e, "failed to clear offline queue on sign-out");
        }
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.session.current_user()
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    // --- generation ---

    /// Submit a product batch. On success the local balance is decremented
    /// optimistically, one credit per generated item; the next refresh or
    /// push message corrects any drift.
    pub async fn submit_products(&self, inputs: &[ProductInput]) -> Result<BatchResponse, String> {
        if !self.is_online() && !self.client.mock_mode() {
            return Err("You are offline. Reconnect to generate descriptions.".to_string());
        }
        let batch = generation::generate_batch(&self.client, inputs)
            .await
            .map_err(|e| e.to_string())?;
        if !self.store.consume_credits(batch.items.len() as u64) {
            debug!("local balance unknown or short; skipping optimistic decrement");
        }
        Ok(batch)
    }

    /// Submit a raw CSV upload for generation.
    pub async fn submit_csv(&self, csv: String) -> Result<BatchResponse, String> {
        if !self.is_online() && !self.client.mock_mode() {
            return Err("You are offline. Reconnect to generate descriptions.".to_string());
        }
        let batch = generation::generate_batch_csv(&self.client, csv)
            .await
            .map_err(|e| e.to_string())?;
        if !self.store.consume_credits(batch.items.len() as u64) {
            debug!("local balance unknown or short; skipping optimistic decrement");
        }
        Ok(batch)
    }

    pub async fn fetch_batch(&self, batch_id: &str) -> Result<BatchResponse, String> {
        generation::fetch_batch(&self.client, batch_id)
            .await
            .map_err(|e| e.to_string())
    }

    pub async fn download_batch(&self, batch_id: &str) -> Result<String, String> {
        generation::download_batch(&self.client, batch_id)
            .await
            .map_err(|e| e.to_string())
    }

    /// Parse a CSV upload into product inputs locally (preview before
    /// submission). Rows missing a required field are dropped by the parser.
    pub fn parse_csv(&self, input: &str) -> Result<Vec<ProductInput>, String> {
        csvio::parse_products(input).map_err(|e| e.to_string())
    }

    /// Serialize edited results back to CSV for export.
    pub fn export_csv(&self, items: &[crate::api::types::GeneratedItem]) -> String {
        csvio::export_items(items)
    }

    // --- billing reads ---

    pub fn billing(&self) -> StoreView {
        self.store.view()
    }

    pub fn store(&self) -> &Arc<BillingStore> {
        &self.store
    }

    pub async fn refresh_billing(&self) {
        self.store.refresh_all(&self.client).await;
    }

    pub async fn refresh_history(&self, page: u32) {
        self.store.refresh_history(&self.client, page).await;
    }

    // --- checkout ---

    /// Run the client-side checkout security flow: payload validation,
    /// redirect allow-listing, fraud heuristic, checklist, and a single-use
    /// confirmation token. Validation failures land in the security log.
    pub fn prepare_checkout(
        &self,
        plan: &SubscriptionPlan,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutPreview, String> {
        let Some(user) = self.session.current_user() else {
            return Err("Sign in to purchase a plan.".to_string());
        };

        let request = CheckoutRequest {
            plan_id: plan.id.clone(),
            variant_id: plan.lemon_squeezy_variant_id.clone(),
            email: user.email.clone(),
            success_url: success_url.to_string(),
            cancel_url: cancel_url.to_string(),
        };

        if let Err(e) = crate::security::validate_checkout(&request) {
            self.security_log
                .record(SecurityEventKind::PayloadRejected, e.to_string());
            return Err(e.to_string());
        }
        if let Err(e) = crate::security::validate_amount(plan.price) {
            self.security_log
                .record(SecurityEventKind::PayloadRejected, e.to_string());
            return Err(e.to_string());
        }
        for target in [success_url, cancel_url] {
            if let Err(e) = self.redirects.validate(target) {
                self.security_log
                    .record(SecurityEventKind::RedirectRejected, e.to_string());
                return Err(e.to_string());
            }
        }

        let view = self.store.view();
        let first_purchase = match view.history.value() {
            Some(page) => page.total == 0,
            None => view.subscription.value().map_or(true, |s| s.is_none()),
        };
        let fraud_warning = self.fraud.assess(&user.id, plan.price, first_purchase);
        if fraud_warning.is_some() {
            self.security_log.record(
                SecurityEventKind::SuspiciousActivity,
                format!("checkout attempt on plan {}", plan.id),
            );
        }

        let checklist = checkout_checklist(
            Some(plan),
            view.subscription.value().and_then(|s| s.as_ref()),
            Some(&user),
            fraud_warning,
        );
        let token = self.confirmations.issue(&plan.id, &user.id, plan.price);

        Ok(CheckoutPreview {
            request,
            checklist,
            fraud_warning,
            token,
            amount: plan.price,
        })
    }

    /// Consume the confirmation token and create the provider-hosted
    /// checkout session. A reused or expired token fails here.
    pub async fn confirm_checkout(
        &self,
        preview: &CheckoutPreview,
        token: &str,
    ) -> Result<CheckoutSession, String> {
        let Some(user) = self.session.current_user() else {
            return Err("Sign in to purchase a plan.".to_string());
        };
        if let Err(e) =
            self.confirmations
                .consume(&preview.request.plan_id, &user.id, preview.amount, token)
        {
            self.security_log
                .record(SecurityEventKind::ConfirmationFailed, e.to_string());
            return Err(e.to_string());
        }
        billing::create_checkout(&self.client, &preview.request)
            .await
            .map_err(|e| e.to_string())
    }

    pub async fn open_portal(&self) -> Result<PortalSession, String> {
        billing::create_portal(&self.client)
            .await
            .map_err(|e| e.to_string())
    }

    // --- subscription mutations ---

    pub async fn cancel_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<MutationOutcome, String> {
        if !self.is_online() {
            self.queue
                .enqueue(
                    PendingActionKind::CancelSubscription,
                    json!({ "subscription_id": subscription_id }),
                )
                .map_err(|e| e.to_string())?;
            return Ok(MutationOutcome::Queued);
        }
        let subscription = billing::cancel_subscription(&self.client, subscription_id)
            .await
            .map_err(|e| e.to_string())?;
        self.store.apply_subscription(subscription);
        Ok(MutationOutcome::Applied)
    }

    pub async fn reactivate_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<MutationOutcome, String> {
        if !self.is_online() {
            self.queue
                .enqueue(
                    PendingActionKind::ReactivateSubscription,
                    json!({ "subscription_id": subscription_id }),
                )
                .map_err(|e| e.to_string())?;
            return Ok(MutationOutcome::Queued);
        }
        let subscription = billing::reactivate_subscription(&self.client, subscription_id)
            .await
            .map_err(|e| e.to_string())?;
        self.store.apply_subscription(subscription);
        Ok(MutationOutcome::Applied)
    }

    pub async fn update_subscription(
        &self,
        subscription_id: &str,
        variant_id: &str,
    ) -> Result<MutationOutcome, String> {
        if !self.is_online() {
            self.queue
                .enqueue(
                    PendingActionKind::UpdateSubscription,
                    json!({ "subscription_id": subscription_id, "variant_id": variant_id }),
                )
                .map_err(|e| e.to_string())?;
            return Ok(MutationOutcome::Queued);
        }
        let subscription =
            billing::update_subscription(&self.client, subscription_id, variant_id)
                .await
                .map_err(|e| e.to_string())?;
        self.store.apply_subscription(subscription);
        Ok(MutationOutcome::Applied)
    }

    // --- connectivity ---

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Record a connectivity change. Going online drains the offline queue
    /// and refreshes billing state; going offline just flips the flag so
    /// mutations start queueing.
    pub async fn set_online(&self, online: bool) -> Option<DrainReport> {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if !online || was_online {
            return None;
        }

        info!("back online; replaying queued actions");
        let dispatcher = EngineDispatcher {
            client: &self.client,
            store: &self.store,
        };
        let report = match self.queue.drain(&dispatcher).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "offline queue drain failed");
                DrainReport::default()
            }
        };
        self.store.refresh_all(&self.client).await;
        Some(report)
    }

    /// Queue a credit consumption recorded while offline; the replay is a
    /// balance re-fetch that reconciles local drift.
    pub fn queue_credit_consumption(&self, amount: u64) -> Result<(), String> {
        self.queue
            .enqueue(PendingActionKind::ConsumeCredits, json!({ "amount": amount }))
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn pending_actions(&self) -> Vec<PendingAction> {
        self.queue.entries()
    }

    // --- real-time ---

    /// Build the real-time channel when a URL is configured. The caller
    /// spawns `run()` on sign-in and on connectivity triggers.
    pub fn realtime_channel(
        self: &Arc<Self>,
        transport: Arc<dyn Transport>,
    ) -> Option<RealtimeChannel> {
        let url = self.config.realtime_url.clone()?;
        Some(RealtimeChannel::new(
            url,
            transport,
            self.clone() as Arc<dyn MessageHandler>,
        ))
    }

    // --- audit / security introspection ---

    pub async fn fetch_audit_logs(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Paginated<AuditLogEntry>, String> {
        audit::fetch_audit_logs(&self.client, page, per_page)
            .await
            .map_err(|e| e.to_string())
    }

    pub async fn fetch_rate_limit_status(
        &self,
        endpoint: &str,
    ) -> Result<RateLimitStatus, String> {
        audit::fetch_rate_limit_status(&self.client, endpoint)
            .await
            .map_err(|e| e.to_string())
    }

    pub async fn fetch_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<PaymentTransaction, String> {
        audit::fetch_transaction(&self.client, transaction_id)
            .await
            .map_err(|e| e.to_string())
    }

    /// Recent client-side security events, newest last.
    pub fn security_events(&self, limit: usize) -> Vec<SecurityEvent> {
        self.security_log.recent(limit)
    }
}

/// Push messages dispatch targeted store work: a credit update patches the
/// balance in place, subscription/usage updates re-fetch their slice, a
/// completed payment refreshes everything.
#[async_trait]
impl MessageHandler for Engine {
    async fn handle(&self, message: RealtimeMessage) {
        match message {
            RealtimeMessage::CreditUpdate { balance } => self.store.apply_credit_patch(balance),
            RealtimeMessage::SubscriptionUpdated => {
                self.store.refresh_subscription(&self.client).await
            }
            RealtimeMessage::UsageUpdated => self.store.refresh_usage(&self.client).await,
            RealtimeMessage::PaymentCompleted => self.store.refresh_all(&self.client).await,
            RealtimeMessage::Pong => {}
        }
    }
}

/// Replays queued actions against their API calls during a drain.
struct EngineDispatcher<'a> {
    client: &'a ApiClient,
    store: &'a BillingStore,
}

#[async_trait]
impl ActionDispatcher for EngineDispatcher<'_> {
    async fn dispatch(&self, action: &PendingAction) -> Result<(), String> {
        match action.kind {
            // Consumption and purchases already happened (or will be billed)
            // server-side; replaying means reconciling the local balance.
            PendingActionKind::ConsumeCredits | PendingActionKind::PurchaseCredits => {
                self.store.refresh_credits(self.client).await;
                Ok(())
            }
            PendingActionKind::CancelSubscription => {
                let id = payload_str(action, "subscription_id")?;
                let subscription = billing::cancel_subscription(self.client, id)
                    .await
                    .map_err(|e| e.to_string())?;
                self.store.apply_subscription(subscription);
                Ok(())
            }
            PendingActionKind::ReactivateSubscription => {
                let id = payload_str(action, "subscription_id")?;
                let subscription = billing::reactivate_subscription(self.client, id)
                    .await
                    .map_err(|e| e.to_string())?;
                self.store.apply_subscription(subscription);
                Ok(())
            }
            PendingActionKind::UpdateSubscription => {
                let id = payload_str(action, "subscription_id")?;
                let variant = payload_str(action, "variant_id")?;
                let subscription = billing::update_subscription(self.client, id, variant)
                    .await
                    .map_err(|e| e.to_string())?;
                self.store.apply_subscription(subscription);
                Ok(())
            }
        }
    }
}

fn payload_str<'a>(action: &'a PendingAction, key: &str) -> Result<&'a str, String> {
    action.payload[key]
        .as_str()
        .ok_or_else(|| format!("queued {} action is missing {}", action.kind, key))
}
