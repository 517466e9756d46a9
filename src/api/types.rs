//! Domain records mirrored from the backend
//!
//! These are plain serde records; the backend (and behind it the payment
//! provider) owns their canonical identity. The client never mints ids for
//! any of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One product row, entered manually or parsed from a CSV upload.
/// Ephemeral: held in page state until submitted as part of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInput {
    pub product_name: String,
    pub category: String,
    pub features: String,
    pub audience: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
}

/// A generated description together with the input fields it came from.
/// `description` is locally editable until the batch is exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedItem {
    pub id: String,
    pub product_name: String,
    pub category: String,
    pub features: String,
    pub audience: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
}

/// One generation request. `batch_id` is the only durable handle a client
/// can use to re-fetch results later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub batch_id: String,
    pub items: Vec<GeneratedItem>,
}

/// Billing interval of a subscription plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanInterval {
    Monthly,
    Yearly,
}

/// Catalog entry owned by the payment provider. Read-only client-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub currency: String,
    pub interval: PlanInterval,
    /// Monthly credit grant; see [`SubscriptionPlan::plan_credits`] for the
    /// per-term amount.
    pub credits: u64,
    pub features: Vec<String>,
    pub lemon_squeezy_variant_id: String,
}

impl SubscriptionPlan {
    /// Credits granted over one billing term: the monthly grant for monthly
    /// plans, twelve months' worth for yearly plans.
    pub fn plan_credits(&self) -> u64 {
        match self.interval {
            PlanInterval::Monthly => self.credits,
            PlanInterval::Yearly => self.credits * 12,
        }
    }
}

/// Provider-side subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    PastDue,
    Unpaid,
}

impl SubscriptionStatus {
    pub fn is_active(self) -> bool {
        self == SubscriptionStatus::Active
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SubscriptionStatus::Active => "Active",
            SubscriptionStatus::Cancelled => "Cancelled",
            SubscriptionStatus::PastDue => "Past due",
            SubscriptionStatus::Unpaid => "Unpaid",
        };
        write!(f, "{}", label)
    }
}

/// Cached copy of the user's subscription. Re-fetched on navigation, on
/// reconnect, and on push messages; staleness between refreshes is expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSubscription {
    pub id: String,
    pub plan_id: String,
    pub plan: SubscriptionPlan,
    pub status: SubscriptionStatus,
    pub cancel_at_period_end: bool,
    pub current_period_end: DateTime<Utc>,
}

/// Credit balance snapshot. Intended invariant:
/// `used_credits + current_credits == total_credits`. Optimistic local
/// decrements preserve it but can drift from server truth until the next
/// refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditBalance {
    pub current_credits: u64,
    pub used_credits: u64,
    pub total_credits: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_date: Option<DateTime<Utc>>,
}

impl CreditBalance {
    /// Check the intended accounting invariant.
    pub fn is_consistent(&self) -> bool {
        self.used_credits + self.current_credits == self.total_credits
    }

    /// Low-balance threshold used for the credit warning flag: at or below
    /// ten percent of the total grant.
    pub fn is_low(&self) -> bool {
        self.total_credits > 0 && self.current_credits * 10 <= self.total_credits
    }
}

/// Usage counters for the current billing period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub generations_this_month: u64,
    pub generations_limit: u64,
    pub regenerations_this_month: u64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

/// Settlement state of a payment transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Paid,
    Pending,
    Refunded,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: String,
    pub amount: f64,
    pub currency: String,
    pub status: TransactionStatus,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Page of results for history/audit listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

/// Provider-hosted checkout flow, referenced by the URL the client
/// redirects to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub checkout_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Customer-portal session for self-serve subscription management.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalSession {
    pub portal_url: String,
}

/// Outgoing checkout request, validated client-side before any network call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub plan_id: String,
    pub variant_id: String,
    pub email: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Audit trail entry from the payment admin endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Server-side rate-limit snapshot for one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub endpoint: String,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Identity-provider user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_plan(interval: PlanInterval) -> SubscriptionPlan {
        SubscriptionPlan {
            id: "pro".to_string(),
            name: "Pro".to_string(),
            price: 29.0,
            currency: "USD".to_string(),
            interval,
            credits: 500,
            features: vec!["500 descriptions / month".to_string()],
            lemon_squeezy_variant_id: "var_pro".to_string(),
        }
    }

    #[test]
    fn test_plan_credits_monthly_unchanged() {
        let plan = make_plan(PlanInterval::Monthly);
        assert_eq!(plan.plan_credits(), 500);
    }

    #[test]
    fn test_plan_credits_yearly_multiplied() {
        let plan = make_plan(PlanInterval::Yearly);
        assert_eq!(plan.plan_credits(), 500 * 12);
    }

    #[test]
    fn test_subscription_status_wire_format() {
        let status: SubscriptionStatus = serde_json::from_str("\"past_due\"").unwrap();
        assert_eq!(status, SubscriptionStatus::PastDue);
        assert!(!status.is_active());
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"past_due\"");
        assert_eq!(status.to_string(), "Past due");
    }

    #[test]
    fn test_unknown_transaction_status_tolerated() {
        let status: TransactionStatus = serde_json::from_str("\"disputed\"").unwrap();
        assert_eq!(status, TransactionStatus::Unknown);
    }

    #[test]
    fn test_balance_consistency_and_low_threshold() {
        let balance = CreditBalance {
            current_credits: 40,
            used_credits: 460,
            total_credits: 500,
            reset_date: None,
        };
        assert!(balance.is_consistent());
        assert!(balance.is_low());

        let healthy = CreditBalance {
            current_credits: 400,
            used_credits: 100,
            total_credits: 500,
            reset_date: None,
        };
        assert!(healthy.is_consistent());
        assert!(!healthy.is_low());
    }
}
