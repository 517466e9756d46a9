//! Client-side payment security helpers
//!
//! Pre-filters that reject obviously-bad input before it reaches the
//! network, plus the UX-facing checkout security checklist. None of this is
//! a security boundary — it runs in the client, and the backend remains the
//! sole authority on credits, entitlement, and payment legality.

pub mod confirm;
pub mod events;
pub mod fraud;
pub mod payload;
pub mod redirect;

pub use confirm::{ConfirmError, ConfirmationTokens, TOKEN_TTL_MINUTES};
pub use events::{SecurityEvent, SecurityEventKind, SecurityLog};
pub use fraud::{FraudWarning, SuspiciousActivityMonitor};
pub use payload::{validate_amount, validate_checkout, validate_email, PayloadError};
pub use redirect::{RedirectError, RedirectValidator};

use serde::{Deserialize, Serialize};

use crate::api::types::{SubscriptionPlan, UserProfile, UserSubscription};

/// One row of the checkout confirmation checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub label: &'static str,
    pub passed: bool,
    /// Shown when the item did not pass
    pub note: Option<String>,
}

/// The checklist rendered on the checkout confirmation screen: plan
/// validity, subscription status, fraud heuristic, identity presence.
/// Informational — a failed item shows a warning, it does not block the
/// server-side decision.
pub fn checkout_checklist(
    plan: Option<&SubscriptionPlan>,
    subscription: Option<&UserSubscription>,
    user: Option<&UserProfile>,
    fraud_warning: Option<FraudWarning>,
) -> Vec<ChecklistItem> {
    let plan_ok = plan.is_some_and(|p| !p.lemon_squeezy_variant_id.trim().is_empty());
    let subscription_note = subscription.and_then(|s| {
        if s.status.is_active() {
            None
        } else {
            Some(format!("Current subscription is {}.", s.status))
        }
    });

    vec![
        ChecklistItem {
            label: "Plan is valid",
            passed: plan_ok,
            note: (!plan_ok).then(|| "Selected plan has no purchasable variant.".to_string()),
        },
        ChecklistItem {
            label: "Subscription status",
            passed: subscription_note.is_none(),
            note: subscription_note,
        },
        ChecklistItem {
            label: "No unusual activity",
            passed: fraud_warning.is_none(),
            note: fraud_warning.map(|w| w.message().to_string()),
        },
        ChecklistItem {
            label: "Signed in",
            passed: user.is_some(),
            note: user
                .is_none()
                .then(|| "Sign in to attach this purchase to your account.".to_string()),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock;

    #[test]
    fn test_checklist_all_green() {
        let plans = mock::plans();
        let subscription = mock::subscription();
        let user = UserProfile {
            id: "user_1".to_string(),
            email: "maker@example.com".to_string(),
            name: None,
        };
        let items = checkout_checklist(plans.first(), Some(&subscription), Some(&user), None);
        assert_eq!(items.len(), 4);
        assert!(items.iter().all(|item| item.passed));
    }

    #[test]
    fn test_checklist_flags_problems() {
        let mut subscription = mock::subscription();
        subscription.status = crate::api::types::SubscriptionStatus::PastDue;

        let items = checkout_checklist(
            None,
            Some(&subscription),
            None,
            Some(FraudWarning::HighFrequency),
        );
        assert!(items.iter().all(|item| !item.passed));
        assert!(items[1].note.as_deref().unwrap().contains("Past due"));
        assert!(items[2].note.is_some());
    }

    #[test]
    fn test_checklist_without_subscription_passes_status() {
        // No subscription at all is fine for a first purchase
        let plans = mock::plans();
        let items = checkout_checklist(plans.first(), None, None, None);
        assert!(items[1].passed);
        assert!(!items[3].passed);
    }
}
