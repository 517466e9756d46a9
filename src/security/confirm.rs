//! Ephemeral confirmation tokens for sensitive UI actions
//!
//! Opaque random strings held in an in-memory map keyed by a purpose string
//! derived from plan/user/amount. Single-use, 30-minute validity. This is a
//! UI affordance against double-submitting a payment confirmation dialog:
//! the token carries no signature and binds to no server-verifiable state,
//! so it must never be treated as authorization evidence. The checkout flow
//! still sends the full payload for server-side authorization.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Validity window for an issued token.
pub const TOKEN_TTL_MINUTES: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfirmError {
    #[error("No pending confirmation for this action.")]
    Unknown,
    #[error("This confirmation has expired. Please start over.")]
    Expired,
    #[error("Confirmation token does not match.")]
    Mismatch,
}

#[derive(Debug, Clone)]
struct IssuedToken {
    token: String,
    issued_at: DateTime<Utc>,
}

impl IssuedToken {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.issued_at >= Duration::minutes(TOKEN_TTL_MINUTES)
    }
}

/// In-memory single-use token registry.
#[derive(Default)]
pub struct ConfirmationTokens {
    tokens: Mutex<HashMap<String, IssuedToken>>,
}

impl ConfirmationTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a token for confirming a purchase of `amount` on `plan_id` by
    /// `user_id`. Re-issuing for the same purpose replaces the earlier token.
    pub fn issue(&self, plan_id: &str, user_id: &str, amount: f64) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let purpose = purpose_key(plan_id, user_id, amount);
        let mut tokens = self.lock();
        tokens.insert(
            purpose,
            IssuedToken {
                token: token.clone(),
                issued_at: Utc::now(),
            },
        );
        // Opportunistic sweep so abandoned dialogs don't accumulate
        let now = Utc::now();
        tokens.retain(|_, issued| !issued.is_expired(now));
        debug!(plan = plan_id, "confirmation token issued");
        token
    }

    /// Validate and consume a token. Success removes it; a second use of the
    /// same token fails with [`ConfirmError::Unknown`].
    pub fn consume(
        &self,
        plan_id: &str,
        user_id: &str,
        amount: f64,
        token: &str,
    ) -> Result<(), ConfirmError> {
        let purpose = purpose_key(plan_id, user_id, amount);
        let mut tokens = self.lock();
        let issued = tokens.get(&purpose).ok_or(ConfirmError::Unknown)?;

        if issued.is_expired(Utc::now()) {
            tokens.remove(&purpose);
            return Err(ConfirmError::Expired);
        }
        if issued.token != token {
            return Err(ConfirmError::Mismatch);
        }
        tokens.remove(&purpose);
        Ok(())
    }

    #[cfg(test)]
    fn backdate(&self, plan_id: &str, user_id: &str, amount: f64, minutes: i64) {
        let purpose = purpose_key(plan_id, user_id, amount);
        if let Some(issued) = self.lock().get_mut(&purpose) {
            issued.issued_at = Utc::now() - Duration::minutes(minutes);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, IssuedToken>> {
        self.tokens.lock().unwrap_or_else(|poisoned| {
            warn!("confirmation token lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Derive the purpose key: a hash so the map key doesn't embed the raw email
/// or plan id.
fn purpose_key(plan_id: &str, user_id: &str, amount: f64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plan_id.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(user_id.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(format!("{:.2}", amount).as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_consume_once() {
        let tokens = ConfirmationTokens::new();
        let token = tokens.issue("pro_monthly", "user_1", 29.0);

        assert_eq!(tokens.consume("pro_monthly", "user_1", 29.0, &token), Ok(()));
        // Single use: the second attempt finds nothing
        assert_eq!(
            tokens.consume("pro_monthly", "user_1", 29.0, &token),
            Err(ConfirmError::Unknown)
        );
    }

    #[test]
    fn test_wrong_purpose_rejected() {
        let tokens = ConfirmationTokens::new();
        let token = tokens.issue("pro_monthly", "user_1", 29.0);

        // Different plan, user, or amount derives a different purpose key
        assert_eq!(
            tokens.consume("scale_monthly", "user_1", 29.0, &token),
            Err(ConfirmError::Unknown)
        );
        assert_eq!(
            tokens.consume("pro_monthly", "user_2", 29.0, &token),
            Err(ConfirmError::Unknown)
        );
        assert_eq!(
            tokens.consume("pro_monthly", "user_1", 99.0, &token),
            Err(ConfirmError::Unknown)
        );
    }

    #[test]
    fn test_wrong_token_rejected_but_not_consumed() {
        let tokens = ConfirmationTokens::new();
        let token = tokens.issue("pro_monthly", "user_1", 29.0);

        assert_eq!(
            tokens.consume("pro_monthly", "user_1", 29.0, "forged"),
            Err(ConfirmError::Mismatch)
        );
        // The real token still works after a mismatch
        assert_eq!(tokens.consume("pro_monthly", "user_1", 29.0, &token), Ok(()));
    }

    #[test]
    fn test_expired_token_rejected() {
        let tokens = ConfirmationTokens::new();
        let token = tokens.issue("pro_monthly", "user_1", 29.0);
        tokens.backdate("pro_monthly", "user_1", 29.0, TOKEN_TTL_MINUTES + 1);

        assert_eq!(
            tokens.consume("pro_monthly", "user_1", 29.0, &token),
            Err(ConfirmError::Expired)
        );
    }

    #[test]
    fn test_reissue_replaces_earlier_token() {
        let tokens = ConfirmationTokens::new();
        let first = tokens.issue("pro_monthly", "user_1", 29.0);
        let second = tokens.issue("pro_monthly", "user_1", 29.0);
        assert_ne!(first, second);

        assert_eq!(
            tokens.consume("pro_monthly", "user_1", 29.0, &first),
            Err(ConfirmError::Mismatch)
        );
        assert_eq!(
            tokens.consume("pro_monthly", "user_1", 29.0, &second),
            Ok(())
        );
    }
}
