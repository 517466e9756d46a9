//! Error mapping for backend and provider responses
//!
//! Translates HTTP statuses, `retry-after` headers, and provider error
//! payloads into the exact user-facing copy the UI renders. The mapping is
//! presentation-only: it performs no retry and no backoff.

use serde::Deserialize;
use thiserror::Error;

/// Provider-defined error codes carried in 400/403 response bodies.
pub mod codes {
    pub const INSUFFICIENT_CREDITS: &str = "INSUFFICIENT_CREDITS";
    pub const SUBSCRIPTION_REQUIRED: &str = "SUBSCRIPTION_REQUIRED";
    pub const SUBSCRIPTION_EXPIRED: &str = "SUBSCRIPTION_EXPIRED";
    pub const CREDIT_LIMIT_EXCEEDED: &str = "CREDIT_LIMIT_EXCEEDED";
}

/// Default wait suggested when a 429 arrives without a `retry-after` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Error payload shape the backend returns on non-2xx responses.
///
/// Both `message` and `error` appear in the wild depending on which layer
/// produced the failure, so we accept either.
#[derive(Debug, Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn detail(&self) -> Option<&str> {
        self.message.as_deref().or(self.error.as_deref())
    }
}

/// Normalized API failure. `Display` is the user-facing message, so callers
/// can surface `err.to_string()` directly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Too many requests. Please try again in {retry_after_secs} seconds.")]
    RateLimited { retry_after_secs: u64 },

    #[error("You don't have enough credits for this batch. Please purchase more credits or upgrade your plan.")]
    InsufficientCredits,

    #[error("An active subscription is required for this feature. Please choose a plan to continue.")]
    SubscriptionRequired,

    #[error("Your subscription has expired. Please renew it to keep generating descriptions.")]
    SubscriptionExpired,

    #[error("You've reached your plan's credit limit for this billing period.")]
    CreditLimitExceeded,

    #[error("Your session has expired. Please sign in again.")]
    Unauthorized,

    #[error("Payment required. Please update your billing details to continue.")]
    PaymentRequired,

    #[error("Invalid request. Please check your input and try again.")]
    InvalidRequest,

    #[error("Something went wrong on our end. Please try again.")]
    Server,

    #[error("The request timed out. Please try again.")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    /// Client-side shape validation failure; blocks the request before any
    /// network call.
    #[error("{0}")]
    Validation(String),

    /// Unmapped failure carrying the raw error text from the response.
    #[error("{0}")]
    Unexpected(String),
}

impl ApiError {
    /// Map a non-2xx response to an `ApiError`.
    ///
    /// `retry_after` is the raw `retry-after` header value if present.
    /// Unknown `error_code` values on 400/403 collapse to [`ApiError::InvalidRequest`];
    /// responses without an `error_code` fall through with their raw message.
    pub fn from_response(status: u16, retry_after: Option<&str>, body: &str) -> Self {
        let parsed = ErrorBody::parse(body);

        match status {
            429 => {
                let retry_after_secs = retry_after
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                ApiError::RateLimited { retry_after_secs }
            }
            401 => ApiError::Unauthorized,
            402 => ApiError::PaymentRequired,
            400 => match parsed.error_code.as_deref() {
                Some(codes::INSUFFICIENT_CREDITS) => ApiError::InsufficientCredits,
                Some(codes::SUBSCRIPTION_REQUIRED) => ApiError::SubscriptionRequired,
                Some(codes::SUBSCRIPTION_EXPIRED) => ApiError::SubscriptionExpired,
                Some(_) => ApiError::InvalidRequest,
                None => Self::fallthrough(status, &parsed),
            },
            403 => match parsed.error_code.as_deref() {
                Some(codes::CREDIT_LIMIT_EXCEEDED) => ApiError::CreditLimitExceeded,
                Some(_) => ApiError::InvalidRequest,
                None => Self::fallthrough(status, &parsed),
            },
            500..=599 => ApiError::Server,
            _ => Self::fallthrough(status, &parsed),
        }
    }

    /// Map a transport-level failure. Client-side timeouts get their own
    /// message; everything else surfaces as a network error.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Network(err.to_string())
        }
    }

    /// True when the failure should prompt re-authentication.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    fn fallthrough(status: u16, parsed: &ErrorBody) -> Self {
        let detail = parsed
            .detail()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Request failed with status {}", status));
        ApiError::Unexpected(detail)
    }
}
