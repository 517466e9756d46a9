//! Checkout payload shape validation
//!
//! Rejects obviously-malformed payment payloads before any network call:
//! required fields, email shape, length and numeric bounds. This is a
//! pre-filter, not a substitute for server-side validation.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::api::types::CheckoutRequest;

/// Longest accepted plan/variant identifier.
const MAX_ID_LEN: usize = 100;
/// Longest accepted email address.
const MAX_EMAIL_LEN: usize = 254;
/// Largest purchase amount the client will submit, in the plan currency.
pub const MAX_AMOUNT: f64 = 10_000.0;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    // Pragmatic shape check, not full RFC 5322
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex must compile")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("{0} is required.")]
    Missing(&'static str),
    #[error("{0} is too long.")]
    TooLong(&'static str),
    #[error("Email address doesn't look valid.")]
    BadEmail,
    #[error("Amount must be greater than zero.")]
    NonPositiveAmount,
    #[error("Amount is above the maximum the app will submit.")]
    AmountTooLarge,
}

/// Validate a checkout request's shape. Redirect URLs get their own
/// allow-list check in [`crate::security::redirect`]; here they only need to
/// be present.
pub fn validate_checkout(request: &CheckoutRequest) -> Result<(), PayloadError> {
    validate_id("Plan", &request.plan_id)?;
    validate_id("Plan variant", &request.variant_id)?;
    validate_email(&request.email)?;
    if request.success_url.trim().is_empty() {
        return Err(PayloadError::Missing("Success URL"));
    }
    if request.cancel_url.trim().is_empty() {
        return Err(PayloadError::Missing("Cancel URL"));
    }
    Ok(())
}

/// Validate a purchase amount: positive, finite, bounded.
pub fn validate_amount(amount: f64) -> Result<(), PayloadError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(PayloadError::NonPositiveAmount);
    }
    if amount > MAX_AMOUNT {
        return Err(PayloadError::AmountTooLarge);
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), PayloadError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(PayloadError::Missing("Email"));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(PayloadError::TooLong("Email"));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(PayloadError::BadEmail);
    }
    Ok(())
}

fn validate_id(label: &'static str, id: &str) -> Result<(), PayloadError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(PayloadError::Missing(label));
    }
    if id.len() > MAX_ID_LEN {
        return Err(PayloadError::TooLong(label));
    }
    Ok(())
}
