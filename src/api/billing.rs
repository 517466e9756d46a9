//! Billing API: plans, subscription, credits, usage, history, checkout

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::api::types::{
    CheckoutRequest, CheckoutSession, CreditBalance, Paginated, PaymentTransaction,
    PortalSession, SubscriptionPlan, UsageStats, UserSubscription,
};
use crate::api::{mock, ApiClient};
use crate::error::ApiError;

#[derive(Serialize)]
struct UpdateSubscriptionRequest<'a> {
    variant_id: &'a str,
}

/// Fetch the plan catalog.
pub async fn fetch_plans(client: &ApiClient) -> Result<Vec<SubscriptionPlan>, ApiError> {
    if client.mock_mode() {
        return Ok(mock::plans());
    }
    client.get_json("/api/payment/plans").await
}

/// Fetch the current user's subscription. A 404 means the user has no
/// subscription yet and maps to `Ok(None)`.
pub async fn fetch_subscription(
    client: &ApiClient,
) -> Result<Option<UserSubscription>, ApiError> {
    if client.mock_mode() {
        return Ok(Some(mock::subscription()));
    }
    let response = ApiClient::send(client.get("/api/payment/user/subscription")).await?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let response = ApiClient::check_status(response).await?;
    Ok(Some(ApiClient::decode(response).await?))
}

/// Fetch the current credit balance.
pub async fn fetch_credits(client: &ApiClient) -> Result<CreditBalance, ApiError> {
    if client.mock_mode() {
        return Ok(mock::credits());
    }
    client.get_json("/api/payment/user/credits").await
}

/// Fetch usage statistics for the current billing period.
pub async fn fetch_usage(client: &ApiClient) -> Result<UsageStats, ApiError> {
    if client.mock_mode() {
        return Ok(mock::usage());
    }
    client.get_json("/api/payment/user/usage").await
}

/// Fetch a page of payment history.
pub async fn fetch_payment_history(
    client: &ApiClient,
    page: u32,
    per_page: u32,
) -> Result<Paginated<PaymentTransaction>, ApiError> {
    if client.mock_mode() {
        return Ok(mock::payment_history(page, per_page));
    }
    client
        .get_json(&format!(
            "/api/payment/user/history?page={}&per_page={}",
            page, per_page
        ))
        .await
}

/// Create a provider-hosted checkout session. The caller is expected to have
/// run the payload through the client-side security checks first.
pub async fn create_checkout(
    client: &ApiClient,
    request: &CheckoutRequest,
) -> Result<CheckoutSession, ApiError> {
    if client.mock_mode() {
        return Ok(mock::checkout(request));
    }
    let session: CheckoutSession = client.post_json("/api/payment/checkout", request).await?;
    info!(session_id = %session.session_id, "checkout session created");
    Ok(session)
}

/// Create a customer-portal session for self-serve subscription management.
pub async fn create_portal(client: &ApiClient) -> Result<PortalSession, ApiError> {
    if client.mock_mode() {
        return Ok(mock::portal());
    }
    client.post_json("/api/payment/portal", &Value::Null).await
}

/// Cancel at period end.
pub async fn cancel_subscription(
    client: &ApiClient,
    subscription_id: &str,
) -> Result<UserSubscription, ApiError> {
    let id = valid_id(subscription_id)?;
    if client.mock_mode() {
        return Ok(mock::cancel_subscription(id));
    }
    client
        .post_json(&format!("/payments/subscription/{}/cancel", id), &Value::Null)
        .await
}

/// Undo a pending cancellation.
pub async fn reactivate_subscription(
    client: &ApiClient,
    subscription_id: &str,
) -> Result<UserSubscription, ApiError> {
    let id = valid_id(subscription_id)?;
    if client.mock_mode() {
        return Ok(mock::reactivate_subscription(id));
    }
    client
        .post_json(
            &format!("/payments/subscription/{}/reactivate", id),
            &Value::Null,
        )
        .await
}

/// Switch the subscription to another plan variant.
pub async fn update_subscription(
    client: &ApiClient,
    subscription_id: &str,
    variant_id: &str,
) -> Result<UserSubscription, ApiError> {
    let id = valid_id(subscription_id)?;
    let variant_id = variant_id.trim();
    if variant_id.is_empty() {
        return Err(ApiError::Validation("Plan variant is required.".to_string()));
    }
    if client.mock_mode() {
        return Ok(mock::update_subscription(id, variant_id));
    }
    client
        .post_json(
            &format!("/payments/subscription/{}/update", id),
            &UpdateSubscriptionRequest { variant_id },
        )
        .await
}

/// Replay a webhook event through the backend. Local-testing helper only;
/// production webhooks come from the payment provider directly.
pub async fn replay_webhook(client: &ApiClient, event: &Value) -> Result<Value, ApiError> {
    if client.mock_mode() {
        return Ok(mock::replay_ack());
    }
    client.post_json("/api/payment/webhook", event).await
}

fn valid_id(id: &str) -> Result<&str, ApiError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::Validation(
            "Subscription id is required.".to_string(),
        ));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionManager;
    use crate::config::AppConfig;
    use std::sync::Arc;

    fn mock_client() -> ApiClient {
        let config = AppConfig::from_lookup(|key| match key {
            "DESCRIPTA_USE_MOCK_API" => Some("true".to_string()),
            _ => None,
        });
        ApiClient::new(&config, Arc::new(SessionManager::new(None)))
    }

    #[tokio::test]
    async fn test_mock_reads() {
        let client = mock_client();
        let plans = fetch_plans(&client).await.unwrap();
        assert!(!plans.is_empty());

        let subscription = fetch_subscription(&client).await.unwrap().unwrap();
        assert!(subscription.status.is_active());

        let credits = fetch_credits(&client).await.unwrap();
        assert!(credits.is_consistent());

        let usage = fetch_usage(&client).await.unwrap();
        assert!(usage.generations_limit >= usage.generations_this_month);

        let history = fetch_payment_history(&client, 1, 10).await.unwrap();
        assert_eq!(history.items.len() as u64, history.total);
    }

    #[tokio::test]
    async fn test_mock_mutations() {
        let client = mock_client();
        let cancelled = cancel_subscription(&client, "sub_1").await.unwrap();
        assert!(cancelled.cancel_at_period_end);

        let reactivated = reactivate_subscription(&client, "sub_1").await.unwrap();
        assert!(!reactivated.cancel_at_period_end);

        let updated = update_subscription(&client, "sub_1", "var_scale_m")
            .await
            .unwrap();
        assert_eq!(updated.plan.lemon_squeezy_variant_id, "var_scale_m");

        let err = update_subscription(&client, "sub_1", " ").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = cancel_subscription(&client, "").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn test_mock_checkout_and_replay() {
        let client = mock_client();
        let request = CheckoutRequest {
            plan_id: "pro_monthly".to_string(),
            variant_id: "var_pro_m".to_string(),
            email: "maker@example.com".to_string(),
            success_url: "https://app.descripta.app/billing/success".to_string(),
            cancel_url: "https://app.descripta.app/pricing".to_string(),
        };
        let session = create_checkout(&client, &request).await.unwrap();
        assert!(session.checkout_url.contains("var_pro_m"));

        let ack = replay_webhook(&client, &serde_json::json!({"meta": {"event_name": "order_created"}}))
            .await
            .unwrap();
        assert_eq!(ack["received"], true);
    }
}
