//! Security/audit introspection endpoints

use crate::api::types::{AuditLogEntry, Paginated, PaymentTransaction, RateLimitStatus};
use crate::api::{mock, ApiClient};
use crate::error::ApiError;

/// Fetch a page of payment audit-log entries.
pub async fn fetch_audit_logs(
    client: &ApiClient,
    page: u32,
    per_page: u32,
) -> Result<Paginated<AuditLogEntry>, ApiError> {
    if client.mock_mode() {
        return Ok(mock::audit_logs(page, per_page));
    }
    client
        .get_json(&format!(
            "/payment/admin/audit-logs?page={}&per_page={}",
            page, per_page
        ))
        .await
}

/// Fetch the server-side rate-limit snapshot for one endpoint.
pub async fn fetch_rate_limit_status(
    client: &ApiClient,
    endpoint: &str,
) -> Result<RateLimitStatus, ApiError> {
    let endpoint = endpoint.trim().trim_matches('/');
    if endpoint.is_empty() {
        return Err(ApiError::Validation("Endpoint name is required.".to_string()));
    }
    if client.mock_mode() {
        return Ok(mock::rate_limit_status(endpoint));
    }
    client
        .get_json(&format!("/payment/admin/rate-limit-status/{}", endpoint))
        .await
}

/// Look up a single payment transaction.
pub async fn fetch_transaction(
    client: &ApiClient,
    transaction_id: &str,
) -> Result<PaymentTransaction, ApiError> {
    let id = transaction_id.trim();
    if id.is_empty() {
        return Err(ApiError::Validation(
            "Transaction id is required.".to_string(),
        ));
    }
    if client.mock_mode() {
        return Ok(mock::transaction(id));
    }
    client.get_json(&format!("/payment/transaction/{}", id)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionManager;
    use crate::config::AppConfig;
    use std::sync::Arc;

    fn mock_client() -> ApiClient {
        let config = AppConfig::from_lookup(|key| match key {
            "DESCRIPTA_USE_MOCK_API" => Some("1".to_string()),
            _ => None,
        });
        ApiClient::new(&config, Arc::new(SessionManager::new(None)))
    }

    #[tokio::test]
    async fn test_mock_audit_endpoints() {
        let client = mock_client();

        let logs = fetch_audit_logs(&client, 1, 20).await.unwrap();
        assert!(!logs.items.is_empty());

        let status = fetch_rate_limit_status(&client, "checkout").await.unwrap();
        assert_eq!(status.endpoint, "checkout");
        assert!(status.remaining <= status.limit);

        let txn = fetch_transaction(&client, "txn_9").await.unwrap();
        assert_eq!(txn.id, "txn_9");
    }

    #[tokio::test]
    async fn test_blank_ids_rejected() {
        let client = mock_client();
        assert!(matches!(
            fetch_rate_limit_status(&client, "  ").await.unwrap_err(),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            fetch_transaction(&client, "").await.unwrap_err(),
            ApiError::Validation(_)
        ));
    }
}
