//! Typed API client for the backend REST surface
//!
//! Each submodule is a thin typed wrapper: validate input shape, issue the
//! request with a bearer token attached, unwrap the response envelope, and
//! normalize failures through [`ApiError`]. No business rules live here —
//! the backend is the sole authority on credits, entitlement, and plan
//! legality.

pub mod audit;
pub mod billing;
pub mod generation;
pub mod mock;
pub mod types;

use std::sync::Arc;

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::SessionManager;
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::http;

/// Standard response envelope. Some endpoints return the bare shape
/// instead; decoding tries the envelope first and falls back.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Envelope<T> {
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    correlation_id: Option<String>,
}

/// Shared request plumbing for the domain API modules.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    mock: bool,
    session: Arc<SessionManager>,
}

impl ApiClient {
    pub fn new(config: &AppConfig, session: Arc<SessionManager>) -> Self {
        Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            mock: config.use_mock_api,
            session,
        }
    }

    /// True when reads are served by the in-process mock.
    pub fn mock_mode(&self) -> bool {
        self.mock
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(http::api_client().get(self.url(path)))
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(http::api_client().post(self.url(path)))
    }

    /// Attach the bearer token when the session holds one; unauthenticated
    /// requests go out bare.
    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.session.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request, normalizing transport failures. The response status
    /// is not checked here; see [`ApiClient::check_status`].
    pub(crate) async fn send(builder: RequestBuilder) -> Result<Response, ApiError> {
        builder.send().await.map_err(ApiError::from_transport)
    }

    /// Reject non-2xx responses through the shared error mapper.
    pub(crate) async fn check_status(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_response(
            status.as_u16(),
            retry_after.as_deref(),
            &body,
        ))
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = Self::send(self.get(path)).await?;
        let response = Self::check_status(response).await?;
        Self::decode(response).await
    }

    pub(crate) async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = Self::send(self.post(path).json(body)).await?;
        let response = Self::check_status(response).await?;
        Self::decode(response).await
    }

    pub(crate) async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let text = response.text().await.map_err(ApiError::from_transport)?;
        decode_body(&text)
    }
}

/// Unwrap `{ data, success, correlation_id }`, falling back to the bare
/// shape for endpoints that skip the envelope.
pub(crate) fn decode_body<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    if let Ok(envelope) = serde_json::from_str::<Envelope<T>>(text) {
        if envelope.success == Some(false) {
            return Err(ApiError::Unexpected(
                "The server reported the request as unsuccessful.".to_string(),
            ));
        }
        if let Some(data) = envelope.data {
            if let Some(correlation_id) = &envelope.correlation_id {
                debug!(%correlation_id, "api response");
            }
            return Ok(data);
        }
    }
    serde_json::from_str::<T>(text)
        .map_err(|e| ApiError::Unexpected(format!("Unexpected response shape: {}", e)))
}
