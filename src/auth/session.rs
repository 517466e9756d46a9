//! Identity/session management
//!
//! Wraps the external identity provider's REST surface:
//! - Sign-in / sign-up / sign-out
//! - Current-user state and a bearer-token accessor
//! - Session-change notifications (watch channel) so callers can refresh
//!   billing state and reconnect the real-time channel
//!
//! Missing identity credentials select unauthenticated mode: accessors
//! return `None` and sign-in reports a configuration error instead of
//! crashing.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::types::UserProfile;
use crate::auth::credentials::TokenStore;
use crate::config::IdentityConfig;
use crate::http;

/// An authenticated session as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user: UserProfile,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// A session is usable until its expiry passes; sessions without an
    /// expiry stay valid until sign-out.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at > now,
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Authentication is not configured. Running in unauthenticated mode.")]
    NotConfigured,
    #[error("Invalid email or password.")]
    InvalidCredentials,
    #[error("Identity provider error: {0}")]
    Provider(String),
    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Serialize)]
struct CredentialsRequest<'a> {
    email: &'a str,
    password: &'a str,
    project_id: &'a str,
}

#[derive(Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    project_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Deserialize)]
struct SessionResponse {
    token: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    user: UserProfile,
}

/// Holds the current session and notifies watchers on change.
pub struct SessionManager {
    identity: Option<IdentityConfig>,
    state: RwLock<Option<Session>>,
    notify: watch::Sender<Option<UserProfile>>,
}

impl SessionManager {
    pub fn new(identity: Option<IdentityConfig>) -> Self {
        if identity.is_none() {
            info!("identity credentials missing; authenticated flows disabled");
        }
        let (notify, _) = watch::channel(None);
        Self {
            identity,
            state: RwLock::new(None),
            notify,
        }
    }

    /// True when identity credentials are configured.
    pub fn auth_enabled(&self) -> bool {
        self.identity.is_some()
    }

    /// Restore a persisted session from the token store. Expired sessions
    /// are discarded. Returns the restored user, if any.
    pub fn restore(&self) -> Option<UserProfile> {
        if !self.auth_enabled() {
            return None;
        }
        let serialized = TokenStore::load()?;
        let session: Session = match serde_json::from_str(&serialized) {
            Ok(session) => session,
            Err(e) => {
                warn!("discarding unreadable stored session: {}", e);
                TokenStore::clear();
                return None;
            }
        };
        if !session.is_valid(Utc::now()) {
            debug!("stored session expired; clearing");
            TokenStore::clear();
            return None;
        }
        let user = session.user.clone();
        self.install(Some(session));
        Some(user)
    }

    /// Sign in against the identity provider.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, AuthError> {
        let identity = self.identity.as_ref().ok_or(AuthError::NotConfigured)?;
        let body = CredentialsRequest {
            email,
            password,
            project_id: &identity.project_id,
        };
        let response = self
            .provider_post(identity, "sessions", &serde_json::to_value(&body).unwrap_or_default())
            .await?;
        self.adopt(response)
    }

    /// Create an account, receiving a signed-in session back.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<UserProfile, AuthError> {
        let identity = self.identity.as_ref().ok_or(AuthError::NotConfigured)?;
        let body = SignUpRequest {
            email,
            password,
            project_id: &identity.project_id,
            name,
        };
        let response = self
            .provider_post(identity, "users", &serde_json::to_value(&body).unwrap_or_default())
            .await?;
        self.adopt(response)
    }

    /// Sign out: best-effort remote revocation, then local teardown.
    pub async fn sign_out(&self) {
        let token = self.bearer_token();
        if let (Some(identity), Some(token)) = (self.identity.as_ref(), token) {
            let url = format!("{}/sessions/current", identity.base_url.trim_end_matches('/'));
            let result = http::identity_client()
                .delete(&url)
                .header("x-api-key", &identity.api_key)
                .bearer_auth(&token)
                .send()
                .await;
            if let Err(e) = result {
                debug!("remote sign-out failed (ignored): {}", e);
            }
        }
        TokenStore::clear();
        self.install(None);
        info!("signed out");
    }

    /// Current user, if a valid session is held.
    pub fn current_user(&self) -> Option<UserProfile> {
        self.read_state().as_ref().map(|s| s.user.clone())
    }

    /// Bearer token for outgoing API calls. Expired sessions yield `None`.
    pub fn bearer_token(&self) -> Option<String> {
        let guard = self.read_state();
        let session = guard.as_ref()?;
        if session.is_valid(Utc::now()) {
            Some(session.token.clone())
        } else {
            None
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.read_state()
            .as_ref()
            .is_some_and(|s| s.is_valid(Utc::now()))
    }

    /// Watch session changes; the value is the current user (or `None`).
    pub fn subscribe(&self) -> watch::Receiver<Option<UserProfile>> {
        self.notify.subscribe()
    }

    fn adopt(&self, response: SessionResponse) -> Result<UserProfile, AuthError> {
        let session = Session {
            user: response.user,
            token: response.token,
            expires_at: response.expires_at,
        };
        let user = session.user.clone();
        if let Ok(serialized) = serde_json::to_string(&session) {
            if let Err(e) = TokenStore::store(&serialized) {
                warn!("failed to persist session: {}", e);
            }
        }
        self.install(Some(session));
        info!("signed in as {}", user.email);
        Ok(user)
    }

    fn install(&self, session: Option<Session>) {
        let user = session.as_ref().map(|s| s.user.clone());
        *self.write_state() = session;
        let _ = self.notify.send(user);
    }

    async fn provider_post(
        &self,
        identity: &IdentityConfig,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<SessionResponse, AuthError> {
        let url = format!("{}/{}", identity.base_url.trim_end_matches('/'), path);
        let response = http::identity_client()
            .post(&url)
            .header("x-api-key", &identity.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::UNPROCESSABLE_ENTITY
        {
            return Err(AuthError::InvalidCredentials);
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AuthError::Provider(format!(
                "status {}: {}",
                status.as_u16(),
                detail.chars().take(200).collect::<String>()
            )));
        }
        response
            .json::<SessionResponse>()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))
    }

    fn read_state(&self) -> RwLockReadGuard<'_, Option<Session>> {
        self.state.read().unwrap_or_else(|poisoned| {
            warn!("session lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, Option<Session>> {
        self.state.write().unwrap_or_else(|poisoned| {
            warn!("session lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}
