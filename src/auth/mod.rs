//! Identity and session handling
//!
//! This module handles:
//! - Sign-in/sign-up/sign-out against the external identity provider
//! - Bearer-token access for the API client
//! - Session persistence (keychain, dev-mode file fallback)
//! - Graceful unauthenticated mode when credentials are absent

mod credentials;
mod session;

pub use credentials::TokenStore;
pub use session::{AuthError, Session, SessionManager};
