//! Descripta client engine
//!
//! The non-UI core of an e-commerce product-description tool: a typed API
//! client with uniform error mapping, identity/session management, a global
//! billing state store with per-slice results and request-generation
//! fencing, client-side payment security helpers, an offline action queue,
//! a reconnecting real-time channel, CSV import/export, and a sample
//! webhook/usage-limit server (the `hookd` binary).

pub mod api;
pub mod auth;
pub mod config;
pub mod csvio;
pub mod error;
pub mod flows;
pub mod http;
pub mod offline;
pub mod realtime;
pub mod security;
pub mod server;
pub mod store;

pub use config::{AppConfig, ServerConfig};
pub use error::ApiError;
pub use flows::Engine;

use tracing_subscriber::EnvFilter;

/// Initialize tracing once, from the binary or the embedding app. `RUST_LOG`
/// overrides the default filter.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,descripta=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
