//! Shared HTTP Client Module
//!
//! Provides global, lazy-initialized HTTP clients with connection pooling.
//! This eliminates the overhead of creating new clients per request and
//! enables connection reuse across all backend calls.

use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

/// Request timeout for backend API calls. Sized for slow generation
/// requests, which can run for minutes on large batches.
pub const API_TIMEOUT_SECS: u64 = 300;

/// Global HTTP client for backend API calls
///
/// Configuration:
/// - 300s timeout so a large generation batch is never cut off early
/// - 20 idle connections per host for parallel slice fetches
/// - 90s idle timeout to balance resource usage and performance
pub static API_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(API_TIMEOUT_SECS))
        .pool_max_idle_per_host(20)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        .build()
        .expect("Failed to create API HTTP client")
});

/// Global HTTP client for identity-provider requests
///
/// Shorter timeout optimized for quick operations like sign-in and token
/// refresh.
pub static IDENTITY_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(5)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to create identity HTTP client")
});

/// Get the global backend API client
///
/// Returns a reference to the lazy-initialized client. The client is created
/// on first access and reused for all subsequent calls.
#[inline]
pub fn api_client() -> &'static Client {
    &API_CLIENT
}

/// Get the global identity-provider client
#[inline]
pub fn identity_client() -> &'static Client {
    &IDENTITY_CLIENT
}
