//! Redirect-target allow-listing for checkout success/cancel URLs
//!
//! Heuristic pre-filter, not a security boundary (it runs client-side):
//! rejects non-HTTPS targets outside development, origins off the
//! allow-list, IP-literal hosts, known URL shorteners, and a handful of
//! low-value TLDs favored by throwaway domains.

use thiserror::Error;
use url::{Host, Url};

/// Origins always accepted, in addition to any configured extras.
const DEFAULT_ALLOWED_ORIGINS: [&str; 2] =
    ["https://app.descripta.app", "https://www.descripta.app"];

/// Known URL-shortener hosts; a redirect through one hides the real target.
const SHORTENER_HOSTS: [&str; 7] = [
    "bit.ly", "tinyurl.com", "t.co", "goo.gl", "is.gd", "ow.ly", "rb.gy",
];

/// Low-value TLDs that rarely host legitimate checkout returns.
const FLAGGED_TLDS: [&str; 7] = ["tk", "ml", "ga", "cf", "gq", "zip", "mov"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RedirectError {
    #[error("Redirect URL is not valid: {0}")]
    Unparseable(String),
    #[error("Redirect URL must use HTTPS.")]
    InsecureScheme,
    #[error("Redirect URL must not point at an IP address.")]
    IpLiteralHost,
    #[error("Redirect URL must not go through a link shortener.")]
    ShortenerHost,
    #[error("Redirect URL domain is not accepted.")]
    FlaggedTld,
    #[error("Redirect URL origin is not on the allow-list.")]
    OriginNotAllowed,
}

/// Validates checkout redirect targets against the allow-list.
pub struct RedirectValidator {
    allowed_origins: Vec<String>,
    production: bool,
}

impl RedirectValidator {
    /// `extra_origins` come from configuration
    /// (`DESCRIPTA_ALLOWED_REDIRECT_ORIGINS`); `production` enforces HTTPS.
    pub fn new(extra_origins: &[String], production: bool) -> Self {
        let mut allowed_origins: Vec<String> = DEFAULT_ALLOWED_ORIGINS
            .iter()
            .map(|o| o.to_string())
            .collect();
        for origin in extra_origins {
            let origin = origin.trim_end_matches('/').to_ascii_lowercase();
            if !origin.is_empty() && !allowed_origins.contains(&origin) {
                allowed_origins.push(origin);
            }
        }
        Self {
            allowed_origins,
            production,
        }
    }

    /// Check one redirect target. Localhost over HTTP is tolerated outside
    /// production so local development round-trips work.
    pub fn validate(&self, target: &str) -> Result<(), RedirectError> {
        let url = Url::parse(target.trim())
            .map_err(|e| RedirectError::Unparseable(e.to_string()))?;

        let is_localhost = matches!(url.host_str(), Some("localhost") | Some("127.0.0.1"));
        match url.scheme() {
            "https" => {}
            "http" if !self.production && is_localhost => {}
            _ => return Err(RedirectError::InsecureScheme),
        }

        match url.host() {
            Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) if !is_localhost || self.production => {
                return Err(RedirectError::IpLiteralHost)
            }
            Some(Host::Domain(domain)) => {
                let domain = domain.to_ascii_lowercase();
                if SHORTENER_HOSTS
                    .iter()
                    .any(|h| domain == *h || domain.ends_with(&format!(".{}", h)))
                {
                    return Err(RedirectError::ShortenerHost);
                }
                if let Some(tld) = domain.rsplit('.').next() {
                    if FLAGGED_TLDS.contains(&tld) {
                        return Err(RedirectError::FlaggedTld);
                    }
                }
            }
            _ => {}
        }

        let origin = format!(
            "{}://{}{}",
            url.scheme(),
            url.host_str().unwrap_or_default().to_ascii_lowercase(),
            match url.port() {
                Some(port) => format!(":{}", port),
                None => String::new(),
            }
        );
        if is_localhost && !self.production {
            return Ok(());
        }
        if self.allowed_origins.iter().any(|o| *o == origin) {
            Ok(())
        } else {
            Err(RedirectError::OriginNotAllowed)
        }
    }
}
