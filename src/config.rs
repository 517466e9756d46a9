//! Environment configuration
//!
//! All configuration is read from environment variables (with a `.env`
//! fallback via dotenvy) and carries sensible defaults. Missing identity
//! credentials select unauthenticated mode instead of failing startup.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Deployment environment. Development relaxes the HTTPS-only redirect rule
/// and enables the file-based credential fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// Identity-provider credentials. Presence of both the API key and project id
/// is what enables authenticated flows.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub api_key: String,
    pub project_id: String,
    pub base_url: String,
}

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Backend base URL for all API modules
    pub api_base_url: String,
    /// Serve generation and billing reads from the in-process mock
    pub use_mock_api: bool,
    /// Real-time channel URL; absence disables the channel
    pub realtime_url: Option<String>,
    /// Identity provider credentials; `None` means unauthenticated mode
    pub identity: Option<IdentityConfig>,
    /// Extra allow-listed checkout redirect origins (comma-separated env)
    pub allowed_redirect_origins: Vec<String>,
    pub environment: Environment,
    /// Directory for the billing snapshot and offline queue files
    pub data_dir: PathBuf,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Core loader, factored out so tests can inject a variable map.
    pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let api_base_url = get("DESCRIPTA_API_BASE_URL")
            .unwrap_or_else(|| "http://localhost:8000".to_string());

        let use_mock_api = get("DESCRIPTA_USE_MOCK_API")
            .map(|v| parse_bool(&v))
            .unwrap_or(false);

        let realtime_url = get("DESCRIPTA_REALTIME_URL").filter(|v| !v.trim().is_empty());

        let identity = match (
            get("DESCRIPTA_IDENTITY_API_KEY"),
            get("DESCRIPTA_IDENTITY_PROJECT_ID"),
        ) {
            (Some(api_key), Some(project_id))
                if !api_key.trim().is_empty() && !project_id.trim().is_empty() =>
            {
                Some(IdentityConfig {
                    api_key,
                    project_id,
                    base_url: get("DESCRIPTA_IDENTITY_BASE_URL")
                        .unwrap_or_else(|| "https://identity.descripta.app/v1".to_string()),
                })
            }
            _ => None,
        };

        let allowed_redirect_origins = get("DESCRIPTA_ALLOWED_REDIRECT_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().trim_end_matches('/').to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let environment = match get("DESCRIPTA_ENV").as_deref() {
            Some("production") | Some("prod") => Environment::Production,
            _ => Environment::Development,
        };

        let data_dir = get("DESCRIPTA_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        Self {
            api_base_url,
            use_mock_api,
            realtime_url,
            identity,
            allowed_redirect_origins,
            environment,
            data_dir,
        }
    }

    /// True when authenticated flows are available.
    pub fn auth_enabled(&self) -> bool {
        self.identity.is_some()
    }
}

/// Configuration for the sample webhook/usage server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Shared webhook secret; `None` is a misconfiguration the webhook
    /// endpoint reports as 500
    pub webhook_secret: Option<String>,
    pub db_path: PathBuf,
}

impl ServerConfig {
    /// Load server configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let bind_addr = get("HOOKD_BIND_ADDR")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| "127.0.0.1:8787".parse().unwrap());

        let webhook_secret = get("HOOKD_WEBHOOK_SECRET").filter(|v| !v.trim().is_empty());

        let db_path = get("HOOKD_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/hookd.sqlite"));

        Self {
            bind_addr,
            webhook_secret,
            db_path,
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn default_data_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("descripta")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[]));

        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert!(!config.use_mock_api);
        assert!(config.realtime_url.is_none());
        assert!(config.identity.is_none());
        assert!(!config.auth_enabled());
        assert!(config.allowed_redirect_origins.is_empty());
        assert_eq!(config.environment, Environment::Development);
    }

    #[test]
    fn test_identity_requires_key_and_project() {
        let config = AppConfig::from_lookup(lookup(&[("DESCRIPTA_IDENTITY_API_KEY", "sk_test")]));
        assert!(config.identity.is_none());

        let config = AppConfig::from_lookup(lookup(&[
            ("DESCRIPTA_IDENTITY_API_KEY", "sk_test"),
            ("DESCRIPTA_IDENTITY_PROJECT_ID", "proj_1"),
        ]));
        let identity = config.identity.expect("identity configured");
        assert_eq!(identity.api_key, "sk_test");
        assert_eq!(identity.project_id, "proj_1");
        assert!(identity.base_url.starts_with("https://"));
    }

    #[test]
    fn test_mock_toggle_and_environment() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DESCRIPTA_USE_MOCK_API", "true"),
            ("DESCRIPTA_ENV", "production"),
        ]));
        assert!(config.use_mock_api);
        assert!(config.environment.is_production());

        assert!(parse_bool("1"));
        assert!(parse_bool("Yes"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("off"));
    }

    #[test]
    fn test_redirect_origins_split_and_trim() {
        let config = AppConfig::from_lookup(lookup(&[(
            "DESCRIPTA_ALLOWED_REDIRECT_ORIGINS",
            "https://shop.example.com/, https://partners.example.com ,",
        )]));
        assert_eq!(
            config.allowed_redirect_origins,
            vec![
                "https://shop.example.com".to_string(),
                "https://partners.example.com".to_string()
            ]
        );
    }

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[]));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8787");
        assert!(config.webhook_secret.is_none());
        assert_eq!(config.db_path, PathBuf::from("./data/hookd.sqlite"));
    }

    #[test]
    fn test_server_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("HOOKD_BIND_ADDR", "0.0.0.0:9000"),
            ("HOOKD_WEBHOOK_SECRET", "shhh"),
            ("HOOKD_DB_PATH", "/tmp/ledger.sqlite"),
        ]));
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:9000");
        assert_eq!(config.webhook_secret.as_deref(), Some("shhh"));
        assert_eq!(config.db_path, PathBuf::from("/tmp/ledger.sqlite"));
    }
}
