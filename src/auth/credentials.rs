//! Session token storage
//!
//! Persists the serialized session in the OS keychain, with a file fallback
//! under the platform config directory in debug builds only. The fallback is
//! base64-obfuscated, not encrypted; release builds refuse to run without
//! the keychain.

use keyring::Entry;
use tracing::{debug, warn};

#[cfg(debug_assertions)]
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
#[cfg(debug_assertions)]
use std::fs;
#[cfg(debug_assertions)]
use std::path::PathBuf;

const SERVICE_NAME: &str = "app.descripta.client";
const SESSION_USER: &str = "session";

/// Keychain-backed storage for the serialized session.
pub struct TokenStore;

impl TokenStore {
    /// Fallback file path for the session (dev mode only)
    #[cfg(debug_assertions)]
    fn fallback_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("descripta").join("session"))
    }

    /// Store the serialized session.
    pub fn store(serialized: &str) -> Result<(), String> {
        match Entry::new(SERVICE_NAME, SESSION_USER) {
            Ok(entry) => {
                if entry.set_password(serialized).is_ok() {
                    debug!("stored session in keychain");
                    return Ok(());
                }
            }
            Err(e) => {
                warn!("keychain unavailable: {}", e);
            }
        }

        #[cfg(debug_assertions)]
        {
            if let Some(path) = Self::fallback_path() {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| format!("Failed to create config directory: {}", e))?;
                }
                fs::write(&path, BASE64.encode(serialized))
                    .map_err(|e| format!("Failed to write session file: {}", e))?;
                debug!("DEV MODE: stored session in file: {:?}", path);
                return Ok(());
            }
            return Err("Could not determine config directory".to_string());
        }

        #[cfg(not(debug_assertions))]
        Err("Secure credential storage (keychain) unavailable".to_string())
    }

    /// Load the serialized session, if any.
    pub fn load() -> Option<String> {
        if let Ok(entry) = Entry::new(SERVICE_NAME, SESSION_USER) {
            if let Ok(serialized) = entry.get_password() {
                debug!("loaded session from keychain");
                return Some(serialized);
            }
        }

        #[cfg(debug_assertions)]
        {
            let path = Self::fallback_path()?;
            if path.exists() {
                let encoded = fs::read_to_string(&path).ok()?;
                let bytes = BASE64.decode(encoded.trim()).ok()?;
                let serialized = String::from_utf8(bytes).ok()?;
                debug!("DEV MODE: loaded session from file: {:?}", path);
                return Some(serialized);
            }
        }

        None
    }

    /// Remove the stored session from the keychain and the fallback file.
    pub fn clear() {
        if let Ok(entry) = Entry::new(SERVICE_NAME, SESSION_USER) {
            let _ = entry.delete_credential();
        }

        #[cfg(debug_assertions)]
        {
            if let Some(path) = Self::fallback_path() {
                if path.exists() {
                    if let Err(e) = fs::remove_file(&path) {
                        warn!("failed to delete session file: {}", e);
                    }
                }
            }
        }
    }
}
