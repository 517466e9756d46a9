//! Suspicious-activity heuristic
//!
//! Flags high-frequency payment attempts (sliding window per user) and
//! large first-time purchases. Warning-banner material only: the heuristic
//! has no enforcement power and the backend makes the real call.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::warn;

/// Payment attempts per user tolerated inside the window.
pub const MAX_ATTEMPTS_IN_WINDOW: usize = 5;
/// Sliding-window length.
pub const WINDOW_SECS: u64 = 600;
/// A first purchase at or above this amount draws a warning.
pub const LARGE_FIRST_PURCHASE: f64 = 500.0;

/// Why an attempt looked suspicious.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FraudWarning {
    HighFrequency,
    LargeFirstPurchase,
}

impl FraudWarning {
    /// Banner copy for the checkout confirmation screen.
    pub fn message(self) -> &'static str {
        match self {
            FraudWarning::HighFrequency => {
                "Several payment attempts in a short time. Double-check before continuing."
            }
            FraudWarning::LargeFirstPurchase => {
                "This is a large first purchase. Double-check the plan and amount."
            }
        }
    }
}

/// Sliding-window monitor over payment attempts, keyed by user.
pub struct SuspiciousActivityMonitor {
    attempts: DashMap<String, Vec<Instant>>,
    max_attempts: usize,
    window: Duration,
}

impl SuspiciousActivityMonitor {
    pub fn new(max_attempts: usize, window_secs: u64) -> Self {
        Self {
            attempts: DashMap::new(),
            max_attempts,
            window: Duration::from_secs(window_secs),
        }
    }

    /// Record one payment attempt and assess it. Returns a warning when the
    /// attempt trips a heuristic; recording happens either way.
    pub fn assess(
        &self,
        user_id: &str,
        amount: f64,
        is_first_purchase: bool,
    ) -> Option<FraudWarning> {
        let now = Instant::now();
        let mut entry = self.attempts.entry(user_id.to_string()).or_default();
        let timestamps = entry.value_mut();
        timestamps.retain(|t| now.duration_since(*t) < self.window);
        timestamps.push(now);

        if timestamps.len() > self.max_attempts {
            warn!(
                user = user_id,
                attempts = timestamps.len(),
                "high-frequency payment attempts"
            );
            return Some(FraudWarning::HighFrequency);
        }
        if is_first_purchase && amount >= LARGE_FIRST_PURCHASE {
            warn!(user = user_id, amount, "large first-time purchase");
            return Some(FraudWarning::LargeFirstPurchase);
        }
        None
    }

    /// Drop users with no recent attempts. Call periodically.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let window = self.window;
        self.attempts.retain(|_, timestamps| {
            timestamps.retain(|t| now.duration_since(*t) < window);
            !timestamps.is_empty()
        });
    }
}

impl Default for SuspiciousActivityMonitor {
    fn default() -> Self {
        Self::new(MAX_ATTEMPTS_IN_WINDOW, WINDOW_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_attempts_pass() {
        let monitor = SuspiciousActivityMonitor::default();
        for _ in 0..MAX_ATTEMPTS_IN_WINDOW {
            assert_eq!(monitor.assess("user_1", 29.0, false), None);
        }
    }

    #[test]
    fn test_high_frequency_flagged() {
        let monitor = SuspiciousActivityMonitor::new(3, 600);
        assert_eq!(monitor.assess("user_1", 29.0, false), None);
        assert_eq!(monitor.assess("user_1", 29.0, false), None);
        assert_eq!(monitor.assess("user_1", 29.0, false), None);
        assert_eq!(
            monitor.assess("user_1", 29.0, false),
            Some(FraudWarning::HighFrequency)
        );
        // Other users are unaffected
        assert_eq!(monitor.assess("user_2", 29.0, false), None);
    }

    #[test]
    fn test_large_first_purchase_flagged() {
        let monitor = SuspiciousActivityMonitor::default();
        assert_eq!(
            monitor.assess("user_1", LARGE_FIRST_PURCHASE, true),
            Some(FraudWarning::LargeFirstPurchase)
        );
        // The same amount on a repeat purchase is fine
        assert_eq!(monitor.assess("user_2", LARGE_FIRST_PURCHASE, false), None);
        // A modest first purchase is fine
        assert_eq!(monitor.assess("user_3", 29.0, true), None);
    }

    #[test]
    fn test_window_expiry() {
        let monitor = SuspiciousActivityMonitor::new(1, 1);
        assert_eq!(monitor.assess("user_1", 29.0, false), None);
        assert_eq!(
            monitor.assess("user_1", 29.0, false),
            Some(FraudWarning::HighFrequency)
        );

        std::thread::sleep(Duration::from_millis(1100));
        assert_eq!(monitor.assess("user_1", 29.0, false), None);
    }

    #[test]
    fn test_cleanup_drops_idle_users() {
        let monitor = SuspiciousActivityMonitor::new(5, 1);
        monitor.assess("user_1", 29.0, false);
        assert_eq!(monitor.attempts.len(), 1);

        std::thread::sleep(Duration::from_millis(1100));
        monitor.cleanup();
        assert_eq!(monitor.attempts.len(), 0);
    }
}
