//! Client-side security-event log
//!
//! A bounded in-memory ring of security-relevant events (validation
//! rejections, fraud warnings, token misuse), each also emitted through
//! `tracing`. An accessor exposes recent events for the audit view. Client
//! memory only; the authoritative audit trail lives behind the
//! `/payment/admin/audit-logs` endpoint.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Events kept before the oldest is dropped.
pub const MAX_EVENTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    PayloadRejected,
    RedirectRejected,
    ConfirmationFailed,
    SuspiciousActivity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: SecurityEventKind,
    pub detail: String,
}

/// Bounded event log.
#[derive(Default)]
pub struct SecurityLog {
    events: Mutex<VecDeque<SecurityEvent>>,
}

impl SecurityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: SecurityEventKind, detail: impl Into<String>) {
        let detail = detail.into();
        warn!(?kind, %detail, "security event");

        let mut events = self.lock();
        if events.len() >= MAX_EVENTS {
            events.pop_front();
        }
        events.push_back(SecurityEvent {
            timestamp: Utc::now(),
            kind,
            detail,
        });
    }

    /// Most recent events, newest last.
    pub fn recent(&self, limit: usize) -> Vec<SecurityEvent> {
        let events = self.lock();
        let skip = events.len().saturating_sub(limit);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<SecurityEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| {
            warn!("security log lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_read_back() {
        let log = SecurityLog::new();
        log.record(SecurityEventKind::PayloadRejected, "email missing");
        log.record(SecurityEventKind::RedirectRejected, "shortener host");

        let recent = log.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].kind, SecurityEventKind::PayloadRejected);
        assert_eq!(recent[1].detail, "shortener host");
    }

    #[test]
    fn test_ring_is_bounded() {
        let log = SecurityLog::new();
        for i in 0..(MAX_EVENTS + 10) {
            log.record(SecurityEventKind::SuspiciousActivity, format!("event {}", i));
        }
        let recent = log.recent(MAX_EVENTS * 2);
        assert_eq!(recent.len(), MAX_EVENTS);
        // The oldest entries were dropped
        assert_eq!(recent[0].detail, "event 10");
    }

    #[test]
    fn test_limit_returns_newest() {
        let log = SecurityLog::new();
        for i in 0..5 {
            log.record(SecurityEventKind::ConfirmationFailed, format!("event {}", i));
        }
        let recent = log.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].detail, "event 4");

        log.clear();
        assert!(log.recent(10).is_empty());
    }
}
