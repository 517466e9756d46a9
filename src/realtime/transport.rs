//! Real-time transport seam and wire messages
//!
//! The channel state machine is transport-agnostic: production wires a
//! socket implementation, tests drive the machine with a scripted in-memory
//! transport. A connection yields text frames until it closes, cleanly or
//! not.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::types::CreditBalance;

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Server closed the connection deliberately; no reconnect.
    Clean,
    /// Error or unexpected close; the channel schedules a reconnect.
    Abnormal(String),
}

/// One live push connection.
#[async_trait]
pub trait Connection: Send {
    /// Next inbound frame, or the close reason when the connection ends.
    async fn recv(&mut self) -> Result<String, CloseReason>;

    /// Send an outbound frame (heartbeat pings).
    async fn send(&mut self, frame: &str) -> Result<(), String>;
}

/// Dials the real-time endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, String>;
}

/// Server-to-client push messages about billing state changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeMessage {
    /// New balance pushed inline; patched into the store without a re-fetch.
    CreditUpdate { balance: CreditBalance },
    /// Subscription changed server-side; re-fetch that slice.
    SubscriptionUpdated,
    /// Usage counters changed; re-fetch that slice.
    UsageUpdated,
    /// A payment settled; refresh everything.
    PaymentCompleted,
    /// Heartbeat response; no action.
    Pong,
}

/// Handles dispatched messages. Implemented by the flow facade, which owns
/// the store and API client.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: RealtimeMessage);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        let msg: RealtimeMessage = serde_json::from_str(
            r#"{"type":"credit_update","balance":{"current_credits":9,"used_credits":1,"total_credits":10}}"#,
        )
        .unwrap();
        match msg {
            RealtimeMessage::CreditUpdate { balance } => {
                assert_eq!(balance.current_credits, 9);
            }
            other => panic!("unexpected message: {:?}", other),
        }

        let msg: RealtimeMessage = serde_json::from_str(r#"{"type":"payment_completed"}"#).unwrap();
        assert_eq!(msg, RealtimeMessage::PaymentCompleted);
    }

    #[test]
    fn test_unknown_message_type_is_an_error() {
        let result: Result<RealtimeMessage, _> =
            serde_json::from_str(r#"{"type":"server_gossip"}"#);
        assert!(result.is_err());
    }
}
