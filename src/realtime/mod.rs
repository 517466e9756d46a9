//! Real-time push channel for billing state changes
//!
//! A reconnecting channel with bounded linear backoff and a heartbeat; see
//! [`channel`] for the state machine and [`transport`] for the seam tests
//! and production sockets plug into.

mod channel;
mod transport;

pub use channel::{
    ChannelState, RealtimeChannel, HEARTBEAT_SECS, MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY,
};
pub use transport::{CloseReason, Connection, MessageHandler, RealtimeMessage, Transport};
