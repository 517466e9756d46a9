//! Reconnecting real-time channel
//!
//! State machine: `disconnected → connecting → connected`. A failed connect
//! or an abnormal close schedules a reconnect after `delay × attempt`,
//! linear, capped at [`MAX_RECONNECT_ATTEMPTS`]; after the cap the channel
//! stays down until the next explicit [`RealtimeChannel::run`] trigger
//! (sign-in, connectivity event). While connected, a heartbeat ping goes out
//! every [`HEARTBEAT_SECS`] seconds; a disconnect resets the heartbeat.
//! Inbound messages dispatch to the installed [`MessageHandler`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::realtime::transport::{
    CloseReason, Connection, MessageHandler, RealtimeMessage, Transport,
};

/// Reconnect attempts per `run` before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
/// Base reconnect delay; the wait before attempt `n` is `delay × n`.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);
/// Heartbeat ping cadence while connected.
pub const HEARTBEAT_SECS: u64 = 30;

const PING_FRAME: &str = r#"{"type":"ping"}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

pub struct RealtimeChannel {
    url: String,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn MessageHandler>,
    state: watch::Sender<ChannelState>,
    reconnect_delay: Duration,
}

impl RealtimeChannel {
    pub fn new(
        url: String,
        transport: Arc<dyn Transport>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            url,
            transport,
            handler,
            state,
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    /// Shrink the reconnect delay (tests).
    #[cfg(test)]
    pub(crate) fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Watch connection state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Drive the channel until a clean close or the reconnect budget is
    /// exhausted. Each call is one trigger: sign-in and connectivity events
    /// call it again after it returns.
    pub async fn run(&self) {
        let mut attempt: u32 = 0;
        loop {
            self.set_state(ChannelState::Connecting);
            match self.transport.connect(&self.url).await {
                Ok(conn) => {
                    info!(url = %self.url, "real-time channel connected");
                    attempt = 0;
                    self.set_state(ChannelState::Connected);
                    let reason = self.pump(conn).await;
                    self.set_state(ChannelState::Disconnected);
                    match reason {
                        CloseReason::Clean => {
                            debug!("real-time channel closed cleanly");
                            return;
                        }
                        CloseReason::Abnormal(e) => {
                            warn!(error = %e, "real-time channel dropped");
                        }
                    }
                }
                Err(e) => {
                    self.set_state(ChannelState::Disconnected);
                    warn!(error = %e, "real-time connect failed");
                }
            }

            attempt += 1;
            if attempt >= MAX_RECONNECT_ATTEMPTS {
                warn!(
                    attempts = attempt,
                    "giving up on real-time reconnect until the next trigger"
                );
                return;
            }
            // Linear backoff: delay × attempt count
            tokio::time::sleep(self.reconnect_delay * attempt).await;
        }
    }

    /// Read frames and run the heartbeat until the connection ends.
    async fn pump(&self, mut conn: Box<dyn Connection>) -> CloseReason {
        let mut heartbeat = interval(Duration::from_secs(HEARTBEAT_SECS));
        // interval fires immediately; consume the first tick so the first
        // ping goes out one period after connect
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if let Err(e) = conn.send(PING_FRAME).await {
                        return CloseReason::Abnormal(format!("heartbeat failed: {}", e));
                    }
                    debug!("heartbeat ping sent");
                }
                frame = conn.recv() => match frame {
                    Ok(text) => self.dispatch(&text).await,
                    Err(reason) => return reason,
                }
            }
        }
    }

    async fn dispatch(&self, frame: &str) {
        match serde_json::from_str::<RealtimeMessage>(frame) {
            Ok(RealtimeMessage::Pong) => debug!("heartbeat pong received"),
            Ok(message) => {
                debug!(?message, "real-time message");
                self.handler.handle(message).await;
            }
            Err(e) => debug!(error = %e, "ignoring unrecognized real-time frame"),
        }
    }

    fn set_state(&self, state: ChannelState) {
        let _ = self.state.send(state);
    }
}
