//! Webhook and usage-limit server binary.

use std::sync::Arc;

use tracing::{info, warn};

use descripta::config::ServerConfig;
use descripta::server::{create_router, AppState, Ledger};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    descripta::init_tracing();

    let config = ServerConfig::from_env();
    if config.webhook_secret.is_none() {
        warn!("HOOKD_WEBHOOK_SECRET is not set; webhook deliveries will be rejected with 500");
    }

    let ledger = Ledger::open(&config.db_path)?;
    info!(db = %config.db_path.display(), "ledger opened");

    let app = create_router(AppState {
        ledger: Arc::new(ledger),
        webhook_secret: config.webhook_secret,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "hookd listening");
    axum::serve(listener, app).await?;

    Ok(())
}
