//! Sample webhook and usage-limit server
//!
//! A small axum service that receives signed payment-provider webhooks into
//! a SQLite ledger and answers atomic usage-limit decisions. Runs as the
//! `hookd` binary; the client engine never talks to it directly.

pub mod ledger;
pub mod signature;
pub mod webhooks;

pub use ledger::{Decision, Ledger, LedgerAction, LedgerError, LedgerUser, PlanLimits};
pub use webhooks::{create_router, AppState};
