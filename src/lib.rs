pub mod auth;
pub mod balance;
pub mod client;
pub mod config;
pub mod constants;
pub mod database;
pub mod drivers;
pub mod location;
pub mod models;
pub mod navigation;
pub mod operators;
pub mod router;
pub mod session_store;
pub mod transaction;
pub mod trips;
pub mod utils;
pub mod watcher;

use time::UtcOffset;

// Re-export types at crate root for convenient importing
pub use crate::database::Db;
pub use crate::transaction::{TransactionError, with_transaction};

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Dispatch database holding users, profiles, trips and the balance ledger
    pub db: Db,
    /// Offset used to compute "today" for reports
    pub local_offset: UtcOffset,
}
