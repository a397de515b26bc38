//! sync-server: authoritative side of the offline order sync
//!
//! Receives outbox batches from field devices, replays them against a redb
//! store in client order, assigns remote ids and reports per-operation
//! outcomes.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod state;
pub mod sync;
pub mod utils;

pub use api::create_router;
pub use config::Config;
pub use state::AppState;
