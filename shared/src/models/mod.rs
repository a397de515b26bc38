//! Order aggregate building blocks
//!
//! Shared between the field client (drafts) and the sync server
//! (authoritative records). Identity (local id, remote id) is owned by the
//! side that stores the data, not by these types.

pub mod line;
pub mod order_header;

// Re-exports
pub use line::*;
pub use order_header::*;
