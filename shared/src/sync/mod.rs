//! Offline sync types shared by field-client and sync-server

pub mod operation;
pub mod protocol;

pub use operation::*;
pub use protocol::*;
