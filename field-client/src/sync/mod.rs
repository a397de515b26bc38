//! Batch synchronization client and its collaborators

pub mod client;
pub mod transport;

pub use client::{SyncClient, SyncReport};
pub use transport::{
    HttpReachability, HttpTransport, Reachability, StaticReachability, SyncTransport,
};
