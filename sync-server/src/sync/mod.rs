//! Batch replay engine

pub mod handlers;
pub mod id_mapping;
pub mod inventory;
pub mod processor;

pub use id_mapping::IdMapping;
pub use inventory::{InventoryHook, NoopInventory};
pub use processor::BatchProcessor;
