//! Inventory collaborator
//!
//! Stock deduction runs outside the sync engine. The processor only tells it
//! when an order changes status.

use shared::models::OrderStatus;

pub trait InventoryHook: Send + Sync {
    /// Called after an order status change has been stored
    fn on_status_change(&self, order_id: &str, from: OrderStatus, to: OrderStatus);
}

/// Hook that does nothing (no inventory integration configured)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInventory;

impl InventoryHook for NoopInventory {
    fn on_status_change(&self, order_id: &str, from: OrderStatus, to: OrderStatus) {
        tracing::debug!(
            order_id,
            from = from.as_str(),
            to = to.as_str(),
            "Status change (no inventory hook)"
        );
    }
}
