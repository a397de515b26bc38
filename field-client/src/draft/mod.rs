//! Draft aggregates
//!
//! A draft is the device's working copy of one order and its lines. It is
//! persisted next to the outbox so the pair survives restarts, and every
//! mutation of it appends exactly one outbox entry.

pub mod manager;

pub use manager::DraftManager;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::models::{LineItem, OrderHeader};
use shared::util::new_local_id;

/// Local working copy of an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftOrder {
    /// Stable device-side id (the remote id for orders loaded for edit)
    pub local_id: String,
    #[serde(default)]
    pub remote_id: Option<String>,
    pub header: OrderHeader,
    #[serde(default)]
    pub lines: Vec<DraftLine>,
    /// Nothing left to send for this aggregate
    #[serde(default)]
    pub synchronized: bool,
    /// Changed since the last accepted round
    #[serde(default)]
    pub dirty: bool,
    /// Deletion recorded; pruned once the server accepts it
    #[serde(default)]
    pub deleted: bool,
}

impl DraftOrder {
    pub fn new(header: OrderHeader) -> Self {
        Self {
            local_id: new_local_id(),
            remote_id: None,
            header,
            lines: Vec::new(),
            synchronized: false,
            dirty: true,
            deleted: false,
        }
    }

    /// Draft mirroring an order that already exists on the server
    pub fn from_remote(remote: RemoteOrder) -> Self {
        let order_id = remote.order.id;
        let lines = remote
            .lines
            .into_iter()
            .map(|line| DraftLine {
                local_id: line.id.clone(),
                remote_id: Some(line.id),
                remote_order_id: Some(order_id.clone()),
                dirty: false,
                item: line.item,
            })
            .collect();
        Self {
            local_id: order_id.clone(),
            remote_id: Some(order_id),
            header: remote.order.header,
            lines,
            synchronized: true,
            dirty: false,
            deleted: false,
        }
    }

    /// Id to put in outgoing payloads
    pub fn order_ref(&self) -> &str {
        self.remote_id.as_deref().unwrap_or(&self.local_id)
    }

    /// Find a line by its local or remote id
    pub fn line(&self, id: &str) -> Option<&DraftLine> {
        self.lines.iter().find(|l| l.has_id(id))
    }

    pub fn line_mut(&mut self, id: &str) -> Option<&mut DraftLine> {
        self.lines.iter_mut().find(|l| l.has_id(id))
    }

    pub fn remove_line(&mut self, id: &str) -> Option<DraftLine> {
        let pos = self.lines.iter().position(|l| l.has_id(id))?;
        Some(self.lines.remove(pos))
    }

    /// Customer-facing total
    pub fn total(&self) -> Decimal {
        self.lines.iter().map(|l| l.item.total()).sum()
    }

    /// Mark the aggregate as fully accepted by the server
    pub fn mark_synchronized(&mut self) {
        self.synchronized = true;
        self.dirty = false;
        for line in &mut self.lines {
            line.dirty = false;
        }
    }
}

/// Local working copy of a line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftLine {
    pub local_id: String,
    #[serde(default)]
    pub remote_id: Option<String>,
    /// Parent order's remote id, once known
    #[serde(default)]
    pub remote_order_id: Option<String>,
    #[serde(default)]
    pub dirty: bool,
    pub item: LineItem,
}

impl DraftLine {
    pub fn new(item: LineItem) -> Self {
        Self {
            local_id: new_local_id(),
            remote_id: None,
            remote_order_id: None,
            dirty: true,
            item,
        }
    }

    pub fn line_ref(&self) -> &str {
        self.remote_id.as_deref().unwrap_or(&self.local_id)
    }

    fn has_id(&self, id: &str) -> bool {
        self.local_id == id || self.remote_id.as_deref() == Some(id)
    }
}

/// Order as served by `GET /api/orders/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteOrder {
    pub order: RemoteOrderRecord,
    #[serde(default)]
    pub lines: Vec<RemoteLineRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteOrderRecord {
    pub id: String,
    pub header: OrderHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteLineRecord {
    pub id: String,
    pub order_id: String,
    pub item: LineItem,
}
