//! Order header shared by drafts and authoritative records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the order was taken
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderOrigin {
    /// Main service point (table / station)
    #[default]
    Primary,
    /// Secondary point of sale (bar, terrace, counter)
    Secondary,
}

/// Order status code
///
/// Transitions are forwarded to the inventory collaborator on the server;
/// the sync engine itself places no restriction on them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Open,
    InPreparation,
    Served,
    Closed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::InPreparation => "IN_PREPARATION",
            Self::Served => "SERVED",
            Self::Closed => "CLOSED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

/// Order header content, independent of local/remote identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderHeader {
    /// Table or station reference
    pub table_ref: String,
    #[serde(default)]
    pub origin: OrderOrigin,
    /// Staff member who opened the order
    pub author: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub status: OrderStatus,
}

impl OrderHeader {
    pub fn new(table_ref: impl Into<String>, origin: OrderOrigin, author: impl Into<String>) -> Self {
        Self {
            table_ref: table_ref.into(),
            origin,
            author: author.into(),
            created_at: Utc::now(),
            instructions: String::new(),
            status: OrderStatus::Open,
        }
    }
}
