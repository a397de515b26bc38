//! Outbox operation kinds and their typed payloads
//!
//! Every mutation of a draft order is recorded as one [`OperationPayload`].
//! On the wire the kind travels as a string (`operationType`) and the payload
//! as raw JSON (`data`); [`OperationPayload::from_parts`] turns the pair back
//! into the typed variant, so a malformed payload is rejected per operation.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::{Extra, LineDetails, LineItem, OrderHeader};

/// Operation kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    CreateOrder,
    UpdateOrder,
    DeleteOrder,
    UpdateOrderInstructions,
    CreateLine,
    UpdateLine,
    DeleteLine,
    UpdateLineQuantity,
    AddExtraToUnits,
    RemoveExtraFromUnit,
    RemoveUnit,
}

impl OperationType {
    pub const ALL: [OperationType; 11] = [
        Self::CreateOrder,
        Self::UpdateOrder,
        Self::DeleteOrder,
        Self::UpdateOrderInstructions,
        Self::CreateLine,
        Self::UpdateLine,
        Self::DeleteLine,
        Self::UpdateLineQuantity,
        Self::AddExtraToUnits,
        Self::RemoveExtraFromUnit,
        Self::RemoveUnit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateOrder => "CREATE_ORDER",
            Self::UpdateOrder => "UPDATE_ORDER",
            Self::DeleteOrder => "DELETE_ORDER",
            Self::UpdateOrderInstructions => "UPDATE_ORDER_INSTRUCTIONS",
            Self::CreateLine => "CREATE_LINE",
            Self::UpdateLine => "UPDATE_LINE",
            Self::DeleteLine => "DELETE_LINE",
            Self::UpdateLineQuantity => "UPDATE_LINE_QUANTITY",
            Self::AddExtraToUnits => "ADD_EXTRA_TO_UNITS",
            Self::RemoveExtraFromUnit => "REMOVE_EXTRA_FROM_UNIT",
            Self::RemoveUnit => "REMOVE_UNIT",
        }
    }

    /// Create operations produce a new remote id
    pub fn is_create(&self) -> bool {
        matches!(self, Self::CreateOrder | Self::CreateLine)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown operation type string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOperationType(pub String);

impl fmt::Display for UnknownOperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown operation type: {}", self.0)
    }
}

impl std::error::Error for UnknownOperationType {}

impl FromStr for OperationType {
    type Err = UnknownOperationType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownOperationType(s.to_string()))
    }
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrderData {
    /// Local id of the new order
    pub order_id: String,
    pub header: OrderHeader,
}

/// Full header replacement (status and table changes)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOrderData {
    pub order_id: String,
    pub header: OrderHeader,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRef {
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderInstructionsData {
    pub order_id: String,
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateLineData {
    /// Local id of the new line
    pub line_id: String,
    /// Parent order (local id until the order is synchronized)
    pub order_id: String,
    pub item: LineItem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateLineData {
    pub line_id: String,
    pub details: LineDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRef {
    pub line_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineQuantityData {
    pub line_id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitExtrasData {
    pub line_id: String,
    pub unit_indices: Vec<u32>,
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitExtraRemovalData {
    pub line_id: String,
    pub unit_index: u32,
    pub extra_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRef {
    pub line_id: String,
    pub unit_index: u32,
}

/// Typed operation payload, one variant per [`OperationType`]
#[derive(Debug, Clone, PartialEq)]
pub enum OperationPayload {
    CreateOrder(CreateOrderData),
    UpdateOrder(UpdateOrderData),
    DeleteOrder(OrderRef),
    UpdateOrderInstructions(OrderInstructionsData),
    CreateLine(CreateLineData),
    UpdateLine(UpdateLineData),
    DeleteLine(LineRef),
    UpdateLineQuantity(LineQuantityData),
    AddExtraToUnits(UnitExtrasData),
    RemoveExtraFromUnit(UnitExtraRemovalData),
    RemoveUnit(UnitRef),
}

fn decode<T: DeserializeOwned>(data: serde_json::Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(data)
}

impl OperationPayload {
    pub fn operation_type(&self) -> OperationType {
        match self {
            Self::CreateOrder(_) => OperationType::CreateOrder,
            Self::UpdateOrder(_) => OperationType::UpdateOrder,
            Self::DeleteOrder(_) => OperationType::DeleteOrder,
            Self::UpdateOrderInstructions(_) => OperationType::UpdateOrderInstructions,
            Self::CreateLine(_) => OperationType::CreateLine,
            Self::UpdateLine(_) => OperationType::UpdateLine,
            Self::DeleteLine(_) => OperationType::DeleteLine,
            Self::UpdateLineQuantity(_) => OperationType::UpdateLineQuantity,
            Self::AddExtraToUnits(_) => OperationType::AddExtraToUnits,
            Self::RemoveExtraFromUnit(_) => OperationType::RemoveExtraFromUnit,
            Self::RemoveUnit(_) => OperationType::RemoveUnit,
        }
    }

    /// Id of the aggregate member this operation affects
    pub fn entity_id(&self) -> &str {
        match self {
            Self::CreateOrder(d) => &d.order_id,
            Self::UpdateOrder(d) => &d.order_id,
            Self::DeleteOrder(d) => &d.order_id,
            Self::UpdateOrderInstructions(d) => &d.order_id,
            Self::CreateLine(d) => &d.line_id,
            Self::UpdateLine(d) => &d.line_id,
            Self::DeleteLine(d) => &d.line_id,
            Self::UpdateLineQuantity(d) => &d.line_id,
            Self::AddExtraToUnits(d) => &d.line_id,
            Self::RemoveExtraFromUnit(d) => &d.line_id,
            Self::RemoveUnit(d) => &d.line_id,
        }
    }

    /// Serialize the payload body (the wire `data` field)
    pub fn to_data(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::CreateOrder(d) => serde_json::to_value(d),
            Self::UpdateOrder(d) => serde_json::to_value(d),
            Self::DeleteOrder(d) => serde_json::to_value(d),
            Self::UpdateOrderInstructions(d) => serde_json::to_value(d),
            Self::CreateLine(d) => serde_json::to_value(d),
            Self::UpdateLine(d) => serde_json::to_value(d),
            Self::DeleteLine(d) => serde_json::to_value(d),
            Self::UpdateLineQuantity(d) => serde_json::to_value(d),
            Self::AddExtraToUnits(d) => serde_json::to_value(d),
            Self::RemoveExtraFromUnit(d) => serde_json::to_value(d),
            Self::RemoveUnit(d) => serde_json::to_value(d),
        }
    }

    /// Rebuild the typed payload from its kind and raw body
    pub fn from_parts(
        operation_type: OperationType,
        data: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        Ok(match operation_type {
            OperationType::CreateOrder => Self::CreateOrder(decode(data)?),
            OperationType::UpdateOrder => Self::UpdateOrder(decode(data)?),
            OperationType::DeleteOrder => Self::DeleteOrder(decode(data)?),
            OperationType::UpdateOrderInstructions => Self::UpdateOrderInstructions(decode(data)?),
            OperationType::CreateLine => Self::CreateLine(decode(data)?),
            OperationType::UpdateLine => Self::UpdateLine(decode(data)?),
            OperationType::DeleteLine => Self::DeleteLine(decode(data)?),
            OperationType::UpdateLineQuantity => Self::UpdateLineQuantity(decode(data)?),
            OperationType::AddExtraToUnits => Self::AddExtraToUnits(decode(data)?),
            OperationType::RemoveExtraFromUnit => Self::RemoveExtraFromUnit(decode(data)?),
            OperationType::RemoveUnit => Self::RemoveUnit(decode(data)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_strings_parse_back() {
        for t in OperationType::ALL {
            assert_eq!(t.as_str().parse::<OperationType>().unwrap(), t);
            // serde and as_str agree
            assert_eq!(serde_json::to_value(t).unwrap(), json!(t.as_str()));
        }
        assert!("SPLIT_ORDER".parse::<OperationType>().is_err());
    }

    #[test]
    fn test_only_creates_are_create() {
        let creates: Vec<_> = OperationType::ALL.into_iter().filter(|t| t.is_create()).collect();
        assert_eq!(creates, vec![OperationType::CreateOrder, OperationType::CreateLine]);
    }

    #[test]
    fn test_from_parts_checks_shape() {
        let ok = OperationPayload::from_parts(
            OperationType::UpdateLineQuantity,
            json!({"line_id": "l-1", "quantity": 3}),
        )
        .unwrap();
        assert_eq!(ok.operation_type(), OperationType::UpdateLineQuantity);
        assert_eq!(ok.entity_id(), "l-1");

        // Right keys for another kind, wrong for this one
        let err = OperationPayload::from_parts(
            OperationType::RemoveUnit,
            json!({"line_id": "l-1", "quantity": 3}),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_to_data_is_body_only() {
        let payload = OperationPayload::DeleteLine(LineRef {
            line_id: "l-9".to_string(),
        });
        assert_eq!(payload.to_data().unwrap(), json!({"line_id": "l-9"}));
    }
}
