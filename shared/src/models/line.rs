//! Order line building blocks
//!
//! A [`LineItem`] owns one [`ConsumptionUnit`] per unit of quantity, and each
//! unit owns its own [`Extra`] list. The structural algorithms below are the
//! single implementation used by both the field client (local replay) and the
//! sync server (authoritative replay).
//!
//! # Invariant
//!
//! After every public mutation the unit indices are exactly `1..=quantity`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on units per line; every unit is materialized
pub const MAX_LINE_QUANTITY: u32 = 999;

/// Line-level structural errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("Consumption unit {0} not found")]
    UnitNotFound(u32),

    #[error("Extra '{name}' not found on unit {index}")]
    ExtraNotFound { index: u32, name: String },

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(u32),
}

/// Extra attached to a consumption unit (or to the whole line, legacy)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extra {
    pub name: String,
    /// Cost to the house
    pub real_cost: Decimal,
    /// Price charged to the customer
    pub public_cost: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

impl Extra {
    pub fn new(name: impl Into<String>, real_cost: Decimal, public_cost: Decimal) -> Self {
        Self {
            name: name.into(),
            real_cost,
            public_cost,
            image_ref: None,
        }
    }
}

/// One countable instance within a line (1-based)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionUnit {
    pub index: u32,
    #[serde(default)]
    pub extras: Vec<Extra>,
}

impl ConsumptionUnit {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            extras: Vec::new(),
        }
    }

    fn has_extra(&self, name: &str) -> bool {
        self.extras.iter().any(|e| e.name == name)
    }
}

/// Content of an order line, independent of local/remote identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Catalog product reference
    pub product_id: String,
    pub name: String,
    pub real_price: Decimal,
    pub public_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub instructions: String,
    /// Selected variant (index into the product's variant list)
    #[serde(default)]
    pub variant_index: u32,
    pub quantity: u32,
    /// General-purpose extras applied to every unit (legacy)
    #[serde(default)]
    pub extras: Vec<Extra>,
    #[serde(default)]
    pub units: Vec<ConsumptionUnit>,
}

/// Input for a new line (everything except quantity and units)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLine {
    pub product_id: String,
    pub name: String,
    pub real_price: Decimal,
    pub public_price: Decimal,
    #[serde(default)]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub variant_index: u32,
}

/// Editable line fields (everything but quantity and units)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineDetails {
    pub name: String,
    pub real_price: Decimal,
    pub public_price: Decimal,
    #[serde(default)]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub variant_index: u32,
    #[serde(default)]
    pub extras: Vec<Extra>,
}

impl LineItem {
    pub fn details(&self) -> LineDetails {
        LineDetails {
            name: self.name.clone(),
            real_price: self.real_price,
            public_price: self.public_price,
            image_ref: self.image_ref.clone(),
            instructions: self.instructions.clone(),
            variant_index: self.variant_index,
            extras: self.extras.clone(),
        }
    }

    pub fn apply_details(&mut self, details: LineDetails) {
        self.name = details.name;
        self.real_price = details.real_price;
        self.public_price = details.public_price;
        self.image_ref = details.image_ref;
        self.instructions = details.instructions;
        self.variant_index = details.variant_index;
        self.extras = details.extras;
    }

    /// New line with quantity 1 and a single unit
    pub fn new(input: NewLine) -> Self {
        Self {
            product_id: input.product_id,
            name: input.name,
            real_price: input.real_price,
            public_price: input.public_price,
            image_ref: input.image_ref,
            instructions: input.instructions,
            variant_index: input.variant_index,
            quantity: 1,
            extras: Vec::new(),
            units: vec![ConsumptionUnit::new(1)],
        }
    }

    /// Duplicate detection used when adding a line to a draft
    pub fn matches(&self, name: &str, variant_index: u32, instructions: &str) -> bool {
        self.name == name && self.variant_index == variant_index && self.instructions == instructions
    }

    /// Renumber units to `1..=n` keeping their relative order by index
    pub fn reindex(&mut self) {
        self.units.sort_by_key(|u| u.index);
        for (i, unit) in self.units.iter_mut().enumerate() {
            unit.index = i as u32 + 1;
        }
        self.quantity = self.units.len() as u32;
    }

    /// Change quantity, growing or shrinking the unit list
    pub fn resize(&mut self, quantity: u32) -> Result<(), LineError> {
        if quantity == 0 || quantity > MAX_LINE_QUANTITY {
            return Err(LineError::InvalidQuantity(quantity));
        }

        self.reindex();
        let current = self.units.len() as u32;
        if quantity > current {
            self.units
                .extend((current + 1..=quantity).map(ConsumptionUnit::new));
        } else {
            self.units.truncate(quantity as usize);
        }
        self.reindex();
        Ok(())
    }

    /// Bring a line received from elsewhere in line with the unit invariant.
    ///
    /// A line without units gets `1..=quantity` fresh units; otherwise the
    /// units win and quantity follows them.
    pub fn normalize(&mut self) -> Result<(), LineError> {
        if self.units.len() > MAX_LINE_QUANTITY as usize {
            return Err(LineError::InvalidQuantity(self.units.len() as u32));
        }
        if self.units.is_empty() {
            if self.quantity == 0 || self.quantity > MAX_LINE_QUANTITY {
                return Err(LineError::InvalidQuantity(self.quantity));
            }
            self.units = (1..=self.quantity).map(ConsumptionUnit::new).collect();
        }
        self.reindex();
        Ok(())
    }

    /// Append one unit (duplicate merge on add)
    pub fn push_unit(&mut self) -> Result<(), LineError> {
        self.reindex();
        if self.units.len() >= MAX_LINE_QUANTITY as usize {
            return Err(LineError::InvalidQuantity(self.units.len() as u32 + 1));
        }
        self.units.push(ConsumptionUnit::new(self.units.len() as u32 + 1));
        self.quantity = self.units.len() as u32;
        Ok(())
    }

    pub fn unit(&self, index: u32) -> Option<&ConsumptionUnit> {
        self.units.iter().find(|u| u.index == index)
    }

    /// Attach `extra` to every unit in `indices`, skipping units that already
    /// carry an extra with the same name.
    ///
    /// All indices are validated before anything changes. Returns the number
    /// of units that actually received the extra.
    pub fn add_extra_to_units(&mut self, indices: &[u32], extra: &Extra) -> Result<usize, LineError> {
        if let Some(missing) = indices.iter().find(|i| self.unit(**i).is_none()) {
            return Err(LineError::UnitNotFound(*missing));
        }

        let mut added = 0;
        for unit in self.units.iter_mut().filter(|u| indices.contains(&u.index)) {
            if !unit.has_extra(&extra.name) {
                unit.extras.push(extra.clone());
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn remove_extra_from_unit(&mut self, index: u32, name: &str) -> Result<Extra, LineError> {
        let unit = self
            .units
            .iter_mut()
            .find(|u| u.index == index)
            .ok_or(LineError::UnitNotFound(index))?;
        let pos = unit
            .extras
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| LineError::ExtraNotFound {
                index,
                name: name.to_string(),
            })?;
        Ok(unit.extras.remove(pos))
    }

    /// Remove a unit and re-index the survivors.
    ///
    /// Returns `true` when the line has no units left and must be removed by
    /// the owner.
    pub fn remove_unit(&mut self, index: u32) -> Result<bool, LineError> {
        let pos = self
            .units
            .iter()
            .position(|u| u.index == index)
            .ok_or(LineError::UnitNotFound(index))?;
        self.units.remove(pos);
        self.reindex();
        Ok(self.units.is_empty())
    }

    /// Customer-facing total for the line
    pub fn total(&self) -> Decimal {
        let qty = Decimal::from(self.quantity);
        let legacy: Decimal = self.extras.iter().map(|e| e.public_cost).sum();
        let per_unit: Decimal = self
            .units
            .iter()
            .flat_map(|u| u.extras.iter())
            .map(|e| e.public_cost)
            .sum();
        (self.public_price + legacy) * qty + per_unit
    }

    /// True when the unit indices are exactly `1..=quantity`
    pub fn is_contiguous(&self) -> bool {
        let mut indices: Vec<u32> = self.units.iter().map(|u| u.index).collect();
        indices.sort_unstable();
        indices.len() as u32 == self.quantity
            && indices.iter().enumerate().all(|(i, idx)| *idx == i as u32 + 1)
    }
}
