//! Per-operation handlers
//!
//! Every handler resolves the ids it receives (batch mapping, then the
//! persisted local id index, then the literal value), applies one change to
//! the store and returns the remote id of the entity it touched.

use shared::models::OrderStatus;
use shared::sync::{
    CreateLineData, CreateOrderData, LineQuantityData, LineRef, OperationPayload,
    OrderInstructionsData, OrderRef, UnitExtraRemovalData, UnitExtrasData, UnitRef,
    UpdateLineData, UpdateOrderData,
};
use shared::util::{now_millis, snowflake_id};
use shared::AppError;

use super::id_mapping::IdMapping;
use super::inventory::InventoryHook;
use crate::db::{LineRecord, OrderRecord, OrderStore, StoreResult};
use crate::error::ServiceResult;

/// Everything a handler may touch while one batch runs
pub struct BatchContext<'a> {
    pub store: &'a OrderStore,
    pub mapping: &'a mut IdMapping,
    pub inventory: &'a dyn InventoryHook,
}

impl BatchContext<'_> {
    /// Translate an id the client sent into the id the store knows
    pub fn resolve(&self, id: &str) -> ServiceResult<String> {
        if let Some(remote) = self.mapping.get(id) {
            return Ok(remote.to_string());
        }
        if let Some(remote) = self.store.remote_id_for_local(id)? {
            return Ok(remote);
        }
        Ok(id.to_string())
    }

    fn load_order(&self, id: &str) -> ServiceResult<OrderRecord> {
        let remote = self.resolve(id)?;
        self.store
            .get_order(&remote)?
            .ok_or_else(|| AppError::order_not_found(id).into())
    }

    fn load_line(&self, id: &str) -> ServiceResult<LineRecord> {
        let remote = self.resolve(id)?;
        self.store
            .get_line(&remote)?
            .ok_or_else(|| AppError::line_not_found(id).into())
    }
}

/// Apply one operation; returns the remote id of the affected entity
pub fn execute(ctx: &mut BatchContext<'_>, payload: OperationPayload) -> ServiceResult<Option<String>> {
    match payload {
        OperationPayload::CreateOrder(d) => create_order(ctx, d),
        OperationPayload::UpdateOrder(d) => update_order(ctx, d),
        OperationPayload::DeleteOrder(d) => delete_order(ctx, d),
        OperationPayload::UpdateOrderInstructions(d) => update_order_instructions(ctx, d),
        OperationPayload::CreateLine(d) => create_line(ctx, d),
        OperationPayload::UpdateLine(d) => update_line(ctx, d),
        OperationPayload::DeleteLine(d) => delete_line(ctx, d),
        OperationPayload::UpdateLineQuantity(d) => update_line_quantity(ctx, d),
        OperationPayload::AddExtraToUnits(d) => add_extra_to_units(ctx, d),
        OperationPayload::RemoveExtraFromUnit(d) => remove_extra_from_unit(ctx, d),
        OperationPayload::RemoveUnit(d) => remove_unit(ctx, d),
    }
}

/// New remote id not yet used in its table
fn fresh_id(taken: impl Fn(&str) -> StoreResult<bool>) -> ServiceResult<String> {
    loop {
        let id = snowflake_id().to_string();
        if !taken(&id)? {
            return Ok(id);
        }
    }
}

// ========== Orders ==========

fn create_order(ctx: &mut BatchContext<'_>, data: CreateOrderData) -> ServiceResult<Option<String>> {
    // Replayed create: hand back the id assigned the first time
    if let Some(existing) = ctx.store.remote_id_for_local(&data.order_id)? {
        tracing::info!(local_id = %data.order_id, remote_id = %existing, "Create order replayed");
        ctx.mapping.record(data.order_id, existing.clone());
        return Ok(Some(existing));
    }

    let record = OrderRecord {
        id: fresh_id(|id| ctx.store.get_order(id).map(|o| o.is_some()))?,
        local_id: Some(data.order_id.clone()),
        header: data.header,
        updated_at: now_millis(),
    };
    ctx.store.insert_order(&record)?;
    ctx.mapping.record(data.order_id, record.id.clone());
    Ok(Some(record.id))
}

fn update_order(ctx: &mut BatchContext<'_>, data: UpdateOrderData) -> ServiceResult<Option<String>> {
    let mut record = ctx.load_order(&data.order_id)?;
    let previous: OrderStatus = record.header.status;

    record.header = data.header;
    record.updated_at = now_millis();
    ctx.store.put_order(&record)?;

    if previous != record.header.status {
        ctx.inventory
            .on_status_change(&record.id, previous, record.header.status);
    }
    Ok(Some(record.id))
}

fn delete_order(ctx: &mut BatchContext<'_>, data: OrderRef) -> ServiceResult<Option<String>> {
    let remote = ctx.resolve(&data.order_id)?;
    if !ctx.store.delete_order(&remote)? {
        return Err(AppError::order_not_found(&data.order_id).into());
    }
    Ok(Some(remote))
}

fn update_order_instructions(
    ctx: &mut BatchContext<'_>,
    data: OrderInstructionsData,
) -> ServiceResult<Option<String>> {
    let mut record = ctx.load_order(&data.order_id)?;
    record.header.instructions = data.instructions;
    record.updated_at = now_millis();
    ctx.store.put_order(&record)?;
    Ok(Some(record.id))
}

// ========== Lines ==========

fn create_line(ctx: &mut BatchContext<'_>, data: CreateLineData) -> ServiceResult<Option<String>> {
    if let Some(existing) = ctx.store.remote_id_for_local(&data.line_id)? {
        tracing::info!(local_id = %data.line_id, remote_id = %existing, "Create line replayed");
        ctx.mapping.record(data.line_id, existing.clone());
        return Ok(Some(existing));
    }

    let order = ctx.load_order(&data.order_id)?;
    let mut item = data.item;
    item.normalize()?;

    let record = LineRecord {
        id: fresh_id(|id| ctx.store.get_line(id).map(|l| l.is_some()))?,
        local_id: Some(data.line_id.clone()),
        order_id: order.id,
        item,
        updated_at: now_millis(),
    };
    ctx.store.insert_line(&record)?;
    ctx.mapping.record(data.line_id, record.id.clone());
    Ok(Some(record.id))
}

fn update_line(ctx: &mut BatchContext<'_>, data: UpdateLineData) -> ServiceResult<Option<String>> {
    let mut record = ctx.load_line(&data.line_id)?;
    record.item.apply_details(data.details);
    record.updated_at = now_millis();
    ctx.store.put_line(&record)?;
    Ok(Some(record.id))
}

fn delete_line(ctx: &mut BatchContext<'_>, data: LineRef) -> ServiceResult<Option<String>> {
    let remote = ctx.resolve(&data.line_id)?;
    if !ctx.store.delete_line(&remote)? {
        return Err(AppError::line_not_found(&data.line_id).into());
    }
    Ok(Some(remote))
}

fn update_line_quantity(
    ctx: &mut BatchContext<'_>,
    data: LineQuantityData,
) -> ServiceResult<Option<String>> {
    let mut record = ctx.load_line(&data.line_id)?;
    record.item.resize(data.quantity)?;
    record.updated_at = now_millis();
    ctx.store.put_line(&record)?;
    Ok(Some(record.id))
}

fn add_extra_to_units(ctx: &mut BatchContext<'_>, data: UnitExtrasData) -> ServiceResult<Option<String>> {
    let mut record = ctx.load_line(&data.line_id)?;
    let added = record.item.add_extra_to_units(&data.unit_indices, &data.extra)?;
    if added > 0 {
        record.updated_at = now_millis();
        ctx.store.put_line(&record)?;
    }
    Ok(Some(record.id))
}

fn remove_extra_from_unit(
    ctx: &mut BatchContext<'_>,
    data: UnitExtraRemovalData,
) -> ServiceResult<Option<String>> {
    let mut record = ctx.load_line(&data.line_id)?;
    record
        .item
        .remove_extra_from_unit(data.unit_index, &data.extra_name)?;
    record.updated_at = now_millis();
    ctx.store.put_line(&record)?;
    Ok(Some(record.id))
}

/// Remove one unit; a line left without units is deleted
fn remove_unit(ctx: &mut BatchContext<'_>, data: UnitRef) -> ServiceResult<Option<String>> {
    let mut record = ctx.load_line(&data.line_id)?;
    let emptied = record.item.remove_unit(data.unit_index)?;
    if emptied {
        tracing::debug!(line_id = %record.id, "Last unit removed, deleting line");
        ctx.store.delete_line(&record.id)?;
    } else {
        record.updated_at = now_millis();
        ctx.store.put_line(&record)?;
    }
    Ok(Some(record.id))
}
