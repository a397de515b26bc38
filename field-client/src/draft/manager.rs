//! DraftManager - local order composition
//!
//! Every mutation follows the same path:
//!
//! ```text
//! mutate(f)
//!     ├─ 1. Lock the in-memory copy
//!     ├─ 2. Begin write transaction, load the stored draft
//!     ├─ 3. Apply f (validation errors abort here, nothing is written)
//!     ├─ 4. Store the draft and append one outbox entry
//!     ├─ 5. Commit
//!     └─ 6. Replace the in-memory copy
//! ```

use parking_lot::Mutex;
use shared::models::{Extra, LineDetails, LineItem, NewLine, OrderHeader, OrderOrigin, OrderStatus};
use shared::sync::{
    CreateLineData, CreateOrderData, LineQuantityData, LineRef, OperationPayload,
    OrderInstructionsData, OrderRef, UnitExtraRemovalData, UnitExtrasData, UnitRef,
    UpdateLineData, UpdateOrderData,
};

use super::{DraftLine, DraftOrder, RemoteOrder};
use crate::error::{ClientError, ClientResult};
use crate::storage::OutboxStorage;

pub struct DraftManager {
    storage: OutboxStorage,
    current: Mutex<Option<DraftOrder>>,
}

impl std::fmt::Debug for DraftManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftManager")
            .field("current", &self.current.lock().as_ref().map(|d| d.local_id.clone()))
            .finish_non_exhaustive()
    }
}

impl DraftManager {
    /// Create a manager over `storage`, restoring the active draft if any
    pub fn new(storage: OutboxStorage) -> ClientResult<Self> {
        let current = match storage.active_draft_id()? {
            Some(id) => storage.get_draft(&id)?,
            None => None,
        };
        if let Some(draft) = &current {
            tracing::info!(order = %draft.local_id, "Active draft restored");
        }
        Ok(Self {
            storage,
            current: Mutex::new(current),
        })
    }

    pub fn storage(&self) -> &OutboxStorage {
        &self.storage
    }

    /// Snapshot of the active draft
    pub fn current(&self) -> Option<DraftOrder> {
        self.current.lock().clone()
    }

    /// Reload the active draft from storage (after a sync round)
    pub fn refresh(&self) -> ClientResult<()> {
        let mut current = self.current.lock();
        *current = match self.storage.active_draft_id()? {
            Some(id) => self.storage.get_draft(&id)?,
            None => None,
        };
        Ok(())
    }

    /// Any entry still waiting to be sent
    pub fn has_pending_changes(&self) -> ClientResult<bool> {
        Ok(self.storage.has_pending()?)
    }

    // ========== Draft lifecycle ==========

    /// Start a new order and make it the active draft
    pub fn start_new(
        &self,
        table_ref: impl Into<String>,
        origin: OrderOrigin,
        author: impl Into<String>,
    ) -> ClientResult<DraftOrder> {
        let mut current = self.current.lock();
        let draft = DraftOrder::new(OrderHeader::new(table_ref, origin, author));
        let payload = OperationPayload::CreateOrder(CreateOrderData {
            order_id: draft.local_id.clone(),
            header: draft.header.clone(),
        });

        let txn = self.storage.begin_write()?;
        self.storage.store_draft(&txn, &draft)?;
        self.storage
            .append_operation(&txn, &draft.local_id, &payload, None)?;
        self.storage.set_active_draft(&txn, Some(&draft.local_id))?;
        txn.commit()?;

        tracing::info!(order = %draft.local_id, table = %draft.header.table_ref, "Draft started");
        *current = Some(draft.clone());
        Ok(draft)
    }

    /// Make an order fetched from the server the active draft
    pub fn load_for_edit(&self, remote: RemoteOrder) -> ClientResult<DraftOrder> {
        let mut current = self.current.lock();

        let txn = self.storage.begin_write()?;
        // Keep unsent local work on the same order
        let draft = match self.storage.get_draft_txn(&txn, &remote.order.id)? {
            Some(existing) if !existing.synchronized => existing,
            _ => DraftOrder::from_remote(remote),
        };
        self.storage.store_draft(&txn, &draft)?;
        self.storage.set_active_draft(&txn, Some(&draft.local_id))?;
        txn.commit()?;

        tracing::info!(order = %draft.local_id, "Draft loaded for edit");
        *current = Some(draft.clone());
        Ok(draft)
    }

    /// Drop the active draft and everything it has not sent yet
    pub fn abandon(&self) -> ClientResult<()> {
        let mut current = self.current.lock();
        let draft = current.as_ref().ok_or(ClientError::NoActiveDraft)?;

        let txn = self.storage.begin_write()?;
        let dropped = self.storage.remove_unsent_for_order(&txn, &draft.local_id)?;
        let in_flight = !self
            .storage
            .entries_for_order_txn(&txn, &draft.local_id)?
            .is_empty();
        if !in_flight {
            self.storage.remove_draft(&txn, &draft.local_id)?;
        }
        self.storage.set_active_draft(&txn, None)?;
        txn.commit()?;

        tracing::info!(order = %draft.local_id, dropped, "Draft abandoned");
        *current = None;
        Ok(())
    }

    /// Record deletion of the active order and release it
    pub fn delete_order(&self) -> ClientResult<()> {
        let mut current = self.current.lock();
        let active = current.as_ref().ok_or(ClientError::NoActiveDraft)?;

        let txn = self.storage.begin_write()?;
        let mut draft = self
            .storage
            .get_draft_txn(&txn, &active.local_id)?
            .ok_or(ClientError::NoActiveDraft)?;
        let payload = OperationPayload::DeleteOrder(OrderRef {
            order_id: draft.order_ref().to_string(),
        });
        draft.deleted = true;
        draft.dirty = true;
        draft.synchronized = false;
        self.storage.store_draft(&txn, &draft)?;
        self.storage
            .append_operation(&txn, &draft.local_id, &payload, draft.remote_id.clone())?;
        self.storage.set_active_draft(&txn, None)?;
        txn.commit()?;

        tracing::info!(order = %draft.local_id, "Order deletion recorded");
        *current = None;
        Ok(())
    }

    // ========== Header ==========

    pub fn update_instructions(&self, instructions: impl Into<String>) -> ClientResult<()> {
        let instructions = instructions.into();
        self.mutate(|draft| {
            draft.header.instructions = instructions.clone();
            let payload = OperationPayload::UpdateOrderInstructions(OrderInstructionsData {
                order_id: draft.order_ref().to_string(),
                instructions,
            });
            Ok(((), Some(payload), draft.remote_id.clone()))
        })
    }

    pub fn update_status(&self, status: OrderStatus) -> ClientResult<()> {
        self.mutate(|draft| {
            draft.header.status = status;
            let payload = OperationPayload::UpdateOrder(UpdateOrderData {
                order_id: draft.order_ref().to_string(),
                header: draft.header.clone(),
            });
            Ok(((), Some(payload), draft.remote_id.clone()))
        })
    }

    // ========== Lines ==========

    /// Add a product; a line with the same name, variant and instructions
    /// gains one unit instead
    pub fn add_line(&self, input: NewLine) -> ClientResult<DraftLine> {
        self.mutate(|draft| {
            let order_ref = draft.order_ref().to_string();
            let order_remote = draft.remote_id.clone();

            if let Some(line) = draft
                .lines
                .iter_mut()
                .find(|l| l.item.matches(&input.name, input.variant_index, &input.instructions))
            {
                line.item.push_unit()?;
                line.dirty = true;
                let payload = OperationPayload::UpdateLineQuantity(LineQuantityData {
                    line_id: line.line_ref().to_string(),
                    quantity: line.item.quantity,
                });
                return Ok((line.clone(), Some(payload), line.remote_id.clone()));
            }

            let mut line = DraftLine::new(LineItem::new(input));
            line.remote_order_id = order_remote;
            let payload = OperationPayload::CreateLine(CreateLineData {
                line_id: line.local_id.clone(),
                order_id: order_ref,
                item: line.item.clone(),
            });
            draft.lines.push(line.clone());
            Ok((line, Some(payload), None))
        })
    }

    pub fn update_line(&self, line_id: &str, details: LineDetails) -> ClientResult<()> {
        self.mutate_line(line_id, |line| {
            line.item.apply_details(details.clone());
            Ok(Some(OperationPayload::UpdateLine(UpdateLineData {
                line_id: line.line_ref().to_string(),
                details,
            })))
        })
    }

    pub fn remove_line(&self, line_id: &str) -> ClientResult<()> {
        self.mutate(|draft| {
            let line = draft
                .remove_line(line_id)
                .ok_or_else(|| ClientError::LineNotFound(line_id.to_string()))?;
            let payload = OperationPayload::DeleteLine(LineRef {
                line_id: line.line_ref().to_string(),
            });
            Ok(((), Some(payload), line.remote_id))
        })
    }

    pub fn change_quantity(&self, line_id: &str, quantity: u32) -> ClientResult<()> {
        self.mutate_line(line_id, |line| {
            line.item.resize(quantity)?;
            Ok(Some(OperationPayload::UpdateLineQuantity(LineQuantityData {
                line_id: line.line_ref().to_string(),
                quantity,
            })))
        })
    }

    /// Returns how many units gained the extra; nothing is recorded when
    /// every target unit already had it
    pub fn add_extra_to_units(
        &self,
        line_id: &str,
        unit_indices: &[u32],
        extra: Extra,
    ) -> ClientResult<usize> {
        let mut added = 0;
        self.mutate_line(line_id, |line| {
            added = line.item.add_extra_to_units(unit_indices, &extra)?;
            if added == 0 {
                return Ok(None);
            }
            Ok(Some(OperationPayload::AddExtraToUnits(UnitExtrasData {
                line_id: line.line_ref().to_string(),
                unit_indices: unit_indices.to_vec(),
                extra,
            })))
        })?;
        Ok(added)
    }

    pub fn remove_extra_from_unit(
        &self,
        line_id: &str,
        unit_index: u32,
        extra_name: &str,
    ) -> ClientResult<()> {
        self.mutate_line(line_id, |line| {
            line.item.remove_extra_from_unit(unit_index, extra_name)?;
            Ok(Some(OperationPayload::RemoveExtraFromUnit(UnitExtraRemovalData {
                line_id: line.line_ref().to_string(),
                unit_index,
                extra_name: extra_name.to_string(),
            })))
        })
    }

    /// Remove one unit; the line goes away with its last unit
    pub fn remove_unit(&self, line_id: &str, unit_index: u32) -> ClientResult<()> {
        self.mutate(|draft| {
            let line = draft
                .line_mut(line_id)
                .ok_or_else(|| ClientError::LineNotFound(line_id.to_string()))?;
            let emptied = line.item.remove_unit(unit_index)?;
            line.dirty = true;
            let payload = OperationPayload::RemoveUnit(UnitRef {
                line_id: line.line_ref().to_string(),
                unit_index,
            });
            let remote = line.remote_id.clone();
            if emptied {
                draft.remove_line(line_id);
            }
            Ok(((), Some(payload), remote))
        })
    }

    // ========== Internals ==========

    fn mutate_line<F>(&self, line_id: &str, f: F) -> ClientResult<()>
    where
        F: FnOnce(&mut DraftLine) -> ClientResult<Option<OperationPayload>>,
    {
        self.mutate(|draft| {
            let line = draft
                .line_mut(line_id)
                .ok_or_else(|| ClientError::LineNotFound(line_id.to_string()))?;
            let payload = f(line)?;
            if payload.is_some() {
                line.dirty = true;
            }
            Ok(((), payload, line.remote_id.clone()))
        })
    }

    /// Read-modify-write of the active draft plus its outbox entry
    ///
    /// `f` returns the caller's value, the payload to record (if any) and
    /// the remote id of the affected entity.
    fn mutate<T, F>(&self, f: F) -> ClientResult<T>
    where
        F: FnOnce(&mut DraftOrder) -> ClientResult<(T, Option<OperationPayload>, Option<String>)>,
    {
        let mut current = self.current.lock();
        let active_id = current
            .as_ref()
            .map(|d| d.local_id.clone())
            .ok_or(ClientError::NoActiveDraft)?;

        let txn = self.storage.begin_write()?;
        let mut draft = self
            .storage
            .get_draft_txn(&txn, &active_id)?
            .ok_or(ClientError::NoActiveDraft)?;

        let (value, payload, remote_entity_id) = match f(&mut draft) {
            Ok(result) => result,
            Err(e) => {
                txn.abort().map_err(crate::storage::StorageError::from)?;
                return Err(e);
            }
        };

        if let Some(payload) = payload {
            draft.dirty = true;
            draft.synchronized = false;
            self.storage.store_draft(&txn, &draft)?;
            self.storage
                .append_operation(&txn, &draft.local_id, &payload, remote_entity_id)?;
            txn.commit()?;
            *current = Some(draft);
        } else {
            txn.abort().map_err(crate::storage::StorageError::from)?;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::EntryStatus;
    use rust_decimal::Decimal;
    use shared::models::{LineError, MAX_LINE_QUANTITY};
    use shared::sync::OperationType;

    fn create_test_manager() -> DraftManager {
        DraftManager::new(OutboxStorage::open_in_memory().unwrap()).unwrap()
    }

    fn coffee(instructions: &str) -> NewLine {
        NewLine {
            product_id: "p-coffee".to_string(),
            name: "Coffee".to_string(),
            real_price: Decimal::new(40, 2),
            public_price: Decimal::new(180, 2),
            image_ref: None,
            instructions: instructions.to_string(),
            variant_index: 0,
        }
    }

    fn types(manager: &DraftManager) -> Vec<OperationType> {
        manager
            .storage()
            .entries()
            .unwrap()
            .into_iter()
            .map(|e| e.operation_type)
            .collect()
    }

    #[test]
    fn test_start_new_records_create() {
        let manager = create_test_manager();
        let draft = manager.start_new("T3", OrderOrigin::Primary, "ana").unwrap();

        assert_eq!(manager.current().unwrap().local_id, draft.local_id);
        let entries = manager.storage().entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation_type, OperationType::CreateOrder);
        assert_eq!(entries[0].order_local_id, draft.local_id);
        assert_eq!(entries[0].status, EntryStatus::Pending);
        assert!(manager.has_pending_changes().unwrap());
    }

    #[test]
    fn test_add_line_merges_duplicates() {
        let manager = create_test_manager();
        manager.start_new("T3", OrderOrigin::Primary, "ana").unwrap();

        let first = manager.add_line(coffee("")).unwrap();
        let second = manager.add_line(coffee("")).unwrap();
        let other = manager.add_line(coffee("decaf")).unwrap();

        assert_eq!(first.local_id, second.local_id);
        assert_ne!(first.local_id, other.local_id);
        let draft = manager.current().unwrap();
        assert_eq!(draft.lines.len(), 2);
        assert_eq!(draft.line(&first.local_id).unwrap().item.quantity, 2);
        assert_eq!(
            types(&manager),
            vec![
                OperationType::CreateOrder,
                OperationType::CreateLine,
                OperationType::UpdateLineQuantity,
                OperationType::CreateLine,
            ]
        );
    }

    #[test]
    fn test_failed_validation_appends_nothing() {
        let manager = create_test_manager();
        manager.start_new("T3", OrderOrigin::Primary, "ana").unwrap();
        let line = manager.add_line(coffee("")).unwrap();
        let before = manager.storage().entry_count().unwrap();

        let err = manager.change_quantity(&line.local_id, 0).unwrap_err();
        assert!(matches!(err, ClientError::Line(_)));
        let err = manager.remove_unit(&line.local_id, 9).unwrap_err();
        assert!(matches!(err, ClientError::Line(_)));
        let err = manager.remove_line("local-nope").unwrap_err();
        assert!(matches!(err, ClientError::LineNotFound(_)));

        assert_eq!(manager.storage().entry_count().unwrap(), before);
        assert_eq!(manager.current().unwrap().line(&line.local_id).unwrap().item.quantity, 1);
    }

    #[test]
    fn test_unit_operations() {
        let manager = create_test_manager();
        manager.start_new("T3", OrderOrigin::Primary, "ana").unwrap();
        let line = manager.add_line(coffee("")).unwrap();
        manager.change_quantity(&line.local_id, 3).unwrap();

        let syrup = Extra::new("Syrup", Decimal::new(5, 2), Decimal::new(30, 2));
        assert_eq!(
            manager
                .add_extra_to_units(&line.local_id, &[1, 2], syrup.clone())
                .unwrap(),
            2
        );
        // Already present everywhere: no entry
        let count = manager.storage().entry_count().unwrap();
        assert_eq!(
            manager.add_extra_to_units(&line.local_id, &[1], syrup).unwrap(),
            0
        );
        assert_eq!(manager.storage().entry_count().unwrap(), count);

        manager
            .remove_extra_from_unit(&line.local_id, 2, "Syrup")
            .unwrap();
        manager.remove_unit(&line.local_id, 1).unwrap();

        let draft = manager.current().unwrap();
        let item = &draft.line(&line.local_id).unwrap().item;
        assert_eq!(item.quantity, 2);
        assert!(item.is_contiguous());
        assert!(item.units.iter().all(|u| u.extras.is_empty()));
    }

    #[test]
    fn test_update_line_records_details() {
        let manager = create_test_manager();
        manager.start_new("T3", OrderOrigin::Primary, "ana").unwrap();
        let line = manager.add_line(coffee("")).unwrap();
        manager.change_quantity(&line.local_id, 2).unwrap();

        let mut details = line.item.details();
        details.name = "Flat white".to_string();
        details.instructions = "extra hot".to_string();
        details.public_price = Decimal::new(220, 2);
        manager.update_line(&line.local_id, details).unwrap();

        let draft = manager.current().unwrap();
        let updated = draft.line(&line.local_id).unwrap();
        assert!(updated.dirty);
        assert_eq!(updated.item.name, "Flat white");
        assert_eq!(updated.item.public_price, Decimal::new(220, 2));
        // Details never touch the units
        assert_eq!(updated.item.quantity, 2);
        assert!(updated.item.is_contiguous());

        let entry = manager.storage().entries().unwrap().pop().unwrap();
        assert_eq!(entry.operation_type, OperationType::UpdateLine);
        assert_eq!(entry.local_entity_id, line.local_id);
        assert_eq!(entry.data["details"]["name"], "Flat white");
        assert_eq!(entry.data["details"]["instructions"], "extra hot");

        let err = manager
            .update_line("local-nope", line.item.details())
            .unwrap_err();
        assert!(matches!(err, ClientError::LineNotFound(_)));
    }

    #[test]
    fn test_quantity_cap_applies_to_merges() {
        let manager = create_test_manager();
        manager.start_new("T3", OrderOrigin::Primary, "ana").unwrap();
        let line = manager.add_line(coffee("")).unwrap();

        let err = manager
            .change_quantity(&line.local_id, MAX_LINE_QUANTITY + 1)
            .unwrap_err();
        assert!(matches!(err, ClientError::Line(LineError::InvalidQuantity(_))));

        manager.change_quantity(&line.local_id, MAX_LINE_QUANTITY).unwrap();
        let before = manager.storage().entry_count().unwrap();
        let err = manager.add_line(coffee("")).unwrap_err();
        assert!(matches!(err, ClientError::Line(LineError::InvalidQuantity(_))));
        assert_eq!(manager.storage().entry_count().unwrap(), before);
        assert_eq!(
            manager.current().unwrap().line(&line.local_id).unwrap().item.quantity,
            MAX_LINE_QUANTITY
        );
    }

    #[test]
    fn test_removing_last_unit_removes_line() {
        let manager = create_test_manager();
        manager.start_new("T3", OrderOrigin::Primary, "ana").unwrap();
        let line = manager.add_line(coffee("")).unwrap();

        manager.remove_unit(&line.local_id, 1).unwrap();
        assert!(manager.current().unwrap().lines.is_empty());
        assert_eq!(types(&manager).last(), Some(&OperationType::RemoveUnit));
    }

    #[test]
    fn test_sequence_and_timestamps_agree() {
        let manager = create_test_manager();
        manager.start_new("T3", OrderOrigin::Primary, "ana").unwrap();
        for _ in 0..5 {
            manager.add_line(coffee("")).unwrap();
        }
        manager.update_instructions("window seat").unwrap();
        manager.update_status(OrderStatus::InPreparation).unwrap();

        let entries = manager.storage().entries().unwrap();
        for pair in entries.windows(2) {
            assert!(pair[0].sequence < pair[1].sequence);
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }

    #[test]
    fn test_abandon_drops_unsent_entries() {
        let manager = create_test_manager();
        let kept = manager.start_new("T1", OrderOrigin::Primary, "ana").unwrap();
        let dropped = manager.start_new("T2", OrderOrigin::Primary, "ana").unwrap();
        manager.add_line(coffee("")).unwrap();

        manager.abandon().unwrap();
        assert!(manager.current().is_none());
        let entries = manager.storage().entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].order_local_id, kept.local_id);
        assert!(manager.storage().get_draft(&dropped.local_id).unwrap().is_none());

        assert!(matches!(manager.abandon(), Err(ClientError::NoActiveDraft)));
    }

    #[test]
    fn test_delete_order_records_and_releases() {
        let manager = create_test_manager();
        let draft = manager.start_new("T1", OrderOrigin::Primary, "ana").unwrap();
        manager.delete_order().unwrap();

        assert!(manager.current().is_none());
        assert_eq!(types(&manager).last(), Some(&OperationType::DeleteOrder));
        let stored = manager.storage().get_draft(&draft.local_id).unwrap().unwrap();
        assert!(stored.deleted);
        assert!(matches!(
            manager.add_line(coffee("")),
            Err(ClientError::NoActiveDraft)
        ));
    }

    #[test]
    fn test_active_draft_survives_restart() {
        let storage = OutboxStorage::open_in_memory().unwrap();
        let manager = DraftManager::new(storage.clone()).unwrap();
        let draft = manager.start_new("T5", OrderOrigin::Secondary, "bo").unwrap();
        manager.add_line(coffee("")).unwrap();
        drop(manager);

        let restored = DraftManager::new(storage).unwrap();
        let current = restored.current().unwrap();
        assert_eq!(current.local_id, draft.local_id);
        assert_eq!(current.lines.len(), 1);
    }
}
