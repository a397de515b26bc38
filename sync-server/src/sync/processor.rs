//! Batch processor
//!
//! Replays one submitted batch against the store:
//!
//! 1. Reject oversized batches
//! 2. Order operations by `(timestampLocal, sequence)` (stable)
//! 3. Run each operation on its own; a failure is recorded and the next
//!    operation still runs
//! 4. Write the audit record, then answer
//!
//! The processor is synchronous; the HTTP layer runs it on the blocking
//! pool so a batch finishes even when the client goes away mid-request.

use chrono::Utc;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::sync::{
    OperationPayload, OperationResult, OverallState, SyncBatchData, SyncBatchRequest,
    SyncOperation, SyncSummary,
};
use std::sync::Arc;

use super::handlers::{self, BatchContext};
use super::id_mapping::IdMapping;
use super::inventory::InventoryHook;
use crate::db::{AuditLog, OrderStore, SyncLogRecord};

pub struct BatchProcessor {
    store: OrderStore,
    audit: AuditLog,
    inventory: Arc<dyn InventoryHook>,
    max_operations: usize,
}

impl std::fmt::Debug for BatchProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("max_operations", &self.max_operations)
            .finish_non_exhaustive()
    }
}

impl BatchProcessor {
    pub fn new(
        store: OrderStore,
        audit: AuditLog,
        inventory: Arc<dyn InventoryHook>,
        max_operations: usize,
    ) -> Self {
        Self {
            store,
            audit,
            inventory,
            max_operations,
        }
    }

    pub fn max_operations(&self) -> usize {
        self.max_operations
    }

    /// Process one batch submitted by `operator`
    pub fn process(&self, operator: &str, request: SyncBatchRequest) -> AppResult<SyncBatchData> {
        let submitted = request.operations;
        if submitted.len() > self.max_operations {
            return Err(AppError::with_message(
                ErrorCode::BatchTooLarge,
                format!(
                    "Batch too large: {} operations (max {})",
                    submitted.len(),
                    self.max_operations
                ),
            ));
        }

        let received_at = Utc::now();
        let mut ordered: Vec<&SyncOperation> = submitted.iter().collect();
        ordered.sort_by_key(|op| (op.timestamp_local, op.sequence));

        let mut mapping = IdMapping::new();
        let mut results = Vec::with_capacity(ordered.len());
        {
            let mut ctx = BatchContext {
                store: &self.store,
                mapping: &mut mapping,
                inventory: self.inventory.as_ref(),
            };
            for op in ordered {
                results.push(Self::run_one(&mut ctx, op));
            }
        }

        let summary = SyncSummary::from_results(&results);
        let overall_state = OverallState::from_summary(&summary);
        let id_mapping = mapping.into_map();

        let record = SyncLogRecord {
            id: uuid::Uuid::new_v4().to_string(),
            operator: operator.to_string(),
            received_at,
            operations: submitted,
            results,
            summary,
            overall_state,
            id_mapping,
        };
        self.audit.append(&record).map_err(|e| {
            tracing::error!(error = %e, "Failed to write sync audit record");
            AppError::with_message(ErrorCode::InternalError, "Failed to write sync audit record")
        })?;

        tracing::info!(
            sync_log_id = %record.id,
            operator,
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Sync batch processed"
        );

        Ok(SyncBatchData {
            sync_log_id: record.id,
            summary,
            overall_state,
            results: record.results,
            id_mapping: record.id_mapping,
        })
    }

    fn run_one(ctx: &mut BatchContext<'_>, op: &SyncOperation) -> OperationResult {
        let Some(operation_type) = op.parsed_type() else {
            let err = AppError::with_message(
                ErrorCode::UnknownOperationType,
                format!("Unknown operation type: {}", op.operation_type),
            );
            return Self::reject(op, err);
        };

        let payload = match OperationPayload::from_parts(operation_type, op.data.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                let err = AppError::with_message(
                    ErrorCode::InvalidPayload,
                    format!("Invalid payload: {e}"),
                );
                return Self::reject(op, err);
            }
        };

        match handlers::execute(ctx, payload) {
            Ok(remote_id) => OperationResult::succeeded(op, remote_id),
            Err(e) => Self::reject(op, e.into()),
        }
    }

    fn reject(op: &SyncOperation, err: AppError) -> OperationResult {
        tracing::warn!(
            operation_type = %op.operation_type,
            id_local = %op.id_local,
            code = %err.code,
            "Operation failed: {}",
            err.message
        );
        OperationResult::failed(op, &err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::inventory::NoopInventory;
    use chrono::{DateTime, Duration};
    use rust_decimal::Decimal;
    use shared::models::{LineItem, NewLine, OrderHeader, OrderOrigin};
    use shared::sync::{
        CreateLineData, CreateOrderData, LineQuantityData, OperationOutcome, OrderRef,
    };

    fn processor() -> (BatchProcessor, OrderStore, AuditLog) {
        let db = crate::db::open_in_memory().unwrap();
        let store = OrderStore::new(db.clone());
        let audit = AuditLog::new(db);
        let processor = BatchProcessor::new(
            store.clone(),
            audit.clone(),
            Arc::new(NoopInventory),
            shared::sync::MAX_SYNC_BATCH_OPERATIONS,
        );
        (processor, store, audit)
    }

    fn base_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn op(payload: OperationPayload, offset_secs: i64, sequence: u64) -> SyncOperation {
        SyncOperation::new(
            &payload,
            base_time() + Duration::seconds(offset_secs),
            Some(sequence),
        )
        .unwrap()
    }

    fn create_order(local: &str) -> OperationPayload {
        OperationPayload::CreateOrder(CreateOrderData {
            order_id: local.to_string(),
            header: OrderHeader::new("T2", OrderOrigin::Primary, "ana"),
        })
    }

    fn create_line(local: &str, order: &str) -> OperationPayload {
        OperationPayload::CreateLine(CreateLineData {
            line_id: local.to_string(),
            order_id: order.to_string(),
            item: LineItem::new(NewLine {
                product_id: "p-1".to_string(),
                name: "Lemonade".to_string(),
                real_price: Decimal::new(50, 2),
                public_price: Decimal::new(250, 2),
                image_ref: None,
                instructions: String::new(),
                variant_index: 0,
            }),
        })
    }

    fn set_quantity(local: &str, quantity: u32) -> OperationPayload {
        OperationPayload::UpdateLineQuantity(LineQuantityData {
            line_id: local.to_string(),
            quantity,
        })
    }

    fn request(operations: Vec<SyncOperation>) -> SyncBatchRequest {
        SyncBatchRequest { operations }
    }

    #[test]
    fn test_partial_failure_continues() {
        let (processor, store, _) = processor();
        let data = processor
            .process(
                "ana",
                request(vec![
                    op(create_order("lo-1"), 0, 1),
                    op(set_quantity("ll-missing", 2), 1, 2),
                    op(create_line("ll-1", "lo-1"), 2, 3),
                ]),
            )
            .unwrap();

        assert_eq!(data.summary.total, 3);
        assert_eq!(data.summary.succeeded, 2);
        assert_eq!(data.summary.failed, 1);
        assert_eq!(data.overall_state, OverallState::CompletedWithErrors);
        assert_eq!(data.results[1].outcome, OperationOutcome::Error);
        assert!(data.results[1].error.is_some());
        assert_eq!(data.results[1].sequence, Some(2));

        let order_id = &data.id_mapping["lo-1"];
        assert_eq!(store.lines_for_order(order_id).unwrap().len(), 1);
    }

    #[test]
    fn test_line_references_new_order_remote_id() {
        let (processor, store, _) = processor();
        let data = processor
            .process(
                "ana",
                request(vec![
                    op(create_order("lo-1"), 0, 1),
                    op(create_line("ll-1", "lo-1"), 1, 2),
                ]),
            )
            .unwrap();

        assert_eq!(data.overall_state, OverallState::Completed);
        let order_id = data.id_mapping["lo-1"].clone();
        let line_id = data.id_mapping["ll-1"].clone();
        assert_eq!(data.results[0].remote_id.as_deref(), Some(order_id.as_str()));

        let line = store.get_line(&line_id).unwrap().unwrap();
        assert_eq!(line.order_id, order_id);
    }

    #[test]
    fn test_submission_order_does_not_matter() {
        let (processor, store, _) = processor();
        let data = processor
            .process(
                "ana",
                request(vec![
                    op(set_quantity("ll-1", 3), 2, 3),
                    op(create_line("ll-1", "lo-1"), 1, 2),
                    op(create_order("lo-1"), 0, 1),
                ]),
            )
            .unwrap();

        assert_eq!(data.summary.failed, 0);
        // Results follow execution order
        assert_eq!(data.results[0].operation_type, "CREATE_ORDER");
        let line = store.get_line(&data.id_mapping["ll-1"]).unwrap().unwrap();
        assert_eq!(line.item.quantity, 3);
    }

    #[test]
    fn test_sequence_breaks_timestamp_ties() {
        let (processor, _, _) = processor();
        let data = processor
            .process(
                "ana",
                request(vec![
                    op(create_line("ll-1", "lo-1"), 0, 2),
                    op(create_order("lo-1"), 0, 1),
                ]),
            )
            .unwrap();

        assert_eq!(data.summary.failed, 0);
        assert_eq!(data.results[0].sequence, Some(1));
    }

    #[test]
    fn test_replayed_creates_are_idempotent() {
        let (processor, store, _) = processor();
        let batch = vec![
            op(create_order("lo-1"), 0, 1),
            op(create_line("ll-1", "lo-1"), 1, 2),
        ];

        let first = processor.process("ana", request(batch.clone())).unwrap();
        let second = processor.process("ana", request(batch)).unwrap();

        assert_eq!(second.summary.failed, 0);
        assert_eq!(first.id_mapping, second.id_mapping);
        let order_id = &first.id_mapping["lo-1"];
        assert_eq!(store.lines_for_order(order_id).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_type_and_bad_payload_fail_only_themselves() {
        let (processor, _, _) = processor();
        let mut unknown = op(create_order("lo-9"), 0, 1);
        unknown.operation_type = "MERGE_ORDERS".to_string();
        let mut malformed = op(create_order("lo-2"), 1, 2);
        malformed.data = serde_json::json!({ "order_id": 5 });

        let data = processor
            .process(
                "ana",
                request(vec![unknown, malformed, op(create_order("lo-3"), 2, 3)]),
            )
            .unwrap();

        assert_eq!(data.summary.succeeded, 1);
        assert_eq!(data.summary.failed, 2);
        assert!(data.results[0].error.as_deref().unwrap().contains("MERGE_ORDERS"));
        assert_eq!(
            data.results[0].error_code,
            Some(ErrorCode::UnknownOperationType.code())
        );
        assert!(data.results[1].error.as_deref().unwrap().starts_with("Invalid payload"));
        assert_eq!(data.results[1].error_code, Some(ErrorCode::InvalidPayload.code()));
        assert_eq!(data.results[2].error_code, None);
    }

    #[test]
    fn test_all_failed() {
        let (processor, _, _) = processor();
        let data = processor
            .process(
                "ana",
                request(vec![op(
                    OperationPayload::DeleteOrder(OrderRef {
                        order_id: "lo-404".to_string(),
                    }),
                    0,
                    1,
                )]),
            )
            .unwrap();
        assert_eq!(data.overall_state, OverallState::Failed);
    }

    #[test]
    fn test_empty_batch() {
        let (processor, _, audit) = processor();
        let data = processor.process("ana", request(vec![])).unwrap();

        assert_eq!(data.summary, SyncSummary::default());
        assert_eq!(data.overall_state, OverallState::Completed);
        assert!(data.results.is_empty());
        assert_eq!(audit.count().unwrap(), 1);
    }

    #[test]
    fn test_audit_record_written() {
        let (processor, _, audit) = processor();
        let data = processor
            .process("bruno", request(vec![op(create_order("lo-1"), 0, 1)]))
            .unwrap();

        let record = audit.get(&data.sync_log_id).unwrap().unwrap();
        assert_eq!(record.operator, "bruno");
        assert_eq!(record.operations.len(), 1);
        assert_eq!(record.summary, data.summary);
        assert_eq!(record.id_mapping, data.id_mapping);
    }

    #[test]
    fn test_oversized_batch_rejected() {
        let db = crate::db::open_in_memory().unwrap();
        let audit = AuditLog::new(db.clone());
        let processor =
            BatchProcessor::new(OrderStore::new(db), audit.clone(), Arc::new(NoopInventory), 1);

        let err = processor
            .process(
                "ana",
                request(vec![op(create_order("lo-1"), 0, 1), op(create_order("lo-2"), 1, 2)]),
            )
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::BatchTooLarge);
        assert_eq!(audit.count().unwrap(), 0);
    }
}
