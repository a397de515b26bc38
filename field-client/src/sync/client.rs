//! SyncClient - one synchronization round at a time
//!
//! ```text
//! synchronize(cancel)
//!     ├─ 1. Claim the round (SyncInProgress if one is running)
//!     ├─ 2. Reachability check (cancellable, nothing touched yet)
//!     └─ for each chunk of at most `max_batch` pending entries:
//!         ├─ 3. Chunk → syncing
//!         ├─ 4. push_batch (cancellable; any failure reverts the chunk)
//!         ├─ 5. Reconcile results and id mapping in one write transaction
//!         └─ 6. Refresh the draft manager's in-memory copy
//! ```
//!
//! A failing chunk ends the round: chunks already reconciled stay
//! reconciled, later ones stay `pending`. Entries appended while a round is
//! in flight stay `pending` and go out with the next round.

use serde::Serialize;
use shared::sync::{
    MAX_SYNC_BATCH_OPERATIONS, OperationResult, OperationType, OverallState, SyncBatchData,
    SyncBatchRequest, SyncBatchResponse, SyncSummary,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::transport::{Reachability, SyncTransport};
use crate::draft::{DraftManager, DraftOrder};
use crate::error::{ClientError, ClientResult};
use crate::outbox::{EntryStatus, OutboxEntry, OutboxStatus};

/// Outcome of one round, as seen by the device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    /// Batches pushed during the round
    pub batches: u32,
    /// Operations sent
    pub total: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub overall_state: OverallState,
    /// Entries still `pending` after the round
    pub has_pending_changes: bool,
    /// Server audit record of the last batch
    pub sync_log_id: Option<String>,
}

impl SyncReport {
    fn empty() -> Self {
        Self {
            batches: 0,
            total: 0,
            succeeded: 0,
            failed: 0,
            overall_state: OverallState::Completed,
            has_pending_changes: false,
            sync_log_id: None,
        }
    }

    fn absorb(&mut self, batch: SyncReport) {
        self.batches += batch.batches;
        self.total += batch.total;
        self.succeeded += batch.succeeded;
        self.failed += batch.failed;
        self.overall_state = OverallState::from_summary(&SyncSummary {
            total: self.total,
            succeeded: self.succeeded,
            failed: self.failed,
        });
        self.has_pending_changes = batch.has_pending_changes;
        self.sync_log_id = batch.sync_log_id;
    }
}

pub struct SyncClient {
    drafts: Arc<DraftManager>,
    transport: Arc<dyn SyncTransport>,
    reachability: Arc<dyn Reachability>,
    max_batch: usize,
    /// Held for the whole round
    round: Mutex<()>,
}

impl std::fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("drafts", &self.drafts)
            .finish_non_exhaustive()
    }
}

impl SyncClient {
    pub fn new(
        drafts: Arc<DraftManager>,
        transport: Arc<dyn SyncTransport>,
        reachability: Arc<dyn Reachability>,
    ) -> Self {
        Self {
            drafts,
            transport,
            reachability,
            max_batch: MAX_SYNC_BATCH_OPERATIONS,
            round: Mutex::new(()),
        }
    }

    /// Cap on operations per pushed batch (at least one)
    pub fn with_max_batch(mut self, max: usize) -> Self {
        self.max_batch = max.max(1);
        self
    }

    pub fn drafts(&self) -> &Arc<DraftManager> {
        &self.drafts
    }

    /// Entry counts by status
    pub fn status(&self) -> ClientResult<OutboxStatus> {
        Ok(self.drafts.storage().status()?)
    }

    /// Run one synchronization round
    pub async fn synchronize(&self, cancel: CancellationToken) -> ClientResult<SyncReport> {
        let _round = self
            .round
            .try_lock()
            .map_err(|_| ClientError::SyncInProgress)?;

        let reachable = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Sync cancelled before sending");
                return Err(ClientError::Cancelled);
            }
            reachable = self.reachability.is_reachable() => reachable,
        };
        if !reachable {
            tracing::warn!("Sync skipped: server unreachable");
            return Err(ClientError::NetworkUnavailable);
        }

        let storage = self.drafts.storage();
        let pending: Vec<u64> = storage
            .pending_entries()?
            .iter()
            .map(|e| e.sequence)
            .collect();
        if pending.is_empty() {
            tracing::debug!("Sync round: nothing to send");
            return Ok(SyncReport::empty());
        }

        let mut report = SyncReport::empty();
        for chunk in pending.chunks(self.max_batch) {
            if cancel.is_cancelled() {
                tracing::info!(batches = report.batches, "Sync cancelled between batches");
                return Err(ClientError::Cancelled);
            }
            report.absorb(self.push_chunk(chunk, &cancel).await?);
        }
        tracing::info!(
            batches = report.batches,
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            "Sync round completed"
        );
        Ok(report)
    }

    /// Send one batch and reconcile its results
    async fn push_chunk(
        &self,
        pending: &[u64],
        cancel: &CancellationToken,
    ) -> ClientResult<SyncReport> {
        let storage = self.drafts.storage();
        let sent = storage.mark_syncing(pending)?;
        if sent.is_empty() {
            return Ok(SyncReport::empty());
        }
        let sequences: Vec<u64> = sent.iter().map(|e| e.sequence).collect();
        let request = SyncBatchRequest {
            operations: sent.iter().map(OutboxEntry::to_sync_operation).collect(),
        };
        tracing::info!(operations = sent.len(), "Sync batch started");

        let response = tokio::select! {
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            response = self.transport.push_batch(&request) => response,
        };

        let data = match response {
            Ok(SyncBatchResponse {
                success: true,
                data: Some(data),
                ..
            }) => data,
            Ok(response) => {
                storage.revert_syncing(&sequences)?;
                tracing::warn!(message = %response.message, "Sync rejected by server");
                return Err(ClientError::InvalidResponse(response.message));
            }
            Err(e) => {
                storage.revert_syncing(&sequences)?;
                tracing::warn!(error = %e, "Sync batch failed, entries back to pending");
                return Err(e);
            }
        };

        let report = self.reconcile(&sent, &data)?;
        self.drafts.refresh()?;
        tracing::info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            sync_log_id = %data.sync_log_id,
            "Sync batch reconciled"
        );
        Ok(report)
    }

    /// Put every failed entry back in line for the next round
    pub fn retry_failed(&self) -> ClientResult<usize> {
        let reset = self.drafts.storage().reset_failed()?;
        tracing::info!(reset, "Failed operations queued for retry");
        Ok(reset)
    }

    /// Put one failed entry back in line for the next round
    pub fn retry_operation(&self, sequence: u64) -> ClientResult<()> {
        let storage = self.drafts.storage();
        if storage.get_entry(sequence)?.is_none() {
            return Err(ClientError::OperationNotFound(sequence));
        }
        if !storage.reset_entry(sequence)? {
            return Err(ClientError::NotRetryable(sequence));
        }
        Ok(())
    }

    /// Fetch an order from the server and make it the active draft
    pub async fn load_order_for_edit(&self, id: &str) -> ClientResult<DraftOrder> {
        let remote = self.transport.fetch_order(id).await?;
        self.drafts.load_for_edit(remote)
    }

    /// Apply the server's results to the outbox and the drafts
    fn reconcile(&self, sent: &[OutboxEntry], data: &SyncBatchData) -> ClientResult<SyncReport> {
        let storage = self.drafts.storage();
        let mut index = ResultIndex::new(&data.results);
        let mut assigned = data.id_mapping.clone();
        let (mut succeeded, mut failed) = (0u32, 0u32);

        let txn = storage.begin_write()?;
        let mut drafts: HashMap<String, DraftOrder> = storage
            .drafts_txn(&txn)?
            .into_iter()
            .map(|d| (d.local_id.clone(), d))
            .collect();

        for entry in sent {
            let mut entry = entry.clone();
            match index.take(&entry) {
                Some(result) if result.is_success() => {
                    storage.remove_entry(&txn, entry.sequence)?;
                    succeeded += 1;
                    if let Some(remote_id) = &result.remote_id {
                        if entry.operation_type.is_create() {
                            assigned
                                .entry(entry.local_entity_id.clone())
                                .or_insert_with(|| remote_id.clone());
                        }
                        if let Some(draft) = drafts.get_mut(&entry.order_local_id) {
                            apply_remote_id(draft, &entry, remote_id);
                        }
                    }
                }
                Some(result) => {
                    failed += 1;
                    entry.status = EntryStatus::Failed;
                    entry.attempts += 1;
                    entry.last_error = result.error.clone();
                    storage.put_entry(&txn, &entry)?;
                    tracing::warn!(
                        sequence = entry.sequence,
                        operation_type = %entry.operation_type,
                        error = entry.last_error.as_deref().unwrap_or(""),
                        "Operation rejected by server"
                    );
                }
                None => {
                    entry.status = EntryStatus::Pending;
                    storage.put_entry(&txn, &entry)?;
                    tracing::warn!(sequence = entry.sequence, "No result for operation, kept pending");
                }
            }
        }

        for draft in drafts.values_mut() {
            apply_id_mapping(draft, &assigned);
        }

        let remaining = storage.entries_txn(&txn)?;
        for entry in &remaining {
            if entry.remote_entity_id.is_none() {
                if let Some(remote_id) = assigned.get(&entry.local_entity_id) {
                    let mut entry = entry.clone();
                    entry.remote_entity_id = Some(remote_id.clone());
                    storage.put_entry(&txn, &entry)?;
                }
            }
        }

        let busy_orders: HashSet<&str> = remaining.iter().map(|e| e.order_local_id.as_str()).collect();
        let busy_entities: HashSet<&str> =
            remaining.iter().map(|e| e.local_entity_id.as_str()).collect();
        let active = storage.active_draft_id_txn(&txn)?;

        for draft in drafts.values_mut() {
            let is_active = active.as_deref() == Some(draft.local_id.as_str());
            if busy_orders.contains(draft.local_id.as_str()) {
                for line in &mut draft.lines {
                    let busy = busy_entities.contains(line.local_id.as_str())
                        || line
                            .remote_id
                            .as_deref()
                            .is_some_and(|id| busy_entities.contains(id));
                    if !busy {
                        line.dirty = false;
                    }
                }
                storage.store_draft(&txn, draft)?;
            } else if draft.deleted || !is_active {
                storage.remove_draft(&txn, &draft.local_id)?;
            } else {
                // Kept as the last known copy until the pointer moves on
                draft.mark_synchronized();
                storage.store_draft(&txn, draft)?;
                storage.set_active_draft(&txn, None)?;
                tracing::info!(order = %draft.local_id, "Draft fully synchronized");
            }
        }
        txn.commit()?;

        Ok(SyncReport {
            batches: 1,
            total: sent.len() as u32,
            succeeded,
            failed,
            overall_state: data.overall_state,
            has_pending_changes: storage.has_pending()?,
            sync_log_id: Some(data.sync_log_id.clone()),
        })
    }
}

/// Finds the result that answers a sent entry
///
/// Results echoing a sequence match exactly; the rest match by
/// `(idLocal, operationType)` in response order.
struct ResultIndex<'a> {
    by_sequence: HashMap<u64, &'a OperationResult>,
    by_key: HashMap<(String, String), VecDeque<&'a OperationResult>>,
}

impl<'a> ResultIndex<'a> {
    fn new(results: &'a [OperationResult]) -> Self {
        let mut by_sequence = HashMap::new();
        let mut by_key: HashMap<(String, String), VecDeque<&'a OperationResult>> = HashMap::new();
        for result in results {
            match result.sequence {
                Some(sequence) => {
                    by_sequence.insert(sequence, result);
                }
                None => by_key
                    .entry((result.id_local.clone(), result.operation_type.clone()))
                    .or_default()
                    .push_back(result),
            }
        }
        Self { by_sequence, by_key }
    }

    fn take(&mut self, entry: &OutboxEntry) -> Option<&'a OperationResult> {
        if let Some(result) = self.by_sequence.remove(&entry.sequence) {
            return Some(result);
        }
        let key = (
            entry.local_entity_id.clone(),
            entry.operation_type.as_str().to_string(),
        );
        self.by_key.get_mut(&key).and_then(VecDeque::pop_front)
    }
}

/// Record the remote id a create returned on the created entity
fn apply_remote_id(draft: &mut DraftOrder, entry: &OutboxEntry, remote_id: &str) {
    match entry.operation_type {
        OperationType::CreateOrder => {
            draft.remote_id = Some(remote_id.to_string());
        }
        OperationType::CreateLine => {
            let order_remote = draft.remote_id.clone();
            if let Some(line) = draft.line_mut(&entry.local_entity_id) {
                line.remote_id = Some(remote_id.to_string());
                if order_remote.is_some() {
                    line.remote_order_id = order_remote;
                }
            }
        }
        _ => {}
    }
}

/// Rewrite local references the batch assigned remote ids to
fn apply_id_mapping(draft: &mut DraftOrder, mapping: &HashMap<String, String>) {
    if draft.remote_id.is_none() {
        draft.remote_id = mapping.get(&draft.local_id).cloned();
    }
    let order_remote = draft.remote_id.clone();
    for line in &mut draft.lines {
        if line.remote_id.is_none() {
            line.remote_id = mapping.get(&line.local_id).cloned();
        }
        if line.remote_id.is_some() && line.remote_order_id.is_none() {
            line.remote_order_id = order_remote.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::OutboxStorage;
    use crate::sync::transport::StaticReachability;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use shared::models::{NewLine, OrderOrigin};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use sync_server::AppState;
    use tokio::sync::Notify;

    /// Runs batches through an in-memory sync-server processor
    struct InProcessTransport {
        state: AppState,
        calls: AtomicUsize,
        fail: AtomicBool,
        /// Never answers (for cancellation)
        hang: AtomicBool,
        /// Announce the call on `entered`, answer once `release` fires
        hold: AtomicBool,
        entered: Notify,
        release: Notify,
        /// 1-based call number from which every push fails
        fail_from: AtomicUsize,
        batch_sizes: parking_lot::Mutex<Vec<usize>>,
    }

    impl InProcessTransport {
        fn new() -> Self {
            Self {
                state: AppState::in_memory().unwrap(),
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                hang: AtomicBool::new(false),
                hold: AtomicBool::new(false),
                entered: Notify::new(),
                release: Notify::new(),
                fail_from: AtomicUsize::new(usize::MAX),
                batch_sizes: parking_lot::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SyncTransport for InProcessTransport {
        async fn push_batch(&self, request: &SyncBatchRequest) -> ClientResult<SyncBatchResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.hold.load(Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            if self.fail.load(Ordering::SeqCst) || call >= self.fail_from.load(Ordering::SeqCst) {
                return Err(ClientError::NetworkUnavailable);
            }
            self.batch_sizes.lock().push(request.operations.len());
            let data = self
                .state
                .processor
                .process("test", request.clone())
                .map_err(|e| ClientError::Api {
                    code: e.code as u16,
                    message: e.message,
                })?;
            Ok(SyncBatchResponse::processed(data))
        }

        async fn fetch_order(&self, id: &str) -> ClientResult<crate::draft::RemoteOrder> {
            let detail = self
                .state
                .store
                .order_detail(id)
                .unwrap()
                .ok_or_else(|| ClientError::Api {
                    code: 4001,
                    message: format!("Order not found: {id}"),
                })?;
            Ok(serde_json::from_value(serde_json::to_value(detail)?)?)
        }
    }

    struct Harness {
        client: SyncClient,
        transport: Arc<InProcessTransport>,
        reachability: Arc<StaticReachability>,
    }

    fn create_test_client() -> Harness {
        create_test_client_with_batch(MAX_SYNC_BATCH_OPERATIONS)
    }

    fn create_test_client_with_batch(max_batch: usize) -> Harness {
        let storage = OutboxStorage::open_in_memory().unwrap();
        let drafts = Arc::new(DraftManager::new(storage).unwrap());
        let transport = Arc::new(InProcessTransport::new());
        let reachability = Arc::new(StaticReachability::new(true));
        let client = SyncClient::new(drafts, transport.clone(), reachability.clone())
            .with_max_batch(max_batch);
        Harness {
            client,
            transport,
            reachability,
        }
    }

    fn tea() -> NewLine {
        NewLine {
            product_id: "p-tea".to_string(),
            name: "Tea".to_string(),
            real_price: Decimal::new(30, 2),
            public_price: Decimal::new(150, 2),
            image_ref: None,
            instructions: String::new(),
            variant_index: 0,
        }
    }

    #[tokio::test]
    async fn test_round_assigns_remote_ids() {
        let h = create_test_client();
        let drafts = h.client.drafts().clone();
        let order = drafts.start_new("T1", OrderOrigin::Primary, "ana").unwrap();
        let line = drafts.add_line(tea()).unwrap();
        drafts.change_quantity(&line.local_id, 2).unwrap();

        let report = h.client.synchronize(CancellationToken::new()).await.unwrap();
        assert_eq!((report.total, report.succeeded, report.failed), (3, 3, 0));
        assert_eq!(report.overall_state, OverallState::Completed);
        assert!(!report.has_pending_changes);
        assert_eq!(drafts.storage().entry_count().unwrap(), 0);

        let stored = drafts.storage().get_draft(&order.local_id).unwrap().unwrap();
        let order_remote = stored.remote_id.clone().unwrap();
        assert!(stored.synchronized);
        assert!(!stored.dirty);
        let stored_line = stored.line(&line.local_id).unwrap();
        assert!(stored_line.remote_id.is_some());
        assert_eq!(stored_line.remote_order_id.as_deref(), Some(order_remote.as_str()));

        // Fully synchronized: the active draft is released
        assert!(drafts.current().is_none());

        let server_lines = h.transport.state.store.lines_for_order(&order_remote).unwrap();
        assert_eq!(server_lines.len(), 1);
        assert_eq!(server_lines[0].item.quantity, 2);
    }

    #[tokio::test]
    async fn test_empty_round_reports_zero() {
        let h = create_test_client();
        let report = h.client.synchronize(CancellationToken::new()).await.unwrap();
        assert_eq!(report, SyncReport::empty());
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unreachable_leaves_state_untouched() {
        let h = create_test_client();
        h.client
            .drafts()
            .start_new("T1", OrderOrigin::Primary, "ana")
            .unwrap();
        h.reachability.set(false);

        let err = h.client.synchronize(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::NetworkUnavailable));
        assert_eq!(h.client.status().unwrap().pending, 1);
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_reverts_to_pending() {
        let h = create_test_client();
        h.client
            .drafts()
            .start_new("T1", OrderOrigin::Primary, "ana")
            .unwrap();
        h.transport.fail.store(true, Ordering::SeqCst);

        let err = h.client.synchronize(CancellationToken::new()).await.unwrap_err();
        assert!(err.is_transient());
        let status = h.client.status().unwrap();
        assert_eq!((status.pending, status.syncing), (1, 0));

        h.transport.fail.store(false, Ordering::SeqCst);
        let report = h.client.synchronize(CancellationToken::new()).await.unwrap();
        assert_eq!(report.succeeded, 1);
    }

    #[tokio::test]
    async fn test_cancel_before_send_is_noop() {
        let h = create_test_client();
        h.client
            .drafts()
            .start_new("T1", OrderOrigin::Primary, "ana")
            .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = h.client.synchronize(cancel).await.unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
        assert_eq!(h.client.status().unwrap().pending, 1);
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_in_flight_reverts() {
        let h = create_test_client();
        h.client
            .drafts()
            .start_new("T1", OrderOrigin::Primary, "ana")
            .unwrap();
        h.transport.hang.store(true, Ordering::SeqCst);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = h.client.synchronize(cancel).await.unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
        let status = h.client.status().unwrap();
        assert_eq!((status.pending, status.syncing), (1, 0));
    }

    #[tokio::test]
    async fn test_concurrent_round_rejected() {
        let h = Arc::new(create_test_client());
        h.client
            .drafts()
            .start_new("T1", OrderOrigin::Primary, "ana")
            .unwrap();
        h.transport.hang.store(true, Ordering::SeqCst);

        let cancel = CancellationToken::new();
        let first = {
            let h = h.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { h.client.synchronize(cancel).await })
        };
        while h.transport.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let err = h.client.synchronize(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::SyncInProgress));

        cancel.cancel();
        assert!(matches!(first.await.unwrap(), Err(ClientError::Cancelled)));
    }

    #[tokio::test]
    async fn test_outbox_larger_than_batch_drains_in_one_round() {
        let h = create_test_client_with_batch(2);
        let drafts = h.client.drafts().clone();
        let order = drafts.start_new("T6", OrderOrigin::Primary, "ana").unwrap();
        let line = drafts.add_line(tea()).unwrap();
        for quantity in 2..=4 {
            drafts.change_quantity(&line.local_id, quantity).unwrap();
        }
        assert_eq!(drafts.storage().entry_count().unwrap(), 5);

        let report = h.client.synchronize(CancellationToken::new()).await.unwrap();
        assert_eq!(report.batches, 3);
        assert_eq!((report.total, report.succeeded, report.failed), (5, 5, 0));
        assert_eq!(report.overall_state, OverallState::Completed);
        assert!(!report.has_pending_changes);
        assert_eq!(*h.transport.batch_sizes.lock(), vec![2, 2, 1]);
        assert_eq!(drafts.storage().entry_count().unwrap(), 0);

        // Later batches referenced the order created by the first one
        let stored = drafts.storage().get_draft(&order.local_id).unwrap().unwrap();
        let server_lines = h
            .transport
            .state
            .store
            .lines_for_order(stored.remote_id.as_deref().unwrap())
            .unwrap();
        assert_eq!(server_lines[0].item.quantity, 4);
    }

    #[tokio::test]
    async fn test_failing_batch_keeps_later_chunks_pending() {
        let h = create_test_client_with_batch(2);
        let drafts = h.client.drafts().clone();
        drafts.start_new("T6", OrderOrigin::Primary, "ana").unwrap();
        let line = drafts.add_line(tea()).unwrap();
        for quantity in 2..=4 {
            drafts.change_quantity(&line.local_id, quantity).unwrap();
        }
        h.transport.fail_from.store(2, Ordering::SeqCst);

        let err = h.client.synchronize(CancellationToken::new()).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 2);
        let status = h.client.status().unwrap();
        assert_eq!((status.pending, status.syncing, status.failed), (3, 0, 0));

        h.transport.fail_from.store(usize::MAX, Ordering::SeqCst);
        let report = h.client.synchronize(CancellationToken::new()).await.unwrap();
        assert_eq!((report.batches, report.total, report.succeeded), (2, 3, 3));
        assert_eq!(drafts.storage().entry_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mutation_during_round_waits_for_next_round() {
        let h = create_test_client();
        let drafts = h.client.drafts().clone();
        let order = drafts.start_new("T2", OrderOrigin::Primary, "ana").unwrap();
        h.transport.hold.store(true, Ordering::SeqCst);

        let (report, ()) = tokio::join!(h.client.synchronize(CancellationToken::new()), async {
            h.transport.entered.notified().await;
            drafts.update_instructions("no ice").unwrap();
            h.transport.release.notify_one();
        });
        let report = report.unwrap();
        assert_eq!((report.total, report.succeeded), (1, 1));
        assert!(report.has_pending_changes);

        let entries = drafts.storage().entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, EntryStatus::Pending);
        assert_eq!(entries[0].operation_type, OperationType::UpdateOrderInstructions);
        // The create's remote id reached the entry recorded mid-round
        assert!(entries[0].remote_entity_id.is_some());

        let stored = drafts.storage().get_draft(&order.local_id).unwrap().unwrap();
        assert!(!stored.synchronized);
        assert_eq!(stored.header.instructions, "no ice");

        h.transport.hold.store(false, Ordering::SeqCst);
        let report = h.client.synchronize(CancellationToken::new()).await.unwrap();
        assert_eq!((report.total, report.succeeded), (1, 1));
        assert!(!report.has_pending_changes);

        let remote = stored.remote_id.unwrap();
        let server = h.transport.state.store.get_order(&remote).unwrap().unwrap();
        assert_eq!(server.header.instructions, "no ice");
    }

    #[tokio::test]
    async fn test_failed_entries_wait_for_retry() {
        let h = create_test_client();
        let drafts = h.client.drafts().clone();
        drafts.start_new("T1", OrderOrigin::Primary, "ana").unwrap();
        let line = drafts.add_line(tea()).unwrap();
        h.client.synchronize(CancellationToken::new()).await.unwrap();

        // Delete the line on the server behind the device's back
        let remote_line = drafts
            .storage()
            .drafts()
            .unwrap()
            .into_iter()
            .find_map(|d| d.line(&line.local_id).and_then(|l| l.remote_id.clone()))
            .unwrap();
        h.transport.state.store.delete_line(&remote_line).unwrap();

        let stored = drafts.storage().drafts().unwrap().remove(0);
        let remote = h
            .transport
            .fetch_order(stored.remote_id.as_deref().unwrap())
            .await;
        // The order survives, only the line is gone
        assert!(remote.unwrap().lines.is_empty());

        drafts.load_for_edit(crate::draft::RemoteOrder {
            order: crate::draft::RemoteOrderRecord {
                id: stored.remote_id.clone().unwrap(),
                header: stored.header.clone(),
            },
            lines: vec![crate::draft::RemoteLineRecord {
                id: remote_line.clone(),
                order_id: stored.remote_id.clone().unwrap(),
                item: stored.lines[0].item.clone(),
            }],
        })
        .unwrap();
        drafts.change_quantity(&remote_line, 3).unwrap();

        let report = h.client.synchronize(CancellationToken::new()).await.unwrap();
        assert_eq!((report.succeeded, report.failed), (0, 1));
        assert_eq!(report.overall_state, OverallState::Failed);

        let failed = drafts.storage().entries().unwrap().remove(0);
        assert_eq!(failed.status, EntryStatus::Failed);
        assert_eq!(failed.attempts, 1);
        assert!(failed.last_error.is_some());

        // Not resent until reset
        let report = h.client.synchronize(CancellationToken::new()).await.unwrap();
        assert_eq!(report.total, 0);

        assert!(matches!(
            h.client.retry_operation(999),
            Err(ClientError::OperationNotFound(999))
        ));
        h.client.retry_operation(failed.sequence).unwrap();
        assert!(matches!(
            h.client.retry_operation(failed.sequence),
            Err(ClientError::NotRetryable(_))
        ));
        let report = h.client.synchronize(CancellationToken::new()).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(drafts.storage().entries().unwrap()[0].attempts, 2);

        assert_eq!(h.client.retry_failed().unwrap(), 1);
        assert_eq!(h.client.status().unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_load_order_for_edit_then_modify() {
        let h = create_test_client();
        let drafts = h.client.drafts().clone();
        let order = drafts.start_new("T4", OrderOrigin::Secondary, "bo").unwrap();
        drafts.add_line(tea()).unwrap();
        h.client.synchronize(CancellationToken::new()).await.unwrap();
        let remote_id = drafts
            .storage()
            .get_draft(&order.local_id)
            .unwrap()
            .unwrap()
            .remote_id
            .unwrap();

        let draft = h.client.load_order_for_edit(&remote_id).await.unwrap();
        assert_eq!(draft.order_ref(), remote_id);
        let line_id = draft.lines[0].line_ref().to_string();
        drafts.update_instructions("no sugar").unwrap();
        drafts.change_quantity(&line_id, 2).unwrap();

        let report = h.client.synchronize(CancellationToken::new()).await.unwrap();
        assert_eq!((report.succeeded, report.failed), (2, 0));
        let detail = h.transport.state.store.order_detail(&remote_id).unwrap().unwrap();
        assert_eq!(detail.order.header.instructions, "no sugar");
        assert_eq!(detail.lines[0].item.quantity, 2);
    }

    #[tokio::test]
    async fn test_deleted_order_is_pruned() {
        let h = create_test_client();
        let drafts = h.client.drafts().clone();
        let order = drafts.start_new("T1", OrderOrigin::Primary, "ana").unwrap();
        drafts.delete_order().unwrap();

        let report = h.client.synchronize(CancellationToken::new()).await.unwrap();
        assert_eq!(report.succeeded, 2);
        assert!(drafts.storage().get_draft(&order.local_id).unwrap().is_none());
    }

    #[test]
    fn test_result_index_falls_back_to_key() {
        let entry = |sequence, id: &str| {
            let payload = shared::sync::OperationPayload::DeleteLine(shared::sync::LineRef {
                line_id: id.to_string(),
            });
            OutboxEntry::new(sequence, "o", &payload, None, chrono::Utc::now()).unwrap()
        };
        let a = entry(1, "l-1");
        let b = entry(2, "l-1");
        let mut first = OperationResult::succeeded(&a.to_sync_operation(), None);
        first.sequence = None;
        let mut second = OperationResult::failed(
            &b.to_sync_operation(),
            &shared::error::AppError::line_not_found("l-1"),
        );
        second.sequence = None;
        let results = vec![first, second];

        let mut index = ResultIndex::new(&results);
        assert!(index.take(&a).unwrap().is_success());
        assert!(!index.take(&b).unwrap().is_success());
        assert!(index.take(&b).is_none());
    }
}
