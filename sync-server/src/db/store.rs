//! Order store
//!
//! Every method runs in its own transaction: batch handlers rely on the
//! store's single-record semantics only, never on a transaction spanning
//! several operations.

use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use std::sync::Arc;

use super::models::{LineRecord, OrderDetail, OrderRecord};
use super::{
    LINES_TABLE, LOCAL_IDS_TABLE, ORDER_LINES_TABLE, ORDERS_TABLE, StoreResult,
};

#[derive(Clone)]
pub struct OrderStore {
    db: Arc<Database>,
}

impl std::fmt::Debug for OrderStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderStore").finish_non_exhaustive()
    }
}

impl OrderStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    // ========== Local id index ==========

    /// Remote id previously assigned to a field-device id
    pub fn remote_id_for_local(&self, local_id: &str) -> StoreResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LOCAL_IDS_TABLE)?;
        Ok(table.get(local_id)?.map(|guard| guard.value().to_string()))
    }

    // ========== Orders ==========

    pub fn get_order(&self, id: &str) -> StoreResult<Option<OrderRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Insert a new order and index its local id
    pub fn insert_order(&self, record: &OrderRecord) -> StoreResult<()> {
        let txn = self.db.begin_write()?;
        Self::write_order(&txn, record)?;
        if let Some(local_id) = &record.local_id {
            let mut table = txn.open_table(LOCAL_IDS_TABLE)?;
            table.insert(local_id.as_str(), record.id.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Overwrite an existing order header
    pub fn put_order(&self, record: &OrderRecord) -> StoreResult<()> {
        let txn = self.db.begin_write()?;
        Self::write_order(&txn, record)?;
        txn.commit()?;
        Ok(())
    }

    fn write_order(txn: &WriteTransaction, record: &OrderRecord) -> StoreResult<()> {
        let mut table = txn.open_table(ORDERS_TABLE)?;
        let value = serde_json::to_vec(record)?;
        table.insert(record.id.as_str(), value.as_slice())?;
        Ok(())
    }

    /// Delete an order together with all of its lines
    ///
    /// Returns `false` when the order does not exist.
    pub fn delete_order(&self, id: &str) -> StoreResult<bool> {
        let txn = self.db.begin_write()?;
        let existed = {
            let mut orders = txn.open_table(ORDERS_TABLE)?;
            let removed = orders.remove(id)?;
            match removed {
                Some(value) => {
                    let record: OrderRecord = serde_json::from_slice(value.value())?;
                    Some(record)
                }
                None => None,
            }
        };

        let Some(order) = existed else {
            return Ok(false);
        };

        let line_ids = Self::line_ids_in(&txn, id)?;
        {
            let mut lines = txn.open_table(LINES_TABLE)?;
            let mut index = txn.open_table(ORDER_LINES_TABLE)?;
            let mut local_ids = txn.open_table(LOCAL_IDS_TABLE)?;
            for line_id in &line_ids {
                let removed = lines.remove(line_id.as_str())?;
                if let Some(value) = removed {
                    let line: LineRecord = serde_json::from_slice(value.value())?;
                    if let Some(local_id) = &line.local_id {
                        local_ids.remove(local_id.as_str())?;
                    }
                }
                index.remove((id, line_id.as_str()))?;
            }
            if let Some(local_id) = &order.local_id {
                local_ids.remove(local_id.as_str())?;
            }
        }
        txn.commit()?;
        Ok(true)
    }

    // ========== Lines ==========

    pub fn get_line(&self, id: &str) -> StoreResult<Option<LineRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LINES_TABLE)?;
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Insert a new line, link it to its order and index its local id
    pub fn insert_line(&self, record: &LineRecord) -> StoreResult<()> {
        let txn = self.db.begin_write()?;
        Self::write_line(&txn, record)?;
        {
            let mut index = txn.open_table(ORDER_LINES_TABLE)?;
            index.insert((record.order_id.as_str(), record.id.as_str()), ())?;
        }
        if let Some(local_id) = &record.local_id {
            let mut table = txn.open_table(LOCAL_IDS_TABLE)?;
            table.insert(local_id.as_str(), record.id.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn put_line(&self, record: &LineRecord) -> StoreResult<()> {
        let txn = self.db.begin_write()?;
        Self::write_line(&txn, record)?;
        txn.commit()?;
        Ok(())
    }

    fn write_line(txn: &WriteTransaction, record: &LineRecord) -> StoreResult<()> {
        let mut table = txn.open_table(LINES_TABLE)?;
        let value = serde_json::to_vec(record)?;
        table.insert(record.id.as_str(), value.as_slice())?;
        Ok(())
    }

    /// Returns `false` when the line does not exist
    pub fn delete_line(&self, id: &str) -> StoreResult<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut lines = txn.open_table(LINES_TABLE)?;
            let removed = lines.remove(id)?;
            match removed {
                Some(value) => {
                    let record: LineRecord = serde_json::from_slice(value.value())?;
                    Some(record)
                }
                None => None,
            }
        };

        let Some(line) = removed else {
            return Ok(false);
        };

        {
            let mut index = txn.open_table(ORDER_LINES_TABLE)?;
            index.remove((line.order_id.as_str(), id))?;
            if let Some(local_id) = &line.local_id {
                let mut local_ids = txn.open_table(LOCAL_IDS_TABLE)?;
                local_ids.remove(local_id.as_str())?;
            }
        }
        txn.commit()?;
        Ok(true)
    }

    fn line_ids_in(txn: &WriteTransaction, order_id: &str) -> StoreResult<Vec<String>> {
        let index = txn.open_table(ORDER_LINES_TABLE)?;
        let mut ids = Vec::new();
        for entry in index.range((order_id, "")..)? {
            let (key, _) = entry?;
            let (oid, lid) = key.value();
            if oid != order_id {
                break;
            }
            ids.push(lid.to_string());
        }
        Ok(ids)
    }

    /// Lines of an order, in insertion-independent id order
    pub fn lines_for_order(&self, order_id: &str) -> StoreResult<Vec<LineRecord>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(ORDER_LINES_TABLE)?;
        let lines = read_txn.open_table(LINES_TABLE)?;

        let mut result = Vec::new();
        for entry in index.range((order_id, "")..)? {
            let (key, _) = entry?;
            let (oid, lid) = key.value();
            if oid != order_id {
                break;
            }
            if let Some(value) = lines.get(lid)? {
                result.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(result)
    }

    /// Order with its lines and customer total
    pub fn order_detail(&self, id: &str) -> StoreResult<Option<OrderDetail>> {
        let Some(order) = self.get_order(id)? else {
            return Ok(None);
        };
        let lines = self.lines_for_order(id)?;
        let total = lines.iter().map(|l| l.item.total()).sum();
        Ok(Some(OrderDetail {
            order,
            lines,
            total,
        }))
    }
}
