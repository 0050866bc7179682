//! Bounded, ordered, atomic write batches.

use std::sync::Arc;

use crate::errors::{Error, Result};
use crate::item::Item;
use crate::mapper::ItemMapper;
use crate::serialization::Document;
use crate::store::{
    DeleteRequest, PutOperation, Store, TransactOperation, UpdateRequest,
    MAX_TRANSACTION_OPERATIONS,
};

const UPDATE_KEYWORDS: [&str; 4] = ["SET", "REMOVE", "ADD", "DELETE"];

/// Stages put/delete/update operations and flushes them as one atomic unit.
///
/// Operations are applied in call order. The batch never splits itself: more
/// than 25 staged operations make [`flush`](Self::flush) fail before any
/// store call. A failed flush keeps the staged operations so the caller can
/// inspect or retry them.
pub struct TransactionBatch {
    store: Arc<dyn Store>,
    operations: Vec<TransactOperation>,
}

impl TransactionBatch {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            operations: Vec::new(),
        }
    }

    /// Stage an unconditional put of a rendered document.
    pub fn put(&mut self, table: impl Into<String>, document: Document) -> &mut Self {
        self.push(TransactOperation::Put(PutOperation {
            table: table.into(),
            item: document,
            condition: None,
            values: Document::new(),
        }))
    }

    /// Stage a put guarded by a condition expression.
    pub fn put_if(
        &mut self,
        table: impl Into<String>,
        document: Document,
        condition: impl Into<String>,
        values: Document,
    ) -> &mut Self {
        self.push(TransactOperation::Put(PutOperation {
            table: table.into(),
            item: document,
            condition: Some(condition.into()),
            values,
        }))
    }

    pub fn delete(
        &mut self,
        table: impl Into<String>,
        key: Document,
        condition: Option<String>,
        values: Option<Document>,
    ) -> &mut Self {
        self.push(TransactOperation::Delete(DeleteRequest {
            table: table.into(),
            key,
            condition: condition.filter(|c| !c.is_empty()),
            values: values.unwrap_or_default(),
        }))
    }

    /// Stage an update. A bare assignment list such as `Balance = :b` is
    /// prefixed with `SET`.
    pub fn update(
        &mut self,
        table: impl Into<String>,
        key: Document,
        update_expression: &str,
        values: Document,
        condition: Option<String>,
    ) -> &mut Self {
        self.push(TransactOperation::Update(UpdateRequest {
            table: table.into(),
            key,
            update_expression: render_update_expression(update_expression),
            values,
            condition: condition.filter(|c| !c.is_empty()),
        }))
    }

    /// Serialize `item` and stage a put into its table.
    ///
    /// Mapping errors are raised here, before anything is staged.
    pub fn save_item<T: Item>(&mut self, item: &T) -> Result<&mut Self> {
        let document = ItemMapper::<T>::new()?.serialize(item)?;
        Ok(self.put(T::table_name(), document))
    }

    /// Stage a delete of `item` by its primary key.
    pub fn delete_item<T: Item>(&mut self, item: &T) -> &mut Self {
        self.delete(T::table_name(), item.key(), None, None)
    }

    pub fn operations(&self) -> &[TransactOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Drop every staged operation without sending it.
    pub fn clear(&mut self) {
        self.operations.clear();
    }

    /// Send all staged operations as one transaction.
    ///
    /// On success the batch is emptied and can be reused. On failure the
    /// staged operations are kept.
    pub fn flush(&mut self) -> Result<()> {
        let count = self.operations.len();
        if count > MAX_TRANSACTION_OPERATIONS {
            return Err(Error::CapacityExceeded {
                count,
                max: MAX_TRANSACTION_OPERATIONS,
            });
        }
        if count == 0 {
            return Ok(());
        }

        tracing::debug!(operations = count, "flushing transaction");
        if let Err(err) = self.store.transact_write(&self.operations) {
            tracing::warn!(operations = count, error = %err, "transaction failed, keeping staged operations");
            return Err(err.into());
        }

        self.operations.clear();
        Ok(())
    }

    fn push(&mut self, operation: TransactOperation) -> &mut Self {
        self.operations.push(operation);
        self
    }
}

pub(crate) fn render_update_expression(expression: &str) -> String {
    let trimmed = expression.trim();
    let first = trimmed
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_uppercase();
    if UPDATE_KEYWORDS.contains(&first.as_str()) {
        trimmed.to_string()
    } else {
        format!("SET {}", trimmed)
    }
}
