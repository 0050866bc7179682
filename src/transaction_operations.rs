//! Transactional writes.

use aws_sdk_dynamodb::types::{Delete, Put, TransactWriteItem, Update};
use aws_sdk_dynamodb::Client;
use std::sync::Arc;
use tokio::runtime::Runtime;

use crate::basic_operations::expression_values;
use crate::errors::{map_sdk_error, StoreError};
use crate::serialization::document_to_item;
use crate::store::TransactOperation;

fn build_error(kind: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Validation(format!("Invalid {} operation: {}", kind, err))
}

/// Convert one staged operation to its SDK form.
fn to_transact_item(operation: &TransactOperation) -> Result<TransactWriteItem, StoreError> {
    let kind = operation.kind();
    let item = match operation {
        TransactOperation::Put(op) => {
            let put = Put::builder()
                .table_name(&op.table)
                .set_item(Some(document_to_item(&op.item)))
                .set_condition_expression(op.condition.clone())
                .set_expression_attribute_values(expression_values(&op.values))
                .build()
                .map_err(|e| build_error(kind, e))?;
            TransactWriteItem::builder().put(put).build()
        }
        TransactOperation::Delete(op) => {
            let delete = Delete::builder()
                .table_name(&op.table)
                .set_key(Some(document_to_item(&op.key)))
                .set_condition_expression(op.condition.clone())
                .set_expression_attribute_values(expression_values(&op.values))
                .build()
                .map_err(|e| build_error(kind, e))?;
            TransactWriteItem::builder().delete(delete).build()
        }
        TransactOperation::Update(op) => {
            let update = Update::builder()
                .table_name(&op.table)
                .set_key(Some(document_to_item(&op.key)))
                .update_expression(&op.update_expression)
                .set_condition_expression(op.condition.clone())
                .set_expression_attribute_values(expression_values(&op.values))
                .build()
                .map_err(|e| build_error(kind, e))?;
            TransactWriteItem::builder().update(update).build()
        }
    };
    Ok(item)
}

/// Apply all operations atomically.
///
/// A cancelled transaction surfaces as [`StoreError::TransactionCanceled`]
/// carrying the per-operation reasons.
pub fn transact_write(
    client: &Client,
    runtime: &Arc<Runtime>,
    operations: &[TransactOperation],
) -> Result<(), StoreError> {
    let items = operations
        .iter()
        .map(to_transact_item)
        .collect::<Result<Vec<_>, _>>()?;

    let client = client.clone();
    let result = runtime.block_on(async {
        client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await
    });

    match result {
        Ok(_) => Ok(()),
        Err(e) => Err(map_sdk_error(e, None)),
    }
}
