//! Single-item operations, queries and scans over the DynamoDB SDK.
//!
//! Each function clones the client, builds the request with the SDK's
//! fluent builders and blocks on the shared runtime.

use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::runtime::Runtime;

use crate::errors::{map_sdk_error, StoreError};
use crate::serialization::{document_to_item, item_to_document, Document};
use crate::store::{ContinuationToken, DeleteRequest, Page, QueryRequest, ScanRequest, UpdateRequest};

/// Decode a returned item, reporting malformed attributes as a store failure.
pub(crate) fn decode_item(item: HashMap<String, AttributeValue>) -> Result<Document, StoreError> {
    item_to_document(item).map_err(|e| StoreError::Service(e.to_string()))
}

/// Expression values, or `None` when there are none (DynamoDB rejects an empty map).
pub(crate) fn expression_values(values: &Document) -> Option<HashMap<String, AttributeValue>> {
    if values.is_empty() {
        None
    } else {
        Some(document_to_item(values))
    }
}

fn expression_names(names: &BTreeMap<String, String>) -> Option<HashMap<String, String>> {
    if names.is_empty() {
        None
    } else {
        Some(names.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

fn into_page(
    items: Option<Vec<HashMap<String, AttributeValue>>>,
    last_evaluated_key: Option<HashMap<String, AttributeValue>>,
) -> Result<Page, StoreError> {
    let items = items
        .unwrap_or_default()
        .into_iter()
        .map(decode_item)
        .collect::<Result<Vec<_>, _>>()?;

    let last_key = match last_evaluated_key {
        Some(lek) if !lek.is_empty() => Some(ContinuationToken::new(decode_item(lek)?)),
        _ => None,
    };

    Ok(Page { items, last_key })
}

/// Put an item into a DynamoDB table.
pub fn put_item(
    client: &Client,
    runtime: &Arc<Runtime>,
    table: &str,
    item: &Document,
) -> Result<(), StoreError> {
    let client = client.clone();
    let table_name = table.to_string();
    let dynamo_item = document_to_item(item);

    let result = runtime.block_on(async {
        client
            .put_item()
            .table_name(table_name)
            .set_item(Some(dynamo_item))
            .send()
            .await
    });

    match result {
        Ok(_) => Ok(()),
        Err(e) => Err(map_sdk_error(e, Some(table))),
    }
}

/// Get an item from a DynamoDB table by its key.
pub fn get_item(
    client: &Client,
    runtime: &Arc<Runtime>,
    table: &str,
    key: &Document,
) -> Result<Option<Document>, StoreError> {
    let client = client.clone();
    let table_name = table.to_string();
    let dynamo_key = document_to_item(key);

    let result = runtime.block_on(async {
        client
            .get_item()
            .table_name(table_name)
            .set_key(Some(dynamo_key))
            .send()
            .await
    });

    match result {
        Ok(output) => output.item.map(decode_item).transpose(),
        Err(e) => Err(map_sdk_error(e, Some(table))),
    }
}

/// Delete an item, optionally guarded by a condition.
pub fn delete_item(
    client: &Client,
    runtime: &Arc<Runtime>,
    request: &DeleteRequest,
) -> Result<(), StoreError> {
    let client = client.clone();

    let mut builder = client
        .delete_item()
        .table_name(&request.table)
        .set_key(Some(document_to_item(&request.key)))
        .set_expression_attribute_values(expression_values(&request.values));

    if let Some(condition) = &request.condition {
        builder = builder.condition_expression(condition);
    }

    let result = runtime.block_on(async { builder.send().await });

    match result {
        Ok(_) => Ok(()),
        Err(e) => Err(map_sdk_error(e, Some(&request.table))),
    }
}

/// Update an item and return the updated attributes.
pub fn update_item(
    client: &Client,
    runtime: &Arc<Runtime>,
    request: &UpdateRequest,
) -> Result<Option<Document>, StoreError> {
    let client = client.clone();

    let mut builder = client
        .update_item()
        .table_name(&request.table)
        .set_key(Some(document_to_item(&request.key)))
        .update_expression(&request.update_expression)
        .set_expression_attribute_values(expression_values(&request.values))
        .return_values(ReturnValue::UpdatedNew);

    if let Some(condition) = &request.condition {
        builder = builder.condition_expression(condition);
    }

    let result = runtime.block_on(async { builder.send().await });

    match result {
        Ok(output) => output.attributes.map(decode_item).transpose(),
        Err(e) => Err(map_sdk_error(e, Some(&request.table))),
    }
}

/// Query one page from a table or index.
pub fn query(
    client: &Client,
    runtime: &Arc<Runtime>,
    request: &QueryRequest,
) -> Result<Page, StoreError> {
    let client = client.clone();
    let params = &request.params;

    let builder = client
        .query()
        .table_name(&request.table)
        .key_condition_expression(&request.key_condition)
        .set_filter_expression(request.filter.clone())
        .set_projection_expression(request.projection.clone())
        .set_expression_attribute_names(expression_names(&request.names))
        .set_expression_attribute_values(expression_values(&request.values))
        .set_index_name(params.index_name.clone())
        .set_limit(params.limit)
        .set_scan_index_forward(params.scan_forward)
        .set_exclusive_start_key(
            params
                .start_key
                .as_ref()
                .map(|token| document_to_item(token.as_document())),
        );

    let result = runtime.block_on(async { builder.send().await });

    match result {
        Ok(output) => into_page(output.items, output.last_evaluated_key),
        Err(e) => Err(map_sdk_error(e, Some(&request.table))),
    }
}

/// Scan one page from a table or index.
pub fn scan(
    client: &Client,
    runtime: &Arc<Runtime>,
    request: &ScanRequest,
) -> Result<Page, StoreError> {
    let client = client.clone();
    let params = &request.params;

    let builder = client
        .scan()
        .table_name(&request.table)
        .set_filter_expression(request.filter.clone())
        .set_projection_expression(request.projection.clone())
        .set_expression_attribute_names(expression_names(&request.names))
        .set_expression_attribute_values(expression_values(&request.values))
        .set_index_name(params.index_name.clone())
        .set_limit(params.limit)
        .set_exclusive_start_key(
            params
                .start_key
                .as_ref()
                .map(|token| document_to_item(token.as_document())),
        );

    let result = runtime.block_on(async { builder.send().await });

    match result {
        Ok(output) => into_page(output.items, output.last_evaluated_key),
        Err(e) => Err(map_sdk_error(e, Some(&request.table))),
    }
}
