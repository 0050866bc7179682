//! Non-transactional bulk writes.
//!
//! Requests are sent in chunks of [`BATCH_WRITE_SIZE`]. Items DynamoDB hands
//! back as unprocessed are retried with capped exponential backoff.

use aws_sdk_dynamodb::types::{
    DeleteRequest as SdkDeleteRequest, PutRequest, WriteRequest as SdkWriteRequest,
};
use aws_sdk_dynamodb::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

use crate::errors::{map_sdk_error, StoreError};
use crate::serialization::document_to_item;
use crate::store::WriteRequest;

/// DynamoDB's limit on requests per BatchWriteItem call.
pub const BATCH_WRITE_SIZE: usize = 25;

/// Retry attempts for unprocessed items.
const MAX_RETRIES: usize = 5;
const INITIAL_DELAY: Duration = Duration::from_millis(100);
const MAX_DELAY: Duration = Duration::from_millis(1600);

/// Delay before retry `attempt` (0-based): 100ms, 200ms, 400ms, ... capped at `max`.
fn retry_delay(attempt: usize, initial: Duration, max: Duration) -> Duration {
    let delay_ms = (initial.as_millis() as u64).saturating_mul(2u64.saturating_pow(attempt as u32));
    Duration::from_millis(delay_ms.min(max.as_millis() as u64))
}

fn to_sdk_request(request: WriteRequest) -> Result<SdkWriteRequest, StoreError> {
    let built = match request {
        WriteRequest::Put(item) => {
            let put = PutRequest::builder()
                .set_item(Some(document_to_item(&item)))
                .build()
                .map_err(|e| StoreError::Validation(format!("Invalid put request: {}", e)))?;
            SdkWriteRequest::builder().put_request(put).build()
        }
        WriteRequest::Delete(key) => {
            let delete = SdkDeleteRequest::builder()
                .set_key(Some(document_to_item(&key)))
                .build()
                .map_err(|e| StoreError::Validation(format!("Invalid delete request: {}", e)))?;
            SdkWriteRequest::builder().delete_request(delete).build()
        }
    };
    Ok(built)
}

/// Write every request to `table`, chunked and retried.
///
/// Fails with [`StoreError::Throttling`] if items are still unprocessed after
/// the last retry.
pub fn batch_write(
    client: &Client,
    runtime: &Arc<Runtime>,
    table: &str,
    requests: Vec<WriteRequest>,
) -> Result<(), StoreError> {
    let requests = requests
        .into_iter()
        .map(to_sdk_request)
        .collect::<Result<Vec<_>, _>>()?;

    for chunk in requests.chunks(BATCH_WRITE_SIZE) {
        write_chunk(client, runtime, table, chunk.to_vec())?;
    }
    Ok(())
}

fn write_chunk(
    client: &Client,
    runtime: &Arc<Runtime>,
    table: &str,
    chunk: Vec<SdkWriteRequest>,
) -> Result<(), StoreError> {
    let client = client.clone();
    let mut pending = chunk;
    let mut attempt = 0;

    loop {
        let batch = std::mem::take(&mut pending);
        let result = runtime.block_on(async {
            client
                .batch_write_item()
                .request_items(table, batch)
                .send()
                .await
        });

        let output = result.map_err(|e| map_sdk_error(e, Some(table)))?;
        pending = output
            .unprocessed_items
            .and_then(|mut unprocessed| unprocessed.remove(table))
            .unwrap_or_default();

        if pending.is_empty() {
            return Ok(());
        }
        if attempt >= MAX_RETRIES {
            return Err(StoreError::Throttling(format!(
                "{} items of table '{}' still unprocessed after {} retries",
                pending.len(),
                table,
                MAX_RETRIES
            )));
        }

        let delay = retry_delay(attempt, INITIAL_DELAY, MAX_DELAY);
        tracing::warn!(
            table,
            unprocessed = pending.len(),
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            "retrying unprocessed batch items"
        );
        runtime.block_on(tokio::time::sleep(delay));
        attempt += 1;
    }
}
