//! Table management operations for DynamoDB.
//!
//! Provides functions to create, delete, list and check tables.
//! Useful for local development and testing with moto/localstack.

use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, GlobalSecondaryIndex, KeySchemaElement, KeyType,
    LocalSecondaryIndex, Projection, ProjectionType, ProvisionedThroughput, ScalarAttributeType,
    SseSpecification, SseType, TableClass, TableStatus,
};
use aws_sdk_dynamodb::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

use crate::errors::{map_sdk_error, StoreError};
use crate::store::{IndexDefinition, KeyAttributeType, TableDefinition, TableDescription};

const DEFAULT_CAPACITY: i64 = 5;

fn invalid(what: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Validation(format!("Invalid {}: {}", what, err))
}

/// Create a new DynamoDB table.
///
/// Index key attributes are declared as strings, which is what item index
/// projections write.
pub fn create_table(
    client: &Client,
    runtime: &Arc<Runtime>,
    definition: &TableDefinition,
) -> Result<(), StoreError> {
    let mut attributes = AttributeSet::default();

    let (pk_name, pk_type) = &definition.partition_key;
    attributes.add(pk_name, attribute_type(*pk_type))?;
    let mut key_schema = vec![key_element(pk_name, KeyType::Hash)?];

    if let Some((sk_name, sk_type)) = &definition.sort_key {
        attributes.add(sk_name, attribute_type(*sk_type))?;
        key_schema.push(key_element(sk_name, KeyType::Range)?);
    }

    let billing = parse_billing_mode(&definition.billing_mode)?;
    let throughput = if billing == BillingMode::Provisioned {
        Some(
            ProvisionedThroughput::builder()
                .read_capacity_units(definition.read_capacity.unwrap_or(DEFAULT_CAPACITY))
                .write_capacity_units(definition.write_capacity.unwrap_or(DEFAULT_CAPACITY))
                .build()
                .map_err(|e| invalid("provisioned throughput", e))?,
        )
    } else {
        None
    };

    let mut global_indexes = Vec::new();
    let mut local_indexes = Vec::new();
    for index in &definition.indexes {
        let schema = index_key_schema(index, &mut attributes)?;
        if index.local {
            local_indexes.push(
                LocalSecondaryIndex::builder()
                    .index_name(&index.name)
                    .set_key_schema(Some(schema))
                    .projection(projection_all())
                    .build()
                    .map_err(|e| invalid("local secondary index", e))?,
            );
        } else {
            global_indexes.push(
                GlobalSecondaryIndex::builder()
                    .index_name(&index.name)
                    .set_key_schema(Some(schema))
                    .projection(projection_all())
                    .set_provisioned_throughput(throughput.clone())
                    .build()
                    .map_err(|e| invalid("global secondary index", e))?,
            );
        }
    }

    let mut request = client
        .clone()
        .create_table()
        .table_name(&definition.name)
        .set_attribute_definitions(Some(attributes.into_definitions()))
        .set_key_schema(Some(key_schema))
        .billing_mode(billing)
        .set_provisioned_throughput(throughput);

    if !global_indexes.is_empty() {
        request = request.set_global_secondary_indexes(Some(global_indexes));
    }
    if !local_indexes.is_empty() {
        request = request.set_local_secondary_indexes(Some(local_indexes));
    }
    if let Some(tc) = &definition.table_class {
        request = request.table_class(parse_table_class(tc)?);
    }
    if let Some(enc) = &definition.encryption {
        request = request.sse_specification(build_sse_specification(
            enc,
            definition.kms_key_id.as_deref(),
        )?);
    }

    runtime
        .block_on(async { request.send().await })
        .map_err(|e| map_sdk_error(e, Some(&definition.name)))?;

    tracing::info!(table = %definition.name, "created table");
    Ok(())
}

/// Check if a table exists.
pub fn table_exists(
    client: &Client,
    runtime: &Arc<Runtime>,
    table_name: &str,
) -> Result<bool, StoreError> {
    let client = client.clone();

    let result = runtime.block_on(async {
        client.describe_table().table_name(table_name).send().await
    });

    match result {
        Ok(_) => Ok(true),
        Err(e) => match map_sdk_error(e, Some(table_name)) {
            StoreError::TableNotFound(_) => Ok(false),
            other => Err(other),
        },
    }
}

/// Describe a table: status, item count, size and index names.
pub fn describe_table(
    client: &Client,
    runtime: &Arc<Runtime>,
    table_name: &str,
) -> Result<TableDescription, StoreError> {
    let client = client.clone();

    let output = runtime
        .block_on(async { client.describe_table().table_name(table_name).send().await })
        .map_err(|e| map_sdk_error(e, Some(table_name)))?;

    let table = output
        .table()
        .ok_or_else(|| StoreError::TableNotFound(table_name.to_string()))?;

    let indexes = table
        .global_secondary_indexes()
        .iter()
        .filter_map(|index| index.index_name())
        .chain(
            table
                .local_secondary_indexes()
                .iter()
                .filter_map(|index| index.index_name()),
        )
        .map(str::to_string)
        .collect();

    Ok(TableDescription {
        name: table.table_name().unwrap_or(table_name).to_string(),
        status: table.table_status().map(|s| s.as_str().to_string()),
        item_count: table.item_count(),
        size_bytes: table.table_size_bytes(),
        indexes,
    })
}

/// Delete a table.
pub fn delete_table(
    client: &Client,
    runtime: &Arc<Runtime>,
    table_name: &str,
) -> Result<(), StoreError> {
    let client = client.clone();

    runtime
        .block_on(async { client.delete_table().table_name(table_name).send().await })
        .map_err(|e| map_sdk_error(e, Some(table_name)))?;

    tracing::info!(table = table_name, "deleted table");
    Ok(())
}

/// List every table name, following pagination.
pub fn list_tables(client: &Client, runtime: &Arc<Runtime>) -> Result<Vec<String>, StoreError> {
    let client = client.clone();

    runtime.block_on(async {
        let mut names = Vec::new();
        let mut start: Option<String> = None;
        loop {
            let output = client
                .list_tables()
                .set_exclusive_start_table_name(start.take())
                .send()
                .await
                .map_err(|e| map_sdk_error(e, None))?;

            names.extend(output.table_names.unwrap_or_default());
            match output.last_evaluated_table_name {
                Some(last) => start = Some(last),
                None => return Ok::<_, StoreError>(names),
            }
        }
    })
}

/// Wait for a table to become active.
///
/// Polls the table status until it becomes ACTIVE or times out.
///
/// # Arguments
///
/// * `client` - The DynamoDB client
/// * `runtime` - The Tokio runtime
/// * `table_name` - Name of the table to wait for
/// * `timeout_seconds` - Maximum time to wait (default: 60)
pub fn wait_for_table_active(
    client: &Client,
    runtime: &Arc<Runtime>,
    table_name: &str,
    timeout_seconds: Option<u64>,
) -> Result<(), StoreError> {
    let client = client.clone();
    let timeout = timeout_seconds.unwrap_or(60);

    runtime.block_on(async {
        let start = std::time::Instant::now();
        let poll_interval = Duration::from_millis(500);

        loop {
            if start.elapsed().as_secs() > timeout {
                return Err(StoreError::Service(format!(
                    "Timeout waiting for table '{}' to become active",
                    table_name
                )));
            }

            match client.describe_table().table_name(table_name).send().await {
                Ok(response) => {
                    if let Some(table) = response.table() {
                        if table.table_status() == Some(&TableStatus::Active) {
                            return Ok(());
                        }
                    }
                }
                Err(e) => match map_sdk_error(e, Some(table_name)) {
                    StoreError::TableNotFound(_) => {}
                    other => return Err(other),
                },
            }

            tokio::time::sleep(poll_interval).await;
        }
    })
}

/// Attribute definitions, each name declared once.
#[derive(Default)]
struct AttributeSet {
    definitions: Vec<AttributeDefinition>,
}

impl AttributeSet {
    fn add(&mut self, name: &str, kind: ScalarAttributeType) -> Result<(), StoreError> {
        if self.definitions.iter().any(|d| d.attribute_name() == name) {
            return Ok(());
        }
        self.definitions.push(
            AttributeDefinition::builder()
                .attribute_name(name)
                .attribute_type(kind)
                .build()
                .map_err(|e| invalid("attribute definition", e))?,
        );
        Ok(())
    }

    fn into_definitions(self) -> Vec<AttributeDefinition> {
        self.definitions
    }
}

fn key_element(name: &str, key_type: KeyType) -> Result<KeySchemaElement, StoreError> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()
        .map_err(|e| invalid("key schema", e))
}

fn index_key_schema(
    index: &IndexDefinition,
    attributes: &mut AttributeSet,
) -> Result<Vec<KeySchemaElement>, StoreError> {
    attributes.add(&index.partition_key, ScalarAttributeType::S)?;
    let mut schema = vec![key_element(&index.partition_key, KeyType::Hash)?];
    if let Some(sort_key) = &index.sort_key {
        attributes.add(sort_key, ScalarAttributeType::S)?;
        schema.push(key_element(sort_key, KeyType::Range)?);
    }
    Ok(schema)
}

fn projection_all() -> Projection {
    Projection::builder()
        .projection_type(ProjectionType::All)
        .build()
}

fn attribute_type(kind: KeyAttributeType) -> ScalarAttributeType {
    match kind {
        KeyAttributeType::String => ScalarAttributeType::S,
        KeyAttributeType::Number => ScalarAttributeType::N,
        KeyAttributeType::Binary => ScalarAttributeType::B,
    }
}

/// Parse a string billing mode to BillingMode.
fn parse_billing_mode(mode_str: &str) -> Result<BillingMode, StoreError> {
    match mode_str.to_uppercase().as_str() {
        "PAY_PER_REQUEST" => Ok(BillingMode::PayPerRequest),
        "PROVISIONED" => Ok(BillingMode::Provisioned),
        _ => Err(StoreError::Validation(format!(
            "Invalid billing_mode: '{}'. Use 'PAY_PER_REQUEST' or 'PROVISIONED'",
            mode_str
        ))),
    }
}

/// Parse a string table class to TableClass.
fn parse_table_class(class_str: &str) -> Result<TableClass, StoreError> {
    match class_str.to_uppercase().as_str() {
        "STANDARD" => Ok(TableClass::Standard),
        "STANDARD_INFREQUENT_ACCESS" | "STANDARD_IA" => Ok(TableClass::StandardInfrequentAccess),
        _ => Err(StoreError::Validation(format!(
            "Invalid table_class: '{}'. Use 'STANDARD' or 'STANDARD_INFREQUENT_ACCESS'",
            class_str
        ))),
    }
}

/// Build SSE specification from encryption type and optional KMS key.
///
/// Accepts:
/// - "AWS_OWNED" - Default encryption with AWS owned keys
/// - "AWS_MANAGED" - Encryption with AWS managed KMS key
/// - "CUSTOMER_MANAGED" - Encryption with customer KMS key (requires kms_key_id)
fn build_sse_specification(
    encryption: &str,
    kms_key_id: Option<&str>,
) -> Result<SseSpecification, StoreError> {
    match encryption.to_uppercase().as_str() {
        "AWS_OWNED" => Ok(SseSpecification::builder().enabled(true).build()),
        "AWS_MANAGED" => Ok(SseSpecification::builder()
            .enabled(true)
            .sse_type(SseType::Kms)
            .build()),
        "CUSTOMER_MANAGED" => {
            let key_id = kms_key_id.ok_or_else(|| {
                StoreError::Validation(
                    "kms_key_id is required when encryption is 'CUSTOMER_MANAGED'".to_string(),
                )
            })?;
            Ok(SseSpecification::builder()
                .enabled(true)
                .sse_type(SseType::Kms)
                .kms_master_key_id(key_id)
                .build())
        }
        _ => Err(StoreError::Validation(format!(
            "Invalid encryption: '{}'. Use 'AWS_OWNED', 'AWS_MANAGED', or 'CUSTOMER_MANAGED'",
            encryption
        ))),
    }
}
