//! The store boundary.
//!
//! [`Store`] is the minimal set of primitives the mapping layer needs from a
//! key-value store. [`crate::DynamoClient`] implements it over DynamoDB; tests
//! and local tools can provide their own.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::StoreError;
use crate::serialization::Document;

/// Default page size for queries and scans.
pub const DEFAULT_LIMIT: i32 = 10;

/// Hard limit on operations in one transactional write.
pub const MAX_TRANSACTION_OPERATIONS: usize = 25;

/// Opaque cursor returned by a partial query or scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationToken(Document);

impl ContinuationToken {
    pub fn new(last_evaluated_key: Document) -> Self {
        Self(last_evaluated_key)
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }

    pub fn into_document(self) -> Document {
        self.0
    }
}

impl From<Document> for ContinuationToken {
    fn from(doc: Document) -> Self {
        Self(doc)
    }
}

/// One page of raw rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Document>,
    pub last_key: Option<ContinuationToken>,
}

/// Paging and index options shared by queries and scans.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    pub index_name: Option<String>,
    pub limit: Option<i32>,
    /// `Some(false)` reads the sort key in descending order.
    pub scan_forward: Option<bool>,
    pub start_key: Option<ContinuationToken>,
}

impl QueryParams {
    /// Page size to request, falling back to [`DEFAULT_LIMIT`].
    pub fn effective_limit(&self) -> i32 {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }
}

/// A fully rendered query request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    pub table: String,
    pub key_condition: String,
    pub values: Document,
    pub filter: Option<String>,
    pub projection: Option<String>,
    pub names: BTreeMap<String, String>,
    pub params: QueryParams,
}

impl QueryRequest {
    pub fn new(table: impl Into<String>, key_condition: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key_condition: key_condition.into(),
            ..Default::default()
        }
    }
}

/// A fully rendered scan request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanRequest {
    pub table: String,
    pub filter: Option<String>,
    pub values: Document,
    pub projection: Option<String>,
    pub names: BTreeMap<String, String>,
    pub params: QueryParams,
}

impl ScanRequest {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }
}

/// Single-item delete with an optional condition.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    pub table: String,
    pub key: Document,
    pub condition: Option<String>,
    pub values: Document,
}

/// Single-item update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub table: String,
    pub key: Document,
    pub update_expression: String,
    pub values: Document,
    pub condition: Option<String>,
}

/// One entry of a non-transactional batch write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    Put(Document),
    Delete(Document),
}

/// Put inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct PutOperation {
    pub table: String,
    pub item: Document,
    pub condition: Option<String>,
    pub values: Document,
}

/// One rendered operation of a transactional write.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactOperation {
    Put(PutOperation),
    Delete(DeleteRequest),
    Update(UpdateRequest),
}

impl TransactOperation {
    pub fn table(&self) -> &str {
        match self {
            TransactOperation::Put(op) => &op.table,
            TransactOperation::Delete(op) => &op.table,
            TransactOperation::Update(op) => &op.table,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TransactOperation::Put(_) => "Put",
            TransactOperation::Delete(_) => "Delete",
            TransactOperation::Update(_) => "Update",
        }
    }
}

/// Scalar type of a key attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyAttributeType {
    #[serde(alias = "S")]
    String,
    #[serde(alias = "N")]
    Number,
    #[serde(alias = "B")]
    Binary,
}

/// A secondary index in a table definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub partition_key: String,
    pub sort_key: Option<String>,
    /// Local indexes share the table's partition key.
    #[serde(default)]
    pub local: bool,
}

/// Table layout for [`Store::create_table`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub partition_key: (String, KeyAttributeType),
    pub sort_key: Option<(String, KeyAttributeType)>,
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
    /// `"PAY_PER_REQUEST"` or `"PROVISIONED"`.
    #[serde(default = "default_billing_mode")]
    pub billing_mode: String,
    pub read_capacity: Option<i64>,
    pub write_capacity: Option<i64>,
    pub table_class: Option<String>,
    pub encryption: Option<String>,
    pub kms_key_id: Option<String>,
}

fn default_billing_mode() -> String {
    "PAY_PER_REQUEST".to_string()
}

impl TableDefinition {
    /// The single-table layout items use: string `PK`, string `SK`.
    pub fn single_table(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_key: ("PK".to_string(), KeyAttributeType::String),
            sort_key: Some(("SK".to_string(), KeyAttributeType::String)),
            indexes: Vec::new(),
            billing_mode: default_billing_mode(),
            read_capacity: None,
            write_capacity: None,
            table_class: None,
            encryption: None,
            kms_key_id: None,
        }
    }

    /// Add an index over the attributes written by an item's index
    /// projections: `<name>Pk` / `<name>Sk` for `GSI*`, the table partition
    /// key and `<name>Sk` for `LSI*`.
    pub fn with_projected_index(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        let local = name.to_uppercase().starts_with("LSI");
        let partition_key = if local {
            self.partition_key.0.clone()
        } else {
            format!("{}Pk", name)
        };
        self.indexes.push(IndexDefinition {
            partition_key,
            sort_key: Some(format!("{}Sk", name)),
            local,
            name,
        });
        self
    }
}

/// Table metadata returned by [`Store::describe_table`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescription {
    pub name: String,
    /// `"ACTIVE"`, `"CREATING"`, ...
    pub status: Option<String>,
    pub item_count: Option<i64>,
    pub size_bytes: Option<i64>,
    /// Global and local secondary index names.
    #[serde(default)]
    pub indexes: Vec<String>,
}

/// Primitives the mapping layer needs from the underlying store.
///
/// Calls are synchronous and may block on I/O. Implementations own any retry
/// policy; the mapping layer never retries.
pub trait Store: Send + Sync {
    fn put_item(&self, table: &str, item: Document) -> Result<(), StoreError>;

    fn get_item(&self, table: &str, key: Document) -> Result<Option<Document>, StoreError>;

    fn delete_item(&self, request: DeleteRequest) -> Result<(), StoreError>;

    /// Apply an update and return the updated attributes.
    fn update_item(&self, request: UpdateRequest) -> Result<Option<Document>, StoreError>;

    fn query(&self, request: &QueryRequest) -> Result<Page, StoreError>;

    fn scan(&self, request: &ScanRequest) -> Result<Page, StoreError>;

    /// Non-transactional bulk write. Chunking to the store's own limits is the
    /// implementation's concern.
    fn batch_write(&self, table: &str, requests: Vec<WriteRequest>) -> Result<(), StoreError>;

    /// Apply all operations atomically, or none.
    fn transact_write(&self, operations: &[TransactOperation]) -> Result<(), StoreError>;

    fn list_tables(&self) -> Result<Vec<String>, StoreError>;

    fn table_exists(&self, table: &str) -> Result<bool, StoreError>;

    /// Metadata of one table. A missing table is [`StoreError::TableNotFound`].
    fn describe_table(&self, table: &str) -> Result<TableDescription, StoreError>;

    fn create_table(&self, definition: &TableDefinition) -> Result<(), StoreError>;

    fn delete_table(&self, table: &str) -> Result<(), StoreError>;
}
