//! # dynamap
//!
//! A metadata-driven item mapper for DynamoDB single-table designs.
//!
//! This crate handles:
//! - Declaring item types with typed, validated properties
//! - Hydrating documents into items and serializing items back, including
//!   `PK`/`SK`, the `ItemType` discriminator and index projections
//! - Paged queries, atomic transaction batches and bulk writes
//! - AWS SDK calls via aws-sdk-dynamodb on a shared tokio runtime
//!
//! Everything above the [`Store`] trait is independent of DynamoDB;
//! [`DynamoClient`] is the production implementation.

mod basic_operations;
mod batch_operations;
mod client;
mod descriptor;
mod errors;
mod item;
pub mod logging;
mod manager;
mod mapper;
mod query;
mod repository;
mod serialization;
mod store;
mod table_operations;
mod transaction;
mod transaction_operations;

pub use client::{ClientConfig, DynamoClient, DEFAULT_REGION};
pub use descriptor::{is_blank, PropertyDescriptor, ScalarType};
pub use errors::{Error, Result, StoreError};
pub use item::{
    short_type_name, Field, IndexKey, IndexProjection, Item, Persistable, ITEM_TYPE, PK, SK,
};
pub use manager::Manager;
pub use mapper::ItemMapper;
pub use query::{QueryBuilder, QueryPage, FILTER_ITEM_PLACEHOLDER};
pub use repository::Repository;
pub use serialization::{
    attribute_to_value, document_to_item, item_to_document, value_to_attribute, Document,
    DocumentSource,
};
pub use store::{
    ContinuationToken, DeleteRequest, IndexDefinition, KeyAttributeType, Page, PutOperation,
    QueryParams, QueryRequest, ScanRequest, Store, TableDefinition, TableDescription,
    TransactOperation, UpdateRequest, WriteRequest, DEFAULT_LIMIT, MAX_TRANSACTION_OPERATIONS,
};
pub use transaction::TransactionBatch;
