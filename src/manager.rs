//! Facade tying the mapper, the query builder and transactions to a store.

use std::sync::Arc;

use crate::client::{ClientConfig, DynamoClient};
use crate::errors::{Error, Result};
use crate::item::{Item, Persistable, ITEM_TYPE};
use crate::mapper::ItemMapper;
use crate::query::QueryBuilder;
use crate::repository::Repository;
use crate::serialization::Document;
use crate::store::{
    DeleteRequest, Page, QueryRequest, Store, TableDefinition, TableDescription, UpdateRequest,
    WriteRequest,
};
use crate::transaction::{render_update_expression, TransactionBatch};

/// Entry point for typed persistence.
///
/// # Examples
///
/// ```no_run
/// use dynamap::{ClientConfig, Manager};
///
/// # fn main() -> dynamap::Result<()> {
/// let manager = Manager::connect(ClientConfig::from_env())?;
/// println!("{:?}", manager.list_tables()?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Manager {
    store: Arc<dyn Store>,
}

impl Manager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Build a DynamoDB-backed manager.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let client = DynamoClient::new(config)?;
        Ok(Self::new(Arc::new(client)))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Serialize and put one item.
    pub fn save<T: Item>(&self, item: &T) -> Result<()> {
        let document = ItemMapper::<T>::new()?.serialize(item)?;
        self.store.put_item(T::table_name(), document)?;
        Ok(())
    }

    /// Delete one item by its primary key.
    pub fn delete<T: Item>(&self, item: &T) -> Result<()> {
        self.store.delete_item(DeleteRequest {
            table: T::table_name().to_string(),
            key: item.key(),
            condition: None,
            values: Document::new(),
        })?;
        Ok(())
    }

    /// Fetch and hydrate one item by key.
    pub fn get<T: Item>(&self, pk: &str, sk: Option<&str>) -> Result<Option<T>> {
        self.repository::<T>()?.get(pk, sk)
    }

    /// Apply a single-item update and return the updated attributes.
    pub fn update(
        &self,
        table: &str,
        key: Document,
        update_expression: &str,
        values: Document,
        condition: Option<String>,
    ) -> Result<Option<Document>> {
        let request = UpdateRequest {
            table: table.to_string(),
            key,
            update_expression: render_update_expression(update_expression),
            values,
            condition: condition.filter(|c| !c.is_empty()),
        };
        Ok(self.store.update_item(request)?)
    }

    /// Hydrate a raw document as `T`. Missing or empty documents give `None`.
    pub fn convert<T: Item>(&self, document: Option<Document>) -> Result<Option<T>> {
        match document {
            Some(doc) if !doc.is_empty() => ItemMapper::<T>::new()?.hydrate(doc).map(Some),
            _ => Ok(None),
        }
    }

    /// Hydrate every document as `T`.
    pub fn convert_items<T: Item>(&self, documents: Vec<Document>) -> Result<Vec<T>> {
        let mapper = ItemMapper::<T>::new()?;
        documents.into_iter().map(|doc| mapper.hydrate(doc)).collect()
    }

    /// The `ItemType` discriminator of a raw document, for dispatching
    /// heterogeneous rows to the right type.
    pub fn item_type_of<'a>(&self, document: &'a Document) -> Option<&'a str> {
        document.get(ITEM_TYPE).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
    }

    /// Run one raw query page.
    pub fn query(&self, request: &QueryRequest) -> Result<Page> {
        Ok(self.store.query(request)?)
    }

    /// Bulk put items that all live in the same table.
    ///
    /// Every item is serialized and checked before the first store call.
    pub fn insert_items(&self, items: &[&dyn Persistable]) -> Result<()> {
        let table = match shared_table(items)? {
            Some(table) => table,
            None => return Ok(()),
        };
        let requests = items
            .iter()
            .map(|item| item.to_document().map(WriteRequest::Put))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(table, items = requests.len(), "bulk insert");
        self.store.batch_write(table, requests)?;
        Ok(())
    }

    /// Put items one by one, each into its own table.
    ///
    /// Items may span tables. Every item is serialized before the first put;
    /// a failed put stops the run and earlier puts stay written.
    pub fn put_all(&self, items: &[&dyn Persistable]) -> Result<()> {
        let documents = items
            .iter()
            .map(|item| Ok((item.table(), item.to_document()?)))
            .collect::<Result<Vec<_>>>()?;

        for (table, document) in documents {
            self.store.put_item(table, document)?;
        }
        Ok(())
    }

    /// Bulk delete items that all live in the same table.
    pub fn delete_items(&self, items: &[&dyn Persistable]) -> Result<()> {
        let table = match shared_table(items)? {
            Some(table) => table,
            None => return Ok(()),
        };
        let requests = items
            .iter()
            .map(|item| WriteRequest::Delete(item.primary_key()))
            .collect::<Vec<_>>();

        tracing::debug!(table, items = requests.len(), "bulk delete");
        self.store.batch_write(table, requests)?;
        Ok(())
    }

    /// A fresh, empty transaction batch on this store.
    pub fn transaction(&self) -> TransactionBatch {
        TransactionBatch::new(self.store.clone())
    }

    pub fn repository<T: Item>(&self) -> Result<Repository<T>> {
        Repository::new(self.store.clone())
    }

    pub fn query_builder<T: Item>(&self) -> Result<QueryBuilder<T>> {
        QueryBuilder::new(self.store.clone())
    }

    pub fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.store.list_tables()?)
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.store.table_exists(table)?)
    }

    /// Table metadata. A missing table surfaces as
    /// [`StoreError::TableNotFound`](crate::StoreError::TableNotFound).
    pub fn describe_table(&self, table: &str) -> Result<TableDescription> {
        Ok(self.store.describe_table(table)?)
    }

    /// Create a table. An existing table surfaces as
    /// [`StoreError::TableAlreadyExists`](crate::StoreError::TableAlreadyExists).
    pub fn create_table(&self, definition: &TableDefinition) -> Result<()> {
        Ok(self.store.create_table(definition)?)
    }

    pub fn drop_table(&self, table: &str) -> Result<()> {
        Ok(self.store.delete_table(table)?)
    }
}

/// The table every item shares, or `None` for an empty slice.
fn shared_table(items: &[&dyn Persistable]) -> Result<Option<&'static str>> {
    let Some(first) = items.first() else {
        return Ok(None);
    };
    let table = first.table();
    if let Some(other) = items.iter().find(|item| item.table() != table) {
        return Err(Error::Configuration(format!(
            "Items of different tables in one batch: '{}' and '{}'",
            table,
            other.table()
        )));
    }
    Ok(Some(table))
}
