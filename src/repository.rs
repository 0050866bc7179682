//! Typed reads for a single item type.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::errors::Result;
use crate::item::{Item, PK, SK};
use crate::mapper::ItemMapper;
use crate::query::{QueryBuilder, QueryPage};
use crate::serialization::Document;
use crate::store::{Page, QueryParams, QueryRequest, ScanRequest, Store};

/// Reads items of type `T` from `T::table_name()`.
pub struct Repository<T: Item> {
    store: Arc<dyn Store>,
    mapper: ItemMapper<T>,
}

impl<T: Item> Repository<T> {
    pub fn new(store: Arc<dyn Store>) -> Result<Self> {
        Ok(Self {
            store,
            mapper: ItemMapper::new()?,
        })
    }

    pub fn table(&self) -> &'static str {
        T::table_name()
    }

    /// Fetch and hydrate one item by key.
    pub fn get(&self, pk: &str, sk: Option<&str>) -> Result<Option<T>> {
        match self.get_document(pk, sk)? {
            Some(doc) if !doc.is_empty() => self.mapper.hydrate(doc).map(Some),
            _ => Ok(None),
        }
    }

    /// Fetch one raw document by key.
    pub fn get_document(&self, pk: &str, sk: Option<&str>) -> Result<Option<Document>> {
        let mut key = Document::new();
        key.insert(PK.to_string(), Value::String(pk.to_string()));
        if let Some(sk) = sk.filter(|s| !s.is_empty()) {
            key.insert(SK.to_string(), Value::String(sk.to_string()));
        }
        Ok(self.store.get_item(T::table_name(), key)?)
    }

    /// Run one query page against this table and hydrate the rows.
    ///
    /// # Arguments
    ///
    /// * `key_condition` - Key condition expression
    /// * `values` - Expression attribute values
    /// * `filter` - Optional filter expression
    /// * `projection` - Optional projection expression
    /// * `names` - Expression attribute name placeholders, e.g. `#n` -> `Name`
    /// * `params` - Limit, index, ordering and continuation token
    pub fn query(
        &self,
        key_condition: &str,
        values: Document,
        filter: Option<&str>,
        projection: Option<&str>,
        names: BTreeMap<String, String>,
        params: QueryParams,
    ) -> Result<QueryPage<T>> {
        let mut request = QueryRequest::new(T::table_name(), key_condition);
        request.values = values;
        request.filter = filter.map(str::to_string);
        request.projection = projection.filter(|p| !p.is_empty()).map(str::to_string);
        request.names = names;
        request.params = params;
        request.params.limit = Some(request.params.effective_limit());

        let page = self.store.query(&request)?;
        self.hydrate_page(page)
    }

    /// Run one scan page against this table and hydrate the rows.
    pub fn scan(
        &self,
        filter: Option<&str>,
        values: Document,
        params: QueryParams,
    ) -> Result<QueryPage<T>> {
        let mut request = ScanRequest::new(T::table_name());
        request.filter = filter.map(str::to_string);
        request.values = values;
        request.params = params;
        request.params.limit = Some(request.params.effective_limit());

        let page = self.store.scan(&request)?;
        self.hydrate_page(page)
    }

    pub fn query_builder(&self) -> Result<QueryBuilder<T>> {
        QueryBuilder::new(self.store.clone())
    }

    fn hydrate_page(&self, page: Page) -> Result<QueryPage<T>> {
        let items = page
            .items
            .iter()
            .map(|row| self.mapper.hydrate(row.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(QueryPage {
            items,
            raw: page.items,
            last_key: page.last_key,
        })
    }
}
