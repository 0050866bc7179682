//! Query builder with single-page execution and pagination state.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::errors::{Error, Result};
use crate::item::{Item, ITEM_TYPE};
use crate::mapper::ItemMapper;
use crate::serialization::Document;
use crate::store::{ContinuationToken, QueryParams, QueryRequest, Store};

/// Placeholder bound to the item type when filtering by type.
pub const FILTER_ITEM_PLACEHOLDER: &str = ":filterItemClass";

/// One fetched page: hydrated rows, raw rows and the continuation token.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPage<T> {
    pub items: Vec<T>,
    pub raw: Vec<Document>,
    pub last_key: Option<ContinuationToken>,
}

impl<T> QueryPage<T> {
    pub fn is_last(&self) -> bool {
        self.last_key.is_none()
    }
}

/// Accumulates query parameters for one item type and executes one page at a time.
///
/// The caller drives pagination: after each [`execute`](Self::execute), feed
/// [`last_key`](Self::last_key) into [`set_start_key`](Self::set_start_key)
/// (or call [`next_page`](Self::next_page)) until [`is_last_page`](Self::is_last_page).
pub struct QueryBuilder<T: Item> {
    store: Arc<dyn Store>,
    mapper: ItemMapper<T>,
    table: String,
    key_condition: Option<String>,
    values: Document,
    filter: Option<String>,
    attributes: Option<String>,
    names: BTreeMap<String, String>,
    params: QueryParams,
    filter_item: bool,
    page: Option<QueryPage<T>>,
}

impl<T: Item> QueryBuilder<T> {
    pub fn new(store: Arc<dyn Store>) -> Result<Self> {
        Ok(Self {
            store,
            mapper: ItemMapper::new()?,
            table: T::table_name().to_string(),
            key_condition: None,
            values: Document::new(),
            filter: None,
            attributes: None,
            names: BTreeMap::new(),
            params: QueryParams::default(),
            filter_item: false,
            page: None,
        })
    }

    /// Set the key condition expression, e.g. `PK = :pk`.
    pub fn set_condition(&mut self, key_condition: impl Into<String>) -> &mut Self {
        self.key_condition = Some(key_condition.into());
        self
    }

    /// Bind an expression value placeholder.
    pub fn add_value(&mut self, placeholder: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(placeholder.into(), value.into());
        self
    }

    pub fn set_filter(&mut self, filter: impl Into<String>) -> &mut Self {
        self.filter = Some(filter.into());
        self
    }

    /// Set the projection expression.
    pub fn set_attributes(&mut self, attributes: impl Into<String>) -> &mut Self {
        self.attributes = Some(attributes.into());
        self
    }

    /// Bind an expression attribute name placeholder, e.g. `#s` to `status`.
    pub fn add_attribute_name(
        &mut self,
        placeholder: impl Into<String>,
        name: impl Into<String>,
    ) -> &mut Self {
        self.names.insert(placeholder.into(), name.into());
        self
    }

    pub fn set_index(&mut self, index: impl Into<String>) -> &mut Self {
        self.params.index_name = Some(index.into());
        self
    }

    pub fn index(&self) -> Option<&str> {
        self.params.index_name.as_deref()
    }

    pub fn set_limit(&mut self, limit: i32) -> &mut Self {
        self.params.limit = Some(limit);
        self
    }

    pub fn limit(&self) -> Option<i32> {
        self.params.limit
    }

    /// Read the sort key in descending order.
    pub fn set_order_by_desc(&mut self) -> &mut Self {
        self.params.scan_forward = Some(false);
        self
    }

    /// Resume from a continuation token returned by a previous page.
    pub fn set_start_key(&mut self, start_key: ContinuationToken) -> &mut Self {
        self.params.start_key = Some(start_key);
        self
    }

    /// Restrict results to rows whose `ItemType` is `T`'s discriminator.
    pub fn filter_item(&mut self, enabled: bool) -> &mut Self {
        self.filter_item = enabled;
        self
    }

    pub fn last_key(&self) -> Option<&ContinuationToken> {
        self.page.as_ref().and_then(|p| p.last_key.as_ref())
    }

    /// Hydrated rows of the most recent page.
    pub fn items(&self) -> &[T] {
        self.page.as_ref().map(|p| p.items.as_slice()).unwrap_or(&[])
    }

    pub fn last_page(&self) -> Option<&QueryPage<T>> {
        self.page.as_ref()
    }

    /// True before any execution and after a page without continuation token.
    pub fn is_last_page(&self) -> bool {
        self.last_key().is_none()
    }

    /// Render the request the next [`execute`](Self::execute) would send.
    pub fn request(&self) -> Result<QueryRequest> {
        let key_condition = self.key_condition.clone().ok_or_else(|| {
            Error::Configuration(format!(
                "a key condition is required to query '{}'",
                self.table
            ))
        })?;

        let mut values = self.values.clone();
        let filter = if self.filter_item {
            values.insert(
                FILTER_ITEM_PLACEHOLDER.to_string(),
                Value::String(T::item_type().to_string()),
            );
            let predicate = format!("{} = {}", ITEM_TYPE, FILTER_ITEM_PLACEHOLDER);
            Some(match &self.filter {
                Some(existing) => format!("{} AND ({})", predicate, existing),
                None => predicate,
            })
        } else {
            self.filter.clone()
        };

        let mut params = self.params.clone();
        params.limit = Some(params.effective_limit());

        Ok(QueryRequest {
            table: self.table.clone(),
            key_condition,
            values,
            filter,
            projection: self.attributes.clone(),
            names: self.names.clone(),
            params,
        })
    }

    /// Fetch one page, hydrate its rows and remember the continuation token.
    pub fn execute(&mut self) -> Result<&QueryPage<T>> {
        let request = self.request()?;
        tracing::debug!(
            table = %request.table,
            index = ?request.params.index_name,
            limit = ?request.params.limit,
            resumed = request.params.start_key.is_some(),
            "executing query"
        );

        let page = self.store.query(&request)?;
        let items = page
            .items
            .iter()
            .map(|row| self.mapper.hydrate(row.clone()))
            .collect::<Result<Vec<_>>>()?;

        Ok(self.page.insert(QueryPage {
            items,
            raw: page.items,
            last_key: page.last_key,
        }))
    }

    /// Fetch the first page, or continue from the last one.
    ///
    /// Returns `None` once pagination is exhausted.
    pub fn next_page(&mut self) -> Result<Option<&QueryPage<T>>> {
        if self.page.is_none() {
            return self.execute().map(Some);
        }
        match self.last_key().cloned() {
            Some(token) => {
                self.set_start_key(token);
                self.execute().map(Some)
            }
            None => Ok(None),
        }
    }
}
