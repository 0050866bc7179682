//! Shared fixtures: an in-memory recording store and a few item types.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use dynamap::{
    ContinuationToken, DeleteRequest, Document, Field, IndexKey, IndexProjection, Item, Page,
    PropertyDescriptor, QueryRequest, Result, ScalarType, ScanRequest, Store, StoreError,
    TableDefinition, TableDescription, TransactOperation, UpdateRequest, WriteRequest, PK, SK,
};
use serde_json::{json, Value};

pub fn doc(value: Value) -> Document {
    value.as_object().cloned().expect("fixture must be a JSON object")
}

#[derive(Default)]
struct State {
    tables: BTreeMap<String, Vec<Document>>,
    indexes: BTreeMap<String, Vec<String>>,
    calls: Vec<String>,
    queries: Vec<QueryRequest>,
    transactions: Vec<Vec<TransactOperation>>,
    fail_transactions: bool,
}

/// Store keeping rows per table in insertion order and recording every call.
///
/// Expressions are understood as `AND`-joined clauses of `attr = :value` or
/// `begins_with(attr, :value)`. The page limit counts evaluated rows, before
/// the filter, and the continuation token is the key of the last evaluated row.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn seed(&self, table: &str, rows: Vec<Document>) {
        let mut state = self.state();
        let entries = state.tables.entry(table.to_string()).or_default();
        for row in rows {
            upsert(entries, row);
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Document> {
        self.state().tables.get(table).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    pub fn queries(&self) -> Vec<QueryRequest> {
        self.state().queries.clone()
    }

    pub fn transactions(&self) -> Vec<Vec<TransactOperation>> {
        self.state().transactions.clone()
    }

    /// Make every following transaction fail as cancelled.
    pub fn fail_transactions(&self, fail: bool) {
        self.state().fail_transactions = fail;
    }
}

fn same_key(a: &Document, b: &Document) -> bool {
    a.get(PK) == b.get(PK) && a.get(SK) == b.get(SK)
}

fn key_of(row: &Document) -> Document {
    let mut key = Document::new();
    for attr in [PK, SK] {
        if let Some(value) = row.get(attr) {
            key.insert(attr.to_string(), value.clone());
        }
    }
    key
}

fn upsert(rows: &mut Vec<Document>, row: Document) {
    match rows.iter_mut().find(|existing| same_key(existing, &row)) {
        Some(existing) => *existing = row,
        None => rows.push(row),
    }
}

fn resolve<'a>(attr: &'a str, names: &'a BTreeMap<String, String>) -> &'a str {
    names.get(attr).map(String::as_str).unwrap_or(attr)
}

fn matches(
    expression: &str,
    values: &Document,
    names: &BTreeMap<String, String>,
    row: &Document,
) -> bool {
    expression.split(" AND ").all(|clause| {
        let clause = clause.trim().trim_start_matches('(').trim_end_matches(')');
        if let Some(args) = clause.strip_prefix("begins_with(") {
            let mut parts = args.split(',').map(str::trim);
            let (attr, placeholder) = (parts.next().unwrap_or(""), parts.next().unwrap_or(""));
            match (row.get(resolve(attr, names)), values.get(placeholder)) {
                (Some(Value::String(actual)), Some(Value::String(prefix))) => {
                    actual.starts_with(prefix.as_str())
                }
                _ => false,
            }
        } else {
            let mut parts = clause.splitn(2, '=').map(str::trim);
            let (attr, placeholder) = (parts.next().unwrap_or(""), parts.next().unwrap_or(""));
            let actual = row.get(resolve(attr, names));
            actual.is_some() && actual == values.get(placeholder)
        }
    })
}

fn apply_set(row: &mut Document, expression: &str, values: &Document) -> Document {
    let mut updated = Document::new();
    let assignments = expression.trim().strip_prefix("SET").unwrap_or("");
    for assignment in assignments.split(',') {
        let mut parts = assignment.splitn(2, '=').map(str::trim);
        if let (Some(attr), Some(placeholder)) = (parts.next(), parts.next()) {
            if let Some(value) = values.get(placeholder) {
                row.insert(attr.to_string(), value.clone());
                updated.insert(attr.to_string(), value.clone());
            }
        }
    }
    updated
}

#[allow(clippy::too_many_arguments)]
fn page(
    rows: Vec<Document>,
    condition: Option<&str>,
    filter: Option<&str>,
    values: &Document,
    names: &BTreeMap<String, String>,
    limit: Option<i32>,
    forward: bool,
    start: Option<&ContinuationToken>,
) -> Page {
    let mut candidates: Vec<Document> = rows
        .into_iter()
        .filter(|row| condition.map_or(true, |c| matches(c, values, names, row)))
        .collect();
    if !forward {
        candidates.reverse();
    }
    if let Some(token) = start {
        let position = candidates
            .iter()
            .position(|row| same_key(row, token.as_document()))
            .map_or(0, |p| p + 1);
        candidates.drain(..position);
    }

    let limit = limit.map_or(candidates.len(), |l| l.max(0) as usize);
    let more = candidates.len() > limit;
    candidates.truncate(limit);

    let last_key = if more {
        candidates.last().map(|row| ContinuationToken::new(key_of(row)))
    } else {
        None
    };
    let items = candidates
        .into_iter()
        .filter(|row| filter.map_or(true, |f| matches(f, values, names, row)))
        .collect();

    Page { items, last_key }
}

impl Store for MemoryStore {
    fn put_item(&self, table: &str, item: Document) -> std::result::Result<(), StoreError> {
        let mut state = self.state();
        state.calls.push(format!("put_item:{table}"));
        upsert(state.tables.entry(table.to_string()).or_default(), item);
        Ok(())
    }

    fn get_item(&self, table: &str, key: Document) -> std::result::Result<Option<Document>, StoreError> {
        let mut state = self.state();
        state.calls.push(format!("get_item:{table}"));
        Ok(state
            .tables
            .get(table)
            .and_then(|rows| rows.iter().find(|row| same_key(row, &key)).cloned()))
    }

    fn delete_item(&self, request: DeleteRequest) -> std::result::Result<(), StoreError> {
        let mut state = self.state();
        state.calls.push(format!("delete_item:{}", request.table));
        if let Some(rows) = state.tables.get_mut(&request.table) {
            rows.retain(|row| !same_key(row, &request.key));
        }
        Ok(())
    }

    fn update_item(&self, request: UpdateRequest) -> std::result::Result<Option<Document>, StoreError> {
        let mut state = self.state();
        state.calls.push(format!("update_item:{}", request.table));
        let rows = state.tables.entry(request.table.clone()).or_default();
        let index = match rows.iter().position(|row| same_key(row, &request.key)) {
            Some(index) => index,
            None => {
                rows.push(request.key.clone());
                rows.len() - 1
            }
        };
        Ok(Some(apply_set(&mut rows[index], &request.update_expression, &request.values)))
    }

    fn query(&self, request: &QueryRequest) -> std::result::Result<Page, StoreError> {
        let mut state = self.state();
        state.calls.push(format!("query:{}", request.table));
        state.queries.push(request.clone());
        let rows = state.tables.get(&request.table).cloned().unwrap_or_default();
        Ok(page(
            rows,
            Some(&request.key_condition),
            request.filter.as_deref(),
            &request.values,
            &request.names,
            request.params.limit,
            request.params.scan_forward.unwrap_or(true),
            request.params.start_key.as_ref(),
        ))
    }

    fn scan(&self, request: &ScanRequest) -> std::result::Result<Page, StoreError> {
        let mut state = self.state();
        state.calls.push(format!("scan:{}", request.table));
        let rows = state.tables.get(&request.table).cloned().unwrap_or_default();
        Ok(page(
            rows,
            None,
            request.filter.as_deref(),
            &request.values,
            &request.names,
            request.params.limit,
            true,
            request.params.start_key.as_ref(),
        ))
    }

    fn batch_write(&self, table: &str, requests: Vec<WriteRequest>) -> std::result::Result<(), StoreError> {
        let mut state = self.state();
        state.calls.push(format!("batch_write:{table}:{}", requests.len()));
        let rows = state.tables.entry(table.to_string()).or_default();
        for request in requests {
            match request {
                WriteRequest::Put(item) => upsert(rows, item),
                WriteRequest::Delete(key) => rows.retain(|row| !same_key(row, &key)),
            }
        }
        Ok(())
    }

    fn transact_write(&self, operations: &[TransactOperation]) -> std::result::Result<(), StoreError> {
        let mut state = self.state();
        state.calls.push(format!("transact_write:{}", operations.len()));
        state.transactions.push(operations.to_vec());
        if state.fail_transactions {
            return Err(StoreError::TransactionCanceled {
                reasons: vec!["ConditionalCheckFailed".to_string()],
            });
        }
        for operation in operations {
            let rows = state.tables.entry(operation.table().to_string()).or_default();
            match operation {
                TransactOperation::Put(put) => upsert(rows, put.item.clone()),
                TransactOperation::Delete(delete) => rows.retain(|row| !same_key(row, &delete.key)),
                TransactOperation::Update(update) => {
                    if let Some(row) = rows.iter_mut().find(|row| same_key(row, &update.key)) {
                        apply_set(row, &update.update_expression, &update.values);
                    }
                }
            }
        }
        Ok(())
    }

    fn list_tables(&self) -> std::result::Result<Vec<String>, StoreError> {
        let mut state = self.state();
        state.calls.push("list_tables".to_string());
        Ok(state.tables.keys().cloned().collect())
    }

    fn table_exists(&self, table: &str) -> std::result::Result<bool, StoreError> {
        let mut state = self.state();
        state.calls.push(format!("table_exists:{table}"));
        Ok(state.tables.contains_key(table))
    }

    fn describe_table(&self, table: &str) -> std::result::Result<TableDescription, StoreError> {
        let mut state = self.state();
        state.calls.push(format!("describe_table:{table}"));
        let rows = state
            .tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        Ok(TableDescription {
            name: table.to_string(),
            status: Some("ACTIVE".to_string()),
            item_count: Some(rows.len() as i64),
            size_bytes: None,
            indexes: state.indexes.get(table).cloned().unwrap_or_default(),
        })
    }

    fn create_table(&self, definition: &TableDefinition) -> std::result::Result<(), StoreError> {
        let mut state = self.state();
        state.calls.push(format!("create_table:{}", definition.name));
        if state.tables.contains_key(&definition.name) {
            return Err(StoreError::TableAlreadyExists(definition.name.clone()));
        }
        state.tables.insert(definition.name.clone(), Vec::new());
        state.indexes.insert(
            definition.name.clone(),
            definition.indexes.iter().map(|i| i.name.clone()).collect(),
        );
        Ok(())
    }

    fn delete_table(&self, table: &str) -> std::result::Result<(), StoreError> {
        let mut state = self.state();
        state.calls.push(format!("delete_table:{table}"));
        state.indexes.remove(table);
        state
            .tables
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }
}

/// Customer profile row with an owner index.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub region: String,
    pub visits: i64,
    pub tags: Vec<String>,
}

impl Item for Customer {
    fn table_name() -> &'static str {
        "shop"
    }

    fn pk(&self) -> String {
        format!("CUSTOMER#{}", self.id)
    }

    fn sk(&self) -> Option<String> {
        Some("PROFILE".to_string())
    }

    fn fields() -> Result<Vec<Field<Self>>> {
        Ok(vec![
            Field::new(
                "id",
                PropertyDescriptor::new("Id")?.required(),
                |c: &Customer| &c.id,
                |c: &mut Customer| &mut c.id,
            ),
            Field::new(
                "name",
                PropertyDescriptor::new("Name")?.required(),
                |c: &Customer| &c.name,
                |c: &mut Customer| &mut c.name,
            ),
            Field::new(
                "region",
                PropertyDescriptor::new("Region")?,
                |c: &Customer| &c.region,
                |c: &mut Customer| &mut c.region,
            ),
            Field::new(
                "visits",
                PropertyDescriptor::new("Visits")?.typed(ScalarType::Integer),
                |c: &Customer| &c.visits,
                |c: &mut Customer| &mut c.visits,
            ),
            Field::new(
                "tags",
                PropertyDescriptor::new("Tags")?.typed(ScalarType::List),
                |c: &Customer| &c.tags,
                |c: &mut Customer| &mut c.tags,
            ),
        ])
    }

    fn indexes() -> Vec<IndexProjection<Self>> {
        vec![IndexProjection::new("GSI1", |c: &Customer| {
            if c.region.is_empty() {
                None
            } else {
                Some(IndexKey::new(format!("REGION#{}", c.region), c.pk()))
            }
        })]
    }
}

/// Order row stored under its customer's partition.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Order {
    pub customer_id: String,
    pub number: String,
    pub total: f64,
}

impl Item for Order {
    fn table_name() -> &'static str {
        "shop"
    }

    fn pk(&self) -> String {
        format!("CUSTOMER#{}", self.customer_id)
    }

    fn sk(&self) -> Option<String> {
        Some(format!("ORDER#{}", self.number))
    }

    fn fields() -> Result<Vec<Field<Self>>> {
        Ok(vec![
            Field::new(
                "customer_id",
                PropertyDescriptor::new("CustomerId")?.required(),
                |o: &Order| &o.customer_id,
                |o: &mut Order| &mut o.customer_id,
            ),
            Field::new(
                "number",
                PropertyDescriptor::new("Number")?.required(),
                |o: &Order| &o.number,
                |o: &mut Order| &mut o.number,
            ),
            Field::new(
                "total",
                PropertyDescriptor::new("Total")?.typed(ScalarType::Float),
                |o: &Order| &o.total,
                |o: &mut Order| &mut o.total,
            ),
        ])
    }
}

/// Row living in a different table.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AuditEntry {
    pub id: String,
    pub message: String,
}

impl Item for AuditEntry {
    fn table_name() -> &'static str {
        "audit"
    }

    fn pk(&self) -> String {
        format!("AUDIT#{}", self.id)
    }

    fn fields() -> Result<Vec<Field<Self>>> {
        Ok(vec![
            Field::new(
                "id",
                PropertyDescriptor::new("Id")?.required(),
                |a: &AuditEntry| &a.id,
                |a: &mut AuditEntry| &mut a.id,
            ),
            Field::new(
                "message",
                PropertyDescriptor::new("Message")?,
                |a: &AuditEntry| &a.message,
                |a: &mut AuditEntry| &mut a.message,
            ),
        ])
    }
}

pub fn customer(id: &str, region: &str) -> Customer {
    Customer {
        id: id.to_string(),
        name: format!("Customer {id}"),
        region: region.to_string(),
        visits: 1,
        tags: vec!["new".to_string()],
    }
}

pub fn order(customer_id: &str, number: &str, total: f64) -> Order {
    Order {
        customer_id: customer_id.to_string(),
        number: number.to_string(),
        total,
    }
}

/// Primary key document.
pub fn key(pk: &str, sk: Option<&str>) -> Document {
    let mut key = Document::new();
    key.insert(PK.to_string(), json!(pk));
    if let Some(sk) = sk {
        key.insert(SK.to_string(), json!(sk));
    }
    key
}
