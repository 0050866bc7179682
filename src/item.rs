//! Item types and their registered metadata.
//!
//! An [`Item`] declares its table, its keys, an explicit list of mapped
//! [`Field`]s and an optional list of [`IndexProjection`]s. The mapping for
//! each type is built once, on first use, and cached for the process lifetime.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::descriptor::PropertyDescriptor;
use crate::errors::{Error, Result};
use crate::mapper::ItemMapper;
use crate::serialization::Document;

/// Attribute holding the partition key.
pub const PK: &str = "PK";
/// Attribute holding the sort key.
pub const SK: &str = "SK";
/// Attribute holding the item type discriminator.
pub const ITEM_TYPE: &str = "ItemType";

/// A typed domain object stored as one wire document.
///
/// # Examples
///
/// ```
/// use dynamap::{Field, Item, PropertyDescriptor, Result, ScalarType};
///
/// #[derive(Default)]
/// struct User {
///     id: String,
///     age: i64,
/// }
///
/// impl Item for User {
///     fn table_name() -> &'static str {
///         "users"
///     }
///
///     fn pk(&self) -> String {
///         format!("USER#{}", self.id)
///     }
///
///     fn fields() -> Result<Vec<Field<Self>>> {
///         Ok(vec![
///             Field::new("id", PropertyDescriptor::new("Id")?.required(), |u: &User| &u.id, |u: &mut User| &mut u.id),
///             Field::new("age", PropertyDescriptor::new("Age")?.typed(ScalarType::Integer), |u: &User| &u.age, |u: &mut User| &mut u.age),
///         ])
///     }
/// }
/// ```
pub trait Item: Default + Send + Sync + 'static {
    /// Table this type is stored in.
    fn table_name() -> &'static str;

    /// Partition key value.
    fn pk(&self) -> String;

    /// Sort key value. An empty string is treated as no sort key.
    fn sk(&self) -> Option<String> {
        None
    }

    /// Discriminator written to `ItemType`. Defaults to the type's short name.
    fn item_type() -> &'static str {
        short_type_name::<Self>()
    }

    /// The mapped fields, in declaration order.
    fn fields() -> Result<Vec<Field<Self>>>;

    /// Secondary index projections.
    fn indexes() -> Vec<IndexProjection<Self>> {
        Vec::new()
    }

    /// Primary key document: `PK` and, when present, `SK`.
    fn key(&self) -> Document {
        let mut key = Document::new();
        key.insert(PK.to_string(), Value::String(self.pk()));
        if let Some(sk) = non_empty_sk(self.sk()) {
            key.insert(SK.to_string(), Value::String(sk));
        }
        key
    }
}

pub(crate) fn non_empty_sk(sk: Option<String>) -> Option<String> {
    sk.filter(|s| !s.is_empty())
}

/// Last path segment of a type name, without generic arguments.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

type Getter<T> = Box<dyn Fn(&T) -> Result<Value> + Send + Sync>;
type Setter<T> = Box<dyn Fn(&mut T, Value) -> Result<()> + Send + Sync>;
type HydrateHook<T> = Box<dyn Fn(&mut T, Value) -> Result<()> + Send + Sync>;
type SerializeHook<T> = Box<dyn Fn(&T) -> Result<Value> + Send + Sync>;

/// One mapped field: its descriptor plus generated accessors and hooks.
pub struct Field<T> {
    ident: &'static str,
    descriptor: PropertyDescriptor,
    get: Getter<T>,
    set: Setter<T>,
    on_hydrate: Option<HydrateHook<T>>,
    on_serialize: Option<SerializeHook<T>>,
}

impl<T: 'static> Field<T> {
    /// Map the struct field `ident` through a pair of accessors.
    ///
    /// Values cross the boundary through serde. A value that does not fit the
    /// Rust field type is a type error naming the wire attribute. A null that
    /// the Rust type cannot hold leaves the field untouched.
    pub fn new<V, G, M>(ident: &'static str, descriptor: PropertyDescriptor, get: G, get_mut: M) -> Self
    where
        V: Serialize + DeserializeOwned + 'static,
        G: Fn(&T) -> &V + Send + Sync + 'static,
        M: Fn(&mut T) -> &mut V + Send + Sync + 'static,
    {
        let read_name = descriptor.name().to_string();
        let write_name = read_name.clone();
        let expected = short_type_name::<V>();

        Self {
            ident,
            descriptor,
            get: Box::new(move |item| {
                serde_json::to_value(get(item)).map_err(|_| Error::Type {
                    field: read_name.clone(),
                    expected: expected.to_string(),
                })
            }),
            set: Box::new(move |item, value| {
                let is_null = value.is_null();
                match serde_json::from_value(value) {
                    Ok(parsed) => *get_mut(item) = parsed,
                    Err(_) if is_null => {}
                    Err(_) => {
                        return Err(Error::Type {
                            field: write_name.clone(),
                            expected: expected.to_string(),
                        })
                    }
                }
                Ok(())
            }),
            on_hydrate: None,
            on_serialize: None,
        }
    }

    /// Replace direct assignment with a hook that owns the hydrated value.
    pub fn on_hydrate<H>(mut self, hook: H) -> Self
    where
        H: Fn(&mut T, Value) -> Result<()> + Send + Sync + 'static,
    {
        self.on_hydrate = Some(Box::new(hook));
        self
    }

    /// Replace direct reads with a hook that computes the outgoing value.
    pub fn on_serialize<H>(mut self, hook: H) -> Self
    where
        H: Fn(&T) -> Result<Value> + Send + Sync + 'static,
    {
        self.on_serialize = Some(Box::new(hook));
        self
    }

    pub fn ident(&self) -> &'static str {
        self.ident
    }

    pub fn descriptor(&self) -> &PropertyDescriptor {
        &self.descriptor
    }

    /// Outgoing value, through the serialize hook when one is declared.
    pub(crate) fn read(&self, item: &T) -> Result<Value> {
        match &self.on_serialize {
            Some(hook) => hook(item),
            None => (self.get)(item),
        }
    }

    /// Store a hydrated value, through the hydrate hook when one is declared.
    pub(crate) fn write(&self, item: &mut T, value: Value) -> Result<()> {
        match &self.on_hydrate {
            Some(hook) => hook(item, value),
            None => (self.set)(item, value),
        }
    }
}

/// Partition and sort key of a secondary index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexKey {
    pub partition_key: String,
    pub sort_key: String,
}

impl IndexKey {
    pub fn new(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
        }
    }
}

type Projector<T> = Box<dyn Fn(&T) -> Option<IndexKey> + Send + Sync>;

/// A named secondary index derived from an item's data.
///
/// A projection returning `Some` adds `<name>Pk` and `<name>Sk` to the
/// serialized document.
pub struct IndexProjection<T> {
    name: &'static str,
    project: Projector<T>,
}

impl<T> IndexProjection<T> {
    pub fn new<F>(name: &'static str, project: F) -> Self
    where
        F: Fn(&T) -> Option<IndexKey> + Send + Sync + 'static,
    {
        Self {
            name,
            project: Box::new(project),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn partition_attribute(&self) -> String {
        format!("{}Pk", self.name)
    }

    pub fn sort_attribute(&self) -> String {
        format!("{}Sk", self.name)
    }

    pub(crate) fn project(&self, item: &T) -> Option<IndexKey> {
        (self.project)(item)
    }
}

/// Resolved metadata for one item type.
pub(crate) struct Mapping<T> {
    pub(crate) fields: Vec<Field<T>>,
    pub(crate) indexes: Vec<IndexProjection<T>>,
}

impl<T: Item> Mapping<T> {
    fn build() -> Result<Self> {
        let fields = T::fields()?;
        let indexes = T::indexes();

        let mut wire_names: HashSet<String> =
            [PK, SK, ITEM_TYPE].iter().map(|s| s.to_string()).collect();

        for index in &indexes {
            let prefix = index.name.get(..3).map(str::to_uppercase);
            if !matches!(prefix.as_deref(), Some("GSI") | Some("LSI")) {
                return Err(Error::Configuration(format!(
                    "index '{}' on {} must be named GSI* or LSI*",
                    index.name,
                    T::item_type()
                )));
            }
            for attr in [index.partition_attribute(), index.sort_attribute()] {
                if !wire_names.insert(attr.clone()) {
                    return Err(Error::Configuration(format!(
                        "attribute '{}' is mapped twice on {}",
                        attr,
                        T::item_type()
                    )));
                }
            }
        }

        for field in &fields {
            if !wire_names.insert(field.descriptor.name().to_string()) {
                return Err(Error::Configuration(format!(
                    "attribute '{}' is mapped twice on {}",
                    field.descriptor.name(),
                    T::item_type()
                )));
            }
        }

        Ok(Self { fields, indexes })
    }

    pub(crate) fn field(&self, ident: &str) -> Option<&Field<T>> {
        self.fields.iter().find(|f| f.ident == ident)
    }
}

type Registry = RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>;

static REGISTRY: Lazy<Registry> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Resolve the cached mapping for `T`, building it on first use.
///
/// The build runs without holding the registry lock, so `fields()` may itself
/// resolve other mappings. Concurrent first uses may each build; the first
/// insert wins and every caller gets that entry.
pub(crate) fn mapping<T: Item>() -> Result<Arc<Mapping<T>>> {
    let type_id = TypeId::of::<T>();

    if let Some(cached) = REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&type_id)
    {
        return downcast::<T>(cached.clone());
    }

    let built = Mapping::<T>::build()?;

    let mut inserted = false;
    let entry = REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(type_id)
        .or_insert_with(|| {
            inserted = true;
            Arc::new(built) as Arc<dyn Any + Send + Sync>
        })
        .clone();

    let mapping = downcast::<T>(entry)?;
    if inserted {
        tracing::debug!(
            item_type = T::item_type(),
            fields = mapping.fields.len(),
            indexes = mapping.indexes.len(),
            "registered item mapping"
        );
    }
    Ok(mapping)
}

fn downcast<T: Item>(entry: Arc<dyn Any + Send + Sync>) -> Result<Arc<Mapping<T>>> {
    entry.downcast::<Mapping<T>>().map_err(|_| {
        Error::Configuration(format!("registry entry for {} has the wrong type", T::item_type()))
    })
}

/// Object-safe view of an item, for heterogeneous bulk writes.
pub trait Persistable {
    fn table(&self) -> &'static str;

    fn primary_key(&self) -> Document;

    fn to_document(&self) -> Result<Document>;
}

impl<T: Item> Persistable for T {
    fn table(&self) -> &'static str {
        T::table_name()
    }

    fn primary_key(&self) -> Document {
        self.key()
    }

    fn to_document(&self) -> Result<Document> {
        ItemMapper::<T>::new()?.serialize(self)
    }
}
