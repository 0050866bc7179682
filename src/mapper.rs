//! Hydration and serialization of items.

use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;

use crate::descriptor::PropertyDescriptor;
use crate::errors::Result;
use crate::item::{mapping, non_empty_sk, Item, Mapping, ITEM_TYPE, PK, SK};
use crate::serialization::{Document, DocumentSource};

/// Per-type engine converting between `T` and wire documents.
///
/// Cheap to create: the field table is resolved once per process and shared.
pub struct ItemMapper<T: Item> {
    mapping: Arc<Mapping<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Item> ItemMapper<T> {
    pub fn new() -> Result<Self> {
        Ok(Self {
            mapping: mapping::<T>()?,
            _marker: PhantomData,
        })
    }

    /// Descriptor of the struct field `ident`, if it is mapped.
    pub fn descriptor(&self, ident: &str) -> Option<&PropertyDescriptor> {
        self.mapping.field(ident).map(|f| f.descriptor())
    }

    /// Descriptors in declaration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.mapping.fields.iter().map(|f| f.descriptor())
    }

    /// Build a new `T` from a document, a JSON string or a JSON value.
    pub fn hydrate(&self, source: impl Into<DocumentSource>) -> Result<T> {
        let mut item = T::default();
        self.hydrate_into(&mut item, source)?;
        Ok(item)
    }

    /// Populate the mapped fields of an existing instance.
    ///
    /// Fields absent from the document are left untouched unless they are
    /// required, in which case hydration fails.
    pub fn hydrate_into(&self, item: &mut T, source: impl Into<DocumentSource>) -> Result<()> {
        let doc = source.into().into_document()?;

        for field in &self.mapping.fields {
            let desc = field.descriptor();
            let value = match doc.get(desc.name()) {
                Some(value) => value.clone(),
                None if !desc.is_required() => continue,
                None => Value::Null,
            };

            desc.check(&value)?;
            let value = desc.cast(value)?;
            field.write(item, value)?;
        }

        Ok(())
    }

    /// Render `item` as a wire document.
    ///
    /// Index attributes come first, then `ItemType`, `PK`, `SK` and the mapped
    /// fields in declaration order.
    pub fn serialize(&self, item: &T) -> Result<Document> {
        let mut doc = Document::new();

        for index in &self.mapping.indexes {
            if let Some(key) = index.project(item) {
                doc.insert(index.partition_attribute(), Value::String(key.partition_key));
                doc.insert(index.sort_attribute(), Value::String(key.sort_key));
            }
        }

        doc.insert(ITEM_TYPE.to_string(), Value::String(T::item_type().to_string()));
        doc.insert(PK.to_string(), Value::String(item.pk()));
        if let Some(sk) = non_empty_sk(item.sk()) {
            doc.insert(SK.to_string(), Value::String(sk));
        }

        for field in &self.mapping.fields {
            let desc = field.descriptor();
            let value = field.read(item)?;
            desc.check(&value)?;
            doc.insert(desc.name().to_string(), desc.cast(value)?);
        }

        Ok(doc)
    }
}

impl<T: Item> Clone for ItemMapper<T> {
    fn clone(&self) -> Self {
        Self {
            mapping: self.mapping.clone(),
            _marker: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ScalarType;
    use crate::errors::Error;
    use crate::item::{Field, IndexKey, IndexProjection};
    use serde_json::json;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Account {
        id: String,
        owner: String,
        balance: i64,
        tags: Vec<String>,
        nickname: Option<String>,
        email: String,
    }

    impl Item for Account {
        fn table_name() -> &'static str {
            "accounts"
        }

        fn pk(&self) -> String {
            format!("ACCOUNT#{}", self.id)
        }

        fn sk(&self) -> Option<String> {
            Some("PROFILE".into())
        }

        fn fields() -> Result<Vec<Field<Self>>> {
            Ok(vec![
                Field::new(
                    "id",
                    PropertyDescriptor::new("Id")?.required(),
                    |a: &Account| &a.id,
                    |a: &mut Account| &mut a.id,
                ),
                Field::new(
                    "owner",
                    PropertyDescriptor::new("Owner")?.required(),
                    |a: &Account| &a.owner,
                    |a: &mut Account| &mut a.owner,
                ),
                Field::new(
                    "balance",
                    PropertyDescriptor::new("Balance")?.typed(ScalarType::Integer),
                    |a: &Account| &a.balance,
                    |a: &mut Account| &mut a.balance,
                ),
                Field::new(
                    "tags",
                    PropertyDescriptor::new("Tags")?,
                    |a: &Account| &a.tags,
                    |a: &mut Account| &mut a.tags,
                ),
                Field::new(
                    "nickname",
                    PropertyDescriptor::new("Nickname")?,
                    |a: &Account| &a.nickname,
                    |a: &mut Account| &mut a.nickname,
                ),
                Field::new(
                    "email",
                    PropertyDescriptor::new("Email")?,
                    |a: &Account| &a.email,
                    |a: &mut Account| &mut a.email,
                )
                .on_hydrate(|a, value| {
                    a.email = value.as_str().unwrap_or_default().to_lowercase();
                    Ok(())
                })
                .on_serialize(|a| Ok(json!(a.email.to_uppercase()))),
            ])
        }

        fn indexes() -> Vec<IndexProjection<Self>> {
            vec![IndexProjection::new("GSI1", |a: &Account| {
                if a.owner.is_empty() {
                    None
                } else {
                    Some(IndexKey::new(format!("OWNER#{}", a.owner), a.pk()))
                }
            })]
        }
    }

    fn account() -> Account {
        Account {
            id: "1".into(),
            owner: "alice".into(),
            balance: 100,
            tags: vec!["vip".into()],
            nickname: None,
            email: "Alice@Example.com".into(),
        }
    }

    #[test]
    fn test_serialize_writes_keys_type_and_index() {
        let mapper = ItemMapper::<Account>::new().unwrap();
        let doc = mapper.serialize(&account()).unwrap();

        assert_eq!(doc["PK"], "ACCOUNT#1");
        assert_eq!(doc["SK"], "PROFILE");
        assert_eq!(doc["ItemType"], "Account");
        assert_eq!(doc["GSI1Pk"], "OWNER#alice");
        assert_eq!(doc["GSI1Sk"], "ACCOUNT#1");
        assert_eq!(doc["Balance"], 100);
        assert_eq!(doc["Tags"], json!(["vip"]));
        assert_eq!(doc["Nickname"], json!(null));
        assert_eq!(doc["Email"], "ALICE@EXAMPLE.COM");
    }

    #[test]
    fn test_hydrate_roundtrip_through_hooks() {
        let mapper = ItemMapper::<Account>::new().unwrap();
        let doc = mapper.serialize(&account()).unwrap();
        let back = mapper.hydrate(doc).unwrap();

        let mut expected = account();
        expected.email = "alice@example.com".into();
        assert_eq!(back, expected);
    }

    #[test]
    fn test_hydrate_coerces_declared_types() {
        let mapper = ItemMapper::<Account>::new().unwrap();
        let account = mapper
            .hydrate(json!({"Id": "7", "Owner": "bob", "Balance": "250"}))
            .unwrap();
        assert_eq!(account.balance, 250);
        assert!(account.tags.is_empty());
    }

    #[test]
    fn test_hydrate_missing_required_names_field() {
        let mapper = ItemMapper::<Account>::new().unwrap();
        match mapper.hydrate(json!({"Id": "7"})) {
            Err(Error::Validation { field, .. }) => assert_eq!(field, "Owner"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_hydrate_blank_required_names_field() {
        let mapper = ItemMapper::<Account>::new().unwrap();
        match mapper.hydrate(json!({"Id": "", "Owner": "bob"})) {
            Err(Error::Validation { field, .. }) => assert_eq!(field, "Id"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_hydrate_bad_coercion_is_type_error() {
        let mapper = ItemMapper::<Account>::new().unwrap();
        match mapper.hydrate(json!({"Id": "7", "Owner": "bob", "Balance": "lots"})) {
            Err(Error::Type { field, expected }) => {
                assert_eq!(field, "Balance");
                assert_eq!(expected, "integer");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_hydrate_untyped_mismatch_is_type_error() {
        let mapper = ItemMapper::<Account>::new().unwrap();
        match mapper.hydrate(json!({"Id": "7", "Owner": "bob", "Tags": "vip"})) {
            Err(Error::Type { field, .. }) => assert_eq!(field, "Tags"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_serialize_blank_required_fails() {
        let mapper = ItemMapper::<Account>::new().unwrap();
        let mut blank = account();
        blank.owner.clear();
        match mapper.serialize(&blank) {
            Err(Error::Validation { field, .. }) => assert_eq!(field, "Owner"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_hydrate_from_json_text() {
        let mapper = ItemMapper::<Account>::new().unwrap();
        let account = mapper
            .hydrate(r#"{"Id": "9", "Owner": "carol", "Nickname": "cc"}"#)
            .unwrap();
        assert_eq!(account.nickname.as_deref(), Some("cc"));
    }

    #[test]
    fn test_hydrate_into_keeps_unmapped_values() {
        let mapper = ItemMapper::<Account>::new().unwrap();
        let mut existing = account();
        mapper
            .hydrate_into(&mut existing, json!({"Id": "1", "Owner": "dave"}))
            .unwrap();
        assert_eq!(existing.owner, "dave");
        assert_eq!(existing.balance, 100);
    }

    #[test]
    fn test_descriptor_lookup() {
        let mapper = ItemMapper::<Account>::new().unwrap();
        let desc = mapper.descriptor("balance").unwrap();
        assert_eq!(desc.name(), "Balance");
        assert_eq!(desc.scalar_type(), Some(ScalarType::Integer));
        assert!(mapper.descriptor("unmapped").is_none());

        let names: Vec<_> = mapper.descriptors().map(|d| d.name()).collect();
        assert_eq!(names, ["Id", "Owner", "Balance", "Tags", "Nickname", "Email"]);
    }
}
