//! Document boundary types and DynamoDB marshalling.
//!
//! A [`Document`] is the generic wire representation of an item: an ordered
//! map of attribute names to JSON-like [`Value`]s. The mapper works on
//! documents only; conversion to and from `AttributeValue` happens at the
//! client edge.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{Map, Number, Value};

use crate::errors::{Error, Result};

/// A wire document: attribute name to value.
pub type Document = Map<String, Value>;

/// Any input the mapper accepts for hydration.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    Document(Document),
    Json(String),
    Value(Value),
}

impl DocumentSource {
    /// Normalize the source into a canonical document.
    ///
    /// JSON text is parsed first. Anything that is not an object after
    /// parsing is rejected.
    pub fn into_document(self) -> Result<Document> {
        let value = match self {
            DocumentSource::Document(doc) => return Ok(doc),
            DocumentSource::Json(text) => serde_json::from_str::<Value>(&text)?,
            DocumentSource::Value(value) => value,
        };

        match value {
            Value::Object(doc) => Ok(doc),
            other => Err(Error::Serialization(format!(
                "expected an object document, got {}",
                value_kind(&other)
            ))),
        }
    }
}

impl From<Document> for DocumentSource {
    fn from(doc: Document) -> Self {
        DocumentSource::Document(doc)
    }
}

impl From<Value> for DocumentSource {
    fn from(value: Value) -> Self {
        DocumentSource::Value(value)
    }
}

impl From<&str> for DocumentSource {
    fn from(text: &str) -> Self {
        DocumentSource::Json(text.to_string())
    }
}

impl From<String> for DocumentSource {
    fn from(text: String) -> Self {
        DocumentSource::Json(text)
    }
}

/// Short name of a value's JSON kind, for error messages.
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Convert a document to a map of DynamoDB AttributeValues.
pub fn document_to_item(doc: &Document) -> HashMap<String, AttributeValue> {
    doc.iter()
        .map(|(k, v)| (k.clone(), value_to_attribute(v)))
        .collect()
}

/// Convert a single value to its DynamoDB AttributeValue.
pub fn value_to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(list) => AttributeValue::L(list.iter().map(value_to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(document_to_item(map)),
    }
}

/// Convert a map of DynamoDB AttributeValues to a document.
pub fn item_to_document(item: HashMap<String, AttributeValue>) -> Result<Document> {
    let mut doc = Document::new();
    for (key, value) in item {
        doc.insert(key, attribute_to_value(value)?);
    }
    Ok(doc)
}

/// Convert a single DynamoDB AttributeValue to a value.
///
/// Sets become arrays and binary values become base64 strings.
pub fn attribute_to_value(value: AttributeValue) -> Result<Value> {
    let converted = match value {
        AttributeValue::S(s) => Value::String(s),
        AttributeValue::N(n) => Value::Number(parse_number(&n)?),
        AttributeValue::Bool(b) => Value::Bool(b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::B(b) => Value::String(BASE64.encode(b.as_ref())),
        AttributeValue::L(list) => Value::Array(
            list.into_iter()
                .map(attribute_to_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        AttributeValue::M(map) => Value::Object(item_to_document(map)?),
        AttributeValue::Ss(ss) => Value::Array(ss.into_iter().map(Value::String).collect()),
        AttributeValue::Ns(ns) => Value::Array(
            ns.iter()
                .map(|n| parse_number(n).map(Value::Number))
                .collect::<Result<Vec<_>>>()?,
        ),
        AttributeValue::Bs(bs) => Value::Array(
            bs.into_iter()
                .map(|b| Value::String(BASE64.encode(b.as_ref())))
                .collect(),
        ),
        _ => {
            return Err(Error::Serialization(
                "Unknown DynamoDB AttributeValue type".to_string(),
            ))
        }
    };
    Ok(converted)
}

/// Parse a DynamoDB number string into a JSON number.
fn parse_number(n: &str) -> Result<Number> {
    let invalid = || Error::Serialization(format!("Invalid number: {}", n));

    if n.contains('.') || n.contains('e') || n.contains('E') {
        let f: f64 = n.parse().map_err(|_| invalid())?;
        return Number::from_f64(f).ok_or_else(invalid);
    }
    if let Ok(i) = n.parse::<i64>() {
        return Ok(Number::from(i));
    }
    if let Ok(u) = n.parse::<u64>() {
        return Ok(Number::from(u));
    }
    let f: f64 = n.parse().map_err(|_| invalid())?;
    Number::from_f64(f).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::primitives::Blob;
    use serde_json::json;

    #[test]
    fn test_source_from_json_text() {
        let doc = DocumentSource::from(r#"{"PK": "USER#1", "age": 30}"#)
            .into_document()
            .unwrap();
        assert_eq!(doc["PK"], "USER#1");
        assert_eq!(doc["age"], 30);
    }

    #[test]
    fn test_source_rejects_non_object() {
        let err = DocumentSource::from(json!([1, 2])).into_document().unwrap_err();
        assert!(matches!(err, Error::Serialization(ref m) if m.contains("array")));

        let err = DocumentSource::from("not json").into_document().unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_value_to_attribute_shapes() {
        assert_eq!(value_to_attribute(&json!(null)), AttributeValue::Null(true));
        assert_eq!(value_to_attribute(&json!(true)), AttributeValue::Bool(true));
        assert_eq!(value_to_attribute(&json!(1.5)), AttributeValue::N("1.5".into()));
        assert_eq!(
            value_to_attribute(&json!(["a", 2])),
            AttributeValue::L(vec![AttributeValue::S("a".into()), AttributeValue::N("2".into())])
        );
    }

    #[test]
    fn test_sets_and_binary_become_arrays_and_base64() {
        let value = attribute_to_value(AttributeValue::Ns(vec!["1".into(), "2.5".into()])).unwrap();
        assert_eq!(value, json!([1, 2.5]));

        let value = attribute_to_value(AttributeValue::B(Blob::new(b"hi".to_vec()))).unwrap();
        assert_eq!(value, json!("aGk="));
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = attribute_to_value(AttributeValue::N("abc".into())).unwrap_err();
        assert!(matches!(err, Error::Serialization(ref m) if m.contains("abc")));
    }

    #[test]
    fn test_nested_map_roundtrip() {
        let doc = json!({"PK": "A", "meta": {"tags": ["x"], "n": 3}});
        let doc = doc.as_object().unwrap().clone();
        let back = item_to_document(document_to_item(&doc)).unwrap();
        assert_eq!(back, doc);
    }
}
