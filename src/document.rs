//! Structured document model shared by the analyzers, the merge engine and the
//! stores.
//!
//! A [`Document`] is a key-ordered map of field name to [`Value`]. Values are a
//! closed set of variants so every consumer (merge, reconcile, rendering) can
//! match exhaustively instead of probing types at runtime.
//!
//! Floats are kept finite: [`Value::float`] and [`Value::rounded`] turn NaN and
//! infinities into [`Value::Null`], and every JSON conversion goes through the
//! same path.

use std::{collections::BTreeMap, fmt};

use rust_decimal::{
    Decimal, RoundingStrategy,
    prelude::{FromPrimitive, ToPrimitive},
};
use serde::{Deserialize, Deserializer, Serialize, Serializer, ser::SerializeMap};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Document(Document),
}

/// Rounds to two decimal places, midpoint away from zero.
///
/// Returns `None` for NaN and infinite inputs. Magnitudes beyond the range of
/// [`Decimal`] are returned unchanged since they carry no fractional digits.
pub fn round2(value: f64) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    match Decimal::from_f64(value) {
        Some(decimal) => decimal
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            .to_f64(),
        None => Some(value),
    }
}

impl Value {
    pub fn float(value: f64) -> Self {
        if value.is_finite() {
            Value::Float(value)
        } else {
            Value::Null
        }
    }

    pub fn rounded(value: f64) -> Self {
        round2(value).map(Value::Float).unwrap_or(Value::Null)
    }

    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Null or an empty list: a slot that later data is allowed to fill.
    pub fn is_vacant(&self) -> bool {
        match self {
            Value::Null => true,
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Short variant label used in conflict reports and log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) | Value::Float(_) => "number",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Document(_) => "document",
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 {
                    format!("{f:.1}")
                } else {
                    f.to_string()
                }
            }
            Value::Text(s) => s.clone(),
            Value::List(items) => items
                .iter()
                .map(Value::as_display)
                .collect::<Vec<_>>()
                .join(", "),
            Value::Document(doc) => serde_json::Value::from(doc.clone()).to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::float(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self {
        Value::Document(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::List(value.into_iter().map(Value::Text).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields.get_mut(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    /// Follows a chain of nested documents.
    pub fn at(&self, path: &[&str]) -> Option<&Value> {
        let (last, parents) = path.split_last()?;
        let mut current = self;
        for key in parents {
            current = current.get(key)?.as_document()?;
        }
        current.get(last)
    }

    pub fn number_at(&self, path: &[&str]) -> Option<f64> {
        self.at(path).and_then(Value::as_f64)
    }

    /// Sets a nested value, creating intermediate documents. A non-document
    /// value in the way is replaced.
    pub fn set_at(&mut self, path: &[&str], value: impl Into<Value>) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        let mut current = self;
        for key in parents {
            let slot = current
                .fields
                .entry((*key).to_string())
                .or_insert_with(|| Value::Document(Document::new()));
            if !matches!(slot, Value::Document(_)) {
                *slot = Value::Document(Document::new());
            }
            let Value::Document(doc) = slot else {
                return;
            };
            current = doc;
        }
        current.insert(*last, value);
    }

    /// Dotted paths for every leaf (anything that is not a non-empty
    /// document), in key order.
    pub fn flatten(&self) -> Vec<(String, &Value)> {
        let mut out = Vec::new();
        flatten_into(self, "", &mut out);
        out
    }

    /// True when no leaf anywhere in the tree carries data.
    pub fn is_blank(&self) -> bool {
        self.fields.values().all(|value| match value {
            Value::Document(doc) => doc.is_blank(),
            other => other.is_vacant(),
        })
    }

    pub fn from_serialize<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        let json = serde_json::to_value(value)?;
        match Value::from(json) {
            Value::Document(doc) => Ok(doc),
            other => Err(serde::ser::Error::custom(format!(
                "expected an object, found {}",
                other.kind()
            ))),
        }
    }
}

fn flatten_into<'a>(doc: &'a Document, prefix: &str, out: &mut Vec<(String, &'a Value)>) {
    for (key, value) in doc.iter() {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Document(nested) if !nested.is_empty() => flatten_into(nested, &path, out),
            other => out.push((path, other)),
        }
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map(Value::float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Document(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(b),
            Value::Integer(i) => serde_json::Value::from(i),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Document(doc) => doc.into(),
        }
    }
}

impl From<Document> for serde_json::Value {
    fn from(doc: Document) -> Self {
        serde_json::Value::Object(
            doc.fields
                .into_iter()
                .map(|(key, value)| (key, value.into()))
                .collect(),
        )
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Value::Float(_) => serializer.serialize_none(),
            Value::Text(s) => serializer.serialize_str(s),
            Value::List(items) => items.serialize(serializer),
            Value::Document(doc) => doc.serialize(serializer),
        }
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Document(doc) => Ok(doc),
            other => Err(serde::de::Error::custom(format!(
                "expected an object, found {}",
                other.kind()
            ))),
        }
    }
}

/// Builds a [`Document`] from `key => value` pairs.
#[macro_export]
macro_rules! doc {
    () => { $crate::document::Document::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut document = $crate::document::Document::new();
        $( document.insert($key, $crate::document::Value::from($value)); )+
        document
    }};
}
