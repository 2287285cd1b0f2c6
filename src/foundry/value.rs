//! Tagged Values
//!
//! [`DataValue`] is the currency of the runtime: property bag entries,
//! operation inputs and outputs, and snapshot payloads are all tagged values.
//! Serialized form is `{"type": "<tag>", "value": <payload>}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ForgeError, Result};

/// A dynamically typed value with an explicit type tag.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DataValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<DataValue>),
    Map(BTreeMap<String, DataValue>),
}

impl DataValue {
    /// Name of the type tag, as used in error messages and snapshots.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_list(&self) -> Option<&[DataValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// False when a float anywhere in the value is NaN or infinite. JSON has
    /// no encoding for those.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Float(f) => f.is_finite(),
            Self::List(items) => items.iter().all(DataValue::is_finite),
            Self::Map(entries) => entries.values().all(DataValue::is_finite),
            _ => true,
        }
    }

    /// Builds a list value from anything convertible.
    pub fn list<T: Into<DataValue>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<bool> for DataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for DataValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for DataValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<u32> for DataValue {
    fn from(v: u32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for DataValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for DataValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<DataValue>> From<Vec<T>> for DataValue {
    fn from(v: Vec<T>) -> Self {
        Self::list(v)
    }
}

impl From<BTreeMap<String, DataValue>> for DataValue {
    fn from(v: BTreeMap<String, DataValue>) -> Self {
        Self::Map(v)
    }
}

/// Typed extraction out of a [`DataValue`].
///
/// Extraction never coerces: an `Int` is not a `Float`, a `Text` holding
/// digits is not an `Int`.
pub trait FromDataValue: Sized {
    /// Tag expected by this type.
    const TYPE_NAME: &'static str;

    fn from_data_value(value: &DataValue) -> Option<Self>;

    /// Extracts or reports a [`ForgeError::TypeMismatch`] for `key`.
    fn extract(key: &str, value: &DataValue) -> Result<Self> {
        Self::from_data_value(value).ok_or_else(|| ForgeError::TypeMismatch {
            key: key.to_string(),
            expected: Self::TYPE_NAME,
            actual: value.type_name(),
        })
    }
}

impl FromDataValue for DataValue {
    const TYPE_NAME: &'static str = "any";

    fn from_data_value(value: &DataValue) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromDataValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_data_value(value: &DataValue) -> Option<Self> {
        match value {
            DataValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromDataValue for i64 {
    const TYPE_NAME: &'static str = "int";

    fn from_data_value(value: &DataValue) -> Option<Self> {
        match value {
            DataValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromDataValue for f64 {
    const TYPE_NAME: &'static str = "float";

    fn from_data_value(value: &DataValue) -> Option<Self> {
        match value {
            DataValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromDataValue for String {
    const TYPE_NAME: &'static str = "text";

    fn from_data_value(value: &DataValue) -> Option<Self> {
        match value {
            DataValue::Text(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromDataValue for Vec<DataValue> {
    const TYPE_NAME: &'static str = "list";

    fn from_data_value(value: &DataValue) -> Option<Self> {
        match value {
            DataValue::List(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromDataValue for BTreeMap<String, DataValue> {
    const TYPE_NAME: &'static str = "map";

    fn from_data_value(value: &DataValue) -> Option<Self> {
        match value {
            DataValue::Map(v) => Some(v.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(DataValue::Null.type_name(), "null");
        assert_eq!(DataValue::from(3).type_name(), "int");
        assert_eq!(DataValue::from("x").type_name(), "text");
        assert_eq!(DataValue::list(vec![1, 2]).type_name(), "list");
    }

    #[test]
    fn test_extract_does_not_coerce() {
        let value = DataValue::Int(7);
        assert_eq!(i64::extract("n", &value).unwrap(), 7);

        let err = f64::extract("n", &value).unwrap_err();
        match err {
            ForgeError::TypeMismatch { key, expected, actual } => {
                assert_eq!(key, "n");
                assert_eq!(expected, "float");
                assert_eq!(actual, "int");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(i64::extract("n", &DataValue::from("7")).is_err());
    }

    #[test]
    fn test_serialized_form_carries_type_tag() {
        let json = serde_json::to_value(DataValue::from("hello")).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["value"], "hello");

        let null = serde_json::to_value(DataValue::Null).unwrap();
        assert_eq!(null["type"], "null");
    }

    #[test]
    fn test_nested_values_deserialize() {
        let mut map = BTreeMap::new();
        map.insert("items".to_string(), DataValue::list(vec!["a", "b"]));
        map.insert("done".to_string(), DataValue::Bool(true));
        let original = DataValue::Map(map);

        let json = serde_json::to_string(&original).unwrap();
        let parsed: DataValue = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_as_list() {
        let value = DataValue::list(vec![1, 2, 3]);
        assert_eq!(value.as_list().map(|l| l.len()), Some(3));
        assert!(DataValue::Int(1).as_list().is_none());
    }

    #[test]
    fn test_is_finite_looks_inside_collections() {
        assert!(DataValue::Float(1.5).is_finite());
        assert!(!DataValue::Float(f64::NAN).is_finite());

        let nested = DataValue::Map(BTreeMap::from([(
            "scores".to_string(),
            DataValue::List(vec![DataValue::Float(0.5), DataValue::Float(f64::INFINITY)]),
        )]));
        assert!(!nested.is_finite());
        assert!(DataValue::list(vec![1, 2]).is_finite());
    }
}
