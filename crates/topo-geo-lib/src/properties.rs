//! Open property bag carried by every geometry and passed through to its feature

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// String-keyed property bag. Sorted by key so serialized output is reproducible.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A single property value
///
/// Numbers keep their exact JSON representation so integers stay integers when the
/// collection is serialized again. Composite values are not expected in the source
/// data but are passed through untouched in [`PropertyValue::Other`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Other(serde_json::Value),
}

impl PropertyValue {
    /// The string payload, if this value is a string
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

/// Deserialize a field that may be absent or `null` into its default value
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_variants() {
        let props: Properties = serde_json::from_str(
            r#"{"D": "San Salvador", "code": 6, "area": 12.5, "capital": true, "note": null}"#,
        )
        .unwrap();

        assert_eq!(props["D"], PropertyValue::from("San Salvador"));
        assert_eq!(props["code"], PropertyValue::from(6_i64));
        assert!(matches!(props["area"], PropertyValue::Number(_)));
        assert_eq!(props["capital"], PropertyValue::Bool(true));
        assert!(props["note"].is_null());
    }

    #[test]
    fn test_numbers_keep_integer_representation() {
        let props: Properties = serde_json::from_str(r#"{"code": 6, "area": 12.5}"#).unwrap();
        let out = serde_json::to_string(&props).unwrap();
        assert_eq!(out, r#"{"area":12.5,"code":6}"#);
    }

    #[test]
    fn test_numeric_string_is_not_number() {
        let props: Properties = serde_json::from_str(r#"{"a": "6", "b": 6}"#).unwrap();
        assert_eq!(props["a"].as_str(), Some("6"));
        assert_eq!(props["b"].as_str(), None);
    }

    #[test]
    fn test_composite_values_pass_through() {
        let props: Properties = serde_json::from_str(r#"{"tags": ["a", "b"]}"#).unwrap();
        assert!(matches!(props["tags"], PropertyValue::Other(_)));
        assert_eq!(serde_json::to_string(&props).unwrap(), r#"{"tags":["a","b"]}"#);
    }
}
