//! Attribute Value Objects
//!
//! Ordered key/value labels attached to observations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Value of a single attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(v) => write!(f, "{}", v),
            AttributeValue::I64(v) => write!(f, "{}", v),
            AttributeValue::F64(v) => write!(f, "{}", v),
            AttributeValue::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::I64(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        AttributeValue::I64(v.into())
    }
}

impl From<u32> for AttributeValue {
    fn from(v: u32) -> Self {
        AttributeValue::I64(v.into())
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::F64(v)
    }
}

/// A single key/value label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Ordered sequence of attributes.
///
/// Insertion order is preserved and duplicates are kept; consumers that
/// need one value per key should use [`Attributes::get`], which returns the
/// last occurrence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(Vec<Attribute>);

impl Attributes {
    /// Create an empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.push(Attribute::new(key, value));
        self
    }

    pub fn push(&mut self, attribute: Attribute) {
        self.0.push(attribute);
    }

    pub fn extend_from(&mut self, other: &Attributes) {
        self.0.extend(other.0.iter().cloned());
    }

    /// Concatenate `self` followed by `other` into a new set.
    pub fn concat(&self, other: &Attributes) -> Attributes {
        let mut merged = Vec::with_capacity(self.0.len() + other.0.len());
        merged.extend(self.0.iter().cloned());
        merged.extend(other.0.iter().cloned());
        Attributes(merged)
    }

    /// Value of the last attribute with this key.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.iter().rev().find(|a| a.key == key).map(|a| &a.value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Attribute] {
        &self.0
    }
}

impl From<Vec<Attribute>> for Attributes {
    fn from(v: Vec<Attribute>) -> Self {
        Self(v)
    }
}

impl FromIterator<Attribute> for Attributes {
    fn from_iter<I: IntoIterator<Item = Attribute>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Attributes {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for Attributes {
    type Item = Attribute;
    type IntoIter = std::vec::IntoIter<Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, attribute) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", attribute)?;
        }
        write!(f, "}}")
    }
}

/// Per-call option carrying dynamic attributes for one mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObserveOption {
    pub attributes: Attributes,
}

impl ObserveOption {
    pub fn new(attributes: Attributes) -> Self {
        Self { attributes }
    }
}

impl From<Attributes> for ObserveOption {
    fn from(attributes: Attributes) -> Self {
        Self { attributes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_preserves_order() {
        let left = Attributes::new().with("service", "api").with("zone", "a");
        let right = Attributes::new().with("route", "/users");

        let merged = left.concat(&right);
        let keys: Vec<&str> = merged.iter().map(|a| a.key.as_str()).collect();
        assert_eq!(keys, vec!["service", "zone", "route"]);

        // inputs untouched
        assert_eq!(left.len(), 2);
        assert_eq!(right.len(), 1);
    }

    #[test]
    fn test_get_returns_last_occurrence() {
        let attrs = Attributes::new().with("region", "eu").with("region", "us");
        assert_eq!(attrs.get("region"), Some(&AttributeValue::from("us")));
        assert_eq!(attrs.get("missing"), None);
    }

    #[test]
    fn test_display() {
        let attrs = Attributes::new().with("ok", true).with("code", 200).with("ratio", 0.5);
        assert_eq!(attrs.to_string(), "{ok=true,code=200,ratio=0.5}");
        assert_eq!(Attributes::new().to_string(), "{}");
    }

    #[test]
    fn test_untagged_deserialization() {
        let attrs: Attributes = serde_json::from_str(
            r#"[{"key":"a","value":1},{"key":"b","value":"x"},{"key":"c","value":false},{"key":"d","value":1.5}]"#,
        )
        .unwrap();
        assert_eq!(attrs.get("a"), Some(&AttributeValue::I64(1)));
        assert_eq!(attrs.get("b"), Some(&AttributeValue::String("x".into())));
        assert_eq!(attrs.get("c"), Some(&AttributeValue::Bool(false)));
        assert_eq!(attrs.get("d"), Some(&AttributeValue::F64(1.5)));
    }
}
