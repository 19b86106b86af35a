//! Record abstraction
//!
//! A record is one provider-returned item. It knows the table it belongs
//! to, how to derive its natural key, which mutable attributes it carries
//! and which entities it reveals to the discovery pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::entity::EntityRef;

/// Separator used to join composite key components
pub const KEY_SEPARATOR: char = ':';

/// Errors raised by a single record during key derivation or validation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    #[error("Missing key component '{0}'")]
    MissingKey(&'static str),
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("Failed to store record {key}: {reason}")]
    Storage { key: String, reason: String },
}

/// Natural key of a record, unique within its table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpsertKey(String);

impl UpsertKey {
    /// Single-component key
    pub fn single(name: &'static str, value: &str) -> Result<Self, RecordError> {
        Self::composite(&[(name, value)])
    }

    /// Composite key; every component must be non-empty
    pub fn composite(parts: &[(&'static str, &str)]) -> Result<Self, RecordError> {
        let mut key = String::new();
        for (i, (name, value)) in parts.iter().enumerate() {
            let value = value.trim();
            if value.is_empty() {
                return Err(RecordError::MissingKey(name));
            }
            if i > 0 {
                key.push(KEY_SEPARATOR);
            }
            key.push_str(value);
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UpsertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Null, Into::into)
    }
}

/// Named column value
pub type Field = (&'static str, FieldValue);

/// A provider record with an extractable natural key
pub trait Record: fmt::Debug + Clone + Send + Sync + 'static {
    /// Destination table
    const TABLE: &'static str;

    /// Natural key, deterministic for a given record
    fn upsert_key(&self) -> Result<UpsertKey, RecordError>;

    /// Mutable attributes, validated; overwritten wholesale on update
    fn fields(&self) -> Result<Vec<Field>, RecordError>;

    /// Entities revealed by this record
    fn discovered(&self) -> Vec<EntityRef> {
        Vec::new()
    }
}

/// Reject NaN and infinities
pub fn finite(field: &'static str, value: f64) -> Result<f64, RecordError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(RecordError::InvalidField {
            field,
            reason: format!("{} is not finite", value),
        })
    }
}

/// Reject NaN, infinities and negatives
pub fn non_negative(field: &'static str, value: f64) -> Result<f64, RecordError> {
    let value = finite(field, value)?;
    if value < 0.0 {
        return Err(RecordError::InvalidField {
            field,
            reason: format!("{} is negative", value),
        });
    }
    Ok(value)
}

/// Optional variant of [`finite`]
pub fn finite_opt(field: &'static str, value: Option<f64>) -> Result<Option<f64>, RecordError> {
    value.map(|v| finite(field, v)).transpose()
}

/// Optional variant of [`non_negative`]
pub fn non_negative_opt(
    field: &'static str,
    value: Option<f64>,
) -> Result<Option<f64>, RecordError> {
    value.map(|v| non_negative(field, v)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_key() {
        let key = UpsertKey::single("txHash", "abc123").unwrap();
        assert_eq!(key.as_str(), "abc123");
    }

    #[test]
    fn test_composite_key_joins_components() {
        let key = UpsertKey::composite(&[("tokenAddress", "tok"), ("owner", "own")]).unwrap();
        assert_eq!(key.as_str(), "tok:own");
    }

    #[test]
    fn test_composite_key_rejects_blank_component() {
        let err = UpsertKey::composite(&[("tokenAddress", "tok"), ("owner", "  ")]).unwrap_err();
        assert_eq!(err, RecordError::MissingKey("owner"));
    }

    #[test]
    fn test_field_value_conversions() {
        assert_eq!(FieldValue::from(Some(1.5)), FieldValue::Float(1.5));
        assert_eq!(FieldValue::from(None::<i64>), FieldValue::Null);
        assert_eq!(FieldValue::from("x"), FieldValue::Text("x".into()));
    }

    #[test]
    fn test_validators() {
        assert!(finite("price", 1.0).is_ok());
        assert!(finite("price", f64::NAN).is_err());
        assert!(non_negative("liquidity", -0.5).is_err());
        assert_eq!(non_negative_opt("liquidity", None), Ok(None));
        assert!(finite_opt("change", Some(f64::INFINITY)).is_err());
    }
}
