//! Row store port
//!
//! The three persistence primitives the upsert layer is built from, plus
//! a row count for reporting. Rows are addressed by table and natural key.
//! Also the append-only archive raw provider responses are written to.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::domain::{Field, FieldValue, RawResponse, UpsertKey};

pub type RowId = i64;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// Unique constraint hit on insert
    #[error("Row already exists: {table}/{key}")]
    Conflict { table: String, key: String },

    #[error("Row not found: {table}/{key}")]
    NotFound { table: String, key: String },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// A stored row as read back from the store
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: RowId,
    pub key: UpsertKey,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Row {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn find_by_key(&self, table: &str, key: &UpsertKey) -> Result<Option<Row>, StoreError>;

    async fn insert(
        &self,
        table: &str,
        key: &UpsertKey,
        fields: &[Field],
    ) -> Result<RowId, StoreError>;

    /// Overwrite every given field of an existing row, keeping its id
    async fn update(&self, table: &str, key: &UpsertKey, fields: &[Field])
        -> Result<(), StoreError>;

    async fn count(&self, table: &str) -> Result<usize, StoreError>;
}

/// Append-only sink for provider responses as received
#[async_trait]
pub trait ResponseArchive: Send + Sync {
    async fn save(&self, response: RawResponse) -> Result<RowId, StoreError>;
}
