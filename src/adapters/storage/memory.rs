//! In-memory row store for tests and dry runs

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::{Field, UpsertKey};
use crate::ports::{Row, RowId, RowStore, StoreError};

#[derive(Debug, Default)]
struct Tables {
    next_id: RowId,
    rows: HashMap<String, BTreeMap<UpsertKey, Row>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows of a table ordered by key
    pub fn rows(&self, table: &str) -> Vec<Row> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables
            .rows
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }
}

fn to_map(fields: &[Field]) -> BTreeMap<String, crate::domain::FieldValue> {
    fields
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn find_by_key(&self, table: &str, key: &UpsertKey) -> Result<Option<Row>, StoreError> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.rows.get(table).and_then(|rows| rows.get(key)).cloned())
    }

    async fn insert(
        &self,
        table: &str,
        key: &UpsertKey,
        fields: &[Field],
    ) -> Result<RowId, StoreError> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let id = tables.next_id + 1;
        let rows = tables.rows.entry(table.to_string()).or_default();
        if rows.contains_key(key) {
            return Err(StoreError::Conflict {
                table: table.to_string(),
                key: key.to_string(),
            });
        }
        rows.insert(
            key.clone(),
            Row {
                id,
                key: key.clone(),
                fields: to_map(fields),
            },
        );
        tables.next_id = id;
        Ok(id)
    }

    async fn update(&self, table: &str, key: &UpsertKey, fields: &[Field]) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let row = tables
            .rows
            .get_mut(table)
            .and_then(|rows| rows.get_mut(key))
            .ok_or_else(|| StoreError::NotFound {
                table: table.to_string(),
                key: key.to_string(),
            })?;
        for (name, value) in fields {
            row.fields.insert(name.to_string(), value.clone());
        }
        Ok(())
    }

    async fn count(&self, table: &str) -> Result<usize, StoreError> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.rows.get(table).map_or(0, BTreeMap::len))
    }
}
