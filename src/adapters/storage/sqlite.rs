//! SQLite row store
//!
//! One connection behind `Arc<Mutex<_>>`; every call runs on the blocking
//! pool. The schema in `migrations/` is applied on open and is idempotent.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{ffi, params_from_iter, Connection, OptionalExtension, ToSql};

use crate::domain::{Field, FieldValue, UpsertKey};
use crate::ports::{Row, RowId, RowStore, StoreError};

const SCHEMA: &str = include_str!("../../../migrations/0001_init.sql");

/// Columns every table has that are not record fields
const BOOKKEEPING_COLUMNS: [&str; 3] = ["id", "natural_key", "created_at"];

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Null => ToSqlOutput::Owned(Value::Null),
            FieldValue::Bool(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
            FieldValue::Int(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            FieldValue::Float(f) => ToSqlOutput::Owned(Value::Real(*f)),
            FieldValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

fn field_value(value: ValueRef<'_>) -> FieldValue {
    match value {
        ValueRef::Null => FieldValue::Null,
        ValueRef::Integer(i) => FieldValue::Int(i),
        ValueRef::Real(f) => FieldValue::Float(f),
        ValueRef::Text(t) => FieldValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => FieldValue::Text(String::from_utf8_lossy(b).into_owned()),
    }
}

fn backend(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Table and column names are interpolated into SQL, so only plain
/// identifiers are accepted
fn identifier(name: &str) -> Result<&str, StoreError> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(name)
    } else {
        Err(StoreError::Backend(format!("Invalid SQL identifier '{}'", name)))
    }
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and apply the schema
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Backend(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(path).map_err(backend)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(backend)?;
        conn.pragma_update(None, "synchronous", "NORMAL").map_err(backend)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory().map_err(backend)?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(backend)?;
        tracing::info!("SQLite schema ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("Blocking task failed: {}", e)))?
    }
}

fn owned_fields(fields: &[Field]) -> Vec<(String, FieldValue)> {
    fields
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

#[async_trait]
impl RowStore for SqliteStore {
    async fn find_by_key(&self, table: &str, key: &UpsertKey) -> Result<Option<Row>, StoreError> {
        let sql = format!("SELECT * FROM {} WHERE natural_key = ?1", identifier(table)?);
        let key = key.clone();

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(&sql).map_err(backend)?;
            let names: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

            stmt.query_row([key.as_str()], |row| {
                let mut id = 0;
                let mut fields = BTreeMap::new();
                for (i, name) in names.iter().enumerate() {
                    match name.as_str() {
                        "id" => id = row.get(i)?,
                        n if BOOKKEEPING_COLUMNS.contains(&n) => {}
                        _ => {
                            fields.insert(name.clone(), field_value(row.get_ref(i)?));
                        }
                    }
                }
                Ok(Row {
                    id,
                    key: key.clone(),
                    fields,
                })
            })
            .optional()
            .map_err(backend)
        })
        .await
    }

    async fn insert(
        &self,
        table: &str,
        key: &UpsertKey,
        fields: &[Field],
    ) -> Result<RowId, StoreError> {
        let mut columns = vec!["natural_key"];
        for (name, _) in fields {
            columns.push(identifier(name)?);
        }
        columns.push("created_at");
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            identifier(table)?,
            columns.join(", "),
            placeholders.join(", ")
        );

        let table = table.to_string();
        let key = key.clone();
        let values = owned_fields(fields);

        self.with_conn(move |conn| {
            let mut params: Vec<FieldValue> = Vec::with_capacity(values.len() + 2);
            params.push(FieldValue::Text(key.as_str().to_string()));
            params.extend(values.into_iter().map(|(_, v)| v));
            params.push(FieldValue::Text(Utc::now().to_rfc3339()));

            match conn.execute(&sql, params_from_iter(params.iter())) {
                Ok(_) => Ok(conn.last_insert_rowid()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    Err(StoreError::Conflict {
                        table,
                        key: key.to_string(),
                    })
                }
                Err(e) => Err(backend(e)),
            }
        })
        .await
    }

    async fn update(&self, table: &str, key: &UpsertKey, fields: &[Field]) -> Result<(), StoreError> {
        let mut assignments = Vec::with_capacity(fields.len());
        for (i, (name, _)) in fields.iter().enumerate() {
            assignments.push(format!("{} = ?{}", identifier(name)?, i + 1));
        }
        if assignments.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "UPDATE {} SET {} WHERE natural_key = ?{}",
            identifier(table)?,
            assignments.join(", "),
            fields.len() + 1
        );

        let table = table.to_string();
        let key = key.clone();
        let values = owned_fields(fields);

        self.with_conn(move |conn| {
            let mut params: Vec<FieldValue> = values.into_iter().map(|(_, v)| v).collect();
            params.push(FieldValue::Text(key.as_str().to_string()));

            let changed = conn
                .execute(&sql, params_from_iter(params.iter()))
                .map_err(backend)?;
            if changed == 0 {
                return Err(StoreError::NotFound {
                    table,
                    key: key.to_string(),
                });
            }
            Ok(())
        })
        .await
    }

    async fn count(&self, table: &str) -> Result<usize, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", identifier(table)?);
        self.with_conn(move |conn| {
            let n: i64 = conn.query_row(&sql, [], |row| row.get(0)).map_err(backend)?;
            Ok(n as usize)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TABLE: &str = "birdeye_token_security";

    fn key(k: &str) -> UpsertKey {
        UpsertKey::single("tokenAddress", k).unwrap()
    }

    fn fields(creator: &str, token_2022: bool) -> Vec<Field> {
        vec![
            ("creator_address", creator.into()),
            ("top10_holder_percent", Some(12.5).into()),
            ("is_token_2022", token_2022.into()),
        ]
    }

    #[tokio::test]
    async fn test_insert_find_update() {
        let store = SqliteStore::open_in_memory().unwrap();

        let id = store.insert(TABLE, &key("tok"), &fields("alice", false)).await.unwrap();
        let row = store.find_by_key(TABLE, &key("tok")).await.unwrap().unwrap();
        assert_eq!(row.id, id);
        assert_eq!(row.field("creator_address"), Some(&FieldValue::Text("alice".into())));
        assert_eq!(row.field("is_token_2022"), Some(&FieldValue::Int(0)));
        assert_eq!(row.field("owner_address"), Some(&FieldValue::Null));
        assert!(row.field("created_at").is_none());

        store.update(TABLE, &key("tok"), &fields("bob", true)).await.unwrap();
        let row = store.find_by_key(TABLE, &key("tok")).await.unwrap().unwrap();
        assert_eq!(row.id, id);
        assert_eq!(row.field("creator_address"), Some(&FieldValue::Text("bob".into())));
        assert_eq!(row.field("is_token_2022"), Some(&FieldValue::Int(1)));
        assert_eq!(store.count(TABLE).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_conflict() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(TABLE, &key("tok"), &fields("a", false)).await.unwrap();
        let err = store.insert(TABLE, &key("tok"), &fields("b", false)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_update_missing_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.update(TABLE, &key("ghost"), &fields("a", false)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_rejects_bad_identifiers() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.count("x; DROP TABLE y").await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("harvest.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert(TABLE, &key("tok"), &fields("a", false)).await.unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.count(TABLE).await.unwrap(), 1);
    }
}
