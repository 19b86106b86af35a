//! Raw response archive on top of a row store
//!
//! Every response becomes a new row in `raw_api_responses`; an existing
//! row is never overwritten.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{RawResponse, Record};
use crate::ports::{ResponseArchive, RowId, RowStore, StoreError};

pub struct StoreArchive {
    store: Arc<dyn RowStore>,
}

impl StoreArchive {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ResponseArchive for StoreArchive {
    async fn save(&self, response: RawResponse) -> Result<RowId, StoreError> {
        let invalid = |e: crate::domain::RecordError| StoreError::Backend(e.to_string());
        let key = response.upsert_key().map_err(invalid)?;
        let fields = response.fields().map_err(invalid)?;

        let id = self.store.insert(RawResponse::TABLE, &key, &fields).await?;
        tracing::debug!(
            "Archived {} {} response as row {}",
            response.source,
            response.endpoint,
            id
        );
        Ok(id)
    }
}
