//! Page source port
//!
//! A page source turns one page request into one provider call and hands
//! back typed records. Pagination, storage and discovery live above it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{EntityId, Record};

/// Provider call failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    /// Rejected by the provider or by local parameter checks; never retried
    #[error("Invalid request ({status}): {message}")]
    InvalidRequest { status: u16, message: String },

    /// Timeouts, connection failures, 408/429/5xx after retries ran out
    #[error("Transient error: {0}")]
    Transient(String),

    /// Body could not be decoded into the expected payload
    #[error("Decode error: {0}")]
    Decode(String),
}

impl FetchError {
    /// Status used for requests rejected before they reach the network
    pub const LOCAL_STATUS: u16 = 0;

    pub fn invalid(message: impl Into<String>) -> Self {
        FetchError::InvalidRequest {
            status: Self::LOCAL_STATUS,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

/// Optional time window; either bound may be absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub before: Option<DateTime<Utc>>,
    pub after: Option<DateTime<Utc>>,
}

/// Provider-specific filters carried on every page of a cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageFilters {
    pub time_range: TimeRange,
    pub sort_by: Option<String>,
    pub sort_type: Option<String>,
    pub tx_type: Option<String>,
    pub interval: Option<String>,
}

/// One page worth of request parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub entity: Option<EntityId>,
    pub offset: usize,
    pub limit: usize,
    pub filters: PageFilters,
}

impl PageRequest {
    pub fn for_entity(entity: EntityId) -> Self {
        Self {
            entity: Some(entity),
            ..Default::default()
        }
    }

    pub fn with_filters(mut self, filters: PageFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Same request positioned at another page
    pub fn at(&self, offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit,
            ..self.clone()
        }
    }
}

/// One provider response
#[derive(Debug, Clone, PartialEq)]
pub struct Page<R> {
    pub records: Vec<R>,
    /// Provider's own "more pages" signal when it sends one
    pub has_more: Option<bool>,
}

impl<R> Page<R> {
    pub fn new(records: Vec<R>) -> Self {
        Self { records, has_more: None }
    }

    pub fn with_has_more(records: Vec<R>, has_more: bool) -> Self {
        Self {
            records,
            has_more: Some(has_more),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A single provider endpoint producing one record type
#[async_trait]
pub trait PageSource: Send + Sync {
    type Record: Record;

    /// Short name used in logs
    fn name(&self) -> &str;

    /// False for endpoints that return everything in one call
    fn paginated(&self) -> bool {
        true
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<Page<Self::Record>, FetchError>;
}
