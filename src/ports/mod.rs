//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - Provider endpoints that return pages of records
//! - Row persistence (find, insert, update) and the raw response archive

pub mod provider;
pub mod store;
pub mod mocks;

// Re-export main traits and types
pub use provider::{FetchError, Page, PageFilters, PageRequest, PageSource, TimeRange};
pub use store::{ResponseArchive, Row, RowId, RowStore, StoreError};
pub use mocks::ScriptedSource;
