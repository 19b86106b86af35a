//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - HTTP: rate-limited, retrying provider client
//! - Birdeye: token, transaction, trader and wallet endpoints
//! - Dexscreener: token boosts
//! - Storage: SQLite and in-memory row stores
//! - CLI: Command-line interface handlers

pub mod http;
pub mod birdeye;
pub mod dexscreener;
pub mod storage;
pub mod cli;

pub use http::{RateLimitedClient, RetryPolicy};
pub use birdeye::BirdeyeClient;
pub use dexscreener::TopBoostsSource;
pub use storage::{MemoryStore, SqliteStore};
pub use cli::CliApp;
