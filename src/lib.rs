//! Market Harvester Library
//!
//! A polling and fan-out engine that harvests Solana market data from
//! Birdeye and Dexscreener into SQLite.
//!
//! # Modules
//!
//! - `domain`: Entity ids, records, upsert keys and the discovery registry
//! - `ports`: Trait abstractions (PageSource, RowStore)
//! - `adapters`: External implementations (HTTP client, Birdeye, Dexscreener, SQLite, CLI)
//! - `config`: Configuration loading, validation and the job catalogue
//! - `application`: Pagination, upserts, jobs, fan-out and the scheduler

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod config;
pub mod application;
