//! Domain Layer - Core types for the market harvester
//!
//! Pure types with no I/O: entity identifiers, the record abstraction,
//! the concrete market records and the discovery registry.
//! All external interactions happen through the ports layer.

pub mod entity;
pub mod record;
pub mod market;
pub mod registry;

pub use entity::{EntityId, EntityIdError, EntityKind, EntityRef};
pub use record::{Field, FieldValue, Record, RecordError, UpsertKey, KEY_SEPARATOR};
pub use market::{
    NewListing, RawResponse, TokenBoost, TokenOverview, TokenSecurity, TokenTransaction, TopTrader,
    TrendingToken, WalletHolding, SOLANA_CHAIN_ID,
};
pub use registry::EntityRegistry;
