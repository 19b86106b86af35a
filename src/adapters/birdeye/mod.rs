//! Birdeye Adapter
//!
//! Client, wire types and page sources for the Birdeye public API.

pub mod client;
pub mod sources;
pub mod types;

pub use client::{BirdeyeClient, BirdeyeConfig};
pub use sources::{
    NewListingsSource, TokenOverviewSource, TokenSecuritySource, TokenTransactionsSource,
    TopTradersSource, TrendingSource, WalletPortfolioSource,
};
