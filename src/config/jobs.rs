//! Job catalogue
//!
//! Every job the harvester knows about, with its default cadence and page
//! bounds. The `[jobs.<name>]` config tables override these per job.

use std::fmt;

use serde::Deserialize;

use crate::adapters::birdeye::client::{
    MAX_NEW_LISTING_LIMIT, MAX_TOP_TRADERS_LIMIT, MAX_TRANSACTIONS_LIMIT, MAX_TRENDING_LIMIT,
};
use crate::domain::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobKind {
    TopBoosts,
    Trending,
    NewListings,
    TokenOverview,
    TokenSecurity,
    TokenTransactions,
    TopTraders,
    WalletPortfolio,
}

/// Built-in settings of a job before config overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobDefaults {
    pub enabled: bool,
    pub interval_secs: u64,
    pub page_size: usize,
    pub max_pages: usize,
    /// Largest page the provider accepts
    pub max_page_size: Option<usize>,
}

impl JobKind {
    pub const ALL: [JobKind; 8] = [
        JobKind::TopBoosts,
        JobKind::Trending,
        JobKind::NewListings,
        JobKind::TokenOverview,
        JobKind::TokenSecurity,
        JobKind::TokenTransactions,
        JobKind::TopTraders,
        JobKind::WalletPortfolio,
    ];

    pub fn name(self) -> &'static str {
        match self {
            JobKind::TopBoosts => "dexscreener_top_boosts",
            JobKind::Trending => "birdeye_trending",
            JobKind::NewListings => "birdeye_new_listings",
            JobKind::TokenOverview => "birdeye_token_overview",
            JobKind::TokenSecurity => "birdeye_token_security",
            JobKind::TokenTransactions => "birdeye_token_transactions",
            JobKind::TopTraders => "birdeye_top_traders",
            JobKind::WalletPortfolio => "birdeye_wallet_portfolio",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Kind of entity a tracked job iterates over; None for list jobs
    pub fn tracked_kind(self) -> Option<EntityKind> {
        match self {
            JobKind::TopBoosts | JobKind::Trending | JobKind::NewListings => None,
            JobKind::TokenOverview
            | JobKind::TokenSecurity
            | JobKind::TokenTransactions
            | JobKind::TopTraders => Some(EntityKind::Token),
            JobKind::WalletPortfolio => Some(EntityKind::Wallet),
        }
    }

    pub fn uses_birdeye(self) -> bool {
        self != JobKind::TopBoosts
    }

    pub fn defaults(self) -> JobDefaults {
        let (interval_secs, page_size, max_pages, max_page_size) = match self {
            JobKind::TopBoosts => (6, 30, 1, None),
            JobKind::Trending => (3600, MAX_TRENDING_LIMIT, 5, Some(MAX_TRENDING_LIMIT)),
            JobKind::NewListings => (60, MAX_NEW_LISTING_LIMIT, 1, Some(MAX_NEW_LISTING_LIMIT)),
            JobKind::TokenOverview => (300, 1, 1, None),
            JobKind::TokenSecurity => (3600, 1, 1, None),
            JobKind::TokenTransactions => (120, 50, 1, Some(MAX_TRANSACTIONS_LIMIT)),
            JobKind::TopTraders => (300, MAX_TOP_TRADERS_LIMIT, 1, Some(MAX_TOP_TRADERS_LIMIT)),
            JobKind::WalletPortfolio => (600, 1, 1, None),
        };
        JobDefaults {
            enabled: true,
            interval_secs,
            page_size,
            max_pages,
            max_page_size,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One `[jobs.<name>]` table; absent keys fall back to [`JobDefaults`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobSection {
    pub enabled: Option<bool>,
    pub interval_secs: Option<u64>,
    pub page_size: Option<usize>,
    pub max_pages: Option<usize>,
    /// Trending: rank, volumeUSD or liquidity
    pub sort_by: Option<String>,
    /// asc or desc
    pub sort_type: Option<String>,
    /// Transactions: swap, add, remove or all
    pub tx_type: Option<String>,
    /// Trending interval or top traders time range, e.g. 24h
    pub time_range: Option<String>,
}

/// Fully resolved settings of one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    pub kind: JobKind,
    pub enabled: bool,
    pub interval_secs: u64,
    pub page_size: usize,
    pub max_pages: usize,
    pub sort_by: Option<String>,
    pub sort_type: Option<String>,
    pub tx_type: Option<String>,
    pub time_range: Option<String>,
}

impl JobSettings {
    pub fn resolve(kind: JobKind, section: Option<&JobSection>) -> Self {
        let defaults = kind.defaults();
        let section = section.cloned().unwrap_or_default();

        let (sort_by, sort_type, tx_type, time_range) = match kind {
            JobKind::Trending => (Some("rank"), Some("asc"), None, Some("24h")),
            JobKind::TokenTransactions => (None, None, Some("swap"), None),
            JobKind::TopTraders => (None, None, None, Some("24h")),
            _ => (None, None, None, None),
        };

        Self {
            kind,
            enabled: section.enabled.unwrap_or(defaults.enabled),
            interval_secs: section.interval_secs.unwrap_or(defaults.interval_secs),
            page_size: section.page_size.unwrap_or(defaults.page_size),
            max_pages: section.max_pages.unwrap_or(defaults.max_pages),
            sort_by: section.sort_by.or(sort_by.map(String::from)),
            sort_type: section.sort_type.or(sort_type.map(String::from)),
            tx_type: section.tx_type.or(tx_type.map(String::from)),
            time_range: section.time_range.or(time_range.map(String::from)),
        }
    }
}
