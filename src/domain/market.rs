//! Market Records
//!
//! Typed records persisted by the harvester, one per destination table.
//! Provider adapters translate their wire payloads into these.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{EntityKind, EntityRef};
use super::record::{
    finite_opt, non_negative, non_negative_opt, Field, FieldValue, Record, RecordError, UpsertKey,
};

/// Chain id Dexscreener uses for Solana
pub const SOLANA_CHAIN_ID: &str = "solana";

/// A provider response body kept as received; rows are never updated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResponse {
    /// Provider name, e.g. "birdeye"
    pub source: String,
    pub endpoint: String,
    pub status_code: u16,
    pub fetched_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl RawResponse {
    pub fn new(source: &str, endpoint: &str, status_code: u16, payload: serde_json::Value) -> Self {
        Self {
            source: source.to_string(),
            endpoint: endpoint.to_string(),
            status_code,
            fetched_at: Utc::now(),
            payload,
        }
    }

    fn fetched_at_text(&self) -> String {
        self.fetched_at.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }
}

impl Record for RawResponse {
    const TABLE: &'static str = "raw_api_responses";

    fn upsert_key(&self) -> Result<UpsertKey, RecordError> {
        UpsertKey::composite(&[
            ("source", &self.source),
            ("endpoint", &self.endpoint),
            ("fetched_at", &self.fetched_at_text()),
        ])
    }

    fn fields(&self) -> Result<Vec<Field>, RecordError> {
        Ok(vec![
            ("source", self.source.as_str().into()),
            ("endpoint", self.endpoint.as_str().into()),
            ("status_code", i64::from(self.status_code).into()),
            ("fetched_at", self.fetched_at_text().into()),
            ("response_json", self.payload.to_string().into()),
        ])
    }
}

/// Dexscreener top token boost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBoost {
    pub chain_id: String,
    pub token_address: String,
    pub url: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub header: Option<String>,
    /// Social links serialized as JSON
    pub links: Option<String>,
    pub total_amount: i64,
}

impl Record for TokenBoost {
    const TABLE: &'static str = "dexscreener_token_boosts";

    fn upsert_key(&self) -> Result<UpsertKey, RecordError> {
        UpsertKey::composite(&[
            ("chainId", &self.chain_id),
            ("tokenAddress", &self.token_address),
        ])
    }

    fn fields(&self) -> Result<Vec<Field>, RecordError> {
        if self.total_amount < 0 {
            return Err(RecordError::InvalidField {
                field: "total_amount",
                reason: format!("{} is negative", self.total_amount),
            });
        }
        Ok(vec![
            ("chain_id", self.chain_id.as_str().into()),
            ("token_address", self.token_address.as_str().into()),
            ("url", self.url.as_str().into()),
            ("description", self.description.clone().into()),
            ("icon", self.icon.clone().into()),
            ("header", self.header.clone().into()),
            ("links", self.links.clone().into()),
            ("total_amount", self.total_amount.into()),
        ])
    }

    fn discovered(&self) -> Vec<EntityRef> {
        if self.chain_id != SOLANA_CHAIN_ID {
            return Vec::new();
        }
        EntityRef::discover(EntityKind::Token, &self.token_address)
            .into_iter()
            .collect()
    }
}

/// Birdeye trending token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingToken {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: i64,
    pub rank: i64,
    pub price: f64,
    pub marketcap: f64,
    pub fdv: f64,
    pub liquidity: f64,
    pub volume_24h_usd: f64,
    pub price_24h_change_percent: Option<f64>,
    pub volume_24h_change_percent: Option<f64>,
    pub logo_uri: Option<String>,
}

impl Record for TrendingToken {
    const TABLE: &'static str = "birdeye_token_trending";

    fn upsert_key(&self) -> Result<UpsertKey, RecordError> {
        UpsertKey::single("address", &self.address)
    }

    fn fields(&self) -> Result<Vec<Field>, RecordError> {
        Ok(vec![
            ("symbol", self.symbol.as_str().into()),
            ("name", self.name.as_str().into()),
            ("decimals", self.decimals.into()),
            ("rank", self.rank.into()),
            ("price", non_negative("price", self.price)?.into()),
            ("marketcap", non_negative("marketcap", self.marketcap)?.into()),
            ("fdv", non_negative("fdv", self.fdv)?.into()),
            ("liquidity", non_negative("liquidity", self.liquidity)?.into()),
            (
                "volume_24h_usd",
                non_negative("volume_24h_usd", self.volume_24h_usd)?.into(),
            ),
            (
                "price_24h_change_percent",
                finite_opt("price_24h_change_percent", self.price_24h_change_percent)?.into(),
            ),
            (
                "volume_24h_change_percent",
                finite_opt("volume_24h_change_percent", self.volume_24h_change_percent)?.into(),
            ),
            ("logo_uri", self.logo_uri.clone().into()),
        ])
    }

    fn discovered(&self) -> Vec<EntityRef> {
        EntityRef::discover(EntityKind::Token, &self.address)
            .into_iter()
            .collect()
    }
}

/// Birdeye newly listed token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewListing {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: i64,
    pub source: String,
    pub liquidity: f64,
    pub liquidity_added_at: Option<String>,
    pub logo_uri: Option<String>,
}

impl Record for NewListing {
    const TABLE: &'static str = "birdeye_new_listings";

    fn upsert_key(&self) -> Result<UpsertKey, RecordError> {
        UpsertKey::single("address", &self.address)
    }

    fn fields(&self) -> Result<Vec<Field>, RecordError> {
        Ok(vec![
            ("symbol", self.symbol.as_str().into()),
            ("name", self.name.as_str().into()),
            ("decimals", self.decimals.into()),
            ("source", self.source.as_str().into()),
            ("liquidity", non_negative("liquidity", self.liquidity)?.into()),
            ("liquidity_added_at", self.liquidity_added_at.clone().into()),
            ("logo_uri", self.logo_uri.clone().into()),
        ])
    }

    fn discovered(&self) -> Vec<EntityRef> {
        EntityRef::discover(EntityKind::Token, &self.address)
            .into_iter()
            .collect()
    }
}

/// Birdeye token overview (latest snapshot per token)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenOverview {
    pub token_address: String,
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub fdv: Option<f64>,
    pub liquidity: Option<f64>,
    pub total_supply: Option<f64>,
    pub circulating_supply: Option<f64>,
    pub holder: Option<i64>,
    pub number_markets: Option<i64>,
    pub price_change_1h_percent: Option<f64>,
    pub price_change_24h_percent: Option<f64>,
    pub v24h_usd: Option<f64>,
    pub trade_24h: Option<i64>,
    pub buy_24h: Option<i64>,
    pub sell_24h: Option<i64>,
    pub unique_wallet_24h: Option<i64>,
    pub last_trade_unix_time: Option<i64>,
}

impl Record for TokenOverview {
    const TABLE: &'static str = "birdeye_token_overview";

    fn upsert_key(&self) -> Result<UpsertKey, RecordError> {
        UpsertKey::single("tokenAddress", &self.token_address)
    }

    fn fields(&self) -> Result<Vec<Field>, RecordError> {
        Ok(vec![
            ("price", non_negative_opt("price", self.price)?.into()),
            ("market_cap", non_negative_opt("market_cap", self.market_cap)?.into()),
            ("fdv", non_negative_opt("fdv", self.fdv)?.into()),
            ("liquidity", non_negative_opt("liquidity", self.liquidity)?.into()),
            ("total_supply", non_negative_opt("total_supply", self.total_supply)?.into()),
            (
                "circulating_supply",
                non_negative_opt("circulating_supply", self.circulating_supply)?.into(),
            ),
            ("holder", self.holder.into()),
            ("number_markets", self.number_markets.into()),
            (
                "price_change_1h_percent",
                finite_opt("price_change_1h_percent", self.price_change_1h_percent)?.into(),
            ),
            (
                "price_change_24h_percent",
                finite_opt("price_change_24h_percent", self.price_change_24h_percent)?.into(),
            ),
            ("v24h_usd", non_negative_opt("v24h_usd", self.v24h_usd)?.into()),
            ("trade_24h", self.trade_24h.into()),
            ("buy_24h", self.buy_24h.into()),
            ("sell_24h", self.sell_24h.into()),
            ("unique_wallet_24h", self.unique_wallet_24h.into()),
            ("last_trade_unix_time", self.last_trade_unix_time.into()),
        ])
    }
}

/// Birdeye token security report
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenSecurity {
    pub token_address: String,
    pub creator_address: Option<String>,
    pub owner_address: Option<String>,
    pub creation_tx: Option<String>,
    pub creation_time: Option<i64>,
    pub creator_percentage: Option<f64>,
    pub top10_holder_percent: Option<f64>,
    pub total_supply: Option<f64>,
    pub mutable_metadata: Option<bool>,
    pub freezeable: Option<bool>,
    pub freeze_authority: Option<String>,
    pub transfer_fee_enable: Option<bool>,
    pub is_token_2022: bool,
    pub non_transferable: Option<bool>,
}

impl Record for TokenSecurity {
    const TABLE: &'static str = "birdeye_token_security";

    fn upsert_key(&self) -> Result<UpsertKey, RecordError> {
        UpsertKey::single("tokenAddress", &self.token_address)
    }

    fn fields(&self) -> Result<Vec<Field>, RecordError> {
        Ok(vec![
            ("creator_address", self.creator_address.clone().into()),
            ("owner_address", self.owner_address.clone().into()),
            ("creation_tx", self.creation_tx.clone().into()),
            ("creation_time", self.creation_time.into()),
            (
                "creator_percentage",
                non_negative_opt("creator_percentage", self.creator_percentage)?.into(),
            ),
            (
                "top10_holder_percent",
                non_negative_opt("top10_holder_percent", self.top10_holder_percent)?.into(),
            ),
            ("total_supply", non_negative_opt("total_supply", self.total_supply)?.into()),
            ("mutable_metadata", self.mutable_metadata.into()),
            ("freezeable", self.freezeable.into()),
            ("freeze_authority", self.freeze_authority.clone().into()),
            ("transfer_fee_enable", self.transfer_fee_enable.into()),
            ("is_token_2022", self.is_token_2022.into()),
            ("non_transferable", self.non_transferable.into()),
        ])
    }
}

/// Birdeye swap or liquidity transaction on a token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenTransaction {
    pub tx_hash: String,
    pub token_address: String,
    pub owner: String,
    pub side: String,
    pub tx_type: String,
    pub source: String,
    pub block_unix_time: i64,
    pub token_price: f64,
    pub pool_id: String,
    pub base_symbol: String,
    pub base_ui_amount: f64,
    pub quote_symbol: String,
    pub quote_ui_amount: f64,
}

impl Record for TokenTransaction {
    const TABLE: &'static str = "birdeye_token_transactions";

    fn upsert_key(&self) -> Result<UpsertKey, RecordError> {
        UpsertKey::single("txHash", &self.tx_hash)
    }

    fn fields(&self) -> Result<Vec<Field>, RecordError> {
        Ok(vec![
            ("token_address", self.token_address.as_str().into()),
            ("owner", self.owner.as_str().into()),
            ("side", self.side.as_str().into()),
            ("tx_type", self.tx_type.as_str().into()),
            ("source", self.source.as_str().into()),
            ("block_unix_time", self.block_unix_time.into()),
            ("token_price", non_negative("token_price", self.token_price)?.into()),
            ("pool_id", self.pool_id.as_str().into()),
            ("base_symbol", self.base_symbol.as_str().into()),
            ("base_ui_amount", FieldValue::Float(self.base_ui_amount)),
            ("quote_symbol", self.quote_symbol.as_str().into()),
            ("quote_ui_amount", FieldValue::Float(self.quote_ui_amount)),
        ])
    }
}

/// Birdeye top trader of a token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopTrader {
    pub token_address: String,
    pub owner: String,
    pub time_range: String,
    pub volume: f64,
    pub trade: i64,
    pub trade_buy: i64,
    pub trade_sell: i64,
    pub volume_buy: f64,
    pub volume_sell: f64,
    /// Trader tags serialized as JSON
    pub tags: Option<String>,
}

impl Record for TopTrader {
    const TABLE: &'static str = "birdeye_top_traders";

    fn upsert_key(&self) -> Result<UpsertKey, RecordError> {
        UpsertKey::composite(&[("tokenAddress", &self.token_address), ("owner", &self.owner)])
    }

    fn fields(&self) -> Result<Vec<Field>, RecordError> {
        Ok(vec![
            ("token_address", self.token_address.as_str().into()),
            ("owner", self.owner.as_str().into()),
            ("time_range", self.time_range.as_str().into()),
            ("volume", non_negative("volume", self.volume)?.into()),
            ("trade", self.trade.into()),
            ("trade_buy", self.trade_buy.into()),
            ("trade_sell", self.trade_sell.into()),
            ("volume_buy", non_negative("volume_buy", self.volume_buy)?.into()),
            ("volume_sell", non_negative("volume_sell", self.volume_sell)?.into()),
            ("tags", self.tags.clone().into()),
        ])
    }

    fn discovered(&self) -> Vec<EntityRef> {
        EntityRef::discover(EntityKind::Wallet, &self.owner)
            .into_iter()
            .collect()
    }
}

/// Birdeye wallet portfolio holding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletHolding {
    pub wallet_address: String,
    pub token_address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: i64,
    /// Raw balance kept as text, it routinely exceeds i64
    pub balance: String,
    pub ui_amount: f64,
    pub price_usd: f64,
    pub value_usd: f64,
    pub logo_uri: Option<String>,
}

impl Record for WalletHolding {
    const TABLE: &'static str = "birdeye_wallet_tokens";

    fn upsert_key(&self) -> Result<UpsertKey, RecordError> {
        UpsertKey::composite(&[
            ("walletAddress", &self.wallet_address),
            ("tokenAddress", &self.token_address),
        ])
    }

    fn fields(&self) -> Result<Vec<Field>, RecordError> {
        Ok(vec![
            ("wallet_address", self.wallet_address.as_str().into()),
            ("token_address", self.token_address.as_str().into()),
            ("symbol", self.symbol.as_str().into()),
            ("name", self.name.as_str().into()),
            ("decimals", self.decimals.into()),
            ("balance", self.balance.as_str().into()),
            ("ui_amount", non_negative("ui_amount", self.ui_amount)?.into()),
            ("price_usd", non_negative("price_usd", self.price_usd)?.into()),
            ("value_usd", non_negative("value_usd", self.value_usd)?.into()),
            ("logo_uri", self.logo_uri.clone().into()),
        ])
    }
}
