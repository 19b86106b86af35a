//! Birdeye API wire types
//!
//! Only the fields the harvester stores are declared; serde ignores the
//! rest of each payload.

use serde::Deserialize;
use serde_json::Value;

use crate::domain::{
    NewListing, TokenOverview, TokenSecurity, TokenTransaction, TopTrader, TrendingToken,
    WalletHolding,
};

/// Render a number-or-string JSON value as text
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingItem {
    pub address: String,
    #[serde(default)]
    pub decimals: i64,
    #[serde(default)]
    pub fdv: f64,
    #[serde(default)]
    pub liquidity: f64,
    #[serde(rename = "logoURI")]
    pub logo_uri: Option<String>,
    #[serde(default)]
    pub marketcap: f64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub rank: i64,
    #[serde(default)]
    pub symbol: String,
    #[serde(rename = "volume24hUSD", default)]
    pub volume_24h_usd: f64,
    pub volume24h_change_percent: Option<f64>,
    pub price24h_change_percent: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrendingData {
    pub tokens: Vec<TrendingItem>,
    /// Size of the whole trending list
    pub total: Option<usize>,
}

impl From<TrendingItem> for TrendingToken {
    fn from(item: TrendingItem) -> Self {
        Self {
            address: item.address,
            symbol: item.symbol,
            name: item.name,
            decimals: item.decimals,
            rank: item.rank,
            price: item.price,
            marketcap: item.marketcap,
            fdv: item.fdv,
            liquidity: item.liquidity,
            volume_24h_usd: item.volume_24h_usd,
            price_24h_change_percent: item.price24h_change_percent,
            volume_24h_change_percent: item.volume24h_change_percent,
            logo_uri: item.logo_uri,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewListingItem {
    pub address: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub decimals: i64,
    #[serde(default)]
    pub source: String,
    pub liquidity_added_at: Option<String>,
    #[serde(rename = "logoURI")]
    pub logo_uri: Option<String>,
    #[serde(default)]
    pub liquidity: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemsData<T> {
    pub items: Vec<T>,
}

impl From<NewListingItem> for NewListing {
    fn from(item: NewListingItem) -> Self {
        Self {
            address: item.address,
            symbol: item.symbol,
            name: item.name,
            decimals: item.decimals,
            source: item.source,
            liquidity: item.liquidity,
            liquidity_added_at: item.liquidity_added_at,
            logo_uri: item.logo_uri,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewData {
    pub address: String,
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub fdv: Option<f64>,
    pub liquidity: Option<f64>,
    pub total_supply: Option<f64>,
    pub circulating_supply: Option<f64>,
    pub holder: Option<i64>,
    pub number_markets: Option<i64>,
    pub price_change1h_percent: Option<f64>,
    pub price_change24h_percent: Option<f64>,
    #[serde(rename = "v24hUSD")]
    pub v24h_usd: Option<f64>,
    pub trade24h: Option<i64>,
    pub buy24h: Option<i64>,
    pub sell24h: Option<i64>,
    pub unique_wallet24h: Option<i64>,
    pub last_trade_unix_time: Option<i64>,
}

impl From<OverviewData> for TokenOverview {
    fn from(data: OverviewData) -> Self {
        Self {
            token_address: data.address,
            price: data.price,
            market_cap: data.market_cap,
            fdv: data.fdv,
            liquidity: data.liquidity,
            total_supply: data.total_supply,
            circulating_supply: data.circulating_supply,
            holder: data.holder,
            number_markets: data.number_markets,
            price_change_1h_percent: data.price_change1h_percent,
            price_change_24h_percent: data.price_change24h_percent,
            v24h_usd: data.v24h_usd,
            trade_24h: data.trade24h,
            buy_24h: data.buy24h,
            sell_24h: data.sell24h,
            unique_wallet_24h: data.unique_wallet24h,
            last_trade_unix_time: data.last_trade_unix_time,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityData {
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
    #[serde(default)]
    pub is_token2022: bool,
    pub non_transferable: Option<bool>,
}

impl SecurityData {
    /// The security payload does not echo the address back
    pub fn into_record(self, token_address: &str) -> TokenSecurity {
        TokenSecurity {
            token_address: token_address.to_string(),
            creator_address: self.creator_address,
            owner_address: self.owner_address,
            creation_tx: self.creation_tx,
            creation_time: self.creation_time,
            creator_percentage: self.creator_percentage,
            top10_holder_percent: self.top10_holder_percent,
            total_supply: self.total_supply,
            mutable_metadata: self.mutable_metadata,
            freezeable: self.freezeable,
            freeze_authority: self.freeze_authority,
            transfer_fee_enable: self.transfer_fee_enable,
            is_token_2022: self.is_token2022,
            non_transferable: self.non_transferable,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxTokenInfo {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub ui_amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionItem {
    pub tx_hash: String,
    pub quote: TxTokenInfo,
    pub base: TxTokenInfo,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub block_unix_time: i64,
    #[serde(default)]
    pub tx_type: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub token_price: f64,
    #[serde(default)]
    pub pool_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsData {
    pub items: Vec<TransactionItem>,
    #[serde(default)]
    pub has_next: Option<bool>,
}

impl TransactionItem {
    pub fn into_record(self, token_address: &str) -> TokenTransaction {
        TokenTransaction {
            tx_hash: self.tx_hash,
            token_address: token_address.to_string(),
            owner: self.owner,
            side: self.side,
            tx_type: self.tx_type,
            source: self.source,
            block_unix_time: self.block_unix_time,
            token_price: self.token_price,
            pool_id: self.pool_id,
            base_symbol: self.base.symbol,
            base_ui_amount: self.base.ui_amount,
            quote_symbol: self.quote.symbol,
            quote_ui_amount: self.quote.ui_amount,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopTraderItem {
    #[serde(default)]
    pub token_address: String,
    pub owner: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(rename = "type", default)]
    pub time_range: String,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub trade: i64,
    #[serde(default)]
    pub trade_buy: i64,
    #[serde(default)]
    pub trade_sell: i64,
    #[serde(default)]
    pub volume_buy: f64,
    #[serde(default)]
    pub volume_sell: f64,
}

impl TopTraderItem {
    /// Falls back to the queried token when the item omits it
    pub fn into_record(self, token_address: &str) -> TopTrader {
        let token_address = if self.token_address.is_empty() {
            token_address.to_string()
        } else {
            self.token_address
        };
        let tags = if self.tags.is_empty() {
            None
        } else {
            serde_json::to_string(&self.tags).ok()
        };
        TopTrader {
            token_address,
            owner: self.owner,
            time_range: self.time_range,
            volume: self.volume,
            trade: self.trade,
            trade_buy: self.trade_buy,
            trade_sell: self.trade_sell,
            volume_buy: self.volume_buy,
            volume_sell: self.volume_sell,
            tags,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTokenItem {
    pub address: String,
    #[serde(default)]
    pub decimals: i64,
    #[serde(default)]
    pub balance: Value,
    #[serde(default)]
    pub ui_amount: f64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(rename = "logoURI")]
    pub logo_uri: Option<String>,
    #[serde(default)]
    pub price_usd: f64,
    #[serde(default)]
    pub value_usd: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTokenListData {
    #[serde(default)]
    pub wallet: String,
    #[serde(default)]
    pub items: Vec<WalletTokenItem>,
}

impl WalletTokenItem {
    pub fn into_record(self, wallet_address: &str) -> WalletHolding {
        WalletHolding {
            wallet_address: wallet_address.to_string(),
            token_address: self.address,
            symbol: self.symbol,
            name: self.name,
            decimals: self.decimals,
            balance: value_text(&self.balance),
            ui_amount: self.ui_amount,
            price_usd: self.price_usd,
            value_usd: self.value_usd,
            logo_uri: self.logo_uri,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::Envelope;

    #[test]
    fn test_trending_payload() {
        let json = r#"{
            "success": true,
            "data": {
                "updateUnixTime": 1726681733,
                "updateTime": "2024-09-18T17:48:53",
                "tokens": [{
                    "address": "So11111111111111111111111111111111111111112",
                    "decimals": 9,
                    "liquidity": 1.5e9,
                    "logoURI": "https://img/sol.png",
                    "name": "Wrapped SOL",
                    "symbol": "SOL",
                    "volume24hUSD": 2.5e9,
                    "volume24hChangePercent": 12.5,
                    "fdv": 8.0e10,
                    "marketcap": 7.0e10,
                    "rank": 1,
                    "price": 145.2,
                    "price24hChangePercent": -1.1,
                    "isScaledUiToken": false
                }],
                "total": 1000
            }
        }"#;
        let envelope: Envelope<TrendingData> = serde_json::from_str(json).unwrap();
        let data = envelope.into_data().unwrap();
        assert_eq!(data.total, Some(1000));

        let token = TrendingToken::from(data.tokens[0].clone());
        assert_eq!(token.symbol, "SOL");
        assert_eq!(token.volume_24h_usd, 2.5e9);
        assert_eq!(token.volume_24h_change_percent, Some(12.5));
        assert_eq!(token.logo_uri.as_deref(), Some("https://img/sol.png"));
    }

    #[test]
    fn test_transactions_payload() {
        let json = r#"{
            "items": [{
                "quote": {"symbol": "SOL", "decimals": 9, "address": "q", "amount": "1000", "uiAmount": 0.001},
                "base": {"symbol": "BONK", "decimals": 5, "address": "b", "amount": 5, "uiAmount": 500.0},
                "basePrice": 0.00002,
                "quotePrice": 145.0,
                "txHash": "5Kx",
                "source": "raydium",
                "blockUnixTime": 1726681733,
                "txType": "swap",
                "owner": "owner1",
                "side": "buy",
                "pricePair": 1.0,
                "tokenPrice": 0.00002,
                "poolId": "pool1"
            }],
            "hasNext": true
        }"#;
        let data: TransactionsData = serde_json::from_str(json).unwrap();
        assert_eq!(data.has_next, Some(true));

        let tx = data.items[0].clone().into_record("tok");
        assert_eq!(tx.tx_hash, "5Kx");
        assert_eq!(tx.token_address, "tok");
        assert_eq!(tx.base_symbol, "BONK");
        assert_eq!(tx.quote_ui_amount, 0.001);
    }

    #[test]
    fn test_top_trader_tags_and_fallback_token() {
        let json = r#"{"owner": "w1", "tags": ["sniper"], "type": "24h", "volume": 10.0,
            "trade": 2, "tradeBuy": 1, "tradeSell": 1, "volumeBuy": 6.0, "volumeSell": 4.0}"#;
        let item: TopTraderItem = serde_json::from_str(json).unwrap();
        let trader = item.into_record("tok");
        assert_eq!(trader.token_address, "tok");
        assert_eq!(trader.time_range, "24h");
        assert_eq!(trader.tags.as_deref(), Some(r#"["sniper"]"#));
    }

    #[test]
    fn test_wallet_balance_as_text() {
        let json = r#"{"wallet": "w", "totalUsd": 1.0, "items": [
            {"address": "a", "decimals": 6, "balance": 18446744073709551616, "uiAmount": 1.0,
             "chainId": "solana", "name": "A", "symbol": "A", "priceUsd": 1.0, "valueUsd": 1.0},
            {"address": "b", "decimals": 6, "balance": "42", "uiAmount": 1.0,
             "chainId": "solana", "name": "B", "symbol": "B", "priceUsd": 1.0, "valueUsd": 1.0}
        ]}"#;
        let data: WalletTokenListData = serde_json::from_str(json).unwrap();
        let holdings: Vec<_> = data
            .items
            .into_iter()
            .map(|i| i.into_record("w"))
            .collect();
        assert_eq!(holdings[1].balance, "42");
        assert!(!holdings[0].balance.is_empty());
    }

    #[test]
    fn test_security_payload_defaults() {
        let data: SecurityData =
            serde_json::from_str(r#"{"creatorAddress": "c", "isToken2022": true}"#).unwrap();
        let security = data.into_record("tok");
        assert!(security.is_token_2022);
        assert_eq!(security.creator_address.as_deref(), Some("c"));
        assert_eq!(security.freezeable, None);
    }
}
