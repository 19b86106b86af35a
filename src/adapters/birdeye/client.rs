//! Birdeye API Client
//!
//! Typed calls against the Birdeye public API. Every call goes through the
//! shared [`RateLimitedClient`], so all Birdeye jobs draw on one budget.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::types::{
    ItemsData, NewListingItem, OverviewData, SecurityData, TopTraderItem, TransactionsData,
    TrendingData, WalletTokenListData,
};
use crate::adapters::http::{ClientConfig, Endpoint, Params, RateLimitedClient, RetryPolicy};
use crate::domain::{
    NewListing, TokenOverview, TokenSecurity, TokenTransaction, TopTrader, TrendingToken,
    WalletHolding,
};
use crate::ports::{FetchError, Page, PageRequest, ResponseArchive};

pub const TOKEN_TRENDING: Endpoint =
    Endpoint::new("/defi/token_trending", &["sort_by", "sort_type"]);
pub const NEW_LISTING: Endpoint =
    Endpoint::new("/defi/v2/tokens/new_listing", &["time_to"]).archived();
pub const TOKEN_OVERVIEW: Endpoint = Endpoint::new("/defi/token_overview", &["address"]);
pub const TOKEN_SECURITY: Endpoint = Endpoint::new("/defi/token_security", &["address"]);
pub const TOKEN_TRANSACTIONS: Endpoint =
    Endpoint::new("/defi/txs/token/seek_by_time", &["address", "tx_type"]);
pub const TOP_TRADERS: Endpoint = Endpoint::new("/defi/v2/tokens/top_traders", &["address", "type"]);
pub const WALLET_TOKEN_LIST: Endpoint = Endpoint::new("/v1/wallet/token_list", &["wallet"]);

/// Largest page each endpoint serves
pub const MAX_TRENDING_LIMIT: usize = 20;
pub const MAX_NEW_LISTING_LIMIT: usize = 20;
pub const MAX_TRANSACTIONS_LIMIT: usize = 100;
pub const MAX_TOP_TRADERS_LIMIT: usize = 10;

/// Birdeye client configuration
#[derive(Debug, Clone)]
pub struct BirdeyeConfig {
    pub api_url: String,
    pub api_key: String,
    /// Value of the `x-chain` header
    pub chain: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub rate_limit_rpm: u32,
    /// Ask new_listing to include meme launchpads (pump.fun and friends)
    pub meme_platform_enabled: bool,
}

impl Default for BirdeyeConfig {
    fn default() -> Self {
        Self {
            api_url: "https://public-api.birdeye.so".to_string(),
            api_key: String::new(),
            chain: "solana".to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            rate_limit_rpm: 60,
            meme_platform_enabled: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BirdeyeClient {
    http: RateLimitedClient,
    meme_platform_enabled: bool,
}

fn entity_param(request: &PageRequest, endpoint: &Endpoint) -> Result<String, FetchError> {
    request
        .entity
        .as_ref()
        .map(|e| e.as_str().to_string())
        .ok_or_else(|| FetchError::invalid(format!("{} needs an entity address", endpoint.path)))
}

fn push_opt(params: &mut Params, name: &'static str, value: &Option<String>) {
    if let Some(v) = value {
        params.push((name, v.clone()));
    }
}

impl BirdeyeClient {
    pub fn new(config: BirdeyeConfig) -> Result<Self, FetchError> {
        let http = RateLimitedClient::new(
            ClientConfig::new("birdeye", &config.api_url)
                .with_header("accept", "application/json")
                .with_header("x-chain", &config.chain)
                .with_header("X-API-KEY", &config.api_key)
                .with_timeout(config.timeout)
                .with_retry(config.retry)
                .with_rate_limit(config.rate_limit_rpm, 1),
        )?;
        Ok(Self {
            http,
            meme_platform_enabled: config.meme_platform_enabled,
        })
    }

    /// Keep raw new-listing responses in `archive`
    pub fn with_archive(mut self, archive: Arc<dyn ResponseArchive>) -> Self {
        self.http = self.http.with_archive(archive);
        self
    }

    /// Trending tokens; `has_more` is derived from the list total
    pub async fn token_trending(
        &self,
        request: &PageRequest,
    ) -> Result<Page<TrendingToken>, FetchError> {
        let limit = request.limit.min(MAX_TRENDING_LIMIT);
        let filters = &request.filters;
        let mut params: Params = vec![
            ("offset", request.offset.to_string()),
            ("limit", limit.to_string()),
        ];
        push_opt(&mut params, "sort_by", &filters.sort_by);
        push_opt(&mut params, "sort_type", &filters.sort_type);
        push_opt(&mut params, "interval", &filters.interval);

        let data: TrendingData = self.http.call_enveloped(&TOKEN_TRENDING, &params).await?;
        let served = request.offset + data.tokens.len();
        let records = data.tokens.into_iter().map(TrendingToken::from).collect();
        Ok(match data.total {
            Some(total) => Page::with_has_more(records, served < total),
            None => Page::new(records),
        })
    }

    /// Most recent listings up to now; one call, no offset
    pub async fn new_listings(&self, request: &PageRequest) -> Result<Page<NewListing>, FetchError> {
        let limit = request.limit.clamp(1, MAX_NEW_LISTING_LIMIT);
        let time_to = request.filters.time_range.before.unwrap_or_else(Utc::now);
        let params: Params = vec![
            ("time_to", time_to.timestamp().to_string()),
            ("limit", limit.to_string()),
            ("meme_platform_enabled", self.meme_platform_enabled.to_string()),
        ];

        let data: ItemsData<NewListingItem> =
            self.http.call_enveloped(&NEW_LISTING, &params).await?;
        Ok(Page::new(data.items.into_iter().map(NewListing::from).collect()))
    }

    pub async fn token_overview(
        &self,
        request: &PageRequest,
    ) -> Result<Page<TokenOverview>, FetchError> {
        let address = entity_param(request, &TOKEN_OVERVIEW)?;
        let params: Params = vec![("address", address)];
        let data: OverviewData = self.http.call_enveloped(&TOKEN_OVERVIEW, &params).await?;
        Ok(Page::new(vec![TokenOverview::from(data)]))
    }

    pub async fn token_security(
        &self,
        request: &PageRequest,
    ) -> Result<Page<TokenSecurity>, FetchError> {
        let address = entity_param(request, &TOKEN_SECURITY)?;
        let params: Params = vec![("address", address.clone())];
        let data: SecurityData = self.http.call_enveloped(&TOKEN_SECURITY, &params).await?;
        Ok(Page::new(vec![data.into_record(&address)]))
    }

    /// Transactions of a token; without a time bound, everything before now
    pub async fn token_transactions(
        &self,
        request: &PageRequest,
    ) -> Result<Page<TokenTransaction>, FetchError> {
        let address = entity_param(request, &TOKEN_TRANSACTIONS)?;
        let filters = &request.filters;
        let limit = request.limit.min(MAX_TRANSACTIONS_LIMIT);

        let mut params: Params = vec![
            ("address", address.clone()),
            ("offset", request.offset.to_string()),
            ("limit", limit.to_string()),
        ];
        push_opt(&mut params, "tx_type", &filters.tx_type);

        let range = filters.time_range;
        match (range.before, range.after) {
            (None, None) => params.push(("before_time", Utc::now().timestamp().to_string())),
            (before, after) => {
                if let Some(before) = before {
                    params.push(("before_time", before.timestamp().to_string()));
                }
                if let Some(after) = after {
                    params.push(("after_time", after.timestamp().to_string()));
                }
            }
        }

        let data: TransactionsData = self.http.call_enveloped(&TOKEN_TRANSACTIONS, &params).await?;
        let records = data
            .items
            .into_iter()
            .map(|item| item.into_record(&address))
            .collect();
        Ok(match data.has_next {
            Some(has_next) => Page::with_has_more(records, has_next),
            None => Page::new(records),
        })
    }

    pub async fn top_traders(&self, request: &PageRequest) -> Result<Page<TopTrader>, FetchError> {
        let address = entity_param(request, &TOP_TRADERS)?;
        let limit = request.limit.min(MAX_TOP_TRADERS_LIMIT);
        let mut params: Params = vec![
            ("address", address.clone()),
            ("offset", request.offset.to_string()),
            ("limit", limit.to_string()),
        ];
        push_opt(&mut params, "type", &request.filters.interval);

        let data: ItemsData<TopTraderItem> = self.http.call_enveloped(&TOP_TRADERS, &params).await?;
        Ok(Page::new(
            data.items
                .into_iter()
                .map(|item| item.into_record(&address))
                .collect(),
        ))
    }

    pub async fn wallet_portfolio(
        &self,
        request: &PageRequest,
    ) -> Result<Page<WalletHolding>, FetchError> {
        let wallet = entity_param(request, &WALLET_TOKEN_LIST)?;
        let params: Params = vec![("wallet", wallet.clone())];
        let data: WalletTokenListData =
            self.http.call_enveloped(&WALLET_TOKEN_LIST, &params).await?;
        Ok(Page::new(
            data.items
                .into_iter()
                .map(|item| item.into_record(&wallet))
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityId;
    use crate::ports::PageFilters;

    fn offline_client() -> BirdeyeClient {
        BirdeyeClient::new(BirdeyeConfig {
            api_url: "http://127.0.0.1:1".to_string(),
            api_key: "test-key".to_string(),
            retry: RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
            },
            timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_only_new_listings_are_archived() {
        assert!(NEW_LISTING.archive);
        for endpoint in [
            TOKEN_TRENDING,
            TOKEN_OVERVIEW,
            TOKEN_SECURITY,
            TOKEN_TRANSACTIONS,
            TOP_TRADERS,
            WALLET_TOKEN_LIST,
        ] {
            assert!(!endpoint.archive, "{} archived", endpoint.path);
        }
    }

    #[tokio::test]
    async fn test_entity_endpoints_need_an_address() {
        let client = offline_client();
        let request = PageRequest::default();

        assert!(matches!(
            client.token_overview(&request).await,
            Err(FetchError::InvalidRequest { status: 0, .. })
        ));
        assert!(matches!(
            client.wallet_portfolio(&request).await,
            Err(FetchError::InvalidRequest { status: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_trending_requires_sort_filters() {
        let client = offline_client();
        let request = PageRequest::default().at(0, 20);
        assert!(matches!(
            client.token_trending(&request).await,
            Err(FetchError::InvalidRequest { status: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_transactions_require_tx_type() {
        let client = offline_client();
        let request = PageRequest::for_entity(EntityId::new("tok")).at(0, 50);
        assert!(matches!(
            client.token_transactions(&request).await,
            Err(FetchError::InvalidRequest { status: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_complete_request_reaches_network() {
        let client = offline_client();
        let request = PageRequest::for_entity(EntityId::new("tok"))
            .with_filters(PageFilters {
                tx_type: Some("swap".into()),
                ..Default::default()
            })
            .at(0, 50);
        // Nothing listens on port 1, so getting past validation means Transient
        assert!(matches!(
            client.token_transactions(&request).await,
            Err(FetchError::Transient(_))
        ));
    }
}
