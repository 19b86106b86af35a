//! Dexscreener Adapter
//!
//! Top token boosts. The endpoint takes no parameters and returns a bare
//! JSON array, so the source is single-call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::adapters::http::{ClientConfig, Endpoint, RateLimitedClient, RetryPolicy};
use crate::domain::TokenBoost;
use crate::ports::{FetchError, Page, PageRequest, PageSource, ResponseArchive};

pub const TOP_BOOSTS: Endpoint = Endpoint::new("/token-boosts/top/v1", &[]).archived();

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostLink {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostItem {
    #[serde(default)]
    pub url: String,
    pub chain_id: String,
    pub token_address: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub header: Option<String>,
    #[serde(default)]
    pub links: Vec<BoostLink>,
    #[serde(default)]
    pub total_amount: i64,
}

impl From<BoostItem> for TokenBoost {
    fn from(item: BoostItem) -> Self {
        let links = if item.links.is_empty() {
            None
        } else {
            serde_json::to_string(&item.links).ok()
        };
        Self {
            chain_id: item.chain_id,
            token_address: item.token_address,
            url: item.url,
            description: item.description,
            icon: item.icon,
            header: item.header,
            links,
            total_amount: item.total_amount,
        }
    }
}

/// Dexscreener client configuration
#[derive(Debug, Clone)]
pub struct DexscreenerConfig {
    pub api_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub rate_limit_rpm: u32,
}

impl Default for DexscreenerConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.dexscreener.com".to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            // Dexscreener documents 60 rpm for the boost endpoints
            rate_limit_rpm: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TopBoostsSource {
    http: RateLimitedClient,
}

impl TopBoostsSource {
    pub fn new(config: DexscreenerConfig) -> Result<Self, FetchError> {
        let http = RateLimitedClient::new(
            ClientConfig::new("dexscreener", &config.api_url)
                .with_header("accept", "application/json")
                .with_timeout(config.timeout)
                .with_retry(config.retry)
                .with_rate_limit(config.rate_limit_rpm, 1),
        )?;
        Ok(Self { http })
    }

    /// Keep every raw boosts response in `archive`
    pub fn with_archive(mut self, archive: Arc<dyn ResponseArchive>) -> Self {
        self.http = self.http.with_archive(archive);
        self
    }
}

#[async_trait]
impl PageSource for TopBoostsSource {
    type Record = TokenBoost;

    fn name(&self) -> &str {
        "dexscreener_top_boosts"
    }

    fn paginated(&self) -> bool {
        false
    }

    async fn fetch_page(&self, _request: &PageRequest) -> Result<Page<TokenBoost>, FetchError> {
        let items: Vec<BoostItem> = self.http.call(&TOP_BOOSTS, &[]).await?;
        Ok(Page::new(items.into_iter().map(TokenBoost::from).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boost_payload() {
        let json = r#"[{
            "url": "https://dexscreener.com/solana/abc",
            "chainId": "solana",
            "tokenAddress": "So11111111111111111111111111111111111111112",
            "description": "wrapped sol",
            "icon": "icon-hash",
            "links": [{"type": "twitter", "url": "https://x.com/sol"}, {"label": "Website", "url": "https://sol"}],
            "totalAmount": 500
        }, {
            "url": "https://dexscreener.com/base/def",
            "chainId": "base",
            "tokenAddress": "0xdef",
            "totalAmount": 10
        }]"#;
        let items: Vec<BoostItem> = serde_json::from_str(json).unwrap();
        let boosts: Vec<TokenBoost> = items.into_iter().map(TokenBoost::from).collect();

        assert_eq!(boosts.len(), 2);
        assert_eq!(boosts[0].total_amount, 500);
        let links = boosts[0].links.as_deref().unwrap();
        assert!(links.contains("twitter"));
        assert!(boosts[1].links.is_none());
    }

    #[test]
    fn test_source_is_single_call() {
        let source = TopBoostsSource::new(DexscreenerConfig::default()).unwrap();
        assert!(!source.paginated());
        assert_eq!(source.name(), "dexscreener_top_boosts");
        assert!(TOP_BOOSTS.archive);
    }
}
