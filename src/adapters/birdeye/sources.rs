//! Birdeye page sources
//!
//! One [`PageSource`] per endpoint, each a thin handle on the shared client.

use async_trait::async_trait;

use super::client::BirdeyeClient;
use crate::domain::{
    NewListing, TokenOverview, TokenSecurity, TokenTransaction, TopTrader, TrendingToken,
    WalletHolding,
};
use crate::ports::{FetchError, Page, PageRequest, PageSource};

macro_rules! birdeye_source {
    ($(#[$meta:meta])* $name:ident, $record:ty, $label:literal, $method:ident, $paginated:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            client: BirdeyeClient,
        }

        impl $name {
            pub fn new(client: BirdeyeClient) -> Self {
                Self { client }
            }
        }

        #[async_trait]
        impl PageSource for $name {
            type Record = $record;

            fn name(&self) -> &str {
                $label
            }

            fn paginated(&self) -> bool {
                $paginated
            }

            async fn fetch_page(&self, request: &PageRequest) -> Result<Page<$record>, FetchError> {
                self.client.$method(request).await
            }
        }
    };
}

birdeye_source!(
    /// `/defi/token_trending`, paged by offset
    TrendingSource, TrendingToken, "birdeye_trending", token_trending, true
);
birdeye_source!(
    /// `/defi/v2/tokens/new_listing`, newest first, single call
    NewListingsSource, NewListing, "birdeye_new_listings", new_listings, false
);
birdeye_source!(
    TokenOverviewSource, TokenOverview, "birdeye_token_overview", token_overview, false
);
birdeye_source!(
    TokenSecuritySource, TokenSecurity, "birdeye_token_security", token_security, false
);
birdeye_source!(
    /// `/defi/txs/token/seek_by_time`, paged by offset with `hasNext`
    TokenTransactionsSource, TokenTransaction, "birdeye_token_transactions", token_transactions, true
);
birdeye_source!(
    TopTradersSource, TopTrader, "birdeye_top_traders", top_traders, true
);
birdeye_source!(
    WalletPortfolioSource, WalletHolding, "birdeye_wallet_portfolio", wallet_portfolio, false
);
