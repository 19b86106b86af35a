//! Wiring from configuration to a ready scheduler
//!
//! Opens the store, builds one page source per enabled job, seeds the
//! registry with the configured entities and registers the dependent steps
//! run for newly discovered tokens and wallets. Boosts and new-listing
//! responses are archived raw unless the database section turns it off.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::job::{EntityStep, FetchPlan, JobDescriptor, ListingJob, PollJob, SourceStep, TrackedEntityJob};
use super::pagination::PaginatedFetcher;
use super::scheduler::{Scheduler, SchedulerError};
use super::upsert::UpsertStore;
use crate::adapters::birdeye::{
    BirdeyeClient, NewListingsSource, TokenOverviewSource, TokenSecuritySource,
    TokenTransactionsSource, TopTradersSource, TrendingSource, WalletPortfolioSource,
};
use crate::adapters::dexscreener::TopBoostsSource;
use crate::adapters::storage::{SqliteStore, StoreArchive};
use crate::config::{Config, ConfigError, JobKind, JobSettings};
use crate::domain::{EntityKind, EntityRegistry};
use crate::ports::{
    FetchError, PageFilters, PageRequest, PageSource, ResponseArchive, RowStore, StoreError,
};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Client error: {0}")]
    Client(#[from] FetchError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

/// Open the configured SQLite database
pub fn open_store(config: &Config) -> Result<Arc<dyn RowStore>, StoreError> {
    let store = if config.database.is_in_memory() {
        SqliteStore::open_in_memory()?
    } else {
        let path = config.database.resolved_path();
        tracing::info!("Opening database at {}", path.display());
        SqliteStore::open(path)?
    };
    Ok(Arc::new(store))
}

/// Base request and page bounds for a job
pub fn fetch_plan(settings: &JobSettings) -> FetchPlan {
    let filters = PageFilters {
        sort_by: settings.sort_by.clone(),
        sort_type: settings.sort_type.clone(),
        tx_type: settings.tx_type.clone(),
        interval: settings.time_range.clone(),
        ..Default::default()
    };
    FetchPlan::new(
        PageRequest::default().with_filters(filters),
        settings.page_size,
        settings.max_pages,
    )
}

/// Shared pieces every job is built from
struct Wiring {
    registry: Arc<EntityRegistry>,
    upserts: Arc<UpsertStore>,
    fetcher: PaginatedFetcher,
    entity_delay: Duration,
    archive: Option<Arc<dyn ResponseArchive>>,
}

impl Wiring {
    fn listing<S: PageSource + 'static>(&self, source: S, settings: &JobSettings) -> Arc<dyn PollJob> {
        Arc::new(ListingJob::new(
            Arc::new(source),
            Arc::clone(&self.upserts),
            self.fetcher,
            fetch_plan(settings),
        ))
    }

    fn step<S: PageSource + 'static>(
        &self,
        kind: EntityKind,
        source: S,
        settings: &JobSettings,
    ) -> Arc<dyn EntityStep> {
        Arc::new(SourceStep::new(
            kind,
            Arc::new(source),
            Arc::clone(&self.upserts),
            self.fetcher,
            fetch_plan(settings),
        ))
    }

    fn tracked(&self, step: Arc<dyn EntityStep>) -> Arc<dyn PollJob> {
        Arc::new(
            TrackedEntityJob::new(step, Arc::clone(&self.registry))
                .with_entity_delay(self.entity_delay),
        )
    }
}

fn build_job(
    settings: &JobSettings,
    config: &Config,
    birdeye: &BirdeyeClient,
    wiring: &Wiring,
) -> Result<Arc<dyn PollJob>, RuntimeError> {
    let client = birdeye.clone();
    let job = match settings.kind {
        JobKind::TopBoosts => {
            let mut source = TopBoostsSource::new(config.dexscreener_config())?;
            if let Some(archive) = &wiring.archive {
                source = source.with_archive(Arc::clone(archive));
            }
            wiring.listing(source, settings)
        }
        JobKind::Trending => wiring.listing(TrendingSource::new(client), settings),
        JobKind::NewListings => wiring.listing(NewListingsSource::new(client), settings),
        JobKind::TokenOverview => wiring.tracked(wiring.step(
            EntityKind::Token,
            TokenOverviewSource::new(client),
            settings,
        )),
        JobKind::TokenSecurity => wiring.tracked(wiring.step(
            EntityKind::Token,
            TokenSecuritySource::new(client),
            settings,
        )),
        JobKind::TokenTransactions => wiring.tracked(wiring.step(
            EntityKind::Token,
            TokenTransactionsSource::new(client),
            settings,
        )),
        JobKind::TopTraders => wiring.tracked(wiring.step(
            EntityKind::Token,
            TopTradersSource::new(client),
            settings,
        )),
        JobKind::WalletPortfolio => wiring.tracked(wiring.step(
            EntityKind::Wallet,
            WalletPortfolioSource::new(client),
            settings,
        )),
    };
    Ok(job)
}

/// Steps run once for every newly discovered entity
fn dependent_steps(config: &Config, birdeye: &BirdeyeClient, wiring: &Wiring) -> Vec<Arc<dyn EntityStep>> {
    let tracking = &config.tracking;
    let mut steps = Vec::new();

    if tracking.fetch_security_for_new_tokens {
        steps.push(wiring.step(
            EntityKind::Token,
            TokenSecuritySource::new(birdeye.clone()),
            &config.job(JobKind::TokenSecurity),
        ));
    }
    if tracking.fetch_overview_for_new_tokens {
        steps.push(wiring.step(
            EntityKind::Token,
            TokenOverviewSource::new(birdeye.clone()),
            &config.job(JobKind::TokenOverview),
        ));
    }
    if tracking.fetch_portfolio_for_new_wallets {
        steps.push(wiring.step(
            EntityKind::Wallet,
            WalletPortfolioSource::new(birdeye.clone()),
            &config.job(JobKind::WalletPortfolio),
        ));
    }
    steps
}

/// Build a scheduler with every enabled job registered
pub fn build_scheduler(config: &Config, store: Arc<dyn RowStore>) -> Result<Scheduler, RuntimeError> {
    let registry = Arc::new(EntityRegistry::new());
    let seeded = registry.seed(config.seeds()?);
    if seeded > 0 {
        tracing::info!("Tracking {} configured entities", seeded);
    }

    let archive = config
        .database
        .archive_raw_responses
        .then(|| Arc::new(StoreArchive::new(Arc::clone(&store))) as Arc<dyn ResponseArchive>);
    let wiring = Wiring {
        registry: Arc::clone(&registry),
        upserts: Arc::new(UpsertStore::new(store)),
        fetcher: PaginatedFetcher::new(Duration::from_millis(config.birdeye.page_delay_ms)),
        entity_delay: Duration::from_millis(config.tracking.entity_delay_ms),
        archive,
    };
    let mut birdeye = BirdeyeClient::new(config.birdeye_config())?;
    if let Some(archive) = &wiring.archive {
        birdeye = birdeye.with_archive(Arc::clone(archive));
    }

    let mut scheduler = dependent_steps(config, &birdeye, &wiring)
        .into_iter()
        .fold(
            Scheduler::new(config.scheduler_config(), registry),
            Scheduler::with_dependent,
        );

    for settings in config.job_settings().into_iter().filter(|s| s.enabled) {
        let poll = build_job(&settings, config, &birdeye, &wiring)?;
        scheduler.register_job(JobDescriptor::new(
            settings.kind.name(),
            Duration::from_secs(settings.interval_secs),
            poll,
        ))?;
    }

    Ok(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobSection;

    fn config() -> Config {
        let mut config = Config::default();
        config.birdeye.api_key = "test-key".to_string();
        config.database.path = crate::config::IN_MEMORY_PATH.to_string();
        config
            .tracking
            .tokens
            .push("So11111111111111111111111111111111111111112".to_string());
        config
    }

    #[test]
    fn test_plan_carries_job_filters() {
        let plan = fetch_plan(&config().job(JobKind::Trending));
        assert_eq!(plan.page_size, 20);
        assert_eq!(plan.max_pages, 5);
        assert_eq!(plan.base.filters.sort_by.as_deref(), Some("rank"));
        assert_eq!(plan.base.filters.interval.as_deref(), Some("24h"));

        let plan = fetch_plan(&config().job(JobKind::TokenTransactions));
        assert_eq!(plan.base.filters.tx_type.as_deref(), Some("swap"));
    }

    #[tokio::test]
    async fn test_builds_every_enabled_job() {
        let config = config();
        let store = open_store(&config).unwrap();
        let scheduler = build_scheduler(&config, store).unwrap();

        assert_eq!(scheduler.job_names().len(), JobKind::ALL.len());
        assert_eq!(scheduler.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_jobs_are_skipped() {
        let mut config = config();
        config.jobs.insert(
            "birdeye_token_transactions".to_string(),
            JobSection {
                enabled: Some(false),
                ..Default::default()
            },
        );
        let scheduler = build_scheduler(&config, open_store(&config).unwrap()).unwrap();
        assert!(!scheduler.job_names().contains(&"birdeye_token_transactions"));
        assert!(scheduler.job_names().contains(&"birdeye_trending"));
    }
}
