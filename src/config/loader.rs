//! Configuration Loader
//!
//! Loads and validates configuration from a TOML file. Every section is
//! optional; absent values take the defaults below. Secrets can come from
//! the environment (`BIRDEYE_API_KEY`, `HARVESTER_DATABASE_PATH`), which is
//! also where a `.env` file is loaded into by the CLI.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::jobs::{JobKind, JobSection, JobSettings};
use crate::adapters::birdeye::BirdeyeConfig;
use crate::adapters::dexscreener::DexscreenerConfig;
use crate::adapters::http::RetryPolicy;
use crate::application::{FirstCycle, SchedulerConfig};
use crate::domain::{EntityId, EntityRef};

/// Environment variable overriding `[birdeye] api_key`
pub const ENV_BIRDEYE_API_KEY: &str = "BIRDEYE_API_KEY";
/// Environment variable overriding `[database] path`
pub const ENV_DATABASE_PATH: &str = "HARVESTER_DATABASE_PATH";

/// Database path that selects a throwaway in-memory store
pub const IN_MEMORY_PATH: &str = ":memory:";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub birdeye: BirdeyeSection,
    #[serde(default)]
    pub dexscreener: DexscreenerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub tracking: TrackingSection,
    /// Per-job overrides keyed by job name
    #[serde(default)]
    pub jobs: BTreeMap<String, JobSection>,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Scheduler configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// "immediate" polls at startup, "after_interval" waits one interval
    pub first_cycle: FirstCycle,
    /// Upper bound on dependent tasks running at once
    pub max_concurrent_tasks: usize,
    pub shutdown_grace_secs: u64,
    /// 0 disables the periodic stats line
    pub stats_interval_secs: u64,
    /// Forget discovered entities after this many hours; unset keeps them
    pub registry_retention_hours: Option<u64>,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            first_cycle: FirstCycle::Immediate,
            max_concurrent_tasks: 8,
            shutdown_grace_secs: 10,
            stats_interval_secs: 300,
            registry_retention_hours: None,
        }
    }
}

/// HTTP client settings shared by every provider
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    pub timeout_secs: u64,
    /// Total attempts per call, including the first
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_attempts: 3,
            backoff_base_ms: 2_000,
            backoff_max_ms: 10_000,
        }
    }
}

/// Birdeye API configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BirdeyeSection {
    pub api_url: String,
    /// Usually supplied through BIRDEYE_API_KEY instead
    pub api_key: String,
    pub chain: String,
    pub rate_limit_rpm: u32,
    /// Pause between consecutive pages of one cycle
    pub page_delay_ms: u64,
    pub meme_platform_enabled: bool,
}

impl Default for BirdeyeSection {
    fn default() -> Self {
        let defaults = BirdeyeConfig::default();
        Self {
            api_url: defaults.api_url,
            api_key: String::new(),
            chain: defaults.chain,
            rate_limit_rpm: defaults.rate_limit_rpm,
            page_delay_ms: 250,
            meme_platform_enabled: false,
        }
    }
}

/// Dexscreener API configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DexscreenerSection {
    pub api_url: String,
    pub rate_limit_rpm: u32,
}

impl Default for DexscreenerSection {
    fn default() -> Self {
        let defaults = DexscreenerConfig::default();
        Self {
            api_url: defaults.api_url,
            rate_limit_rpm: defaults.rate_limit_rpm,
        }
    }
}

/// Database configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// SQLite file; `~` is expanded, ":memory:" keeps everything in RAM
    pub path: String,
    /// Keep raw boosts and new-listing responses in `raw_api_responses`
    pub archive_raw_responses: bool,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: "data/harvester.db".to_string(),
            archive_raw_responses: true,
        }
    }
}

impl DatabaseSection {
    pub fn is_in_memory(&self) -> bool {
        self.path == IN_MEMORY_PATH
    }

    /// Path with `~` expanded
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).into_owned())
    }
}

/// Entities tracked from startup and enrichment of discovered ones
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackingSection {
    pub tokens: Vec<String>,
    pub wallets: Vec<String>,
    pub fetch_security_for_new_tokens: bool,
    pub fetch_overview_for_new_tokens: bool,
    pub fetch_portfolio_for_new_wallets: bool,
    /// Pause between entities within one tracked-entity cycle
    pub entity_delay_ms: u64,
}

impl Default for TrackingSection {
    fn default() -> Self {
        Self {
            tokens: Vec::new(),
            wallets: Vec::new(),
            fetch_security_for_new_tokens: true,
            fetch_overview_for_new_tokens: true,
            fetch_portfolio_for_new_wallets: true,
            entity_delay_ms: 500,
        }
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file, apply env overrides and validate
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

fn invalid(message: String) -> ConfigError {
    ConfigError::ValidationError(message)
}

impl Config {
    /// Override secrets and paths from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Override from any lookup; empty values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(key) = lookup(ENV_BIRDEYE_API_KEY) {
            self.birdeye.api_key = key;
        }
        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            self.database.path = path;
        }
    }

    /// Resolved settings of one job
    pub fn job(&self, kind: JobKind) -> JobSettings {
        JobSettings::resolve(kind, self.jobs.get(kind.name()))
    }

    /// Resolved settings of every known job, enabled or not
    pub fn job_settings(&self) -> Vec<JobSettings> {
        JobKind::ALL.into_iter().map(|kind| self.job(kind)).collect()
    }

    /// Configured tokens and wallets as registry entries
    pub fn seeds(&self) -> Result<Vec<EntityRef>, ConfigError> {
        let parse = |raw: &String| {
            EntityId::parse_solana(raw).map_err(|e| invalid(format!("tracked entity: {}", e)))
        };

        let mut seeds = Vec::with_capacity(self.tracking.tokens.len() + self.tracking.wallets.len());
        for raw in &self.tracking.tokens {
            seeds.push(EntityRef::token(parse(raw)?));
        }
        for raw in &self.tracking.wallets {
            seeds.push(EntityRef::wallet(parse(raw)?));
        }
        Ok(seeds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.http.max_attempts,
            base_delay: Duration::from_millis(self.http.backoff_base_ms),
            max_delay: Duration::from_millis(self.http.backoff_max_ms),
        }
    }

    pub fn birdeye_config(&self) -> BirdeyeConfig {
        BirdeyeConfig {
            api_url: self.birdeye.api_url.clone(),
            api_key: self.birdeye.api_key.clone(),
            chain: self.birdeye.chain.clone(),
            timeout: Duration::from_secs(self.http.timeout_secs),
            retry: self.retry_policy(),
            rate_limit_rpm: self.birdeye.rate_limit_rpm,
            meme_platform_enabled: self.birdeye.meme_platform_enabled,
        }
    }

    pub fn dexscreener_config(&self) -> DexscreenerConfig {
        DexscreenerConfig {
            api_url: self.dexscreener.api_url.clone(),
            timeout: Duration::from_secs(self.http.timeout_secs),
            retry: self.retry_policy(),
            rate_limit_rpm: self.dexscreener.rate_limit_rpm,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            first_cycle: self.scheduler.first_cycle,
            max_concurrent_tasks: self.scheduler.max_concurrent_tasks,
            shutdown_grace: Duration::from_secs(self.scheduler.shutdown_grace_secs),
            stats_interval: Duration::from_secs(self.scheduler.stats_interval_secs),
            registry_retention: self
                .scheduler
                .registry_retention_hours
                .map(|hours| Duration::from_secs(hours.saturating_mul(3600))),
        }
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.max_concurrent_tasks == 0 {
            return Err(invalid("max_concurrent_tasks must be > 0".to_string()));
        }

        if self.http.max_attempts == 0 {
            return Err(invalid("max_attempts must be > 0".to_string()));
        }

        if self.http.timeout_secs == 0 {
            return Err(invalid("timeout_secs must be > 0".to_string()));
        }

        if self.http.backoff_base_ms > self.http.backoff_max_ms {
            return Err(invalid(format!(
                "backoff_base_ms ({}) must not exceed backoff_max_ms ({})",
                self.http.backoff_base_ms, self.http.backoff_max_ms
            )));
        }

        if self.scheduler.registry_retention_hours == Some(0) {
            return Err(invalid("registry_retention_hours must be > 0 when set".to_string()));
        }

        for name in self.jobs.keys() {
            if JobKind::from_name(name).is_none() {
                return Err(invalid(format!("unknown job '{}'", name)));
            }
        }

        let enabled: Vec<JobSettings> = self
            .job_settings()
            .into_iter()
            .filter(|job| job.enabled)
            .collect();

        if enabled.is_empty() {
            return Err(invalid("no jobs enabled".to_string()));
        }

        for job in &enabled {
            if job.interval_secs == 0 {
                return Err(invalid(format!("{}: interval_secs must be > 0", job.kind)));
            }
            if job.page_size == 0 {
                return Err(invalid(format!("{}: page_size must be > 0", job.kind)));
            }
            if job.max_pages == 0 {
                return Err(invalid(format!("{}: max_pages must be > 0", job.kind)));
            }
            if let Some(cap) = job.kind.defaults().max_page_size {
                if job.page_size > cap {
                    return Err(invalid(format!(
                        "{}: page_size {} exceeds provider maximum {}",
                        job.kind, job.page_size, cap
                    )));
                }
            }
        }

        if enabled.iter().any(|job| job.kind.uses_birdeye()) {
            if self.birdeye.api_url.trim().is_empty() {
                return Err(invalid("birdeye api_url must not be empty".to_string()));
            }
            if self.birdeye.api_key.trim().is_empty() {
                return Err(invalid(format!(
                    "birdeye api_key is empty; set it in the config or {}",
                    ENV_BIRDEYE_API_KEY
                )));
            }
        }

        if enabled.iter().any(|job| job.kind == JobKind::TopBoosts)
            && self.dexscreener.api_url.trim().is_empty()
        {
            return Err(invalid("dexscreener api_url must not be empty".to_string()));
        }

        if self.database.path.trim().is_empty() {
            return Err(invalid("database path must not be empty".to_string()));
        }

        self.seeds()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_valid_config() -> String {
        r#"
[scheduler]
first_cycle = "after_interval"
max_concurrent_tasks = 4

[birdeye]
api_key = "test-key"

[database]
path = ":memory:"

[tracking]
tokens = ["So11111111111111111111111111111111111111112"]

[jobs.birdeye_trending]
interval_secs = 1800
max_pages = 3

[jobs.birdeye_wallet_portfolio]
enabled = false

[logging]
level = "debug"
"#
        .to_string()
    }

    fn write(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let file = write(&create_valid_config());
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.scheduler.first_cycle, FirstCycle::AfterInterval);
        assert_eq!(config.scheduler.max_concurrent_tasks, 4);
        assert!(config.database.is_in_memory());
        assert!(config.database.archive_raw_responses);
        assert_eq!(config.logging.level, "debug");

        let trending = config.job(JobKind::Trending);
        assert_eq!(trending.interval_secs, 1800);
        assert_eq!(trending.max_pages, 3);
        assert_eq!(trending.page_size, 20);
        assert!(!config.job(JobKind::WalletPortfolio).enabled);
        assert_eq!(config.job(JobKind::TopBoosts).interval_secs, 6);
    }

    #[test]
    fn test_huge_retention_saturates() {
        let mut config = Config::default();
        config.scheduler.registry_retention_hours = Some(u64::MAX);
        assert_eq!(
            config.scheduler_config().registry_retention,
            Some(Duration::from_secs(u64::MAX))
        );

        config.scheduler.registry_retention_hours = Some(48);
        assert_eq!(
            config.scheduler_config().registry_retention,
            Some(Duration::from_secs(48 * 3600))
        );
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config("/nonexistent/harvester.toml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let file = write("[scheduler\nmax_concurrent_tasks = ");
        assert!(matches!(load_config(file.path()), Err(ConfigError::ParseError(_))));
    }

    fn validation_fails(extra: &str) {
        let file = write(&format!("{}\n{}", create_valid_config(), extra));
        let result = load_config(file.path());
        assert!(
            matches!(result, Err(ConfigError::ValidationError(_))),
            "expected validation error for {:?}",
            extra
        );
    }

    #[test]
    fn test_zero_interval_rejected() {
        validation_fails("[jobs.birdeye_new_listings]\ninterval_secs = 0");
    }

    #[test]
    fn test_zero_page_size_and_pages_rejected() {
        validation_fails("[jobs.birdeye_top_traders]\npage_size = 0");
        validation_fails("[jobs.birdeye_token_transactions]\nmax_pages = 0");
    }

    #[test]
    fn test_page_size_above_provider_cap_rejected() {
        validation_fails("[jobs.birdeye_top_traders]\npage_size = 50");
    }

    #[test]
    fn test_unknown_job_rejected() {
        validation_fails("[jobs.gmgn_monitor]\nenabled = true");
    }

    #[test]
    fn test_disabled_job_is_not_validated() {
        let file = write(&format!(
            "{}\n[jobs.birdeye_token_security]\nenabled = false\ninterval_secs = 0",
            create_valid_config()
        ));
        assert!(load_config(file.path()).is_ok());
    }

    #[test]
    fn test_invalid_tracked_token_rejected() {
        let mut config: Config = toml::from_str(&create_valid_config()).unwrap();
        config.tracking.wallets.push("not-a-wallet".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config: Config = toml::from_str(&create_valid_config()).unwrap();
        config.scheduler.max_concurrent_tasks = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_api_key_rejected_unless_birdeye_disabled() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        for kind in JobKind::ALL.into_iter().filter(|k| k.uses_birdeye()) {
            config.jobs.insert(
                kind.name().to_string(),
                JobSection {
                    enabled: Some(false),
                    ..Default::default()
                },
            );
        }
        config.validate().unwrap();
    }

    #[test]
    fn test_overrides_replace_key_and_path() {
        let mut config = Config::default();
        config.apply_overrides(|name| match name {
            ENV_BIRDEYE_API_KEY => Some("from-env".to_string()),
            ENV_DATABASE_PATH => Some("/tmp/h.db".to_string()),
            _ => None,
        });
        assert_eq!(config.birdeye.api_key, "from-env");
        assert_eq!(config.database.path, "/tmp/h.db");

        config.apply_overrides(|_| Some("  ".to_string()));
        assert_eq!(config.birdeye.api_key, "from-env");
    }

    #[test]
    fn test_sections_convert_to_runtime_configs() {
        let config: Config = toml::from_str(&create_valid_config()).unwrap();

        let retry = config.retry_policy();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.base_delay, Duration::from_secs(2));

        let birdeye = config.birdeye_config();
        assert_eq!(birdeye.api_key, "test-key");
        assert_eq!(birdeye.api_url, "https://public-api.birdeye.so");

        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.max_concurrent_tasks, 4);
        assert_eq!(scheduler.registry_retention, None);

        assert_eq!(config.seeds().unwrap().len(), 1);
    }
}
