//! Configuration Module
//!
//! Loads and validates configuration from TOML files, and holds the
//! catalogue of known jobs with their defaults.

pub mod jobs;
pub mod loader;

pub use jobs::{JobDefaults, JobKind, JobSection, JobSettings};
pub use loader::{
    Config, ConfigError, load_config, ENV_BIRDEYE_API_KEY, ENV_DATABASE_PATH, IN_MEMORY_PATH,
};
