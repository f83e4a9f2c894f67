//! # SKINFORGE
//!
//! Application shell around [`skinforge_economy`]: loads the application
//! config, installs the log subscriber and builds the [`Economy`].
//!
//! ```text
//!  skinforge.toml ──► AppConfig ◄── SKINFORGE_* env
//!                        │
//!        ┌───────────────┼──────────────────┐
//!        ▼               ▼                  ▼
//!  init_logging   economy.toml +      wal_path / seed
//!                 catalog.toml
//!                        │
//!                        ▼
//!                  bootstrap() ──► Economy
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub use skinforge_economy as economy;

use serde::{Deserialize, Serialize};
use skinforge_economy::{
    Catalog, Clock, Economy, EconomyConfig, EconomyError, SeededSource, SharedRandom, SystemClock,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a log filter directive.
pub const LOG_ENV: &str = "SKINFORGE_LOG";

/// Environment variable naming the application config file.
pub const CONFIG_ENV: &str = "SKINFORGE_CONFIG";

/// Errors raised while starting the application.
#[derive(Debug, Error)]
pub enum AppError {
    /// Application config unreadable or invalid.
    #[error("Invalid application config: {0}")]
    Config(String),

    /// Log subscriber could not be installed.
    #[error("Logging setup failed: {0}")]
    Logging(String),

    /// Engine failed to load or open.
    #[error(transparent)]
    Economy(#[from] EconomyError),
}

/// Result alias for the application shell.
pub type AppResult<T> = Result<T, AppError>;

/// Application configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Economy rules file.
    pub economy_path: PathBuf,
    /// Catalog file.
    pub catalog_path: PathBuf,
    /// Write-ahead log. In-memory store when absent.
    pub wal_path: Option<PathBuf>,
    /// Fixed RNG seed. OS entropy when absent.
    pub seed: Option<u64>,
    /// Default log directive, used when `SKINFORGE_LOG` is unset.
    pub log: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            economy_path: PathBuf::from("data/economy.toml"),
            catalog_path: PathBuf::from("data/catalog.toml"),
            wal_path: None,
            seed: None,
            log: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Parses a TOML document. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// `Config` on parse failure.
    pub fn from_toml_str(text: &str) -> AppResult<Self> {
        toml::from_str(text).map_err(|e| AppError::Config(e.to_string()))
    }

    /// Reads a TOML file.
    ///
    /// # Errors
    ///
    /// `Config` if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Layers the file named by `SKINFORGE_CONFIG` (if any) and then the
    /// `SKINFORGE_*` variables over the defaults.
    ///
    /// # Errors
    ///
    /// `Config` on an unreadable file or a malformed override.
    pub fn load() -> AppResult<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// [`Self::load`] with an explicit variable lookup.
    ///
    /// # Errors
    ///
    /// `Config` on an unreadable file or a malformed override.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let mut config = match lookup(CONFIG_ENV) {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Applies `SKINFORGE_ECONOMY`, `SKINFORGE_CATALOG`, `SKINFORGE_WAL`,
    /// `SKINFORGE_SEED` and `SKINFORGE_LOG_DEFAULT`.
    ///
    /// An empty `SKINFORGE_WAL` or `SKINFORGE_SEED` clears the setting.
    ///
    /// # Errors
    ///
    /// `Config` if `SKINFORGE_SEED` is not an integer.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> AppResult<()> {
        if let Some(path) = lookup("SKINFORGE_ECONOMY") {
            self.economy_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("SKINFORGE_CATALOG") {
            self.catalog_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("SKINFORGE_WAL") {
            self.wal_path = (!path.is_empty()).then(|| PathBuf::from(path));
        }
        if let Some(seed) = lookup("SKINFORGE_SEED") {
            self.seed = if seed.is_empty() {
                None
            } else {
                Some(seed.trim().parse().map_err(|_| {
                    AppError::Config(format!("SKINFORGE_SEED must be an integer, got {seed:?}"))
                })?)
            };
        }
        if let Some(directive) = lookup("SKINFORGE_LOG_DEFAULT") {
            self.log = directive;
        }
        Ok(())
    }
}

/// Installs the global `fmt` subscriber, writing to stderr.
///
/// `SKINFORGE_LOG` wins over `default_directive`.
///
/// # Errors
///
/// `Logging` if the directive is invalid or a subscriber is already set.
pub fn init_logging(default_directive: &str) -> AppResult<()> {
    let filter = match EnvFilter::try_from_env(LOG_ENV) {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)
            .map_err(|e| AppError::Logging(format!("bad directive {default_directive:?}: {e}")))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))
}

/// Loads the economy rules and catalog and opens the engine.
///
/// # Errors
///
/// `Economy` if a data file is invalid or the log cannot be opened.
pub fn bootstrap(config: &AppConfig) -> AppResult<Economy> {
    bootstrap_with_clock(config, Arc::new(SystemClock))
}

/// [`bootstrap`] with an explicit clock.
///
/// # Errors
///
/// See [`bootstrap`].
pub fn bootstrap_with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> AppResult<Economy> {
    let rules = EconomyConfig::from_path(&config.economy_path)?;
    let catalog = Catalog::from_path(&config.catalog_path, &rules.catalog)?;
    let random = SharedRandom::new(match config.seed {
        Some(seed) => SeededSource::from_seed(seed),
        None => SeededSource::from_entropy(),
    });

    let economy = match &config.wal_path {
        Some(path) => Economy::open(path, rules, catalog, clock, random)?,
        None => Economy::in_memory(rules, catalog, clock, random)?,
    };
    info!(
        economy = %config.economy_path.display(),
        catalog = %config.catalog_path.display(),
        durable = config.wal_path.is_some(),
        seeded = config.seed.is_some(),
        "bootstrap complete"
    );
    Ok(economy)
}
