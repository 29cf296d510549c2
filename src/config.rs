use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

const ENV_PREFIX: &str = "COUNTRY_STATS";
const CONFIG_FILE: &str = "country_stats";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DbConfig,
    pub source: SourceConfig,
    pub api: ApiConfig,
    /// Flat file holding one entity name per line.
    pub entity_list: PathBuf,
}

/// Connection parameters shared by the persistence adapter and the query facade.
#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub path: PathBuf,
    pub busy_timeout_secs: u64,
}

impl DbConfig {
    #[cfg(test)]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            path: path.into(),
            busy_timeout_secs: 10,
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Documents are addressed as `<base_url>/<Entity_Name>`.
    pub base_url: String,
    pub borders_url: String,
    pub codes_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub bind: String,
    /// Base URL the `query` client talks to.
    pub url: String,
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    let builder = Config::builder()
        .set_default("entity_list", "data/countries.txt")?
        .set_default("database.path", "data/countries.sqlite")?
        .set_default("database.busy_timeout_secs", 10_i64)?
        .set_default("source.base_url", "https://en.wikipedia.org/wiki")?
        .set_default(
            "source.borders_url",
            "https://en.wikipedia.org/wiki/List_of_countries_and_territories_by_number_of_land_borders",
        )?
        .set_default(
            "source.codes_url",
            "https://en.wikipedia.org/wiki/List_of_ISO_3166_country_codes",
        )?
        .set_default(
            "source.user_agent",
            concat!("country_stats/", env!("CARGO_PKG_VERSION")),
        )?
        .set_default("source.timeout_secs", 30_i64)?
        .set_default("api.bind", "127.0.0.1:5000")?
        .set_default("api.url", "http://127.0.0.1:5000")?;
    Ok(builder)
}

/// Defaults, then `country_stats.toml` if present, then `COUNTRY_STATS_*` env vars
/// (`__` separates nested keys, e.g. `COUNTRY_STATS_DATABASE__PATH`).
pub fn load() -> Result<Settings> {
    defaults()?
        .add_source(File::with_name(CONFIG_FILE).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .context("Failed to build configuration")?
        .try_deserialize()
        .context("Invalid configuration")
}
