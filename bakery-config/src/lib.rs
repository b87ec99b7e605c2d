//! Typed settings for the bakery back office.
//!
//! Values are layered from built-in defaults, `<dir>/default.toml`,
//! `<dir>/<env>.toml` and finally `BAKERY__*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "BAKERY";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeryConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub recalc: RecalcConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file holding daily sales and the salesman directory.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/bakery.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    /// Enables a daily rolling log file in this directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            directory: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecalcConfig {
    /// Pending cascades the queue buffers before `enqueue` waits.
    pub queue_capacity: usize,
}

impl Default for RecalcConfig {
    fn default() -> Self {
        Self { queue_capacity: 64 }
    }
}

/// Load configuration for `env`, reading TOML files from `config_dir` when given.
pub fn load_config(config_dir: Option<&Path>, env: Option<&str>) -> Result<BakeryConfig> {
    let defaults =
        Config::try_from(&BakeryConfig::default()).context("failed to encode default settings")?;
    let mut builder = Config::builder().add_source(defaults);

    if let Some(dir) = config_dir {
        builder = builder.add_source(toml_file(dir, "default"));
        if let Some(env) = env.filter(|env| *env != "default") {
            builder = builder.add_source(toml_file(dir, env));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let settings = builder
        .build()
        .with_context(|| match config_dir {
            Some(dir) => format!("failed to read configuration from {}", dir.display()),
            None => "failed to read configuration".to_string(),
        })?;
    settings
        .try_deserialize()
        .context("invalid configuration values")
}

fn toml_file(dir: &Path, name: &str) -> File<config::FileSourceFile, FileFormat> {
    File::from(dir.join(format!("{name}.toml")))
        .format(FileFormat::Toml)
        .required(false)
}
