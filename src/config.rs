//! Configuration: a defaults file under the user config directory plus
//! environment fallbacks, so the tool runs unattended (Cloud Run, cron)
//! without command-line flags.

use anyhow::Context;
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_LOOKBACK_DAYS: u32 = 1;

pub const ENV_PARENT_ID: &str = "PARENT_ID";
pub const ENV_DEST_TABLE: &str = "DEST_TABLE";
pub const ENV_CONCURRENCY: &str = "CONCURRENCY";
pub const ENV_LOOKBACK: &str = "LOOKBACK";

/// Defaults file contents; every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Projects always included in sweeps, even when discovery misses them
    pub fallback_projects: Vec<String>,
    /// Default parent scope (`organizations/N` or `folders/N`)
    pub parent_id: Option<String>,
    /// Central table receiving inventory rows, as `project.dataset.table`
    pub inventory_table: Option<String>,
}

impl Config {
    /// `~/.config/bqsweep/config.json` (platform equivalent)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("bqsweep").join("config.json"))
    }

    /// Load the defaults file; a missing file is just an empty config.
    pub fn load() -> anyhow::Result<Self> {
        match Self::path() {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                let config = serde_json::from_str(&raw)
                    .with_context(|| format!("parsing {}", path.display()))?;
                Ok(config)
            }
            _ => Ok(Self::default()),
        }
    }
}

/// CLI flag wins, then the environment, then the defaults file.
pub fn resolve<T>(cli: Option<T>, env: Option<T>, file: Option<T>) -> Option<T> {
    cli.or(env).or(file)
}

/// CLI flag wins, then the environment, then the built-in default.
pub fn resolve_or<T>(cli: Option<T>, env: Option<T>, default: T) -> T {
    cli.or(env).unwrap_or(default)
}

/// Non-empty environment variable
pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Environment variable parsed into `T`; unparseable values read as unset
pub fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env_string(name).and_then(|value| value.parse().ok())
}
