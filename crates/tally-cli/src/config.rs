//! CLI settings: flags (and their `TALLY_*` env fallbacks) override the
//! optional TOML file, which overrides defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tally_sync::SchedulerConfig;

pub const DEFAULT_URL: &str = "http://localhost:8080";
pub const DEFAULT_STORE: &str = "~/.local/share/tally/local.db";

/// Shape of the optional TOML config file.
///
/// ```toml
/// url   = "http://scores.example:8080"
/// actor = "judge-9"
/// store = "~/.local/share/tally/local.db"
///
/// [sync]
/// debounce_ms       = 1000
/// retry_interval_ms = 1000
/// probe_interval_ms = 5000
/// ```
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
  #[serde(default)]
  pub url:   String,
  #[serde(default)]
  pub actor: String,
  pub store: Option<PathBuf>,
  #[serde(default)]
  pub sync:  SchedulerConfig,
}

impl ConfigFile {
  pub fn load(path: &Path) -> Result<Self> {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")
  }
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Settings {
  pub url:        String,
  pub actor:      Option<String>,
  pub store_path: PathBuf,
  pub sync:       SchedulerConfig,
}

impl Settings {
  pub fn resolve(
    url: Option<String>,
    actor: Option<String>,
    store: Option<PathBuf>,
    file: ConfigFile,
  ) -> Self {
    Self {
      url:        url
        .or_else(|| (!file.url.is_empty()).then(|| file.url.clone()))
        .unwrap_or_else(|| DEFAULT_URL.to_string()),
      actor:      actor.or_else(|| (!file.actor.is_empty()).then(|| file.actor.clone())),
      store_path: expand_tilde(
        &store.or(file.store).unwrap_or_else(|| PathBuf::from(DEFAULT_STORE)),
      ),
      sync:       file.sync,
    }
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
