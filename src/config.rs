use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::DEFAULT_CACHE_PERIOD_HOURS;
use crate::parts::DEFAULT_PROBE_QUERY;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub endpoints: EndpointsConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub exchange: ExchangeConfig,
  /// Per-request timeout in seconds
  #[serde(default = "default_request_timeout_secs")]
  pub request_timeout_secs: u64,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      endpoints: EndpointsConfig::default(),
      cache: CacheConfig::default(),
      exchange: ExchangeConfig::default(),
      request_timeout_secs: default_request_timeout_secs(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointsConfig {
  /// Search-by-code API; the part code is sent as `componentCode`
  #[serde(default = "default_part_detail_url")]
  pub part_detail: Url,
  /// Search-by-query API; the query is sent as form field `search_content`
  #[serde(default = "default_search_url")]
  pub search: Url,
  /// Page the search API's CSRF token is scraped from
  #[serde(default = "default_csrf_source_url")]
  pub csrf_source: Url,
}

impl Default for EndpointsConfig {
  fn default() -> Self {
    Self {
      part_detail: default_part_detail_url(),
      search: default_search_url(),
      csrf_source: default_csrf_source_url(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// How long a cached part or exchange rate stays valid
  #[serde(default = "default_period_hours")]
  pub period_hours: i64,
  /// How often dirty caches are written to the store
  #[serde(default = "default_flush_interval_ms")]
  pub flush_interval_ms: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      period_hours: default_period_hours(),
      flush_interval_ms: default_flush_interval_ms(),
    }
  }
}

impl CacheConfig {
  /// Expiry window. Out-of-range values fall back to the default.
  pub fn period(&self) -> chrono::Duration {
    chrono::Duration::try_hours(self.period_hours)
      .unwrap_or_else(|| chrono::Duration::hours(DEFAULT_CACHE_PERIOD_HOURS))
  }

  pub fn flush_interval(&self) -> Duration {
    Duration::from_millis(self.flush_interval_ms)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
  /// Currency to convert into when no page reports one
  pub currency: Option<String>,
  #[serde(default = "default_probe_query")]
  pub probe_query: String,
}

impl Default for ExchangeConfig {
  fn default() -> Self {
    Self {
      currency: None,
      probe_query: default_probe_query(),
    }
  }
}

fn default_part_detail_url() -> Url {
  Url::parse("https://jlcpcb.com/shoppingCart/smtGood/getComponentDetail")
    .expect("default part detail URL is valid")
}

fn default_search_url() -> Url {
  Url::parse("https://lcsc.com/api/products/search").expect("default search URL is valid")
}

fn default_csrf_source_url() -> Url {
  Url::parse("https://lcsc.com/products/").expect("default CSRF source URL is valid")
}

fn default_period_hours() -> i64 {
  DEFAULT_CACHE_PERIOD_HOURS
}

fn default_flush_interval_ms() -> u64 {
  1000
}

fn default_probe_query() -> String {
  DEFAULT_PROBE_QUERY.to_string()
}

fn default_request_timeout_secs() -> u64 {
  30
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./jlcstock.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/jlcstock/config.yaml
  ///
  /// Without any file, the defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("jlcstock.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("jlcstock").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.cache.period_hours <= 0 {
      return Err(eyre!("cache.period_hours must be positive"));
    }
    if chrono::Duration::try_hours(self.cache.period_hours).is_none() {
      return Err(eyre!(
        "cache.period_hours is too large: {}",
        self.cache.period_hours
      ));
    }
    if self.cache.flush_interval_ms == 0 {
      return Err(eyre!("cache.flush_interval_ms must be positive"));
    }
    Ok(())
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }
}
