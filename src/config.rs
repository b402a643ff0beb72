//! Process-wide defaults, per-call request options, and the CLI config file.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
  APP_NAME, BASIC_HEADERS, DB_FILE, DEFAULT_CACHE_DURATION, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY,
  DEFAULT_TIMEOUT,
};
use crate::transport::ResponseType;

/// Defaults applied to every request issued through a [`crate::FetchClient`].
///
/// Supplied once when the client is built and never mutated afterwards.
/// Per-call [`RequestOptions`] take precedence field by field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigOptions {
  pub base_url: Option<String>,
  #[serde(default)]
  pub headers: BTreeMap<String, String>,
  pub token: Option<String>,
  #[serde(default, rename = "timeout_ms", deserialize_with = "deserialize_millis")]
  pub timeout: Option<Duration>,
  pub response_type: Option<ResponseType>,
}

/// Options for a single request. Unset fields fall back to [`ConfigOptions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
  pub base_url: Option<String>,
  pub headers: BTreeMap<String, String>,
  pub params: BTreeMap<String, String>,
  pub token: Option<String>,
  pub timeout: Option<Duration>,
  pub response_type: Option<ResponseType>,
}

impl RequestOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
    self.base_url = Some(base_url.into());
    self
  }

  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    set_header(&mut self.headers, name.into(), value.into());
    self
  }

  pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.params.insert(name.into(), value.into());
    self
  }

  pub fn token(mut self, token: impl Into<String>) -> Self {
    self.token = Some(token.into());
    self
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn response_type(mut self, response_type: ResponseType) -> Self {
    self.response_type = Some(response_type);
    self
  }
}

/// Fully merged options, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOptions {
  pub base_url: Option<String>,
  pub headers: BTreeMap<String, String>,
  pub params: BTreeMap<String, String>,
  pub token: Option<String>,
  pub timeout: Duration,
  pub response_type: ResponseType,
}

impl ConfigOptions {
  /// Merge per-call options over these defaults.
  ///
  /// Headers merge by name (case-insensitive): built-in JSON headers, then config
  /// headers, then call headers. Every other field is call value, else config value,
  /// else the system default.
  pub fn resolve(&self, call: &RequestOptions) -> ResolvedOptions {
    let mut headers = BTreeMap::new();
    for (name, value) in BASIC_HEADERS {
      set_header(&mut headers, (*name).to_string(), (*value).to_string());
    }
    for (name, value) in self.headers.iter().chain(call.headers.iter()) {
      set_header(&mut headers, name.clone(), value.clone());
    }

    ResolvedOptions {
      base_url: call.base_url.clone().or_else(|| self.base_url.clone()),
      headers,
      params: call.params.clone(),
      token: call.token.clone().or_else(|| self.token.clone()),
      timeout: call.timeout.or(self.timeout).unwrap_or(DEFAULT_TIMEOUT),
      response_type: call
        .response_type
        .or(self.response_type)
        .unwrap_or_default(),
    }
  }
}

/// Insert a header, replacing any existing entry whose name differs only in case.
fn set_header(headers: &mut BTreeMap<String, String>, name: String, value: String) {
  headers.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
  headers.insert(name, value);
}

fn deserialize_millis<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
  D: Deserializer<'de>,
{
  let v: Option<u64> = Option::deserialize(deserializer)?;
  Ok(v.map(Duration::from_millis))
}

/// Configuration file for the `hookfetch` binary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(flatten)]
  pub options: ConfigOptions,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  /// Database file (defaults to $XDG_DATA_HOME/hookfetch/cache.db)
  pub path: Option<PathBuf>,
  #[serde(default, rename = "duration_ms", deserialize_with = "deserialize_millis")]
  pub duration: Option<Duration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetryConfig {
  pub retries: Option<u32>,
  #[serde(default, rename = "delay_ms", deserialize_with = "deserialize_millis")]
  pub delay: Option<Duration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
  /// Default filter directive when HOOKFETCH_LOG / RUST_LOG are unset
  pub level: Option<String>,
  /// Write logs to `hookfetch.log` in this directory instead of stderr
  pub dir: Option<PathBuf>,
}

impl CacheConfig {
  pub fn duration(&self) -> Duration {
    self.duration.unwrap_or(DEFAULT_CACHE_DURATION)
  }

  /// Database path, falling back to the XDG data directory.
  pub fn db_path(&self) -> Result<PathBuf> {
    if let Some(path) = &self.path {
      return Ok(path.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join(APP_NAME).join(DB_FILE))
  }
}

impl RetryConfig {
  pub fn retries(&self) -> u32 {
    self.retries.unwrap_or(DEFAULT_RETRIES)
  }

  pub fn delay(&self) -> Duration {
    self.delay.unwrap_or(DEFAULT_RETRY_DELAY)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./hookfetch.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/hookfetch/config.yaml
  ///
  /// A missing file is an error; there is no silent default configuration.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        return Err(eyre!(
          "No configuration file found. Create one at ~/.config/hookfetch/config.yaml \
           or ./hookfetch.yaml"
        ))
      }
    };

    if config.options.token.is_none() {
      config.options.token = Self::token_from_env();
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("hookfetch.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join(APP_NAME).join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Bearer token from the HOOKFETCH_TOKEN environment variable.
  pub fn token_from_env() -> Option<String> {
    std::env::var("HOOKFETCH_TOKEN")
      .ok()
      .filter(|t| !t.is_empty())
  }
}
