use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: EndpointConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

/// Transport configuration. Stored in the store's `endpoint` slot and passed
/// to the transport on every request; the core never changes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
  /// Base URL that relative endpoints are resolved against
  #[serde(default, alias = "base_url", skip_serializing_if = "Option::is_none")]
  pub base_url: Option<String>,
  /// Extra request headers. `Accept` and `Content-Type` are always
  /// overridden with the JSON:API media type.
  #[serde(default)]
  pub headers: BTreeMap<String, String>,
  /// Per-request timeout in seconds
  #[serde(default, alias = "timeout_secs", skip_serializing_if = "Option::is_none")]
  pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Persist store snapshots between runs
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Snapshot database location (defaults to the user data directory)
  pub path: Option<PathBuf>,
  /// Ignore snapshots older than this many seconds
  pub max_age_secs: Option<u64>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
      max_age_secs: None,
    }
  }
}

fn default_true() -> bool {
  true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
  /// Default filter directive, e.g. "info" or "jsonapi_store=debug"
  pub level: Option<String>,
  #[serde(default)]
  pub file: FileLoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileLoggingConfig {
  #[serde(default)]
  pub enabled: bool,
  /// Log directory (defaults to the user data directory)
  pub directory: Option<PathBuf>,
  #[serde(default)]
  pub rotation: LogRotation,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
  #[default]
  Daily,
  Hourly,
  Never,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./jsonapi-store.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/jsonapi-store/config.yaml
  ///
  /// With no explicit path and no file found, the defaults are used.
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
    let local = PathBuf::from("jsonapi-store.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("jsonapi-store").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  pub fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Directory for application data (snapshot database, log files).
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("jsonapi-store"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn parses_full_config() {
    let config = Config::parse(
      r#"
api:
  base_url: https://api.example.test/v1
  headers:
    Authorization: Bearer abc
  timeout_secs: 10
cache:
  enabled: false
  max_age_secs: 3600
logging:
  level: debug
  file:
    enabled: true
    rotation: hourly
"#,
    )
    .unwrap();

    assert_eq!(config.api.base_url.as_deref(), Some("https://api.example.test/v1"));
    assert_eq!(config.api.headers["Authorization"], "Bearer abc");
    assert_eq!(config.api.timeout_secs, Some(10));
    assert!(!config.cache.enabled);
    assert_eq!(config.cache.max_age_secs, Some(3600));
    assert_eq!(config.logging.level.as_deref(), Some("debug"));
    assert_eq!(config.logging.file.rotation, LogRotation::Hourly);
  }

  #[test]
  fn empty_config_uses_defaults() {
    let config = Config::parse("{}").unwrap();

    assert_eq!(config.api, EndpointConfig::default());
    assert!(config.cache.enabled);
    assert!(!config.logging.file.enabled);
  }

  #[test]
  fn explicit_missing_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Config::load(Some(&dir.path().join("nope.yaml"))).is_err());
  }

  #[test]
  fn loads_explicit_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "api:\n  baseUrl: http://localhost:8080").unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.api.base_url.as_deref(), Some("http://localhost:8080"));
  }
}
