//! Tracing subscriber setup.

use color_eyre::{eyre::eyre, Result};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, LogRotation, LoggingConfig};

const LOG_ENV_VAR: &str = "JSONAPI_STORE_LOG";
const LOG_FILE_PREFIX: &str = "jsonapi-store.log";

/// Keeps the file writer flushing until dropped.
pub struct LogGuard {
  _file: Option<WorkerGuard>,
}

fn level_from_verbosity(verbosity: u8) -> LevelFilter {
  match verbosity {
    0 => LevelFilter::WARN,
    1 => LevelFilter::INFO,
    2 => LevelFilter::DEBUG,
    _ => LevelFilter::TRACE,
  }
}

fn rotation(rotation: LogRotation) -> Rotation {
  match rotation {
    LogRotation::Daily => Rotation::DAILY,
    LogRotation::Hourly => Rotation::HOURLY,
    LogRotation::Never => Rotation::NEVER,
  }
}

/// Filter directives: `JSONAPI_STORE_LOG` wins over the configured level.
/// Empty when neither is set.
fn directives(from_env: Option<String>, config: &LoggingConfig) -> String {
  from_env
    .filter(|value| !value.trim().is_empty())
    .or_else(|| config.level.clone())
    .unwrap_or_default()
}

/// Build the filter from explicit directives, falling back to the `-v` count.
fn env_filter(config: &LoggingConfig, verbosity: u8) -> EnvFilter {
  EnvFilter::builder()
    .with_default_directive(level_from_verbosity(verbosity).into())
    .parse_lossy(directives(std::env::var(LOG_ENV_VAR).ok(), config))
}

/// Install the global subscriber: stderr always, plus a rolling file when
/// enabled in the config.
pub fn init(config: &LoggingConfig, verbosity: u8) -> Result<LogGuard> {
  let filter = env_filter(config, verbosity);

  let stderr_layer = tracing_subscriber::fmt::layer()
    .with_target(false)
    .with_writer(std::io::stderr);

  let (file_layer, guard) = if config.file.enabled {
    let dir = match &config.file.directory {
      Some(dir) => dir.clone(),
      None => Config::data_dir()?.join("logs"),
    };
    std::fs::create_dir_all(&dir)
      .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

    let appender = RollingFileAppender::new(rotation(config.file.rotation), &dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = tracing_subscriber::fmt::layer()
      .with_ansi(false)
      .with_writer(writer);
    (Some(layer), Some(guard))
  } else {
    (None, None)
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(stderr_layer)
    .with(file_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(LogGuard { _file: guard })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn verbosity_maps_to_levels() {
    assert_eq!(level_from_verbosity(0), LevelFilter::WARN);
    assert_eq!(level_from_verbosity(2), LevelFilter::DEBUG);
    assert_eq!(level_from_verbosity(9), LevelFilter::TRACE);
  }

  #[test]
  fn env_var_wins_over_configured_level() {
    let config = LoggingConfig {
      level: Some("info".into()),
      ..Default::default()
    };

    assert_eq!(directives(Some("jsonapi_store=trace".into()), &config), "jsonapi_store=trace");
    assert_eq!(directives(None, &config), "info");
    assert_eq!(directives(Some("  ".into()), &config), "info");
    assert_eq!(directives(None, &LoggingConfig::default()), "");
  }

  #[test]
  fn verbosity_applies_without_directives() {
    let filter = EnvFilter::builder()
      .with_default_directive(level_from_verbosity(2).into())
      .parse_lossy(directives(None, &LoggingConfig::default()));

    assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
  }
}
