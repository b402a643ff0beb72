//! Tracing subscriber setup for the binary.

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

const DEFAULT_LEVEL: &str = "warn";

/// Install the global subscriber.
///
/// The filter comes from HOOKFETCH_LOG, then RUST_LOG, then `log.level`. Output goes
/// to `<log.dir>/hookfetch.log` when a directory is configured, stderr otherwise.
/// Keep the returned guard alive until exit so buffered file output is flushed.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
  let filter = std::env::var("HOOKFETCH_LOG")
    .ok()
    .map(EnvFilter::new)
    .unwrap_or_else(|| {
      EnvFilter::builder()
        .with_default_directive(
          config
            .level
            .as_deref()
            .unwrap_or(DEFAULT_LEVEL)
            .parse()
            .unwrap_or_else(|_| LevelFilter::WARN.into()),
        )
        .from_env_lossy()
    });

  match &config.dir {
    Some(dir) => {
      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
      let appender = tracing_appender::rolling::never(dir, "hookfetch.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);

      tracing_subscriber::registry()
        .with(filter)
        .with(
          tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false),
        )
        .try_init()
        .map_err(|e| eyre!("Failed to install logger: {}", e))?;

      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| eyre!("Failed to install logger: {}", e))?;

      Ok(None)
    }
  }
}
