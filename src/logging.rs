//! tracing subscriber setup.

use crate::config::{default_log_dir, LogConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// ログ初期化
///
/// `RUST_LOG` takes precedence over the configured level. When file logging
/// is enabled the returned guard must be held until exit so buffered lines
/// are flushed.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .or_else(|_| EnvFilter::try_new("info"))?;

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let (file_layer, guard) = if config.enable_file_logging {
        let log_dir = match &config.log_dir {
            Some(dir) => dir.clone(),
            None => default_log_dir()?,
        };
        std::fs::create_dir_all(&log_dir)?;

        let appender = tracing_appender::rolling::daily(&log_dir, "replaychat.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    if let Some(dir) = config.log_dir.as_ref().filter(|_| guard.is_some()) {
        tracing::debug!("📝 Logging to {}", dir.display());
    }
    Ok(guard)
}
