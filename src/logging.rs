//! Tracing setup: env-filtered stdout output plus an optional non-blocking
//! log file. The file layer writes JSON lines so runs can be audited with
//! standard tooling.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize the tracing subscriber. `level` is the fallback when
/// `RUST_LOG` is unset; `log_file` enables an additional JSON file sink.
///
/// Safe to call once per process; a second call returns an error from the
/// subscriber registry rather than panicking.
pub fn init_logging(
    level: &str,
    log_file: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .or_else(|_| EnvFilter::try_new("info"))?;

    let stdout_layer = fmt::layer()
        .with_target(false)
        .compact()
        .with_filter(env_filter);

    let registry = tracing_subscriber::registry().with(stdout_layer);

    if let Some(path) = log_file {
        let path = std::path::Path::new(path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let (writer, guard) = tracing_appender::non_blocking(file);

        let file_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .or_else(|_| EnvFilter::try_new("info"))?;

        let file_layer = fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .with_filter(file_filter);

        registry.with(file_layer).try_init()?;

        // The guard must outlive the process for buffered lines to flush.
        Box::leak(Box::new(guard));
    } else {
        registry.try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_logging_with_file() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("logs").join("crawl.log");

        // First init in the test process wins; a second call must not panic.
        let first = init_logging("debug", Some(log_path.to_str().unwrap()));
        let second = init_logging("debug", None);
        assert!(first.is_ok() || second.is_err());
        assert!(log_path.exists() || first.is_err());
    }
}
