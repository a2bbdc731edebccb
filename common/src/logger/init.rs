use std::path::Path;

use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Installs the global subscriber. Safe to call more than once; only the
/// first call has an effect.
///
/// `json` switches the console output to one JSON object per event, which is
/// what the production log shipper expects. Otherwise events are rendered
/// compactly for a terminal.
///
/// With a `log_dir`, every event is also appended to a daily file
/// `{service_name}.YYYY-MM-DD.log` in that directory. The returned guard
/// flushes the file writer on drop and must be held for the process lifetime.
pub fn init_logger(
    service_name: &'static str,
    json: bool,
    log_dir: Option<&Path>,
) -> Option<WorkerGuard> {
    let mut guard = None;

    LOGGER_INIT.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let mut file_error = None;
        let file_layer = match log_dir.map(|dir| daily_file_writer(dir, service_name)) {
            Some(Ok(appender)) => {
                let (writer, file_guard) = tracing_appender::non_blocking(appender);
                guard = Some(file_guard);
                Some(
                    fmt::layer()
                        .with_ansi(false)
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_writer(writer),
                )
            }
            Some(Err(e)) => {
                file_error = Some(e);
                None
            }
            None => None,
        };

        let base = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_span_events(fmt::format::FmtSpan::CLOSE);

        if json {
            tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .with(base.json())
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .with(base.compact())
                .init();
        }

        tracing::info!(service = service_name, json, "logger initialized");

        if let Some(e) = file_error {
            tracing::warn!(error = %e, "file logging disabled; console only");
        }
    });

    guard
}

/// Daily rotating appender, creating `dir` if needed.
pub(crate) fn daily_file_writer(
    dir: &Path,
    prefix: &str,
) -> Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn daily_writer_creates_dated_log_file() {
        let dir = std::env::temp_dir().join(format!("logger-test-{}", uuid::Uuid::new_v4()));

        let mut appender = daily_file_writer(&dir, "market-monitor").unwrap();
        appender.write_all(b"hello\n").unwrap();
        appender.flush().unwrap();

        let names: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("market-monitor."));
        assert!(names[0].ends_with(".log"));
        // prefix + YYYY-MM-DD + suffix
        assert_eq!(names[0].len(), "market-monitor.".len() + 10 + ".log".len());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
