use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::subscriber::DefaultGuard;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

fn env_filter() -> EnvFilter {
    // Respect RUST_LOG if set; otherwise info for everything
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quarterly_etl=info,info"))
}

/// Initializes console-only logging for commands that do not own a pipeline run.
pub fn init_console() {
    let console_layer = fmt::layer().with_target(true).with_writer(std::io::stdout);

    // Ignore the error if a subscriber is already installed (e.g. in tests)
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(console_layer)
        .try_init();
}

/// Remove `*.log` files in `log_dir` older than `retention_days`. Zero keeps everything.
pub fn prune_old_logs(log_dir: &Path, retention_days: u64) -> Result<usize> {
    if retention_days == 0 {
        return Ok(0);
    }
    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(retention_days * 24 * 60 * 60))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;
    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }
        let modified = fs::metadata(&path).and_then(|m| m.modified());
        if matches!(modified, Ok(t) if t < cutoff) {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Logging for one pipeline run: a JSON log file of its own plus console output.
///
/// The subscriber is installed as the default for the current thread only, from
/// `open` until the value is closed or dropped. Closing flushes the file.
pub struct PipelineLogging {
    pipeline_name: String,
    file_path: PathBuf,
    // Field order matters on drop: restore the previous subscriber, then flush.
    default: Option<DefaultGuard>,
    writer: Option<WorkerGuard>,
}

impl PipelineLogging {
    pub fn open(pipeline_name: &str, log_dir: &Path, retention_days: u64) -> Result<Self> {
        fs::create_dir_all(log_dir)?;
        let pruned = prune_old_logs(log_dir, retention_days)?;

        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        let file_name = format!("{pipeline_name}_{timestamp}.log");
        let file_path = log_dir.join(&file_name);

        let file_appender = tracing_appender::rolling::never(log_dir, &file_name);
        let (non_blocking_writer, writer_guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
        let console_layer = fmt::layer().with_target(true).with_writer(std::io::stdout);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter())
            .with(file_layer)
            .with(console_layer);
        let default_guard = tracing::subscriber::set_default(subscriber);

        info!(pipeline = pipeline_name, "100 | Logging run to {}", file_path.display());
        if pruned > 0 {
            debug!("Pruned {} expired log files from {}", pruned, log_dir.display());
        }

        Ok(Self {
            pipeline_name: pipeline_name.to_string(),
            file_path,
            default: Some(default_guard),
            writer: Some(writer_guard),
        })
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Contents of the run's log file. Lines still buffered by the writer
    /// appear only after `close`.
    pub fn get_logs(&self) -> Result<String> {
        Ok(fs::read_to_string(&self.file_path)?)
    }

    pub fn is_closed(&self) -> bool {
        self.default.is_none()
    }

    /// End the run: restore the previous subscriber and flush the file.
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> PathBuf {
        self.shutdown();
        self.file_path.clone()
    }

    fn shutdown(&mut self) {
        if self.default.is_some() {
            info!(pipeline = %self.pipeline_name, "100 | Closing run log");
        }
        drop(self.default.take());
        drop(self.writer.take());
    }
}

impl Drop for PipelineLogging {
    fn drop(&mut self) {
        if self.default.is_some() {
            warn!("PipelineLogging for {} dropped without close", self.pipeline_name);
        }
        self.shutdown();
    }
}
