use metrics::{counter, histogram};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::logging::PipelineLogging;
use crate::pipeline::extract::{self, quarter_from_file_name};
use crate::pipeline::load::{self, LoadMethod};
use crate::pipeline::normalize::normalize_with_report;
use crate::storage::{Row, Store, TableDef};
use crate::types::RawRecord;

/// What happened to a single source file
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub rows_read: usize,
    pub rows_loaded: usize,
    /// Rows left out of the load because their date could not be parsed
    pub rows_rejected: usize,
    pub field_issues: usize,
    pub error: Option<String>,
}

impl FileOutcome {
    fn failed(path: &Path, message: String) -> Self {
        Self {
            path: path.to_path_buf(),
            rows_read: 0,
            rows_loaded: 0,
            rows_rejected: 0,
            field_issues: 0,
            error: Some(message),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a complete pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub pipeline_name: String,
    pub table: String,
    pub method: LoadMethod,
    pub files: Vec<FileOutcome>,
    pub duration_secs: f64,
    pub log_file: PathBuf,
}

impl PipelineResult {
    pub fn rows_loaded(&self) -> usize {
        self.files.iter().map(|f| f.rows_loaded).sum()
    }

    pub fn rows_rejected(&self) -> usize {
        self.files.iter().map(|f| f.rows_rejected).sum()
    }

    pub fn files_failed(&self) -> usize {
        self.files.iter().filter(|f| !f.is_success()).count()
    }

    pub fn is_success(&self) -> bool {
        self.files_failed() == 0
    }
}

/// Extract, normalize and load source files into the configured table.
///
/// A pipeline is single-use: each `run_*` call consumes it and closes its log.
pub struct Pipeline {
    config: Config,
    logging: PipelineLogging,
    table: TableDef,
    run_id: Uuid,
}

impl Pipeline {
    pub fn new(config: Config, logging: PipelineLogging) -> Self {
        let table = TableDef::financials(&config.database.table_name);
        Self {
            config,
            logging,
            table,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn method(&self) -> LoadMethod {
        self.config.pipeline.load_method
    }

    /// Load the daily file of one quarter. A missing file or a failed load is
    /// returned as an error after the run log has been closed.
    #[instrument(skip(self, store), fields(run_id = %self.run_id))]
    pub fn run_quarter(mut self, store: &mut dyn Store, year: i32, quarter: &str) -> Result<PipelineResult> {
        let started = Instant::now();
        info!(
            "100 | Starting {} for {} {} ({} into {})",
            self.logging.pipeline_name(),
            year,
            quarter,
            self.method(),
            self.table.name
        );

        let outcome = extract::extract_quarter(&self.config.pipeline.data_dir, year, quarter)
            .and_then(|(path, raw)| self.load_records(store, &path, &raw));

        match outcome {
            Ok(file) => {
                counter!("etl_files_processed_total").increment(1);
                info!("200 | Pipeline completed successfully");
                Ok(self.finish(vec![file], started))
            }
            Err(e) => {
                counter!("etl_files_failed_total").increment(1);
                error!("500 | Pipeline failed: {}", e);
                self.logging.close();
                Err(e)
            }
        }
    }

    /// Load every source file in `dir`, in name order. A file that fails is
    /// logged and recorded in the result; the remaining files still run.
    #[instrument(skip(self, store), fields(run_id = %self.run_id))]
    pub fn run_directory(mut self, store: &mut dyn Store, dir: &Path) -> Result<PipelineResult> {
        let started = Instant::now();
        info!(
            "100 | Starting {} over {} ({} into {})",
            self.logging.pipeline_name(),
            dir.display(),
            self.method(),
            self.table.name
        );

        let sources = match extract::discover_sources(dir) {
            Ok(sources) => sources,
            Err(e) => {
                error!("500 | Cannot list {}: {}", dir.display(), e);
                self.logging.close();
                return Err(e);
            }
        };
        if sources.is_empty() {
            warn!("400 | No source files found in {}", dir.display());
        }

        let mut files = Vec::with_capacity(sources.len());
        for path in &sources {
            info!("100 | Processing {}", path.display());
            let outcome = extract::read_raw_records(path)
                .and_then(|raw| self.load_records(store, path, &raw));
            match outcome {
                Ok(file) => {
                    counter!("etl_files_processed_total").increment(1);
                    info!("200 | Successfully processed {}", path.display());
                    files.push(file);
                }
                Err(e) => {
                    counter!("etl_files_failed_total").increment(1);
                    error!("500 | Failed to process {}: {}", path.display(), e);
                    files.push(FileOutcome::failed(path, e.to_string()));
                }
            }
        }

        let failed = files.iter().filter(|f| !f.is_success()).count();
        if failed == 0 {
            info!("200 | Bulk run completed: {} files", files.len());
        } else {
            warn!("400 | Bulk run completed with {} of {} files failed", failed, files.len());
        }
        Ok(self.finish(files, started))
    }

    fn load_records(&self, store: &mut dyn Store, path: &Path, raw: &[RawRecord]) -> Result<FileOutcome> {
        let report = normalize_with_report(raw);
        for issue in &report.issues {
            warn!(
                row = issue.row,
                field = issue.field,
                "400 | {} value '{}' in {}",
                issue.kind,
                issue.raw,
                path.display()
            );
        }
        counter!("etl_field_issues_total").increment(report.issues.len() as u64);

        let undated = report.undated_rows();
        for idx in &undated {
            warn!(row = *idx, "400 | Row has no usable date, left out of the load");
        }

        let expected_quarter = quarter_from_file_name(path);
        let mut rows: Vec<Row> = Vec::with_capacity(report.records.len() - undated.len());
        let mut outside = 0;
        for record in report.records.iter().filter(|r| r.date.is_some()) {
            if expected_quarter.is_some() && record.quarter != expected_quarter {
                outside += 1;
            }
            rows.push(record.to_row());
        }
        if let (Some(q), true) = (expected_quarter, outside > 0) {
            warn!("400 | {} rows of {} fall outside {}", outside, path.display(), q);
        }
        debug!("{} rows ready, {} rejected", rows.len(), undated.len());

        let loaded = load::apply(store, &rows, &self.table, self.method())?;
        counter!("etl_rows_loaded_total").increment(loaded as u64);

        Ok(FileOutcome {
            path: path.to_path_buf(),
            rows_read: raw.len(),
            rows_loaded: loaded,
            rows_rejected: undated.len(),
            field_issues: report.issues.len(),
            error: None,
        })
    }

    fn finish(mut self, files: Vec<FileOutcome>, started: Instant) -> PipelineResult {
        let duration_secs = started.elapsed().as_secs_f64();
        histogram!("etl_run_duration_seconds").record(duration_secs);
        let pipeline_name = self.logging.pipeline_name().to_string();
        let method = self.method();
        let log_file = self.logging.close();
        PipelineResult {
            run_id: self.run_id,
            pipeline_name,
            table: self.table.name,
            method,
            files,
            duration_secs,
            log_file,
        }
    }
}
