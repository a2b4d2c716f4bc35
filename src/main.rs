use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

use quarterly_etl::config::Config;
use quarterly_etl::constants::{BULK_PIPELINE_NAME, PIPELINE_NAME};
use quarterly_etl::logging::{self, PipelineLogging};
use quarterly_etl::pipeline::integrity;
use quarterly_etl::pipeline::{LoadMethod, Pipeline, PipelineResult};
use quarterly_etl::storage::{SqliteStore, Store, TableDef};

#[derive(Parser)]
#[command(name = "quarterly-etl")]
#[command(about = "Load quarterly government financial data into SQLite")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the daily file of a single quarter
    Run {
        #[arg(long)]
        year: i32,
        /// Q1, Q2, Q3 or Q4
        #[arg(long)]
        quarter: String,
        /// insert, upsert or overwrite (defaults to the configured method)
        #[arg(long)]
        method: Option<LoadMethod>,
    },
    /// Load every source file (.csv, .xlsx, .xls, .xlsb, .ods) in a directory, continuing past failures
    Bulk {
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        method: Option<LoadMethod>,
    },
    /// Run a bulk load on a fixed interval until Ctrl-C
    Watch {
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Seconds between runs
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Check source CSV files for structural problems without loading them
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the contents of the target table as JSON
    Show,
}

fn open_store(config: &Config) -> anyhow::Result<SqliteStore> {
    SqliteStore::open(&config.database.path)
        .with_context(|| format!("opening database {}", config.database.path.display()))
}

fn run_quarter(config: Config, year: i32, quarter: &str) -> anyhow::Result<PipelineResult> {
    let mut store = open_store(&config)?;
    let logging = PipelineLogging::open(PIPELINE_NAME, &config.logging.log_dir, config.logging.retention_days)?;
    let result = Pipeline::new(config, logging).run_quarter(&mut store, year, quarter)?;
    Ok(result)
}

fn run_bulk(config: Config, dir: &Path) -> anyhow::Result<PipelineResult> {
    let mut store = open_store(&config)?;
    let logging =
        PipelineLogging::open(BULK_PIPELINE_NAME, &config.logging.log_dir, config.logging.retention_days)?;
    let result = Pipeline::new(config, logging).run_directory(&mut store, dir)?;
    Ok(result)
}

fn print_result(result: &PipelineResult) {
    println!("\n📊 Pipeline Results ({}):", result.pipeline_name);
    println!("   Run id: {}", result.run_id);
    println!("   Table: {} ({})", result.table, result.method);
    for file in &result.files {
        match &file.error {
            None => println!(
                "   ✅ {}: {} read, {} loaded, {} rejected, {} field issues",
                file.path.display(),
                file.rows_read,
                file.rows_loaded,
                file.rows_rejected,
                file.field_issues
            ),
            Some(e) => println!("   ❌ {}: {}", file.path.display(), e),
        }
    }
    println!("   Rows loaded: {}", result.rows_loaded());
    println!("   Duration: {:.2}s", result.duration_secs);
    println!("   Log file: {}", result.log_file.display());
}

fn report_run(joined: Result<anyhow::Result<PipelineResult>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(result)) => {
            if !result.is_success() {
                warn!("{} files failed in this run", result.files_failed());
            }
            print_result(&result);
        }
        Ok(Err(e)) => error!("Scheduled run failed: {:#}", e),
        Err(e) => error!("Scheduled run panicked: {}", e),
    }
}

/// Bulk-load `dir` every `interval` until `shutdown` resolves. A run already in
/// progress when it resolves is allowed to finish.
async fn watch<S: Future>(config: Config, dir: PathBuf, interval: Duration, shutdown: S) -> anyhow::Result<()> {
    println!("👀 Watching {} every {}s (Ctrl-C to stop)", dir.display(), interval.as_secs());
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            biased;
            _ = ticker.tick() => {}
            _ = &mut shutdown => {
                info!("Received Ctrl-C, stopping watch");
                println!("👋 Stopping");
                return Ok(());
            }
        }

        let config = config.clone();
        let dir = dir.clone();
        let mut run = tokio::task::spawn_blocking(move || run_bulk(config, &dir));
        tokio::select! {
            joined = &mut run => report_run(joined),
            _ = &mut shutdown => {
                info!("Received Ctrl-C, finishing the current run before stopping");
                report_run(run.await);
                println!("👋 Stopping");
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_console();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { year, quarter, method } => {
            if let Some(method) = method {
                config.pipeline.load_method = method;
            }
            println!("🚀 Running pipeline for {year} {quarter}...");
            let result = tokio::task::spawn_blocking(move || run_quarter(config, year, &quarter)).await??;
            print_result(&result);
        }
        Commands::Bulk { dir, method } => {
            if let Some(method) = method {
                config.pipeline.load_method = method;
            }
            let dir = dir.unwrap_or_else(|| config.pipeline.data_dir.clone());
            println!("🔄 Running bulk pipeline over {}...", dir.display());
            let result = tokio::task::spawn_blocking(move || run_bulk(config, &dir)).await??;
            print_result(&result);
            if !result.is_success() {
                bail!("{} of {} files failed", result.files_failed(), result.files.len());
            }
        }
        Commands::Watch { dir, interval } => {
            let dir = dir.unwrap_or_else(|| config.pipeline.data_dir.clone());
            let secs = interval.unwrap_or(config.pipeline.poll_interval_secs);
            if secs == 0 {
                bail!("--interval must be positive");
            }
            watch(config, dir, Duration::from_secs(secs), tokio::signal::ctrl_c()).await?;
        }
        Commands::Validate { files } => {
            let mut dirty = 0;
            for path in &files {
                let report = integrity::check_file(path)?;
                if report.is_clean() {
                    println!("✅ {}: {} rows, no problems", path.display(), report.rows);
                    continue;
                }
                dirty += 1;
                println!("⚠️  {}: {} problems", path.display(), report.violations.len());
                for v in &report.violations {
                    match v.row {
                        Some(row) => println!("   - row {}: {}", row, v.message),
                        None => println!("   - {}", v.message),
                    }
                }
            }
            if dirty > 0 {
                bail!("{} of {} files failed validation", dirty, files.len());
            }
        }
        Commands::Show => {
            let store = open_store(&config)?;
            let table = TableDef::financials(&config.database.table_name);
            if !store.table_exists(&table.name)? {
                println!("Table {} does not exist yet", table.name);
                return Ok(());
            }
            let rows = store.select_all(&table)?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }
    Ok(())
}
