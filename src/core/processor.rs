use crate::api::client::ApiClient;
use crate::api::fetchers::{self, FetchStatus};
use crate::config::{PipelineConfig, Scope};
use crate::core::stats::{self, RunStats};
use crate::core::watermark::WatermarkStore;
use crate::error::AppResult;
use crate::io;
use crate::logging::{log, ErrorLog, LogLevel};
use crate::model::period::Period;
use crate::transform::{self, consolidate, normalize};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub reporting_period: Period,
    pub output_period: Period,
    pub consolidated_rows: usize,
    pub ipv_files: usize,
    pub artifact: PathBuf,
    pub artifact_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    UpToDate(Period),
    Completed(RunReport),
}

/// Working directories are emptied whatever the result.
pub async fn run(config: PipelineConfig, today: NaiveDate) -> AppResult<RunOutcome> {
    config.validate()?;
    let error_log = ErrorLog::new(config.error_log_path());

    let result = run_stages(&config, &error_log, today).await;

    if let Err(e) = &result {
        error_log
            .record(&format!("An error occurred during data processing: {:?}", e))
            .await;
    }
    io::clear_working_dirs(&config.working_dirs()).await;
    result
}

async fn run_stages(
    config: &PipelineConfig,
    error_log: &ErrorLog,
    today: NaiveDate,
) -> AppResult<RunOutcome> {
    let overall_start_time = Instant::now();
    log(
        LogLevel::Step,
        &format!(
            "Starting PSD update at {} (data dir: {})",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            config.data_dir.display()
        ),
    );

    let mut dirs: Vec<PathBuf> = Scope::ALL.iter().map(|s| config.raw_dir(*s)).collect();
    dirs.push(config.consolidated_dir());
    dirs.push(config.logs_dir());
    io::ensure_dirs(&dirs).await?;

    let client = ApiClient::new(config)?;
    let store = WatermarkStore::new(config.watermark_path());
    let mut run_stats: RunStats = stats::initialize_stats();

    log(LogLevel::Step, "--- Phase 1: Period Resolution ---");
    let period = fetchers::resolve_period(&client, config, error_log, today).await?;

    log(LogLevel::Step, "--- Phase 2: Archive Fetch ---");
    match fetchers::fetch_archive(&client, config, &store, error_log, period, &mut run_stats)
        .await?
    {
        FetchStatus::UpToDate(p) => return Ok(RunOutcome::UpToDate(p)),
        FetchStatus::Completed(_) => {}
    }

    log(LogLevel::Step, "--- Phase 3: Raw Normalization ---");
    let raw_dirs = [config.raw_dir(Scope::World), config.raw_dir(Scope::Country)];
    let consolidated_rows =
        normalize::consolidate_raw_records(&raw_dirs, &config.consolidated_csv()).await?;

    log(LogLevel::Step, "--- Phase 4: Reference Join & Pivot ---");
    let output_period = Period::from_date(today);
    let ipv_files =
        transform::generate_ipv_files(config, &store, &output_period, &mut run_stats).await?;

    log(LogLevel::Step, "--- Phase 5: Period Consolidation ---");
    let artifact = config.artifact_path(&output_period);
    let consolidation =
        consolidate::consolidate_ipv_files(&config.period_dir(&output_period), &artifact).await?;

    stats::print_summary(&run_stats, &period, overall_start_time.elapsed());

    Ok(RunOutcome::Completed(RunReport {
        reporting_period: period,
        output_period,
        consolidated_rows,
        ipv_files,
        artifact,
        artifact_rows: consolidation.rows,
    }))
}
