use super::client::{parse_records, request_url, ApiClient};
use crate::config::{PipelineConfig, Scope};
use crate::core::stats::{self, RunStats};
use crate::core::watermark::WatermarkStore;
use crate::error::{AppError, AppResult};
use crate::io;
use crate::logging::{log, ErrorLog, LogLevel};
use crate::model::period::Period;
use crate::model::record::RawRecord;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    UpToDate(Period),
    Completed(Period),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SliceOutcome {
    Saved,
    Empty,
    Miss,
}

#[derive(Debug, Clone)]
struct SliceJob {
    scope: Scope,
    code: String,
    year: i32,
}

impl SliceJob {
    fn file_name(&self) -> String {
        raw_record_file_name(&self.code, self.scope, self.year)
    }
}

pub fn raw_record_file_name(code: &str, scope: Scope, year: i32) -> String {
    format!("{}_{}_data_{}.json", code, scope.as_str(), year)
}

fn period_from_records(records: &[RawRecord], url: &str) -> AppResult<Option<Period>> {
    let Some(first) = records.first() else {
        return Ok(None);
    };
    let year = first.calendar_year.trim().parse::<i32>().map_err(|_| {
        AppError::Transform(format!(
            "Invalid CalendarYear '{}' in response from {}",
            first.calendar_year, url
        ))
    })?;
    let month = first
        .month
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|m| (1..=12).contains(m))
        .ok_or_else(|| {
            AppError::Transform(format!(
                "Invalid Month '{}' in response from {}",
                first.month, url
            ))
        })?;
    Ok(Some(Period::new(year, month)))
}

async fn probe_year(
    client: &ApiClient,
    config: &PipelineConfig,
    error_log: &ErrorLog,
    year: i32,
) -> AppResult<Option<Period>> {
    let endpoint = config.endpoint(Scope::Country);
    let url = request_url(endpoint, &config.probe_code, year);
    log(LogLevel::Info, &format!("Probing reporting period via {}", url));

    match client
        .fetch_slice(endpoint, &config.probe_code, year, error_log)
        .await
    {
        Ok(body) => {
            let records = parse_records(&body, &url)?;
            period_from_records(&records, &url)
        }
        Err(e) => {
            error_log.record(&e.to_string()).await;
            Ok(None)
        }
    }
}

/// The first element of the answering response defines the period.
pub async fn resolve_period(
    client: &ApiClient,
    config: &PipelineConfig,
    error_log: &ErrorLog,
    today: NaiveDate,
) -> AppResult<Period> {
    let year = Period::search_year(today);
    log(
        LogLevel::Info,
        &format!("Current date: {}. Year to probe: {}", today, year),
    );

    let resolved = match probe_year(client, config, error_log, year).await? {
        Some(period) => period,
        None => probe_year(client, config, error_log, year - 1)
            .await?
            .ok_or(AppError::PeriodUndeterminable {
                year,
                previous: year - 1,
            })?,
    };

    log(
        LogLevel::Info,
        &format!("Resolved reporting period: {}", resolved),
    );
    Ok(resolved)
}

async fn fetch_and_save(
    client: &ApiClient,
    config: &PipelineConfig,
    error_log: &ErrorLog,
    job: &SliceJob,
) -> SliceOutcome {
    let endpoint = config.endpoint(job.scope);
    let url = request_url(endpoint, &job.code, job.year);

    let body = match client
        .fetch_slice(endpoint, &job.code, job.year, error_log)
        .await
    {
        Ok(body) => body,
        Err(e) => {
            error_log.record(&e.to_string()).await;
            return SliceOutcome::Miss;
        }
    };

    match parse_records(&body, &url) {
        Ok(records) if records.is_empty() => {
            error_log
                .record(&format!("No data fetched for {}, skipping save.", url))
                .await;
            return SliceOutcome::Empty;
        }
        Ok(_) => {}
        Err(e) => {
            error_log
                .record(&format!("Malformed response from {}: {}", url, e))
                .await;
            return SliceOutcome::Miss;
        }
    }

    let path: PathBuf = config.raw_dir(job.scope).join(job.file_name());
    match io::write_file_async(&path, &body).await {
        Ok(()) => SliceOutcome::Saved,
        Err(e) => {
            error_log
                .record(&format!("Failed writing to {}: {}", path.display(), e))
                .await;
            SliceOutcome::Miss
        }
    }
}

fn build_jobs(config: &PipelineConfig, period: &Period) -> Vec<SliceJob> {
    let mut jobs = Vec::new();
    for year in period.market_years() {
        for code in &config.commodity_codes {
            for scope in Scope::ALL {
                jobs.push(SliceJob {
                    scope,
                    code: code.clone(),
                    year,
                });
            }
        }
    }
    jobs
}

pub async fn fetch_archive(
    client: &ApiClient,
    config: &PipelineConfig,
    store: &WatermarkStore,
    error_log: &ErrorLog,
    period: Period,
    run_stats: &mut RunStats,
) -> AppResult<FetchStatus> {
    let watermark = store.read().await;
    if watermark.is_fetched(&period) {
        log(
            LogLevel::Info,
            &format!("Watermark already at {}, nothing to fetch.", period),
        );
        return Ok(FetchStatus::UpToDate(period));
    }

    let raw_dirs: Vec<PathBuf> = Scope::ALL.iter().map(|s| config.raw_dir(*s)).collect();
    io::ensure_dirs(&raw_dirs).await?;
    for dir in &raw_dirs {
        io::clear_directory(dir).await?;
    }

    let jobs = build_jobs(config, &period);
    let per_scope_total = jobs.len() / Scope::ALL.len();
    stats::category(run_stats, stats::CAT_COUNTRY).set_total(per_scope_total);
    stats::category(run_stats, stats::CAT_WORLD).set_total(per_scope_total);

    let start_time = Instant::now();
    let total = jobs.len();
    let log_interval = std::cmp::max(50, total / 10);
    log(
        LogLevel::Info,
        &format!(
            "Fetching {} slices (market years {}-{}, {} codes, 2 scopes) with concurrency {}",
            total,
            period.history_start_year(),
            period.year,
            config.commodity_codes.len(),
            config.max_concurrent
        ),
    );

    let mut processed = 0usize;
    let mut results = stream::iter(jobs)
        .map(|job| async move {
            let outcome = fetch_and_save(client, config, error_log, &job).await;
            (job.scope, outcome)
        })
        .buffer_unordered(config.max_concurrent);

    while let Some((scope, outcome)) = results.next().await {
        let cat_name = match scope {
            Scope::Country => stats::CAT_COUNTRY,
            Scope::World => stats::CAT_WORLD,
        };
        let cat = stats::category(run_stats, cat_name);
        match outcome {
            SliceOutcome::Saved => cat.add_ok(),
            SliceOutcome::Empty => cat.add_skip(),
            SliceOutcome::Miss => cat.add_fail(),
        }
        processed += 1;
        if processed % log_interval == 0 || processed == total {
            stats::log_progress(cat_name, cat);
        }
    }

    let elapsed = start_time.elapsed();
    stats::log_phase_completion(stats::CAT_COUNTRY, &run_stats[stats::CAT_COUNTRY], elapsed);
    stats::log_phase_completion(stats::CAT_WORLD, &run_stats[stats::CAT_WORLD], elapsed);

    store.write_fetched(period).await?;
    log(LogLevel::Success, "Fetching and saving of data complete.");
    Ok(FetchStatus::Completed(period))
}
