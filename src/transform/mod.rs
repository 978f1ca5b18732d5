pub mod consolidate;
pub mod normalize;
pub mod pivot;
pub mod reference;

use crate::config::{PipelineConfig, MAX_IPV_WRITE_CONCUR};
use crate::core::stats::{self, RunStats};
use crate::core::watermark::WatermarkStore;
use crate::error::{AppError, AppResult};
use crate::io;
use crate::logging::{log, LogLevel};
use crate::model::period::Period;
use crate::model::record::{CodeMappingRow, ConsolidatedRow, HeaderMappingRow};
use futures::stream::{self, StreamExt};
use pivot::IpvTable;
use reference::ReferenceIndex;
use std::path::Path;
use std::time::Instant;
use tokio::fs;

async fn read_consolidated_table(path: &Path) -> AppResult<Vec<ConsolidatedRow>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io::map_io_error(e, path)),
    };
    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    reader
        .deserialize::<ConsolidatedRow>()
        .map(|row| row.map_err(AppError::from))
        .collect()
}

async fn write_ipv_table(table: &IpvTable, period_dir: &Path, period: &Period) -> AppResult<()> {
    let bytes = table.to_csv_bytes()?;
    io::write_file_async(&period_dir.join(table.file_name(period)), &bytes).await
}

// An absent or empty consolidated table writes nothing and leaves the watermark untouched.
pub async fn generate_ipv_files(
    config: &PipelineConfig,
    store: &WatermarkStore,
    output_period: &Period,
    run_stats: &mut RunStats,
) -> AppResult<usize> {
    let start_time = Instant::now();
    let consolidated = read_consolidated_table(&config.consolidated_csv()).await?;
    if consolidated.is_empty() {
        log(
            LogLevel::Warning,
            "Consolidated table is missing or empty; no IPV files generated.",
        );
        return Ok(0);
    }

    let codes: Vec<CodeMappingRow> =
        reference::read_semicolon_table(&config.code_table_path()).await?;
    let headers: Vec<HeaderMappingRow> =
        reference::read_semicolon_table(&config.header_table_path()).await?;
    let index = ReferenceIndex::build(&codes, &headers)?;

    let joined = index.join(&consolidated);
    log(
        LogLevel::Info,
        &format!(
            "Joined {} of {} consolidated row(s) against {} reference key(s)",
            joined.len(),
            consolidated.len(),
            index.key_count()
        ),
    );
    let tables = pivot::pivot_by_code(joined)?;

    let period_dir = config.period_dir(output_period);
    io::ensure_dirs(&[period_dir.clone()]).await?;

    stats::category(run_stats, stats::CAT_IPV).set_total(tables.len());
    let results: Vec<(String, AppResult<()>)> = stream::iter(tables.iter())
        .map(|table| {
            let period_dir = &period_dir;
            async move {
                let result = write_ipv_table(table, period_dir, output_period).await;
                (table.cod.clone(), result)
            }
        })
        .buffer_unordered(MAX_IPV_WRITE_CONCUR)
        .collect()
        .await;

    let mut first_error: Option<AppError> = None;
    for (cod, result) in results {
        let cat = stats::category(run_stats, stats::CAT_IPV);
        match result {
            Ok(()) => cat.add_ok(),
            Err(e) => {
                cat.add_fail();
                log(
                    LogLevel::Error,
                    &format!("IPV file for '{}' failed: {}", cod, e),
                );
                first_error.get_or_insert(e);
            }
        }
    }
    stats::log_phase_completion(stats::CAT_IPV, &run_stats[stats::CAT_IPV], start_time.elapsed());
    if let Some(e) = first_error {
        return Err(e);
    }

    store.promote_updated().await?;
    log(
        LogLevel::Success,
        &format!("Number of IPV files generated: {}", tables.len()),
    );
    Ok(tables.len())
}
