use crate::config::{self, IPV_EXTENSION, IPV_FILE_PREFIX, IPV_HEADERS};
use crate::error::{AppError, AppResult};
use crate::io;
use crate::logging::{log, LogLevel};
use crate::utils;
use std::collections::BTreeSet;
use std::path::Path;
use tokio::fs;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidationReport {
    pub source_files: usize,
    pub rows: usize,
    pub removed_files: usize,
}

fn append_source(
    source: &[u8],
    source_name: &str,
    writer: &mut csv::Writer<Vec<u8>>,
    dropped_columns: &mut BTreeSet<String>,
) -> AppResult<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(source);
    let headers = reader
        .headers()
        .map_err(|e| AppError::Csv(format!("{}: {}", source_name, e)))?
        .clone();

    let positions: Vec<Option<usize>> = IPV_HEADERS
        .iter()
        .map(|target| headers.iter().position(|h| h == *target))
        .collect();
    for header in headers.iter() {
        if !IPV_HEADERS.contains(&header) {
            dropped_columns.insert(format!("{} ({})", header, source_name));
        }
    }

    let mut rows = 0;
    for record in reader.records() {
        let record = record.map_err(|e| AppError::Csv(format!("{}: {}", source_name, e)))?;
        let projected: Vec<&str> = positions
            .iter()
            .map(|pos| pos.and_then(|i| record.get(i)).unwrap_or(""))
            .collect();
        writer.write_record(&projected)?;
        rows += 1;
    }
    Ok(rows)
}

pub async fn consolidate_ipv_files(
    period_dir: &Path,
    artifact_path: &Path,
) -> AppResult<ConsolidationReport> {
    io::ensure_dirs(&[period_dir.to_path_buf()]).await?;
    if let Some(parent) = artifact_path.parent() {
        io::ensure_dirs(&[parent.to_path_buf()]).await?;
    }

    let sources = io::list_files(period_dir).await?;
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(config::IPV_HEADERS)?;

    let mut report = ConsolidationReport::default();
    let mut dropped_columns = BTreeSet::new();
    for path in &sources {
        if !io::has_extension(path, IPV_EXTENSION) {
            continue;
        }
        let content = fs::read(path)
            .await
            .map_err(|e| io::map_io_error(e, path))?;
        report.rows += append_source(
            &content,
            &utils::file_name_of(path),
            &mut writer,
            &mut dropped_columns,
        )?;
        report.source_files += 1;
    }

    if !dropped_columns.is_empty() {
        log(
            LogLevel::Warning,
            &format!(
                "Columns outside the IPV header were dropped: {}",
                dropped_columns.into_iter().collect::<Vec<_>>().join(", ")
            ),
        );
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Csv(format!("Failed to flush period artifact: {}", e)))?;
    io::write_file_async(artifact_path, &bytes).await?;

    for path in &sources {
        if utils::file_name_of(path).starts_with(IPV_FILE_PREFIX) {
            fs::remove_file(path)
                .await
                .map_err(|e| io::map_io_error(e, path))?;
            report.removed_files += 1;
        }
    }

    log(
        LogLevel::Success,
        &format!(
            "Period artifact {} written: {} row(s) from {} file(s), {} intermediate(s) removed",
            artifact_path.display(),
            report.rows,
            report.source_files,
            report.removed_files
        ),
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::artifact_path_in;
    use crate::model::period::Period;

    #[tokio::test]
    async fn merges_sources_into_fixed_schema_and_removes_intermediates() {
        let dir = tempfile::tempdir().unwrap();
        let period_dir = dir.path().join("2024_07");
        std::fs::create_dir_all(&period_dir).unwrap();
        std::fs::write(
            period_dir.join("USDA_PSD_Corn_2024_07.ipv"),
            "<cod>,<data>,<PRO>,<ARH>\nUSDA_PSD_Corn,2024-01-01,15,30\n",
        )
        .unwrap();
        std::fs::write(
            period_dir.join("USDA_PSD_Soy_2024_07.ipv"),
            "<cod>,<data>,<YLD>,<XYZ>\nUSDA_PSD_Soy,2023-01-01,3.2,9\nUSDA_PSD_Soy,2024-01-01,3.3,9\n",
        )
        .unwrap();
        std::fs::write(period_dir.join("README.txt"), "keep me").unwrap();

        let artifact = artifact_path_in(&period_dir, &Period::new(2024, 7));
        let report = consolidate_ipv_files(&period_dir, &artifact).await.unwrap();
        assert_eq!(report.source_files, 2);
        assert_eq!(report.rows, 3);
        assert_eq!(report.removed_files, 2);

        let mut reader = csv::Reader::from_path(&artifact).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, IPV_HEADERS.iter().map(|h| h.to_string()).collect::<Vec<_>>());

        let records: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 3);
        for record in &records {
            assert_eq!(record.len(), 35);
            assert!(!record[0].is_empty());
            assert!(!record[1].is_empty());
        }
        let corn = records.iter().find(|r| &r[0] == "USDA_PSD_Corn").unwrap();
        assert_eq!(&corn[2], "30");
        assert_eq!(&corn[8], "15");
        assert_eq!(corn.iter().filter(|c| c.is_empty()).count(), 31);

        let remaining: Vec<String> = std::fs::read_dir(&period_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(remaining, vec!["README.txt".to_string()]);
        assert!(artifact.exists());
    }

    #[tokio::test]
    async fn empty_period_dir_yields_header_only_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let period_dir = dir.path().join("2025_01");
        let artifact = artifact_path_in(&period_dir, &Period::new(2025, 1));
        let report = consolidate_ipv_files(&period_dir, &artifact).await.unwrap();
        assert_eq!(report, ConsolidationReport::default());
        let content = std::fs::read_to_string(&artifact).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.starts_with("<cod>,<data>,<ARH>"));
    }
}
