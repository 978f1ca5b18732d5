use crate::config;
use crate::error::{AppError, AppResult};
use crate::io;
use crate::logging::{log, LogLevel};
use crate::model::common::{normalize_commodity_code, strip_whitespace};
use crate::model::record::{ConsolidatedRow, RawRecord};
use std::path::{Path, PathBuf};
use tokio::fs;

pub fn normalize_record(rec: &RawRecord) -> AppResult<ConsolidatedRow> {
    let commodity_code = normalize_commodity_code(&rec.commodity_code).ok_or_else(|| {
        AppError::Transform(format!(
            "CommodityCode '{}' is not numeric",
            rec.commodity_code
        ))
    })?;

    Ok(ConsolidatedRow {
        commodity_code,
        country_name: rec.country_name.trim().to_string(),
        market_year: rec.market_year.clone(),
        attribute_description: strip_whitespace(&rec.attribute_description),
        value: rec.value.clone(),
        calendar_year: rec.calendar_year.clone(),
        month: rec.month.clone(),
    })
}

async fn read_raw_file(path: &Path) -> AppResult<Vec<RawRecord>> {
    let bytes = fs::read(path)
        .await
        .map_err(|e| io::map_io_error(e, path))?;
    serde_json::from_slice::<Vec<RawRecord>>(&bytes).map_err(|e| {
        AppError::SerdeParse(format!("Raw record '{}' is malformed: {}", path.display(), e))
    })
}

pub fn to_csv_bytes(rows: &[ConsolidatedRow]) -> AppResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(config::CONSOLIDATED_HEADERS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::Csv(format!("Failed to flush consolidated table: {}", e)))
}

/// Malformed JSON aborts the stage.
pub async fn consolidate_raw_records(dirs: &[PathBuf], output: &Path) -> AppResult<usize> {
    let mut rows: Vec<ConsolidatedRow> = Vec::new();
    let mut file_count = 0usize;

    for dir in dirs {
        for path in io::list_files(dir).await? {
            if !io::has_extension(&path, "json") {
                continue;
            }
            let records = read_raw_file(&path).await?;
            for rec in &records {
                rows.push(normalize_record(rec).map_err(|e| {
                    AppError::Transform(format!("{} ({})", e, path.display()))
                })?);
            }
            file_count += 1;
        }
    }

    if let Some(parent) = output.parent() {
        io::ensure_dirs(&[parent.to_path_buf()]).await?;
    }
    let bytes = to_csv_bytes(&rows)?;
    io::write_file_async(output, &bytes).await?;

    log(
        LogLevel::Success,
        &format!(
            "Consolidated {} row(s) from {} raw file(s) into {}",
            rows.len(),
            file_count,
            output.display()
        ),
    );
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(code: &str, country: &str, attr: &str) -> RawRecord {
        RawRecord {
            commodity_code: code.into(),
            country_name: country.into(),
            market_year: "2023".into(),
            attribute_description: attr.into(),
            value: "100".into(),
            calendar_year: "2024".into(),
            month: "07".into(),
        }
    }

    #[test]
    fn projection_normalizes_code_country_and_attribute() {
        let row = normalize_record(&raw("0440000", "  United States ", "Area Harvested"))
            .unwrap();
        assert_eq!(row.commodity_code, 440000);
        assert_eq!(row.country_name, "United States");
        assert_eq!(row.attribute_description, "AreaHarvested");

        let row = normalize_record(&raw("0000000", "World", "Production")).unwrap();
        assert_eq!(row.commodity_code, 0);
    }

    #[test]
    fn empty_table_still_has_header() {
        let bytes = to_csv_bytes(&[]).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "CommodityCode,CountryName,MarketYear,AttributeDescription,Value,CalendarYear,Month\n"
        );
    }

    #[tokio::test]
    async fn consolidates_json_files_and_ignores_others() {
        let dir = tempfile::tempdir().unwrap();
        let country = dir.path().join("raw").join("country");
        let world = dir.path().join("raw").join("world");
        std::fs::create_dir_all(&country).unwrap();
        std::fs::create_dir_all(&world).unwrap();
        std::fs::write(
            country.join("0410000_country_data_2023.json"),
            r#"[{"CommodityCode":"0410000","CountryName":"Brazil ","MarketYear":"2023",
                "AttributeDescription":"Area Harvested","Value":21500,"CalendarYear":"2024","Month":"07"}]"#,
        )
        .unwrap();
        std::fs::write(
            world.join("0410000_world_data_2023.json"),
            r#"[{"CommodityCode":"0410000","CountryName":"World","MarketYear":"2023",
                "AttributeDescription":"Production","Value":1.5,"CalendarYear":"2024","Month":"07"}]"#,
        )
        .unwrap();
        std::fs::write(world.join("notes.txt"), "not json").unwrap();

        let output = dir.path().join("processed").join("consolidated").join("consolidated_data.csv");
        let count = consolidate_raw_records(&[world, country], &output).await.unwrap();
        assert_eq!(count, 2);

        let mut reader = csv::Reader::from_path(&output).unwrap();
        let mut rows: Vec<ConsolidatedRow> =
            reader.deserialize().collect::<Result<_, _>>().unwrap();
        rows.sort_by(|a, b| a.country_name.cmp(&b.country_name));
        assert_eq!(rows[0].country_name, "Brazil");
        assert_eq!(rows[0].attribute_description, "AreaHarvested");
        assert_eq!(rows[0].commodity_code, 410000);
        assert_eq!(rows[0].value, "21500");
        assert_eq!(rows[1].value, "1.5");
    }

    #[tokio::test]
    async fn malformed_json_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "[{").unwrap();
        let output = dir.path().join("out.csv");
        let result = consolidate_raw_records(&[dir.path().to_path_buf()], &output).await;
        assert!(matches!(result, Err(AppError::SerdeParse(_))));
    }
}
