use crate::error::{AppError, AppResult};
use crate::model::common::{normalize_commodity_code, strip_whitespace, CommodityCode};
use crate::model::record::{CodeMappingRow, ConsolidatedRow, HeaderMappingRow};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub cod: String,
    pub header: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedRow {
    pub cod: String,
    pub header: String,
    pub market_year: String,
    pub value: String,
}

type JoinKey = (String, CommodityCode, String);

/// Code table joined with header table, keyed on (country, commodity, attribute).
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    by_key: HashMap<JoinKey, Vec<Placement>>,
}

pub async fn read_semicolon_table<T: DeserializeOwned>(path: &Path) -> AppResult<Vec<T>> {
    let bytes = fs::read(path)
        .await
        .map_err(|e| AppError::reference_table(path, e.to_string()))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(bytes.as_slice());

    reader
        .deserialize::<T>()
        .enumerate()
        .map(|(idx, row)| {
            row.map_err(|e| AppError::reference_table(path, format!("line {}: {}", idx + 2, e)))
        })
        .collect()
}

fn reference_code(raw: &str, table: &str) -> AppResult<CommodityCode> {
    normalize_commodity_code(raw).ok_or_else(|| AppError::ReferenceTable {
        path: table.to_string(),
        reason: format!("CommodityCode '{}' is not numeric", raw),
    })
}

impl ReferenceIndex {
    pub fn build(codes: &[CodeMappingRow], headers: &[HeaderMappingRow]) -> AppResult<Self> {
        let mut headers_by_code: HashMap<(&str, CommodityCode), Vec<&HeaderMappingRow>> =
            HashMap::new();
        for row in headers {
            if row.cod.is_empty() || row.header.is_empty() {
                continue;
            }
            let code = reference_code(&row.commodity_code, "header table")?;
            headers_by_code
                .entry((row.cod.as_str(), code))
                .or_default()
                .push(row);
        }

        let mut by_key: HashMap<JoinKey, Vec<Placement>> = HashMap::new();
        for row in codes {
            if row.cod.is_empty() {
                continue;
            }
            let code = reference_code(&row.commodity_code, "code table")?;
            let Some(matches) = headers_by_code.get(&(row.cod.as_str(), code)) else {
                continue;
            };
            for header_row in matches {
                by_key
                    .entry((
                        row.country.clone(),
                        code,
                        strip_whitespace(&header_row.attribute_description),
                    ))
                    .or_default()
                    .push(Placement {
                        cod: row.cod.clone(),
                        header: header_row.header.clone(),
                    });
            }
        }

        Ok(ReferenceIndex { by_key })
    }

    pub fn key_count(&self) -> usize {
        self.by_key.len()
    }

    pub fn placements(&self, row: &ConsolidatedRow) -> &[Placement] {
        self.by_key
            .get(&(
                row.country_name.clone(),
                row.commodity_code,
                row.attribute_description.clone(),
            ))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Rows without a (cod, header) placement, or without a market year, are dropped.
    pub fn join(&self, rows: &[ConsolidatedRow]) -> Vec<JoinedRow> {
        rows.iter()
            .filter(|row| !row.market_year.trim().is_empty())
            .flat_map(|row| {
                self.placements(row).iter().map(move |p| JoinedRow {
                    cod: p.cod.clone(),
                    header: p.header.clone(),
                    market_year: row.market_year.trim().to_string(),
                    value: row.value.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_row(cod: &str, code: &str, country: &str) -> CodeMappingRow {
        CodeMappingRow {
            cod: cod.into(),
            commodity_code: code.into(),
            country: country.into(),
        }
    }

    fn header_row(cod: &str, code: &str, attr: &str, header: &str) -> HeaderMappingRow {
        HeaderMappingRow {
            cod: cod.into(),
            commodity_code: code.into(),
            attribute_description: attr.into(),
            header: header.into(),
        }
    }

    fn consolidated(country: &str, code: CommodityCode, attr: &str, year: &str) -> ConsolidatedRow {
        ConsolidatedRow {
            commodity_code: code,
            country_name: country.into(),
            market_year: year.into(),
            attribute_description: attr.into(),
            value: "42".into(),
            calendar_year: "2024".into(),
            month: "07".into(),
        }
    }

    #[test]
    fn join_routes_matching_rows_and_drops_the_rest() {
        let index = ReferenceIndex::build(
            &[
                code_row("USDA_PSD_Corn", "0410000", "United States"),
                code_row("USDA_PSD_Orphan", "410000", "Brazil"),
            ],
            &[header_row("USDA_PSD_Corn", "410000", "Area Harvested", "ARH")],
        )
        .unwrap();
        assert_eq!(index.key_count(), 1);

        let rows = vec![
            consolidated("United States", 410000, "AreaHarvested", "2023"),
            consolidated("Brazil", 410000, "AreaHarvested", "2023"),
            consolidated("United States", 410000, "Production", "2023"),
            consolidated("United States", 410000, "AreaHarvested", ""),
        ];
        let joined = index.join(&rows);
        assert_eq!(
            joined,
            vec![JoinedRow {
                cod: "USDA_PSD_Corn".into(),
                header: "ARH".into(),
                market_year: "2023".into(),
                value: "42".into(),
            }]
        );
    }

    #[test]
    fn one_row_can_feed_several_codes() {
        let index = ReferenceIndex::build(
            &[
                code_row("USDA_PSD_A", "410000", "World"),
                code_row("USDA_PSD_B", "410000", "World"),
            ],
            &[
                header_row("USDA_PSD_A", "410000", "Production", "PRO"),
                header_row("USDA_PSD_B", "410000", "Production", "PRO"),
            ],
        )
        .unwrap();
        let joined = index.join(&[consolidated("World", 410000, "Production", "2020")]);
        let cods: Vec<&str> = joined.iter().map(|j| j.cod.as_str()).collect();
        assert_eq!(cods, vec!["USDA_PSD_A", "USDA_PSD_B"]);
    }

    #[test]
    fn non_numeric_reference_code_is_rejected() {
        let result = ReferenceIndex::build(&[code_row("X", "abc", "World")], &[]);
        assert!(matches!(result, Err(AppError::ReferenceTable { .. })));
    }

    #[tokio::test]
    async fn semicolon_tables_load_and_missing_tables_fail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ipv_reference.csv");
        std::fs::write(
            &path,
            "cod;CommodityCode;Country;Region\nUSDA_PSD_Corn;410000;United States;Americas\n",
        )
        .unwrap();
        let rows: Vec<CodeMappingRow> = read_semicolon_table(&path).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].country, "United States");
        assert_eq!(rows[0].commodity_code, "410000");

        let missing: AppResult<Vec<CodeMappingRow>> =
            read_semicolon_table(&dir.path().join("absent.csv")).await;
        assert!(matches!(missing, Err(AppError::ReferenceTable { .. })));
    }
}
