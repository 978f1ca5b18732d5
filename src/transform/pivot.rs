use super::reference::JoinedRow;
use crate::config::{IPV_COD_COLUMN, IPV_DATA_COLUMN, IPV_EXTENSION};
use crate::error::{AppError, AppResult};
use crate::io;
use crate::model::period::Period;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Wide time series for one output code: one row per market year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpvTable {
    pub cod: String,
    pub columns: Vec<String>,
    pub rows: Vec<IpvRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpvRow {
    pub market_year: String,
    pub cells: HashMap<String, String>,
}

impl IpvRow {
    pub fn date(&self) -> String {
        format!("{}-01-01", self.market_year)
    }
}

/// `ARH` -> `<ARH>`; labels already in brackets are kept.
pub fn column_label(header: &str) -> String {
    let trimmed = header.trim();
    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        trimmed.to_string()
    } else {
        format!("<{}>", trimmed)
    }
}

fn compare_market_years(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn pivot_code(cod: String, rows: Vec<JoinedRow>) -> AppResult<IpvTable> {
    let mut columns: BTreeSet<String> = BTreeSet::new();
    let mut by_year: HashMap<String, HashMap<String, String>> = HashMap::new();

    for row in rows {
        let column = column_label(&row.header);
        if column == IPV_COD_COLUMN || column == IPV_DATA_COLUMN {
            return Err(AppError::integrity(
                &cod,
                format!("header '{}' collides with the {} prefix", row.header, column),
            ));
        }

        let cells = by_year.entry(row.market_year.clone()).or_default();
        match cells.get(&column) {
            Some(existing) if *existing != row.value => {
                return Err(AppError::PivotConflict {
                    cod,
                    market_year: row.market_year,
                    column,
                    first: existing.clone(),
                    second: row.value,
                });
            }
            Some(_) => {}
            None => {
                cells.insert(column.clone(), row.value);
                columns.insert(column);
            }
        }
    }

    let mut ipv_rows: Vec<IpvRow> = by_year
        .into_iter()
        .map(|(market_year, cells)| IpvRow { market_year, cells })
        .collect();
    ipv_rows.sort_by(|a, b| compare_market_years(&a.market_year, &b.market_year));

    Ok(IpvTable {
        cod,
        columns: columns.into_iter().collect(),
        rows: ipv_rows,
    })
}

/// Groups joined rows by `cod` and pivots each group to wide form.
pub fn pivot_by_code(joined: Vec<JoinedRow>) -> AppResult<Vec<IpvTable>> {
    let mut groups: BTreeMap<String, Vec<JoinedRow>> = BTreeMap::new();
    for row in joined {
        groups.entry(row.cod.clone()).or_default().push(row);
    }
    groups
        .into_iter()
        .map(|(cod, rows)| pivot_code(cod, rows))
        .collect()
}

impl IpvTable {
    pub fn header(&self) -> Vec<&str> {
        [IPV_COD_COLUMN, IPV_DATA_COLUMN]
            .into_iter()
            .chain(self.columns.iter().map(String::as_str))
            .collect()
    }

    pub fn file_name(&self, period: &Period) -> String {
        format!(
            "{}_{}_{}.{}",
            io::clean_filename(&self.cod),
            period.year,
            period.month_label(),
            IPV_EXTENSION
        )
    }

    pub fn to_csv_bytes(&self) -> AppResult<Vec<u8>> {
        let header = self.header();
        if header.len() < 2 || header[0] != IPV_COD_COLUMN || header[1] != IPV_DATA_COLUMN {
            return Err(AppError::integrity(
                &self.cod,
                "expected <cod>/<data> prefix is missing",
            ));
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&header)?;
        for row in &self.rows {
            let mut record: Vec<String> = Vec::with_capacity(header.len());
            record.push(self.cod.clone());
            record.push(row.date());
            for column in &self.columns {
                record.push(row.cells.get(column).cloned().unwrap_or_default());
            }
            writer.write_record(&record)?;
        }
        writer
            .into_inner()
            .map_err(|e| AppError::Csv(format!("Failed to flush IPV table '{}': {}", self.cod, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(cod: &str, header: &str, year: &str, value: &str) -> JoinedRow {
        JoinedRow {
            cod: cod.into(),
            header: header.into(),
            market_year: year.into(),
            value: value.into(),
        }
    }

    #[test]
    fn pivots_years_to_rows_and_headers_to_columns() {
        let tables = pivot_by_code(vec![
            joined("USDA_PSD_Corn", "PRO", "2024", "15"),
            joined("USDA_PSD_Corn", "ARH", "2023", "30"),
            joined("USDA_PSD_Corn", "ARH", "2024", "31"),
            joined("USDA_PSD_Soy", "<YLD>", "2024", "3.2"),
        ])
        .unwrap();
        assert_eq!(tables.len(), 2);

        let corn = &tables[0];
        assert_eq!(corn.header(), vec!["<cod>", "<data>", "<ARH>", "<PRO>"]);
        let csv = String::from_utf8(corn.to_csv_bytes().unwrap()).unwrap();
        assert_eq!(
            csv,
            "<cod>,<data>,<ARH>,<PRO>\n\
             USDA_PSD_Corn,2023-01-01,30,\n\
             USDA_PSD_Corn,2024-01-01,31,15\n"
        );

        assert_eq!(tables[1].columns, vec!["<YLD>".to_string()]);
    }

    #[test]
    fn identical_duplicates_collapse_conflicts_fail() {
        let tables = pivot_by_code(vec![
            joined("C", "ARH", "2024", "1"),
            joined("C", "ARH", "2024", "1"),
        ])
        .unwrap();
        assert_eq!(tables[0].rows.len(), 1);

        let result = pivot_by_code(vec![
            joined("C", "ARH", "2024", "1"),
            joined("C", "ARH", "2024", "2"),
        ]);
        assert!(matches!(result, Err(AppError::PivotConflict { .. })));
    }

    #[test]
    fn header_colliding_with_prefix_is_an_integrity_error() {
        let result = pivot_by_code(vec![joined("C", "data", "2024", "1")]);
        assert!(matches!(result, Err(AppError::IpvIntegrity { .. })));
    }

    #[test]
    fn file_name_is_sanitized_and_period_stamped() {
        let table = IpvTable {
            cod: "USDA:PSD:Corn".into(),
            columns: vec![],
            rows: vec![],
        };
        assert_eq!(
            table.file_name(&Period::new(2024, 7)),
            "USDA_PSD_Corn_2024_07.ipv"
        );
    }
}
