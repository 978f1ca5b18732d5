use super::common::{deserialize_flexible_text, CommodityCode};
use serde::{Deserialize, Serialize};

/// One element of a raw API response, restricted to the fields the pipeline reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawRecord {
    #[serde(default, deserialize_with = "deserialize_flexible_text")]
    pub commodity_code: String,
    #[serde(default, deserialize_with = "deserialize_flexible_text")]
    pub country_name: String,
    #[serde(default, deserialize_with = "deserialize_flexible_text")]
    pub market_year: String,
    #[serde(default, deserialize_with = "deserialize_flexible_text")]
    pub attribute_description: String,
    #[serde(default, deserialize_with = "deserialize_flexible_text")]
    pub value: String,
    #[serde(default, deserialize_with = "deserialize_flexible_text")]
    pub calendar_year: String,
    #[serde(default, deserialize_with = "deserialize_flexible_text")]
    pub month: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConsolidatedRow {
    pub commodity_code: CommodityCode,
    pub country_name: String,
    pub market_year: String,
    pub attribute_description: String,
    pub value: String,
    pub calendar_year: String,
    pub month: String,
}

/// Code table row: where a (country, commodity) pair is routed.
#[derive(Debug, Clone, Deserialize)]
pub struct CodeMappingRow {
    pub cod: String,
    #[serde(rename = "CommodityCode", deserialize_with = "deserialize_flexible_text")]
    pub commodity_code: String,
    #[serde(rename = "Country", alias = "CountryName")]
    pub country: String,
}

/// Header table row: which output column an attribute lands in.
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderMappingRow {
    pub cod: String,
    #[serde(rename = "CommodityCode", deserialize_with = "deserialize_flexible_text")]
    pub commodity_code: String,
    #[serde(rename = "AttributeDescription")]
    pub attribute_description: String,
    pub header: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_record_tolerates_numeric_and_missing_fields() {
        let json = r#"[{"CommodityCode":"0410000","CountryName":"Brazil ","MarketYear":2023,
            "AttributeDescription":"Area Harvested","Value":21500,"Month":"07","Extra":true}]"#;
        let records: Vec<RawRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.market_year, "2023");
        assert_eq!(rec.value, "21500");
        assert_eq!(rec.calendar_year, "");
        assert_eq!(rec.month, "07");
    }
}
