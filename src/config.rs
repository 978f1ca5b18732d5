use crate::error::{AppError, AppResult};
use crate::model::period::Period;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_MAX_CONCURRENT: usize = 8;
pub const MAX_IPV_WRITE_CONCUR: usize = 16;

pub const HTTP_TIMEOUT_SECONDS: u64 = 60;
pub const HTTP_CONNECT_TIMEOUT: u64 = 20;
pub const MAX_ATTEMPTS: u32 = 5;
pub const RETRY_DELAY_BASE_SECS: f32 = 1.0;

const BASE_API_URL: &str = "https://apps.fas.usda.gov/PSDOnlineDataServices/api/CommodityData";
pub static COUNTRY_ENDPOINT: Lazy<String> =
    Lazy::new(|| format!("{}/GetCommodityDataByYear", BASE_API_URL));
pub static WORLD_ENDPOINT: Lazy<String> =
    Lazy::new(|| format!("{}/GetWorldCommodityDataByYear", BASE_API_URL));

pub const API_KEY_HEADER: &str = "api_key";
pub const API_KEY_ENV: &str = "PSD_API_KEY";

pub const PROBE_COMMODITY_CODE: &str = "0410000";

pub static COMMODITY_CODES: Lazy<Vec<String>> = Lazy::new(|| {
    vec![
        "0440000", "2231000", "2223000", "2232000", "2221000", "2226000", "2222000", "2224000",
        "4232000", "0813100", "0410000", "4233000", "4235000", "4243000", "4244000", "4234000",
        "4239100", "4236000", "4242000", "0813700", "0813300", "0814200", "0813800", "0813200",
        "0813600", "0813500", "2631000",
    ]
    .into_iter()
    .map(String::from)
    .collect()
});

pub const IPV_COD_COLUMN: &str = "<cod>";
pub const IPV_DATA_COLUMN: &str = "<data>";

pub const IPV_HEADERS: [&str; 35] = [
    "<cod>", "<data>", "<ARH>", "<BES>", "<ENS>", "<FSC>", "<FAR>", "<MYI>", "<PRO>", "<TIU>",
    "<TYI>", "<TTC>", "<TTD>", "<TTS>", "<YLD>", "<MYE>", "<TYE>", "<CIU>", "<CRU>", "<MIU>",
    "<FWD>", "<TDC>", "<CYI>", "<EXR>", "<MIE>", "<SME>", "<CEU>", "<CYE>", "<MEE>", "<FDC>",
    "<IDC>", "<CFR>", "<ARP>", "<SLR>", "<TRE>",
];

pub const IPV_FILE_PREFIX: &str = "USDA";
pub const IPV_ARTIFACT_PREFIX: &str = "USDA_PSD";
pub const IPV_EXTENSION: &str = "ipv";

pub const CONSOLIDATED_HEADERS: [&str; 7] = [
    "CommodityCode",
    "CountryName",
    "MarketYear",
    "AttributeDescription",
    "Value",
    "CalendarYear",
    "Month",
];

pub const UP_TO_DATE_MESSAGE: &str = "Data for the current month is already up to date.";

pub static BASE_HEADERS: Lazy<HeaderMap> = Lazy::new(|| {
    let mut h = HeaderMap::new();
    h.insert(ACCEPT, HeaderValue::from_static("application/json"));
    h
});

pub static FORBIDDEN_CHARS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f\x7f]"#).unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Country,
    World,
}

impl Scope {
    pub const ALL: [Scope; 2] = [Scope::Country, Scope::World];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Country => "country",
            Scope::World => "world",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: MAX_ATTEMPTS,
            base_delay: Duration::from_secs_f32(RETRY_DELAY_BASE_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2_u32.saturating_pow(attempt))
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub api_key: String,
    pub country_endpoint: String,
    pub world_endpoint: String,
    pub commodity_codes: Vec<String>,
    pub probe_code: String,
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
    pub http_timeout: Duration,
    pub connect_timeout: Duration,
}

impl PipelineConfig {
    pub fn new<P: Into<PathBuf>>(data_dir: P, api_key: impl Into<String>) -> Self {
        PipelineConfig {
            data_dir: data_dir.into(),
            api_key: api_key.into(),
            country_endpoint: COUNTRY_ENDPOINT.clone(),
            world_endpoint: WORLD_ENDPOINT.clone(),
            commodity_codes: COMMODITY_CODES.clone(),
            probe_code: PROBE_COMMODITY_CODE.to_string(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            retry: RetryPolicy::default(),
            http_timeout: Duration::from_secs(HTTP_TIMEOUT_SECONDS),
            connect_timeout: Duration::from_secs(HTTP_CONNECT_TIMEOUT),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.commodity_codes.is_empty() {
            return Err(AppError::ConfigError("Commodity code list is empty".into()));
        }
        if self.max_concurrent == 0 {
            return Err(AppError::ConfigError(
                "max_concurrent must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::ConfigError(
                "Retry policy needs at least one attempt".into(),
            ));
        }
        HeaderValue::from_str(&self.api_key)
            .map_err(|_| AppError::ConfigError("API key is not a valid header value".into()))?;
        Ok(())
    }

    pub fn request_headers(&self) -> AppResult<HeaderMap> {
        let mut headers = BASE_HEADERS.clone();
        if !self.api_key.is_empty() {
            headers.insert(
                HeaderName::from_static(API_KEY_HEADER),
                HeaderValue::from_str(&self.api_key).map_err(|_| {
                    AppError::ConfigError("API key is not a valid header value".into())
                })?,
            );
        }
        Ok(headers)
    }

    pub fn endpoint(&self, scope: Scope) -> &str {
        match scope {
            Scope::Country => &self.country_endpoint,
            Scope::World => &self.world_endpoint,
        }
    }

    pub fn raw_dir(&self, scope: Scope) -> PathBuf {
        self.data_dir.join("raw").join(scope.as_str())
    }

    pub fn consolidated_dir(&self) -> PathBuf {
        self.data_dir.join("processed").join("consolidated")
    }

    pub fn consolidated_csv(&self) -> PathBuf {
        self.consolidated_dir().join("consolidated_data.csv")
    }

    pub fn code_table_path(&self) -> PathBuf {
        self.data_dir.join("processed").join("ipv_reference.csv")
    }

    pub fn header_table_path(&self) -> PathBuf {
        self.data_dir.join("processed").join("ipv_list.csv")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn watermark_path(&self) -> PathBuf {
        self.logs_dir().join("update_log.json")
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.logs_dir().join("error_logs.txt")
    }

    pub fn period_dir(&self, period: &Period) -> PathBuf {
        self.data_dir.join("ipvs").join(period.dir_label())
    }

    pub fn artifact_path(&self, period: &Period) -> PathBuf {
        artifact_path_in(&self.period_dir(period), period)
    }

    /// Directories emptied at the end of every run.
    pub fn working_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.raw_dir(Scope::Country),
            self.raw_dir(Scope::World),
            self.consolidated_dir(),
        ]
    }
}

pub fn artifact_path_in(period_dir: &Path, period: &Period) -> PathBuf {
    period_dir.join("final").join(format!(
        "{}_{}.{}",
        IPV_ARTIFACT_PREFIX,
        period.dir_label(),
        IPV_EXTENSION
    ))
}
