use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum AppError {
    #[error("HTTP request failed: {0}")]
    Reqwest(String),
    #[error("Filesystem I/O error: {0}")]
    Io(String),
    #[error("JSON serialization error: {0}")]
    SerdeSerialize(String),
    #[error("JSON parsing error: {0}")]
    SerdeParse(String),
    #[error("CSV error: {0}")]
    Csv(String),
    #[error("Request rejected with HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("Permanent failure for {url} after {attempts} attempt(s): {reason}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        reason: String,
    },
    #[error("Timeout while fetching data from {0}")]
    Timeout(String),
    #[error("Failed to fetch data for years {year} and {previous} for period determination")]
    PeriodUndeterminable { year: i32, previous: i32 },
    #[error("Reference table '{path}' unavailable: {reason}")]
    ReferenceTable { path: String, reason: String },
    #[error("IPV integrity violation for code '{cod}': {message}")]
    IpvIntegrity { cod: String, message: String },
    #[error("Conflicting values for code '{cod}', market year {market_year}, column {column}: '{first}' vs '{second}'")]
    PivotConflict {
        cod: String,
        market_year: String,
        column: String,
        first: String,
        second: String,
    },
    #[error("Data transformation error: {0}")]
    Transform(String),
    #[error("Invalid argument provided: {0}")]
    Argument(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Reqwest(e.to_string())
    }
}
impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}
impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() || e.is_eof() || e.is_syntax() {
            AppError::SerdeParse(e.to_string())
        } else {
            AppError::SerdeSerialize(e.to_string())
        }
    }
}
impl From<csv::Error> for AppError {
    fn from(e: csv::Error) -> Self {
        AppError::Csv(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn reference_table<S: Into<String>>(path: &std::path::Path, reason: S) -> AppError {
        AppError::ReferenceTable {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    pub fn integrity<S: Into<String>>(cod: &str, message: S) -> AppError {
        AppError::IpvIntegrity {
            cod: cod.to_string(),
            message: message.into(),
        }
    }

    /// Connection-level and 5xx failures. A timeout ends the request as a miss.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Reqwest(_) => true,
            AppError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable_client_errors_and_timeouts_are_not() {
        let server = AppError::HttpStatus {
            status: 503,
            url: "http://x".into(),
        };
        let client = AppError::HttpStatus {
            status: 404,
            url: "http://x".into(),
        };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        let timeout = AppError::Timeout("http://x".into());
        assert!(!timeout.is_retryable());
        assert_eq!(timeout.to_string(), "Timeout while fetching data from http://x");
        assert!(!AppError::Transform("bad".into()).is_retryable());
    }
}
