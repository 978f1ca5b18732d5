use crate::config::{PipelineConfig, RetryPolicy};
use crate::error::{AppError, AppResult};
use crate::logging::{log, ErrorLog, LogLevel};
use crate::model::record::RawRecord;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use tokio::time::sleep;

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    retry: RetryPolicy,
}

pub fn request_url(endpoint: &str, code: &str, year: i32) -> String {
    format!("{}?commodityCode={}&marketYear={}", endpoint, code, year)
}

pub fn parse_records(bytes: &[u8], url: &str) -> AppResult<Vec<RawRecord>> {
    serde_json::from_slice::<Vec<RawRecord>>(bytes).map_err(|e| {
        let snippet_len = bytes.len().min(200);
        let snippet = String::from_utf8_lossy(&bytes[..snippet_len]);
        log(
            LogLevel::Warning,
            &format!(
                "Response from {} is not a JSON record array: {}. Snippet: '{}'",
                url, e, snippet
            ),
        );
        AppError::from(e)
    })
}

impl ApiClient {
    pub fn new(config: &PipelineConfig) -> AppResult<Self> {
        let client = Client::builder()
            .default_headers(config.request_headers()?)
            .timeout(config.http_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(AppError::from)?;
        Ok(ApiClient {
            client,
            retry: config.retry.clone(),
        })
    }

    /// 4xx and timeouts fail on first sight; 5xx and connection errors are retried up to the cap.
    pub async fn fetch_slice(
        &self,
        endpoint: &str,
        code: &str,
        year: i32,
        error_log: &ErrorLog,
    ) -> AppResult<Bytes> {
        let url = request_url(endpoint, code, year);
        let year_param = year.to_string();
        let mut last_error: Option<AppError> = None;

        for attempt in 0..self.retry.max_attempts {
            let log_prefix = format!("API Req {} (Try {})", url, attempt + 1);
            let request = self
                .client
                .get(endpoint)
                .query(&[("commodityCode", code), ("marketYear", year_param.as_str())]);

            let error = match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status == StatusCode::OK {
                        match resp.bytes().await {
                            Ok(body) => return Ok(body),
                            Err(e) => {
                                log(
                                    LogLevel::Warning,
                                    &format!("{} - Error reading response body: {}", log_prefix, e),
                                );
                                AppError::from(e)
                            }
                        }
                    } else {
                        let error = AppError::HttpStatus {
                            status: status.as_u16(),
                            url: url.clone(),
                        };
                        if status.is_server_error() {
                            log(
                                LogLevel::Warning,
                                &format!("{} - Server error. Status code: {}", log_prefix, status),
                            );
                            error_log
                                .record(&format!("Server error from {}: HTTP {}", url, status.as_u16()))
                                .await;
                        } else {
                            log(
                                LogLevel::Info,
                                &format!("{} - Request failed. Status code: {}", log_prefix, status),
                            );
                        }
                        error
                    }
                }
                Err(e) => {
                    if e.is_timeout() {
                        log(LogLevel::Warning, &format!("{} - Timeout: {}", log_prefix, e));
                        AppError::Timeout(url.clone())
                    } else {
                        let context_str = if e.is_connect() {
                            "Connection"
                        } else {
                            "Request"
                        };
                        log(
                            LogLevel::Warning,
                            &format!("{} - {} Error: {}", log_prefix, context_str, e),
                        );
                        AppError::from(e)
                    }
                }
            };

            if !error.is_retryable() {
                return Err(error);
            }
            last_error = Some(error);

            if attempt + 1 < self.retry.max_attempts {
                sleep(self.retry.delay_for(attempt)).await;
            }
        }

        Err(AppError::RetriesExhausted {
            url,
            attempts: self.retry.max_attempts,
            reason: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt was made".to_string()),
        })
    }
}
