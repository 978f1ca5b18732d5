use crate::config::{self, PipelineConfig};
use crate::error::{AppError, AppResult};
use crate::logging::{log, LogLevel};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Synchronizes the USDA PSD archive and materializes per-period IPV files.",
    long_about = None
)]
pub struct CliArgs {
    #[arg(
        long,
        default_value = config::DEFAULT_DATA_DIR,
        value_name = "DIR_PATH",
        help = "Data directory holding raw/, processed/, ipvs/ and logs/"
    )]
    data_dir: String,

    #[arg(
        long,
        env = config::API_KEY_ENV,
        hide_env_values = true,
        default_value = "",
        value_name = "KEY",
        help = "API key sent with every request to the PSD API"
    )]
    api_key: String,

    #[arg(
        long,
        default_value_t = config::DEFAULT_MAX_CONCURRENT,
        value_name = "N",
        help = "Maximum number of API requests in flight"
    )]
    max_concurrent: usize,

    #[arg(
        long,
        num_args = 1..,
        value_delimiter = ',',
        value_name = "CODES",
        help = "Commodity codes to archive (defaults to the built-in list)"
    )]
    codes: Vec<String>,
}

impl CliArgs {
    pub fn get_data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn get_codes(&self) -> AppResult<Vec<String>> {
        if self.codes.is_empty() {
            return Ok(config::COMMODITY_CODES.clone());
        }

        let mut valid = Vec::new();
        let mut invalid = Vec::new();
        for code in &self.codes {
            let code = code.trim();
            if !code.is_empty() && code.chars().all(|c| c.is_ascii_digit()) {
                valid.push(code.to_string());
            } else {
                invalid.push(code.to_string());
            }
        }

        if !invalid.is_empty() {
            log(
                LogLevel::Warning,
                &format!("Ignoring invalid commodity codes: {}", invalid.join(", ")),
            );
        }
        if valid.is_empty() {
            return Err(AppError::Argument(
                "No valid commodity codes specified.".into(),
            ));
        }
        valid.sort_unstable();
        valid.dedup();
        Ok(valid)
    }

    pub fn to_config(&self) -> AppResult<PipelineConfig> {
        if self.max_concurrent == 0 {
            return Err(AppError::Argument(
                "--max-concurrent must be at least 1".into(),
            ));
        }
        if self.api_key.is_empty() {
            log(
                LogLevel::Warning,
                &format!(
                    "No API key given (--api-key or {}); requests may be rejected.",
                    config::API_KEY_ENV
                ),
            );
        }

        let mut cfg = PipelineConfig::new(self.get_data_dir(), self.api_key.clone());
        cfg.max_concurrent = self.max_concurrent;
        cfg.commodity_codes = self.get_codes()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_builtin_codes() {
        let args = CliArgs::try_parse_from(["psd_update"]).unwrap();
        let cfg = args.to_config().unwrap();
        assert_eq!(cfg.commodity_codes.len(), 27);
        assert_eq!(cfg.data_dir, PathBuf::from(config::DEFAULT_DATA_DIR));
        assert_eq!(cfg.max_concurrent, config::DEFAULT_MAX_CONCURRENT);
    }

    #[test]
    fn codes_override_filters_invalid_entries() {
        let args = CliArgs::try_parse_from([
            "psd_update",
            "--codes",
            "0410000,abc,0410000,0440000",
            "--max-concurrent",
            "3",
        ])
        .unwrap();
        let cfg = args.to_config().unwrap();
        assert_eq!(cfg.commodity_codes, vec!["0410000", "0440000"]);
        assert_eq!(cfg.max_concurrent, 3);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let args = CliArgs::try_parse_from(["psd_update", "--max-concurrent", "0"]).unwrap();
        assert!(matches!(args.to_config(), Err(AppError::Argument(_))));
    }
}
