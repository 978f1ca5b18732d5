use clap::{CommandFactory, Parser};
use psd_update::cli::CliArgs;
use psd_update::config;
use psd_update::core::processor::{self, RunOutcome};
use psd_update::error::AppError;
use psd_update::logging::{log, setup_logging, LogLevel};
use std::process::ExitCode;
use std::time::Instant;
use tokio::runtime::Builder;

fn main() -> ExitCode {
    setup_logging();
    let start_time = Instant::now();

    let cli_args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            if matches!(
                e.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            ) {
                let _ = e.print();
                return ExitCode::SUCCESS;
            }
            log(LogLevel::Error, &format!("CLI Argument Error: {}", e));
            let _ = CliArgs::command().print_help();
            return ExitCode::from(2);
        }
    };

    let pipeline_config = match cli_args.to_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            log(LogLevel::Error, &e.to_string());
            let _ = CliArgs::command().print_help();
            return ExitCode::from(2);
        }
    };

    let runtime = match Builder::new_current_thread()
        .enable_all()
        .thread_name("psd-worker")
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log(
                LogLevel::Error,
                &format!("FATAL: Failed to build Tokio runtime: {}", e),
            );
            return ExitCode::FAILURE;
        }
    };

    let today = chrono::Local::now().date_naive();
    let result = runtime.block_on(processor::run(pipeline_config, today));
    let elapsed = start_time.elapsed().as_secs_f64();

    match result {
        Ok(RunOutcome::UpToDate(_)) => {
            println!("{}", config::UP_TO_DATE_MESSAGE);
            println!("Execution time: {:.2} seconds", elapsed);
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Completed(report)) => {
            log(
                LogLevel::Success,
                &format!(
                    "Period {} materialized: {} IPV file(s), {} row(s) in {}",
                    report.reporting_period,
                    report.ipv_files,
                    report.artifact_rows,
                    report.artifact.display()
                ),
            );
            println!("Execution time: {:.2} seconds", elapsed);
            ExitCode::SUCCESS
        }
        Err(e) => {
            if !matches!(e, AppError::Argument(_)) {
                log(LogLevel::Error, &format!("FATAL: {:?}", e));
            }
            println!("An error occurred during data processing: {}", e);
            println!("Execution time: {:.2} seconds", elapsed);
            ExitCode::FAILURE
        }
    }
}
