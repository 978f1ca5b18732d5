use colored::*;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Step,
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    fn label(&self) -> &'static str {
        match self {
            LogLevel::Step => "STEP",
            LogLevel::Info => "INFO",
            LogLevel::Success => "SUCCESS",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }

    fn color(&self) -> Color {
        match self {
            LogLevel::Step => Color::Magenta,
            LogLevel::Info => Color::Cyan,
            LogLevel::Success => Color::Green,
            LogLevel::Warning => Color::Yellow,
            LogLevel::Error => Color::Red,
        }
    }
}

const ALL_LEVELS: [LogLevel; 5] = [
    LogLevel::Step,
    LogLevel::Info,
    LogLevel::Success,
    LogLevel::Warning,
    LogLevel::Error,
];

static PREFIX_WIDTH: Lazy<usize> = Lazy::new(|| {
    ALL_LEVELS
        .iter()
        .map(|l| l.label().len() + 4)
        .max()
        .unwrap_or(11)
        + 1
});

static LOG_PREFIXES: Lazy<HashMap<LogLevel, String>> = Lazy::new(|| {
    colored::control::set_override(true);

    ALL_LEVELS
        .iter()
        .map(|level| {
            let label = level.label();
            let colored_part = format!(" {} ", label).color(level.color()).bold();
            let padding = PREFIX_WIDTH.saturating_sub(label.len() + 4);
            (*level, format!("[{}]{}", colored_part, " ".repeat(padding)))
        })
        .collect()
});

pub fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let format = tracing_subscriber::fmt::format()
        .without_time()
        .with_level(false)
        .with_target(false)
        .compact();

    tracing_subscriber::fmt()
        .event_format(format)
        .with_ansi(true)
        .with_env_filter(filter)
        .init();
}

pub fn log(level: LogLevel, message: &str) {
    let prefix = LOG_PREFIXES
        .get(&level)
        .cloned()
        .unwrap_or_else(|| format!("[{:<7}] ", level.label()));

    match level {
        LogLevel::Step => tracing::info!(target: "step", "{}{}", prefix, message),
        LogLevel::Info | LogLevel::Success => tracing::info!("{}{}", prefix, message),
        LogLevel::Warning => tracing::warn!("{}{}", prefix, message),
        LogLevel::Error => tracing::error!("{}{}", prefix, message),
    }
}

/// Append-only, timestamped failure log shared by all fetch units of a run.
#[derive(Debug)]
pub struct ErrorLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ErrorLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        ErrorLog {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format_line(message: &str) -> String {
        format!(
            "{}: {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            message.replace('\n', " ")
        )
    }

    /// Writes one line; a failing append is reported on the console only.
    pub async fn record(&self, message: &str) {
        let _guard = self.lock.lock().await;
        if let Err(e) = self.append(&Self::format_line(message)).await {
            log(
                LogLevel::Warning,
                &format!(
                    "Could not append to error log '{}': {}",
                    self.path.display(),
                    e
                ),
            );
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_line_is_timestamped_and_single_line() {
        let line = ErrorLog::format_line("first\nsecond");
        assert!(line.ends_with(": first second\n"));
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(&line[4..5], "-");
    }

    #[tokio::test]
    async fn records_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("logs").join("error_logs.txt"));
        log.record("one").await;
        log.record("two").await;
        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(": one"));
        assert!(lines[1].ends_with(": two"));
    }
}
