use crate::error::{AppError, AppResult};
use crate::io;
use crate::logging::{log, LogLevel};
use crate::model::period::{Period, Watermark};
use std::path::PathBuf;
use tokio::fs;

/// Persists the last fetched and last materialized reporting periods.
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    path: PathBuf,
}

impl WatermarkStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        WatermarkStore { path: path.into() }
    }

    /// Never fails: missing or unreadable state reads as the sentinel.
    pub async fn read(&self) -> Watermark {
        let content = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log(
                        LogLevel::Warning,
                        &format!(
                            "Watermark '{}' unreadable ({}), using sentinel.",
                            self.path.display(),
                            e
                        ),
                    );
                }
                return Watermark::default();
            }
        };

        match serde_json::from_slice::<Watermark>(&content) {
            Ok(watermark) => watermark,
            Err(e) => {
                log(
                    LogLevel::Warning,
                    &format!(
                        "Watermark '{}' is not valid JSON ({}), using sentinel.",
                        self.path.display(),
                        e
                    ),
                );
                Watermark::default()
            }
        }
    }

    pub async fn write_fetched(&self, period: Period) -> AppResult<Watermark> {
        let mut watermark = self.read().await;
        watermark.last_fetched = period.into();
        self.write(&watermark).await?;
        Ok(watermark)
    }

    pub async fn promote_updated(&self) -> AppResult<Watermark> {
        let mut watermark = self.read().await;
        watermark.last_updated = watermark.last_fetched.clone();
        self.write(&watermark).await?;
        Ok(watermark)
    }

    async fn write(&self, watermark: &Watermark) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            io::ensure_dirs(&[parent.to_path_buf()]).await?;
        }
        let bytes = serde_json::to_vec(watermark).map_err(AppError::from)?;
        io::replace_file_async(&self.path, &bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::period::WatermarkEntry;

    #[tokio::test]
    async fn missing_file_reads_as_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let store = WatermarkStore::new(dir.path().join("logs").join("update_log.json"));
        assert_eq!(store.read().await, Watermark::default());
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("update_log.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert_eq!(WatermarkStore::new(path).read().await, Watermark::default());
    }

    #[tokio::test]
    async fn write_fetched_preserves_last_updated() {
        let dir = tempfile::tempdir().unwrap();
        let store = WatermarkStore::new(dir.path().join("logs").join("update_log.json"));

        store.write_fetched(Period::new(2024, 6)).await.unwrap();
        store.promote_updated().await.unwrap();
        let wm = store.write_fetched(Period::new(2024, 7)).await.unwrap();

        assert_eq!(wm.last_fetched, WatermarkEntry::from(Period::new(2024, 7)));
        assert_eq!(wm.last_updated, WatermarkEntry::from(Period::new(2024, 6)));
        assert_eq!(store.read().await, wm);
    }

    #[tokio::test]
    async fn promote_copies_fetched_into_updated() {
        let dir = tempfile::tempdir().unwrap();
        let store = WatermarkStore::new(dir.path().join("update_log.json"));
        store.write_fetched(Period::new(2025, 5)).await.unwrap();
        let wm = store.promote_updated().await.unwrap();
        assert_eq!(wm.last_updated, wm.last_fetched);
        assert!(wm.last_updated.as_period() <= wm.last_fetched.as_period());
    }
}
