use crate::config;
use crate::error::{AppError, AppResult};
use crate::logging::{log, LogLevel};
use crate::utils;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

/// Replaces path-hostile characters; case is preserved since the `USDA` prefix is significant.
pub fn clean_filename<S: AsRef<str>>(name: S) -> String {
    let name_ref = name.as_ref().trim();
    if name_ref.is_empty() {
        return "invalid_empty_name".to_string();
    }

    let cleaned = config::FORBIDDEN_CHARS_RE.replace_all(name_ref, "_");
    let cleaned = cleaned.replace(char::is_whitespace, "_");

    if cleaned.trim_matches('_').is_empty() {
        "invalid_or_empty_name".to_string()
    } else {
        cleaned
    }
}

pub async fn ensure_dirs(dirs: &[PathBuf]) -> AppResult<()> {
    for dir in dirs {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| map_io_error(e, dir))?;
    }
    Ok(())
}

pub fn map_io_error(error: std::io::Error, path: &Path) -> AppError {
    AppError::Io(format!("I/O error at path '{}': {}", path.display(), error))
}

pub async fn write_file_async(fpath: &Path, data: &[u8]) -> AppResult<()> {
    let mut file = File::create(fpath)
        .await
        .map_err(|e| map_io_error(e, fpath))?;
    file.write_all(data)
        .await
        .map_err(|e| map_io_error(e, fpath))?;
    file.flush().await.map_err(|e| map_io_error(e, fpath))?;

    Ok(())
}

/// Writes to a sibling temp file and renames it over the target.
pub async fn replace_file_async(fpath: &Path, data: &[u8]) -> AppResult<()> {
    let tmp_path = fpath.with_file_name(format!(".{}.tmp", utils::file_name_of(fpath)));

    write_file_async(&tmp_path, data).await?;
    if let Err(e) = fs::rename(&tmp_path, fpath).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(map_io_error(e, fpath));
    }
    Ok(())
}

pub async fn list_files(dir: &Path) -> AppResult<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(map_io_error(e, dir)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| map_io_error(e, dir))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| map_io_error(e, &entry.path()))?;
        if file_type.is_file() {
            files.push(entry.path());
        }
    }
    Ok(files)
}

pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

/// Removes every file and subdirectory inside `dir`, keeping `dir` itself.
pub async fn clear_directory(dir: &Path) -> AppResult<usize> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(map_io_error(e, dir)),
    };

    let mut removed = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| map_io_error(e, dir))?
    {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| map_io_error(e, &path))?;
        if file_type.is_dir() {
            fs::remove_dir_all(&path)
                .await
                .map_err(|e| map_io_error(e, &path))?;
        } else {
            fs::remove_file(&path)
                .await
                .map_err(|e| map_io_error(e, &path))?;
        }
        removed += 1;
    }
    Ok(removed)
}

pub async fn clear_working_dirs(dirs: &[PathBuf]) {
    for dir in dirs {
        match clear_directory(dir).await {
            Ok(0) => {}
            Ok(n) => log(
                LogLevel::Info,
                &format!("Cleared {} item(s) from {}", n, dir.display()),
            ),
            Err(e) => log(
                LogLevel::Warning,
                &format!("Cleanup of {} failed: {}", dir.display(), e),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_filename_keeps_case_and_replaces_colons() {
        assert_eq!(clean_filename("USDA:PSD:Corn"), "USDA_PSD_Corn");
        assert_eq!(clean_filename("USDA PSD/Soy"), "USDA_PSD_Soy");
        assert_eq!(clean_filename("  "), "invalid_empty_name");
        assert_eq!(clean_filename("::"), "invalid_or_empty_name");
    }

    #[tokio::test]
    async fn clear_directory_keeps_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), b"[]").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("b.json"), b"[]").unwrap();

        let removed = clear_directory(dir.path()).await.unwrap();
        assert_eq!(removed, 2);
        assert!(dir.path().exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let files = list_files(&dir.path().join("absent")).await.unwrap();
        assert!(files.is_empty());
        assert_eq!(clear_directory(&dir.path().join("absent")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn replace_file_overwrites_whole_document() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("update_log.json");
        replace_file_async(&target, b"{\"a\":1}").await.unwrap();
        replace_file_async(&target, b"{}").await.unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "{}");
        assert_eq!(list_files(dir.path()).await.unwrap().len(), 1);
    }
}
