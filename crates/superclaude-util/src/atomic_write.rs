//! Atomic file writes.
//!
//! Every persisted JSON artifact goes through temp file → fsync → rename so
//! a crash never leaves a half-written file behind. Renames that cross a
//! filesystem boundary fall back to copy → fsync → replace.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

/// Result of an atomic write operation.
#[derive(Debug, Clone, Default)]
pub struct AtomicWriteResult {
    /// Number of rename retries that occurred (Windows only).
    pub rename_retry_count: u32,
    /// Whether cross-filesystem fallback was used.
    pub used_cross_filesystem_fallback: bool,
    /// Any warnings generated during the operation.
    pub warnings: Vec<String>,
}

/// Atomically write content to a file using temp file + fsync + rename.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<AtomicWriteResult> {
    let mut result = AtomicWriteResult::default();

    // Normalize line endings to LF so digests are stable across platforms
    let normalized_content = normalize_line_endings(content);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {parent}"))?;
    }

    // Temp file must live in the target directory so the rename stays on
    // one filesystem in the common case
    let temp_dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut temp_file = NamedTempFile::new_in(temp_dir)
        .with_context(|| format!("Failed to create temporary file in: {temp_dir}"))?;

    temp_file
        .write_all(normalized_content.as_bytes())
        .context("Failed to write content to temporary file")?;

    temp_file
        .as_file()
        .sync_all()
        .context("Failed to fsync temporary file")?;

    let temp_path = temp_file.path().to_path_buf();

    match atomic_rename(temp_file, path.as_std_path()) {
        Ok(retry_count) => {
            result.rename_retry_count = retry_count;
            if retry_count > 0 {
                result.warnings.push(format!(
                    "Rename required {retry_count} retries due to transient filesystem locks"
                ));
            }
        }
        Err(e) if is_cross_filesystem_error(&e) => {
            result.used_cross_filesystem_fallback = true;
            result
                .warnings
                .push("Used cross-filesystem fallback (copy→fsync→replace)".to_string());
            cross_filesystem_copy(&temp_path, path)?;
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to atomically write file: {path}"));
        }
    }

    Ok(result)
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

/// Rename the temp file over the target.
///
/// Returns the number of retries that were needed. On Windows the rename can
/// hit transient sharing violations, so it retries with bounded exponential
/// backoff (≤ 250ms total); elsewhere a single attempt suffices.
#[cfg(not(target_os = "windows"))]
fn atomic_rename(temp_file: NamedTempFile, target: &Path) -> Result<u32> {
    match temp_file.persist(target) {
        Ok(_) => Ok(0),
        Err(e) => {
            // Keep the temp file on disk so the cross-filesystem fallback
            // can still copy from it
            let _ = e.file.keep();
            Err(anyhow::Error::from(e.error))
        }
    }
}

#[cfg(target_os = "windows")]
fn atomic_rename(temp_file: NamedTempFile, target: &Path) -> Result<u32> {
    use std::{thread, time::Duration};

    const MAX_RETRIES: u32 = 5;
    const INITIAL_DELAY_MS: u64 = 10;
    const MAX_TOTAL_DELAY_MS: u64 = 250;

    // Disarm auto-delete; the rename (or the caller's fallback) owns the file now
    let (file, temp_path) = temp_file
        .keep()
        .map_err(|e| anyhow::Error::from(e.error))?;
    drop(file);

    let mut retry_count = 0;
    let mut total_delay_ms = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        match fs::rename(&temp_path, target) {
            Ok(()) => return Ok(retry_count),
            Err(e) => {
                let transient = matches!(
                    e.kind(),
                    std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::AlreadyExists
                );
                if !transient
                    || retry_count >= MAX_RETRIES
                    || total_delay_ms + delay_ms > MAX_TOTAL_DELAY_MS
                {
                    return Err(anyhow::Error::from(e));
                }
                thread::sleep(Duration::from_millis(delay_ms));
                total_delay_ms += delay_ms;
                delay_ms *= 2;
                retry_count += 1;
            }
        }
    }
}

/// Detect the "invalid cross-device link" class of rename failure.
fn is_cross_filesystem_error(e: &anyhow::Error) -> bool {
    e.downcast_ref::<std::io::Error>()
        .map(|io| io.raw_os_error() == Some(cross_device_errno()))
        .unwrap_or(false)
}

#[cfg(unix)]
const fn cross_device_errno() -> i32 {
    18 // EXDEV
}

#[cfg(not(unix))]
const fn cross_device_errno() -> i32 {
    17 // ERROR_NOT_SAME_DEVICE
}

fn cross_filesystem_copy(temp_path: &Path, target: &Utf8Path) -> Result<()> {
    fs::copy(temp_path, target.as_std_path())
        .with_context(|| format!("Cross-filesystem copy failed for: {target}"))?;

    let file = fs::File::open(target.as_std_path())
        .with_context(|| format!("Failed to reopen target for fsync: {target}"))?;
    file.sync_all()
        .with_context(|| format!("Failed to fsync target: {target}"))?;

    let _ = fs::remove_file(temp_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn utf8_path(dir: &TempDir, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join(name)).expect("utf-8 temp path")
    }

    #[test]
    fn writes_content_atomically() {
        let dir = TempDir::new().unwrap();
        let path = utf8_path(&dir, "out.json");

        let result = write_file_atomic(&path, "{\"a\":1}\n").unwrap();
        assert!(!result.used_cross_filesystem_fallback);
        assert_eq!(fs::read_to_string(path.as_std_path()).unwrap(), "{\"a\":1}\n");
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = utf8_path(&dir, "a/b/c/out.json");

        write_file_atomic(&path, "x").unwrap();
        assert!(path.as_std_path().exists());
    }

    #[test]
    fn overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = utf8_path(&dir, "out.json");

        write_file_atomic(&path, "first").unwrap();
        write_file_atomic(&path, "second").unwrap();
        assert_eq!(fs::read_to_string(path.as_std_path()).unwrap(), "second");
    }

    #[test]
    fn normalizes_crlf_line_endings() {
        let dir = TempDir::new().unwrap();
        let path = utf8_path(&dir, "out.txt");

        write_file_atomic(&path, "a\r\nb\rc\n").unwrap();
        assert_eq!(fs::read_to_string(path.as_std_path()).unwrap(), "a\nb\nc\n");
    }
}
