//! Size-based log rotation, run periodically from the control loop against
//! the worker log directory.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::warn;

/// Rotates every `*.log` file in `directory` that has grown past
/// `rotate_mb` megabytes: shifts `.1..keep` suffixes up by one (dropping
/// the oldest), moves the live file to `.1`, and recreates an empty file
/// in its place. Best-effort per file — one file's rotation failure
/// doesn't stop the others.
pub async fn rotate_logs(directory: &Path, rotate_mb: u64, keep: u32) {
    if let Err(e) = fs::create_dir_all(directory).await {
        warn!(dir = %directory.display(), error = %e, "failed to create log directory");
        return;
    }

    let max_bytes = rotate_mb.max(1) * 1024 * 1024;

    let mut entries = match fs::read_dir(directory).await {
        Ok(e) => e,
        Err(e) => {
            warn!(dir = %directory.display(), error = %e, "failed to list log directory");
            return;
        }
    };

    let mut candidates = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("log") {
            candidates.push(path);
        }
    }

    for path in candidates {
        if let Err(e) = rotate_one(&path, max_bytes, keep).await {
            warn!(file = %path.display(), error = %e, "log rotation failed");
        }
    }
}

async fn rotate_one(path: &Path, max_bytes: u64, keep: u32) -> std::io::Result<()> {
    let metadata = fs::metadata(path).await?;
    if metadata.len() < max_bytes {
        return Ok(());
    }

    // Shift .1..keep upward, from oldest index down, dropping the file at
    // `.keep` entirely so the chain never grows past `keep` generations.
    for i in (1..=keep).rev() {
        let older = suffixed(path, i);
        if fs::metadata(&older).await.is_err() {
            continue;
        }
        if i == keep {
            let _ = fs::remove_file(&older).await;
        } else {
            let newer_suffix = suffixed(path, i + 1);
            fs::rename(&older, &newer_suffix).await?;
        }
    }

    fs::rename(path, suffixed(path, 1)).await?;
    fs::File::create(path).await?;
    Ok(())
}

fn suffixed(path: &Path, n: u32) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(format!(".{n}"));
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn rotates_file_past_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("worker.log");
        {
            let mut f = std::fs::File::create(&log_path).unwrap();
            f.write_all(&vec![b'x'; 2 * 1024 * 1024]).unwrap();
        }

        rotate_logs(dir.path(), 1, 3).await;

        assert!(log_path.exists());
        assert_eq!(std::fs::metadata(&log_path).unwrap().len(), 0);
        assert!(dir.path().join("worker.log.1").exists());
    }

    #[tokio::test]
    async fn leaves_small_files_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("worker.log");
        std::fs::write(&log_path, b"small").unwrap();

        rotate_logs(dir.path(), 50, 3).await;

        assert_eq!(std::fs::read(&log_path).unwrap(), b"small");
        assert!(!dir.path().join("worker.log.1").exists());
    }

    #[tokio::test]
    async fn drops_oldest_generation_past_keep() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("worker.log");
        std::fs::write(dir.path().join("worker.log.1"), b"gen1").unwrap();
        std::fs::write(dir.path().join("worker.log.2"), b"gen2").unwrap();
        {
            let mut f = std::fs::File::create(&log_path).unwrap();
            f.write_all(&vec![b'x'; 2 * 1024 * 1024]).unwrap();
        }

        rotate_logs(dir.path(), 1, 2).await;

        assert_eq!(std::fs::read(dir.path().join("worker.log.2")).unwrap(), b"gen1");
        assert!(!dir.path().join("worker.log.3").exists());
    }
}
