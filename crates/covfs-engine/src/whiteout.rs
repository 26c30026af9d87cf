//! `WhiteoutLog` — the append-only tombstone/subtree-commit journal at
//! `overlay_root/deleted` (spec §3 "WhiteoutLog", §4.7).

use covfs_core::{LogicalPath, Result};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// An append-only UTF-8, newline-terminated log of logical paths.
///
/// The descriptor is opened once, in append mode, and retained for the
/// process lifetime (spec §3). Appends are serialized through a mutex: the
/// host already guarantees each short line is written atomically, but the
/// mutex also gives `register_local` a single critical section to update
/// `LocalSet` and persist the entry together.
pub struct WhiteoutLog {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl WhiteoutLog {
    /// Open (creating if absent) `overlay_root/deleted` in append mode.
    pub async fn open(overlay_root: &Path) -> Result<Self> {
        let path = overlay_root.join("deleted");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| covfs_core::Error::from_io(path.display().to_string(), e))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Append one logical path as a trimmed, newline-terminated line.
    pub async fn append(&self, p: &LogicalPath) -> Result<()> {
        let mut line = p.as_str().to_string();
        line.push('\n');
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| covfs_core::Error::from_io(self.path.display().to_string(), e))
    }

    /// Read every trimmed, non-blank line as a logical path. Used only at
    /// startup, before the log is reopened for append (spec §4.2 step 3–4).
    pub async fn replay(overlay_root: &Path) -> Result<Vec<LogicalPath>> {
        let path = overlay_root.join("deleted");
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(covfs_core::Error::from_io(path.display().to_string(), e)),
        };

        let mut paths = Vec::new();
        for line in contents.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            paths.push(LogicalPath::parse(trimmed)?);
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_then_replay_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let log = WhiteoutLog::open(dir.path()).await.unwrap();

        log.append(&LogicalPath::parse("/a.txt").unwrap()).await.unwrap();
        log.append(&LogicalPath::parse("/b/c.txt").unwrap()).await.unwrap();

        let replayed = WhiteoutLog::replay(dir.path()).await.unwrap();
        let as_strs: Vec<_> = replayed.iter().map(|p| p.as_str().to_string()).collect();
        assert_eq!(as_strs, vec!["/a.txt", "/b/c.txt"]);
    }

    #[tokio::test]
    async fn replay_tolerates_missing_log() {
        let dir = tempfile::tempdir().unwrap();
        let replayed = WhiteoutLog::replay(dir.path()).await.unwrap();
        assert!(replayed.is_empty());
    }

    #[tokio::test]
    async fn replay_ignores_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("deleted"), "/a.txt\n\n  \n/b.txt\n")
            .await
            .unwrap();
        let replayed = WhiteoutLog::replay(dir.path()).await.unwrap();
        assert_eq!(replayed.len(), 2);
    }
}
