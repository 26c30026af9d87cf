//! The mirror repository (spec §2, §4).

use crate::adapter::{NullStatCache, StatCache};
use crate::local_set::LocalSet;
use crate::mirror_table::MirrorTable;
use crate::whiteout::WhiteoutLog;
use covfs_core::path::join_segments;
use covfs_core::{Error, LogicalPath, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct Inner {
    source_root: PathBuf,
    /// `overlay_root/mirror` — materialized content, rooted at `/`.
    mirror_dir: PathBuf,
    local: LocalSet,
    mirror: MirrorTable,
    whiteout: WhiteoutLog,
}

/// The COW engine: resolves logical paths to physical locations, lazily
/// copies source entries into the overlay on first write, records
/// deletions as persistent whiteouts, and fuses directory listings across
/// the two layers.
///
/// Cheaply cloneable — every clone shares the same `LocalSet`,
/// `MirrorTable`, and whiteout-log descriptor, which is what lets
/// directory materialization spawn concurrent per-child work (§4.6)
/// against the same repository state.
#[derive(Clone)]
pub struct Repository {
    inner: Arc<Inner>,
}

impl Repository {
    /// Construct a repository rooted at `source_root` (read-only lower
    /// layer) and `overlay_root` (read-write upper layer), performing the
    /// synchronous startup scan (§4.2) before returning.
    ///
    /// The logical-path model (§3) is specified as forward-slash-rooted
    /// POSIX paths, so the path separator named in §2's constructor is
    /// fixed at `/` rather than threaded through as a runtime parameter —
    /// see DESIGN.md for the rationale.
    pub async fn new(source_root: PathBuf, overlay_root: PathBuf) -> Result<Self> {
        tracing::info!(
            source = %source_root.display(),
            overlay = %overlay_root.display(),
            "initializing mirror repository"
        );

        let mirror_dir = PathBuf::from(join_segments(&lossy(&overlay_root), &["mirror"])?);
        tokio::fs::create_dir_all(&mirror_dir)
            .await
            .map_err(|e| Error::from_io(mirror_dir.display().to_string(), e))?;

        let local = LocalSet::new();
        scan_overlay_tree(&mirror_dir, &local).await?;
        tracing::info!(local_entries = local.len(), "overlay scan complete");

        for p in WhiteoutLog::replay(&overlay_root).await? {
            local.insert(&p);
        }
        tracing::info!(local_entries = local.len(), "whiteout-log replay complete");

        let whiteout = WhiteoutLog::open(&overlay_root).await?;

        Ok(Repository {
            inner: Arc::new(Inner {
                source_root,
                mirror_dir,
                local,
                mirror: MirrorTable::new(),
                whiteout,
            }),
        })
    }

    fn source_of(&self, p: &LogicalPath) -> PathBuf {
        PathBuf::from(
            join_segments(&lossy(&self.inner.source_root), &[p.as_str()])
                .expect("LogicalPath is already `..`-free"),
        )
    }

    fn overlay_of(&self, p: &LogicalPath) -> PathBuf {
        PathBuf::from(
            join_segments(&lossy(&self.inner.mirror_dir), &[p.as_str()])
                .expect("LogicalPath is already `..`-free"),
        )
    }

    /// Resolve `p` for a read-only open. Total — never fails (spec §4.3).
    pub async fn read_path(&self, p: &LogicalPath) -> PathBuf {
        self.read_path_with_cache(p, &NullStatCache).await
    }

    /// As [`read_path`](Self::read_path), but consulting a per-request
    /// [`StatCache`] before issuing the overlay-existence probe, and
    /// populating it on a miss (spec §6 "Collaborator: stat cache").
    pub async fn read_path_with_cache(&self, p: &LogicalPath, cache: &dyn StatCache) -> PathBuf {
        if self.inner.local.contains(p) {
            return self.overlay_of(p);
        }

        let overlay_path = self.overlay_of(p);
        let key = overlay_path.to_string_lossy();
        let exists = match cache.get(&key) {
            Some(hit) => hit,
            None => {
                let exists = tokio::fs::metadata(&overlay_path).await.is_ok();
                cache.insert(&key, exists);
                exists
            }
        };

        if exists {
            overlay_path
        } else {
            self.source_of(p)
        }
    }

    /// Promote `p` to the overlay if it isn't already there, materializing
    /// it from the source on first write (spec §4.4).
    pub async fn readwrite_path(&self, p: &LogicalPath) -> Result<PathBuf> {
        if self.inner.local.contains(p) {
            return Ok(self.overlay_of(p));
        }

        match self.materialize(p).await {
            Ok(()) => Ok(self.overlay_of(p)),
            Err(e) if e.is_not_found() => {
                // Absent from both layers: admit it as a create-new write.
                // Memory-only — the overlay file the caller is about to
                // produce is itself the durable evidence (spec §4.7).
                self.inner.local.insert(p);
                Ok(self.overlay_of(p))
            }
            Err(e) => Err(e),
        }
    }

    /// Lazily copy `source_of(p)` into `overlay_of(p)`, deduplicating
    /// concurrent callers through the `MirrorTable` (spec §4.5).
    async fn materialize(&self, p: &LogicalPath) -> Result<()> {
        let overlay_path = self.overlay_of(p);
        let this = self.clone();
        let p = p.clone();
        self.inner
            .mirror
            .run(overlay_path.clone(), move || async move {
                this.materialize_once(&p, &overlay_path).await
            })
            .await
    }

    async fn materialize_once(&self, p: &LogicalPath, overlay_path: &Path) -> Result<()> {
        let source_path = self.source_of(p);
        if let Some(parent) = overlay_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::from_io(parent.display().to_string(), e))?;
        }

        match tokio::fs::copy(&source_path, overlay_path).await {
            Ok(_) => {
                // File-copy completion: the overlay file is itself the
                // durable evidence, so this registration is memory-only.
                self.register_local(p, false).await?;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(p.as_str().to_string()))
            }
            Err(e) if Error::is_directory(&e) => self.materialize_dir(p, overlay_path).await,
            Err(e) => Err(Error::from_io(source_path.display().to_string(), e)),
        }
    }

    /// Directory materialization (spec §4.6): recursively materialize every
    /// child in parallel, then persist the directory's own logical path as
    /// a durable subtree-commit.
    async fn materialize_dir(&self, p: &LogicalPath, overlay_dir: &Path) -> Result<()> {
        let source_dir = self.source_of(p);
        tokio::fs::create_dir_all(overlay_dir)
            .await
            .map_err(|e| Error::from_io(overlay_dir.display().to_string(), e))?;

        let names = list_dir_names(&source_dir).await?;

        let mut children: Vec<std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>>> =
            Vec::with_capacity(names.len());
        for name in names {
            let child = p.join(&name)?;
            let this = self.clone();
            children.push(Box::pin(async move { this.materialize(&child).await }));
        }
        futures::future::try_join_all(children).await?;

        self.register_local(p, true).await
    }

    /// Insert `p` into `LocalSet`, and, when `persist` is set, append it to
    /// the whiteout log — the tombstone/subtree-commit journal (spec §4.7).
    async fn register_local(&self, p: &LogicalPath, persist: bool) -> Result<()> {
        self.inner.local.insert(p);
        if persist {
            self.inner.whiteout.append(p).await?;
        }
        Ok(())
    }

    /// Remove `p`, always yielding a persistent whiteout regardless of
    /// which layer held the file (spec §4.8). Directory removal expects an
    /// empty directory — the protocol layer is responsible for removing
    /// children first (spec §9, open question #2).
    pub async fn remove(&self, p: &LogicalPath) -> Result<()> {
        let overlay_path = self.overlay_of(p);

        match tokio::fs::symlink_metadata(&overlay_path).await {
            Ok(meta) if meta.is_dir() => {
                tokio::fs::remove_dir(&overlay_path)
                    .await
                    .map_err(|e| Error::from_io(overlay_path.display().to_string(), e))?;
            }
            Ok(_) => {
                tokio::fs::remove_file(&overlay_path)
                    .await
                    .map_err(|e| Error::from_io(overlay_path.display().to_string(), e))?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // May have existed only on the source; the whiteout below
                // hides it regardless.
            }
            Err(e) => return Err(Error::from_io(overlay_path.display().to_string(), e)),
        }

        self.register_local(p, true).await
    }

    /// Fuse the logical children of directory `p` across both layers
    /// (spec §4.9).
    pub async fn read_dir(&self, p: &LogicalPath) -> Result<Vec<String>> {
        let source_dir = self.source_of(p);
        let overlay_dir = self.overlay_of(p);

        let source_result = list_dir_names(&source_dir).await;
        let overlay_result = list_dir_names(&overlay_dir).await;

        let (source_names, overlay_names) = match (source_result, overlay_result) {
            (Ok(s), Ok(o)) => (s, o),
            (Ok(s), Err(e)) if e.is_not_found() => (s, Vec::new()),
            (Err(e), Ok(o)) if e.is_not_found() => (Vec::new(), o),
            (Err(s), Err(o)) if s.is_not_found() && o.is_not_found() => {
                return Err(Error::NotFound(p.as_str().to_string()));
            }
            (Ok(_), Err(e)) => {
                tracing::warn!(path = %p, error = %e, "fused directory listing: overlay read failed");
                return Err(e);
            }
            (Err(e), Ok(_)) => {
                tracing::warn!(path = %p, error = %e, "fused directory listing: source read failed");
                return Err(e);
            }
            (Err(s), Err(o)) => {
                // Both sides failed and it isn't the NotFound/NotFound case
                // above, so at least one is a genuine (non-NotFound) error —
                // that's the one worth surfacing rather than a NotFound that
                // just means "this side doesn't have it".
                let (e, side) = if !s.is_not_found() {
                    (s, "source")
                } else {
                    (o, "overlay")
                };
                tracing::warn!(path = %p, error = %e, side, "fused directory listing: both sides failed");
                return Err(e);
            }
        };

        // Drop every source entry whose logical path is whited-out or
        // superseded by the overlay; overlay presence already implies
        // LocalSet membership, so duplicates are not expected here.
        let mut result: Vec<String> = source_names
            .into_iter()
            .filter(|name| match p.join(name) {
                Ok(child) => !self.inner.local.contains(&child),
                Err(_) => true,
            })
            .collect();
        result.extend(overlay_names);
        Ok(result)
    }
}

/// Recursively walk the overlay tree, inserting the logical path of every
/// non-directory entry into `local` (spec §4.2 step 2). Iterative via an
/// explicit stack rather than recursive, per the spec's "walk ... iteratively".
async fn scan_overlay_tree(mirror_dir: &Path, local: &LocalSet) -> Result<()> {
    let mut stack = vec![(mirror_dir.to_path_buf(), LogicalPath::root())];

    while let Some((dir, logical_dir)) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(Error::from_io(dir.display().to_string(), e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::from_io(dir.display().to_string(), e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let logical_child = logical_dir.join(&name)?;
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Error::from_io(dir.display().to_string(), e))?;

            if file_type.is_dir() {
                stack.push((entry.path(), logical_child));
            } else {
                local.insert(&logical_child);
            }
        }
    }

    Ok(())
}

async fn list_dir_names(dir: &Path) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| Error::from_io(dir.display().to_string(), e))?;

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::from_io(dir.display().to_string(), e))?
    {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

fn lossy(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}
