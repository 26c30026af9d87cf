//! `LocalSet` — the in-memory set of logical paths for which the overlay
//! (or the whiteout log) is authoritative (spec §2, §3 "LocalSet").

use covfs_core::LogicalPath;
use dashmap::DashSet;

/// Lock-free membership set, mirroring the `DashMap`-backed concurrent
/// containers this codebase otherwise reaches for (cf. `FileOverlay`'s
/// `DashMap<String, OverlayEntry>`).
#[derive(Default)]
pub struct LocalSet {
    paths: DashSet<String>,
}

impl LocalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, p: &LogicalPath) -> bool {
        self.paths.contains(p.as_str())
    }

    /// Insert `p`. Idempotent — re-inserting an already-local path is a
    /// no-op other than the redundant hash lookup.
    pub fn insert(&self, p: &LogicalPath) {
        self.paths.insert(p.as_str().to_string());
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_contains() {
        let set = LocalSet::new();
        let p = LogicalPath::parse("/a.txt").unwrap();
        assert!(!set.contains(&p));
        set.insert(&p);
        assert!(set.contains(&p));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn insert_is_idempotent() {
        let set = LocalSet::new();
        let p = LogicalPath::parse("/a.txt").unwrap();
        set.insert(&p);
        set.insert(&p);
        assert_eq!(set.len(), 1);
    }
}
