//! The collaborator-facing boundary (spec §4.10, §6, §9).
//!
//! Everything here is a *contract*, not a working implementation of the
//! collaborators on the other side of it — the network file-access server,
//! its per-path resource-metadata bookkeeping, and its per-request stat
//! cache are all out of scope (spec §1) and are represented only by the
//! interfaces [`Repository`](crate::Repository) needs from them.

use std::collections::HashMap;

/// A per-request, per-physical-path stat cache owned by the protocol layer
/// (spec §6 "Collaborator: stat cache"). `Repository` consults it
/// opportunistically before issuing a host `stat` and inserts on a miss; it
/// never crosses a request boundary, which is why it's passed by reference
/// on a per-call basis rather than owned by the repository.
pub trait StatCache: Send + Sync {
    /// `Some(true)`/`Some(false)` on a hit recording existence; `None` on a
    /// miss.
    fn get(&self, physical_path: &str) -> Option<bool>;

    fn insert(&self, physical_path: &str, exists: bool);
}

/// A stat cache that always misses — the default when the protocol layer
/// hasn't wired one up (tests, or a caller that doesn't care).
pub struct NullStatCache;

impl StatCache for NullStatCache {
    fn get(&self, _physical_path: &str) -> Option<bool> {
        None
    }

    fn insert(&self, _physical_path: &str, _exists: bool) {}
}

/// Per-logical-path lock/property bookkeeping, owned by the protocol layer
/// (spec §9 "Dynamic property bag"). The system this was distilled from
/// tracks this in a heterogeneous map; a statically typed implementation
/// needs only these two well-typed fields, so that's all this models.
#[derive(Debug, Clone, Default)]
pub struct ResourceMetadata {
    pub lock: Option<LockToken>,
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub owner: String,
    pub token: String,
}

/// File-mode normalization policy (spec §4.10): wherever the read bit is
/// set, force the corresponding write bit on, so the fused view reports as
/// writable to clients even though the source tree is mounted read-only.
pub fn normalize_mode(mode: u32) -> u32 {
    let implied_write = (mode & 0o444) >> 1;
    mode | implied_write
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_mode_forces_write_where_read_is_set() {
        assert_eq!(normalize_mode(0o444), 0o666);
        assert_eq!(normalize_mode(0o400), 0o600);
        assert_eq!(normalize_mode(0o040), 0o060);
        assert_eq!(normalize_mode(0o000), 0o000);
    }

    #[test]
    fn normalize_mode_leaves_existing_write_bits_alone() {
        assert_eq!(normalize_mode(0o755), 0o755);
    }

    #[test]
    fn null_stat_cache_always_misses() {
        let cache = NullStatCache;
        assert_eq!(cache.get("/x"), None);
        cache.insert("/x", true);
        assert_eq!(cache.get("/x"), None);
    }
}
