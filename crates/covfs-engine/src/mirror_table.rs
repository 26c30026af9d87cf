//! `MirrorTable` — the in-flight map enforcing at-most-one concurrent
//! materialization per overlay physical path (spec §3 "MirrorTable", §4.5,
//! §5 "Materialization deduplication").

use dashmap::DashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

/// One slot per in-flight (or just-settled, not-yet-evicted) materialization.
struct Slot {
    /// `None` while the copy is running; `Some` once it has settled. The
    /// error is `Arc`-wrapped so any number of waiters can clone the outcome
    /// without requiring `covfs_core::Error: Clone` — and so joiners observe
    /// the owner's *actual* error variant (e.g. `NotFound`) rather than a
    /// degraded stand-in, which matters because `readwrite_path` matches on
    /// `is_not_found()` to recover a concurrent create-new.
    outcome: Mutex<Option<Result<(), Arc<covfs_core::Error>>>>,
    notify: Notify,
}

/// Keyed, future-valued cache of in-progress copies. Entries exist only
/// while a copy is running and are removed exactly once — before the
/// outcome is published to waiters — so a failed, evicted entry can never
/// be rejoined by a caller arriving just after eviction (it simply starts a
/// fresh materialization, matching spec §5's "a subsequent call restarts
/// materialization").
#[derive(Default)]
pub struct MirrorTable {
    inflight: DashMap<PathBuf, Arc<Slot>>,
}

impl MirrorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` for `key`, deduplicating concurrent callers.
    ///
    /// The first caller to observe `key` absent becomes the owner: it runs
    /// `op`, removes the table entry, then publishes the outcome to every
    /// waiter that joined while it was running. Joiners never run `op`
    /// themselves — they get the owner's outcome, which is the dedup
    /// guarantee spec §4.5 requires ("all concurrent callers share one
    /// copy").
    pub async fn run<F, Fut>(&self, key: PathBuf, op: F) -> Result<(), covfs_core::Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), covfs_core::Error>>,
    {
        let (slot, is_owner) = match self.inflight.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(e) => (e.get().clone(), false),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                let slot = Arc::new(Slot {
                    outcome: Mutex::new(None),
                    notify: Notify::new(),
                });
                e.insert(slot.clone());
                (slot, true)
            }
        };

        if is_owner {
            let result = op().await;
            let published = result.as_ref().map(|_| ()).map_err(|e| Arc::new(e.clone_for_join()));
            // Remove before signaling: a new call for this key after this
            // point starts a fresh slot rather than rejoining this one.
            self.inflight.remove(&key);
            *slot.outcome.lock().await = Some(published);
            slot.notify.notify_waiters();
            result
        } else {
            loop {
                // `notified()` captures the current notification sequence
                // number at creation time, not at first poll, so a
                // `notify_waiters()` that races with this check is never
                // missed — no separate re-check-after-register is needed.
                let notified = slot.notify.notified();
                if let Some(outcome) = slot.outcome.lock().await.clone() {
                    return outcome.map_err(covfs_core::Error::from_joined);
                }
                notified.await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn concurrent_callers_share_one_run() {
        let table = Arc::new(MirrorTable::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let key = PathBuf::from("/overlay/mirror/big.bin");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let table = table.clone();
            let runs = runs.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                table
                    .run(key, || async {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(())
                    })
                    .await
            }));
        }

        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_run_is_restarted_by_the_next_caller() {
        let table = MirrorTable::new();
        let key = PathBuf::from("/overlay/mirror/flaky.bin");

        let first = table
            .run(key.clone(), || async {
                Err(covfs_core::Error::NotFound("flaky.bin".into()))
            })
            .await;
        assert!(first.is_err());

        let second = table.run(key, || async { Ok(()) }).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn joiner_observes_the_owner_s_actual_error_variant() {
        let table = Arc::new(MirrorTable::new());
        let key = PathBuf::from("/overlay/mirror/missing.bin");

        let owner = {
            let table = table.clone();
            let key = key.clone();
            tokio::spawn(async move {
                table
                    .run(key, || async {
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Err(covfs_core::Error::NotFound("missing.bin".into()))
                    })
                    .await
            })
        };
        // Give the owner a chance to register its slot before the joiner arrives.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let joiner = table.run(key, || async { unreachable!("joiner must not run op") }).await;

        let owner = owner.await.unwrap();
        assert!(owner.unwrap_err().is_not_found());
        assert!(joiner.unwrap_err().is_not_found());
    }
}
