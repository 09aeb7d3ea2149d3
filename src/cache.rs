use crate::error::{CatalogError, Result};
use crate::logging::CacheStats;
use crate::{log_digest_build, log_digest_failure, log_digest_hit};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Run-wide memo of `image reference -> content digest`.
///
/// Each reference owns a `OnceCell`; the first caller runs the build and
/// every concurrent caller for the same reference awaits that same build.
/// Entries are never evicted, and a failed build is remembered so the
/// reference is never rebuilt in the same run.
#[derive(Default)]
pub struct DigestCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<String>>>>,
    failures: Mutex<HashMap<String, String>>,
    lookups: AtomicU64,
    hits: AtomicU64,
    coalesced: AtomicU64,
    builds: AtomicU64,
    failed: AtomicU64,
}

impl DigestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the digest for `reference`, invoking `build` only if no build
    /// for it has started yet in this run.
    pub async fn resolve<F, Fut>(&self, reference: &str, build: F) -> Result<String>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        self.lookups.fetch_add(1, Ordering::Relaxed);

        let cell = {
            let mut entries = self.entries.lock();
            entries.entry(reference.to_string()).or_default().clone()
        };

        if let Some(digest) = cell.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log_digest_hit!(reference, digest);
            return Ok(digest.clone());
        }

        let waited = AtomicBool::new(true);
        let outcome = cell
            .get_or_try_init(|| async {
                waited.store(false, Ordering::Relaxed);
                let previous = self.failures.lock().get(reference).cloned();
                if let Some(reason) = previous {
                    return Err(CatalogError::PreviouslyFailed {
                        reference: reference.to_string(),
                        reason,
                    });
                }

                self.builds.fetch_add(1, Ordering::Relaxed);
                log_digest_build!(reference);
                match build(reference.to_string()).await {
                    Ok(digest) => {
                        tracing::debug!(reference, digest = %digest, "Digest resolved");
                        Ok(digest)
                    }
                    Err(e) => {
                        self.failed.fetch_add(1, Ordering::Relaxed);
                        log_digest_failure!(reference, e);
                        self.failures
                            .lock()
                            .insert(reference.to_string(), e.to_string());
                        Err(e)
                    }
                }
            })
            .await;

        if waited.load(Ordering::Relaxed) && outcome.is_ok() {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
        }

        outcome.cloned()
    }

    /// Digest of a reference whose build already completed, if any
    pub fn lookup(&self, reference: &str) -> Option<String> {
        self.entries
            .lock()
            .get(reference)
            .and_then(|cell| cell.get().cloned())
    }

    /// Snapshot of every resolved `reference -> digest` pair
    pub fn resolved(&self) -> HashMap<String, String> {
        self.entries
            .lock()
            .iter()
            .filter_map(|(reference, cell)| cell.get().map(|d| (reference.clone(), d.clone())))
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            lookups: self.lookups.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
            failures: self.failed.load(Ordering::Relaxed),
        }
    }
}
