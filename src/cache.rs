//! Time-bounded result cache and per-source concurrency limit.

use crate::error::{Result, SdsError};
use crate::schema::PartialSafetyRecord;
use crate::sources::{SourceAdapter, SourceIdentity};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tracing::debug;

/// Wraps a [`SourceAdapter`], reusing successful contributions for `ttl`
/// and allowing at most `max_concurrent` fetches in flight. Failures are
/// never cached.
pub struct CachedSource {
    inner: Arc<dyn SourceAdapter>,
    ttl: Duration,
    semaphore: Arc<Semaphore>,
    entries: Mutex<HashMap<String, (Instant, PartialSafetyRecord)>>,
}

impl CachedSource {
    pub fn new(inner: Arc<dyn SourceAdapter>, ttl: Duration, max_concurrent: usize) -> Self {
        Self {
            inner,
            ttl,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn key(identity: &SourceIdentity) -> String {
        format!(
            "{}|{}|{}|{}",
            identity.smiles,
            identity.cid.map(|c| c.to_string()).unwrap_or_default(),
            identity.cas.as_deref().unwrap_or_default(),
            identity.name.as_deref().unwrap_or_default()
        )
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries
            .values()
            .filter(|(stored, _)| now.duration_since(*stored) < self.ttl)
            .count()
    }

    async fn fetch_impl(&self, identity: &SourceIdentity) -> Result<PartialSafetyRecord> {
        let key = Self::key(identity);
        {
            let entries = self.entries.lock().await;
            if let Some((stored, partial)) = entries.get(&key) {
                if stored.elapsed() < self.ttl {
                    debug!(source = %self.inner.name(), "Cache hit");
                    return Ok(partial.clone());
                }
            }
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| SdsError::unavailable(self.inner.name(), e))?;
        let partial = self.inner.fetch(identity).await?;

        let mut entries = self.entries.lock().await;
        entries.retain(|_, (stored, _)| stored.elapsed() < self.ttl);
        entries.insert(key, (Instant::now(), partial.clone()));
        Ok(partial)
    }
}

impl SourceAdapter for CachedSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn fetch<'a>(&'a self, identity: &'a SourceIdentity) -> BoxFuture<'a, Result<PartialSafetyRecord>> {
        self.fetch_impl(identity).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Provenance, SectionKey};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    impl SourceAdapter for Counting {
        fn name(&self) -> &str {
            "Counting"
        }

        fn fetch<'a>(&'a self, _identity: &'a SourceIdentity) -> BoxFuture<'a, Result<PartialSafetyRecord>> {
            async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.fail {
                    return Err(SdsError::unavailable("Counting", "down"));
                }
                let mut partial = PartialSafetyRecord::new(Provenance::Source("Counting".into()));
                partial.insert(SectionKey::PhysicalProperties, "Odor", "Faint, sweet");
                Ok(partial)
            }
            .boxed()
        }
    }

    fn identity() -> SourceIdentity {
        SourceIdentity {
            smiles: "CCO".into(),
            cid: Some(702),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_repeated_fetch_is_cached() {
        let inner = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let cached = CachedSource::new(inner.clone(), Duration::from_secs(60), 2);
        let first = cached.fetch(&identity()).await.unwrap();
        let second = cached.fetch(&identity()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.len().await, 1);
        assert_eq!(cached.name(), "Counting");
    }

    #[tokio::test]
    async fn test_expired_entries_refetch() {
        let inner = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let cached = CachedSource::new(inner.clone(), Duration::ZERO, 1);
        cached.fetch(&identity()).await.unwrap();
        cached.fetch(&identity()).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_not_cached() {
        let inner = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let cached = CachedSource::new(inner.clone(), Duration::from_secs(60), 1);
        assert!(cached.fetch(&identity()).await.is_err());
        assert!(cached.fetch(&identity()).await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cached.len().await, 0);
    }
}
