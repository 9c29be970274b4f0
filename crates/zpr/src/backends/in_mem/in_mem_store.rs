use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, ReadBuf};

use crate::backends::{ObjectBody, ObjectStore};
use crate::errors::StoreError;
use crate::publisher::md5_base64;

/// 📼 One upload, as the store saw it.
#[derive(Debug, Clone)]
pub(crate) struct RecordedPut {
    pub(crate) key: String,
    pub(crate) bytes: Vec<u8>,
    pub(crate) content_md5: String,
}

#[derive(Debug, Default)]
struct Script {
    objects: BTreeMap<String, Vec<u8>>,
    /// listed, but `get` says NotFound
    gone: BTreeSet<String>,
    always_failing: HashSet<String>,
    /// key → failures left before it starts working
    flaky: HashMap<String, u32>,
    broken_bodies: HashSet<String>,
    bucket_missing: bool,
    listing_fails: bool,
    /// uploads arrive with one byte flipped, so the MD5 check trips
    uploads_corrupted: bool,
    get_latency: Option<Duration>,
}

#[derive(Debug, Default)]
struct Ledger {
    list_calls: HashMap<String, usize>,
    get_attempts: HashMap<String, u32>,
    puts: Vec<RecordedPut>,
}

#[derive(Debug, Default)]
struct Inner {
    script: Mutex<Script>,
    ledger: Mutex<Ledger>,
    gets_in_flight: AtomicUsize,
    peak_gets_in_flight: AtomicUsize,
}

/// 📦 A bucket that lives in RAM and remembers everything you did to it.
///
/// Clone-able because tests need to peek inside after handing a copy to the pipeline.
/// The `Arc` means everyone shares the same bucket and the same ledger.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemoryObjectStore {
    inner: Arc<Inner>,
}

// -- 🔒 a poisoned test mutex means another assertion already panicked; keep going
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryObjectStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn scripted(self, edit: impl FnOnce(&mut Script)) -> Self {
        edit(&mut lock(&self.inner.script));
        self
    }

    pub(crate) fn with_object(self, key: &str, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        self.scripted(|s| {
            s.objects.insert(key.to_string(), body);
        })
    }

    pub(crate) fn with_gone(self, key: &str) -> Self {
        self.scripted(|s| {
            s.gone.insert(key.to_string());
        })
    }

    pub(crate) fn with_failing(self, key: &str) -> Self {
        self.scripted(|s| {
            s.always_failing.insert(key.to_string());
        })
    }

    pub(crate) fn with_flaky(self, key: &str, failures: u32) -> Self {
        self.scripted(|s| {
            s.flaky.insert(key.to_string(), failures);
        })
    }

    pub(crate) fn with_broken_body(self, key: &str) -> Self {
        self.scripted(|s| {
            s.broken_bodies.insert(key.to_string());
        })
    }

    pub(crate) fn without_bucket(self) -> Self {
        self.scripted(|s| s.bucket_missing = true)
    }

    pub(crate) fn with_failing_listing(self) -> Self {
        self.scripted(|s| s.listing_fails = true)
    }

    pub(crate) fn with_corrupted_uploads(self) -> Self {
        self.scripted(|s| s.uploads_corrupted = true)
    }

    pub(crate) fn with_get_latency(self, latency: Duration) -> Self {
        self.scripted(|s| s.get_latency = Some(latency))
    }

    pub(crate) fn list_calls(&self, prefix: &str) -> usize {
        lock(&self.inner.ledger).list_calls.get(prefix).copied().unwrap_or(0)
    }

    pub(crate) fn get_attempts(&self, key: &str) -> u32 {
        lock(&self.inner.ledger).get_attempts.get(key).copied().unwrap_or(0)
    }

    pub(crate) fn total_get_attempts(&self) -> u32 {
        lock(&self.inner.ledger).get_attempts.values().sum()
    }

    pub(crate) fn puts(&self) -> Vec<RecordedPut> {
        lock(&self.inner.ledger).puts.clone()
    }

    pub(crate) fn peak_gets_in_flight(&self) -> usize {
        self.inner.peak_gets_in_flight.load(Ordering::SeqCst)
    }

    fn injected_failure(operation: &'static str, target: &str) -> StoreError {
        StoreError::Request {
            operation,
            target: target.to_string(),
            source: "injected failure: SlowDown".into(),
        }
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        *lock(&self.inner.ledger)
            .list_calls
            .entry(prefix.to_string())
            .or_default() += 1;

        let script = lock(&self.inner.script);
        if script.bucket_missing {
            return Err(StoreError::NoSuchBucket {
                bucket: "in-memory".to_string(),
            });
        }
        if script.listing_fails {
            return Err(Self::injected_failure("list", prefix));
        }
        // -- 📜 lexicographic, like the real thing
        let the_keys: BTreeSet<&String> = script.objects.keys().chain(script.gone.iter()).collect();
        Ok(the_keys
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn get(&self, key: &str) -> Result<ObjectBody, StoreError> {
        *lock(&self.inner.ledger)
            .get_attempts
            .entry(key.to_string())
            .or_default() += 1;

        let the_in_flight = self.inner.gets_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner
            .peak_gets_in_flight
            .fetch_max(the_in_flight, Ordering::SeqCst);
        let the_latency = lock(&self.inner.script).get_latency;
        if let Some(latency) = the_latency {
            tokio::time::sleep(latency).await;
        }
        self.inner.gets_in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut script = lock(&self.inner.script);
        if script.always_failing.contains(key) {
            return Err(Self::injected_failure("get", key));
        }
        if let Some(left) = script.flaky.get_mut(key) {
            if *left > 0 {
                *left -= 1;
                return Err(Self::injected_failure("get", key));
            }
        }
        if script.broken_bodies.contains(key) {
            return Ok(Box::new(BrokenBody::default()));
        }
        match script.objects.get(key) {
            Some(bytes) => Ok(Box::new(io::Cursor::new(bytes.clone()))),
            None => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    async fn put(&self, key: &str, local_path: &Path, content_md5: &str) -> Result<(), StoreError> {
        let (bucket_missing, uploads_corrupted) = {
            let script = lock(&self.inner.script);
            (script.bucket_missing, script.uploads_corrupted)
        };
        if bucket_missing {
            return Err(StoreError::NoSuchBucket {
                bucket: "in-memory".to_string(),
            });
        }
        let mut the_bytes = tokio::fs::read(local_path).await.map_err(|source| StoreError::LocalIo {
            path: local_path.to_path_buf(),
            source,
        })?;
        if uploads_corrupted {
            if let Some(first) = the_bytes.first_mut() {
                *first ^= 0xFF;
            } else {
                the_bytes.push(0);
            }
        }
        // -- 🔒 same deal as S3's Content-MD5: wrong digest, no object
        if md5_base64(&the_bytes) != content_md5 {
            return Err(StoreError::ChecksumMismatch {
                key: key.to_string(),
            });
        }
        lock(&self.inner.ledger).puts.push(RecordedPut {
            key: key.to_string(),
            bytes: the_bytes,
            content_md5: content_md5.to_string(),
        });
        Ok(())
    }
}

/// 💔 A body that gets a few bytes in and then the connection resets.
#[derive(Debug, Default)]
struct BrokenBody {
    served: bool,
}

impl AsyncRead for BrokenBody {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.served {
            self.served = true;
            let partial = b"{\"partial\":";
            let n = partial.len().min(buf.remaining());
            buf.put_slice(&partial[..n]);
            return Poll::Ready(Ok(()));
        }
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "connection reset mid-object",
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn the_one_where_gone_keys_are_listed_but_not_served() {
        let store = InMemoryObjectStore::new()
            .with_object("a/x_2021-05-01.json", "{}")
            .with_gone("a/y_2022-06-01.json")
            .with_object("b/z_2022-06-01.json", "{}");

        let keys = store.list("a/").await.unwrap();
        assert_eq!(keys, vec!["a/x_2021-05-01.json", "a/y_2022-06-01.json"]);
        assert!(store.get("a/y_2022-06-01.json").await.err().unwrap().is_not_found());
        assert_eq!(store.list_calls("a/"), 1);
    }

    #[tokio::test]
    async fn the_one_where_flaky_keys_recover() {
        let store = InMemoryObjectStore::new()
            .with_object("k.json", "body")
            .with_flaky("k.json", 2);

        assert!(store.get("k.json").await.is_err());
        assert!(store.get("k.json").await.is_err());
        let mut body = store.get("k.json").await.unwrap();
        let mut text = String::new();
        body.read_to_string(&mut text).await.unwrap();
        assert_eq!(text, "body");
        assert_eq!(store.get_attempts("k.json"), 3);
    }

    #[tokio::test]
    async fn the_one_where_broken_bodies_break() {
        let store = InMemoryObjectStore::new().with_broken_body("k.json");
        let mut body = store.get("k.json").await.unwrap();
        let mut sink = Vec::new();
        assert!(body.read_to_end(&mut sink).await.is_err());
    }
}
