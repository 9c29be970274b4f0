//! 🔁 The RetryingFetcher: asks the store for an object, and then asks again.
//!
//! 🎬 *[the store says 503. the fetcher waits five seconds. the store says 503.]*
//! *[the fetcher waits five more seconds. the store says 200. nobody claps.]*
//!
//! Budget: `max_retries = n` means `n + 1` attempts and `n` sleeps in between.
//! "Not found" is not a failure to retry, it is news: the object is gone, the
//! caller gets [`ArchiveError::ObjectGone`] right away and the budget stays untouched.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::backends::{ObjectBody, ObjectStore, StoreBackend};
use crate::errors::ArchiveError;

/// 📥 A bounded retry loop around a single `get`.
#[derive(Debug, Clone)]
pub(crate) struct RetryingFetcher {
    store: Arc<StoreBackend>,
    max_retries: u32,
    retry_delay: Duration,
}

impl RetryingFetcher {
    pub(crate) fn new(store: Arc<StoreBackend>, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            store,
            max_retries,
            retry_delay,
        }
    }

    /// 🎯 Open a body stream for `key`, retrying everything except "gone".
    pub(crate) async fn fetch(&self, key: &str) -> Result<ObjectBody, ArchiveError> {
        let mut the_attempt: u32 = 0;
        loop {
            the_attempt += 1;
            match self.store.get(key).await {
                Ok(body) => {
                    debug!(key, attempt = the_attempt, "📥 fetched");
                    return Ok(body);
                }
                Err(err) if err.is_not_found() => {
                    return Err(ArchiveError::ObjectGone {
                        key: key.to_string(),
                    });
                }
                Err(err) if the_attempt > self.max_retries => {
                    return Err(ArchiveError::FetchExhausted {
                        key: key.to_string(),
                        attempts: the_attempt,
                        source: err,
                    });
                }
                Err(err) => {
                    warn!(
                        key,
                        attempt = the_attempt,
                        "⚠️ fetch failed, retrying in {:?}: {}",
                        self.retry_delay,
                        err
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryObjectStore;
    use crate::errors::StoreError;
    use tokio::io::AsyncReadExt;
    use tokio::time::Instant;

    fn fetcher_over(store: &InMemoryObjectStore, max_retries: u32) -> RetryingFetcher {
        RetryingFetcher::new(
            Arc::new(StoreBackend::InMemory(store.clone())),
            max_retries,
            Duration::from_secs(5),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_n_retries_means_n_plus_one_attempts() {
        let store = InMemoryObjectStore::new().with_failing("a/x_2022-06-01.json");
        let fetcher = fetcher_over(&store, 2);
        let started = Instant::now();

        let err = fetcher.fetch("a/x_2022-06-01.json").await.err().unwrap();

        assert!(matches!(
            err,
            ArchiveError::FetchExhausted {
                attempts: 3,
                source: StoreError::Request { .. },
                ..
            }
        ));
        assert_eq!(store.get_attempts("a/x_2022-06-01.json"), 3);
        // ⏱️ two sleeps of five seconds, and not a tick more
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_zero_retries_is_one_shot() {
        let store = InMemoryObjectStore::new().with_failing("k.json");
        let fetcher = fetcher_over(&store, 0);
        let started = Instant::now();

        let err = fetcher.fetch("k.json").await.err().unwrap();

        assert!(matches!(err, ArchiveError::FetchExhausted { attempts: 1, .. }));
        assert_eq!(store.get_attempts("k.json"), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_gone_is_gone_on_the_first_try() {
        let store = InMemoryObjectStore::new().with_gone("a/y_2022-06-01.json");
        let fetcher = fetcher_over(&store, 5);
        let started = Instant::now();

        let err = fetcher.fetch("a/y_2022-06-01.json").await.err().unwrap();

        assert!(matches!(err, ArchiveError::ObjectGone { .. }));
        assert!(!err.is_fatal());
        assert_eq!(store.get_attempts("a/y_2022-06-01.json"), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_a_flaky_object_pulls_through() {
        let store = InMemoryObjectStore::new()
            .with_object("k.json", r#"{"ok":true}"#)
            .with_flaky("k.json", 2);
        let fetcher = fetcher_over(&store, 2);

        let mut body = fetcher.fetch("k.json").await.expect("third time is the charm");
        let mut text = String::new();
        body.read_to_string(&mut text).await.unwrap();

        assert_eq!(text, r#"{"ok":true}"#);
        assert_eq!(store.get_attempts("k.json"), 3);
    }
}
