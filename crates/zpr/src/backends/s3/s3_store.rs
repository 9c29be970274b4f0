//! 🪣📡🏗️ S3 Object Store: list, stream, upload. Politely.
//!
//! COLD OPEN, EXT. DATA CENTER, 3:47 AM
//!
//! "We need every article since 1995," they said. "Zipped. By year. By morning."
//! The S3ObjectStore blinked. "One page of a thousand keys at a time," it said,
//! "and I am not retrying anything behind your back."
//!
//! 🧠 Knowledge graph:
//! - `S3StoreConfig`: bucket, region, optional endpoint (S3-compatible stores), optional static keys
//! - `S3ObjectStore::connect`: builds the client, then `HeadBucket` so a bad bucket fails at startup
//! - SDK retries are disabled; the fetcher is the only retry loop in the building
//! - Error mapping: `NoSuchKey`/404 → `NotFound`, `NoSuchBucket` → `NoSuchBucket`,
//!   `BadDigest`/`InvalidDigest` → `ChecksumMismatch`, everything else → `Request`

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::backends::{ObjectBody, ObjectStore};
use crate::errors::{ArchiveError, StoreError};

// ============================================================
//  🔧 S3StoreConfig, knobs, dials, and one bucket name
// ============================================================

/// 🔧 Where the content lives and how to reach it.
///
/// Credentials are optional: when absent the AWS default provider chain is used
/// (env vars, `~/.aws/config`, instance role, hope).
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct S3StoreConfig {
    /// 🪣 The bucket holding the content and, later, the archives.
    #[serde(default)]
    pub bucket: String,
    /// 🌎 AWS region, defaults to "us-east-1" because that's where data goes to retire
    #[serde(default = "default_s3_region")]
    pub region: String,
    /// 🌐 Custom endpoint (`s3.amazonaws.com`, a MinIO box, a mock). Scheme optional.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// 🛣️ `https://host/bucket/key` instead of `https://bucket.host/key`. MinIO likes this.
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

impl Default for S3StoreConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: default_s3_region(),
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
        }
    }
}

impl S3StoreConfig {
    /// 🌐 The endpoint as a URL. Bare hostnames get `https://` glued on.
    pub fn resolved_endpoint(&self) -> Option<String> {
        self.endpoint_url.as_ref().map(|endpoint| {
            if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                endpoint.clone()
            } else {
                format!("https://{endpoint}")
            }
        })
    }
}

// ============================================================
//  🪣 S3ObjectStore
// ============================================================

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// 🚀 Build the client and make sure the bucket answers the door.
    ///
    /// 💀 Fails with `GatewayInitFailure` when the bucket is missing, the credentials are
    /// wrong, or the endpoint is a figment of the config file's imagination.
    pub async fn connect(config: &S3StoreConfig) -> Result<Self, ArchiveError> {
        let mut the_loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            the_loader = the_loader.credentials_provider(Credentials::new(
                key_id.clone(),
                secret.clone(),
                None,
                None,
                "zpr-config",
            ));
        }
        let the_sdk_config = the_loader.load().await;

        let mut the_builder = aws_sdk_s3::config::Builder::from(&the_sdk_config)
            .force_path_style(config.force_path_style)
            .retry_config(RetryConfig::disabled());
        if let Some(endpoint) = config.resolved_endpoint() {
            the_builder = the_builder.endpoint_url(endpoint);
        }

        let store = Self::from_client(Client::from_conf(the_builder.build()), config.bucket.clone());
        store.check_bucket().await.map_err(|source| ArchiveError::GatewayInitFailure {
            bucket: config.bucket.clone(),
            source,
        })?;

        info!(
            "🪣 connected to bucket '{}' in {} ({})",
            config.bucket,
            config.region,
            config.resolved_endpoint().unwrap_or_else(|| "default endpoint".to_string())
        );
        Ok(store)
    }

    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    async fn check_bucket(&self) -> Result<(), StoreError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => {
                Err(StoreError::NoSuchBucket {
                    bucket: self.bucket.clone(),
                })
            }
            Err(err) => Err(request_error("HeadBucket", &self.bucket, err)),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    /// 📜 `ListObjectsV2` until `IsTruncated` says stop. Every page, no exceptions.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        info!("📜 listing keys under s3://{}/{}...", self.bucket, prefix);
        let mut the_keys = Vec::with_capacity(1024);
        let mut the_continuation: Option<String> = None;
        let mut the_page_count = 0usize;

        loop {
            let the_page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(the_continuation.take())
                .send()
                .await
                .map_err(|err| {
                    if err.as_service_error().is_some_and(|e| e.is_no_such_bucket()) {
                        StoreError::NoSuchBucket {
                            bucket: self.bucket.clone(),
                        }
                    } else {
                        request_error("ListObjectsV2", prefix, err)
                    }
                })?;
            the_page_count += 1;

            the_keys.extend(the_page.contents().iter().filter_map(|o| o.key().map(str::to_string)));
            trace!("📄 page {} brought the total to {} keys", the_page_count, the_keys.len());

            if !the_page.is_truncated().unwrap_or(false) {
                break;
            }
            match the_page.next_continuation_token() {
                Some(token) => the_continuation = Some(token.to_string()),
                // -- 💀 truncated but no token: the store is lying, and we refuse to loop forever
                None => {
                    return Err(StoreError::Request {
                        operation: "ListObjectsV2",
                        target: prefix.to_string(),
                        source: "truncated page without a continuation token".into(),
                    });
                }
            }
        }

        info!(
            "✅ finished listing s3://{}/{}: {} keys over {} page(s)",
            self.bucket,
            prefix,
            the_keys.len(),
            the_page_count
        );
        Ok(the_keys)
    }

    async fn get(&self, key: &str) -> Result<ObjectBody, StoreError> {
        let the_response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let is_gone = err.as_service_error().is_some_and(|e| e.is_no_such_key())
                    || err.raw_response().is_some_and(|r| r.status().as_u16() == 404);
                if is_gone {
                    StoreError::NotFound {
                        key: key.to_string(),
                    }
                } else {
                    request_error("GetObject", key, err)
                }
            })?;

        trace!("📥 opened stream for s3://{}/{}", self.bucket, key);
        Ok(Box::new(the_response.body.into_async_read()))
    }

    async fn put(&self, key: &str, local_path: &Path, content_md5: &str) -> Result<(), StoreError> {
        let the_body = ByteStream::from_path(local_path).await.map_err(|e| StoreError::LocalIo {
            path: local_path.to_path_buf(),
            source: std::io::Error::other(e),
        })?;

        debug!("📤 PutObject s3://{}/{} (Content-MD5 {})", self.bucket, key, content_md5);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/zip")
            .content_md5(content_md5)
            .body(the_body)
            .send()
            .await
            .map_err(|err| match err.as_service_error().and_then(|e| e.code()) {
                Some("NoSuchBucket") => StoreError::NoSuchBucket {
                    bucket: self.bucket.clone(),
                },
                Some("BadDigest") | Some("InvalidDigest") => StoreError::ChecksumMismatch {
                    key: key.to_string(),
                },
                _ => request_error("PutObject", key, err),
            })?;
        Ok(())
    }
}

fn request_error<E, R>(operation: &'static str, target: &str, err: SdkError<E, R>) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    StoreError::Request {
        operation,
        target: target.to_string(),
        source: Box::new(err),
    }
}

// ============================================================
//  🧪 Tests, a wiremock pretending very hard to be S3
// ============================================================
