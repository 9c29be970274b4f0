//! 🪣🚀🌐 S3 Backend: the cloud end of the pipe.
//!
//! INT. AWS CONSOLE, NIGHT. A bucket holds a few million JSON documents, each one
//! named after the day it was born. Nobody has ever downloaded all of them at once.
//! Tonight, somebody will. Politely. A few at a time.
//!
//! This module wraps the AWS S3 SDK and implements [`ObjectStore`](super::ObjectStore):
//! `ListObjectsV2` page by page, `GetObject` as a stream, `PutObject` with `Content-MD5`.
//!
//! 🧠 Knowledge graph:
//! - Config co-located: `S3StoreConfig` lives in `s3_store.rs`
//! - Trait impl: `impl ObjectStore for S3ObjectStore`
//! - Enum variant: `StoreBackend::S3(S3ObjectStore)`
//! - Transport: `GetObject` → `ByteStream::into_async_read()` → boxed `AsyncRead`
//!
//! 🦆 The duck has no clearance for AWS. It watches from the edge of the VPC.

mod s3_store;

pub use s3_store::{S3ObjectStore, S3StoreConfig};
