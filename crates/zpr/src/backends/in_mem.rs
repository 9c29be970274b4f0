//! # Previously, on zpr...
//!
//! 🎬 The bucket was fake. The objects were fake. The failures were extremely real,
//! because we typed them in ourselves.
//!
//! `in_mem` provides an in-memory [`ObjectStore`](super::ObjectStore) for tests: seed it
//! with keys, tell it which ones should break and how, hand it to a job, and then ask it
//! afterwards what happened. Every call is counted. Nothing is forgotten.
//!
//! ⚠️ This is NOT for production. It is `#[cfg(test)]` for a reason. 🦆

mod in_mem_store;

pub(crate) use in_mem_store::InMemoryObjectStore;
