//! Persisted Video and Batch record stores.
//!
//! The orchestration core touches records through the `VideoStore` and
//! `BatchStore` traits only. Mutations are narrow (single-field or
//! small-field-set updates keyed by id) and idempotent, so re-applying a
//! write after a crash-and-retry is harmless.
//!
//! Two implementations:
//! - `RedisStore`: production, records as Redis hashes; batch counters use
//!   HINCRBY so concurrent child completions never lose updates
//! - `MemoryStore`: tests and local development

pub mod error;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::{BatchStore, ItemOutcome, VideoStore};
