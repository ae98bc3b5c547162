//! Cloudflare R2 artifact storage.
//!
//! This crate provides:
//! - Artifact and thumbnail upload
//! - Byte download
//! - Presigned delivery URL generation

pub mod client;
pub mod error;
pub mod operations;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
