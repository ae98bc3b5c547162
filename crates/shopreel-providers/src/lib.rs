//! HTTP adapters for external AI video providers.
//!
//! This crate provides:
//! - The `ProviderAdapter` trait (`submit`/`poll`)
//! - Normalized task status (`ProviderStatus`, `ProviderPhase`)
//! - One adapter per vendor, each containing every piece of that vendor's
//!   wire-format weirdness so nothing leaks past the adapter boundary

pub mod adapter;
pub mod avatarly;
pub mod error;
pub mod router;
pub mod vireo;

pub use adapter::{ProviderAdapter, ProviderStatus, SubmitRequest};
pub use avatarly::{AvatarlyAdapter, AvatarlyConfig};
pub use error::{ProviderError, ProviderResult};
pub use router::ProviderRouter;
pub use vireo::{VireoAdapter, VireoConfig};
