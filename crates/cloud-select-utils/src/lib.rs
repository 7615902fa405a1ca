//! # cloud-select utils
//!
//! Infrastructure utilities for cloud-select: the on-disk catalog cache and
//! the external logic solver process.

pub mod cache;
pub mod clingo;
pub mod errors;

// Re-export common types for convenience
pub use cache::{CacheEntry, CacheStore, CatalogFetcher, Clock, SystemClock};
pub use clingo::ClingoSolver;
pub use errors::{Result, UtilsError};
