//! # cloud-select clouds
//!
//! Provider adapters mapping each cloud's raw instance schema onto the
//! common attribute model, plus the catalog sources they are fetched from.

pub mod aws;
pub mod errors;
pub mod fetch;
pub mod google;
pub mod provider;

// Re-export common types for convenience
pub use aws::AmazonCloud;
pub use errors::{CloudError, Result};
pub use fetch::{FileCatalogFetcher, HttpCatalogFetcher, UnconfiguredFetcher};
pub use google::GoogleCloud;
pub use provider::{cloud_names, get_provider, CloudProvider, PriceCatalog, CLOUD_NAMES};
