use crate::aws::AmazonCloud;
use crate::errors::{CloudError, Result};
use crate::google::GoogleCloud;
use async_trait::async_trait;
use cloud_select_core::{InstanceGroup, InstanceKind, RawListing};
use cloud_select_utils::{CacheStore, CatalogFetcher};
use log::debug;
use regex::Regex;
use std::sync::Arc;

/// Every cloud cloud-select knows how to read
pub const CLOUD_NAMES: &[&str] = &["aws", "google"];

pub fn cloud_names() -> Vec<String> {
    CLOUD_NAMES.iter().map(|s| s.to_string()).collect()
}

/// Look up a provider adapter by name
pub fn get_provider(name: &str) -> Result<Arc<dyn CloudProvider>> {
    match name {
        "aws" => Ok(Arc::new(AmazonCloud::new())),
        "google" => Ok(Arc::new(GoogleCloud::new())),
        other => Err(CloudError::UnknownCloud(other.to_string())),
    }
}

/// Raw pricing data for a provider.
///
/// Pricing is not normalized yet; this only carries the raw listing to
/// [`CloudProvider::add_instance_prices`].
#[derive(Debug, Clone, Default)]
pub struct PriceCatalog {
    pub provider: String,
    pub data: RawListing,
}

/// A cloud provider adapter
#[async_trait]
pub trait CloudProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Capability table and name field for this provider's instances
    fn kind(&self) -> Arc<InstanceKind>;

    /// Wrap a raw listing in an instance group
    fn load_instances(&self, data: RawListing) -> InstanceGroup {
        InstanceGroup::new(self.kind(), data)
    }

    /// Keep instances offered in a region matching `pattern`
    fn filter_region(&self, group: &mut InstanceGroup, pattern: &Regex) {
        group.retain_regions(pattern);
    }

    /// Attach prices to instances. No provider implements this yet.
    fn add_instance_prices(&self, group: &mut InstanceGroup, prices: &PriceCatalog) {
        debug!(
            "Price enrichment for {} is not implemented ({} price items, {} instances)",
            self.name(),
            prices.data.len(),
            group.len()
        );
    }

    /// Load instances through the cache, fetching on a miss
    async fn instances(
        &self,
        cache: &CacheStore,
        ttl_hours: u64,
        fetcher: &dyn CatalogFetcher,
    ) -> Result<InstanceGroup> {
        let data = cache.get(self.name(), ttl_hours, fetcher).await?;
        Ok(self.load_instances(data))
    }
}
