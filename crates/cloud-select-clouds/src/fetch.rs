use async_trait::async_trait;
use cloud_select_core::RawListing;
use cloud_select_utils::{CatalogFetcher, Result, UtilsError};
use log::{debug, error, info};
use reqwest::Client;
use serde_json::Value;
use std::path::PathBuf;

/// Wrapper keys providers use around their item arrays
const LIST_KEYS: &[&str] = &["InstanceTypes", "items"];

/// Accept either a bare array of items or an object wrapping one
pub fn listing_from_value(provider: &str, value: Value) -> Result<RawListing> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            for key in LIST_KEYS {
                if let Some(Value::Array(items)) = map.remove(*key) {
                    return Ok(items);
                }
            }
            Err(UtilsError::fetch(
                provider,
                format!("expected an array or one of {:?}", LIST_KEYS),
            ))
        }
        other => Err(UtilsError::fetch(
            provider,
            format!("expected an array, got {}", other),
        )),
    }
}

/// Reads a catalog exported to a local JSON file
#[derive(Debug, Clone)]
pub struct FileCatalogFetcher {
    path: PathBuf,
}

impl FileCatalogFetcher {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl CatalogFetcher for FileCatalogFetcher {
    async fn fetch(&self, provider: &str) -> Result<RawListing> {
        debug!("Reading {} catalog from {}", provider, self.path.display());
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            UtilsError::fetch(provider, format!("cannot read {}: {}", self.path.display(), e))
        })?;

        let value: Value = serde_json::from_str(&content)?;
        let listing = listing_from_value(provider, value)?;
        info!("Loaded {} {} instance types", listing.len(), provider);
        Ok(listing)
    }
}

/// Downloads a catalog from a URL serving JSON
#[derive(Debug, Clone)]
pub struct HttpCatalogFetcher {
    client: Client,
    url: String,
}

impl HttpCatalogFetcher {
    pub fn new(url: String) -> Self {
        Self::with_client(Client::new(), url)
    }

    pub fn with_client(client: Client, url: String) -> Self {
        Self { client, url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CatalogFetcher for HttpCatalogFetcher {
    async fn fetch(&self, provider: &str) -> Result<RawListing> {
        debug!("GET {} for {} catalog", self.url, provider);
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| UtilsError::fetch(provider, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Catalog request failed with status: {}", status);
            debug!("Error response body: {}", error_text);
            return Err(UtilsError::fetch(
                provider,
                format!("HTTP {}: {}", status.as_u16(), error_text),
            ));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| UtilsError::fetch(provider, e.to_string()))?;
        let listing = listing_from_value(provider, value)?;
        info!("Fetched {} {} instance types", listing.len(), provider);
        Ok(listing)
    }
}

/// Stand-in for a provider with no catalog source in the settings
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredFetcher;

#[async_trait]
impl CatalogFetcher for UnconfiguredFetcher {
    async fn fetch(&self, provider: &str) -> Result<RawListing> {
        Err(UtilsError::fetch(
            provider,
            format!(
                "no catalog source configured, set [catalogs.{}] path or url in settings",
                provider
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_listing_shapes() {
        let bare = listing_from_value("aws", json!([{"InstanceType": "t3.nano"}])).unwrap();
        assert_eq!(bare.len(), 1);

        let aws = listing_from_value("aws", json!({"InstanceTypes": [{}, {}]})).unwrap();
        assert_eq!(aws.len(), 2);

        let google = listing_from_value("google", json!({"kind": "x", "items": [{}]})).unwrap();
        assert_eq!(google.len(), 1);

        assert!(listing_from_value("aws", json!({"other": []})).is_err());
        assert!(listing_from_value("aws", json!("nope")).is_err());
    }

    #[tokio::test]
    async fn test_file_fetcher() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"items": [{{"name": "e2-micro"}}]}}"#).unwrap();

        let fetcher = FileCatalogFetcher::new(file.path().to_path_buf());
        let listing = fetcher.fetch("google").await.unwrap();
        assert_eq!(listing[0]["name"], "e2-micro");
    }

    #[tokio::test]
    async fn test_file_fetcher_missing_file() {
        let fetcher = FileCatalogFetcher::new(PathBuf::from("/nonexistent/catalog.json"));
        let result = fetcher.fetch("aws").await;
        assert!(matches!(result, Err(UtilsError::Fetch { .. })));
    }

    #[tokio::test]
    async fn test_unconfigured_fetcher() {
        let err = UnconfiguredFetcher.fetch("aws").await.unwrap_err();
        assert!(err.to_string().contains("[catalogs.aws]"));
    }
}
