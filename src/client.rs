use crate::config::Settings;
use crate::errors::Result;
use cloud_select_clouds::{get_provider, CloudProvider};
use cloud_select_core::{
    CapabilityTable, ConstraintEncoder, ConstraintSet, FactProgram, InstanceRow,
    ProviderSelection, ResultAssembler, SelectError, SelectionSolver,
};
use cloud_select_utils::{CacheStore, CatalogFetcher};
use futures::future::join_all;
use log::{debug, info, warn};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

/// What the user asked for: filter values by key, `key=value` overrides and
/// an optional region pattern
#[derive(Debug, Clone, Default)]
pub struct SelectionRequest {
    pub filters: BTreeMap<String, Value>,
    pub overrides: Vec<String>,
    pub region: Option<String>,
}

impl SelectionRequest {
    pub fn filter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.filters.insert(key.to_string(), value.into());
        self
    }
}

/// Ranked rows across providers plus the fact program solved for each
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub rows: Vec<InstanceRow>,
    pub programs: Vec<(String, FactProgram)>,
}

impl Selection {
    pub fn to_records(&self) -> Vec<Value> {
        self.rows.iter().map(InstanceRow::to_record).collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_records())?)
    }

    /// Every solved program, each under a `% provider: <name>` header
    pub fn render_programs(&self) -> String {
        let mut out = String::new();
        for (provider, program) in &self.programs {
            let _ = writeln!(out, "% provider: {}", provider);
            let _ = write!(out, "{}", program);
        }
        out
    }
}

/// Runs selections against the configured providers
pub struct Client {
    settings: Settings,
    cache: CacheStore,
    solver: SelectionSolver,
    providers: Vec<Arc<dyn CloudProvider>>,
    fetchers: HashMap<String, Arc<dyn CatalogFetcher>>,
}

impl Client {
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;

        let cache = CacheStore::new(settings.cache_dir()?);
        let solver = settings.solver()?;

        let mut providers = Vec::new();
        let mut fetchers = HashMap::new();
        for cloud in &settings.clouds {
            providers.push(get_provider(cloud)?);
            fetchers.insert(cloud.clone(), settings.fetcher(cloud)?);
        }

        debug!(
            "Client for {:?} with cache at {}",
            settings.clouds,
            cache.root().display()
        );

        Ok(Self {
            settings,
            cache,
            solver,
            providers,
            fetchers,
        })
    }

    /// Replace the catalog source for one provider
    pub fn with_fetcher(mut self, provider: &str, fetcher: Arc<dyn CatalogFetcher>) -> Self {
        self.fetchers.insert(provider.to_string(), fetcher);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Select instances matching `request` from every configured provider.
    ///
    /// Invalid filters fail before any provider is contacted. A provider that
    /// fails to load, or does not finish before the deadline, is left out
    /// with a warning.
    pub async fn instance_select(&self, request: &SelectionRequest) -> Result<Selection> {
        let encoder = ConstraintEncoder::for_capabilities(&CapabilityTable::base());
        let constraints = encoder.encode(&request.filters, &request.overrides)?;
        debug!("Encoded {} constraints", constraints.len());

        let region = request
            .region
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(SelectError::from)?;

        let deadline = match self.settings.timeout_secs {
            0 => None,
            secs => Some(Instant::now() + Duration::from_secs(secs)),
        };

        let tasks = self.providers.iter().map(|provider| {
            let constraints = &constraints;
            let region = region.as_ref();
            async move {
                let work = self.select_provider(Arc::clone(provider), constraints, region);
                let result = match deadline {
                    Some(deadline) => timeout_at(deadline, work).await.map_err(|_| ()),
                    None => Ok(work.await),
                };
                (provider.name(), result)
            }
        });

        let mut selections = Vec::new();
        let mut programs = Vec::new();
        for (name, result) in join_all(tasks).await {
            match result {
                Ok(Ok((selection, program))) => {
                    info!("{}: {} matching instances", name, selection.rows.len());
                    selections.push(selection);
                    programs.push((name.to_string(), program));
                }
                Ok(Err(e)) => warn!("Skipping {}: {}", name, e),
                Err(()) => warn!(
                    "Skipping {}: no result within {} seconds",
                    name, self.settings.timeout_secs
                ),
            }
        }

        let assembler = ResultAssembler::new(self.settings.clouds.clone(), self.settings.max_results);
        Ok(Selection {
            rows: assembler.assemble(selections),
            programs,
        })
    }

    async fn select_provider(
        &self,
        provider: Arc<dyn CloudProvider>,
        constraints: &ConstraintSet,
        region: Option<&Regex>,
    ) -> Result<(ProviderSelection, FactProgram)> {
        let name = provider.name();
        let fetcher = self.fetcher(name);
        let mut group = provider
            .instances(&self.cache, self.settings.cache_expire, fetcher.as_ref())
            .await?;

        if let Some(pattern) = region {
            provider.filter_region(&mut group, pattern);
        }
        debug!(
            "{}: {} instances, attribute counts {:?}",
            name,
            group.len(),
            group.attribute_counts()
        );

        let solver = self.solver.clone();
        let constraints = constraints.clone();
        let max_results = self.settings.max_results;
        let (program, rows) = tokio::task::spawn_blocking(move || {
            let program = FactProgram::encode(&group, &constraints);
            let rows = solver.solve_program(&group, &program, &constraints, max_results)?;
            Ok::<_, SelectError>((program, rows))
        })
        .await??;

        Ok((ProviderSelection::new(name, rows), program))
    }

    fn fetcher(&self, provider: &str) -> Arc<dyn CatalogFetcher> {
        match self.fetchers.get(provider) {
            Some(fetcher) => Arc::clone(fetcher),
            None => Arc::new(cloud_select_clouds::UnconfiguredFetcher),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CloudSelectError;
    use async_trait::async_trait;
    use cloud_select_core::{AttributeValue, RawListing};
    use cloud_select_utils::UtilsError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticFetcher {
        data: RawListing,
        calls: AtomicUsize,
    }

    impl StaticFetcher {
        fn new(data: RawListing) -> Arc<Self> {
            Arc::new(Self {
                data,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CatalogFetcher for StaticFetcher {
        async fn fetch(&self, _provider: &str) -> cloud_select_utils::Result<RawListing> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.data.clone())
        }
    }

    struct SlowFetcher;

    #[async_trait]
    impl CatalogFetcher for SlowFetcher {
        async fn fetch(&self, _provider: &str) -> cloud_select_utils::Result<RawListing> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    struct BrokenFetcher;

    #[async_trait]
    impl CatalogFetcher for BrokenFetcher {
        async fn fetch(&self, provider: &str) -> cloud_select_utils::Result<RawListing> {
            Err(UtilsError::fetch(provider, "connection refused"))
        }
    }

    fn aws_listing() -> RawListing {
        vec![
            json!({
                "InstanceType": "t3.micro",
                "VCpuInfo": {"DefaultVCpus": 2},
                "MemoryInfo": {"SizeInMiB": 1024},
                "FreeTierEligible": true,
                "Regions": ["us-east-1"]
            }),
            json!({
                "InstanceType": "m5.xlarge",
                "VCpuInfo": {"DefaultVCpus": 4},
                "MemoryInfo": {"SizeInMiB": 16384},
                "Regions": ["us-east-1", "eu-west-1"]
            }),
            json!({
                "InstanceType": "m5.4xlarge",
                "VCpuInfo": {"DefaultVCpus": 16},
                "MemoryInfo": {"SizeInMiB": 65536},
                "Regions": ["eu-west-1"]
            }),
        ]
    }

    fn google_listing() -> RawListing {
        vec![
            json!({"name": "e2-standard-4", "guestCpus": 4, "memoryMb": 16384, "zone": "us-east1-b"}),
            json!({"name": "e2-micro", "guestCpus": 2, "memoryMb": 1024, "zone": "us-east1-b"}),
        ]
    }

    fn settings(dir: &tempfile::TempDir) -> Settings {
        Settings {
            cache_dir: Some(dir.path().display().to_string()),
            ..Settings::default()
        }
    }

    fn client(settings: Settings) -> Client {
        Client::new(settings)
            .unwrap()
            .with_fetcher("aws", StaticFetcher::new(aws_listing()))
            .with_fetcher("google", StaticFetcher::new(google_listing()))
    }

    #[tokio::test]
    async fn test_select_across_providers() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(settings(&dir));
        let request = SelectionRequest::default().filter("cpu_min", 4);

        let selection = client.instance_select(&request).await.unwrap();
        let names: Vec<(&str, &str)> = selection
            .rows
            .iter()
            .map(|row| (row.provider.as_str(), row.name.as_str()))
            .collect();

        // price is missing everywhere, so cpu descending decides
        assert_eq!(
            names,
            vec![
                ("aws", "m5.4xlarge"),
                ("aws", "m5.xlarge"),
                ("google", "e2-standard-4")
            ]
        );
        for row in &selection.rows {
            assert!(row.get("cpu").and_then(AttributeValue::as_i64).unwrap() >= 4);
        }
    }

    #[tokio::test]
    async fn test_max_results_per_provider() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(Settings {
            max_results: 1,
            ..settings(&dir)
        });

        let selection = client
            .instance_select(&SelectionRequest::default())
            .await
            .unwrap();
        assert_eq!(selection.rows.len(), 2);
        assert_eq!(selection.rows[0].provider, "aws");
        assert_eq!(selection.rows[1].provider, "google");
    }

    #[tokio::test]
    async fn test_unknown_filter_fails_before_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = StaticFetcher::new(aws_listing());
        let client = Client::new(settings(&dir))
            .unwrap()
            .with_fetcher("aws", fetcher.clone());

        let request = SelectionRequest::default().filter("bogus_attr", 1);
        let err = client.instance_select(&request).await.unwrap_err();

        assert!(matches!(
            err,
            CloudSelectError::Select(SelectError::Validation(_))
        ));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsatisfiable_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(settings(&dir));
        let request = SelectionRequest::default().filter("cpu_min", 1_000_000);

        let selection = client.instance_select(&request).await.unwrap();
        assert!(selection.rows.is_empty());
        assert_eq!(selection.programs.len(), 2);
    }

    #[tokio::test]
    async fn test_region_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(Settings {
            clouds: vec!["aws".to_string()],
            ..settings(&dir)
        });
        let request = SelectionRequest {
            region: Some("eu-".to_string()),
            ..SelectionRequest::default()
        };

        let selection = client.instance_select(&request).await.unwrap();
        let names: Vec<&str> = selection.rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["m5.4xlarge", "m5.xlarge"]);

        let bad = SelectionRequest {
            region: Some("(".to_string()),
            ..SelectionRequest::default()
        };
        assert!(client.instance_select(&bad).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_provider_is_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(settings(&dir)).with_fetcher("aws", Arc::new(BrokenFetcher));

        let selection = client
            .instance_select(&SelectionRequest::default())
            .await
            .unwrap();
        assert!(!selection.rows.is_empty());
        assert!(selection.rows.iter().all(|row| row.provider == "google"));
    }

    #[tokio::test]
    async fn test_deadline_returns_partial_results() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(Settings {
            timeout_secs: 1,
            ..settings(&dir)
        })
        .with_fetcher("google", Arc::new(SlowFetcher));

        let selection = client
            .instance_select(&SelectionRequest::default())
            .await
            .unwrap();
        assert!(selection.rows.iter().all(|row| row.provider == "aws"));
        assert_eq!(selection.rows.len(), 3);
    }

    #[tokio::test]
    async fn test_cache_reused_between_selections() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = StaticFetcher::new(aws_listing());
        let client = Client::new(Settings {
            clouds: vec!["aws".to_string()],
            ..settings(&dir)
        })
        .unwrap()
        .with_fetcher("aws", fetcher.clone());

        client.instance_select(&SelectionRequest::default()).await.unwrap();
        client.instance_select(&SelectionRequest::default()).await.unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(client.cache().read("aws").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_render_programs() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(settings(&dir));
        let request = SelectionRequest::default()
            .filter("gpu", false)
            .filter("cpu", 4);

        let selection = client.instance_select(&request).await.unwrap();
        let rendered = selection.render_programs();

        assert!(rendered.starts_with("% provider: aws\n"));
        assert!(rendered.contains("% provider: google\n"));
        assert!(rendered.contains("instance(\"e2-micro\")."));
        assert!(rendered.contains("constraint(\"gpu\",\"present\",false)."));
        assert!(rendered.contains("constraint(\"cpu\",\"eq\",4)."));
        assert!(!rendered.contains("constraint(\"gpu\",\"eq\","));
    }

    #[tokio::test]
    async fn test_records_have_every_capability() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(Settings {
            clouds: vec!["google".to_string()],
            ..settings(&dir)
        });
        let request = SelectionRequest::default().filter("free_tier", true);

        let selection = client.instance_select(&request).await.unwrap();
        let records = selection.to_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["name"], "e2-micro");
        assert_eq!(records[0]["provider"], "google");
        assert_eq!(records[0]["price"], Value::Null);
        assert_eq!(records[0]["region"], json!(["us-east1"]));
    }
}
