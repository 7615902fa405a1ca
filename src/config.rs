use crate::errors::{ConfigError, Result};
use cloud_select_clouds::{
    get_provider, FileCatalogFetcher, HttpCatalogFetcher, UnconfiguredFetcher, CLOUD_NAMES,
};
use cloud_select_core::{BuiltinSolver, Ranking, SelectionSolver, Solver};
use cloud_select_utils::{CatalogFetcher, ClingoSolver};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SETTINGS_DIR: &str = ".cloud-select";
const SETTINGS_FILE: &str = "settings.toml";
const CACHE_DIR: &str = "cache";

/// Which solver evaluates the fact programs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SolverBackend {
    #[default]
    Builtin,
    Clingo,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SolverSettings {
    pub backend: SolverBackend,
    /// Defaults to `clingo` on the PATH
    pub clingo_path: Option<PathBuf>,
}

/// Where a provider's raw listing comes from. `path` wins when both are set.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CatalogSource {
    pub path: Option<String>,
    pub url: Option<String>,
}

/// User settings, loaded once and passed down explicitly
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Providers to query, in output order
    pub clouds: Vec<String>,
    /// Per-provider result limit
    pub max_results: usize,
    /// Cache lifetime in hours, 0 disables the cache
    pub cache_expire: u64,
    pub cache_dir: Option<String>,
    /// Deadline for the whole selection, 0 waits forever
    pub timeout_secs: u64,
    pub ranking: Vec<String>,
    pub solver: SolverSettings,
    pub catalogs: BTreeMap<String, CatalogSource>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            clouds: CLOUD_NAMES.iter().map(|s| s.to_string()).collect(),
            max_results: 10,
            cache_expire: 168,
            cache_dir: None,
            timeout_secs: 60,
            ranking: vec!["price".to_string(), "-cpu".to_string()],
            solver: SolverSettings::default(),
            catalogs: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load from `path`, or from the default location if it exists.
    /// An explicit path that does not exist is an error; a missing default
    /// file just means default settings.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (default_settings_path()?, false),
        };

        if !path.exists() {
            if required {
                return Err(ConfigError::NotFound(path.display().to_string()).into());
            }
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        debug!("Loading settings from {}", path.display());
        let content = fs::read_to_string(&path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject unknown clouds and malformed ranking keys up front
    pub fn validate(&self) -> Result<()> {
        if self.clouds.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "clouds".to_string(),
                value: "[]".to_string(),
            }
            .into());
        }
        for cloud in &self.clouds {
            get_provider(cloud)?;
        }
        Ranking::parse(&self.ranking)?;
        Ok(())
    }

    /// Cache root, defaulting to `~/.cloud-select/cache`
    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => expand_path(dir),
            None => Ok(settings_dir()?.join(CACHE_DIR)),
        }
    }

    /// Catalog source for `provider` as a fetch collaborator
    pub fn fetcher(&self, provider: &str) -> Result<Arc<dyn CatalogFetcher>> {
        let source = self.catalogs.get(provider);
        let fetcher: Arc<dyn CatalogFetcher> = match source {
            Some(CatalogSource {
                path: Some(path), ..
            }) => Arc::new(FileCatalogFetcher::new(expand_path(path)?)),
            Some(CatalogSource { url: Some(url), .. }) => {
                Arc::new(HttpCatalogFetcher::new(url.clone()))
            }
            _ => Arc::new(UnconfiguredFetcher),
        };
        Ok(fetcher)
    }

    /// Selection solver for the configured backend and ranking
    pub fn solver(&self) -> Result<SelectionSolver> {
        let ranking = Ranking::parse(&self.ranking)?;
        let solver: Arc<dyn Solver> = match self.solver.backend {
            SolverBackend::Builtin => Arc::new(BuiltinSolver),
            SolverBackend::Clingo => {
                Arc::new(ClingoSolver::locate(self.solver.clingo_path.as_deref())?)
            }
        };
        Ok(SelectionSolver::new(solver, ranking))
    }
}

fn settings_dir() -> Result<PathBuf> {
    let home_dir = dirs::home_dir().ok_or(ConfigError::NoHomeDirectory)?;
    Ok(home_dir.join(SETTINGS_DIR))
}

pub fn default_settings_path() -> Result<PathBuf> {
    Ok(settings_dir()?.join(SETTINGS_FILE))
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home_dir = dirs::home_dir().ok_or_else(|| ConfigError::InvalidValue {
                field: "path".to_string(),
                value: path.to_string(),
            })?;
            Ok(home_dir.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}
