use crate::client::{Client, SelectionRequest};
use crate::config::Settings;
use crate::errors::Result;
use clap::Args;
use log::{info, warn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

#[derive(Args, Debug, Default)]
pub struct InstanceArgs {
    /// Processor architecture (comma separated: x86_64, arm64, i386, x86_64_mac, arm64_mac)
    #[arg(long, value_delimiter = ',')]
    pub arch: Vec<String>,

    /// Exact number of vCPUs
    #[arg(long)]
    pub cpu: Option<u64>,

    /// Minimum number of vCPUs
    #[arg(long)]
    pub cpu_min: Option<u64>,

    /// Maximum number of vCPUs
    #[arg(long)]
    pub cpu_max: Option<u64>,

    /// Free tier eligible
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub free_tier: Option<bool>,

    /// Has at least one GPU
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub gpu: Option<bool>,

    /// Exact number of GPUs
    #[arg(long)]
    pub gpu_count: Option<u64>,

    /// Minimum number of GPUs
    #[arg(long)]
    pub gpu_count_min: Option<u64>,

    /// Maximum number of GPUs
    #[arg(long)]
    pub gpu_count_max: Option<u64>,

    /// Supports IPv6
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub ipv6: Option<bool>,

    /// Exact memory in GB
    #[arg(long)]
    pub memory_gb: Option<u64>,

    /// Minimum memory in GB
    #[arg(long)]
    pub memory_gb_min: Option<u64>,

    /// Maximum memory in GB
    #[arg(long)]
    pub memory_gb_max: Option<u64>,

    /// Offered in one of these regions (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub regions: Vec<String>,

    /// Free-form filter override, e.g. -s cpu_min=4 (repeatable)
    #[arg(short = 's', long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// Keep instances offered in a region matching this regex
    #[arg(long)]
    pub region: Option<String>,

    /// Write results to a JSON file instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Write the fact programs handed to the solver
    #[arg(long)]
    pub out_asp: Option<PathBuf>,
}

impl InstanceArgs {
    /// Filter values keyed by filter name; unset flags are left out
    pub fn filters(&self) -> BTreeMap<String, Value> {
        let mut filters = BTreeMap::new();

        let numbers = [
            ("cpu", self.cpu),
            ("cpu_min", self.cpu_min),
            ("cpu_max", self.cpu_max),
            ("gpu_count", self.gpu_count),
            ("gpu_count_min", self.gpu_count_min),
            ("gpu_count_max", self.gpu_count_max),
            ("memory_gb", self.memory_gb),
            ("memory_gb_min", self.memory_gb_min),
            ("memory_gb_max", self.memory_gb_max),
        ];
        for (key, value) in numbers {
            if let Some(n) = value {
                filters.insert(key.to_string(), Value::from(n));
            }
        }

        let flags = [
            ("free_tier", self.free_tier),
            ("gpu", self.gpu),
            ("ipv6", self.ipv6),
        ];
        for (key, value) in flags {
            if let Some(b) = value {
                filters.insert(key.to_string(), Value::Bool(b));
            }
        }

        if !self.arch.is_empty() {
            filters.insert("arch".to_string(), Value::from(self.arch.clone()));
        }
        if !self.regions.is_empty() {
            filters.insert("regions".to_string(), Value::from(self.regions.clone()));
        }

        filters
    }

    pub fn request(&self) -> SelectionRequest {
        SelectionRequest {
            filters: self.filters(),
            overrides: self.overrides.clone(),
            region: self.region.clone(),
        }
    }
}

pub async fn handle_instance(args: InstanceArgs, settings: Settings) -> Result<()> {
    let client = Client::new(settings)?;
    let selection = client.instance_select(&args.request()).await?;

    if let Some(path) = &args.out_asp {
        fs::write(path, selection.render_programs())?;
        info!("Wrote fact programs to {}", path.display());
    }

    if selection.rows.is_empty() {
        warn!("No instances matched the given constraints");
    }

    let json = selection.to_json()?;
    match &args.out {
        Some(path) => {
            fs::write(path, json)?;
            info!("Wrote {} results to {}", selection.rows.len(), path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}
