use crate::provider::CloudProvider;
use cloud_select_core::{AttributeValue, CapabilityTable, InstanceKind};
use serde_json::Value;
use std::sync::Arc;

const FREE_TIER_TYPES: &[&str] = &["e2-micro", "f1-micro"];

/// Google Compute Engine, reading `machineTypes` items
#[derive(Debug, Clone)]
pub struct GoogleCloud {
    kind: Arc<InstanceKind>,
}

impl Default for GoogleCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleCloud {
    pub fn new() -> Self {
        Self {
            kind: Arc::new(Self::instance_kind()),
        }
    }

    pub fn instance_kind() -> InstanceKind {
        // ipv6 is not published per machine type and stays missing
        let capabilities = CapabilityTable::base()
            .with("arch", arch)
            .with("cpu", cpu)
            .with("free_tier", free_tier)
            .with("gpu", gpu)
            .with("gpu_count", gpu_count)
            .with("memory_gb", memory_gb)
            .with("region", region)
            .with("zone", zone);

        InstanceKind::new("google", "name", capabilities)
    }
}

impl CloudProvider for GoogleCloud {
    fn name(&self) -> &'static str {
        "google"
    }

    fn kind(&self) -> Arc<InstanceKind> {
        Arc::clone(&self.kind)
    }
}

fn machine_name(data: &Value) -> Option<&str> {
    data.get("name").and_then(|v| v.as_str())
}

/// Last path segment, zones are sometimes given as full resource URLs
fn short_name(zone: &str) -> &str {
    zone.rsplit('/').next().unwrap_or(zone)
}

/// `us-central1-a` -> `us-central1`
fn zone_region(zone: &str) -> &str {
    let zone = short_name(zone);
    match zone.rsplit_once('-') {
        Some((region, _)) => region,
        None => zone,
    }
}

fn zones(data: &Value) -> Vec<&str> {
    match data.get("zones").and_then(|v| v.as_array()) {
        Some(items) => items.iter().filter_map(|v| v.as_str()).collect(),
        None => data
            .get("zone")
            .and_then(|v| v.as_str())
            .into_iter()
            .collect(),
    }
}

fn arch(data: &Value) -> AttributeValue {
    match machine_name(data) {
        Some(name) if name.starts_with("t2a-") => AttributeValue::List(vec!["arm64".to_string()]),
        Some(_) => AttributeValue::List(vec!["x86_64".to_string()]),
        None => AttributeValue::Missing,
    }
}

fn cpu(data: &Value) -> AttributeValue {
    AttributeValue::int(data.get("guestCpus"))
}

fn memory_gb(data: &Value) -> AttributeValue {
    match data.get("memoryMb").and_then(|v| v.as_i64()) {
        Some(mb) => AttributeValue::Int(mb / 1024),
        None => AttributeValue::Missing,
    }
}

fn free_tier(data: &Value) -> AttributeValue {
    AttributeValue::Bool(
        machine_name(data)
            .map(|name| FREE_TIER_TYPES.contains(&name))
            .unwrap_or(false),
    )
}

fn accelerator_total(data: &Value) -> i64 {
    data.get("accelerators")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("guestAcceleratorCount").and_then(|v| v.as_i64()))
                .sum()
        })
        .unwrap_or(0)
}

fn gpu(data: &Value) -> AttributeValue {
    AttributeValue::Bool(accelerator_total(data) > 0)
}

fn gpu_count(data: &Value) -> AttributeValue {
    match accelerator_total(data) {
        0 => AttributeValue::Missing,
        count => AttributeValue::Int(count),
    }
}

fn region(data: &Value) -> AttributeValue {
    let mut regions: Vec<String> = Vec::new();
    for zone in zones(data) {
        let region = zone_region(zone).to_string();
        if !regions.contains(&region) {
            regions.push(region);
        }
    }

    if regions.is_empty() {
        AttributeValue::Missing
    } else {
        AttributeValue::List(regions)
    }
}

fn zone(data: &Value) -> AttributeValue {
    match data.get("zone").and_then(|v| v.as_str()) {
        Some(zone) => AttributeValue::Text(short_name(zone).to_string()),
        None => AttributeValue::Missing,
    }
}
