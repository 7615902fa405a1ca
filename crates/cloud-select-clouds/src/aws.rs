use crate::provider::CloudProvider;
use cloud_select_core::{AttributeValue, CapabilityTable, InstanceKind};
use serde_json::Value;
use std::sync::Arc;

/// Amazon EC2, reading `DescribeInstanceTypes` items that carry an extra
/// `Regions` list of where each type is offered.
#[derive(Debug, Clone)]
pub struct AmazonCloud {
    kind: Arc<InstanceKind>,
}

impl Default for AmazonCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl AmazonCloud {
    pub fn new() -> Self {
        Self {
            kind: Arc::new(Self::instance_kind()),
        }
    }

    pub fn instance_kind() -> InstanceKind {
        let capabilities = CapabilityTable::base()
            .with("arch", arch)
            .with("cpu", cpu)
            .with("description", description)
            .with("free_tier", free_tier)
            .with("gpu", gpu)
            .with("gpu_count", gpu_count)
            .with("ipv6", ipv6)
            .with("memory_gb", memory_gb)
            .with("region", region);

        InstanceKind::new("aws", "InstanceType", capabilities)
    }
}

impl CloudProvider for AmazonCloud {
    fn name(&self) -> &'static str {
        "aws"
    }

    fn kind(&self) -> Arc<InstanceKind> {
        Arc::clone(&self.kind)
    }
}

fn arch(data: &Value) -> AttributeValue {
    AttributeValue::list(data.pointer("/ProcessorInfo/SupportedArchitectures"))
}

fn cpu(data: &Value) -> AttributeValue {
    AttributeValue::int(data.pointer("/VCpuInfo/DefaultVCpus"))
}

/// Memory in whole GB, truncated from MiB
fn memory_gb(data: &Value) -> AttributeValue {
    match data.pointer("/MemoryInfo/SizeInMiB").and_then(|v| v.as_i64()) {
        Some(mib) => AttributeValue::Int(mib / 1024),
        None => AttributeValue::Missing,
    }
}

/// Formatted like Google's descriptions: "2 vCPUs, 8 GB RAM"
fn description(data: &Value) -> AttributeValue {
    match (cpu(data).as_i64(), memory_gb(data).as_i64()) {
        (Some(cpus), Some(memory)) => {
            AttributeValue::Text(format!("{} vCPUs, {} GB RAM", cpus, memory))
        }
        _ => AttributeValue::Missing,
    }
}

fn free_tier(data: &Value) -> AttributeValue {
    AttributeValue::Bool(
        data.get("FreeTierEligible")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
    )
}

fn ipv6(data: &Value) -> AttributeValue {
    AttributeValue::boolean(data.pointer("/NetworkInfo/Ipv6Supported"))
}

fn gpu(data: &Value) -> AttributeValue {
    let present = match data.get("GpuInfo") {
        Some(Value::Object(info)) => !info.is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    };
    AttributeValue::Bool(present)
}

/// Sum of counts across every GPU spec of the instance
fn gpu_count(data: &Value) -> AttributeValue {
    let specs = match data.pointer("/GpuInfo/Gpus").and_then(|v| v.as_array()) {
        Some(specs) if !specs.is_empty() => specs,
        _ => return AttributeValue::Missing,
    };

    let count = specs
        .iter()
        .filter_map(|spec| spec.get("Count").and_then(|v| v.as_i64()))
        .sum();
    AttributeValue::Int(count)
}

fn region(data: &Value) -> AttributeValue {
    AttributeValue::list(data.get("Regions"))
}
