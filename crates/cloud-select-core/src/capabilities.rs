use crate::models::AttributeValue;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Reads one normalized attribute out of a raw provider item
pub type Accessor = fn(&Value) -> AttributeValue;

/// Every attribute an instance exposes, in presentation order
pub const CAPABILITIES: &[&str] = &[
    "arch",
    "cpu",
    "description",
    "free_tier",
    "gpu",
    "gpu_count",
    "ipv6",
    "memory_gb",
    "price",
    "region",
    "zone",
];

fn missing(_: &Value) -> AttributeValue {
    AttributeValue::Missing
}

fn generic_description(data: &Value) -> AttributeValue {
    AttributeValue::text(data.get("description"))
}

fn generic_zone(data: &Value) -> AttributeValue {
    AttributeValue::text(data.get("zone"))
}

/// Statically declared attribute registry for one kind of instance.
///
/// Providers start from [`CapabilityTable::base`] and override the accessors
/// their raw schema supports with [`CapabilityTable::with`].
#[derive(Clone)]
pub struct CapabilityTable {
    accessors: BTreeMap<&'static str, Accessor>,
}

impl CapabilityTable {
    /// Generic fallbacks: `description` and `zone` read the same-named field,
    /// everything else is missing until a provider overrides it.
    pub fn base() -> Self {
        let mut accessors: BTreeMap<&'static str, Accessor> = CAPABILITIES
            .iter()
            .map(|name| (*name, missing as Accessor))
            .collect();
        accessors.insert("description", generic_description);
        accessors.insert("zone", generic_zone);
        Self { accessors }
    }

    /// Register (or replace) the accessor for an attribute
    pub fn with(mut self, name: &'static str, accessor: Accessor) -> Self {
        self.accessors.insert(name, accessor);
        self
    }

    /// Attribute names in capability order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.accessors.keys().copied()
    }

    pub fn get(&self, name: &str) -> Option<Accessor> {
        self.accessors.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.accessors.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }
}

impl fmt::Debug for CapabilityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.accessors.keys()).finish()
    }
}

/// Describes how one provider's raw items are read
#[derive(Debug, Clone)]
pub struct InstanceKind {
    pub provider: &'static str,
    /// Raw field holding the canonical instance name
    pub name_field: &'static str,
    pub capabilities: CapabilityTable,
}

impl InstanceKind {
    pub fn new(
        provider: &'static str,
        name_field: &'static str,
        capabilities: CapabilityTable,
    ) -> Self {
        Self {
            provider,
            name_field,
            capabilities,
        }
    }
}
