use crate::capabilities::CapabilityTable;
use crate::errors::{Result, SelectError};
use crate::models::InstanceRow;
use crate::solver::FactValue;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Architectures a provider may report
pub const ARCHITECTURES: &[&str] = &["x86_64", "arm64", "i386", "x86_64_mac", "arm64_mac"];

/// How a numeric filter compares against the attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Exact,
    Min,
    Max,
}

/// Declared type of a filter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Non-negative integer
    Number(Bound),
    Boolean,
    /// "Choose one of", optionally restricted to an enum domain
    Choice(Option<&'static [&'static str]>),
}

/// A user-facing filter and the attribute it constrains
#[derive(Debug, Clone, Copy)]
pub struct FilterSpec {
    pub key: &'static str,
    pub attribute: &'static str,
    pub kind: FilterKind,
    pub help: &'static str,
}

pub const FILTERS: &[FilterSpec] = &[
    FilterSpec {
        key: "arch",
        attribute: "arch",
        kind: FilterKind::Choice(Some(ARCHITECTURES)),
        help: "Processor architecture (choose one or more)",
    },
    FilterSpec {
        key: "cpu",
        attribute: "cpu",
        kind: FilterKind::Number(Bound::Exact),
        help: "Exact number of vCPUs",
    },
    FilterSpec {
        key: "cpu_min",
        attribute: "cpu",
        kind: FilterKind::Number(Bound::Min),
        help: "Minimum number of vCPUs",
    },
    FilterSpec {
        key: "cpu_max",
        attribute: "cpu",
        kind: FilterKind::Number(Bound::Max),
        help: "Maximum number of vCPUs",
    },
    FilterSpec {
        key: "free_tier",
        attribute: "free_tier",
        kind: FilterKind::Boolean,
        help: "Free tier eligible",
    },
    FilterSpec {
        key: "gpu",
        attribute: "gpu",
        kind: FilterKind::Boolean,
        help: "Has at least one GPU",
    },
    FilterSpec {
        key: "gpu_count",
        attribute: "gpu_count",
        kind: FilterKind::Number(Bound::Exact),
        help: "Exact number of GPUs",
    },
    FilterSpec {
        key: "gpu_count_min",
        attribute: "gpu_count",
        kind: FilterKind::Number(Bound::Min),
        help: "Minimum number of GPUs",
    },
    FilterSpec {
        key: "gpu_count_max",
        attribute: "gpu_count",
        kind: FilterKind::Number(Bound::Max),
        help: "Maximum number of GPUs",
    },
    FilterSpec {
        key: "ipv6",
        attribute: "ipv6",
        kind: FilterKind::Boolean,
        help: "Supports IPv6",
    },
    FilterSpec {
        key: "memory_gb",
        attribute: "memory_gb",
        kind: FilterKind::Number(Bound::Exact),
        help: "Exact memory in GB",
    },
    FilterSpec {
        key: "memory_gb_min",
        attribute: "memory_gb",
        kind: FilterKind::Number(Bound::Min),
        help: "Minimum memory in GB",
    },
    FilterSpec {
        key: "memory_gb_max",
        attribute: "memory_gb",
        kind: FilterKind::Number(Bound::Max),
        help: "Maximum memory in GB",
    },
    FilterSpec {
        key: "regions",
        attribute: "region",
        kind: FilterKind::Choice(None),
        help: "Offered in one of these regions",
    },
];

pub fn filter_spec(key: &str) -> Option<&'static FilterSpec> {
    FILTERS.iter().find(|spec| spec.key == key)
}

/// A requirement on one attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Eq(FactValue),
    Min(i64),
    Max(i64),
    OneOf(Vec<String>),
    Present(bool),
}

impl Predicate {
    /// Operator name used in solver facts
    pub fn op(&self) -> &'static str {
        match self {
            Predicate::Eq(_) => "eq",
            Predicate::Min(_) => "min",
            Predicate::Max(_) => "max",
            Predicate::OneOf(_) => "in",
            Predicate::Present(_) => "present",
        }
    }

    /// Fact arguments; `OneOf` yields one per option
    pub fn operands(&self) -> Vec<FactValue> {
        match self {
            Predicate::Eq(value) => vec![value.clone()],
            Predicate::Min(n) | Predicate::Max(n) => vec![FactValue::Int(*n)],
            Predicate::OneOf(options) => options.iter().cloned().map(FactValue::Text).collect(),
            Predicate::Present(b) => vec![FactValue::Bool(*b)],
        }
    }

    /// Whether an instance carrying `values` for the attribute passes.
    /// Numeric bounds need at least one value and every value in range.
    pub fn holds(&self, values: &[FactValue]) -> bool {
        match self {
            Predicate::Eq(expected) => values.contains(expected),
            Predicate::Min(bound) => {
                !values.is_empty()
                    && values
                        .iter()
                        .all(|v| matches!(v, FactValue::Int(n) if n >= bound))
            }
            Predicate::Max(bound) => {
                !values.is_empty()
                    && values
                        .iter()
                        .all(|v| matches!(v, FactValue::Int(n) if n <= bound))
            }
            Predicate::OneOf(options) => values
                .iter()
                .any(|v| matches!(v, FactValue::Text(s) if options.contains(s))),
            Predicate::Present(wanted) => values.contains(&FactValue::Bool(true)) == *wanted,
        }
    }
}

/// Normalized constraints keyed by attribute name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintSet {
    predicates: BTreeMap<String, Vec<Predicate>>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, attribute: &str, predicate: Predicate) {
        self.predicates
            .entry(attribute.to_string())
            .or_default()
            .push(predicate);
    }

    pub fn get(&self, attribute: &str) -> &[Predicate] {
        self.predicates
            .get(attribute)
            .map(|p| p.as_slice())
            .unwrap_or(&[])
    }

    /// (attribute, predicate) pairs in attribute order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Predicate)> {
        self.predicates
            .iter()
            .flat_map(|(attr, preds)| preds.iter().map(move |p| (attr.as_str(), p)))
    }

    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.predicates.keys().map(|k| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.predicates.values().map(|p| p.len()).sum()
    }

    /// Check every predicate against values produced by `values_of`
    pub fn is_satisfied<F>(&self, mut values_of: F) -> bool
    where
        F: FnMut(&str) -> Vec<FactValue>,
    {
        self.predicates.iter().all(|(attribute, predicates)| {
            let values = values_of(attribute);
            predicates.iter().all(|p| p.holds(&values))
        })
    }

    pub fn is_satisfied_by(&self, row: &InstanceRow) -> bool {
        self.is_satisfied(|attribute| {
            row.get(attribute)
                .map(|value| value.fact_values())
                .unwrap_or_default()
        })
    }
}

/// Turns user filter values into a [`ConstraintSet`]
#[derive(Debug, Clone)]
pub struct ConstraintEncoder {
    attributes: BTreeSet<String>,
}

impl ConstraintEncoder {
    /// Encoder accepting constraints on the given attribute names
    pub fn new<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attributes: attributes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn for_capabilities(table: &CapabilityTable) -> Self {
        Self::new(table.names())
    }

    /// Encode filter values plus `key=value` overrides. Overrides win over
    /// the same key in `filters`; null values are dropped.
    pub fn encode(
        &self,
        filters: &BTreeMap<String, Value>,
        overrides: &[String],
    ) -> Result<ConstraintSet> {
        let mut merged = filters.clone();
        for entry in overrides {
            let (key, value) = parse_override(entry)?;
            merged.insert(key, value);
        }

        let mut constraints = ConstraintSet::new();
        for (key, value) in &merged {
            let spec = filter_spec(key).ok_or_else(|| {
                SelectError::Validation(format!("{} is not a recognized attribute", key))
            })?;

            if !self.attributes.contains(spec.attribute) {
                return Err(SelectError::Validation(format!(
                    "{} constrains unknown attribute {}",
                    key, spec.attribute
                )));
            }

            if let Some(predicate) = encode_value(spec, value)? {
                constraints.insert(spec.attribute, predicate);
            }
        }

        Ok(constraints)
    }
}

fn encode_value(spec: &FilterSpec, value: &Value) -> Result<Option<Predicate>> {
    if value.is_null() {
        return Ok(None);
    }

    let predicate = match spec.kind {
        FilterKind::Number(bound) => {
            let n = value.as_i64().filter(|n| *n >= 0).ok_or_else(|| {
                SelectError::Validation(format!(
                    "{} expects a non-negative integer, got {}",
                    spec.key, value
                ))
            })?;
            match bound {
                Bound::Exact => Predicate::Eq(FactValue::Int(n)),
                Bound::Min => Predicate::Min(n),
                Bound::Max => Predicate::Max(n),
            }
        }
        FilterKind::Boolean => {
            let b = value.as_bool().ok_or_else(|| {
                SelectError::Validation(format!("{} expects true or false, got {}", spec.key, value))
            })?;
            Predicate::Present(b)
        }
        FilterKind::Choice(domain) => {
            let options = choice_options(spec, value)?;
            if options.is_empty() {
                return Ok(None);
            }
            if let Some(domain) = domain {
                if let Some(bad) = options.iter().find(|o| !domain.contains(&o.as_str())) {
                    return Err(SelectError::Validation(format!(
                        "{} is not a valid {} (expected one of {})",
                        bad,
                        spec.key,
                        domain.join(", ")
                    )));
                }
            }
            Predicate::OneOf(options)
        }
    };

    Ok(Some(predicate))
}

fn choice_options(spec: &FilterSpec, value: &Value) -> Result<Vec<String>> {
    let invalid =
        || SelectError::Validation(format!("{} expects a list of strings, got {}", spec.key, value));

    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(|s| s.to_string()).ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}

/// Parse a free-form override (e.g., "cpu_min=4" or "arch=x86_64,arm64")
pub fn parse_override(entry: &str) -> Result<(String, Value)> {
    let (key, raw) = entry.split_once('=').ok_or_else(|| {
        SelectError::Validation(format!(
            "Override must be in format 'key=value' (e.g., 'cpu_min=4'), got {}",
            entry
        ))
    })?;

    let key = key.trim();
    let raw = raw.trim();
    let spec = filter_spec(key)
        .ok_or_else(|| SelectError::Validation(format!("{} is not a recognized attribute", key)))?;

    let value = match spec.kind {
        FilterKind::Number(_) => {
            let n = raw.parse::<i64>().map_err(|_| {
                SelectError::Validation(format!("Invalid number for {}: {}", key, raw))
            })?;
            Value::from(n)
        }
        FilterKind::Boolean => match raw.to_lowercase().as_str() {
            "true" | "yes" | "1" => Value::Bool(true),
            "false" | "no" | "0" => Value::Bool(false),
            _ => {
                return Err(SelectError::Validation(format!(
                    "Invalid boolean for {}: {}",
                    key, raw
                )))
            }
        },
        FilterKind::Choice(_) => Value::from(
            raw.split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect::<Vec<String>>(),
        ),
    };

    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::CAPABILITIES;
    use serde_json::json;

    fn encoder() -> ConstraintEncoder {
        ConstraintEncoder::new(CAPABILITIES.iter().copied())
    }

    fn filters(value: Value) -> BTreeMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_every_filter_targets_a_capability() {
        for spec in FILTERS {
            assert!(CAPABILITIES.contains(&spec.attribute), "{}", spec.key);
        }
    }

    #[test]
    fn test_encode_numeric_and_boolean() {
        let set = encoder()
            .encode(
                &filters(json!({"cpu_min": 4, "cpu_max": 16, "gpu": true, "ipv6": null})),
                &[],
            )
            .unwrap();

        assert_eq!(set.get("cpu"), &[Predicate::Max(16), Predicate::Min(4)]);
        assert_eq!(set.get("gpu"), &[Predicate::Present(true)]);
        assert!(set.get("ipv6").is_empty());
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_encode_choice() {
        let set = encoder()
            .encode(&filters(json!({"arch": ["arm64"], "regions": "us-east-1"})), &[])
            .unwrap();

        assert_eq!(set.get("arch"), &[Predicate::OneOf(vec!["arm64".to_string()])]);
        assert_eq!(
            set.get("region"),
            &[Predicate::OneOf(vec!["us-east-1".to_string()])]
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = encoder().encode(&filters(json!({"bogus_attr": 5})), &[]);
        assert!(matches!(result, Err(SelectError::Validation(_))));
    }

    #[test]
    fn test_attribute_outside_capabilities_rejected() {
        let encoder = ConstraintEncoder::new(["cpu"]);
        let result = encoder.encode(&filters(json!({"gpu": true})), &[]);
        assert!(matches!(result, Err(SelectError::Validation(_))));
    }

    #[test]
    fn test_domain_violations() {
        let e = encoder();
        assert!(e.encode(&filters(json!({"arch": ["sparc"]})), &[]).is_err());
        assert!(e.encode(&filters(json!({"cpu": -2})), &[]).is_err());
        assert!(e.encode(&filters(json!({"cpu": 2.5})), &[]).is_err());
        assert!(e.encode(&filters(json!({"gpu": "yes"})), &[]).is_err());
    }

    #[test]
    fn test_overrides_win() {
        let set = encoder()
            .encode(
                &filters(json!({"cpu_min": 2})),
                &["cpu_min=8".to_string(), "free_tier=yes".to_string()],
            )
            .unwrap();

        assert_eq!(set.get("cpu"), &[Predicate::Min(8)]);
        assert_eq!(set.get("free_tier"), &[Predicate::Present(true)]);
    }

    #[test]
    fn test_parse_override_errors() {
        assert!(parse_override("cpu_min").is_err());
        assert!(parse_override("cpu_min=lots").is_err());
        assert!(parse_override("bogus_attr=1").is_err());

        let (key, value) = parse_override("arch = x86_64, arm64").unwrap();
        assert_eq!(key, "arch");
        assert_eq!(value, json!(["x86_64", "arm64"]));
    }

    #[test]
    fn test_predicate_holds() {
        let cpu = vec![FactValue::Int(4)];
        assert!(Predicate::Min(4).holds(&cpu));
        assert!(!Predicate::Min(5).holds(&cpu));
        assert!(!Predicate::Max(2).holds(&cpu));
        assert!(!Predicate::Min(0).holds(&[]));

        let regions = vec![
            FactValue::Text("us-east-1".to_string()),
            FactValue::Text("eu-west-1".to_string()),
        ];
        assert!(Predicate::OneOf(vec!["eu-west-1".to_string()]).holds(&regions));

        assert!(Predicate::Present(false).holds(&[]));
        assert!(Predicate::Present(false).holds(&[FactValue::Bool(false)]));
        assert!(!Predicate::Present(true).holds(&[FactValue::Bool(false)]));
    }
}
