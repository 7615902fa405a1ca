use crate::capabilities::InstanceKind;
use crate::errors::{Result, SelectError};
use crate::solver::FactValue;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Raw catalog data exactly as a provider returned it
pub type RawListing = Vec<Value>;

/// A normalized attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Missing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl AttributeValue {
    /// String field, missing unless the value is a JSON string
    pub fn text(value: Option<&Value>) -> Self {
        match value.and_then(|v| v.as_str()) {
            Some(s) => AttributeValue::Text(s.to_string()),
            None => AttributeValue::Missing,
        }
    }

    /// Integer field, missing unless the value is a JSON integer
    pub fn int(value: Option<&Value>) -> Self {
        match value.and_then(|v| v.as_i64()) {
            Some(n) => AttributeValue::Int(n),
            None => AttributeValue::Missing,
        }
    }

    /// Boolean field, missing unless the value is a JSON bool
    pub fn boolean(value: Option<&Value>) -> Self {
        match value.and_then(|v| v.as_bool()) {
            Some(b) => AttributeValue::Bool(b),
            None => AttributeValue::Missing,
        }
    }

    /// Array of strings; non-string entries are skipped
    pub fn list(value: Option<&Value>) -> Self {
        match value.and_then(|v| v.as_array()) {
            Some(items) => AttributeValue::List(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect(),
            ),
            None => AttributeValue::Missing,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, AttributeValue::Missing)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(n) => Some(*n as f64),
            AttributeValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Values this attribute contributes to a fact program.
    /// Lists expand to one value per element, missing contributes nothing.
    pub fn fact_values(&self) -> Vec<FactValue> {
        match self {
            AttributeValue::Missing => Vec::new(),
            AttributeValue::Bool(b) => vec![FactValue::Bool(*b)],
            AttributeValue::Int(n) => vec![FactValue::Int(*n)],
            AttributeValue::Float(f) => vec![FactValue::Text(f.to_string())],
            AttributeValue::Text(s) => vec![FactValue::Text(s.clone())],
            AttributeValue::List(items) => {
                items.iter().map(|s| FactValue::Text(s.clone())).collect()
            }
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            AttributeValue::Missing => Value::Null,
            AttributeValue::Bool(b) => Value::Bool(*b),
            AttributeValue::Int(n) => Value::from(*n),
            AttributeValue::Float(f) => Value::from(*f),
            AttributeValue::Text(s) => Value::String(s.clone()),
            AttributeValue::List(items) => Value::from(items.clone()),
        }
    }
}

/// Raw data plus a lookup from the name field to the item holding it
#[derive(Debug, Clone)]
pub struct AttributeContainer {
    name_field: &'static str,
    data: RawListing,
    lookup: HashMap<String, usize>,
}

impl AttributeContainer {
    pub fn new(name_field: &'static str, data: RawListing) -> Self {
        let mut container = Self {
            name_field,
            data: Vec::new(),
            lookup: HashMap::new(),
        };
        container.replace(data);
        container
    }

    /// Swap in new data and rebuild the lookup
    pub fn replace(&mut self, data: RawListing) {
        self.data = data;
        self.lookup.clear();
        for (index, item) in self.data.iter().enumerate() {
            if let Some(name) = item.get(self.name_field).and_then(|v| v.as_str()) {
                self.lookup.insert(name.to_string(), index);
            }
        }
    }

    /// Keep only the items matching `keep`
    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&Value) -> bool,
    {
        let mut data = std::mem::take(&mut self.data);
        data.retain(keep);
        self.replace(data);
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.lookup.get(name).map(|index| &self.data[*index])
    }

    pub fn data(&self) -> &[Value] {
        &self.data
    }

    pub fn name_count(&self) -> usize {
        self.lookup.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// View over a single raw instance item
#[derive(Debug, Clone, Copy)]
pub struct Instance<'a> {
    kind: &'a InstanceKind,
    data: &'a Value,
}

impl<'a> Instance<'a> {
    pub fn new(kind: &'a InstanceKind, data: &'a Value) -> Self {
        Self { kind, data }
    }

    /// Canonical provider name of the instance type
    pub fn name(&self) -> Option<&'a str> {
        self.data.get(self.kind.name_field).and_then(|v| v.as_str())
    }

    pub fn provider(&self) -> &'static str {
        self.kind.provider
    }

    /// Attribute names this instance supports, in capability order
    pub fn attributes(&self) -> impl Iterator<Item = &'static str> + 'a {
        let kind: &'a InstanceKind = self.kind;
        kind.capabilities.names()
    }

    /// Read one attribute; unknown names and absent data are both missing
    pub fn attribute(&self, name: &str) -> AttributeValue {
        match self.kind.capabilities.get(name) {
            Some(accessor) => accessor(self.data),
            None => AttributeValue::Missing,
        }
    }

    /// Region names this instance is offered in
    pub fn regions(&self) -> Vec<String> {
        match self.attribute("region") {
            AttributeValue::List(regions) => regions,
            AttributeValue::Text(region) => vec![region],
            _ => Vec::new(),
        }
    }

    pub fn raw(&self) -> &'a Value {
        self.data
    }

    /// Presentation row, `None` when the item has no name
    pub fn row(&self) -> Option<InstanceRow> {
        let name = self.name()?;
        let values = self
            .attributes()
            .map(|attr| (attr.to_string(), self.attribute(attr)))
            .collect();

        Some(InstanceRow {
            provider: self.provider().to_string(),
            name: name.to_string(),
            values,
        })
    }
}

/// Normalized catalog for one provider
#[derive(Debug, Clone)]
pub struct InstanceGroup {
    kind: Arc<InstanceKind>,
    container: AttributeContainer,
}

impl InstanceGroup {
    pub fn new(kind: Arc<InstanceKind>, data: RawListing) -> Self {
        let container = AttributeContainer::new(kind.name_field, data);
        Self { kind, container }
    }

    pub fn provider(&self) -> &'static str {
        self.kind.provider
    }

    pub fn kind(&self) -> &InstanceKind {
        &self.kind
    }

    /// Iterate instance views; call again to restart
    pub fn iter_instances(&self) -> impl Iterator<Item = Instance<'_>> + '_ {
        self.container
            .data()
            .iter()
            .map(move |item| Instance::new(&self.kind, item))
    }

    pub fn instance(&self, name: &str) -> Result<Instance<'_>> {
        self.container
            .lookup(name)
            .map(|item| Instance::new(&self.kind, item))
            .ok_or_else(|| {
                SelectError::NotFound(format!("{} is not known to {}", name, self.provider()))
            })
    }

    /// Row for a named instance
    pub fn row(&self, name: &str) -> Result<InstanceRow> {
        let instance = self.instance(name)?;
        instance
            .row()
            .ok_or_else(|| SelectError::NotFound(format!("{} has no name field", name)))
    }

    /// Keep instances whose space-joined region list matches `pattern`
    pub fn filter_region(&mut self, pattern: &str) -> Result<()> {
        let regex = Regex::new(pattern)?;
        self.retain_regions(&regex);
        Ok(())
    }

    pub fn retain_regions(&mut self, regex: &Regex) {
        let kind = Arc::clone(&self.kind);
        self.container
            .retain(|item| regex.is_match(&Instance::new(&kind, item).regions().join(" ")));
    }

    /// Number of instances carrying a value for each attribute
    pub fn attribute_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts: BTreeMap<&'static str, usize> =
            self.kind.capabilities.names().map(|name| (name, 0)).collect();

        for instance in self.iter_instances() {
            for (name, count) in counts.iter_mut() {
                if !instance.attribute(name).is_missing() {
                    *count += 1;
                }
            }
        }

        counts
    }

    pub fn replace(&mut self, data: RawListing) {
        self.container.replace(data);
    }

    pub fn data(&self) -> &[Value] {
        self.container.data()
    }

    pub fn len(&self) -> usize {
        self.container.len()
    }

    pub fn is_empty(&self) -> bool {
        self.container.is_empty()
    }

    /// Raw listing, the form the group is cached and dumped in
    pub fn to_record(&self) -> Value {
        Value::Array(self.container.data().to_vec())
    }
}

/// One selected instance, attribute values in capability order
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRow {
    pub provider: String,
    pub name: String,
    pub values: Vec<(String, AttributeValue)>,
}

impl InstanceRow {
    pub fn get(&self, attribute: &str) -> Option<&AttributeValue> {
        self.values
            .iter()
            .find(|(name, _)| name == attribute)
            .map(|(_, value)| value)
    }

    /// Output record: provider, name and every attribute
    pub fn to_record(&self) -> Value {
        let mut record = serde_json::Map::new();
        record.insert("provider".to_string(), Value::String(self.provider.clone()));
        record.insert("name".to_string(), Value::String(self.name.clone()));
        for (attribute, value) in &self.values {
            record.insert(attribute.clone(), value.to_json());
        }
        Value::Object(record)
    }
}
