use crate::errors::Result;
use crate::models::InstanceRow;
use serde_json::Value;

/// Rows selected for one provider, already ranked
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSelection {
    pub provider: String,
    pub rows: Vec<InstanceRow>,
}

impl ProviderSelection {
    pub fn new(provider: &str, rows: Vec<InstanceRow>) -> Self {
        Self {
            provider: provider.to_string(),
            rows,
        }
    }
}

/// Merges per-provider selections into the final output
#[derive(Debug, Clone)]
pub struct ResultAssembler {
    provider_order: Vec<String>,
    max_results: usize,
}

impl ResultAssembler {
    pub fn new(provider_order: Vec<String>, max_results: usize) -> Self {
        Self {
            provider_order,
            max_results,
        }
    }

    /// Rows in provider order, each provider truncated to `max_results`.
    /// Providers missing from the configured order go last.
    pub fn assemble(&self, mut selections: Vec<ProviderSelection>) -> Vec<InstanceRow> {
        selections.sort_by_key(|selection| {
            self.provider_order
                .iter()
                .position(|p| *p == selection.provider)
                .unwrap_or(usize::MAX)
        });

        selections
            .into_iter()
            .flat_map(|selection| selection.rows.into_iter().take(self.max_results))
            .collect()
    }

    pub fn to_records(&self, selections: Vec<ProviderSelection>) -> Vec<Value> {
        self.assemble(selections)
            .iter()
            .map(InstanceRow::to_record)
            .collect()
    }

    pub fn to_json(&self, selections: Vec<ProviderSelection>) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_records(selections))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttributeValue;

    fn row(provider: &str, name: &str) -> InstanceRow {
        InstanceRow {
            provider: provider.to_string(),
            name: name.to_string(),
            values: vec![("cpu".to_string(), AttributeValue::Int(2))],
        }
    }

    #[test]
    fn test_provider_order_and_truncation() {
        let assembler = ResultAssembler::new(vec!["aws".to_string(), "google".to_string()], 2);
        let selections = vec![
            ProviderSelection::new("google", vec![row("google", "e2-micro")]),
            ProviderSelection::new(
                "aws",
                vec![row("aws", "a"), row("aws", "b"), row("aws", "c")],
            ),
        ];

        let rows = assembler.assemble(selections);
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "e2-micro"]);
    }

    #[test]
    fn test_json_output() {
        let assembler = ResultAssembler::new(vec!["aws".to_string()], 5);
        let json = assembler
            .to_json(vec![ProviderSelection::new("aws", vec![row("aws", "t2.micro")])])
            .unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed[0]["provider"], "aws");
        assert_eq!(parsed[0]["name"], "t2.micro");
        assert_eq!(parsed[0]["cpu"], 2);
    }

    #[test]
    fn test_empty_selections() {
        let assembler = ResultAssembler::new(vec!["aws".to_string()], 5);
        assert!(assembler.to_records(Vec::new()).is_empty());
    }
}
