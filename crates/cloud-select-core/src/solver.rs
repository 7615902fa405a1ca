use crate::capabilities::CAPABILITIES;
use crate::constraints::{ConstraintSet, Predicate};
use crate::errors::{Result, SelectError};
use crate::models::{AttributeValue, InstanceGroup, InstanceRow};
use log::{debug, trace, warn};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Logic rules that give meaning to a fact program. An instance is
/// `selected` when no constraint fact rules it out.
pub const SELECTION_RULES: &str = r#"% cloud-select selection rules
has_attr(N,A) :- instance_attr(N,A,_).
in_choice(N,A) :- instance_attr(N,A,V), constraint(A,"in",V).

violates(N) :- instance(N), constraint(A,"eq",V), not instance_attr(N,A,V).
violates(N) :- instance(N), constraint(A,"min",_), not has_attr(N,A).
violates(N) :- instance_attr(N,A,X), constraint(A,"min",V), X < V.
violates(N) :- instance(N), constraint(A,"max",_), not has_attr(N,A).
violates(N) :- instance_attr(N,A,X), constraint(A,"max",V), X > V.
violates(N) :- instance(N), constraint(A,"in",_), not in_choice(N,A).
violates(N) :- instance(N), constraint(A,"present",true), not instance_attr(N,A,true).
violates(N) :- instance_attr(N,A,true), constraint(A,"present",false).

selected(N) :- instance(N), not violates(N).
#show selected/1.
"#;

/// Argument of a solver fact
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FactValue {
    Int(i64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactValue::Int(n) => write!(f, "{}", n),
            FactValue::Bool(b) => write!(f, "{}", b),
            FactValue::Text(s) => write!(f, "{}", quote(s)),
        }
    }
}

/// Double-quote a string term, escaping backslashes, quotes and newlines
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Reverse of [`quote`]; `None` if `s` is not a quoted term
pub fn unquote(s: &str) -> Option<String> {
    let inner = s.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next()? {
                'n' => out.push('\n'),
                other => out.push(other),
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// One line of a fact program
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fact {
    Instance(String),
    Attribute {
        instance: String,
        attribute: String,
        value: FactValue,
    },
    Constraint {
        attribute: String,
        op: &'static str,
        value: FactValue,
    },
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fact::Instance(name) => write!(f, "instance({}).", quote(name)),
            Fact::Attribute {
                instance,
                attribute,
                value,
            } => write!(
                f,
                "instance_attr({},{},{}).",
                quote(instance),
                quote(attribute),
                value
            ),
            Fact::Constraint {
                attribute,
                op,
                value,
            } => write!(f, "constraint({},{},{}).", quote(attribute), quote(op), value),
        }
    }
}

/// Facts describing an instance group and the constraints on it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactProgram {
    facts: Vec<Fact>,
}

impl FactProgram {
    /// Encode every named instance and every predicate
    pub fn encode(group: &InstanceGroup, constraints: &ConstraintSet) -> Self {
        let mut facts = Vec::new();

        for instance in group.iter_instances() {
            let Some(name) = instance.name() else {
                continue;
            };
            facts.push(Fact::Instance(name.to_string()));
            for attribute in instance.attributes() {
                for value in instance.attribute(attribute).fact_values() {
                    facts.push(Fact::Attribute {
                        instance: name.to_string(),
                        attribute: attribute.to_string(),
                        value,
                    });
                }
            }
        }

        for (attribute, predicate) in constraints.iter() {
            for value in predicate.operands() {
                facts.push(Fact::Constraint {
                    attribute: attribute.to_string(),
                    op: predicate.op(),
                    value,
                });
            }
        }

        Self { facts }
    }

    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

impl fmt::Display for FactProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for fact in &self.facts {
            writeln!(f, "{}", fact)?;
        }
        Ok(())
    }
}

/// Instance names a solver found to satisfy every constraint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolverModel {
    pub selected: BTreeSet<String>,
}

impl SolverModel {
    pub fn unsatisfiable() -> Self {
        Self::default()
    }

    pub fn is_satisfiable(&self) -> bool {
        !self.selected.is_empty()
    }
}

/// Anything able to evaluate a fact program against [`SELECTION_RULES`]
pub trait Solver: Send + Sync {
    fn name(&self) -> &'static str;

    fn solve(&self, program: &FactProgram) -> Result<SolverModel>;
}

/// In-process evaluation of the selection rules
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinSolver;

impl Solver for BuiltinSolver {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn solve(&self, program: &FactProgram) -> Result<SolverModel> {
        let mut instances: BTreeMap<&str, BTreeMap<&str, Vec<FactValue>>> = BTreeMap::new();
        let mut constraints = ConstraintSet::new();
        let mut choices: BTreeMap<&str, Vec<String>> = BTreeMap::new();

        for fact in program.facts() {
            match fact {
                Fact::Instance(name) => {
                    instances.entry(name.as_str()).or_default();
                }
                Fact::Attribute {
                    instance,
                    attribute,
                    value,
                } => instances
                    .entry(instance.as_str())
                    .or_default()
                    .entry(attribute.as_str())
                    .or_default()
                    .push(value.clone()),
                Fact::Constraint {
                    attribute,
                    op,
                    value,
                } => match (*op, value) {
                    ("eq", v) => constraints.insert(attribute, Predicate::Eq(v.clone())),
                    ("min", FactValue::Int(n)) => constraints.insert(attribute, Predicate::Min(*n)),
                    ("max", FactValue::Int(n)) => constraints.insert(attribute, Predicate::Max(*n)),
                    ("in", FactValue::Text(s)) => {
                        choices.entry(attribute.as_str()).or_default().push(s.clone())
                    }
                    ("present", FactValue::Bool(b)) => {
                        constraints.insert(attribute, Predicate::Present(*b))
                    }
                    _ => return Err(SelectError::Solver(format!("Unsupported fact: {}", fact))),
                },
            }
        }

        for (attribute, options) in choices {
            constraints.insert(attribute, Predicate::OneOf(options));
        }

        let selected: BTreeSet<String> = instances
            .into_iter()
            .filter(|(_, attributes)| {
                constraints.is_satisfied(|attr| attributes.get(attr).cloned().unwrap_or_default())
            })
            .map(|(name, _)| name.to_string())
            .collect();

        trace!("Builtin solver selected {} instances", selected.len());
        Ok(SolverModel { selected })
    }
}

/// One ranking criterion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankKey {
    pub attribute: String,
    pub descending: bool,
}

/// Ordering policy for selected rows. Missing values sort last and the
/// canonical name always breaks ties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranking {
    keys: Vec<RankKey>,
}

impl Default for Ranking {
    fn default() -> Self {
        Self {
            keys: vec![
                RankKey {
                    attribute: "price".to_string(),
                    descending: false,
                },
                RankKey {
                    attribute: "cpu".to_string(),
                    descending: true,
                },
            ],
        }
    }
}

impl Ranking {
    pub fn new(keys: Vec<RankKey>) -> Self {
        Self { keys }
    }

    /// Parse keys like "price" (ascending) or "-cpu" (descending)
    pub fn parse<S: AsRef<str>>(specs: &[S]) -> Result<Self> {
        let mut keys = Vec::new();
        for spec in specs {
            let spec = spec.as_ref().trim();
            let (attribute, descending) = match spec.strip_prefix('-') {
                Some(rest) => (rest, true),
                None => (spec.strip_prefix('+').unwrap_or(spec), false),
            };
            if !CAPABILITIES.contains(&attribute) {
                return Err(SelectError::Validation(format!(
                    "Cannot rank by unknown attribute: {}",
                    attribute
                )));
            }
            keys.push(RankKey {
                attribute: attribute.to_string(),
                descending,
            });
        }
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[RankKey] {
        &self.keys
    }

    pub fn compare(&self, a: &InstanceRow, b: &InstanceRow) -> Ordering {
        for key in &self.keys {
            let left = a.get(&key.attribute).unwrap_or(&AttributeValue::Missing);
            let right = b.get(&key.attribute).unwrap_or(&AttributeValue::Missing);

            let ordering = match (left.is_missing(), right.is_missing()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => {
                    let ordering = compare_values(left, right);
                    if key.descending {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                }
            };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        a.name.cmp(&b.name)
    }
}

fn compare_values(a: &AttributeValue, b: &AttributeValue) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.total_cmp(&y);
    }
    match (a, b) {
        (AttributeValue::Bool(x), AttributeValue::Bool(y)) => x.cmp(y),
        (AttributeValue::Text(x), AttributeValue::Text(y)) => x.cmp(y),
        (AttributeValue::List(x), AttributeValue::List(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// Encodes a group, hands it to a [`Solver`] and ranks what comes back
#[derive(Clone)]
pub struct SelectionSolver {
    solver: Arc<dyn Solver>,
    ranking: Ranking,
}

impl SelectionSolver {
    pub fn new(solver: Arc<dyn Solver>, ranking: Ranking) -> Self {
        Self { solver, ranking }
    }

    pub fn builtin() -> Self {
        Self::new(Arc::new(BuiltinSolver), Ranking::default())
    }

    pub fn ranking(&self) -> &Ranking {
        &self.ranking
    }

    /// Select at most `max_results` rows satisfying `constraints`
    pub fn select(
        &self,
        group: &InstanceGroup,
        constraints: &ConstraintSet,
        max_results: usize,
    ) -> Result<Vec<InstanceRow>> {
        let program = FactProgram::encode(group, constraints);
        self.solve_program(group, &program, constraints, max_results)
    }

    /// Solve an already encoded program for `group`
    pub fn solve_program(
        &self,
        group: &InstanceGroup,
        program: &FactProgram,
        constraints: &ConstraintSet,
        max_results: usize,
    ) -> Result<Vec<InstanceRow>> {
        debug!(
            "Solving {} facts for {} with the {} solver",
            program.len(),
            group.provider(),
            self.solver.name()
        );

        let model = self.solver.solve(program)?;
        if !model.is_satisfiable() {
            debug!("No {} instance satisfies the constraints", group.provider());
            return Ok(Vec::new());
        }

        let mut rows = Vec::with_capacity(model.selected.len());
        for name in &model.selected {
            let row = match group.row(name) {
                Ok(row) => row,
                Err(SelectError::NotFound(message)) => {
                    debug!("Skipping solver result: {}", message);
                    continue;
                }
                Err(e) => return Err(e),
            };
            if !constraints.is_satisfied_by(&row) {
                warn!(
                    "{} solver selected {} which violates the constraints",
                    self.solver.name(),
                    name
                );
                continue;
            }
            rows.push(row);
        }

        rows.sort_by(|a, b| self.ranking.compare(a, b));
        rows.truncate(max_results);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{CapabilityTable, InstanceKind};
    use crate::constraints::ConstraintEncoder;
    use serde_json::{json, Value};

    fn cpu(data: &Value) -> AttributeValue {
        AttributeValue::int(data.get("cpu"))
    }

    fn gpu(data: &Value) -> AttributeValue {
        AttributeValue::Bool(data.get("gpus").and_then(|v| v.as_i64()).unwrap_or(0) > 0)
    }

    fn price(data: &Value) -> AttributeValue {
        match data.get("price").and_then(|v| v.as_f64()) {
            Some(p) => AttributeValue::Float(p),
            None => AttributeValue::Missing,
        }
    }

    fn region(data: &Value) -> AttributeValue {
        AttributeValue::list(data.get("regions"))
    }

    fn group() -> InstanceGroup {
        let table = CapabilityTable::base()
            .with("cpu", cpu)
            .with("gpu", gpu)
            .with("price", price)
            .with("region", region);
        let kind = Arc::new(InstanceKind::new("test", "name", table));
        InstanceGroup::new(
            kind,
            vec![
                json!({"name": "small", "cpu": 2, "regions": ["us-east-1"]}),
                json!({"name": "medium", "cpu": 8, "regions": ["us-east-1", "eu-west-1"]}),
                json!({"name": "large", "cpu": 64, "gpus": 4, "regions": ["eu-west-1"]}),
                json!({"name": "cheap", "cpu": 8, "price": 0.1, "regions": ["us-east-1"]}),
                json!({"name": "odd \"quoted\"", "cpu": 8}),
            ],
        )
    }

    fn constraints(filters: Value) -> ConstraintSet {
        ConstraintEncoder::new(CAPABILITIES.iter().copied())
            .encode(&serde_json::from_value(filters).unwrap(), &[])
            .unwrap()
    }

    fn names(rows: &[InstanceRow]) -> Vec<&str> {
        rows.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_fact_rendering() {
        let program = FactProgram::encode(&group(), &constraints(json!({"cpu_min": 4})));
        let text = program.to_string();

        assert!(text.contains("instance(\"small\").\n"));
        assert!(text.contains("instance_attr(\"small\",\"cpu\",2).\n"));
        assert!(text.contains("instance_attr(\"medium\",\"region\",\"eu-west-1\").\n"));
        assert!(text.contains("instance_attr(\"large\",\"gpu\",true).\n"));
        assert!(text.contains("instance(\"odd \\\"quoted\\\"\").\n"));
        assert!(text.ends_with("constraint(\"cpu\",\"min\",4).\n"));
    }

    #[test]
    fn test_quote_round_trip() {
        let raw = "a \"b\" \\ c\nd";
        assert_eq!(unquote(&quote(raw)).as_deref(), Some(raw));
        assert_eq!(unquote("bare"), None);
    }

    #[test]
    fn test_selection_is_sound_and_ranked() {
        let set = constraints(json!({"cpu_min": 4, "gpu": false}));
        let rows = SelectionSolver::builtin().select(&group(), &set, 10).unwrap();

        assert!(rows.iter().all(|row| set.is_satisfied_by(row)));
        // price first (missing last), then cpu descending, then name
        assert_eq!(names(&rows), vec!["cheap", "medium", "odd \"quoted\""]);
    }

    #[test]
    fn test_max_results_bound() {
        let set = ConstraintSet::new();
        let solver = SelectionSolver::builtin();

        assert_eq!(solver.select(&group(), &set, 2).unwrap().len(), 2);
        assert!(solver.select(&group(), &set, 0).unwrap().is_empty());
    }

    #[test]
    fn test_deterministic() {
        let set = constraints(json!({"regions": ["us-east-1"]}));
        let solver = SelectionSolver::builtin();

        let first = solver.select(&group(), &set, 3).unwrap();
        let second = solver.select(&group(), &set, 3).unwrap();
        assert_eq!(first, second);
        assert_eq!(names(&first), vec!["cheap", "medium", "small"]);
    }

    #[test]
    fn test_unsatisfiable_is_empty() {
        let set = constraints(json!({"cpu_min": 1000000}));
        let rows = SelectionSolver::builtin().select(&group(), &set, 5).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_custom_ranking() {
        let ranking = Ranking::parse(&["cpu"]).unwrap();
        let solver = SelectionSolver::new(Arc::new(BuiltinSolver), ranking);
        let rows = solver.select(&group(), &ConstraintSet::new(), 2).unwrap();

        assert_eq!(names(&rows), vec!["small", "cheap"]);
        assert!(Ranking::parse(&["-bogus"]).is_err());
    }

    struct FixedSolver(Vec<&'static str>);

    impl Solver for FixedSolver {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn solve(&self, _program: &FactProgram) -> Result<SolverModel> {
            Ok(SolverModel {
                selected: self.0.iter().map(|s| s.to_string()).collect(),
            })
        }
    }

    #[test]
    fn test_decoding_drops_unknown_and_unsound_names() {
        let solver = SelectionSolver::new(
            Arc::new(FixedSolver(vec!["ghost", "small", "large"])),
            Ranking::default(),
        );
        let set = constraints(json!({"gpu": true}));
        let rows = solver.select(&group(), &set, 10).unwrap();

        assert_eq!(names(&rows), vec!["large"]);
    }

    #[test]
    fn test_unsupported_fact_rejected() {
        let program = FactProgram {
            facts: vec![Fact::Constraint {
                attribute: "cpu".to_string(),
                op: "min",
                value: FactValue::Text("four".to_string()),
            }],
        };
        assert!(matches!(
            BuiltinSolver.solve(&program),
            Err(SelectError::Solver(_))
        ));
    }
}
