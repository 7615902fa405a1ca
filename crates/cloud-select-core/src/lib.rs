//! # cloud-select core
//!
//! Core domain logic for selecting compute instances across clouds.
//!
//! This crate contains pure logic with no I/O dependencies:
//! - Attribute model over raw provider listings
//! - Capability tables declaring each provider's attributes
//! - Constraint encoding and validation
//! - Fact programs, solvers and ranking
//! - Merging per-provider results

pub mod capabilities;
pub mod constraints;
pub mod errors;
pub mod models;
pub mod results;
pub mod solver;

// Re-export commonly used types
pub use capabilities::{Accessor, CapabilityTable, InstanceKind, CAPABILITIES};
pub use constraints::{
    filter_spec, parse_override, ConstraintEncoder, ConstraintSet, FilterKind, FilterSpec,
    Predicate, FILTERS,
};
pub use errors::{Result, SelectError};
pub use models::{AttributeContainer, AttributeValue, Instance, InstanceGroup, InstanceRow, RawListing};
pub use results::{ProviderSelection, ResultAssembler};
pub use solver::{
    BuiltinSolver, Fact, FactProgram, FactValue, Ranking, SelectionSolver, Solver, SolverModel,
    SELECTION_RULES,
};
