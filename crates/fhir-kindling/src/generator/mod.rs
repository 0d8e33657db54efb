//! Constrained generation of FHIR resources.
//!
//! A [`ResourceGenerator`] combines fixed [`FieldValue`]s and stateful
//! [`FieldGenerator`]s into resources of one type. Before the first batch is
//! produced the parameters are validated: every field may be claimed once,
//! distributed value lists must match the requested count, and the claimed
//! fields must cover the required fields of the resource type.

pub mod field;
pub mod params;
pub mod resource;

pub use field::{ChoiceGenerator, FieldGenerator, FieldValue, FnFieldGenerator, PatternGenerator};
pub use params::GeneratorParameters;
pub use resource::{
    GenerateOptions, Generated, GeneratedResource, ResourceGenerator, ResourceGeneratorBuilder,
};
