//! Client-side toolkit for FHIR servers: paginated search queries and
//! constrained generation of test resources.

pub mod config;
pub mod error;
pub mod generator;
pub mod id;
pub mod model;
pub mod query;
pub mod transport;

pub use config::{KindlingConfig, LoggingConfig, ServerSettings};
pub use error::{ErrorCategory, KindlingError, Result};
pub use generator::{
    ChoiceGenerator, FieldGenerator, FieldValue, FnFieldGenerator, GenerateOptions, Generated,
    GeneratedResource, GeneratorParameters, PatternGenerator, ResourceGenerator,
};
pub use id::{generate_id, validate_id};
pub use model::{FieldMap, Resource, ResourceModel, SchemaRegistry, TypeDescriptor};
pub use query::{FhirQuery, OutputFormat, QueryResponse};
pub use transport::{Auth, HttpTransport, Transport, TransportResponse};
