use std::fmt;

use super::field::{FieldGenerator, FieldValue};

/// Count plus the ordered field values and field generators of one batch.
#[derive(Default)]
pub struct GeneratorParameters {
    pub count: Option<usize>,
    pub field_generators: Vec<Box<dyn FieldGenerator>>,
    pub field_values: Vec<FieldValue>,
}

impl GeneratorParameters {
    pub fn new(count: Option<usize>) -> Self {
        Self {
            count,
            ..Self::default()
        }
    }

    pub fn with_field_value(mut self, value: FieldValue) -> Self {
        self.field_values.push(value);
        self
    }

    pub fn with_field_generator(mut self, generator: impl FieldGenerator + 'static) -> Self {
        self.field_generators.push(Box::new(generator));
        self
    }

    /// Number of resources one `generate` call produces.
    pub fn instances(&self) -> usize {
        self.count.unwrap_or(1)
    }

    /// Field names in declaration order, values first.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.field_values
            .iter()
            .map(|v| v.field.as_str())
            .chain(self.field_generators.iter().map(|g| g.field()))
    }
}

impl fmt::Debug for GeneratorParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorParameters")
            .field("count", &self.count)
            .field(
                "field_generators",
                &self
                    .field_generators
                    .iter()
                    .map(|g| g.field())
                    .collect::<Vec<_>>(),
            )
            .field("field_values", &self.field_values)
            .finish()
    }
}
