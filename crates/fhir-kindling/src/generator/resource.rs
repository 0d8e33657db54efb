use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::Value;

use super::field::{FieldGenerator, FieldValue};
use super::params::GeneratorParameters;
use crate::error::{KindlingError, Result};
use crate::id::generate_id;
use crate::model::{FieldMap, Resource, ResourceModel, TypeDescriptor};

/// Per-call switches for [`ResourceGenerator::generate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Assign a fresh UUID to `id` on every resource.
    pub generate_ids: bool,
    /// Return raw field maps instead of typed resources.
    pub as_dict: bool,
    /// Skip parameter validation and construct resources unchecked.
    pub disable_validation: bool,
}

/// One generated resource.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedResource {
    Typed(Resource),
    Raw(FieldMap),
}

impl GeneratedResource {
    pub fn fields(&self) -> &FieldMap {
        match self {
            GeneratedResource::Typed(resource) => resource.fields(),
            GeneratedResource::Raw(fields) => fields,
        }
    }

    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            GeneratedResource::Typed(resource) => Some(resource),
            GeneratedResource::Raw(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            GeneratedResource::Typed(resource) => resource.to_json(),
            GeneratedResource::Raw(fields) => Value::Object(fields.clone()),
        }
    }
}

/// Output of one `generate` call: a single resource when no count was set,
/// otherwise the batch in generation order.
#[derive(Debug, Clone, PartialEq)]
pub enum Generated {
    One(GeneratedResource),
    Many(Vec<GeneratedResource>),
}

impl Generated {
    pub fn len(&self) -> usize {
        match self {
            Generated::One(_) => 1,
            Generated::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_vec(self) -> Vec<GeneratedResource> {
        match self {
            Generated::One(item) => vec![item],
            Generated::Many(items) => items,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Generated::One(item) => item.to_json(),
            Generated::Many(items) => Value::Array(items.iter().map(|i| i.to_json()).collect()),
        }
    }
}

/// Collects the settings of a [`ResourceGenerator`].
pub struct ResourceGeneratorBuilder {
    model: Arc<dyn ResourceModel>,
    resource_type: String,
    count: Option<usize>,
    params: Option<GeneratorParameters>,
    disable_validation: bool,
}

impl ResourceGeneratorBuilder {
    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn field_value(mut self, value: FieldValue) -> Self {
        self.params_mut().field_values.push(value);
        self
    }

    pub fn field_values(mut self, values: impl IntoIterator<Item = FieldValue>) -> Self {
        self.params_mut().field_values.extend(values);
        self
    }

    pub fn field_generator(mut self, generator: impl FieldGenerator + 'static) -> Self {
        self.params_mut().field_generators.push(Box::new(generator));
        self
    }

    pub fn boxed_field_generators(
        mut self,
        generators: impl IntoIterator<Item = Box<dyn FieldGenerator>>,
    ) -> Self {
        self.params_mut().field_generators.extend(generators);
        self
    }

    /// Use a prepared parameter bundle, replacing anything set so far.
    pub fn parameters(mut self, params: GeneratorParameters) -> Self {
        self.params = Some(params);
        self
    }

    pub fn disable_validation(mut self, disable: bool) -> Self {
        self.disable_validation = disable;
        self
    }

    fn params_mut(&mut self) -> &mut GeneratorParameters {
        self.params.get_or_insert_with(GeneratorParameters::default)
    }

    /// Resolve the resource type and, unless validation is disabled, check
    /// that the supplied field values and generators cover every required
    /// field.
    pub fn build(self) -> Result<ResourceGenerator> {
        let descriptor = self.model.resolve_type(&self.resource_type)?;

        let mut params = self.params;
        if let (Some(params), Some(count)) = (params.as_mut(), self.count)
            && params.count.is_none()
        {
            params.count = Some(count);
        }

        if !self.disable_validation
            && let Some(params) = &params
            && !params.field_values.is_empty()
        {
            let supplied: BTreeSet<String> = params.field_names().map(str::to_string).collect();
            check_required(self.model.as_ref(), &descriptor, &supplied)?;
        }

        Ok(ResourceGenerator {
            model: self.model,
            descriptor,
            count: self.count,
            params,
            disable_validation: self.disable_validation,
            cursors: HashMap::new(),
            claimed: BTreeSet::new(),
            validated: false,
        })
    }
}

fn check_required(
    model: &dyn ResourceModel,
    descriptor: &TypeDescriptor,
    claimed: &BTreeSet<String>,
) -> Result<()> {
    let missing: BTreeSet<String> = model
        .required_fields(descriptor)
        .difference(claimed)
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(KindlingError::missing_required_fields(&descriptor.name, missing))
    }
}

/// Generates resources of one type from field values and field generators.
///
/// Validation of the parameters runs once per generator. Claims are collected
/// into a scratch set and committed to the claimed field set only when every
/// check passes, so a failed validation leaves the claimed set empty and runs
/// again on the next call. After a successful validation the set is sealed. Cursors over distributed field values and the
/// state of field generators persist across `generate` calls, so a second
/// call continues where the first stopped instead of repeating its output.
///
/// The generator owns stateful field generators that need not be `Send`;
/// share it between threads only behind external synchronization.
pub struct ResourceGenerator {
    model: Arc<dyn ResourceModel>,
    descriptor: TypeDescriptor,
    count: Option<usize>,
    params: Option<GeneratorParameters>,
    disable_validation: bool,
    cursors: HashMap<String, usize>,
    claimed: BTreeSet<String>,
    validated: bool,
}

impl ResourceGenerator {
    pub fn builder(
        model: Arc<dyn ResourceModel>,
        resource_type: impl Into<String>,
    ) -> ResourceGeneratorBuilder {
        ResourceGeneratorBuilder {
            model,
            resource_type: resource_type.into(),
            count: None,
            params: None,
            disable_validation: false,
        }
    }

    /// Builder for resources of the same type as `resource`.
    pub fn builder_for(model: Arc<dyn ResourceModel>, resource: &Resource) -> ResourceGeneratorBuilder {
        Self::builder(model, resource.resource_type())
    }

    pub fn new(model: Arc<dyn ResourceModel>, resource_type: &str) -> Result<Self> {
        Self::builder(model, resource_type).build()
    }

    pub fn resource_type(&self) -> &str {
        &self.descriptor.name
    }

    pub fn required_fields(&self) -> BTreeSet<String> {
        self.model.required_fields(&self.descriptor)
    }

    /// Declared element names of the resource type; empty when the type
    /// accepts any element.
    pub fn fields(&self) -> &BTreeSet<String> {
        &self.descriptor.elements
    }

    /// Fields claimed by field values and generators, filled by validation.
    pub fn claimed_fields(&self) -> &BTreeSet<String> {
        &self.claimed
    }

    pub fn is_validated(&self) -> bool {
        self.validated
    }

    pub fn generate(&mut self, options: GenerateOptions) -> Result<Generated> {
        let disable_validation = options.disable_validation || self.disable_validation;

        if self.params.is_none() {
            self.params = Some(GeneratorParameters::new(self.count));
        }

        if !disable_validation {
            self.validate_params()?;
        }

        let count = self.params.as_ref().and_then(|p| p.count);
        let instances = count.unwrap_or(1);
        let mut resources = Vec::with_capacity(instances);
        for _ in 0..instances {
            let fields = self.next_fields(options.generate_ids)?;
            let resource = if options.as_dict {
                GeneratedResource::Raw(fields)
            } else if disable_validation {
                GeneratedResource::Typed(self.model.construct_unchecked(&self.descriptor, fields))
            } else {
                GeneratedResource::Typed(self.model.construct(&self.descriptor, fields)?)
            };
            resources.push(resource);
        }

        tracing::debug!(
            resource_type = %self.descriptor.name,
            count = resources.len(),
            as_dict = options.as_dict,
            "Generated resources"
        );

        match count {
            Some(_) => Ok(Generated::Many(resources)),
            None => Ok(Generated::One(resources.remove(0))),
        }
    }

    fn validate_params(&mut self) -> Result<()> {
        if self.validated {
            return Ok(());
        }
        let Some(params) = &self.params else {
            return Ok(());
        };

        let expected = params.instances();
        let mut claimed = BTreeSet::new();

        for value in &params.field_values {
            if !claimed.insert(value.field.clone()) {
                return Err(KindlingError::duplicate_field(&value.field));
            }
            if let Some(actual) = value.distributed_len()
                && actual != expected
            {
                return Err(KindlingError::FieldValueCountMismatch {
                    field: value.field.clone(),
                    expected,
                    actual,
                });
            }
        }

        for generator in &params.field_generators {
            if !claimed.insert(generator.field().to_string()) {
                return Err(KindlingError::duplicate_field(generator.field()));
            }
        }

        check_required(self.model.as_ref(), &self.descriptor, &claimed)?;

        self.claimed = claimed;
        self.validated = true;
        Ok(())
    }

    fn next_fields(&mut self, with_id: bool) -> Result<FieldMap> {
        let Self {
            params, cursors, ..
        } = self;
        let mut fields = FieldMap::new();
        let Some(params) = params.as_mut() else {
            return Ok(fields);
        };

        for value in &params.field_values {
            let assigned = match &value.value {
                Value::Array(items) if !value.list_field => {
                    let cursor = cursors.entry(value.field.clone()).or_insert(0);
                    let item = items.get(*cursor).cloned().ok_or_else(|| {
                        KindlingError::GeneratorExhausted {
                            field: value.field.clone(),
                            consumed: *cursor,
                        }
                    })?;
                    *cursor += 1;
                    item
                }
                other => other.clone(),
            };
            fields.insert(value.field.clone(), assigned);
        }

        for generator in params.field_generators.iter_mut() {
            let value = generator.generate();
            fields.insert(generator.field().to_string(), value);
        }

        if with_id {
            fields.insert("id".to_string(), Value::String(generate_id()));
        }

        Ok(fields)
    }
}

impl std::fmt::Debug for ResourceGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGenerator")
            .field("resource_type", &self.descriptor.name)
            .field("count", &self.count)
            .field("params", &self.params)
            .field("validated", &self.validated)
            .finish()
    }
}
