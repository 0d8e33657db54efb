use std::sync::Arc;

use anyhow::{Context, Result};
use fhir_kindling::{
    ChoiceGenerator, FieldValue, GenerateOptions, PatternGenerator, ResourceGenerator,
    ResourceModel, SchemaRegistry,
};
use serde_json::Value;

use crate::cli::{GenerateArgs, OutputFormat};
use crate::output::{print_success, print_value};

pub fn generate(args: &GenerateArgs, output: OutputFormat) -> Result<()> {
    let model: Arc<dyn ResourceModel> = Arc::new(SchemaRegistry::r4());
    let mut builder = ResourceGenerator::builder(model, &args.resource_type)
        .disable_validation(args.no_validate);
    if let Some(count) = args.count {
        builder = builder.count(count);
    }

    for raw in &args.values {
        let (field, value) = split_assignment(raw)?;
        builder = builder.field_value(FieldValue::new(field, parse_value(value)));
    }
    for raw in &args.list_values {
        let (field, value) = split_assignment(raw)?;
        let value = parse_value(value);
        anyhow::ensure!(value.is_array(), "--list-value {field} expects a JSON array");
        builder = builder.field_value(FieldValue {
            field: field.to_string(),
            value,
            list_field: true,
        });
    }
    for raw in &args.patterns {
        let (field, pattern) = split_assignment(raw)?;
        let mut generator = PatternGenerator::new(field, pattern);
        if let Some(seed) = args.seed {
            generator = generator.with_seed(seed);
        }
        builder = builder.field_generator(generator);
    }
    for raw in &args.choices {
        let (field, choices) = split_assignment(raw)?;
        let mut generator = ChoiceGenerator::new(field, choices.split(',').map(parse_value))?;
        if let Some(seed) = args.seed {
            generator = generator.with_seed(seed);
        }
        builder = builder.field_generator(generator);
    }

    let mut generator = builder
        .build()
        .with_context(|| format!("Invalid generator for {}", args.resource_type))?;
    let options = GenerateOptions {
        generate_ids: args.ids,
        as_dict: args.raw,
        disable_validation: args.no_validate,
    };
    let generated = generator
        .generate(options)
        .with_context(|| format!("Failed to generate {} resources", args.resource_type))?;

    print_value(&generated.to_json(), output)?;
    print_success(&format!(
        "Generated {} {} resource(s)",
        generated.len(),
        generator.resource_type()
    ));
    Ok(())
}

/// Splits `field=value` at the first `=`.
fn split_assignment(raw: &str) -> Result<(&str, &str)> {
    match raw.split_once('=') {
        Some((field, value)) if !field.is_empty() => Ok((field, value)),
        _ => anyhow::bail!("Expected field=value, got: {raw}"),
    }
}

/// JSON if it parses, otherwise the text as a string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_assignment() {
        assert_eq!(split_assignment("gender=male").unwrap(), ("gender", "male"));
        assert_eq!(split_assignment("note=a=b").unwrap(), ("note", "a=b"));
        assert!(split_assignment("gender").is_err());
        assert!(split_assignment("=male").is_err());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("male"), json!("male"));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("[1, 2]"), json!([1, 2]));
        assert_eq!(parse_value("{\"text\": \"hr\"}"), json!({"text": "hr"}));
    }
}
