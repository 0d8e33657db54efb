//! Per-field value sources used by the resource generator.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{KindlingError, Result};

/// A fixed value (or list of values) assigned to one field.
///
/// A JSON array with `list_field == false` is distributed over the generated
/// resources, one element per resource in order. With `list_field == true`
/// the array is assigned whole to every resource, as is any non-array value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub field: String,
    pub value: Value,
    #[serde(default)]
    pub list_field: bool,
}

impl FieldValue {
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            list_field: false,
        }
    }

    /// One element per generated resource.
    pub fn distributed<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(field, Value::Array(values.into_iter().map(Into::into).collect()))
    }

    /// The whole list is the value of the field on every resource.
    pub fn list<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            list_field: true,
            ..Self::distributed(field, values)
        }
    }

    pub fn is_distributed(&self) -> bool {
        self.value.is_array() && !self.list_field
    }

    pub(crate) fn distributed_len(&self) -> Option<usize> {
        match &self.value {
            Value::Array(items) if !self.list_field => Some(items.len()),
            _ => None,
        }
    }
}

/// Produces a value for one field, once per generated resource.
///
/// Generators may keep state between calls (counters, RNGs); the resource
/// generator calls [`FieldGenerator::generate`] exactly once per resource and
/// never caches the result.
pub trait FieldGenerator {
    fn field(&self) -> &str;

    fn generate(&mut self) -> Value;
}

/// Wraps a closure as a field generator.
pub struct FnFieldGenerator<F> {
    field: String,
    generate: F,
}

impl<F> FnFieldGenerator<F>
where
    F: FnMut() -> Value,
{
    pub fn new(field: impl Into<String>, generate: F) -> Self {
        Self {
            field: field.into(),
            generate,
        }
    }
}

impl<F> FieldGenerator for FnFieldGenerator<F>
where
    F: FnMut() -> Value,
{
    fn field(&self) -> &str {
        &self.field
    }

    fn generate(&mut self) -> Value {
        (self.generate)()
    }
}

/// Picks one of a fixed set of values uniformly at random.
pub struct ChoiceGenerator {
    field: String,
    choices: Vec<Value>,
    rng: StdRng,
}

impl ChoiceGenerator {
    pub fn new<I, V>(field: impl Into<String>, choices: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let field = field.into();
        let choices: Vec<Value> = choices.into_iter().map(Into::into).collect();
        if choices.is_empty() {
            return Err(KindlingError::configuration(format!(
                "choice generator for '{field}' needs at least one choice"
            )));
        }
        Ok(Self {
            field,
            choices,
            rng: StdRng::from_entropy(),
        })
    }

    /// Reseed for reproducible output.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }
}

impl FieldGenerator for ChoiceGenerator {
    fn field(&self) -> &str {
        &self.field
    }

    fn generate(&mut self) -> Value {
        self.choices
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or(Value::Null)
    }
}

/// String values from a pattern with placeholders.
///
/// - `{index}` - number of values generated so far, starting at 0
/// - `{uuid}` - random UUID
/// - `{rand:N}` - random N-digit number
pub struct PatternGenerator {
    field: String,
    pattern: String,
    index: u64,
    rng: StdRng,
}

impl PatternGenerator {
    pub fn new(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            pattern: pattern.into(),
            index: 0,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn render(&mut self) -> String {
        let mut result = self.pattern.replace("{index}", &self.index.to_string());

        while result.contains("{uuid}") {
            result = result.replacen("{uuid}", &Uuid::new_v4().to_string(), 1);
        }

        while let Some(start) = result.find("{rand:") {
            let Some(end) = result[start..].find('}').map(|e| start + e) else {
                break;
            };
            let Ok(digits) = result[start + 6..end].parse::<usize>() else {
                break;
            };
            let number = random_digits(&mut self.rng, digits);
            result = format!("{}{}{}", &result[..start], number, &result[end + 1..]);
        }

        result
    }
}

impl FieldGenerator for PatternGenerator {
    fn field(&self) -> &str {
        &self.field
    }

    fn generate(&mut self) -> Value {
        let value = self.render();
        self.index += 1;
        Value::String(value)
    }
}

fn random_digits<R: Rng>(rng: &mut R, digits: usize) -> String {
    (0..digits)
        .map(|i| {
            // no leading zero
            let low = if i == 0 { 1 } else { 0 };
            char::from(b'0' + rng.gen_range(low..10u8))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_value_kinds() {
        assert!(!FieldValue::new("gender", "male").is_distributed());
        assert!(FieldValue::distributed("gender", ["male", "female"]).is_distributed());
        let list = FieldValue::list("alias", ["a", "b"]);
        assert!(!list.is_distributed());
        assert_eq!(list.value, json!(["a", "b"]));
        assert_eq!(list.distributed_len(), None);
    }

    #[test]
    fn test_field_value_deserializes_with_default_list_flag() {
        let fv: FieldValue =
            serde_json::from_value(json!({"field": "status", "value": ["a", "b"]})).unwrap();
        assert!(fv.is_distributed());
        assert_eq!(fv.distributed_len(), Some(2));
    }

    #[test]
    fn test_fn_generator_is_called_every_time() {
        let mut counter = 0;
        let mut generator = FnFieldGenerator::new("multipleBirthInteger", move || {
            counter += 1;
            json!(counter)
        });
        assert_eq!(generator.field(), "multipleBirthInteger");
        assert_eq!(generator.generate(), json!(1));
        assert_eq!(generator.generate(), json!(2));
    }

    #[test]
    fn test_choice_generator_picks_from_choices() {
        let mut generator = ChoiceGenerator::new("gender", ["male", "female", "other"])
            .unwrap()
            .with_seed(7);
        for _ in 0..20 {
            let value = generator.generate();
            assert!(["male", "female", "other"].contains(&value.as_str().unwrap()));
        }
        assert!(ChoiceGenerator::new("gender", Vec::<Value>::new()).is_err());
    }

    #[test]
    fn test_seeded_choice_generators_agree() {
        let mut a = ChoiceGenerator::new("x", [1, 2, 3, 4, 5]).unwrap().with_seed(42);
        let mut b = ChoiceGenerator::new("x", [1, 2, 3, 4, 5]).unwrap().with_seed(42);
        let left: Vec<Value> = (0..10).map(|_| a.generate()).collect();
        let right: Vec<Value> = (0..10).map(|_| b.generate()).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn test_pattern_generator_placeholders() {
        let mut generator = PatternGenerator::new("id", "patient-{index}");
        assert_eq!(generator.generate(), json!("patient-0"));
        assert_eq!(generator.generate(), json!("patient-1"));

        let mut generator = PatternGenerator::new("text", "mrn-{rand:6}").with_seed(1);
        let value = generator.generate();
        let digits = value.as_str().unwrap().strip_prefix("mrn-").unwrap();
        assert_eq!(digits.len(), 6);
        assert!(!digits.starts_with('0'));
        assert!(digits.chars().all(|c| c.is_ascii_digit()));

        let mut generator = PatternGenerator::new("id", "{uuid}");
        let value = generator.generate();
        assert!(Uuid::parse_str(value.as_str().unwrap()).is_ok());
    }
}
