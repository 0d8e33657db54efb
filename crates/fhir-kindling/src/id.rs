use std::sync::LazyLock;

use regex::Regex;

use crate::error::{KindlingError, Result};

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9\-\.]{1,64}$").expect("valid id regex"));

pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Checks an id against the FHIR `id` grammar.
pub fn validate_id(id: &str) -> Result<()> {
    if ID_PATTERN.is_match(id) {
        Ok(())
    } else {
        Err(KindlingError::invalid_id(id))
    }
}
