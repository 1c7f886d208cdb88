//! Domain schema validation.
//!
//! The bundled manifest schema is checked against the draft-07 meta-schema
//! the first time it is used, then compiled once and shared.

use crate::errors::ManifestError;
use crate::types::ManifestBody;
use jsonschema::{Draft, Validator};
use once_cell::sync::Lazy;
use serde_json::Value;

const MANIFEST_SCHEMA: &str = include_str!("../schema/manifest.schema.json");

const OPTIONS_EXCLUSIVE: &str = "options_page and options_ui cannot both be defined";

static VALIDATOR: Lazy<Result<Validator, String>> = Lazy::new(build_validator);

fn build_validator() -> Result<Validator, String> {
    let schema: Value = serde_json::from_str(MANIFEST_SCHEMA).map_err(|e| e.to_string())?;
    jsonschema::meta::validate(&schema).map_err(|e| e.to_string())?;
    jsonschema::options()
        .with_draft(Draft::Draft7)
        .build(&schema)
        .map_err(|e| e.to_string())
}

fn validator() -> Result<&'static Validator, ManifestError> {
    VALIDATOR
        .as_ref()
        .map_err(|e| ManifestError::Schema(e.clone()))
}

/// Every violation of the manifest schema, one line per violation
pub fn manifest_violations(body: &ManifestBody) -> Result<Vec<String>, ManifestError> {
    let validator = validator()?;
    let instance = Value::Object(body.clone());

    let mut violations: Vec<String> = validator
        .iter_errors(&instance)
        .map(|err| {
            let path = err.instance_path.to_string();
            let path = if path.is_empty() { "/".to_string() } else { path };
            format!("{}: {}", path, err)
        })
        .collect();

    if body.contains_key("options_page") && body.contains_key("options_ui") {
        violations.push(format!("/: {}", OPTIONS_EXCLUSIVE));
    }

    Ok(violations)
}

/// Validate a manifest body, failing with every violation found
pub fn validate_manifest(body: &ManifestBody) -> Result<(), ManifestError> {
    let violations = manifest_violations(body)?;
    if violations.is_empty() {
        Ok(())
    } else {
        tracing::debug!("Manifest failed validation with {} violation(s)", violations.len());
        Err(ManifestError::Validation { violations })
    }
}
