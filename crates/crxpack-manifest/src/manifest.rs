//! Manifest loading and permission merging

use crate::errors::ManifestError;
use crate::schema::validate_manifest;
use crate::types::{LoadedManifest, ManifestBody, ManifestOverride, PackageDefaults};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Prefix marking a declared permission as an exclusion
pub const PERMISSION_EXCLUSION: char = '!';

/// Options controlling how a manifest is loaded
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub overrides: Option<ManifestOverride>,
    pub package: PackageDefaults,
}

/// Parse a manifest document without validating it
pub fn read_manifest_body(path: &Path) -> Result<ManifestBody, ManifestError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let content = fs::read_to_string(path)?;
    let value: Value = match extension.as_deref() {
        Some("json") => serde_json::from_str(&content)?,
        Some("yaml" | "yml") => serde_yaml::from_str(&content)?,
        _ => return Err(ManifestError::UnsupportedFormat(path.to_path_buf())),
    };

    match value {
        Value::Object(body) => Ok(body),
        _ => Err(ManifestError::Configuration(format!(
            "Manifest {} must contain a mapping at the top level",
            path.display()
        ))),
    }
}

/// Load, override and validate a manifest.
///
/// The parent directory of `path` becomes the source root for every
/// derived path.
pub fn load_manifest(path: &Path, options: &LoadOptions) -> Result<LoadedManifest, ManifestError> {
    let src_dir = path
        .parent()
        .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
        .ok_or_else(|| {
            ManifestError::Configuration(format!(
                "Cannot determine source directory for {}",
                path.display()
            ))
        })?
        .to_path_buf();

    let body = read_manifest_body(path)?;
    let body = match &options.overrides {
        Some(overrides) => overrides.apply(body),
        None => body,
    };
    let body = options.package.apply(&body);

    validate_manifest(&body)?;
    debug!(
        "Loaded manifest {} ({} top-level keys)",
        path.display(),
        body.len()
    );

    Ok(LoadedManifest {
        path: path.to_path_buf(),
        src_dir,
        body,
    })
}

/// String permissions declared in a manifest's `permissions` list
pub fn declared_permissions(body: &ManifestBody) -> Vec<String> {
    body.get("permissions")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Union declared and inferred permissions.
///
/// A declared permission written as `!name` removes `name` from the
/// result wherever it appears. Exclusions only come from the declared
/// list; inferred names are never treated as exclusions.
pub fn combine_permissions(declared: &[String], inferred: &BTreeSet<String>) -> Vec<String> {
    let excluded: BTreeSet<&str> = declared
        .iter()
        .filter_map(|p| p.strip_prefix(PERMISSION_EXCLUSION))
        .collect();

    let mut seen = BTreeSet::new();
    declared
        .iter()
        .filter(|p| !p.starts_with(PERMISSION_EXCLUSION))
        .chain(inferred.iter())
        .filter(|p| !excluded.contains(p.as_str()))
        .filter(|p| seen.insert(p.as_str()))
        .cloned()
        .collect()
}

/// Replace the manifest's string permissions with the merged set.
///
/// Object-shaped permission entries are carried through unchanged.
pub fn merge_permissions(body: &mut ManifestBody, inferred: &BTreeSet<String>) {
    let declared = declared_permissions(body);
    let objects: Vec<Value> = body
        .get("permissions")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter(|v| v.is_object()).cloned().collect())
        .unwrap_or_default();

    let mut permissions: Vec<Value> = combine_permissions(&declared, inferred)
        .into_iter()
        .map(Value::String)
        .collect();
    permissions.extend(objects);

    if permissions.is_empty() {
        body.remove("permissions");
    } else {
        body.insert("permissions".to_string(), Value::Array(permissions));
    }
}
