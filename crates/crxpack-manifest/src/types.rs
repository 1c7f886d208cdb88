//! Core types shared by the manifest loader, the deriver and the build orchestrator

use crate::errors::ManifestError;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The manifest document body: a JSON object
pub type ManifestBody = Map<String, Value>;

/// Transform applied to the loaded manifest body
pub type ManifestTransform = Arc<dyn Fn(ManifestBody) -> ManifestBody + Send + Sync>;

/// A manifest loaded from disk, with the source root it was found in
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedManifest {
    /// Path of the manifest document
    pub path: PathBuf,
    /// Parent directory of the manifest; every derived path is relative to it
    pub src_dir: PathBuf,
    /// Parsed, overridden and validated body
    pub body: ManifestBody,
}

impl LoadedManifest {
    /// Declared manifest version (2 when unset)
    pub fn manifest_version(&self) -> u64 {
        manifest_version(&self.body)
    }
}

/// Declared manifest version of a body (2 when unset)
pub fn manifest_version(body: &ManifestBody) -> u64 {
    body.get("manifest_version")
        .and_then(Value::as_u64)
        .unwrap_or(2)
}

/// Caller-supplied override applied after the document is parsed
#[derive(Clone)]
pub enum ManifestOverride {
    /// Top-level keys replace the loaded keys
    Merge(ManifestBody),
    /// The loaded body is passed through a function
    Transform(ManifestTransform),
}

impl ManifestOverride {
    /// Apply the override to a body
    pub fn apply(&self, body: ManifestBody) -> ManifestBody {
        match self {
            ManifestOverride::Merge(extension) => {
                let mut merged = body;
                for (key, value) in extension {
                    merged.insert(key.clone(), value.clone());
                }
                merged
            }
            ManifestOverride::Transform(transform) => transform(body),
        }
    }
}

impl std::fmt::Debug for ManifestOverride {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestOverride::Merge(map) => f.debug_tuple("Merge").field(map).finish(),
            ManifestOverride::Transform(_) => f.write_str("Transform(..)"),
        }
    }
}

/// Package metadata used when the manifest leaves a field unset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageDefaults {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
}

impl PackageDefaults {
    /// Build a body with `manifest_version: 2` and the package metadata,
    /// overlaid by `body`.
    pub fn apply(&self, body: &ManifestBody) -> ManifestBody {
        let mut merged = ManifestBody::new();
        merged.insert("manifest_version".to_string(), Value::from(2));
        for (key, value) in [
            ("name", &self.name),
            ("version", &self.version),
            ("description", &self.description),
        ] {
            if let Some(value) = value {
                merged.insert(key.to_string(), Value::String(value.clone()));
            }
        }
        for (key, value) in body {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

/// Classification of a referenced file by suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileClass {
    Script,
    Page,
    Stylesheet,
    Image,
    Other,
}

/// Files referenced by a manifest, partitioned by class.
///
/// Paths are relative to the manifest's source root, use `/` separators
/// and are deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedFiles {
    pub js: BTreeSet<String>,
    pub html: BTreeSet<String>,
    pub css: BTreeSet<String>,
    pub img: BTreeSet<String>,
    pub others: BTreeSet<String>,
    /// Content-script sources (also present in `js`)
    pub content_scripts: BTreeSet<String>,
}

impl DerivedFiles {
    /// Script and page files that become compiler entries
    pub fn inputs(&self) -> impl Iterator<Item = &String> {
        self.js.iter().chain(self.html.iter())
    }

    /// Files copied verbatim into the output
    pub fn assets(&self) -> impl Iterator<Item = &String> {
        self.css
            .iter()
            .chain(self.img.iter())
            .chain(self.others.iter())
    }

    /// Number of non-empty partitions among js/html/css/img/others
    pub fn class_count(&self) -> usize {
        [&self.js, &self.html, &self.css, &self.img, &self.others]
            .iter()
            .filter(|set| !set.is_empty())
            .count()
    }
}

/// Logical entry name -> absolute source path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryTable {
    entries: BTreeMap<String, PathBuf>,
}

impl EntryTable {
    /// Build an entry table from root-relative files
    pub fn from_files<'a>(
        src_dir: &Path,
        files: impl IntoIterator<Item = &'a String>,
    ) -> Result<Self, ManifestError> {
        let mut table = EntryTable::default();
        for file in files {
            table.insert(entry_name(file), src_dir.join(file))?;
        }
        Ok(table)
    }

    /// Insert an entry; a second path reducing to the same name is an error
    pub fn insert(&mut self, name: String, path: PathBuf) -> Result<(), ManifestError> {
        if let Some(existing) = self.entries.get(&name) {
            if existing == &path {
                return Ok(());
            }
            return Err(ManifestError::EntryCollision {
                name,
                existing: existing.clone(),
                incoming: path,
            });
        }
        self.entries.insert(name, path);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&PathBuf> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<PathBuf> {
        self.entries.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PathBuf)> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Logical entry name for a root-relative path: the path without its extension
pub fn entry_name(relative: &str) -> String {
    let normalized = relative.replace('\\', "/");
    let normalized = normalized.trim_start_matches("./");
    match normalized.rfind('.') {
        Some(dot) if !normalized[dot..].contains('/') && dot > 0 => normalized[..dot].to_string(),
        _ => normalized.to_string(),
    }
}
