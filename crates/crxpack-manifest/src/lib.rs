//! crxpack manifest handling
//!
//! Loads an extension manifest (JSON or YAML), applies caller overrides and
//! package defaults, validates it against the bundled manifest schema, and
//! derives the classified set of files it references.
//!
//! Every path derived from a manifest is relative to the directory the
//! manifest lives in.

pub mod derive;
pub mod errors;
pub mod manifest;
pub mod manifest_writer;
pub mod schema;
pub mod types;

pub use derive::{
    classify, content_script_sources, derive_entries, derive_files,
};
pub use errors::ManifestError;
pub use manifest::{
    combine_permissions, declared_permissions, load_manifest, merge_permissions,
    read_manifest_body, LoadOptions,
};
pub use manifest_writer::render_manifest;
pub use schema::{manifest_violations, validate_manifest};
pub use types::{
    entry_name, manifest_version, DerivedFiles, EntryTable, FileClass, LoadedManifest,
    ManifestBody, ManifestOverride, ManifestTransform, PackageDefaults,
};
