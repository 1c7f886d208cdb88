use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading, validating or deriving from a manifest
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse manifest JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse manifest YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unsupported manifest document: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Manifest schema is invalid: {0}")]
    Schema(String),

    #[error("There were {} problem(s) with the extension manifest", .violations.len())]
    Validation { violations: Vec<String> },

    #[error(
        "Script files with different extensions should not share names: \"{}\" will overwrite \"{}\" (entry \"{name}\")",
        .incoming.display(),
        .existing.display()
    )]
    EntryCollision {
        name: String,
        existing: PathBuf,
        incoming: PathBuf,
    },
}

impl ManifestError {
    /// Every schema violation carried by a validation error
    pub fn violations(&self) -> &[String] {
        match self {
            ManifestError::Validation { violations } => violations,
            _ => &[],
        }
    }
}
