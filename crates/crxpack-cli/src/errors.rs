//! Centralized error type for the crxpack build
//!
//! Library errors from the manifest, bundler and config crates are wrapped
//! as they are; the orchestrator adds its own failure kinds on top.

use crate::build::BuildPhase;
use crxpack_bundler::BundlerError;
use crxpack_config::ConfigError;
use crxpack_manifest::ManifestError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that terminate a build
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Bundler(#[from] BundlerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("There were {count} problem(s) with the extension manifest")]
    Validation { count: usize },

    #[error("Cannot read asset {}: {source}", .path.display())]
    Asset { path: PathBuf, source: io::Error },

    #[error("Build invariant violated: {0}")]
    Invariant(String),

    #[error("Cannot {operation} while the build is {phase}")]
    Phase {
        operation: &'static str,
        phase: BuildPhase,
    },

    #[error("Watch error: {0}")]
    Watch(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_display() {
        let err = BuildError::Validation { count: 3 };
        assert_eq!(
            err.to_string(),
            "There were 3 problem(s) with the extension manifest"
        );

        let err = BuildError::Phase {
            operation: "assemble",
            phase: BuildPhase::Configuring,
        };
        assert_eq!(err.to_string(), "Cannot assemble while the build is configuring");
    }

    #[test]
    fn test_library_errors_are_transparent() {
        let err: BuildError = BundlerError::EntryNotFound("content".to_string()).into();
        let inner = BundlerError::EntryNotFound("content".to_string()).to_string();
        assert_eq!(err.to_string(), inner);
    }
}
