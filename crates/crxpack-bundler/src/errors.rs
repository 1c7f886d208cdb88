use std::io;
use thiserror::Error;

/// Errors raised while compiling, regenerating or rewriting an output graph
#[derive(Error, Debug)]
pub enum BundlerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Entry '{0}' not found in the output graph")]
    EntryNotFound(String),

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("Compilation failed: {0}")]
    Compile(String),

    #[error("Output path collision: {0}")]
    OutputCollision(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
