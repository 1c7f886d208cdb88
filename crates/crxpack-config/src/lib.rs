//! Build configuration for crxpack
//!
//! The configuration lives in `crxpack.toml`. Relative paths inside the file
//! are resolved against the directory containing it.

pub mod build_config;

pub use build_config::{
    BuildConfig, ConfigError, PackageConfig, WrapperConfig, CONFIG_ENV_VAR, CONFIG_FILE_NAME,
};
