//! crxpack library - the build orchestrator behind the `crxpack` binary
//!
//! [`build::ExtensionBuild`] drives one build of an extension through
//! configuring, compiling and assembling. [`build::BuildCache`] carries the
//! parsed manifest, derived entries, asset bytes and the last inferred
//! permission set between builds of one session.

pub mod build;
pub mod commands;
pub mod common;
pub mod errors;

pub use build::{
    build_once, write_output, BuildCache, BuildOptions, BuildPhase, BuildReport, BuildRun,
    ExtensionBuild, SharedCache,
};
pub use common::GlobalOpts;
pub use crxpack_logger as logger;
pub use errors::BuildError;
