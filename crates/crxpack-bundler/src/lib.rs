//! Compiler interface and output-graph processing for crxpack
//!
//! This crate provides:
//! - the narrow [`Compiler`] / [`ModuleResolver`] interface the build
//!   orchestrator drives
//! - the [`OutputGraph`] of modules and assets a compilation produces
//! - [`PassthroughCompiler`], a reference compiler that links modules
//!   without transforming them
//! - mixed-format regeneration from an already compiled graph
//! - reserved file name sanitation

pub mod compiler;
pub mod errors;
pub mod graph;
pub mod passthrough;
pub mod regenerate;
pub mod sanitize;

pub use compiler::{CompileRequest, Compiler, ModuleResolver, Resolution};
pub use errors::BundlerError;
pub use graph::{Asset, Module, ModuleFormat, OutputGraph, OutputItem};
pub use passthrough::PassthroughCompiler;
pub use regenerate::{parse_format_groups, regenerate, FormatGroups, GraphResolver};
pub use sanitize::{is_reserved, sanitize_file_names, RESERVED_PREFIX};
