//! The interface consumed from the external module compiler

use crate::errors::BundlerError;
use crate::graph::{ModuleFormat, OutputGraph};
use std::collections::BTreeMap;

/// Answer to a resolution request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Resolved to a module id the resolver can load
    Resolved(String),
    /// Leave the import as an external reference
    External,
    /// Not handled; the compiler applies its own resolution
    Unhandled,
}

/// Resolution and loading hooks a compiler consults before its own
pub trait ModuleResolver: Send + Sync {
    /// Resolve `specifier` imported from `importer` (`None` for entries)
    fn resolve(&self, specifier: &str, importer: Option<&str>) -> Resolution;

    /// Source text for a resolved id, or `None` to let the compiler load it
    fn load(&self, id: &str) -> Option<String>;
}

/// Entries to compile and the output format to emit them in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileRequest {
    /// Logical entry name -> module id
    pub entries: BTreeMap<String, String>,
    pub format: ModuleFormat,
}

impl CompileRequest {
    pub fn new(format: ModuleFormat) -> Self {
        CompileRequest {
            entries: BTreeMap::new(),
            format,
        }
    }

    pub fn with_entry(mut self, name: impl Into<String>, id: impl Into<String>) -> Self {
        self.entries.insert(name.into(), id.into());
        self
    }
}

/// A module compiler producing an [`OutputGraph`]
pub trait Compiler: Send + Sync {
    fn compile(
        &self,
        request: &CompileRequest,
        resolver: Option<&dyn ModuleResolver>,
    ) -> Result<OutputGraph, BundlerError>;
}
