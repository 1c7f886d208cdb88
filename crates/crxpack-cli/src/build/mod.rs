//! The build orchestrator.
//!
//! [`ExtensionBuild`] walks one build through its phases:
//!
//! - **Configuring**: load the manifest (or reuse the cached one), derive
//!   files and entries, produce the compile request.
//! - **Compiling**: run the compiler, emit assets, regenerate format groups.
//! - **Assembling**: permissions, loaders and wrappers, name sanitation and
//!   the final manifest. See [`assemble`].
//! - **Done** or **Failed**.
//!
//! Each operation checks the phase it is called in, so steps cannot run
//! out of order.

mod assemble;
pub mod cache;
pub mod diagnostics;
pub mod options;
pub mod pipeline;
pub mod wrapper;

pub use cache::{BuildCache, CacheStats, PermissionChange, SharedCache};
pub use diagnostics::{BuildReport, Diagnostic, Severity};
pub use options::BuildOptions;
pub use pipeline::{build_once, write_output, BuildRun};

use crate::errors::BuildError;
use crxpack_bundler::{regenerate, CompileRequest, Compiler, ModuleResolver, OutputGraph, Resolution};
use crxpack_manifest::{derive_entries, derive_files, load_manifest, ManifestError};
use rayon::prelude::*;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Entry compiled in place of real entries when the manifest declares none
pub const STUB_ENTRY: &str = "stub__empty-chrome-extension-manifest";

const STUB_SOURCE: &str = "console.log('stub');\n";

/// Lifecycle phase of one build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Configuring,
    Compiling,
    Assembling,
    Done,
    Failed,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildPhase::Configuring => "configuring",
            BuildPhase::Compiling => "compiling",
            BuildPhase::Assembling => "assembling",
            BuildPhase::Done => "done",
            BuildPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Answers the compiler's hooks for the placeholder entry
#[derive(Debug, Clone, Copy, Default)]
pub struct StubResolver;

impl ModuleResolver for StubResolver {
    fn resolve(&self, specifier: &str, importer: Option<&str>) -> Resolution {
        if importer.is_none() && specifier == STUB_ENTRY {
            Resolution::Resolved(STUB_ENTRY.to_string())
        } else {
            Resolution::Unhandled
        }
    }

    fn load(&self, id: &str) -> Option<String> {
        (id == STUB_ENTRY).then(|| STUB_SOURCE.to_string())
    }
}

/// One build of an extension
pub struct ExtensionBuild<'a> {
    options: &'a BuildOptions,
    cache: &'a mut BuildCache,
    phase: BuildPhase,
    report: BuildReport,
    stubbed: bool,
}

impl<'a> ExtensionBuild<'a> {
    pub fn new(options: &'a BuildOptions, cache: &'a mut BuildCache) -> Self {
        ExtensionBuild {
            options,
            cache,
            phase: BuildPhase::Configuring,
            report: BuildReport::new(),
            stubbed: false,
        }
    }

    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    pub fn into_report(self) -> BuildReport {
        self.report
    }

    /// Configure, compile, regenerate and assemble
    pub fn run(&mut self, compiler: &dyn Compiler) -> Result<OutputGraph, BuildError> {
        let request = self.configure()?;
        let graph = self.compile(compiler, &request)?;
        let graph = self.regenerate(compiler, graph)?;
        self.assemble(graph)
    }

    /// Load the manifest and build the compile request
    pub fn configure(&mut self) -> Result<CompileRequest, BuildError> {
        self.ensure("configure", BuildPhase::Configuring)?;
        let result = self.load_manifest().and_then(|()| self.compile_request());
        let request = self.settle(result)?;
        self.phase = BuildPhase::Compiling;
        Ok(request)
    }

    /// Compile the request and emit the manifest's assets into the output
    pub fn compile(
        &mut self,
        compiler: &dyn Compiler,
        request: &CompileRequest,
    ) -> Result<OutputGraph, BuildError> {
        self.ensure("compile", BuildPhase::Compiling)?;
        let result = self.compile_and_emit(compiler, request);
        self.settle(result)
    }

    /// Re-emit entries in their configured formats
    pub fn regenerate(
        &mut self,
        compiler: &dyn Compiler,
        graph: OutputGraph,
    ) -> Result<OutputGraph, BuildError> {
        self.ensure("regenerate", BuildPhase::Compiling)?;
        if self.options.format_groups.is_empty() {
            return Ok(graph);
        }
        let result = regenerate(
            compiler,
            graph,
            &self.options.format_groups,
            self.options.format,
        )
        .map_err(BuildError::from);
        self.settle(result)
    }

    /// Turn the compiled output into a loadable extension
    pub fn assemble(&mut self, graph: OutputGraph) -> Result<OutputGraph, BuildError> {
        self.ensure("assemble", BuildPhase::Compiling)?;
        self.phase = BuildPhase::Assembling;
        let result = self.assemble_output(graph);
        let graph = self.settle(result)?;
        self.phase = BuildPhase::Done;
        Ok(graph)
    }

    fn ensure(&self, operation: &'static str, expected: BuildPhase) -> Result<(), BuildError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(BuildError::Phase {
                operation,
                phase: self.phase,
            })
        }
    }

    /// Mark the build failed when `result` is an error
    fn settle<T>(&mut self, result: Result<T, BuildError>) -> Result<T, BuildError> {
        if result.is_err() {
            self.phase = BuildPhase::Failed;
        }
        result
    }

    /// Surface every violation as a warning and return the terminating error
    fn validation_failure(&mut self, violations: &[String]) -> BuildError {
        for violation in violations {
            self.report.warn(violation.clone());
        }
        BuildError::Validation {
            count: violations.len(),
        }
    }

    fn load_manifest(&mut self) -> Result<(), BuildError> {
        if self.cache.manifest().is_some() {
            debug!("Reusing cached manifest");
            return Ok(());
        }

        let options = self.options;
        let manifest = match load_manifest(&options.manifest_path, &options.load_options()) {
            Ok(manifest) => manifest,
            Err(ManifestError::Validation { violations }) => {
                return Err(self.validation_failure(&violations));
            }
            Err(e) => return Err(e.into()),
        };
        let files = derive_files(&manifest)?;
        let entries = derive_entries(&manifest.src_dir, &files)?;
        debug!(
            "Derived {} entr(ies) and {} asset(s) from {}",
            entries.len(),
            files.assets().count(),
            manifest.path.display()
        );
        self.cache.store_manifest(manifest, files, entries);
        Ok(())
    }

    fn compile_request(&mut self) -> Result<CompileRequest, BuildError> {
        let entries = self
            .cache
            .entries()
            .ok_or_else(|| BuildError::Invariant("no entry table was derived".to_string()))?;

        let mut request = CompileRequest::new(self.options.format);
        for (name, path) in entries.iter() {
            request
                .entries
                .insert(name.clone(), path.to_string_lossy().into_owned());
        }
        if request.entries.is_empty() {
            debug!("Manifest declares no entries, compiling a placeholder");
            request
                .entries
                .insert(STUB_ENTRY.to_string(), STUB_ENTRY.to_string());
            self.stubbed = true;
        }
        Ok(request)
    }

    fn compile_and_emit(
        &mut self,
        compiler: &dyn Compiler,
        request: &CompileRequest,
    ) -> Result<OutputGraph, BuildError> {
        let mut graph = compiler.compile(request, Some(&StubResolver))?;
        if graph.is_empty() {
            return Err(BuildError::Invariant(
                "the compiler produced no output".to_string(),
            ));
        }
        self.emit_assets(&mut graph)?;
        Ok(graph)
    }

    /// Read every derived asset through the cache and add it to the output.
    ///
    /// Uncached files are read as one parallel batch.
    fn emit_assets(&mut self, graph: &mut OutputGraph) -> Result<(), BuildError> {
        let (Some(manifest), Some(files)) = (self.cache.manifest(), self.cache.files()) else {
            return Err(BuildError::Invariant(
                "assets requested before the manifest was loaded".to_string(),
            ));
        };
        let assets: Vec<(String, PathBuf)> = files
            .assets()
            .map(|relative| (relative.clone(), manifest.src_dir.join(relative)))
            .collect();

        let missing: Vec<PathBuf> = assets
            .iter()
            .map(|(_, path)| path)
            .filter(|path| self.cache.asset(path).is_none())
            .cloned()
            .collect();
        let loaded: Vec<(PathBuf, Vec<u8>)> = missing
            .into_par_iter()
            .map(|path| match fs::read(&path) {
                Ok(source) => Ok((path, source)),
                Err(source) => Err(BuildError::Asset { path, source }),
            })
            .collect::<Result<_, _>>()?;
        for (path, source) in loaded {
            self.cache.store_asset(path, source);
        }

        for (relative, path) in &assets {
            let Some(source) = self.cache.asset(path) else {
                continue;
            };
            if graph.contains(relative) {
                continue;
            }
            graph.emit_asset(relative, Some(relative), source.to_vec())?;
        }
        debug!("Emitted {} asset(s)", assets.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crxpack_bundler::PassthroughCompiler;
    use tempfile::TempDir;

    #[test]
    fn test_stub_resolver() {
        let resolver = StubResolver;
        assert_eq!(
            resolver.resolve(STUB_ENTRY, None),
            Resolution::Resolved(STUB_ENTRY.to_string())
        );
        assert_eq!(resolver.resolve(STUB_ENTRY, Some("a.js")), Resolution::Unhandled);
        assert_eq!(resolver.resolve("./a.js", None), Resolution::Unhandled);
        assert!(resolver.load(STUB_ENTRY).is_some());
        assert!(resolver.load("a.js").is_none());
    }

    #[test]
    fn test_operations_are_phase_checked() {
        let options = BuildOptions::new("missing/manifest.json");
        let mut cache = BuildCache::new();
        let mut build = ExtensionBuild::new(&options, &mut cache);

        let result = build.assemble(OutputGraph::new());
        assert!(matches!(
            result,
            Err(BuildError::Phase {
                operation: "assemble",
                phase: BuildPhase::Configuring
            })
        ));
        assert_eq!(build.phase(), BuildPhase::Configuring);
    }

    #[test]
    fn test_failed_configure_moves_to_failed() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let manifest = temp_dir.path().join("manifest.json");
        assert!(fs::write(&manifest, r#"{"manifest_version": 2}"#).is_ok());

        let options = BuildOptions::new(&manifest);
        let mut cache = BuildCache::new();
        let mut build = ExtensionBuild::new(&options, &mut cache);

        let result = build.configure();
        assert!(matches!(result, Err(BuildError::Validation { .. })));
        let Err(BuildError::Validation { count }) = result else {
            panic!("expected a validation error");
        };
        assert!(count >= 1);
        assert_eq!(build.phase(), BuildPhase::Failed);
        assert_eq!(build.report().warnings().count(), count);
        assert!(build.compile(&PassthroughCompiler::new(), &CompileRequest::default()).is_err());
    }

    #[test]
    fn test_empty_manifest_fails_after_placeholder() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let manifest = temp_dir.path().join("manifest.json");
        assert!(fs::write(
            &manifest,
            r#"{"manifest_version": 2, "name": "empty", "version": "1.0"}"#
        )
        .is_ok());

        let options = BuildOptions::new(&manifest);
        let mut cache = BuildCache::new();
        let mut build = ExtensionBuild::new(&options, &mut cache);

        let Ok(request) = build.configure() else {
            panic!("configure failed");
        };
        assert_eq!(request.entries.len(), 1);
        assert!(request.entries.contains_key(STUB_ENTRY));

        let compiler = PassthroughCompiler::new();
        let Ok(graph) = build.compile(&compiler, &request) else {
            panic!("compile failed");
        };
        assert!(matches!(build.assemble(graph), Err(BuildError::Invariant(_))));
        assert_eq!(build.phase(), BuildPhase::Failed);
    }

    #[test]
    fn test_asset_only_manifest_drops_placeholder() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let manifest = temp_dir.path().join("manifest.json");
        assert!(fs::write(
            &manifest,
            r#"{"manifest_version": 2, "name": "icons", "version": "1.0", "icons": {"16": "icon.png"}}"#
        )
        .is_ok());
        assert!(fs::write(temp_dir.path().join("icon.png"), "png").is_ok());

        let options = BuildOptions::new(&manifest);
        let mut cache = BuildCache::new();
        let mut build = ExtensionBuild::new(&options, &mut cache);

        let result = build.run(&PassthroughCompiler::new());
        let Ok(graph) = result else {
            panic!("build failed: {:?}", result.err());
        };
        assert_eq!(build.phase(), BuildPhase::Done);
        assert_eq!(graph.module_count(), 0);
        assert!(graph.get("icon.png").is_some());
        assert!(graph.get("manifest.json").is_some());
    }
}
