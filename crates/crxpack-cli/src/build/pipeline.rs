//! Running builds against a shared cache and writing their output

use super::cache::SharedCache;
use super::diagnostics::BuildReport;
use super::options::BuildOptions;
use super::ExtensionBuild;
use crate::errors::BuildError;
use crxpack_bundler::{Compiler, OutputGraph, OutputItem};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Outcome of one build: the diagnostics are kept even when it failed
#[derive(Debug)]
pub struct BuildRun {
    pub report: BuildReport,
    pub result: Result<OutputGraph, BuildError>,
}

impl BuildRun {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run one complete build.
///
/// The cache stays locked for the whole build, so invalidations from a
/// watcher land either before or after it.
pub fn build_once(compiler: &dyn Compiler, options: &BuildOptions, cache: &SharedCache) -> BuildRun {
    let mut guard = cache.lock();
    let mut build = ExtensionBuild::new(options, &mut guard);
    let result = build.run(compiler);
    BuildRun {
        report: build.into_report(),
        result,
    }
}

/// Write every output item below `out_dir`.
///
/// A file that cannot be written is reported as a warning. Returns the
/// number of files written.
pub fn write_output(graph: &OutputGraph, out_dir: &Path, report: &mut BuildReport) -> usize {
    let mut written = 0;
    for item in graph.items() {
        let path = out_dir.join(item.file_name());
        let content: &[u8] = match item {
            OutputItem::Module(module) => module.code.as_bytes(),
            OutputItem::Asset(asset) => &asset.source,
        };
        let result = match path.parent() {
            Some(parent) => fs::create_dir_all(parent).and_then(|()| fs::write(&path, content)),
            None => fs::write(&path, content),
        };
        match result {
            Ok(()) => written += 1,
            Err(e) => report.warn(format!("Failed to write {}: {}", path.display(), e)),
        }
    }
    debug!("Wrote {} file(s) to {}", written, out_dir.display());
    written
}
