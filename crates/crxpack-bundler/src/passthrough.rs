//! Reference compiler that links modules without transforming them.
//!
//! It follows static and dynamic imports from each entry, gives every
//! module an output path and rewrites specifiers to point at those paths.
//! Bare specifiers stay external. Non-ESM output is only possible for
//! modules without static imports or exports.

use crate::compiler::{CompileRequest, Compiler, ModuleResolver, Resolution};
use crate::errors::BundlerError;
use crate::graph::{
    basename, content_hash, dirname, is_relative, join, relative_specifier, split_extension,
    Asset, Module, ModuleFormat, OutputGraph,
};
use crxpack_scan::{has_exports, rewrite_specifiers, scan_imports, ImportKind};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::Path;
use tracing::debug;

const RESOLVE_SUFFIXES: &[&str] = &[
    "",
    ".js",
    ".mjs",
    ".ts",
    ".tsx",
    ".jsx",
    "/index.js",
    "/index.ts",
];

/// A loaded module and the ids its specifiers resolved to
struct SourceModule {
    code: String,
    /// Specifier start offset -> (kind, resolved id)
    deps: BTreeMap<usize, (ImportKind, String)>,
}

/// Compiler that copies module text and links it
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCompiler;

impl PassthroughCompiler {
    pub fn new() -> Self {
        PassthroughCompiler
    }

    fn load(id: &str, resolver: Option<&dyn ModuleResolver>) -> Result<String, BundlerError> {
        if let Some(code) = resolver.and_then(|r| r.load(id)) {
            return Ok(code);
        }
        fs::read_to_string(id)
            .map_err(|e| BundlerError::Compile(format!("Could not load {}: {}", id, e)))
    }

    fn resolve(
        specifier: &str,
        importer: &str,
        resolver: Option<&dyn ModuleResolver>,
    ) -> Result<Option<String>, BundlerError> {
        if let Some(resolver) = resolver {
            match resolver.resolve(specifier, Some(importer)) {
                Resolution::Resolved(id) => return Ok(Some(id)),
                Resolution::External => return Ok(None),
                Resolution::Unhandled => {}
            }
        }

        if !is_relative(specifier) && !specifier.starts_with('/') {
            return Ok(None);
        }

        let base = join(dirname(&importer.replace('\\', "/")), specifier);
        let base = if importer.starts_with('/') && !base.starts_with('/') {
            format!("/{}", base)
        } else {
            base
        };
        RESOLVE_SUFFIXES
            .iter()
            .map(|suffix| format!("{}{}", base, suffix))
            .find(|candidate| Path::new(candidate).is_file())
            .map(Some)
            .ok_or_else(|| {
                BundlerError::Compile(format!(
                    "Could not resolve '{}' from {}",
                    specifier, importer
                ))
            })
    }

    fn resolve_entry(
        id: &str,
        resolver: Option<&dyn ModuleResolver>,
    ) -> Result<String, BundlerError> {
        match resolver.map(|r| r.resolve(id, None)) {
            Some(Resolution::Resolved(resolved)) => Ok(resolved),
            Some(Resolution::External) => Err(BundlerError::Compile(format!(
                "Entry module {} cannot be external",
                id
            ))),
            Some(Resolution::Unhandled) | None => Ok(id.to_string()),
        }
    }
}

/// Drop a `-<hash>` suffix left by an earlier pass so names do not grow
fn strip_hash_suffix(stem: &str) -> &str {
    match stem.rsplit_once('-') {
        Some((base, hash))
            if !base.is_empty()
                && hash.len() == 8
                && hash.bytes().all(|b| b.is_ascii_hexdigit()) =>
        {
            base
        }
        _ => stem,
    }
}

fn is_page(id: &str) -> bool {
    let lower = id.to_ascii_lowercase();
    lower.ends_with(".html") || lower.ends_with(".htm")
}

impl Compiler for PassthroughCompiler {
    fn compile(
        &self,
        request: &CompileRequest,
        resolver: Option<&dyn ModuleResolver>,
    ) -> Result<OutputGraph, BundlerError> {
        let mut graph = OutputGraph::new();
        let mut entry_names: BTreeMap<String, String> = BTreeMap::new();
        let mut queue: VecDeque<String> = VecDeque::new();

        for (name, id) in &request.entries {
            let id = Self::resolve_entry(id, resolver)?;
            if is_page(&id) {
                let source = fs::read(&id)?;
                graph.insert_asset(Asset {
                    file_name: format!("{}.html", name),
                    source,
                })?;
                continue;
            }
            entry_names.entry(id.clone()).or_insert_with(|| name.clone());
            queue.push_back(id);
        }

        let mut sources: BTreeMap<String, SourceModule> = BTreeMap::new();
        while let Some(id) = queue.pop_front() {
            if sources.contains_key(&id) {
                continue;
            }
            let code = Self::load(&id, resolver)?;
            let mut deps = BTreeMap::new();
            for spec in scan_imports(&code) {
                if let Some(dep) = Self::resolve(&spec.specifier, &id, resolver)? {
                    queue.push_back(dep.clone());
                    deps.insert(spec.range.start, (spec.kind, dep));
                }
            }
            sources.insert(id, SourceModule { code, deps });
        }

        let file_names: HashMap<&str, String> = sources
            .iter()
            .map(|(id, source)| {
                let file_name = match entry_names.get(id) {
                    Some(name) => format!("{}.js", name),
                    None => {
                        let normalized = id.replace('\\', "/");
                        let (stem, _) = split_extension(basename(&normalized));
                        let stem = strip_hash_suffix(stem);
                        let hash = content_hash(&[
                            request.format.to_string().as_bytes(),
                            id.as_bytes(),
                            source.code.as_bytes(),
                        ]);
                        format!("chunks/{}-{}.js", stem, hash)
                    }
                };
                (id.as_str(), file_name)
            })
            .collect();

        for (id, source) in &sources {
            let Some(file_name) = file_names.get(id.as_str()) else {
                continue;
            };
            let dep_file = |dep: &str| file_names.get(dep).cloned();

            let mut imports = Vec::new();
            let mut dynamic_imports = Vec::new();
            for (kind, dep) in source.deps.values() {
                if let Some(target) = dep_file(dep) {
                    match kind {
                        ImportKind::Static => imports.push(target),
                        ImportKind::Dynamic => dynamic_imports.push(target),
                    }
                }
            }

            if request.format != ModuleFormat::Esm {
                if !imports.is_empty() {
                    return Err(BundlerError::UnsupportedFormat(format!(
                        "{} output cannot contain static imports ({} imports {})",
                        request.format,
                        id,
                        imports.join(", ")
                    )));
                }
                if has_exports(&source.code) {
                    return Err(BundlerError::UnsupportedFormat(format!(
                        "{} output cannot contain exports ({} has an export statement)",
                        request.format, id
                    )));
                }
            }

            let code = rewrite_specifiers(&source.code, |spec| {
                source
                    .deps
                    .get(&spec.range.start)
                    .and_then(|(_, dep)| dep_file(dep))
                    .map(|target| relative_specifier(file_name, &target))
            });
            let code = match request.format {
                ModuleFormat::Iife => format!("(function () {{\n{}\n}})();\n", code.trim_end()),
                ModuleFormat::Esm | ModuleFormat::Cjs => code,
            };

            let name = match entry_names.get(id) {
                Some(name) => name.clone(),
                None => strip_hash_suffix(split_extension(basename(id)).0).to_string(),
            };
            graph.insert_module(Module {
                file_name: file_name.clone(),
                name,
                code,
                imports,
                dynamic_imports,
                is_entry: entry_names.contains_key(id),
                format: request.format,
            })?;
        }

        debug!(
            "Compiled {} entr(ies) into {} module(s) as {}",
            request.entries.len(),
            graph.module_count(),
            request.format
        );
        Ok(graph)
    }
}
