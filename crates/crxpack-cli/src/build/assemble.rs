//! The assembling phase.
//!
//! Runs after compilation, in this order:
//!
//! 1. drop the placeholder entry, then check the output is not empty and
//!    every script entry was compiled
//! 2. infer permissions (reusing the cached set when nothing changed)
//! 3. build the final manifest body and validate it
//! 4. wrap content scripts in loaders and expose what they import
//! 5. load all background scripts through one event-capturing import wrapper
//! 6. rename reserved output paths
//! 7. inject the public key
//! 8. emit `manifest.json`

use super::cache::PermissionChange;
use super::wrapper::{content_loader, import_wrapper};
use super::{ExtensionBuild, STUB_ENTRY};
use crate::errors::BuildError;
use crxpack_bundler::graph::split_extension;
use crxpack_bundler::{sanitize_file_names, ModuleFormat, OutputGraph};
use crxpack_manifest::{
    classify, entry_name, manifest_violations, merge_permissions, render_manifest, FileClass,
    ManifestBody,
};
use crxpack_scan::infer_permissions;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

const MANIFEST_FILE: &str = "manifest.json";

const LOADER_DIR: &str = "loaders";
const WRAPPER_DIR: &str = "wrappers";
const BACKGROUND_WRAPPER: &str = "background";
const ALL_URLS: &str = "<all_urls>";

impl ExtensionBuild<'_> {
    pub(super) fn assemble_output(
        &mut self,
        mut graph: OutputGraph,
    ) -> Result<OutputGraph, BuildError> {
        self.remove_stub(&mut graph);
        if graph.module_count() == 0 && graph.asset_count() == 0 {
            return Err(BuildError::Invariant(
                "the manifest references no scripts, pages or assets".to_string(),
            ));
        }
        self.check_entries(&graph)?;

        let permissions = self.permissions(&graph);

        let (mut body, version) = self.final_body(&permissions)?;

        if self.options.content_script_wrapper {
            wrap_content_scripts(&mut body, version, &mut graph)?;
        }
        self.wrap_background(&mut body, &mut graph)?;

        let renames = sanitize_file_names(&mut graph)?;
        if !renames.is_empty() {
            let mut value = Value::Object(body);
            rename_references(&mut value, &renames);
            body = match value {
                Value::Object(body) => body,
                _ => ManifestBody::new(),
            };
        }

        if let Some(key) = &self.options.public_key {
            body.insert("key".to_string(), Value::String(key.clone()));
        }

        let rendered = render_manifest(&body)?;
        graph.remove(MANIFEST_FILE);
        graph.emit_asset(MANIFEST_FILE, Some(MANIFEST_FILE), rendered.into_bytes())?;

        debug!(
            "Assembled {} module(s) and {} asset(s)",
            graph.module_count(),
            graph.asset_count()
        );
        Ok(graph)
    }

    fn remove_stub(&mut self, graph: &mut OutputGraph) {
        if !self.stubbed {
            return;
        }
        let stubs: Vec<String> = graph
            .modules()
            .filter(|module| module.name == STUB_ENTRY)
            .map(|module| module.file_name.clone())
            .collect();
        for file_name in stubs {
            graph.remove(&file_name);
        }
    }

    /// Every script entry of the manifest must have produced a module
    fn check_entries(&self, graph: &OutputGraph) -> Result<(), BuildError> {
        let Some(entries) = self.cache.entries() else {
            return Err(BuildError::Invariant(
                "no entry table was derived".to_string(),
            ));
        };
        for (name, path) in entries.iter() {
            if classify(&path.to_string_lossy()) != FileClass::Script {
                continue;
            }
            if graph.entry_module(name).is_none() {
                return Err(BuildError::Invariant(format!(
                    "entry \"{}\" ({}) produced no compiled output",
                    name,
                    path.display()
                )));
            }
        }
        Ok(())
    }

    fn permissions(&mut self, graph: &OutputGraph) -> BTreeSet<String> {
        if !self.cache.needs_permission_scan() {
            if let Some(permissions) = self.cache.permissions() {
                debug!("No sources changed, reusing {} permission(s)", permissions.len());
                return permissions.clone();
            }
        }

        let code: Vec<&str> = graph.modules().map(|module| module.code.as_str()).collect();
        let inferred = infer_permissions(&code);
        let change = self.cache.record_permissions(inferred.clone());
        if !self.options.verbose {
            return inferred;
        }

        match change {
            PermissionChange::First if !inferred.is_empty() => {
                self.report
                    .info(format!("Detected permissions: {}", join(&inferred)));
            }
            PermissionChange::Changed { added, removed } => {
                if !added.is_empty() {
                    self.report
                        .warn(format!("Detected new permissions: {}", join(&added)));
                }
                if !removed.is_empty() {
                    self.report.info(format!(
                        "Permissions no longer detected: {}",
                        join(&removed)
                    ));
                }
            }
            PermissionChange::First | PermissionChange::Unchanged => {}
        }
        inferred
    }

    /// Package defaults under the loaded body, with merged permissions.
    /// Every violation is reported before the build fails.
    fn final_body(
        &mut self,
        permissions: &BTreeSet<String>,
    ) -> Result<(ManifestBody, u64), BuildError> {
        let Some(manifest) = self.cache.manifest() else {
            return Err(BuildError::Invariant(
                "assembling without a loaded manifest".to_string(),
            ));
        };
        let version = manifest.manifest_version();
        let mut body = self.options.package.apply(&manifest.body);
        merge_permissions(&mut body, permissions);

        let violations = manifest_violations(&body)?;
        if !violations.is_empty() {
            return Err(self.validation_failure(&violations));
        }
        Ok((body, version))
    }

    fn wrap_background(
        &mut self,
        body: &mut ManifestBody,
        graph: &mut OutputGraph,
    ) -> Result<(), BuildError> {
        let options = self.options;
        let Some(config) = options.wrapper.as_ref() else {
            return Ok(());
        };
        let Some(background) = body.get_mut("background").and_then(Value::as_object_mut) else {
            return Ok(());
        };
        if background.contains_key("service_worker") {
            self.report.warn(
                "Service workers cannot import modules dynamically, the background wrapper is skipped for them",
            );
        }
        let Some(scripts) = background.get_mut("scripts").and_then(Value::as_array_mut) else {
            return Ok(());
        };

        let mut compiled = Vec::new();
        for reference in scripts.iter().filter_map(Value::as_str) {
            let (_, script) = compiled_entry(graph, reference)?;
            if !compiled.contains(&script) {
                compiled.push(script);
            }
        }
        if compiled.is_empty() {
            return Ok(());
        }

        let wrapper = graph.emit_module(
            &format!("{}-wrapper", BACKGROUND_WRAPPER),
            &format!("{}/{}.js", WRAPPER_DIR, BACKGROUND_WRAPPER),
            import_wrapper(&compiled, config),
            ModuleFormat::Esm,
        )?;
        debug!(
            "Wrapped {} background script(s) in {}",
            compiled.len(),
            wrapper
        );
        *scripts = vec![Value::String(wrapper)];
        Ok(())
    }
}

/// Replace every content script reference with a loader and expose the
/// scripts and their imports.
fn wrap_content_scripts(
    body: &mut ManifestBody,
    version: u64,
    graph: &mut OutputGraph,
) -> Result<(), BuildError> {
    let Some(blocks) = body.get_mut("content_scripts").and_then(Value::as_array_mut) else {
        return Ok(());
    };

    let mut loaders: BTreeMap<String, String> = BTreeMap::new();
    let mut exposed: BTreeSet<String> = BTreeSet::new();
    let mut matches: Vec<String> = Vec::new();

    for block in blocks.iter_mut() {
        for pattern in block
            .get("matches")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
        {
            if !matches.iter().any(|m| m == pattern) {
                matches.push(pattern.to_string());
            }
        }

        let Some(scripts) = block.get_mut("js").and_then(Value::as_array_mut) else {
            continue;
        };
        for item in scripts.iter_mut() {
            let Some(reference) = item.as_str() else {
                continue;
            };
            let (name, script) = compiled_entry(graph, reference)?;
            let loader = match loaders.get(&script) {
                Some(loader) => loader.clone(),
                None => {
                    let loader = graph.emit_module(
                        &format!("{}-loader", name),
                        &format!("{}/{}", LOADER_DIR, script),
                        content_loader(&script),
                        ModuleFormat::Esm,
                    )?;
                    loaders.insert(script.clone(), loader.clone());
                    loader
                }
            };
            exposed.insert(loader.clone());
            exposed.insert(script);
            *item = Value::String(loader);
        }
    }

    if loaders.is_empty() {
        return Ok(());
    }
    exposed.extend(graph.reachable_from_entries());
    expose_resources(body, version, &exposed, matches);
    Ok(())
}

/// Entry name and output path of the module compiled for a manifest reference
fn compiled_entry(graph: &OutputGraph, reference: &str) -> Result<(String, String), BuildError> {
    let normalized = reference.replace('\\', "/");
    let name = entry_name(normalized.trim_start_matches("./"));
    let module = graph.entry_module(&name).ok_or_else(|| {
        BuildError::Invariant(format!(
            "script \"{}\" produced no compiled output",
            reference
        ))
    })?;
    Ok((name, module.file_name.clone()))
}

/// Add resources to `web_accessible_resources` in the shape the manifest
/// version expects
fn expose_resources(
    body: &mut ManifestBody,
    version: u64,
    resources: &BTreeSet<String>,
    matches: Vec<String>,
) {
    let list = body
        .entry("web_accessible_resources")
        .or_insert_with(|| Value::Array(Vec::new()));
    if !list.is_array() {
        *list = Value::Array(Vec::new());
    }
    let Some(list) = list.as_array_mut() else {
        return;
    };

    if version >= 3 {
        let matches = if matches.is_empty() {
            vec![ALL_URLS.to_string()]
        } else {
            matches
        };
        list.push(json!({ "resources": resources, "matches": matches }));
    } else {
        for resource in resources {
            if !list.iter().any(|v| v.as_str() == Some(resource.as_str())) {
                list.push(Value::String(resource.clone()));
            }
        }
    }
}

/// Rewrite manifest strings naming a renamed output path
fn rename_references(value: &mut Value, renames: &BTreeMap<String, String>) {
    match value {
        Value::String(reference) => {
            let normalized = reference.trim_start_matches("./");
            let renamed = renames
                .get(normalized)
                .or_else(|| renames.get(&compiled_path(normalized)));
            if let Some(new) = renamed {
                reference.clone_from(new);
            }
        }
        Value::Array(items) => {
            for item in items {
                rename_references(item, renames);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                rename_references(item, renames);
            }
        }
        _ => {}
    }
}

/// Output path of a script source reference
fn compiled_path(reference: &str) -> String {
    let (stem, ext) = split_extension(reference);
    match ext {
        ".ts" | ".tsx" | ".jsx" | ".mts" | ".mjs" => format!("{}.js", stem),
        _ => reference.to_string(),
    }
}

fn join(names: &BTreeSet<String>) -> String {
    names.iter().cloned().collect::<Vec<_>>().join(", ")
}
