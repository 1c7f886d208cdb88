//! Output graph produced by a compilation pass

use crate::errors::BundlerError;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;

/// Output module format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ModuleFormat {
    #[default]
    Esm,
    Cjs,
    Iife,
}

impl FromStr for ModuleFormat {
    type Err = BundlerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "esm" | "es" | "module" => Ok(ModuleFormat::Esm),
            "cjs" | "commonjs" => Ok(ModuleFormat::Cjs),
            "iife" => Ok(ModuleFormat::Iife),
            other => Err(BundlerError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for ModuleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleFormat::Esm => "esm",
            ModuleFormat::Cjs => "cjs",
            ModuleFormat::Iife => "iife",
        };
        f.write_str(name)
    }
}

/// A compiled unit of code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Assigned output path
    pub file_name: String,
    /// Entry name for entries, source stem for chunks
    pub name: String,
    pub code: String,
    /// Output paths of statically imported modules
    pub imports: Vec<String>,
    /// Output paths of dynamically imported modules
    pub dynamic_imports: Vec<String>,
    pub is_entry: bool,
    pub format: ModuleFormat,
}

/// Raw content copied to the output without further structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub file_name: String,
    pub source: Vec<u8>,
}

/// One output artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputItem {
    Module(Module),
    Asset(Asset),
}

impl OutputItem {
    pub fn file_name(&self) -> &str {
        match self {
            OutputItem::Module(module) => &module.file_name,
            OutputItem::Asset(asset) => &asset.file_name,
        }
    }

    fn set_file_name(&mut self, file_name: String) {
        match self {
            OutputItem::Module(module) => module.file_name = file_name,
            OutputItem::Asset(asset) => asset.file_name = file_name,
        }
    }

    fn same_content(&self, other: &OutputItem) -> bool {
        match (self, other) {
            (OutputItem::Module(a), OutputItem::Module(b)) => a.code == b.code,
            (OutputItem::Asset(a), OutputItem::Asset(b)) => a.source == b.source,
            _ => false,
        }
    }
}

/// Every module and asset of a compilation, keyed by unique output path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputGraph {
    items: BTreeMap<String, OutputItem>,
}

impl OutputGraph {
    pub fn new() -> Self {
        OutputGraph::default()
    }

    /// Insert an item at its output path.
    ///
    /// Re-inserting identical content is a no-op; different content at a
    /// taken path is an error.
    pub fn insert(&mut self, item: OutputItem) -> Result<(), BundlerError> {
        let file_name = item.file_name().to_string();
        if let Some(existing) = self.items.get(&file_name) {
            if existing.same_content(&item) {
                return Ok(());
            }
            return Err(BundlerError::OutputCollision(file_name));
        }
        self.items.insert(file_name, item);
        Ok(())
    }

    pub fn insert_module(&mut self, module: Module) -> Result<(), BundlerError> {
        self.insert(OutputItem::Module(module))
    }

    pub fn insert_asset(&mut self, asset: Asset) -> Result<(), BundlerError> {
        self.insert(OutputItem::Asset(asset))
    }

    /// Register an opaque artifact and return its assigned path.
    ///
    /// Without an explicit `file_name` the path is
    /// `assets/<stem>-<hash><ext>` derived from `name` and the content.
    pub fn emit_asset(
        &mut self,
        name: &str,
        file_name: Option<&str>,
        source: Vec<u8>,
    ) -> Result<String, BundlerError> {
        let file_name = match file_name {
            Some(file_name) => normalize_path(file_name),
            None => {
                let base = basename(name);
                let (stem, ext) = split_extension(base);
                format!("assets/{}-{}{}", stem, content_hash(&[&source]), ext)
            }
        };
        self.insert_asset(Asset {
            file_name: file_name.clone(),
            source,
        })?;
        Ok(file_name)
    }

    /// Register a generated non-entry module at `file_name`
    pub fn emit_module(
        &mut self,
        name: &str,
        file_name: &str,
        code: String,
        format: ModuleFormat,
    ) -> Result<String, BundlerError> {
        let file_name = normalize_path(file_name);
        let dynamic_imports = crxpack_scan::scan_imports(&code)
            .into_iter()
            .filter(|s| s.kind == crxpack_scan::ImportKind::Dynamic)
            .filter(|s| is_relative(&s.specifier))
            .map(|s| join(dirname(&file_name), &s.specifier))
            .collect();
        self.insert_module(Module {
            file_name: file_name.clone(),
            name: name.to_string(),
            code,
            imports: Vec::new(),
            dynamic_imports,
            is_entry: false,
            format,
        })?;
        Ok(file_name)
    }

    pub fn get(&self, file_name: &str) -> Option<&OutputItem> {
        self.items.get(file_name)
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.items.contains_key(file_name)
    }

    pub fn get_module(&self, file_name: &str) -> Option<&Module> {
        match self.items.get(file_name) {
            Some(OutputItem::Module(module)) => Some(module),
            _ => None,
        }
    }

    pub fn get_module_mut(&mut self, file_name: &str) -> Option<&mut Module> {
        match self.items.get_mut(file_name) {
            Some(OutputItem::Module(module)) => Some(module),
            _ => None,
        }
    }

    pub fn remove(&mut self, file_name: &str) -> Option<OutputItem> {
        self.items.remove(file_name)
    }

    pub fn items(&self) -> impl Iterator<Item = &OutputItem> {
        self.items.values()
    }

    pub fn file_names(&self) -> impl Iterator<Item = &String> {
        self.items.keys()
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.items.values().filter_map(|item| match item {
            OutputItem::Module(module) => Some(module),
            OutputItem::Asset(_) => None,
        })
    }

    pub fn modules_mut(&mut self) -> impl Iterator<Item = &mut Module> {
        self.items.values_mut().filter_map(|item| match item {
            OutputItem::Module(module) => Some(module),
            OutputItem::Asset(_) => None,
        })
    }

    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.items.values().filter_map(|item| match item {
            OutputItem::Asset(asset) => Some(asset),
            OutputItem::Module(_) => None,
        })
    }

    /// Entry modules in output-path order
    pub fn entries(&self) -> impl Iterator<Item = &Module> {
        self.modules().filter(|module| module.is_entry)
    }

    /// The entry module emitted for a logical entry name
    pub fn entry_module(&self, name: &str) -> Option<&Module> {
        self.entries().find(|module| module.name == name)
    }

    /// Remove every module, keeping assets
    pub fn take_modules(&mut self) -> Vec<Module> {
        let names: Vec<String> = self.modules().map(|m| m.file_name.clone()).collect();
        names
            .iter()
            .filter_map(|name| match self.items.remove(name) {
                Some(OutputItem::Module(module)) => Some(module),
                _ => None,
            })
            .collect()
    }

    /// Move an item to a new output path
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), BundlerError> {
        if self.items.contains_key(to) {
            return Err(BundlerError::OutputCollision(to.to_string()));
        }
        let Some(mut item) = self.items.remove(from) else {
            return Err(BundlerError::EntryNotFound(from.to_string()));
        };
        item.set_file_name(to.to_string());
        self.items.insert(to.to_string(), item);
        Ok(())
    }

    /// Non-entry modules reachable from any entry through static or dynamic imports
    pub fn reachable_from_entries(&self) -> BTreeSet<String> {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<&str> = self.entries().map(|m| m.file_name.as_str()).collect();

        while let Some(file_name) = queue.pop_front() {
            let Some(module) = self.get_module(file_name) else {
                continue;
            };
            for dep in module.imports.iter().chain(module.dynamic_imports.iter()) {
                if seen.insert(dep.clone()) {
                    queue.push_back(dep);
                }
            }
        }

        seen.into_iter()
            .filter(|name| self.get_module(name).is_some_and(|m| !m.is_entry))
            .collect()
    }

    pub fn module_count(&self) -> usize {
        self.modules().count()
    }

    pub fn asset_count(&self) -> usize {
        self.assets().count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Short content hash used in generated file names
pub fn content_hash(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
        hasher.update([0u8]);
    }
    let digest = hex::encode(hasher.finalize());
    digest[..8].to_string()
}

// =============================================================================
// POSIX PATH HELPERS
// =============================================================================

/// Whether a specifier is relative to its importer
pub fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../")
}

/// Directory part of a `/`-separated path ("" at the root)
pub fn dirname(path: &str) -> &str {
    path.rfind('/').map_or("", |i| &path[..i])
}

/// Final segment of a `/`-separated path
pub fn basename(path: &str) -> &str {
    path.rfind('/').map_or(path, |i| &path[i + 1..])
}

/// Split `name.ext` into (`name`, `.ext`)
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    }
}

/// Collapse `.` and `..` segments and backslashes
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Resolve `specifier` against directory `base`
pub fn join(base: &str, specifier: &str) -> String {
    if base.is_empty() {
        normalize_path(specifier)
    } else {
        normalize_path(&format!("{}/{}", base, specifier))
    }
}

/// Relative specifier from the module at `from` to the file at `to`
pub fn relative_specifier(from: &str, to: &str) -> String {
    let from_dir: Vec<&str> = dirname(from).split('/').filter(|s| !s.is_empty()).collect();
    let to_parts: Vec<&str> = to.split('/').filter(|s| !s.is_empty()).collect();

    let common = from_dir
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let ups = from_dir.len() - common;
    let rest = to_parts[common..].join("/");
    if ups == 0 {
        format!("./{}", rest)
    } else {
        format!("{}{}", "../".repeat(ups), rest)
    }
}
