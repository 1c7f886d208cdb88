//! Output file name sanitation.
//!
//! Extension packages reserve names beginning with `_` (only `_locales` is
//! allowed at the root). Any such path segment is renamed, and the rename
//! is carried into import lists and into the text of every module, where
//! each specifier is rewritten relative to the module that contains it.

use crate::errors::BundlerError;
use crate::graph::{relative_specifier, split_extension, OutputGraph};
use regex::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Leading character reserved by the packaging format
pub const RESERVED_PREFIX: char = '_';

const ALLOWED_ROOT: &str = "_locales";

/// Whether an output path contains a reserved segment
pub fn is_reserved(path: &str) -> bool {
    path.split('/')
        .enumerate()
        .any(|(i, segment)| reserved_segment(i, segment))
}

fn reserved_segment(index: usize, segment: &str) -> bool {
    segment.starts_with(RESERVED_PREFIX) && !(index == 0 && segment == ALLOWED_ROOT)
}

fn clean_segment(segment: &str) -> String {
    let trimmed = segment.trim_start_matches(RESERVED_PREFIX);
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

fn clean_path(path: &str) -> String {
    path.split('/')
        .enumerate()
        .map(|(i, segment)| {
            if reserved_segment(i, segment) {
                clean_segment(segment)
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn unique_path(candidate: String, taken: &BTreeSet<String>) -> String {
    if !taken.contains(&candidate) {
        return candidate;
    }
    let (stem, ext) = split_extension(&candidate);
    let free = (1..)
        .map(|n| format!("{}-{}{}", stem, n, ext))
        .find(|path| !taken.contains(path));
    free.unwrap_or(candidate)
}

/// Rename every reserved output path in `graph`.
///
/// Returns the applied renames, old path -> new path.
pub fn sanitize_file_names(
    graph: &mut OutputGraph,
) -> Result<BTreeMap<String, String>, BundlerError> {
    let reserved: Vec<String> = graph
        .file_names()
        .filter(|name| is_reserved(name))
        .cloned()
        .collect();
    if reserved.is_empty() {
        return Ok(BTreeMap::new());
    }

    let mut taken: BTreeSet<String> = graph
        .file_names()
        .filter(|name| !is_reserved(name))
        .cloned()
        .collect();
    let mut renames = BTreeMap::new();
    for old in reserved {
        let new = unique_path(clean_path(&old), &taken);
        taken.insert(new.clone());
        renames.insert(old, new);
    }

    for (old, new) in &renames {
        graph.rename(old, new)?;
    }

    let previous: BTreeMap<&str, &str> = renames
        .iter()
        .map(|(old, new)| (new.as_str(), old.as_str()))
        .collect();

    for module in graph.modules_mut() {
        let importer = previous
            .get(module.file_name.as_str())
            .copied()
            .unwrap_or(module.file_name.as_str())
            .to_string();

        // root-relative references, as used by loaders and wrappers
        let mut replacements: BTreeMap<String, String> = BTreeMap::new();
        for (old, new) in &renames {
            replacements.insert(old.clone(), new.clone());
            replacements.insert(format!("/{}", old), format!("/{}", new));
        }
        // specifiers as written relative to this module
        for target in module.imports.iter().chain(module.dynamic_imports.iter()) {
            let renamed = renames.get(target).unwrap_or(target);
            let old_specifier = relative_specifier(&importer, target);
            let new_specifier = relative_specifier(&module.file_name, renamed);
            if old_specifier != new_specifier {
                replacements.insert(old_specifier, new_specifier);
            }
        }
        if let Some(code) = rewrite_quoted(&module.code, &replacements) {
            module.code = code;
        }

        for import in module
            .imports
            .iter_mut()
            .chain(module.dynamic_imports.iter_mut())
        {
            if let Some(new) = renames.get(import.as_str()) {
                import.clone_from(new);
            }
        }
    }

    debug!("Renamed {} reserved output path(s)", renames.len());
    Ok(renames)
}

/// Replace quoted string literals found in `replacements` in a single pass.
///
/// Returns `None` when nothing matched.
fn rewrite_quoted(code: &str, replacements: &BTreeMap<String, String>) -> Option<String> {
    if replacements.is_empty() {
        return None;
    }
    let alternatives: Vec<String> = replacements.keys().map(|key| regex::escape(key)).collect();
    let re = Regex::new(&format!(r#"(['"`])({})(['"`])"#, alternatives.join("|"))).ok()?;
    if !re.is_match(code) {
        return None;
    }
    let rewritten = re.replace_all(code, |caps: &Captures<'_>| {
        let literal = &caps[2];
        let new = replacements.get(literal).map_or(literal, String::as_str);
        format!("{}{}{}", &caps[1], new, &caps[3])
    });
    Some(rewritten.into_owned())
}
