//! Entry and asset derivation.
//!
//! Walks a validated manifest, collects every file it references, expands
//! glob patterns in the resource exposure list against the source root and
//! classifies the result by suffix.

use crate::errors::ManifestError;
use crate::types::{DerivedFiles, EntryTable, FileClass, LoadedManifest, ManifestBody};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

static SCRIPT_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\.(m?[jt]s|[jt]sx)$").ok());
static PAGE_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\.html?$").ok());
static STYLE_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\.css$").ok());
static IMAGE_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\.(jpe?g|png|svg|tiff?|gif|webp|bmp|ico)$").ok());

const GLOB_CHARS: &[char] = &['*', '?', '[', '{'];

fn matches(re: &Lazy<Option<Regex>>, path: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(path))
}

/// Classify a path by its suffix
pub fn classify(path: &str) -> FileClass {
    if matches(&SCRIPT_RE, path) {
        FileClass::Script
    } else if matches(&PAGE_RE, path) {
        FileClass::Page
    } else if matches(&STYLE_RE, path) {
        FileClass::Stylesheet
    } else if matches(&IMAGE_RE, path) {
        FileClass::Image
    } else {
        FileClass::Other
    }
}

/// Whether a reference contains glob syntax
pub fn is_glob(reference: &str) -> bool {
    reference.contains(GLOB_CHARS)
}

fn normalize(reference: &str) -> String {
    reference
        .replace('\\', "/")
        .trim_start_matches("./")
        .trim_start_matches('/')
        .to_string()
}

fn push_str(out: &mut Vec<String>, value: Option<&Value>) {
    if let Some(s) = value.and_then(Value::as_str) {
        out.push(s.to_string());
    }
}

fn push_list(out: &mut Vec<String>, value: Option<&Value>) {
    if let Some(list) = value.and_then(Value::as_array) {
        out.extend(list.iter().filter_map(Value::as_str).map(str::to_string));
    }
}

/// A flat reference or a size-keyed map of references
fn push_icon(out: &mut Vec<String>, value: Option<&Value>) {
    match value {
        Some(Value::String(s)) => out.push(s.clone()),
        Some(Value::Object(sizes)) => {
            out.extend(sizes.values().filter_map(Value::as_str).map(str::to_string));
        }
        _ => {}
    }
}

/// Content-script sources declared in the manifest
pub fn content_script_sources(body: &ManifestBody) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(scripts) = body.get("content_scripts").and_then(Value::as_array) {
        for script in scripts {
            push_list(&mut out, script.get("js"));
        }
    }
    out
}

/// Every raw reference the manifest makes, in collection order
fn collect_references(body: &ManifestBody) -> (Vec<String>, Vec<String>) {
    let mut refs = Vec::new();

    if let Some(background) = body.get("background") {
        push_list(&mut refs, background.get("scripts"));
        push_str(&mut refs, background.get("page"));
        push_str(&mut refs, background.get("service_worker"));
    }

    if let Some(scripts) = body.get("content_scripts").and_then(Value::as_array) {
        for script in scripts {
            push_list(&mut refs, script.get("js"));
            push_list(&mut refs, script.get("css"));
        }
    }

    push_str(&mut refs, body.get("options_page"));
    push_str(
        &mut refs,
        body.get("options_ui").and_then(|ui| ui.get("page")),
    );
    push_str(&mut refs, body.get("devtools_page"));

    for key in ["browser_action", "page_action", "action"] {
        if let Some(action) = body.get(key) {
            push_str(&mut refs, action.get("default_popup"));
            push_icon(&mut refs, action.get("default_icon"));
        }
    }

    if let Some(overrides) = body.get("chrome_url_overrides").and_then(Value::as_object) {
        refs.extend(overrides.values().filter_map(Value::as_str).map(str::to_string));
    }

    push_icon(&mut refs, body.get("icons"));

    let mut exposed = Vec::new();
    if let Some(resources) = body.get("web_accessible_resources").and_then(Value::as_array) {
        for resource in resources {
            match resource {
                Value::String(s) => exposed.push(s.clone()),
                Value::Object(_) => push_list(&mut exposed, resource.get("resources")),
                _ => {}
            }
        }
    }

    (refs, exposed)
}

fn compile_globset(patterns: &[&String]) -> Result<GlobSet, ManifestError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(&normalize(pattern))
            .literal_separator(true)
            .build()
            .map_err(|e| {
                ManifestError::Configuration(format!("Invalid glob \"{}\": {}", pattern, e))
            })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| ManifestError::Configuration(format!("Invalid glob set: {}", e)))
}

/// Expand glob references against `src_dir`, returning root-relative matches
pub fn expand_globs(src_dir: &Path, patterns: &[&String]) -> Result<Vec<String>, ManifestError> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }
    let set = compile_globset(patterns)?;

    let mut found = Vec::new();
    for entry in WalkDir::new(src_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let Ok(relative) = entry.path().strip_prefix(src_dir) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        if set.is_match(&relative) {
            found.push(relative);
        }
    }
    debug!(
        "Expanded {} glob pattern(s) to {} file(s)",
        patterns.len(),
        found.len()
    );
    Ok(found)
}

/// Derive the classified file list for a loaded manifest
pub fn derive_files(manifest: &LoadedManifest) -> Result<DerivedFiles, ManifestError> {
    let (mut refs, exposed) = collect_references(&manifest.body);

    let (globs, plain): (Vec<&String>, Vec<&String>) =
        exposed.iter().partition(|r| is_glob(r));
    refs.extend(plain.into_iter().cloned());
    refs.extend(expand_globs(&manifest.src_dir, &globs)?);

    let mut files = DerivedFiles::default();
    for reference in refs {
        let reference = normalize(&reference);
        if reference.is_empty() {
            continue;
        }
        let partition = match classify(&reference) {
            FileClass::Script => &mut files.js,
            FileClass::Page => &mut files.html,
            FileClass::Stylesheet => &mut files.css,
            FileClass::Image => &mut files.img,
            FileClass::Other => &mut files.others,
        };
        partition.insert(reference);
    }

    files.content_scripts = content_script_sources(&manifest.body)
        .iter()
        .map(|s| normalize(s))
        .collect();

    debug!(
        "Derived {} script, {} page, {} stylesheet, {} image and {} other file(s)",
        files.js.len(),
        files.html.len(),
        files.css.len(),
        files.img.len(),
        files.others.len()
    );
    Ok(files)
}

/// Build the entry table for derived scripts and pages
pub fn derive_entries(src_dir: &Path, files: &DerivedFiles) -> Result<EntryTable, ManifestError> {
    EntryTable::from_files(src_dir, files.inputs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn loaded(src_dir: &Path, body: Value) -> LoadedManifest {
        LoadedManifest {
            path: src_dir.join("manifest.json"),
            src_dir: src_dir.to_path_buf(),
            body: body.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_classify_by_suffix() {
        assert_eq!(classify("a.ts"), FileClass::Script);
        assert_eq!(classify("a.mjs"), FileClass::Script);
        assert_eq!(classify("a.tsx"), FileClass::Script);
        assert_eq!(classify("popup.html"), FileClass::Page);
        assert_eq!(classify("content.css"), FileClass::Stylesheet);
        assert_eq!(classify("icons/16.PNG"), FileClass::Image);
        assert_eq!(classify("fonts/a.woff2"), FileClass::Other);
        assert_eq!(classify("_locales/en/messages.json"), FileClass::Other);
    }

    #[test]
    fn test_derive_v2_manifest() {
        let src = PathBuf::from("/src");
        let manifest = loaded(
            &src,
            json!({
                "manifest_version": 2,
                "name": "demo",
                "version": "1.0",
                "background": {"scripts": ["background.ts"]},
                "content_scripts": [
                    {"matches": ["<all_urls>"], "js": ["content.ts"], "css": ["content.css"]},
                    {"matches": ["https://a.test/*"], "js": ["./content.ts"]}
                ],
                "browser_action": {"default_popup": "popup.html", "default_icon": "icon.png"},
                "options_page": "options.html",
                "icons": {"16": "icons/16.png", "48": "icons/48.png"},
                "web_accessible_resources": ["fonts/a.woff2"]
            }),
        );

        let Ok(files) = derive_files(&manifest) else {
            panic!("derive_files failed");
        };
        assert_eq!(
            files.js.iter().collect::<Vec<_>>(),
            vec!["background.ts", "content.ts"]
        );
        assert_eq!(
            files.html.iter().collect::<Vec<_>>(),
            vec!["options.html", "popup.html"]
        );
        assert_eq!(files.css.len(), 1);
        assert_eq!(files.img.len(), 3);
        assert_eq!(files.others.len(), 1);
        assert_eq!(files.class_count(), 5);
        assert_eq!(files.content_scripts.len(), 1);

        let Ok(entries) = derive_entries(&src, &files) else {
            panic!("derive_entries failed");
        };
        assert_eq!(
            entries.names().collect::<Vec<_>>(),
            vec!["background", "content", "options", "popup"]
        );
    }

    #[test]
    fn test_derive_v3_manifest() {
        let src = PathBuf::from("/src");
        let manifest = loaded(
            &src,
            json!({
                "manifest_version": 3,
                "name": "demo",
                "version": "1.0",
                "background": {"service_worker": "sw.js"},
                "action": {"default_popup": "popup.html", "default_icon": {"32": "i32.png"}},
                "options_ui": {"page": "settings.html"},
                "chrome_url_overrides": {"newtab": "newtab.html"},
                "web_accessible_resources": [{"resources": ["inject.js"], "matches": ["<all_urls>"]}]
            }),
        );

        let Ok(files) = derive_files(&manifest) else {
            panic!("derive_files failed");
        };
        assert!(files.js.contains("sw.js"));
        assert!(files.js.contains("inject.js"));
        assert!(files.html.contains("settings.html"));
        assert!(files.html.contains("newtab.html"));
        assert!(files.img.contains("i32.png"));
    }

    #[test]
    fn test_unset_references_are_dropped() {
        let src = PathBuf::from("/src");
        let manifest = loaded(
            &src,
            json!({
                "manifest_version": 2,
                "name": "demo",
                "version": "1.0",
                "browser_action": {"default_title": "no popup"},
                "background": {"persistent": false}
            }),
        );
        let files = derive_files(&manifest).unwrap_or_default();
        assert_eq!(files.class_count(), 0);
    }

    #[test]
    fn test_glob_resources_are_expanded() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let root = temp_dir.path();
        assert!(fs::create_dir_all(root.join("images/nested")).is_ok());
        assert!(fs::write(root.join("images/a.png"), b"a").is_ok());
        assert!(fs::write(root.join("images/b.svg"), b"b").is_ok());
        assert!(fs::write(root.join("images/nested/c.png"), b"c").is_ok());

        let manifest = loaded(
            root,
            json!({
                "manifest_version": 2,
                "name": "demo",
                "version": "1.0",
                "web_accessible_resources": ["images/*.png", "static/readme.txt"]
            }),
        );
        let Ok(files) = derive_files(&manifest) else {
            panic!("derive_files failed");
        };
        assert_eq!(files.img.iter().collect::<Vec<_>>(), vec!["images/a.png"]);
        assert!(files.others.contains("static/readme.txt"));
    }

    #[test]
    fn test_invalid_glob_is_a_configuration_error() {
        let src = PathBuf::from("/src");
        let manifest = loaded(
            &src,
            json!({"web_accessible_resources": ["images/[a-.png"]}),
        );
        assert!(matches!(
            derive_files(&manifest),
            Err(ManifestError::Configuration(_))
        ));
    }
}
