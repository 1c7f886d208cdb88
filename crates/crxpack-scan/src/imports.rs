//! Import specifier scanning for compiled ES modules.
//!
//! Finds the string specifiers of `import … from`, bare `import '…'`,
//! `export … from` and `import('…')` forms and records their byte ranges so
//! callers can rewrite them in place.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::ops::Range;

static STATIC_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r#"\b(?:import|export)\s*(?:[\w$*{}\s,]*?\s*\bfrom\s*)?(?:'([^'\n]+)'|"([^"\n]+)")"#,
    )
    .ok()
});

static DYNAMIC_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r#"\bimport\s*\(\s*(?:'([^'\n]+)'|"([^"\n]+)"|`([^`$\n]+)`)\s*\)"#).ok()
});

static EXPORT_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?m)(?:^|;)[ \t]*export\s*(?:[{*]|default\b|const\b|let\b|var\b|function\b|class\b|async\b)",
    )
    .ok()
});

/// How a module is imported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportKind {
    Static,
    Dynamic,
}

/// A specifier found in module text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpecifier {
    pub specifier: String,
    pub kind: ImportKind,
    /// Byte range of the specifier text, without quotes
    pub range: Range<usize>,
}

fn first_group(caps: &Captures<'_>) -> Option<(String, Range<usize>)> {
    (1..caps.len())
        .find_map(|i| caps.get(i))
        .map(|m| (m.as_str().to_string(), m.range()))
}

fn collect(re: &Lazy<Option<Regex>>, code: &str, kind: ImportKind, out: &mut Vec<ImportSpecifier>) {
    let Some(re) = re.as_ref() else {
        return;
    };
    for caps in re.captures_iter(code) {
        if let Some((specifier, range)) = first_group(&caps) {
            out.push(ImportSpecifier {
                specifier,
                kind,
                range,
            });
        }
    }
}

/// Every import specifier in `code`, in source order
pub fn scan_imports(code: &str) -> Vec<ImportSpecifier> {
    let mut found = Vec::new();
    collect(&STATIC_RE, code, ImportKind::Static, &mut found);
    collect(&DYNAMIC_RE, code, ImportKind::Dynamic, &mut found);
    found.sort_by_key(|s| s.range.start);
    found
}

/// Whether `code` has a top-level `export` statement
pub fn has_exports(code: &str) -> bool {
    EXPORT_RE.as_ref().is_some_and(|re| re.is_match(code))
}

/// Rewrite specifiers in place.
///
/// `replace` returns the new specifier, or `None` to keep the original.
pub fn rewrite_specifiers<F>(code: &str, mut replace: F) -> String
where
    F: FnMut(&ImportSpecifier) -> Option<String>,
{
    let mut out = String::with_capacity(code.len());
    let mut cursor = 0;
    for spec in scan_imports(code) {
        if let Some(replacement) = replace(&spec) {
            out.push_str(&code[cursor..spec.range.start]);
            out.push_str(&replacement);
            cursor = spec.range.end;
        }
    }
    out.push_str(&code[cursor..]);
    out
}
