//! Manifest serialization
//!
//! The emitted manifest always references compiled scripts, so any source
//! script extension surviving into the document is normalized to `.js`.

use crate::errors::ManifestError;
use crate::types::ManifestBody;
use once_cell::sync::Lazy;
use regex::Regex;

static SOURCE_EXTENSION_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#"\.[jt]sx?""#).ok());

/// Serialize a manifest body to pretty JSON with compiled script extensions
pub fn render_manifest(body: &ManifestBody) -> Result<String, ManifestError> {
    let json = serde_json::to_string_pretty(body)?;
    Ok(match SOURCE_EXTENSION_RE.as_ref() {
        Some(re) => re.replace_all(&json, ".js\"").into_owned(),
        None => json,
    })
}
