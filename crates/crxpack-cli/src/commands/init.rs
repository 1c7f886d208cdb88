use crate::logger;
use crate::GlobalOpts;
use colored::*;
use crxpack_config::CONFIG_FILE_NAME;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Skip the overwrite confirmation when set
pub const INIT_YES_ENV_VAR: &str = "CRXPACK_INIT_YES";

const CONFIG_TEMPLATE: &str = r#"# crxpack build configuration
# Relative paths are resolved against the directory of this file.

# Manifest document (JSON or YAML)
manifest = "src/manifest.json"

# Output directory
out_dir = "dist"

# Default output module format: esm, cjs or iife
format = "esm"

# Report detected permissions
verbose = true

# Load content scripts through a dynamic-import loader
content_script_wrapper = true

# Stable extension key injected into the manifest
# public_key = "MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEA..."

# Defaults for name, version and description.
# Without this table, package.json next to this file is used.
# [package]
# name = "my-extension"
# version = "1.0.0"
# description = "My browser extension"

# Top-level keys merged over the manifest
# [extend_manifest]
# short_name = "ext"

# Capture events until the background script has been imported
# [dynamic_import_wrapper]
# wake_events = ["runtime.onMessage"]
# event_delay = 0
# exclude_names = ["extension"]

# Entries emitted in a format other than the default
# [format_groups]
# iife = ["content"]
"#;

/// Write a configuration template
pub fn handle_init(filename: Option<String>, _opts: GlobalOpts) {
    logger::debug("Handling init command");

    let target_filename = filename.unwrap_or_else(|| CONFIG_FILE_NAME.to_string());
    let target_path = Path::new(&target_filename);

    logger::debug(&format!("Target file: {}", target_filename));

    if target_path.exists() {
        let should_skip = std::env::var(INIT_YES_ENV_VAR).is_ok();

        if !should_skip {
            print!(
                "{} File '{}' already exists. Overwrite? {} ",
                "?".bold().cyan(),
                target_filename,
                "[y/n] ›".dimmed()
            );
            let _ = io::stdout().flush();

            let mut response = String::new();
            if io::stdin().read_line(&mut response).is_ok() {
                let response = response.trim().to_lowercase();
                if response != "y" && response != "yes" {
                    logger::info("Operation cancelled by user");
                    println!("Operation cancelled.");
                    return;
                }
            } else {
                logger::error("Failed to read input");
                return;
            }
        } else {
            logger::debug(&format!("Skipping confirmation ({} set)", INIT_YES_ENV_VAR));
        }
    }

    match fs::write(&target_filename, CONFIG_TEMPLATE) {
        Ok(()) => {
            logger::success(&format!("Created config file: {}", target_filename));
            println!();
            println!("Next steps:");
            println!(
                "  1. Point `manifest` in {} at your manifest",
                target_filename.bold()
            );
            println!("  2. Check the manifest: crxpack validate");
            println!("  3. Build the extension: crxpack build");
            println!("  4. Rebuild on changes: crxpack build --watch");
        }
        Err(e) => {
            logger::error(&format!("Failed to create config file: {}", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crxpack_config::BuildConfig;

    #[test]
    fn test_template_is_a_valid_config() {
        let config: Result<BuildConfig, _> = toml::from_str(CONFIG_TEMPLATE);
        assert!(config.is_ok_and(|c| c.manifest.is_some() && c.content_script_wrapper));
    }

    #[test]
    fn test_template_documents_optional_tables() {
        for table in ["[package]", "[dynamic_import_wrapper]", "[format_groups]"] {
            assert!(CONFIG_TEMPLATE.contains(table), "{table} missing");
        }
    }
}
