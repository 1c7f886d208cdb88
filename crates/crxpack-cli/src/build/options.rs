//! Resolved options for one build session

use crate::errors::BuildError;
use crxpack_bundler::{parse_format_groups, FormatGroups, ModuleFormat};
use crxpack_config::{BuildConfig, WrapperConfig};
use crxpack_manifest::{LoadOptions, ManifestBody, ManifestOverride, PackageDefaults};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const PACKAGE_JSON: &str = "package.json";

/// Everything the orchestrator needs to know about the build
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub manifest_path: PathBuf,
    pub out_dir: PathBuf,
    /// Default output format
    pub format: ModuleFormat,
    /// Report detected permissions
    pub verbose: bool,
    pub content_script_wrapper: bool,
    pub public_key: Option<String>,
    pub package: PackageDefaults,
    pub overrides: Option<ManifestOverride>,
    /// Background import wrapper; `None` disables it
    pub wrapper: Option<WrapperConfig>,
    pub format_groups: FormatGroups,
}

impl BuildOptions {
    /// Options with defaults for everything but the manifest path
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        BuildOptions {
            manifest_path: manifest_path.into(),
            out_dir: PathBuf::from("dist"),
            format: ModuleFormat::default(),
            verbose: true,
            content_script_wrapper: true,
            public_key: None,
            package: PackageDefaults::default(),
            overrides: None,
            wrapper: None,
            format_groups: FormatGroups::new(),
        }
    }

    /// Resolve options from a loaded `crxpack.toml`
    pub fn from_config(config: &BuildConfig) -> Result<Self, BuildError> {
        let manifest_path = config.manifest_path().ok_or_else(|| {
            BuildError::Configuration(
                "No manifest configured. Set `manifest` in crxpack.toml or pass --manifest"
                    .to_string(),
            )
        })?;

        let package = match &config.package {
            Some(package) => PackageDefaults {
                name: package.name.clone(),
                version: package.version.clone(),
                description: package.description.clone(),
            },
            None => read_package_json(&config.base_dir).unwrap_or_default(),
        };

        let overrides = match &config.extend_manifest {
            Some(table) => Some(ManifestOverride::Merge(toml_to_body(table)?)),
            None => None,
        };

        Ok(BuildOptions {
            manifest_path: absolute(manifest_path),
            out_dir: absolute(config.out_dir()),
            format: config.format_name().parse()?,
            verbose: config.verbose,
            content_script_wrapper: config.content_script_wrapper,
            public_key: config.public_key.clone(),
            package,
            overrides,
            wrapper: config.dynamic_import_wrapper.clone(),
            format_groups: parse_format_groups(&config.format_groups)?,
        })
    }

    /// Options for the manifest loader
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            overrides: self.overrides.clone(),
            package: self.package.clone(),
        }
    }

    /// Directory holding the manifest
    pub fn src_dir(&self) -> PathBuf {
        self.manifest_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

#[derive(Deserialize)]
struct PackageJson {
    name: Option<String>,
    version: Option<String>,
    description: Option<String>,
}

/// Package metadata from `package.json` in `dir`, if there is one
pub fn read_package_json(dir: &Path) -> Option<PackageDefaults> {
    let path = dir.join(PACKAGE_JSON);
    let content = fs::read_to_string(&path).ok()?;
    match serde_json::from_str::<PackageJson>(&content) {
        Ok(package) => Some(PackageDefaults {
            name: package.name,
            version: package.version,
            description: package.description,
        }),
        Err(e) => {
            debug!("Ignoring {}: {}", path.display(), e);
            None
        }
    }
}

fn toml_to_body(table: &toml::Table) -> Result<ManifestBody, BuildError> {
    match serde_json::to_value(table) {
        Ok(serde_json::Value::Object(body)) => Ok(body),
        Ok(_) => Err(BuildError::Configuration(
            "extend_manifest must be a table".to_string(),
        )),
        Err(e) => Err(BuildError::Configuration(format!(
            "extend_manifest cannot be converted: {}",
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_config_requires_manifest() {
        let config = BuildConfig::default();
        assert!(matches!(
            BuildOptions::from_config(&config),
            Err(BuildError::Configuration(_))
        ));
    }

    #[test]
    fn test_from_config_resolves_everything() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let content = r#"
manifest = "src/manifest.json"
format = "iife"
public_key = "KEY"

[extend_manifest]
short_name = "ext"

[format_groups]
esm = ["background"]
"#;
        let config_path = temp_dir.path().join("crxpack.toml");
        assert!(fs::write(&config_path, content).is_ok());
        assert!(fs::write(
            temp_dir.path().join("package.json"),
            r#"{"name": "from-package", "version": "2.0.0"}"#
        )
        .is_ok());

        let Ok(config) = BuildConfig::load_from_path(&config_path) else {
            panic!("load_from_path failed");
        };
        let Ok(options) = BuildOptions::from_config(&config) else {
            panic!("from_config failed");
        };

        assert_eq!(options.manifest_path, temp_dir.path().join("src/manifest.json"));
        assert_eq!(options.src_dir(), temp_dir.path().join("src"));
        assert_eq!(options.out_dir, temp_dir.path().join("dist"));
        assert_eq!(options.format, ModuleFormat::Iife);
        assert_eq!(options.public_key.as_deref(), Some("KEY"));
        assert_eq!(options.package.name.as_deref(), Some("from-package"));
        assert_eq!(options.format_groups.len(), 1);

        let body = options
            .overrides
            .map(|o| o.apply(ManifestBody::new()))
            .unwrap_or_default();
        assert_eq!(
            body.get("short_name").and_then(|v| v.as_str()),
            Some("ext")
        );
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let config = BuildConfig {
            manifest: Some(PathBuf::from("manifest.json")),
            format: Some("amd".to_string()),
            ..BuildConfig::default()
        };
        assert!(matches!(
            BuildOptions::from_config(&config),
            Err(BuildError::Bundler(_))
        ));
    }
}
