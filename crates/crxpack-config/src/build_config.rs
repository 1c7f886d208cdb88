use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "crxpack.toml";

/// Environment variable that points at an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "CRXPACK_CONFIG";

const DEFAULT_OUT_DIR: &str = "dist";
const DEFAULT_FORMAT: &str = "esm";

/// Error type for configuration loading
#[derive(Debug)]
pub enum ConfigError {
    /// The configuration file could not be read or written
    Io(PathBuf, std::io::Error),
    /// The configuration file is not valid TOML for [`BuildConfig`]
    Parse(PathBuf, String),
    /// The configuration could not be serialized
    Serialize(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, err) => {
                write!(f, "Failed to access config {}: {}", path.display(), err)
            }
            ConfigError::Parse(path, msg) => {
                write!(f, "Invalid config {}: {}", path.display(), msg)
            }
            ConfigError::Serialize(msg) => write!(f, "Failed to serialize config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Package metadata used as defaults for the emitted manifest
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Settings for the background dynamic-import wrapper
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WrapperConfig {
    /// Explicit event paths to capture (e.g. `runtime.onMessage`).
    /// Empty means the wrapper discovers events at runtime.
    #[serde(default)]
    pub wake_events: Vec<String>,
    /// Milliseconds to wait after the import settles before replaying
    #[serde(default)]
    pub event_delay: u64,
    /// API namespaces skipped during runtime discovery
    #[serde(default = "default_exclude_names")]
    pub exclude_names: Vec<String>,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        WrapperConfig {
            wake_events: Vec::new(),
            event_delay: 0,
            exclude_names: default_exclude_names(),
        }
    }
}

fn default_exclude_names() -> Vec<String> {
    vec!["extension".to_string()]
}

fn default_true() -> bool {
    true
}

/// Build configuration loaded from `crxpack.toml`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BuildConfig {
    /// Path to the manifest document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,
    /// Output directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,
    /// Default output module format (`esm`, `cjs` or `iife`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Report detected permissions
    #[serde(default = "default_true")]
    pub verbose: bool,
    /// Wrap content scripts in a dynamic-import loader
    #[serde(default = "default_true")]
    pub content_script_wrapper: bool,
    /// Stable extension key injected into the manifest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageConfig>,
    /// Top-level keys merged over the loaded manifest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extend_manifest: Option<toml::Table>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_import_wrapper: Option<WrapperConfig>,
    /// Output format name -> entry names emitted in that format
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub format_groups: BTreeMap<String, Vec<String>>,

    /// Runtime only - directory relative paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            manifest: None,
            out_dir: None,
            format: None,
            verbose: true,
            content_script_wrapper: true,
            public_key: None,
            package: None,
            extend_manifest: None,
            dynamic_import_wrapper: None,
            format_groups: BTreeMap::new(),
            base_dir: PathBuf::from("."),
        }
    }
}

impl BuildConfig {
    /// Locate the configuration file.
    ///
    /// Order: `CRXPACK_CONFIG`, `./crxpack.toml`, then the user config directory.
    /// Falls back to `./crxpack.toml` when none exists.
    pub fn path() -> PathBuf {
        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            let trimmed = env_path.trim();
            if !trimmed.is_empty() {
                return PathBuf::from(trimmed);
            }
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return local;
        }

        if let Some(user) = Self::user_config_path() {
            if user.exists() {
                return user;
            }
        }

        local
    }

    fn user_config_path() -> Option<PathBuf> {
        #[cfg(not(target_os = "windows"))]
        {
            dirs::home_dir().map(|h| h.join(".config").join("crxpack").join(CONFIG_FILE_NAME))
        }

        #[cfg(target_os = "windows")]
        {
            dirs::config_dir().map(|c| c.join("crxpack").join(CONFIG_FILE_NAME))
        }
    }

    /// Load configuration from the default location, returning defaults if missing
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path, returning defaults if missing
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        if !path.exists() {
            return Ok(BuildConfig {
                base_dir,
                ..BuildConfig::default()
            });
        }

        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let mut config: BuildConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        config.base_dir = base_dir;
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io(parent.to_path_buf(), e))?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        fs::write(path, content).map_err(|e| ConfigError::Io(path.to_path_buf(), e))
    }

    /// Manifest path resolved against the config directory
    pub fn manifest_path(&self) -> Option<PathBuf> {
        self.manifest.as_ref().map(|p| self.resolve(p))
    }

    /// Output directory resolved against the config directory
    pub fn out_dir(&self) -> PathBuf {
        let out_dir = self
            .out_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_DIR));
        self.resolve(&out_dir)
    }

    /// Default output format name
    pub fn format_name(&self) -> &str {
        self.format.as_deref().unwrap_or(DEFAULT_FORMAT)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let path = temp_dir.path().join(CONFIG_FILE_NAME);

        let config = BuildConfig::load_from_path(&path);
        assert!(config.is_ok());
        let config = config.unwrap_or_default();
        assert!(config.manifest.is_none());
        assert!(config.verbose);
        assert!(config.content_script_wrapper);
        assert_eq!(config.format_name(), "esm");
        assert_eq!(config.out_dir(), temp_dir.path().join("dist"));
    }

    #[test]
    fn test_parse_full_config() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        let content = r#"
manifest = "src/manifest.json"
out_dir = "build"
format = "esm"
public_key = "abc123"

[package]
name = "demo"
version = "1.2.3"

[extend_manifest]
short_name = "demo"

[dynamic_import_wrapper]
wake_events = ["runtime.onMessage"]
event_delay = 50

[format_groups]
iife = ["content"]
"#;
        assert!(fs::write(&path, content).is_ok());

        let config = BuildConfig::load_from_path(&path).unwrap_or_default();
        assert_eq!(
            config.manifest_path(),
            Some(temp_dir.path().join("src/manifest.json"))
        );
        assert_eq!(config.out_dir(), temp_dir.path().join("build"));
        assert_eq!(config.public_key.as_deref(), Some("abc123"));
        assert_eq!(
            config.package.as_ref().and_then(|p| p.version.as_deref()),
            Some("1.2.3")
        );
        assert!(config
            .extend_manifest
            .as_ref()
            .is_some_and(|t| t.contains_key("short_name")));

        let wrapper = config.dynamic_import_wrapper.clone().unwrap_or_default();
        assert_eq!(wrapper.wake_events, vec!["runtime.onMessage".to_string()]);
        assert_eq!(wrapper.event_delay, 50);
        assert_eq!(wrapper.exclude_names, vec!["extension".to_string()]);

        assert_eq!(
            config.format_groups.get("iife"),
            Some(&vec!["content".to_string()])
        );
    }

    #[test]
    fn test_invalid_toml_is_reported_with_path() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        assert!(fs::write(&path, "manifest = [").is_ok());

        let result = BuildConfig::load_from_path(&path);
        assert!(matches!(result, Err(ConfigError::Parse(ref p, _)) if p == &path));
    }

    #[test]
    fn test_save_and_reload() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let path = temp_dir.path().join("nested").join(CONFIG_FILE_NAME);
        let config = BuildConfig {
            manifest: Some(PathBuf::from("manifest.json")),
            public_key: Some("key".to_string()),
            ..BuildConfig::default()
        };

        assert!(config.save_to_path(&path).is_ok());
        let loaded = BuildConfig::load_from_path(&path).unwrap_or_default();
        assert_eq!(loaded.manifest, Some(PathBuf::from("manifest.json")));
        assert_eq!(loaded.public_key.as_deref(), Some("key"));
    }
}
