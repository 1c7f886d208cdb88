//! Integration tests for crxpack

use assert_cmd::{cargo::cargo_bin_cmd, Command};
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const CONFIG: &str = r#"
manifest = "src/manifest.json"
out_dir = "dist"
"#;

fn crxpack_cmd(dir: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("crxpack");
    cmd.env("CRXPACK_CONFIG", dir.join("crxpack.toml"))
        .env("NO_COLOR", "1")
        .current_dir(dir);
    cmd
}

fn write(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let _ = fs::write(path, content);
}

/// A project with a content script, a shared chunk and a background page
fn extension_project() -> Option<TempDir> {
    let dir = TempDir::new().ok()?;
    let root = dir.path();
    write(root, "crxpack.toml", CONFIG);
    write(
        root,
        "src/manifest.json",
        r#"{
  "manifest_version": 2,
  "name": "integration",
  "version": "0.1.0",
  "background": { "scripts": ["background.js"] },
  "content_scripts": [{ "matches": ["https://*.example.com/*"], "js": ["content.js"] }],
  "icons": { "48": "icon.png" }
}"#,
    );
    write(
        root,
        "src/background.js",
        "import { log } from './_util.js';\nchrome.bookmarks.getRecent(5, log);\n",
    );
    write(
        root,
        "src/content.js",
        "import { log } from './_util.js';\nlog(document.title);\n",
    );
    write(
        root,
        "src/_util.js",
        "export const log = (value) => console.log(value);\n",
    );
    write(root, "src/icon.png", "png");
    Some(dir)
}

#[test]
fn test_version() {
    let Ok(dir) = TempDir::new() else {
        return;
    };
    crxpack_cmd(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("crxpack"));
}

#[test]
fn test_help() {
    let Ok(dir) = TempDir::new() else {
        return;
    };
    crxpack_cmd(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("crxpack builds a browser extension from its manifest"));
}

#[test]
fn test_invalid_command() {
    let Ok(dir) = TempDir::new() else {
        return;
    };
    crxpack_cmd(dir.path())
        .arg("package")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_build_writes_extension() {
    let Some(dir) = extension_project() else {
        return;
    };
    crxpack_cmd(dir.path())
        .arg("build")
        .assert()
        .success()
        .stderr(predicate::str::contains("Detected permissions: bookmarks"))
        .stderr(predicate::str::contains("Built"));

    let dist = dir.path().join("dist");
    let manifest: Value = fs::read_to_string(dist.join("manifest.json"))
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or(Value::Null);

    assert_eq!(manifest["permissions"], serde_json::json!(["bookmarks"]));
    assert_eq!(
        manifest["content_scripts"][0]["js"],
        serde_json::json!(["loaders/content.js"])
    );
    assert!(manifest["web_accessible_resources"]
        .as_array()
        .is_some_and(|resources| resources.contains(&Value::from("content.js"))));
    assert!(!manifest.to_string().contains("_util"));

    assert!(dist.join("background.js").is_file());
    assert!(dist.join("content.js").is_file());
    assert!(dist.join("loaders/content.js").is_file());
    assert!(dist.join("icon.png").is_file());

    let chunks: Vec<String> = fs::read_dir(dist.join("chunks"))
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    assert_eq!(chunks.len(), 1);
    assert!(chunks.iter().all(|name| !name.starts_with('_')));
}

#[test]
fn test_build_out_dir_override() {
    let Some(dir) = extension_project() else {
        return;
    };
    crxpack_cmd(dir.path())
        .args(["build", "--out-dir", "package"])
        .assert()
        .success();
    assert!(dir.path().join("package/manifest.json").is_file());
    assert!(!dir.path().join("dist").exists());
}

#[test]
fn test_build_rejects_invalid_manifest() {
    let Ok(dir) = TempDir::new() else {
        return;
    };
    write(dir.path(), "crxpack.toml", CONFIG);
    write(
        dir.path(),
        "src/manifest.json",
        r#"{ "manifest_version": 2, "version": "1.0.0" }"#,
    );
    crxpack_cmd(dir.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("problem(s) with the extension manifest"));
    assert!(!dir.path().join("dist").exists());
}

#[test]
fn test_build_without_manifest_configured() {
    let Ok(dir) = TempDir::new() else {
        return;
    };
    crxpack_cmd(dir.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No manifest configured"));
}

#[test]
fn test_validate_valid_manifest() {
    let Some(dir) = extension_project() else {
        return;
    };
    crxpack_cmd(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stderr(predicate::str::contains("is valid (manifest version 2"));
}

#[test]
fn test_validate_reports_problems() {
    let Ok(dir) = TempDir::new() else {
        return;
    };
    write(
        dir.path(),
        "broken.json",
        r#"{ "manifest_version": 2, "name": "broken", "version": "1.0.0", "content_scripts": [{ "js": ["a.js"] }] }"#,
    );
    crxpack_cmd(dir.path())
        .args(["validate", "broken.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Validation failed"));
}

#[test]
fn test_permissions_scan() {
    let Ok(dir) = TempDir::new() else {
        return;
    };
    write(
        dir.path(),
        "scripts/storage.js",
        "chrome.storage.local.set({ key: 1 });\n",
    );
    write(dir.path(), "scripts/readme.txt", "chrome.cookies.getAll({})");
    crxpack_cmd(dir.path())
        .args(["permissions", "scripts"])
        .assert()
        .success()
        .stdout(predicate::str::contains("storage"))
        .stdout(predicate::str::contains("cookies").not());
}

#[test]
fn test_permissions_none_detected() {
    let Ok(dir) = TempDir::new() else {
        return;
    };
    write(dir.path(), "plain.js", "console.log('hello');\n");
    crxpack_cmd(dir.path())
        .args(["permissions", "plain.js"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_init_creates_config() {
    let Ok(dir) = TempDir::new() else {
        return;
    };
    crxpack_cmd(dir.path()).arg("init").assert().success();

    let content = fs::read_to_string(dir.path().join("crxpack.toml")).unwrap_or_default();
    assert!(content.contains("manifest = \"src/manifest.json\""));
}
