//! Generated loader scripts.
//!
//! Both templates are parameterized by `%NAME%` placeholders which are
//! replaced with JSON literals. The content loader imports one script. The
//! import wrapper imports every script of a background context in order
//! behind a single capture/replay shim, so each event source is patched
//! exactly once.

use crxpack_config::WrapperConfig;
use serde::Serialize;

const CONTENT_LOADER: &str = include_str!("templates/content-loader.js");
const IMPORT_WRAPPER: &str = include_str!("templates/import-wrapper.js");

/// API namespace whose listeners cannot be intercepted safely
pub const ALWAYS_EXCLUDED: &str = "webRequest";

const NAMESPACE_PREFIXES: &[&str] = &["chrome.", "browser."];

fn literal<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Loader that dynamically imports the script at `script_path`.
///
/// `script_path` is relative to the extension root.
pub fn content_loader(script_path: &str) -> String {
    CONTENT_LOADER.replace("%PATH%", &literal(script_path))
}

/// Background wrapper that captures events until every script in
/// `script_paths` has been imported, in order
pub fn import_wrapper(script_paths: &[String], config: &WrapperConfig) -> String {
    IMPORT_WRAPPER
        .replace("%PATHS%", &literal(script_paths))
        .replace("%DELAY%", &config.event_delay.to_string())
        .replace("%EVENTS%", &literal(&wake_events(config)))
        .replace("%EXCLUDE%", &literal(&excluded_names(config)))
}

/// Event paths relative to the API root
pub fn wake_events(config: &WrapperConfig) -> Vec<String> {
    config
        .wake_events
        .iter()
        .map(|event| {
            let event = event.trim();
            NAMESPACE_PREFIXES
                .iter()
                .find_map(|prefix| event.strip_prefix(prefix))
                .unwrap_or(event)
                .to_string()
        })
        .filter(|event| !event.is_empty())
        .collect()
}

/// Namespaces skipped during discovery
pub fn excluded_names(config: &WrapperConfig) -> Vec<String> {
    let mut names: Vec<String> = config.exclude_names.clone();
    if !names.iter().any(|name| name == ALWAYS_EXCLUDED) {
        names.push(ALWAYS_EXCLUDED.to_string());
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command;
    use tempfile::TempDir;

    #[test]
    fn test_content_loader_imports_script() {
        let code = content_loader("scripts/content.js");
        assert!(code.contains(r#"const importPath = "scripts/content.js";"#));
        assert!(code.contains("chrome.runtime.getURL(importPath)"));
        assert!(!code.contains("%PATH%"));
    }

    #[test]
    fn test_import_wrapper_placeholders() {
        let config = WrapperConfig {
            wake_events: vec![
                "chrome.runtime.onMessage".to_string(),
                "tabs.onUpdated".to_string(),
            ],
            event_delay: 250,
            exclude_names: vec!["extension".to_string()],
        };
        let code = import_wrapper(&["background.js".to_string()], &config);

        assert!(code.contains(r#"const importPaths = ["background.js"];"#));
        assert!(code.contains("const delay = 250;"));
        assert!(code.contains(r#"const eventPaths = ["runtime.onMessage","tabs.onUpdated"];"#));
        assert!(code.contains(r#"const excludedNames = ["extension","webRequest"];"#));
        for placeholder in ["%PATHS%", "%DELAY%", "%EVENTS%", "%EXCLUDE%"] {
            assert!(!code.contains(placeholder), "{placeholder} left in wrapper");
        }
    }

    const REPLAY_HARNESS: &str = r#"
const path = require('path');
const { pathToFileURL } = require('url');

function makeEvent() {
  const listeners = [];
  return {
    addListener(listener) { listeners.push(listener); },
    removeListener(listener) {
      const index = listeners.indexOf(listener);
      if (index >= 0) listeners.splice(index, 1);
    },
    hasListener(listener) { return listeners.includes(listener); },
    dispatch(...args) {
      let result;
      for (const listener of [...listeners]) {
        const value = listener(...args);
        if (value !== undefined) result = value;
      }
      return result;
    },
    count() { return listeners.length; },
  };
}

const log = [];
const onMessage = makeEvent();
globalThis.log = log;
globalThis.chrome = {
  runtime: {
    onMessage,
    getURL: (file) => pathToFileURL(path.join(__dirname, file)).href,
  },
};

require('./wrapper.js');
const pending = onMessage.dispatch('e1');
log.push('capture e2 ' + onMessage.dispatch('e2', {}, (value) => log.push('respond ' + value)));
onMessage.dispatch('e3');
log.push('capture e1 ' + pending);

const started = Date.now();
const waitForRelease = () => {
  if (!log.includes('b e3') && Date.now() - started < 5000) {
    setTimeout(waitForRelease, 10);
    return;
  }
  onMessage.dispatch('live1');
  onMessage.addListener((message) => { log.push('c ' + message); });
  onMessage.dispatch('live2');
  console.log(JSON.stringify({ log, registered: onMessage.count() }));
};
waitForRelease();
"#;

    fn node_available() -> bool {
        Command::new("node")
            .arg("--version")
            .output()
            .is_ok_and(|output| output.status.success())
    }

    #[test]
    fn test_import_wrapper_replays_under_node() {
        if !node_available() {
            return;
        }
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let config = WrapperConfig {
            wake_events: vec!["chrome.runtime.onMessage".to_string()],
            ..WrapperConfig::default()
        };
        let wrapper = import_wrapper(&["a.mjs".to_string(), "b.mjs".to_string()], &config);
        for (name, content) in [
            ("wrapper.js", wrapper.as_str()),
            ("harness.cjs", REPLAY_HARNESS),
            (
                "a.mjs",
                "chrome.runtime.onMessage.addListener((m) => { log.push('a ' + m); });\n",
            ),
            (
                "b.mjs",
                "chrome.runtime.onMessage.addListener((m) => { log.push('b ' + m); });\n",
            ),
        ] {
            assert!(fs::write(temp_dir.path().join(name), content).is_ok());
        }

        let output = Command::new("node")
            .arg("harness.cjs")
            .current_dir(temp_dir.path())
            .output();
        let Ok(output) = output else {
            panic!("node could not be started");
        };
        assert!(
            output.status.success(),
            "{}",
            String::from_utf8_lossy(&output.stderr)
        );
        let Ok(result) = serde_json::from_slice::<serde_json::Value>(&output.stdout) else {
            panic!("unexpected output: {}", String::from_utf8_lossy(&output.stdout));
        };

        let expected = [
            "capture e2 true",
            "capture e1 undefined",
            "a e1",
            "b e1",
            "a e2",
            "b e2",
            "a e3",
            "b e3",
            "respond undefined",
            "a live1",
            "b live1",
            "a live2",
            "b live2",
            "c live2",
        ];
        assert_eq!(result["log"], serde_json::json!(expected));
        assert_eq!(result["registered"], serde_json::json!(3));
    }

    #[test]
    fn test_web_request_is_always_excluded_once() {
        let config = WrapperConfig {
            exclude_names: vec!["webRequest".to_string()],
            ..WrapperConfig::default()
        };
        assert_eq!(excluded_names(&config), vec!["webRequest".to_string()]);
        assert!(wake_events(&config).is_empty());
    }
}
