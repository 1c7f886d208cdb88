//! Permission detector table.
//!
//! Each detector is a pure test over compiled text for one capability.
//! Detectors are independent: inference is the union of every detector that
//! matches any module, so adding code can only add permissions.
//!
//! Namespace aliases (`chrome`, `chromep`, `browser`) are treated alike.

use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::debug;

/// A capability name paired with its text test
#[derive(Clone, Copy)]
pub struct PermissionDetector {
    pub name: &'static str,
    test: fn(&str) -> bool,
}

impl PermissionDetector {
    /// Whether this capability is required by `code`
    pub fn matches(&self, code: &str) -> bool {
        (self.test)(code)
    }
}

impl std::fmt::Debug for PermissionDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionDetector")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn is_match(re: &Lazy<Option<Regex>>, code: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(code))
}

/// Define a test for `<namespace>.<api>` usage
macro_rules! api_test {
    ($name:ident, $api:literal) => {
        fn $name(code: &str) -> bool {
            static RE: Lazy<Option<Regex>> = Lazy::new(|| {
                Regex::new(concat!(r"\b(?:chromep?|browser)\s*\.\s*", $api, r"\b")).ok()
            });
            is_match(&RE, code)
        }
    };
}

/// Define a test for a pattern that is not namespaced
macro_rules! text_test {
    ($name:ident, $pattern:literal) => {
        fn $name(code: &str) -> bool {
            static RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new($pattern).ok());
            is_match(&RE, code)
        }
    };
}

api_test!(alarms, "alarms");
api_test!(bookmarks, "bookmarks");
api_test!(content_settings, "contentSettings");
api_test!(context_menus, "contextMenus");
api_test!(cookies, "cookies");
api_test!(debugger, "debugger");
api_test!(declarative_content, "declarativeContent");
api_test!(declarative_net_request, "declarativeNetRequest");
api_test!(declarative_web_request, "declarativeWebRequest");
api_test!(desktop_capture, "desktopCapture");
api_test!(downloads, "downloads");
api_test!(font_settings, "fontSettings");
api_test!(gcm, "gcm");
api_test!(history, "history");
api_test!(identity, "identity");
api_test!(idle, "idle");
api_test!(management, "management");
api_test!(
    native_messaging,
    r"runtime\s*\.\s*(?:connectNative|sendNativeMessage)"
);
api_test!(notifications, "notifications");
api_test!(page_capture, "pageCapture");
api_test!(power, "power");
api_test!(printer_provider, "printerProvider");
api_test!(privacy, "privacy");
api_test!(proxy, "proxy");
api_test!(sessions, "sessions");
api_test!(storage, "storage");
api_test!(system_cpu, r"system\s*\.\s*cpu");
api_test!(system_display, r"system\s*\.\s*display");
api_test!(system_memory, r"system\s*\.\s*memory");
api_test!(system_storage, r"system\s*\.\s*storage");
api_test!(tab_capture, "tabCapture");
api_test!(top_sites, "topSites");
api_test!(tts, "tts");
api_test!(tts_engine, "ttsEngine");
api_test!(web_navigation, "webNavigation");
api_test!(web_request, "webRequest");

text_test!(geolocation, r"\bnavigator\s*\.\s*geolocation\b");
text_test!(
    clipboard_read,
    r#"\bexecCommand\s*\(\s*['"`]paste['"`]"#
);
text_test!(
    clipboard_write,
    r#"\bexecCommand\s*\(\s*['"`](?:copy|cut)['"`]"#
);

/// Blocking mode implies the broader capability plus the `blocking` option
fn web_request_blocking(code: &str) -> bool {
    web_request(code) && (code.contains("'blocking'") || code.contains("\"blocking\""))
}

macro_rules! detector {
    ($name:literal, $test:ident) => {
        PermissionDetector {
            name: $name,
            test: $test,
        }
    };
}

/// Every known permission detector
pub static DETECTORS: &[PermissionDetector] = &[
    detector!("alarms", alarms),
    detector!("bookmarks", bookmarks),
    detector!("clipboardRead", clipboard_read),
    detector!("clipboardWrite", clipboard_write),
    detector!("contentSettings", content_settings),
    detector!("contextMenus", context_menus),
    detector!("cookies", cookies),
    detector!("debugger", debugger),
    detector!("declarativeContent", declarative_content),
    detector!("declarativeNetRequest", declarative_net_request),
    detector!("declarativeWebRequest", declarative_web_request),
    detector!("desktopCapture", desktop_capture),
    detector!("downloads", downloads),
    detector!("fontSettings", font_settings),
    detector!("gcm", gcm),
    detector!("geolocation", geolocation),
    detector!("history", history),
    detector!("identity", identity),
    detector!("idle", idle),
    detector!("management", management),
    detector!("nativeMessaging", native_messaging),
    detector!("notifications", notifications),
    detector!("pageCapture", page_capture),
    detector!("power", power),
    detector!("printerProvider", printer_provider),
    detector!("privacy", privacy),
    detector!("proxy", proxy),
    detector!("sessions", sessions),
    detector!("storage", storage),
    detector!("system.cpu", system_cpu),
    detector!("system.display", system_display),
    detector!("system.memory", system_memory),
    detector!("system.storage", system_storage),
    detector!("tabCapture", tab_capture),
    detector!("topSites", top_sites),
    detector!("tts", tts),
    detector!("ttsEngine", tts_engine),
    detector!("webNavigation", web_navigation),
    detector!("webRequest", web_request),
    detector!("webRequestBlocking", web_request_blocking),
];

/// Capabilities required by a single piece of compiled text
pub fn detect_permissions(code: &str) -> Vec<&'static str> {
    DETECTORS
        .iter()
        .filter(|detector| detector.matches(code))
        .map(|detector| detector.name)
        .collect()
}

/// Union of capabilities required by every module text, scanned in parallel
pub fn infer_permissions<S>(modules: &[S]) -> BTreeSet<String>
where
    S: AsRef<str> + Sync,
{
    let found: BTreeSet<String> = modules
        .par_iter()
        .flat_map_iter(|code| detect_permissions(code.as_ref()))
        .map(str::to_string)
        .collect();
    debug!(
        "Scanned {} module(s), {} permission(s) detected",
        modules.len(),
        found.len()
    );
    found
}
