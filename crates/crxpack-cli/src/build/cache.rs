//! Incremental cache shared by the builds of one session.
//!
//! The cache holds the parsed manifest, the derived files and entry table,
//! the bytes of every asset read so far and the last inferred permission
//! set. A watch session owns one [`SharedCache`]; a build locks it for its
//! whole run and change notifications lock it to invalidate.

use crxpack_manifest::{DerivedFiles, EntryTable, LoadedManifest};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Cache handle shared between the build loop and the file watcher
pub type SharedCache = Arc<Mutex<BuildCache>>;

/// Counters for the work the cache saved or could not save
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Times the manifest was loaded and entries derived
    pub manifest_loads: usize,
    /// Times compiled output was scanned for permissions
    pub permission_scans: usize,
    /// Asset files read from disk
    pub asset_reads: usize,
}

/// How a freshly inferred permission set relates to the previous one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionChange {
    /// No earlier set in this manifest generation
    First,
    Unchanged,
    Changed {
        added: BTreeSet<String>,
        removed: BTreeSet<String>,
    },
}

#[derive(Debug)]
pub struct BuildCache {
    manifest: Option<LoadedManifest>,
    files: Option<DerivedFiles>,
    entries: Option<EntryTable>,
    assets: HashMap<PathBuf, Arc<Vec<u8>>>,
    permissions: Option<BTreeSet<String>>,
    sources_changed: bool,
    stats: CacheStats,
}

impl Default for BuildCache {
    fn default() -> Self {
        BuildCache {
            manifest: None,
            files: None,
            entries: None,
            assets: HashMap::new(),
            permissions: None,
            sources_changed: true,
            stats: CacheStats::default(),
        }
    }
}

impl BuildCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh cache behind a shared lock
    pub fn shared() -> SharedCache {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn manifest(&self) -> Option<&LoadedManifest> {
        self.manifest.as_ref()
    }

    pub fn files(&self) -> Option<&DerivedFiles> {
        self.files.as_ref()
    }

    pub fn entries(&self) -> Option<&EntryTable> {
        self.entries.as_ref()
    }

    /// Store the result of one manifest generation
    pub fn store_manifest(
        &mut self,
        manifest: LoadedManifest,
        files: DerivedFiles,
        entries: EntryTable,
    ) {
        self.manifest = Some(manifest);
        self.files = Some(files);
        self.entries = Some(entries);
        self.stats.manifest_loads += 1;
    }

    pub fn asset(&self, path: &Path) -> Option<Arc<Vec<u8>>> {
        self.assets.get(path).cloned()
    }

    pub fn store_asset(&mut self, path: PathBuf, source: Vec<u8>) -> Arc<Vec<u8>> {
        let source = Arc::new(source);
        self.assets.insert(path, Arc::clone(&source));
        self.stats.asset_reads += 1;
        source
    }

    /// Last inferred permission set, if any
    pub fn permissions(&self) -> Option<&BTreeSet<String>> {
        self.permissions.as_ref()
    }

    /// Whether compiled output may differ from the last scanned output
    pub fn needs_permission_scan(&self) -> bool {
        self.sources_changed || self.permissions.is_none()
    }

    /// Record a newly inferred permission set and compare it with the last one
    pub fn record_permissions(&mut self, permissions: BTreeSet<String>) -> PermissionChange {
        self.stats.permission_scans += 1;
        self.sources_changed = false;

        let change = match &self.permissions {
            None => PermissionChange::First,
            Some(previous) if *previous == permissions => PermissionChange::Unchanged,
            Some(previous) => PermissionChange::Changed {
                added: permissions.difference(previous).cloned().collect(),
                removed: previous.difference(&permissions).cloned().collect(),
            },
        };
        self.permissions = Some(permissions);
        change
    }

    /// Clear the parsed manifest, everything derived from it and the
    /// permission fingerprint
    pub fn invalidate_manifest(&mut self) {
        debug!("Invalidating cached manifest");
        self.manifest = None;
        self.files = None;
        self.entries = None;
        self.permissions = None;
        self.sources_changed = true;
    }

    /// Forget one file. Compiled output may change, so the next build
    /// rescans for permissions.
    pub fn invalidate_asset(&mut self, path: &Path) {
        debug!("Invalidating cached file {}", path.display());
        self.assets.retain(|cached, _| !same_file(cached, path));
        self.sources_changed = true;
    }

    /// Apply the invalidation rule for a changed file
    pub fn on_file_change(&mut self, path: &Path, manifest_path: &Path) {
        if same_file(path, manifest_path) {
            self.invalidate_manifest();
        } else {
            self.invalidate_asset(path);
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
