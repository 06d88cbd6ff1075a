//! Per-contract artifact cache.
//!
//! Operation catalogs and compiled schemas are expensive to build, so they are
//! cached by contract directory. Each entry remembers the fingerprint of the
//! contract files it was built from; a lookup whose current fingerprint
//! differs rebuilds the artifact. Artifacts are built outside the lock and
//! swapped in whole, so readers only ever see a complete artifact.

use crate::error::ContractError;
use glob::Pattern;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};

/// File extensions that make up a contract.
const CONTRACT_EXTENSIONS: [&str; 2] = ["wsdl", "xsd"];

/// One contract file as seen by the fingerprint.
///
/// The content digest catches rewrites that keep the length and land within
/// the filesystem's mtime granularity.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileStamp {
    relative_path: PathBuf,
    len: u64,
    modified: Option<SystemTime>,
    digest: blake3::Hash,
}

/// Identity of the contract files under a directory at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContractFingerprint {
    files: Vec<FileStamp>,
}

impl ContractFingerprint {
    /// Stamp and hash every `*.wsdl` and `*.xsd` file under `dir`.
    pub fn scan(dir: &Path) -> Result<Self, String> {
        let pattern = format!("{}/**/*", Pattern::escape(&dir.to_string_lossy()));
        let entries = glob::glob(&pattern).map_err(|e| e.to_string())?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| e.to_string())?;
            let is_contract_file = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| CONTRACT_EXTENSIONS.contains(&ext));
            if !is_contract_file {
                continue;
            }
            let metadata = std::fs::metadata(&path).map_err(|e| format!("{}: {}", path.display(), e))?;
            if !metadata.is_file() {
                continue;
            }
            let content = std::fs::read(&path).map_err(|e| format!("{}: {}", path.display(), e))?;
            files.push(FileStamp {
                relative_path: path.strip_prefix(dir).unwrap_or(&path).to_path_buf(),
                len: metadata.len(),
                modified: metadata.modified().ok(),
                digest: blake3::hash(&content),
            });
        }
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(Self { files })
    }

    /// Number of contract files covered.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

struct CacheEntry<T> {
    fingerprint: ContractFingerprint,
    value: Arc<T>,
}

/// Cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Fingerprint-checked cache of artifacts keyed by contract directory.
pub struct ArtifactCache<T> {
    name: &'static str,
    enabled: bool,
    entries: RwLock<HashMap<PathBuf, CacheEntry<T>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T> ArtifactCache<T> {
    /// Create a cache; `name` labels its log lines.
    pub fn new(name: &'static str, enabled: bool) -> Self {
        Self {
            name,
            enabled,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Return the cached artifact for `dir`, building it with `load` when
    /// there is none or the contract files changed.
    ///
    /// Failed builds are never cached.
    pub fn get_or_load<F>(&self, dir: &Path, load: F) -> Result<Arc<T>, ContractError>
    where
        F: FnOnce() -> Result<T, ContractError>,
    {
        if !self.enabled {
            return load().map(Arc::new);
        }

        let before = match ContractFingerprint::scan(dir) {
            Ok(fingerprint) => fingerprint,
            Err(reason) => {
                warn!(cache = self.name, dir = %dir.display(), reason = %reason, "Cannot fingerprint contract, not caching");
                return load().map(Arc::new);
            }
        };

        if let Some(entry) = self.entries.read().get(dir) {
            if entry.fingerprint == before {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(cache = self.name, dir = %dir.display(), "Cache hit");
                return Ok(Arc::clone(&entry.value));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(cache = self.name, dir = %dir.display(), "Cache miss");
        let value = Arc::new(load()?);

        // Files rewritten while building may have been read half old, half new.
        match ContractFingerprint::scan(dir) {
            Ok(after) if after == before => {
                self.entries.write().insert(
                    dir.to_path_buf(),
                    CacheEntry {
                        fingerprint: after,
                        value: Arc::clone(&value),
                    },
                );
            }
            _ => {
                debug!(cache = self.name, dir = %dir.display(), "Contract changed during build, not caching");
                self.entries.write().remove(dir);
            }
        }
        Ok(value)
    }

    /// Drop the entry for `dir`. Returns whether one existed.
    pub fn invalidate(&self, dir: &Path) -> bool {
        self.entries.write().remove(dir).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn contract_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("service.wsdl"), "<definitions/>").unwrap();
        fs::write(dir.path().join("types.xsd"), "<schema/>").unwrap();
        dir
    }

    #[test]
    fn test_fingerprint_covers_contract_files_only() {
        let dir = contract_dir();
        fs::create_dir(dir.path().join("common")).unwrap();
        fs::write(dir.path().join("common/base.xsd"), "<schema/>").unwrap();
        fs::write(dir.path().join("README.txt"), "notes").unwrap();

        let fingerprint = ContractFingerprint::scan(dir.path()).unwrap();
        assert_eq!(fingerprint.file_count(), 3);

        fs::write(dir.path().join("README.txt"), "changed notes").unwrap();
        assert_eq!(ContractFingerprint::scan(dir.path()).unwrap(), fingerprint);
    }

    #[test]
    fn test_fingerprint_changes_with_content_length() {
        let dir = contract_dir();
        let before = ContractFingerprint::scan(dir.path()).unwrap();
        fs::write(dir.path().join("types.xsd"), "<schema></schema>").unwrap();
        assert_ne!(ContractFingerprint::scan(dir.path()).unwrap(), before);
    }

    #[test]
    fn test_fingerprint_changes_with_same_length_rewrite() {
        let dir = contract_dir();
        let path = dir.path().join("types.xsd");
        fs::write(&path, "<schema a='1'/>").unwrap();
        let before = ContractFingerprint::scan(dir.path()).unwrap();
        let modified = fs::metadata(&path).unwrap().modified().unwrap();

        fs::write(&path, "<schema a='2'/>").unwrap();
        // Pin the mtime so only the content differs
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(modified)
            .unwrap();
        assert_ne!(ContractFingerprint::scan(dir.path()).unwrap(), before);
    }

    #[test]
    fn test_hit_after_first_load() {
        let dir = contract_dir();
        let cache = ArtifactCache::new("test", true);
        let loads = AtomicUsize::new(0);
        let load = || {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        };

        let first = cache.get_or_load(dir.path(), load).unwrap();
        let second = cache.get_or_load(dir.path(), load).unwrap();
        assert_eq!(*first, 42);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );
    }

    #[test]
    fn test_rebuild_after_contract_change() {
        let dir = contract_dir();
        let cache = ArtifactCache::new("test", true);
        cache.get_or_load(dir.path(), || Ok("old".to_string())).unwrap();

        fs::write(dir.path().join("types.xsd"), "<schema><!-- v2 --></schema>").unwrap();
        let value = cache.get_or_load(dir.path(), || Ok("new".to_string())).unwrap();
        assert_eq!(value.as_str(), "new");
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let dir = contract_dir();
        let cache: ArtifactCache<u32> = ArtifactCache::new("test", true);
        let err = cache
            .get_or_load(dir.path(), || Err(ContractError::SchemaCompile("bad".into())))
            .unwrap_err();
        assert!(matches!(err, ContractError::SchemaCompile(_)));
        assert!(cache.is_empty());
        assert_eq!(*cache.get_or_load(dir.path(), || Ok(7)).unwrap(), 7);
    }

    #[test]
    fn test_disabled_cache_always_loads() {
        let dir = contract_dir();
        let cache = ArtifactCache::new("test", false);
        let loads = AtomicUsize::new(0);
        for _ in 0..3 {
            cache
                .get_or_load(dir.path(), || {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(loads.load(Ordering::SeqCst), 3);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_and_clear() {
        let dir = contract_dir();
        let cache = ArtifactCache::new("test", true);
        cache.get_or_load(dir.path(), || Ok(1)).unwrap();
        assert!(cache.invalidate(dir.path()));
        assert!(!cache.invalidate(dir.path()));

        cache.get_or_load(dir.path(), || Ok(1)).unwrap();
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
