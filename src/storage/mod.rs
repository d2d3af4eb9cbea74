//! Session-scoped, write-once artifact storage
//!
//! Keys are relative, `/`-separated paths such as
//! `reports/brand_report_v001.md`. A key is written at most once: storing
//! to an existing key fails with `ArtifactExists` and leaves the stored
//! bytes untouched. Versioned artifacts get a fresh key instead.

use crate::{BrandTraceError, BrandTraceResult};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Durable blob store scoped to one session
pub trait ArtifactStore: Send + Sync {
    /// Human-readable location of the store (directory, or `memory:<scope>`)
    fn location(&self) -> String;

    /// Store `bytes` under a key that must not exist yet. Returns the
    /// artifact's full location.
    fn put_new(&self, key: &str, bytes: &[u8]) -> BrandTraceResult<String>;

    fn get(&self, key: &str) -> BrandTraceResult<Vec<u8>>;

    /// Keys starting with `prefix`, sorted
    fn list(&self, prefix: &str) -> BrandTraceResult<Vec<String>>;
}

fn validate_key(key: &str) -> BrandTraceResult<()> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(BrandTraceError::Storage(format!("invalid artifact key '{}'", key)));
    }
    Ok(())
}

// ─── Versioning ────────────────────────────────────────────────────

/// `dir/stem_vNNN.ext`
pub fn versioned_key(dir: &str, stem: &str, version: u32, ext: &str) -> String {
    format!("{}/{}_v{:03}.{}", dir, stem, version, ext)
}

/// One greater than the highest `dir/stem_vNNN.*` version present
pub fn next_version(store: &dyn ArtifactStore, dir: &str, stem: &str) -> BrandTraceResult<u32> {
    let prefix = format!("{}/{}_v", dir, stem);
    let highest = store
        .list(&prefix)?
        .iter()
        .filter_map(|key| {
            let rest = key.strip_prefix(&prefix)?;
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            let tail = &rest[digits.len()..];
            if tail.starts_with('.') {
                digits.parse::<u32>().ok()
            } else {
                None
            }
        })
        .max()
        .unwrap_or(0);
    Ok(highest + 1)
}

// ─── Filesystem ────────────────────────────────────────────────────

/// Store rooted at `<root>/session_<id>/`
#[derive(Debug)]
pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    /// Create a fresh session directory. Refuses to reuse an existing one so
    /// that no two sessions ever share a path.
    pub fn create(root: &Path, session_id: &str) -> BrandTraceResult<Self> {
        fs::create_dir_all(root)?;
        let dir = root.join(format!("session_{}", session_id));
        match fs::create_dir(&dir) {
            Ok(()) => {
                tracing::debug!("Created session storage {}", dir.display());
                Ok(Self { dir })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(BrandTraceError::Storage(
                format!("session directory {} already exists", dir.display()),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Reopen an existing session directory, e.g. for audit
    pub fn open(dir: &Path) -> BrandTraceResult<Self> {
        if !dir.is_dir() {
            return Err(BrandTraceError::Storage(format!(
                "{} is not a session directory",
                dir.display()
            )));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactStore for FsArtifactStore {
    fn location(&self) -> String {
        self.dir.display().to_string()
    }

    fn put_new(&self, key: &str, bytes: &[u8]) -> BrandTraceResult<String> {
        validate_key(key)?;
        let path = self.dir.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(BrandTraceError::ArtifactExists(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if let Err(e) = file.write_all(bytes).and_then(|_| file.sync_all()) {
            // Do not leave a truncated artifact behind
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }
        Ok(path.display().to_string())
    }

    fn get(&self, key: &str) -> BrandTraceResult<Vec<u8>> {
        validate_key(key)?;
        let path = self.dir.join(key);
        fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                BrandTraceError::Storage(format!("artifact '{}' not found", key))
            }
            _ => e.into(),
        })
    }

    fn list(&self, prefix: &str) -> BrandTraceResult<Vec<String>> {
        let (sub, name_prefix) = match prefix.rsplit_once('/') {
            Some((sub, name)) => (Some(sub), name),
            None => (None, prefix),
        };
        let dir = match sub {
            Some(sub) => {
                validate_key(sub)?;
                self.dir.join(sub)
            }
            None => self.dir.clone(),
        };
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(name_prefix) {
                keys.push(match sub {
                    Some(sub) => format!("{}/{}", sub, name),
                    None => name,
                });
            }
        }
        keys.sort();
        Ok(keys)
    }
}

// ─── In-memory ─────────────────────────────────────────────────────

/// Process-local store with the same write-once rules, for tests and
/// embedding callers that persist elsewhere
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    scope: String,
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            blobs: Mutex::new(BTreeMap::new()),
        }
    }

    fn blobs(&self) -> BrandTraceResult<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.blobs
            .lock()
            .map_err(|_| BrandTraceError::Storage("memory store lock poisoned".into()))
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn location(&self) -> String {
        format!("memory:{}", self.scope)
    }

    fn put_new(&self, key: &str, bytes: &[u8]) -> BrandTraceResult<String> {
        validate_key(key)?;
        let mut blobs = self.blobs()?;
        if blobs.contains_key(key) {
            return Err(BrandTraceError::ArtifactExists(key.to_string()));
        }
        blobs.insert(key.to_string(), bytes.to_vec());
        Ok(format!("memory:{}/{}", self.scope, key))
    }

    fn get(&self, key: &str) -> BrandTraceResult<Vec<u8>> {
        self.blobs()?
            .get(key)
            .cloned()
            .ok_or_else(|| BrandTraceError::Storage(format!("artifact '{}' not found", key)))
    }

    fn list(&self, prefix: &str) -> BrandTraceResult<Vec<String>> {
        Ok(self
            .blobs()?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fs_store_is_write_once() {
        let root = TempDir::new().unwrap();
        let store = FsArtifactStore::create(root.path(), "abc").unwrap();
        store.put_new("reports/r_v001.md", b"first").unwrap();
        match store.put_new("reports/r_v001.md", b"second") {
            Err(BrandTraceError::ArtifactExists(key)) => assert_eq!(key, "reports/r_v001.md"),
            other => panic!("expected ArtifactExists, got {:?}", other),
        }
        assert_eq!(store.get("reports/r_v001.md").unwrap(), b"first");
    }

    #[test]
    fn test_fs_store_refuses_existing_session_dir() {
        let root = TempDir::new().unwrap();
        FsArtifactStore::create(root.path(), "dup").unwrap();
        assert!(FsArtifactStore::create(root.path(), "dup").is_err());
    }

    #[test]
    fn test_fs_store_layout_and_reopen() {
        let root = TempDir::new().unwrap();
        let store = FsArtifactStore::create(root.path(), "s1").unwrap();
        let location = store.put_new("handoff/context_v001.json", b"{}").unwrap();
        assert!(root.path().join("session_s1/handoff/context_v001.json").exists());
        assert!(location.ends_with("context_v001.json"));

        let reopened = FsArtifactStore::open(&root.path().join("session_s1")).unwrap();
        assert_eq!(reopened.get("handoff/context_v001.json").unwrap(), b"{}");
    }

    #[test]
    fn test_keys_cannot_escape_session() {
        let store = MemoryArtifactStore::new("t");
        for bad in ["", "/etc/passwd", "../other/x", "a//b", "a\\b", "reports/./x"] {
            assert!(store.put_new(bad, b"x").is_err(), "key {:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_list_filters_by_prefix() {
        let root = TempDir::new().unwrap();
        let store = FsArtifactStore::create(root.path(), "s").unwrap();
        store.put_new("reports/brand_report_v002.md", b"").unwrap();
        store.put_new("reports/brand_report_v001.md", b"").unwrap();
        store.put_new("notices/takedown_x_v001.md", b"").unwrap();
        assert_eq!(
            store.list("reports/brand_report_v").unwrap(),
            vec!["reports/brand_report_v001.md", "reports/brand_report_v002.md"]
        );
        assert!(store.list("missing/x").unwrap().is_empty());
    }

    #[test]
    fn test_next_version_counts_past_highest() {
        let store = MemoryArtifactStore::new("t");
        assert_eq!(next_version(&store, "reports", "brand_report").unwrap(), 1);
        store.put_new("reports/brand_report_v001.md", b"").unwrap();
        store.put_new("reports/brand_report_v001.json", b"").unwrap();
        store.put_new("reports/brand_report_v007.md", b"").unwrap();
        assert_eq!(next_version(&store, "reports", "brand_report").unwrap(), 8);
        assert_eq!(versioned_key("reports", "brand_report", 8, "md"), "reports/brand_report_v008.md");
    }
}
