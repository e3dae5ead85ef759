//! On-disk artifact cache.
//!
//! Entries are addressed by a two-level sharding scheme under the cache
//! root:
//!
//! ```text
//! cache_root/<TypeName>/<hh>/<rest-of-file-hash>-<fingerprint>.<ext>
//! ```
//!
//! where `hh` is the first two hex characters of the source path's
//! identity hash. Staleness is mtime-based: an entry is a miss when the
//! payload or source is absent, the source is newer than the payload, or
//! (compound records) any recorded dependency is newer than its stored
//! epoch. A failed regeneration discards the in-flight entry so a
//! half-built artifact can never mask future regeneration.

mod fingerprint;
mod record;

pub use fingerprint::{CacheSalt, Fingerprint, file_hash, fingerprint};
pub use record::{CacheRecord, DepsManifest};

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::{PipelineError, Result};
use crate::utils::date::mtime_epoch;

/// Sidecar extension for compound dependency manifests.
const DEPS_EXT: &str = "deps";

pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Open (and create if needed) the cache tree for one asset type.
    /// Creation is idempotent and safe against concurrent first-requests.
    pub fn open(cache_root: &Path, type_name: &str) -> Result<Self> {
        let root = cache_root.join(type_name);
        fs::create_dir_all(&root).map_err(|e| PipelineError::io(&root, e))?;
        Ok(Self { root })
    }

    /// Address the cache entry for one source file and fingerprint.
    pub fn entry(&self, source: &Path, fingerprint: &Fingerprint) -> Result<CacheEntry> {
        let hash = file_hash(source);
        let (shard, rest) = hash.split_at(2);
        let shard_dir = self.root.join(shard);
        fs::create_dir_all(&shard_dir).map_err(|e| PipelineError::io(&shard_dir, e))?;

        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
            .to_lowercase();
        let path = shard_dir.join(format!("{rest}-{}.{ext}", fingerprint.as_str()));
        Ok(CacheEntry {
            deps_path: path.with_extension(format!("{ext}.{DEPS_EXT}")),
            sibling_prefix: rest.to_string(),
            shard_dir,
            path,
        })
    }
}

pub struct CacheEntry {
    /// Payload: the raw artifact bytes.
    pub path: PathBuf,
    deps_path: PathBuf,
    shard_dir: PathBuf,
    sibling_prefix: String,
}

impl CacheEntry {
    /// Check freshness against `source`. Returns the cached record and
    /// the payload's mtime on a hit, `None` on any staleness condition.
    pub fn check(&self, source: &Path) -> Result<Option<(CacheRecord, u64)>> {
        let Some(cache_mtime) = mtime_epoch(&self.path) else {
            return Ok(None);
        };
        let Some(source_mtime) = mtime_epoch(source) else {
            return Ok(None);
        };
        if source_mtime > cache_mtime {
            return Ok(None);
        }

        let record = self.load()?;
        if let Some(deps) = record.dependencies() {
            for (dep, recorded) in deps {
                match mtime_epoch(dep) {
                    Some(current) if current <= *recorded => {}
                    // Dependency touched or gone: recompile
                    _ => return Ok(None),
                }
            }
        }
        Ok(Some((record, cache_mtime)))
    }

    /// Read the record back from disk (payload plus sidecar if present).
    pub fn load(&self) -> Result<CacheRecord> {
        let payload = fs::read(&self.path).map_err(|e| PipelineError::io(&self.path, e))?;
        if !self.deps_path.is_file() {
            return Ok(CacheRecord::Plain(payload));
        }
        let raw = fs::read(&self.deps_path).map_err(|e| PipelineError::io(&self.deps_path, e))?;
        let manifest: DepsManifest = serde_json::from_slice(&raw)
            .map_err(|e| PipelineError::compilation("cache manifest", e))?;
        Ok(CacheRecord::Compound {
            compiled: payload,
            files: manifest.files,
        })
    }

    /// Write the payload bytes (the working copy filters mutate).
    pub fn write_payload(&self, bytes: &[u8]) -> Result<()> {
        fs::write(&self.path, bytes).map_err(|e| PipelineError::io(&self.path, e))
    }

    pub fn read_payload(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|e| PipelineError::io(&self.path, e))
    }

    /// Persist the record's shape: write or remove the dependency
    /// sidecar to match. The payload itself was written (and possibly
    /// rewritten by filters) beforehand; its mtime - "now" - becomes the
    /// entry's last-modified, so regenerated content always advances the
    /// Last-Modified/ETag pair.
    pub fn store(&self, record: &CacheRecord) -> Result<()> {
        match record.dependencies() {
            Some(files) => {
                let manifest = DepsManifest {
                    files: files.clone(),
                };
                let raw = serde_json::to_vec(&manifest)
                    .map_err(|e| PipelineError::compilation("cache manifest", e))?;
                fs::write(&self.deps_path, raw).map_err(|e| PipelineError::io(&self.deps_path, e))
            }
            None => {
                if self.deps_path.is_file() {
                    fs::remove_file(&self.deps_path)
                        .map_err(|e| PipelineError::io(&self.deps_path, e))?;
                }
                Ok(())
            }
        }
    }

    /// Remove the in-flight entry after a failed regeneration. Errors
    /// are ignored: the entry may never have been written.
    pub fn discard(&self) {
        let _ = fs::remove_file(&self.path);
        let _ = fs::remove_file(&self.deps_path);
    }

    pub fn mtime(&self) -> Option<u64> {
        mtime_epoch(&self.path)
    }

    /// Count sibling cache files for the same source (any fingerprint)
    /// modified within the last `window_secs`. Backs the image
    /// rate-limit check.
    pub fn recent_siblings(&self, now: u64, window_secs: u64) -> Result<usize> {
        let cutoff = now.saturating_sub(window_secs);
        let entries =
            fs::read_dir(&self.shard_dir).map_err(|e| PipelineError::io(&self.shard_dir, e))?;
        let mut count = 0;
        for entry in entries {
            let entry = entry.map_err(|e| PipelineError::io(&self.shard_dir, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(&self.sibling_prefix) || name.ends_with(DEPS_EXT) {
                continue;
            }
            if mtime_epoch(&entry.path()).is_some_and(|m| m > cutoff) {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::TypeOptions;
    use crate::param::ParsedParams;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> CacheStore {
        CacheStore::open(dir.path(), "JavaScript").unwrap()
    }

    fn fp() -> Fingerprint {
        fingerprint(
            &ParsedParams::new(),
            &TypeOptions::JavaScript,
            &CacheSalt { url_rewrite: true },
        )
        .unwrap()
    }

    fn touch_newer(path: &Path) {
        // mtimes are second-granular; push the file into the future
        // instead of sleeping
        let future = std::time::SystemTime::now() + Duration::from_secs(5);
        let file = fs::File::options().append(true).open(path).unwrap();
        file.set_modified(future).unwrap();
    }

    #[test]
    fn test_miss_when_absent() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.js");
        fs::write(&source, "x").unwrap();
        let entry = store(&dir).entry(&source, &fp()).unwrap();
        assert!(entry.check(&source).unwrap().is_none());
    }

    #[test]
    fn test_hit_round_trip() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.js");
        fs::write(&source, "var x;").unwrap();
        let entry = store(&dir).entry(&source, &fp()).unwrap();
        entry.write_payload(b"var x;").unwrap();
        entry.store(&CacheRecord::Plain(b"var x;".to_vec())).unwrap();

        let (record, mtime) = entry.check(&source).unwrap().expect("cache hit");
        assert_eq!(record.content(), b"var x;");
        assert!(mtime > 0);
    }

    #[test]
    fn test_miss_when_source_newer() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.js");
        fs::write(&source, "var x;").unwrap();
        let entry = store(&dir).entry(&source, &fp()).unwrap();
        entry.write_payload(b"var x;").unwrap();

        touch_newer(&source);
        assert!(entry.check(&source).unwrap().is_none());
    }

    #[test]
    fn test_miss_when_source_gone() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.js");
        fs::write(&source, "var x;").unwrap();
        let entry = store(&dir).entry(&source, &fp()).unwrap();
        entry.write_payload(b"var x;").unwrap();

        fs::remove_file(&source).unwrap();
        assert!(entry.check(&source).unwrap().is_none());
    }

    #[test]
    fn test_compound_dependency_invalidation() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.scss");
        let dep = dir.path().join("_partial.scss");
        fs::write(&source, "@use 'partial';").unwrap();
        fs::write(&dep, "$c: red;").unwrap();

        let entry = store(&dir).entry(&source, &fp()).unwrap();
        entry.write_payload(b"body{}").unwrap();
        let mut files = BTreeMap::new();
        files.insert(source.clone(), mtime_epoch(&source).unwrap());
        files.insert(dep.clone(), mtime_epoch(&dep).unwrap());
        entry
            .store(&CacheRecord::Compound {
                compiled: b"body{}".to_vec(),
                files,
            })
            .unwrap();

        assert!(entry.check(&source).unwrap().is_some());

        // Touching the indirect dependency forces regeneration
        touch_newer(&dep);
        assert!(entry.check(&source).unwrap().is_none());
    }

    #[test]
    fn test_discard_removes_entry_and_sidecar() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.scss");
        fs::write(&source, "x").unwrap();
        let entry = store(&dir).entry(&source, &fp()).unwrap();
        entry.write_payload(b"x").unwrap();
        entry
            .store(&CacheRecord::Compound {
                compiled: b"x".to_vec(),
                files: BTreeMap::new(),
            })
            .unwrap();

        entry.discard();
        assert!(!entry.path.exists());
        assert!(entry.load().is_err());
    }

    #[test]
    fn test_recent_siblings_counts_fingerprints() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("pic.jpg");
        fs::write(&source, "img").unwrap();
        let cache = store(&dir);

        let entry = cache.entry(&source, &fp()).unwrap();
        entry.write_payload(b"one").unwrap();

        let other_fp = {
            let mut params = ParsedParams::new();
            params.insert(
                "resize".to_string(),
                crate::param::ParamValue::Str("w[50]".to_string()),
            );
            fingerprint(
                &params,
                &TypeOptions::JavaScript,
                &CacheSalt { url_rewrite: true },
            )
            .unwrap()
        };
        cache
            .entry(&source, &other_fp)
            .unwrap()
            .write_payload(b"two")
            .unwrap();

        let now = crate::utils::date::epoch_now();
        assert_eq!(entry.recent_siblings(now, 300).unwrap(), 2);
        // A window in the past matches nothing
        assert_eq!(entry.recent_siblings(now + 1000, 300).unwrap(), 0);
    }
}
