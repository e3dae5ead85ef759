//! Cache fingerprinting.
//!
//! A fingerprint identifies one unique combination of parsed parameters,
//! asset-type options and routing mode. Together with the source file's
//! identity hash it addresses a cache entry. Hashing is blake3 over the
//! deterministic JSON serialization of the inputs (params are `BTreeMap`s
//! so key order is stable).

use std::path::Path;

use serde::Serialize;

use crate::asset::TypeOptions;
use crate::core::{PipelineError, Result};
use crate::param::ParsedParams;

/// Hex length kept for file names; 128 bits of blake3 is plenty for
/// cache addressing and keeps paths short.
const HASH_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Routing-mode flags folded into every fingerprint, so switching
/// URL-rewrite mode invalidates all cached artifacts.
#[derive(Debug, Clone, Serialize)]
pub struct CacheSalt {
    pub url_rewrite: bool,
}

pub fn fingerprint(
    params: &ParsedParams,
    options: &TypeOptions,
    salt: &CacheSalt,
) -> Result<Fingerprint> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&to_json(params)?);
    hasher.update(&to_json(options)?);
    hasher.update(&to_json(salt)?);
    Ok(Fingerprint(short_hex(hasher.finalize())))
}

/// Identity hash of a source path (the path string, not the contents:
/// staleness is mtime-based, and the entry must be addressable before
/// the source is ever read).
pub fn file_hash(path: &Path) -> String {
    short_hex(blake3::hash(path.to_string_lossy().as_bytes()))
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| PipelineError::compilation("cache fingerprint serialization", e))
}

fn short_hex(hash: blake3::Hash) -> String {
    hex::encode(&hash.as_bytes()[..HASH_LEN / 2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::ParamValue;

    fn salt() -> CacheSalt {
        CacheSalt { url_rewrite: true }
    }

    fn params(minify: bool) -> ParsedParams {
        let mut p = ParsedParams::new();
        p.insert("minify".to_string(), ParamValue::Bool(minify));
        p
    }

    #[test]
    fn test_deterministic() {
        let a = fingerprint(&params(true), &TypeOptions::JavaScript, &salt()).unwrap();
        let b = fingerprint(&params(true), &TypeOptions::JavaScript, &salt()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_params_change_fingerprint() {
        let a = fingerprint(&params(true), &TypeOptions::JavaScript, &salt()).unwrap();
        let b = fingerprint(&params(false), &TypeOptions::JavaScript, &salt()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_routing_mode_changes_fingerprint() {
        let a = fingerprint(&params(true), &TypeOptions::JavaScript, &salt()).unwrap();
        let b = fingerprint(
            &params(true),
            &TypeOptions::JavaScript,
            &CacheSalt { url_rewrite: false },
        )
        .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_file_hash_shard_prefix() {
        let hash = file_hash(Path::new("/var/www/js/a.js"));
        assert_eq!(hash.len(), HASH_LEN);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
