//! Conditional-request negotiation and body encoding.
//!
//! The ETag is derived from the artifact's last-modified epoch and its
//! bytes, so it is stable across identical regenerations and changes
//! whenever either input does. Either conditional header validates on
//! its own: `If-Modified-Since` equal to the artifact's last-modified,
//! or a matching `If-None-Match`.

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::asset::Artifact;
use crate::core::{PipelineError, Result};
use crate::utils::date::{http_date, parse_http_date};

#[derive(Debug)]
pub struct Negotiation {
    pub not_modified: bool,
    /// Unquoted ETag value.
    pub etag: String,
    /// RFC 1123 `Last-Modified` value.
    pub last_modified: String,
}

/// Validate the client's conditional headers against the artifact.
pub fn negotiate(
    artifact: &Artifact,
    if_modified_since: Option<&str>,
    if_none_match: Option<&str>,
) -> Negotiation {
    let etag = etag_for(artifact.last_modified, &artifact.content);

    let since_fresh = if_modified_since
        .and_then(parse_http_date)
        .is_some_and(|since| since == artifact.last_modified);
    let etag_fresh = if_none_match.is_some_and(|header| {
        header
            .split(',')
            .map(|tag| tag.trim().trim_start_matches("W/").trim_matches('"'))
            .any(|tag| tag == etag)
    });

    Negotiation {
        not_modified: since_fresh || etag_fresh,
        etag,
        last_modified: http_date(artifact.last_modified),
    }
}

fn etag_for(last_modified: u64, content: &[u8]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(last_modified.to_string().as_bytes());
    hasher.update(content);
    hex::encode(&hasher.finalize().as_bytes()[..16])
}

/// Gzip a response body.
pub fn gzip(content: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(content)
        .map_err(|e| PipelineError::compilation("gzip encoder", e))?;
    encoder
        .finish()
        .map_err(|e| PipelineError::compilation("gzip encoder", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::mime;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn artifact(content: &[u8], last_modified: u64) -> Artifact {
        Artifact {
            content: content.to_vec(),
            last_modified,
            content_type: mime::types::CSS,
        }
    }

    #[test]
    fn test_etag_stable_across_identical_artifacts() {
        let a = negotiate(&artifact(b"body{}", 1_700_000_000), None, None);
        let b = negotiate(&artifact(b"body{}", 1_700_000_000), None, None);
        assert_eq!(a.etag, b.etag);
    }

    #[test]
    fn test_etag_changes_with_content_or_mtime() {
        let base = negotiate(&artifact(b"body{}", 1_700_000_000), None, None);
        let other_content = negotiate(&artifact(b"a{}", 1_700_000_000), None, None);
        let other_mtime = negotiate(&artifact(b"body{}", 1_700_000_001), None, None);
        assert_ne!(base.etag, other_content.etag);
        assert_ne!(base.etag, other_mtime.etag);
    }

    #[test]
    fn test_either_validator_suffices() {
        let art = artifact(b"body{}", 1_700_000_000);
        let first = negotiate(&art, None, None);
        assert!(!first.not_modified);

        assert!(negotiate(&art, Some(&first.last_modified), None).not_modified);
        assert!(negotiate(&art, None, Some(&format!("\"{}\"", first.etag))).not_modified);
        assert!(
            negotiate(
                &art,
                Some(&first.last_modified),
                Some(&format!("\"{}\"", first.etag))
            )
            .not_modified
        );
    }

    #[test]
    fn test_stale_validators_force_full_response() {
        let art = artifact(b"body{}", 1_700_000_000);
        let current = negotiate(&art, None, None);

        let stale_date = crate::utils::date::http_date(1_600_000_000);
        assert!(!negotiate(&art, Some(&stale_date), None).not_modified);
        assert!(!negotiate(&art, None, Some("\"different\"")).not_modified);
        assert!(!negotiate(&art, Some(&stale_date), Some("\"different\"")).not_modified);
    }

    #[test]
    fn test_weak_etag_accepted() {
        let art = artifact(b"body{}", 1_700_000_000);
        let current = negotiate(&art, None, None);
        let weak = format!("W/\"{}\"", current.etag);
        assert!(negotiate(&art, Some(&current.last_modified), Some(&weak)).not_modified);
    }

    #[test]
    fn test_gzip_round_trip() {
        let compressed = gzip(b"body { color: red; }").unwrap();
        let mut decoder = GzDecoder::new(compressed.as_slice());
        let mut out = String::new();
        decoder.read_to_string(&mut out).unwrap();
        assert_eq!(out, "body { color: red; }");
    }
}
