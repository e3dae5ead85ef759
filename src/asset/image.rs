//! Image asset type.
//!
//! Images add three concerns on top of the shared pipeline: placeholder
//! substitution for missing sources (local file or remote URL, matched
//! by wildcard pattern), a per-source rate limit on manipulation
//! requests, and an optional referrer check so third parties cannot
//! farm resizes off the server.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use regex::Regex;
use url::Url;

use super::{AssetTag, AssetType, RequestContext, TypeOptions, TypeStrategy};
use crate::cache::{CacheEntry, file_hash};
use crate::config::{Config, ImageOptions};
use crate::core::{PipelineError, Result};
use crate::debug;
use crate::request::Request;
use crate::utils::date::epoch_now;
use crate::utils::mime;
use crate::utils::path::under_webroot;

pub fn asset_type(config: &Config) -> AssetType {
    AssetType::new(
        AssetTag::Image,
        Box::new(ImageStrategy),
        TypeOptions::Image(config.image.clone()),
    )
}

pub struct ImageStrategy;

impl TypeStrategy for ImageStrategy {
    fn content_type(&self, ext: &str) -> &'static str {
        mime::from_extension(Some(ext))
    }

    fn resolve_source(
        &self,
        file: &Path,
        request: &Request,
        options: &TypeOptions,
        cache_root: &Path,
    ) -> Result<PathBuf> {
        if file.is_file() {
            return Ok(file.to_path_buf());
        }
        let Some(image_options) = options.image() else {
            return Ok(file.to_path_buf());
        };
        let relative = request.relative(file);
        for (pattern, target) in &image_options.placeholders {
            if !wildcard_match(pattern, &relative) {
                continue;
            }
            debug!("image"; "placeholder for {relative}: {target}");
            if target.starts_with("http://") || target.starts_with("https://") {
                return fetch_placeholder(target, pattern, cache_root);
            }
            return Ok(under_webroot(&request.webroot, target));
        }
        Ok(file.to_path_buf())
    }

    fn guard(
        &self,
        entry: &CacheEntry,
        options: &TypeOptions,
        ctx: &RequestContext,
    ) -> Result<()> {
        let Some(image_options) = options.image() else {
            return Ok(());
        };
        check_rate_limit(entry, image_options)?;
        check_referrer(image_options, ctx)
    }
}

/// Reject a regeneration when the source already accumulated its quota
/// of distinct manipulations within the window.
fn check_rate_limit(entry: &CacheEntry, options: &ImageOptions) -> Result<()> {
    let recent = entry.recent_siblings(epoch_now(), options.filter_window_secs)?;
    if recent > options.allowed_filters {
        return Err(PipelineError::RateLimit);
    }
    Ok(())
}

/// Only pages served by this host may request new manipulations. Skipped
/// outside an HTTP context (CLI rendering has no referrer to check).
fn check_referrer(options: &ImageOptions, ctx: &RequestContext) -> Result<()> {
    if !options.check_referrer {
        return Ok(());
    }
    let Some(host) = &ctx.host else {
        return Ok(());
    };
    let Some(referer) = &ctx.referer else {
        return Err(PipelineError::Referrer(
            "direct image manipulation is not allowed".to_string(),
        ));
    };
    let referer_host = Url::parse(referer)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string));
    if referer_host.as_deref() != Some(host.as_str()) {
        return Err(PipelineError::Referrer(format!(
            "referrers do not match; the image manipulation must be referenced from {host}"
        )));
    }
    Ok(())
}

/// Glob-lite: `*` matches any run of characters, everything else is
/// literal.
fn wildcard_match(pattern: &str, path: &str) -> bool {
    let pattern = format!("^{}$", regex::escape(pattern).replace(r"\*", ".*"));
    Regex::new(&pattern).is_ok_and(|re| re.is_match(path))
}

/// Download a remote placeholder once, keyed by URL hash plus the hash
/// of the pattern that matched; later requests reuse the local copy.
fn fetch_placeholder(url: &str, pattern: &str, cache_root: &Path) -> Result<PathBuf> {
    let dir = cache_root.join("placeholders");
    fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;

    let ext = url
        .rsplit_once('.')
        .map(|(_, e)| e)
        .filter(|e| e.len() <= 4 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("png");
    let path = dir.join(format!(
        "{}-{}.{ext}",
        file_hash(Path::new(url)),
        file_hash(Path::new(pattern))
    ));
    if path.is_file() {
        return Ok(path);
    }

    let response = ureq::get(url)
        .call()
        .map_err(|e| PipelineError::compilation("placeholder fetch", e))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut bytes)
        .map_err(|e| PipelineError::io(&path, e))?;
    fs::write(&path, bytes).map_err(|e| PipelineError::io(&path, e))?;
    Ok(path)
}
