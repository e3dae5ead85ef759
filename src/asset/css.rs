//! CSS asset type: SCSS compilation with dependency tracking, plus
//! relative `url()` rebasing so concatenated stylesheets keep working
//! from any request path.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use super::{AssetTag, AssetType, TypeOptions, TypeStrategy};
use crate::cache::CacheRecord;
use crate::config::Config;
use crate::core::{PipelineError, Result};
use crate::request::Request;
use crate::utils::date::mtime_epoch;
use crate::utils::mime;

pub fn asset_type(config: &Config) -> AssetType {
    AssetType::new(
        AssetTag::Css,
        Box::new(CssStrategy),
        TypeOptions::Css(config.css.clone()),
    )
}

pub struct CssStrategy;

impl TypeStrategy for CssStrategy {
    fn content_type(&self, _ext: &str) -> &'static str {
        mime::types::CSS
    }

    fn preprocess(
        &self,
        source: &Path,
        request: &Request,
        options: &TypeOptions,
    ) -> Result<CacheRecord> {
        let scss = has_extension(source, "scss")
            || options.css().is_some_and(|o| o.scssify_all);
        let base = url_dir(&request.relative(source));

        if scss {
            let (compiled, deps) = compile_scss(source)?;
            let mut files = BTreeMap::new();
            for dep in deps {
                files.insert(dep.clone(), mtime_epoch(&dep).unwrap_or(0));
            }
            return Ok(CacheRecord::Compound {
                compiled: rebase_urls(&compiled, &base).into_bytes(),
                files,
            });
        }

        let raw = fs::read_to_string(source).map_err(|e| PipelineError::io(source, e))?;
        Ok(CacheRecord::Plain(rebase_urls(&raw, &base).into_bytes()))
    }
}

/// Filesystem shim recording every file the compiler pulls in, so
/// `@use`/`@import` dependencies land in the cache record.
#[derive(Debug, Default)]
struct TrackingFs {
    reads: RefCell<BTreeSet<PathBuf>>,
}

impl grass::Fs for TrackingFs {
    fn is_dir(&self, path: &Path) -> bool {
        grass::StdFs.is_dir(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        grass::StdFs.is_file(path)
    }

    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        self.reads.borrow_mut().insert(path.to_path_buf());
        grass::StdFs.read(path)
    }
}

/// Compile one SCSS entry point, returning the CSS and every file read
/// during compilation (the entry point included).
pub fn compile_scss(source: &Path) -> Result<(String, BTreeSet<PathBuf>)> {
    let fs = TrackingFs::default();
    let options = grass::Options::default().fs(&fs);
    let compiled = grass::from_path(source, &options)
        .map_err(|e| PipelineError::compilation("SCSS compiler", e.to_string()))?;
    let mut reads = fs.reads.into_inner();
    reads.insert(source.to_path_buf());
    Ok((compiled, reads))
}

static CSS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*['"]?([^'"()]+?)['"]?\s*\)"#).expect("valid url pattern")
});

/// Rewrite relative `url()` references against the stylesheet's own
/// directory. Absolute paths, full URLs, data URIs and fragments pass
/// through.
pub fn rebase_urls(css: &str, base: &str) -> String {
    CSS_URL
        .replace_all(css, |caps: &regex::Captures| {
            let target = caps[1].trim();
            if target.starts_with('/') || target.starts_with('#') || target.contains(':') {
                return caps[0].to_string();
            }
            format!("url('{}')", normalize(&format!("{base}/{target}")))
        })
        .into_owned()
}

/// URL-style directory of a webroot-relative path.
fn url_dir(relative: &str) -> String {
    match relative.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => String::new(),
    }
}

/// Collapse `.` and `..` segments in a URL path.
fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}
