//! Asset types and the request-to-artifact pipeline.
//!
//! An [`AssetType`] pairs a tag (the cache namespace and filter-table
//! key) with a [`TypeStrategy`] carrying the type-specific hooks:
//! source resolution, cache-miss guarding, preprocessing and MIME
//! mapping. [`AssetType::process`] is the shared orchestrator - it
//! drives filter discovery, parameter parsing, the per-file cache
//! hit/miss flow and multi-file concatenation, identically for every
//! type.

pub mod css;
pub mod image;
pub mod js;

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::cache::{CacheEntry, CacheRecord, CacheSalt, CacheStore, fingerprint};
use crate::config::{Config, CssOptions, ImageOptions};
use crate::core::{PipelineError, Result};
use crate::debug;
use crate::filter::{FilterTable, is_preminified};
use crate::param::ParamValue;
use crate::request::Request;
use crate::utils::date::epoch_now;
use crate::utils::mime;

/// Asset family, also the cache namespace directory name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetTag {
    Css,
    JavaScript,
    Image,
}

impl AssetTag {
    pub fn name(self) -> &'static str {
        match self {
            Self::Css => "Css",
            Self::JavaScript => "JavaScript",
            Self::Image => "Image",
        }
    }
}

/// Type-specific options, folded into the cache fingerprint so an
/// options change regenerates affected artifacts.
#[derive(Debug, Clone, Serialize)]
pub enum TypeOptions {
    Css(CssOptions),
    JavaScript,
    Image(ImageOptions),
}

impl TypeOptions {
    pub fn css(&self) -> Option<&CssOptions> {
        match self {
            Self::Css(o) => Some(o),
            _ => None,
        }
    }

    pub fn image(&self) -> Option<&ImageOptions> {
        match self {
            Self::Image(o) => Some(o),
            _ => None,
        }
    }
}

/// Per-request HTTP context consulted by miss-time guards and source
/// resolution. Empty for CLI rendering.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// `Referer` header value, if any.
    pub referer: Option<String>,
    /// Host the request was served on (no port).
    pub host: Option<String>,
}

/// Type-specific hooks around the shared pipeline.
pub trait TypeStrategy: Send + Sync {
    fn content_type(&self, ext: &str) -> &'static str;

    /// Map a requested file to the source actually read. The default is
    /// the identity; images substitute placeholders for missing files.
    fn resolve_source(
        &self,
        file: &Path,
        _request: &Request,
        _options: &TypeOptions,
        _cache_root: &Path,
    ) -> Result<PathBuf> {
        Ok(file.to_path_buf())
    }

    /// Veto an expensive regeneration before it starts. Only consulted
    /// on a cache miss with at least one filter requested.
    fn guard(&self, _entry: &CacheEntry, _options: &TypeOptions, _ctx: &RequestContext) -> Result<()> {
        Ok(())
    }

    /// Produce the initial cache record from the source file. The
    /// default reads the raw bytes.
    fn preprocess(
        &self,
        source: &Path,
        _request: &Request,
        _options: &TypeOptions,
    ) -> Result<CacheRecord> {
        let bytes = fs::read(source).map_err(|e| PipelineError::io(source, e))?;
        Ok(CacheRecord::Plain(bytes))
    }
}

/// The processed response: bytes, freshness and MIME type.
#[derive(Debug)]
pub struct Artifact {
    pub content: Vec<u8>,
    /// Epoch seconds of the newest contributing cache entry.
    pub last_modified: u64,
    pub content_type: &'static str,
}

pub struct AssetType {
    pub tag: AssetTag,
    strategy: Box<dyn TypeStrategy>,
    pub options: TypeOptions,
}

impl AssetType {
    pub fn new(tag: AssetTag, strategy: Box<dyn TypeStrategy>, options: TypeOptions) -> Self {
        Self {
            tag,
            strategy,
            options,
        }
    }

    /// Run the full pipeline for a resolved request.
    pub fn process(
        &self,
        request: &mut Request,
        table: &FilterTable,
        config: &Config,
        ctx: &RequestContext,
    ) -> Result<Artifact> {
        let (filters, specs) = table.discover(self.tag, request.raw_params());
        request.parse_params(&specs)?;

        let store = CacheStore::open(&config.cache_dir, self.tag.name())?;
        let salt = CacheSalt {
            url_rewrite: config.url_rewrite,
        };
        let fp = fingerprint(&request.params, &self.options, &salt)?;

        let mut chunks: Vec<(String, Vec<u8>)> = Vec::new();
        let mut last_modified = 0u64;
        for file in &request.files {
            let source = self
                .strategy
                .resolve_source(file, request, &self.options, &config.cache_dir)?;
            let entry = store.entry(&source, &fp)?;

            let (record, mtime) = match entry.check(&source)? {
                Some(hit) => {
                    debug!("cache"; "hit for {}", request.relative(file));
                    hit
                }
                None => {
                    debug!("cache"; "miss for {}", request.relative(file));
                    if !filters.is_empty() {
                        self.strategy.guard(&entry, &self.options, ctx)?;
                    }
                    if !source.is_file() {
                        return Err(PipelineError::NotFound(request.relative(file)));
                    }
                    self.regenerate(&source, &entry, request, &filters)?
                }
            };

            last_modified = last_modified.max(mtime);
            chunks.push((request.relative(file), record.into_content()));
        }

        let content_type = self.strategy.content_type(&request.ext);
        Ok(Artifact {
            content: concatenate(chunks, content_type),
            last_modified,
            content_type,
        })
    }

    /// Miss path: preprocess, run the filter chain against the cache
    /// working copy, persist. A failure discards the in-flight entry.
    fn regenerate(
        &self,
        source: &Path,
        entry: &CacheEntry,
        request: &Request,
        filters: &[Box<dyn crate::filter::Filter>],
    ) -> Result<(CacheRecord, u64)> {
        let run = || -> Result<(CacheRecord, u64)> {
            let record = self.strategy.preprocess(source, request, &self.options)?;
            entry.write_payload(record.content())?;

            let preminified = is_preminified(source);
            let null = ParamValue::Null;
            for filter in filters {
                if preminified && filter.name() == "minify" {
                    continue;
                }
                let args = request.params.get(filter.name()).unwrap_or(&null);
                filter.apply(&entry.path, args, &self.options)?;
            }

            let record = record.with_content(entry.read_payload()?);
            entry.store(&record)?;
            Ok((record, entry.mtime().unwrap_or_else(epoch_now)))
        };
        run().inspect_err(|_| entry.discard())
    }
}

/// Join per-file chunks. Text content gets a provenance banner per file
/// when more than one file was requested; a single file passes through
/// untouched.
fn concatenate(mut chunks: Vec<(String, Vec<u8>)>, content_type: &str) -> Vec<u8> {
    if chunks.len() == 1 {
        return chunks.remove(0).1;
    }
    if !mime::is_text(content_type) {
        return chunks.into_iter().flat_map(|(_, bytes)| bytes).collect();
    }
    chunks
        .into_iter()
        .map(|(rel, bytes)| {
            format!("/*! presso: {rel} */\n\n{}\n", String::from_utf8_lossy(&bytes))
        })
        .collect::<Vec<_>>()
        .join("\n")
        .into_bytes()
}
