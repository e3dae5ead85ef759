//! Incoming request resolution.
//!
//! Turns a raw comma-separated file list plus query parameters into a
//! validated [`Request`]: every path sanitized and anchored under the
//! webroot, the primary extension resolved against the registry, and raw
//! parameters kept in arrival order for later filter discovery.

use std::path::{Path, PathBuf};

use crate::core::{PipelineError, Result};
use crate::param::{self, ParamSpec, ParsedParams};
use crate::registry::Registry;
use crate::utils::path::{relative_to_webroot, sanitize_request_path, under_webroot};

#[derive(Debug)]
pub struct Request {
    pub webroot: PathBuf,
    /// Primary extension, lowercased.
    pub ext: String,
    /// Requested files in request order, all under `webroot`.
    pub files: Vec<PathBuf>,
    raw_params: Vec<(String, String)>,
    /// Typed parameters, populated by [`Request::parse_params`] once the
    /// applicable filters are known.
    pub params: ParsedParams,
}

impl Request {
    /// Resolve a raw file list against the webroot and registry.
    pub fn resolve(
        file_list: &str,
        mut raw_params: Vec<(String, String)>,
        webroot: &Path,
        registry: &Registry,
    ) -> Result<Self> {
        let mut file_list = file_list.trim();
        if file_list.is_empty() {
            return Err(PipelineError::Routing(
                "no files were requested; make sure the rewrite rules are in place".to_string(),
            ));
        }

        // Legacy alias: /minify/<path> implies minify=true
        if let Some(stripped) = file_list.strip_prefix("/minify/") {
            file_list = stripped;
            raw_params.push(("minify".to_string(), "true".to_string()));
        }

        // The first file decides the primary extension
        let primary = file_list.split(',').next().unwrap_or(file_list);
        let ext = extension_of(primary);
        let group = registry.extension_group(&ext)?;

        let mut files = Vec::new();
        for entry in file_list.split(',') {
            let entry_ext = extension_of(entry);
            if !group.contains(&entry_ext) {
                return Err(PipelineError::UnsupportedExtension {
                    allowed: group.join(", "),
                });
            }
            let sanitized = sanitize_request_path(entry);
            files.push(under_webroot(webroot, &sanitized));
        }

        Ok(Self {
            webroot: webroot.to_path_buf(),
            ext,
            files,
            raw_params,
            params: ParsedParams::new(),
        })
    }

    /// Raw parameters in arrival order, for filter discovery.
    pub fn raw_params(&self) -> &[(String, String)] {
        &self.raw_params
    }

    /// Parse the raw parameters against the aggregate filter schema.
    pub fn parse_params(&mut self, specs: &[ParamSpec]) -> Result<()> {
        self.params = param::parse(&self.raw_params, specs)?;
        Ok(())
    }

    /// A file's path relative to the webroot, for banners and error text.
    pub fn relative(&self, file: &Path) -> String {
        relative_to_webroot(&self.webroot, file)
    }
}

fn extension_of(path: &str) -> String {
    Path::new(path.trim())
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase()
}
