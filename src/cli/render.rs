//! One-shot rendering: run the pipeline for a single request string and
//! write the artifact to a file or stdout. Useful for build scripts and
//! for smoke-testing a configuration without a server.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::asset::RequestContext;
use crate::config::Config;
use crate::filter::FilterTable;
use crate::log;
use crate::registry::Registry;
use crate::request::Request;

pub fn run(config: &Config, request_str: &str, output: Option<&Path>) -> Result<()> {
    let registry = Registry::with_defaults();
    let filters = FilterTable::with_defaults();

    let (path, query) = request_str.split_once('?').unwrap_or((request_str, ""));
    let raw_params = super::serve::parse_query(query);

    let mut request = Request::resolve(path, raw_params, &config.webroot, &registry)?;
    let asset = registry.resolve(&request.ext)?(config);
    let artifact = asset.process(&mut request, &filters, config, &RequestContext::default())?;

    match output {
        Some(path) => {
            fs::write(path, &artifact.content)
                .with_context(|| format!("failed to write {}", path.display()))?;
            log!("render"; "{} -> {} ({} bytes, {})",
                request_str, path.display(), artifact.content.len(), artifact.content_type);
        }
        None => {
            std::io::stdout()
                .write_all(&artifact.content)
                .context("failed to write to stdout")?;
        }
    }
    Ok(())
}
