//! Configuration loaded from `presso.toml`.
//!
//! Every section has serde defaults so an empty (or absent) file yields a
//! working pipeline rooted at the current directory.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{}`", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("config file parsing error")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory requested paths are anchored under.
    pub webroot: PathBuf,
    /// Root of the on-disk artifact cache.
    pub cache_dir: PathBuf,
    /// Whether requests arrive via URL rewriting (part of the cache salt:
    /// flipping it invalidates every cached artifact).
    pub url_rewrite: bool,
    pub serve: ServeConfig,
    pub css: CssOptions,
    pub image: ImageOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            webroot: PathBuf::from("."),
            cache_dir: PathBuf::from(".presso-cache"),
            url_rewrite: true,
            serve: ServeConfig::default(),
            css: CssOptions::default(),
            image: ImageOptions::default(),
        }
    }
}

impl Config {
    /// Load from an explicit path, or from `presso.toml` in the current
    /// directory when it exists; defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from("presso.toml");
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(path.clone(), e))?;
        Ok(toml::from_str(&raw)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub interface: IpAddr,
    pub port: u16,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8077,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CssOptions {
    /// Run every stylesheet through the SCSS compiler, not just `.scss`
    /// files.
    pub scssify_all: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageOptions {
    /// How many filter-applying requests one source image may receive
    /// within `filter_window_secs`.
    pub allowed_filters: usize,
    pub filter_window_secs: u64,
    /// Reject manipulation requests whose Referer host differs from the
    /// serving host.
    pub check_referrer: bool,
    /// Wildcard path pattern -> placeholder image (local path or http(s)
    /// URL) substituted for missing sources.
    pub placeholders: BTreeMap<String, String>,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            allowed_filters: 3,
            filter_window_secs: 300,
            check_referrer: true,
            placeholders: BTreeMap::new(),
            max_width: 1920,
            max_height: 1080,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.webroot, PathBuf::from("."));
        assert!(config.url_rewrite);
        assert_eq!(config.image.allowed_filters, 3);
        assert_eq!(config.image.filter_window_secs, 300);
        assert!(config.image.check_referrer);
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            webroot = "/srv/site"

            [image]
            check_referrer = false
            max_width = 800

            [image.placeholders]
            "/img/*" = "/img/missing.png"
            "#,
        )
        .unwrap();
        assert_eq!(config.webroot, PathBuf::from("/srv/site"));
        assert!(!config.image.check_referrer);
        assert_eq!(config.image.max_width, 800);
        assert_eq!(config.image.max_height, 1080);
        assert_eq!(
            config.image.placeholders.get("/img/*").map(String::as_str),
            Some("/img/missing.png")
        );
        // Untouched sections keep their defaults
        assert!(!config.css.scssify_all);
        assert_eq!(config.serve.port, 8077);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.cache_dir, PathBuf::from(".presso-cache"));
    }
}
