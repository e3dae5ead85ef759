//! Cache record shapes.
//!
//! A record is either plain transformed bytes or a compound of compiled
//! bytes plus the modification times of every source that contributed to
//! the compilation (`@use`/`@import` pulls). The payload on disk is
//! always the raw artifact, so images and text serve without unwrapping;
//! a compound record keeps its dependency map in a JSON sidecar next to
//! the payload.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheRecord {
    Plain(Vec<u8>),
    Compound {
        compiled: Vec<u8>,
        /// Source path -> last-known modification epoch.
        files: BTreeMap<PathBuf, u64>,
    },
}

/// On-disk shape of the compound sidecar.
#[derive(Debug, Serialize, Deserialize)]
pub struct DepsManifest {
    pub files: BTreeMap<PathBuf, u64>,
}

impl CacheRecord {
    pub fn content(&self) -> &[u8] {
        match self {
            Self::Plain(bytes) => bytes,
            Self::Compound { compiled, .. } => compiled,
        }
    }

    pub fn into_content(self) -> Vec<u8> {
        match self {
            Self::Plain(bytes) => bytes,
            Self::Compound { compiled, .. } => compiled,
        }
    }

    /// Same record shape with the payload swapped (after filters have
    /// rewritten the working copy).
    pub fn with_content(self, content: Vec<u8>) -> Self {
        match self {
            Self::Plain(_) => Self::Plain(content),
            Self::Compound { files, .. } => Self::Compound {
                compiled: content,
                files,
            },
        }
    }

    pub fn dependencies(&self) -> Option<&BTreeMap<PathBuf, u64>> {
        match self {
            Self::Plain(_) => None,
            Self::Compound { files, .. } => Some(files),
        }
    }
}
