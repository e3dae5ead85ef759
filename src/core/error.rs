//! Pipeline error taxonomy.
//!
//! Every failure mode of the request-to-artifact pipeline is a typed
//! variant with a stable category name and an HTTP status mapping. The
//! legacy surface is a plain-text body, `"<Category> Error: <message>"`,
//! with each message in the source chain appended on its own line.

use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed or missing file list.
    #[error("{0}")]
    Routing(String),

    /// A requested file's extension falls outside the primary extension's group.
    #[error("all requested files need to be one of: {allowed}")]
    UnsupportedExtension { allowed: String },

    /// No registered asset type handles this extension.
    #[error("the following extension is not handled: {0}")]
    UnregisteredExtension(String),

    /// A parameter value failed its declared pattern.
    #[error("'{value}' is not a valid value for: {param}")]
    Validation { param: String, value: String },

    /// Source file absent and no placeholder applies.
    #[error("file does not exist: {0}")]
    NotFound(String),

    /// A preprocessor, minifier, or image codec failed.
    #[error("error in {stage}")]
    Compilation {
        stage: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// Too many filter-applying requests for one source within the window.
    #[error("you cannot create any more manipulations of this asset at this time")]
    RateLimit,

    /// Referrer host rejected for an image manipulation request.
    #[error("{0}")]
    Referrer(String),

    #[error("filesystem error at {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn compilation(
        stage: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self::Compilation {
            stage: stage.into(),
            source: source.into(),
        }
    }

    pub fn validation(param: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Validation {
            param: param.into(),
            value: value.into(),
        }
    }

    /// Stable category name for the legacy error surface.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Routing(_) | Self::UnsupportedExtension { .. } | Self::UnregisteredExtension(_) => {
                "Routing"
            }
            Self::Validation { .. } => "Validation",
            Self::NotFound(_) => "Not Found",
            Self::Compilation { .. } => "Compilation",
            Self::RateLimit => "Rate Limit",
            Self::Referrer(_) => "Referrer",
            Self::Io { .. } => "IO",
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> u16 {
        match self {
            Self::Routing(_)
            | Self::UnsupportedExtension { .. }
            | Self::UnregisteredExtension(_)
            | Self::Validation { .. } => 400,
            Self::NotFound(_) => 404,
            Self::Compilation { .. } | Self::RateLimit | Self::Referrer(_) | Self::Io { .. } => 500,
        }
    }

    /// Plain-text body with the full source chain, one message per line.
    pub fn render_body(&self) -> String {
        let mut body = format!("{} Error: {}", self.category(), self);
        let mut source = StdError::source(self);
        while let Some(err) = source {
            body.push('\n');
            body.push_str(&err.to_string());
            source = err.source();
        }
        body
    }
}
