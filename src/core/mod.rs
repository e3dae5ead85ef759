//! Core pipeline types: the error taxonomy.

mod error;

pub use error::{PipelineError, Result};
