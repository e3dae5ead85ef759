//! Shared helpers: dates, MIME detection, path sanitation.

pub mod date;
pub mod mime;
pub mod path;
