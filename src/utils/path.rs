//! Requested-path sanitation.
//!
//! Requested files arrive as URL-style paths. Before they are joined onto
//! the webroot every parent-directory sequence is stripped, repeatedly,
//! until a fixpoint is reached. Repetition matters: a crafted sequence
//! like `/..%2f../` can reassemble into a new `../` after one pass.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

static TRAVERSAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(/\.\.?|\.\.?/)").expect("valid traversal pattern"));

/// Strip `..` and `.` segments from a requested path until none remain,
/// keeping a leading slash so the result can be joined onto the webroot.
pub fn sanitize_request_path(raw: &str) -> String {
    let mut path = raw.to_string();
    loop {
        let replaced = TRAVERSAL.replace_all(&path, "").into_owned();
        let changed = replaced != path;
        path = replaced;
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        if !changed {
            break;
        }
    }
    path
}

/// Join a sanitized request path (leading slash) onto the webroot.
pub fn under_webroot(webroot: &Path, sanitized: &str) -> PathBuf {
    webroot.join(sanitized.trim_start_matches('/'))
}

/// Path relative to the webroot, URL-style with a leading slash.
///
/// Falls back to the full path display when the file is outside the
/// webroot (placeholders fetched into the cache, for example).
pub fn relative_to_webroot(webroot: &Path, file: &Path) -> String {
    match file.strip_prefix(webroot) {
        Ok(rel) => format!("/{}", rel.display()),
        Err(_) => file.display().to_string(),
    }
}
