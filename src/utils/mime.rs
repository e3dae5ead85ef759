//! MIME type detection for the asset families the pipeline serves.

/// Common MIME type constants.
pub mod types {
    pub const PLAIN: &str = "text/plain; charset=utf-8";
    pub const CSS: &str = "text/css; charset=utf-8";
    pub const JAVASCRIPT: &str = "text/javascript; charset=utf-8";

    pub const PNG: &str = "image/png";
    pub const JPEG: &str = "image/jpeg";
    pub const GIF: &str = "image/gif";
    pub const WEBP: &str = "image/webp";
    pub const ICO: &str = "image/x-icon";

    pub const OCTET_STREAM: &str = "application/octet-stream";
}

/// Guess MIME type from a file extension string.
pub fn from_extension(ext: Option<&str>) -> &'static str {
    match ext {
        Some("css" | "scss") => types::CSS,
        Some("js" | "mjs" | "cjs" | "ts") => types::JAVASCRIPT,
        Some("png") => types::PNG,
        Some("jpg" | "jpeg") => types::JPEG,
        Some("gif") => types::GIF,
        Some("webp") => types::WEBP,
        Some("ico") => types::ICO,
        Some("txt") => types::PLAIN,
        _ => types::OCTET_STREAM,
    }
}

/// Check if the MIME type represents text content (gzip candidates).
pub fn is_text(mime: &str) -> bool {
    mime.starts_with("text/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(from_extension(Some("css")), types::CSS);
        assert_eq!(from_extension(Some("scss")), types::CSS);
        assert_eq!(from_extension(Some("js")), types::JAVASCRIPT);
        assert_eq!(from_extension(Some("png")), types::PNG);
        assert_eq!(from_extension(Some("jpeg")), types::JPEG);
        assert_eq!(from_extension(Some("xyz")), types::OCTET_STREAM);
        assert_eq!(from_extension(None), types::OCTET_STREAM);
    }

    #[test]
    fn test_is_text() {
        assert!(is_text(types::CSS));
        assert!(is_text(types::JAVASCRIPT));
        assert!(!is_text(types::PNG));
    }
}
