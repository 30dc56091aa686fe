//! MIME type detection module
//!
//! Maps a file extension to a media type and derives the charset parameter
//! for textual types.

use std::path::Path;

/// Fallback for unknown extensions
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Media type of a generated archive
pub const ZIP: &str = "application/zip";

/// Get the media type for a file extension (case-insensitive)
///
/// # Examples
/// ```
/// use zipserve::http::mime::lookup;
/// assert_eq!(lookup(Some("html")), "text/html");
/// assert_eq!(lookup(Some("MP4")), "video/mp4");
/// assert_eq!(lookup(None), "application/octet-stream");
/// ```
pub fn lookup(extension: Option<&str>) -> &'static str {
    let ext = extension.map(str::to_ascii_lowercase);
    match ext.as_deref() {
        // Text
        Some("html" | "htm") => "text/html",
        Some("css") => "text/css",
        Some("txt" | "text" | "log") => "text/plain",
        Some("md" | "markdown") => "text/markdown",
        Some("csv") => "text/csv",
        Some("xml") => "application/xml",

        // JavaScript/WASM
        Some("js" | "mjs") => "application/javascript",
        Some("json" | "map") => "application/json",
        Some("wasm") => "application/wasm",

        // Images
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",

        // Video
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("ogv") => "video/ogg",
        Some("mov") => "video/quicktime",

        // Audio
        Some("mp3") => "audio/mpeg",
        Some("ogg" | "oga") => "audio/ogg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",

        // Fonts
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",

        // Archives and documents
        Some("pdf") => "application/pdf",
        Some("zip") => ZIP,
        Some("gz" | "gzip") => "application/gzip",
        Some("tar") => "application/x-tar",

        _ => OCTET_STREAM,
    }
}

/// Media type for a path, based on its extension
pub fn lookup_path(path: &Path) -> &'static str {
    lookup(path.extension().and_then(|e| e.to_str()))
}

/// Charset for a media type, if one is known
pub fn charset(media_type: &str) -> Option<&'static str> {
    let base = media_type
        .split(';')
        .next()
        .unwrap_or(media_type)
        .trim()
        .to_ascii_lowercase();
    if base.starts_with("text/") || base == "application/javascript" || base == "application/json"
    {
        Some("UTF-8")
    } else {
        None
    }
}

/// Full `Content-Type` value: the media type plus `; charset=` when known.
///
/// A value that already carries parameters is returned unchanged.
pub fn content_type_header(media_type: &str) -> String {
    if media_type.contains(';') {
        return media_type.to_string();
    }
    match charset(media_type) {
        Some(cs) => format!("{media_type}; charset={cs}"),
        None => media_type.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_types() {
        assert_eq!(lookup(Some("html")), "text/html");
        assert_eq!(lookup(Some("css")), "text/css");
        assert_eq!(lookup(Some("js")), "application/javascript");
        assert_eq!(lookup(Some("json")), "application/json");
        assert_eq!(lookup(Some("PNG")), "image/png");
        assert_eq!(lookup_path(Path::new("/a/b/clip.mp4")), "video/mp4");
    }

    #[test]
    fn test_unknown_extension() {
        assert_eq!(lookup(Some("xyz")), OCTET_STREAM);
        assert_eq!(lookup(None), OCTET_STREAM);
        assert_eq!(lookup_path(Path::new("temp_archive.zip.0a1b")), OCTET_STREAM);
    }

    #[test]
    fn test_content_type_header() {
        assert_eq!(content_type_header("text/plain"), "text/plain; charset=UTF-8");
        assert_eq!(
            content_type_header("application/json"),
            "application/json; charset=UTF-8"
        );
        assert_eq!(content_type_header("image/png"), "image/png");
        assert_eq!(
            content_type_header("text/html; charset=latin1"),
            "text/html; charset=latin1"
        );
    }
}
