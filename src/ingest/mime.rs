//! Image documents: MIME type recognition and repository locations.

use std::path::Path;

use mime::Mime;

/// File-type marker for the raw (unprocessed) copy of a document.
const RAW_FILE: &str = "raw";

/// Canonical file extension for a supported image MIME type.
#[must_use]
pub fn image_extension(content_type: &str) -> Option<&'static str> {
    let parsed: Mime = content_type.trim().to_ascii_lowercase().parse().ok()?;
    if parsed.type_() != mime::IMAGE {
        return None;
    }
    match parsed.subtype().as_str() {
        "jpeg" | "jpg" | "pjpeg" => Some("jpg"),
        "png" => Some("png"),
        "gif" => Some("gif"),
        "bmp" => Some("bmp"),
        "tiff" => Some("tif"),
        "svg" => Some("svg"),
        "webp" => Some("webp"),
        _ => None,
    }
}

/// Repository location of the raw image stored for a document.
#[must_use]
pub fn image_location(file_path: &str, extension: &str) -> String {
    Path::new(file_path)
        .join(format!("{RAW_FILE}.{extension}"))
        .to_string_lossy()
        .into_owned()
}
