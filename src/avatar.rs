//! Avatar image processing and on-disk storage.

use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ImageError;

/// Content types accepted for upload.
pub const ALLOWED_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];

/// URL prefix under which stored avatars are served.
pub const URL_PREFIX: &str = "/uploads/avatars/";

pub fn is_allowed_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    ALLOWED_TYPES.contains(&essence.as_str())
}

/// Decodes an uploaded image, crops it to a centered square of `size` pixels
/// and re-encodes it as JPEG.
pub fn process(bytes: &[u8], size: u32, quality: u8) -> Result<Vec<u8>, ImageError> {
    let img = image::load_from_memory(bytes)?;
    let square = img.resize_to_fill(size, size, FilterType::Lanczos3).to_rgb8();

    let mut out = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    square.write_with_encoder(encoder)?;
    Ok(out.into_inner())
}

pub fn file_name(user_id: i64, millis: i64) -> String {
    format!("avatar-{millis}-{user_id}.jpg")
}

pub fn url_for(file_name: &str) -> String {
    format!("{URL_PREFIX}{file_name}")
}

/// Maps a stored avatar URL back to its file name. Anything that is not a bare
/// file name under the avatar prefix is rejected.
pub fn stored_file_name(url: &str) -> Option<&str> {
    let name = url.strip_prefix(URL_PREFIX)?;
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name);
    valid.then_some(name)
}

/// Removes a previously stored avatar. A missing file is not an error.
pub fn remove_stored(avatars_dir: &Path, url: &str) {
    let Some(name) = stored_file_name(url) else {
        tracing::warn!(url, "Ignoring avatar outside the uploads directory");
        return;
    };
    match std::fs::remove_file(avatars_dir.join(name)) {
        Ok(()) => tracing::debug!(file = name, "Removed old avatar"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(file = name, "Failed to remove old avatar: {}", e),
    }
}
