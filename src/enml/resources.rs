//! Media collection for note resources
//!
//! Reads a referenced file, works out its MIME type and (for images) its
//! pixel size, and hashes it so `<en-media>` can point at it.

use std::fs;
use std::path::Path;

use mime_sniffer::MimeTypeSniffer;

use crate::enex::Resource;
use crate::error::{ConvertError, Result};

/// Fallback when neither the content nor the extension identifies the file
const DEFAULT_MIME: &str = "application/octet-stream";

/// Extension to MIME type
const MIME_TYPES: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("svg", "image/svg+xml"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("heic", "image/heic"),
    ("mp3", "audio/mpeg"),
    ("m4a", "audio/mp4"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mov", "video/quicktime"),
    ("webm", "video/webm"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("html", "text/html"),
    ("htm", "text/html"),
];

/// Load a media file as a resource.
///
/// Fails with `MissingResource` when the file doesn't exist. Dimensions fall
/// back to `hint` (the referencing element's width/height) and are otherwise
/// decoded from the image header; undecodable images simply have none.
pub fn collect_resource(path: &Path, hint: (Option<u32>, Option<u32>)) -> Result<Resource> {
    if !path.is_file() {
        return Err(ConvertError::MissingResource(path.to_path_buf()));
    }

    let data = fs::read(path)?;
    let mime = detect_mime(path, &data);

    let (mut width, mut height) = hint;
    if mime.starts_with("image/") && (width.is_none() || height.is_none()) {
        match image_dimensions(&data) {
            Some((w, h)) => {
                width = width.or(Some(w));
                height = height.or(Some(h));
            }
            None => log::debug!("Could not read image size of {}", path.display()),
        }
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let hash = format!("{:x}", md5::compute(&data));

    log::debug!("Collected {} ({}, {} bytes, md5 {})", path.display(), mime, data.len(), hash);

    Ok(Resource {
        data,
        mime,
        file_name,
        width,
        height,
        hash,
    })
}

/// MIME type from the content, then from the extension
pub fn detect_mime(path: &Path, data: &[u8]) -> String {
    if let Some(mime) = sniff_mime(data) {
        return mime.to_string();
    }

    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .and_then(|ext| MIME_TYPES.iter().find(|(e, _)| *e == ext).map(|(_, m)| *m))
        .unwrap_or(DEFAULT_MIME)
        .to_string()
}

/// Content sniff. Generic answers defer to the extension table.
fn sniff_mime(data: &[u8]) -> Option<String> {
    data.sniff_mime_type()
        .filter(|mime| !matches!(*mime, "text/plain" | "application/octet-stream"))
        .map(str::to_owned)
}

/// Pixel size from a PNG, GIF, BMP or JPEG header
pub fn image_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        // IHDR is always the first chunk
        if data.len() < 24 || &data[12..16] != b"IHDR" {
            return None;
        }
        return Some((be_u32(&data[16..20]), be_u32(&data[20..24])));
    }

    if data.starts_with(b"GIF8") {
        if data.len() < 10 {
            return None;
        }
        let w = u16::from_le_bytes([data[6], data[7]]) as u32;
        let h = u16::from_le_bytes([data[8], data[9]]) as u32;
        return Some((w, h));
    }

    if data.starts_with(b"BM") {
        if data.len() < 26 {
            return None;
        }
        let w = i32::from_le_bytes([data[18], data[19], data[20], data[21]]);
        let h = i32::from_le_bytes([data[22], data[23], data[24], data[25]]);
        return Some((w.unsigned_abs(), h.unsigned_abs()));
    }

    if data.starts_with(&[0xFF, 0xD8]) {
        return jpeg_dimensions(data);
    }

    None
}

/// Walk JPEG segments until a start-of-frame marker
fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        // Fill bytes and markers without a length
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            pos += 2;
            continue;
        }

        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            if pos + 9 > data.len() {
                return None;
            }
            let h = u16::from_be_bytes([data[pos + 5], data[pos + 6]]) as u32;
            let w = u16::from_be_bytes([data[pos + 7], data[pos + 8]]) as u32;
            return Some((w, h));
        }
        if len < 2 {
            return None;
        }
        pos += 2 + len;
    }
    None
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Minimal PNG header (signature + IHDR) for a `width` x `height` image
    pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut data = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        data.extend_from_slice(&13u32.to_be_bytes());
        data.extend_from_slice(b"IHDR");
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[8, 6, 0, 0, 0]);
        data.extend_from_slice(&[0, 0, 0, 0]);
        data
    }
}
