//! Turns user-supplied media into base64 payloads for JSON transport, and back.

use std::io::Read;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::errors::{AdGenError, Result};
use crate::models::ReferenceImage;

/// Base64-encode raw bytes.
pub fn encode_bytes(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Read a file-like handle to the end, once, and encode its contents.
pub fn encode_reader(mut reader: impl Read) -> Result<String> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).map_err(AdGenError::Encoding)?;
    Ok(encode_bytes(&buf))
}

/// Read an image file and encode it as a [`ReferenceImage`].
///
/// The MIME type comes from the file's magic bytes, falling back to its
/// extension, then to `application/octet-stream`.
pub async fn encode_file(path: impl AsRef<Path>) -> Result<ReferenceImage> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(AdGenError::Encoding)?;
    let mime_type = detect_mime(&bytes)
        .or_else(|| mime_from_extension(path))
        .unwrap_or("application/octet-stream");
    log::debug!(
        "encoded {} ({} bytes, {})",
        path.display(),
        bytes.len(),
        mime_type
    );
    Ok(ReferenceImage::from_bytes(&bytes, mime_type))
}

/// Drop a leading `data:<mime>;base64,` scheme prefix, if present.
pub fn strip_data_uri_prefix(input: &str) -> &str {
    if input.starts_with("data:") {
        if let Some((_, payload)) = input.split_once(',') {
            return payload;
        }
    }
    input
}

/// Decode a base64 payload, with or without a `data:` prefix.
pub fn decode(encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(strip_data_uri_prefix(encoded).trim())
        .map_err(|e| AdGenError::Decode(e.to_string()))
}

/// Build a `data:` URI for inline display.
pub fn to_data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", encode_bytes(bytes))
}

/// Sniff common image formats from their magic bytes.
pub fn detect_mime(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => Some("image/png"),
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [b'G', b'I', b'F', b'8', ..] => Some("image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        _ => None,
    }
}

fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
