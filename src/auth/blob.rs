// src/auth/blob.rs

//! Transcoding between wire blobs (base64 header text) and binary blobs.
//!
//! An absent or empty blob means "no payload this round" in both
//! representations, so both functions map it to `None`.

use base64::Engine as _;

use crate::error;
use crate::Result;

/// Decode a wire blob into bytes.
///
/// `None`, empty, or whitespace-only text decodes to `None`. Any other text
/// must be standard base64, otherwise this fails with a malformed-blob error
/// and the blob never reaches the security context.
pub fn decode(text: Option<&str>) -> Result<Option<Vec<u8>>> {
    let text = match text.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return Ok(None),
    };

    base64::engine::general_purpose::STANDARD
        .decode(text)
        .map(Some)
        .map_err(error::malformed_blob)
}

/// Encode bytes into a wire blob. `None` or empty bytes encode to `None`.
pub fn encode(bytes: Option<&[u8]>) -> Option<String> {
    match bytes {
        Some(b) if !b.is_empty() => Some(base64::engine::general_purpose::STANDARD.encode(b)),
        _ => None,
    }
}
