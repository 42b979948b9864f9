//! Framing header inspection.

use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::HeaderMap;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("multiple conflicting Content-Length headers")]
    DuplicateContentLength,

    #[error("invalid Content-Length header: {0}")]
    InvalidContentLength(String),
}

/// The declared Content-Length, if any.
///
/// Repeated headers are accepted only when they all carry the same value.
pub fn content_length(headers: &HeaderMap) -> Result<Option<u64>, MessageError> {
    let mut length = None;
    for value in headers.get_all(CONTENT_LENGTH) {
        let text = value
            .to_str()
            .map_err(|_| MessageError::InvalidContentLength(String::from_utf8_lossy(value.as_bytes()).into_owned()))?;
        for part in text.split(',') {
            let part = part.trim();
            let parsed: u64 = part
                .parse()
                .map_err(|_| MessageError::InvalidContentLength(part.to_string()))?;
            match length {
                Some(existing) if existing != parsed => return Err(MessageError::DuplicateContentLength),
                _ => length = Some(parsed),
            }
        }
    }
    Ok(length)
}

/// True when the final transfer coding is `chunked`.
pub fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .last()
        .map(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
        .unwrap_or(false)
}

/// True when the headers declare a body: a non-zero length or chunked framing.
pub fn has_body(headers: &HeaderMap) -> Result<bool, MessageError> {
    if is_chunked(headers) {
        return Ok(true);
    }
    Ok(content_length(headers)?.is_some_and(|len| len > 0))
}
