//! Binary-safe multipart/form-data parsing for image uploads.
//!
//! Image payloads contain NUL bytes and every other byte value, so anything
//! past the part headers is located with an explicit substring search over
//! byte slices. The part headers themselves are searched the same way; only
//! the extracted filename is ever treated as text.

use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MultipartError {
    #[error("no filename in Content-Disposition")]
    MissingFilename,

    #[error("filename terminator not found")]
    UnterminatedFilename,

    #[error("part Content-Type header missing")]
    MissingPartContentType,

    #[error("part headers are not terminated")]
    UnterminatedHeaders,

    #[error("closing boundary not found")]
    MissingBoundary,

    #[error("image payload is empty")]
    EmptyPayload,
}

/// The single file part of an upload body. `payload` indexes into the body
/// buffer the part was parsed from.
#[derive(Debug, PartialEq, Eq)]
pub struct Part {
    pub file_name: String,
    pub payload: Range<usize>,
}

/// Extract the boundary parameter from a `Content-Type` header value.
/// Requires the value to be `multipart/form-data` with a `boundary=`.
pub fn boundary(content_type: &str) -> Option<&str> {
    if !content_type.trim_start().starts_with("multipart/form-data") {
        return None;
    }
    let rest = content_type.split_once("boundary=")?.1;
    let end = rest.find(';').unwrap_or(rest.len());
    let value = rest[..end].trim().trim_matches('"');
    (!value.is_empty()).then_some(value)
}

/// Parse the first (and only) file part out of `body`.
pub fn parse(body: &[u8], boundary: &str) -> Result<Part, MultipartError> {
    let delimiter = format!("--{boundary}").into_bytes();

    let name_at = find(body, b"filename=").ok_or(MultipartError::MissingFilename)?;
    let mut name_start = name_at + b"filename=".len();
    let terminator: &[u8] = if body.get(name_start) == Some(&b'"') {
        name_start += 1;
        b"\""
    } else {
        b"\r\n"
    };
    let name_len =
        find(&body[name_start..], terminator).ok_or(MultipartError::UnterminatedFilename)?;
    let file_name = String::from_utf8_lossy(&body[name_start..name_start + name_len]).into_owned();

    let after_name = name_start + name_len;
    let headers_len =
        find(&body[after_name..], b"\r\n\r\n").ok_or(MultipartError::UnterminatedHeaders)?;
    if find(&body[after_name..after_name + headers_len], b"Content-Type").is_none() {
        return Err(MultipartError::MissingPartContentType);
    }

    let payload_start = after_name + headers_len + 4;
    let close = find(&body[payload_start..], &delimiter).ok_or(MultipartError::MissingBoundary)?;
    // The payload ends at the \r\n that precedes the closing delimiter.
    if close <= 2 {
        return Err(MultipartError::EmptyPayload);
    }

    Ok(Part {
        file_name,
        payload: payload_start..payload_start + close - 2,
    })
}

/// KMP substring search over raw bytes. The haystack is arbitrary binary
/// data; NULs carry no meaning.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if haystack.len() < needle.len() {
        return None;
    }

    let mut prefix = vec![0usize; needle.len()];
    let mut k = 0;
    for i in 1..needle.len() {
        while k > 0 && needle[i] != needle[k] {
            k = prefix[k - 1];
        }
        if needle[i] == needle[k] {
            k += 1;
        }
        prefix[i] = k;
    }

    let mut k = 0;
    for (i, &b) in haystack.iter().enumerate() {
        while k > 0 && b != needle[k] {
            k = prefix[k - 1];
        }
        if b == needle[k] {
            k += 1;
        }
        if k == needle.len() {
            return Some(i + 1 - k);
        }
    }
    None
}
