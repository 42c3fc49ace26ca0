//! Request descriptors and result envelopes for the asset bridge.
//!
//! # Design
//! These types describe one HTTP exchange as plain data. A `RequestDescriptor`
//! is what the caller asked for; a `CompletedRequest` is the immutable snapshot
//! taken from the host once its request finishes. Neither type holds a host
//! handle, so both can cross threads (and the FFI boundary) freely.
//!
//! Headers are kept as ordered `(name, value)` pairs: duplicates are allowed
//! and insertion order is the order they are attached to the host request.

use bytes::Bytes;

/// Largest payload the host's upload primitive can address (2^31 - 1 bytes).
pub const MAX_UPLOAD_LEN: usize = i32::MAX as usize;

/// An HTTP request as the caller described it.
///
/// Owned by exactly one in-flight operation. The payload is not part of the
/// descriptor: it is copied into a host upload buffer before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl RequestDescriptor {
    pub fn new(method: &str, url: &str, headers: Vec<(String, String)>) -> Self {
        Self {
            method: method.to_string(),
            url: url.to_string(),
            headers,
        }
    }

    pub fn get(url: &str, headers: Vec<(String, String)>) -> Self {
        Self::new("GET", url, headers)
    }
}

/// Snapshot of a finished response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetResponse {
    status: u16,
    content_type: String,
    headers: Vec<(String, String)>,
    data: Bytes,
}

impl AssetResponse {
    pub fn new(status: u16, content_type: String, headers: Vec<(String, String)>, data: Bytes) -> Self {
        Self {
            status,
            content_type,
            headers,
            data,
        }
    }

    /// HTTP status code, or 0 if the host reported a code outside `u16`.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// The `Content-Type` response header, empty when the server sent none.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Get the first header value matching `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

/// The success envelope of one operation: the request as sent plus the
/// response it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedRequest {
    method: String,
    url: String,
    headers: Vec<(String, String)>,
    response: AssetResponse,
}

impl CompletedRequest {
    pub fn new(method: String, url: String, headers: Vec<(String, String)>, response: AssetResponse) -> Self {
        Self {
            method,
            url,
            headers,
            response,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request headers in the order they were attached.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn response(&self) -> &AssetResponse {
        &self.response
    }

    pub fn into_response(self) -> AssetResponse {
        self.response
    }
}
