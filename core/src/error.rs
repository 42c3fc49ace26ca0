//! Error types for the asset bridge.
//!
//! # Design
//! Every failure of an operation is delivered through the `Fetch` handle,
//! never thrown across the main-thread or host-callback boundary.
//! `Connection` and `Request` both carry host-provided error text but are kept
//! apart because the GET and verb entry points judge success differently.
//! `PayloadTooLarge` and `InvalidUrl` are raised before the host is touched,
//! so callers can tell them apart from anything the network produced.

/// Errors returned through a `Fetch`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The upload payload cannot be addressed by the host's transfer buffer.
    #[error("payload of {len} bytes exceeds the {limit} byte upload limit")]
    PayloadTooLarge { len: usize, limit: usize },

    /// The request could not be described to the host.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The host reported a connection-level error for a GET request.
    #[error("Request failed: {0}")]
    Connection(String),

    /// The host reported an error object after a verb/body request.
    #[error("Request failed: {0}")]
    Request(String),

    /// The main-thread queue was dropped before the request was dispatched.
    #[error("main thread queue is closed")]
    MainThreadClosed,

    /// The operation was dropped before anyone resolved it.
    #[error("request was dropped before completing")]
    Abandoned,
}

/// Errors produced while loading a `BridgeConfig`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("malformed config: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_failures_keep_host_text() {
        let err = FetchError::Connection("Cannot resolve destination host".to_string());
        assert_eq!(err.to_string(), "Request failed: Cannot resolve destination host");

        let err = FetchError::Request("HTTP/1.1 404 Not Found".to_string());
        assert_eq!(err.to_string(), "Request failed: HTTP/1.1 404 Not Found");
    }

    #[test]
    fn payload_too_large_reports_sizes() {
        let err = FetchError::PayloadTooLarge { len: 17, limit: 16 };
        assert_eq!(err.to_string(), "payload of 17 bytes exceeds the 16 byte upload limit");
    }

    #[test]
    fn config_error_names_variable() {
        let err = ConfigError::InvalidEnv {
            var: "ASSET_BRIDGE_MAX_UPLOAD_LEN",
            value: "lots".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for ASSET_BRIDGE_MAX_UPLOAD_LEN: \"lots\""
        );
    }
}
