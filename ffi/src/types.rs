//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Input types (`FfiHeader`, `FfiHostOutcome`, `FfiHostVTable`) are borrowed
//! from the C caller and never freed here. Output types (`FfiFetchResult` and
//! everything it points to) are heap-allocated by this library and released
//! with `asset_bridge_free_result`. Conversion functions live here to keep
//! `lib.rs` focused on the `extern "C"` surface.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::sync::Mutex;

use asset_bridge_core::{
    AssetAccessor, CompletedRequest, Fetch, FetchError, FetchResult, MainThreadDispatcher,
    MainThreadQueue, RequestResult,
};

use crate::host::{FfiCompletionToken, FfiHost};

/// Opaque handle to a bridge. C callers receive a pointer to this and pass it
/// back into every `asset_bridge_*` function.
pub struct FfiAssetBridge {
    pub(crate) accessor: AssetAccessor<FfiHost, MainThreadDispatcher>,
    pub(crate) queue: Mutex<MainThreadQueue>,
}

/// Opaque handle to one pending operation.
pub struct FfiFetch {
    pub(crate) inner: Fetch,
}

// ---------------------------------------------------------------------------
// Host-provided types
// ---------------------------------------------------------------------------

/// A header as a borrowed pair of C strings.
#[repr(C)]
pub struct FfiHeader {
    pub name: *const c_char,
    pub value: *const c_char,
}

/// The host's verdict on a finished request. Passed across the boundary as
/// an `int32_t` in `FfiHostOutcome::result`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiRequestResult {
    InProgress = 0,
    Success = 1,
    ConnectionError = 2,
    ProtocolError = 3,
    DataProcessingError = 4,
}

impl TryFrom<i32> for FfiRequestResult {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, i32> {
        match code {
            0 => Ok(FfiRequestResult::InProgress),
            1 => Ok(FfiRequestResult::Success),
            2 => Ok(FfiRequestResult::ConnectionError),
            3 => Ok(FfiRequestResult::ProtocolError),
            4 => Ok(FfiRequestResult::DataProcessingError),
            other => Err(other),
        }
    }
}

impl From<FfiRequestResult> for RequestResult {
    fn from(r: FfiRequestResult) -> Self {
        match r {
            FfiRequestResult::InProgress => RequestResult::InProgress,
            FfiRequestResult::Success => RequestResult::Success,
            FfiRequestResult::ConnectionError => RequestResult::ConnectionError,
            FfiRequestResult::ProtocolError => RequestResult::ProtocolError,
            FfiRequestResult::DataProcessingError => RequestResult::DataProcessingError,
        }
    }
}

/// What the host reports through `asset_bridge_complete`.
///
/// `result` holds an `FfiRequestResult` value; anything else fails the
/// request. `error` is null when the host has no error object. `body` may be null
/// when `body_len` is 0. The bridge copies everything it needs before
/// `asset_bridge_complete` returns.
#[repr(C)]
pub struct FfiHostOutcome {
    pub is_done: bool,
    pub result: i32,
    pub response_code: i64,
    pub error: *const c_char,
    pub headers: *const FfiHeader,
    pub headers_len: u32,
    pub body: *const u8,
    pub body_len: usize,
}

/// The engine's web-request stack as function pointers.
///
/// Every callback receives `user_data` unchanged. `create_request`,
/// `set_request_header` and `send` are only called from the thread running
/// `asset_bridge_run_main_thread_tasks`; `release_request` may be called from
/// whichever thread called `asset_bridge_complete`.
#[repr(C)]
pub struct FfiHostVTable {
    pub user_data: *mut c_void,

    /// Create a request and return a non-zero handle. `upload` is null for
    /// GET requests; otherwise it stays valid until `release_request`.
    pub create_request: Option<
        extern "C" fn(
            user_data: *mut c_void,
            method: *const c_char,
            url: *const c_char,
            upload: *const u8,
            upload_len: i32,
        ) -> u64,
    >,

    pub set_request_header: Option<
        extern "C" fn(user_data: *mut c_void, request: u64, name: *const c_char, value: *const c_char),
    >,

    /// Submit the request. The host must pass `token` to
    /// `asset_bridge_complete` exactly once.
    pub send: Option<extern "C" fn(user_data: *mut c_void, request: u64, token: *mut FfiCompletionToken)>,

    /// The bridge is done with `request`; free it and its upload storage.
    pub release_request: Option<extern "C" fn(user_data: *mut c_void, request: u64)>,
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Error codes returned in `FfiFetchResult`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    PayloadTooLarge = 1,
    InvalidUrl = 2,
    Connection = 3,
    Request = 4,
    MainThreadClosed = 5,
    Abandoned = 6,
    NullArg = 7,
    Panic = 8,
}

impl From<&FetchError> for FfiErrorCode {
    fn from(err: &FetchError) -> Self {
        match err {
            FetchError::PayloadTooLarge { .. } => FfiErrorCode::PayloadTooLarge,
            FetchError::InvalidUrl(_) => FfiErrorCode::InvalidUrl,
            FetchError::Connection(_) => FfiErrorCode::Connection,
            FetchError::Request(_) => FfiErrorCode::Request,
            FetchError::MainThreadClosed => FfiErrorCode::MainThreadClosed,
            FetchError::Abandoned => FfiErrorCode::Abandoned,
        }
    }
}

/// A header owned by an `FfiFetchResult`.
#[repr(C)]
pub struct FfiOwnedHeader {
    pub name: *mut c_char,
    pub value: *mut c_char,
}

/// Result envelope for a finished operation.
///
/// On success `error_code` is `Ok`, `error_message` is null and the remaining
/// fields describe the response. On failure `error_code` describes the
/// category, `error_message` is a human-readable C string, and every other
/// pointer is null.
#[repr(C)]
pub struct FfiFetchResult {
    pub error_code: FfiErrorCode,
    pub error_message: *mut c_char,
    pub status: u16,
    pub method: *mut c_char,
    pub url: *mut c_char,
    pub content_type: *mut c_char,
    pub headers: *mut FfiOwnedHeader,
    pub headers_len: u32,
    pub body: *mut u8,
    pub body_len: usize,
}

impl FfiFetchResult {
    pub(crate) fn from_result(result: FetchResult) -> *mut Self {
        match result {
            Ok(completed) => Self::ok(completed),
            Err(err) => Self::from_error(&err),
        }
    }

    /// Build a success result from a completed request.
    pub(crate) fn ok(completed: CompletedRequest) -> *mut Self {
        let method = c_string(completed.method());
        let url = c_string(completed.url());
        let response = completed.into_response();

        let headers_len = response.headers().len() as u32;
        let headers = if response.headers().is_empty() {
            std::ptr::null_mut()
        } else {
            let owned: Box<[FfiOwnedHeader]> = response
                .headers()
                .iter()
                .map(|(k, v)| FfiOwnedHeader {
                    name: c_string(k),
                    value: c_string(v),
                })
                .collect();
            Box::into_raw(owned) as *mut FfiOwnedHeader
        };

        let body_len = response.data().len();
        let body = if body_len == 0 {
            std::ptr::null_mut()
        } else {
            let owned: Box<[u8]> = response.data().to_vec().into_boxed_slice();
            Box::into_raw(owned) as *mut u8
        };

        let result = Box::new(FfiFetchResult {
            error_code: FfiErrorCode::Ok,
            error_message: std::ptr::null_mut(),
            status: response.status(),
            method,
            url,
            content_type: c_string(response.content_type()),
            headers,
            headers_len,
            body,
            body_len,
        });
        Box::into_raw(result)
    }

    /// Build an error result from a `FetchError`.
    pub(crate) fn from_error(err: &FetchError) -> *mut Self {
        Self::error(err.into(), &err.to_string())
    }

    /// Build an error result for a null argument.
    pub(crate) fn null_arg(name: &str) -> *mut Self {
        Self::error(FfiErrorCode::NullArg, &format!("null argument: {name}"))
    }

    /// Build an error result for a caught panic.
    pub(crate) fn panic(msg: &str) -> *mut Self {
        Self::error(FfiErrorCode::Panic, msg)
    }

    fn error(error_code: FfiErrorCode, msg: &str) -> *mut Self {
        let result = Box::new(FfiFetchResult {
            error_code,
            error_message: c_string(msg),
            status: 0,
            method: std::ptr::null_mut(),
            url: std::ptr::null_mut(),
            content_type: std::ptr::null_mut(),
            headers: std::ptr::null_mut(),
            headers_len: 0,
            body: std::ptr::null_mut(),
            body_len: 0,
        });
        Box::into_raw(result)
    }
}

// ---------------------------------------------------------------------------
// String helpers
// ---------------------------------------------------------------------------

/// Allocate a C string. Interior NULs are dropped rather than failing.
pub(crate) fn c_string(s: &str) -> *mut c_char {
    CString::new(s.replace('\0', ""))
        .unwrap_or_default()
        .into_raw()
}

/// Copy a borrowed C string, or `None` for null.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
pub(crate) unsafe fn read_c_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// Copy a borrowed header array. Entries with a null name are skipped; a null
/// value reads as empty.
///
/// # Safety
/// `headers` must be null or point to `len` valid `FfiHeader`s.
pub(crate) unsafe fn read_headers(headers: *const FfiHeader, len: u32) -> Vec<(String, String)> {
    if headers.is_null() || len == 0 {
        return Vec::new();
    }
    let slice = unsafe { std::slice::from_raw_parts(headers, len as usize) };
    slice
        .iter()
        .filter_map(|h| {
            let name = unsafe { read_c_str(h.name) }?;
            let value = unsafe { read_c_str(h.value) }.unwrap_or_default();
            Some((name, value))
        })
        .collect()
}

/// Free the C-string fields of an `FfiOwnedHeader` (but not the struct itself).
pub(crate) fn free_owned_header_fields(header: &FfiOwnedHeader) {
    free_c_string(header.name);
    free_c_string(header.value);
}

pub(crate) fn free_c_string(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}
