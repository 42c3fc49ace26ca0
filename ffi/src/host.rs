//! `HostNetwork` implemented over a C function-pointer table.
//!
//! # Design
//! The C host owns request handles; the bridge owns everything else. Capture
//! and upload storage is Rust memory: uploads are handed to the host by
//! pointer and kept alive by the owning `FfiRequest` until `release_request`,
//! and response bodies are copied into the capture buffer when the host calls
//! `asset_bridge_complete`.

use std::ffi::{c_void, CString};
use std::os::raw::c_char;
use std::sync::{Arc, Mutex, PoisonError};

use asset_bridge_core::{CaptureBuffer, HostNetwork, HostRequest, OnCompleted, RequestResult};
use bytes::Bytes;

use crate::types::{read_c_str, read_headers, FfiHostOutcome, FfiHostVTable, FfiRequestResult};

type CreateRequestFn = extern "C" fn(*mut c_void, *const c_char, *const c_char, *const u8, i32) -> u64;
type SetHeaderFn = extern "C" fn(*mut c_void, u64, *const c_char, *const c_char);
type SendFn = extern "C" fn(*mut c_void, u64, *mut FfiCompletionToken);
type ReleaseFn = extern "C" fn(*mut c_void, u64);

/// A vtable with every callback present.
struct Callbacks {
    user_data: *mut c_void,
    create_request: CreateRequestFn,
    set_request_header: SetHeaderFn,
    send: SendFn,
    release_request: ReleaseFn,
}

// SAFETY: `user_data` is opaque to Rust and only ever passed back to the host.
// The vtable contract makes the host responsible for its thread safety.
unsafe impl Send for Callbacks {}
unsafe impl Sync for Callbacks {}

/// The C host's web-request stack.
#[derive(Clone)]
pub struct FfiHost {
    callbacks: Arc<Callbacks>,
}

impl FfiHost {
    /// Copy `vtable`, or `None` if any callback is missing.
    pub fn from_vtable(vtable: &FfiHostVTable) -> Option<Self> {
        let callbacks = Callbacks {
            user_data: vtable.user_data,
            create_request: vtable.create_request?,
            set_request_header: vtable.set_request_header?,
            send: vtable.send?,
            release_request: vtable.release_request?,
        };
        Some(Self {
            callbacks: Arc::new(callbacks),
        })
    }

    fn create(&self, method: &str, url: &str, upload: Vec<u8>, capture: &FfiCapture) -> FfiRequest {
        let c_method = to_c(method);
        let c_url = to_c(url);
        let (upload_ptr, upload_len) = if upload.is_empty() {
            (std::ptr::null(), 0)
        } else {
            // Length was checked against i32::MAX before allocation.
            (upload.as_ptr(), upload.len() as i32)
        };
        let handle = (self.callbacks.create_request)(
            self.callbacks.user_data,
            c_method.as_ptr(),
            c_url.as_ptr(),
            upload_ptr,
            upload_len,
        );
        tracing::trace!(handle, %method, %url, "host request created");
        FfiRequest {
            callbacks: Arc::clone(&self.callbacks),
            handle,
            method: method.to_string(),
            url: url.to_string(),
            _upload: upload,
            capture: Arc::clone(&capture.data),
            outcome: None,
        }
    }
}

impl HostNetwork for FfiHost {
    type Request = FfiRequest;
    type Capture = FfiCapture;
    type Upload = Vec<u8>;

    fn create_capture_buffer(&self) -> FfiCapture {
        FfiCapture {
            data: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn allocate_upload_buffer(&self, len: i32) -> Vec<u8> {
        vec![0; usize::try_from(len).unwrap_or(0)]
    }

    fn get(&self, url: &str, capture: &FfiCapture) -> FfiRequest {
        self.create("GET", url, Vec::new(), capture)
    }

    fn create_request(&self, url: &str, verb: &str, capture: &FfiCapture, upload: Vec<u8>) -> FfiRequest {
        self.create(verb, url, upload, capture)
    }

    fn send(&self, request: FfiRequest, on_completed: OnCompleted<FfiRequest>) {
        let handle = request.handle;
        let token = Box::into_raw(Box::new(FfiCompletionToken {
            request,
            on_completed,
        }));
        (self.callbacks.send)(self.callbacks.user_data, handle, token);
    }
}

/// Response body storage, filled by `asset_bridge_complete`.
///
/// The memory is the bridge's, never the C host's, so releasing it just
/// frees the bytes. The `FfiRequest` sharing the storage may outlive the
/// release; it then sees an empty buffer.
pub struct FfiCapture {
    data: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer for FfiCapture {
    fn take_data(&mut self) -> Bytes {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        Bytes::from(std::mem::take(&mut *data))
    }

    fn release(self) {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        *data = Vec::new();
        tracing::trace!("capture buffer released");
    }
}

/// What the host reported, copied out of `FfiHostOutcome`.
#[derive(Debug, Default)]
struct HostReport {
    is_done: bool,
    result: Option<RequestResult>,
    response_code: i64,
    error: Option<String>,
    headers: Vec<(String, String)>,
}

/// One host request handle plus the upload it reads from.
pub struct FfiRequest {
    callbacks: Arc<Callbacks>,
    handle: u64,
    method: String,
    url: String,
    _upload: Vec<u8>,
    capture: Arc<Mutex<Vec<u8>>>,
    outcome: Option<HostReport>,
}

impl FfiRequest {
    /// Record the host's report and copy its body into the capture buffer.
    ///
    /// # Safety
    /// `outcome` must be null or point to a valid `FfiHostOutcome` whose
    /// pointers are valid for the duration of the call.
    unsafe fn record(&mut self, outcome: *const FfiHostOutcome) {
        if outcome.is_null() {
            tracing::warn!(handle = self.handle, "host completed a request without an outcome");
            self.outcome = Some(HostReport {
                is_done: true,
                result: Some(RequestResult::ConnectionError),
                error: Some("host reported no outcome".to_string()),
                ..HostReport::default()
            });
            return;
        }
        let outcome = unsafe { &*outcome };
        let mut error = unsafe { read_c_str(outcome.error) };
        let result = match FfiRequestResult::try_from(outcome.result) {
            Ok(result) => RequestResult::from(result),
            Err(code) => {
                tracing::warn!(handle = self.handle, code, "host reported an unknown request result");
                error.get_or_insert_with(|| format!("unknown host result code {code}"));
                RequestResult::ConnectionError
            }
        };
        if !outcome.body.is_null() && outcome.body_len > 0 {
            let body = unsafe { std::slice::from_raw_parts(outcome.body, outcome.body_len) };
            let mut capture = self.capture.lock().unwrap_or_else(PoisonError::into_inner);
            capture.extend_from_slice(body);
        }
        self.outcome = Some(HostReport {
            is_done: outcome.is_done,
            result: Some(result),
            response_code: outcome.response_code,
            error,
            headers: unsafe { read_headers(outcome.headers, outcome.headers_len) },
        });
    }
}

impl HostRequest for FfiRequest {
    fn set_request_header(&mut self, name: &str, value: &str) {
        let c_name = to_c(name);
        let c_value = to_c(value);
        (self.callbacks.set_request_header)(
            self.callbacks.user_data,
            self.handle,
            c_name.as_ptr(),
            c_value.as_ptr(),
        );
    }

    fn method(&self) -> String {
        self.method.clone()
    }

    fn url(&self) -> String {
        self.url.clone()
    }

    fn is_done(&self) -> bool {
        self.outcome.as_ref().is_some_and(|o| o.is_done)
    }

    fn result(&self) -> RequestResult {
        self.outcome
            .as_ref()
            .and_then(|o| o.result)
            .unwrap_or(RequestResult::InProgress)
    }

    fn error(&self) -> Option<String> {
        self.outcome.as_ref().and_then(|o| o.error.clone())
    }

    fn response_code(&self) -> i64 {
        self.outcome.as_ref().map_or(0, |o| o.response_code)
    }

    fn response_header(&self, name: &str) -> Option<String> {
        self.outcome.as_ref().and_then(|o| {
            o.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
        })
    }

    fn response_headers(&self) -> Vec<(String, String)> {
        self.outcome
            .as_ref()
            .map(|o| o.headers.clone())
            .unwrap_or_default()
    }
}

impl Drop for FfiRequest {
    fn drop(&mut self) {
        tracing::trace!(handle = self.handle, "host request released");
        (self.callbacks.release_request)(self.callbacks.user_data, self.handle);
    }
}

/// A submitted request waiting for `asset_bridge_complete`.
///
/// Opaque to C. Dropping a token without completing it releases the request
/// and resolves the operation as abandoned.
pub struct FfiCompletionToken {
    request: FfiRequest,
    on_completed: OnCompleted<FfiRequest>,
}

impl FfiCompletionToken {
    /// Record `outcome` and hand the request back to the bridge.
    ///
    /// # Safety
    /// See `FfiRequest::record`.
    pub(crate) unsafe fn complete(self, outcome: *const FfiHostOutcome) {
        let Self {
            mut request,
            on_completed,
        } = self;
        unsafe { request.record(outcome) };
        on_completed(request);
    }
}

fn to_c(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}
