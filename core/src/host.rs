//! The host engine's web-request stack, as seen by the bridge.
//!
//! # Design
//! One implementation of these traits exists per host backend. The bridge
//! only ever calls `HostNetwork` and `HostRequest` methods from the affinity
//! thread, except for the accessors read inside the completion callback,
//! which the host may invoke on any thread.
//!
//! Capture buffers hold host-managed memory and must be released exactly once.
//! `CaptureBuffer::release` consumes the buffer, and `CaptureGuard` calls it
//! from its destructor so every exit path releases.

use std::mem::ManuallyDrop;

use bytes::Bytes;

/// Callback the host invokes once when a submitted request finishes.
pub type OnCompleted<R> = Box<dyn FnOnce(R) + Send + 'static>;

/// The host's coarse verdict on a finished request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestResult {
    InProgress,
    Success,
    ConnectionError,
    ProtocolError,
    DataProcessingError,
}

/// Factory and transport for host requests.
pub trait HostNetwork: Send + Sync + 'static {
    type Request: HostRequest;
    type Capture: CaptureBuffer;
    type Upload: UploadBuffer;

    /// A fresh buffer to receive one response body.
    fn create_capture_buffer(&self) -> Self::Capture;

    /// A host-managed buffer of exactly `len` bytes, contents unspecified.
    fn allocate_upload_buffer(&self, len: i32) -> Self::Upload;

    /// A GET request writing its response into `capture`.
    fn get(&self, url: &str, capture: &Self::Capture) -> Self::Request;

    /// A request with an arbitrary verb. The request takes ownership of
    /// `upload` and returns its storage to the host when disposed.
    fn create_request(
        &self,
        url: &str,
        verb: &str,
        capture: &Self::Capture,
        upload: Self::Upload,
    ) -> Self::Request;

    /// Submit `request`. The host hands it back through `on_completed` when
    /// the exchange finishes, on a thread of its choosing.
    fn send(&self, request: Self::Request, on_completed: OnCompleted<Self::Request>);
}

/// A host request handle, before and after submission.
pub trait HostRequest: Send + 'static {
    fn set_request_header(&mut self, name: &str, value: &str);

    fn method(&self) -> String;

    fn url(&self) -> String;

    fn is_done(&self) -> bool;

    fn result(&self) -> RequestResult;

    /// Host error text, `None` when the host reports no error object.
    fn error(&self) -> Option<String>;

    fn response_code(&self) -> i64;

    fn response_header(&self, name: &str) -> Option<String>;

    /// Every response header, in the order the host reports them. Backends
    /// that cannot enumerate headers leave this empty and the bridge records
    /// only `Content-Type`.
    fn response_headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Host-managed storage receiving a response body.
pub trait CaptureBuffer: Send + 'static {
    /// Move the received bytes out of the buffer.
    fn take_data(&mut self) -> Bytes;

    /// Return the buffer's storage to the host.
    fn release(self);
}

/// Host-managed storage holding a request payload.
///
/// There is no explicit release call: an upload belongs to the bridge until
/// it is attached to a request, and is dropped unattached when the operation
/// fails before reaching the host (closed queue, bridge torn down). A backend
/// whose uploads are host-managed memory must hand them back in `Drop`.
pub trait UploadBuffer: Send + 'static {
    fn as_mut_slice(&mut self) -> &mut [u8];
}

/// Plain heap memory, for hosts that copy the payload out when the request is
/// created.
impl UploadBuffer for Vec<u8> {
    fn as_mut_slice(&mut self) -> &mut [u8] {
        self
    }
}

/// Releases the wrapped capture buffer when dropped.
///
/// Wrap a buffer the moment the host hands it over, before any other host
/// call that could fail, so every exit path releases it.
pub struct CaptureGuard<C: CaptureBuffer> {
    buffer: ManuallyDrop<C>,
}

impl<C: CaptureBuffer> CaptureGuard<C> {
    pub fn new(buffer: C) -> Self {
        Self {
            buffer: ManuallyDrop::new(buffer),
        }
    }

    /// Borrow the buffer, e.g. to build a request that writes into it.
    pub fn as_inner(&self) -> &C {
        &self.buffer
    }

    pub fn take_data(&mut self) -> Bytes {
        self.buffer.take_data()
    }

    /// Release now rather than at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl<C: CaptureBuffer> Drop for CaptureGuard<C> {
    fn drop(&mut self) {
        // SAFETY: `buffer` is never touched again after this.
        let buffer = unsafe { ManuallyDrop::take(&mut self.buffer) };
        buffer.release();
    }
}
