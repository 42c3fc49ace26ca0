//! Affinity-constrained HTTP bridge over a host engine's web-request stack.
//!
//! # Design
//! `AssetAccessor` returns a pending `Fetch` immediately. Building and sending
//! the host request happens later, on the affinity thread, inside a task
//! handed to the `AffinityExecutor`. The host calls back on a thread of its
//! choosing; the callback snapshots the finished request, releases the capture
//! buffer, and only then resolves the `Fetch`.
//!
//! The two entry points judge success differently, mirroring the two host
//! APIs they use:
//! - `fetch` (GET): done and the host result is not `ConnectionError`. An HTTP
//!   404 therefore resolves successfully with status 404.
//! - `request` (any verb): done and the host reports no error object. Hosts
//!   usually attach an error to 4xx/5xx responses, so those are rejected.

use std::sync::Arc;

use crate::completion::{completion_pair, Completion, Fetch};
use crate::config::BridgeConfig;
use crate::dispatch::AffinityExecutor;
use crate::error::FetchError;
use crate::host::{CaptureBuffer, CaptureGuard, HostNetwork, HostRequest, RequestResult, UploadBuffer};
use crate::http::{AssetResponse, CompletedRequest, RequestDescriptor, MAX_UPLOAD_LEN};

/// How a finished host request is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SuccessRule {
    /// GET path: anything but a connection-level error.
    NotConnectionError,
    /// Verb/body path: no error object at all.
    NoError,
}

impl SuccessRule {
    fn succeeded<R: HostRequest>(self, request: &R) -> bool {
        if !request.is_done() {
            return false;
        }
        match self {
            SuccessRule::NotConnectionError => request.result() != RequestResult::ConnectionError,
            SuccessRule::NoError => request.error().is_none(),
        }
    }

    fn failure(self, message: String) -> FetchError {
        match self {
            SuccessRule::NotConnectionError => FetchError::Connection(message),
            SuccessRule::NoError => FetchError::Request(message),
        }
    }
}

/// Issues HTTP requests through a host whose network API is bound to one
/// thread.
pub struct AssetAccessor<H: HostNetwork, E: AffinityExecutor> {
    host: Arc<H>,
    executor: E,
    max_upload_len: usize,
}

impl<H: HostNetwork, E: AffinityExecutor> AssetAccessor<H, E> {
    pub fn new(host: H, executor: E) -> Self {
        Self::with_config(host, executor, &BridgeConfig::default())
    }

    pub fn with_config(host: H, executor: E, config: &BridgeConfig) -> Self {
        Self {
            host: Arc::new(host),
            executor,
            max_upload_len: config.max_upload_len.min(MAX_UPLOAD_LEN),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// GET `url`, attaching `headers` in order.
    pub fn fetch(&self, url: &str, headers: Vec<(String, String)>) -> Fetch {
        if url.is_empty() {
            return Fetch::ready(Err(FetchError::InvalidUrl("empty url".to_string())));
        }

        let descriptor = RequestDescriptor::get(url, headers);
        let host = Arc::clone(&self.host);
        self.dispatch(descriptor.clone(), move |completion| {
            let capture = CaptureGuard::new(host.create_capture_buffer());
            let request = host.get(&descriptor.url, capture.as_inner());
            submit(&*host, request, capture, descriptor, SuccessRule::NotConnectionError, completion);
        })
    }

    /// Send `payload` with an arbitrary verb.
    ///
    /// The payload is copied into a host upload buffer on the calling thread.
    /// A payload over the upload limit fails immediately without touching the
    /// host or the affinity thread.
    pub fn request(
        &self,
        verb: &str,
        url: &str,
        headers: Vec<(String, String)>,
        payload: &[u8],
    ) -> Fetch {
        if exceeds_upload_limit(payload.len(), self.max_upload_len) {
            tracing::warn!(
                method = verb,
                url,
                len = payload.len(),
                limit = self.max_upload_len,
                "payload too large for host upload buffer"
            );
            return Fetch::ready(Err(FetchError::PayloadTooLarge {
                len: payload.len(),
                limit: self.max_upload_len,
            }));
        }
        if url.is_empty() {
            return Fetch::ready(Err(FetchError::InvalidUrl("empty url".to_string())));
        }

        // Bounded by `exceeds_upload_limit` above.
        let len = payload.len() as i32;
        let mut upload = self.host.allocate_upload_buffer(len);
        upload.as_mut_slice().copy_from_slice(payload);

        let descriptor = RequestDescriptor::new(verb, url, headers);
        let host = Arc::clone(&self.host);
        self.dispatch(descriptor.clone(), move |completion| {
            let capture = CaptureGuard::new(host.create_capture_buffer());
            let request = host.create_request(&descriptor.url, &descriptor.method, capture.as_inner(), upload);
            submit(&*host, request, capture, descriptor, SuccessRule::NoError, completion);
        })
    }

    /// Per-frame hook. Completion is callback driven, so there is nothing to
    /// poll.
    pub fn tick(&self) {}

    fn dispatch(
        &self,
        descriptor: RequestDescriptor,
        build: impl FnOnce(Completion) + Send + 'static,
    ) -> Fetch {
        let (completion, fetch) = completion_pair();
        let scheduled = self
            .executor
            .run_in_main_thread(Box::new(move || build(completion)));
        match scheduled {
            Ok(()) => {
                tracing::debug!(method = %descriptor.method, url = %descriptor.url, "request queued for main thread");
                fetch
            }
            Err(err) => {
                tracing::warn!(method = %descriptor.method, url = %descriptor.url, %err, "could not reach main thread");
                Fetch::ready(Err(err))
            }
        }
    }
}

/// Whether a payload of `len` bytes is over `limit` or the host's hard cap.
pub fn exceeds_upload_limit(len: usize, limit: usize) -> bool {
    len > limit.min(MAX_UPLOAD_LEN)
}

/// Attach headers, send, and wire the completion callback. Runs on the
/// affinity thread.
fn submit<H: HostNetwork>(
    host: &H,
    mut request: H::Request,
    capture: CaptureGuard<H::Capture>,
    descriptor: RequestDescriptor,
    rule: SuccessRule,
    completion: Completion,
) {
    for (name, value) in &descriptor.headers {
        request.set_request_header(name, value);
    }

    tracing::debug!(method = %descriptor.method, url = %descriptor.url, "sending request");
    host.send(
        request,
        Box::new(move |request| complete(request, capture, descriptor.headers, rule, completion)),
    );
}

/// Completion callback body. Runs on whichever thread the host chooses.
fn complete<R: HostRequest, C: CaptureBuffer>(
    request: R,
    mut capture: CaptureGuard<C>,
    request_headers: Vec<(String, String)>,
    rule: SuccessRule,
    completion: Completion,
) {
    let outcome = if rule.succeeded(&request) {
        let data = capture.take_data();
        Ok(snapshot(&request, request_headers, data))
    } else {
        let message = request.error().unwrap_or_default();
        tracing::warn!(method = %request.method(), url = %request.url(), error = %message, "request failed");
        Err(rule.failure(message))
    };
    capture.release();

    if let Ok(completed) = &outcome {
        tracing::debug!(
            method = completed.method(),
            url = completed.url(),
            status = completed.response().status(),
            len = completed.response().data().len(),
            "request completed"
        );
    }
    completion.settle(outcome);
}

fn snapshot<R: HostRequest>(
    request: &R,
    request_headers: Vec<(String, String)>,
    data: bytes::Bytes,
) -> CompletedRequest {
    let status = u16::try_from(request.response_code()).unwrap_or(0);
    let content_type = request.response_header("Content-Type");

    let mut headers = request.response_headers();
    if let Some(content_type) = &content_type {
        if !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("Content-Type")) {
            headers.push(("Content-Type".to_string(), content_type.clone()));
        }
    }

    let response = AssetResponse::new(status, content_type.unwrap_or_default(), headers, data);
    CompletedRequest::new(request.method(), request.url(), request_headers, response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::MainThreadTask;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubRequest {
        done: bool,
        result: RequestResult,
        error: Option<String>,
        code: i64,
        headers: Vec<(String, String)>,
    }

    impl StubRequest {
        fn finished(code: i64) -> Self {
            Self {
                done: true,
                result: RequestResult::Success,
                error: None,
                code,
                headers: Vec::new(),
            }
        }
    }

    impl HostRequest for StubRequest {
        fn set_request_header(&mut self, _name: &str, _value: &str) {}

        fn method(&self) -> String {
            "GET".to_string()
        }

        fn url(&self) -> String {
            "https://example.com/layer.json".to_string()
        }

        fn is_done(&self) -> bool {
            self.done
        }

        fn result(&self) -> RequestResult {
            self.result
        }

        fn error(&self) -> Option<String> {
            self.error.clone()
        }

        fn response_code(&self) -> i64 {
            self.code
        }

        fn response_header(&self, name: &str) -> Option<String> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
        }

        fn response_headers(&self) -> Vec<(String, String)> {
            self.headers.clone()
        }
    }

    /// A host that must never be reached.
    struct UnreachableHost;

    impl HostNetwork for UnreachableHost {
        type Request = StubRequest;
        type Capture = NoCapture;
        type Upload = Vec<u8>;

        fn create_capture_buffer(&self) -> NoCapture {
            panic!("host touched")
        }

        fn allocate_upload_buffer(&self, _len: i32) -> Vec<u8> {
            panic!("host touched")
        }

        fn get(&self, _url: &str, _capture: &NoCapture) -> StubRequest {
            panic!("host touched")
        }

        fn create_request(&self, _url: &str, _verb: &str, _capture: &NoCapture, _upload: Vec<u8>) -> StubRequest {
            panic!("host touched")
        }

        fn send(&self, _request: StubRequest, _on_completed: crate::host::OnCompleted<StubRequest>) {
            panic!("host touched")
        }
    }

    struct NoCapture;

    impl CaptureBuffer for NoCapture {
        fn take_data(&mut self) -> Bytes {
            Bytes::new()
        }

        fn release(self) {}
    }

    struct RefusingExecutor;

    impl AffinityExecutor for RefusingExecutor {
        fn run_in_main_thread(&self, _task: MainThreadTask) -> Result<(), FetchError> {
            panic!("executor touched")
        }
    }

    /// Upload memory that reports when it is handed back.
    struct TrackedUpload {
        data: Vec<u8>,
        drops: Arc<AtomicUsize>,
    }

    impl UploadBuffer for TrackedUpload {
        fn as_mut_slice(&mut self) -> &mut [u8] {
            &mut self.data
        }
    }

    impl Drop for TrackedUpload {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Hands out tracked uploads and never expects a request.
    struct UploadOnlyHost {
        drops: Arc<AtomicUsize>,
    }

    impl HostNetwork for UploadOnlyHost {
        type Request = StubRequest;
        type Capture = NoCapture;
        type Upload = TrackedUpload;

        fn create_capture_buffer(&self) -> NoCapture {
            panic!("host touched")
        }

        fn allocate_upload_buffer(&self, len: i32) -> TrackedUpload {
            TrackedUpload {
                data: vec![0; len as usize],
                drops: Arc::clone(&self.drops),
            }
        }

        fn get(&self, _url: &str, _capture: &NoCapture) -> StubRequest {
            panic!("host touched")
        }

        fn create_request(&self, _url: &str, _verb: &str, _capture: &NoCapture, _upload: TrackedUpload) -> StubRequest {
            panic!("host touched")
        }

        fn send(&self, _request: StubRequest, _on_completed: crate::host::OnCompleted<StubRequest>) {
            panic!("host touched")
        }
    }

    struct ClosedExecutor;

    impl AffinityExecutor for ClosedExecutor {
        fn run_in_main_thread(&self, _task: MainThreadTask) -> Result<(), FetchError> {
            Err(FetchError::MainThreadClosed)
        }
    }

    #[test]
    fn upload_limit_boundary() {
        assert!(!exceeds_upload_limit(MAX_UPLOAD_LEN, MAX_UPLOAD_LEN));
        assert!(exceeds_upload_limit(MAX_UPLOAD_LEN + 1, MAX_UPLOAD_LEN));
        assert!(exceeds_upload_limit(MAX_UPLOAD_LEN + 1, usize::MAX));
        assert!(!exceeds_upload_limit(0, 0));
    }

    #[test]
    fn oversized_payload_fails_without_host_or_executor() {
        let config = BridgeConfig {
            max_upload_len: 4,
            ..BridgeConfig::default()
        };
        let accessor = AssetAccessor::with_config(UnreachableHost, RefusingExecutor, &config);
        let mut fetch = accessor.request("POST", "https://example.com/upload", Vec::new(), b"12345");
        assert_eq!(
            fetch.try_take(),
            Some(Err(FetchError::PayloadTooLarge { len: 5, limit: 4 }))
        );
    }

    #[test]
    fn unattached_upload_is_dropped_when_main_thread_is_gone() {
        let drops = Arc::new(AtomicUsize::new(0));
        let host = UploadOnlyHost {
            drops: Arc::clone(&drops),
        };
        let accessor = AssetAccessor::new(host, ClosedExecutor);
        let mut fetch = accessor.request("PUT", "https://example.com/upload", Vec::new(), b"body");

        assert_eq!(fetch.try_take(), Some(Err(FetchError::MainThreadClosed)));
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_url_fails_fast() {
        let accessor = AssetAccessor::new(UnreachableHost, RefusingExecutor);
        let mut fetch = accessor.fetch("", Vec::new());
        assert!(matches!(fetch.try_take(), Some(Err(FetchError::InvalidUrl(_)))));
    }

    #[test]
    fn tick_does_nothing() {
        let accessor = AssetAccessor::new(UnreachableHost, RefusingExecutor);
        accessor.tick();
        accessor.tick();
    }

    #[test]
    fn get_rule_accepts_protocol_errors() {
        let mut request = StubRequest::finished(404);
        request.result = RequestResult::ProtocolError;
        request.error = Some("HTTP/1.1 404 Not Found".to_string());
        assert!(SuccessRule::NotConnectionError.succeeded(&request));
        assert!(!SuccessRule::NoError.succeeded(&request));
    }

    #[test]
    fn unfinished_request_never_succeeds() {
        let mut request = StubRequest::finished(200);
        request.done = false;
        assert!(!SuccessRule::NotConnectionError.succeeded(&request));
        assert!(!SuccessRule::NoError.succeeded(&request));
    }

    #[test]
    fn snapshot_extracts_content_type() {
        let mut request = StubRequest::finished(200);
        request.headers = vec![
            ("content-type".to_string(), "application/json".to_string()),
            ("ETag".to_string(), "\"v1\"".to_string()),
        ];
        let completed = snapshot(
            &request,
            vec![("Accept".to_string(), "*/*".to_string())],
            Bytes::from_static(br#"{"a":1}"#),
        );
        let response = completed.response();
        assert_eq!(response.status(), 200);
        assert_eq!(response.content_type(), "application/json");
        assert_eq!(response.headers().len(), 2);
        assert_eq!(response.header("etag"), Some("\"v1\""));
        assert_eq!(completed.headers(), &[("Accept".to_string(), "*/*".to_string())]);
    }

    #[test]
    fn snapshot_without_content_type_leaves_it_empty() {
        let completed = snapshot(&StubRequest::finished(204), Vec::new(), Bytes::new());
        assert_eq!(completed.response().content_type(), "");
        assert!(completed.response().headers().is_empty());
    }

    #[test]
    fn out_of_range_status_maps_to_zero() {
        let completed = snapshot(&StubRequest::finished(-1), Vec::new(), Bytes::new());
        assert_eq!(completed.response().status(), 0);
    }
}
