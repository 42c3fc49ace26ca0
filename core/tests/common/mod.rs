//! A scripted host that records every call the bridge makes.
//!
//! Requests submitted through `send` park in an in-flight list until the test
//! finishes them with `complete_next`, optionally from another thread.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use asset_bridge_core::{
    main_thread_queue, AssetAccessor, BridgeConfig, CaptureBuffer, Fetch, FetchResult,
    HostNetwork, HostRequest, MainThreadDispatcher, MainThreadQueue, OnCompleted, RequestResult,
};
use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    CreateCapture,
    AllocateUpload(i32),
    Get { url: String },
    CreateRequest { url: String, verb: String, upload: Vec<u8> },
    SetHeader { name: String, value: String },
    Send { url: String },
    /// `fetch_pending` is what the watched `Fetch` looked like at release time.
    Release { fetch_pending: Option<bool> },
}

/// What the host reports once a request finishes.
#[derive(Debug, Clone)]
pub struct HostOutcome {
    pub is_done: bool,
    pub result: RequestResult,
    pub error: Option<String>,
    pub status: i64,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HostOutcome {
    pub fn ok(status: i64, content_type: &str, body: &[u8]) -> Self {
        Self {
            is_done: true,
            result: RequestResult::Success,
            error: None,
            status,
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body: body.to_vec(),
        }
    }

    pub fn connection_error(message: &str) -> Self {
        Self {
            is_done: true,
            result: RequestResult::ConnectionError,
            error: Some(message.to_string()),
            status: 0,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn protocol_error(status: i64, message: &str) -> Self {
        Self {
            is_done: true,
            result: RequestResult::ProtocolError,
            error: Some(message.to_string()),
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<HostCall>>,
    in_flight: Mutex<VecDeque<(FakeRequest, OnCompleted<FakeRequest>)>>,
    watched: Mutex<Option<Arc<Mutex<Fetch>>>>,
    fail_builds: AtomicBool,
}

impl Shared {
    fn record(&self, call: HostCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[derive(Clone, Default)]
pub struct ScriptedHost {
    shared: Arc<Shared>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.shared.calls.lock().unwrap().clone()
    }

    pub fn release_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, HostCall::Release { .. }))
            .count()
    }

    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.lock().unwrap().len()
    }

    /// Inspect `fetch` whenever a capture buffer is released.
    pub fn watch_fetch(&self, fetch: Arc<Mutex<Fetch>>) {
        *self.shared.watched.lock().unwrap() = Some(fetch);
    }

    /// Make every later `get` / `create_request` panic after recording the call.
    pub fn fail_request_creation(&self) {
        self.shared.fail_builds.store(true, Ordering::SeqCst);
    }

    /// Finish the oldest in-flight request on the current thread.
    pub fn complete_next(&self, outcome: HostOutcome) {
        let (mut request, on_completed) = self
            .shared
            .in_flight
            .lock()
            .unwrap()
            .pop_front()
            .expect("no request in flight");
        request.capture.lock().unwrap().extend_from_slice(&outcome.body);
        request.outcome = Some(outcome);
        on_completed(request);
    }

    /// Finish the oldest in-flight request on a fresh thread.
    pub fn complete_next_on_thread(&self, outcome: HostOutcome) -> std::thread::JoinHandle<()> {
        let host = self.clone();
        std::thread::spawn(move || host.complete_next(outcome))
    }

    /// Drop the oldest in-flight request without ever calling back.
    pub fn drop_next(&self) {
        let entry = self.shared.in_flight.lock().unwrap().pop_front();
        drop(entry);
    }
}

pub struct FakeCapture {
    data: Arc<Mutex<Vec<u8>>>,
    shared: Arc<Shared>,
}

impl CaptureBuffer for FakeCapture {
    fn take_data(&mut self) -> Bytes {
        Bytes::from(std::mem::take(&mut *self.data.lock().unwrap()))
    }

    fn release(self) {
        let fetch_pending = self
            .shared
            .watched
            .lock()
            .unwrap()
            .as_ref()
            .map(|fetch| fetch.lock().unwrap().try_take().is_none());
        self.shared.record(HostCall::Release { fetch_pending });
    }
}

pub struct FakeRequest {
    method: String,
    url: String,
    capture: Arc<Mutex<Vec<u8>>>,
    outcome: Option<HostOutcome>,
    shared: Arc<Shared>,
}

impl HostRequest for FakeRequest {
    fn set_request_header(&mut self, name: &str, value: &str) {
        self.shared.record(HostCall::SetHeader {
            name: name.to_string(),
            value: value.to_string(),
        });
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
            .map_or(RequestResult::InProgress, |o| o.result)
    }

    fn error(&self) -> Option<String> {
        self.outcome.as_ref().and_then(|o| o.error.clone())
    }

    fn response_code(&self) -> i64 {
        self.outcome.as_ref().map_or(0, |o| o.status)
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

impl HostNetwork for ScriptedHost {
    type Request = FakeRequest;
    type Capture = FakeCapture;
    type Upload = Vec<u8>;

    fn create_capture_buffer(&self) -> FakeCapture {
        self.shared.record(HostCall::CreateCapture);
        FakeCapture {
            data: Arc::new(Mutex::new(Vec::new())),
            shared: Arc::clone(&self.shared),
        }
    }

    fn allocate_upload_buffer(&self, len: i32) -> Vec<u8> {
        self.shared.record(HostCall::AllocateUpload(len));
        vec![0; len as usize]
    }

    fn get(&self, url: &str, capture: &FakeCapture) -> FakeRequest {
        self.shared.record(HostCall::Get {
            url: url.to_string(),
        });
        self.request_for("GET", url, capture)
    }

    fn create_request(&self, url: &str, verb: &str, capture: &FakeCapture, upload: Vec<u8>) -> FakeRequest {
        self.shared.record(HostCall::CreateRequest {
            url: url.to_string(),
            verb: verb.to_string(),
            upload,
        });
        self.request_for(verb, url, capture)
    }

    fn send(&self, request: FakeRequest, on_completed: OnCompleted<FakeRequest>) {
        self.shared.record(HostCall::Send {
            url: request.url.clone(),
        });
        self.shared
            .in_flight
            .lock()
            .unwrap()
            .push_back((request, on_completed));
    }
}

impl ScriptedHost {
    fn request_for(&self, method: &str, url: &str, capture: &FakeCapture) -> FakeRequest {
        if self.shared.fail_builds.load(Ordering::SeqCst) {
            panic!("host refused to build {method} {url}");
        }
        FakeRequest {
            method: method.to_string(),
            url: url.to_string(),
            capture: Arc::clone(&capture.data),
            outcome: None,
            shared: Arc::clone(&self.shared),
        }
    }
}

pub type TestAccessor = AssetAccessor<ScriptedHost, MainThreadDispatcher>;

pub fn bridge(host: &ScriptedHost, config: &BridgeConfig) -> (TestAccessor, MainThreadQueue) {
    let (dispatcher, queue) = main_thread_queue(config);
    (AssetAccessor::with_config(host.clone(), dispatcher, config), queue)
}

/// Drain `queue` until `fetch` resolves or the deadline passes.
pub fn pump(queue: &mut MainThreadQueue, fetch: &mut Fetch) -> FetchResult {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        queue.dispatch_main_thread_tasks();
        if let Some(result) = fetch.try_take() {
            return result;
        }
        assert!(Instant::now() < deadline, "fetch did not resolve in time");
        std::thread::sleep(Duration::from_millis(2));
    }
}

pub fn header(name: &str, value: &str) -> (String, String) {
    (name.to_string(), value.to_string())
}
