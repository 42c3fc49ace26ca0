//! C-ABI wrapper around `asset-bridge-core`.
//!
//! # Overview
//! Lets an engine written in C or C++ plug its web-request stack into the
//! bridge through a table of function pointers, and lets any thread issue
//! requests through it. The engine's frame loop calls
//! `asset_bridge_run_main_thread_tasks` on its main thread; requests are only
//! built and sent from inside that call.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Operations return an opaque `FfiFetch` immediately. The caller polls it
//!   with `asset_bridge_fetch_poll`, which yields an `FfiFetchResult`
//!   envelope once the operation has finished.
//! - The host completes each submitted request by passing its
//!   `FfiCompletionToken` to `asset_bridge_complete`, from any thread.
//! - The C caller owns all returned pointers and must call the matching
//!   `asset_bridge_*free*` function to release them.

pub mod host;
pub mod types;

use std::ffi::CStr;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

use asset_bridge_core::{main_thread_queue, AssetAccessor, BridgeConfig, ConfigError};

use host::{FfiCompletionToken, FfiHost};
use types::*;

// ---------------------------------------------------------------------------
// Bridge lifecycle
// ---------------------------------------------------------------------------

/// Parse the optional JSON configuration passed to `asset_bridge_new`.
/// Without one, the `ASSET_BRIDGE_*` environment variables apply.
fn parse_config(config_json: *const c_char) -> Result<BridgeConfig, ConfigError> {
    if config_json.is_null() {
        return BridgeConfig::from_env();
    }
    let raw = unsafe { CStr::from_ptr(config_json) }
        .to_str()
        .map_err(|e| ConfigError::Malformed(e.to_string()))?;
    if raw.trim().is_empty() {
        return Ok(BridgeConfig::default());
    }
    let config: BridgeConfig =
        serde_json::from_str(raw).map_err(|e| ConfigError::Malformed(e.to_string()))?;
    Ok(config.clamped())
}

/// Create a bridge over the host described by `vtable`.
///
/// `config_json` may be null to read the environment, or a JSON object such as
/// `{"max_upload_len": 1048576, "max_tasks_per_drain": 16}`. The vtable is
/// copied; `user_data` must stay valid until `asset_bridge_free`.
///
/// Returns null if `vtable` is null, a callback is missing, or the
/// configuration does not parse. Free with `asset_bridge_free`.
#[unsafe(no_mangle)]
pub extern "C" fn asset_bridge_new(
    vtable: *const FfiHostVTable,
    config_json: *const c_char,
) -> *mut FfiAssetBridge {
    catch_unwind(AssertUnwindSafe(|| {
        if vtable.is_null() {
            return std::ptr::null_mut();
        }
        let Some(host) = FfiHost::from_vtable(unsafe { &*vtable }) else {
            tracing::error!("host vtable is missing a callback");
            return std::ptr::null_mut();
        };
        let config = match parse_config(config_json) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!(%err, "rejecting bridge configuration");
                return std::ptr::null_mut();
            }
        };
        let (dispatcher, queue) = main_thread_queue(&config);
        let accessor = AssetAccessor::with_config(host, dispatcher, &config);
        Box::into_raw(Box::new(FfiAssetBridge {
            accessor,
            queue: Mutex::new(queue),
        }))
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Free a bridge created by `asset_bridge_new`. Safe to call with null.
///
/// Tasks still queued are dropped unrun; their operations resolve as
/// `MainThreadClosed` or `Abandoned`.
#[unsafe(no_mangle)]
pub extern "C" fn asset_bridge_free(bridge: *mut FfiAssetBridge) {
    if !bridge.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(bridge) });
        }));
    }
}

/// Install a stderr logger. `filter` uses `RUST_LOG` syntax and may be null,
/// in which case `RUST_LOG` is read and `warn` is the fallback.
///
/// Returns false if a global logger is already installed.
#[unsafe(no_mangle)]
pub extern "C" fn asset_bridge_init_logging(filter: *const c_char) -> bool {
    catch_unwind(|| {
        let env_filter = match unsafe { read_c_str(filter) } {
            Some(directives) => tracing_subscriber::EnvFilter::new(directives),
            None => tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        };
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok()
    })
    .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// GET `url` through the host, attaching `headers` in order.
///
/// Callable from any thread. Returns null if `bridge` or `url` is null.
/// Free with `asset_bridge_fetch_free`.
#[unsafe(no_mangle)]
pub extern "C" fn asset_bridge_fetch(
    bridge: *const FfiAssetBridge,
    url: *const c_char,
    headers: *const FfiHeader,
    headers_len: u32,
) -> *mut FfiFetch {
    catch_unwind(AssertUnwindSafe(|| {
        if bridge.is_null() || url.is_null() {
            return std::ptr::null_mut();
        }
        let bridge = unsafe { &*bridge };
        let url = unsafe { read_c_str(url) }.unwrap_or_default();
        let headers = unsafe { read_headers(headers, headers_len) };
        let inner = bridge.accessor.fetch(&url, headers);
        Box::into_raw(Box::new(FfiFetch { inner }))
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Send `payload` to `url` with `verb`, attaching `headers` in order.
///
/// Callable from any thread. `payload` may be null only when `payload_len`
/// is 0. The payload is copied before this returns.
///
/// Returns null if `bridge`, `verb` or `url` is null, or `payload` is null
/// with a non-zero length. Free with `asset_bridge_fetch_free`.
#[unsafe(no_mangle)]
pub extern "C" fn asset_bridge_request(
    bridge: *const FfiAssetBridge,
    verb: *const c_char,
    url: *const c_char,
    headers: *const FfiHeader,
    headers_len: u32,
    payload: *const u8,
    payload_len: usize,
) -> *mut FfiFetch {
    catch_unwind(AssertUnwindSafe(|| {
        if bridge.is_null() || verb.is_null() || url.is_null() {
            return std::ptr::null_mut();
        }
        if payload.is_null() && payload_len > 0 {
            return std::ptr::null_mut();
        }
        let bridge = unsafe { &*bridge };
        let verb = unsafe { read_c_str(verb) }.unwrap_or_default();
        let url = unsafe { read_c_str(url) }.unwrap_or_default();
        let headers = unsafe { read_headers(headers, headers_len) };
        let payload: &[u8] = if payload_len == 0 {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(payload, payload_len) }
        };
        let inner = bridge.accessor.request(&verb, &url, headers, payload);
        Box::into_raw(Box::new(FfiFetch { inner }))
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Run queued main-thread tasks. Call once per frame from the thread that
/// owns the host's network API.
///
/// Returns the number of tasks run. Returns 0 without running anything when
/// called re-entrantly from inside a host callback.
#[unsafe(no_mangle)]
pub extern "C" fn asset_bridge_run_main_thread_tasks(bridge: *const FfiAssetBridge) -> u32 {
    catch_unwind(AssertUnwindSafe(|| {
        if bridge.is_null() {
            return 0;
        }
        let bridge = unsafe { &*bridge };
        match bridge.queue.try_lock() {
            Ok(mut queue) => u32::try_from(queue.dispatch_main_thread_tasks()).unwrap_or(u32::MAX),
            Err(_) => {
                tracing::warn!("main-thread drain is already running");
                0
            }
        }
    }))
    .unwrap_or(0)
}

/// Per-frame hook for the accessor. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn asset_bridge_tick(bridge: *const FfiAssetBridge) {
    if !bridge.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| unsafe { &*bridge }.accessor.tick()));
    }
}

/// Deliver the host's outcome for a request submitted through `send`.
///
/// Callable from any thread, exactly once per token. The token is consumed.
/// A null `outcome` is treated as a connection failure. Everything `outcome`
/// points to is copied before this returns.
#[unsafe(no_mangle)]
pub extern "C" fn asset_bridge_complete(token: *mut FfiCompletionToken, outcome: *const FfiHostOutcome) {
    if token.is_null() {
        return;
    }
    let token = *unsafe { Box::from_raw(token) };
    let _ = catch_unwind(AssertUnwindSafe(move || unsafe { token.complete(outcome) }));
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Take the result of a finished operation.
///
/// Returns null while the operation is pending, and after the result has
/// been taken. Free the result with `asset_bridge_free_result`.
#[unsafe(no_mangle)]
pub extern "C" fn asset_bridge_fetch_poll(fetch: *mut FfiFetch) -> *mut FfiFetchResult {
    catch_unwind(AssertUnwindSafe(|| {
        if fetch.is_null() {
            return FfiFetchResult::null_arg("fetch");
        }
        let fetch = unsafe { &mut *fetch };
        match fetch.inner.try_take() {
            Some(result) => FfiFetchResult::from_result(result),
            None => std::ptr::null_mut(),
        }
    }))
    .unwrap_or_else(|_| FfiFetchResult::panic("panic in asset_bridge_fetch_poll"))
}

/// Free an `FfiFetch`. Safe to call with null. A request still in flight is
/// not cancelled; its result is discarded.
#[unsafe(no_mangle)]
pub extern "C" fn asset_bridge_fetch_free(fetch: *mut FfiFetch) {
    if !fetch.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(fetch) });
        }));
    }
}

/// Free an `FfiFetchResult` returned by `asset_bridge_fetch_poll`.
/// Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn asset_bridge_free_result(result: *mut FfiFetchResult) {
    if result.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let result = unsafe { Box::from_raw(result) };
        free_c_string(result.error_message);
        free_c_string(result.method);
        free_c_string(result.url);
        free_c_string(result.content_type);
        if !result.headers.is_null() && result.headers_len > 0 {
            let len = result.headers_len as usize;
            let headers = unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(result.headers, len)) };
            for header in headers.iter() {
                free_owned_header_fields(header);
            }
        }
        if !result.body.is_null() && result.body_len > 0 {
            drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(result.body, result.body_len)) });
        }
    });
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
