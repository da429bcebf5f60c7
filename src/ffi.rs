//! FFI bindings for TUG Sense
//!
//! C-compatible functions for driving the engine from a mobile host (Swift,
//! Kotlin, Dart). The engine's callbacks are bridged through an internal
//! event queue: each sample call may enqueue JSON events, and the host
//! drains them with `tug_engine_poll_events` after feeding samples.
//!
//! All returned strings are allocated here and must be freed by the caller
//! using `tug_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use serde_json::json;

use crate::config::EngineConfig;
use crate::engine::{TugCallbacks, TugEngine};
use crate::types::{DetectedStep, EngineState, MotionSample, Phase, SessionInfo, Vec3};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Callback sink that queues engine events as JSON values until the host
/// polls them.
#[derive(Default)]
struct EventQueue {
    events: Vec<serde_json::Value>,
}

impl TugCallbacks for EventQueue {
    fn on_state_update(&mut self, state: &EngineState) {
        self.events.push(json!({
            "event": "state_update",
            "state": state,
        }));
    }

    fn on_phase_change(&mut self, from: Phase, to: Phase) {
        self.events.push(json!({
            "event": "phase_change",
            "from": from,
            "to": to,
        }));
    }

    fn on_step_detected(&mut self, step: &DetectedStep) {
        self.events.push(json!({
            "event": "step",
            "step": step,
        }));
    }

    fn on_turn_cue(&mut self) {
        self.events.push(json!({ "event": "turn_cue" }));
    }

    fn on_complete(&mut self, final_elapsed_ms: u64) {
        self.events.push(json!({
            "event": "complete",
            "final_elapsed_ms": final_elapsed_ms,
        }));
    }
}

/// Opaque handle to a TugEngine
pub struct TugEngineHandle {
    engine: TugEngine<EventQueue>,
}

/// Create a new engine.
///
/// `config_json` and `session_json` may be NULL, in which case defaults are
/// used (including a freshly generated attempt id).
///
/// # Safety
/// - `config_json` and `session_json` must each be NULL or a valid
///   null-terminated C string.
/// - Returns a pointer that must be freed with `tug_engine_free`.
/// - Returns NULL on error; call `tug_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn tug_engine_new(
    config_json: *const c_char,
    session_json: *const c_char,
) -> *mut TugEngineHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        EngineConfig::default()
    } else {
        let Some(s) = cstr_to_string(config_json) else {
            set_last_error("Invalid config string pointer");
            return ptr::null_mut();
        };
        match EngineConfig::from_json(&s) {
            Ok(cfg) => cfg,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    let session = if session_json.is_null() {
        SessionInfo::default()
    } else {
        let Some(s) = cstr_to_string(session_json) else {
            set_last_error("Invalid session string pointer");
            return ptr::null_mut();
        };
        match serde_json::from_str::<SessionInfo>(&s) {
            Ok(session) => session,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    match TugEngine::new(config, session, EventQueue::default()) {
        Ok(engine) => Box::into_raw(Box::new(TugEngineHandle { engine })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free an engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `tug_engine_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn tug_engine_free(engine: *mut TugEngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Calibrate the rest gravity vector (m/s², device frame).
///
/// # Safety
/// - `engine` must be a valid pointer returned by `tug_engine_new`.
/// - Returns 0 on success, non-zero on error; call `tug_last_error` for the
///   error message.
#[no_mangle]
pub unsafe extern "C" fn tug_engine_calibrate(
    engine: *mut TugEngineHandle,
    gx: f64,
    gy: f64,
    gz: f64,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    let handle = &mut *engine;

    match handle.engine.calibrate(Vec3::new(gx, gy, gz)) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Start the test.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `tug_engine_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn tug_engine_start(engine: *mut TugEngineHandle) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    let handle = &mut *engine;

    match handle.engine.start() {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Feed one motion sample (acceleration in m/s², rotation rate in deg/s).
///
/// # Safety
/// - `engine` must be a valid pointer returned by `tug_engine_new`.
/// - Returns 0 on success, non-zero on a null pointer.
#[no_mangle]
pub unsafe extern "C" fn tug_engine_handle_sample(
    engine: *mut TugEngineHandle,
    timestamp_ms: u64,
    ax: f64,
    ay: f64,
    az: f64,
    gx: f64,
    gy: f64,
    gz: f64,
) -> i32 {
    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    let handle = &mut *engine;

    handle.engine.handle_motion_event(MotionSample::new(
        timestamp_ms,
        Vec3::new(ax, ay, az),
        Vec3::new(gx, gy, gz),
    ));
    0
}

/// Whether the test has reached its terminal phase.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `tug_engine_new`.
/// - Returns 1 if complete, 0 if not, -1 on a null pointer.
#[no_mangle]
pub unsafe extern "C" fn tug_engine_is_complete(engine: *const TugEngineHandle) -> i32 {
    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    let handle = &*engine;
    i32::from(handle.engine.is_complete())
}

/// Return the current state snapshot as JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `tug_engine_new`.
/// - Returns a newly allocated string that must be freed with
///   `tug_free_string`, or NULL on error.
#[no_mangle]
pub unsafe extern "C" fn tug_engine_state(engine: *const TugEngineHandle) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &*engine;

    match serde_json::to_string(&handle.engine.state()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Drain queued engine events as a JSON array.
///
/// Events accumulate while samples are fed; polling returns them in order
/// and empties the queue. An empty queue yields `[]`.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `tug_engine_new`.
/// - Returns a newly allocated string that must be freed with
///   `tug_free_string`, or NULL on error.
#[no_mangle]
pub unsafe extern "C" fn tug_engine_poll_events(engine: *mut TugEngineHandle) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &mut *engine;

    let drained = std::mem::take(&mut handle.engine.callbacks_mut().events);
    match serde_json::to_string(&drained) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Return the final report as JSON. Only valid after completion.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `tug_engine_new`.
/// - Returns a newly allocated string that must be freed with
///   `tug_free_string`.
/// - Returns NULL on error; call `tug_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn tug_engine_report(engine: *const TugEngineHandle) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &*engine;

    let report = match handle.engine.report() {
        Ok(report) => report,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };
    match report.to_json() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a string returned by TUG Sense functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a TUG Sense function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn tug_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next TUG Sense call on this
///   thread. Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn tug_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the engine library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn tug_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
