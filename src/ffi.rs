//! FFI bindings for placesense
//!
//! This module provides C-compatible functions for calling the recognizer from
//! other languages. All functions use C strings (null-terminated) and return
//! allocated memory that must be freed by the caller using `places_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::annotator::ProximityAnnotator;
use crate::config::RecognitionConfig;
use crate::error::Result;
use crate::pipeline::cluster_places_json;
use crate::types::{PlaceTagRecord, TracePoint};

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

/// Turn a pipeline result into a C string, recording the error on failure
fn finish(result: Result<String>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

fn annotate_json(points_json: &str, places_json: &str, near_distance: f64) -> Result<String> {
    let mut points: Vec<TracePoint> = serde_json::from_str(points_json)?;
    let places: Vec<PlaceTagRecord> = serde_json::from_str(places_json)?;
    ProximityAnnotator::annotate(&mut points, &places, near_distance);
    Ok(serde_json::to_string(&points)?)
}

// ============================================================================
// Stateless API
// ============================================================================

/// Recognize places in a JSON trace and return place tag records as a JSON array.
///
/// # Safety
/// - `trace_json` must be a valid null-terminated C string holding an array of
///   `{timestamp, latitude, longitude}` objects.
/// - `config_json` may be NULL for the default configuration.
/// - Returns a newly allocated string that must be freed with `places_free_string`.
/// - Returns NULL on error; call `places_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn places_cluster_json(
    trace_json: *const c_char,
    config_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let trace_str = match cstr_to_string(trace_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid trace string pointer");
            return ptr::null_mut();
        }
    };

    let config = if config_json.is_null() {
        RecognitionConfig::default()
    } else {
        let parsed = cstr_to_string(config_json)
            .ok_or(())
            .map(|s| RecognitionConfig::from_json(&s));
        match parsed {
            Ok(Ok(config)) => config,
            Ok(Err(e)) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
            Err(()) => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        }
    };

    finish(cluster_places_json(&trace_str, &config))
}

/// Overwrite the `near` tags of trace points from place tag records.
///
/// # Safety
/// - `points_json` and `places_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `places_free_string`.
/// - Returns NULL on error; call `places_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn places_annotate_json(
    points_json: *const c_char,
    places_json: *const c_char,
    near_distance: f64,
) -> *mut c_char {
    clear_last_error();

    let points_str = match cstr_to_string(points_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid points string pointer");
            return ptr::null_mut();
        }
    };

    let places_str = match cstr_to_string(places_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid places string pointer");
            return ptr::null_mut();
        }
    };

    if !near_distance.is_finite() || near_distance < 0.0 {
        set_last_error("near_distance must be a non-negative number");
        return ptr::null_mut();
    }

    finish(annotate_json(&points_str, &places_str, near_distance))
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by placesense functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a placesense function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn places_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next placesense call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn places_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn places_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
