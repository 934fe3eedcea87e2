//! FFI bindings for health reconciliation
//!
//! This module provides C-compatible functions for calling the reconciler from
//! mobile host code. All functions use C strings (null-terminated) and return
//! allocated memory that must be freed by the caller using `hr_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::adapters::{HealthConnectAdapter, RecordAdapter};
use crate::buckets::DayWindow;
use crate::config::ReconcileConfig;
use crate::error::ReconcileError;
use crate::pipeline::{health_connect_to_hourly, Reconciler};
use crate::source::MemorySource;
use chrono::Utc;

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

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Convert a Rust string to a C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Hand a result back across the boundary, recording the error on failure
fn result_to_cstr(result: Result<String, ReconcileError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Reconcile a Health Connect JSON document for one day.
///
/// Returns a JSON object `{payload, dashboard, debug}`.
///
/// # Safety
/// - `records_json`, `date`, and `utc_offset` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `hr_free_string`.
/// - Returns NULL on error; call `hr_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn hr_reconcile_day(
    records_json: *const c_char,
    date: *const c_char,
    utc_offset: *const c_char,
    allow_manual: bool,
) -> *mut c_char {
    clear_last_error();

    let Some(json_str) = cstr_to_string(records_json) else {
        set_last_error("Invalid JSON string pointer");
        return ptr::null_mut();
    };
    let Some(date_str) = cstr_to_string(date) else {
        set_last_error("Invalid date string pointer");
        return ptr::null_mut();
    };
    let Some(offset_str) = cstr_to_string(utc_offset) else {
        set_last_error("Invalid utc_offset string pointer");
        return ptr::null_mut();
    };

    let config = ReconcileConfig {
        allow_manual,
        ..Default::default()
    };

    result_to_cstr(
        health_connect_to_hourly(&json_str, &date_str, &offset_str, &config)
            .and_then(|report| serde_json::to_string(&report).map_err(ReconcileError::from)),
    )
}

// ============================================================================
// Stateful Reconciler API
// ============================================================================

/// Opaque handle to a reconciler that keeps its debug snapshot between calls
pub struct ReconcilerHandle {
    reconciler: Reconciler<MemorySource>,
}

/// Create a reconciler from a JSON config, or defaults when `config_json` is NULL or empty.
///
/// # Safety
/// - `config_json` must be NULL or a valid null-terminated C string.
/// - Must be freed with `hr_reconciler_free`.
/// - Returns NULL on error; call `hr_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn hr_reconciler_new(config_json: *const c_char) -> *mut ReconcilerHandle {
    clear_last_error();

    let config = match cstr_to_string(config_json) {
        Some(json) if !json.trim().is_empty() => match ReconcileConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        },
        _ => ReconcileConfig::default(),
    };

    let reconciler = Reconciler::new(MemorySource::default(), config);
    Box::into_raw(Box::new(ReconcilerHandle { reconciler }))
}

/// Free a reconciler.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `hr_reconciler_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn hr_reconciler_free(handle: *mut ReconcilerHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Accept or reject manually entered records in later runs.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `hr_reconciler_new`.
/// - Returns 0 on success, -1 on a NULL handle.
#[no_mangle]
pub unsafe extern "C" fn hr_reconciler_set_bypass_manual_filter(
    handle: *mut ReconcilerHandle,
    bypass: bool,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null reconciler pointer");
        return -1;
    }

    (*handle).reconciler.set_bypass_manual_filter(bypass);
    0
}

/// Reconcile a Health Connect JSON document with a stateful reconciler.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `hr_reconciler_new`.
/// - `records_json`, `date`, and `utc_offset` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `hr_free_string`.
/// - Returns NULL on error; call `hr_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn hr_reconciler_run(
    handle: *mut ReconcilerHandle,
    records_json: *const c_char,
    date: *const c_char,
    utc_offset: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null reconciler pointer");
        return ptr::null_mut();
    }

    let handle = &mut *handle;

    let Some(json_str) = cstr_to_string(records_json) else {
        set_last_error("Invalid JSON string pointer");
        return ptr::null_mut();
    };
    let Some(date_str) = cstr_to_string(date) else {
        set_last_error("Invalid date string pointer");
        return ptr::null_mut();
    };
    let Some(offset_str) = cstr_to_string(utc_offset) else {
        set_last_error("Invalid utc_offset string pointer");
        return ptr::null_mut();
    };

    let result = DayWindow::parse(&date_str, &offset_str).and_then(|day| {
        let records = HealthConnectAdapter.parse(&json_str)?;
        handle.reconciler.replace_source(MemorySource::new(records));
        let run = futures::executor::block_on(handle.reconciler.run(&day));
        Ok(serde_json::to_string(&run.into_report(Utc::now()))?)
    });

    result_to_cstr(result)
}

/// Summary lines of the last run as a JSON array of strings.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `hr_reconciler_new`.
/// - Returns a newly allocated string that must be freed with `hr_free_string`.
/// - Returns NULL on error; call `hr_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn hr_reconciler_debug_info(handle: *mut ReconcilerHandle) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null reconciler pointer");
        return ptr::null_mut();
    }

    let handle = &*handle;
    result_to_cstr(serde_json::to_string(&handle.reconciler.debug_info()).map_err(ReconcileError::from))
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a static string that is valid until the next call
///   on this thread.
/// - Returns NULL if there is no error.
/// - Do NOT free the returned pointer.
#[no_mangle]
pub unsafe extern "C" fn hr_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by an `hr_` function.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by an `hr_` function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn hr_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}
