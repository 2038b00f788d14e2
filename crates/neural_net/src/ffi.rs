//! C-ABI boundary
//!
//! Every call takes a NUL-terminated path and returns a heap string owned by
//! this library. Callers release it with [`free_string`] and nothing else.
//! Errors are reported in-band as text starting with `Error: `.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;

use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::pipeline;
use crate::trainer::NoopObserver;

/// Train on the CSV at `path` and write the plot to the configured path.
///
/// # Safety
/// `path` must be null or point to a NUL-terminated string valid for the
/// duration of the call.
#[no_mangle]
pub unsafe extern "C" fn train_model(path: *const c_char) -> *mut c_char {
    guarded(|| {
        let csv = read_arg(path, "path")?;
        run_text(PathBuf::from(csv), None)
    })
}

/// Same as [`train_model`] with an explicit plot path; null means the default.
///
/// # Safety
/// Both pointers must be null or point to NUL-terminated strings valid for
/// the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn train_model_to(
    path: *const c_char,
    plot_path: *const c_char,
) -> *mut c_char {
    guarded(|| {
        let csv = read_arg(path, "path")?;
        let plot = if plot_path.is_null() {
            None
        } else {
            Some(PathBuf::from(read_arg(plot_path, "plot_path")?))
        };
        run_text(PathBuf::from(csv), plot)
    })
}

/// Release a string returned by this library. Null is ignored.
///
/// # Safety
/// `s` must be null or a pointer returned by [`train_model`] or
/// [`train_model_to`] that has not been freed yet.
#[no_mangle]
pub unsafe extern "C" fn free_string(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    drop(CString::from_raw(s));
}

fn run_text(csv: PathBuf, plot: Option<PathBuf>) -> Result<String, String> {
    let mut config = EngineConfig::from_env().map_err(|err| format!("Error: {}", err))?;
    if let Some(plot) = plot {
        config.output.plot_path = plot;
    }
    let result = pipeline::run(&csv, &config, &CancellationToken::new(), &mut NoopObserver);
    Ok(pipeline::boundary_text(&result))
}

unsafe fn read_arg(ptr: *const c_char, name: &str) -> Result<String, String> {
    if ptr.is_null() {
        return Err(format!("Error: {} is null", name));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(str::to_owned)
        .map_err(|_| format!("Error: {} is not valid UTF-8", name))
}

fn guarded<F>(f: F) -> *mut c_char
where
    F: FnOnce() -> Result<String, String>,
{
    let text = match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(text)) | Ok(Err(text)) => text,
        Err(_) => "Error: internal panic during training".to_string(),
    };
    into_raw(text)
}

fn into_raw(text: String) -> *mut c_char {
    let text = if text.contains('\0') {
        text.replace('\0', " ")
    } else {
        text
    };
    CString::new(text).unwrap_or_default().into_raw()
}
