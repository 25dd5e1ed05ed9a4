//! FFI (Foreign Function Interface) bindings for native front ends.
//!
//! Structured results cross the boundary as JSON strings; front ends decode
//! them with their own JSON support instead of mirroring Rust structs.
//!
//! # Memory Management
//!
//! - Every returned `char*` is allocated by Rust
//! - The caller MUST release it with `vardepot_free_string()`
//! - Strings are null-terminated UTF-8
//! - Null (or -1 for counts) signals an error; the reason is logged
//!
//! # Usage from Swift (macOS)
//!
//! ```swift
//! let json = vardepot_scan_library(root)
//! defer { vardepot_free_string(json) }
//! let result = try JSONDecoder().decode(ScanResult.self, from: Data(String(cString: json!).utf8))
//! ```
//!
//! # Usage from C# (Windows)
//!
//! ```csharp
//! [DllImport("vardepot_core.dll")]
//! private static extern IntPtr vardepot_scan_library(string root);
//!
//! [DllImport("vardepot_core.dll")]
//! private static extern void vardepot_free_string(IntPtr s);
//! ```

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::path::PathBuf;
use std::ptr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::analysis::Analyzer;
use crate::archive::{read_thumbnail, ParseLimits};
use crate::config::EngineConfig;
use crate::operations::toggle;
use crate::scanner::count_packages;

// ============================================================================
// Library Scanning
// ============================================================================

/// Scan a library and return its `ScanResult` as JSON.
/// Caller MUST call vardepot_free_string() when done.
#[no_mangle]
pub extern "C" fn vardepot_scan_library(root: *const c_char) -> *mut c_char {
    let Some(root) = c_char_to_path(root) else {
        return ptr::null_mut();
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!(error = %e, "Failed to start scan runtime");
            return ptr::null_mut();
        }
    };

    let analyzer = Analyzer::new(EngineConfig::default());
    let result = runtime.block_on(analyzer.scan_library(&CancellationToken::new(), &root));

    match result.map(|scan| serde_json::to_string(&scan)) {
        Ok(Ok(json)) => string_to_c_char(&json),
        Ok(Err(e)) => {
            warn!(error = %e, "Failed to serialize scan result");
            ptr::null_mut()
        }
        Err(e) => {
            warn!(root = ?root, error = %e, "Error scanning library");
            ptr::null_mut()
        }
    }
}

/// Count the packages below a library root; -1 on error.
#[no_mangle]
pub extern "C" fn vardepot_count_packages(root: *const c_char) -> i64 {
    let Some(root) = c_char_to_path(root) else {
        return -1;
    };

    match count_packages(&root) {
        Ok(count) => count as i64,
        Err(e) => {
            warn!(root = ?root, error = %e, "Error counting packages");
            -1
        }
    }
}

// ============================================================================
// Package Operations
// ============================================================================

/// Enable (`enable != 0`) or disable a package inside `library_root`.
/// Returns the package's new path, or null on error.
/// Caller MUST call vardepot_free_string() when done.
#[no_mangle]
pub extern "C" fn vardepot_toggle_package(
    path: *const c_char,
    enable: c_int,
    library_root: *const c_char,
    merge: c_int,
) -> *mut c_char {
    let (Some(path), Some(root)) = (c_char_to_path(path), c_char_to_path(library_root)) else {
        return ptr::null_mut();
    };

    match toggle(&path, enable != 0, &root, merge != 0) {
        Ok(new_path) => string_to_c_char(&new_path.to_string_lossy()),
        Err(e) => {
            warn!(path = ?path, kind = ?e.kind(), error = %e, "Error toggling package");
            ptr::null_mut()
        }
    }
}

/// Preview image of a package, base64 encoded; null if it has none.
/// Caller MUST call vardepot_free_string() when done.
#[no_mangle]
pub extern "C" fn vardepot_thumbnail_base64(path: *const c_char) -> *mut c_char {
    let Some(path) = c_char_to_path(path) else {
        return ptr::null_mut();
    };

    match read_thumbnail(&path, &ParseLimits::default()) {
        Ok(Some(thumbnail)) => string_to_c_char(&STANDARD.encode(thumbnail.bytes)),
        Ok(None) => ptr::null_mut(),
        Err(e) => {
            warn!(path = ?path, error = %e, "Error reading thumbnail");
            ptr::null_mut()
        }
    }
}

// ============================================================================
// String Management
// ============================================================================

/// Free a string returned by FFI functions.
#[no_mangle]
pub extern "C" fn vardepot_free_string(s: *mut c_char) {
    free_c_char(s);
}

// ============================================================================
// Helper Functions
// ============================================================================

fn c_char_to_path(s: *const c_char) -> Option<PathBuf> {
    if s.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(s) }
        .to_str()
        .ok()
        .map(PathBuf::from)
}

fn string_to_c_char(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(c_str) => c_str.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn free_c_char(s: *mut c_char) {
    if !s.is_null() {
        unsafe {
            let _ = CString::from_raw(s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::write_archive;
    use std::path::Path;
    use tempfile::TempDir;

    fn c_path(path: &Path) -> CString {
        CString::new(path.to_str().unwrap()).unwrap()
    }

    fn take_string(s: *mut c_char) -> Option<String> {
        if s.is_null() {
            return None;
        }
        let value = unsafe { CStr::from_ptr(s) }.to_str().unwrap().to_string();
        vardepot_free_string(s);
        Some(value)
    }

    #[test]
    fn test_count_packages() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.b.1.var"), b"").unwrap();
        std::fs::write(temp.path().join("a.b.2.var.disabled"), b"").unwrap();

        assert_eq!(vardepot_count_packages(c_path(temp.path()).as_ptr()), 2);
        assert_eq!(vardepot_count_packages(ptr::null()), -1);
        assert_eq!(
            vardepot_count_packages(c_path(&temp.path().join("missing")).as_ptr()),
            -1
        );
    }

    #[test]
    fn test_toggle_package() {
        let temp = TempDir::new().unwrap();
        let package = temp.path().join("Acme.Pose.1.var");
        std::fs::write(&package, b"x").unwrap();

        let root = c_path(temp.path());
        let disabled = take_string(vardepot_toggle_package(
            c_path(&package).as_ptr(),
            0,
            root.as_ptr(),
            0,
        ))
        .unwrap();
        assert!(disabled.ends_with("Acme.Pose.1.var.disabled"));

        let outside = TempDir::new().unwrap();
        let result = vardepot_toggle_package(
            c_path(Path::new(&disabled)).as_ptr(),
            1,
            c_path(outside.path()).as_ptr(),
            0,
        );
        assert!(result.is_null());
    }

    #[test]
    fn test_scan_library_and_thumbnail() {
        let temp = TempDir::new().unwrap();
        let package = temp.path().join("Acme.Look.1.var");
        write_archive(
            &package,
            &[
                ("meta.json", br#"{"creator":"Acme","packageName":"Look","version":"1"}"#),
                ("package.jpg", b"img"),
            ],
        );

        let json = take_string(vardepot_scan_library(c_path(temp.path()).as_ptr())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["packages"][0]["meta"]["creator"], "Acme");
        assert_eq!(value["packages"][0]["hasThumbnail"], true);

        let thumbnail = take_string(vardepot_thumbnail_base64(c_path(&package).as_ptr())).unwrap();
        assert_eq!(thumbnail, "aW1n");
    }
}
