//! Detector plugin loader: C-ABI vendor adapters loaded from shared
//! libraries (spec §4.5, §6 "Plugin ABI").
//!
//! Polymorphism over plugins is expressed as a loaded value
//! (`LoadedDetectorPlugin`) rather than inheritance — spec §9 "a systems
//! language should express each driver as a value behind a trait/interface
//! or a tagged variant", here realised as an owned handle wrapping the
//! opaque C pointer.

use crate::error::{PluginError, PluginErrorCode};
use libloading::{Library, Symbol};
use std::ffi::{c_char, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

#[repr(C)]
pub struct DetectorConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate_hz: f32,
}

/// Opaque vendor-owned detector handle; never dereferenced on the host side.
#[repr(C)]
pub struct DetectorHandle {
    _private: [u8; 0],
}

#[repr(C)]
struct RawManifest {
    api_version: u32,
    plugin_version: u32,
    plugin_name: *const c_char,
    vendor_name: *const c_char,
    model_name: *const c_char,
    max_frame_width: u32,
    max_frame_height: u32,
    max_frame_rate: f32,
}

/// Host-owned copy of the manifest, read out of the plugin's static before
/// any further calls cross the boundary.
#[derive(Debug, Clone)]
pub struct DetectorManifestInfo {
    pub api_version: u32,
    pub plugin_version: u32,
    pub plugin_name: String,
    pub vendor_name: String,
    pub model_name: String,
    pub max_frame_width: u32,
    pub max_frame_height: u32,
    pub max_frame_rate: f32,
}

impl DetectorManifestInfo {
    pub fn major_version(&self) -> u32 {
        self.api_version >> 16
    }
}

type CreateDetectorFn = unsafe extern "C" fn(*const DetectorConfig) -> *mut DetectorHandle;
type DestroyDetectorFn = unsafe extern "C" fn(*mut DetectorHandle);
type GetPluginManifestFn = unsafe extern "C" fn() -> *const RawManifest;

/// A loaded, live vendor detector. Dropping it calls `DestroyDetector` so
/// allocation and deallocation happen in the same address-space region.
pub struct LoadedDetectorPlugin {
    handle: *mut DetectorHandle,
    destroy: DestroyDetectorFn,
    manifest: DetectorManifestInfo,
    path: String,
    // Keeps the shared object mapped for the plugin's lifetime; never
    // accessed directly once loading completes.
    _library: Library,
}

// Safety: the handle is never touched concurrently from two threads by
// this crate; it is only ever dereferenced inside the vendor library
// across `DestroyDetector`, which the vendor contract requires be safe to
// call from any thread that last held the handle.
unsafe impl Send for LoadedDetectorPlugin {}

impl LoadedDetectorPlugin {
    pub fn manifest(&self) -> &DetectorManifestInfo {
        &self.manifest
    }

    /// Releases the plugin, invoking `DestroyDetector`. Refuses — handing
    /// ownership back to the caller — while an acquisition is in progress.
    pub fn unload(self, acquisition_in_progress: bool) -> Result<(), (Self, PluginError)> {
        if acquisition_in_progress {
            let path = self.path.clone();
            return Err((
                self,
                PluginError {
                    code: PluginErrorCode::ValidationFailed,
                    plugin_path: path,
                    diagnostic: "cannot unload detector plugin while acquisition in progress"
                        .into(),
                },
            ));
        }
        drop(self);
        Ok(())
    }
}

impl Drop for LoadedDetectorPlugin {
    fn drop(&mut self) {
        let destroy = self.destroy;
        let handle = self.handle;
        let _ = catch_unwind(AssertUnwindSafe(|| unsafe { destroy(handle) }));
    }
}

pub struct DetectorPluginLoader {
    host_abi_version: u32,
}

impl DetectorPluginLoader {
    pub fn new(host_abi_version: u32) -> Self {
        Self { host_abi_version }
    }

    /// Open library -> locate symbols -> `GetPluginManifest` -> version
    /// check -> `CreateDetector` (spec §4.5 "Load protocol"). Every call
    /// across the boundary is wrapped so a plugin panic or fault is
    /// trapped and translated into a structured error instead of
    /// unwinding into the host.
    pub fn load(
        &self,
        path: &Path,
        config: DetectorConfig,
    ) -> Result<LoadedDetectorPlugin, PluginError> {
        let path_str = path.display().to_string();

        let library = unsafe { Library::new(path) }.map_err(|e| {
            tracing::error!(path = %path_str, error = %e, "detector plugin load failed: file not found");
            PluginError {
                code: PluginErrorCode::FileNotFound,
                plugin_path: path_str.clone(),
                diagnostic: e.to_string(),
            }
        })?;

        let get_manifest: Symbol<GetPluginManifestFn> =
            unsafe { library.get(b"GetPluginManifest\0") }.map_err(|e| PluginError {
                code: PluginErrorCode::MissingSymbol,
                plugin_path: path_str.clone(),
                diagnostic: e.to_string(),
            })?;
        let create: Symbol<CreateDetectorFn> =
            unsafe { library.get(b"CreateDetector\0") }.map_err(|e| PluginError {
                code: PluginErrorCode::MissingSymbol,
                plugin_path: path_str.clone(),
                diagnostic: e.to_string(),
            })?;
        let destroy: Symbol<DestroyDetectorFn> =
            unsafe { library.get(b"DestroyDetector\0") }.map_err(|e| PluginError {
                code: PluginErrorCode::MissingSymbol,
                plugin_path: path_str.clone(),
                diagnostic: e.to_string(),
            })?;

        let manifest_ptr = catch_unwind(AssertUnwindSafe(|| unsafe { get_manifest() }))
            .map_err(|_| ffi_panic(&path_str))?;
        if manifest_ptr.is_null() {
            return Err(PluginError {
                code: PluginErrorCode::InitFailed,
                plugin_path: path_str,
                diagnostic: "GetPluginManifest returned null".into(),
            });
        }
        let manifest = DetectorManifestInfo::from_raw(unsafe { &*manifest_ptr });

        let host_major = self.host_abi_version >> 16;
        if manifest.major_version() != host_major {
            tracing::error!(
                path = %path_str,
                plugin_major = manifest.major_version(),
                host_major,
                "detector plugin ABI version mismatch"
            );
            return Err(PluginError {
                code: PluginErrorCode::VersionMismatch,
                plugin_path: path_str,
                diagnostic: format!(
                    "plugin API major version {:#x} != host {:#x}",
                    manifest.major_version(),
                    host_major
                ),
            });
        }

        let handle = catch_unwind(AssertUnwindSafe(|| unsafe { create(&config) }))
            .map_err(|_| ffi_panic(&path_str))?;
        if handle.is_null() {
            return Err(PluginError {
                code: PluginErrorCode::InitFailed,
                plugin_path: path_str,
                diagnostic: "CreateDetector returned null".into(),
            });
        }

        let destroy_fn: DestroyDetectorFn = *destroy;
        tracing::info!(
            path = %path_str,
            plugin = %manifest.plugin_name,
            vendor = %manifest.vendor_name,
            "detector plugin loaded"
        );
        Ok(LoadedDetectorPlugin {
            handle,
            destroy: destroy_fn,
            manifest,
            path: path_str,
            _library: library,
        })
    }
}

fn ffi_panic(path: &str) -> PluginError {
    PluginError {
        code: PluginErrorCode::ValidationFailed,
        plugin_path: path.to_string(),
        diagnostic: "plugin panicked across the FFI boundary".into(),
    }
}

impl DetectorManifestInfo {
    fn from_raw(raw: &RawManifest) -> Self {
        Self {
            api_version: raw.api_version,
            plugin_version: raw.plugin_version,
            plugin_name: read_c_str(raw.plugin_name),
            vendor_name: read_c_str(raw.vendor_name),
            model_name: read_c_str(raw.model_name),
            max_frame_width: raw.max_frame_width,
            max_frame_height: raw.max_frame_height,
            max_frame_rate: raw.max_frame_rate,
        }
    }
}

fn read_c_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_file_not_found() {
        let loader = DetectorPluginLoader::new(0x0001_0000);
        let err = loader
            .load(
                Path::new("/nonexistent/detector_plugin.so"),
                DetectorConfig {
                    width: 2048,
                    height: 2048,
                    frame_rate_hz: 30.0,
                },
            )
            .unwrap_err();
        assert_eq!(err.code, PluginErrorCode::FileNotFound);
    }

    #[test]
    fn major_version_mismatch_is_detected() {
        let manifest = RawManifest {
            api_version: 0x0002_0000,
            plugin_version: 1,
            plugin_name: std::ptr::null(),
            vendor_name: std::ptr::null(),
            model_name: std::ptr::null(),
            max_frame_width: 0,
            max_frame_height: 0,
            max_frame_rate: 0.0,
        };
        let info = DetectorManifestInfo::from_raw(&manifest);
        assert_eq!(info.major_version(), 0x0002);
        assert_ne!(info.major_version(), 0x0001_0000u32 >> 16);
    }
}
