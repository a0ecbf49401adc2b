//! Dynamic-library access behind a narrow seam.
//!
//! Drivers and layers are opened through [`LibraryOps`] so the rest of the
//! loader never touches a platform handle directly. Closing happens on drop,
//! except when unloading is disabled: some drivers leak thread-local storage
//! on unload, so `VK_LOADER_DISABLE_DYNAMIC_LIBRARY_UNLOADING` (or the
//! `static_driver_libraries` build feature) keeps every library resident for
//! the life of the process.

use std::mem;
use std::path::{Path, PathBuf};

use vk_sys::PFN_vkVoidFunction;

use crate::env;
use crate::error::{LoaderError, Result};

pub trait LibraryOps: Sized {
    /// Opens the library at `path`. `keep_resident` forces the handle to
    /// outlive this wrapper.
    fn open(path: &Path, keep_resident: bool) -> Result<Self>;

    /// Resolves an exported symbol to a generic entry point, or null.
    fn resolve(&self, name: &str) -> PFN_vkVoidFunction;

    fn path(&self) -> &Path;

    /// Explicit close; drop does the same.
    fn close(self) {}
}

/// Whether library unloading is globally disabled for this process.
pub fn unloading_disabled() -> bool {
    cfg!(feature = "static_driver_libraries")
        || env::env_var_is_set(env::VK_DISABLE_DYNAMIC_LIBRARY_UNLOADING_ENV_VAR)
}

pub struct PlatformLibrary {
    lib: Option<libloading::Library>,
    path: PathBuf,
    keep_resident: bool,
}

impl LibraryOps for PlatformLibrary {
    fn open(path: &Path, keep_resident: bool) -> Result<PlatformLibrary> {
        let lib = unsafe { libloading::Library::new(path) }.map_err(|e| {
            let reason = e.to_string();
            // dlerror is the only place the platform reports a bit-width
            // mismatch; surface it as its own status so scanning can record
            // error-wrong-bit-type instead of a generic load failure.
            if reason.contains("wrong ELF class") || reason.contains("not a valid") {
                LoaderError::WrongBitType { path: path.to_owned() }
            } else {
                LoaderError::LibraryLoad { path: path.to_owned(), reason }
            }
        })?;
        Ok(PlatformLibrary {
            lib: Some(lib),
            path: path.to_owned(),
            keep_resident: keep_resident || unloading_disabled(),
        })
    }

    fn resolve(&self, name: &str) -> PFN_vkVoidFunction {
        let lib = self.lib.as_ref()?;
        let symbol = format!("{}\0", name);
        unsafe {
            match lib.get::<unsafe extern "system" fn()>(symbol.as_bytes()) {
                Ok(sym) => Some(*sym),
                Err(_) => None,
            }
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PlatformLibrary {
    fn drop(&mut self) {
        if self.keep_resident {
            if let Some(lib) = self.lib.take() {
                mem::forget(lib);
            }
        }
    }
}
