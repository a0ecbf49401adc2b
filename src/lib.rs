//! A user-space loader for a Vulkan-style graphics API.
//!
//! The loader sits between an application and any number of installed
//! drivers and interposer layers: it discovers JSON manifests, opens the
//! libraries they name, negotiates interface versions, assembles a
//! per-instance and per-device dispatch chain (application → layers →
//! terminator → driver), and exports the unified `vk*` symbol surface the
//! application links against.
//!
//! ## Foundations
//!
//! Raw ABI shapes (handles, `#[repr(C)]` structs, function-pointer aliases)
//! live in the [`vk-sys`] crate; everything behavioral lives here.
//!
//! ## Process-wide state
//!
//! Three locks guard the loader's global state: the loader lock (object
//! creation and destruction), the instance-list lock (walks of the live
//! instance list), and the preload lock (the driver list cached between
//! instance-less enumeration calls). All of them, plus the log filter, are
//! constructed on first touch, before any other entry point can observe
//! them.
//!
//! [`vk-sys`]: ../vk_sys/index.html

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log as log_facade;

use std::sync::{Arc, Mutex, MutexGuard};

#[macro_use]
pub mod log;

pub mod alloc;
pub mod device;
pub mod dl;
pub mod env;
pub mod error;
pub mod filter;
pub mod icd;
pub mod instance;
pub mod layers;
pub mod manifest;
pub mod phys_dev;
pub mod settings;
pub mod terminator;
pub mod trampoline;
pub mod unknown;
pub mod util;
pub mod wsi;

pub use crate::error::{LoaderError, Result};
pub use crate::instance::{LoaderInstance, MAX_NUM_UNKNOWN_EXTS};

use crate::device::LoaderDevice;
use crate::icd::ScannedIcd;
use crate::instance::IcdTerm;
use vk_sys::{VkDevice, VkInstance};

lazy_static! {
    /// Serializes object creation and destruction.
    static ref LOADER_LOCK: Mutex<()> = Mutex::new(());
    /// Guards the list of live instances.
    static ref INSTANCE_LIST: Mutex<Vec<usize>> = Mutex::new(Vec::new());
    /// Guards the driver list preloaded for instance-less enumeration.
    static ref PRELOADED_ICDS: Mutex<Option<Vec<Arc<ScannedIcd>>>> = Mutex::new(None);
}

pub(crate) fn loader_lock() -> MutexGuard<'static, ()> {
    LOADER_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn register_instance(inst: *mut LoaderInstance) {
    let mut list = INSTANCE_LIST.lock().unwrap_or_else(|p| p.into_inner());
    list.push(inst as usize);
}

pub(crate) fn unregister_instance(inst: *mut LoaderInstance) {
    let mut list = INSTANCE_LIST.lock().unwrap_or_else(|p| p.into_inner());
    list.retain(|&p| p != inst as usize);
}

/// The layer-facing "find the owning instance of this handle" walk.
pub(crate) unsafe fn find_loader_instance(handle: VkInstance) -> Option<*mut LoaderInstance> {
    let list = INSTANCE_LIST.lock().unwrap_or_else(|p| p.into_inner());
    list.iter()
        .copied()
        .find(|&p| p == handle as usize)
        .map(|p| p as *mut LoaderInstance)
}

/// Maps a device handle (driver-level or chain-level) back to its owning
/// instance, driver terminator and device record.
pub(crate) unsafe fn find_device(
    device: VkDevice,
) -> Option<(
    &'static mut LoaderInstance,
    &'static mut IcdTerm,
    &'static mut LoaderDevice,
)> {
    let list: Vec<usize> = {
        let guard = INSTANCE_LIST.lock().unwrap_or_else(|p| p.into_inner());
        guard.clone()
    };
    for inst_ptr in list {
        let inst = &mut *(inst_ptr as *mut LoaderInstance);
        for term in inst.icd_terms.iter_mut() {
            let term_ptr: *mut IcdTerm = &mut **term;
            for dev in (*term_ptr).logical_devices.iter_mut() {
                if dev.icd_device == device || dev.chain_device == device {
                    let dev_ptr: *mut LoaderDevice = &mut **dev;
                    return Some((
                        &mut *(inst_ptr as *mut LoaderInstance),
                        &mut *term_ptr,
                        &mut *dev_ptr,
                    ));
                }
            }
        }
    }
    None
}

/// The preloaded driver list backing the instance-less enumeration entry
/// points; scanned once and reused until an instance is created.
pub(crate) fn preloaded_icds() -> Vec<Arc<ScannedIcd>> {
    let mut guard = PRELOADED_ICDS.lock().unwrap_or_else(|p| p.into_inner());
    if guard.is_none() {
        let settings = crate::settings::LoaderSettings::load();
        let registry = crate::icd::scan_icds(false, &settings);
        *guard = Some(registry.icds);
    }
    guard.as_ref().map(|v| v.clone()).unwrap_or_default()
}

/// Drops the preload cache; instance creation rescans with its own
/// portability and settings state.
pub(crate) fn release_preloaded_icds() {
    let mut guard = PRELOADED_ICDS.lock().unwrap_or_else(|p| p.into_inner());
    *guard = None;
}
