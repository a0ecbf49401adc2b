//! The registry of scanned drivers.
//!
//! Scanning turns a driver manifest into a [`ScannedIcd`]: the opened
//! library, the negotiated loader/driver interface version, and the handful
//! of entry points the loader calls before any instance exists. Drivers
//! supplied through direct driver loading skip the library entirely.

use std::ffi::CString;
use std::mem;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::Arc;

use libc::c_char;
use vk_sys::*;

use crate::dl::{LibraryOps, PlatformLibrary};
use crate::env;
use crate::error::{LoaderError, Result};
use crate::filter::FilterList;
use crate::log::LogBits;
use crate::manifest::discovery::{discover_manifests, ManifestKind};
use crate::manifest::driver::parse_driver_manifest;
use crate::manifest::read_manifest_dom;
use crate::settings::LoaderSettings;
use crate::util::ApiVersion;

/// `vkGetInstanceProcAddr` shape without the `Option`: scanning guarantees
/// every registered driver has one.
pub type GipaFn = unsafe extern "system" fn(VkInstance, *const c_char) -> PFN_vkVoidFunction;

/// One registered driver.
pub struct ScannedIcd {
    /// Open library handle; `None` for directly-loaded drivers.
    pub lib: Option<PlatformLibrary>,
    pub lib_path: PathBuf,
    /// API version the manifest declared.
    pub api_version: ApiVersion,
    /// Negotiated loader/driver interface version.
    pub interface_version: u32,
    pub get_instance_proc_addr: GipaFn,
    pub get_physical_device_proc_addr: PFN_GetPhysicalDeviceProcAddr,
    pub create_instance: PFN_vkCreateInstance,
    pub enumerate_instance_extension_properties: PFN_vkEnumerateInstanceExtensionProperties,
    pub enumerate_instance_version: PFN_vkEnumerateInstanceVersion,
    pub is_portability_driver: bool,
}

impl ScannedIcd {
    pub fn supports_icd_surfaces(&self) -> bool {
        self.interface_version >= ICD_VER_SUPPORTS_ICD_SURFACE_KHR
    }

    /// Resolves a global or instance entry point through the driver.
    pub fn gipa(&self, instance: VkInstance, name: &str) -> PFN_vkVoidFunction {
        let cname = CString::new(name).ok()?;
        unsafe { (self.get_instance_proc_addr)(instance, cname.as_ptr()) }
    }
}

/// Ordered list of drivers available to one instance creation.
#[derive(Default)]
pub struct IcdRegistry {
    pub icds: Vec<Arc<ScannedIcd>>,
}

unsafe fn transmute_pfn<T>(pfn: PFN_vkVoidFunction) -> T {
    // Every PFN_* alias is an Option of an `extern "system"` pointer, so the
    // two option layouts line up.
    mem::transmute_copy(&pfn)
}

fn resolve_global<T>(gipa: GipaFn, name: &str) -> T {
    let cname = CString::new(name).expect("entry point names contain no NUL");
    unsafe { transmute_pfn((gipa)(ptr::null_mut(), cname.as_ptr())) }
}

/// Negotiates the loader/driver interface version and pulls out the base
/// entry points.
fn negotiate_icd(lib: &PlatformLibrary, path: &Path) -> Result<ScannedIcd> {
    let negotiate: PFN_vkNegotiateLoaderICDInterfaceVersion =
        unsafe { transmute_pfn(lib.resolve("vk_icdNegotiateLoaderICDInterfaceVersion")) };
    let icd_gipa = lib.resolve("vk_icdGetInstanceProcAddr");

    let mut interface_version: u32 = if icd_gipa.is_some() { 1 } else { 0 };
    if let Some(negotiate) = negotiate {
        let mut version = CURRENT_LOADER_ICD_INTERFACE_VERSION;
        let result = unsafe { negotiate(&mut version) };
        if result != VK_SUCCESS {
            return Err(LoaderError::IncompatibleDriver(format!(
                "{}: interface negotiation failed ({})",
                path.display(),
                result
            )));
        }
        interface_version = version.min(CURRENT_LOADER_ICD_INTERFACE_VERSION);
    }

    // Version 0 drivers export only the standard entry points.
    let gipa_pfn = if interface_version >= 1 {
        icd_gipa
    } else {
        lib.resolve("vkGetInstanceProcAddr")
    };
    let gipa: GipaFn = match gipa_pfn {
        Some(pfn) => unsafe { mem::transmute(pfn) },
        None => {
            return Err(LoaderError::IncompatibleDriver(format!(
                "{}: no GetInstanceProcAddr export",
                path.display()
            )))
        }
    };

    let gpdpa: PFN_GetPhysicalDeviceProcAddr =
        if interface_version >= MIN_PHYS_DEV_EXTENSION_ICD_INTERFACE_VERSION {
            let exported: PFN_GetPhysicalDeviceProcAddr =
                unsafe { transmute_pfn(lib.resolve("vk_icdGetPhysicalDeviceProcAddr")) };
            // Version 7 makes exports optional; fall back to the proc-addr path.
            if exported.is_none() && interface_version >= LOADER_ICD_INTERFACE_VERSION_EXPORTS_OPTIONAL {
                resolve_global(gipa, "vk_icdGetPhysicalDeviceProcAddr")
            } else {
                exported
            }
        } else {
            None
        };

    let create_instance: PFN_vkCreateInstance = resolve_global(gipa, "vkCreateInstance");
    let enumerate_ext: PFN_vkEnumerateInstanceExtensionProperties =
        resolve_global(gipa, "vkEnumerateInstanceExtensionProperties");
    if create_instance.is_none() || enumerate_ext.is_none() {
        return Err(LoaderError::IncompatibleDriver(format!(
            "{}: missing vkCreateInstance or vkEnumerateInstanceExtensionProperties",
            path.display()
        )));
    }

    Ok(ScannedIcd {
        lib: None,
        lib_path: path.to_owned(),
        api_version: ApiVersion::V1_0,
        interface_version,
        get_instance_proc_addr: gipa,
        get_physical_device_proc_addr: gpdpa,
        create_instance,
        enumerate_instance_extension_properties: enumerate_ext,
        enumerate_instance_version: resolve_global(gipa, "vkEnumerateInstanceVersion"),
        is_portability_driver: false,
    })
}

/// Opens and registers the driver a manifest points at.
pub fn scan_icd_library(
    library_path: &Path,
    api_version: ApiVersion,
    is_portability_driver: bool,
) -> Result<ScannedIcd> {
    let lib = PlatformLibrary::open(library_path, false)?;
    let mut icd = negotiate_icd(&lib, library_path)?;
    icd.lib = Some(lib);
    icd.api_version = api_version;
    icd.is_portability_driver = is_portability_driver;
    Ok(icd)
}

/// Registers a driver handed to the loader through
/// `VkDirectDriverLoadingListLUNARG`; there is no library to open, so the
/// interface version is taken from negotiation through the provided lookup
/// when the driver offers it.
pub fn scan_direct_icd(gipa_raw: PFN_vkGetInstanceProcAddrLUNARG) -> Result<ScannedIcd> {
    let gipa: GipaFn = match gipa_raw {
        Some(pfn) => unsafe { mem::transmute(pfn) },
        None => {
            return Err(LoaderError::IncompatibleDriver(
                "direct driver entry with null pfnGetInstanceProcAddr".to_owned(),
            ))
        }
    };
    let mut interface_version = CURRENT_LOADER_ICD_INTERFACE_VERSION;
    let negotiate: PFN_vkNegotiateLoaderICDInterfaceVersion =
        resolve_global(gipa, "vk_icdNegotiateLoaderICDInterfaceVersion");
    if let Some(negotiate) = negotiate {
        let mut version = CURRENT_LOADER_ICD_INTERFACE_VERSION;
        if unsafe { negotiate(&mut version) } != VK_SUCCESS {
            return Err(LoaderError::IncompatibleDriver(
                "direct driver interface negotiation failed".to_owned(),
            ));
        }
        interface_version = version.min(CURRENT_LOADER_ICD_INTERFACE_VERSION);
    }

    let create_instance: PFN_vkCreateInstance = resolve_global(gipa, "vkCreateInstance");
    let enumerate_ext: PFN_vkEnumerateInstanceExtensionProperties =
        resolve_global(gipa, "vkEnumerateInstanceExtensionProperties");
    if create_instance.is_none() || enumerate_ext.is_none() {
        return Err(LoaderError::IncompatibleDriver(
            "direct driver missing global entry points".to_owned(),
        ));
    }

    Ok(ScannedIcd {
        lib: None,
        lib_path: PathBuf::from("<direct>"),
        api_version: ApiVersion::V1_0,
        interface_version,
        get_instance_proc_addr: gipa,
        get_physical_device_proc_addr: resolve_global(gipa, "vk_icdGetPhysicalDeviceProcAddr"),
        create_instance,
        enumerate_instance_extension_properties: enumerate_ext,
        enumerate_instance_version: resolve_global(gipa, "vkEnumerateInstanceVersion"),
        is_portability_driver: false,
    })
}

fn manifest_file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

/// Full driver scan: discovery, manifest parse, select/disable filters,
/// library load and negotiation. Individual failures drop that driver and
/// keep scanning.
pub fn scan_icds(portability_opt_in: bool, settings: &LoaderSettings) -> IcdRegistry {
    let honor_env = settings.driver_env_vars_allowed();
    let select = if honor_env {
        FilterList::from_env(env::VK_DRIVERS_SELECT_ENV_VAR)
    } else {
        FilterList::default()
    };
    let disable = if honor_env {
        FilterList::from_env(env::VK_DRIVERS_DISABLE_ENV_VAR)
    } else {
        FilterList::default()
    };

    let manifests = discover_manifests(
        ManifestKind::Driver,
        None,
        &settings.additional_driver_paths,
        false,
        honor_env,
    );

    let mut registry = IcdRegistry::default();
    for manifest_path in manifests {
        let file_name = manifest_file_name(&manifest_path);
        if disable.matches_name(file_name) && !select.matches_name(file_name) {
            loader_log!(
                LogBits::INFO | LogBits::DRIVER,
                "driver manifest {} disabled by VK_LOADER_DRIVERS_DISABLE",
                manifest_path.display()
            );
            continue;
        }
        if !select.is_empty() && !select.matches_name(file_name) {
            loader_log!(
                LogBits::INFO | LogBits::DRIVER,
                "driver manifest {} not selected by VK_LOADER_DRIVERS_SELECT",
                manifest_path.display()
            );
            continue;
        }

        let dom = match read_manifest_dom(&manifest_path) {
            Ok(dom) => dom,
            Err(err) => {
                loader_log!(
                    LogBits::WARN | LogBits::DRIVER,
                    "driver manifest {} unreadable: {}",
                    manifest_path.display(),
                    err
                );
                continue;
            }
        };
        let Some(record) = parse_driver_manifest(&manifest_path, &dom, portability_opt_in) else {
            continue;
        };

        match scan_icd_library(&record.library_path, record.api_version, record.is_portability_driver)
        {
            Ok(icd) => registry.icds.push(Arc::new(icd)),
            Err(err) => {
                loader_log!(
                    LogBits::WARN | LogBits::DRIVER,
                    "driver {} dropped: {}",
                    record.library_path.display(),
                    err
                );
            }
        }
    }
    registry
}
