//! The terminator: the bottom of every dispatch chain.
//!
//! Instance-wide operations fan out across every driver and aggregate;
//! physical-device and device operations unwrap the loader record and route
//! to the owning driver. Everything here is `extern "system"` because layers
//! call these through plain function pointers.

use std::ffi::CStr;
use std::mem;
use std::ptr;

use libc::c_char;
use vk_sys::*;

use crate::icd::ScannedIcd;
use crate::instance::{
    string_array, IcdDispatch, IcdTerm, InstanceExtFlags, LoaderInstance, PhysDevTerm,
};
use crate::log::LogBits;
use crate::settings::LayerControl;
use crate::util::{copy_to_char_array, write_enumerated, ApiVersion};

/// Highest API version the loader itself implements.
pub const LOADER_VERSION: ApiVersion = ApiVersion { variant: 0, major: 1, minor: 3, patch: 0 };

unsafe fn pfn<T>(raw: PFN_vkVoidFunction) -> T {
    mem::transmute_copy(&raw)
}

/// All instance extensions a driver reports.
pub fn icd_supported_extensions(icd: &ScannedIcd) -> Vec<String> {
    let Some(enumerate) = icd.enumerate_instance_extension_properties else {
        return Vec::new();
    };
    let mut count = 0u32;
    unsafe {
        if enumerate(ptr::null(), &mut count, ptr::null_mut()) != VK_SUCCESS {
            return Vec::new();
        }
        let mut props = vec![mem::zeroed::<VkExtensionProperties>(); count as usize];
        if enumerate(ptr::null(), &mut count, props.as_mut_ptr()) < VK_SUCCESS {
            return Vec::new();
        }
        props
            .iter()
            .take(count as usize)
            .map(|p| {
                CStr::from_ptr(p.extensionName.as_ptr())
                    .to_string_lossy()
                    .into_owned()
            })
            .collect()
    }
}

pub fn icd_supports_extension(icd: &ScannedIcd, name: &str) -> bool {
    icd_supported_extensions(icd).iter().any(|e| e == name)
}

/// The driver API version, via `vkEnumerateInstanceVersion` when exported.
fn icd_api_version(icd: &ScannedIcd) -> ApiVersion {
    if let Some(enumerate) = icd.enumerate_instance_version {
        let mut raw = 0u32;
        if unsafe { enumerate(&mut raw) } == VK_SUCCESS && raw != 0 {
            return ApiVersion::from_raw(raw);
        }
    }
    icd.api_version
}

/// `vkCreateInstance` terminator: create a driver instance per registered
/// driver, dropping drivers that fail; succeed if at least one remains.
pub unsafe extern "system" fn create_instance(
    p_create_info: *const VkInstanceCreateInfo,
    p_allocator: *const VkAllocationCallbacks,
    p_instance: *mut VkInstance,
) -> VkResult {
    let inst = match LoaderInstance::from_handle(*p_instance) {
        Some(inst) => inst,
        None => return VK_ERROR_INITIALIZATION_FAILED,
    };
    let create_info = &*p_create_info;
    let requested = string_array(
        create_info.enabledExtensionCount,
        create_info.ppEnabledExtensionNames,
    );
    // Settings-driven device selection needs UUID queries, which need 1.1.
    let mut app_version = inst.app_api_version;
    if !inst.settings.device_configurations.is_empty() && app_version < ApiVersion::V1_1 {
        app_version = ApiVersion::V1_1;
    }

    let icds: Vec<_> = inst.icds.icds.clone();
    for scanned in icds {
        let supported = icd_supported_extensions(&scanned);
        let filtered: Vec<&String> = requested
            .iter()
            .filter(|name| supported.iter().any(|s| &s == name))
            .collect();
        let c_names: Vec<std::ffi::CString> = filtered
            .iter()
            .filter_map(|n| std::ffi::CString::new(n.as_str()).ok())
            .collect();
        let name_ptrs: Vec<*const c_char> = c_names.iter().map(|c| c.as_ptr()).collect();

        let mut icd_create_info = *create_info;
        icd_create_info.enabledExtensionCount = name_ptrs.len() as u32;
        icd_create_info.ppEnabledExtensionNames = if name_ptrs.is_empty() {
            ptr::null()
        } else {
            name_ptrs.as_ptr()
        };

        // A driver that never heard of portability enumeration must not see
        // the flag.
        if !supported
            .iter()
            .any(|s| s == VK_KHR_PORTABILITY_ENUMERATION_EXTENSION_NAME)
        {
            icd_create_info.flags &= !VK_INSTANCE_CREATE_ENUMERATE_PORTABILITY_BIT_KHR;
        }

        // A 1.0 driver asked for 1.1+ receives a 1.0 application info; a
        // capable driver sees the (possibly raised) effective version.
        let mut patched_app_info;
        let driver_version = icd_api_version(&scanned);
        if !create_info.pApplicationInfo.is_null() {
            let wanted = if driver_version < ApiVersion::V1_1 && app_version >= ApiVersion::V1_1 {
                Some(VK_API_VERSION_1_0)
            } else if app_version != inst.app_api_version {
                Some(app_version.to_raw())
            } else {
                None
            };
            if let Some(raw) = wanted {
                patched_app_info = *create_info.pApplicationInfo;
                patched_app_info.apiVersion = raw;
                icd_create_info.pApplicationInfo = &patched_app_info;
            }
        }

        let create = scanned
            .create_instance
            .expect("scanning guarantees vkCreateInstance");
        let mut icd_instance: VkInstance = ptr::null_mut();
        let result = create(&icd_create_info, p_allocator, &mut icd_instance);
        if result != VK_SUCCESS {
            loader_log!(
                LogBits::WARN | LogBits::DRIVER,
                "driver {} failed vkCreateInstance ({}), removing it",
                scanned.lib_path.display(),
                result
            );
            continue;
        }

        let mut term = Box::new(IcdTerm::new(scanned.clone()));
        term.instance = icd_instance;
        term.dispatch = IcdDispatch::resolve(scanned.get_instance_proc_addr, icd_instance);
        for name in &filtered {
            if let Some(flag) = InstanceExtFlags::from_name(name) {
                term.enabled_extensions |= flag;
            }
        }
        inst.icd_terms.push(term);
    }

    if inst.icd_terms.is_empty() {
        loader_log!(
            LogBits::ERROR | LogBits::DRIVER,
            "no driver succeeded in vkCreateInstance"
        );
        return VK_ERROR_INCOMPATIBLE_DRIVER;
    }
    VK_SUCCESS
}

/// `vkDestroyInstance` terminator: release per-driver surfaces, messengers,
/// report callbacks and leftover logical devices, then destroy each driver
/// instance.
pub unsafe extern "system" fn destroy_instance(
    instance: VkInstance,
    p_allocator: *const VkAllocationCallbacks,
) {
    let Some(inst) = LoaderInstance::from_handle(instance) else {
        return;
    };
    for mut term in inst.icd_terms.drain(..) {
        for index in 0..term.surfaces.len() {
            let surface = term.surfaces[index];
            if surface != 0 {
                if let Some(destroy) = term.dispatch.destroy_surface {
                    destroy(term.instance, surface, p_allocator);
                }
                term.surfaces[index] = 0;
            }
        }
        for index in 0..term.debug_messengers.len() {
            let messenger = term.debug_messengers[index];
            if messenger != 0 {
                if let Some(destroy) = term.dispatch.destroy_debug_utils_messenger {
                    destroy(term.instance, messenger, p_allocator);
                }
            }
        }
        for index in 0..term.debug_reports.len() {
            let callback = term.debug_reports[index];
            if callback != 0 {
                if let Some(destroy) = term.dispatch.destroy_debug_report_callback {
                    destroy(term.instance, callback, p_allocator);
                }
            }
        }
        for device in term.logical_devices.drain(..) {
            if let Some(destroy) = device.icd_destroy_device {
                destroy(device.icd_device, p_allocator);
            }
        }
        if let Some(destroy) = term.dispatch.destroy_instance {
            destroy(term.instance, p_allocator);
        }
    }
    inst.phys_devs_tramp.clear();
    inst.phys_devs_term.clear();
}

/// Fills the instance dispatch by resolving every known entry point through
/// the top of the freshly built chain.
pub unsafe fn populate_instance_dispatch(
    inst: &mut LoaderInstance,
    top_gipa: unsafe extern "system" fn(VkInstance, *const c_char) -> PFN_vkVoidFunction,
    chain_instance: VkInstance,
) {
    macro_rules! fill {
        ($($field:ident = $name:literal),+ $(,)?) => {
            $(
                inst.disp.layer_inst_disp.$field = pfn(top_gipa(
                    chain_instance,
                    concat!($name, "\0").as_ptr() as *const c_char,
                ));
            )+
        };
    }
    fill! {
        GetInstanceProcAddr = "vkGetInstanceProcAddr",
        GetPhysicalDeviceProcAddr = "vk_layerGetPhysicalDeviceProcAddr",
        DestroyInstance = "vkDestroyInstance",
        EnumeratePhysicalDevices = "vkEnumeratePhysicalDevices",
        EnumeratePhysicalDeviceGroups = "vkEnumeratePhysicalDeviceGroups",
        GetPhysicalDeviceProperties = "vkGetPhysicalDeviceProperties",
        GetPhysicalDeviceProperties2 = "vkGetPhysicalDeviceProperties2",
        GetPhysicalDeviceFeatures = "vkGetPhysicalDeviceFeatures",
        GetPhysicalDeviceFeatures2 = "vkGetPhysicalDeviceFeatures2",
        GetPhysicalDeviceQueueFamilyProperties = "vkGetPhysicalDeviceQueueFamilyProperties",
        GetPhysicalDeviceMemoryProperties = "vkGetPhysicalDeviceMemoryProperties",
        EnumerateDeviceExtensionProperties = "vkEnumerateDeviceExtensionProperties",
        EnumerateDeviceLayerProperties = "vkEnumerateDeviceLayerProperties",
        CreateDevice = "vkCreateDevice",
        DestroySurfaceKHR = "vkDestroySurfaceKHR",
        GetPhysicalDeviceSurfaceSupportKHR = "vkGetPhysicalDeviceSurfaceSupportKHR",
        GetPhysicalDeviceSurfaceCapabilitiesKHR = "vkGetPhysicalDeviceSurfaceCapabilitiesKHR",
        GetPhysicalDeviceSurfaceFormatsKHR = "vkGetPhysicalDeviceSurfaceFormatsKHR",
        GetPhysicalDeviceSurfacePresentModesKHR = "vkGetPhysicalDeviceSurfacePresentModesKHR",
        CreateXlibSurfaceKHR = "vkCreateXlibSurfaceKHR",
        CreateXcbSurfaceKHR = "vkCreateXcbSurfaceKHR",
        CreateWaylandSurfaceKHR = "vkCreateWaylandSurfaceKHR",
        CreateWin32SurfaceKHR = "vkCreateWin32SurfaceKHR",
        CreateMetalSurfaceEXT = "vkCreateMetalSurfaceEXT",
        CreateHeadlessSurfaceEXT = "vkCreateHeadlessSurfaceEXT",
        CreateDebugUtilsMessengerEXT = "vkCreateDebugUtilsMessengerEXT",
        DestroyDebugUtilsMessengerEXT = "vkDestroyDebugUtilsMessengerEXT",
        CreateDebugReportCallbackEXT = "vkCreateDebugReportCallbackEXT",
        DestroyDebugReportCallbackEXT = "vkDestroyDebugReportCallbackEXT",
    }
}

macro_rules! term_pfn {
    ($f:expr) => {
        Some(mem::transmute::<_, unsafe extern "system" fn()>($f as usize))
    };
}

/// The terminator's `vkGetInstanceProcAddr`: known names resolve to the
/// terminator entry points; unknown physical-device names go through the
/// unknown-function dispatcher.
pub unsafe extern "system" fn get_instance_proc_addr(
    instance: VkInstance,
    p_name: *const c_char,
) -> PFN_vkVoidFunction {
    let name = match CStr::from_ptr(p_name).to_str() {
        Ok(n) => n,
        Err(_) => return None,
    };
    match name {
        "vkGetInstanceProcAddr" => term_pfn!(get_instance_proc_addr),
        "vkCreateInstance" => term_pfn!(create_instance),
        "vkDestroyInstance" => term_pfn!(destroy_instance),
        "vkEnumeratePhysicalDevices" => {
            term_pfn!(crate::phys_dev::terminator_enumerate_physical_devices)
        }
        "vkEnumeratePhysicalDeviceGroups" => {
            term_pfn!(crate::phys_dev::terminator_enumerate_physical_device_groups)
        }
        "vkGetPhysicalDeviceProperties" => term_pfn!(get_physical_device_properties),
        "vkGetPhysicalDeviceProperties2" => term_pfn!(get_physical_device_properties2),
        "vkGetPhysicalDeviceFeatures" => term_pfn!(get_physical_device_features),
        "vkGetPhysicalDeviceFeatures2" => term_pfn!(get_physical_device_features2),
        "vkGetPhysicalDeviceQueueFamilyProperties" => {
            term_pfn!(get_physical_device_queue_family_properties)
        }
        "vkGetPhysicalDeviceMemoryProperties" => term_pfn!(get_physical_device_memory_properties),
        "vkEnumerateDeviceExtensionProperties" => term_pfn!(enumerate_device_extension_properties),
        "vkEnumerateDeviceLayerProperties" => term_pfn!(enumerate_device_layer_properties),
        "vkCreateDevice" => term_pfn!(crate::device::terminator_create_device),
        "vkGetDeviceProcAddr" => term_pfn!(crate::device::terminator_get_device_proc_addr),
        "vkDestroySurfaceKHR" => term_pfn!(crate::wsi::terminator_destroy_surface),
        "vkGetPhysicalDeviceSurfaceSupportKHR" => {
            term_pfn!(crate::wsi::terminator_get_physical_device_surface_support)
        }
        "vkGetPhysicalDeviceSurfaceCapabilitiesKHR" => {
            term_pfn!(crate::wsi::terminator_get_physical_device_surface_capabilities)
        }
        "vkGetPhysicalDeviceSurfaceFormatsKHR" => {
            term_pfn!(crate::wsi::terminator_get_physical_device_surface_formats)
        }
        "vkGetPhysicalDeviceSurfacePresentModesKHR" => {
            term_pfn!(crate::wsi::terminator_get_physical_device_surface_present_modes)
        }
        "vkCreateXlibSurfaceKHR" => term_pfn!(crate::wsi::terminator_create_xlib_surface),
        "vkCreateXcbSurfaceKHR" => term_pfn!(crate::wsi::terminator_create_xcb_surface),
        "vkCreateWaylandSurfaceKHR" => term_pfn!(crate::wsi::terminator_create_wayland_surface),
        "vkCreateWin32SurfaceKHR" => term_pfn!(crate::wsi::terminator_create_win32_surface),
        "vkCreateMetalSurfaceEXT" => term_pfn!(crate::wsi::terminator_create_metal_surface),
        "vkCreateHeadlessSurfaceEXT" => term_pfn!(crate::wsi::terminator_create_headless_surface),
        "vkCreateDebugUtilsMessengerEXT" => {
            term_pfn!(crate::wsi::terminator_create_debug_utils_messenger)
        }
        "vkDestroyDebugUtilsMessengerEXT" => {
            term_pfn!(crate::wsi::terminator_destroy_debug_utils_messenger)
        }
        "vkCreateDebugReportCallbackEXT" => {
            term_pfn!(crate::wsi::terminator_create_debug_report_callback)
        }
        "vkDestroyDebugReportCallbackEXT" => {
            term_pfn!(crate::wsi::terminator_destroy_debug_report_callback)
        }
        _ => {
            let Some(inst) = LoaderInstance::from_handle(instance) else {
                return None;
            };
            if let Some(p) = crate::unknown::phys_dev_ext_gpa(inst, name, false) {
                return Some(p);
            }
            crate::unknown::dev_ext_gpa(inst, name, false)
        }
    }
}

/// The terminator's physical-device proc lookup, handed to layers that
/// implement physical-device extensions.
pub unsafe extern "system" fn get_physical_device_proc_addr(
    instance: VkInstance,
    p_name: *const c_char,
) -> PFN_vkVoidFunction {
    let Some(inst) = LoaderInstance::from_handle(instance) else {
        return None;
    };
    let name = match CStr::from_ptr(p_name).to_str() {
        Ok(n) => n,
        Err(_) => return None,
    };
    crate::unknown::phys_dev_ext_gpa(inst, name, false)
}

pub(crate) unsafe fn term_and_icd<'a>(
    phys_dev: VkPhysicalDevice,
) -> (&'a PhysDevTerm, &'a IcdTerm) {
    let term = &*(phys_dev as *const PhysDevTerm);
    (term, &*term.this_icd_term)
}

pub unsafe extern "system" fn get_physical_device_properties(
    phys_dev: VkPhysicalDevice,
    p_properties: *mut VkPhysicalDeviceProperties,
) {
    let (term, icd) = term_and_icd(phys_dev);
    if let Some(f) = icd.dispatch.get_physical_device_properties {
        f(term.phys_dev, p_properties);
    }
}

/// Properties2 terminator with 1.0 emulation: a driver without the entry
/// point gets the legacy query and the chain is left untouched.
pub unsafe extern "system" fn get_physical_device_properties2(
    phys_dev: VkPhysicalDevice,
    p_properties: *mut VkPhysicalDeviceProperties2,
) {
    let (term, icd) = term_and_icd(phys_dev);
    if let Some(f) = icd.dispatch.get_physical_device_properties2 {
        f(term.phys_dev, p_properties);
        return;
    }
    loader_log!(
        LogBits::INFO | LogBits::DRIVER,
        "emulating vkGetPhysicalDeviceProperties2 on a 1.0 driver; pNext chain ignored"
    );
    if let Some(f) = icd.dispatch.get_physical_device_properties {
        f(term.phys_dev, &mut (*p_properties).properties);
    }
}

pub unsafe extern "system" fn get_physical_device_features(
    phys_dev: VkPhysicalDevice,
    p_features: *mut VkPhysicalDeviceFeatures,
) {
    let (term, icd) = term_and_icd(phys_dev);
    if let Some(f) = icd.dispatch.get_physical_device_features {
        f(term.phys_dev, p_features);
    }
}

pub unsafe extern "system" fn get_physical_device_features2(
    phys_dev: VkPhysicalDevice,
    p_features: *mut VkPhysicalDeviceFeatures2,
) {
    let (term, icd) = term_and_icd(phys_dev);
    if let Some(f) = icd.dispatch.get_physical_device_features2 {
        f(term.phys_dev, p_features);
        return;
    }
    loader_log!(
        LogBits::INFO | LogBits::DRIVER,
        "emulating vkGetPhysicalDeviceFeatures2 on a 1.0 driver; pNext chain ignored"
    );
    if let Some(f) = icd.dispatch.get_physical_device_features {
        f(term.phys_dev, &mut (*p_features).features);
    }
}

pub unsafe extern "system" fn get_physical_device_queue_family_properties(
    phys_dev: VkPhysicalDevice,
    p_count: *mut u32,
    p_properties: *mut VkQueueFamilyProperties,
) {
    let (term, icd) = term_and_icd(phys_dev);
    if let Some(f) = icd.dispatch.get_physical_device_queue_family_properties {
        f(term.phys_dev, p_count, p_properties);
    }
}

pub unsafe extern "system" fn get_physical_device_memory_properties(
    phys_dev: VkPhysicalDevice,
    p_properties: *mut VkPhysicalDeviceMemoryProperties,
) {
    let (term, icd) = term_and_icd(phys_dev);
    if let Some(f) = icd.dispatch.get_physical_device_memory_properties {
        f(term.phys_dev, p_properties);
    }
}

pub unsafe extern "system" fn enumerate_device_extension_properties(
    phys_dev: VkPhysicalDevice,
    p_layer_name: *const c_char,
    p_count: *mut u32,
    p_properties: *mut VkExtensionProperties,
) -> VkResult {
    let (term, icd) = term_and_icd(phys_dev);
    if !p_layer_name.is_null() {
        // Layer device extensions are answered from the manifests, not the
        // driver.
        *p_count = 0;
        return VK_SUCCESS;
    }
    match icd.dispatch.enumerate_device_extension_properties {
        Some(f) => f(term.phys_dev, p_layer_name, p_count, p_properties),
        None => {
            *p_count = 0;
            VK_SUCCESS
        }
    }
}

/// Device layers are long deprecated; report the instance's active set so
/// old applications keep seeing a consistent list.
pub unsafe extern "system" fn enumerate_device_layer_properties(
    _phys_dev: VkPhysicalDevice,
    p_count: *mut u32,
    p_properties: *mut VkLayerProperties,
) -> VkResult {
    write_enumerated::<VkLayerProperties>(&[], p_count, p_properties)
}

/// `vkEnumerateInstanceVersion` terminator.
pub unsafe extern "system" fn enumerate_instance_version(p_api_version: *mut u32) -> VkResult {
    if p_api_version.is_null() {
        return VK_ERROR_INITIALIZATION_FAILED;
    }
    *p_api_version = LOADER_VERSION.to_raw();
    VK_SUCCESS
}

/// Global `vkEnumerateInstanceExtensionProperties`: the union of driver
/// extensions plus the ones the loader implements, or one layer's list when
/// `pLayerName` is set.
pub unsafe fn global_enumerate_instance_extension_properties(
    p_layer_name: *const c_char,
    p_count: *mut u32,
    p_properties: *mut VkExtensionProperties,
) -> VkResult {
    let mut names: Vec<(String, u32)> = Vec::new();

    if !p_layer_name.is_null() {
        let layer_name = crate::util::cstr_to_string(p_layer_name);
        let settings = crate::settings::LoaderSettings::load();
        let layers = crate::layers::scan_layers(&settings);
        match layers.find(&layer_name) {
            Some(layer) => {
                for ext in &layer.instance_extensions {
                    names.push((ext.name.clone(), ext.spec_version));
                }
            }
            None => return VK_ERROR_LAYER_NOT_PRESENT,
        }
    } else {
        let icds = crate::preloaded_icds();
        for icd in icds.iter() {
            for ext in icd_supported_extensions(icd) {
                if !names.iter().any(|(n, _)| *n == ext) {
                    names.push((ext, 1));
                }
            }
        }
        for loader_ext in [
            VK_KHR_PORTABILITY_ENUMERATION_EXTENSION_NAME,
            VK_LUNARG_DIRECT_DRIVER_LOADING_EXTENSION_NAME,
        ] {
            if !names.iter().any(|(n, _)| n == loader_ext) {
                names.push((loader_ext.to_owned(), 1));
            }
        }
    }

    let props: Vec<VkExtensionProperties> = names
        .iter()
        .map(|(name, version)| VkExtensionProperties {
            extensionName: copy_to_char_array(name),
            specVersion: *version,
        })
        .collect();
    write_enumerated(&props, p_count, p_properties)
}

/// Global `vkEnumerateInstanceLayerProperties` from the scanned registry.
pub unsafe fn global_enumerate_instance_layer_properties(
    p_count: *mut u32,
    p_properties: *mut VkLayerProperties,
) -> VkResult {
    let settings = crate::settings::LoaderSettings::load();
    let layers = crate::layers::scan_layers(&settings);
    let props: Vec<VkLayerProperties> = layers
        .enumerable()
        .filter(|l| l.control != LayerControl::Off)
        .map(|l| VkLayerProperties {
            layerName: copy_to_char_array(&l.name),
            specVersion: l.spec_version.to_raw(),
            implementationVersion: l.implementation_version,
            description: copy_to_char_array(&l.description),
        })
        .collect();
    write_enumerated(&props, p_count, p_properties)
}
