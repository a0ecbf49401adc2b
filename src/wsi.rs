//! The surface bridge and its window-system flavors, plus the analogous
//! debug-messenger and debug-report bridges.
//!
//! One application surface maps to one loader record with a stable index;
//! every driver new enough to accept loader surface records gets its own
//! per-driver surface stored at that index in its terminator's array. Older
//! drivers see the application handle unchanged and are responsible for
//! recognizing their own handles. Each flavor below is the same pattern
//! stamped out for a different `VkIcd*Surface` payload.

use vk_sys::*;

use crate::alloc;
use crate::instance::{IcdTerm, LoaderInstance};
use crate::terminator::term_and_icd;

/// Loader-side surface record: the flavor union drivers can parse, plus the
/// stable index into every driver's per-surface array.
#[repr(C)]
pub struct IcdSurface {
    pub u: IcdSurfaceUnion,
    pub surface_index: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union IcdSurfaceUnion {
    pub base: VkIcdSurfaceBase,
    pub xlib: VkIcdSurfaceXlib,
    pub xcb: VkIcdSurfaceXcb,
    pub wayland: VkIcdSurfaceWayland,
    pub win32: VkIcdSurfaceWin32,
    pub metal: VkIcdSurfaceMetal,
    pub headless: VkIcdSurfaceHeadless,
}

/// Debug-utils messengers use the same used-object pattern; the record only
/// needs to carry its index.
#[repr(C)]
pub struct LoaderDebugUtilsMessenger {
    pub index: u32,
}

#[repr(C)]
pub struct LoaderDebugReportCallback {
    pub index: u32,
}

/// The per-driver surface to hand a driver for an application surface: a
/// per-driver handle when one was created at this index, the loader record
/// for drivers that parse it, the raw application handle for everyone else.
pub unsafe fn surface_for_icd(icd: &IcdTerm, surface: VkSurfaceKHR) -> VkSurfaceKHR {
    if !icd.scanned_icd.supports_icd_surfaces() {
        return surface;
    }
    let record = surface as usize as *const IcdSurface;
    if record.is_null() {
        return surface;
    }
    let index = (*record).surface_index as usize;
    match icd.surfaces.get(index) {
        Some(&per_driver) if per_driver != 0 => per_driver,
        _ => surface,
    }
}

/// The shared creation path: allocate the loader record and index, then
/// mirror creation into each driver that supports per-driver surfaces and
/// implements this flavor. `create_in_icd` returns `None` when the driver
/// lacks the flavor's entry point.
unsafe fn bridge_create_surface<F>(
    instance: VkInstance,
    p_allocator: *const VkAllocationCallbacks,
    payload: IcdSurfaceUnion,
    p_surface: *mut VkSurfaceKHR,
    create_in_icd: F,
) -> VkResult
where
    F: Fn(&IcdTerm, VkSurfaceKHR) -> Option<(VkResult, VkSurfaceKHR)>,
{
    let Some(inst) = LoaderInstance::from_handle(instance) else {
        return VK_ERROR_INITIALIZATION_FAILED;
    };
    let allocator = p_allocator.as_ref().copied().or(inst.alloc_callbacks);

    let index = inst.surfaces.allocate(allocator);
    let record = IcdSurface {
        u: payload,
        surface_index: index as u32,
    };
    let record_ptr = match alloc::alloc_value(
        allocator.as_ref(),
        VK_SYSTEM_ALLOCATION_SCOPE_OBJECT,
        record,
    ) {
        Some(p) => p,
        None => {
            inst.surfaces.release(index);
            return VK_ERROR_OUT_OF_HOST_MEMORY;
        }
    };
    let loader_handle = record_ptr as usize as VkSurfaceKHR;

    let mut failure = None;
    for i in 0..inst.icd_terms.len() {
        let term = &mut inst.icd_terms[i];
        if !term.scanned_icd.supports_icd_surfaces() {
            continue;
        }
        let Some((result, icd_surface)) = create_in_icd(term, loader_handle) else {
            continue;
        };
        if result != VK_SUCCESS {
            failure = Some(result);
            break;
        }
        term.ensure_surface_capacity(index);
        term.surfaces[index] = icd_surface;
    }
    if let Some(result) = failure {
        // Unwind every driver that already created a surface at this index,
        // then the loader record itself.
        for unwind in inst.icd_terms.iter_mut() {
            if let Some(slot) = unwind.surfaces.get_mut(index) {
                if *slot != 0 {
                    if let Some(destroy) = unwind.dispatch.destroy_surface {
                        destroy(unwind.instance, *slot, p_allocator);
                    }
                    *slot = 0;
                }
            }
        }
        let slot_allocator = inst.surfaces.release(index);
        alloc::free_value(slot_allocator.as_ref(), record_ptr);
        return result;
    }

    *p_surface = loader_handle;
    VK_SUCCESS
}

macro_rules! surface_flavor_terminator {
    ($fn_name:ident, $create_info:ty, $dispatch_field:ident, $union_field:ident,
     $platform:expr, $fill:expr) => {
        pub unsafe extern "system" fn $fn_name(
            instance: VkInstance,
            p_create_info: *const $create_info,
            p_allocator: *const VkAllocationCallbacks,
            p_surface: *mut VkSurfaceKHR,
        ) -> VkResult {
            let create_info = &*p_create_info;
            #[allow(clippy::redundant_closure_call)]
            let payload = IcdSurfaceUnion {
                $union_field: ($fill)(create_info, VkIcdSurfaceBase { platform: $platform }),
            };
            bridge_create_surface(instance, p_allocator, payload, p_surface, |term, _| {
                let create = term.dispatch.$dispatch_field?;
                let mut icd_surface: VkSurfaceKHR = 0;
                let result = create(term.instance, p_create_info, p_allocator, &mut icd_surface);
                Some((result, icd_surface))
            })
        }
    };
}

surface_flavor_terminator!(
    terminator_create_xlib_surface,
    VkXlibSurfaceCreateInfoKHR,
    create_xlib_surface,
    xlib,
    VK_ICD_WSI_PLATFORM_XLIB,
    |ci: &VkXlibSurfaceCreateInfoKHR, base| VkIcdSurfaceXlib { base, dpy: ci.dpy, window: ci.window }
);

surface_flavor_terminator!(
    terminator_create_xcb_surface,
    VkXcbSurfaceCreateInfoKHR,
    create_xcb_surface,
    xcb,
    VK_ICD_WSI_PLATFORM_XCB,
    |ci: &VkXcbSurfaceCreateInfoKHR, base| VkIcdSurfaceXcb {
        base,
        connection: ci.connection,
        window: ci.window,
    }
);

surface_flavor_terminator!(
    terminator_create_wayland_surface,
    VkWaylandSurfaceCreateInfoKHR,
    create_wayland_surface,
    wayland,
    VK_ICD_WSI_PLATFORM_WAYLAND,
    |ci: &VkWaylandSurfaceCreateInfoKHR, base| VkIcdSurfaceWayland {
        base,
        display: ci.display,
        surface: ci.surface,
    }
);

surface_flavor_terminator!(
    terminator_create_win32_surface,
    VkWin32SurfaceCreateInfoKHR,
    create_win32_surface,
    win32,
    VK_ICD_WSI_PLATFORM_WIN32,
    |ci: &VkWin32SurfaceCreateInfoKHR, base| VkIcdSurfaceWin32 {
        base,
        hinstance: ci.hinstance,
        hwnd: ci.hwnd,
    }
);

surface_flavor_terminator!(
    terminator_create_metal_surface,
    VkMetalSurfaceCreateInfoEXT,
    create_metal_surface,
    metal,
    VK_ICD_WSI_PLATFORM_METAL,
    |ci: &VkMetalSurfaceCreateInfoEXT, base| VkIcdSurfaceMetal { base, pLayer: ci.pLayer }
);

surface_flavor_terminator!(
    terminator_create_headless_surface,
    VkHeadlessSurfaceCreateInfoEXT,
    create_headless_surface,
    headless,
    VK_ICD_WSI_PLATFORM_HEADLESS,
    |_ci: &VkHeadlessSurfaceCreateInfoEXT, base| VkIcdSurfaceHeadless { base }
);

/// `vkDestroySurfaceKHR` terminator: mirror destruction into every driver
/// holding a per-driver surface at this index, then free the loader record
/// and release the index for reuse.
pub unsafe extern "system" fn terminator_destroy_surface(
    instance: VkInstance,
    surface: VkSurfaceKHR,
    p_allocator: *const VkAllocationCallbacks,
) {
    let Some(inst) = LoaderInstance::from_handle(instance) else {
        return;
    };
    if surface == 0 {
        return;
    }
    let record_ptr = surface as usize as *mut IcdSurface;
    let index = (*record_ptr).surface_index as usize;
    for term in inst.icd_terms.iter_mut() {
        if let Some(slot) = term.surfaces.get_mut(index) {
            if *slot != 0 {
                if let Some(destroy) = term.dispatch.destroy_surface {
                    destroy(term.instance, *slot, p_allocator);
                }
                *slot = 0;
            }
        }
    }
    let slot_allocator = inst.surfaces.release(index);
    alloc::free_value(slot_allocator.as_ref(), record_ptr);
}

// The four per-surface queries share one shape: unwrap the physical device,
// map the surface to the driver's handle at the loader index, forward.
pub unsafe extern "system" fn terminator_get_physical_device_surface_support(
    phys_dev: VkPhysicalDevice,
    queue_family_index: u32,
    surface: VkSurfaceKHR,
    p_supported: *mut VkBool32,
) -> VkResult {
    let (term, icd) = term_and_icd(phys_dev);
    let Some(query) = icd.dispatch.get_physical_device_surface_support else {
        return VK_ERROR_EXTENSION_NOT_PRESENT;
    };
    query(
        term.phys_dev,
        queue_family_index,
        surface_for_icd(icd, surface),
        p_supported,
    )
}

pub unsafe extern "system" fn terminator_get_physical_device_surface_capabilities(
    phys_dev: VkPhysicalDevice,
    surface: VkSurfaceKHR,
    p_capabilities: *mut VkSurfaceCapabilitiesKHR,
) -> VkResult {
    let (term, icd) = term_and_icd(phys_dev);
    let Some(query) = icd.dispatch.get_physical_device_surface_capabilities else {
        return VK_ERROR_EXTENSION_NOT_PRESENT;
    };
    query(term.phys_dev, surface_for_icd(icd, surface), p_capabilities)
}

pub unsafe extern "system" fn terminator_get_physical_device_surface_formats(
    phys_dev: VkPhysicalDevice,
    surface: VkSurfaceKHR,
    p_count: *mut u32,
    p_formats: *mut VkSurfaceFormatKHR,
) -> VkResult {
    let (term, icd) = term_and_icd(phys_dev);
    let Some(query) = icd.dispatch.get_physical_device_surface_formats else {
        return VK_ERROR_EXTENSION_NOT_PRESENT;
    };
    query(term.phys_dev, surface_for_icd(icd, surface), p_count, p_formats)
}

pub unsafe extern "system" fn terminator_get_physical_device_surface_present_modes(
    phys_dev: VkPhysicalDevice,
    surface: VkSurfaceKHR,
    p_count: *mut u32,
    p_modes: *mut VkPresentModeKHR,
) -> VkResult {
    let (term, icd) = term_and_icd(phys_dev);
    let Some(query) = icd.dispatch.get_physical_device_surface_present_modes else {
        return VK_ERROR_EXTENSION_NOT_PRESENT;
    };
    query(term.phys_dev, surface_for_icd(icd, surface), p_count, p_modes)
}

/// Substitutes the per-driver surface into a swapchain create-info before it
/// reaches the owning driver.
pub unsafe fn swapchain_create_info_for_icd(
    icd: &IcdTerm,
    create_info: &VkSwapchainCreateInfoKHR,
) -> VkSwapchainCreateInfoKHR {
    let mut patched = *create_info;
    patched.surface = surface_for_icd(icd, create_info.surface);
    patched
}

// Debug messenger bridge: identical shape to surfaces, with the driver
// fan-out keyed by the messenger index.

pub unsafe extern "system" fn terminator_create_debug_utils_messenger(
    instance: VkInstance,
    p_create_info: *const VkDebugUtilsMessengerCreateInfoEXT,
    p_allocator: *const VkAllocationCallbacks,
    p_messenger: *mut VkDebugUtilsMessengerEXT,
) -> VkResult {
    let Some(inst) = LoaderInstance::from_handle(instance) else {
        return VK_ERROR_INITIALIZATION_FAILED;
    };
    let allocator = p_allocator.as_ref().copied().or(inst.alloc_callbacks);
    let index = inst.debug_messengers.allocate(allocator);
    let record_ptr = match alloc::alloc_value(
        allocator.as_ref(),
        VK_SYSTEM_ALLOCATION_SCOPE_OBJECT,
        LoaderDebugUtilsMessenger { index: index as u32 },
    ) {
        Some(p) => p,
        None => {
            inst.debug_messengers.release(index);
            return VK_ERROR_OUT_OF_HOST_MEMORY;
        }
    };

    let mut failure = None;
    for i in 0..inst.icd_terms.len() {
        let term = &mut inst.icd_terms[i];
        let Some(create) = term.dispatch.create_debug_utils_messenger else {
            continue;
        };
        let mut icd_messenger: VkDebugUtilsMessengerEXT = 0;
        let result = create(term.instance, p_create_info, p_allocator, &mut icd_messenger);
        if result != VK_SUCCESS {
            failure = Some(result);
            break;
        }
        term.ensure_messenger_capacity(index);
        term.debug_messengers[index] = icd_messenger;
    }
    if let Some(result) = failure {
        for unwind in inst.icd_terms.iter_mut() {
            if let Some(slot) = unwind.debug_messengers.get_mut(index) {
                if *slot != 0 {
                    if let Some(destroy) = unwind.dispatch.destroy_debug_utils_messenger {
                        destroy(unwind.instance, *slot, p_allocator);
                    }
                    *slot = 0;
                }
            }
        }
        let slot_allocator = inst.debug_messengers.release(index);
        alloc::free_value(slot_allocator.as_ref(), record_ptr);
        return result;
    }

    *p_messenger = record_ptr as usize as VkDebugUtilsMessengerEXT;
    VK_SUCCESS
}

pub unsafe extern "system" fn terminator_destroy_debug_utils_messenger(
    instance: VkInstance,
    messenger: VkDebugUtilsMessengerEXT,
    p_allocator: *const VkAllocationCallbacks,
) {
    let Some(inst) = LoaderInstance::from_handle(instance) else {
        return;
    };
    if messenger == 0 {
        return;
    }
    let record_ptr = messenger as usize as *mut LoaderDebugUtilsMessenger;
    let index = (*record_ptr).index as usize;
    for term in inst.icd_terms.iter_mut() {
        if let Some(slot) = term.debug_messengers.get_mut(index) {
            if *slot != 0 {
                if let Some(destroy) = term.dispatch.destroy_debug_utils_messenger {
                    destroy(term.instance, *slot, p_allocator);
                }
                *slot = 0;
            }
        }
    }
    let slot_allocator = inst.debug_messengers.release(index);
    alloc::free_value(slot_allocator.as_ref(), record_ptr);
}

pub unsafe extern "system" fn terminator_create_debug_report_callback(
    instance: VkInstance,
    p_create_info: *const VkDebugReportCallbackCreateInfoEXT,
    p_allocator: *const VkAllocationCallbacks,
    p_callback: *mut VkDebugReportCallbackEXT,
) -> VkResult {
    let Some(inst) = LoaderInstance::from_handle(instance) else {
        return VK_ERROR_INITIALIZATION_FAILED;
    };
    let allocator = p_allocator.as_ref().copied().or(inst.alloc_callbacks);
    let index = inst.debug_reports.allocate(allocator);
    let record_ptr = match alloc::alloc_value(
        allocator.as_ref(),
        VK_SYSTEM_ALLOCATION_SCOPE_OBJECT,
        LoaderDebugReportCallback { index: index as u32 },
    ) {
        Some(p) => p,
        None => {
            inst.debug_reports.release(index);
            return VK_ERROR_OUT_OF_HOST_MEMORY;
        }
    };

    let mut failure = None;
    for i in 0..inst.icd_terms.len() {
        let term = &mut inst.icd_terms[i];
        let Some(create) = term.dispatch.create_debug_report_callback else {
            continue;
        };
        let mut icd_callback: VkDebugReportCallbackEXT = 0;
        let result = create(term.instance, p_create_info, p_allocator, &mut icd_callback);
        if result != VK_SUCCESS {
            failure = Some(result);
            break;
        }
        term.ensure_report_capacity(index);
        term.debug_reports[index] = icd_callback;
    }
    if let Some(result) = failure {
        for unwind in inst.icd_terms.iter_mut() {
            if let Some(slot) = unwind.debug_reports.get_mut(index) {
                if *slot != 0 {
                    if let Some(destroy) = unwind.dispatch.destroy_debug_report_callback {
                        destroy(unwind.instance, *slot, p_allocator);
                    }
                    *slot = 0;
                }
            }
        }
        let slot_allocator = inst.debug_reports.release(index);
        alloc::free_value(slot_allocator.as_ref(), record_ptr);
        return result;
    }

    *p_callback = record_ptr as usize as VkDebugReportCallbackEXT;
    VK_SUCCESS
}

pub unsafe extern "system" fn terminator_destroy_debug_report_callback(
    instance: VkInstance,
    callback: VkDebugReportCallbackEXT,
    p_allocator: *const VkAllocationCallbacks,
) {
    let Some(inst) = LoaderInstance::from_handle(instance) else {
        return;
    };
    if callback == 0 {
        return;
    }
    let record_ptr = callback as usize as *mut LoaderDebugReportCallback;
    let index = (*record_ptr).index as usize;
    for term in inst.icd_terms.iter_mut() {
        if let Some(slot) = term.debug_reports.get_mut(index) {
            if *slot != 0 {
                if let Some(destroy) = term.dispatch.destroy_debug_report_callback {
                    destroy(term.instance, *slot, p_allocator);
                }
                *slot = 0;
            }
        }
    }
    let slot_allocator = inst.debug_reports.release(index);
    alloc::free_value(slot_allocator.as_ref(), record_ptr);
}
