//! The loader's exported API surface.
//!
//! Every function here is a thin exported symbol: check the handle, load the
//! dispatch table out of its first word, call the chain. Object creation and
//! destruction additionally serialize on the global loader lock.

use std::ffi::CStr;
use std::mem;

use libc::c_char;
use vk_sys::*;

use crate::device::{self, trampoline_available, DeviceExtFlags};
use crate::instance::{self, DeviceDispatch, LoaderInstance, PhysDevTramp, LOADER_MAGIC_NUMBER};
use crate::log::LogBits;
use crate::phys_dev;
use crate::terminator;

macro_rules! export_pfn {
    ($f:expr) => {
        Some(mem::transmute::<usize, unsafe extern "system" fn()>($f as usize))
    };
}

unsafe fn instance_of(handle: VkInstance) -> Option<&'static mut LoaderInstance> {
    LoaderInstance::from_handle(handle)
}

unsafe fn phys_dev_of<'a>(handle: VkPhysicalDevice) -> &'a PhysDevTramp {
    let tramp = &*(handle as *const PhysDevTramp);
    if tramp.magic != LOADER_MAGIC_NUMBER {
        loader_log!(
            LogBits::WARN,
            "physical-device handle {:p} has a corrupt magic value; a layer likely wrapped \
             the handle and failed to unwrap it",
            handle
        );
    }
    tramp
}

unsafe fn device_dispatch<'a>(device: VkDevice) -> &'a DeviceDispatch {
    let disp = *(device as *const *const DeviceDispatch);
    let disp = &*disp;
    if disp.core_dispatch.magic != LOADER_MAGIC_NUMBER {
        loader_log!(
            LogBits::WARN,
            "device handle {:p} has a corrupt dispatch magic; a layer likely wrapped the \
             handle and failed to unwrap it",
            device
        );
    }
    disp
}

// ---- global commands -------------------------------------------------------

#[no_mangle]
pub unsafe extern "system" fn vkCreateInstance(
    p_create_info: *const VkInstanceCreateInfo,
    p_allocator: *const VkAllocationCallbacks,
    p_instance: *mut VkInstance,
) -> VkResult {
    let _lock = crate::loader_lock();
    if p_create_info.is_null() || p_instance.is_null() {
        return VK_ERROR_INITIALIZATION_FAILED;
    }
    crate::release_preloaded_icds();
    match instance::create_instance(p_create_info, p_allocator, p_instance) {
        Ok(()) => VK_SUCCESS,
        Err(err) => {
            loader_log!(LogBits::ERROR, "vkCreateInstance failed: {}", err);
            err.vk_result()
        }
    }
}

#[no_mangle]
pub unsafe extern "system" fn vkDestroyInstance(
    instance: VkInstance,
    p_allocator: *const VkAllocationCallbacks,
) {
    if instance.is_null() {
        return;
    }
    let _lock = crate::loader_lock();
    instance::destroy_instance(instance, p_allocator);
}

#[no_mangle]
pub unsafe extern "system" fn vkEnumerateInstanceExtensionProperties(
    p_layer_name: *const c_char,
    p_count: *mut u32,
    p_properties: *mut VkExtensionProperties,
) -> VkResult {
    terminator::global_enumerate_instance_extension_properties(p_layer_name, p_count, p_properties)
}

#[no_mangle]
pub unsafe extern "system" fn vkEnumerateInstanceLayerProperties(
    p_count: *mut u32,
    p_properties: *mut VkLayerProperties,
) -> VkResult {
    terminator::global_enumerate_instance_layer_properties(p_count, p_properties)
}

#[no_mangle]
pub unsafe extern "system" fn vkEnumerateInstanceVersion(p_api_version: *mut u32) -> VkResult {
    terminator::enumerate_instance_version(p_api_version)
}

// ---- proc-addr lookups -----------------------------------------------------

/// Returned for `vk_layerGetPhysicalDeviceProcAddr` queries; lets the top of
/// the chain resolve unknown physical-device commands.
unsafe extern "system" fn loader_gpdpa(
    instance: VkInstance,
    p_name: *const c_char,
) -> PFN_vkVoidFunction {
    let Some(inst) = instance_of(instance) else {
        return None;
    };
    let Ok(name) = CStr::from_ptr(p_name).to_str() else {
        return None;
    };
    crate::unknown::phys_dev_ext_gpa(inst, name, true)
}

fn global_command(name: &str) -> PFN_vkVoidFunction {
    unsafe {
        match name {
            "vkGetInstanceProcAddr" => export_pfn!(vkGetInstanceProcAddr),
            "vkCreateInstance" => export_pfn!(vkCreateInstance),
            "vkEnumerateInstanceExtensionProperties" => {
                export_pfn!(vkEnumerateInstanceExtensionProperties)
            }
            "vkEnumerateInstanceLayerProperties" => {
                export_pfn!(vkEnumerateInstanceLayerProperties)
            }
            "vkEnumerateInstanceVersion" => export_pfn!(vkEnumerateInstanceVersion),
            _ => None,
        }
    }
}

fn instance_command(name: &str) -> PFN_vkVoidFunction {
    unsafe {
        match name {
            "vkDestroyInstance" => export_pfn!(vkDestroyInstance),
            "vkEnumeratePhysicalDevices" => export_pfn!(vkEnumeratePhysicalDevices),
            "vkEnumeratePhysicalDeviceGroups" | "vkEnumeratePhysicalDeviceGroupsKHR" => {
                export_pfn!(vkEnumeratePhysicalDeviceGroups)
            }
            "vkGetPhysicalDeviceProperties" => export_pfn!(vkGetPhysicalDeviceProperties),
            "vkGetPhysicalDeviceProperties2" | "vkGetPhysicalDeviceProperties2KHR" => {
                export_pfn!(vkGetPhysicalDeviceProperties2)
            }
            "vkGetPhysicalDeviceFeatures" => export_pfn!(vkGetPhysicalDeviceFeatures),
            "vkGetPhysicalDeviceFeatures2" | "vkGetPhysicalDeviceFeatures2KHR" => {
                export_pfn!(vkGetPhysicalDeviceFeatures2)
            }
            "vkGetPhysicalDeviceQueueFamilyProperties" => {
                export_pfn!(vkGetPhysicalDeviceQueueFamilyProperties)
            }
            "vkGetPhysicalDeviceMemoryProperties" => {
                export_pfn!(vkGetPhysicalDeviceMemoryProperties)
            }
            "vkEnumerateDeviceExtensionProperties" => {
                export_pfn!(vkEnumerateDeviceExtensionProperties)
            }
            "vkEnumerateDeviceLayerProperties" => export_pfn!(vkEnumerateDeviceLayerProperties),
            "vkCreateDevice" => export_pfn!(vkCreateDevice),
            "vkGetDeviceProcAddr" => export_pfn!(vkGetDeviceProcAddr),
            "vk_layerGetPhysicalDeviceProcAddr" => export_pfn!(loader_gpdpa),
            "vkDestroySurfaceKHR" => export_pfn!(vkDestroySurfaceKHR),
            "vkGetPhysicalDeviceSurfaceSupportKHR" => {
                export_pfn!(vkGetPhysicalDeviceSurfaceSupportKHR)
            }
            "vkGetPhysicalDeviceSurfaceCapabilitiesKHR" => {
                export_pfn!(vkGetPhysicalDeviceSurfaceCapabilitiesKHR)
            }
            "vkGetPhysicalDeviceSurfaceFormatsKHR" => {
                export_pfn!(vkGetPhysicalDeviceSurfaceFormatsKHR)
            }
            "vkGetPhysicalDeviceSurfacePresentModesKHR" => {
                export_pfn!(vkGetPhysicalDeviceSurfacePresentModesKHR)
            }
            "vkCreateXlibSurfaceKHR" => export_pfn!(vkCreateXlibSurfaceKHR),
            "vkCreateXcbSurfaceKHR" => export_pfn!(vkCreateXcbSurfaceKHR),
            "vkCreateWaylandSurfaceKHR" => export_pfn!(vkCreateWaylandSurfaceKHR),
            "vkCreateWin32SurfaceKHR" => export_pfn!(vkCreateWin32SurfaceKHR),
            "vkCreateMetalSurfaceEXT" => export_pfn!(vkCreateMetalSurfaceEXT),
            "vkCreateHeadlessSurfaceEXT" => export_pfn!(vkCreateHeadlessSurfaceEXT),
            "vkCreateDebugUtilsMessengerEXT" => export_pfn!(vkCreateDebugUtilsMessengerEXT),
            "vkDestroyDebugUtilsMessengerEXT" => export_pfn!(vkDestroyDebugUtilsMessengerEXT),
            "vkCreateDebugReportCallbackEXT" => export_pfn!(vkCreateDebugReportCallbackEXT),
            "vkDestroyDebugReportCallbackEXT" => export_pfn!(vkDestroyDebugReportCallbackEXT),
            _ => None,
        }
    }
}

fn device_command(name: &str) -> PFN_vkVoidFunction {
    unsafe {
        match name {
            "vkGetDeviceProcAddr" => export_pfn!(vkGetDeviceProcAddr),
            "vkDestroyDevice" => export_pfn!(vkDestroyDevice),
            "vkGetDeviceQueue" => export_pfn!(vkGetDeviceQueue),
            "vkCreateSwapchainKHR" => export_pfn!(vkCreateSwapchainKHR),
            "vkDestroySwapchainKHR" => export_pfn!(vkDestroySwapchainKHR),
            "vkGetSwapchainImagesKHR" => export_pfn!(vkGetSwapchainImagesKHR),
            _ => None,
        }
    }
}

#[no_mangle]
pub unsafe extern "system" fn vkGetInstanceProcAddr(
    instance: VkInstance,
    p_name: *const c_char,
) -> PFN_vkVoidFunction {
    if p_name.is_null() {
        return None;
    }
    let Ok(name) = CStr::from_ptr(p_name).to_str() else {
        return None;
    };
    if let Some(global) = global_command(name) {
        return Some(global);
    }
    if instance.is_null() {
        return None;
    }
    if let Some(known) = instance_command(name) {
        return Some(known);
    }
    if let Some(known) = device_command(name) {
        return Some(known);
    }
    let Some(inst) = instance_of(instance) else {
        return None;
    };
    if let Some(found) = crate::unknown::phys_dev_ext_gpa(inst, name, true) {
        return Some(found);
    }
    crate::unknown::dev_ext_gpa(inst, name, true)
}

#[no_mangle]
pub unsafe extern "system" fn vkGetDeviceProcAddr(
    device: VkDevice,
    p_name: *const c_char,
) -> PFN_vkVoidFunction {
    if device.is_null() || p_name.is_null() {
        return None;
    }
    let Ok(name) = CStr::from_ptr(p_name).to_str() else {
        return None;
    };
    match name {
        "vkGetDeviceProcAddr" | "vkDestroyDevice" | "vkGetDeviceQueue" => device_command(name),
        "vkCreateSwapchainKHR" | "vkDestroySwapchainKHR" | "vkGetSwapchainImagesKHR" => {
            // Extension commands hand out a trampoline only when the device
            // enabled the extension, through the driver or a layer.
            let Some((_, _, dev)) = crate::find_device(device) else {
                return device_command(name);
            };
            if trampoline_available(dev, DeviceExtFlags::KHR_SWAPCHAIN) {
                device_command(name)
            } else {
                None
            }
        }
        _ => {
            let Some((inst, _, _)) = crate::find_device(device) else {
                return None;
            };
            crate::unknown::dev_ext_gpa(inst, name, true)
        }
    }
}

// ---- physical-device commands ---------------------------------------------

#[no_mangle]
pub unsafe extern "system" fn vkEnumeratePhysicalDevices(
    instance: VkInstance,
    p_count: *mut u32,
    p_devices: *mut VkPhysicalDevice,
) -> VkResult {
    let _lock = crate::loader_lock();
    let Some(inst) = instance_of(instance) else {
        return VK_ERROR_INITIALIZATION_FAILED;
    };
    if p_count.is_null() {
        return VK_ERROR_INITIALIZATION_FAILED;
    }
    phys_dev::trampoline_enumerate_physical_devices(inst, p_count, p_devices)
}

#[no_mangle]
pub unsafe extern "system" fn vkEnumeratePhysicalDeviceGroups(
    instance: VkInstance,
    p_count: *mut u32,
    p_groups: *mut VkPhysicalDeviceGroupProperties,
) -> VkResult {
    let _lock = crate::loader_lock();
    let Some(inst) = instance_of(instance) else {
        return VK_ERROR_INITIALIZATION_FAILED;
    };
    phys_dev::trampoline_enumerate_physical_device_groups(inst, p_count, p_groups)
}

macro_rules! phys_dev_trampoline {
    ($export:ident, $slot:ident, ($($arg:ident: $ty:ty),*)) => {
        #[no_mangle]
        pub unsafe extern "system" fn $export(
            physical_device: VkPhysicalDevice,
            $($arg: $ty),*
        ) {
            let tramp = phys_dev_of(physical_device);
            if let Some(f) = (*tramp.disp).layer_inst_disp.$slot {
                f(tramp.phys_dev, $($arg),*);
            }
        }
    };
    ($export:ident, $slot:ident, ($($arg:ident: $ty:ty),*) -> VkResult) => {
        #[no_mangle]
        pub unsafe extern "system" fn $export(
            physical_device: VkPhysicalDevice,
            $($arg: $ty),*
        ) -> VkResult {
            let tramp = phys_dev_of(physical_device);
            match (*tramp.disp).layer_inst_disp.$slot {
                Some(f) => f(tramp.phys_dev, $($arg),*),
                None => VK_ERROR_EXTENSION_NOT_PRESENT,
            }
        }
    };
}

phys_dev_trampoline!(
    vkGetPhysicalDeviceProperties,
    GetPhysicalDeviceProperties,
    (p_properties: *mut VkPhysicalDeviceProperties)
);
phys_dev_trampoline!(
    vkGetPhysicalDeviceProperties2,
    GetPhysicalDeviceProperties2,
    (p_properties: *mut VkPhysicalDeviceProperties2)
);
phys_dev_trampoline!(
    vkGetPhysicalDeviceFeatures,
    GetPhysicalDeviceFeatures,
    (p_features: *mut VkPhysicalDeviceFeatures)
);
phys_dev_trampoline!(
    vkGetPhysicalDeviceFeatures2,
    GetPhysicalDeviceFeatures2,
    (p_features: *mut VkPhysicalDeviceFeatures2)
);
phys_dev_trampoline!(
    vkGetPhysicalDeviceQueueFamilyProperties,
    GetPhysicalDeviceQueueFamilyProperties,
    (p_count: *mut u32, p_properties: *mut VkQueueFamilyProperties)
);
phys_dev_trampoline!(
    vkGetPhysicalDeviceMemoryProperties,
    GetPhysicalDeviceMemoryProperties,
    (p_properties: *mut VkPhysicalDeviceMemoryProperties)
);
phys_dev_trampoline!(
    vkEnumerateDeviceExtensionProperties,
    EnumerateDeviceExtensionProperties,
    (p_layer_name: *const c_char, p_count: *mut u32, p_properties: *mut VkExtensionProperties)
        -> VkResult
);
phys_dev_trampoline!(
    vkEnumerateDeviceLayerProperties,
    EnumerateDeviceLayerProperties,
    (p_count: *mut u32, p_properties: *mut VkLayerProperties) -> VkResult
);
phys_dev_trampoline!(
    vkGetPhysicalDeviceSurfaceSupportKHR,
    GetPhysicalDeviceSurfaceSupportKHR,
    (queue_family_index: u32, surface: VkSurfaceKHR, p_supported: *mut VkBool32) -> VkResult
);
phys_dev_trampoline!(
    vkGetPhysicalDeviceSurfaceCapabilitiesKHR,
    GetPhysicalDeviceSurfaceCapabilitiesKHR,
    (surface: VkSurfaceKHR, p_capabilities: *mut VkSurfaceCapabilitiesKHR) -> VkResult
);
phys_dev_trampoline!(
    vkGetPhysicalDeviceSurfaceFormatsKHR,
    GetPhysicalDeviceSurfaceFormatsKHR,
    (surface: VkSurfaceKHR, p_count: *mut u32, p_formats: *mut VkSurfaceFormatKHR) -> VkResult
);
phys_dev_trampoline!(
    vkGetPhysicalDeviceSurfacePresentModesKHR,
    GetPhysicalDeviceSurfacePresentModesKHR,
    (surface: VkSurfaceKHR, p_count: *mut u32, p_modes: *mut VkPresentModeKHR) -> VkResult
);

#[no_mangle]
pub unsafe extern "system" fn vkCreateDevice(
    physical_device: VkPhysicalDevice,
    p_create_info: *const VkDeviceCreateInfo,
    p_allocator: *const VkAllocationCallbacks,
    p_device: *mut VkDevice,
) -> VkResult {
    let _lock = crate::loader_lock();
    if p_create_info.is_null() || p_device.is_null() {
        return VK_ERROR_INITIALIZATION_FAILED;
    }
    let tramp = phys_dev_of(physical_device);
    device::create_device_chain(tramp, p_create_info, p_allocator, p_device)
}

// ---- instance-level WSI and debug commands --------------------------------

macro_rules! instance_trampoline {
    ($export:ident, $slot:ident, ($($arg:ident: $ty:ty),*)) => {
        #[no_mangle]
        pub unsafe extern "system" fn $export(
            instance: VkInstance,
            $($arg: $ty),*
        ) {
            let _lock = crate::loader_lock();
            let inst = &*(instance as *const LoaderInstance);
            if let Some(f) = inst.dispatch().layer_inst_disp.$slot {
                f(instance, $($arg),*);
            }
        }
    };
    ($export:ident, $slot:ident, ($($arg:ident: $ty:ty),*) -> VkResult) => {
        #[no_mangle]
        pub unsafe extern "system" fn $export(
            instance: VkInstance,
            $($arg: $ty),*
        ) -> VkResult {
            let _lock = crate::loader_lock();
            let inst = &*(instance as *const LoaderInstance);
            match inst.dispatch().layer_inst_disp.$slot {
                Some(f) => f(instance, $($arg),*),
                None => VK_ERROR_EXTENSION_NOT_PRESENT,
            }
        }
    };
}

#[no_mangle]
pub unsafe extern "system" fn vkDestroySurfaceKHR(
    instance: VkInstance,
    surface: VkSurfaceKHR,
    p_allocator: *const VkAllocationCallbacks,
) {
    let _lock = crate::loader_lock();
    let inst = &*(instance as *const LoaderInstance);
    if let Some(f) = inst.dispatch().layer_inst_disp.DestroySurfaceKHR {
        f(instance, surface, p_allocator);
    }
}

macro_rules! surface_create_trampoline {
    ($export:ident, $slot:ident, $create_info:ty) => {
        #[no_mangle]
        pub unsafe extern "system" fn $export(
            instance: VkInstance,
            p_create_info: *const $create_info,
            p_allocator: *const VkAllocationCallbacks,
            p_surface: *mut VkSurfaceKHR,
        ) -> VkResult {
            let _lock = crate::loader_lock();
            let inst = &*(instance as *const LoaderInstance);
            match inst.dispatch().layer_inst_disp.$slot {
                Some(f) => f(instance, p_create_info, p_allocator, p_surface),
                None => VK_ERROR_EXTENSION_NOT_PRESENT,
            }
        }
    };
}

surface_create_trampoline!(vkCreateXlibSurfaceKHR, CreateXlibSurfaceKHR, VkXlibSurfaceCreateInfoKHR);
surface_create_trampoline!(vkCreateXcbSurfaceKHR, CreateXcbSurfaceKHR, VkXcbSurfaceCreateInfoKHR);
surface_create_trampoline!(
    vkCreateWaylandSurfaceKHR,
    CreateWaylandSurfaceKHR,
    VkWaylandSurfaceCreateInfoKHR
);
surface_create_trampoline!(
    vkCreateWin32SurfaceKHR,
    CreateWin32SurfaceKHR,
    VkWin32SurfaceCreateInfoKHR
);
surface_create_trampoline!(
    vkCreateMetalSurfaceEXT,
    CreateMetalSurfaceEXT,
    VkMetalSurfaceCreateInfoEXT
);
surface_create_trampoline!(
    vkCreateHeadlessSurfaceEXT,
    CreateHeadlessSurfaceEXT,
    VkHeadlessSurfaceCreateInfoEXT
);

instance_trampoline!(
    vkCreateDebugUtilsMessengerEXT,
    CreateDebugUtilsMessengerEXT,
    (p_create_info: *const VkDebugUtilsMessengerCreateInfoEXT,
     p_allocator: *const VkAllocationCallbacks,
     p_messenger: *mut VkDebugUtilsMessengerEXT) -> VkResult
);
instance_trampoline!(
    vkDestroyDebugUtilsMessengerEXT,
    DestroyDebugUtilsMessengerEXT,
    (messenger: VkDebugUtilsMessengerEXT, p_allocator: *const VkAllocationCallbacks)
);
instance_trampoline!(
    vkCreateDebugReportCallbackEXT,
    CreateDebugReportCallbackEXT,
    (p_create_info: *const VkDebugReportCallbackCreateInfoEXT,
     p_allocator: *const VkAllocationCallbacks,
     p_callback: *mut VkDebugReportCallbackEXT) -> VkResult
);
instance_trampoline!(
    vkDestroyDebugReportCallbackEXT,
    DestroyDebugReportCallbackEXT,
    (callback: VkDebugReportCallbackEXT, p_allocator: *const VkAllocationCallbacks)
);

// ---- device commands -------------------------------------------------------

#[no_mangle]
pub unsafe extern "system" fn vkDestroyDevice(
    device: VkDevice,
    p_allocator: *const VkAllocationCallbacks,
) {
    if device.is_null() {
        return;
    }
    let _lock = crate::loader_lock();
    let disp = device_dispatch(device);
    if let Some(f) = disp.core_dispatch.DestroyDevice {
        f(device, p_allocator);
    }
}

#[no_mangle]
pub unsafe extern "system" fn vkGetDeviceQueue(
    device: VkDevice,
    queue_family_index: u32,
    queue_index: u32,
    p_queue: *mut VkQueue,
) {
    let disp = device_dispatch(device);
    if let Some(f) = disp.core_dispatch.GetDeviceQueue {
        f(device, queue_family_index, queue_index, p_queue);
        // Queues are dispatchable driver objects; give them our dispatch.
        if !p_queue.is_null() && !(*p_queue).is_null() {
            *((*p_queue) as *mut *const DeviceDispatch) = disp;
        }
    }
}

#[no_mangle]
pub unsafe extern "system" fn vkCreateSwapchainKHR(
    device: VkDevice,
    p_create_info: *const VkSwapchainCreateInfoKHR,
    p_allocator: *const VkAllocationCallbacks,
    p_swapchain: *mut VkSwapchainKHR,
) -> VkResult {
    let disp = device_dispatch(device);
    match disp.core_dispatch.CreateSwapchainKHR {
        Some(f) => f(device, p_create_info, p_allocator, p_swapchain),
        None => VK_ERROR_EXTENSION_NOT_PRESENT,
    }
}

#[no_mangle]
pub unsafe extern "system" fn vkDestroySwapchainKHR(
    device: VkDevice,
    swapchain: VkSwapchainKHR,
    p_allocator: *const VkAllocationCallbacks,
) {
    let disp = device_dispatch(device);
    if let Some(f) = disp.core_dispatch.DestroySwapchainKHR {
        f(device, swapchain, p_allocator);
    }
}

#[no_mangle]
pub unsafe extern "system" fn vkGetSwapchainImagesKHR(
    device: VkDevice,
    swapchain: VkSwapchainKHR,
    p_count: *mut u32,
    p_images: *mut VkImage,
) -> VkResult {
    let disp = device_dispatch(device);
    match disp.core_dispatch.GetSwapchainImagesKHR {
        Some(f) => f(device, swapchain, p_count, p_images),
        None => VK_ERROR_EXTENSION_NOT_PRESENT,
    }
}
