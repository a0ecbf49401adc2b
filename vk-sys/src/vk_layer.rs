//! The layer-facing half of the loader ABI.
//!
//! Adapted from the canonical `vk_layer.h`. Layers negotiate an interface
//! version with the loader, then receive their position in the call chain
//! through `VkLayerInstanceCreateInfo` / `VkLayerDeviceCreateInfo` structures
//! the loader threads onto the create-info `pNext` chain. The dispatch-table
//! structs at the bottom are shared layout: layers walk them by field offset,
//! so they stay `#[repr(C)]` function-pointer structs forever.

#![allow(non_camel_case_types, non_snake_case, dead_code, non_upper_case_globals)]

use libc::c_void;

use crate::vk_core::*;
use crate::vk_icd::PFN_GetPhysicalDeviceProcAddr;

/// Version of the layer interface this loader speaks.
pub const CURRENT_LOADER_LAYER_INTERFACE_VERSION: u32 = 2;
pub const MIN_SUPPORTED_LOADER_LAYER_INTERFACE_VERSION: u32 = 1;

pub type VkNegotiateLayerStructType = i32;

pub const LAYER_NEGOTIATE_UNINTIALIZED:     VkNegotiateLayerStructType = 0;
pub const LAYER_NEGOTIATE_INTERFACE_STRUCT: VkNegotiateLayerStructType = 1;

/// Filled in both directions: the loader writes the version it offers, the
/// layer writes back the version it actually implements and, at version >= 2,
/// its three entry points.
#[repr(C)]
pub struct VkNegotiateLayerInterface {
    pub sType:                          VkNegotiateLayerStructType,
    pub pNext:                          *mut c_void,
    pub loaderLayerInterfaceVersion:    u32,
    pub pfnGetInstanceProcAddr:         PFN_vkGetInstanceProcAddr,
    pub pfnGetDeviceProcAddr:           PFN_vkGetDeviceProcAddr,
    pub pfnGetPhysicalDeviceProcAddr:   PFN_GetPhysicalDeviceProcAddr,
}

pub type PFN_vkNegotiateLoaderLayerInterfaceVersion = Option<unsafe extern "system" fn(
    pVersionStruct: *mut VkNegotiateLayerInterface) -> VkResult>;

pub type VkLayerFunction = i32;

pub const VK_LAYER_LINK_INFO:                       VkLayerFunction = 0;
pub const VK_LOADER_DATA_CALLBACK:                  VkLayerFunction = 1;
pub const VK_LOADER_LAYER_CREATE_DEVICE_CALLBACK:   VkLayerFunction = 2;
pub const VK_LOADER_FEATURES:                       VkLayerFunction = 3;

pub type VkLoaderFeatureFlags = VkFlags;

pub const VK_LOADER_FEATURE_PHYSICAL_DEVICE_SORTING: VkLoaderFeatureFlags = 0x0000_0001;

#[repr(C)]
pub struct VkLayerInstanceLink {
    pub pNext:                              *mut VkLayerInstanceLink,
    pub pfnNextGetInstanceProcAddr:         PFN_vkGetInstanceProcAddr,
    pub pfnNextGetPhysicalDeviceProcAddr:   PFN_GetPhysicalDeviceProcAddr,
}

#[repr(C)]
pub struct VkLayerDeviceLink {
    pub pNext:                      *mut VkLayerDeviceLink,
    pub pfnNextGetInstanceProcAddr: PFN_vkGetInstanceProcAddr,
    pub pfnNextGetDeviceProcAddr:   PFN_vkGetDeviceProcAddr,
}

pub type PFN_vkSetInstanceLoaderData = Option<unsafe extern "system" fn(
    instance: VkInstance, object: *mut c_void) -> VkResult>;
pub type PFN_vkSetDeviceLoaderData = Option<unsafe extern "system" fn(
    device: VkDevice, object: *mut c_void) -> VkResult>;

/// Lets a layer create a device through the loader while skipping the layers
/// below itself in the chain.
pub type PFN_vkLayerCreateDevice = Option<unsafe extern "system" fn(
    instance: VkInstance, physicalDevice: VkPhysicalDevice,
    pCreateInfo: *const VkDeviceCreateInfo, pAllocator: *const VkAllocationCallbacks,
    pDevice: *mut VkDevice, layerGIPA: PFN_vkGetInstanceProcAddr,
    nextGDPA: *mut PFN_vkGetDeviceProcAddr) -> VkResult>;
pub type PFN_vkLayerDestroyDevice = Option<unsafe extern "system" fn(
    device: VkDevice, pAllocator: *const VkAllocationCallbacks,
    destroyFunction: PFN_vkDestroyDevice)>;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct VkLayerDeviceCallbacks {
    pub pfnLayerCreateDevice:  PFN_vkLayerCreateDevice,
    pub pfnLayerDestroyDevice: PFN_vkLayerDestroyDevice,
}

#[repr(C)]
pub union VkLayerInstanceCreateInfoUnion {
    pub pLayerInfo:               *mut VkLayerInstanceLink,
    pub pfnSetInstanceLoaderData: PFN_vkSetInstanceLoaderData,
    pub layerDevice:              VkLayerDeviceCallbacks,
    pub loaderFeatures:           VkLoaderFeatureFlags,
}

#[repr(C)]
pub struct VkLayerInstanceCreateInfo {
    pub sType:    VkStructureType,
    pub pNext:    *const c_void,
    pub function: VkLayerFunction,
    pub u:        VkLayerInstanceCreateInfoUnion,
}

#[repr(C)]
pub union VkLayerDeviceCreateInfoUnion {
    pub pLayerInfo:             *mut VkLayerDeviceLink,
    pub pfnSetDeviceLoaderData: PFN_vkSetDeviceLoaderData,
}

#[repr(C)]
pub struct VkLayerDeviceCreateInfo {
    pub sType:    VkStructureType,
    pub pNext:    *const c_void,
    pub function: VkLayerFunction,
    pub u:        VkLayerDeviceCreateInfoUnion,
}

/// Instance-level dispatch. Layers that wrap instance-level objects copy and
/// re-point this table, so its shape is ABI.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct VkLayerInstanceDispatchTable {
    pub GetInstanceProcAddr:                        PFN_vkGetInstanceProcAddr,
    pub GetPhysicalDeviceProcAddr:                  PFN_GetPhysicalDeviceProcAddr,
    pub DestroyInstance:                            PFN_vkDestroyInstance,
    pub EnumeratePhysicalDevices:                   PFN_vkEnumeratePhysicalDevices,
    pub EnumeratePhysicalDeviceGroups:              PFN_vkEnumeratePhysicalDeviceGroups,
    pub GetPhysicalDeviceProperties:                PFN_vkGetPhysicalDeviceProperties,
    pub GetPhysicalDeviceProperties2:               PFN_vkGetPhysicalDeviceProperties2,
    pub GetPhysicalDeviceFeatures:                  PFN_vkGetPhysicalDeviceFeatures,
    pub GetPhysicalDeviceFeatures2:                 PFN_vkGetPhysicalDeviceFeatures2,
    pub GetPhysicalDeviceQueueFamilyProperties:     PFN_vkGetPhysicalDeviceQueueFamilyProperties,
    pub GetPhysicalDeviceMemoryProperties:          PFN_vkGetPhysicalDeviceMemoryProperties,
    pub EnumerateDeviceExtensionProperties:         PFN_vkEnumerateDeviceExtensionProperties,
    pub EnumerateDeviceLayerProperties:             PFN_vkEnumerateDeviceLayerProperties,
    pub CreateDevice:                               PFN_vkCreateDevice,
    pub DestroySurfaceKHR:                          PFN_vkDestroySurfaceKHR,
    pub GetPhysicalDeviceSurfaceSupportKHR:         PFN_vkGetPhysicalDeviceSurfaceSupportKHR,
    pub GetPhysicalDeviceSurfaceCapabilitiesKHR:    PFN_vkGetPhysicalDeviceSurfaceCapabilitiesKHR,
    pub GetPhysicalDeviceSurfaceFormatsKHR:         PFN_vkGetPhysicalDeviceSurfaceFormatsKHR,
    pub GetPhysicalDeviceSurfacePresentModesKHR:    PFN_vkGetPhysicalDeviceSurfacePresentModesKHR,
    pub CreateXlibSurfaceKHR:                       PFN_vkCreateXlibSurfaceKHR,
    pub CreateXcbSurfaceKHR:                        PFN_vkCreateXcbSurfaceKHR,
    pub CreateWaylandSurfaceKHR:                    PFN_vkCreateWaylandSurfaceKHR,
    pub CreateWin32SurfaceKHR:                      PFN_vkCreateWin32SurfaceKHR,
    pub CreateMetalSurfaceEXT:                      PFN_vkCreateMetalSurfaceEXT,
    pub CreateHeadlessSurfaceEXT:                   PFN_vkCreateHeadlessSurfaceEXT,
    pub CreateDebugUtilsMessengerEXT:               PFN_vkCreateDebugUtilsMessengerEXT,
    pub DestroyDebugUtilsMessengerEXT:              PFN_vkDestroyDebugUtilsMessengerEXT,
    pub CreateDebugReportCallbackEXT:               PFN_vkCreateDebugReportCallbackEXT,
    pub DestroyDebugReportCallbackEXT:              PFN_vkDestroyDebugReportCallbackEXT,
}

/// Device-level dispatch. The magic word sits first so the loader can detect
/// a layer that wrapped a device handle and forgot to unwrap it.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct VkLayerDispatchTable {
    pub magic:                  u64,
    pub GetDeviceProcAddr:      PFN_vkGetDeviceProcAddr,
    pub DestroyDevice:          PFN_vkDestroyDevice,
    pub GetDeviceQueue:         PFN_vkGetDeviceQueue,
    pub CreateSwapchainKHR:     PFN_vkCreateSwapchainKHR,
    pub DestroySwapchainKHR:    PFN_vkDestroySwapchainKHR,
    pub GetSwapchainImagesKHR:  PFN_vkGetSwapchainImagesKHR,
}
