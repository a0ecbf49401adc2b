//! The driver-facing half of the loader ABI.
//!
//! Adapted from the canonical `vk_icd.h`. A driver exports
//! `vk_icdNegotiateLoaderICDInterfaceVersion` and
//! `vk_icdGetInstanceProcAddr`; everything else here describes the contracts
//! that negotiation selects between: the magic word the driver must plant in
//! every dispatchable object it creates, the per-platform surface records a
//! sufficiently new driver understands, and the structures for drivers handed
//! to the loader directly through the instance create-info chain.

#![allow(non_camel_case_types, non_snake_case, dead_code, non_upper_case_globals)]

use libc::{c_char, c_void};

use crate::vk_core::*;

/// Highest driver interface version this ABI describes.
pub const CURRENT_LOADER_ICD_INTERFACE_VERSION: u32 = 7;

/// Drivers that predate negotiation report this.
pub const MIN_SUPPORTED_LOADER_ICD_INTERFACE_VERSION: u32 = 0;

/// First version at which drivers accept loader-owned surface records
/// (`VkIcdSurfaceBase`-headed handles) in WSI entry points.
pub const ICD_VER_SUPPORTS_ICD_SURFACE_KHR: u32 = 3;

/// First version at which drivers export `vk_icdGetPhysicalDeviceProcAddr`.
pub const MIN_PHYS_DEV_EXTENSION_ICD_INTERFACE_VERSION: u32 = 3;

/// First version at which every `vk_icd*` export is also reachable through
/// the driver's own `vk_icdGetInstanceProcAddr`.
pub const LOADER_ICD_INTERFACE_VERSION_EXPORTS_OPTIONAL: u32 = 7;

/// Sentinel the driver stores in the dispatch slot of every dispatchable
/// object it creates; the loader overwrites the slot with a real dispatch
/// pointer before the object ever reaches the application.
pub const ICD_LOADER_MAGIC: usize = 0x01CDC0DE;

#[repr(C)]
pub union VK_LOADER_DATA {
    pub loaderMagic: usize,
    pub loaderData:  *mut c_void,
}

pub fn valid_loader_magic_value(pNewObject: *mut c_void) -> bool {
    unsafe { (*(pNewObject as *const VK_LOADER_DATA)).loaderMagic & 0xffffffff == ICD_LOADER_MAGIC }
}

pub type PFN_vkNegotiateLoaderICDInterfaceVersion = Option<unsafe extern "system" fn(
    pVersion: *mut u32) -> VkResult>;

/// `vk_icdGetPhysicalDeviceProcAddr`, exported at interface version >= 3.
pub type PFN_GetPhysicalDeviceProcAddr = Option<unsafe extern "system" fn(
    instance: VkInstance, pName: *const c_char) -> PFN_vkVoidFunction>;

pub type VkIcdWsiPlatform = i32;

pub const VK_ICD_WSI_PLATFORM_MIR:      VkIcdWsiPlatform = 0;
pub const VK_ICD_WSI_PLATFORM_WAYLAND:  VkIcdWsiPlatform = 1;
pub const VK_ICD_WSI_PLATFORM_WIN32:    VkIcdWsiPlatform = 2;
pub const VK_ICD_WSI_PLATFORM_XCB:      VkIcdWsiPlatform = 3;
pub const VK_ICD_WSI_PLATFORM_XLIB:     VkIcdWsiPlatform = 4;
pub const VK_ICD_WSI_PLATFORM_ANDROID:  VkIcdWsiPlatform = 5;
pub const VK_ICD_WSI_PLATFORM_MACOS:    VkIcdWsiPlatform = 6;
pub const VK_ICD_WSI_PLATFORM_METAL:    VkIcdWsiPlatform = 8;
pub const VK_ICD_WSI_PLATFORM_HEADLESS: VkIcdWsiPlatform = 10;

/// Every loader-allocated surface begins with this tag so a driver at
/// interface version >= 3 can identify the flavor behind the handle.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkIcdSurfaceBase {
    pub platform: VkIcdWsiPlatform,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkIcdSurfaceXlib {
    pub base:   VkIcdSurfaceBase,
    pub dpy:    *mut c_void,
    pub window: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkIcdSurfaceXcb {
    pub base:       VkIcdSurfaceBase,
    pub connection: *mut c_void,
    pub window:     u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkIcdSurfaceWayland {
    pub base:    VkIcdSurfaceBase,
    pub display: *mut c_void,
    pub surface: *mut c_void,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkIcdSurfaceWin32 {
    pub base:      VkIcdSurfaceBase,
    pub hinstance: *mut c_void,
    pub hwnd:      *mut c_void,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkIcdSurfaceMetal {
    pub base:   VkIcdSurfaceBase,
    pub pLayer: *const c_void,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkIcdSurfaceHeadless {
    pub base: VkIcdSurfaceBase,
}

// Direct driver loading: the application hands the loader driver entry
// tables through the instance create-info chain instead of manifests.

pub type VkDirectDriverLoadingModeLUNARG  = i32;
pub type VkDirectDriverLoadingFlagsLUNARG = VkFlags;

pub const VK_DIRECT_DRIVER_LOADING_MODE_EXCLUSIVE_LUNARG: VkDirectDriverLoadingModeLUNARG = 0;
pub const VK_DIRECT_DRIVER_LOADING_MODE_INCLUSIVE_LUNARG: VkDirectDriverLoadingModeLUNARG = 1;

pub type PFN_vkGetInstanceProcAddrLUNARG = Option<unsafe extern "system" fn(
    instance: VkInstance, pName: *const c_char) -> PFN_vkVoidFunction>;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkDirectDriverLoadingInfoLUNARG {
    pub sType:                  VkStructureType,
    pub pNext:                  *mut c_void,
    pub flags:                  VkDirectDriverLoadingFlagsLUNARG,
    pub pfnGetInstanceProcAddr: PFN_vkGetInstanceProcAddrLUNARG,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkDirectDriverLoadingListLUNARG {
    pub sType:       VkStructureType,
    pub pNext:       *mut c_void,
    pub mode:        VkDirectDriverLoadingModeLUNARG,
    pub driverCount: u32,
    pub pDrivers:    *const VkDirectDriverLoadingInfoLUNARG,
}
