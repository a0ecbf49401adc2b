//! Instance records and the per-instance dispatch chain.
//!
//! The application's `VkInstance` is a pointer to a [`LoaderInstance`]; its
//! first machine word points at the instance dispatch table, which is how
//! layers locate dispatch from the bare handle. Chain construction walks the
//! activated layer list bottom-up, negotiating each layer's interface and
//! threading `VkLayerInstanceLink` records through the create-info `pNext`
//! chain, ending in the terminator.

use std::collections::HashSet;
use std::ffi::CString;
use std::mem;
use std::ptr;
use std::sync::Arc;

use libc::{c_char, c_void};
use vk_sys::*;

use crate::alloc;
use crate::dl::{LibraryOps, PlatformLibrary};
use crate::env;
use crate::error::{LoaderError, Result};
use crate::filter::LayerFilters;
use crate::icd::{scan_direct_icd, scan_icds, GipaFn, IcdRegistry, ScannedIcd};
use crate::layers::{compute_activated_layers, scan_layers, ActivatedLayers};
use crate::log::LogBits;
use crate::manifest::layer::{EnabledBy, LayerProperties, LibStatus};
use crate::settings::LoaderSettings;
use crate::terminator;
use crate::util::{ApiVersion, UsedList};

/// Fixed number of unknown-entry-point slots, device and physical-device.
pub const MAX_NUM_UNKNOWN_EXTS: usize = 250;

/// Sentinel stored beside every dispatch pointer the loader owns; a mismatch
/// at the API boundary means a layer wrapped a handle and failed to unwrap.
pub const LOADER_MAGIC_NUMBER: u64 = 0x10ADED040410ADED;

/// The table every instance-level handle points at: the ABI-shaped core
/// table followed by the unknown physical-device extension slots the
/// assembly thunks index.
#[repr(C)]
pub struct InstanceDispatch {
    pub layer_inst_disp: VkLayerInstanceDispatchTable,
    pub phys_dev_ext: [PFN_vkVoidFunction; MAX_NUM_UNKNOWN_EXTS],
}

impl Default for InstanceDispatch {
    fn default() -> InstanceDispatch {
        InstanceDispatch {
            layer_inst_disp: VkLayerInstanceDispatchTable::default(),
            phys_dev_ext: [None; MAX_NUM_UNKNOWN_EXTS],
        }
    }
}

/// The device-side analogue: magic-numbered core table plus the unknown
/// device extension slots.
#[repr(C)]
pub struct DeviceDispatch {
    pub core_dispatch: VkLayerDispatchTable,
    pub ext_dispatch: [PFN_vkVoidFunction; MAX_NUM_UNKNOWN_EXTS],
}

impl Default for DeviceDispatch {
    fn default() -> DeviceDispatch {
        DeviceDispatch {
            core_dispatch: VkLayerDispatchTable::default(),
            ext_dispatch: [None; MAX_NUM_UNKNOWN_EXTS],
        }
    }
}

bitflags! {
    /// Instance extensions the loader tracks as feature bits once enabled.
    pub struct InstanceExtFlags: u32 {
        const KHR_SURFACE                  = 0x0000_0001;
        const KHR_XLIB_SURFACE             = 0x0000_0002;
        const KHR_XCB_SURFACE              = 0x0000_0004;
        const KHR_WAYLAND_SURFACE          = 0x0000_0008;
        const KHR_WIN32_SURFACE            = 0x0000_0010;
        const EXT_METAL_SURFACE            = 0x0000_0020;
        const EXT_HEADLESS_SURFACE         = 0x0000_0040;
        const EXT_DEBUG_UTILS              = 0x0000_0080;
        const EXT_DEBUG_REPORT             = 0x0000_0100;
        const KHR_GET_PHYSICAL_DEVICE_PROPERTIES_2 = 0x0000_0200;
        const KHR_DEVICE_GROUP_CREATION    = 0x0000_0400;
        const KHR_PORTABILITY_ENUMERATION  = 0x0000_0800;
    }
}

impl InstanceExtFlags {
    pub fn from_name(name: &str) -> Option<InstanceExtFlags> {
        Some(match name {
            VK_KHR_SURFACE_EXTENSION_NAME => InstanceExtFlags::KHR_SURFACE,
            VK_KHR_XLIB_SURFACE_EXTENSION_NAME => InstanceExtFlags::KHR_XLIB_SURFACE,
            VK_KHR_XCB_SURFACE_EXTENSION_NAME => InstanceExtFlags::KHR_XCB_SURFACE,
            VK_KHR_WAYLAND_SURFACE_EXTENSION_NAME => InstanceExtFlags::KHR_WAYLAND_SURFACE,
            VK_KHR_WIN32_SURFACE_EXTENSION_NAME => InstanceExtFlags::KHR_WIN32_SURFACE,
            VK_EXT_METAL_SURFACE_EXTENSION_NAME => InstanceExtFlags::EXT_METAL_SURFACE,
            VK_EXT_HEADLESS_SURFACE_EXTENSION_NAME => InstanceExtFlags::EXT_HEADLESS_SURFACE,
            VK_EXT_DEBUG_UTILS_EXTENSION_NAME => InstanceExtFlags::EXT_DEBUG_UTILS,
            VK_EXT_DEBUG_REPORT_EXTENSION_NAME => InstanceExtFlags::EXT_DEBUG_REPORT,
            VK_KHR_GET_PHYSICAL_DEVICE_PROPERTIES_2_EXTENSION_NAME => {
                InstanceExtFlags::KHR_GET_PHYSICAL_DEVICE_PROPERTIES_2
            }
            VK_KHR_DEVICE_GROUP_CREATION_EXTENSION_NAME => {
                InstanceExtFlags::KHR_DEVICE_GROUP_CREATION
            }
            VK_KHR_PORTABILITY_ENUMERATION_EXTENSION_NAME => {
                InstanceExtFlags::KHR_PORTABILITY_ENUMERATION
            }
            _ => return None,
        })
    }

    /// Extensions the loader implements itself, driver support or not.
    pub fn loader_implemented(name: &str) -> bool {
        matches!(
            name,
            VK_KHR_PORTABILITY_ENUMERATION_EXTENSION_NAME
                | VK_LUNARG_DIRECT_DRIVER_LOADING_EXTENSION_NAME
        )
    }
}

/// Driver entry points resolved against the driver's own instance; this is
/// what the terminator fans out through.
#[derive(Default)]
pub struct IcdDispatch {
    pub destroy_instance: PFN_vkDestroyInstance,
    pub enumerate_physical_devices: PFN_vkEnumeratePhysicalDevices,
    pub enumerate_physical_device_groups: PFN_vkEnumeratePhysicalDeviceGroups,
    pub get_physical_device_properties: PFN_vkGetPhysicalDeviceProperties,
    pub get_physical_device_properties2: PFN_vkGetPhysicalDeviceProperties2,
    pub get_physical_device_features: PFN_vkGetPhysicalDeviceFeatures,
    pub get_physical_device_features2: PFN_vkGetPhysicalDeviceFeatures2,
    pub get_physical_device_queue_family_properties: PFN_vkGetPhysicalDeviceQueueFamilyProperties,
    pub get_physical_device_memory_properties: PFN_vkGetPhysicalDeviceMemoryProperties,
    pub enumerate_device_extension_properties: PFN_vkEnumerateDeviceExtensionProperties,
    pub create_device: PFN_vkCreateDevice,
    pub get_device_proc_addr: PFN_vkGetDeviceProcAddr,
    pub destroy_surface: PFN_vkDestroySurfaceKHR,
    pub get_physical_device_surface_support: PFN_vkGetPhysicalDeviceSurfaceSupportKHR,
    pub get_physical_device_surface_capabilities: PFN_vkGetPhysicalDeviceSurfaceCapabilitiesKHR,
    pub get_physical_device_surface_formats: PFN_vkGetPhysicalDeviceSurfaceFormatsKHR,
    pub get_physical_device_surface_present_modes: PFN_vkGetPhysicalDeviceSurfacePresentModesKHR,
    pub create_xlib_surface: PFN_vkCreateXlibSurfaceKHR,
    pub create_xcb_surface: PFN_vkCreateXcbSurfaceKHR,
    pub create_wayland_surface: PFN_vkCreateWaylandSurfaceKHR,
    pub create_win32_surface: PFN_vkCreateWin32SurfaceKHR,
    pub create_metal_surface: PFN_vkCreateMetalSurfaceEXT,
    pub create_headless_surface: PFN_vkCreateHeadlessSurfaceEXT,
    pub create_debug_utils_messenger: PFN_vkCreateDebugUtilsMessengerEXT,
    pub destroy_debug_utils_messenger: PFN_vkDestroyDebugUtilsMessengerEXT,
    pub create_debug_report_callback: PFN_vkCreateDebugReportCallbackEXT,
    pub destroy_debug_report_callback: PFN_vkDestroyDebugReportCallbackEXT,
    pub create_swapchain: PFN_vkCreateSwapchainKHR,
    pub destroy_swapchain: PFN_vkDestroySwapchainKHR,
    pub get_swapchain_images: PFN_vkGetSwapchainImagesKHR,
}

unsafe fn resolve_icd<T>(gipa: GipaFn, instance: VkInstance, name: &str) -> T {
    let cname = CString::new(name).expect("entry point names contain no NUL");
    mem::transmute_copy(&(gipa)(instance, cname.as_ptr()))
}

impl IcdDispatch {
    /// Pulls the driver's instance-level table through its proc-addr lookup.
    pub unsafe fn resolve(gipa: GipaFn, instance: VkInstance) -> IcdDispatch {
        IcdDispatch {
            destroy_instance: resolve_icd(gipa, instance, "vkDestroyInstance"),
            enumerate_physical_devices: resolve_icd(gipa, instance, "vkEnumeratePhysicalDevices"),
            enumerate_physical_device_groups: {
                let core: PFN_vkEnumeratePhysicalDeviceGroups =
                    resolve_icd(gipa, instance, "vkEnumeratePhysicalDeviceGroups");
                if core.is_some() {
                    core
                } else {
                    resolve_icd(gipa, instance, "vkEnumeratePhysicalDeviceGroupsKHR")
                }
            },
            get_physical_device_properties: resolve_icd(gipa, instance, "vkGetPhysicalDeviceProperties"),
            get_physical_device_properties2: {
                let core: PFN_vkGetPhysicalDeviceProperties2 =
                    resolve_icd(gipa, instance, "vkGetPhysicalDeviceProperties2");
                if core.is_some() {
                    core
                } else {
                    resolve_icd(gipa, instance, "vkGetPhysicalDeviceProperties2KHR")
                }
            },
            get_physical_device_features: resolve_icd(gipa, instance, "vkGetPhysicalDeviceFeatures"),
            get_physical_device_features2: {
                let core: PFN_vkGetPhysicalDeviceFeatures2 =
                    resolve_icd(gipa, instance, "vkGetPhysicalDeviceFeatures2");
                if core.is_some() {
                    core
                } else {
                    resolve_icd(gipa, instance, "vkGetPhysicalDeviceFeatures2KHR")
                }
            },
            get_physical_device_queue_family_properties: resolve_icd(
                gipa,
                instance,
                "vkGetPhysicalDeviceQueueFamilyProperties",
            ),
            get_physical_device_memory_properties: resolve_icd(
                gipa,
                instance,
                "vkGetPhysicalDeviceMemoryProperties",
            ),
            enumerate_device_extension_properties: resolve_icd(
                gipa,
                instance,
                "vkEnumerateDeviceExtensionProperties",
            ),
            create_device: resolve_icd(gipa, instance, "vkCreateDevice"),
            get_device_proc_addr: resolve_icd(gipa, instance, "vkGetDeviceProcAddr"),
            destroy_surface: resolve_icd(gipa, instance, "vkDestroySurfaceKHR"),
            get_physical_device_surface_support: resolve_icd(
                gipa,
                instance,
                "vkGetPhysicalDeviceSurfaceSupportKHR",
            ),
            get_physical_device_surface_capabilities: resolve_icd(
                gipa,
                instance,
                "vkGetPhysicalDeviceSurfaceCapabilitiesKHR",
            ),
            get_physical_device_surface_formats: resolve_icd(
                gipa,
                instance,
                "vkGetPhysicalDeviceSurfaceFormatsKHR",
            ),
            get_physical_device_surface_present_modes: resolve_icd(
                gipa,
                instance,
                "vkGetPhysicalDeviceSurfacePresentModesKHR",
            ),
            create_xlib_surface: resolve_icd(gipa, instance, "vkCreateXlibSurfaceKHR"),
            create_xcb_surface: resolve_icd(gipa, instance, "vkCreateXcbSurfaceKHR"),
            create_wayland_surface: resolve_icd(gipa, instance, "vkCreateWaylandSurfaceKHR"),
            create_win32_surface: resolve_icd(gipa, instance, "vkCreateWin32SurfaceKHR"),
            create_metal_surface: resolve_icd(gipa, instance, "vkCreateMetalSurfaceEXT"),
            create_headless_surface: resolve_icd(gipa, instance, "vkCreateHeadlessSurfaceEXT"),
            create_debug_utils_messenger: resolve_icd(
                gipa,
                instance,
                "vkCreateDebugUtilsMessengerEXT",
            ),
            destroy_debug_utils_messenger: resolve_icd(
                gipa,
                instance,
                "vkDestroyDebugUtilsMessengerEXT",
            ),
            create_debug_report_callback: resolve_icd(
                gipa,
                instance,
                "vkCreateDebugReportCallbackEXT",
            ),
            destroy_debug_report_callback: resolve_icd(
                gipa,
                instance,
                "vkDestroyDebugReportCallbackEXT",
            ),
            create_swapchain: resolve_icd(gipa, instance, "vkCreateSwapchainKHR"),
            destroy_swapchain: resolve_icd(gipa, instance, "vkDestroySwapchainKHR"),
            get_swapchain_images: resolve_icd(gipa, instance, "vkGetSwapchainImagesKHR"),
        }
    }
}

/// Per-driver, per-instance state. The assembly thunks index
/// `phys_dev_ext` directly, so it is a fixed array rather than a `Vec`.
pub struct IcdTerm {
    pub scanned_icd: Arc<ScannedIcd>,
    /// The driver's own instance handle.
    pub instance: VkInstance,
    pub dispatch: IcdDispatch,
    pub enabled_extensions: InstanceExtFlags,
    /// Physical devices this driver exposed at the last enumeration.
    pub phys_dev_count: u32,
    /// Per-surface driver handles, indexed by loader surface index.
    pub surfaces: Vec<VkSurfaceKHR>,
    pub debug_messengers: Vec<VkDebugUtilsMessengerEXT>,
    pub debug_reports: Vec<VkDebugReportCallbackEXT>,
    /// Logical devices created against this driver.
    pub logical_devices: Vec<Box<crate::device::LoaderDevice>>,
    /// Unknown physical-device entry points, slot-parallel to the instance
    /// name table.
    pub phys_dev_ext: [PFN_vkVoidFunction; MAX_NUM_UNKNOWN_EXTS],
}

impl IcdTerm {
    pub fn new(scanned_icd: Arc<ScannedIcd>) -> IcdTerm {
        IcdTerm {
            scanned_icd,
            instance: ptr::null_mut(),
            dispatch: IcdDispatch::default(),
            enabled_extensions: InstanceExtFlags::empty(),
            phys_dev_count: 0,
            surfaces: Vec::new(),
            debug_messengers: Vec::new(),
            debug_reports: Vec::new(),
            logical_devices: Vec::new(),
            phys_dev_ext: [None; MAX_NUM_UNKNOWN_EXTS],
        }
    }

    /// Grows the per-surface array so `index` is addressable.
    pub fn ensure_surface_capacity(&mut self, index: usize) {
        if self.surfaces.len() <= index {
            self.surfaces.resize(index + 1, 0);
        }
    }

    pub fn ensure_messenger_capacity(&mut self, index: usize) {
        if self.debug_messengers.len() <= index {
            self.debug_messengers.resize(index + 1, 0);
        }
    }

    pub fn ensure_report_capacity(&mut self, index: usize) {
        if self.debug_reports.len() <= index {
            self.debug_reports.resize(index + 1, 0);
        }
    }
}

/// The physical-device record handed to the application.
#[repr(C)]
pub struct PhysDevTramp {
    pub disp: *const InstanceDispatch,
    pub magic: u64,
    pub this_instance: *mut LoaderInstance,
    /// The next-chain handle: a [`PhysDevTerm`] unless a layer wraps it.
    pub phys_dev: VkPhysicalDevice,
}

/// The physical-device record handed down to drivers.
#[repr(C)]
pub struct PhysDevTerm {
    pub disp: *const InstanceDispatch,
    pub this_icd_term: *mut IcdTerm,
    /// The driver's raw handle.
    pub phys_dev: VkPhysicalDevice,
}

/// One activated layer with its library held open and entry points resolved.
pub struct ActivatedLayer {
    pub props: LayerProperties,
    pub lib: PlatformLibrary,
    pub interface_version: u32,
    pub gipa: GipaFn,
    pub gdpa: PFN_vkGetDeviceProcAddr,
    pub gpdpa: PFN_GetPhysicalDeviceProcAddr,
}

/// The instance record. The application's `VkInstance` points here; the
/// first field must stay the dispatch pointer and the second the magic.
#[repr(C)]
pub struct LoaderInstance {
    disp_ptr: *const InstanceDispatch,
    pub magic: u64,
    /// Storage `disp_ptr` points into; boxed so the address survives moves.
    pub disp: Box<InstanceDispatch>,
    pub alloc_callbacks: Option<VkAllocationCallbacks>,
    pub icds: IcdRegistry,
    pub icd_terms: Vec<Box<IcdTerm>>,
    pub enabled_extensions: InstanceExtFlags,
    pub app_api_version: ApiVersion,
    pub portability_enumeration: bool,
    /// The expanded activated layer list, libraries held open.
    pub activated_layers: Vec<ActivatedLayer>,
    pub composite_layers: Vec<LayerProperties>,
    /// Layer names as passed by the application, preserved for drivers that
    /// inspect the create-info chain.
    pub enabled_layer_names: Vec<CString>,
    pub phys_devs_tramp: Vec<Box<PhysDevTramp>>,
    pub phys_devs_term: Vec<Box<PhysDevTerm>>,
    pub surfaces: UsedList,
    pub debug_messengers: UsedList,
    pub debug_reports: UsedList,
    pub settings: LoaderSettings,
    /// Unknown-entry-point name tables; slot i of every dispatch array
    /// corresponds to name i.
    pub dev_ext_names: Vec<String>,
    pub phys_dev_ext_names: Vec<String>,
}

impl LoaderInstance {
    /// Interprets an application handle, verifying the magic sentinel.
    ///
    /// A mismatch is logged and tolerated when the dispatch pointer still
    /// looks sane, naming the likely culprit.
    pub unsafe fn from_handle<'a>(instance: VkInstance) -> Option<&'a mut LoaderInstance> {
        if instance.is_null() {
            return None;
        }
        let inst = &mut *(instance as *mut LoaderInstance);
        if inst.magic != LOADER_MAGIC_NUMBER {
            loader_log!(
                LogBits::WARN,
                "instance handle {:p} has a corrupt magic value; a layer likely wrapped \
                 the handle and failed to unwrap it",
                instance
            );
        }
        Some(inst)
    }

    pub fn handle(&self) -> VkInstance {
        self as *const LoaderInstance as VkInstance
    }

    pub fn dispatch(&self) -> &InstanceDispatch {
        &self.disp
    }
}

/// Splits `count`/`array` of C strings into owned Rust strings.
pub unsafe fn string_array(count: u32, array: *const *const c_char) -> Vec<String> {
    if array.is_null() {
        return Vec::new();
    }
    (0..count as usize)
        .map(|i| crate::util::cstr_to_string(*array.add(i)))
        .collect()
}

/// Walks a `pNext` chain looking for a structure type.
pub unsafe fn find_in_chain(chain: *const c_void, stype: VkStructureType) -> *const c_void {
    let mut cursor = chain as *const VkBaseInStructure;
    while !cursor.is_null() {
        if (*cursor).sType == stype {
            return cursor as *const c_void;
        }
        cursor = (*cursor).pNext;
    }
    ptr::null()
}

/// Collects the direct-driver list from the create-info chain, if present.
/// Returns the registered drivers and whether the mode was exclusive.
unsafe fn direct_drivers(create_info: &VkInstanceCreateInfo) -> (Vec<Arc<ScannedIcd>>, bool) {
    let list = find_in_chain(
        create_info.pNext,
        VK_STRUCTURE_TYPE_DIRECT_DRIVER_LOADING_LIST_LUNARG,
    ) as *const VkDirectDriverLoadingListLUNARG;
    if list.is_null() {
        return (Vec::new(), false);
    }
    let list = &*list;
    let exclusive = list.mode == VK_DIRECT_DRIVER_LOADING_MODE_EXCLUSIVE_LUNARG;
    let mut icds = Vec::new();
    for i in 0..list.driverCount as usize {
        let info = &*list.pDrivers.add(i);
        match scan_direct_icd(info.pfnGetInstanceProcAddr) {
            Ok(icd) => icds.push(Arc::new(icd)),
            Err(err) => loader_log!(
                LogBits::WARN | LogBits::DRIVER,
                "direct driver {} rejected: {}",
                i,
                err
            ),
        }
    }
    (icds, exclusive)
}

/// Loads an activated layer's library and negotiates its interface.
fn load_layer(props: &LayerProperties) -> Result<ActivatedLayer> {
    let Some(library_path) = props.library_path.as_deref() else {
        return Err(LoaderError::LayerNotPresent(props.name.clone()));
    };
    let lib = PlatformLibrary::open(library_path, false)?;

    let mut interface_version = 1u32;
    let mut gipa_pfn: PFN_vkGetInstanceProcAddr = None;
    let mut gdpa: PFN_vkGetDeviceProcAddr = None;
    let mut gpdpa: PFN_GetPhysicalDeviceProcAddr = None;

    let negotiate: PFN_vkNegotiateLoaderLayerInterfaceVersion =
        unsafe { mem::transmute_copy(&lib.resolve(&props.functions.negotiate)) };
    if let Some(negotiate) = negotiate {
        let mut negotiate_struct = VkNegotiateLayerInterface {
            sType: LAYER_NEGOTIATE_INTERFACE_STRUCT,
            pNext: ptr::null_mut(),
            loaderLayerInterfaceVersion: CURRENT_LOADER_LAYER_INTERFACE_VERSION,
            pfnGetInstanceProcAddr: None,
            pfnGetDeviceProcAddr: None,
            pfnGetPhysicalDeviceProcAddr: None,
        };
        let result = unsafe { negotiate(&mut negotiate_struct) };
        if result != VK_SUCCESS {
            return Err(LoaderError::LayerNotPresent(props.name.clone()));
        }
        interface_version = negotiate_struct.loaderLayerInterfaceVersion;
        if interface_version >= 2 {
            gipa_pfn = negotiate_struct.pfnGetInstanceProcAddr;
            gdpa = negotiate_struct.pfnGetDeviceProcAddr;
            gpdpa = negotiate_struct.pfnGetPhysicalDeviceProcAddr;
        }
    }
    if gipa_pfn.is_none() {
        gipa_pfn =
            unsafe { mem::transmute_copy(&lib.resolve(&props.functions.get_instance_proc_addr)) };
        gdpa = unsafe { mem::transmute_copy(&lib.resolve(&props.functions.get_device_proc_addr)) };
    }
    let gipa: GipaFn = match gipa_pfn {
        Some(pfn) => unsafe { mem::transmute(pfn) },
        None => return Err(LoaderError::LayerNotPresent(props.name.clone())),
    };

    Ok(ActivatedLayer {
        props: props.clone(),
        lib,
        interface_version,
        gipa,
        gdpa,
        gpdpa,
    })
}

/// Loads every expanded layer, recording failures. A failed layer the
/// application asked for by name aborts creation; implicit failures only
/// warn.
fn load_activated_layers(
    activated: &ActivatedLayers,
    app_requested: &HashSet<String>,
) -> Result<Vec<ActivatedLayer>> {
    let mut loaded = Vec::with_capacity(activated.expanded.len());
    for props in &activated.expanded {
        match load_layer(props) {
            Ok(layer) => loaded.push(layer),
            Err(err) => {
                let status = match &err {
                    LoaderError::WrongBitType { .. } => LibStatus::WrongBitType,
                    LoaderError::OutOfHostMemory => LibStatus::OutOfMemory,
                    _ => LibStatus::FailedToLoad,
                };
                if app_requested.contains(&props.name) && props.enabled_by == EnabledBy::Application
                {
                    return Err(LoaderError::LayerNotPresent(props.name.clone()));
                }
                loader_log!(
                    LogBits::WARN | LogBits::LAYER,
                    "implicit layer {} failed to load ({:?}): {}",
                    props.name,
                    status,
                    err
                );
            }
        }
    }
    Ok(loaded)
}

/// Checks the requested instance extensions against what drivers, activated
/// layers and the loader itself can satisfy.
fn validate_instance_extensions(
    icds: &IcdRegistry,
    activated: &ActivatedLayers,
    requested: &[String],
) -> Result<()> {
    if env::env_var_is_set(env::VK_DISABLE_INST_EXT_FILTER_ENV_VAR) {
        return Ok(());
    }
    for name in requested {
        if InstanceExtFlags::loader_implemented(name) {
            continue;
        }
        let in_driver = icds
            .icds
            .iter()
            .any(|icd| terminator::icd_supports_extension(icd, name));
        let in_layer = activated
            .expanded
            .iter()
            .chain(activated.composite.iter())
            .any(|l| l.instance_extensions.iter().any(|e| e.name == *name));
        if !in_driver && !in_layer {
            return Err(LoaderError::ExtensionNotPresent(name.clone()));
        }
    }
    Ok(())
}

extern "system" fn set_instance_loader_data(instance: VkInstance, object: *mut c_void) -> VkResult {
    unsafe {
        let Some(inst) = crate::find_loader_instance(instance) else {
            return VK_ERROR_INITIALIZATION_FAILED;
        };
        if object.is_null() {
            return VK_ERROR_INITIALIZATION_FAILED;
        }
        *(object as *mut *const InstanceDispatch) = (*inst).disp_ptr;
        VK_SUCCESS
    }
}

/// Installs the loader dispatch pointer into a driver-created dispatchable
/// object (the slot the driver pre-filled with its own magic).
pub unsafe fn install_device_dispatch(object: *mut c_void, disp: *const DeviceDispatch) {
    *(object as *mut *const DeviceDispatch) = disp;
}

/// Creates the instance: scan, activate, chain, terminate. This is the body
/// of the exported `vkCreateInstance`.
pub unsafe fn create_instance(
    p_create_info: *const VkInstanceCreateInfo,
    p_allocator: *const VkAllocationCallbacks,
    p_instance: *mut VkInstance,
) -> Result<()> {
    let create_info = &*p_create_info;
    let allocator = p_allocator.as_ref().copied();

    let settings = LoaderSettings::load();
    let portability_enumeration =
        create_info.flags & VK_INSTANCE_CREATE_ENUMERATE_PORTABILITY_BIT_KHR != 0;

    // Driver set: direct drivers, optionally merged with discovery.
    let (direct, exclusive) = direct_drivers(create_info);
    let icds = if exclusive {
        // Exclusive mode deliberately never falls back to discovery, even if
        // every supplied driver failed to register.
        IcdRegistry { icds: direct }
    } else {
        let mut scanned = scan_icds(portability_enumeration, &settings);
        scanned.icds.extend(direct);
        scanned
    };
    if icds.icds.is_empty() {
        return Err(LoaderError::IncompatibleDriver("no drivers found".to_owned()));
    }

    let app_api_version = if create_info.pApplicationInfo.is_null() {
        ApiVersion::V1_0
    } else {
        let raw = (*create_info.pApplicationInfo).apiVersion;
        if raw == 0 {
            ApiVersion::V1_0
        } else {
            ApiVersion::from_raw(raw)
        }
    };

    let requested_layers =
        string_array(create_info.enabledLayerCount, create_info.ppEnabledLayerNames);
    let requested_extensions = string_array(
        create_info.enabledExtensionCount,
        create_info.ppEnabledExtensionNames,
    );

    let layer_list = scan_layers(&settings);
    let filters = LayerFilters::from_env();
    let activated = compute_activated_layers(
        &layer_list,
        &requested_layers,
        &filters,
        &settings,
        app_api_version,
    )?;

    validate_instance_extensions(&icds, &activated, &requested_extensions)?;

    let app_requested: HashSet<String> = requested_layers.iter().cloned().collect();
    let loaded_layers = load_activated_layers(&activated, &app_requested)?;

    let mut enabled_extensions = InstanceExtFlags::empty();
    for name in &requested_extensions {
        if let Some(flag) = InstanceExtFlags::from_name(name) {
            enabled_extensions |= flag;
        }
    }

    let instance = LoaderInstance {
        disp_ptr: ptr::null(),
        magic: LOADER_MAGIC_NUMBER,
        disp: Box::new(InstanceDispatch::default()),
        alloc_callbacks: allocator,
        icds,
        icd_terms: Vec::new(),
        enabled_extensions,
        app_api_version,
        portability_enumeration,
        activated_layers: loaded_layers,
        composite_layers: activated.composite.clone(),
        enabled_layer_names: requested_layers
            .iter()
            .filter_map(|n| CString::new(n.as_str()).ok())
            .collect(),
        phys_devs_tramp: Vec::new(),
        phys_devs_term: Vec::new(),
        surfaces: UsedList::new(),
        debug_messengers: UsedList::new(),
        debug_reports: UsedList::new(),
        settings,
        dev_ext_names: Vec::new(),
        phys_dev_ext_names: Vec::new(),
    };

    let inst_ptr = match alloc::alloc_value(
        allocator.as_ref(),
        VK_SYSTEM_ALLOCATION_SCOPE_INSTANCE,
        instance,
    ) {
        Some(p) => p,
        None => return Err(LoaderError::OutOfHostMemory),
    };
    (*inst_ptr).disp_ptr = &*(*inst_ptr).disp;

    let result = create_instance_chain(&*p_create_info, p_allocator, inst_ptr);
    match result {
        Ok(created) => {
            crate::register_instance(inst_ptr);
            *p_instance = created;
            Ok(())
        }
        Err(err) => {
            alloc::free_value(allocator.as_ref(), inst_ptr);
            Err(err)
        }
    }
}

/// Builds and invokes the layer chain for `vkCreateInstance`.
unsafe fn create_instance_chain(
    create_info: &VkInstanceCreateInfo,
    p_allocator: *const VkAllocationCallbacks,
    inst: *mut LoaderInstance,
) -> Result<VkInstance> {
    let layer_count = (*inst).activated_layers.len();

    // One link per layer; each link carries the next-lower entry points.
    let mut links: Vec<VkLayerInstanceLink> = Vec::with_capacity(layer_count);
    for _ in 0..layer_count {
        links.push(VkLayerInstanceLink {
            pNext: ptr::null_mut(),
            pfnNextGetInstanceProcAddr: None,
            pfnNextGetPhysicalDeviceProcAddr: None,
        });
    }

    let mut next_gipa: PFN_vkGetInstanceProcAddr = Some(terminator::get_instance_proc_addr);
    let mut next_gpdpa: PFN_GetPhysicalDeviceProcAddr =
        Some(terminator::get_physical_device_proc_addr);
    let mut head: *mut VkLayerInstanceLink = ptr::null_mut();
    for i in (0..layer_count).rev() {
        links[i].pNext = head;
        links[i].pfnNextGetInstanceProcAddr = next_gipa;
        links[i].pfnNextGetPhysicalDeviceProcAddr = next_gpdpa;
        head = &mut links[i];
        let layer = &(&(*inst).activated_layers)[i];
        next_gipa = Some(layer.gipa);
        if layer.gpdpa.is_some() {
            next_gpdpa = layer.gpdpa;
        }
        loader_log!(
            LogBits::INFO | LogBits::LAYER,
            "inserting instance layer {} ({})",
            layer.props.name,
            layer.props.library_path.as_deref().map(|p| p.display().to_string()).unwrap_or_default()
        );
    }

    // Private chain structs the layers pick up on the way down.
    let mut link_info = VkLayerInstanceCreateInfo {
        sType: VK_STRUCTURE_TYPE_LOADER_INSTANCE_CREATE_INFO,
        pNext: create_info.pNext,
        function: VK_LAYER_LINK_INFO,
        u: VkLayerInstanceCreateInfoUnion { pLayerInfo: head },
    };
    let mut loader_data_info = VkLayerInstanceCreateInfo {
        sType: VK_STRUCTURE_TYPE_LOADER_INSTANCE_CREATE_INFO,
        pNext: &mut link_info as *mut _ as *const c_void,
        function: VK_LOADER_DATA_CALLBACK,
        u: VkLayerInstanceCreateInfoUnion {
            pfnSetInstanceLoaderData: Some(set_instance_loader_data),
        },
    };
    let mut create_device_info = VkLayerInstanceCreateInfo {
        sType: VK_STRUCTURE_TYPE_LOADER_INSTANCE_CREATE_INFO,
        pNext: &mut loader_data_info as *mut _ as *const c_void,
        function: VK_LOADER_LAYER_CREATE_DEVICE_CALLBACK,
        u: VkLayerInstanceCreateInfoUnion {
            layerDevice: VkLayerDeviceCallbacks {
                pfnLayerCreateDevice: Some(crate::device::layer_create_device),
                pfnLayerDestroyDevice: Some(crate::device::layer_destroy_device),
            },
        },
    };
    let features_info = VkLayerInstanceCreateInfo {
        sType: VK_STRUCTURE_TYPE_LOADER_INSTANCE_CREATE_INFO,
        pNext: &mut create_device_info as *mut _ as *const c_void,
        function: VK_LOADER_FEATURES,
        u: VkLayerInstanceCreateInfoUnion {
            loaderFeatures: VK_LOADER_FEATURE_PHYSICAL_DEVICE_SORTING,
        },
    };

    let mut chain_create_info = *create_info;
    chain_create_info.pNext = &features_info as *const _ as *const c_void;

    let top_gipa = next_gipa.expect("chain head always has a lookup");
    let create_name = CString::new("vkCreateInstance").unwrap();
    let top_create: PFN_vkCreateInstance =
        mem::transmute_copy(&top_gipa(ptr::null_mut(), create_name.as_ptr()));
    let Some(top_create) = top_create else {
        return Err(LoaderError::InitializationFailed(
            "chain head does not expose vkCreateInstance".to_owned(),
        ));
    };

    let mut created_instance: VkInstance = inst as VkInstance;
    let result = top_create(&chain_create_info, p_allocator, &mut created_instance);
    if result != VK_SUCCESS {
        return Err(LoaderError::Api(result));
    }

    // Fill the instance dispatch by querying the top of the chain, so later
    // calls enter the chain even if a layer re-hooks entry points.
    terminator::populate_instance_dispatch(&mut *inst, top_gipa, created_instance);
    Ok(created_instance)
}

/// The body of the exported `vkDestroyInstance`.
pub unsafe fn destroy_instance(instance: VkInstance, p_allocator: *const VkAllocationCallbacks) {
    let Some(inst) = LoaderInstance::from_handle(instance) else {
        return;
    };
    let allocator = p_allocator
        .as_ref()
        .copied()
        .or(inst.alloc_callbacks);

    let destroy = inst.dispatch().layer_inst_disp.DestroyInstance;
    if let Some(destroy) = destroy {
        destroy(instance, p_allocator);
    }

    crate::unregister_instance(instance as *mut LoaderInstance);
    alloc::free_value(allocator.as_ref(), instance as *mut LoaderInstance);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_pointer_is_first_word() {
        assert_eq!(mem::offset_of!(LoaderInstance, disp_ptr), 0);
        assert_eq!(mem::offset_of!(PhysDevTramp, disp), 0);
        assert_eq!(mem::offset_of!(PhysDevTerm, disp), 0);
        // The device table's magic must be its first field for boundary
        // corruption checks through the handle.
        assert_eq!(mem::offset_of!(DeviceDispatch, core_dispatch), 0);
    }

    #[test]
    fn instance_ext_flags_round_trip() {
        assert_eq!(
            InstanceExtFlags::from_name("VK_KHR_surface"),
            Some(InstanceExtFlags::KHR_SURFACE)
        );
        assert_eq!(InstanceExtFlags::from_name("VK_NV_bogus"), None);
        assert!(InstanceExtFlags::loader_implemented(
            VK_KHR_PORTABILITY_ENUMERATION_EXTENSION_NAME
        ));
    }
}
