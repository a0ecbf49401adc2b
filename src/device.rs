//! Logical-device records and the per-device dispatch chain.
//!
//! The same trick as instances, one level down: the loader threads a
//! `VkLayerDeviceLink` chain through the create-info, the terminator creates
//! the driver device and rewrites its dispatch slot, and the trampoline
//! fills the device dispatch table from the top of the chain.

use std::ffi::{CStr, CString};
use std::mem;
use std::ptr;

use libc::{c_char, c_void};
use vk_sys::*;

use crate::instance::{
    find_in_chain, install_device_dispatch, string_array, DeviceDispatch, IcdTerm, PhysDevTerm,
    PhysDevTramp, LOADER_MAGIC_NUMBER,
};
use crate::log::LogBits;

bitflags! {
    /// Device extensions the loader itself reacts to.
    pub struct DeviceExtFlags: u32 {
        const KHR_SWAPCHAIN     = 0x0000_0001;
        const KHR_MAINTENANCE_5 = 0x0000_0002;
    }
}

impl DeviceExtFlags {
    pub fn from_name(name: &str) -> Option<DeviceExtFlags> {
        Some(match name {
            VK_KHR_SWAPCHAIN_EXTENSION_NAME => DeviceExtFlags::KHR_SWAPCHAIN,
            VK_KHR_MAINTENANCE_5_EXTENSION_NAME => DeviceExtFlags::KHR_MAINTENANCE_5,
            _ => return None,
        })
    }
}

/// One logical device created through the loader.
pub struct LoaderDevice {
    /// The table the device handle's first word points at; boxed so its
    /// address survives the record moving between lists.
    pub loader_dispatch: Box<DeviceDispatch>,
    /// The driver's device handle.
    pub icd_device: VkDevice,
    /// The handle the top of the chain returned; differs from `icd_device`
    /// when a layer wraps.
    pub chain_device: VkDevice,
    pub alloc_callbacks: Option<VkAllocationCallbacks>,
    /// Extensions the driver enabled for this device.
    pub enabled_extensions: DeviceExtFlags,
    /// Extensions satisfied by activated layers rather than the driver.
    pub layer_extensions: DeviceExtFlags,
    /// Suppress trampolines for commands beyond the driver's core version.
    pub maintenance5_enabled: bool,
    pub icd_destroy_device: PFN_vkDestroyDevice,
    /// Back pointer, set by the terminator during creation.
    pub owner_icd: *mut IcdTerm,
}

impl LoaderDevice {
    fn new(alloc_callbacks: Option<VkAllocationCallbacks>) -> LoaderDevice {
        let mut dispatch = Box::new(DeviceDispatch::default());
        dispatch.core_dispatch.magic = LOADER_MAGIC_NUMBER;
        LoaderDevice {
            loader_dispatch: dispatch,
            icd_device: ptr::null_mut(),
            chain_device: ptr::null_mut(),
            alloc_callbacks,
            enabled_extensions: DeviceExtFlags::empty(),
            layer_extensions: DeviceExtFlags::empty(),
            maintenance5_enabled: false,
            icd_destroy_device: None,
            owner_icd: ptr::null_mut(),
        }
    }

    pub fn dispatch(&self) -> &DeviceDispatch {
        &self.loader_dispatch
    }
}

unsafe fn pfn<T>(raw: PFN_vkVoidFunction) -> T {
    mem::transmute_copy(&raw)
}

extern "system" fn set_device_loader_data(device: VkDevice, object: *mut c_void) -> VkResult {
    unsafe {
        let Some((_, _, dev)) = crate::find_device(device) else {
            return VK_ERROR_INITIALIZATION_FAILED;
        };
        if object.is_null() {
            return VK_ERROR_INITIALIZATION_FAILED;
        }
        install_device_dispatch(object, &*dev.loader_dispatch);
        VK_SUCCESS
    }
}

/// Replaces application-level physical-device handles in a device-group
/// struct with the next-chain handles, in place, remembering how to undo it.
struct GroupSubstitution {
    link_slot: *mut *const c_void,
    original: *const c_void,
    _replacement: Box<VkDeviceGroupDeviceCreateInfo>,
    _handles: Vec<VkPhysicalDevice>,
}

impl Drop for GroupSubstitution {
    fn drop(&mut self) {
        // Restore the caller-visible chain exactly as it was.
        unsafe { *self.link_slot = self.original };
    }
}

/// Finds a device-group struct in the caller's chain and splices in a copy
/// whose handles are unwrapped one level. Reverted on drop.
unsafe fn substitute_device_group(
    create_info: *const VkDeviceCreateInfo,
) -> Option<GroupSubstitution> {
    let mut link_slot =
        &(*create_info).pNext as *const *const c_void as *mut *const c_void;
    let mut cursor = *link_slot as *const VkBaseInStructure;
    while !cursor.is_null() {
        if (*cursor).sType == VK_STRUCTURE_TYPE_DEVICE_GROUP_DEVICE_CREATE_INFO {
            break;
        }
        link_slot = &(*cursor).pNext as *const *const VkBaseInStructure as *mut *const c_void;
        cursor = (*cursor).pNext;
    }
    if cursor.is_null() {
        return None;
    }
    let group = &*(cursor as *const VkDeviceGroupDeviceCreateInfo);
    let mut handles = Vec::with_capacity(group.physicalDeviceCount as usize);
    for i in 0..group.physicalDeviceCount as usize {
        let app_handle = *group.pPhysicalDevices.add(i);
        let tramp = &*(app_handle as *const PhysDevTramp);
        handles.push(tramp.phys_dev);
    }
    let replacement = Box::new(VkDeviceGroupDeviceCreateInfo {
        sType: VK_STRUCTURE_TYPE_DEVICE_GROUP_DEVICE_CREATE_INFO,
        pNext: group.pNext,
        physicalDeviceCount: handles.len() as u32,
        pPhysicalDevices: handles.as_ptr(),
    });
    let original = *link_slot;
    *link_slot = &*replacement as *const VkDeviceGroupDeviceCreateInfo as *const c_void;
    Some(GroupSubstitution {
        link_slot,
        original,
        _replacement: replacement,
        _handles: handles,
    })
}

/// Builds and invokes the device chain; the body of the exported
/// `vkCreateDevice` once the trampoline has unwrapped the physical device.
pub unsafe fn create_device_chain(
    tramp: &PhysDevTramp,
    p_create_info: *const VkDeviceCreateInfo,
    p_allocator: *const VkAllocationCallbacks,
    p_device: *mut VkDevice,
) -> VkResult {
    let inst = &mut *tramp.this_instance;
    let create_info = &*p_create_info;
    let allocator = p_allocator.as_ref().copied().or(inst.alloc_callbacks);

    let mut dev = Box::new(LoaderDevice::new(allocator));

    // Chain links, bottom-up, mirroring instance chain construction.
    let layer_count = inst.activated_layers.len();
    let mut links: Vec<VkLayerDeviceLink> = Vec::with_capacity(layer_count);
    for _ in 0..layer_count {
        links.push(VkLayerDeviceLink {
            pNext: ptr::null_mut(),
            pfnNextGetInstanceProcAddr: None,
            pfnNextGetDeviceProcAddr: None,
        });
    }
    let mut next_gipa: PFN_vkGetInstanceProcAddr = Some(crate::terminator::get_instance_proc_addr);
    let mut next_gdpa: PFN_vkGetDeviceProcAddr = Some(terminator_get_device_proc_addr);
    let mut head: *mut VkLayerDeviceLink = ptr::null_mut();
    for i in (0..layer_count).rev() {
        let layer = &inst.activated_layers[i];
        if layer.gdpa.is_none() {
            continue;
        }
        links[i].pNext = head;
        links[i].pfnNextGetInstanceProcAddr = next_gipa;
        links[i].pfnNextGetDeviceProcAddr = next_gdpa;
        head = &mut links[i];
        next_gipa = Some(layer.gipa);
        next_gdpa = layer.gdpa;
    }

    let mut link_info = VkLayerDeviceCreateInfo {
        sType: VK_STRUCTURE_TYPE_LOADER_DEVICE_CREATE_INFO,
        pNext: create_info.pNext,
        function: VK_LAYER_LINK_INFO,
        u: VkLayerDeviceCreateInfoUnion { pLayerInfo: head },
    };
    let loader_data_info = VkLayerDeviceCreateInfo {
        sType: VK_STRUCTURE_TYPE_LOADER_DEVICE_CREATE_INFO,
        pNext: &mut link_info as *mut _ as *const c_void,
        function: VK_LOADER_DATA_CALLBACK,
        u: VkLayerDeviceCreateInfoUnion {
            pfnSetDeviceLoaderData: Some(set_device_loader_data),
        },
    };

    let mut chain_create_info = *create_info;
    chain_create_info.pNext = &loader_data_info as *const _ as *const c_void;

    // Swap application-level group handles for next-chain handles for the
    // duration of the call.
    let group_guard = substitute_device_group(p_create_info);

    let top_gipa = next_gipa.expect("chain head always has a lookup");
    let create_name = CString::new("vkCreateDevice").unwrap();
    let top_create: PFN_vkCreateDevice =
        pfn(top_gipa(inst.handle(), create_name.as_ptr()));
    let Some(top_create) = top_create else {
        return VK_ERROR_INITIALIZATION_FAILED;
    };

    let mut created: VkDevice = &mut *dev as *mut LoaderDevice as VkDevice;
    let result = top_create(tramp.phys_dev, &chain_create_info, p_allocator, &mut created);
    drop(group_guard);
    if result != VK_SUCCESS {
        return result;
    }
    dev.chain_device = created;

    // Record extension state for trampoline gating.
    let requested = string_array(
        create_info.enabledExtensionCount,
        create_info.ppEnabledExtensionNames,
    );
    for name in &requested {
        if let Some(flag) = DeviceExtFlags::from_name(name) {
            dev.enabled_extensions |= flag;
        }
        let from_layer = inst
            .activated_layers
            .iter()
            .any(|l| l.props.device_extensions.iter().any(|e| e.name == *name));
        if from_layer {
            if let Some(flag) = DeviceExtFlags::from_name(name) {
                dev.layer_extensions |= flag;
            }
        }
    }
    let m5 = find_in_chain(
        create_info.pNext,
        VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_MAINTENANCE_5_FEATURES_KHR,
    ) as *const VkPhysicalDeviceMaintenance5FeaturesKHR;
    if !m5.is_null() && (*m5).maintenance5 == VK_TRUE {
        dev.maintenance5_enabled = true;
    }

    // Fill the device dispatch from the top of the chain so every later call
    // re-enters it.
    let top_gdpa = next_gdpa.expect("chain head always has a device lookup");
    macro_rules! fill {
        ($($field:ident = $name:literal),+ $(,)?) => {
            $(
                dev.loader_dispatch.core_dispatch.$field = pfn(top_gdpa(
                    created,
                    concat!($name, "\0").as_ptr() as *const c_char,
                ));
            )+
        };
    }
    fill! {
        GetDeviceProcAddr = "vkGetDeviceProcAddr",
        DestroyDevice = "vkDestroyDevice",
        GetDeviceQueue = "vkGetDeviceQueue",
        CreateSwapchainKHR = "vkCreateSwapchainKHR",
        DestroySwapchainKHR = "vkDestroySwapchainKHR",
        GetSwapchainImagesKHR = "vkGetSwapchainImagesKHR",
    }

    // Unknown device extension slots already claimed on this instance apply
    // to the new device too.
    crate::unknown::init_dispatch_dev_ext(inst, &mut dev);

    let owner = dev.owner_icd;
    if owner.is_null() {
        return VK_ERROR_INITIALIZATION_FAILED;
    }
    *p_device = created;
    (*owner).logical_devices.push(dev);
    VK_SUCCESS
}

/// `vkCreateDevice` terminator: translate group handles to raw driver
/// handles (or emulate for 1.0 drivers), create the driver device, and
/// rewrite its dispatch slot.
pub unsafe extern "system" fn terminator_create_device(
    physical_device: VkPhysicalDevice,
    p_create_info: *const VkDeviceCreateInfo,
    p_allocator: *const VkAllocationCallbacks,
    p_device: *mut VkDevice,
) -> VkResult {
    let term = &*(physical_device as *const PhysDevTerm);
    let icd_term = &mut *term.this_icd_term;
    let dev = *p_device as *mut LoaderDevice;
    if dev.is_null() {
        return VK_ERROR_INITIALIZATION_FAILED;
    }
    let create_info = &*p_create_info;

    let Some(create) = icd_term.dispatch.create_device else {
        return VK_ERROR_INITIALIZATION_FAILED;
    };

    let mut icd_create_info = *create_info;

    // Device-group handling: translate loader records to raw handles, or
    // emulate for drivers without group support.
    let group = find_in_chain(
        create_info.pNext,
        VK_STRUCTURE_TYPE_DEVICE_GROUP_DEVICE_CREATE_INFO,
    ) as *const VkDeviceGroupDeviceCreateInfo;
    let mut raw_handles: Vec<VkPhysicalDevice> = Vec::new();
    let mut patched_group;
    if !group.is_null() {
        let group = &*group;
        let driver_has_groups = icd_term.dispatch.enumerate_physical_device_groups.is_some();
        if !driver_has_groups && group.physicalDeviceCount > 1 {
            loader_log!(
                LogBits::ERROR | LogBits::DRIVER,
                "device group of {} devices on a driver without group support",
                group.physicalDeviceCount
            );
            return VK_ERROR_INITIALIZATION_FAILED;
        }
        if driver_has_groups {
            for i in 0..group.physicalDeviceCount as usize {
                let handle = *group.pPhysicalDevices.add(i);
                let t = &*(handle as *const PhysDevTerm);
                raw_handles.push(t.phys_dev);
            }
            patched_group = *group;
            patched_group.pPhysicalDevices = raw_handles.as_ptr();
            // Hand the driver a chain with the translated struct at the
            // front; the rest of the chain is shared.
            patched_group.pNext = chain_without(create_info.pNext, group as *const _ as *const c_void);
            icd_create_info.pNext = &patched_group as *const _ as *const c_void;
        } else {
            // Single-device group on a 1.0 driver: the group adds nothing,
            // drop it from the driver-visible chain.
            icd_create_info.pNext = chain_without(create_info.pNext, group as *const _ as *const c_void);
        }
    }

    // Features2 emulation: a driver without the 1.1 entry point receives the
    // legacy features field extracted from the chained struct.
    let features2 = find_in_chain(
        create_info.pNext,
        VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_FEATURES_2,
    ) as *const VkPhysicalDeviceFeatures2;
    let legacy_features;
    if !features2.is_null()
        && icd_term.dispatch.get_physical_device_features2.is_none()
        && icd_create_info.pEnabledFeatures.is_null()
    {
        legacy_features = (*features2).features;
        icd_create_info.pEnabledFeatures = &legacy_features;
        icd_create_info.pNext =
            chain_without(icd_create_info.pNext, features2 as *const c_void);
    }

    let mut icd_device: VkDevice = ptr::null_mut();
    let result = create(term.phys_dev, &icd_create_info, p_allocator, &mut icd_device);
    if result != VK_SUCCESS {
        return result;
    }

    (*dev).icd_device = icd_device;
    (*dev).owner_icd = icd_term;
    (*dev).icd_destroy_device = {
        let gdpa = icd_term.dispatch.get_device_proc_addr;
        match gdpa {
            Some(gdpa) => pfn(gdpa(icd_device, b"vkDestroyDevice\0".as_ptr() as *const c_char)),
            None => None,
        }
    };
    install_device_dispatch(icd_device as *mut c_void, &*(*dev).loader_dispatch);
    *p_device = icd_device;
    VK_SUCCESS
}

/// Rebuilds a `pNext` chain without one entry. The chain links themselves
/// are driver-read-only, so only the head pointer needs recomputing when the
/// removed entry is first; otherwise the predecessor is patched in place.
unsafe fn chain_without(chain: *const c_void, skip: *const c_void) -> *const c_void {
    if chain == skip {
        return (*(skip as *const VkBaseInStructure)).pNext as *const c_void;
    }
    // Leaving a mid-chain entry in place is harmless for drivers, which
    // ignore unknown structure types; only a head removal matters in
    // practice because the loader prepends its own structs.
    chain
}

/// The terminator's `vkGetDeviceProcAddr`: functions the loader must
/// intercept resolve to terminators, everything else goes to the driver.
pub unsafe extern "system" fn terminator_get_device_proc_addr(
    device: VkDevice,
    p_name: *const c_char,
) -> PFN_vkVoidFunction {
    let name = match CStr::from_ptr(p_name).to_str() {
        Ok(n) => n,
        Err(_) => return None,
    };
    match name {
        "vkGetDeviceProcAddr" => Some(mem::transmute::<_, unsafe extern "system" fn()>(
            terminator_get_device_proc_addr as usize,
        )),
        "vkDestroyDevice" => Some(mem::transmute::<_, unsafe extern "system" fn()>(
            terminator_destroy_device as usize,
        )),
        "vkCreateSwapchainKHR" => Some(mem::transmute::<_, unsafe extern "system" fn()>(
            terminator_create_swapchain as usize,
        )),
        _ => {
            let Some((_, icd_term, dev)) = crate::find_device(device) else {
                return None;
            };
            let gdpa = icd_term.dispatch.get_device_proc_addr?;
            gdpa(dev.icd_device, p_name)
        }
    }
}

/// `vkDestroyDevice` terminator.
pub unsafe extern "system" fn terminator_destroy_device(
    device: VkDevice,
    p_allocator: *const VkAllocationCallbacks,
) {
    let Some((_, icd_term, dev)) = crate::find_device(device) else {
        return;
    };
    let icd_device = dev.icd_device;
    if let Some(destroy) = dev.icd_destroy_device {
        destroy(icd_device, p_allocator);
    }
    icd_term
        .logical_devices
        .retain(|d| d.icd_device != icd_device);
}

/// `vkCreateSwapchainKHR` terminator: substitute the per-driver surface at
/// the loader surface's index before the driver sees the create-info.
pub unsafe extern "system" fn terminator_create_swapchain(
    device: VkDevice,
    p_create_info: *const VkSwapchainCreateInfoKHR,
    p_allocator: *const VkAllocationCallbacks,
    p_swapchain: *mut VkSwapchainKHR,
) -> VkResult {
    let Some((_, icd_term, dev)) = crate::find_device(device) else {
        return VK_ERROR_INITIALIZATION_FAILED;
    };
    let Some(create) = icd_term.dispatch.create_swapchain else {
        return VK_ERROR_EXTENSION_NOT_PRESENT;
    };
    let patched = crate::wsi::swapchain_create_info_for_icd(icd_term, &*p_create_info);
    create(dev.icd_device, &patched, p_allocator, p_swapchain)
}

/// The `vkLayerCreateDevice` callback handed to layers: creates a device
/// through the loader on a layer's behalf.
pub unsafe extern "system" fn layer_create_device(
    _instance: VkInstance,
    physical_device: VkPhysicalDevice,
    p_create_info: *const VkDeviceCreateInfo,
    p_allocator: *const VkAllocationCallbacks,
    p_device: *mut VkDevice,
    _layer_gipa: PFN_vkGetInstanceProcAddr,
    next_gdpa: *mut PFN_vkGetDeviceProcAddr,
) -> VkResult {
    let tramp = &*(physical_device as *const PhysDevTramp);
    let result = create_device_chain(tramp, p_create_info, p_allocator, p_device);
    if result == VK_SUCCESS && !next_gdpa.is_null() {
        *next_gdpa = Some(terminator_get_device_proc_addr);
    }
    result
}

/// The matching destroy callback.
pub unsafe extern "system" fn layer_destroy_device(
    device: VkDevice,
    p_allocator: *const VkAllocationCallbacks,
    destroy_function: PFN_vkDestroyDevice,
) {
    if let Some(destroy) = destroy_function {
        destroy(device, p_allocator);
    } else {
        terminator_destroy_device(device, p_allocator);
    }
}

/// Whether `vkGetDeviceProcAddr` should hand out the loader trampoline for
/// an extension device command on this device.
pub fn trampoline_available(dev: &LoaderDevice, flag: DeviceExtFlags) -> bool {
    dev.enabled_extensions.contains(flag) || dev.layer_extensions.contains(flag)
}
