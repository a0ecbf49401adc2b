//! Physical-device aggregation.
//!
//! Enumeration merges every driver's devices while preserving the identity
//! of records already handed out: a device reported twice keeps the same
//! trampoline pointer (bitwise) across calls. Records for unplugged devices
//! are freed once they stop appearing.

use std::mem;
use std::ptr;

use vk_sys::*;

use crate::env;
use crate::instance::{IcdTerm, LoaderInstance, PhysDevTerm, PhysDevTramp, LOADER_MAGIC_NUMBER};
use crate::log::LogBits;
use crate::util::write_enumerated;

/// Raw handles one driver currently exposes.
unsafe fn icd_phys_devs(term: &IcdTerm) -> Vec<VkPhysicalDevice> {
    let Some(enumerate) = term.dispatch.enumerate_physical_devices else {
        return Vec::new();
    };
    let mut count = 0u32;
    if enumerate(term.instance, &mut count, ptr::null_mut()) != VK_SUCCESS || count == 0 {
        return Vec::new();
    }
    let mut handles = vec![ptr::null_mut(); count as usize];
    if enumerate(term.instance, &mut count, handles.as_mut_ptr()) < VK_SUCCESS {
        return Vec::new();
    }
    handles.truncate(count as usize);
    handles
}

/// Rebuilds the terminator-side record list, reusing records whose raw
/// handle is still present and freeing the ones that are gone.
unsafe fn setup_term_phys_devs(inst: &mut LoaderInstance) -> Vec<*mut PhysDevTerm> {
    let mut groups: Vec<(*mut IcdTerm, Vec<VkPhysicalDevice>)> = Vec::new();
    for term in inst.icd_terms.iter_mut() {
        let icd_ptr: *mut IcdTerm = &mut **term;
        let handles = icd_phys_devs(term);
        term.phys_dev_count = handles.len() as u32;
        groups.push((icd_ptr, handles));
    }

    // Drivers with nothing to offer are shut down after their first
    // enumeration; 32-bit builds need the address space back.
    let empty: Vec<*mut IcdTerm> = groups
        .iter()
        .filter(|(_, handles)| handles.is_empty())
        .map(|(icd, _)| *icd)
        .collect();
    if !empty.is_empty() {
        inst.icd_terms.retain_mut(|term| {
            let icd_ptr: *mut IcdTerm = &mut **term;
            if empty.contains(&icd_ptr) {
                loader_log!(
                    LogBits::INFO | LogBits::DRIVER,
                    "driver {} reported zero physical devices, unloading it",
                    term.scanned_icd.lib_path.display()
                );
                if let Some(destroy) = term.dispatch.destroy_instance {
                    destroy(term.instance, ptr::null());
                }
                false
            } else {
                true
            }
        });
    }

    let disp = &*inst.disp as *const _;
    let mut new_terms: Vec<Box<PhysDevTerm>> = Vec::new();
    let mut out = Vec::new();
    for (icd_ptr, handles) in groups {
        for raw in handles {
            let existing = inst
                .phys_devs_term
                .iter()
                .position(|t| t.phys_dev == raw && t.this_icd_term == icd_ptr);
            let boxed = match existing {
                Some(idx) => inst.phys_devs_term.swap_remove(idx),
                None => Box::new(PhysDevTerm {
                    disp,
                    this_icd_term: icd_ptr,
                    phys_dev: raw,
                }),
            };
            out.push(&*boxed as *const PhysDevTerm as *mut PhysDevTerm);
            new_terms.push(boxed);
        }
    }
    // Whatever is left in the old list corresponds to unplugged devices.
    inst.phys_devs_term = new_terms;
    out
}

/// `vkEnumeratePhysicalDevices` terminator: fan out, merge, preserve
/// identity, honor the count contract.
pub unsafe extern "system" fn terminator_enumerate_physical_devices(
    instance: VkInstance,
    p_count: *mut u32,
    p_devices: *mut VkPhysicalDevice,
) -> VkResult {
    let Some(inst) = LoaderInstance::from_handle(instance) else {
        return VK_ERROR_INITIALIZATION_FAILED;
    };
    let terms = setup_term_phys_devs(inst);
    let handles: Vec<VkPhysicalDevice> = terms.iter().map(|t| *t as VkPhysicalDevice).collect();
    write_enumerated(&handles, p_count, p_devices)
}

/// Group enumeration with 1.0 emulation: drivers without the entry point
/// contribute one single-device group per physical device.
pub unsafe extern "system" fn terminator_enumerate_physical_device_groups(
    instance: VkInstance,
    p_count: *mut u32,
    p_groups: *mut VkPhysicalDeviceGroupProperties,
) -> VkResult {
    let Some(inst) = LoaderInstance::from_handle(instance) else {
        return VK_ERROR_INITIALIZATION_FAILED;
    };
    // Refresh the terminator records so group entries can be substituted.
    let _ = setup_term_phys_devs(inst);

    let mut groups: Vec<VkPhysicalDeviceGroupProperties> = Vec::new();
    let icd_count = inst.icd_terms.len();
    for idx in 0..icd_count {
        let (icd_ptr, enumerate_groups, icd_instance) = {
            let term = &mut *inst.icd_terms[idx];
            (
                term as *mut IcdTerm,
                term.dispatch.enumerate_physical_device_groups,
                term.instance,
            )
        };
        let mut icd_groups: Vec<VkPhysicalDeviceGroupProperties> = Vec::new();
        match enumerate_groups {
            Some(enumerate) => {
                let mut count = 0u32;
                if enumerate(icd_instance, &mut count, ptr::null_mut()) != VK_SUCCESS {
                    continue;
                }
                icd_groups = vec![mem::zeroed(); count as usize];
                for group in icd_groups.iter_mut() {
                    group.sType = VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_GROUP_PROPERTIES;
                }
                if enumerate(icd_instance, &mut count, icd_groups.as_mut_ptr()) < VK_SUCCESS {
                    continue;
                }
                icd_groups.truncate(count as usize);
            }
            None => {
                for raw in icd_phys_devs(&*icd_ptr) {
                    let mut group: VkPhysicalDeviceGroupProperties = mem::zeroed();
                    group.sType = VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_GROUP_PROPERTIES;
                    group.physicalDeviceCount = 1;
                    group.physicalDevices[0] = raw;
                    group.subsetAllocation = VK_FALSE;
                    icd_groups.push(group);
                }
            }
        }
        // Substitute the loader's terminator records for the raw handles so
        // everything above this level speaks loader records.
        for group in icd_groups.iter_mut() {
            for dev in 0..group.physicalDeviceCount as usize {
                let raw = group.physicalDevices[dev];
                if let Some(term) = inst
                    .phys_devs_term
                    .iter()
                    .find(|t| t.phys_dev == raw && t.this_icd_term == icd_ptr)
                {
                    group.physicalDevices[dev] =
                        &**term as *const PhysDevTerm as VkPhysicalDevice;
                }
            }
        }
        groups.extend(icd_groups);
    }
    write_enumerated(&groups, p_count, p_groups)
}

/// Queries one chain-level physical device for its UUID, for settings-based
/// selection. Uses the chain's properties2 path.
unsafe fn query_device_uuid(inst: &LoaderInstance, chain_handle: VkPhysicalDevice) -> Option<[u8; 16]> {
    let gpdp2 = inst.dispatch().layer_inst_disp.GetPhysicalDeviceProperties2?;
    let mut id_props: VkPhysicalDeviceIDProperties = mem::zeroed();
    id_props.sType = VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_ID_PROPERTIES;
    let mut props2: VkPhysicalDeviceProperties2 = mem::zeroed();
    props2.sType = VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_PROPERTIES_2;
    props2.pNext = &mut id_props as *mut _ as *mut libc::c_void;
    gpdp2(chain_handle, &mut props2);
    Some(id_props.deviceUUID)
}

/// Applies the settings device configurations: configured devices move to
/// the front in ordinal order; everything else keeps its relative position.
unsafe fn apply_device_configurations(
    inst: &LoaderInstance,
    tramps: &mut Vec<*mut PhysDevTramp>,
) {
    if inst.settings.device_configurations.is_empty()
        || env::env_var_is_set(env::VK_DISABLE_SELECT_ENV_VAR)
    {
        return;
    }
    let mut ranked: Vec<(usize, *mut PhysDevTramp)> = Vec::new();
    let mut rest: Vec<*mut PhysDevTramp> = Vec::new();
    for &tramp in tramps.iter() {
        let uuid = query_device_uuid(inst, (*tramp).phys_dev);
        let rank = uuid.and_then(|uuid| {
            inst.settings
                .device_configurations
                .iter()
                .position(|c| c.device_uuid == uuid)
        });
        match rank {
            Some(r) => ranked.push((r, tramp)),
            None => rest.push(tramp),
        }
    }
    ranked.sort_by_key(|(r, _)| *r);
    tramps.clear();
    tramps.extend(ranked.into_iter().map(|(_, t)| t));
    tramps.extend(rest);
}

/// The trampoline half of enumeration: call down the chain, then wrap the
/// returned handles in application-facing records, reusing existing records
/// for handles seen before.
pub unsafe fn trampoline_enumerate_physical_devices(
    inst: &mut LoaderInstance,
    p_count: *mut u32,
    p_devices: *mut VkPhysicalDevice,
) -> VkResult {
    let Some(enumerate) = inst.dispatch().layer_inst_disp.EnumeratePhysicalDevices else {
        return VK_ERROR_INITIALIZATION_FAILED;
    };
    let instance = inst.handle();
    let mut count = 0u32;
    let result = enumerate(instance, &mut count, ptr::null_mut());
    if result != VK_SUCCESS {
        return result;
    }
    let mut chain_handles = vec![ptr::null_mut(); count as usize];
    let result = enumerate(instance, &mut count, chain_handles.as_mut_ptr());
    if result < VK_SUCCESS {
        return result;
    }
    chain_handles.truncate(count as usize);

    let disp = &*inst.disp as *const _;
    let inst_ptr = inst as *mut LoaderInstance;
    let mut new_tramps: Vec<Box<PhysDevTramp>> = Vec::new();
    let mut out: Vec<*mut PhysDevTramp> = Vec::new();
    for handle in chain_handles {
        let existing = inst
            .phys_devs_tramp
            .iter()
            .position(|t| t.phys_dev == handle);
        let boxed = match existing {
            Some(idx) => inst.phys_devs_tramp.swap_remove(idx),
            None => Box::new(PhysDevTramp {
                disp,
                magic: LOADER_MAGIC_NUMBER,
                this_instance: inst_ptr,
                phys_dev: handle,
            }),
        };
        out.push(&*boxed as *const PhysDevTramp as *mut PhysDevTramp);
        new_tramps.push(boxed);
    }
    // Records for devices that disappeared drop here.
    inst.phys_devs_tramp = new_tramps;

    apply_device_configurations(inst, &mut out);

    let handles: Vec<VkPhysicalDevice> =
        out.iter().map(|t| *t as VkPhysicalDevice).collect();
    write_enumerated(&handles, p_count, p_devices)
}

/// Trampoline group enumeration: substitute application-facing records into
/// each group the chain reports.
pub unsafe fn trampoline_enumerate_physical_device_groups(
    inst: &mut LoaderInstance,
    p_count: *mut u32,
    p_groups: *mut VkPhysicalDeviceGroupProperties,
) -> VkResult {
    let Some(enumerate) = inst.dispatch().layer_inst_disp.EnumeratePhysicalDeviceGroups else {
        return VK_ERROR_INITIALIZATION_FAILED;
    };
    // Make sure the trampoline records exist before substitution.
    let mut dev_count = 0u32;
    let result =
        trampoline_enumerate_physical_devices(inst, &mut dev_count, ptr::null_mut());
    if result != VK_SUCCESS {
        return result;
    }

    let instance = inst.handle();
    let mut count = 0u32;
    let result = enumerate(instance, &mut count, ptr::null_mut());
    if result != VK_SUCCESS {
        return result;
    }
    if p_groups.is_null() {
        *p_count = count;
        return VK_SUCCESS;
    }
    let mut groups: Vec<VkPhysicalDeviceGroupProperties> = vec![mem::zeroed(); count as usize];
    for group in groups.iter_mut() {
        group.sType = VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_GROUP_PROPERTIES;
    }
    let result = enumerate(instance, &mut count, groups.as_mut_ptr());
    if result < VK_SUCCESS {
        return result;
    }
    groups.truncate(count as usize);

    for group in groups.iter_mut() {
        for dev in 0..group.physicalDeviceCount as usize {
            let chain_handle = group.physicalDevices[dev];
            if let Some(tramp) = inst
                .phys_devs_tramp
                .iter()
                .find(|t| t.phys_dev == chain_handle)
            {
                group.physicalDevices[dev] =
                    &**tramp as *const PhysDevTramp as VkPhysicalDevice;
            }
        }
    }
    write_enumerated(&groups, p_count, p_groups)
}
