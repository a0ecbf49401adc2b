//! Unknown-entry-point dispatch.
//!
//! The loader cannot know every extension entry point at build time, so it
//! keeps `MAX_NUM_UNKNOWN_EXTS` assembly thunks per flavor. Each thunk loads
//! the dispatch table out of its first argument's first word, indexes its
//! own slot, and tail-calls whatever it finds, clobbering nothing but the
//! scratch registers the ABI already sacrifices. The name tables are
//! per-instance: the i-th name ever seen resolves to slot i, forever.
//!
//! Targets without thunk support compile the stub path, where lookups
//! return null and the application can act accordingly.

use vk_sys::*;

use crate::device::LoaderDevice;
use crate::instance::{LoaderInstance, MAX_NUM_UNKNOWN_EXTS};
use crate::log::LogBits;

#[cfg(all(
    target_pointer_width = "64",
    any(target_arch = "x86_64", target_arch = "aarch64"),
    any(target_os = "linux", target_os = "android")
))]
mod thunks {
    use core::arch::global_asm;
    use std::mem;

    use vk_sys::PFN_vkVoidFunction;

    use crate::instance::{
        DeviceDispatch, IcdTerm, InstanceDispatch, PhysDevTerm, PhysDevTramp,
        MAX_NUM_UNKNOWN_EXTS,
    };

    pub const SUPPORTED: bool = true;

    const _: () = {
        // The thunk index arithmetic assumes pointer-sized slots.
        assert!(mem::size_of::<PFN_vkVoidFunction>() == 8);
    };

    #[cfg(target_arch = "x86_64")]
    global_asm!(
        r#"
        .altmacro

        .macro VKL_DEV_EXT_TRAMP num
        .global vkl_dev_ext_tramp_\num
        vkl_dev_ext_tramp_\num:
            mov rax, qword ptr [rdi]
            jmp qword ptr [rax + {dev_ext_base} + 8*\num]
        .endm

        .macro VKL_PHYS_DEV_TRAMP num
        .global vkl_phys_dev_tramp_\num
        vkl_phys_dev_tramp_\num:
            mov rax, qword ptr [rdi]
            mov rdi, qword ptr [rdi + {tramp_pd}]
            jmp qword ptr [rax + {pd_ext_base} + 8*\num]
        .endm

        .macro VKL_PHYS_DEV_TERM num
        .global vkl_phys_dev_term_\num
        vkl_phys_dev_term_\num:
            mov rax, qword ptr [rdi + {term_icd}]
            mov rdi, qword ptr [rdi + {term_pd}]
            jmp qword ptr [rax + {icd_pd_ext} + 8*\num]
        .endm

        .set vkl_i, 0
        .rept {max}
        VKL_DEV_EXT_TRAMP %vkl_i
        .set vkl_i, vkl_i+1
        .endr
        .set vkl_i, 0
        .rept {max}
        VKL_PHYS_DEV_TRAMP %vkl_i
        .set vkl_i, vkl_i+1
        .endr
        .set vkl_i, 0
        .rept {max}
        VKL_PHYS_DEV_TERM %vkl_i
        .set vkl_i, vkl_i+1
        .endr

        .macro VKL_REF sym, num
        .quad \sym\()\num
        .endm

        .section .data.rel.ro,"aw"
        .balign 8
        .global VKL_DEV_EXT_TRAMPS
        VKL_DEV_EXT_TRAMPS:
        .set vkl_i, 0
        .rept {max}
        VKL_REF vkl_dev_ext_tramp_, %vkl_i
        .set vkl_i, vkl_i+1
        .endr
        .global VKL_PHYS_DEV_TRAMPS
        VKL_PHYS_DEV_TRAMPS:
        .set vkl_i, 0
        .rept {max}
        VKL_REF vkl_phys_dev_tramp_, %vkl_i
        .set vkl_i, vkl_i+1
        .endr
        .global VKL_PHYS_DEV_TERMS
        VKL_PHYS_DEV_TERMS:
        .set vkl_i, 0
        .rept {max}
        VKL_REF vkl_phys_dev_term_, %vkl_i
        .set vkl_i, vkl_i+1
        .endr
        .text
        "#,
        max = const MAX_NUM_UNKNOWN_EXTS,
        dev_ext_base = const mem::offset_of!(DeviceDispatch, ext_dispatch),
        pd_ext_base = const mem::offset_of!(InstanceDispatch, phys_dev_ext),
        tramp_pd = const mem::offset_of!(PhysDevTramp, phys_dev),
        term_icd = const mem::offset_of!(PhysDevTerm, this_icd_term),
        term_pd = const mem::offset_of!(PhysDevTerm, phys_dev),
        icd_pd_ext = const mem::offset_of!(IcdTerm, phys_dev_ext),
    );

    #[cfg(target_arch = "aarch64")]
    global_asm!(
        r#"
        .altmacro

        .macro VKL_DEV_EXT_TRAMP num
        .global vkl_dev_ext_tramp_\num
        vkl_dev_ext_tramp_\num:
            ldr x16, [x0]
            ldr x16, [x16, #({dev_ext_base} + 8*\num)]
            br x16
        .endm

        .macro VKL_PHYS_DEV_TRAMP num
        .global vkl_phys_dev_tramp_\num
        vkl_phys_dev_tramp_\num:
            ldr x16, [x0]
            ldr x0, [x0, #{tramp_pd}]
            ldr x16, [x16, #({pd_ext_base} + 8*\num)]
            br x16
        .endm

        .macro VKL_PHYS_DEV_TERM num
        .global vkl_phys_dev_term_\num
        vkl_phys_dev_term_\num:
            ldr x16, [x0, #{term_icd}]
            ldr x0, [x0, #{term_pd}]
            ldr x16, [x16, #({icd_pd_ext} + 8*\num)]
            br x16
        .endm

        .set vkl_i, 0
        .rept {max}
        VKL_DEV_EXT_TRAMP %vkl_i
        .set vkl_i, vkl_i+1
        .endr
        .set vkl_i, 0
        .rept {max}
        VKL_PHYS_DEV_TRAMP %vkl_i
        .set vkl_i, vkl_i+1
        .endr
        .set vkl_i, 0
        .rept {max}
        VKL_PHYS_DEV_TERM %vkl_i
        .set vkl_i, vkl_i+1
        .endr

        .macro VKL_REF sym, num
        .quad \sym\()\num
        .endm

        .section .data.rel.ro,"aw"
        .balign 8
        .global VKL_DEV_EXT_TRAMPS
        VKL_DEV_EXT_TRAMPS:
        .set vkl_i, 0
        .rept {max}
        VKL_REF vkl_dev_ext_tramp_, %vkl_i
        .set vkl_i, vkl_i+1
        .endr
        .global VKL_PHYS_DEV_TRAMPS
        VKL_PHYS_DEV_TRAMPS:
        .set vkl_i, 0
        .rept {max}
        VKL_REF vkl_phys_dev_tramp_, %vkl_i
        .set vkl_i, vkl_i+1
        .endr
        .global VKL_PHYS_DEV_TERMS
        VKL_PHYS_DEV_TERMS:
        .set vkl_i, 0
        .rept {max}
        VKL_REF vkl_phys_dev_term_, %vkl_i
        .set vkl_i, vkl_i+1
        .endr
        .text
        "#,
        max = const MAX_NUM_UNKNOWN_EXTS,
        dev_ext_base = const mem::offset_of!(DeviceDispatch, ext_dispatch),
        pd_ext_base = const mem::offset_of!(InstanceDispatch, phys_dev_ext),
        tramp_pd = const mem::offset_of!(PhysDevTramp, phys_dev),
        term_icd = const mem::offset_of!(PhysDevTerm, this_icd_term),
        term_pd = const mem::offset_of!(PhysDevTerm, phys_dev),
        icd_pd_ext = const mem::offset_of!(IcdTerm, phys_dev_ext),
    );

    extern "C" {
        static VKL_DEV_EXT_TRAMPS: [usize; MAX_NUM_UNKNOWN_EXTS];
        static VKL_PHYS_DEV_TRAMPS: [usize; MAX_NUM_UNKNOWN_EXTS];
        static VKL_PHYS_DEV_TERMS: [usize; MAX_NUM_UNKNOWN_EXTS];
    }

    pub fn dev_ext_trampoline(index: usize) -> PFN_vkVoidFunction {
        unsafe { Some(mem::transmute(VKL_DEV_EXT_TRAMPS[index])) }
    }

    pub fn phys_dev_trampoline(index: usize) -> PFN_vkVoidFunction {
        unsafe { Some(mem::transmute(VKL_PHYS_DEV_TRAMPS[index])) }
    }

    pub fn phys_dev_terminator(index: usize) -> PFN_vkVoidFunction {
        unsafe { Some(mem::transmute(VKL_PHYS_DEV_TERMS[index])) }
    }
}

#[cfg(not(all(
    target_pointer_width = "64",
    any(target_arch = "x86_64", target_arch = "aarch64"),
    any(target_os = "linux", target_os = "android")
)))]
mod thunks {
    use vk_sys::PFN_vkVoidFunction;

    pub const SUPPORTED: bool = false;

    pub fn dev_ext_trampoline(_index: usize) -> PFN_vkVoidFunction {
        None
    }

    pub fn phys_dev_trampoline(_index: usize) -> PFN_vkVoidFunction {
        None
    }

    pub fn phys_dev_terminator(_index: usize) -> PFN_vkVoidFunction {
        None
    }
}

/// Jump target for slots no driver filled; keeps a stale terminator thunk
/// from branching to null. The arguments are unknowable, so it only logs.
unsafe extern "system" fn unsupported_phys_dev_ext() {
    loader_log!(
        LogBits::ERROR,
        "unknown physical-device extension called on a driver that does not support it"
    );
}

fn check_icds_for_dev_ext(inst: &LoaderInstance, name: &str) -> bool {
    inst.icd_terms
        .iter()
        .any(|term| term.scanned_icd.gipa(term.instance, name).is_some())
}

fn check_layers_for_dev_ext(inst: &LoaderInstance, name: &str) -> bool {
    for layer in &inst.activated_layers {
        for ext in &layer.props.device_extensions {
            if ext.entrypoints.iter().any(|e| e == name) {
                return true;
            }
        }
    }
    // Not declared in a manifest; ask the top of the chain directly.
    if let Some(layer) = inst.activated_layers.first() {
        let cname = match std::ffi::CString::new(name) {
            Ok(c) => c,
            Err(_) => return false,
        };
        return unsafe { (layer.gipa)(inst.handle(), cname.as_ptr()) }.is_some();
    }
    false
}

/// Fills one unknown-function slot for one device (or every live device
/// when `dev` is `None`) by asking the chain's `vkGetDeviceProcAddr`.
unsafe fn init_dispatch_dev_ext_entry(
    inst: &mut LoaderInstance,
    dev: Option<&mut LoaderDevice>,
    index: usize,
    name: &str,
) {
    let cname = match std::ffi::CString::new(name) {
        Ok(c) => c,
        Err(_) => return,
    };
    let mut fill = |device: &mut LoaderDevice| {
        if let Some(gdpa) = device.loader_dispatch.core_dispatch.GetDeviceProcAddr {
            let value = gdpa(device.chain_device, cname.as_ptr());
            if value.is_some() {
                device.loader_dispatch.ext_dispatch[index] = value;
            }
        }
    };
    match dev {
        Some(device) => fill(device),
        None => {
            for term in inst.icd_terms.iter_mut() {
                for device in term.logical_devices.iter_mut() {
                    fill(device);
                }
            }
        }
    }
}

/// Re-applies every known unknown-function name to a new logical device.
pub unsafe fn init_dispatch_dev_ext(inst: &mut LoaderInstance, dev: &mut LoaderDevice) {
    let names: Vec<String> = inst.dev_ext_names.clone();
    for (index, name) in names.iter().enumerate() {
        init_dispatch_dev_ext_entry(inst, Some(dev), index, name);
    }
}

/// Unknown device-function lookup. The i-th never-before-seen name claims
/// slot i; repeated lookups return the same thunk.
pub unsafe fn dev_ext_gpa(
    inst: &mut LoaderInstance,
    name: &str,
    is_tramp: bool,
) -> PFN_vkVoidFunction {
    if !thunks::SUPPORTED {
        return None;
    }
    for (index, known) in inst.dev_ext_names.iter().enumerate() {
        if known == name {
            return thunks::dev_ext_trampoline(index);
        }
    }

    if !check_icds_for_dev_ext(inst, name) {
        if !is_tramp || !check_layers_for_dev_ext(inst, name) {
            return None;
        }
    }
    if inst.dev_ext_names.len() >= MAX_NUM_UNKNOWN_EXTS {
        loader_log!(
            LogBits::ERROR,
            "exhausted the unknown device function slots looking up {}",
            name
        );
        return None;
    }

    let index = inst.dev_ext_names.len();
    inst.dev_ext_names.push(name.to_owned());
    init_dispatch_dev_ext_entry(inst, None, index, name);
    thunks::dev_ext_trampoline(index)
}

fn check_icds_for_phys_dev_ext(inst: &LoaderInstance, name: &str) -> bool {
    let cname = match std::ffi::CString::new(name) {
        Ok(c) => c,
        Err(_) => return false,
    };
    inst.icd_terms.iter().any(|term| {
        if term.scanned_icd.interface_version < MIN_PHYS_DEV_EXTENSION_ICD_INTERFACE_VERSION {
            return false;
        }
        match term.scanned_icd.get_physical_device_proc_addr {
            Some(gpdpa) => unsafe { gpdpa(term.instance, cname.as_ptr()) }.is_some(),
            None => false,
        }
    })
}

fn check_layers_for_phys_dev_ext(inst: &LoaderInstance, name: &str) -> bool {
    let cname = match std::ffi::CString::new(name) {
        Ok(c) => c,
        Err(_) => return false,
    };
    for layer in &inst.activated_layers {
        if layer.interface_version > 1 {
            if let Some(gpdpa) = layer.gpdpa {
                return unsafe { gpdpa(inst.handle(), cname.as_ptr()) }.is_some();
            }
        }
    }
    false
}

/// Unknown physical-device-function lookup: binds each driver's resolved
/// pointer into that driver's slot array, points the instance dispatch slot
/// at the terminator thunk (or the first layer that claims the name, for
/// trampoline requests), and returns the matching thunk.
pub unsafe fn phys_dev_ext_gpa(
    inst: &mut LoaderInstance,
    name: &str,
    is_tramp: bool,
) -> PFN_vkVoidFunction {
    if !thunks::SUPPORTED {
        return None;
    }
    if !check_icds_for_phys_dev_ext(inst, name) {
        if !is_tramp || !check_layers_for_phys_dev_ext(inst, name) {
            return None;
        }
    }

    let existing = inst.phys_dev_ext_names.iter().position(|n| n == name);
    let index = match existing {
        Some(index) => index,
        None => {
            if inst.phys_dev_ext_names.len() >= MAX_NUM_UNKNOWN_EXTS {
                loader_log!(
                    LogBits::ERROR,
                    "exhausted the unknown physical-device function slots looking up {}",
                    name
                );
                return None;
            }
            loader_log!(
                LogBits::DEBUG,
                "storing unknown physical-device function {} at slot {}",
                name,
                inst.phys_dev_ext_names.len()
            );
            inst.phys_dev_ext_names.push(name.to_owned());
            inst.phys_dev_ext_names.len() - 1
        }
    };

    let cname = match std::ffi::CString::new(name) {
        Ok(c) => c,
        Err(_) => return None,
    };
    let stub: PFN_vkVoidFunction = Some(unsupported_phys_dev_ext);
    for term in inst.icd_terms.iter_mut() {
        let resolved = if term.scanned_icd.interface_version
            >= MIN_PHYS_DEV_EXTENSION_ICD_INTERFACE_VERSION
        {
            match term.scanned_icd.get_physical_device_proc_addr {
                Some(gpdpa) => gpdpa(term.instance, cname.as_ptr()),
                None => None,
            }
        } else {
            None
        };
        match resolved {
            Some(value) => {
                term.phys_dev_ext[index] = Some(value);
                inst.disp.phys_dev_ext[index] = thunks::phys_dev_terminator(index);
            }
            None => term.phys_dev_ext[index] = stub,
        }
    }

    if is_tramp {
        for layer in &inst.activated_layers {
            if layer.interface_version > 1 {
                if let Some(gpdpa) = layer.gpdpa {
                    if let Some(layer_fn) = gpdpa(inst.handle(), cname.as_ptr()) {
                        inst.disp.phys_dev_ext[index] = Some(layer_fn);
                        break;
                    }
                }
            }
        }
    }

    if is_tramp {
        thunks::phys_dev_trampoline(index)
    } else {
        thunks::phys_dev_terminator(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(all(
        target_pointer_width = "64",
        any(target_arch = "x86_64", target_arch = "aarch64"),
        any(target_os = "linux", target_os = "android")
    ))]
    fn thunk_tables_are_distinct_and_stable() {
        let a0 = thunks::dev_ext_trampoline(0);
        let a0_again = thunks::dev_ext_trampoline(0);
        let a1 = thunks::dev_ext_trampoline(1);
        assert!(a0.is_some());
        assert_eq!(a0.map(|f| f as usize), a0_again.map(|f| f as usize));
        assert_ne!(a0.map(|f| f as usize), a1.map(|f| f as usize));
        assert!(thunks::phys_dev_trampoline(MAX_NUM_UNKNOWN_EXTS - 1).is_some());
        assert!(thunks::phys_dev_terminator(MAX_NUM_UNKNOWN_EXTS - 1).is_some());
    }
}
