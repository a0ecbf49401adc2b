//! Allocation shim: every loader allocation that crosses the ABI goes
//! through the application's `VkAllocationCallbacks` when one was supplied,
//! and falls back to the platform allocator otherwise.
//!
//! Internal structures are aligned to the largest unit size, a `u64`, on the
//! callback path. The platform fallback for `realloc` zero-fills the tail so
//! both paths hand back equivalent memory.

use std::mem;
use std::ptr;

use libc::{self, c_void, size_t};
use vk_sys::*;

const ALLOC_ALIGNMENT: size_t = mem::size_of::<u64>() as size_t;

pub unsafe fn loader_alloc(
    allocator: Option<&VkAllocationCallbacks>,
    size: usize,
    scope: VkSystemAllocationScope,
) -> *mut c_void {
    match allocator {
        Some(cb) if cb.pfnAllocation.is_some() => {
            (cb.pfnAllocation.unwrap())(cb.pUserData, size as size_t, ALLOC_ALIGNMENT, scope)
        }
        _ => libc::malloc(size as size_t),
    }
}

pub unsafe fn loader_calloc(
    allocator: Option<&VkAllocationCallbacks>,
    size: usize,
    scope: VkSystemAllocationScope,
) -> *mut c_void {
    match allocator {
        Some(cb) if cb.pfnAllocation.is_some() => {
            let mem = (cb.pfnAllocation.unwrap())(cb.pUserData, size as size_t, ALLOC_ALIGNMENT, scope);
            if !mem.is_null() {
                ptr::write_bytes(mem as *mut u8, 0, size);
            }
            mem
        }
        _ => libc::calloc(1, size as size_t),
    }
}

pub unsafe fn loader_free(allocator: Option<&VkAllocationCallbacks>, mem: *mut c_void) {
    if mem.is_null() {
        return;
    }
    match allocator {
        Some(cb) if cb.pfnFree.is_some() => (cb.pfnFree.unwrap())(cb.pUserData, mem),
        _ => libc::free(mem),
    }
}

pub unsafe fn loader_realloc(
    allocator: Option<&VkAllocationCallbacks>,
    mem: *mut c_void,
    orig_size: usize,
    size: usize,
    scope: VkSystemAllocationScope,
) -> *mut c_void {
    if mem.is_null() || orig_size == 0 {
        return loader_alloc(allocator, size, scope);
    }
    if size == 0 {
        loader_free(allocator, mem);
        return ptr::null_mut();
    }
    match allocator {
        Some(cb) if cb.pfnReallocation.is_some() => {
            (cb.pfnReallocation.unwrap())(cb.pUserData, mem, size as size_t, ALLOC_ALIGNMENT, scope)
        }
        _ => {
            let new_mem = libc::realloc(mem, size as size_t);
            if !new_mem.is_null() && size > orig_size {
                ptr::write_bytes((new_mem as *mut u8).add(orig_size), 0, size - orig_size);
            }
            new_mem
        }
    }
}

/// Moves `value` into shim-allocated storage. The value must be freed with
/// [`free_value`] using compatible callbacks.
pub unsafe fn alloc_value<T>(
    allocator: Option<&VkAllocationCallbacks>,
    scope: VkSystemAllocationScope,
    value: T,
) -> Option<*mut T> {
    let mem = loader_alloc(allocator, mem::size_of::<T>(), scope) as *mut T;
    if mem.is_null() {
        return None;
    }
    ptr::write(mem, value);
    Some(mem)
}

/// Runs the value's destructor, then releases its shim storage.
pub unsafe fn free_value<T>(allocator: Option<&VkAllocationCallbacks>, mem: *mut T) {
    if mem.is_null() {
        return;
    }
    ptr::drop_in_place(mem);
    loader_free(allocator, mem as *mut c_void);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicIsize, Ordering};

    static LIVE: AtomicIsize = AtomicIsize::new(0);

    unsafe extern "system" fn counting_alloc(
        _user: *mut c_void,
        size: size_t,
        _align: size_t,
        _scope: VkSystemAllocationScope,
    ) -> *mut c_void {
        LIVE.fetch_add(1, Ordering::SeqCst);
        libc::malloc(size)
    }

    unsafe extern "system" fn counting_free(_user: *mut c_void, mem: *mut c_void) {
        if !mem.is_null() {
            LIVE.fetch_sub(1, Ordering::SeqCst);
            libc::free(mem);
        }
    }

    fn callbacks() -> VkAllocationCallbacks {
        VkAllocationCallbacks {
            pUserData: ptr::null_mut(),
            pfnAllocation: Some(counting_alloc),
            pfnReallocation: None,
            pfnFree: Some(counting_free),
            pfnInternalAllocation: None,
            pfnInternalFree: None,
        }
    }

    #[test]
    fn callback_path_balances() {
        let cb = callbacks();
        unsafe {
            let p = loader_calloc(Some(&cb), 128, VK_SYSTEM_ALLOCATION_SCOPE_INSTANCE);
            assert!(!p.is_null());
            assert!((0..128).all(|i| *(p as *const u8).add(i) == 0));
            loader_free(Some(&cb), p);
        }
        assert_eq!(LIVE.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn realloc_degenerate_cases() {
        unsafe {
            // Null old pointer degrades to alloc.
            let p = loader_realloc(None, ptr::null_mut(), 0, 64, VK_SYSTEM_ALLOCATION_SCOPE_OBJECT);
            assert!(!p.is_null());
            // Zero new size degrades to free.
            let q = loader_realloc(None, p, 64, 0, VK_SYSTEM_ALLOCATION_SCOPE_OBJECT);
            assert!(q.is_null());
        }
    }

    #[test]
    fn platform_realloc_zeroes_tail() {
        unsafe {
            let p = loader_calloc(None, 16, VK_SYSTEM_ALLOCATION_SCOPE_OBJECT);
            ptr::write_bytes(p as *mut u8, 0xa5, 16);
            let q = loader_realloc(None, p, 16, 64, VK_SYSTEM_ALLOCATION_SCOPE_OBJECT) as *mut u8;
            assert!((16..64).all(|i| *q.add(i) == 0));
            loader_free(None, q as *mut c_void);
        }
    }
}
