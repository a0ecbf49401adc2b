//! Small shared machinery: API version arithmetic, the used-object list that
//! hands out stable reusable indices, and the write-through-count helper
//! every enumerate-style entry point shares.

use std::ffi::CStr;
use std::fmt;

use libc::c_char;
use vk_sys::*;

/// A packed API version split into its four fields.
///
/// Ordering is lexicographic; equality for negotiation purposes ignores the
/// patch field, which [`ApiVersion::compatible_with`] expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ApiVersion {
    pub variant: u32,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ApiVersion {
    pub const V1_0: ApiVersion = ApiVersion { variant: 0, major: 1, minor: 0, patch: 0 };
    pub const V1_1: ApiVersion = ApiVersion { variant: 0, major: 1, minor: 1, patch: 0 };

    pub fn from_raw(version: u32) -> ApiVersion {
        ApiVersion {
            variant: VK_API_VERSION_VARIANT(version),
            major: VK_API_VERSION_MAJOR(version),
            minor: VK_API_VERSION_MINOR(version),
            patch: VK_API_VERSION_PATCH(version),
        }
    }

    pub fn to_raw(self) -> u32 {
        VK_MAKE_API_VERSION(self.variant, self.major, self.minor, self.patch)
    }

    /// Parses a dotted manifest string: `major.minor` or `major.minor.patch`.
    pub fn parse(s: &str) -> Option<ApiVersion> {
        let mut parts = s.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }
        // Normalize through the packed form so an oversized major spills
        // into the variant field the same way the packed encoding would.
        Some(ApiVersion::from_raw(VK_MAKE_API_VERSION(0, major, minor, patch)))
    }

    /// Version equality as negotiation sees it: patch is ignored.
    pub fn compatible_with(self, other: ApiVersion) -> bool {
        self.variant == other.variant && self.major == other.major && self.minor == other.minor
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.variant != 0 {
            write!(f, "{}.", self.variant)?;
        }
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// One slot of a [`UsedList`].
struct UsedSlot {
    in_use: bool,
    allocator: Option<VkAllocationCallbacks>,
}

/// Hands out the lowest free index and keeps it stable until released.
///
/// The surface bridge and the debug-messenger bridges key their per-driver
/// handle arrays by these indices, so an index must never move while in use,
/// and released indices are reused lowest-first.
#[derive(Default)]
pub struct UsedList {
    slots: Vec<UsedSlot>,
}

impl UsedList {
    pub fn new() -> UsedList {
        UsedList { slots: Vec::new() }
    }

    /// Claims the lowest free index, remembering the callbacks that must
    /// later free the object stored at it.
    pub fn allocate(&mut self, allocator: Option<VkAllocationCallbacks>) -> usize {
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if !slot.in_use {
                slot.in_use = true;
                slot.allocator = allocator;
                return idx;
            }
        }
        self.slots.push(UsedSlot { in_use: true, allocator });
        self.slots.len() - 1
    }

    pub fn release(&mut self, index: usize) -> Option<VkAllocationCallbacks> {
        let slot = &mut self.slots[index];
        debug_assert!(slot.in_use);
        slot.in_use = false;
        slot.allocator.take()
    }

    pub fn is_in_use(&self, index: usize) -> bool {
        self.slots.get(index).map(|s| s.in_use).unwrap_or(false)
    }

    pub fn allocator(&self, index: usize) -> Option<&VkAllocationCallbacks> {
        self.slots.get(index).and_then(|s| if s.in_use { s.allocator.as_ref() } else { None })
    }

    /// Upper bound of ever-claimed indices; per-driver arrays grow to this.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn in_use_count(&self) -> usize {
        self.slots.iter().filter(|s| s.in_use).count()
    }
}

/// The enumerate-with-count contract: report the available count when the
/// output pointer is null, otherwise copy as many entries as fit and return
/// `VK_INCOMPLETE` if that was fewer than available.
pub unsafe fn write_enumerated<T: Copy>(
    available: &[T],
    p_count: *mut u32,
    p_out: *mut T,
) -> VkResult {
    if p_out.is_null() {
        *p_count = available.len() as u32;
        return VK_SUCCESS;
    }
    let capacity = *p_count as usize;
    let written = capacity.min(available.len());
    for (i, item) in available.iter().take(written).enumerate() {
        *p_out.add(i) = *item;
    }
    *p_count = written as u32;
    if written < available.len() {
        VK_INCOMPLETE
    } else {
        VK_SUCCESS
    }
}

/// Copies `s` into a fixed `c_char` array, truncating to leave a NUL.
pub fn copy_to_char_array<const N: usize>(s: &str) -> [c_char; N] {
    let mut out = [0 as c_char; N];
    for (i, b) in s.bytes().take(N - 1).enumerate() {
        out[i] = b as c_char;
    }
    out
}

pub unsafe fn cstr_to_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    #[test]
    fn version_parse_and_order() {
        let v = ApiVersion::parse("1.2.135").unwrap();
        assert_eq!(v, ApiVersion { variant: 0, major: 1, minor: 2, patch: 135 });
        assert!(ApiVersion::parse("1").is_none());
        assert!(ApiVersion::parse("1.2.3.4").is_none());
        assert!(ApiVersion::V1_0 < ApiVersion::V1_1);
        assert!(v > ApiVersion::V1_1);
        assert!(v.compatible_with(ApiVersion::parse("1.2.0").unwrap()));
        assert!(!v.compatible_with(ApiVersion::V1_1));
    }

    #[test]
    fn version_raw_round_trip() {
        let v = ApiVersion::from_raw(VK_API_VERSION_1_3);
        assert_eq!((v.major, v.minor), (1, 3));
        assert_eq!(v.to_raw(), VK_API_VERSION_1_3);
    }

    #[test]
    fn used_list_reuses_lowest_index() {
        let mut list = UsedList::new();
        assert_eq!(list.allocate(None), 0);
        assert_eq!(list.allocate(None), 1);
        assert_eq!(list.allocate(None), 2);
        list.release(1);
        // Indices in use stay a dense prefix after churn.
        assert_eq!(list.allocate(None), 1);
        list.release(0);
        list.release(2);
        assert_eq!(list.allocate(None), 0);
        assert_eq!(list.capacity(), 3);
        assert_eq!(list.in_use_count(), 2);
    }

    #[test]
    fn enumerate_truncates_with_incomplete() {
        let src = [10u32, 20, 30];
        let mut count = 0u32;
        unsafe {
            assert_eq!(write_enumerated(&src, &mut count, ptr::null_mut()), VK_SUCCESS);
            assert_eq!(count, 3);
            let mut out = [0u32; 2];
            count = 2;
            assert_eq!(write_enumerated(&src, &mut count, out.as_mut_ptr()), VK_INCOMPLETE);
            assert_eq!(count, 2);
            assert_eq!(out, [10, 20]);
        }
    }
}
