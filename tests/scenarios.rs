//! End-to-end scenarios against in-process mock drivers.
//!
//! The mock drivers register through the direct-driver-loading create-info
//! chain in exclusive mode, so no system driver or manifest is ever touched.
//! Each mock implements the first-word dispatch contract for its
//! dispatchable objects the way a real driver must. The layer scenarios
//! point the discovery variables at scratch manifest trees instead.

use std::ffi::{CStr, CString, OsString};
use std::fs;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, Once};

use vk_loader::instance::LoaderInstance;
use vk_sys::*;

// Serializes tests that read or write process environment.
static ENV_LOCK: Mutex<()> = Mutex::new(());
static SANDBOX: Once = Once::new();

/// Points every discovery root at empty scratch directories so the host
/// system's drivers, layers and settings can never leak into a test.
fn sandbox_env() {
    SANDBOX.call_once(|| {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_owned();
        std::env::set_var("XDG_CONFIG_HOME", root.join("config"));
        std::env::set_var("XDG_DATA_HOME", root.join("data"));
        std::env::set_var("XDG_CONFIG_DIRS", root.join("config_dirs"));
        std::env::set_var("XDG_DATA_DIRS", root.join("data_dirs"));
        std::env::set_var("VK_LAYER_PATH", root.join("explicit"));
        std::env::set_var("VK_IMPLICIT_LAYER_PATH", root.join("implicit"));
        std::env::set_var("VK_DRIVER_FILES", root.join("none_icd.json"));
        // Keep the scratch tree alive for the whole test process.
        std::mem::forget(dir);
    });
}

const MOCK_MAGIC: usize = 0x01CDC0DE;

#[repr(C)]
struct MockObject {
    loader_data: usize,
}

/// Stamps out one mock driver: its own statics, entry points and lookup.
macro_rules! mock_driver {
    ($name:ident, api: $api:expr, interface: $iface:expr, devices: $devs:expr,
     headless: $headless:expr) => {
        mod $name {
            use super::*;

            pub static LAST_APP_API_VERSION: AtomicU32 = AtomicU32::new(0);
            pub static VISIBLE_DEVICES: AtomicUsize = AtomicUsize::new($devs);
            pub static SURFACES_CREATED: AtomicU64 = AtomicU64::new(0);
            pub static SURFACES_DESTROYED: AtomicU64 = AtomicU64::new(0);
            pub static LAST_FOO_DEVICE: AtomicUsize = AtomicUsize::new(0);

            static mut INSTANCE: MockObject = MockObject { loader_data: MOCK_MAGIC };
            // Two slots regardless of how many the driver exposes; index 0
            // stays first across enumerations.
            static mut PHYS_DEVS: [MockObject; 2] = [
                MockObject { loader_data: MOCK_MAGIC },
                MockObject { loader_data: MOCK_MAGIC },
            ];
            static mut DEVICE: MockObject = MockObject { loader_data: MOCK_MAGIC };

            pub fn reset() {
                VISIBLE_DEVICES.store($devs, Ordering::SeqCst);
                SURFACES_CREATED.store(0, Ordering::SeqCst);
                SURFACES_DESTROYED.store(0, Ordering::SeqCst);
            }

            pub unsafe fn phys_dev_handle(index: usize) -> VkPhysicalDevice {
                ptr::addr_of_mut!(PHYS_DEVS[index]) as VkPhysicalDevice
            }

            pub unsafe fn device_handle() -> VkDevice {
                ptr::addr_of_mut!(DEVICE) as VkDevice
            }

            unsafe extern "system" fn negotiate(p_version: *mut u32) -> VkResult {
                *p_version = (*p_version).min($iface);
                VK_SUCCESS
            }

            unsafe extern "system" fn create_instance(
                p_create_info: *const VkInstanceCreateInfo,
                _p_allocator: *const VkAllocationCallbacks,
                p_instance: *mut VkInstance,
            ) -> VkResult {
                let ci = &*p_create_info;
                if !ci.pApplicationInfo.is_null() {
                    LAST_APP_API_VERSION
                        .store((*ci.pApplicationInfo).apiVersion, Ordering::SeqCst);
                }
                *p_instance = ptr::addr_of_mut!(INSTANCE) as VkInstance;
                VK_SUCCESS
            }

            unsafe extern "system" fn destroy_instance(
                _instance: VkInstance,
                _p_allocator: *const VkAllocationCallbacks,
            ) {
            }

            unsafe extern "system" fn enumerate_instance_extension_properties(
                _p_layer_name: *const libc::c_char,
                p_count: *mut u32,
                p_properties: *mut VkExtensionProperties,
            ) -> VkResult {
                let names: &[&str] = if $headless {
                    &["VK_KHR_surface", "VK_EXT_headless_surface"]
                } else {
                    &[]
                };
                if p_properties.is_null() {
                    *p_count = names.len() as u32;
                    return VK_SUCCESS;
                }
                let n = (*p_count as usize).min(names.len());
                for (i, name) in names.iter().take(n).enumerate() {
                    let mut prop: VkExtensionProperties = std::mem::zeroed();
                    for (j, b) in name.bytes().enumerate() {
                        prop.extensionName[j] = b as libc::c_char;
                    }
                    prop.specVersion = 1;
                    *p_properties.add(i) = prop;
                }
                *p_count = n as u32;
                if n < names.len() { VK_INCOMPLETE } else { VK_SUCCESS }
            }

            unsafe extern "system" fn enumerate_instance_version(
                p_version: *mut u32,
            ) -> VkResult {
                *p_version = $api;
                VK_SUCCESS
            }

            unsafe extern "system" fn enumerate_physical_devices(
                _instance: VkInstance,
                p_count: *mut u32,
                p_devices: *mut VkPhysicalDevice,
            ) -> VkResult {
                let visible = VISIBLE_DEVICES.load(Ordering::SeqCst);
                if p_devices.is_null() {
                    *p_count = visible as u32;
                    return VK_SUCCESS;
                }
                let n = (*p_count as usize).min(visible);
                for i in 0..n {
                    *p_devices.add(i) = phys_dev_handle(i);
                }
                *p_count = n as u32;
                if n < visible { VK_INCOMPLETE } else { VK_SUCCESS }
            }

            unsafe extern "system" fn get_physical_device_properties(
                _phys_dev: VkPhysicalDevice,
                p_properties: *mut VkPhysicalDeviceProperties,
            ) {
                let mut props: VkPhysicalDeviceProperties = std::mem::zeroed();
                props.apiVersion = $api;
                for (i, b) in stringify!($name).bytes().enumerate() {
                    props.deviceName[i] = b as libc::c_char;
                }
                *p_properties = props;
            }

            unsafe extern "system" fn create_device(
                _phys_dev: VkPhysicalDevice,
                _p_create_info: *const VkDeviceCreateInfo,
                _p_allocator: *const VkAllocationCallbacks,
                p_device: *mut VkDevice,
            ) -> VkResult {
                *p_device = ptr::addr_of_mut!(DEVICE) as VkDevice;
                VK_SUCCESS
            }

            unsafe extern "system" fn destroy_device(
                _device: VkDevice,
                _p_allocator: *const VkAllocationCallbacks,
            ) {
            }

            /// The driver-private extension command behind the unknown
            /// function tests: records the device handle it was invoked on.
            unsafe extern "system" fn foo_ext(device: VkDevice) -> u64 {
                LAST_FOO_DEVICE.store(device as usize, Ordering::SeqCst);
                0xF00D
            }

            unsafe extern "system" fn get_device_proc_addr(
                _device: VkDevice,
                p_name: *const libc::c_char,
            ) -> PFN_vkVoidFunction {
                match std::ffi::CStr::from_ptr(p_name).to_str().unwrap_or("") {
                    "vkFooExt" => Some(std::mem::transmute::<usize, unsafe extern "system" fn()>(
                        foo_ext as usize,
                    )),
                    "vkDestroyDevice" => Some(std::mem::transmute::<
                        usize,
                        unsafe extern "system" fn(),
                    >(destroy_device as usize)),
                    _ => None,
                }
            }

            unsafe extern "system" fn create_headless_surface(
                _instance: VkInstance,
                _p_create_info: *const VkHeadlessSurfaceCreateInfoEXT,
                _p_allocator: *const VkAllocationCallbacks,
                p_surface: *mut VkSurfaceKHR,
            ) -> VkResult {
                let n = SURFACES_CREATED.fetch_add(1, Ordering::SeqCst);
                *p_surface = 0x5AFE_0000 + n;
                VK_SUCCESS
            }

            unsafe extern "system" fn destroy_surface(
                _instance: VkInstance,
                surface: VkSurfaceKHR,
                _p_allocator: *const VkAllocationCallbacks,
            ) {
                if surface != 0 {
                    SURFACES_DESTROYED.fetch_add(1, Ordering::SeqCst);
                }
            }

            pub unsafe extern "system" fn gipa(
                _instance: VkInstance,
                p_name: *const libc::c_char,
            ) -> PFN_vkVoidFunction {
                macro_rules! entry {
                    ($f:expr) => {
                        Some(std::mem::transmute::<usize, unsafe extern "system" fn()>(
                            $f as usize,
                        ))
                    };
                }
                match std::ffi::CStr::from_ptr(p_name).to_str().unwrap_or("") {
                    "vk_icdNegotiateLoaderICDInterfaceVersion" => entry!(negotiate),
                    "vkCreateInstance" => entry!(create_instance),
                    "vkDestroyInstance" => entry!(destroy_instance),
                    "vkEnumerateInstanceExtensionProperties" => {
                        entry!(enumerate_instance_extension_properties)
                    }
                    "vkEnumerateInstanceVersion" if $api >= VK_API_VERSION_1_1 => {
                        entry!(enumerate_instance_version)
                    }
                    "vkEnumeratePhysicalDevices" => entry!(enumerate_physical_devices),
                    "vkGetPhysicalDeviceProperties" => entry!(get_physical_device_properties),
                    "vkCreateDevice" => entry!(create_device),
                    "vkGetDeviceProcAddr" => entry!(get_device_proc_addr),
                    "vkDestroySurfaceKHR" => entry!(destroy_surface),
                    "vkCreateHeadlessSurfaceEXT" if $headless => {
                        entry!(create_headless_surface)
                    }
                    "vkFooExt" => entry!(foo_ext),
                    _ => None,
                }
            }
        }
    };
}

mock_driver!(driver_old, api: VK_API_VERSION_1_0, interface: 2, devices: 1, headless: false);
mock_driver!(driver_new, api: VK_API_VERSION_1_2, interface: 3, devices: 2, headless: true);

/// Builds a direct-driver-loading create-info chain over the given drivers.
struct DirectChain {
    infos: Vec<VkDirectDriverLoadingInfoLUNARG>,
    list: VkDirectDriverLoadingListLUNARG,
}

impl DirectChain {
    fn new(drivers: &[unsafe extern "system" fn(VkInstance, *const libc::c_char) -> PFN_vkVoidFunction]) -> Box<DirectChain> {
        let infos: Vec<VkDirectDriverLoadingInfoLUNARG> = drivers
            .iter()
            .map(|&gipa| VkDirectDriverLoadingInfoLUNARG {
                sType: VK_STRUCTURE_TYPE_DIRECT_DRIVER_LOADING_INFO_LUNARG,
                pNext: ptr::null_mut(),
                flags: 0,
                pfnGetInstanceProcAddr: Some(gipa),
            })
            .collect();
        let mut chain = Box::new(DirectChain {
            infos,
            list: VkDirectDriverLoadingListLUNARG {
                sType: VK_STRUCTURE_TYPE_DIRECT_DRIVER_LOADING_LIST_LUNARG,
                pNext: ptr::null_mut(),
                mode: VK_DIRECT_DRIVER_LOADING_MODE_EXCLUSIVE_LUNARG,
                driverCount: 0,
                pDrivers: ptr::null(),
            },
        });
        chain.list.driverCount = chain.infos.len() as u32;
        chain.list.pDrivers = chain.infos.as_ptr();
        chain
    }
}

unsafe fn create_test_instance(
    chain: &DirectChain,
    api_version: u32,
    extensions: &[&str],
    allocator: *const VkAllocationCallbacks,
) -> (VkInstance, Vec<CString>) {
    let app_info = VkApplicationInfo {
        sType: VK_STRUCTURE_TYPE_APPLICATION_INFO,
        pNext: ptr::null(),
        pApplicationName: ptr::null(),
        applicationVersion: 0,
        pEngineName: ptr::null(),
        engineVersion: 0,
        apiVersion: api_version,
    };
    let ext_names: Vec<CString> = extensions
        .iter()
        .map(|e| CString::new(*e).unwrap())
        .collect();
    let ext_ptrs: Vec<*const libc::c_char> = ext_names.iter().map(|e| e.as_ptr()).collect();
    let create_info = VkInstanceCreateInfo {
        sType: VK_STRUCTURE_TYPE_INSTANCE_CREATE_INFO,
        pNext: &chain.list as *const _ as *const libc::c_void,
        flags: 0,
        pApplicationInfo: &app_info,
        enabledLayerCount: 0,
        ppEnabledLayerNames: ptr::null(),
        enabledExtensionCount: ext_ptrs.len() as u32,
        ppEnabledExtensionNames: if ext_ptrs.is_empty() {
            ptr::null()
        } else {
            ext_ptrs.as_ptr()
        },
    };
    let mut instance: VkInstance = ptr::null_mut();
    let result =
        vk_loader::trampoline::vkCreateInstance(&create_info, allocator, &mut instance);
    assert_eq!(result, VK_SUCCESS, "instance creation against mock drivers");
    (instance, ext_names)
}

#[test]
fn s1_version_negotiation_across_mixed_drivers() {
    let _env = ENV_LOCK.lock().unwrap();
    sandbox_env();
    driver_old::reset();
    driver_new::reset();
    unsafe {
        let chain = DirectChain::new(&[driver_old::gipa, driver_new::gipa]);
        let (instance, _exts) = create_test_instance(&chain, VK_API_VERSION_1_1, &[], ptr::null());

        // The 1.0 driver saw a 1.0 application info, the 1.2 driver saw 1.1.
        assert_eq!(
            driver_old::LAST_APP_API_VERSION.load(Ordering::SeqCst),
            VK_API_VERSION_1_0
        );
        assert_eq!(
            driver_new::LAST_APP_API_VERSION.load(Ordering::SeqCst),
            VK_API_VERSION_1_1
        );

        // Enumeration returns the union of both drivers' devices.
        let mut count = 0u32;
        assert_eq!(
            vk_loader::trampoline::vkEnumeratePhysicalDevices(
                instance,
                &mut count,
                ptr::null_mut()
            ),
            VK_SUCCESS
        );
        assert_eq!(count, 3);

        vk_loader::trampoline::vkDestroyInstance(instance, ptr::null());
    }
}

#[test]
fn incomplete_when_capacity_is_short() {
    let _env = ENV_LOCK.lock().unwrap();
    sandbox_env();
    driver_old::reset();
    driver_new::reset();
    unsafe {
        let chain = DirectChain::new(&[driver_old::gipa, driver_new::gipa]);
        let (instance, _exts) = create_test_instance(&chain, VK_API_VERSION_1_1, &[], ptr::null());

        let mut count = 2u32;
        let mut devices = [ptr::null_mut(); 2];
        let result = vk_loader::trampoline::vkEnumeratePhysicalDevices(
            instance,
            &mut count,
            devices.as_mut_ptr(),
        );
        assert_eq!(result, VK_INCOMPLETE);
        assert_eq!(count, 2);
        assert!(devices.iter().all(|d| !d.is_null()));

        vk_loader::trampoline::vkDestroyInstance(instance, ptr::null());
    }
}

#[test]
fn handle_first_word_is_the_dispatch_pointer() {
    let _env = ENV_LOCK.lock().unwrap();
    sandbox_env();
    driver_old::reset();
    driver_new::reset();
    unsafe {
        let chain = DirectChain::new(&[driver_new::gipa]);
        let (instance, _exts) = create_test_instance(&chain, VK_API_VERSION_1_1, &[], ptr::null());

        let inst = LoaderInstance::from_handle(instance).unwrap();
        let first_word = *(instance as *const usize);
        assert_eq!(first_word, inst.dispatch() as *const _ as usize);

        let mut count = 0u32;
        vk_loader::trampoline::vkEnumeratePhysicalDevices(instance, &mut count, ptr::null_mut());
        let mut devices = vec![ptr::null_mut(); count as usize];
        vk_loader::trampoline::vkEnumeratePhysicalDevices(
            instance,
            &mut count,
            devices.as_mut_ptr(),
        );
        for dev in &devices {
            let first_word = *(*dev as *const usize);
            assert_eq!(first_word, inst.dispatch() as *const _ as usize);
        }

        vk_loader::trampoline::vkDestroyInstance(instance, ptr::null());
    }
}

#[test]
fn s6_identity_preserved_across_hot_unplug() {
    let _env = ENV_LOCK.lock().unwrap();
    sandbox_env();
    driver_old::reset();
    driver_new::reset();
    unsafe {
        let chain = DirectChain::new(&[driver_new::gipa]);
        let (instance, _exts) = create_test_instance(&chain, VK_API_VERSION_1_1, &[], ptr::null());

        let mut count = 0u32;
        vk_loader::trampoline::vkEnumeratePhysicalDevices(instance, &mut count, ptr::null_mut());
        assert_eq!(count, 2);
        let mut first = vec![ptr::null_mut(); 2];
        vk_loader::trampoline::vkEnumeratePhysicalDevices(
            instance,
            &mut count,
            first.as_mut_ptr(),
        );

        // Unplug device B, re-enumerate: A keeps its exact record address.
        driver_new::VISIBLE_DEVICES.store(1, Ordering::SeqCst);
        let mut count = 0u32;
        vk_loader::trampoline::vkEnumeratePhysicalDevices(instance, &mut count, ptr::null_mut());
        assert_eq!(count, 1);
        let mut second = vec![ptr::null_mut(); 1];
        vk_loader::trampoline::vkEnumeratePhysicalDevices(
            instance,
            &mut count,
            second.as_mut_ptr(),
        );
        assert_eq!(first[0] as usize, second[0] as usize);

        // And a third enumeration still returns the same pointer.
        let mut count = 1u32;
        let mut third = vec![ptr::null_mut(); 1];
        vk_loader::trampoline::vkEnumeratePhysicalDevices(
            instance,
            &mut count,
            third.as_mut_ptr(),
        );
        assert_eq!(second[0] as usize, third[0] as usize);

        vk_loader::trampoline::vkDestroyInstance(instance, ptr::null());
    }
}

#[test]
fn s5_surface_bridged_only_into_capable_driver() {
    let _env = ENV_LOCK.lock().unwrap();
    sandbox_env();
    driver_old::reset();
    driver_new::reset();
    unsafe {
        let chain = DirectChain::new(&[driver_old::gipa, driver_new::gipa]);
        let (instance, _exts) = create_test_instance(
            &chain,
            VK_API_VERSION_1_1,
            &["VK_KHR_surface", "VK_EXT_headless_surface"],
            ptr::null(),
        );

        let create_info = VkHeadlessSurfaceCreateInfoEXT {
            sType: VK_STRUCTURE_TYPE_HEADLESS_SURFACE_CREATE_INFO_EXT,
            pNext: ptr::null(),
            flags: 0,
        };
        let mut surface: VkSurfaceKHR = 0;
        let result = vk_loader::trampoline::vkCreateHeadlessSurfaceEXT(
            instance,
            &create_info,
            ptr::null(),
            &mut surface,
        );
        assert_eq!(result, VK_SUCCESS);
        assert_ne!(surface, 0);

        let inst = LoaderInstance::from_handle(instance).unwrap();
        let record = surface as usize as *const vk_loader::wsi::IcdSurface;
        let index = (*record).surface_index as usize;
        assert_eq!(index, 0);
        // The interface-3 driver holds a per-driver surface at the index;
        // the interface-2 driver has nothing.
        let capable = inst
            .icd_terms
            .iter()
            .find(|t| t.scanned_icd.interface_version >= 3)
            .unwrap();
        assert_ne!(capable.surfaces[index], 0);
        let legacy = inst
            .icd_terms
            .iter()
            .find(|t| t.scanned_icd.interface_version < 3)
            .unwrap();
        assert!(legacy.surfaces.get(index).copied().unwrap_or(0) == 0);

        // Destroying dispatches exactly one per-driver destroy.
        vk_loader::trampoline::vkDestroySurfaceKHR(instance, surface, ptr::null());
        assert_eq!(driver_new::SURFACES_DESTROYED.load(Ordering::SeqCst), 1);
        assert_eq!(driver_old::SURFACES_DESTROYED.load(Ordering::SeqCst), 0);

        // Index reuse: the next surface takes index 0 again.
        let mut surface2: VkSurfaceKHR = 0;
        vk_loader::trampoline::vkCreateHeadlessSurfaceEXT(
            instance,
            &create_info,
            ptr::null(),
            &mut surface2,
        );
        let record2 = surface2 as usize as *const vk_loader::wsi::IcdSurface;
        assert_eq!((*record2).surface_index, 0);
        vk_loader::trampoline::vkDestroySurfaceKHR(instance, surface2, ptr::null());

        vk_loader::trampoline::vkDestroyInstance(instance, ptr::null());
    }
}

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
#[test]
fn s4_unknown_device_function_reaches_the_driver() {
    let _env = ENV_LOCK.lock().unwrap();
    sandbox_env();
    driver_old::reset();
    driver_new::reset();
    unsafe {
        let chain = DirectChain::new(&[driver_new::gipa]);
        let (instance, _exts) = create_test_instance(&chain, VK_API_VERSION_1_1, &[], ptr::null());

        let mut count = 1u32;
        let mut devices = [ptr::null_mut(); 1];
        vk_loader::trampoline::vkEnumeratePhysicalDevices(
            instance,
            &mut count,
            devices.as_mut_ptr(),
        );

        let device_create = VkDeviceCreateInfo {
            sType: VK_STRUCTURE_TYPE_DEVICE_CREATE_INFO,
            pNext: ptr::null(),
            flags: 0,
            queueCreateInfoCount: 0,
            pQueueCreateInfos: ptr::null(),
            enabledLayerCount: 0,
            ppEnabledLayerNames: ptr::null(),
            enabledExtensionCount: 0,
            ppEnabledExtensionNames: ptr::null(),
            pEnabledFeatures: ptr::null(),
        };
        let mut device: VkDevice = ptr::null_mut();
        let result = vk_loader::trampoline::vkCreateDevice(
            devices[0],
            &device_create,
            ptr::null(),
            &mut device,
        );
        assert_eq!(result, VK_SUCCESS);

        let name = CString::new("vkFooExt").unwrap();
        let pfn = vk_loader::trampoline::vkGetDeviceProcAddr(device, name.as_ptr());
        let pfn = pfn.expect("driver-declared unknown function resolves");

        // Purity: the same name resolves to the same trampoline.
        let again = vk_loader::trampoline::vkGetDeviceProcAddr(device, name.as_ptr()).unwrap();
        assert_eq!(pfn as usize, again as usize);

        // Invoking the trampoline lands in the driver with the raw handle.
        let foo: unsafe extern "system" fn(VkDevice) -> u64 = std::mem::transmute(pfn);
        assert_eq!(foo(device), 0xF00D);
        assert_eq!(
            driver_new::LAST_FOO_DEVICE.load(Ordering::SeqCst),
            driver_new::device_handle() as usize
        );

        vk_loader::trampoline::vkDestroyDevice(device, ptr::null());
        vk_loader::trampoline::vkDestroyInstance(instance, ptr::null());
    }
}

static SHIM_LIVE: AtomicUsize = AtomicUsize::new(0);

unsafe extern "system" fn counting_alloc(
    _user: *mut libc::c_void,
    size: libc::size_t,
    _align: libc::size_t,
    _scope: VkSystemAllocationScope,
) -> *mut libc::c_void {
    SHIM_LIVE.fetch_add(1, Ordering::SeqCst);
    libc::malloc(size)
}

unsafe extern "system" fn counting_free(_user: *mut libc::c_void, mem: *mut libc::c_void) {
    if !mem.is_null() {
        SHIM_LIVE.fetch_sub(1, Ordering::SeqCst);
        libc::free(mem);
    }
}

#[test]
fn create_destroy_leaves_no_shim_allocations() {
    let _env = ENV_LOCK.lock().unwrap();
    sandbox_env();
    driver_old::reset();
    driver_new::reset();
    unsafe {
        let callbacks = VkAllocationCallbacks {
            pUserData: ptr::null_mut(),
            pfnAllocation: Some(counting_alloc),
            pfnReallocation: None,
            pfnFree: Some(counting_free),
            pfnInternalAllocation: None,
            pfnInternalFree: None,
        };
        SHIM_LIVE.store(0, Ordering::SeqCst);

        let chain = DirectChain::new(&[driver_new::gipa]);
        let (instance, _exts) = create_test_instance(
            &chain,
            VK_API_VERSION_1_1,
            &["VK_KHR_surface", "VK_EXT_headless_surface"],
            &callbacks,
        );
        assert!(SHIM_LIVE.load(Ordering::SeqCst) > 0);

        let create_info = VkHeadlessSurfaceCreateInfoEXT {
            sType: VK_STRUCTURE_TYPE_HEADLESS_SURFACE_CREATE_INFO_EXT,
            pNext: ptr::null(),
            flags: 0,
        };
        let mut surface: VkSurfaceKHR = 0;
        vk_loader::trampoline::vkCreateHeadlessSurfaceEXT(
            instance,
            &create_info,
            &callbacks,
            &mut surface,
        );
        vk_loader::trampoline::vkDestroySurfaceKHR(instance, surface, &callbacks);

        vk_loader::trampoline::vkDestroyInstance(instance, &callbacks);
        assert_eq!(SHIM_LIVE.load(Ordering::SeqCst), 0);
    }
}

#[test]
fn exclusive_direct_mode_never_falls_back() {
    let _env = ENV_LOCK.lock().unwrap();
    sandbox_env();
    unsafe {
        // An exclusive list whose only driver is unusable: creation must
        // report incompatibility rather than rescan the system.
        unsafe extern "system" fn broken_gipa(
            _instance: VkInstance,
            _p_name: *const libc::c_char,
        ) -> PFN_vkVoidFunction {
            None
        }
        let chain = DirectChain::new(&[broken_gipa]);
        let app_info = VkApplicationInfo {
            sType: VK_STRUCTURE_TYPE_APPLICATION_INFO,
            pNext: ptr::null(),
            pApplicationName: ptr::null(),
            applicationVersion: 0,
            pEngineName: ptr::null(),
            engineVersion: 0,
            apiVersion: VK_API_VERSION_1_0,
        };
        let create_info = VkInstanceCreateInfo {
            sType: VK_STRUCTURE_TYPE_INSTANCE_CREATE_INFO,
            pNext: &chain.list as *const _ as *const libc::c_void,
            flags: 0,
            pApplicationInfo: &app_info,
            enabledLayerCount: 0,
            ppEnabledLayerNames: ptr::null(),
            enabledExtensionCount: 0,
            ppEnabledExtensionNames: ptr::null(),
        };
        let mut instance: VkInstance = ptr::null_mut();
        let result =
            vk_loader::trampoline::vkCreateInstance(&create_info, ptr::null(), &mut instance);
        assert_eq!(result, VK_ERROR_INCOMPATIBLE_DRIVER);
    }
}

/// Restores an environment variable to its prior state on drop, so a failed
/// assertion cannot leak layer paths or filters into later tests.
struct EnvVarGuard {
    name: &'static str,
    old: Option<OsString>,
}

impl EnvVarGuard {
    fn set(name: &'static str, value: impl AsRef<std::ffi::OsStr>) -> EnvVarGuard {
        let old = std::env::var_os(name);
        std::env::set_var(name, value);
        EnvVarGuard { name, old }
    }

    fn unset(name: &'static str) -> EnvVarGuard {
        let old = std::env::var_os(name);
        std::env::remove_var(name);
        EnvVarGuard { name, old }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        match &self.old {
            Some(value) => std::env::set_var(self.name, value),
            None => std::env::remove_var(self.name),
        }
    }
}

fn write_manifest(dir: &Path, file: &str, contents: &str) {
    fs::write(dir.join(file), contents).unwrap();
}

unsafe fn enumerated_layer_names() -> Vec<String> {
    let mut count = 0u32;
    assert_eq!(
        vk_loader::trampoline::vkEnumerateInstanceLayerProperties(&mut count, ptr::null_mut()),
        VK_SUCCESS
    );
    let mut props: Vec<VkLayerProperties> = vec![std::mem::zeroed(); count as usize];
    assert_eq!(
        vk_loader::trampoline::vkEnumerateInstanceLayerProperties(&mut count, props.as_mut_ptr()),
        VK_SUCCESS
    );
    props
        .iter()
        .take(count as usize)
        .map(|p| CStr::from_ptr(p.layerName.as_ptr()).to_string_lossy().into_owned())
        .collect()
}

#[test]
fn s2_override_blacklist_hides_layer_and_fails_app_request() {
    let _env = ENV_LOCK.lock().unwrap();
    sandbox_env();
    driver_new::reset();

    let implicit_dir = tempfile::tempdir().unwrap();
    let explicit_dir = tempfile::tempdir().unwrap();
    write_manifest(
        implicit_dir.path(),
        "override_layer.json",
        r#"{
            "file_format_version": "1.2.0",
            "layer": {
                "name": "VK_LAYER_LUNARG_override",
                "type": "GLOBAL",
                "api_version": "1.3.0",
                "implementation_version": "1",
                "description": "override meta layer",
                "component_layers": ["VK_LAYER_test_good"],
                "blacklisted_layers": ["VK_LAYER_test_bad"],
                "disable_environment": { "VKL_E2E_DISABLE_OVERRIDE": "1" }
            }
        }"#,
    );
    write_manifest(
        explicit_dir.path(),
        "good_layer.json",
        r#"{
            "file_format_version": "1.1.0",
            "layer": {
                "name": "VK_LAYER_test_good",
                "type": "INSTANCE",
                "api_version": "1.3.0",
                "implementation_version": "1",
                "description": "override component",
                "library_path": "libtest_good_layer.so"
            }
        }"#,
    );
    write_manifest(
        explicit_dir.path(),
        "bad_layer.json",
        r#"{
            "file_format_version": "1.1.0",
            "layer": {
                "name": "VK_LAYER_test_bad",
                "type": "INSTANCE",
                "api_version": "1.3.0",
                "implementation_version": "1",
                "description": "blacklisted layer",
                "library_path": "libtest_bad_layer.so"
            }
        }"#,
    );
    let _implicit = EnvVarGuard::set("VK_IMPLICIT_LAYER_PATH", implicit_dir.path());
    let _explicit = EnvVarGuard::set("VK_LAYER_PATH", explicit_dir.path());

    unsafe {
        // The blacklisted layer is gone from enumeration; its sibling and
        // the override itself remain.
        let names = enumerated_layer_names();
        assert!(names.iter().any(|n| n == "VK_LAYER_test_good"));
        assert!(names.iter().any(|n| n == "VK_LAYER_LUNARG_override"));
        assert!(names.iter().all(|n| n != "VK_LAYER_test_bad"));

        // An application asking for it by name fails layer-not-present.
        let chain = DirectChain::new(&[driver_new::gipa]);
        let app_info = VkApplicationInfo {
            sType: VK_STRUCTURE_TYPE_APPLICATION_INFO,
            pNext: ptr::null(),
            pApplicationName: ptr::null(),
            applicationVersion: 0,
            pEngineName: ptr::null(),
            engineVersion: 0,
            apiVersion: VK_API_VERSION_1_1,
        };
        let layer_name = CString::new("VK_LAYER_test_bad").unwrap();
        let layer_ptrs = [layer_name.as_ptr()];
        let create_info = VkInstanceCreateInfo {
            sType: VK_STRUCTURE_TYPE_INSTANCE_CREATE_INFO,
            pNext: &chain.list as *const _ as *const libc::c_void,
            flags: 0,
            pApplicationInfo: &app_info,
            enabledLayerCount: 1,
            ppEnabledLayerNames: layer_ptrs.as_ptr(),
            enabledExtensionCount: 0,
            ppEnabledExtensionNames: ptr::null(),
        };
        let mut instance: VkInstance = ptr::null_mut();
        let result =
            vk_loader::trampoline::vkCreateInstance(&create_info, ptr::null(), &mut instance);
        assert_eq!(result, VK_ERROR_LAYER_NOT_PRESENT);
    }
}

/// Creates and destroys one instance, returning the activated composite
/// layer names. Activation is decided before any layer library is opened,
/// so the scratch manifests never need a real shared object on disk.
unsafe fn activated_layer_names() -> Vec<String> {
    let chain = DirectChain::new(&[driver_new::gipa]);
    let (instance, _exts) = create_test_instance(&chain, VK_API_VERSION_1_1, &[], ptr::null());
    let names: Vec<String> = LoaderInstance::from_handle(instance)
        .unwrap()
        .composite_layers
        .iter()
        .map(|l| l.name.clone())
        .collect();
    vk_loader::trampoline::vkDestroyInstance(instance, ptr::null());
    names
}

#[test]
fn s3_implicit_layer_env_gating_end_to_end() {
    let _env = ENV_LOCK.lock().unwrap();
    sandbox_env();
    driver_new::reset();

    let implicit_dir = tempfile::tempdir().unwrap();
    write_manifest(
        implicit_dir.path(),
        "pose_layer.json",
        r#"{
            "file_format_version": "1.1.0",
            "layer": {
                "name": "VK_LAYER_test_pose",
                "type": "INSTANCE",
                "api_version": "1.1.0",
                "implementation_version": "1",
                "description": "env gated implicit layer",
                "library_path": "libtest_pose_layer.so",
                "disable_environment": { "VKL_E2E_DISABLE_POSE": "1" },
                "enable_environment": { "VKL_E2E_ENABLE_POSE": "1" }
            }
        }"#,
    );
    let _implicit = EnvVarGuard::set("VK_IMPLICIT_LAYER_PATH", implicit_dir.path());

    unsafe {
        // Enable variable unset: the layer stays out of the chain.
        let _e = EnvVarGuard::unset("VKL_E2E_ENABLE_POSE");
        assert!(activated_layer_names().iter().all(|n| n != "VK_LAYER_test_pose"));
    }
    unsafe {
        // Set to exactly the configured value: activated.
        let _e = EnvVarGuard::set("VKL_E2E_ENABLE_POSE", "1");
        assert!(activated_layer_names().iter().any(|n| n == "VK_LAYER_test_pose"));
    }
    unsafe {
        // The disable filter wins over the enable gate.
        let _e = EnvVarGuard::set("VKL_E2E_ENABLE_POSE", "1");
        let _d = EnvVarGuard::set("VK_LOADER_LAYERS_DISABLE", "VK_LAYER_test_pose");
        assert!(activated_layer_names().iter().all(|n| n != "VK_LAYER_test_pose"));

        // And the allow filter pulls it back in past the disable filter.
        let _a = EnvVarGuard::set("VK_LOADER_LAYERS_ALLOW", "*pose");
        assert!(activated_layer_names().iter().any(|n| n == "VK_LAYER_test_pose"));
    }
}
