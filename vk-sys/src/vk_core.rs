//! Rust bindings for the core graphics API ABI.
//!
//! This file was adapted from the canonical `vulkan_core.h` and carries only
//! the declarations the loader itself traffics in: dispatchable and
//! non-dispatchable handles, result and structure-type constants, the create
//! and property structures the loader reads or rewrites, and the function
//! pointer shapes of every entry point the loader resolves by name.
//!
//! The layout and format of this document are meant to mimic the original
//! header in order to ease maintenance.

#![allow(non_camel_case_types, non_snake_case, dead_code, non_upper_case_globals)]

use libc::{c_char, c_void, size_t};

// Dispatchable handles. Every object behind one of these begins with a
// pointer-sized dispatch slot that the loader owns.
pub type VkInstance         = *mut c_void;
pub type VkPhysicalDevice   = *mut c_void;
pub type VkDevice           = *mut c_void;
pub type VkQueue            = *mut c_void;
pub type VkCommandBuffer    = *mut c_void;

// Non-dispatchable handles.
pub type VkSurfaceKHR                   = u64;
pub type VkSwapchainKHR                 = u64;
pub type VkImage                        = u64;
pub type VkDebugUtilsMessengerEXT       = u64;
pub type VkDebugReportCallbackEXT       = u64;

pub type VkBool32           = u32;
pub type VkFlags            = u32;
pub type VkDeviceSize       = u64;
pub type VkResult           = i32;
pub type VkStructureType    = i32;
pub type VkFormat           = i32;
pub type VkColorSpaceKHR    = i32;
pub type VkPresentModeKHR   = i32;
pub type VkPhysicalDeviceType = i32;
pub type VkSystemAllocationScope    = i32;
pub type VkInternalAllocationType   = i32;

pub type VkInstanceCreateFlags          = VkFlags;
pub type VkDeviceCreateFlags            = VkFlags;
pub type VkDeviceQueueCreateFlags       = VkFlags;
pub type VkSampleCountFlags             = VkFlags;
pub type VkQueueFlags                   = VkFlags;
pub type VkMemoryPropertyFlags          = VkFlags;
pub type VkMemoryHeapFlags              = VkFlags;
pub type VkSurfaceTransformFlagsKHR     = VkFlags;
pub type VkCompositeAlphaFlagsKHR       = VkFlags;
pub type VkImageUsageFlags              = VkFlags;
pub type VkSwapchainCreateFlagsKHR      = VkFlags;
pub type VkSharingMode                  = i32;
pub type VkSurfaceTransformFlagBitsKHR  = i32;
pub type VkCompositeAlphaFlagBitsKHR    = i32;
pub type VkDebugUtilsMessageSeverityFlagsEXT    = VkFlags;
pub type VkDebugUtilsMessageTypeFlagsEXT        = VkFlags;
pub type VkDebugUtilsMessengerCreateFlagsEXT    = VkFlags;
pub type VkDebugReportFlagsEXT                  = VkFlags;
pub type VkDebugReportObjectTypeEXT             = i32;

pub const VK_TRUE:  VkBool32 = 1;
pub const VK_FALSE: VkBool32 = 0;

pub const VK_MAX_EXTENSION_NAME_SIZE: usize         = 256;
pub const VK_MAX_DESCRIPTION_SIZE: usize            = 256;
pub const VK_MAX_PHYSICAL_DEVICE_NAME_SIZE: usize   = 256;
pub const VK_UUID_SIZE: usize                       = 16;
pub const VK_LUID_SIZE: usize                       = 8;
pub const VK_MAX_MEMORY_TYPES: usize                = 32;
pub const VK_MAX_MEMORY_HEAPS: usize                = 16;
pub const VK_MAX_DEVICE_GROUP_SIZE: usize           = 32;

// Version packing. The variant lives in the top three bits.
pub const fn VK_MAKE_API_VERSION(variant: u32, major: u32, minor: u32, patch: u32) -> u32 {
    (variant << 29) | (major << 22) | (minor << 12) | patch
}
pub const fn VK_API_VERSION_VARIANT(version: u32) -> u32 { version >> 29 }
pub const fn VK_API_VERSION_MAJOR(version: u32) -> u32 { (version >> 22) & 0x7f }
pub const fn VK_API_VERSION_MINOR(version: u32) -> u32 { (version >> 12) & 0x3ff }
pub const fn VK_API_VERSION_PATCH(version: u32) -> u32 { version & 0xfff }

pub const VK_API_VERSION_1_0: u32 = VK_MAKE_API_VERSION(0, 1, 0, 0);
pub const VK_API_VERSION_1_1: u32 = VK_MAKE_API_VERSION(0, 1, 1, 0);
pub const VK_API_VERSION_1_2: u32 = VK_MAKE_API_VERSION(0, 1, 2, 0);
pub const VK_API_VERSION_1_3: u32 = VK_MAKE_API_VERSION(0, 1, 3, 0);

// Result codes:
pub const VK_SUCCESS:                           VkResult = 0;
pub const VK_NOT_READY:                         VkResult = 1;
pub const VK_TIMEOUT:                           VkResult = 2;
pub const VK_EVENT_SET:                         VkResult = 3;
pub const VK_EVENT_RESET:                       VkResult = 4;
pub const VK_INCOMPLETE:                        VkResult = 5;
pub const VK_ERROR_OUT_OF_HOST_MEMORY:          VkResult = -1;
pub const VK_ERROR_OUT_OF_DEVICE_MEMORY:        VkResult = -2;
pub const VK_ERROR_INITIALIZATION_FAILED:       VkResult = -3;
pub const VK_ERROR_DEVICE_LOST:                 VkResult = -4;
pub const VK_ERROR_MEMORY_MAP_FAILED:           VkResult = -5;
pub const VK_ERROR_LAYER_NOT_PRESENT:           VkResult = -6;
pub const VK_ERROR_EXTENSION_NOT_PRESENT:       VkResult = -7;
pub const VK_ERROR_FEATURE_NOT_PRESENT:         VkResult = -8;
pub const VK_ERROR_INCOMPATIBLE_DRIVER:         VkResult = -9;
pub const VK_ERROR_TOO_MANY_OBJECTS:            VkResult = -10;
pub const VK_ERROR_FORMAT_NOT_SUPPORTED:        VkResult = -11;
pub const VK_ERROR_FRAGMENTED_POOL:             VkResult = -12;
pub const VK_ERROR_UNKNOWN:                     VkResult = -13;
pub const VK_ERROR_SURFACE_LOST_KHR:            VkResult = -1000000000;
pub const VK_ERROR_NATIVE_WINDOW_IN_USE_KHR:    VkResult = -1000000001;

// Structure types:
pub const VK_STRUCTURE_TYPE_APPLICATION_INFO:                       VkStructureType = 0;
pub const VK_STRUCTURE_TYPE_INSTANCE_CREATE_INFO:                   VkStructureType = 1;
pub const VK_STRUCTURE_TYPE_DEVICE_QUEUE_CREATE_INFO:               VkStructureType = 2;
pub const VK_STRUCTURE_TYPE_DEVICE_CREATE_INFO:                     VkStructureType = 3;
pub const VK_STRUCTURE_TYPE_LOADER_INSTANCE_CREATE_INFO:            VkStructureType = 47;
pub const VK_STRUCTURE_TYPE_LOADER_DEVICE_CREATE_INFO:              VkStructureType = 48;
pub const VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_FEATURES_2:             VkStructureType = 1000059000;
pub const VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_PROPERTIES_2:           VkStructureType = 1000059001;
pub const VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_GROUP_PROPERTIES:       VkStructureType = 1000070000;
pub const VK_STRUCTURE_TYPE_DEVICE_GROUP_DEVICE_CREATE_INFO:        VkStructureType = 1000070001;
pub const VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_ID_PROPERTIES:          VkStructureType = 1000071004;
pub const VK_STRUCTURE_TYPE_SWAPCHAIN_CREATE_INFO_KHR:              VkStructureType = 1000001000;
pub const VK_STRUCTURE_TYPE_XLIB_SURFACE_CREATE_INFO_KHR:           VkStructureType = 1000004000;
pub const VK_STRUCTURE_TYPE_XCB_SURFACE_CREATE_INFO_KHR:            VkStructureType = 1000005000;
pub const VK_STRUCTURE_TYPE_WAYLAND_SURFACE_CREATE_INFO_KHR:        VkStructureType = 1000006000;
pub const VK_STRUCTURE_TYPE_WIN32_SURFACE_CREATE_INFO_KHR:          VkStructureType = 1000009000;
pub const VK_STRUCTURE_TYPE_DEBUG_REPORT_CALLBACK_CREATE_INFO_EXT:  VkStructureType = 1000011000;
pub const VK_STRUCTURE_TYPE_DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT:  VkStructureType = 1000128004;
pub const VK_STRUCTURE_TYPE_METAL_SURFACE_CREATE_INFO_EXT:          VkStructureType = 1000217000;
pub const VK_STRUCTURE_TYPE_HEADLESS_SURFACE_CREATE_INFO_EXT:       VkStructureType = 1000256000;
pub const VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_MAINTENANCE_5_FEATURES_KHR: VkStructureType = 1000470000;
pub const VK_STRUCTURE_TYPE_DIRECT_DRIVER_LOADING_INFO_LUNARG:      VkStructureType = 1000459000;
pub const VK_STRUCTURE_TYPE_DIRECT_DRIVER_LOADING_LIST_LUNARG:      VkStructureType = 1000459001;

// Instance create flags:
pub const VK_INSTANCE_CREATE_ENUMERATE_PORTABILITY_BIT_KHR: VkInstanceCreateFlags = 0x0000_0001;

// Allocation scopes:
pub const VK_SYSTEM_ALLOCATION_SCOPE_COMMAND:   VkSystemAllocationScope = 0;
pub const VK_SYSTEM_ALLOCATION_SCOPE_OBJECT:    VkSystemAllocationScope = 1;
pub const VK_SYSTEM_ALLOCATION_SCOPE_CACHE:     VkSystemAllocationScope = 2;
pub const VK_SYSTEM_ALLOCATION_SCOPE_DEVICE:    VkSystemAllocationScope = 3;
pub const VK_SYSTEM_ALLOCATION_SCOPE_INSTANCE:  VkSystemAllocationScope = 4;

// Extension name strings the loader itself understands:
pub const VK_KHR_SURFACE_EXTENSION_NAME: &str               = "VK_KHR_surface";
pub const VK_KHR_SWAPCHAIN_EXTENSION_NAME: &str             = "VK_KHR_swapchain";
pub const VK_KHR_XLIB_SURFACE_EXTENSION_NAME: &str          = "VK_KHR_xlib_surface";
pub const VK_KHR_XCB_SURFACE_EXTENSION_NAME: &str           = "VK_KHR_xcb_surface";
pub const VK_KHR_WAYLAND_SURFACE_EXTENSION_NAME: &str       = "VK_KHR_wayland_surface";
pub const VK_KHR_WIN32_SURFACE_EXTENSION_NAME: &str         = "VK_KHR_win32_surface";
pub const VK_EXT_METAL_SURFACE_EXTENSION_NAME: &str         = "VK_EXT_metal_surface";
pub const VK_EXT_HEADLESS_SURFACE_EXTENSION_NAME: &str      = "VK_EXT_headless_surface";
pub const VK_EXT_DEBUG_UTILS_EXTENSION_NAME: &str           = "VK_EXT_debug_utils";
pub const VK_EXT_DEBUG_REPORT_EXTENSION_NAME: &str          = "VK_EXT_debug_report";
pub const VK_KHR_DEVICE_GROUP_CREATION_EXTENSION_NAME: &str = "VK_KHR_device_group_creation";
pub const VK_KHR_GET_PHYSICAL_DEVICE_PROPERTIES_2_EXTENSION_NAME: &str = "VK_KHR_get_physical_device_properties2";
pub const VK_KHR_PORTABILITY_ENUMERATION_EXTENSION_NAME: &str = "VK_KHR_portability_enumeration";
pub const VK_KHR_MAINTENANCE_5_EXTENSION_NAME: &str         = "VK_KHR_maintenance5";
pub const VK_LUNARG_DIRECT_DRIVER_LOADING_EXTENSION_NAME: &str = "VK_LUNARG_direct_driver_loading";

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkBaseInStructure {
    pub sType:  VkStructureType,
    pub pNext:  *const VkBaseInStructure,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkBaseOutStructure {
    pub sType:  VkStructureType,
    pub pNext:  *mut VkBaseOutStructure,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkApplicationInfo {
    pub sType:              VkStructureType,
    pub pNext:              *const c_void,
    pub pApplicationName:   *const c_char,
    pub applicationVersion: u32,
    pub pEngineName:        *const c_char,
    pub engineVersion:      u32,
    pub apiVersion:         u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkInstanceCreateInfo {
    pub sType:                      VkStructureType,
    pub pNext:                      *const c_void,
    pub flags:                      VkInstanceCreateFlags,
    pub pApplicationInfo:           *const VkApplicationInfo,
    pub enabledLayerCount:          u32,
    pub ppEnabledLayerNames:        *const *const c_char,
    pub enabledExtensionCount:      u32,
    pub ppEnabledExtensionNames:    *const *const c_char,
}

pub type PFN_vkAllocationFunction = Option<unsafe extern "system" fn(
    pUserData: *mut c_void, size: size_t, alignment: size_t,
    allocationScope: VkSystemAllocationScope) -> *mut c_void>;
pub type PFN_vkReallocationFunction = Option<unsafe extern "system" fn(
    pUserData: *mut c_void, pOriginal: *mut c_void, size: size_t, alignment: size_t,
    allocationScope: VkSystemAllocationScope) -> *mut c_void>;
pub type PFN_vkFreeFunction = Option<unsafe extern "system" fn(
    pUserData: *mut c_void, pMemory: *mut c_void)>;
pub type PFN_vkInternalAllocationNotification = Option<unsafe extern "system" fn(
    pUserData: *mut c_void, size: size_t, allocationType: VkInternalAllocationType,
    allocationScope: VkSystemAllocationScope)>;
pub type PFN_vkInternalFreeNotification = Option<unsafe extern "system" fn(
    pUserData: *mut c_void, size: size_t, allocationType: VkInternalAllocationType,
    allocationScope: VkSystemAllocationScope)>;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkAllocationCallbacks {
    pub pUserData:              *mut c_void,
    pub pfnAllocation:          PFN_vkAllocationFunction,
    pub pfnReallocation:        PFN_vkReallocationFunction,
    pub pfnFree:                PFN_vkFreeFunction,
    pub pfnInternalAllocation:  PFN_vkInternalAllocationNotification,
    pub pfnInternalFree:        PFN_vkInternalFreeNotification,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct VkExtensionProperties {
    pub extensionName: [c_char; VK_MAX_EXTENSION_NAME_SIZE],
    pub specVersion:   u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct VkLayerProperties {
    pub layerName:              [c_char; VK_MAX_EXTENSION_NAME_SIZE],
    pub specVersion:            u32,
    pub implementationVersion:  u32,
    pub description:            [c_char; VK_MAX_DESCRIPTION_SIZE],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VkExtent2D {
    pub width:  u32,
    pub height: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VkExtent3D {
    pub width:  u32,
    pub height: u32,
    pub depth:  u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkPhysicalDeviceLimits {
    pub maxImageDimension1D:                                u32,
    pub maxImageDimension2D:                                u32,
    pub maxImageDimension3D:                                u32,
    pub maxImageDimensionCube:                              u32,
    pub maxImageArrayLayers:                                u32,
    pub maxTexelBufferElements:                             u32,
    pub maxUniformBufferRange:                              u32,
    pub maxStorageBufferRange:                              u32,
    pub maxPushConstantsSize:                               u32,
    pub maxMemoryAllocationCount:                           u32,
    pub maxSamplerAllocationCount:                          u32,
    pub bufferImageGranularity:                             VkDeviceSize,
    pub sparseAddressSpaceSize:                             VkDeviceSize,
    pub maxBoundDescriptorSets:                             u32,
    pub maxPerStageDescriptorSamplers:                      u32,
    pub maxPerStageDescriptorUniformBuffers:                u32,
    pub maxPerStageDescriptorStorageBuffers:                u32,
    pub maxPerStageDescriptorSampledImages:                 u32,
    pub maxPerStageDescriptorStorageImages:                 u32,
    pub maxPerStageDescriptorInputAttachments:              u32,
    pub maxPerStageResources:                               u32,
    pub maxDescriptorSetSamplers:                           u32,
    pub maxDescriptorSetUniformBuffers:                     u32,
    pub maxDescriptorSetUniformBuffersDynamic:              u32,
    pub maxDescriptorSetStorageBuffers:                     u32,
    pub maxDescriptorSetStorageBuffersDynamic:              u32,
    pub maxDescriptorSetSampledImages:                      u32,
    pub maxDescriptorSetStorageImages:                      u32,
    pub maxDescriptorSetInputAttachments:                   u32,
    pub maxVertexInputAttributes:                           u32,
    pub maxVertexInputBindings:                             u32,
    pub maxVertexInputAttributeOffset:                      u32,
    pub maxVertexInputBindingStride:                        u32,
    pub maxVertexOutputComponents:                          u32,
    pub maxTessellationGenerationLevel:                     u32,
    pub maxTessellationPatchSize:                           u32,
    pub maxTessellationControlPerVertexInputComponents:     u32,
    pub maxTessellationControlPerVertexOutputComponents:    u32,
    pub maxTessellationControlPerPatchOutputComponents:     u32,
    pub maxTessellationControlTotalOutputComponents:        u32,
    pub maxTessellationEvaluationInputComponents:           u32,
    pub maxTessellationEvaluationOutputComponents:          u32,
    pub maxGeometryShaderInvocations:                       u32,
    pub maxGeometryInputComponents:                         u32,
    pub maxGeometryOutputComponents:                        u32,
    pub maxGeometryOutputVertices:                          u32,
    pub maxGeometryTotalOutputComponents:                   u32,
    pub maxFragmentInputComponents:                         u32,
    pub maxFragmentOutputAttachments:                       u32,
    pub maxFragmentDualSrcAttachments:                      u32,
    pub maxFragmentCombinedOutputResources:                 u32,
    pub maxComputeSharedMemorySize:                         u32,
    pub maxComputeWorkGroupCount:                           [u32; 3],
    pub maxComputeWorkGroupInvocations:                     u32,
    pub maxComputeWorkGroupSize:                            [u32; 3],
    pub subPixelPrecisionBits:                              u32,
    pub subTexelPrecisionBits:                              u32,
    pub mipmapPrecisionBits:                                u32,
    pub maxDrawIndexedIndexValue:                           u32,
    pub maxDrawIndirectCount:                               u32,
    pub maxSamplerLodBias:                                  f32,
    pub maxSamplerAnisotropy:                               f32,
    pub maxViewports:                                       u32,
    pub maxViewportDimensions:                              [u32; 2],
    pub viewportBoundsRange:                                [f32; 2],
    pub viewportSubPixelBits:                               u32,
    pub minMemoryMapAlignment:                              size_t,
    pub minTexelBufferOffsetAlignment:                      VkDeviceSize,
    pub minUniformBufferOffsetAlignment:                    VkDeviceSize,
    pub minStorageBufferOffsetAlignment:                    VkDeviceSize,
    pub minTexelOffset:                                     i32,
    pub maxTexelOffset:                                     u32,
    pub minTexelGatherOffset:                               i32,
    pub maxTexelGatherOffset:                               u32,
    pub minInterpolationOffset:                             f32,
    pub maxInterpolationOffset:                             f32,
    pub subPixelInterpolationOffsetBits:                    u32,
    pub maxFramebufferWidth:                                u32,
    pub maxFramebufferHeight:                               u32,
    pub maxFramebufferLayers:                               u32,
    pub framebufferColorSampleCounts:                       VkSampleCountFlags,
    pub framebufferDepthSampleCounts:                       VkSampleCountFlags,
    pub framebufferStencilSampleCounts:                     VkSampleCountFlags,
    pub framebufferNoAttachmentsSampleCounts:               VkSampleCountFlags,
    pub maxColorAttachments:                                u32,
    pub sampledImageColorSampleCounts:                      VkSampleCountFlags,
    pub sampledImageIntegerSampleCounts:                    VkSampleCountFlags,
    pub sampledImageDepthSampleCounts:                      VkSampleCountFlags,
    pub sampledImageStencilSampleCounts:                    VkSampleCountFlags,
    pub storageImageSampleCounts:                           VkSampleCountFlags,
    pub maxSampleMaskWords:                                 u32,
    pub timestampComputeAndGraphics:                        VkBool32,
    pub timestampPeriod:                                    f32,
    pub maxClipDistances:                                   u32,
    pub maxCullDistances:                                   u32,
    pub maxCombinedClipAndCullDistances:                    u32,
    pub discreteQueuePriorities:                            u32,
    pub pointSizeRange:                                     [f32; 2],
    pub lineWidthRange:                                     [f32; 2],
    pub pointSizeGranularity:                               f32,
    pub lineWidthGranularity:                               f32,
    pub strictLines:                                        VkBool32,
    pub standardSampleLocations:                            VkBool32,
    pub optimalBufferCopyOffsetAlignment:                   VkDeviceSize,
    pub optimalBufferCopyRowPitchAlignment:                 VkDeviceSize,
    pub nonCoherentAtomSize:                                VkDeviceSize,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkPhysicalDeviceSparseProperties {
    pub residencyStandard2DBlockShape:              VkBool32,
    pub residencyStandard2DMultisampleBlockShape:   VkBool32,
    pub residencyStandard3DBlockShape:              VkBool32,
    pub residencyAlignedMipSize:                    VkBool32,
    pub residencyNonResidentStrict:                 VkBool32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct VkPhysicalDeviceProperties {
    pub apiVersion:         u32,
    pub driverVersion:      u32,
    pub vendorID:           u32,
    pub deviceID:           u32,
    pub deviceType:         VkPhysicalDeviceType,
    pub deviceName:         [c_char; VK_MAX_PHYSICAL_DEVICE_NAME_SIZE],
    pub pipelineCacheUUID:  [u8; VK_UUID_SIZE],
    pub limits:             VkPhysicalDeviceLimits,
    pub sparseProperties:   VkPhysicalDeviceSparseProperties,
}

#[repr(C)]
pub struct VkPhysicalDeviceProperties2 {
    pub sType:      VkStructureType,
    pub pNext:      *mut c_void,
    pub properties: VkPhysicalDeviceProperties,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct VkPhysicalDeviceIDProperties {
    pub sType:           VkStructureType,
    pub pNext:           *mut c_void,
    pub deviceUUID:      [u8; VK_UUID_SIZE],
    pub driverUUID:      [u8; VK_UUID_SIZE],
    pub deviceLUID:      [u8; VK_LUID_SIZE],
    pub deviceNodeMask:  u32,
    pub deviceLUIDValid: VkBool32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VkPhysicalDeviceFeatures {
    pub robustBufferAccess:                         VkBool32,
    pub fullDrawIndexUint32:                        VkBool32,
    pub imageCubeArray:                             VkBool32,
    pub independentBlend:                           VkBool32,
    pub geometryShader:                             VkBool32,
    pub tessellationShader:                         VkBool32,
    pub sampleRateShading:                          VkBool32,
    pub dualSrcBlend:                               VkBool32,
    pub logicOp:                                    VkBool32,
    pub multiDrawIndirect:                          VkBool32,
    pub drawIndirectFirstInstance:                  VkBool32,
    pub depthClamp:                                 VkBool32,
    pub depthBiasClamp:                             VkBool32,
    pub fillModeNonSolid:                           VkBool32,
    pub depthBounds:                                VkBool32,
    pub wideLines:                                  VkBool32,
    pub largePoints:                                VkBool32,
    pub alphaToOne:                                 VkBool32,
    pub multiViewport:                              VkBool32,
    pub samplerAnisotropy:                          VkBool32,
    pub textureCompressionETC2:                     VkBool32,
    pub textureCompressionASTC_LDR:                 VkBool32,
    pub textureCompressionBC:                       VkBool32,
    pub occlusionQueryPrecise:                      VkBool32,
    pub pipelineStatisticsQuery:                    VkBool32,
    pub vertexPipelineStoresAndAtomics:             VkBool32,
    pub fragmentStoresAndAtomics:                   VkBool32,
    pub shaderTessellationAndGeometryPointSize:     VkBool32,
    pub shaderImageGatherExtended:                  VkBool32,
    pub shaderStorageImageExtendedFormats:          VkBool32,
    pub shaderStorageImageMultisample:              VkBool32,
    pub shaderStorageImageReadWithoutFormat:        VkBool32,
    pub shaderStorageImageWriteWithoutFormat:       VkBool32,
    pub shaderUniformBufferArrayDynamicIndexing:    VkBool32,
    pub shaderSampledImageArrayDynamicIndexing:     VkBool32,
    pub shaderStorageBufferArrayDynamicIndexing:    VkBool32,
    pub shaderStorageImageArrayDynamicIndexing:     VkBool32,
    pub shaderClipDistance:                         VkBool32,
    pub shaderCullDistance:                         VkBool32,
    pub shaderFloat64:                              VkBool32,
    pub shaderInt64:                                VkBool32,
    pub shaderInt16:                                VkBool32,
    pub shaderResourceResidency:                    VkBool32,
    pub shaderResourceMinLod:                       VkBool32,
    pub sparseBinding:                              VkBool32,
    pub sparseResidencyBuffer:                      VkBool32,
    pub sparseResidencyImage2D:                     VkBool32,
    pub sparseResidencyImage3D:                     VkBool32,
    pub sparseResidency2Samples:                    VkBool32,
    pub sparseResidency4Samples:                    VkBool32,
    pub sparseResidency8Samples:                    VkBool32,
    pub sparseResidency16Samples:                   VkBool32,
    pub sparseResidencyAliased:                     VkBool32,
    pub variableMultisampleRate:                    VkBool32,
    pub inheritedQueries:                           VkBool32,
}

#[repr(C)]
pub struct VkPhysicalDeviceFeatures2 {
    pub sType:      VkStructureType,
    pub pNext:      *mut c_void,
    pub features:   VkPhysicalDeviceFeatures,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkPhysicalDeviceMaintenance5FeaturesKHR {
    pub sType:          VkStructureType,
    pub pNext:          *mut c_void,
    pub maintenance5:   VkBool32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkQueueFamilyProperties {
    pub queueFlags:                  VkQueueFlags,
    pub queueCount:                  u32,
    pub timestampValidBits:          u32,
    pub minImageTransferGranularity: VkExtent3D,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkMemoryType {
    pub propertyFlags:  VkMemoryPropertyFlags,
    pub heapIndex:      u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkMemoryHeap {
    pub size:   VkDeviceSize,
    pub flags:  VkMemoryHeapFlags,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct VkPhysicalDeviceMemoryProperties {
    pub memoryTypeCount: u32,
    pub memoryTypes:     [VkMemoryType; VK_MAX_MEMORY_TYPES],
    pub memoryHeapCount: u32,
    pub memoryHeaps:     [VkMemoryHeap; VK_MAX_MEMORY_HEAPS],
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkDeviceQueueCreateInfo {
    pub sType:              VkStructureType,
    pub pNext:              *const c_void,
    pub flags:              VkDeviceQueueCreateFlags,
    pub queueFamilyIndex:   u32,
    pub queueCount:         u32,
    pub pQueuePriorities:   *const f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkDeviceCreateInfo {
    pub sType:                      VkStructureType,
    pub pNext:                      *const c_void,
    pub flags:                      VkDeviceCreateFlags,
    pub queueCreateInfoCount:       u32,
    pub pQueueCreateInfos:          *const VkDeviceQueueCreateInfo,
    pub enabledLayerCount:          u32,
    pub ppEnabledLayerNames:        *const *const c_char,
    pub enabledExtensionCount:      u32,
    pub ppEnabledExtensionNames:    *const *const c_char,
    pub pEnabledFeatures:           *const VkPhysicalDeviceFeatures,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkDeviceGroupDeviceCreateInfo {
    pub sType:               VkStructureType,
    pub pNext:               *const c_void,
    pub physicalDeviceCount: u32,
    pub pPhysicalDevices:    *const VkPhysicalDevice,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct VkPhysicalDeviceGroupProperties {
    pub sType:               VkStructureType,
    pub pNext:               *mut c_void,
    pub physicalDeviceCount: u32,
    pub physicalDevices:     [VkPhysicalDevice; VK_MAX_DEVICE_GROUP_SIZE],
    pub subsetAllocation:    VkBool32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VkSurfaceCapabilitiesKHR {
    pub minImageCount:           u32,
    pub maxImageCount:           u32,
    pub currentExtent:           VkExtent2D,
    pub minImageExtent:          VkExtent2D,
    pub maxImageExtent:          VkExtent2D,
    pub maxImageArrayLayers:     u32,
    pub supportedTransforms:     VkSurfaceTransformFlagsKHR,
    pub currentTransform:        VkSurfaceTransformFlagBitsKHR,
    pub supportedCompositeAlpha: VkCompositeAlphaFlagsKHR,
    pub supportedUsageFlags:     VkImageUsageFlags,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VkSurfaceFormatKHR {
    pub format:     VkFormat,
    pub colorSpace: VkColorSpaceKHR,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkSwapchainCreateInfoKHR {
    pub sType:                  VkStructureType,
    pub pNext:                  *const c_void,
    pub flags:                  VkSwapchainCreateFlagsKHR,
    pub surface:                VkSurfaceKHR,
    pub minImageCount:          u32,
    pub imageFormat:            VkFormat,
    pub imageColorSpace:        VkColorSpaceKHR,
    pub imageExtent:            VkExtent2D,
    pub imageArrayLayers:       u32,
    pub imageUsage:             VkImageUsageFlags,
    pub imageSharingMode:       VkSharingMode,
    pub queueFamilyIndexCount:  u32,
    pub pQueueFamilyIndices:    *const u32,
    pub preTransform:           VkSurfaceTransformFlagBitsKHR,
    pub compositeAlpha:         VkCompositeAlphaFlagBitsKHR,
    pub presentMode:            VkPresentModeKHR,
    pub clipped:                VkBool32,
    pub oldSwapchain:           VkSwapchainKHR,
}

// Window-system create infos. The handles are opaque to the loader; it only
// forwards them.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkXlibSurfaceCreateInfoKHR {
    pub sType:  VkStructureType,
    pub pNext:  *const c_void,
    pub flags:  VkFlags,
    pub dpy:    *mut c_void,
    pub window: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkXcbSurfaceCreateInfoKHR {
    pub sType:      VkStructureType,
    pub pNext:      *const c_void,
    pub flags:      VkFlags,
    pub connection: *mut c_void,
    pub window:     u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkWaylandSurfaceCreateInfoKHR {
    pub sType:   VkStructureType,
    pub pNext:   *const c_void,
    pub flags:   VkFlags,
    pub display: *mut c_void,
    pub surface: *mut c_void,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkWin32SurfaceCreateInfoKHR {
    pub sType:     VkStructureType,
    pub pNext:     *const c_void,
    pub flags:     VkFlags,
    pub hinstance: *mut c_void,
    pub hwnd:      *mut c_void,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkMetalSurfaceCreateInfoEXT {
    pub sType:  VkStructureType,
    pub pNext:  *const c_void,
    pub flags:  VkFlags,
    pub pLayer: *const c_void,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkHeadlessSurfaceCreateInfoEXT {
    pub sType: VkStructureType,
    pub pNext: *const c_void,
    pub flags: VkFlags,
}

pub type PFN_vkDebugUtilsMessengerCallbackEXT = Option<unsafe extern "system" fn(
    messageSeverity: VkDebugUtilsMessageSeverityFlagsEXT,
    messageTypes: VkDebugUtilsMessageTypeFlagsEXT,
    pCallbackData: *const c_void,
    pUserData: *mut c_void) -> VkBool32>;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkDebugUtilsMessengerCreateInfoEXT {
    pub sType:           VkStructureType,
    pub pNext:           *const c_void,
    pub flags:           VkDebugUtilsMessengerCreateFlagsEXT,
    pub messageSeverity: VkDebugUtilsMessageSeverityFlagsEXT,
    pub messageType:     VkDebugUtilsMessageTypeFlagsEXT,
    pub pfnUserCallback: PFN_vkDebugUtilsMessengerCallbackEXT,
    pub pUserData:       *mut c_void,
}

pub type PFN_vkDebugReportCallbackEXT = Option<unsafe extern "system" fn(
    flags: VkDebugReportFlagsEXT,
    objectType: VkDebugReportObjectTypeEXT,
    object: u64, location: size_t, messageCode: i32,
    pLayerPrefix: *const c_char, pMessage: *const c_char,
    pUserData: *mut c_void) -> VkBool32>;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VkDebugReportCallbackCreateInfoEXT {
    pub sType:       VkStructureType,
    pub pNext:       *const c_void,
    pub flags:       VkDebugReportFlagsEXT,
    pub pfnCallback: PFN_vkDebugReportCallbackEXT,
    pub pUserData:   *mut c_void,
}

// Function pointer shapes:
pub type PFN_vkVoidFunction = Option<unsafe extern "system" fn()>;

pub type PFN_vkGetInstanceProcAddr = Option<unsafe extern "system" fn(
    instance: VkInstance, pName: *const c_char) -> PFN_vkVoidFunction>;
pub type PFN_vkGetDeviceProcAddr = Option<unsafe extern "system" fn(
    device: VkDevice, pName: *const c_char) -> PFN_vkVoidFunction>;
pub type PFN_vkCreateInstance = Option<unsafe extern "system" fn(
    pCreateInfo: *const VkInstanceCreateInfo, pAllocator: *const VkAllocationCallbacks,
    pInstance: *mut VkInstance) -> VkResult>;
pub type PFN_vkDestroyInstance = Option<unsafe extern "system" fn(
    instance: VkInstance, pAllocator: *const VkAllocationCallbacks)>;
pub type PFN_vkEnumerateInstanceExtensionProperties = Option<unsafe extern "system" fn(
    pLayerName: *const c_char, pPropertyCount: *mut u32,
    pProperties: *mut VkExtensionProperties) -> VkResult>;
pub type PFN_vkEnumerateInstanceLayerProperties = Option<unsafe extern "system" fn(
    pPropertyCount: *mut u32, pProperties: *mut VkLayerProperties) -> VkResult>;
pub type PFN_vkEnumerateInstanceVersion = Option<unsafe extern "system" fn(
    pApiVersion: *mut u32) -> VkResult>;
pub type PFN_vkEnumeratePhysicalDevices = Option<unsafe extern "system" fn(
    instance: VkInstance, pPhysicalDeviceCount: *mut u32,
    pPhysicalDevices: *mut VkPhysicalDevice) -> VkResult>;
pub type PFN_vkEnumeratePhysicalDeviceGroups = Option<unsafe extern "system" fn(
    instance: VkInstance, pPhysicalDeviceGroupCount: *mut u32,
    pPhysicalDeviceGroupProperties: *mut VkPhysicalDeviceGroupProperties) -> VkResult>;
pub type PFN_vkGetPhysicalDeviceProperties = Option<unsafe extern "system" fn(
    physicalDevice: VkPhysicalDevice, pProperties: *mut VkPhysicalDeviceProperties)>;
pub type PFN_vkGetPhysicalDeviceProperties2 = Option<unsafe extern "system" fn(
    physicalDevice: VkPhysicalDevice, pProperties: *mut VkPhysicalDeviceProperties2)>;
pub type PFN_vkGetPhysicalDeviceFeatures = Option<unsafe extern "system" fn(
    physicalDevice: VkPhysicalDevice, pFeatures: *mut VkPhysicalDeviceFeatures)>;
pub type PFN_vkGetPhysicalDeviceFeatures2 = Option<unsafe extern "system" fn(
    physicalDevice: VkPhysicalDevice, pFeatures: *mut VkPhysicalDeviceFeatures2)>;
pub type PFN_vkGetPhysicalDeviceQueueFamilyProperties = Option<unsafe extern "system" fn(
    physicalDevice: VkPhysicalDevice, pQueueFamilyPropertyCount: *mut u32,
    pQueueFamilyProperties: *mut VkQueueFamilyProperties)>;
pub type PFN_vkGetPhysicalDeviceMemoryProperties = Option<unsafe extern "system" fn(
    physicalDevice: VkPhysicalDevice, pMemoryProperties: *mut VkPhysicalDeviceMemoryProperties)>;
pub type PFN_vkEnumerateDeviceExtensionProperties = Option<unsafe extern "system" fn(
    physicalDevice: VkPhysicalDevice, pLayerName: *const c_char, pPropertyCount: *mut u32,
    pProperties: *mut VkExtensionProperties) -> VkResult>;
pub type PFN_vkEnumerateDeviceLayerProperties = Option<unsafe extern "system" fn(
    physicalDevice: VkPhysicalDevice, pPropertyCount: *mut u32,
    pProperties: *mut VkLayerProperties) -> VkResult>;
pub type PFN_vkCreateDevice = Option<unsafe extern "system" fn(
    physicalDevice: VkPhysicalDevice, pCreateInfo: *const VkDeviceCreateInfo,
    pAllocator: *const VkAllocationCallbacks, pDevice: *mut VkDevice) -> VkResult>;
pub type PFN_vkDestroyDevice = Option<unsafe extern "system" fn(
    device: VkDevice, pAllocator: *const VkAllocationCallbacks)>;
pub type PFN_vkGetDeviceQueue = Option<unsafe extern "system" fn(
    device: VkDevice, queueFamilyIndex: u32, queueIndex: u32, pQueue: *mut VkQueue)>;

pub type PFN_vkDestroySurfaceKHR = Option<unsafe extern "system" fn(
    instance: VkInstance, surface: VkSurfaceKHR, pAllocator: *const VkAllocationCallbacks)>;
pub type PFN_vkGetPhysicalDeviceSurfaceSupportKHR = Option<unsafe extern "system" fn(
    physicalDevice: VkPhysicalDevice, queueFamilyIndex: u32, surface: VkSurfaceKHR,
    pSupported: *mut VkBool32) -> VkResult>;
pub type PFN_vkGetPhysicalDeviceSurfaceCapabilitiesKHR = Option<unsafe extern "system" fn(
    physicalDevice: VkPhysicalDevice, surface: VkSurfaceKHR,
    pSurfaceCapabilities: *mut VkSurfaceCapabilitiesKHR) -> VkResult>;
pub type PFN_vkGetPhysicalDeviceSurfaceFormatsKHR = Option<unsafe extern "system" fn(
    physicalDevice: VkPhysicalDevice, surface: VkSurfaceKHR, pSurfaceFormatCount: *mut u32,
    pSurfaceFormats: *mut VkSurfaceFormatKHR) -> VkResult>;
pub type PFN_vkGetPhysicalDeviceSurfacePresentModesKHR = Option<unsafe extern "system" fn(
    physicalDevice: VkPhysicalDevice, surface: VkSurfaceKHR, pPresentModeCount: *mut u32,
    pPresentModes: *mut VkPresentModeKHR) -> VkResult>;
pub type PFN_vkCreateXlibSurfaceKHR = Option<unsafe extern "system" fn(
    instance: VkInstance, pCreateInfo: *const VkXlibSurfaceCreateInfoKHR,
    pAllocator: *const VkAllocationCallbacks, pSurface: *mut VkSurfaceKHR) -> VkResult>;
pub type PFN_vkCreateXcbSurfaceKHR = Option<unsafe extern "system" fn(
    instance: VkInstance, pCreateInfo: *const VkXcbSurfaceCreateInfoKHR,
    pAllocator: *const VkAllocationCallbacks, pSurface: *mut VkSurfaceKHR) -> VkResult>;
pub type PFN_vkCreateWaylandSurfaceKHR = Option<unsafe extern "system" fn(
    instance: VkInstance, pCreateInfo: *const VkWaylandSurfaceCreateInfoKHR,
    pAllocator: *const VkAllocationCallbacks, pSurface: *mut VkSurfaceKHR) -> VkResult>;
pub type PFN_vkCreateWin32SurfaceKHR = Option<unsafe extern "system" fn(
    instance: VkInstance, pCreateInfo: *const VkWin32SurfaceCreateInfoKHR,
    pAllocator: *const VkAllocationCallbacks, pSurface: *mut VkSurfaceKHR) -> VkResult>;
pub type PFN_vkCreateMetalSurfaceEXT = Option<unsafe extern "system" fn(
    instance: VkInstance, pCreateInfo: *const VkMetalSurfaceCreateInfoEXT,
    pAllocator: *const VkAllocationCallbacks, pSurface: *mut VkSurfaceKHR) -> VkResult>;
pub type PFN_vkCreateHeadlessSurfaceEXT = Option<unsafe extern "system" fn(
    instance: VkInstance, pCreateInfo: *const VkHeadlessSurfaceCreateInfoEXT,
    pAllocator: *const VkAllocationCallbacks, pSurface: *mut VkSurfaceKHR) -> VkResult>;

pub type PFN_vkCreateSwapchainKHR = Option<unsafe extern "system" fn(
    device: VkDevice, pCreateInfo: *const VkSwapchainCreateInfoKHR,
    pAllocator: *const VkAllocationCallbacks, pSwapchain: *mut VkSwapchainKHR) -> VkResult>;
pub type PFN_vkDestroySwapchainKHR = Option<unsafe extern "system" fn(
    device: VkDevice, swapchain: VkSwapchainKHR, pAllocator: *const VkAllocationCallbacks)>;
pub type PFN_vkGetSwapchainImagesKHR = Option<unsafe extern "system" fn(
    device: VkDevice, swapchain: VkSwapchainKHR, pSwapchainImageCount: *mut u32,
    pSwapchainImages: *mut VkImage) -> VkResult>;

pub type PFN_vkCreateDebugUtilsMessengerEXT = Option<unsafe extern "system" fn(
    instance: VkInstance, pCreateInfo: *const VkDebugUtilsMessengerCreateInfoEXT,
    pAllocator: *const VkAllocationCallbacks,
    pMessenger: *mut VkDebugUtilsMessengerEXT) -> VkResult>;
pub type PFN_vkDestroyDebugUtilsMessengerEXT = Option<unsafe extern "system" fn(
    instance: VkInstance, messenger: VkDebugUtilsMessengerEXT,
    pAllocator: *const VkAllocationCallbacks)>;
pub type PFN_vkCreateDebugReportCallbackEXT = Option<unsafe extern "system" fn(
    instance: VkInstance, pCreateInfo: *const VkDebugReportCallbackCreateInfoEXT,
    pAllocator: *const VkAllocationCallbacks,
    pCallback: *mut VkDebugReportCallbackEXT) -> VkResult>;
pub type PFN_vkDestroyDebugReportCallbackEXT = Option<unsafe extern "system" fn(
    instance: VkInstance, callback: VkDebugReportCallbackEXT,
    pAllocator: *const VkAllocationCallbacks)>;
