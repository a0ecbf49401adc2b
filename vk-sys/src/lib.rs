//! Raw ABI definitions for the loader: the core graphics API, the
//! driver-facing (ICD) interface and the layer-facing interface.
//!
//! Everything here is `#[repr(C)]` data and `unsafe extern "system"` function
//! pointer shapes; no behavior lives in this crate. The layout and naming
//! mimic the upstream C headers, one module per header, to ease maintenance.

pub extern crate libc;

pub mod vk_core;
pub mod vk_icd;
pub mod vk_layer;

pub use crate::vk_core::*;
pub use crate::vk_icd::*;
pub use crate::vk_layer::*;
