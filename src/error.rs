//! Standard error type for the loader.
//!
//! Everything that can go wrong between scanning a manifest and calling into
//! a driver funnels into [`LoaderError`]; at the API boundary the error
//! collapses to the `VkResult` the application contract allows.

use std::io;
use std::path::PathBuf;

use vk_sys::*;

pub type Result<T> = std::result::Result<T, LoaderError>;

/// An enum covering the loader's error taxonomy.
///
/// Implements the usual error traits.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("out of host memory")]
    OutOfHostMemory,
    #[error("no compatible driver: {0}")]
    IncompatibleDriver(String),
    #[error("layer not present: {0}")]
    LayerNotPresent(String),
    #[error("extension not present: {0}")]
    ExtensionNotPresent(String),
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    #[error("feature not present: {0}")]
    FeatureNotPresent(String),
    #[error("driver returned {0}")]
    Api(VkResult),
    #[error("failed to load library {path:?}: {reason}")]
    LibraryLoad { path: PathBuf, reason: String },
    #[error("library {path:?} was built for a different bit width")]
    WrongBitType { path: PathBuf },
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("manifest {path:?}: {reason}")]
    Manifest { path: PathBuf, reason: String },
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl LoaderError {
    /// The `VkResult` this error surfaces as at the API boundary.
    pub fn vk_result(&self) -> VkResult {
        match *self {
            LoaderError::OutOfHostMemory => VK_ERROR_OUT_OF_HOST_MEMORY,
            LoaderError::IncompatibleDriver(_) => VK_ERROR_INCOMPATIBLE_DRIVER,
            LoaderError::LayerNotPresent(_) => VK_ERROR_LAYER_NOT_PRESENT,
            LoaderError::ExtensionNotPresent(_) => VK_ERROR_EXTENSION_NOT_PRESENT,
            LoaderError::InitializationFailed(_) => VK_ERROR_INITIALIZATION_FAILED,
            LoaderError::FeatureNotPresent(_) => VK_ERROR_FEATURE_NOT_PRESENT,
            LoaderError::Api(r) => r,
            LoaderError::LibraryLoad { .. } | LoaderError::WrongBitType { .. } => {
                VK_ERROR_INCOMPATIBLE_DRIVER
            }
            LoaderError::Io(_) | LoaderError::Manifest { .. } | LoaderError::Json(_) => {
                VK_ERROR_INITIALIZATION_FAILED
            }
        }
    }
}

/// Folds a raw driver result into a `Result`, keeping success codes.
pub fn check(result: VkResult) -> Result<VkResult> {
    if result >= 0 {
        Ok(result)
    } else {
        Err(LoaderError::Api(result))
    }
}
