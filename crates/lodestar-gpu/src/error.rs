//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU bootstrap and presentation errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Unexpected non-success return code from a Vulkan call.
    #[error("Vulkan error: {0}")]
    NativeApiError(#[from] vk::Result),

    /// The Vulkan loader could not be found or initialised.
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// No installed driver is compatible with the requested instance.
    #[error("No compatible Vulkan driver found")]
    IncompatibleDriver,

    /// A mandatory instance or device extension is unavailable.
    #[error("Required extension not supported: {0}")]
    MissingRequiredExtension(String),

    /// An output list is too small for the names that would be written.
    #[error("Extension list needs {needed} entries but only {capacity} fit")]
    CapacityExceeded {
        /// Entries that would be written
        needed: usize,
        /// Room available
        capacity: usize,
    },

    /// No GPU of any usable kind was found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// No graphics-capable or no present-capable queue family exists.
    #[error("No graphics or present queue family found")]
    NoQueueFamily,

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// The configured backbuffer count is outside the surface's bounds.
    #[error(
        "Surface can't support {requested} backbuffers (min {min}, max {})",
        max_image_label(.max)
    )]
    UnsupportedBackbufferCount {
        /// Configured backbuffer count
        requested: u32,
        /// Surface minimum image count
        min: u32,
        /// Surface maximum image count, 0 when unbounded
        max: u32,
    },

    /// A fence or semaphore could not be created.
    #[error("Failed to create {what} for backbuffer {slot}: {result}")]
    SyncObjectCreationFailed {
        /// Backbuffer slot being populated
        slot: u32,
        /// Which primitive failed
        what: &'static str,
        /// Driver return code
        result: vk::Result,
    },

    /// The swapchain no longer matches the surface and must be recreated.
    #[error("Swapchain is out of date")]
    SwapchainOutOfDate,

    /// Operation called in the wrong lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

fn max_image_label(max: &u32) -> String {
    if *max == 0 {
        "unbounded".to_string()
    } else {
        max.to_string()
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backbuffer_message_mentions_bounds() {
        let bounded = GpuError::UnsupportedBackbufferCount {
            requested: 2,
            min: 3,
            max: 8,
        };
        assert_eq!(
            bounded.to_string(),
            "Surface can't support 2 backbuffers (min 3, max 8)"
        );

        let unbounded = GpuError::UnsupportedBackbufferCount {
            requested: 1,
            min: 2,
            max: 0,
        };
        assert!(unbounded.to_string().ends_with("max unbounded)"));
    }

    #[test]
    fn vulkan_results_convert() {
        let err: GpuError = vk::Result::ERROR_DEVICE_LOST.into();
        assert!(matches!(
            err,
            GpuError::NativeApiError(vk::Result::ERROR_DEVICE_LOST)
        ));
    }
}
