//! Vulkan bootstrap layer for the Lodestar engine.
//!
//! This crate provides:
//! - Instance creation with validation and debug messaging
//! - Physical device selection by type and power source
//! - Queue family selection and logical device creation
//! - Swapchain negotiation, synchronization and presentation

pub mod barrier;
pub mod command;
pub mod context;
pub mod device;
pub mod error;
pub mod instance;
pub mod queue;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod window_system;

pub use command::{CommandBufferId, CommandBufferRecord, CommandDevice, CommandPool};
pub use context::{GpuContext, GpuContextBuilder};
pub use device::{
    compare_gpus, select_physical_device, ApiVersion, DeviceType, GpuVendor,
    PhysicalDeviceCandidate,
};
pub use error::{GpuError, Result};
pub use instance::{InstanceConfig, InstanceContext};
pub use queue::{select_queue_families, LogicalDevice, QueueFamilyCaps, QueueFamilySelection};
pub use surface::{SurfaceContext, SurfaceQuery};
pub use swapchain::{
    negotiate_surface_format, validate_backbuffer_count, AcquiredImage, SurfaceNegotiation,
    Swapchain, SwapchainManager, SwapchainPhase,
};
pub use sync::{SwapchainSync, SyncDevice, SyncSlot};
pub use window_system::{query_window_system, WindowSystem};
