//! Physical device discovery and selection.
//!
//! Every enumerated GPU is captured as a [`PhysicalDeviceCandidate`]
//! snapshot. Selection keeps the best candidate per device type and then
//! chooses between discrete and integrated hardware based on the host's
//! power source.

use std::cmp::Ordering;
use std::ffi::CStr;

use ash::vk;
use lodestar_core::BatteryStatus;

use crate::error::{GpuError, Result};
use crate::queue::QueueFamilyCaps;
use crate::surface::SurfaceContext;

/// Physical device classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}

impl DeviceType {
    /// Classify a Vulkan device type.
    pub fn from_vk(device_type: vk::PhysicalDeviceType) -> Self {
        match device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => Self::Discrete,
            vk::PhysicalDeviceType::INTEGRATED_GPU => Self::Integrated,
            vk::PhysicalDeviceType::VIRTUAL_GPU => Self::Virtual,
            vk::PhysicalDeviceType::CPU => Self::Cpu,
            _ => Self::Other,
        }
    }

    /// Rank used when device types differ: discrete, then integrated, then
    /// everything else.
    const fn preference(self) -> u8 {
        match self {
            Self::Discrete => 2,
            Self::Integrated => 1,
            Self::Virtual | Self::Cpu | Self::Other => 0,
        }
    }
}

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub const fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Vulkan API version supported by a device. Patch level is not compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Decode a packed Vulkan version word.
    pub const fn from_packed(version: u32) -> Self {
        Self {
            major: vk::api_version_major(version),
            minor: vk::api_version_minor(version),
        }
    }
}

/// Snapshot of a discovered GPU.
#[derive(Debug, Clone)]
pub struct PhysicalDeviceCandidate {
    /// Raw handle, valid while the owning instance lives.
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub vendor: GpuVendor,
    pub device_type: DeviceType,
    pub api_version: ApiVersion,
    /// Device-local memory in MB
    pub device_local_memory_mb: u64,
    /// Per-family capabilities, indexed by family index.
    pub queue_families: Vec<QueueFamilyCaps>,
    /// Whether `VK_KHR_swapchain` is offered.
    pub supports_swapchain: bool,
}

impl PhysicalDeviceCandidate {
    /// Human-readable one-line summary.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}, {:?}) - Vulkan {}.{} - {} MB VRAM",
            self.name,
            self.vendor,
            self.device_type,
            self.api_version.major,
            self.api_version.minor,
            self.device_local_memory_mb,
        )
    }
}

/// Compare two GPUs.
///
/// Returns `Greater` when `a` is preferred. Discrete beats integrated, which
/// beats any other type; otherwise the newer API version wins, comparing
/// minor only when the majors match.
pub fn compare_gpus(a: &PhysicalDeviceCandidate, b: &PhysicalDeviceCandidate) -> Ordering {
    if a.device_type != b.device_type {
        let by_type = a.device_type.preference().cmp(&b.device_type.preference());
        if by_type != Ordering::Equal {
            return by_type;
        }
    }
    a.api_version.cmp(&b.api_version)
}

/// Best candidate index per device type bucket.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct BestByType {
    discrete: Option<usize>,
    integrated: Option<usize>,
    virtual_gpu: Option<usize>,
}

fn track_best(
    slot: &mut Option<usize>,
    candidates: &[PhysicalDeviceCandidate],
    challenger: usize,
) {
    *slot = match *slot {
        // Ties go to the later device
        Some(best) if compare_gpus(&candidates[best], &candidates[challenger]).is_gt() => {
            Some(best)
        }
        _ => Some(challenger),
    };
}

/// Choose one device from `candidates`.
///
/// With both discrete and integrated hardware present the power source
/// decides: external power picks discrete, battery picks integrated. Returns
/// the index of the chosen candidate.
pub fn select_physical_device(
    candidates: &[PhysicalDeviceCandidate],
    battery: BatteryStatus,
) -> Result<usize> {
    let mut best = BestByType::default();

    for (index, candidate) in candidates.iter().enumerate() {
        match candidate.device_type {
            DeviceType::Discrete => {
                tracing::info!("Discrete GPU found: {}", candidate.name);
                track_best(&mut best.discrete, candidates, index);
            }
            DeviceType::Integrated => {
                tracing::info!("Integrated GPU found: {}", candidate.name);
                track_best(&mut best.integrated, candidates, index);
            }
            DeviceType::Virtual => {
                tracing::info!("Virtual GPU found: {}", candidate.name);
                track_best(&mut best.virtual_gpu, candidates, index);
            }
            DeviceType::Cpu => tracing::info!("CPU device found: {}", candidate.name),
            DeviceType::Other => tracing::info!("Other device found: {}", candidate.name),
        }
    }

    match best {
        BestByType {
            discrete: Some(discrete),
            integrated: Some(integrated),
            ..
        } => {
            if battery.on_external_power() {
                tracing::debug!("Power status {battery:?}, preferring discrete GPU");
                Ok(discrete)
            } else {
                tracing::info!("Running on battery ({battery:?}), preferring integrated GPU");
                Ok(integrated)
            }
        }
        BestByType {
            discrete: Some(index),
            ..
        }
        | BestByType {
            integrated: Some(index),
            ..
        }
        | BestByType {
            virtual_gpu: Some(index),
            ..
        } => Ok(index),
        _ => {
            tracing::error!("Failed to find a GPU of any kind");
            Err(GpuError::NoSuitableDevice)
        }
    }
}

/// Snapshot every physical device visible to `instance`.
///
/// Present support is queried against `surface`, so the surface must exist
/// before devices are enumerated.
///
/// # Safety
/// The instance and surface must be valid.
pub unsafe fn enumerate_candidates(
    instance: &ash::Instance,
    surface: &SurfaceContext,
) -> Result<Vec<PhysicalDeviceCandidate>> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(|e| {
        tracing::error!("vkEnumeratePhysicalDevices failed: {e}");
        GpuError::from(e)
    })?;

    if devices.is_empty() {
        tracing::error!("vkEnumeratePhysicalDevices returned no devices");
        return Err(GpuError::NoSuitableDevice);
    }

    devices
        .into_iter()
        .map(|device| unsafe { describe_physical_device(instance, surface, device) })
        .collect()
}

/// Capture a snapshot of one physical device.
///
/// # Safety
/// The instance, surface and device handle must be valid.
unsafe fn describe_physical_device(
    instance: &ash::Instance,
    surface: &SurfaceContext,
    device: vk::PhysicalDevice,
) -> Result<PhysicalDeviceCandidate> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let memory = unsafe { instance.get_physical_device_memory_properties(device) };

    let name = properties
        .device_name_as_c_str()
        .map_or_else(|_| "<unnamed>".to_string(), |n| n.to_string_lossy().into_owned());

    let device_local_memory_mb: u64 = memory
        .memory_heaps
        .iter()
        .take(memory.memory_heap_count as usize)
        .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|heap| heap.size / (1024 * 1024))
        .sum();

    let extensions = unsafe { instance.enumerate_device_extension_properties(device) }
        .map_err(|e| {
            tracing::error!("vkEnumerateDeviceExtensionProperties failed for {name}: {e}");
            GpuError::from(e)
        })?;
    let supports_swapchain = extensions
        .iter()
        .any(|ext| ext.extension_name_as_c_str() == Ok(ash::khr::swapchain::NAME));

    let family_properties =
        unsafe { instance.get_physical_device_queue_family_properties(device) };
    let mut queue_families = Vec::with_capacity(family_properties.len());
    for (index, family) in (0u32..).zip(family_properties.iter()) {
        let present = unsafe { surface.supports_present(device, index) }?;
        queue_families.push(QueueFamilyCaps {
            index,
            graphics: family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
            present,
            queue_count: family.queue_count,
        });
    }

    Ok(PhysicalDeviceCandidate {
        handle: device,
        name,
        vendor: GpuVendor::from_vendor_id(properties.vendor_id),
        device_type: DeviceType::from_vk(properties.device_type),
        api_version: ApiVersion::from_packed(properties.api_version),
        device_local_memory_mb,
        queue_families,
        supports_swapchain,
    })
}

/// Names of the device extensions required by the engine.
pub fn required_device_extensions() -> Vec<&'static CStr> {
    vec![ash::khr::swapchain::NAME]
}
