//! Queue family discovery and logical device creation.

use std::ffi::{c_char, CStr};

use ash::vk;

use crate::device::{required_device_extensions, PhysicalDeviceCandidate};
use crate::error::{GpuError, Result};

/// Capabilities of one queue family on a physical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyCaps {
    /// Family index
    pub index: u32,
    /// Supports graphics commands
    pub graphics: bool,
    /// Can present to the target surface
    pub present: bool,
    /// Number of queues in the family
    pub queue_count: u32,
}

/// Queue families chosen for rendering and presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilySelection {
    pub graphics: u32,
    pub present: u32,
    /// Presentation happens on a different family than rendering, so
    /// swapchain images change owner every frame.
    pub separate_present_queue: bool,
}

impl QueueFamilySelection {
    /// Distinct family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        if self.separate_present_queue {
            vec![self.graphics, self.present]
        } else {
            vec![self.graphics]
        }
    }
}

/// Choose graphics and present queue families.
///
/// Families are scanned in index order. The first graphics family wins the
/// graphics role; a graphics family that can also present takes both roles
/// and ends the scan. Otherwise the first present-capable family is used for
/// presentation.
pub fn select_queue_families(families: &[QueueFamilyCaps]) -> Result<QueueFamilySelection> {
    let mut graphics = None;
    let mut present = None;

    for family in families {
        if family.queue_count == 0 {
            continue;
        }

        if family.graphics {
            if family.present {
                graphics = Some(family.index);
                present = Some(family.index);
                break;
            }
            graphics.get_or_insert(family.index);
        }

        if family.present {
            present.get_or_insert(family.index);
        }
    }

    match (graphics, present) {
        (Some(graphics), Some(present)) => Ok(QueueFamilySelection {
            graphics,
            present,
            separate_present_queue: graphics != present,
        }),
        (None, _) => {
            tracing::error!("Failed to find a graphics queue family");
            Err(GpuError::NoQueueFamily)
        }
        (_, None) => {
            tracing::error!("Failed to find a queue family that can present");
            Err(GpuError::NoQueueFamily)
        }
    }
}

/// Queue create infos for the selected families, one per distinct family.
pub fn queue_create_infos<'a>(
    selection: &QueueFamilySelection,
    priorities: &'a [f32],
) -> Vec<vk::DeviceQueueCreateInfo<'a>> {
    selection
        .unique_families()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(priorities)
        })
        .collect()
}

/// Logical device with its graphics and present queues.
pub struct LogicalDevice {
    device: ash::Device,
    swapchain_loader: ash::khr::swapchain::Device,
    physical_device: vk::PhysicalDevice,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    families: QueueFamilySelection,
    enabled_extensions: Vec<&'static CStr>,
}

impl LogicalDevice {
    /// Create a logical device for the chosen physical device.
    ///
    /// # Safety
    /// The instance must be valid and own the candidate's physical device.
    pub unsafe fn new(
        instance: &ash::Instance,
        candidate: &PhysicalDeviceCandidate,
    ) -> Result<Self> {
        if !candidate.supports_swapchain {
            tracing::error!(
                "{} does not support {}",
                candidate.name,
                ash::khr::swapchain::NAME.to_string_lossy()
            );
            return Err(GpuError::MissingRequiredExtension(
                ash::khr::swapchain::NAME.to_string_lossy().into_owned(),
            ));
        }

        let families = select_queue_families(&candidate.queue_families)?;
        if families.separate_present_queue {
            tracing::info!(
                "Using separate queue families: graphics {}, present {}",
                families.graphics,
                families.present
            );
        } else {
            tracing::debug!("Graphics and present share queue family {}", families.graphics);
        }

        let priorities = [1.0_f32];
        let queue_infos = queue_create_infos(&families, &priorities);

        let enabled_extensions = required_device_extensions();
        let extension_ptrs: Vec<*const c_char> =
            enabled_extensions.iter().map(|ext| ext.as_ptr()).collect();

        let features = vk::PhysicalDeviceFeatures::default();
        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(candidate.handle, &create_info, None) }
            .map_err(|e| {
                tracing::error!("vkCreateDevice failed: {e}");
                GpuError::from(e)
            })?;

        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = if families.separate_present_queue {
            unsafe { device.get_device_queue(families.present, 0) }
        } else {
            graphics_queue
        };

        let swapchain_loader = ash::khr::swapchain::Device::new(instance, &device);

        tracing::info!("Logical device created on {}", candidate.name);

        Ok(Self {
            device,
            swapchain_loader,
            physical_device: candidate.handle,
            graphics_queue,
            present_queue,
            families,
            enabled_extensions,
        })
    }

    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Swapchain extension loader.
    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Present queue; the graphics queue when families are shared.
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    pub fn families(&self) -> QueueFamilySelection {
        self.families
    }

    pub fn separate_present_queue(&self) -> bool {
        self.families.separate_present_queue
    }

    pub fn enabled_extensions(&self) -> &[&'static CStr] {
        &self.enabled_extensions
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(index: u32, graphics: bool, present: bool) -> QueueFamilyCaps {
        QueueFamilyCaps {
            index,
            graphics,
            present,
            queue_count: 1,
        }
    }

    #[test]
    fn combined_family_is_preferred() {
        let families = [
            family(0, false, true),
            family(1, true, false),
            family(2, true, true),
        ];
        let selection = select_queue_families(&families).unwrap();
        assert_eq!(selection.graphics, 2);
        assert_eq!(selection.present, 2);
        assert!(!selection.separate_present_queue);
        assert_eq!(selection.unique_families(), vec![2]);
    }

    #[test]
    fn split_families_use_the_first_of_each() {
        let families = [
            family(0, true, false),
            family(1, true, false),
            family(2, false, true),
            family(3, false, true),
        ];
        let selection = select_queue_families(&families).unwrap();
        assert_eq!(selection.graphics, 0);
        assert_eq!(selection.present, 2);
        assert!(selection.separate_present_queue);
        assert_eq!(selection.unique_families(), vec![0, 2]);
    }

    #[test]
    fn empty_families_are_skipped() {
        let mut empty = family(0, true, true);
        empty.queue_count = 0;
        let families = [empty, family(1, true, true)];
        assert_eq!(select_queue_families(&families).unwrap().graphics, 1);
    }

    #[test]
    fn missing_roles_fail() {
        assert!(matches!(
            select_queue_families(&[family(0, false, true)]),
            Err(GpuError::NoQueueFamily)
        ));
        assert!(matches!(
            select_queue_families(&[family(0, true, false)]),
            Err(GpuError::NoQueueFamily)
        ));
        assert!(matches!(select_queue_families(&[]), Err(GpuError::NoQueueFamily)));
    }

    #[test]
    fn one_create_info_per_distinct_family() {
        let priorities = [1.0];
        let shared = QueueFamilySelection {
            graphics: 1,
            present: 1,
            separate_present_queue: false,
        };
        assert_eq!(queue_create_infos(&shared, &priorities).len(), 1);

        let split = QueueFamilySelection {
            graphics: 0,
            present: 2,
            separate_present_queue: true,
        };
        let infos = queue_create_infos(&split, &priorities);
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].queue_family_index, 0);
        assert_eq!(infos[1].queue_family_index, 2);
        assert_eq!(infos[1].queue_count, 1);
    }
}
