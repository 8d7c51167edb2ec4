//! GPU-free stand-ins for the device and surface.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashSet;

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use lodestar_gpu::device::{ApiVersion, DeviceType, GpuVendor, PhysicalDeviceCandidate};
use lodestar_gpu::{QueueFamilyCaps, SurfaceQuery, SyncDevice};

/// Hands out unique handles and tracks which are alive and signaled.
#[derive(Default)]
pub struct FakeDevice {
    next_handle: Cell<u64>,
    live: RefCell<HashSet<u64>>,
    fences: RefCell<HashSet<u64>>,
    signaled: RefCell<HashSet<u64>>,
}

impl FakeDevice {
    fn allocate(&self) -> u64 {
        let raw = self.next_handle.get() + 1;
        self.next_handle.set(raw);
        self.live.borrow_mut().insert(raw);
        raw
    }

    /// Objects created and not yet destroyed.
    pub fn live_objects(&self) -> usize {
        self.live.borrow().len()
    }

    pub fn live_fences(&self) -> usize {
        self.fences.borrow().len()
    }

    pub fn is_signaled(&self, fence: vk::Fence) -> bool {
        self.signaled.borrow().contains(&fence.as_raw())
    }
}

impl SyncDevice for FakeDevice {
    unsafe fn create_fence_object(&self, signaled: bool) -> VkResult<vk::Fence> {
        let raw = self.allocate();
        self.fences.borrow_mut().insert(raw);
        if signaled {
            self.signaled.borrow_mut().insert(raw);
        }
        Ok(vk::Fence::from_raw(raw))
    }

    unsafe fn create_semaphore_object(&self) -> VkResult<vk::Semaphore> {
        Ok(vk::Semaphore::from_raw(self.allocate()))
    }

    unsafe fn destroy_fence_object(&self, fence: vk::Fence) {
        self.fences.borrow_mut().remove(&fence.as_raw());
        assert!(self.live.borrow_mut().remove(&fence.as_raw()), "fence released twice");
    }

    unsafe fn destroy_semaphore_object(&self, semaphore: vk::Semaphore) {
        assert!(
            self.live.borrow_mut().remove(&semaphore.as_raw()),
            "semaphore released twice"
        );
    }

    unsafe fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> VkResult<()> {
        if self.is_signaled(fence) {
            Ok(())
        } else {
            Err(vk::Result::TIMEOUT)
        }
    }

    unsafe fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        self.signaled.borrow_mut().remove(&fence.as_raw());
        Ok(())
    }
}

/// Canned surface properties.
pub struct FakeSurface {
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl FakeSurface {
    /// A typical desktop surface: sRGB available, 2..=8 images, 800x600.
    pub fn desktop() -> Self {
        Self::with_image_bounds(2, 8)
    }

    pub fn with_image_bounds(min: u32, max: u32) -> Self {
        Self {
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: min,
                max_image_count: max,
                current_extent: vk::Extent2D {
                    width: 800,
                    height: 600,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }
}

impl SurfaceQuery for FakeSurface {
    fn surface_formats(
        &self,
        _physical_device: vk::PhysicalDevice,
    ) -> lodestar_gpu::Result<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.formats.clone())
    }

    fn surface_capabilities(
        &self,
        _physical_device: vk::PhysicalDevice,
    ) -> lodestar_gpu::Result<vk::SurfaceCapabilitiesKHR> {
        Ok(self.capabilities)
    }

    fn present_modes(
        &self,
        _physical_device: vk::PhysicalDevice,
    ) -> lodestar_gpu::Result<Vec<vk::PresentModeKHR>> {
        Ok(self.present_modes.clone())
    }
}

pub fn family(index: u32, graphics: bool, present: bool) -> QueueFamilyCaps {
    QueueFamilyCaps {
        index,
        graphics,
        present,
        queue_count: 1,
    }
}

pub fn gpu(
    raw: u64,
    device_type: DeviceType,
    queue_families: Vec<QueueFamilyCaps>,
) -> PhysicalDeviceCandidate {
    PhysicalDeviceCandidate {
        handle: vk::PhysicalDevice::from_raw(raw),
        name: format!("{device_type:?} #{raw}"),
        vendor: GpuVendor::Other(0),
        device_type,
        api_version: ApiVersion::new(1, 3),
        device_local_memory_mb: 4096,
        queue_families,
        supports_swapchain: true,
    }
}
