//! Presentable surface ownership and capability queries.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::error::{GpuError, Result};
use crate::instance::InstanceContext;

/// Surface properties consulted during swapchain negotiation.
///
/// Implemented by [`SurfaceContext`]; other implementations let negotiation
/// run against canned data.
pub trait SurfaceQuery {
    fn surface_formats(&self, physical_device: vk::PhysicalDevice)
        -> Result<Vec<vk::SurfaceFormatKHR>>;

    fn surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<vk::SurfaceCapabilitiesKHR>;

    fn present_modes(&self, physical_device: vk::PhysicalDevice)
        -> Result<Vec<vk::PresentModeKHR>>;
}

/// Window surface owned by the engine.
pub struct SurfaceContext {
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl SurfaceContext {
    /// Create a surface for a window.
    ///
    /// The instance must have been created with the window's surface
    /// extensions enabled.
    pub fn new<W>(instance: &InstanceContext, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

        // SAFETY: both handles come from a live window and the instance
        // outlives the surface.
        let surface = unsafe {
            ash_window::create_surface(
                instance.entry(),
                instance.instance(),
                display.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(|e| {
            tracing::error!("Surface creation failed: {e}");
            GpuError::SurfaceCreation(e.to_string())
        })?;

        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.instance());

        Ok(Self {
            surface,
            surface_loader,
        })
    }

    /// Get the raw surface handle.
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Whether `queue_family` on `physical_device` can present here.
    ///
    /// # Safety
    /// The physical device must belong to the instance that owns the surface.
    pub unsafe fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Result<bool> {
        unsafe {
            self.surface_loader.get_physical_device_surface_support(
                physical_device,
                queue_family,
                self.surface,
            )
        }
        .map_err(|e| {
            tracing::error!("vkGetPhysicalDeviceSurfaceSupportKHR failed: {e}");
            GpuError::from(e)
        })
    }
}

impl SurfaceQuery for SurfaceContext {
    fn surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::SurfaceFormatKHR>> {
        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(physical_device, self.surface)
        }?;
        Ok(formats)
    }

    fn surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<vk::SurfaceCapabilitiesKHR> {
        let caps = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
        }?;
        Ok(caps)
    }

    fn present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::PresentModeKHR>> {
        let modes = unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)
        }?;
        Ok(modes)
    }
}

impl Drop for SurfaceContext {
    fn drop(&mut self) {
        unsafe { self.surface_loader.destroy_surface(self.surface, None) };
    }
}
