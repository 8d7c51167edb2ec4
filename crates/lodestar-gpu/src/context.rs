//! GPU context management.

use ash::vk;
use lodestar_core::constants::{DEFAULT_BACKBUFFER_COUNT, ENGINE_NAME};
use lodestar_core::{BatteryStatus, LogLevel};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::command::{CommandBufferId, CommandPool};
use crate::device::{enumerate_candidates, select_physical_device, PhysicalDeviceCandidate};
use crate::error::{GpuError, Result};
use crate::instance::{InstanceConfig, InstanceContext};
use crate::queue::LogicalDevice;
use crate::surface::SurfaceContext;
use crate::swapchain::SwapchainManager;
use crate::window_system::WindowSystem;

/// Everything needed to render into a window.
///
/// Fields are declared in teardown order: the swapchain goes first and the
/// instance last.
pub struct GpuContext {
    swapchain: SwapchainManager,
    command_pool: CommandPool,
    setup_command: CommandBufferId,
    device: LogicalDevice,
    surface: SurfaceContext,
    physical_device: PhysicalDeviceCandidate,
    instance: InstanceContext,
}

impl GpuContext {
    pub fn instance(&self) -> &InstanceContext {
        &self.instance
    }

    /// The chosen GPU.
    pub fn physical_device(&self) -> &PhysicalDeviceCandidate {
        &self.physical_device
    }

    pub fn surface(&self) -> &SurfaceContext {
        &self.surface
    }

    pub fn logical_device(&self) -> &LogicalDevice {
        &self.device
    }

    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        self.device.device()
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue()
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue()
    }

    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    pub fn command_pool_mut(&mut self) -> &mut CommandPool {
        &mut self.command_pool
    }

    /// Primary buffer left recording for setup-time commands.
    pub fn setup_command(&self) -> CommandBufferId {
        self.setup_command
    }

    /// Run everything recorded into the setup buffer and reopen it.
    pub fn submit_setup_commands(&mut self) -> Result<()> {
        let queue = self.device.graphics_queue();
        self.command_pool
            .submit_setup_commands(self.setup_command, queue)
    }

    pub fn swapchain(&self) -> &SwapchainManager {
        &self.swapchain
    }

    pub fn swapchain_mut(&mut self) -> &mut SwapchainManager {
        &mut self.swapchain
    }

    /// Rebuild the swapchain for a new window size.
    pub fn recreate_swapchain(&mut self, width: u32, height: u32) -> Result<()> {
        self.swapchain
            .recreate(&self.device, &self.surface, width, height)
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        let _ = self.device.wait_idle();
        tracing::debug!("Tearing down GPU context");
    }
}

/// Builder for creating a GPU context.
#[derive(Debug, Clone)]
pub struct GpuContextBuilder {
    app_name: String,
    app_version: u32,
    enable_validation: bool,
    log_level: LogLevel,
    backbuffer_count: u32,
    vsync: bool,
    battery: BatteryStatus,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: ENGINE_NAME.to_string(),
            app_version: 1,
            enable_validation: cfg!(debug_assertions),
            log_level: LogLevel::default(),
            backbuffer_count: DEFAULT_BACKBUFFER_COUNT,
            vsync: true,
            battery: BatteryStatus::None,
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    pub fn app_version(mut self, version: u32) -> Self {
        self.app_version = version;
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Threshold for driver diagnostics.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn backbuffer_count(mut self, count: u32) -> Self {
        self.backbuffer_count = count;
        self
    }

    pub fn vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Host power status used to choose between discrete and integrated GPUs.
    pub fn battery_status(mut self, status: BatteryStatus) -> Self {
        self.battery = status;
        self
    }

    /// Bring up the whole stack for `window`.
    ///
    /// Any failure aborts; whatever was created is released in reverse order.
    pub fn build<W>(self, window: &W, width: u32, height: u32) -> Result<GpuContext>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let window_system = window
            .display_handle()
            .ok()
            .and_then(|handle| WindowSystem::from_display_handle(handle.as_raw()))
            .unwrap_or_else(WindowSystem::target_default);
        tracing::debug!("Window system: {window_system:?}");

        let instance = InstanceContext::new(&InstanceConfig {
            app_name: self.app_name.clone(),
            app_version: self.app_version,
            validate: self.enable_validation,
            log_level: self.log_level,
            window_system,
        })?;
        instance.physical_device_count()?;

        let surface = SurfaceContext::new(&instance, window)?;

        // SAFETY: instance and surface are live for the rest of this function.
        let mut candidates = unsafe { enumerate_candidates(instance.instance(), &surface) }?;
        let chosen = select_physical_device(&candidates, self.battery)?;
        let physical_device = candidates.swap_remove(chosen);
        tracing::info!("Selected GPU: {}", physical_device.summary());

        // SAFETY: the candidate was enumerated from this instance.
        let device = unsafe { LogicalDevice::new(instance.instance(), &physical_device) }?;

        // SAFETY: the graphics family exists on this device.
        let mut command_pool =
            unsafe { CommandPool::new(device.device().clone(), device.families().graphics) }?;
        let setup_command = command_pool
            .allocate_primary(1)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                GpuError::InvalidState("no setup command buffer allocated".into())
            })?;
        command_pool.begin(setup_command, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;

        let mut swapchain = SwapchainManager::new(self.backbuffer_count, self.vsync);
        swapchain.negotiate(&surface, physical_device.handle, width, height)?;
        // SAFETY: the device clone is owned by the manager, which the context
        // drops before the logical device.
        unsafe {
            swapchain
                .create_sync_objects(device.device().clone(), device.separate_present_queue())
        }?;
        swapchain.create_swapchain(&device, &surface)?;

        tracing::info!("GPU context ready ({} backbuffers)", self.backbuffer_count);

        Ok(GpuContext {
            swapchain,
            command_pool,
            setup_command,
            device,
            surface,
            physical_device,
            instance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let builder = GpuContextBuilder::new();
        assert_eq!(builder.app_name, "Lodestar");
        assert_eq!(builder.backbuffer_count, DEFAULT_BACKBUFFER_COUNT);
        assert!(builder.vsync);
        assert_eq!(builder.battery, BatteryStatus::None);
    }

    #[test]
    fn builder_setters() {
        let builder = GpuContextBuilder::new()
            .app_name("demo")
            .validation(true)
            .log_level(LogLevel::All)
            .backbuffer_count(2)
            .vsync(false)
            .battery_status(BatteryStatus::Low);
        assert_eq!(builder.app_name, "demo");
        assert!(builder.enable_validation);
        assert_eq!(builder.log_level, LogLevel::All);
        assert_eq!(builder.backbuffer_count, 2);
        assert!(!builder.vsync);
        assert_eq!(builder.battery, BatteryStatus::Low);
    }
}
