//! Swapchain negotiation, creation and per-frame presentation.
//!
//! [`SwapchainManager`] drives the lifecycle:
//!
//! ```text
//! Uninitialized -> FormatNegotiated -> SyncObjectsReady -> Created -> Destroyed
//!                                                          |    ^
//!                                                          v    |
//!                                                        Recreating
//! ```
//!
//! Acquire, render and present happen in `Created`. Calling a step from any
//! other phase fails with [`GpuError::InvalidState`].

use ash::vk;

use crate::error::{GpuError, Result};
use crate::queue::LogicalDevice;
use crate::surface::{SurfaceContext, SurfaceQuery};
use crate::sync::{reconcile_sync, SwapchainSync, SyncDevice, SyncSlot};

/// Color format used when the surface has no preference.
pub const FALLBACK_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;

/// Preferred color format.
pub const PREFERRED_FORMAT: vk::Format = vk::Format::B8G8R8A8_SRGB;

/// Pick the surface format.
///
/// A lone `UNDEFINED` entry means any format is acceptable, so
/// [`FALLBACK_FORMAT`] is used with that entry's color space. Otherwise a
/// [`PREFERRED_FORMAT`] entry wins wherever it appears, and a
/// [`FALLBACK_FORMAT`] entry only contributes its color space until then.
pub fn negotiate_surface_format(
    available: &[vk::SurfaceFormatKHR],
) -> Result<vk::SurfaceFormatKHR> {
    let Some(first) = available.first() else {
        tracing::error!("Surface reported no formats");
        return Err(GpuError::NativeApiError(vk::Result::ERROR_FORMAT_NOT_SUPPORTED));
    };

    if available.len() == 1 && first.format == vk::Format::UNDEFINED {
        return Ok(vk::SurfaceFormatKHR {
            format: FALLBACK_FORMAT,
            color_space: first.color_space,
        });
    }

    let mut chosen = vk::SurfaceFormatKHR {
        format: FALLBACK_FORMAT,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };
    let mut found_srgb = false;
    for candidate in available {
        if candidate.format == PREFERRED_FORMAT {
            chosen = *candidate;
            found_srgb = true;
        } else if candidate.format == FALLBACK_FORMAT && !found_srgb {
            chosen.color_space = candidate.color_space;
        }
    }

    Ok(chosen)
}

/// Select the best present mode.
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }

    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Calculate swapchain extent.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// Check `requested` against the surface image-count bounds.
///
/// A `max` of zero means no upper bound.
pub fn validate_backbuffer_count(requested: u32, min: u32, max: u32) -> Result<()> {
    if requested < min || (max != 0 && requested > max) {
        tracing::error!(
            "Surface can't support {requested} backbuffers (min {min}, max {max})"
        );
        return Err(GpuError::UnsupportedBackbufferCount {
            requested,
            min,
            max,
        });
    }
    Ok(())
}

/// Outcome of querying the surface for swapchain parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceNegotiation {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub min_image_count: u32,
    /// Zero when unbounded
    pub max_image_count: u32,
    pub extent: vk::Extent2D,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SurfaceNegotiation {
    /// Query `surface` and settle every swapchain parameter.
    pub fn query<Q: SurfaceQuery + ?Sized>(
        surface: &Q,
        physical_device: vk::PhysicalDevice,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<Self> {
        let formats = surface.surface_formats(physical_device)?;
        let format = negotiate_surface_format(&formats)?;

        let capabilities = surface.surface_capabilities(physical_device)?;
        let present_modes = surface.present_modes(physical_device)?;

        let pre_transform = if capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            capabilities.current_transform
        };

        Ok(Self {
            format,
            present_mode: select_present_mode(&present_modes, vsync),
            min_image_count: capabilities.min_image_count,
            max_image_count: capabilities.max_image_count,
            extent: calculate_extent(&capabilities, width, height),
            pre_transform,
        })
    }

    /// Check a backbuffer count against the negotiated bounds.
    pub fn validate(&self, backbuffer_count: u32) -> Result<()> {
        validate_backbuffer_count(backbuffer_count, self.min_image_count, self.max_image_count)
    }
}

/// Swapchain handle with its images and image views.
pub struct Swapchain {
    device: ash::Device,
    loader: ash::khr::swapchain::Device,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain.
    ///
    /// With separate graphics and present families images stay exclusively
    /// owned and are transferred between the queues by barriers.
    ///
    /// # Safety
    /// The device and surface must be valid. `old` must not be in use.
    pub unsafe fn new(
        device: &LogicalDevice,
        surface: &SurfaceContext,
        negotiation: &SurfaceNegotiation,
        backbuffer_count: u32,
        old: Option<&Self>,
    ) -> Result<Self> {
        let loader = device.swapchain_loader().clone();
        let raw_device = device.device().clone();

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(backbuffer_count)
            .image_format(negotiation.format.format)
            .image_color_space(negotiation.format.color_space)
            .image_extent(negotiation.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(negotiation.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(negotiation.present_mode)
            .clipped(true)
            .old_swapchain(old.map_or(vk::SwapchainKHR::null(), |old| old.handle));

        let handle = unsafe { loader.create_swapchain(&create_info, None) }.map_err(|e| {
            tracing::error!("vkCreateSwapchainKHR failed: {e}");
            GpuError::from(e)
        })?;

        let mut swapchain = Self {
            device: raw_device,
            loader,
            handle,
            images: Vec::new(),
            image_views: Vec::new(),
            format: negotiation.format.format,
            extent: negotiation.extent,
        };

        // From here on `swapchain` drops whatever was created on error
        swapchain.images = unsafe { swapchain.loader.get_swapchain_images(handle) }?;
        for &image in &swapchain.images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(swapchain.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(color_subresource_range());

            let view = unsafe { swapchain.device.create_image_view(&view_info, None) }?;
            swapchain.image_views.push(view);
        }

        tracing::info!(
            "Swapchain created: {}x{}, {:?}, {:?}, {} images",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.format,
            negotiation.present_mode,
            swapchain.images.len()
        );

        Ok(swapchain)
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.handle, None);
        }
    }
}

/// Full-image color subresource range.
pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// Lifecycle phase of a [`SwapchainManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwapchainPhase {
    Uninitialized,
    FormatNegotiated,
    SyncObjectsReady,
    Created,
    Recreating,
    Destroyed,
}

impl SwapchainPhase {
    /// Whether moving from `self` to `next` is allowed.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Uninitialized, Self::FormatNegotiated)
                | (Self::FormatNegotiated, Self::SyncObjectsReady)
                | (Self::SyncObjectsReady | Self::Recreating, Self::Created)
                | (Self::Created, Self::Recreating)
        ) || (matches!(next, Self::Destroyed) && !matches!(self, Self::Destroyed))
    }

    /// Move to `next` or fail with [`GpuError::InvalidState`].
    pub fn transition(&mut self, next: Self) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(GpuError::InvalidState(format!(
                "swapchain cannot move from {self:?} to {next:?}"
            )));
        }
        tracing::trace!("Swapchain phase {self:?} -> {next:?}");
        *self = next;
        Ok(())
    }

    fn require(self, allowed: &[Self], operation: &str) -> Result<()> {
        if allowed.contains(&self) {
            Ok(())
        } else {
            Err(GpuError::InvalidState(format!(
                "cannot {operation} while the swapchain is {self:?}"
            )))
        }
    }
}

/// Image handed out by [`SwapchainManager::acquire_next_image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    pub image_index: u32,
    /// The swapchain still works but no longer matches the surface exactly.
    pub suboptimal: bool,
}

/// Owns the swapchain, its synchronization set and the lifecycle phase.
pub struct SwapchainManager<D: SyncDevice = ash::Device> {
    swapchain: Option<Swapchain>,
    sync: Option<SwapchainSync<D>>,
    negotiation: Option<SurfaceNegotiation>,
    phase: SwapchainPhase,
    backbuffer_count: u32,
    vsync: bool,
}

impl<D: SyncDevice> SwapchainManager<D> {
    pub fn new(backbuffer_count: u32, vsync: bool) -> Self {
        Self {
            swapchain: None,
            sync: None,
            negotiation: None,
            phase: SwapchainPhase::Uninitialized,
            backbuffer_count,
            vsync,
        }
    }

    pub fn phase(&self) -> SwapchainPhase {
        self.phase
    }

    pub fn backbuffer_count(&self) -> u32 {
        self.backbuffer_count
    }

    /// Change the backbuffer count used by the next recreation.
    pub fn set_backbuffer_count(&mut self, count: u32) {
        self.backbuffer_count = count;
    }

    pub fn vsync(&self) -> bool {
        self.vsync
    }

    /// Change the vsync preference used by the next negotiation.
    pub fn set_vsync(&mut self, vsync: bool) {
        self.vsync = vsync;
    }

    pub fn negotiation(&self) -> Option<&SurfaceNegotiation> {
        self.negotiation.as_ref()
    }

    pub fn sync(&self) -> Option<&SwapchainSync<D>> {
        self.sync.as_ref()
    }

    pub fn swapchain(&self) -> Option<&Swapchain> {
        self.swapchain.as_ref()
    }

    /// Sync slot of the frame being recorded.
    pub fn current_slot(&self) -> Result<&SyncSlot> {
        self.sync
            .as_ref()
            .map(SwapchainSync::current)
            .ok_or_else(|| GpuError::InvalidState("no synchronization objects".into()))
    }

    pub fn current_frame(&self) -> usize {
        self.sync.as_ref().map_or(0, SwapchainSync::current_frame)
    }

    /// Query the surface for format, present mode and extent.
    ///
    /// Valid in `Uninitialized` (moving to `FormatNegotiated`) and while
    /// recreating.
    pub fn negotiate<Q: SurfaceQuery + ?Sized>(
        &mut self,
        surface: &Q,
        physical_device: vk::PhysicalDevice,
        width: u32,
        height: u32,
    ) -> Result<&SurfaceNegotiation> {
        self.phase.require(
            &[SwapchainPhase::Uninitialized, SwapchainPhase::Recreating],
            "negotiate surface format",
        )?;

        let negotiation =
            SurfaceNegotiation::query(surface, physical_device, width, height, self.vsync)?;
        tracing::info!(
            "Surface format {:?} / {:?}, present mode {:?}, images {}..{}",
            negotiation.format.format,
            negotiation.format.color_space,
            negotiation.present_mode,
            negotiation.min_image_count,
            negotiation.max_image_count
        );

        if self.phase == SwapchainPhase::Uninitialized {
            self.phase.transition(SwapchainPhase::FormatNegotiated)?;
        }
        Ok(self.negotiation.insert(negotiation))
    }

    fn negotiated(&self) -> Result<&SurfaceNegotiation> {
        self.negotiation
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("surface format not negotiated".into()))
    }

    /// Validate the backbuffer count and create one sync slot per backbuffer.
    ///
    /// Nothing is created when the count is outside the surface's bounds.
    ///
    /// # Safety
    /// The device must be valid and outlive the manager.
    pub unsafe fn create_sync_objects(
        &mut self,
        device: D,
        separate_present_queue: bool,
    ) -> Result<()> {
        self.phase
            .require(&[SwapchainPhase::FormatNegotiated], "create synchronization objects")?;
        self.negotiated()?.validate(self.backbuffer_count)?;

        let sync =
            unsafe { SwapchainSync::create(device, self.backbuffer_count, separate_present_queue) }?;
        self.sync = Some(sync);
        self.phase.transition(SwapchainPhase::SyncObjectsReady)
    }

    /// Give every swapchain image its own sync slot.
    ///
    /// The driver may create more images than the backbuffer count asked
    /// for. The existing set is kept when it already has `image_count`
    /// slots and the same queue split, otherwise it is rebuilt.
    ///
    /// # Safety
    /// No slot may be in use by the GPU. `make_device` must return a valid
    /// device that outlives the manager.
    pub unsafe fn reconcile_sync_objects<F>(
        &mut self,
        image_count: u32,
        separate_present_queue: bool,
        make_device: F,
    ) -> Result<()>
    where
        F: FnOnce() -> D,
    {
        self.phase.require(
            &[SwapchainPhase::SyncObjectsReady, SwapchainPhase::Recreating],
            "reconcile synchronization objects",
        )?;
        if image_count != self.backbuffer_count {
            tracing::warn!(
                "Driver created {image_count} swapchain images for {} backbuffers",
                self.backbuffer_count
            );
        }

        let sync = unsafe {
            reconcile_sync(
                self.sync.take(),
                image_count,
                separate_present_queue,
                make_device,
            )
        }?;
        self.sync = Some(sync);
        Ok(())
    }

    /// Number of sync slots, one per swapchain image once created.
    pub fn frames_in_flight(&self) -> usize {
        self.sync.as_ref().map_or(0, SwapchainSync::len)
    }

    /// Begin a resize or surface-loss recovery.
    pub fn begin_recreate(&mut self) -> Result<()> {
        self.phase.transition(SwapchainPhase::Recreating)
    }

    /// Move to the next sync slot.
    pub fn advance_frame(&mut self) -> Result<()> {
        self.phase.require(&[SwapchainPhase::Created], "advance frame")?;
        if let Some(sync) = self.sync.as_mut() {
            sync.advance();
        }
        Ok(())
    }

    /// Release the swapchain and every synchronization object.
    ///
    /// The caller must ensure the GPU no longer uses them.
    pub fn destroy(&mut self) {
        if self.phase == SwapchainPhase::Destroyed {
            return;
        }
        self.swapchain = None;
        self.sync = None;
        self.phase = SwapchainPhase::Destroyed;
        tracing::debug!("Swapchain destroyed");
    }
}

impl SwapchainManager<ash::Device> {
    /// Build the swapchain and image views.
    ///
    /// Valid after the sync objects exist or while recreating. During a
    /// recreation the previous swapchain is handed over and released once
    /// the new one exists. The sync set is then sized to the image count.
    pub fn create_swapchain(
        &mut self,
        device: &LogicalDevice,
        surface: &SurfaceContext,
    ) -> Result<()> {
        self.phase.require(
            &[SwapchainPhase::SyncObjectsReady, SwapchainPhase::Recreating],
            "create swapchain",
        )?;
        let negotiation = *self.negotiated()?;

        // SAFETY: the device and surface are live and the old swapchain is idle.
        let swapchain = unsafe {
            Swapchain::new(
                device,
                surface,
                &negotiation,
                self.backbuffer_count,
                self.swapchain.as_ref(),
            )
        }?;

        let image_count = u32::try_from(swapchain.images().len())
            .map_err(|_| GpuError::InvalidState("swapchain image count overflow".into()))?;
        // SAFETY: the device is idle during creation and outlives the manager.
        unsafe {
            self.reconcile_sync_objects(image_count, device.separate_present_queue(), || {
                device.device().clone()
            })
        }?;

        self.swapchain = Some(swapchain);
        self.phase.transition(SwapchainPhase::Created)
    }

    /// Rebuild the swapchain for a new surface size.
    ///
    /// Sync objects are kept when the image count is unchanged.
    pub fn recreate(
        &mut self,
        device: &LogicalDevice,
        surface: &SurfaceContext,
        width: u32,
        height: u32,
    ) -> Result<()> {
        if self.phase == SwapchainPhase::Created {
            self.begin_recreate()?;
        }
        self.phase.require(&[SwapchainPhase::Recreating], "recreate swapchain")?;

        device.wait_idle()?;
        self.negotiate(surface, device.physical_device(), width, height)?;
        self.negotiated()?.validate(self.backbuffer_count)?;
        self.create_swapchain(device, surface)
    }

    /// Wait for the current slot and acquire the next presentable image.
    ///
    /// The slot's fence is reset only once an image has been acquired, so an
    /// out-of-date swapchain leaves the slot ready for the retry.
    pub fn acquire_next_image(&mut self, timeout_ns: u64) -> Result<AcquiredImage> {
        self.phase.require(&[SwapchainPhase::Created], "acquire an image")?;
        let (Some(swapchain), Some(sync)) = (self.swapchain.as_ref(), self.sync.as_ref()) else {
            return Err(GpuError::InvalidState("swapchain resources missing".into()));
        };

        sync.wait_current(timeout_ns)?;

        let result = unsafe {
            swapchain.loader.acquire_next_image(
                swapchain.handle,
                timeout_ns,
                sync.current().image_acquired,
                vk::Fence::null(),
            )
        };
        let (image_index, suboptimal) = match result {
            Ok(acquired) => acquired,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                tracing::debug!("Swapchain out of date on acquire");
                return Err(GpuError::SwapchainOutOfDate);
            }
            Err(e) => {
                tracing::error!("vkAcquireNextImageKHR failed: {e}");
                return Err(e.into());
            }
        };

        sync.reset_current()?;
        Ok(AcquiredImage {
            image_index,
            suboptimal,
        })
    }

    /// Queue `image_index` for presentation.
    ///
    /// Waits on the ownership semaphore with a separate present queue and
    /// on the draw-complete semaphore otherwise. Returns whether the
    /// swapchain is suboptimal.
    pub fn present(&mut self, queue: vk::Queue, image_index: u32) -> Result<bool> {
        self.phase.require(&[SwapchainPhase::Created], "present")?;
        let (Some(swapchain), Some(sync)) = (self.swapchain.as_ref(), self.sync.as_ref()) else {
            return Err(GpuError::InvalidState("swapchain resources missing".into()));
        };

        let wait = [sync.current().present_wait_semaphore()];
        let swapchains = [swapchain.handle];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { swapchain.loader.queue_present(queue, &present_info) } {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                tracing::debug!("Swapchain out of date on present");
                Err(GpuError::SwapchainOutOfDate)
            }
            Err(e) => {
                tracing::error!("vkQueuePresentKHR failed: {e}");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn undefined_sentinel_maps_to_unorm() {
        let formats = [format(
            vk::Format::UNDEFINED,
            vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        )];
        let chosen = negotiate_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT);
    }

    #[test]
    fn srgb_wins_at_any_position() {
        let srgb = format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let unorm = format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT);
        let other = format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::HDR10_ST2084_EXT);

        for formats in [[srgb, unorm, other], [unorm, other, srgb], [other, srgb, unorm]] {
            assert_eq!(negotiate_surface_format(&formats).unwrap(), srgb);
        }
    }

    #[test]
    fn unorm_contributes_color_space_only() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        let chosen = negotiate_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT);
    }

    #[test]
    fn empty_format_list_fails() {
        assert!(matches!(
            negotiate_surface_format(&[]),
            Err(GpuError::NativeApiError(vk::Result::ERROR_FORMAT_NOT_SUPPORTED))
        ));
    }

    #[test]
    fn present_mode_preference() {
        let all = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO,
        ];
        assert_eq!(select_present_mode(&all, true), vk::PresentModeKHR::FIFO);
        assert_eq!(select_present_mode(&all, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            select_present_mode(&all[..1], false),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(select_present_mode(&[], false), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn extent_follows_surface_or_clamps() {
        let mut caps = capabilities(2, 8);
        assert_eq!(
            calculate_extent(&caps, 10_000, 0),
            vk::Extent2D {
                width: 4096,
                height: 1
            }
        );

        caps.current_extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        assert_eq!(calculate_extent(&caps, 1, 1), caps.current_extent);
    }

    #[test]
    fn backbuffer_bounds() {
        assert!(validate_backbuffer_count(3, 2, 8).is_ok());
        assert!(validate_backbuffer_count(2, 2, 2).is_ok());
        assert!(validate_backbuffer_count(64, 2, 0).is_ok());
        assert!(matches!(
            validate_backbuffer_count(2, 3, 0),
            Err(GpuError::UnsupportedBackbufferCount {
                requested: 2,
                min: 3,
                max: 0
            })
        ));
        assert!(matches!(
            validate_backbuffer_count(9, 2, 8),
            Err(GpuError::UnsupportedBackbufferCount { .. })
        ));
    }

    #[test]
    fn phase_transitions() {
        use SwapchainPhase::*;

        let legal = [
            (Uninitialized, FormatNegotiated),
            (FormatNegotiated, SyncObjectsReady),
            (SyncObjectsReady, Created),
            (Created, Recreating),
            (Recreating, Created),
            (Created, Destroyed),
            (Uninitialized, Destroyed),
        ];
        for (from, to) in legal {
            assert!(from.can_transition_to(to), "{from:?} -> {to:?}");
        }

        let illegal = [
            (Uninitialized, Created),
            (FormatNegotiated, Created),
            (SyncObjectsReady, Recreating),
            (Destroyed, Created),
            (Destroyed, Destroyed),
            (Created, FormatNegotiated),
        ];
        for (from, to) in illegal {
            assert!(!from.can_transition_to(to), "{from:?} -> {to:?}");
        }

        let mut phase = Uninitialized;
        assert!(matches!(
            phase.transition(Created),
            Err(GpuError::InvalidState(_))
        ));
        assert_eq!(phase, Uninitialized);
    }

    #[test]
    fn steady_state_needs_a_created_swapchain() {
        let mut manager = SwapchainManager::<ash::Device>::new(3, true);
        assert!(matches!(
            manager.acquire_next_image(0),
            Err(GpuError::InvalidState(_))
        ));
        assert!(matches!(
            manager.present(vk::Queue::null(), 0),
            Err(GpuError::InvalidState(_))
        ));
        assert!(matches!(manager.advance_frame(), Err(GpuError::InvalidState(_))));
        assert!(matches!(manager.begin_recreate(), Err(GpuError::InvalidState(_))));

        manager.destroy();
        assert_eq!(manager.phase(), SwapchainPhase::Destroyed);
    }
}
