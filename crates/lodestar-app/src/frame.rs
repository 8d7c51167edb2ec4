//! Per-frame context for rendering.

use ash::vk;

/// Context for the current frame being rendered.
pub struct FrameContext {
    /// Command buffer for recording rendering commands.
    pub command_buffer: vk::CommandBuffer,
    /// Index of the acquired swapchain image.
    pub image_index: u32,
    /// The swapchain image for this frame.
    pub swapchain_image: vk::Image,
    pub extent: vk::Extent2D,
    /// Delta time since last frame in seconds.
    pub dt: f32,
    /// Current frame number.
    pub frame_number: u64,
    /// Synchronization slot in use.
    pub frame_slot: usize,
}

impl FrameContext {
    pub(crate) fn new(
        command_buffer: vk::CommandBuffer,
        image_index: u32,
        swapchain_image: vk::Image,
        extent: vk::Extent2D,
        dt: f32,
        frame_number: u64,
        frame_slot: usize,
    ) -> Self {
        Self {
            command_buffer,
            image_index,
            swapchain_image,
            extent,
            dt,
            frame_number,
            frame_slot,
        }
    }
}
