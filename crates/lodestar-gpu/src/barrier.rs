//! Image layout transitions and queue-family ownership transfers for
//! swapchain images.
//!
//! With a separate present queue a swapchain image is released by the
//! graphics queue and acquired by the present queue. Both halves use the same
//! layouts and family indices; only the access masks and the recording queue
//! differ.

use ash::vk;

use crate::queue::QueueFamilySelection;
use crate::swapchain::color_subresource_range;

/// Undefined to transfer-destination, ready for a clear or blit.
pub fn clear_transition(image: vk::Image) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_subresource_range())
}

/// Transfer-destination to present, recorded on the graphics queue.
///
/// With separate families this is also the release half of the ownership
/// transfer.
pub fn present_transition(
    image: vk::Image,
    families: &QueueFamilySelection,
) -> vk::ImageMemoryBarrier<'static> {
    let (src_family, dst_family) = transfer_families(families);
    vk::ImageMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .dst_access_mask(vk::AccessFlags::empty())
        .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .src_queue_family_index(src_family)
        .dst_queue_family_index(dst_family)
        .image(image)
        .subresource_range(color_subresource_range())
}

/// Acquire half of the ownership transfer, recorded on the present queue.
///
/// Returns `None` when graphics and present share a family.
pub fn ownership_acquire(
    image: vk::Image,
    families: &QueueFamilySelection,
) -> Option<vk::ImageMemoryBarrier<'static>> {
    if !families.separate_present_queue {
        return None;
    }

    Some(
        vk::ImageMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::empty())
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .src_queue_family_index(families.graphics)
            .dst_queue_family_index(families.present)
            .image(image)
            .subresource_range(color_subresource_range()),
    )
}

fn transfer_families(families: &QueueFamilySelection) -> (u32, u32) {
    if families.separate_present_queue {
        (families.graphics, families.present)
    } else {
        (vk::QUEUE_FAMILY_IGNORED, vk::QUEUE_FAMILY_IGNORED)
    }
}

/// Record a single image barrier.
///
/// # Safety
/// The command buffer must be recording and belong to `device`.
pub unsafe fn record_image_barrier(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    src_stage: vk::PipelineStageFlags,
    dst_stage: vk::PipelineStageFlags,
    barrier: &vk::ImageMemoryBarrier<'_>,
) {
    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            std::slice::from_ref(barrier),
        );
    }
}
