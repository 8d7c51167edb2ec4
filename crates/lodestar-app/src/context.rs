//! Application context.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use ash::vk;
use lodestar_gpu::barrier::{
    clear_transition, ownership_acquire, present_transition, record_image_barrier,
};
use lodestar_gpu::command::submit_command_buffers;
use lodestar_gpu::{CommandBufferId, CommandDevice, CommandPool, GpuContext, GpuError};
use winit::window::Window;

use crate::frame::FrameContext;

/// Per-slot command buffers.
///
/// Graphics buffers live in the GPU context's pool. With a separate present
/// queue a second pool on the present family holds the buffers that acquire
/// image ownership.
pub(crate) struct FrameCommands<D: CommandDevice = ash::Device> {
    present_pool: Option<CommandPool<D>>,
    present: Vec<CommandBufferId>,
    graphics: Vec<CommandBufferId>,
}

impl<D: CommandDevice> FrameCommands<D> {
    pub(crate) fn new(present_pool: Option<CommandPool<D>>) -> Self {
        Self {
            present_pool,
            present: Vec::new(),
            graphics: Vec::new(),
        }
    }

    /// Allocate buffers until each of `slots` sync slots has one.
    ///
    /// The slot count only changes across a swapchain recreation; buffers
    /// for slots that disappear stay allocated and unused.
    pub(crate) fn ensure_slots(
        &mut self,
        graphics_pool: &mut CommandPool<D>,
        slots: usize,
    ) -> anyhow::Result<()> {
        let missing = slots.saturating_sub(self.graphics.len());
        if missing == 0 {
            return Ok(());
        }
        let missing = u32::try_from(missing)?;

        let graphics = graphics_pool.allocate_primary(missing)?;
        self.graphics.extend(graphics);
        if let Some(pool) = self.present_pool.as_mut() {
            let present = pool.allocate_primary(missing)?;
            self.present.extend(present);
        }
        tracing::debug!("Per-frame command buffers: {}", self.graphics.len());
        Ok(())
    }

    pub(crate) fn graphics(&self, slot: usize) -> anyhow::Result<CommandBufferId> {
        self.graphics
            .get(slot)
            .copied()
            .with_context(|| format!("no command buffer for frame slot {slot}"))
    }

    /// Present-family pool and the buffer for `slot`.
    pub(crate) fn present(
        &mut self,
        slot: usize,
    ) -> anyhow::Result<(&mut CommandPool<D>, CommandBufferId)> {
        let id = self
            .present
            .get(slot)
            .copied()
            .with_context(|| format!("no present command buffer for frame slot {slot}"))?;
        let pool = self
            .present_pool
            .as_mut()
            .context("present command pool missing")?;
        Ok((pool, id))
    }
}

/// Outcome of one trip through acquire, record, submit and present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameOutcome {
    Presented,
    /// The swapchain no longer matches the window and must be rebuilt.
    NeedsRecreate,
}

/// Application context shared across all app methods.
///
/// Fields are declared in teardown order: frame command buffers first, then
/// the GPU context, and the window last since the surface refers to it.
pub struct AppContext {
    pub(crate) frames: FrameCommands,
    /// GPU context with device, queues and swapchain.
    pub gpu: GpuContext,
    /// The window handle.
    pub window: Arc<Window>,
    /// Total frames presented.
    pub frame_count: u64,
    pub(crate) last_frame_time: Instant,
}

impl AppContext {
    pub(crate) fn new(window: Arc<Window>, mut gpu: GpuContext) -> anyhow::Result<Self> {
        let families = gpu.logical_device().families();
        let present_pool = if families.separate_present_queue {
            // SAFETY: the present family exists on this device.
            Some(unsafe { CommandPool::new(gpu.device().clone(), families.present) }?)
        } else {
            None
        };

        // Nothing was recorded during setup; flushing still proves the
        // graphics queue works before the first frame
        gpu.submit_setup_commands()
            .context("Failed to flush setup commands")?;

        let mut ctx = Self {
            frames: FrameCommands::new(present_pool),
            gpu,
            window,
            frame_count: 0,
            last_frame_time: Instant::now(),
        };
        ctx.ensure_frame_commands()?;
        Ok(ctx)
    }

    fn ensure_frame_commands(&mut self) -> anyhow::Result<()> {
        let slots = self.gpu.swapchain().frames_in_flight();
        self.frames.ensure_slots(self.gpu.command_pool_mut(), slots)
    }

    /// Get the current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.gpu
            .swapchain()
            .swapchain()
            .map_or(vk::Extent2D::default(), |swapchain| swapchain.extent())
    }

    /// Get the swapchain width.
    pub fn width(&self) -> u32 {
        self.extent().width
    }

    /// Get the swapchain height.
    pub fn height(&self) -> u32 {
        self.extent().height
    }

    /// Number of frames that may be in flight.
    pub fn frames_in_flight(&self) -> usize {
        self.gpu.swapchain().frames_in_flight()
    }

    /// Acquire an image, let `record` fill it, then submit and present.
    pub(crate) fn run_frame<F>(&mut self, dt: f32, record: F) -> anyhow::Result<FrameOutcome>
    where
        F: FnOnce(&Self, &mut FrameContext) -> anyhow::Result<()>,
    {
        let acquired = match self.gpu.swapchain_mut().acquire_next_image(u64::MAX) {
            Ok(acquired) => acquired,
            Err(GpuError::SwapchainOutOfDate) => return Ok(FrameOutcome::NeedsRecreate),
            Err(e) => return Err(e.into()),
        };

        let slot_index = self.gpu.swapchain().current_frame();
        let slot = *self.gpu.swapchain().current_slot()?;
        let swapchain = self
            .gpu
            .swapchain()
            .swapchain()
            .context("swapchain missing after acquire")?;
        let image = *swapchain
            .images()
            .get(acquired.image_index as usize)
            .context("acquired image index out of range")?;
        let extent = swapchain.extent();
        let families = self.gpu.logical_device().families();

        // Record on the graphics queue
        let graphics_id = self.frames.graphics(slot_index)?;
        let cmd = self.gpu.command_pool().command_buffer(graphics_id)?;
        self.gpu
            .command_pool_mut()
            .begin(graphics_id, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        // SAFETY: `cmd` is recording and belongs to this device.
        unsafe {
            record_image_barrier(
                self.gpu.device(),
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::TRANSFER,
                &clear_transition(image),
            );
        }

        let mut frame = FrameContext::new(
            cmd,
            acquired.image_index,
            image,
            extent,
            dt,
            self.frame_count,
            slot_index,
        );
        record(self, &mut frame)?;

        unsafe {
            record_image_barrier(
                self.gpu.device(),
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                &present_transition(image, &families),
            );
        }
        self.gpu.command_pool_mut().end(graphics_id)?;

        // With a separate present queue the slot fence is signaled by the
        // ownership submission, which itself waits for the graphics work
        let graphics_fence = if families.separate_present_queue {
            vk::Fence::null()
        } else {
            slot.fence
        };
        unsafe {
            submit_command_buffers(
                self.gpu.device(),
                self.gpu.graphics_queue(),
                &[cmd],
                &[slot.image_acquired],
                &[vk::PipelineStageFlags::TRANSFER],
                &[slot.draw_complete],
                graphics_fence,
            )
        }?;

        if let (Some(barrier), Some(ownership)) =
            (ownership_acquire(image, &families), slot.image_ownership)
        {
            self.submit_ownership_acquire(
                slot_index,
                &barrier,
                slot.draw_complete,
                ownership,
                slot.fence,
            )?;
        }

        let present_queue = self.gpu.present_queue();
        let outcome = match self
            .gpu
            .swapchain_mut()
            .present(present_queue, acquired.image_index)
        {
            Ok(suboptimal) if suboptimal || acquired.suboptimal => FrameOutcome::NeedsRecreate,
            Ok(_) => FrameOutcome::Presented,
            Err(GpuError::SwapchainOutOfDate) => FrameOutcome::NeedsRecreate,
            Err(e) => return Err(e.into()),
        };

        self.gpu.swapchain_mut().advance_frame()?;
        self.frame_count += 1;
        Ok(outcome)
    }

    fn submit_ownership_acquire(
        &mut self,
        slot_index: usize,
        barrier: &vk::ImageMemoryBarrier<'_>,
        draw_complete: vk::Semaphore,
        ownership: vk::Semaphore,
        fence: vk::Fence,
    ) -> anyhow::Result<()> {
        let (pool, id) = self.frames.present(slot_index)?;
        let cmd = pool.command_buffer(id)?;

        pool.begin(id, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        // SAFETY: `cmd` is recording on the present family.
        unsafe {
            record_image_barrier(
                self.gpu.device(),
                cmd,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                barrier,
            );
        }
        pool.end(id)?;

        unsafe {
            submit_command_buffers(
                self.gpu.device(),
                self.gpu.present_queue(),
                &[cmd],
                &[draw_complete],
                &[vk::PipelineStageFlags::ALL_COMMANDS],
                &[ownership],
                fence,
            )
        }?;
        Ok(())
    }

    /// Rebuild the swapchain after a resize or surface loss.
    pub(crate) fn recreate_swapchain(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        self.gpu.recreate_swapchain(width, height)?;
        self.ensure_frame_commands()?;
        tracing::info!("Swapchain recreated: {}x{}", self.width(), self.height());
        Ok(())
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        // Per-frame pools are released before the GPU context waits idle
        if let Err(e) = self.gpu.wait_idle() {
            tracing::warn!("Failed to wait idle before releasing frame commands: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::prelude::VkResult;
    use ash::vk::Handle;
    use std::cell::Cell;

    #[derive(Default)]
    struct FakeDevice {
        next_handle: Cell<u64>,
    }

    impl CommandDevice for FakeDevice {
        unsafe fn create_pool(&self, _queue_family: u32) -> VkResult<vk::CommandPool> {
            Ok(vk::CommandPool::from_raw(1))
        }

        unsafe fn allocate_buffers(
            &self,
            _pool: vk::CommandPool,
            count: u32,
        ) -> VkResult<Vec<vk::CommandBuffer>> {
            Ok((0..count)
                .map(|_| {
                    self.next_handle.set(self.next_handle.get() + 1);
                    vk::CommandBuffer::from_raw(self.next_handle.get())
                })
                .collect())
        }

        unsafe fn begin_buffer(
            &self,
            _command_buffer: vk::CommandBuffer,
            _flags: vk::CommandBufferUsageFlags,
        ) -> VkResult<()> {
            Ok(())
        }

        unsafe fn end_buffer(&self, _command_buffer: vk::CommandBuffer) -> VkResult<()> {
            Ok(())
        }

        unsafe fn submit_and_wait(
            &self,
            _queue: vk::Queue,
            _command_buffer: vk::CommandBuffer,
        ) -> VkResult<()> {
            Ok(())
        }

        unsafe fn free_buffers(&self, _pool: vk::CommandPool, _command_buffers: &[vk::CommandBuffer]) {}

        unsafe fn destroy_pool(&self, _pool: vk::CommandPool) {}
    }

    #[test]
    fn slots_beyond_the_allocation_are_errors() {
        let device = FakeDevice::default();
        let mut graphics_pool = unsafe { CommandPool::new(&device, 0) }.unwrap();
        let mut frames = FrameCommands::new(None);

        frames.ensure_slots(&mut graphics_pool, 3).unwrap();
        assert!(frames.graphics(2).is_ok());
        assert!(frames.graphics(3).is_err());
        assert!(frames.present(0).is_err());
    }

    #[test]
    fn growing_slot_count_allocates_the_difference() {
        let device = FakeDevice::default();
        let mut graphics_pool = unsafe { CommandPool::new(&device, 0) }.unwrap();
        let present_pool = unsafe { CommandPool::new(&device, 2) }.unwrap();
        let mut frames = FrameCommands::new(Some(present_pool));

        frames.ensure_slots(&mut graphics_pool, 3).unwrap();
        let first = frames.graphics(0).unwrap();
        frames.ensure_slots(&mut graphics_pool, 4).unwrap();
        assert_eq!(graphics_pool.len(), 4);
        assert_eq!(frames.graphics(0).unwrap(), first);
        assert!(frames.graphics(3).is_ok());

        let (pool, _) = frames.present(3).unwrap();
        assert_eq!(pool.queue_family(), 2);
        assert_eq!(pool.len(), 4);

        // Shrinking keeps what is already allocated
        frames.ensure_slots(&mut graphics_pool, 2).unwrap();
        assert_eq!(graphics_pool.len(), 4);
    }
}
