//! Command pools and recording state.

use ash::prelude::VkResult;
use ash::vk;

use crate::error::{GpuError, Result};

/// Handle to a command buffer owned by a [`CommandPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandBufferId(usize);

/// A command buffer together with its recording state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandBufferRecord {
    handle: vk::CommandBuffer,
    recording: bool,
}

impl CommandBufferRecord {
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    /// Whether `begin` has been called without a matching `end`.
    pub fn is_recording(&self) -> bool {
        self.recording
    }
}

/// Device operations needed to manage a command pool.
///
/// Implemented for [`ash::Device`]; other implementations let the
/// recording bookkeeping run without a GPU.
pub trait CommandDevice {
    /// # Safety
    /// The device must be valid and the queue family must exist.
    unsafe fn create_pool(&self, queue_family: u32) -> VkResult<vk::CommandPool>;

    /// # Safety
    /// The pool must have been created by this device.
    unsafe fn allocate_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>>;

    /// Reset the buffer and begin recording.
    ///
    /// # Safety
    /// The buffer must not be recording or pending.
    unsafe fn begin_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> VkResult<()>;

    /// # Safety
    /// The buffer must be recording.
    unsafe fn end_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()>;

    /// Submit one buffer and wait for `queue` to drain.
    ///
    /// # Safety
    /// The buffer must be executable and the queue must belong to this device.
    unsafe fn submit_and_wait(
        &self,
        queue: vk::Queue,
        command_buffer: vk::CommandBuffer,
    ) -> VkResult<()>;

    /// # Safety
    /// The buffers must belong to `pool` and not be pending.
    unsafe fn free_buffers(&self, pool: vk::CommandPool, command_buffers: &[vk::CommandBuffer]);

    /// # Safety
    /// No buffer of the pool may be pending.
    unsafe fn destroy_pool(&self, pool: vk::CommandPool);
}

impl CommandDevice for ash::Device {
    unsafe fn create_pool(&self, queue_family: u32) -> VkResult<vk::CommandPool> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        unsafe { self.create_command_pool(&create_info, None) }
    }

    unsafe fn allocate_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        unsafe { self.allocate_command_buffers(&alloc_info) }
    }

    unsafe fn begin_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> VkResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
        unsafe {
            self.reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())?;
            self.begin_command_buffer(command_buffer, &begin_info)
        }
    }

    unsafe fn end_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.end_command_buffer(command_buffer) }
    }

    unsafe fn submit_and_wait(
        &self,
        queue: vk::Queue,
        command_buffer: vk::CommandBuffer,
    ) -> VkResult<()> {
        let handles = [command_buffer];
        let submit_info = vk::SubmitInfo::default().command_buffers(&handles);
        unsafe {
            self.queue_submit(queue, &[submit_info], vk::Fence::null())?;
            self.queue_wait_idle(queue)
        }
    }

    unsafe fn free_buffers(&self, pool: vk::CommandPool, command_buffers: &[vk::CommandBuffer]) {
        unsafe { self.free_command_buffers(pool, command_buffers) };
    }

    unsafe fn destroy_pool(&self, pool: vk::CommandPool) {
        unsafe { self.destroy_command_pool(pool, None) };
    }
}

impl<T: CommandDevice + ?Sized> CommandDevice for &T {
    unsafe fn create_pool(&self, queue_family: u32) -> VkResult<vk::CommandPool> {
        unsafe { (**self).create_pool(queue_family) }
    }

    unsafe fn allocate_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        unsafe { (**self).allocate_buffers(pool, count) }
    }

    unsafe fn begin_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> VkResult<()> {
        unsafe { (**self).begin_buffer(command_buffer, flags) }
    }

    unsafe fn end_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        unsafe { (**self).end_buffer(command_buffer) }
    }

    unsafe fn submit_and_wait(
        &self,
        queue: vk::Queue,
        command_buffer: vk::CommandBuffer,
    ) -> VkResult<()> {
        unsafe { (**self).submit_and_wait(queue, command_buffer) }
    }

    unsafe fn free_buffers(&self, pool: vk::CommandPool, command_buffers: &[vk::CommandBuffer]) {
        unsafe { (**self).free_buffers(pool, command_buffers) };
    }

    unsafe fn destroy_pool(&self, pool: vk::CommandPool) {
        unsafe { (**self).destroy_pool(pool) };
    }
}

/// Command pool owning every buffer allocated from it.
///
/// Buffers still recording when the pool is dropped are ended before they
/// are freed.
pub struct CommandPool<D: CommandDevice = ash::Device> {
    device: D,
    pool: vk::CommandPool,
    queue_family: u32,
    buffers: Vec<CommandBufferRecord>,
}

impl<D: CommandDevice> CommandPool<D> {
    /// Create a pool whose buffers can be reset individually.
    ///
    /// # Safety
    /// The device must be valid, outlive the pool, and own the queue family.
    pub unsafe fn new(device: D, queue_family: u32) -> Result<Self> {
        let pool = unsafe { device.create_pool(queue_family) }.map_err(|e| {
            tracing::error!("vkCreateCommandPool failed for family {queue_family}: {e}");
            GpuError::from(e)
        })?;

        Ok(Self {
            device,
            pool,
            queue_family,
            buffers: Vec::new(),
        })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Get the queue family index.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Number of buffers allocated so far.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Allocate primary command buffers.
    pub fn allocate_primary(&mut self, count: u32) -> Result<Vec<CommandBufferId>> {
        let handles = unsafe { self.device.allocate_buffers(self.pool, count) }.map_err(|e| {
            tracing::error!("vkAllocateCommandBuffers failed: {e}");
            GpuError::from(e)
        })?;

        let first = self.buffers.len();
        self.buffers
            .extend(handles.into_iter().map(|handle| CommandBufferRecord {
                handle,
                recording: false,
            }));
        Ok((first..self.buffers.len()).map(CommandBufferId).collect())
    }

    /// Recording state of a buffer.
    pub fn record(&self, id: CommandBufferId) -> Result<&CommandBufferRecord> {
        self.buffers
            .get(id.0)
            .ok_or_else(|| GpuError::InvalidState(format!("unknown command buffer {}", id.0)))
    }

    fn record_mut(&mut self, id: CommandBufferId) -> Result<&mut CommandBufferRecord> {
        self.buffers
            .get_mut(id.0)
            .ok_or_else(|| GpuError::InvalidState(format!("unknown command buffer {}", id.0)))
    }

    /// Raw handle of a buffer.
    pub fn command_buffer(&self, id: CommandBufferId) -> Result<vk::CommandBuffer> {
        self.record(id).map(CommandBufferRecord::handle)
    }

    /// Reset and begin recording.
    pub fn begin(&mut self, id: CommandBufferId, flags: vk::CommandBufferUsageFlags) -> Result<()> {
        let record = *self.record(id)?;
        if record.recording {
            return Err(GpuError::InvalidState(format!(
                "command buffer {} is already recording",
                id.0
            )));
        }

        unsafe { self.device.begin_buffer(record.handle, flags) }?;
        self.record_mut(id)?.recording = true;
        Ok(())
    }

    /// End recording.
    pub fn end(&mut self, id: CommandBufferId) -> Result<()> {
        let record = self.record_mut(id)?;
        if !record.recording {
            return Err(GpuError::InvalidState(format!(
                "command buffer {} is not recording",
                id.0
            )));
        }

        // The buffer leaves the recording state even if ending fails
        record.recording = false;
        let handle = record.handle;
        unsafe { self.device.end_buffer(handle) }?;
        Ok(())
    }

    /// Flush setup-time work recorded into `id`.
    ///
    /// Ends the buffer, submits it on `queue`, waits for the queue to drain
    /// and begins the buffer again so further setup commands can follow.
    pub fn submit_setup_commands(&mut self, id: CommandBufferId, queue: vk::Queue) -> Result<()> {
        self.end(id)?;

        let handle = self.command_buffer(id)?;
        unsafe { self.device.submit_and_wait(queue, handle) }.map_err(|e| {
            tracing::error!("Setup command submission failed: {e}");
            GpuError::from(e)
        })?;

        self.begin(id, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
    }
}

impl<D: CommandDevice> Drop for CommandPool<D> {
    fn drop(&mut self) {
        unsafe {
            for record in &mut self.buffers {
                if record.recording {
                    let _ = self.device.end_buffer(record.handle);
                    record.recording = false;
                }
            }

            let handles: Vec<_> = self.buffers.iter().map(|record| record.handle).collect();
            if !handles.is_empty() {
                self.device.free_buffers(self.pool, &handles);
            }
            self.device.destroy_pool(self.pool);
        }
    }
}

/// Submit command buffers to a queue.
///
/// # Safety
/// All handles must be valid.
pub unsafe fn submit_command_buffers(
    device: &ash::Device,
    queue: vk::Queue,
    command_buffers: &[vk::CommandBuffer],
    wait_semaphores: &[vk::Semaphore],
    wait_stages: &[vk::PipelineStageFlags],
    signal_semaphores: &[vk::Semaphore],
    fence: vk::Fence,
) -> Result<()> {
    let submit_info = vk::SubmitInfo::default()
        .command_buffers(command_buffers)
        .wait_semaphores(wait_semaphores)
        .wait_dst_stage_mask(wait_stages)
        .signal_semaphores(signal_semaphores);

    unsafe { device.queue_submit(queue, &[submit_info], fence) }?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use std::cell::{Cell, RefCell};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Begin(u64),
        End(u64),
        Submit(u64),
        Free(Vec<u64>),
        DestroyPool,
    }

    #[derive(Default)]
    struct FakeDevice {
        next_handle: Cell<u64>,
        calls: RefCell<Vec<Call>>,
    }

    impl FakeDevice {
        fn next(&self) -> u64 {
            let raw = self.next_handle.get() + 1;
            self.next_handle.set(raw);
            raw
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.borrow().clone()
        }

        fn position(&self, call: &Call) -> usize {
            self.calls()
                .iter()
                .position(|c| c == call)
                .unwrap_or_else(|| panic!("{call:?} never happened"))
        }
    }

    impl CommandDevice for FakeDevice {
        unsafe fn create_pool(&self, _queue_family: u32) -> VkResult<vk::CommandPool> {
            Ok(vk::CommandPool::from_raw(self.next()))
        }

        unsafe fn allocate_buffers(
            &self,
            _pool: vk::CommandPool,
            count: u32,
        ) -> VkResult<Vec<vk::CommandBuffer>> {
            Ok((0..count)
                .map(|_| vk::CommandBuffer::from_raw(self.next()))
                .collect())
        }

        unsafe fn begin_buffer(
            &self,
            command_buffer: vk::CommandBuffer,
            _flags: vk::CommandBufferUsageFlags,
        ) -> VkResult<()> {
            self.calls.borrow_mut().push(Call::Begin(command_buffer.as_raw()));
            Ok(())
        }

        unsafe fn end_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
            self.calls.borrow_mut().push(Call::End(command_buffer.as_raw()));
            Ok(())
        }

        unsafe fn submit_and_wait(
            &self,
            _queue: vk::Queue,
            command_buffer: vk::CommandBuffer,
        ) -> VkResult<()> {
            self.calls.borrow_mut().push(Call::Submit(command_buffer.as_raw()));
            Ok(())
        }

        unsafe fn free_buffers(&self, _pool: vk::CommandPool, command_buffers: &[vk::CommandBuffer]) {
            let raw = command_buffers.iter().map(|cmd| cmd.as_raw()).collect();
            self.calls.borrow_mut().push(Call::Free(raw));
        }

        unsafe fn destroy_pool(&self, _pool: vk::CommandPool) {
            self.calls.borrow_mut().push(Call::DestroyPool);
        }
    }

    #[test]
    fn setup_flush_reopens_the_buffer() {
        let device = FakeDevice::default();
        let mut pool = unsafe { CommandPool::new(&device, 0) }.unwrap();
        let setup = pool.allocate_primary(1).unwrap()[0];
        let raw = pool.command_buffer(setup).unwrap().as_raw();

        pool.begin(setup, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
            .unwrap();
        pool.submit_setup_commands(setup, vk::Queue::null()).unwrap();

        assert_eq!(
            device.calls(),
            [
                Call::Begin(raw),
                Call::End(raw),
                Call::Submit(raw),
                Call::Begin(raw)
            ]
        );
        assert!(pool.record(setup).unwrap().is_recording());
    }

    #[test]
    fn open_recordings_end_before_buffers_are_freed() {
        let device = FakeDevice::default();
        let (recording, idle) = {
            let mut pool = unsafe { CommandPool::new(&device, 0) }.unwrap();
            let ids = pool.allocate_primary(2).unwrap();
            pool.begin(ids[0], vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
                .unwrap();
            (
                pool.command_buffer(ids[0]).unwrap().as_raw(),
                pool.command_buffer(ids[1]).unwrap().as_raw(),
            )
        };

        let end = device.position(&Call::End(recording));
        let free = device.position(&Call::Free(vec![recording, idle]));
        let destroy = device.position(&Call::DestroyPool);
        assert!(end < free && free < destroy);
        // Only the recording buffer is ended
        assert!(!device.calls().contains(&Call::End(idle)));
    }

    #[test]
    fn recording_state_is_enforced() {
        let device = FakeDevice::default();
        let mut pool = unsafe { CommandPool::new(&device, 0) }.unwrap();
        let id = pool.allocate_primary(1).unwrap()[0];

        assert!(matches!(pool.end(id), Err(GpuError::InvalidState(_))));
        pool.begin(id, vk::CommandBufferUsageFlags::empty()).unwrap();
        assert!(matches!(
            pool.begin(id, vk::CommandBufferUsageFlags::empty()),
            Err(GpuError::InvalidState(_))
        ));
        pool.end(id).unwrap();
        assert!(!pool.record(id).unwrap().is_recording());
        assert!(matches!(
            pool.command_buffer(CommandBufferId(7)),
            Err(GpuError::InvalidState(_))
        ));
    }
}
