//! Per-backbuffer synchronization primitives.

use ash::prelude::VkResult;
use ash::vk;

use crate::error::{GpuError, Result};

/// Device operations needed to manage fences and semaphores.
///
/// Implemented for [`ash::Device`]; other implementations let the
/// synchronization bookkeeping run without a GPU.
pub trait SyncDevice {
    /// # Safety
    /// The device must be valid.
    unsafe fn create_fence_object(&self, signaled: bool) -> VkResult<vk::Fence>;

    /// # Safety
    /// The device must be valid.
    unsafe fn create_semaphore_object(&self) -> VkResult<vk::Semaphore>;

    /// # Safety
    /// The fence must have been created by this device and not be in use.
    unsafe fn destroy_fence_object(&self, fence: vk::Fence);

    /// # Safety
    /// The semaphore must have been created by this device and not be in use.
    unsafe fn destroy_semaphore_object(&self, semaphore: vk::Semaphore);

    /// # Safety
    /// The fence must have been created by this device.
    unsafe fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()>;

    /// # Safety
    /// The fence must have been created by this device and not be pending.
    unsafe fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;
}

impl SyncDevice for ash::Device {
    unsafe fn create_fence_object(&self, signaled: bool) -> VkResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        unsafe { self.create_fence(&create_info, None) }
    }

    unsafe fn create_semaphore_object(&self) -> VkResult<vk::Semaphore> {
        let create_info = vk::SemaphoreCreateInfo::default();
        unsafe { self.create_semaphore(&create_info, None) }
    }

    unsafe fn destroy_fence_object(&self, fence: vk::Fence) {
        unsafe { self.destroy_fence(fence, None) };
    }

    unsafe fn destroy_semaphore_object(&self, semaphore: vk::Semaphore) {
        unsafe { self.destroy_semaphore(semaphore, None) };
    }

    unsafe fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        unsafe { self.wait_for_fences(&[fence], true, timeout_ns) }
    }

    unsafe fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.reset_fences(&[fence]) }
    }
}

impl<T: SyncDevice + ?Sized> SyncDevice for &T {
    unsafe fn create_fence_object(&self, signaled: bool) -> VkResult<vk::Fence> {
        unsafe { (**self).create_fence_object(signaled) }
    }

    unsafe fn create_semaphore_object(&self) -> VkResult<vk::Semaphore> {
        unsafe { (**self).create_semaphore_object() }
    }

    unsafe fn destroy_fence_object(&self, fence: vk::Fence) {
        unsafe { (**self).destroy_fence_object(fence) };
    }

    unsafe fn destroy_semaphore_object(&self, semaphore: vk::Semaphore) {
        unsafe { (**self).destroy_semaphore_object(semaphore) };
    }

    unsafe fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        unsafe { (**self).wait_for_fence(fence, timeout_ns) }
    }

    unsafe fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { (**self).reset_fence(fence) }
    }
}

/// Synchronization set for one backbuffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSlot {
    /// Signaled when the GPU has finished with this slot. Created signaled.
    pub fence: vk::Fence,
    /// Signaled when the presentation engine hands the image over.
    pub image_acquired: vk::Semaphore,
    /// Signaled when rendering into the image has finished.
    pub draw_complete: vk::Semaphore,
    /// Signaled when the present queue has taken ownership of the image.
    /// Only present with a separate present queue.
    pub image_ownership: Option<vk::Semaphore>,
}

impl SyncSlot {
    /// Semaphore `present` must wait on.
    pub fn present_wait_semaphore(&self) -> vk::Semaphore {
        self.image_ownership.unwrap_or(self.draw_complete)
    }

    /// Number of native objects held by this slot.
    pub fn object_count(&self) -> usize {
        [
            self.fence != vk::Fence::null(),
            self.image_acquired != vk::Semaphore::null(),
            self.draw_complete != vk::Semaphore::null(),
            self.image_ownership.is_some_and(|s| s != vk::Semaphore::null()),
        ]
        .into_iter()
        .filter(|live| *live)
        .count()
    }
}

/// Release whatever part of a slot was created. Null handles are skipped.
unsafe fn release_slot<D: SyncDevice>(device: &D, slot: &SyncSlot) {
    unsafe {
        if slot.fence != vk::Fence::null() {
            device.destroy_fence_object(slot.fence);
        }
        for semaphore in [
            Some(slot.image_acquired),
            Some(slot.draw_complete),
            slot.image_ownership,
        ]
        .into_iter()
        .flatten()
        {
            if semaphore != vk::Semaphore::null() {
                device.destroy_semaphore_object(semaphore);
            }
        }
    }
}

unsafe fn create_slot<D: SyncDevice>(device: &D, slot: u32, separate: bool) -> Result<SyncSlot> {
    let fail = |what: &'static str| {
        move |result: vk::Result| {
            tracing::error!("Failed to create {what} for backbuffer {slot}: {result}");
            GpuError::SyncObjectCreationFailed { slot, what, result }
        }
    };

    let mut built = SyncSlot::default();
    let outcome: Result<()> = (|| unsafe {
        built.fence = device.create_fence_object(true).map_err(fail("fence"))?;
        built.image_acquired = device
            .create_semaphore_object()
            .map_err(fail("image-acquired semaphore"))?;
        built.draw_complete = device
            .create_semaphore_object()
            .map_err(fail("draw-complete semaphore"))?;
        if separate {
            built.image_ownership = Some(
                device
                    .create_semaphore_object()
                    .map_err(fail("image-ownership semaphore"))?,
            );
        }
        Ok(())
    })();

    match outcome {
        Ok(()) => Ok(built),
        Err(err) => {
            unsafe { release_slot(device, &built) };
            Err(err)
        }
    }
}

/// Fences and semaphores for every backbuffer, plus the frame cursor.
///
/// Dropping the set destroys every primitive it created.
pub struct SwapchainSync<D: SyncDevice = ash::Device> {
    device: D,
    slots: Vec<SyncSlot>,
    current_frame: usize,
    separate_present_queue: bool,
}

impl<D: SyncDevice> SwapchainSync<D> {
    /// Create `count` slots.
    ///
    /// Fences start signaled so the first wait on each slot returns at once.
    /// On failure every primitive created so far is released.
    ///
    /// # Safety
    /// The device must be valid and outlive the returned set.
    pub unsafe fn create(device: D, count: u32, separate_present_queue: bool) -> Result<Self> {
        let mut sync = Self {
            device,
            slots: Vec::with_capacity(count as usize),
            current_frame: 0,
            separate_present_queue,
        };

        for slot in 0..count {
            // An early return drops `sync`, releasing the completed slots
            let created = unsafe { create_slot(&sync.device, slot, separate_present_queue) }?;
            sync.slots.push(created);
        }

        tracing::debug!(
            "Created synchronization objects for {count} backbuffers (ownership semaphores: {separate_present_queue})"
        );
        Ok(sync)
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Number of backbuffer slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[SyncSlot] {
        &self.slots
    }

    pub fn separate_present_queue(&self) -> bool {
        self.separate_present_queue
    }

    /// Total number of native objects owned.
    pub fn object_count(&self) -> usize {
        self.slots.iter().map(SyncSlot::object_count).sum()
    }

    /// Get the current frame's sync resources.
    pub fn current(&self) -> &SyncSlot {
        &self.slots[self.current_frame]
    }

    /// Get the current frame index.
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Advance to the next frame.
    pub fn advance(&mut self) {
        if !self.slots.is_empty() {
            self.current_frame = (self.current_frame + 1) % self.slots.len();
        }
    }

    /// Block until the GPU is done with the current slot.
    pub fn wait_current(&self, timeout_ns: u64) -> Result<()> {
        let fence = self.current().fence;
        unsafe { self.device.wait_for_fence(fence, timeout_ns) }?;
        Ok(())
    }

    /// Unsignal the current slot's fence ahead of a submission.
    pub fn reset_current(&self) -> Result<()> {
        let fence = self.current().fence;
        unsafe { self.device.reset_fence(fence) }?;
        Ok(())
    }
}

impl<D: SyncDevice> Drop for SwapchainSync<D> {
    fn drop(&mut self) {
        for slot in self.slots.drain(..) {
            unsafe { release_slot(&self.device, &slot) };
        }
    }
}

/// Keep `existing` when it already has `count` slots, otherwise build a new
/// set with `make_device`.
///
/// The old set is released before its replacement is created.
///
/// # Safety
/// Same requirements as [`SwapchainSync::create`]; no slot of `existing` may
/// still be in use by the GPU.
pub unsafe fn reconcile_sync<D, F>(
    existing: Option<SwapchainSync<D>>,
    count: u32,
    separate_present_queue: bool,
    make_device: F,
) -> Result<SwapchainSync<D>>
where
    D: SyncDevice,
    F: FnOnce() -> D,
{
    if let Some(mut sync) = existing {
        if sync.len() == count as usize && sync.separate_present_queue == separate_present_queue {
            tracing::debug!("Backbuffer count unchanged ({count}), keeping synchronization objects");
            sync.current_frame = 0;
            return Ok(sync);
        }
        tracing::debug!(
            "Backbuffer count changed from {} to {count}, rebuilding synchronization objects",
            sync.len()
        );
        drop(sync);
    }

    unsafe { SwapchainSync::create(make_device(), count, separate_present_queue) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use std::cell::{Cell, RefCell};
    use std::collections::HashSet;

    #[derive(Default)]
    struct FakeDevice {
        next_handle: Cell<u64>,
        created: Cell<usize>,
        fail_at: Option<usize>,
        live: RefCell<HashSet<u64>>,
        signaled: RefCell<HashSet<u64>>,
    }

    impl FakeDevice {
        fn failing_at(n: usize) -> Self {
            Self {
                fail_at: Some(n),
                ..Self::default()
            }
        }

        fn make(&self) -> VkResult<u64> {
            if self.fail_at == Some(self.created.get()) {
                return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
            }
            self.created.set(self.created.get() + 1);
            let raw = self.next_handle.get() + 1;
            self.next_handle.set(raw);
            self.live.borrow_mut().insert(raw);
            Ok(raw)
        }

        fn live(&self) -> usize {
            self.live.borrow().len()
        }
    }

    impl SyncDevice for FakeDevice {
        unsafe fn create_fence_object(&self, signaled: bool) -> VkResult<vk::Fence> {
            let raw = self.make()?;
            if signaled {
                self.signaled.borrow_mut().insert(raw);
            }
            Ok(vk::Fence::from_raw(raw))
        }

        unsafe fn create_semaphore_object(&self) -> VkResult<vk::Semaphore> {
            self.make().map(vk::Semaphore::from_raw)
        }

        unsafe fn destroy_fence_object(&self, fence: vk::Fence) {
            assert!(self.live.borrow_mut().remove(&fence.as_raw()), "double free");
        }

        unsafe fn destroy_semaphore_object(&self, semaphore: vk::Semaphore) {
            assert!(self.live.borrow_mut().remove(&semaphore.as_raw()), "double free");
        }

        unsafe fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> VkResult<()> {
            if self.signaled.borrow().contains(&fence.as_raw()) {
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

    #[test]
    fn slots_are_fully_populated() {
        let device = FakeDevice::default();
        let sync = unsafe { SwapchainSync::create(&device, 3, false) }.unwrap();
        assert_eq!(sync.len(), 3);
        assert_eq!(sync.object_count(), 9);
        assert_eq!(device.live(), 9);
        assert!(sync.slots().iter().all(|slot| slot.image_ownership.is_none()));

        drop(sync);
        assert_eq!(device.live(), 0);
    }

    #[test]
    fn ownership_semaphores_only_with_separate_queue() {
        let device = FakeDevice::default();
        let sync = unsafe { SwapchainSync::create(&device, 2, true) }.unwrap();
        assert_eq!(sync.object_count(), 8);
        for slot in sync.slots() {
            let ownership = slot.image_ownership.unwrap();
            assert_eq!(slot.present_wait_semaphore(), ownership);
        }
    }

    #[test]
    fn fences_start_signaled() {
        let device = FakeDevice::default();
        let mut sync = unsafe { SwapchainSync::create(&device, 3, false) }.unwrap();
        for _ in 0..3 {
            sync.wait_current(0).unwrap();
            sync.advance();
        }

        sync.reset_current().unwrap();
        assert!(sync.wait_current(0).is_err());
    }

    #[test]
    fn frame_cursor_wraps() {
        let device = FakeDevice::default();
        let mut sync = unsafe { SwapchainSync::create(&device, 3, false) }.unwrap();
        let frames: Vec<_> = (0..5)
            .map(|_| {
                let frame = sync.current_frame();
                sync.advance();
                frame
            })
            .collect();
        assert_eq!(frames, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn failure_releases_partial_work() {
        // Second slot fails on its draw-complete semaphore
        let device = FakeDevice::failing_at(5);
        let err = unsafe { SwapchainSync::create(&device, 3, false) }
            .err()
            .unwrap();
        match err {
            GpuError::SyncObjectCreationFailed { slot, what, result } => {
                assert_eq!(slot, 1);
                assert_eq!(what, "draw-complete semaphore");
                assert_eq!(result, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(device.live(), 0);
    }

    #[test]
    fn first_fence_failure_names_the_fence() {
        let device = FakeDevice::failing_at(0);
        let err = unsafe { SwapchainSync::create(&device, 2, true) }.err().unwrap();
        assert!(matches!(
            err,
            GpuError::SyncObjectCreationFailed {
                slot: 0,
                what: "fence",
                ..
            }
        ));
        assert_eq!(device.live(), 0);
    }

    #[test]
    fn reconcile_keeps_matching_sets() {
        let device = FakeDevice::default();
        let mut sync = unsafe { SwapchainSync::create(&device, 3, false) }.unwrap();
        sync.advance();
        let before: Vec<_> = sync.slots().to_vec();

        let kept = unsafe { reconcile_sync(Some(sync), 3, false, || &device) }.unwrap();
        assert_eq!(kept.slots(), before.as_slice());
        assert_eq!(kept.current_frame(), 0);
        assert_eq!(device.live(), 9);
    }

    #[test]
    fn reconcile_rebuilds_on_count_change() {
        let device = FakeDevice::default();
        let sync = unsafe { SwapchainSync::create(&device, 3, false) }.unwrap();
        let rebuilt = unsafe { reconcile_sync(Some(sync), 2, false, || &device) }.unwrap();
        assert_eq!(rebuilt.len(), 2);
        assert_eq!(device.live(), 6);
    }

    #[test]
    fn reconcile_creates_when_missing() {
        let device = FakeDevice::default();
        let created = unsafe { reconcile_sync(None, 2, true, || &device) }.unwrap();
        assert_eq!(created.object_count(), 8);
    }
}
