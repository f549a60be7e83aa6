//! Synchronization primitives and per-frame slot bookkeeping.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::handle::{DeviceResource, Shared};
use ash::vk;
use std::sync::Arc;

/// Number of frames the CPU may queue ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

struct SemaphoreResource {
    context: Arc<GpuContext>,
    semaphore: vk::Semaphore,
}

impl DeviceResource for SemaphoreResource {
    fn destroy(&mut self) {
        unsafe {
            self.context.device().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// A reference-counted binary semaphore.
#[derive(Clone)]
pub struct Semaphore {
    shared: Shared<SemaphoreResource>,
}

impl Semaphore {
    /// Create a new semaphore.
    pub fn new(context: &Arc<GpuContext>, label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe {
            context
                .device()
                .create_semaphore(&create_info, None)
                .map_err(|e| GpuError::native("vkCreateSemaphore", &label, e))?
        };

        Ok(Self {
            shared: Shared::new(
                SemaphoreResource {
                    context: context.clone(),
                    semaphore,
                },
                label,
            ),
        })
    }

    /// Get the raw semaphore handle.
    pub fn raw(&self) -> vk::Semaphore {
        self.shared.resource().semaphore
    }

    pub fn label(&self) -> &str {
        self.shared.label()
    }
}

struct FenceResource {
    context: Arc<GpuContext>,
    fence: vk::Fence,
}

impl DeviceResource for FenceResource {
    fn destroy(&mut self) {
        unsafe {
            self.context.device().destroy_fence(self.fence, None);
        }
    }
}

/// A reference-counted fence.
#[derive(Clone)]
pub struct Fence {
    shared: Shared<FenceResource>,
}

impl Fence {
    /// Create a new fence, optionally in the signaled state.
    pub fn new(context: &Arc<GpuContext>, signaled: bool, label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe {
            context
                .device()
                .create_fence(&create_info, None)
                .map_err(|e| GpuError::native("vkCreateFence", &label, e))?
        };

        Ok(Self {
            shared: Shared::new(
                FenceResource {
                    context: context.clone(),
                    fence,
                },
                label,
            ),
        })
    }

    /// Get the raw fence handle.
    pub fn raw(&self) -> vk::Fence {
        self.shared.resource().fence
    }

    pub fn label(&self) -> &str {
        self.shared.label()
    }

    /// Block until the fence signals.
    pub fn wait(&self, timeout_ns: u64) -> Result<()> {
        let resource = self.shared.resource();
        unsafe {
            resource
                .context
                .device()
                .wait_for_fences(&[resource.fence], true, timeout_ns)
                .map_err(|e| GpuError::native("vkWaitForFences", self.shared.label(), e))?;
        }
        Ok(())
    }

    /// Reset the fence to the unsignaled state.
    pub fn reset(&self) -> Result<()> {
        let resource = self.shared.resource();
        unsafe {
            resource
                .context
                .device()
                .reset_fences(&[resource.fence])
                .map_err(|e| GpuError::native("vkResetFences", self.shared.label(), e))?;
        }
        Ok(())
    }
}

/// Synchronization objects for one in-flight frame slot.
pub struct FrameSync {
    /// Signaled when the acquired swapchain image is ready to be written.
    pub image_available: Semaphore,
    /// Signaled when rendering into the image has finished.
    pub render_finished: Semaphore,
    /// Signaled when all submitted work for this slot has completed.
    pub in_flight: Fence,
}

impl FrameSync {
    fn new(context: &Arc<GpuContext>, slot: usize) -> Result<Self> {
        Ok(Self {
            image_available: Semaphore::new(context, format!("frame {slot} image available"))?,
            render_finished: Semaphore::new(context, format!("frame {slot} render finished"))?,
            // Created signaled so the very first wait on the slot passes.
            in_flight: Fence::new(context, true, format!("frame {slot} in flight"))?,
        })
    }
}

/// Gates CPU submission against GPU completion for a fixed number of
/// in-flight frames.
///
/// The slot index (`frame counter mod slot count`) and the acquired
/// presentable-image index live in different modulo spaces; nothing here
/// may assume they match.
pub struct FrameSyncManager {
    slots: Vec<FrameSync>,
    frame_counter: u64,
}

impl FrameSyncManager {
    /// Create the fixed set of frame slots.
    ///
    /// Slots are created once and survive swapchain rebuilds; they are
    /// independent of the presentable-image count.
    pub fn new(context: &Arc<GpuContext>) -> Result<Self> {
        let slots = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|slot| FrameSync::new(context, slot))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            slots,
            frame_counter: 0,
        })
    }

    /// Index of the slot serving the current frame.
    pub fn current_slot(&self) -> usize {
        slot_index(self.frame_counter, self.slots.len())
    }

    /// Synchronization objects for the current frame.
    pub fn current(&self) -> &FrameSync {
        &self.slots[self.current_slot()]
    }

    /// Block until the current slot's previous submission has completed.
    pub fn wait_current(&self) -> Result<()> {
        self.current().in_flight.wait(u64::MAX)
    }

    /// Reset the current slot's fence for reuse.
    ///
    /// Deferred until an image has actually been acquired: resetting
    /// before a failed acquire would leave the slot waiting forever on a
    /// fence nothing will signal.
    pub fn reset_current(&self) -> Result<()> {
        self.current().in_flight.reset()
    }

    /// Advance the frame counter after a successful present.
    pub fn advance(&mut self) {
        self.frame_counter += 1;
    }

    /// Total frames presented so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }
}

/// Map a monotonically increasing frame counter onto a slot.
pub(crate) fn slot_index(frame_counter: u64, slot_count: usize) -> usize {
    (frame_counter % slot_count as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_cycle_modulo_slot_count() {
        for frame in 0..10u64 {
            assert_eq!(slot_index(frame, MAX_FRAMES_IN_FLIGHT), (frame % 2) as usize);
        }
    }

    #[test]
    fn slot_cycle_is_independent_of_image_count() {
        // Three presentable images, two slots: after N full cycles the slot
        // is N mod 2, never N mod 3.
        let mut frame_counter = 0u64;
        let mut acquired_image = 0usize;
        let image_count = 3;

        for n in 0..12u64 {
            assert_eq!(slot_index(frame_counter, MAX_FRAMES_IN_FLIGHT), (n % 2) as usize);
            acquired_image = (acquired_image + 1) % image_count;
            frame_counter += 1;
        }
        assert_eq!(acquired_image, 12 % image_count);
    }
}
