//! Element-typed GPU buffers.
//!
//! The public contract is expressed in elements of the bound type: sizes,
//! copy offsets, bind offsets, and descriptor ranges all count `T`s, and
//! the layer multiplies by `size_of::<T>()` before any native call.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::handle::{DeviceResource, Shared};
use crate::memory::MemoryLocation;
use ash::vk;
use bytemuck::Pod;
use gpu_allocator::vulkan::Allocation;
use std::marker::PhantomData;
use std::sync::Arc;

/// Convert an element count or offset into bytes for the native API.
pub(crate) const fn element_bytes<T>(elements: usize) -> vk::DeviceSize {
    (elements * std::mem::size_of::<T>()) as vk::DeviceSize
}

pub(crate) struct BufferResource {
    context: Arc<GpuContext>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
}

impl DeviceResource for BufferResource {
    fn destroy(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            self.context
                .allocator()
                .lock()
                .destroy_buffer(self.buffer, allocation);
        }
    }
}

/// Immutable configuration for buffer creation.
pub struct BufferInit<'a, T: Pod> {
    /// Buffer usage flags.
    pub usage: vk::BufferUsageFlags,
    /// Where the allocation should live.
    pub location: MemoryLocation,
    /// Capacity in elements of `T`.
    pub len: usize,
    /// Optional initial contents, written through the mapped pointer.
    pub data: Option<&'a [T]>,
    /// Diagnostic label.
    pub label: &'a str,
}

impl<T: Pod> Default for BufferInit<'_, T> {
    fn default() -> Self {
        Self {
            usage: vk::BufferUsageFlags::VERTEX_BUFFER,
            location: MemoryLocation::CpuToGpu,
            len: 0,
            data: None,
            label: "unnamed buffer",
        }
    }
}

/// A reference-counted GPU buffer of `len` elements of `T`.
///
/// Clones alias the same native buffer; the allocation is released when
/// the last clone drops.
pub struct Buffer<T: Pod> {
    shared: Shared<BufferResource>,
    len: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Pod> Clone for Buffer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            len: self.len,
            _marker: PhantomData,
        }
    }
}

impl<T: Pod> Buffer<T> {
    /// Create a buffer from the given configuration.
    pub fn new(context: &Arc<GpuContext>, init: BufferInit<'_, T>) -> Result<Self> {
        let len = match init.data {
            Some(data) if init.len == 0 => data.len(),
            _ => init.len,
        };
        if len == 0 {
            return Err(GpuError::InvalidState(format!(
                "buffer {} created with zero length",
                init.label
            )));
        }
        if let Some(data) = init.data {
            if data.len() > len {
                return Err(GpuError::InvalidState(format!(
                    "buffer {} initial data ({} elements) exceeds capacity ({len})",
                    init.label,
                    data.len(),
                )));
            }
        }

        let (buffer, allocation) = context.allocator().lock().create_buffer(
            element_bytes::<T>(len),
            init.usage,
            init.location,
            init.label,
        )?;

        let buffer = Self {
            shared: Shared::new(
                BufferResource {
                    context: context.clone(),
                    buffer,
                    allocation: Some(allocation),
                },
                init.label,
            ),
            len,
            _marker: PhantomData,
        };

        if let Some(data) = init.data {
            buffer.write(data)?;
        }

        Ok(buffer)
    }

    /// Get the raw buffer handle.
    pub fn raw(&self) -> vk::Buffer {
        self.shared.resource().buffer
    }

    /// Capacity in elements.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Capacity in bytes.
    pub fn size_bytes(&self) -> vk::DeviceSize {
        element_bytes::<T>(self.len)
    }

    pub fn label(&self) -> &str {
        self.shared.label()
    }

    /// Write elements through the mapped pointer. The buffer must live in
    /// host-visible memory, and no GPU work referencing it may be in
    /// flight; the layer does not fence this hazard.
    pub fn write(&self, data: &[T]) -> Result<()> {
        if data.len() > self.len {
            return Err(GpuError::InvalidState(format!(
                "write of {} elements exceeds capacity {} of buffer {}",
                data.len(),
                self.len,
                self.label()
            )));
        }

        let resource = self.shared.resource();
        let ptr = resource
            .allocation
            .as_ref()
            .and_then(gpu_allocator::vulkan::Allocation::mapped_ptr)
            .ok_or_else(|| {
                GpuError::InvalidState(format!("buffer {} is not host-visible", self.label()))
            })?;

        let bytes: &[u8] = bytemuck::cast_slice(data);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr().cast::<u8>(), bytes.len());
        }

        Ok(())
    }

    /// Descriptor info covering the buffer from `offset` (in elements) to
    /// the end.
    pub fn descriptor_info(&self, offset: usize) -> vk::DescriptorBufferInfo {
        debug_assert!(offset <= self.len, "descriptor offset out of bounds");
        vk::DescriptorBufferInfo::default()
            .buffer(self.raw())
            .offset(element_bytes::<T>(offset))
            .range(element_bytes::<T>(self.len - offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_arithmetic_scales_by_type_size() {
        assert_eq!(element_bytes::<u8>(16), 16);
        assert_eq!(element_bytes::<u32>(16), 64);
        assert_eq!(element_bytes::<[f32; 4]>(3), 48);
        assert_eq!(element_bytes::<u16>(0), 0);
    }
}
