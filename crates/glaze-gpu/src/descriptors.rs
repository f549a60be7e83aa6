//! Descriptor set management.

use crate::buffer::Buffer;
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::handle::{DeviceResource, Shared};
use crate::image::ImageView;
use ash::vk;
use bytemuck::Pod;
use std::sync::Arc;

struct DescriptorSetLayoutResource {
    context: Arc<GpuContext>,
    layout: vk::DescriptorSetLayout,
}

impl DeviceResource for DescriptorSetLayoutResource {
    fn destroy(&mut self) {
        unsafe {
            self.context
                .device()
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// One binding of a descriptor set layout.
#[derive(Debug, Clone, Copy)]
pub struct LayoutBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
}

/// Immutable configuration for descriptor set layout creation.
pub struct DescriptorSetLayoutInit<'a> {
    pub bindings: Vec<LayoutBinding>,
    pub flags: vk::DescriptorSetLayoutCreateFlags,
    pub label: &'a str,
}

impl Default for DescriptorSetLayoutInit<'_> {
    fn default() -> Self {
        Self {
            bindings: vec![],
            flags: vk::DescriptorSetLayoutCreateFlags::empty(),
            label: "unnamed descriptor layout",
        }
    }
}

/// A reference-counted descriptor set layout.
#[derive(Clone)]
pub struct DescriptorSetLayout {
    shared: Shared<DescriptorSetLayoutResource>,
}

impl DescriptorSetLayout {
    /// Create a layout from the given configuration.
    pub fn new(context: &Arc<GpuContext>, init: DescriptorSetLayoutInit<'_>) -> Result<Self> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = init
            .bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.descriptor_type)
                    .descriptor_count(b.count)
                    .stage_flags(b.stages)
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&bindings)
            .flags(init.flags);

        let layout = unsafe {
            context
                .device()
                .create_descriptor_set_layout(&create_info, None)
                .map_err(|e| GpuError::native("vkCreateDescriptorSetLayout", init.label, e))?
        };

        Ok(Self {
            shared: Shared::new(
                DescriptorSetLayoutResource {
                    context: context.clone(),
                    layout,
                },
                init.label,
            ),
        })
    }

    /// Get the raw layout handle.
    pub fn raw(&self) -> vk::DescriptorSetLayout {
        self.shared.resource().layout
    }

    pub fn label(&self) -> &str {
        self.shared.label()
    }
}

struct DescriptorPoolResource {
    context: Arc<GpuContext>,
    pool: vk::DescriptorPool,
}

impl DeviceResource for DescriptorPoolResource {
    fn destroy(&mut self) {
        unsafe {
            self.context
                .device()
                .destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Immutable configuration for descriptor pool creation.
pub struct DescriptorPoolInit<'a> {
    pub pool_sizes: Vec<vk::DescriptorPoolSize>,
    pub max_sets: u32,
    pub flags: vk::DescriptorPoolCreateFlags,
    pub label: &'a str,
}

impl Default for DescriptorPoolInit<'_> {
    fn default() -> Self {
        Self {
            pool_sizes: vec![],
            max_sets: 1000,
            flags: vk::DescriptorPoolCreateFlags::empty(),
            label: "unnamed descriptor pool",
        }
    }
}

/// A reference-counted descriptor pool.
#[derive(Clone)]
pub struct DescriptorPool {
    shared: Shared<DescriptorPoolResource>,
}

impl DescriptorPool {
    /// Create a pool from the given configuration.
    pub fn new(context: &Arc<GpuContext>, init: DescriptorPoolInit<'_>) -> Result<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(init.max_sets)
            .pool_sizes(&init.pool_sizes)
            .flags(init.flags);

        let pool = unsafe {
            context
                .device()
                .create_descriptor_pool(&create_info, None)
                .map_err(|e| GpuError::native("vkCreateDescriptorPool", init.label, e))?
        };

        Ok(Self {
            shared: Shared::new(
                DescriptorPoolResource {
                    context: context.clone(),
                    pool,
                },
                init.label,
            ),
        })
    }

    /// Get the raw pool handle.
    pub fn raw(&self) -> vk::DescriptorPool {
        self.shared.resource().pool
    }

    /// Allocate one descriptor set per layout.
    pub fn allocate_sets(&self, layouts: &[DescriptorSetLayout]) -> Result<Vec<DescriptorSet>> {
        let raw_layouts: Vec<vk::DescriptorSetLayout> =
            layouts.iter().map(DescriptorSetLayout::raw).collect();

        let resource = self.shared.resource();
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(resource.pool)
            .set_layouts(&raw_layouts);

        let sets = unsafe {
            resource
                .context
                .device()
                .allocate_descriptor_sets(&alloc_info)
                .map_err(|e| GpuError::native("vkAllocateDescriptorSets", self.shared.label(), e))?
        };

        Ok(sets
            .into_iter()
            .map(|set| DescriptorSet {
                shared: Shared::new(
                    DescriptorSetResource {
                        _pool: self.clone(),
                        set,
                    },
                    format!("descriptor set from {}", self.shared.label()),
                ),
            })
            .collect())
    }

    /// Allocate a single descriptor set.
    pub fn allocate_set(&self, layout: &DescriptorSetLayout) -> Result<DescriptorSet> {
        let mut sets = self.allocate_sets(std::slice::from_ref(layout))?;
        Ok(sets.remove(0))
    }

    /// Reset the pool, invalidating every set allocated from it.
    pub fn reset(&self) -> Result<()> {
        let resource = self.shared.resource();
        unsafe {
            resource
                .context
                .device()
                .reset_descriptor_pool(resource.pool, vk::DescriptorPoolResetFlags::empty())
                .map_err(|e| GpuError::native("vkResetDescriptorPool", self.shared.label(), e))?;
        }
        Ok(())
    }
}

struct DescriptorSetResource {
    // Sets are returned to their pool when the pool is reset or
    // destroyed; holding the pool keeps the set's storage alive.
    _pool: DescriptorPool,
    set: vk::DescriptorSet,
}

impl DeviceResource for DescriptorSetResource {
    fn destroy(&mut self) {}
}

/// A reference-counted descriptor set. Keeps its pool alive.
#[derive(Clone)]
pub struct DescriptorSet {
    shared: Shared<DescriptorSetResource>,
}

impl DescriptorSet {
    /// Get the raw descriptor set handle.
    pub fn raw(&self) -> vk::DescriptorSet {
        self.shared.resource().set
    }
}

/// Point a uniform-buffer binding at the buffer's contents from `offset`
/// (in elements) to the end.
pub fn write_uniform_buffer<T: Pod>(
    context: &GpuContext,
    set: &DescriptorSet,
    binding: u32,
    buffer: &Buffer<T>,
    offset: usize,
) {
    write_buffer(
        context,
        set,
        binding,
        vk::DescriptorType::UNIFORM_BUFFER,
        buffer.descriptor_info(offset),
    );
}

/// Point a storage-buffer binding at the buffer's contents from `offset`
/// (in elements) to the end.
pub fn write_storage_buffer<T: Pod>(
    context: &GpuContext,
    set: &DescriptorSet,
    binding: u32,
    buffer: &Buffer<T>,
    offset: usize,
) {
    write_buffer(
        context,
        set,
        binding,
        vk::DescriptorType::STORAGE_BUFFER,
        buffer.descriptor_info(offset),
    );
}

fn write_buffer(
    context: &GpuContext,
    set: &DescriptorSet,
    binding: u32,
    descriptor_type: vk::DescriptorType,
    buffer_info: vk::DescriptorBufferInfo,
) {
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set.raw())
        .dst_binding(binding)
        .descriptor_type(descriptor_type)
        .buffer_info(std::slice::from_ref(&buffer_info));

    unsafe {
        context.device().update_descriptor_sets(&[write], &[]);
    }
}

/// Point a storage-image binding at an image view.
pub fn write_storage_image(
    context: &GpuContext,
    set: &DescriptorSet,
    binding: u32,
    view: &ImageView,
    layout: vk::ImageLayout,
) {
    let image_info = vk::DescriptorImageInfo::default()
        .image_view(view.raw())
        .image_layout(layout);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(set.raw())
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
        .image_info(std::slice::from_ref(&image_info));

    unsafe {
        context.device().update_descriptor_sets(&[write], &[]);
    }
}
