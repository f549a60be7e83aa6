//! Pipeline creation.

use crate::context::GpuContext;
use crate::descriptors::DescriptorSetLayout;
use crate::error::{GpuError, Result};
use crate::handle::{DeviceResource, Shared};
use crate::pipeline_cache::PipelineCache;
use crate::render_pass::RenderPass;
use crate::shader::ShaderModule;
use ash::vk;
use std::sync::Arc;

struct PipelineResource {
    context: Arc<GpuContext>,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl DeviceResource for PipelineResource {
    fn destroy(&mut self) {
        unsafe {
            self.context.device().destroy_pipeline(self.pipeline, None);
            self.context
                .device()
                .destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Rasterizer state.
#[derive(Debug, Clone, Copy)]
pub struct RasterizationInfo {
    pub polygon_mode: vk::PolygonMode,
    pub line_width: f32,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
}

impl Default for RasterizationInfo {
    fn default() -> Self {
        Self {
            polygon_mode: vk::PolygonMode::FILL,
            line_width: 1.0,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
        }
    }
}

/// Color blend state for the single color attachment.
#[derive(Debug, Clone, Copy)]
pub struct BlendInfo {
    pub blend_enabled: bool,
    pub src_color_factor: vk::BlendFactor,
    pub dst_color_factor: vk::BlendFactor,
    pub color_op: vk::BlendOp,
    pub src_alpha_factor: vk::BlendFactor,
    pub dst_alpha_factor: vk::BlendFactor,
    pub alpha_op: vk::BlendOp,
}

impl Default for BlendInfo {
    fn default() -> Self {
        Self {
            blend_enabled: true,
            src_color_factor: vk::BlendFactor::SRC_ALPHA,
            dst_color_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            color_op: vk::BlendOp::ADD,
            src_alpha_factor: vk::BlendFactor::ONE,
            dst_alpha_factor: vk::BlendFactor::ZERO,
            alpha_op: vk::BlendOp::ADD,
        }
    }
}

/// Depth/stencil state.
#[derive(Debug, Clone, Copy)]
pub struct DepthStencilInfo {
    pub depth_enabled: bool,
    pub write_enabled: bool,
    pub compare_op: vk::CompareOp,
    pub bounds_test_enabled: bool,
    pub min_depth_bounds: f32,
    pub max_depth_bounds: f32,
}

impl Default for DepthStencilInfo {
    fn default() -> Self {
        Self {
            depth_enabled: true,
            write_enabled: true,
            compare_op: vk::CompareOp::LESS,
            bounds_test_enabled: false,
            min_depth_bounds: 0.0,
            max_depth_bounds: 1.0,
        }
    }
}

/// One vertex attribute within a binding.
#[derive(Debug, Clone, Copy)]
pub struct VertexAttribute {
    pub format: vk::Format,
    pub offset: u32,
}

/// One vertex buffer binding with its attributes. Shader locations are
/// assigned sequentially across bindings, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct VertexBinding {
    pub stride: u32,
    pub input_rate: vk::VertexInputRate,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexBinding {
    pub fn new(stride: u32) -> Self {
        Self {
            stride,
            input_rate: vk::VertexInputRate::VERTEX,
            attributes: vec![],
        }
    }

    pub fn attribute(mut self, format: vk::Format, offset: u32) -> Self {
        self.attributes.push(VertexAttribute { format, offset });
        self
    }
}

/// Expand binding configs into native descriptions with sequentially
/// assigned attribute locations.
pub(crate) fn expand_vertex_bindings(
    bindings: &[VertexBinding],
) -> (
    Vec<vk::VertexInputBindingDescription>,
    Vec<vk::VertexInputAttributeDescription>,
) {
    let mut binding_descs = Vec::with_capacity(bindings.len());
    let mut attribute_descs = Vec::new();

    let mut location = 0u32;
    for (binding_index, binding) in bindings.iter().enumerate() {
        let binding_index = binding_index as u32;
        binding_descs.push(
            vk::VertexInputBindingDescription::default()
                .binding(binding_index)
                .stride(binding.stride)
                .input_rate(binding.input_rate),
        );

        for attribute in &binding.attributes {
            attribute_descs.push(
                vk::VertexInputAttributeDescription::default()
                    .location(location)
                    .binding(binding_index)
                    .format(attribute.format)
                    .offset(attribute.offset),
            );
            location += 1;
        }
    }

    (binding_descs, attribute_descs)
}

/// Immutable configuration for graphics pipeline creation.
pub struct GraphicsPipelineConfig<'a> {
    pub modules: Vec<ShaderModule>,
    pub render_pass: RenderPass,
    pub vertex_bindings: Vec<VertexBinding>,
    pub set_layouts: Vec<DescriptorSetLayout>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
    pub topology: vk::PrimitiveTopology,
    pub rasterization: RasterizationInfo,
    pub blend: BlendInfo,
    pub depth_stencil: DepthStencilInfo,
    pub sample_count: vk::SampleCountFlags,
    pub cache: Option<PipelineCache>,
    pub label: &'a str,
}

impl GraphicsPipelineConfig<'_> {
    /// A config with the default fixed-function state for the given pass.
    pub fn new(render_pass: RenderPass) -> Self {
        Self {
            modules: vec![],
            render_pass,
            vertex_bindings: vec![],
            set_layouts: vec![],
            push_constant_ranges: vec![],
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            rasterization: RasterizationInfo::default(),
            blend: BlendInfo::default(),
            depth_stencil: DepthStencilInfo::default(),
            sample_count: vk::SampleCountFlags::TYPE_1,
            cache: None,
            label: "unnamed pipeline",
        }
    }
}

/// Immutable configuration for compute pipeline creation.
pub struct ComputePipelineConfig<'a> {
    pub module: ShaderModule,
    pub set_layouts: Vec<DescriptorSetLayout>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
    pub cache: Option<PipelineCache>,
    pub label: &'a str,
}

/// A reference-counted pipeline with its layout.
#[derive(Clone)]
pub struct Pipeline {
    shared: Shared<PipelineResource>,
    bind_point: vk::PipelineBindPoint,
}

impl Pipeline {
    /// Create a graphics pipeline from the given configuration.
    pub fn graphics(context: &Arc<GpuContext>, config: GraphicsPipelineConfig<'_>) -> Result<Self> {
        let layout = create_layout(
            context,
            &config.set_layouts,
            &config.push_constant_ranges,
            config.label,
        )?;

        let stages: Vec<vk::PipelineShaderStageCreateInfo> = config
            .modules
            .iter()
            .map(|module| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(module.stage())
                    .module(module.raw())
                    .name(module.entry())
            })
            .collect();

        let (binding_descs, attribute_descs) = expand_vertex_bindings(&config.vertex_bindings);
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&binding_descs)
            .vertex_attribute_descriptions(&attribute_descs);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(config.topology)
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic; only the counts matter here.
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(config.rasterization.polygon_mode)
            .line_width(config.rasterization.line_width)
            .cull_mode(config.rasterization.cull_mode)
            .front_face(config.rasterization.front_face)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(config.sample_count)
            .sample_shading_enable(false);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(config.blend.blend_enabled)
            .src_color_blend_factor(config.blend.src_color_factor)
            .dst_color_blend_factor(config.blend.dst_color_factor)
            .color_blend_op(config.blend.color_op)
            .src_alpha_blend_factor(config.blend.src_alpha_factor)
            .dst_alpha_blend_factor(config.blend.dst_alpha_factor)
            .alpha_blend_op(config.blend.alpha_op);

        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(std::slice::from_ref(&color_blend_attachment));

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(config.depth_stencil.depth_enabled)
            .depth_write_enable(config.depth_stencil.write_enabled)
            .depth_compare_op(config.depth_stencil.compare_op)
            .depth_bounds_test_enable(config.depth_stencil.bounds_test_enabled)
            .min_depth_bounds(config.depth_stencil.min_depth_bounds)
            .max_depth_bounds(config.depth_stencil.max_depth_bounds)
            .stencil_test_enable(false);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .depth_stencil_state(&depth_stencil)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(config.render_pass.raw())
            .subpass(0);

        let cache = config
            .cache
            .as_ref()
            .map_or_else(vk::PipelineCache::null, PipelineCache::raw);

        let pipelines = unsafe {
            context
                .device()
                .create_graphics_pipelines(cache, &[create_info], None)
                .map_err(|(_pipelines, e)| {
                    unsafe { context.device().destroy_pipeline_layout(layout, None) };
                    GpuError::native("vkCreateGraphicsPipelines", config.label, e)
                })?
        };

        Ok(Self {
            shared: Shared::new(
                PipelineResource {
                    context: context.clone(),
                    pipeline: pipelines[0],
                    layout,
                },
                config.label,
            ),
            bind_point: vk::PipelineBindPoint::GRAPHICS,
        })
    }

    /// Create a compute pipeline from the given configuration.
    pub fn compute(context: &Arc<GpuContext>, config: ComputePipelineConfig<'_>) -> Result<Self> {
        let layout = create_layout(
            context,
            &config.set_layouts,
            &config.push_constant_ranges,
            config.label,
        )?;

        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(config.module.raw())
            .name(config.module.entry());

        let create_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage)
            .layout(layout);

        let cache = config
            .cache
            .as_ref()
            .map_or_else(vk::PipelineCache::null, PipelineCache::raw);

        let pipelines = unsafe {
            context
                .device()
                .create_compute_pipelines(cache, &[create_info], None)
                .map_err(|(_pipelines, e)| {
                    unsafe { context.device().destroy_pipeline_layout(layout, None) };
                    GpuError::native("vkCreateComputePipelines", config.label, e)
                })?
        };

        Ok(Self {
            shared: Shared::new(
                PipelineResource {
                    context: context.clone(),
                    pipeline: pipelines[0],
                    layout,
                },
                config.label,
            ),
            bind_point: vk::PipelineBindPoint::COMPUTE,
        })
    }

    /// Get the raw pipeline handle.
    pub fn raw(&self) -> vk::Pipeline {
        self.shared.resource().pipeline
    }

    /// Get the raw pipeline layout handle.
    pub fn layout(&self) -> vk::PipelineLayout {
        self.shared.resource().layout
    }

    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }

    pub fn label(&self) -> &str {
        self.shared.label()
    }
}

fn create_layout(
    context: &Arc<GpuContext>,
    set_layouts: &[DescriptorSetLayout],
    push_constant_ranges: &[vk::PushConstantRange],
    label: &str,
) -> Result<vk::PipelineLayout> {
    let raw_layouts: Vec<vk::DescriptorSetLayout> =
        set_layouts.iter().map(DescriptorSetLayout::raw).collect();

    let layout_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(&raw_layouts)
        .push_constant_ranges(push_constant_ranges);

    unsafe {
        context
            .device()
            .create_pipeline_layout(&layout_info, None)
            .map_err(|e| GpuError::native("vkCreatePipelineLayout", label, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_locations_are_sequential_across_bindings() {
        let bindings = [
            VertexBinding::new(24)
                .attribute(vk::Format::R32G32B32_SFLOAT, 0)
                .attribute(vk::Format::R32G32B32_SFLOAT, 12),
            VertexBinding::new(8).attribute(vk::Format::R32G32_SFLOAT, 0),
        ];

        let (binding_descs, attribute_descs) = expand_vertex_bindings(&bindings);

        assert_eq!(binding_descs.len(), 2);
        assert_eq!(binding_descs[0].stride, 24);
        assert_eq!(binding_descs[1].binding, 1);

        assert_eq!(attribute_descs.len(), 3);
        assert_eq!(attribute_descs[0].location, 0);
        assert_eq!(attribute_descs[1].location, 1);
        assert_eq!(attribute_descs[1].offset, 12);
        assert_eq!(attribute_descs[2].location, 2);
        assert_eq!(attribute_descs[2].binding, 1);
    }

    #[test]
    fn empty_bindings_expand_to_nothing() {
        let (binding_descs, attribute_descs) = expand_vertex_bindings(&[]);
        assert!(binding_descs.is_empty());
        assert!(attribute_descs.is_empty());
    }
}
