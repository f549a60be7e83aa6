//! Render pass objects.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::handle::{DeviceResource, Shared};
use ash::vk;
use std::sync::Arc;

struct RenderPassResource {
    context: Arc<GpuContext>,
    render_pass: vk::RenderPass,
}

impl DeviceResource for RenderPassResource {
    fn destroy(&mut self) {
        unsafe {
            self.context
                .device()
                .destroy_render_pass(self.render_pass, None);
        }
    }
}

/// One subpass: attachment references into the pass's attachment list.
#[derive(Default, Clone)]
pub struct SubpassConfig {
    pub color_refs: Vec<vk::AttachmentReference>,
    pub depth_ref: Option<vk::AttachmentReference>,
    pub input_refs: Vec<vk::AttachmentReference>,
}

/// Immutable configuration for render pass creation.
#[derive(Default, Clone)]
pub struct RenderPassConfig<'a> {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub subpasses: Vec<SubpassConfig>,
    pub dependencies: Vec<vk::SubpassDependency>,
    pub label: &'a str,
}

/// A reference-counted render pass.
#[derive(Clone)]
pub struct RenderPass {
    shared: Shared<RenderPassResource>,
}

impl RenderPass {
    /// Create a render pass from the given configuration.
    pub fn new(context: &Arc<GpuContext>, config: RenderPassConfig<'_>) -> Result<Self> {
        let subpasses: Vec<vk::SubpassDescription> = config
            .subpasses
            .iter()
            .map(|subpass| {
                let mut description = vk::SubpassDescription::default()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .color_attachments(&subpass.color_refs)
                    .input_attachments(&subpass.input_refs);
                if let Some(depth_ref) = &subpass.depth_ref {
                    description = description.depth_stencil_attachment(depth_ref);
                }
                description
            })
            .collect();

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&config.attachments)
            .subpasses(&subpasses)
            .dependencies(&config.dependencies);

        let render_pass = unsafe {
            context
                .device()
                .create_render_pass(&create_info, None)
                .map_err(|e| GpuError::native("vkCreateRenderPass", config.label, e))?
        };

        Ok(Self {
            shared: Shared::new(
                RenderPassResource {
                    context: context.clone(),
                    render_pass,
                },
                config.label,
            ),
        })
    }

    /// Build the standard presentation pass: one cleared color attachment
    /// that ends in `PRESENT_SRC_KHR` and one cleared depth attachment.
    pub fn default_for(
        context: &Arc<GpuContext>,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Result<Self> {
        let attachments = vec![
            vk::AttachmentDescription::default()
                .format(color_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
            vk::AttachmentDescription::default()
                .format(depth_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        ];

        let subpass = SubpassConfig {
            color_refs: vec![vk::AttachmentReference::default()
                .attachment(0)
                .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)],
            depth_ref: Some(
                vk::AttachmentReference::default()
                    .attachment(1)
                    .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            ),
            input_refs: vec![],
        };

        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            );

        Self::new(
            context,
            RenderPassConfig {
                attachments,
                subpasses: vec![subpass],
                dependencies: vec![dependency],
                label: "default render pass",
            },
        )
    }

    /// Get the raw render pass handle.
    pub fn raw(&self) -> vk::RenderPass {
        self.shared.resource().render_pass
    }

    pub fn label(&self) -> &str {
        self.shared.label()
    }
}
