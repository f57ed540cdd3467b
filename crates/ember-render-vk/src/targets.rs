// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;

use crate::memory::Attachment;

/// Formats and sample count every bundle is built with. Chosen once at
/// startup; the render pass and pipeline depend on it.
#[derive(Clone, Copy, Debug)]
pub struct TargetConfig {
    pub surface_format: vk::SurfaceFormatKHR,
    pub depth_format: Option<vk::Format>,
    pub samples: vk::SampleCountFlags,
}

impl TargetConfig {
    pub fn multisampled(&self) -> bool {
        self.samples != vk::SampleCountFlags::TYPE_1
    }
}

const SAMPLE_STEPS: [(u32, vk::SampleCountFlags); 7] = [
    (64, vk::SampleCountFlags::TYPE_64),
    (32, vk::SampleCountFlags::TYPE_32),
    (16, vk::SampleCountFlags::TYPE_16),
    (8, vk::SampleCountFlags::TYPE_8),
    (4, vk::SampleCountFlags::TYPE_4),
    (2, vk::SampleCountFlags::TYPE_2),
    (1, vk::SampleCountFlags::TYPE_1),
];

/// Largest count in `supported` that does not exceed `max`.
pub(crate) fn pick_sample_count(supported: vk::SampleCountFlags, max: u32) -> vk::SampleCountFlags {
    SAMPLE_STEPS
        .iter()
        .find(|&&(n, flag)| n <= max && supported.contains(flag))
        .map(|&(_, flag)| flag)
        .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// Colour and depth sample counts must agree, so only their intersection counts.
pub(crate) fn usable_sample_counts(limits: &vk::PhysicalDeviceLimits) -> vk::SampleCountFlags {
    limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts
}

pub(crate) unsafe fn pick_depth_format(
    instance: &ash::Instance,
    phys: vk::PhysicalDevice,
) -> Result<vk::Format> {
    [
        vk::Format::D32_SFLOAT,
        vk::Format::D24_UNORM_S8_UINT,
        vk::Format::D32_SFLOAT_S8_UINT,
        vk::Format::D16_UNORM,
    ]
    .into_iter()
    .find(|&fmt| {
        instance
            .get_physical_device_format_properties(phys, fmt)
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
    .context("no depth attachment format")
}

/// Everything drawn into one presentable image.
pub struct ImageTargets {
    pub(crate) view: vk::ImageView,
    /// Multisampled colour, resolved into `view` at the end of the pass.
    pub(crate) color: Option<Attachment>,
    pub(crate) depth: Option<Attachment>,
    pub(crate) framebuffer: vk::Framebuffer,
    pub(crate) cmd: vk::CommandBuffer,
}

/// Attachment order of the framebuffer; must match the render pass.
pub(crate) fn framebuffer_attachments(t: &ImageTargets) -> Vec<vk::ImageView> {
    let mut views = Vec::with_capacity(3);
    views.push(t.color.as_ref().map_or(t.view, |c| c.view));
    if let Some(d) = &t.depth {
        views.push(d.view);
    }
    if t.color.is_some() {
        views.push(t.view);
    }
    views
}

pub(crate) struct TargetCtx<'a> {
    pub device: &'a ash::Device,
    pub mem_props: &'a vk::PhysicalDeviceMemoryProperties,
    pub cmd_pool: vk::CommandPool,
    pub render_pass: vk::RenderPass,
    pub config: &'a TargetConfig,
}

pub(crate) unsafe fn create_image_targets(
    ctx: &TargetCtx<'_>,
    image: vk::Image,
    extent: vk::Extent2D,
) -> Result<ImageTargets> {
    let device = ctx.device;
    let format = ctx.config.surface_format.format;

    let view_ci = vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    };
    let view = device
        .create_image_view(&view_ci, None)
        .context("create_image_view")?;

    let mut targets = ImageTargets {
        view,
        color: None,
        depth: None,
        framebuffer: vk::Framebuffer::null(),
        cmd: vk::CommandBuffer::null(),
    };
    if let Err(e) = fill_targets(ctx, &mut targets, extent) {
        destroy_image_targets(device, ctx.cmd_pool, targets);
        return Err(e);
    }
    Ok(targets)
}

unsafe fn fill_targets(ctx: &TargetCtx<'_>, t: &mut ImageTargets, extent: vk::Extent2D) -> Result<()> {
    let device = ctx.device;
    let cfg = ctx.config;

    if cfg.multisampled() {
        t.color = Some(
            Attachment::new(
                device,
                ctx.mem_props,
                extent,
                cfg.surface_format.format,
                cfg.samples,
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
                vk::ImageAspectFlags::COLOR,
            )
            .context("msaa colour attachment")?,
        );
    }
    if let Some(depth_format) = cfg.depth_format {
        t.depth = Some(
            Attachment::new(
                device,
                ctx.mem_props,
                extent,
                depth_format,
                cfg.samples,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                vk::ImageAspectFlags::DEPTH,
            )
            .context("depth attachment")?,
        );
    }

    let views = framebuffer_attachments(t);
    let fb_ci = vk::FramebufferCreateInfo {
        s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
        render_pass: ctx.render_pass,
        attachment_count: views.len() as u32,
        p_attachments: views.as_ptr(),
        width: extent.width,
        height: extent.height,
        layers: 1,
        ..Default::default()
    };
    t.framebuffer = device
        .create_framebuffer(&fb_ci, None)
        .context("create_framebuffer")?;

    let ai = vk::CommandBufferAllocateInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
        command_pool: ctx.cmd_pool,
        level: vk::CommandBufferLevel::PRIMARY,
        command_buffer_count: 1,
        ..Default::default()
    };
    t.cmd = device
        .allocate_command_buffers(&ai)
        .context("allocate_command_buffers")?[0];
    Ok(())
}

/// Command buffer, framebuffer, attachments, view; in that order.
pub(crate) unsafe fn destroy_image_targets(
    device: &ash::Device,
    cmd_pool: vk::CommandPool,
    t: ImageTargets,
) {
    if t.cmd != vk::CommandBuffer::null() {
        device.free_command_buffers(cmd_pool, std::slice::from_ref(&t.cmd));
    }
    if t.framebuffer != vk::Framebuffer::null() {
        device.destroy_framebuffer(t.framebuffer, None);
    }
    if let Some(d) = &t.depth {
        d.destroy(device);
    }
    if let Some(c) = &t.color {
        c.destroy(device);
    }
    device.destroy_image_view(t.view, None);
}
