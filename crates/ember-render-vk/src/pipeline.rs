// SPDX-License-Identifier: CEPL-1.0
use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use ash::util::read_spv;
use ash::vk;
use glam::Mat4;

use crate::scene::{Instance, SceneKind, Vertex};
use crate::targets::TargetConfig;

/// Single-subpass render pass. Attachment order: colour (multisampled when
/// MSAA is on), depth if any, then the resolve target.
pub(crate) unsafe fn create_render_pass(
    device: &ash::Device,
    cfg: &TargetConfig,
) -> Result<vk::RenderPass> {
    let msaa = cfg.multisampled();
    let format = cfg.surface_format.format;

    let mut attachments = vec![vk::AttachmentDescription {
        format,
        samples: cfg.samples,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: if msaa {
            vk::AttachmentStoreOp::DONT_CARE
        } else {
            vk::AttachmentStoreOp::STORE
        },
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: if msaa {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        } else {
            vk::ImageLayout::PRESENT_SRC_KHR
        },
        ..Default::default()
    }];
    let color_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };

    let depth_ref = cfg.depth_format.map(|depth_format| {
        attachments.push(vk::AttachmentDescription {
            format: depth_format,
            samples: cfg.samples,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ..Default::default()
        });
        vk::AttachmentReference {
            attachment: attachments.len() as u32 - 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }
    });

    let resolve_ref = msaa.then(|| {
        attachments.push(vk::AttachmentDescription {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::DONT_CARE,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        });
        vk::AttachmentReference {
            attachment: attachments.len() as u32 - 1,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }
    });

    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &color_ref,
        p_resolve_attachments: resolve_ref
            .as_ref()
            .map_or(std::ptr::null(), |r| r as *const _),
        p_depth_stencil_attachment: depth_ref
            .as_ref()
            .map_or(std::ptr::null(), |r| r as *const _),
        ..Default::default()
    };

    // The image is handed over by the acquire semaphore, which the submission
    // waits on at colour output; the first write must not start before it.
    let mut stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    let mut access = vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    if depth_ref.is_some() {
        stages |= vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    }
    let dependency = vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: stages,
        dst_stage_mask: stages,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: access,
        ..Default::default()
    };

    let rp_ci = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: attachments.len() as u32,
        p_attachments: attachments.as_ptr(),
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: 1,
        p_dependencies: &dependency,
        ..Default::default()
    };
    Ok(device
        .create_render_pass(&rp_ci, None)
        .context("create_render_pass")?)
}

fn shader_bytes(kind: SceneKind) -> (&'static [u8], &'static [u8]) {
    macro_rules! spv {
        ($name:literal) => {
            include_bytes!(concat!(env!("OUT_DIR"), "/", $name, ".spv")).as_slice()
        };
    }
    match kind {
        SceneKind::Triangle => (spv!("triangle.vert"), spv!("black.frag")),
        SceneKind::Colored => (spv!("colored.vert"), spv!("color.frag")),
        SceneKind::Mesh => (spv!("mesh.vert"), spv!("color.frag")),
        SceneKind::Instanced => (spv!("quad.vert"), spv!("color.frag")),
    }
}

unsafe fn shader_module(device: &ash::Device, bytes: &[u8]) -> Result<vk::ShaderModule> {
    let code = read_spv(&mut Cursor::new(bytes)).context("read_spv")?;
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: code.as_ptr(),
        code_size: code.len() * 4,
        ..Default::default()
    };
    Ok(device
        .create_shader_module(&ci, None)
        .context("create_shader_module")?)
}

/// Vertex bindings and attributes for a scene kind.
pub(crate) fn vertex_layout(
    kind: SceneKind,
) -> (
    Vec<vk::VertexInputBindingDescription>,
    Vec<vk::VertexInputAttributeDescription>,
) {
    let vec3 = vk::Format::R32G32B32_SFLOAT;
    let per_vertex = vk::VertexInputBindingDescription {
        binding: 0,
        stride: std::mem::size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    };
    let vertex_attrs = [
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vec3,
            offset: 0,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vec3,
            offset: std::mem::size_of::<[f32; 3]>() as u32,
        },
    ];
    match kind {
        SceneKind::Triangle => (Vec::new(), Vec::new()),
        SceneKind::Colored | SceneKind::Mesh => (vec![per_vertex], vertex_attrs.to_vec()),
        SceneKind::Instanced => {
            let per_instance = vk::VertexInputBindingDescription {
                binding: 1,
                stride: std::mem::size_of::<Instance>() as u32,
                input_rate: vk::VertexInputRate::INSTANCE,
            };
            let mut attrs = vertex_attrs.to_vec();
            attrs.push(vk::VertexInputAttributeDescription {
                location: 2,
                binding: 1,
                format: vk::Format::R32G32_SFLOAT,
                offset: 0,
            });
            attrs.push(vk::VertexInputAttributeDescription {
                location: 3,
                binding: 1,
                format: vec3,
                offset: std::mem::size_of::<[f32; 2]>() as u32,
            });
            (vec![per_vertex, per_instance], attrs)
        }
    }
}

pub(crate) fn push_constant_size(kind: SceneKind) -> u32 {
    match kind {
        SceneKind::Mesh => std::mem::size_of::<Mat4>() as u32,
        _ => 0,
    }
}

pub(crate) struct Pipeline {
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    /// Viewport and scissor are recorded per command buffer.
    pub dynamic_viewport: bool,
}

impl Pipeline {
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
    }
}

/// Graphics pipeline for `kind`. With `baked_extent` the viewport and scissor
/// are fixed at creation; otherwise they are dynamic state.
pub(crate) unsafe fn create_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    cfg: &TargetConfig,
    kind: SceneKind,
    baked_extent: Option<vk::Extent2D>,
) -> Result<Pipeline> {
    let (vs_bytes, fs_bytes) = shader_bytes(kind);
    let vs = shader_module(device, vs_bytes)?;
    let fs = match shader_module(device, fs_bytes) {
        Ok(m) => m,
        Err(e) => {
            device.destroy_shader_module(vs, None);
            return Err(e);
        }
    };
    let result = build_pipeline(device, render_pass, cfg, kind, baked_extent, vs, fs);
    device.destroy_shader_module(vs, None);
    device.destroy_shader_module(fs, None);
    result
}

#[allow(clippy::too_many_arguments)]
unsafe fn build_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    cfg: &TargetConfig,
    kind: SceneKind,
    baked_extent: Option<vk::Extent2D>,
    vs: vk::ShaderModule,
    fs: vk::ShaderModule,
) -> Result<Pipeline> {
    let entry = c"main";
    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: vs,
            p_name: entry.as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fs,
            p_name: entry.as_ptr(),
            ..Default::default()
        },
    ];

    let (bindings, attrs) = vertex_layout(kind);
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        vertex_binding_description_count: bindings.len() as u32,
        p_vertex_binding_descriptions: bindings.as_ptr(),
        vertex_attribute_description_count: attrs.len() as u32,
        p_vertex_attribute_descriptions: attrs.as_ptr(),
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        ..Default::default()
    };

    let baked_viewport = baked_extent.map(|e| vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: e.width as f32,
        height: e.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    });
    let baked_scissor = baked_extent.map(|extent| vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    });
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        p_viewports: baked_viewport
            .as_ref()
            .map_or(std::ptr::null(), |v| v as *const _),
        scissor_count: 1,
        p_scissors: baked_scissor
            .as_ref()
            .map_or(std::ptr::null(), |s| s as *const _),
        ..Default::default()
    };
    let dyn_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
        dynamic_state_count: dyn_states.len() as u32,
        p_dynamic_states: dyn_states.as_ptr(),
        ..Default::default()
    };

    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::NONE,
        front_face: vk::FrontFace::CLOCKWISE,
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: cfg.samples,
        ..Default::default()
    };
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
        depth_test_enable: vk::TRUE,
        depth_write_enable: vk::TRUE,
        depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
        max_depth_bounds: 1.0,
        ..Default::default()
    };
    let color_blend_att = vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::R
            | vk::ColorComponentFlags::G
            | vk::ColorComponentFlags::B
            | vk::ColorComponentFlags::A,
        blend_enable: vk::FALSE,
        ..Default::default()
    };
    let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_blend_att,
        ..Default::default()
    };

    let push_size = push_constant_size(kind);
    let push_range = vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::VERTEX,
        offset: 0,
        size: push_size,
    };
    let layout_info = vk::PipelineLayoutCreateInfo {
        s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
        push_constant_range_count: u32::from(push_size > 0),
        p_push_constant_ranges: &push_range,
        ..Default::default()
    };
    let layout = device
        .create_pipeline_layout(&layout_info, None)
        .context("create_pipeline_layout")?;

    let dynamic_viewport = baked_extent.is_none();
    let pipeline_info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_depth_stencil_state: if cfg.depth_format.is_some() {
            &depth_stencil as *const _
        } else {
            std::ptr::null()
        },
        p_color_blend_state: &color_blend,
        p_dynamic_state: if dynamic_viewport {
            &dynamic_state as *const _
        } else {
            std::ptr::null()
        },
        layout,
        render_pass,
        subpass: 0,
        ..Default::default()
    };

    let pipelines = match device.create_graphics_pipelines(
        vk::PipelineCache::null(),
        std::slice::from_ref(&pipeline_info),
        None,
    ) {
        Ok(p) => p,
        Err((_, err)) => {
            device.destroy_pipeline_layout(layout, None);
            return Err(anyhow!("create_graphics_pipelines failed: {err:?}"));
        }
    };
    Ok(Pipeline {
        layout,
        pipeline: pipelines[0],
        dynamic_viewport,
    })
}
