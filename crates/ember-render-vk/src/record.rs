// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use ember_render::DrawArea;

use crate::pipeline::Pipeline;
use crate::scene::{model_mvp, SceneDesc, SceneKind};
use crate::targets::ImageTargets;

/// Clear values in framebuffer attachment order. Resolve targets take none.
pub(crate) fn clear_values(color: [f32; 4], depth: bool) -> Vec<vk::ClearValue> {
    let mut v = vec![vk::ClearValue {
        color: vk::ClearColorValue { float32: color },
    }];
    if depth {
        v.push(vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        });
    }
    v
}

fn to_vk_viewport(area: &DrawArea) -> (vk::Viewport, vk::Rect2D) {
    let vp = area.viewport;
    let sc = area.scissor;
    (
        vk::Viewport {
            x: vp.x,
            y: vp.y,
            width: vp.width,
            height: vp.height,
            min_depth: vp.min_depth,
            max_depth: vp.max_depth,
        },
        vk::Rect2D {
            offset: vk::Offset2D { x: sc.x, y: sc.y },
            extent: vk::Extent2D {
                width: sc.width,
                height: sc.height,
            },
        },
    )
}

pub(crate) struct RecordCtx<'a> {
    pub device: &'a ash::Device,
    pub render_pass: vk::RenderPass,
    pub pipeline: &'a Pipeline,
    pub geometry: Option<vk::Buffer>,
    pub scene: &'a SceneDesc,
    pub clear_color: [f32; 4],
    pub depth: bool,
}

/// Record the fixed sequence for one image: begin pass with clear, bind,
/// set viewport if dynamic, draw, end pass.
pub(crate) unsafe fn record_image(
    ctx: &RecordCtx<'_>,
    t: &ImageTargets,
    area: &DrawArea,
) -> Result<()> {
    let d = ctx.device;
    let cmd = t.cmd;

    d.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        .context("reset_command_buffer")?;
    let begin = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        ..Default::default()
    };
    d.begin_command_buffer(cmd, &begin)
        .context("begin_command_buffer")?;

    let (viewport, scissor) = to_vk_viewport(area);
    let clears = clear_values(ctx.clear_color, ctx.depth);
    let rp_begin = vk::RenderPassBeginInfo {
        s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
        render_pass: ctx.render_pass,
        framebuffer: t.framebuffer,
        render_area: scissor,
        clear_value_count: clears.len() as u32,
        p_clear_values: clears.as_ptr(),
        ..Default::default()
    };
    d.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
    d.cmd_bind_pipeline(
        cmd,
        vk::PipelineBindPoint::GRAPHICS,
        ctx.pipeline.pipeline,
    );
    if ctx.pipeline.dynamic_viewport {
        d.cmd_set_viewport(cmd, 0, std::slice::from_ref(&viewport));
        d.cmd_set_scissor(cmd, 0, std::slice::from_ref(&scissor));
    }

    let s = ctx.scene;
    match (s.kind, ctx.geometry) {
        (SceneKind::Triangle, _) | (_, None) => {
            d.cmd_draw(cmd, s.vertex_count, 1, 0, 0);
        }
        (kind, Some(buf)) => {
            d.cmd_bind_vertex_buffers(cmd, 0, &[buf], &[s.vertex_offset]);
            if kind == SceneKind::Instanced {
                d.cmd_bind_vertex_buffers(cmd, 1, &[buf], &[s.instance_offset]);
            }
            d.cmd_bind_index_buffer(cmd, buf, s.index_offset, vk::IndexType::UINT16);
            if kind == SceneKind::Mesh {
                let mvp = model_mvp(area.aspect());
                d.cmd_push_constants(
                    cmd,
                    ctx.pipeline.layout,
                    vk::ShaderStageFlags::VERTEX,
                    0,
                    bytemuck::bytes_of(&mvp),
                );
            }
            d.cmd_draw_indexed(cmd, s.index_count, s.instance_count, 0, 0, 0);
        }
    }

    d.cmd_end_render_pass(cmd);
    d.end_command_buffer(cmd).context("end_command_buffer")?;
    Ok(())
}
