// SPDX-License-Identifier: CEPL-1.0
use std::ffi::CStr;

use anyhow::{Context, Result};
use ash::vk;
use ember_render::{
    clamp_extent, AcquireOutcome, Backend, DrawArea, Features, ImageSetDesc, PresentOutcome,
    RenderConfig, RenderSize, SurfaceCaps,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info, warn};

use crate::context::GpuContext;
use crate::memory::{upload_via_staging, Buffer};
use crate::pipeline::{create_pipeline, create_render_pass, Pipeline};
use crate::record::{record_image, RecordCtx};
use crate::scene::{scene_for, SceneDesc};
use crate::swapchain::{create_swapchain, pick_surface_format, query_caps, Swapchain};
use crate::targets::{
    create_image_targets, destroy_image_targets, pick_depth_format, pick_sample_count,
    usable_sample_counts, ImageTargets, TargetConfig, TargetCtx,
};

/// Vulkan implementation of [`Backend`].
///
/// Owns the device-lifetime objects: render pass, pipeline and the uploaded
/// geometry. Frame slots and surface bundles are created through the trait
/// and must be destroyed through it before this is dropped.
pub struct VkBackend {
    ctx: GpuContext,
    targets: TargetConfig,
    render_pass: vk::RenderPass,
    pipeline: Pipeline,
    geometry: Option<Buffer>,
    scene: SceneDesc,
    clear_color: [f32; 4],
}

impl VkBackend {
    /// Instance, device, target formats, render pass, pipeline and geometry
    /// for `config.demo`. `initial` is the window's drawable size; demos
    /// without a dynamic viewport bake it (clamped to the surface) into the
    /// pipeline.
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        app_name: &CStr,
        config: &RenderConfig,
        initial: RenderSize,
    ) -> Result<Self> {
        unsafe {
            let mut ctx = GpuContext::new(window, display, app_name)?;
            match Self::with_context(&ctx, config, initial) {
                Ok(parts) => Ok(parts.into_backend(ctx, config)),
                Err(e) => {
                    ctx.destroy();
                    Err(e)
                }
            }
        }
    }

    unsafe fn with_context(
        ctx: &GpuContext,
        config: &RenderConfig,
        initial: RenderSize,
    ) -> Result<DeviceObjects> {
        let targets = target_config(ctx, config)?;
        info!(
            "targets: {:?}/{:?}, depth {:?}, {:?} samples",
            targets.surface_format.format,
            targets.surface_format.color_space,
            targets.depth_format,
            targets.samples
        );

        let d = &ctx.device;
        let render_pass = create_render_pass(d, &targets)?;

        let baked = if config.features.contains(Features::DYNAMIC_VIEWPORT) {
            None
        } else {
            let caps = query_caps(&ctx.surface_loader, ctx.phys, ctx.surface)?;
            let e = clamp_extent(initial, &caps);
            Some(vk::Extent2D {
                width: e.width.max(1),
                height: e.height.max(1),
            })
        };
        let scene = scene_for(config.demo);
        let pipeline = match create_pipeline(d, render_pass, &targets, scene.desc.kind, baked) {
            Ok(p) => p,
            Err(e) => {
                d.destroy_render_pass(render_pass, None);
                return Err(e.context("create pipeline"));
            }
        };

        let geometry = if scene.desc.uses_buffer() {
            let usage = vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::INDEX_BUFFER;
            match upload_via_staging(
                d,
                &ctx.memory_properties(),
                ctx.graphics_queue,
                ctx.command_pool,
                usage,
                &scene.bytes,
            ) {
                Ok(b) => Some(b),
                Err(e) => {
                    pipeline.destroy(d);
                    d.destroy_render_pass(render_pass, None);
                    return Err(e.context("upload geometry"));
                }
            }
        } else {
            None
        };
        debug!(
            "scene {:?}: {} bytes uploaded",
            scene.desc.kind,
            scene.bytes.len()
        );

        Ok(DeviceObjects {
            targets,
            render_pass,
            pipeline,
            geometry,
            scene: scene.desc,
        })
    }
}

struct DeviceObjects {
    targets: TargetConfig,
    render_pass: vk::RenderPass,
    pipeline: Pipeline,
    geometry: Option<Buffer>,
    scene: SceneDesc,
}

impl DeviceObjects {
    fn into_backend(self, ctx: GpuContext, config: &RenderConfig) -> VkBackend {
        VkBackend {
            ctx,
            targets: self.targets,
            render_pass: self.render_pass,
            pipeline: self.pipeline,
            geometry: self.geometry,
            scene: self.scene,
            clear_color: config.clear_color,
        }
    }
}

unsafe fn target_config(ctx: &GpuContext, config: &RenderConfig) -> Result<TargetConfig> {
    let formats = ctx
        .surface_loader
        .get_physical_device_surface_formats(ctx.phys, ctx.surface)
        .context("get_physical_device_surface_formats")?;
    let surface_format =
        pick_surface_format(&formats).context("surface reports no formats")?;

    let depth_format = if config.features.contains(Features::DEPTH) {
        Some(pick_depth_format(&ctx.instance, ctx.phys)?)
    } else {
        None
    };
    let samples = if config.features.contains(Features::MULTISAMPLE) {
        pick_sample_count(usable_sample_counts(&ctx.limits), config.max_samples)
    } else {
        vk::SampleCountFlags::TYPE_1
    };
    Ok(TargetConfig {
        surface_format,
        depth_format,
        samples,
    })
}

impl Backend for VkBackend {
    type Semaphore = vk::Semaphore;
    type Fence = vk::Fence;
    type NativeCaps = vk::SurfaceCapabilitiesKHR;
    type ImageSet = Swapchain;
    type ImageTargets = ImageTargets;

    fn create_semaphore(&mut self) -> Result<vk::Semaphore> {
        let ci = vk::SemaphoreCreateInfo::default();
        unsafe { self.ctx.device.create_semaphore(&ci, None) }.context("create_semaphore")
    }

    fn create_fence(&mut self, signaled: bool) -> Result<vk::Fence> {
        let ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
            ..Default::default()
        };
        unsafe { self.ctx.device.create_fence(&ci, None) }.context("create_fence")
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        unsafe { self.ctx.device.destroy_semaphore(semaphore, None) }
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        unsafe { self.ctx.device.destroy_fence(fence, None) }
    }

    fn wait_for_fences(&mut self, fences: &[vk::Fence], timeout_ns: u64) -> Result<()> {
        unsafe { self.ctx.device.wait_for_fences(fences, true, timeout_ns) }
            .context("wait_for_fences")
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> Result<()> {
        unsafe { self.ctx.device.reset_fences(&[fence]) }.context("reset_fences")
    }

    fn surface_capabilities(&mut self) -> Result<SurfaceCaps<vk::SurfaceCapabilitiesKHR>> {
        unsafe { query_caps(&self.ctx.surface_loader, self.ctx.phys, self.ctx.surface) }
    }

    fn create_image_set(
        &mut self,
        caps: &SurfaceCaps<vk::SurfaceCapabilitiesKHR>,
        desc: &ImageSetDesc,
    ) -> Result<Swapchain> {
        unsafe {
            create_swapchain(
                &self.ctx.swapchain_loader,
                self.ctx.surface,
                self.targets.surface_format,
                self.ctx.families(),
                caps,
                desc,
            )
        }
    }

    fn image_count(&mut self, set: &Swapchain) -> Result<u32> {
        Ok(set.images.len() as u32)
    }

    fn destroy_image_set(&mut self, set: Swapchain) {
        unsafe {
            self.ctx
                .swapchain_loader
                .destroy_swapchain(set.handle, None)
        }
    }

    fn create_image_targets(
        &mut self,
        set: &Swapchain,
        image_index: u32,
        _area: &DrawArea,
    ) -> Result<ImageTargets> {
        let image = set.images[image_index as usize];
        let mem_props = self.ctx.memory_properties();
        let ctx = TargetCtx {
            device: &self.ctx.device,
            mem_props: &mem_props,
            cmd_pool: self.ctx.command_pool,
            render_pass: self.render_pass,
            config: &self.targets,
        };
        unsafe { create_image_targets(&ctx, image, set.extent) }
    }

    fn record_image_commands(&mut self, targets: &mut ImageTargets, area: &DrawArea) -> Result<()> {
        let ctx = RecordCtx {
            device: &self.ctx.device,
            render_pass: self.render_pass,
            pipeline: &self.pipeline,
            geometry: self.geometry.as_ref().map(|b| b.buffer),
            scene: &self.scene,
            clear_color: self.clear_color,
            depth: self.targets.depth_format.is_some(),
        };
        unsafe { record_image(&ctx, targets, area) }
    }

    fn destroy_image_targets(&mut self, targets: ImageTargets) {
        unsafe { destroy_image_targets(&self.ctx.device, self.ctx.command_pool, targets) }
    }

    fn acquire_next_image(
        &mut self,
        set: &Swapchain,
        available: vk::Semaphore,
        timeout_ns: u64,
    ) -> Result<AcquireOutcome> {
        let r = unsafe {
            self.ctx.swapchain_loader.acquire_next_image(
                set.handle,
                timeout_ns,
                available,
                vk::Fence::null(),
            )
        };
        match r {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(anyhow::Error::from(e).context("acquire_next_image")),
        }
    }

    fn submit(
        &mut self,
        targets: &ImageTargets,
        available: vk::Semaphore,
        finished: vk::Semaphore,
        ready: vk::Fence,
    ) -> Result<()> {
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &available,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &targets.cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &finished,
            ..Default::default()
        };
        unsafe {
            self.ctx
                .device
                .queue_submit(self.ctx.graphics_queue, std::slice::from_ref(&submit), ready)
        }
        .context("queue_submit")
    }

    fn present(
        &mut self,
        set: &Swapchain,
        image_index: u32,
        finished: vk::Semaphore,
    ) -> Result<PresentOutcome> {
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &finished,
            swapchain_count: 1,
            p_swapchains: &set.handle,
            p_image_indices: &image_index,
            ..Default::default()
        };
        let r = unsafe {
            self.ctx
                .swapchain_loader
                .queue_present(self.ctx.present_queue, &present)
        };
        match r {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(anyhow::Error::from(e).context("queue_present")),
        }
    }
}

// Teardown order: idle, geometry, pipeline, render pass, then the context
// (command pool, device, surface, instance). Slots and bundles are already
// gone by now.
impl Drop for VkBackend {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.ctx.device.device_wait_idle() {
                warn!("device_wait_idle at teardown: {e:?}");
            }
            let d = &self.ctx.device;
            if let Some(b) = self.geometry.take() {
                b.destroy(d);
            }
            self.pipeline.destroy(d);
            d.destroy_render_pass(self.render_pass, None);
            self.ctx.destroy();
        }
        debug!("vulkan backend destroyed");
    }
}
