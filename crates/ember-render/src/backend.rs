// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;

use crate::{DrawArea, RenderSize, SurfaceCaps};

/// Result of asking the display subsystem for the next presentable image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The image is ours; the slot's available signal fires once it is safe to
    /// render into. `suboptimal` images are still usable but the set should be
    /// rebuilt afterwards.
    Acquired { image_index: u32, suboptimal: bool },
    /// The image set no longer matches the surface. Nothing was signalled.
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    pub fn needs_rebuild(self) -> bool {
        !matches!(self, PresentOutcome::Presented)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentMode {
    /// First-in-first-out queue of presentation requests: no tearing, latency
    /// bounded by the image count.
    Fifo,
}

/// Request for a new presentable image set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageSetDesc {
    pub extent: RenderSize,
    pub min_image_count: u32,
    pub present_mode: PresentMode,
}

/// Everything the frame pipeline needs from a graphics API.
///
/// Handle types are plain values; ownership is expressed by which method
/// consumes them. Nothing here is expected to be thread-safe: one control
/// thread drives the backend while the GPU runs asynchronously behind it.
pub trait Backend {
    /// GPU-side signal ordering one queue operation after another.
    type Semaphore: Copy + PartialEq + std::fmt::Debug;
    /// CPU-observable completion flag.
    type Fence: Copy + PartialEq + std::fmt::Debug;
    /// Extra capability data the backend wants back when creating an image set.
    type NativeCaps: Clone + std::fmt::Debug;
    /// A presentable image set. Its images belong to the display subsystem.
    type ImageSet;
    /// Per-image view, attachments, framebuffer and recorded commands.
    type ImageTargets;

    fn create_semaphore(&mut self) -> Result<Self::Semaphore>;
    fn create_fence(&mut self, signaled: bool) -> Result<Self::Fence>;
    fn destroy_semaphore(&mut self, semaphore: Self::Semaphore);
    fn destroy_fence(&mut self, fence: Self::Fence);
    /// Block until every fence is signalled or `timeout_ns` elapses.
    fn wait_for_fences(&mut self, fences: &[Self::Fence], timeout_ns: u64) -> Result<()>;
    fn reset_fence(&mut self, fence: Self::Fence) -> Result<()>;

    /// Always a fresh query; never served from a cache.
    fn surface_capabilities(&mut self) -> Result<SurfaceCaps<Self::NativeCaps>>;
    fn create_image_set(
        &mut self,
        caps: &SurfaceCaps<Self::NativeCaps>,
        desc: &ImageSetDesc,
    ) -> Result<Self::ImageSet>;
    /// Number of images the display subsystem actually created.
    fn image_count(&mut self, set: &Self::ImageSet) -> Result<u32>;
    fn destroy_image_set(&mut self, set: Self::ImageSet);

    /// View, optional offscreen attachments and framebuffer for one image.
    fn create_image_targets(
        &mut self,
        set: &Self::ImageSet,
        image_index: u32,
        area: &DrawArea,
    ) -> Result<Self::ImageTargets>;
    /// Record the fixed draw sequence for one image.
    fn record_image_commands(
        &mut self,
        targets: &mut Self::ImageTargets,
        area: &DrawArea,
    ) -> Result<()>;
    fn destroy_image_targets(&mut self, targets: Self::ImageTargets);

    fn acquire_next_image(
        &mut self,
        set: &Self::ImageSet,
        available: Self::Semaphore,
        timeout_ns: u64,
    ) -> Result<AcquireOutcome>;
    /// Queue the image's recorded commands: wait on `available` at colour
    /// output, signal `finished` and `ready` when the GPU is done.
    fn submit(
        &mut self,
        targets: &Self::ImageTargets,
        available: Self::Semaphore,
        finished: Self::Semaphore,
        ready: Self::Fence,
    ) -> Result<()>;
    fn present(
        &mut self,
        set: &Self::ImageSet,
        image_index: u32,
        finished: Self::Semaphore,
    ) -> Result<PresentOutcome>;
}
