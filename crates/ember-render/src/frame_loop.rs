// SPDX-License-Identifier: CEPL-1.0
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, info, warn};

use crate::{
    build_bundle, destroy_bundle, AcquireOutcome, Backend, FramePool, RenderConfig, RenderSize,
    SurfaceBundle, WindowSurface,
};

/// Timeout used for every CPU wait. The GPU is trusted to finish.
pub const WAIT_FOREVER: u64 = u64::MAX;

/// What one loop iteration did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Work was submitted through `slot` and `image_index` was queued for display.
    Presented { slot: usize, image_index: u32 },
    /// The surface bundle was drained, destroyed and rebuilt; nothing was drawn.
    Rebuilt,
    /// A rebuild is due but the drawable size is zero; retried next iteration.
    Minimized,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub presented: u64,
    /// Iterations that drew nothing (out-of-date acquire, minimized window).
    pub skipped: u64,
    pub rebuilds: u64,
}

/// Drives frames through a fixed pool of frame slots against a rebuildable
/// surface bundle.
///
/// Per iteration: wait for the current slot's ready gate, acquire an image,
/// reset the gate, submit that image's commands, present, advance the slot.
/// The slot index and the image index are unrelated; the image index always
/// comes from the acquire.
///
/// Resize drains *every* slot before the old bundle is destroyed, because it
/// is not tracked which slot last touched which image.
pub struct FrameLoop<B: Backend> {
    backend: B,
    slots: FramePool<B>,
    bundle: Option<SurfaceBundle<B>>,
    slot_index: usize,
    rebuild_pending: bool,
    track_window_size: bool,
    paused: bool,
    shut_down: bool,
    stats: FrameStats,
    fps_frames: u32,
    fps_since: Instant,
}

impl<B: Backend> FrameLoop<B> {
    /// Create the slot pool and the first bundle. A zero `initial` size
    /// postpones the first build until the window has a drawable area.
    pub fn new(mut backend: B, config: &RenderConfig, initial: RenderSize) -> Result<Self> {
        let mut slots =
            FramePool::new(&mut backend, config.frames_in_flight).context("create frame slots")?;

        let bundle = if initial.is_zero() {
            None
        } else {
            match build_bundle(&mut backend, initial) {
                Ok(b) => Some(b),
                Err(e) => {
                    let _ = slots.destroy(&mut backend, WAIT_FOREVER);
                    return Err(e.context("build initial surface bundle"));
                }
            }
        };

        info!(
            "frame loop ready: demo={} slots={} resizable={}",
            config.demo.name(),
            slots.len(),
            config.resizable()
        );

        Ok(Self {
            backend,
            slots,
            rebuild_pending: bundle.is_none(),
            bundle,
            slot_index: 0,
            track_window_size: config.resizable(),
            paused: false,
            shut_down: false,
            stats: FrameStats::default(),
            fps_frames: 0,
            fps_since: Instant::now(),
        })
    }

    pub fn slots(&self) -> &FramePool<B> {
        &self.slots
    }

    pub fn bundle(&self) -> Option<&SurfaceBundle<B>> {
        self.bundle.as_ref()
    }

    pub fn slot_index(&self) -> usize {
        self.slot_index
    }

    pub fn rebuild_pending(&self) -> bool {
        self.rebuild_pending
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Block until the window asks to close, then drain and tear down.
    pub fn run<W: WindowSurface>(&mut self, window: &mut W) -> Result<()> {
        while !window.should_close() {
            window.poll_events();
            if window.should_close() {
                break;
            }
            if self.frame(window)? == FrameOutcome::Minimized {
                window.wait_events();
            }
        }
        self.shutdown()
    }

    /// One iteration of the loop.
    pub fn frame<W: WindowSurface>(&mut self, window: &W) -> Result<FrameOutcome> {
        if self.shut_down {
            bail!("frame loop already shut down");
        }

        if self.track_window_size {
            if let Some(bundle) = &self.bundle {
                if window.drawable_size() != bundle.requested() {
                    self.rebuild_pending = true;
                }
            }
        }
        if self.rebuild_pending {
            return self.resize(window.drawable_size());
        }

        // WaitSlot
        let slot = *self.slots.slot(self.slot_index);
        self.backend
            .wait_for_fences(&[slot.ready], WAIT_FOREVER)
            .context("wait_for_fences(frame slot)")?;

        // Acquire
        let bundle = self
            .bundle
            .as_ref()
            .ok_or_else(|| anyhow!("no surface bundle to render into"))?;
        let acquired = self
            .backend
            .acquire_next_image(bundle.image_set(), slot.available, WAIT_FOREVER)
            .context("acquire_next_image")?;
        let (image_index, suboptimal) = match acquired {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => (image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                debug!("acquire: image set out of date");
                self.rebuild_pending = true;
                let outcome = self.resize(window.drawable_size())?;
                // A deferred rebuild already counted this iteration.
                if outcome == FrameOutcome::Rebuilt {
                    self.stats.skipped += 1;
                }
                return Ok(outcome);
            }
        };
        if image_index as usize >= bundle.image_count() {
            bail!(
                "acquire returned image {image_index}, set holds {}",
                bundle.image_count()
            );
        }

        // Submit. The gate is reset only now that work is certain to follow.
        self.backend
            .reset_fence(slot.ready)
            .context("reset_fences(frame slot)")?;
        self.backend
            .submit(
                bundle.targets(image_index),
                slot.available,
                slot.finished,
                slot.ready,
            )
            .context("queue_submit")?;

        // Present
        let presented = self
            .backend
            .present(bundle.image_set(), image_index, slot.finished)
            .context("queue_present")?;

        let used = self.slot_index;
        self.slot_index = self.slots.advance(self.slot_index);
        // A suboptimal image is still presented so its available signal has a waiter.
        if suboptimal || presented.needs_rebuild() {
            debug!("surface changed (suboptimal={suboptimal}, present={presented:?})");
            self.rebuild_pending = true;
        }

        self.stats.presented += 1;
        self.tick_fps();
        Ok(FrameOutcome::Presented {
            slot: used,
            image_index,
        })
    }

    fn resize(&mut self, size: RenderSize) -> Result<FrameOutcome> {
        if size.is_zero() {
            if !self.paused {
                info!("drawable size is {size}: rebuild deferred");
                self.paused = true;
            }
            self.stats.skipped += 1;
            return Ok(FrameOutcome::Minimized);
        }
        if self.paused {
            info!("drawable size is {size}: resuming");
            self.paused = false;
        }

        self.slots
            .drain(&mut self.backend, WAIT_FOREVER)
            .context("drain frame slots before rebuild")?;
        if let Some(old) = self.bundle.take() {
            destroy_bundle(&mut self.backend, old);
        }
        let bundle = build_bundle(&mut self.backend, size).context("rebuild surface bundle")?;
        self.bundle = Some(bundle);

        self.rebuild_pending = false;
        self.stats.rebuilds += 1;
        Ok(FrameOutcome::Rebuilt)
    }

    fn tick_fps(&mut self) {
        self.fps_frames = self.fps_frames.saturating_add(1);
        let now = Instant::now();
        if now.duration_since(self.fps_since) >= Duration::from_secs(1) {
            info!("fps ~ {}", self.fps_frames);
            self.fps_frames = 0;
            self.fps_since = now;
        }
    }

    /// Wait on every slot's ready gate, destroy the slots, then the bundle.
    /// Later calls are no-ops.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        let drained = self
            .slots
            .destroy(&mut self.backend, WAIT_FOREVER)
            .context("drain frame slots at shutdown");
        if let Some(bundle) = self.bundle.take() {
            destroy_bundle(&mut self.backend, bundle);
        }
        info!(
            "frame loop shut down: {} presented, {} skipped, {} rebuilds",
            self.stats.presented, self.stats.skipped, self.stats.rebuilds
        );
        drained
    }
}

impl<B: Backend> Drop for FrameLoop<B> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("frame loop teardown: {e:#}");
        }
    }
}
