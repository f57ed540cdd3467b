// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::{
    clamp_extent, Backend, DrawArea, ImageSetDesc, InvariantViolation, PresentMode, RenderSize,
};

/// Every resource whose shape depends on the current surface size.
///
/// `targets[i]` belongs to image `i` of `image_set`; the two always have the
/// same length. A bundle is only ever observed whole: [`build_bundle`]
/// either returns a complete one or releases everything it made.
pub struct SurfaceBundle<B: Backend> {
    image_set: B::ImageSet,
    targets: Vec<B::ImageTargets>,
    requested: RenderSize,
    area: DrawArea,
}

impl<B: Backend> SurfaceBundle<B> {
    pub fn image_set(&self) -> &B::ImageSet {
        &self.image_set
    }

    pub fn image_count(&self) -> usize {
        self.targets.len()
    }

    pub fn targets(&self, image_index: u32) -> &B::ImageTargets {
        &self.targets[image_index as usize]
    }

    /// Size the bundle was asked for (the window's drawable size at build time).
    pub fn requested(&self) -> RenderSize {
        self.requested
    }

    /// Resolved render resolution after clamping to the surface limits.
    pub fn extent(&self) -> RenderSize {
        self.area.extent
    }

    pub fn area(&self) -> &DrawArea {
        &self.area
    }
}

/// Build a complete bundle for `requested`.
///
/// Capabilities are queried anew on every call. The image set is sized to the
/// surface's minimum image count and the count actually created must match
/// it exactly.
pub fn build_bundle<B: Backend>(backend: &mut B, requested: RenderSize) -> Result<SurfaceBundle<B>> {
    let caps = backend
        .surface_capabilities()
        .context("query surface capabilities")?;
    let extent = clamp_extent(requested, &caps);
    let area = DrawArea::for_extent(extent);

    let desc = ImageSetDesc {
        extent,
        min_image_count: caps.min_image_count,
        present_mode: PresentMode::Fifo,
    };
    let image_set = backend
        .create_image_set(&caps, &desc)
        .context("create presentable image set")?;

    let actual = match backend.image_count(&image_set) {
        Ok(n) => n,
        Err(e) => {
            backend.destroy_image_set(image_set);
            return Err(e.context("query presentable image count"));
        }
    };
    if actual != desc.min_image_count {
        backend.destroy_image_set(image_set);
        return Err(InvariantViolation::ImageCountMismatch {
            expected: desc.min_image_count,
            actual,
        }
        .into());
    }

    let mut targets = Vec::with_capacity(actual as usize);
    for index in 0..actual {
        match build_image(backend, &image_set, index, &area) {
            Ok(t) => targets.push(t),
            Err(e) => {
                for t in targets.drain(..).rev() {
                    backend.destroy_image_targets(t);
                }
                backend.destroy_image_set(image_set);
                return Err(e.context(format!("presentable image {index}")));
            }
        }
    }

    info!(
        "surface bundle built: requested {}, extent {}, {} images",
        requested, extent, actual
    );
    Ok(SurfaceBundle {
        image_set,
        targets,
        requested,
        area,
    })
}

fn build_image<B: Backend>(
    backend: &mut B,
    set: &B::ImageSet,
    index: u32,
    area: &DrawArea,
) -> Result<B::ImageTargets> {
    let mut targets = backend
        .create_image_targets(set, index, area)
        .context("create image targets")?;
    if let Err(e) = backend.record_image_commands(&mut targets, area) {
        backend.destroy_image_targets(targets);
        return Err(e.context("record image commands"));
    }
    Ok(targets)
}

/// Release every per-image resource, then the image set itself.
///
/// The caller guarantees no submission referencing the bundle is still
/// executing. The surface and the command pool are not touched.
pub fn destroy_bundle<B: Backend>(backend: &mut B, bundle: SurfaceBundle<B>) {
    let SurfaceBundle {
        image_set,
        targets,
        area,
        ..
    } = bundle;
    let count = targets.len();
    for t in targets {
        backend.destroy_image_targets(t);
    }
    backend.destroy_image_set(image_set);
    debug!("surface bundle destroyed ({} images, extent {})", count, area.extent);
}
