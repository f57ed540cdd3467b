// SPDX-License-Identifier: CEPL-1.0
use crate::RenderSize;

/// The window as the frame loop sees it.
pub trait WindowSurface {
    /// Current drawable size in pixels. Zero in either axis while minimized.
    fn drawable_size(&self) -> RenderSize;
    fn should_close(&self) -> bool;
    /// Dispatch pending events without blocking.
    fn poll_events(&mut self);
    /// Block until at least one event arrives. Used while nothing can be drawn.
    fn wait_events(&mut self) {
        self.poll_events();
    }
}

/// Surface capabilities as reported at one point in time. They change with
/// window geometry, so a fresh value is queried for every bundle build.
///
/// `native` carries whatever else the backend needs from the same query
/// (current transform, supported usage, ...).
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceCaps<N> {
    pub min_image_count: u32,
    /// `0` means the display subsystem imposes no upper bound.
    pub max_image_count: u32,
    pub min_extent: RenderSize,
    pub max_extent: RenderSize,
    pub native: N,
}

/// Component-wise clamp of the requested size into the surface's extent range.
pub fn clamp_extent<N>(requested: RenderSize, caps: &SurfaceCaps<N>) -> RenderSize {
    let clamp = |v: u32, lo: u32, hi: u32| v.max(lo).min(hi.max(lo));
    RenderSize {
        width: clamp(requested.width, caps.min_extent.width, caps.max_extent.width),
        height: clamp(requested.height, caps.min_extent.height, caps.max_extent.height),
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Viewport and scissor covering a whole extent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawArea {
    pub extent: RenderSize,
    pub viewport: Viewport,
    pub scissor: Rect,
}

impl DrawArea {
    pub fn for_extent(extent: RenderSize) -> Self {
        Self {
            extent,
            viewport: Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            },
            scissor: Rect {
                x: 0,
                y: 0,
                width: extent.width,
                height: extent.height,
            },
        }
    }

    pub fn aspect(&self) -> f32 {
        if self.extent.height == 0 {
            1.0
        } else {
            self.extent.width as f32 / self.extent.height as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: (u32, u32), max: (u32, u32)) -> SurfaceCaps<()> {
        SurfaceCaps {
            min_image_count: 2,
            max_image_count: 0,
            min_extent: RenderSize::new(min.0, min.1),
            max_extent: RenderSize::new(max.0, max.1),
            native: (),
        }
    }

    #[test]
    fn clamps_each_axis_independently() {
        let c = caps((100, 100), (1920, 1080));
        assert_eq!(
            clamp_extent(RenderSize::new(4000, 50), &c),
            RenderSize::new(1920, 100)
        );
        assert_eq!(
            clamp_extent(RenderSize::new(50, 4000), &c),
            RenderSize::new(100, 1080)
        );
        assert_eq!(
            clamp_extent(RenderSize::new(800, 600), &c),
            RenderSize::new(800, 600)
        );
    }

    #[test]
    fn fixed_surface_forces_its_only_extent() {
        let c = caps((1280, 720), (1280, 720));
        assert_eq!(
            clamp_extent(RenderSize::new(800, 600), &c),
            RenderSize::new(1280, 720)
        );
    }

    #[test]
    fn draw_area_covers_the_extent() {
        let area = DrawArea::for_extent(RenderSize::new(800, 600));
        assert_eq!(area.viewport.width, 800.0);
        assert_eq!(area.viewport.height, 600.0);
        assert_eq!(area.viewport.max_depth, 1.0);
        assert_eq!(
            area.scissor,
            Rect {
                x: 0,
                y: 0,
                width: 800,
                height: 600
            }
        );
        assert!((area.aspect() - 4.0 / 3.0).abs() < 1e-6);
    }
}
