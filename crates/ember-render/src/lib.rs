// SPDX-License-Identifier: CEPL-1.0
//! Backend-agnostic frame pipeline: frame slots, the surface-size resource
//! bundle and the loop that drives them against a [`Backend`].

mod backend;
mod bundle;
mod config;
mod error;
mod frame_loop;
mod slots;
mod surface;

pub use backend::{AcquireOutcome, Backend, ImageSetDesc, PresentMode, PresentOutcome};
pub use bundle::{build_bundle, destroy_bundle, SurfaceBundle};
pub use config::{Demo, Features, RenderConfig};
pub use error::InvariantViolation;
pub use frame_loop::{FrameLoop, FrameOutcome, FrameStats, WAIT_FOREVER};
pub use slots::{FramePool, FrameSlot};
pub use surface::{clamp_extent, DrawArea, Rect, SurfaceCaps, Viewport, WindowSurface};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports a zero dimension; nothing can be built for it.
    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for RenderSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_in_either_axis_is_zero() {
        assert!(RenderSize::new(0, 600).is_zero());
        assert!(RenderSize::new(800, 0).is_zero());
        assert!(!RenderSize::new(1, 1).is_zero());
        assert_eq!(RenderSize::new(800, 600).to_string(), "800x600");
    }
}
