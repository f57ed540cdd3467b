// SPDX-License-Identifier: CEPL-1.0
use thiserror::Error;

/// Faults in the pipeline's own assumptions about the display subsystem.
/// These are not environmental failures and are never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("presentable image set holds {actual} images, per-image arrays were sized for {expected}")]
    ImageCountMismatch { expected: u32, actual: u32 },

    #[error("frame slot pool must hold at least one slot")]
    EmptySlotPool,
}
