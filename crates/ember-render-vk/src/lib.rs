// SPDX-License-Identifier: CEPL-1.0
//! Vulkan (`ash`) implementation of the frame pipeline's [`ember_render::Backend`].

mod backend;
mod context;
mod memory;
mod pipeline;
mod record;
mod scene;
mod swapchain;
mod targets;

pub use backend::VkBackend;
pub use scene::{scene_for, SceneData, SceneDesc, SceneKind};
pub use swapchain::Swapchain;
pub use targets::{ImageTargets, TargetConfig};
