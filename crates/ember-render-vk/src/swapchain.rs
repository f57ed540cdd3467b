// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::khr::{surface, swapchain};
use ash::vk;
use ember_render::{ImageSetDesc, PresentMode, RenderSize, SurfaceCaps};
use tracing::debug;

use crate::context::QueueFamilies;

/// Surface formats in order of preference.
const PREFERRED_FORMATS: &[(vk::Format, Option<vk::ColorSpaceKHR>)] = &[
    (vk::Format::B8G8R8A8_SRGB, None),
    (vk::Format::R8G8B8A8_SRGB, None),
    (
        vk::Format::A2B10G10R10_UNORM_PACK32,
        Some(vk::ColorSpaceKHR::SRGB_NONLINEAR),
    ),
];

/// Preferred (format, colour space) pair, else whatever the driver lists first.
pub(crate) fn pick_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    PREFERRED_FORMATS
        .iter()
        .find_map(|&(format, space)| {
            formats
                .iter()
                .copied()
                .find(|f| f.format == format && space.map_or(true, |s| f.color_space == s))
        })
        .or_else(|| formats.first().copied())
}

fn to_size(e: vk::Extent2D) -> RenderSize {
    RenderSize::new(e.width, e.height)
}

/// Translate the surface's capabilities. A defined `current_extent` means the
/// surface dictates the size, so both bounds collapse onto it.
pub(crate) fn surface_caps(native: vk::SurfaceCapabilitiesKHR) -> SurfaceCaps<vk::SurfaceCapabilitiesKHR> {
    let (min_extent, max_extent) = if native.current_extent.width != u32::MAX {
        (to_size(native.current_extent), to_size(native.current_extent))
    } else {
        (
            to_size(native.min_image_extent),
            to_size(native.max_image_extent),
        )
    };
    SurfaceCaps {
        min_image_count: native.min_image_count,
        max_image_count: native.max_image_count,
        min_extent,
        max_extent,
        native,
    }
}

pub(crate) unsafe fn query_caps(
    loader: &surface::Instance,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Result<SurfaceCaps<vk::SurfaceCapabilitiesKHR>> {
    let native = loader
        .get_physical_device_surface_capabilities(phys, surface)
        .context("get_physical_device_surface_capabilities")?;
    Ok(surface_caps(native))
}

fn present_mode(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
    }
}

fn composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::INHERIT,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|&a| supported.contains(a))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

/// The presentable image set: a swapchain and the images it owns.
pub struct Swapchain {
    pub(crate) handle: vk::SwapchainKHR,
    pub(crate) images: Vec<vk::Image>,
    pub(crate) extent: vk::Extent2D,
}

pub(crate) unsafe fn create_swapchain(
    loader: &swapchain::Device,
    surface: vk::SurfaceKHR,
    format: vk::SurfaceFormatKHR,
    families: QueueFamilies,
    caps: &SurfaceCaps<vk::SurfaceCapabilitiesKHR>,
    desc: &ImageSetDesc,
) -> Result<Swapchain> {
    let extent = vk::Extent2D {
        width: desc.extent.width,
        height: desc.extent.height,
    };
    // Images are used by both families when they differ.
    let family_indices = families.unique();
    let (sharing_mode, index_count) = if family_indices.len() > 1 {
        (vk::SharingMode::CONCURRENT, family_indices.len() as u32)
    } else {
        (vk::SharingMode::EXCLUSIVE, 0)
    };

    let info = vk::SwapchainCreateInfoKHR {
        s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
        surface,
        min_image_count: desc.min_image_count,
        image_format: format.format,
        image_color_space: format.color_space,
        image_extent: extent,
        image_array_layers: 1,
        image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
        image_sharing_mode: sharing_mode,
        queue_family_index_count: index_count,
        p_queue_family_indices: family_indices.as_ptr(),
        pre_transform: caps.native.current_transform,
        composite_alpha: composite_alpha(caps.native.supported_composite_alpha),
        present_mode: present_mode(desc.present_mode),
        clipped: vk::TRUE,
        old_swapchain: vk::SwapchainKHR::null(),
        ..Default::default()
    };
    let handle = loader
        .create_swapchain(&info, None)
        .context("create_swapchain")?;
    let images = match loader.get_swapchain_images(handle) {
        Ok(i) => i,
        Err(e) => {
            loader.destroy_swapchain(handle, None);
            return Err(anyhow::Error::from(e).context("get_swapchain_images"));
        }
    };
    debug!(
        "swapchain: {:?}/{:?} {}x{}, asked {} images, got {}, sharing {:?}",
        format.format,
        format.color_space,
        extent.width,
        extent.height,
        desc.min_image_count,
        images.len(),
        sharing_mode
    );
    Ok(Swapchain {
        handle,
        images,
        extent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sf(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn srgb_bgra_wins_over_everything() {
        let formats = [
            sf(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            sf(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(
            pick_surface_format(&formats).unwrap().format,
            vk::Format::B8G8R8A8_SRGB
        );
    }

    #[test]
    fn ten_bit_needs_the_srgb_colour_space() {
        let hdr = sf(
            vk::Format::A2B10G10R10_UNORM_PACK32,
            vk::ColorSpaceKHR::HDR10_ST2084_EXT,
        );
        let sdr = sf(
            vk::Format::A2B10G10R10_UNORM_PACK32,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        );
        let other = sf(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);

        let pick = |fs: &[vk::SurfaceFormatKHR]| {
            pick_surface_format(fs).map(|f| (f.format, f.color_space))
        };
        assert_eq!(pick(&[other, hdr, sdr]), Some((sdr.format, sdr.color_space)));
        assert_eq!(pick(&[other, hdr]), Some((other.format, other.color_space)));
        assert_eq!(pick(&[]), None);
    }

    #[test]
    fn defined_current_extent_pins_both_bounds() {
        let native = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            current_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };
        let caps = surface_caps(native);
        assert_eq!(caps.min_extent, RenderSize::new(1280, 720));
        assert_eq!(caps.max_extent, RenderSize::new(1280, 720));

        let free = surface_caps(vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            ..native
        });
        assert_eq!(free.min_extent, RenderSize::new(1, 1));
        assert_eq!(free.max_extent, RenderSize::new(4096, 4096));
        assert_eq!(free.min_image_count, 2);
    }
}
