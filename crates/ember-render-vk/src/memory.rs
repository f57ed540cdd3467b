// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Context, Result};
use ash::vk;

/// Index of the first memory type allowed by `type_bits` with all of `req`.
pub(crate) fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    req: vk::MemoryPropertyFlags,
) -> Result<u32> {
    (0..props.memory_type_count)
        .find(|&i| {
            (type_bits & (1 << i)) != 0
                && props.memory_types[i as usize].property_flags.contains(req)
        })
        .ok_or_else(|| anyhow!("no memory type with {req:?} in mask {type_bits:#b}"))
}

pub(crate) struct Buffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
}

impl Buffer {
    pub unsafe fn new(
        device: &ash::Device,
        mem_props: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        props: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let bci = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let buffer = device.create_buffer(&bci, None).context("create_buffer")?;
        let req = device.get_buffer_memory_requirements(buffer);
        let memory = find_memory_type(mem_props, req.memory_type_bits, props)
            .and_then(|memory_type_index| {
                let mai = vk::MemoryAllocateInfo {
                    s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
                    allocation_size: req.size,
                    memory_type_index,
                    ..Default::default()
                };
                Ok(device.allocate_memory(&mai, None)?)
            });
        let memory = match memory {
            Ok(m) => m,
            Err(e) => {
                device.destroy_buffer(buffer, None);
                return Err(e.context("allocate_memory(buffer)"));
            }
        };
        let this = Self { buffer, memory };
        if let Err(e) = device.bind_buffer_memory(buffer, memory, 0) {
            this.destroy(device);
            return Err(anyhow!("bind_buffer_memory: {e:?}"));
        }
        Ok(this)
    }

    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_buffer(self.buffer, None);
        device.free_memory(self.memory, None);
    }
}

/// Copy `bytes` into a new device-local buffer through a host-visible staging
/// buffer, using a one-time command buffer. Blocks until the copy is done.
pub(crate) unsafe fn upload_via_staging(
    device: &ash::Device,
    mem_props: &vk::PhysicalDeviceMemoryProperties,
    queue: vk::Queue,
    cmd_pool: vk::CommandPool,
    usage: vk::BufferUsageFlags,
    bytes: &[u8],
) -> Result<Buffer> {
    let size = bytes.len() as vk::DeviceSize;
    let staging = Buffer::new(
        device,
        mem_props,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )
    .context("staging buffer")?;

    let result = (|| -> Result<Buffer> {
        let ptr = device
            .map_memory(staging.memory, 0, size, vk::MemoryMapFlags::empty())
            .context("map_memory(staging)")?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr as *mut u8, bytes.len());
        device.unmap_memory(staging.memory);

        let dst = Buffer::new(
            device,
            mem_props,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .context("device-local buffer")?;
        if let Err(e) = copy_buffer(device, queue, cmd_pool, staging.buffer, dst.buffer, size) {
            dst.destroy(device);
            return Err(e);
        }
        Ok(dst)
    })();

    staging.destroy(device);
    result
}

unsafe fn copy_buffer(
    device: &ash::Device,
    queue: vk::Queue,
    cmd_pool: vk::CommandPool,
    src: vk::Buffer,
    dst: vk::Buffer,
    size: vk::DeviceSize,
) -> Result<()> {
    let ai = vk::CommandBufferAllocateInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
        command_pool: cmd_pool,
        level: vk::CommandBufferLevel::PRIMARY,
        command_buffer_count: 1,
        ..Default::default()
    };
    let cmd = device
        .allocate_command_buffers(&ai)
        .context("allocate_command_buffers(upload)")?[0];

    let result = (|| -> Result<()> {
        let bi = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        device.begin_command_buffer(cmd, &bi)?;
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        device.cmd_copy_buffer(cmd, src, dst, std::slice::from_ref(&region));
        device.end_command_buffer(cmd)?;

        let si = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            ..Default::default()
        };
        device
            .queue_submit(queue, std::slice::from_ref(&si), vk::Fence::null())
            .context("queue_submit(upload)")?;
        device.queue_wait_idle(queue).context("queue_wait_idle(upload)")?;
        Ok(())
    })();

    device.free_command_buffers(cmd_pool, std::slice::from_ref(&cmd));
    result
}

/// Offscreen image with its own memory and a single view: MSAA colour or depth.
pub(crate) struct Attachment {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
}

impl Attachment {
    pub unsafe fn new(
        device: &ash::Device,
        mem_props: &vk::PhysicalDeviceMemoryProperties,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> Result<Self> {
        let img_ci = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let image = device.create_image(&img_ci, None).context("create_image")?;

        let req = device.get_image_memory_requirements(image);
        let memory = find_memory_type(
            mem_props,
            req.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .and_then(|memory_type_index| {
            let alloc = vk::MemoryAllocateInfo {
                s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
                allocation_size: req.size,
                memory_type_index,
                ..Default::default()
            };
            Ok(device.allocate_memory(&alloc, None)?)
        });
        let memory = match memory {
            Ok(m) => m,
            Err(e) => {
                device.destroy_image(image, None);
                return Err(e.context("allocate_memory(attachment)"));
            }
        };
        if let Err(e) = device.bind_image_memory(image, memory, 0) {
            device.destroy_image(image, None);
            device.free_memory(memory, None);
            return Err(anyhow!("bind_image_memory: {e:?}"));
        }

        let view_ci = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        let view = match device.create_image_view(&view_ci, None) {
            Ok(v) => v,
            Err(e) => {
                device.destroy_image(image, None);
                device.free_memory(memory, None);
                return Err(anyhow!("create_image_view(attachment): {e:?}"));
            }
        };
        Ok(Self {
            image,
            memory,
            view,
        })
    }

    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_image_view(self.view, None);
        device.destroy_image(self.image, None);
        device.free_memory(self.memory, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut p = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, &f) in flags.iter().enumerate() {
            p.memory_types[i].property_flags = f;
        }
        p
    }

    #[test]
    fn picks_first_allowed_type_with_required_flags() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let local = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        let p = props(&[local, host, local | host]);

        assert_eq!(find_memory_type(&p, 0b111, local).unwrap(), 0);
        assert_eq!(find_memory_type(&p, 0b110, local).unwrap(), 2);
        assert_eq!(find_memory_type(&p, 0b111, host).unwrap(), 1);
    }

    #[test]
    fn missing_type_is_an_error() {
        let p = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert!(find_memory_type(&p, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE).is_err());
        assert!(find_memory_type(&p, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL).is_err());
    }
}
