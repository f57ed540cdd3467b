// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_char, CStr};

use anyhow::{anyhow, Context, Result};
use ash::ext::debug_utils as ext_debug;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use tracing::{debug, error, info, warn};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Everything that lives as long as the window: instance, surface, device,
/// queues and the command pool per-image command buffers come from.
///
/// Torn down explicitly with [`GpuContext::destroy`] after every object the
/// device created is gone.
pub(crate) struct GpuContext {
    _entry: Entry,
    pub instance: Instance,
    debug: Option<(ext_debug::Instance, vk::DebugUtilsMessengerEXT)>,
    pub surface_loader: surface::Instance,
    pub surface: vk::SurfaceKHR,

    pub phys: vk::PhysicalDevice,
    pub limits: vk::PhysicalDeviceLimits,
    pub device: ash::Device,
    pub graphics_family: u32,
    pub present_family: u32,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub swapchain_loader: swapchain::Device,
    pub command_pool: vk::CommandPool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Distinct families, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// First graphics-capable family, and the first family that can present
/// (the graphics one if it can).
pub(crate) fn pick_queue_families(
    flags: &[vk::QueueFlags],
    can_present: impl Fn(u32) -> bool,
) -> Option<QueueFamilies> {
    let graphics = flags
        .iter()
        .position(|f| f.contains(vk::QueueFlags::GRAPHICS))? as u32;
    let present = if can_present(graphics) {
        graphics
    } else {
        (0..flags.len() as u32).find(|&i| can_present(i))?
    };
    Some(QueueFamilies { graphics, present })
}

/// Release steps for a partly built context. Run newest first when dropped,
/// unless [`Unwind::disarm`] hands ownership on.
#[derive(Default)]
struct Unwind {
    steps: Vec<(&'static str, Box<dyn FnOnce()>)>,
}

impl Unwind {
    fn push(&mut self, what: &'static str, step: impl FnOnce() + 'static) {
        self.steps.push((what, Box::new(step)));
    }

    fn disarm(mut self) {
        self.steps.clear();
    }
}

impl Drop for Unwind {
    fn drop(&mut self) {
        while let Some((what, step)) = self.steps.pop() {
            debug!("setup failed: destroying {what}");
            step();
        }
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "{msg}");
    } else {
        debug!(target: "vulkan", "{msg}");
    }
    vk::FALSE
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    }
}

unsafe fn validation_available(entry: &Entry) -> bool {
    entry
        .enumerate_instance_layer_properties()
        .unwrap_or_default()
        .iter()
        .any(|l| CStr::from_ptr(l.layer_name.as_ptr()) == VALIDATION_LAYER)
}

unsafe fn create_instance(
    entry: &Entry,
    display: RawDisplayHandle,
    app_name: &CStr,
    validation: bool,
) -> Result<Instance> {
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app_name.as_ptr(),
        application_version: 0,
        p_engine_name: c"ember".as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let mut exts = ash_window::enumerate_required_extensions(display)
        .context("enumerate_required_extensions")?
        .to_vec();
    if validation {
        exts.push(ext_debug::NAME.as_ptr());
    }
    let layers: Vec<*const c_char> = if validation {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: exts.len() as u32,
        pp_enabled_extension_names: exts.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };
    Ok(entry.create_instance(&create_info, None)?)
}

unsafe fn supports_swapchain(instance: &Instance, phys: vk::PhysicalDevice) -> bool {
    instance
        .enumerate_device_extension_properties(phys)
        .unwrap_or_default()
        .iter()
        .any(|e| CStr::from_ptr(e.extension_name.as_ptr()) == swapchain::NAME)
}

unsafe fn pick_device(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
    for phys in instance
        .enumerate_physical_devices()
        .context("enumerate_physical_devices")?
    {
        if !supports_swapchain(instance, phys) {
            continue;
        }
        let flags: Vec<vk::QueueFlags> = instance
            .get_physical_device_queue_family_properties(phys)
            .iter()
            .map(|q| q.queue_flags)
            .collect();
        let families = pick_queue_families(&flags, |i| {
            surface_loader
                .get_physical_device_surface_support(phys, i, surface)
                .unwrap_or(false)
        });
        if let Some(families) = families {
            return Ok((phys, families));
        }
    }
    Err(anyhow!("no physical device with graphics and present queues"))
}

impl GpuContext {
    pub unsafe fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        app_name: &CStr,
    ) -> Result<Self> {
        let dh = display
            .display_handle()
            .map_err(|e| anyhow!("{e}"))?
            .as_raw();
        let wh = window
            .window_handle()
            .map_err(|e| anyhow!("{e}"))?
            .as_raw();

        let entry = Entry::linked();
        let mut unwind = Unwind::default();
        let validation = cfg!(debug_assertions) && validation_available(&entry);
        if cfg!(debug_assertions) && !validation {
            warn!("{} not installed; running without validation", VALIDATION_LAYER.to_string_lossy());
        }
        let instance =
            create_instance(&entry, dh, app_name, validation).context("create_instance")?;
        {
            let instance = instance.clone();
            unwind.push("instance", move || unsafe { instance.destroy_instance(None) });
        }

        let debug = if validation {
            let loader = ext_debug::Instance::new(&entry, &instance);
            match loader.create_debug_utils_messenger(&debug_messenger_info(), None) {
                Ok(m) => {
                    let l = loader.clone();
                    unwind.push("debug messenger", move || unsafe {
                        l.destroy_debug_utils_messenger(m, None)
                    });
                    Some((loader, m))
                }
                Err(e) => {
                    warn!("create_debug_utils_messenger: {e:?}");
                    None
                }
            }
        } else {
            None
        };

        let surface_loader = surface::Instance::new(&entry, &instance);
        let surface = ash_window::create_surface(&entry, &instance, dh, wh, None)
            .context("ash_window::create_surface")?;
        {
            let loader = surface_loader.clone();
            unwind.push("surface", move || unsafe { loader.destroy_surface(surface, None) });
        }

        let (phys, families) = pick_device(&instance, &surface_loader, surface)?;
        let props = instance.get_physical_device_properties(phys);
        info!(
            "gpu: {} (graphics family {}, present family {})",
            CStr::from_ptr(props.device_name.as_ptr()).to_string_lossy(),
            families.graphics,
            families.present
        );

        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: family,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            })
            .collect();
        let device_exts = [swapchain::NAME.as_ptr()];
        let features = vk::PhysicalDeviceFeatures::default();
        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: queue_infos.len() as u32,
            p_queue_create_infos: queue_infos.as_ptr(),
            enabled_extension_count: device_exts.len() as u32,
            pp_enabled_extension_names: device_exts.as_ptr(),
            p_enabled_features: &features,
            ..Default::default()
        };
        let device = instance
            .create_device(phys, &dinfo, None)
            .context("create_device")?;
        {
            let device = device.clone();
            unwind.push("device", move || unsafe { device.destroy_device(None) });
        }

        let graphics_queue = device.get_device_queue(families.graphics, 0);
        let present_queue = device.get_device_queue(families.present, 0);
        let swapchain_loader = swapchain::Device::new(&instance, &device);

        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: families.graphics,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };
        let command_pool = device
            .create_command_pool(&pool_info, None)
            .context("create_command_pool")?;
        unwind.disarm();

        Ok(Self {
            _entry: entry,
            instance,
            debug,
            surface_loader,
            surface,
            phys,
            limits: props.limits,
            device,
            graphics_family: families.graphics,
            present_family: families.present,
            graphics_queue,
            present_queue,
            swapchain_loader,
            command_pool,
        })
    }

    pub fn families(&self) -> QueueFamilies {
        QueueFamilies {
            graphics: self.graphics_family,
            present: self.present_family,
        }
    }

    pub fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        unsafe { self.instance.get_physical_device_memory_properties(self.phys) }
    }

    // Order: command pool, device, surface, debug messenger, instance.
    pub unsafe fn destroy(&mut self) {
        self.device.destroy_command_pool(self.command_pool, None);
        self.device.destroy_device(None);
        self.surface_loader.destroy_surface(self.surface, None);
        if let Some((loader, messenger)) = self.debug.take() {
            loader.destroy_debug_utils_messenger(messenger, None);
        }
        self.instance.destroy_instance(None);
    }
}
