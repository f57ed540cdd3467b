// SPDX-License-Identifier: CEPL-1.0
use bitflags::bitflags;

bitflags! {
    /// What a demo asks of the pipeline and of the window.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Features: u32 {
        /// Window can be resized; the loop tracks drawable size changes.
        const RESIZABLE        = 1 << 0;
        /// Viewport and scissor are recorded per command buffer, not baked.
        const DYNAMIC_VIEWPORT = 1 << 1;
        /// Geometry comes from a vertex/index buffer instead of the shader.
        const VERTEX_INPUT     = 1 << 2;
        const DEPTH            = 1 << 3;
        const MULTISAMPLE      = 1 << 4;
        /// A second, per-instance vertex stream.
        const INSTANCED        = 1 << 5;
    }
}

/// The five rendering iterations, in order of richness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Demo {
    #[default]
    Triangle,
    Dynamic,
    Resizable,
    Model,
    Instanced,
}

impl Demo {
    pub const ALL: [Demo; 5] = [
        Demo::Triangle,
        Demo::Dynamic,
        Demo::Resizable,
        Demo::Model,
        Demo::Instanced,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Demo::Triangle => "triangle",
            Demo::Dynamic => "dynamic",
            Demo::Resizable => "resizable",
            Demo::Model => "model",
            Demo::Instanced => "instanced",
        }
    }

    pub fn features(self) -> Features {
        let moving = Features::DYNAMIC_VIEWPORT | Features::VERTEX_INPUT;
        match self {
            Demo::Triangle => Features::empty(),
            Demo::Dynamic => moving,
            Demo::Resizable => moving | Features::RESIZABLE,
            Demo::Model => {
                moving | Features::RESIZABLE | Features::DEPTH | Features::MULTISAMPLE
            }
            Demo::Instanced => {
                moving | Features::RESIZABLE | Features::MULTISAMPLE | Features::INSTANCED
            }
        }
    }

    /// Early iterations keep a single submission in flight.
    pub fn default_frames_in_flight(self) -> usize {
        match self {
            Demo::Triangle | Demo::Dynamic => 1,
            Demo::Resizable | Demo::Model | Demo::Instanced => 2,
        }
    }

    pub fn default_clear_color(self) -> [f32; 4] {
        match self {
            Demo::Triangle => [1.0, 1.0, 1.0, 1.0],
            _ => [0.02, 0.02, 0.04, 1.0],
        }
    }
}

impl std::str::FromStr for Demo {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Demo::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow::anyhow!("unknown demo '{s}'"))
    }
}

/// Produced once during setup and passed by reference from then on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderConfig {
    pub demo: Demo,
    pub features: Features,
    pub frames_in_flight: usize,
    pub clear_color: [f32; 4],
    /// Upper bound for MSAA; the backend picks the largest supported count <= this.
    pub max_samples: u32,
}

impl RenderConfig {
    pub fn for_demo(demo: Demo) -> Self {
        Self {
            demo,
            features: demo.features(),
            frames_in_flight: demo.default_frames_in_flight(),
            clear_color: demo.default_clear_color(),
            max_samples: if demo.features().contains(Features::MULTISAMPLE) {
                4
            } else {
                1
            },
        }
    }

    pub fn resizable(&self) -> bool {
        self.features.contains(Features::RESIZABLE)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self::for_demo(Demo::default())
    }
}
