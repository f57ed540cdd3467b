// SPDX-License-Identifier: CEPL-1.0
//! `winit` window driven by explicit pumping, so the frame loop owns control
//! flow instead of the event loop.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use ember_render::{RenderSize, WindowSurface};
use tracing::{debug, info};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowId},
};

pub use winit;

/// How the window is opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "ember".to_owned(),
            width: 800,
            height: 600,
            resizable: false,
        }
    }
}

pub(crate) fn render_size(size: PhysicalSize<u32>) -> RenderSize {
    RenderSize::new(size.width, size.height)
}

/// Event-side state, fed by `winit` callbacks during each pump.
struct WindowState {
    config: WindowConfig,
    window: Option<Window>,
    size: RenderSize,
    close_requested: bool,
    create_error: Option<anyhow::Error>,
}

impl WindowState {
    fn on_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                info!("close requested");
                self.close_requested = true;
            }
            WindowEvent::Resized(s) => {
                let size = render_size(*s);
                if size != self.size {
                    debug!("resized {} -> {}", self.size, size);
                    self.size = size;
                }
            }
            _ => {}
        }
    }
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_resizable(self.config.resizable);
        match event_loop.create_window(attrs) {
            Ok(window) => {
                self.size = render_size(window.inner_size());
                info!("window '{}' opened at {}", self.config.title, self.size);
                self.window = Some(window);
            }
            Err(e) => {
                self.create_error = Some(anyhow!(e).context("create_window"));
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if self.window.as_ref().is_some_and(|w| w.id() == id) {
            self.on_event(&event);
        }
    }
}

/// The application window. Implements [`WindowSurface`] for the frame loop.
pub struct PlatformWindow {
    event_loop: EventLoop<()>,
    state: WindowState,
    exited: bool,
}

impl PlatformWindow {
    pub fn new(config: WindowConfig) -> Result<Self> {
        let event_loop = EventLoop::new().context("EventLoop::new")?;
        let mut this = Self {
            event_loop,
            state: WindowState {
                config,
                window: None,
                size: RenderSize::default(),
                close_requested: false,
                create_error: None,
            },
            exited: false,
        };

        // The window is created from the first `resumed` callback.
        while this.state.window.is_none() {
            this.pump(Some(Duration::ZERO));
            if let Some(e) = this.state.create_error.take() {
                return Err(e);
            }
            if this.exited {
                return Err(anyhow!("event loop exited before the window was created"));
            }
        }
        Ok(this)
    }

    pub fn window(&self) -> Result<&Window> {
        self.state
            .window
            .as_ref()
            .ok_or_else(|| anyhow!("window not created"))
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        if self.exited {
            return;
        }
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut self.state) {
            debug!("event loop exited ({code})");
            self.exited = true;
        }
    }
}

impl WindowSurface for PlatformWindow {
    fn drawable_size(&self) -> RenderSize {
        self.state.size
    }

    fn should_close(&self) -> bool {
        self.state.close_requested || self.exited
    }

    fn poll_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    fn wait_events(&mut self) {
        self.pump(None);
    }
}
