// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::{fs, path::Path, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use ember_core::{init_tracing, report_fatal};
use ember_platform::{PlatformWindow, WindowConfig};
use ember_render::{Demo, FrameLoop, RenderConfig, RenderSize, WindowSurface};
use ember_render_vk::VkBackend;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// triangle | dynamic | resizable | model | instanced
    #[arg(long, default_value = "triangle")]
    demo: Demo,
    /// Frame slots; overrides the config file and the demo default.
    #[arg(long)]
    frames_in_flight: Option<usize>,
    #[arg(long, default_value = "ember.toml")]
    config: PathBuf,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
struct WindowCfg {
    title: String,
    width: u32,
    height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        let w = WindowConfig::default();
        Self {
            title: w.title,
            width: w.width,
            height: w.height,
        }
    }
}

/// Unset fields fall back to the demo's defaults.
#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq)]
#[serde(default)]
struct RenderCfg {
    clear_color: Option<[f32; 4]>,
    frames_in_flight: Option<usize>,
    max_samples: Option<u32>,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
struct AppCfg {
    window: WindowCfg,
    render: RenderCfg,
}

fn parse_cfg(text: &str) -> Result<AppCfg> {
    toml::from_str(text).context("parse config")
}

fn load_cfg(path: &Path) -> AppCfg {
    let text = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return AppCfg::default(),
    };
    match parse_cfg(&text) {
        Ok(cfg) => {
            info!("config loaded from {}", path.display());
            cfg
        }
        Err(e) => {
            warn!("ignoring {}: {e:#}", path.display());
            AppCfg::default()
        }
    }
}

/// CLI beats file beats demo defaults.
fn render_config(demo: Demo, cfg: &RenderCfg, cli_frames: Option<usize>) -> Result<RenderConfig> {
    let mut rc = RenderConfig::for_demo(demo);
    if let Some(c) = cfg.clear_color {
        rc.clear_color = c;
    }
    if let Some(s) = cfg.max_samples {
        rc.max_samples = s.max(1);
    }
    if let Some(n) = cli_frames.or(cfg.frames_in_flight) {
        if n == 0 {
            bail!("frames in flight must be at least 1");
        }
        rc.frames_in_flight = n;
    }
    Ok(rc)
}

fn window_config(cfg: &WindowCfg, rc: &RenderConfig) -> WindowConfig {
    WindowConfig {
        title: format!("{} - {}", cfg.title, rc.demo.name()),
        width: cfg.width,
        height: cfg.height,
        resizable: rc.resizable(),
    }
}

fn run(args: Args) -> Result<()> {
    let cfg = load_cfg(&args.config);
    let config = render_config(args.demo, &cfg.render, args.frames_in_flight)?;
    info!(
        "demo = {}, frames in flight = {}, features = {:?}",
        config.demo.name(),
        config.frames_in_flight,
        config.features
    );

    // Declared first so it outlives the loop and the backend.
    let mut window = PlatformWindow::new(window_config(&cfg.window, &config))?;
    let size: RenderSize = window.drawable_size();

    let handle = window.window()?;
    let backend = VkBackend::new(handle, handle, c"ember", &config, size)?;
    let mut frame_loop = FrameLoop::new(backend, &config, size)?;

    frame_loop.run(&mut window)?;
    let stats = frame_loop.stats();
    info!(
        "closed after {} frames ({} skipped, {} rebuilds)",
        stats.presented, stats.skipped, stats.rebuilds
    );
    frame_loop.shutdown()
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    run(args).inspect_err(report_fatal)
}
