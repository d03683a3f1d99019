//! Window shell around the stereo compositor.
//!
//! Keys: `1` split, `2` blended, `3` anaglyph, `L`/`R` hide or show a side,
//! `Esc` quits. The display mode in use at exit is saved for next time.

mod prefs;
mod sources;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use glium::backend::glutin::SimpleWindowBuilder;
use glium::glutin::surface::WindowSurface;
use glium::winit::application::ApplicationHandler;
use glium::winit::event::{ElementState, WindowEvent};
use glium::winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use glium::winit::keyboard::{Key, NamedKey};
use glium::winit::window::{Window, WindowId};
use glium::Display;
use stereo_core::DisplayMode;
use stereo_gl::{best_glsl_version, GlDevice, GlslVersion, RecordingDevice, RenderContext};
use stereo_view::{Side, StereoCompositor, ViewConfig, VideoTexture};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::prefs::Preferences;
use crate::sources::LocalSource;

const TICK: Duration = Duration::from_millis(16);
const DRY_RUN_TICKS: usize = 8;

#[derive(Debug, Clone, Parser)]
#[command(name = "stereo-preview", about = "Preview a pair of video streams as stereo")]
struct Args {
    /// Left stream: an image file, `pattern:WxH` or `pattern-bayer:WxH`.
    #[arg(long, default_value = "")]
    left: String,

    /// Right stream. Without one the left stream is shown alone.
    #[arg(long)]
    right: Option<String>,

    /// Pipeline description replacing the default for the descriptor kind.
    /// `{source}` is replaced by the descriptor.
    #[arg(long)]
    pipeline: Option<String>,

    /// split, blended or anaglyph. Defaults to the mode saved at last exit.
    #[arg(long)]
    mode: Option<DisplayMode>,

    /// Initial window size.
    #[arg(long, default_value = "1280x480", value_parser = parse_size)]
    size: (u32, u32),

    /// Render a few frames without a window and print the GPU commands.
    #[arg(long)]
    dry_run: bool,
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{value}`"))?;
    let parse = |s: &str| s.trim().parse::<u32>().map_err(|e| format!("`{s}`: {e}"));
    Ok((parse(w)?, parse(h)?))
}

struct Preview {
    ctx: RenderContext,
    compositor: StereoCompositor,
    display: Display<WindowSurface>,
    window: Window,
}

impl Preview {
    fn draw(&mut self) -> Result<()> {
        self.compositor.begin_frame(&mut self.ctx);
        self.compositor.render(&mut self.ctx)?;
        self.display.swap_buffers()?;
        Ok(())
    }

    fn toggle(&mut self, side: Side) {
        let visible = self
            .compositor
            .stream(side)
            .is_some_and(VideoTexture::is_visible);
        self.compositor.set_stream_visible(side, !visible);
    }
}

struct App {
    preview: Option<Preview>,
    exit_mode: Option<DisplayMode>,
    failure: Option<anyhow::Error>,
}

impl App {
    fn close(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut preview) = self.preview.take() {
            self.exit_mode = Some(preview.compositor.shutdown(&mut preview.ctx));
        }
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.failure = Some(err);
        self.close(event_loop);
    }
}

impl ApplicationHandler for App {
    // The window is created up front in `open`.
    fn resumed(&mut self, _event_loop: &ActiveEventLoop) {}

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(preview) = self.preview.as_mut() else {
            return;
        };
        match event {
            WindowEvent::CloseRequested => self.close(event_loop),
            WindowEvent::Resized(size) => {
                preview.display.resize((size.width, size.height));
                preview.compositor.resize(size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = preview.draw() {
                    self.fail(event_loop, err);
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                let compositor = &mut preview.compositor;
                match event.logical_key.as_ref() {
                    Key::Named(NamedKey::Escape) => self.close(event_loop),
                    Key::Character("1") => compositor.set_display_mode(DisplayMode::Split),
                    Key::Character("2") => compositor.set_display_mode(DisplayMode::Blended),
                    Key::Character("3") => compositor.set_display_mode(DisplayMode::Anaglyph),
                    Key::Character("l" | "L") => preview.toggle(Side::Left),
                    Key::Character("r" | "R") => preview.toggle(Side::Right),
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(preview) = &self.preview {
            preview.window.request_redraw();
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + TICK));
    }
}

/// Create the window and GL context, build the programs and attach the
/// streams.
fn open(args: &Args, mode: DisplayMode, event_loop: &EventLoop<()>) -> Result<Preview> {
    let (width, height) = args.size;
    let (window, display) = SimpleWindowBuilder::new()
        .with_title("Stereo Preview")
        .with_inner_size(width, height)
        .build(event_loop);
    let opengl_version = display.get_opengl_version_string();
    debug!("OPENGL_VERSION {}", opengl_version);

    let glsl = best_glsl_version(&display)
        .context("the GL context supports neither GLSL 1.40 nor 1.20")?;
    let device = GlDevice::new()?;
    let mut ctx = RenderContext::new(Box::new(device), glsl)?;

    let mut compositor = StereoCompositor::new(ViewConfig::default(), mode);
    let size = window.inner_size();
    compositor.resize(size.width, size.height);
    attach_streams(&mut compositor, &mut ctx, args);

    Ok(Preview {
        ctx,
        compositor,
        display,
        window,
    })
}

fn attach_streams(compositor: &mut StereoCompositor, ctx: &mut RenderContext, args: &Args) {
    let setup = compositor.set_streams(
        ctx,
        &mut LocalSource,
        &args.left,
        args.right.as_deref(),
        args.pipeline.as_deref(),
    );
    for failure in &setup.failures {
        eprintln!("{failure}");
    }
    if compositor.left().is_none() {
        warn!("no stream to show");
    }
}

/// Run the compositor against a recording device and print what the last
/// frame sent to the GPU.
fn dry_run(args: &Args, mode: DisplayMode) -> Result<()> {
    let mut ctx = RenderContext::new(Box::new(RecordingDevice::new()), GlslVersion::Glsl140)?;
    let mut compositor = StereoCompositor::new(ViewConfig::default(), mode);
    compositor.resize(args.size.0, args.size.1);
    attach_streams(&mut compositor, &mut ctx, args);

    for _ in 0..DRY_RUN_TICKS {
        if let Some(device) = ctx.device_as_mut::<RecordingDevice>() {
            device.clear_commands();
        }
        compositor.begin_frame(&mut ctx);
        compositor.render(&mut ctx)?;
        std::thread::sleep(TICK);
    }

    if let Some(device) = ctx.device_as::<RecordingDevice>() {
        for command in device.commands() {
            println!("{command:?}");
        }
    }
    compositor.shutdown(&mut ctx);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let prefs_path: Option<PathBuf> = Preferences::default_path();
    let mut prefs = prefs_path
        .as_deref()
        .map(Preferences::load_or_default)
        .unwrap_or_default();
    let mode = args.mode.unwrap_or_else(|| prefs.display_mode());
    info!(mode = mode.name(), "starting");

    if args.dry_run {
        return dry_run(&args, mode);
    }

    let event_loop = EventLoop::builder().build()?;
    let mut app = App {
        preview: Some(open(&args, mode, &event_loop)?),
        exit_mode: None,
        failure: None,
    };
    event_loop.run_app(&mut app)?;

    if let (Some(mode), Some(path)) = (app.exit_mode, prefs_path.as_deref()) {
        prefs.set_display_mode(mode);
        if let Err(err) = prefs.save(path) {
            warn!("{err:#}");
        }
    }
    match app.failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
