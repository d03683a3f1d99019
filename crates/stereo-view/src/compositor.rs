//! Two video textures composited under one display mode.
//!
//! With a single stream the compositor is mono: the stream is drawn on its
//! own with the program matching its format and the display mode is kept but
//! has no effect. With two streams, [`DisplayMode`] picks the draw pass.

use stereo_core::{CanvasSize, DisplayMode, ShaderError, SourceConnectError, SourceRequest};
use stereo_gl::{BlendMode, ColorMask, GpuDevice, ProgramKey, RenderContext, Uniform};
use tracing::{debug, error, info};

use crate::config::ViewConfig;
use crate::source::FrameSource;
use crate::video_texture::VideoTexture;

/// Anchor and width fraction for one texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub fx: f32,
    pub fy: f32,
    pub max_area: f32,
}

impl Anchor {
    const fn new(fx: f32, fy: f32, max_area: f32) -> Self {
        Self { fx, fy, max_area }
    }
}

pub const SPLIT_LEFT: Anchor = Anchor::new(-1.0, -0.5, 0.5);
pub const SPLIT_RIGHT: Anchor = Anchor::new(0.0, -0.5, 0.5);
pub const OVERLAY: Anchor = Anchor::new(-0.5, -0.5, 1.0);

/// Endpoints of the split separator, in canvas units.
pub const SEPARATOR: [[f32; 2]; 2] = [[0.0, -0.5], [0.0, 0.5]];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Result of [`StereoCompositor::set_streams`].
#[derive(Debug, Default)]
pub struct StreamSetup {
    /// Streams that could not be attached.
    pub failures: Vec<SourceConnectError>,
}

impl StreamSetup {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

type DrawPass = fn(
    &mut VideoTexture,
    &mut VideoTexture,
    &mut RenderContext,
    &ViewConfig,
) -> Result<(), ShaderError>;

/// Two-stream draw pass per display mode, indexed by the mode's value.
const DRAW_PASSES: [DrawPass; 3] = [draw_split, draw_blended, draw_anaglyph];

fn draw_pass(mode: DisplayMode) -> DrawPass {
    DRAW_PASSES[mode as usize]
}

fn draw_mono(video: &mut VideoTexture, ctx: &mut RenderContext) -> Result<(), ShaderError> {
    ctx.use_variant(ProgramKey::video(video.is_bayer(), false));
    ctx.device.set_blend(BlendMode::Disabled);
    video.draw(ctx)
}

fn draw_split(
    left: &mut VideoTexture,
    right: &mut VideoTexture,
    ctx: &mut RenderContext,
    config: &ViewConfig,
) -> Result<(), ShaderError> {
    let bayer = left.is_bayer() || right.is_bayer();
    ctx.use_variant(ProgramKey::video(bayer, false));
    ctx.device.set_blend(BlendMode::Disabled);
    left.draw(ctx)?;
    right.draw(ctx)?;

    ctx.use_variant(ProgramKey::Flat);
    if let Some(location) = ctx.programs.flat_color_location() {
        ctx.device.set_uniform(location, Uniform::Vec3(config.separator));
    }
    ctx.device.draw_lines(&SEPARATOR);
    Ok(())
}

fn draw_blended(
    left: &mut VideoTexture,
    right: &mut VideoTexture,
    ctx: &mut RenderContext,
    config: &ViewConfig,
) -> Result<(), ShaderError> {
    let bayer = left.is_bayer() || right.is_bayer();
    ctx.use_variant(ProgramKey::video(bayer, false));
    ctx.device.set_blend(BlendMode::Replace);
    left.draw(ctx)?;
    ctx.device.set_blend(BlendMode::ConstantAlpha(config.blend_alpha));
    right.draw(ctx)
}

fn draw_anaglyph(
    left: &mut VideoTexture,
    right: &mut VideoTexture,
    ctx: &mut RenderContext,
    _config: &ViewConfig,
) -> Result<(), ShaderError> {
    let bayer = left.is_bayer() || right.is_bayer();
    ctx.use_variant(ProgramKey::video(bayer, true));
    ctx.device.set_blend(BlendMode::Disabled);

    let result = draw_masked(left, right, ctx);
    ctx.device.set_color_mask(ColorMask::ALL);
    result
}

fn draw_masked(
    left: &mut VideoTexture,
    right: &mut VideoTexture,
    ctx: &mut RenderContext,
) -> Result<(), ShaderError> {
    ctx.device.set_color_mask(ColorMask::RED);
    left.draw(ctx)?;
    ctx.device.set_color_mask(ColorMask::GREEN_BLUE);
    right.draw(ctx)
}

/// Lays out and draws up to two streams.
#[derive(Debug)]
pub struct StereoCompositor {
    config: ViewConfig,
    mode: DisplayMode,
    canvas: CanvasSize,
    left: Option<VideoTexture>,
    right: Option<VideoTexture>,
}

impl StereoCompositor {
    pub fn new(config: ViewConfig, initial_mode: DisplayMode) -> Self {
        Self {
            config,
            mode: initial_mode,
            canvas: CanvasSize::default(),
            left: None,
            right: None,
        }
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    /// True unless a right stream is bound.
    pub fn is_mono(&self) -> bool {
        self.right.is_none()
    }

    pub fn left(&self) -> Option<&VideoTexture> {
        self.left.as_ref()
    }

    pub fn right(&self) -> Option<&VideoTexture> {
        self.right.as_ref()
    }

    pub fn stream(&self, side: Side) -> Option<&VideoTexture> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }

    /// Replace the current streams.
    ///
    /// Blank descriptors count as absent, and a lone right stream becomes
    /// the left one. Streams that fail to attach are reported in the
    /// returned [`StreamSetup`]; whatever attached is shown, in mono if only
    /// one did.
    pub fn set_streams(
        &mut self,
        ctx: &mut RenderContext,
        source: &mut dyn FrameSource,
        left: &str,
        right: Option<&str>,
        pipeline: Option<&str>,
    ) -> StreamSetup {
        self.release_streams(ctx.device.as_mut());

        let left = Some(left.trim()).filter(|d| !d.is_empty());
        let right = right.map(str::trim).filter(|d| !d.is_empty());
        let descriptors = match (left, right) {
            (None, right) => [right, None],
            (left, right) => [left, right],
        };

        let mut setup = StreamSetup::default();
        let mut attached = Vec::with_capacity(2);
        for descriptor in descriptors.into_iter().flatten() {
            let request = SourceRequest::new(descriptor, pipeline);
            match VideoTexture::create(ctx.device.as_mut(), source, &request) {
                Ok(video) => attached.push(video),
                Err(err) => {
                    error!("{err}");
                    setup.failures.push(err);
                }
            }
        }

        let mut attached = attached.into_iter();
        self.left = attached.next();
        self.right = attached.next();
        info!(
            left = self.left.as_ref().map(VideoTexture::descriptor),
            right = self.right.as_ref().map(VideoTexture::descriptor),
            "streams set"
        );

        self.layout(false);
        setup
    }

    /// Switch display mode and slide the streams to their new places.
    pub fn set_display_mode(&mut self, mode: DisplayMode) {
        if self.is_mono() {
            debug!(mode = mode.name(), "display mode recorded, single stream shown");
        } else {
            debug!(mode = mode.name(), "display mode");
        }
        self.mode = mode;
        self.layout(false);
    }

    /// New canvas size in pixels. Streams jump to their new places.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.canvas = CanvasSize::new(width, height);
        self.layout(true);
    }

    /// Place the streams for the current mode, animated unless `force`.
    pub fn layout(&mut self, force: bool) {
        let (left_anchor, right_anchor) = if !self.is_mono() && self.mode.is_overlay() {
            (OVERLAY, OVERLAY)
        } else {
            (SPLIT_LEFT, SPLIT_RIGHT)
        };
        let canvas = self.canvas;
        for (video, anchor) in [(&mut self.left, left_anchor), (&mut self.right, right_anchor)] {
            if let Some(video) = video {
                video.place(anchor.fx, anchor.fy, anchor.max_area, canvas, !force);
            }
        }
    }

    pub fn set_stream_visible(&mut self, side: Side, visible: bool) {
        let video = match side {
            Side::Left => self.left.as_mut(),
            Side::Right => self.right.as_mut(),
        };
        if let Some(video) = video {
            video.set_visible(visible);
        }
    }

    /// Set the viewport to the canvas and clear it.
    pub fn begin_frame(&self, ctx: &mut RenderContext) {
        ctx.device.set_viewport(self.canvas.width, self.canvas.height);
        ctx.device.clear(self.config.background);
    }

    /// Draw one frame.
    pub fn render(&mut self, ctx: &mut RenderContext) -> Result<(), ShaderError> {
        let Some(left) = self.left.as_mut() else {
            return Ok(());
        };
        // Formats are only known once live, and the program depends on them.
        left.poll_live(ctx.device.as_mut());
        match self.right.as_mut() {
            None => draw_mono(left, ctx),
            Some(right) => {
                right.poll_live(ctx.device.as_mut());
                draw_pass(self.mode)(left, right, ctx, &self.config)
            }
        }
    }

    /// Stop and release both streams. Returns the display mode to persist.
    pub fn shutdown(&mut self, ctx: &mut RenderContext) -> DisplayMode {
        self.release_streams(ctx.device.as_mut());
        ctx.programs.bind(ctx.device.as_mut(), None);
        self.mode
    }

    fn release_streams(&mut self, device: &mut dyn GpuDevice) {
        for video in [self.left.take(), self.right.take()].into_iter().flatten() {
            video.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use stereo_core::{Frame, PixelFormat};
    use stereo_gl::{Command, GlslVersion, RecordingDevice};

    use super::*;
    use crate::source::PushSource;

    fn context() -> RenderContext {
        RenderContext::new(Box::new(RecordingDevice::new()), GlslVersion::Glsl120).unwrap()
    }

    fn publish(source: &PushSource, name: &str, w: u32, h: u32, format: PixelFormat) {
        let len = (w * h) as usize * format.bytes_per_pixel();
        source
            .publisher(name)
            .unwrap()
            .publish(Frame::new(w, h, format, vec![0; len]).unwrap());
    }

    fn recording(ctx: &mut RenderContext) -> &mut RecordingDevice {
        ctx.device_as_mut::<RecordingDevice>().unwrap()
    }

    #[test]
    fn blank_left_promotes_right() {
        let mut ctx = context();
        let mut source = PushSource::new();
        let mut compositor = StereoCompositor::new(ViewConfig::default(), DisplayMode::Split);

        let setup = compositor.set_streams(&mut ctx, &mut source, "  ", Some("b.png"), Some(""));
        assert!(setup.is_complete());
        assert!(compositor.is_mono());
        assert_eq!(compositor.left().map(VideoTexture::descriptor), Some("b.png"));
    }

    #[test]
    fn blank_right_is_mono() {
        let mut ctx = context();
        let mut source = PushSource::new();
        let mut compositor = StereoCompositor::new(ViewConfig::default(), DisplayMode::Blended);

        compositor.set_streams(&mut ctx, &mut source, "a.png", Some(""), None);
        assert!(compositor.is_mono());
        assert!(compositor.right().is_none());
    }

    #[test]
    fn replacing_streams_releases_the_old_ones() {
        let mut ctx = context();
        let mut source = PushSource::new();
        let mut compositor = StereoCompositor::new(ViewConfig::default(), DisplayMode::Split);

        compositor.set_streams(&mut ctx, &mut source, "a.png", Some("b.png"), None);
        assert_eq!(recording(&mut ctx).live_textures(), 2);
        compositor.set_streams(&mut ctx, &mut source, "c.png", None, None);

        assert_eq!(recording(&mut ctx).live_textures(), 1);
        assert!(source.publisher("a.png").unwrap().is_closed());
        assert!(source.publisher("b.png").unwrap().is_closed());
        assert!(!source.publisher("c.png").unwrap().is_closed());
    }

    #[test]
    fn render_without_streams_draws_nothing() {
        let mut ctx = context();
        let mut compositor = StereoCompositor::new(ViewConfig::default(), DisplayMode::Split);
        recording(&mut ctx).clear_commands();

        compositor.render(&mut ctx).unwrap();
        assert!(recording(&mut ctx).commands().is_empty());
    }

    #[test]
    fn begin_frame_clears_to_background() {
        let mut ctx = context();
        let mut compositor =
            StereoCompositor::new(ViewConfig::with_background([0.1, 0.2, 0.3]), DisplayMode::Split);
        compositor.resize(640, 360);
        recording(&mut ctx).clear_commands();

        compositor.begin_frame(&mut ctx);
        assert_eq!(
            recording(&mut ctx).commands(),
            &[
                Command::Viewport {
                    width: 640,
                    height: 360
                },
                Command::Clear([0.1, 0.2, 0.3]),
            ]
        );
    }

    #[test]
    fn split_draws_separator_in_separator_colour() {
        let mut ctx = context();
        let mut source = PushSource::new();
        let config = ViewConfig::with_background([0.2, 0.2, 0.2]);
        let mut compositor = StereoCompositor::new(config, DisplayMode::Split);
        compositor.resize(1280, 480);
        compositor.set_streams(&mut ctx, &mut source, "a.png", Some("b.png"), None);
        publish(&source, "a.png", 640, 480, PixelFormat::Rgb8);
        publish(&source, "b.png", 640, 480, PixelFormat::Rgb8);
        recording(&mut ctx).clear_commands();

        compositor.render(&mut ctx).unwrap();

        let flat = ctx.programs.program(ProgramKey::Flat);
        let device = recording(&mut ctx);
        assert_eq!(device.draws().len(), 2);
        let color = device.commands().iter().find_map(|c| match c {
            Command::SetUniform { program, value, .. } if *program == flat => Some(*value),
            _ => None,
        });
        assert_eq!(color, Some(Uniform::Vec3([0.2, 0.2, 0.2])));
        let line = device.commands().last().unwrap();
        assert_eq!(
            line,
            &Command::DrawLines {
                program: flat,
                points: SEPARATOR.to_vec()
            }
        );
    }

    #[test]
    fn blended_weights_right_stream() {
        let mut ctx = context();
        let mut source = PushSource::new();
        let mut compositor = StereoCompositor::new(ViewConfig::default(), DisplayMode::Blended);
        compositor.resize(800, 600);
        compositor.set_streams(&mut ctx, &mut source, "a.png", Some("b.png"), None);
        publish(&source, "a.png", 320, 240, PixelFormat::Rgba8);
        publish(&source, "b.png", 320, 240, PixelFormat::Rgba8);

        compositor.render(&mut ctx).unwrap();
        let draws = recording(&mut ctx).draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].blend, BlendMode::Replace);
        assert_eq!(draws[1].blend, BlendMode::ConstantAlpha(0.5));
    }

    #[test]
    fn hiding_a_side_skips_only_that_stream() {
        let mut ctx = context();
        let mut source = PushSource::new();
        let mut compositor = StereoCompositor::new(ViewConfig::default(), DisplayMode::Split);
        compositor.resize(800, 600);
        compositor.set_streams(&mut ctx, &mut source, "a.png", Some("b.png"), None);
        publish(&source, "a.png", 320, 240, PixelFormat::Rgb8);
        publish(&source, "b.png", 320, 240, PixelFormat::Rgb8);
        compositor.set_stream_visible(Side::Right, false);

        compositor.render(&mut ctx).unwrap();
        let left_texture = compositor.stream(Side::Left).map(VideoTexture::texture);
        let draws = recording(&mut ctx).draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].texture, left_texture);
    }

    #[test]
    fn shutdown_stops_streams_and_returns_mode() {
        let mut ctx = context();
        let mut source = PushSource::new();
        let mut compositor = StereoCompositor::new(ViewConfig::default(), DisplayMode::Split);
        compositor.set_streams(&mut ctx, &mut source, "a.png", Some("b.png"), None);
        compositor.set_display_mode(DisplayMode::Anaglyph);

        assert_eq!(compositor.shutdown(&mut ctx), DisplayMode::Anaglyph);
        assert!(compositor.left().is_none());
        assert_eq!(recording(&mut ctx).live_textures(), 0);
        assert_eq!(recording(&mut ctx).current_program(), None);
        assert!(source.publisher("a.png").unwrap().is_closed());
    }
}
