//! One decoded stream drawn as an animated rectangle.

use stereo_core::{fit, CanvasSize, Rect, ShaderError, SourceConnectError, SourceRequest};
use stereo_gl::{GpuDevice, ProgramHandle, RenderContext, ShaderProgramManager, TextureHandle, Uniform};
use tracing::{debug, trace};

use crate::source::{FrameSource, SourceBinding};

/// Progress added per draw while sliding; five ticks from start to rest.
pub const ANIMATION_STEP: f32 = 0.2;

/// Colour filter phase pushed to the demosaic program: first red pixel at
/// column 1, row 0.
pub const FIRST_RED: [f32; 2] = [1.0, 0.0];

/// Uniforms the demosaic programs expect per texture.
pub const SOURCE_SIZE_UNIFORM: &str = "sourceSize";
pub const FIRST_RED_UNIFORM: &str = "firstRed";

// Progress this close to the end is treated as finished, so that five
// steps land on 1.0 despite rounding.
const PROGRESS_EPSILON: f32 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Animation {
    Idle,
    Sliding { start: Rect, progress: f32 },
}

/// Where a texture wants to be and where it currently is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub fx: f32,
    pub fy: f32,
    pub max_area: f32,
    pub destination: Rect,
    pub current: Rect,
    pub animation: Animation,
    pub canvas: Option<CanvasSize>,
}

impl Default for Placement {
    fn default() -> Self {
        let rest = Rect::new(0.0, 0.0, 4.0 / 3.0, 1.0);
        Self {
            fx: 0.0,
            fy: 0.0,
            max_area: 1.0,
            destination: rest,
            current: rest,
            animation: Animation::Idle,
            canvas: None,
        }
    }
}

impl Placement {
    pub fn progress(&self) -> f32 {
        match self.animation {
            Animation::Idle => 1.0,
            Animation::Sliding { progress, .. } => progress,
        }
    }

    /// Rectangle the current slide started from, or the resting box.
    pub fn start(&self) -> Rect {
        match self.animation {
            Animation::Idle => self.current,
            Animation::Sliding { start, .. } => start,
        }
    }

    /// Recompute the destination for a `video` sized frame, then snap to it
    /// or start sliding towards it.
    fn relayout(&mut self, video: (u32, u32), animate: bool) {
        let Some(canvas) = self.canvas.filter(|c| c.height > 0) else {
            trace!("canvas not known yet, layout deferred");
            return;
        };
        let (vw, vh) = (video.0 as f32, video.1 as f32);
        let canvas_h = canvas.height as f32;
        let scale = fit(vw, vh, canvas.width as f32 * self.max_area, canvas_h);
        let w = vw * scale / canvas_h;
        let h = vh * scale / canvas_h;
        self.destination = Rect::new(self.fx * w, self.fy * h, w, h);

        if animate {
            self.animation = Animation::Sliding {
                start: self.current,
                progress: 0.0,
            };
        } else {
            self.current = self.destination;
            self.animation = Animation::Idle;
        }
    }

    fn advance(&mut self) {
        let Animation::Sliding { start, progress } = self.animation else {
            return;
        };
        let mut progress = (progress + ANIMATION_STEP).min(1.0);
        if 1.0 - progress < PROGRESS_EPSILON {
            progress = 1.0;
        }
        self.current = Rect::interpolate(start, self.destination, progress);
        self.animation = if progress >= 1.0 {
            Animation::Idle
        } else {
            Animation::Sliding { start, progress }
        };
    }
}

/// A stream bound to a texture, drawn as a strip covering its placement.
pub struct VideoTexture {
    descriptor: String,
    texture: TextureHandle,
    binding: Option<Box<dyn SourceBinding>>,
    live: bool,
    visible: bool,
    bayer: bool,
    video_size: Option<(u32, u32)>,
    tex_extent: [f32; 2],
    placement: Placement,
    configured_program: Option<ProgramHandle>,
}

impl std::fmt::Debug for VideoTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoTexture")
            .field("descriptor", &self.descriptor)
            .field("texture", &self.texture)
            .field("live", &self.live)
            .field("visible", &self.visible)
            .field("bayer", &self.bayer)
            .field("video_size", &self.video_size)
            .field("placement", &self.placement)
            .finish_non_exhaustive()
    }
}

impl VideoTexture {
    /// Allocate a texture and attach `request` to it. The texture is
    /// released again if the source refuses.
    pub fn create(
        device: &mut dyn GpuDevice,
        source: &mut dyn FrameSource,
        request: &SourceRequest,
    ) -> Result<Self, SourceConnectError> {
        let texture = device.create_texture();
        let binding = match source.attach(request, texture) {
            Ok(binding) => binding,
            Err(err) => {
                device.delete_texture(texture);
                return Err(err);
            }
        };
        debug!(descriptor = %request.descriptor, texture = texture.0, "video texture created");

        Ok(Self {
            descriptor: request.descriptor.clone(),
            texture,
            binding: Some(binding),
            live: false,
            visible: true,
            bayer: false,
            video_size: None,
            tex_extent: [0.0, 0.0],
            placement: Placement::default(),
            configured_program: None,
        })
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_bayer(&self) -> bool {
        self.bayer
    }

    pub fn is_stopped(&self) -> bool {
        self.binding.is_none()
    }

    pub fn video_size(&self) -> Option<(u32, u32)> {
        self.video_size
    }

    pub fn tex_extent(&self) -> [f32; 2] {
        self.tex_extent
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    /// Set a new placement target. Until the first frame arrives only the
    /// values are stored; the destination is computed on going live.
    pub fn place(&mut self, fx: f32, fy: f32, max_area: f32, canvas: CanvasSize, animate: bool) {
        self.placement.fx = fx;
        self.placement.fy = fy;
        self.placement.max_area = max_area;
        self.placement.canvas = Some(canvas);
        if let Some(size) = self.video_size.filter(|_| self.live) {
            self.placement.relayout(size, animate);
        }
    }

    /// Step the slide towards the destination.
    pub fn advance_animation(&mut self) {
        self.placement.advance();
    }

    /// Pull in the newest frame and check whether the source has started
    /// delivering. Once live, stays live.
    pub fn poll_live(&mut self, device: &mut dyn GpuDevice) -> bool {
        let Some(binding) = self.binding.as_mut() else {
            return self.live;
        };
        binding.sync(device, self.texture);
        if self.live {
            return true;
        }

        let Some(size) = binding.current_size().filter(|&(w, h)| w > 0 && h > 0) else {
            return false;
        };
        // The first frame may have landed after the sync above.
        binding.sync(device, self.texture);
        self.live = true;
        self.video_size = Some(size);
        self.tex_extent = [1.0, 1.0];
        self.bayer = binding.is_bayer_format();
        self.placement.relayout(size, false);
        debug!(
            descriptor = %self.descriptor,
            width = size.0,
            height = size.1,
            bayer = self.bayer,
            "stream is live"
        );
        true
    }

    /// Draw the current frame with whatever program is installed. Does
    /// nothing until the stream is live, or while hidden.
    pub fn draw(&mut self, ctx: &mut RenderContext) -> Result<(), ShaderError> {
        let device = ctx.device.as_mut();
        if !self.poll_live(device) || !self.visible {
            return Ok(());
        }

        let current = ctx.programs.current_program();
        if current != self.configured_program {
            self.configure_program(device, &ctx.programs, current)?;
            self.configured_program = current;
        }

        self.advance_animation();
        device.bind_texture(0, self.texture);
        device.draw_textured_strip(&self.vertices(), &self.tex_coords());
        Ok(())
    }

    fn configure_program(
        &self,
        device: &mut dyn GpuDevice,
        programs: &ShaderProgramManager,
        program: Option<ProgramHandle>,
    ) -> Result<(), ShaderError> {
        let (Some(program), Some((w, h))) = (program, self.video_size) else {
            return Ok(());
        };
        if !self.bayer {
            return Ok(());
        }
        let (w, h) = (w as f32, h as f32);
        let size = programs.uniform_location(device, program, SOURCE_SIZE_UNIFORM)?;
        device.set_uniform(size, Uniform::Vec4([w, h, 1.0 / w, 1.0 / h]));
        let phase = programs.uniform_location(device, program, FIRST_RED_UNIFORM)?;
        device.set_uniform(phase, Uniform::Vec2(FIRST_RED));
        trace!(descriptor = %self.descriptor, program = program.0, "bayer uniforms pushed");
        Ok(())
    }

    /// Strip corners: upper left, lower left, upper right, lower right.
    fn vertices(&self) -> [[f32; 2]; 4] {
        let r = self.placement.current;
        [
            [r.x, r.top()],
            [r.x, r.y],
            [r.right(), r.top()],
            [r.right(), r.y],
        ]
    }

    fn tex_coords(&self) -> [[f32; 2]; 4] {
        let [w, h] = self.tex_extent;
        [[0.0, 0.0], [0.0, h], [w, 0.0], [w, h]]
    }

    /// Ask the source to stop. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(mut binding) = self.binding.take() {
            binding.detach();
            debug!(descriptor = %self.descriptor, "stream stopped");
        }
    }

    /// Stop the source and release the texture.
    pub fn destroy(mut self, device: &mut dyn GpuDevice) {
        self.stop();
        device.delete_texture(self.texture);
    }
}

impl Drop for VideoTexture {
    fn drop(&mut self) {
        self.stop();
    }
}
