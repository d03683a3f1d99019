//! Common interface to the graphics context.
//!
//! Everything the compositor does to the GPU goes through [`GpuDevice`]. The
//! raw OpenGL implementation is [`GlDevice`](crate::GlDevice); the
//! [`RecordingDevice`](crate::RecordingDevice) stands in when there is no
//! context.

use stereo_core::{Frame, ShaderStage};

/// Compiled shader stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub u32);

/// Linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

/// Texture object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// Vertex attribute slots bound by name before linking.
pub const POSITION_ATTRIBUTE: (u32, &str) = (0, "position");
pub const TEX_COORD_ATTRIBUTE: (u32, &str) = (1, "texCoord");

/// Value for a uniform of the currently bound program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Uniform {
    Int(i32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
}

/// Framebuffer blending.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum BlendMode {
    #[default]
    Disabled,
    /// Blending enabled, source replaces destination.
    Replace,
    /// Source weighted by a constant alpha over the destination.
    ConstantAlpha(f32),
}

/// Which colour channels draws may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorMask {
    pub r: bool,
    pub g: bool,
    pub b: bool,
    pub a: bool,
}

impl ColorMask {
    pub const ALL: ColorMask = ColorMask {
        r: true,
        g: true,
        b: true,
        a: true,
    };
    pub const RED: ColorMask = ColorMask {
        r: true,
        g: false,
        b: false,
        a: false,
    };
    pub const GREEN_BLUE: ColorMask = ColorMask {
        r: false,
        g: true,
        b: true,
        a: false,
    };
}

impl Default for ColorMask {
    fn default() -> Self {
        ColorMask::ALL
    }
}

/// Common interface to the single, implicit graphics context.
///
/// Coordinates passed to the draw calls are canvas units: origin at the
/// centre of the viewport, one unit per viewport height on both axes. The
/// device maps them to clip space using the last viewport it was given.
///
/// Implementations are driven from the render thread only.
pub trait GpuDevice {
    /// Downcast to a concrete type.
    fn as_any(&self) -> &dyn std::any::Any;

    /// Mutable downcast to a concrete type.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;

    /// Compile one stage from the concatenation of `sources`.
    ///
    /// Returns the info log on failure.
    fn compile_shader(&mut self, stage: ShaderStage, sources: &[&str]) -> Result<ShaderHandle, String>;

    /// Attach, link and validate. The attribute slots
    /// [`POSITION_ATTRIBUTE`] and [`TEX_COORD_ATTRIBUTE`] are bound before
    /// linking.
    ///
    /// Returns the info log on failure.
    fn link_program(&mut self, shaders: &[ShaderHandle]) -> Result<ProgramHandle, String>;

    /// Install `program`, or turn programmable shading off for `None`.
    fn use_program(&mut self, program: Option<ProgramHandle>);

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<i32>;

    /// Set a uniform of the currently installed program.
    fn set_uniform(&mut self, location: i32, value: Uniform);

    fn create_texture(&mut self) -> TextureHandle;

    fn delete_texture(&mut self, texture: TextureHandle);

    /// Replace the contents of `texture` with `frame`. `internal_format`
    /// overrides the GL internal format picked from the frame's pixel format.
    fn upload_texture(
        &mut self,
        texture: TextureHandle,
        frame: &Frame,
        internal_format: Option<u32>,
    );

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle);

    fn set_blend(&mut self, mode: BlendMode);

    fn set_color_mask(&mut self, mask: ColorMask);

    fn color_mask(&self) -> ColorMask;

    /// Draw a four-vertex triangle strip.
    fn draw_textured_strip(&mut self, vertices: &[[f32; 2]; 4], tex_coords: &[[f32; 2]; 4]);

    /// Draw line segments between consecutive pairs of `points`.
    fn draw_lines(&mut self, points: &[[f32; 2]]);

    fn set_viewport(&mut self, width: u32, height: u32);

    fn clear(&mut self, color: [f32; 3]);
}
