//! [`GlDevice`]: [`GpuDevice`] over the current OpenGL context.
//!
//! Geometry is streamed through a single vertex buffer with one vertex array
//! object, interleaved as `(x, y, u, v)`. Canvas units are mapped to clip
//! space on the CPU, so the shaders never need a projection uniform.

use std::ffi::CString;

use anyhow::Result;
use gl::types::{GLchar, GLenum, GLint, GLsizei, GLsizeiptr, GLuint};
use stereo_core::{CanvasSize, Frame, PixelFormat, ShaderStage};
use tracing::{debug, warn};

use crate::device::{
    BlendMode, ColorMask, GpuDevice, ProgramHandle, ShaderHandle, TextureHandle, Uniform,
    POSITION_ATTRIBUTE, TEX_COORD_ATTRIBUTE,
};
use crate::gl_backend;

const FLOATS_PER_VERTEX: usize = 4;

/// Raw OpenGL device.
pub struct GlDevice {
    vao: GLuint,
    vbo: GLuint,
    viewport: CanvasSize,
    color_mask: ColorMask,
}

impl GlDevice {
    /// Create a device on the context the caller has made current.
    ///
    /// Loads GL function pointers on first use and puts the context in the
    /// state the compositor expects: no depth test, no blending, full colour
    /// mask.
    pub fn new() -> Result<Self> {
        gl_backend::load_gl_functions();
        if !gl_backend::is_context_current() {
            anyhow::bail!("no current OpenGL context");
        }
        gl_backend::clear_gl_errors();

        debug!(
            version = gl_backend::gl_string(gl::VERSION).as_deref().unwrap_or("?"),
            renderer = gl_backend::gl_string(gl::RENDERER).as_deref().unwrap_or("?"),
            glsl = gl_backend::gl_string(gl::SHADING_LANGUAGE_VERSION)
                .as_deref()
                .unwrap_or("?"),
            "OpenGL context"
        );

        let mut vao = 0;
        let mut vbo = 0;
        unsafe {
            gl::GenVertexArrays(1, &mut vao);
            gl::GenBuffers(1, &mut vbo);
            if vao == 0 || vbo == 0 {
                anyhow::bail!("failed to create vertex array / buffer");
            }

            gl::BindVertexArray(vao);
            gl::BindBuffer(gl::ARRAY_BUFFER, vbo);
            let stride = (FLOATS_PER_VERTEX * std::mem::size_of::<f32>()) as GLsizei;
            gl::EnableVertexAttribArray(POSITION_ATTRIBUTE.0);
            gl::VertexAttribPointer(
                POSITION_ATTRIBUTE.0,
                2,
                gl::FLOAT,
                gl::FALSE,
                stride,
                std::ptr::null(),
            );
            gl::EnableVertexAttribArray(TEX_COORD_ATTRIBUTE.0);
            gl::VertexAttribPointer(
                TEX_COORD_ATTRIBUTE.0,
                2,
                gl::FLOAT,
                gl::FALSE,
                stride,
                (2 * std::mem::size_of::<f32>()) as *const _,
            );

            gl::Disable(gl::DEPTH_TEST);
            gl::Disable(gl::BLEND);
            gl::ColorMask(gl::TRUE, gl::TRUE, gl::TRUE, gl::TRUE);
            gl::PixelStorei(gl::UNPACK_ALIGNMENT, 1);
        }

        Ok(Self {
            vao,
            vbo,
            viewport: CanvasSize::default(),
            color_mask: ColorMask::ALL,
        })
    }

    /// Map canvas units to clip space for the current viewport.
    fn to_clip(&self, [x, y]: [f32; 2]) -> [f32; 2] {
        let aspect = self.viewport.aspect();
        let sx = if aspect > 0.0 { 2.0 / aspect } else { 0.0 };
        [x * sx, y * 2.0]
    }

    fn stream_vertices(&self, data: &[f32]) {
        unsafe {
            gl::BindVertexArray(self.vao);
            gl::BindBuffer(gl::ARRAY_BUFFER, self.vbo);
            gl::BufferData(
                gl::ARRAY_BUFFER,
                std::mem::size_of_val(data) as GLsizeiptr,
                data.as_ptr().cast(),
                gl::STREAM_DRAW,
            );
        }
    }

    fn shader_log(shader: GLuint) -> String {
        unsafe {
            let mut len: GLint = 0;
            gl::GetShaderiv(shader, gl::INFO_LOG_LENGTH, &mut len);
            let mut buf = vec![0u8; len.max(1) as usize];
            let mut written: GLsizei = 0;
            gl::GetShaderInfoLog(shader, len, &mut written, buf.as_mut_ptr() as *mut GLchar);
            buf.truncate(written.max(0) as usize);
            String::from_utf8_lossy(&buf).into_owned()
        }
    }

    fn program_log(program: GLuint) -> String {
        unsafe {
            let mut len: GLint = 0;
            gl::GetProgramiv(program, gl::INFO_LOG_LENGTH, &mut len);
            let mut buf = vec![0u8; len.max(1) as usize];
            let mut written: GLsizei = 0;
            gl::GetProgramInfoLog(program, len, &mut written, buf.as_mut_ptr() as *mut GLchar);
            buf.truncate(written.max(0) as usize);
            String::from_utf8_lossy(&buf).into_owned()
        }
    }
}

fn stage_enum(stage: ShaderStage) -> GLenum {
    match stage {
        ShaderStage::Vertex => gl::VERTEX_SHADER,
        ShaderStage::Fragment => gl::FRAGMENT_SHADER,
        ShaderStage::Geometry => gl::GEOMETRY_SHADER,
    }
}

fn gl_bool(b: bool) -> gl::types::GLboolean {
    if b {
        gl::TRUE
    } else {
        gl::FALSE
    }
}

impl GpuDevice for GlDevice {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn compile_shader(&mut self, stage: ShaderStage, sources: &[&str]) -> Result<ShaderHandle, String> {
        let ptrs: Vec<*const GLchar> = sources.iter().map(|s| s.as_ptr() as *const GLchar).collect();
        let lens: Vec<GLint> = sources.iter().map(|s| s.len() as GLint).collect();

        unsafe {
            let shader = gl::CreateShader(stage_enum(stage));
            if shader == 0 {
                return Err(format!("glCreateShader({stage}) failed"));
            }
            gl::ShaderSource(shader, sources.len() as GLsizei, ptrs.as_ptr(), lens.as_ptr());
            gl::CompileShader(shader);

            let mut status: GLint = 0;
            gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut status);
            if status == 0 {
                let log = Self::shader_log(shader);
                gl::DeleteShader(shader);
                return Err(log);
            }
            Ok(ShaderHandle(shader))
        }
    }

    fn link_program(&mut self, shaders: &[ShaderHandle]) -> Result<ProgramHandle, String> {
        unsafe {
            let program = gl::CreateProgram();
            if program == 0 {
                return Err("glCreateProgram failed".into());
            }
            for shader in shaders {
                gl::AttachShader(program, shader.0);
            }
            for (slot, name) in [POSITION_ATTRIBUTE, TEX_COORD_ATTRIBUTE] {
                let cname = CString::new(name).map_err(|e| e.to_string())?;
                gl::BindAttribLocation(program, slot, cname.as_ptr());
            }
            gl::LinkProgram(program);

            let mut status: GLint = 0;
            gl::GetProgramiv(program, gl::LINK_STATUS, &mut status);
            if status == 0 {
                let log = Self::program_log(program);
                gl::DeleteProgram(program);
                return Err(log);
            }

            // Validation needs the vertex array the draws will use.
            gl::BindVertexArray(self.vao);
            gl::ValidateProgram(program);
            gl::GetProgramiv(program, gl::VALIDATE_STATUS, &mut status);
            if status == 0 {
                let log = Self::program_log(program);
                gl::DeleteProgram(program);
                return Err(format!("validating program: {log}"));
            }
            Ok(ProgramHandle(program))
        }
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        unsafe { gl::UseProgram(program.map_or(0, |p| p.0)) };
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<i32> {
        let cname = CString::new(name).ok()?;
        let location = unsafe { gl::GetUniformLocation(program.0, cname.as_ptr()) };
        (location >= 0).then_some(location)
    }

    fn set_uniform(&mut self, location: i32, value: Uniform) {
        unsafe {
            match value {
                Uniform::Int(v) => gl::Uniform1i(location, v),
                Uniform::Vec2([x, y]) => gl::Uniform2f(location, x, y),
                Uniform::Vec3([x, y, z]) => gl::Uniform3f(location, x, y, z),
                Uniform::Vec4([x, y, z, w]) => gl::Uniform4f(location, x, y, z, w),
            }
        }
    }

    fn create_texture(&mut self) -> TextureHandle {
        let mut tex: GLuint = 0;
        unsafe {
            gl::GenTextures(1, &mut tex);
            gl::BindTexture(gl::TEXTURE_2D, tex);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as i32);
            gl::BindTexture(gl::TEXTURE_2D, 0);
        }
        TextureHandle(tex)
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        if texture.0 != 0 {
            unsafe { gl::DeleteTextures(1, &texture.0) };
        }
    }

    fn upload_texture(
        &mut self,
        texture: TextureHandle,
        frame: &Frame,
        internal_format: Option<u32>,
    ) {
        let (default_internal, format) = match frame.format {
            PixelFormat::Rgba8 => (gl::RGBA8, gl::RGBA),
            PixelFormat::Rgb8 => (gl::RGB8, gl::RGB),
            PixelFormat::Bayer8 => (gl::R8, gl::RED),
        };
        let internal = internal_format.unwrap_or(default_internal);
        // Mosaic samples must not be blended with their neighbours.
        let filter = if frame.format.is_bayer() {
            gl::NEAREST
        } else {
            gl::LINEAR
        };
        unsafe {
            gl::BindTexture(gl::TEXTURE_2D, texture.0);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, filter as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, filter as i32);
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                internal as GLint,
                frame.width as GLsizei,
                frame.height as GLsizei,
                0,
                format,
                gl::UNSIGNED_BYTE,
                frame.data.as_ptr().cast(),
            );
            let err = gl::GetError();
            if err != gl::NO_ERROR {
                warn!(error = err, texture = texture.0, "texture upload failed");
            }
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        unsafe {
            gl::ActiveTexture(gl::TEXTURE0 + unit);
            gl::BindTexture(gl::TEXTURE_2D, texture.0);
        }
    }

    fn set_blend(&mut self, mode: BlendMode) {
        unsafe {
            match mode {
                BlendMode::Disabled => gl::Disable(gl::BLEND),
                BlendMode::Replace => {
                    gl::Enable(gl::BLEND);
                    gl::BlendColor(1.0, 1.0, 1.0, 1.0);
                    gl::BlendFunc(gl::ONE, gl::ZERO);
                }
                BlendMode::ConstantAlpha(alpha) => {
                    gl::Enable(gl::BLEND);
                    gl::BlendColor(1.0, 1.0, 1.0, alpha);
                    gl::BlendFunc(gl::CONSTANT_ALPHA, gl::ONE_MINUS_CONSTANT_ALPHA);
                }
            }
        }
    }

    fn set_color_mask(&mut self, mask: ColorMask) {
        unsafe {
            gl::ColorMask(gl_bool(mask.r), gl_bool(mask.g), gl_bool(mask.b), gl_bool(mask.a));
        }
        self.color_mask = mask;
    }

    fn color_mask(&self) -> ColorMask {
        self.color_mask
    }

    fn draw_textured_strip(&mut self, vertices: &[[f32; 2]; 4], tex_coords: &[[f32; 2]; 4]) {
        let mut data = [0.0f32; 4 * FLOATS_PER_VERTEX];
        for (i, (v, t)) in vertices.iter().zip(tex_coords).enumerate() {
            let [x, y] = self.to_clip(*v);
            data[i * FLOATS_PER_VERTEX..(i + 1) * FLOATS_PER_VERTEX].copy_from_slice(&[x, y, t[0], t[1]]);
        }
        self.stream_vertices(&data);
        unsafe { gl::DrawArrays(gl::TRIANGLE_STRIP, 0, 4) };
    }

    fn draw_lines(&mut self, points: &[[f32; 2]]) {
        if points.len() < 2 {
            return;
        }
        let data: Vec<f32> = points
            .iter()
            .flat_map(|p| {
                let [x, y] = self.to_clip(*p);
                [x, y, 0.0, 0.0]
            })
            .collect();
        self.stream_vertices(&data);
        unsafe { gl::DrawArrays(gl::LINES, 0, points.len() as GLsizei) };
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = CanvasSize::new(width, height);
        unsafe { gl::Viewport(0, 0, width as GLsizei, height as GLsizei) };
    }

    fn clear(&mut self, color: [f32; 3]) {
        unsafe {
            gl::ClearColor(color[0], color[1], color[2], 0.0);
            gl::Clear(gl::COLOR_BUFFER_BIT);
        }
    }
}

impl Drop for GlDevice {
    fn drop(&mut self) {
        if !gl_backend::is_context_current() {
            return;
        }
        unsafe {
            gl::UseProgram(0);
            if self.vbo != 0 {
                gl::DeleteBuffers(1, &self.vbo);
            }
            if self.vao != 0 {
                gl::BindVertexArray(0);
                gl::DeleteVertexArrays(1, &self.vao);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_with_viewport(w: u32, h: u32) -> GlDevice {
        GlDevice {
            vao: 0,
            vbo: 0,
            viewport: CanvasSize::new(w, h),
            color_mask: ColorMask::ALL,
        }
    }

    #[test]
    fn canvas_units_map_to_clip_space() {
        let device = device_with_viewport(800, 400);
        // Half a canvas height up is the top edge.
        assert_eq!(device.to_clip([0.0, 0.5]), [0.0, 1.0]);
        // The right edge is at aspect / 2 canvas units.
        assert_eq!(device.to_clip([1.0, 0.0]), [1.0, 0.0]);
        assert_eq!(device.to_clip([-1.0, -0.5]), [-1.0, -1.0]);
    }

    #[test]
    fn collapsed_viewport_flattens_horizontally() {
        let device = device_with_viewport(800, 0);
        assert_eq!(device.to_clip([1.0, 0.5]), [0.0, 1.0]);
    }
}
