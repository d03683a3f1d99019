//! [`RecordingDevice`]: a headless [`GpuDevice`] that records commands.
//!
//! No GL context is needed. Handles are allocated from a counter, uniform
//! locations come from the `uniform` declarations that survive a minimal
//! `#ifdef` pass over the attached sources, and every draw captures the
//! program, texture, blend mode and colour mask in effect. Compile and link
//! failures can be injected.

use std::collections::{HashMap, HashSet};

use stereo_core::{Frame, PixelFormat, ShaderStage};

use crate::device::{
    BlendMode, ColorMask, GpuDevice, ProgramHandle, ShaderHandle, TextureHandle, Uniform,
};

/// One textured strip as it reached the device.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub program: Option<ProgramHandle>,
    pub texture: Option<TextureHandle>,
    pub blend: BlendMode,
    pub color_mask: ColorMask,
    pub vertices: [[f32; 2]; 4],
    pub tex_coords: [[f32; 2]; 4],
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CompileShader {
        stage: ShaderStage,
        shader: ShaderHandle,
    },
    LinkProgram {
        program: ProgramHandle,
        shaders: Vec<ShaderHandle>,
    },
    UseProgram(Option<ProgramHandle>),
    SetUniform {
        program: Option<ProgramHandle>,
        location: i32,
        value: Uniform,
    },
    CreateTexture(TextureHandle),
    DeleteTexture(TextureHandle),
    UploadTexture {
        texture: TextureHandle,
        width: u32,
        height: u32,
        format: PixelFormat,
        internal_format: Option<u32>,
    },
    BindTexture {
        unit: u32,
        texture: TextureHandle,
    },
    SetBlend(BlendMode),
    SetColorMask(ColorMask),
    DrawStrip(DrawRecord),
    DrawLines {
        program: Option<ProgramHandle>,
        points: Vec<[f32; 2]>,
    },
    Viewport {
        width: u32,
        height: u32,
    },
    Clear([f32; 3]),
}

#[derive(Debug)]
struct ProgramRecord {
    sources: Vec<String>,
    uniforms: Vec<String>,
}

/// Headless device that records everything it is asked to do.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    next_id: u32,
    shaders: HashMap<ShaderHandle, (ShaderStage, String)>,
    programs: HashMap<ProgramHandle, ProgramRecord>,
    textures: HashSet<TextureHandle>,
    current_program: Option<ProgramHandle>,
    bound_textures: HashMap<u32, TextureHandle>,
    blend: BlendMode,
    color_mask: ColorMask,
    viewport: (u32, u32),
    commands: Vec<Command>,
    fail_compile: Option<String>,
    fail_link: bool,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any compile whose source contains `needle`.
    pub fn fail_compile_containing(&mut self, needle: &str) {
        self.fail_compile = Some(needle.to_owned());
    }

    /// Fail every link while `fail` is set.
    pub fn fail_link(&mut self, fail: bool) {
        self.fail_link = fail;
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Drop the recorded commands, keeping device state.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Textured strips drawn since the last [`clear_commands`](Self::clear_commands).
    pub fn draws(&self) -> Vec<&DrawRecord> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawStrip(draw) => Some(draw),
                _ => None,
            })
            .collect()
    }

    pub fn current_program(&self) -> Option<ProgramHandle> {
        self.current_program
    }

    pub fn blend(&self) -> BlendMode {
        self.blend
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Full text of each stage attached to `program`, in attach order.
    pub fn program_sources(&self, program: ProgramHandle) -> Option<&[String]> {
        self.programs.get(&program).map(|p| p.sources.as_slice())
    }

    /// Location a uniform would have, without recording anything.
    pub fn uniform_location_of(&self, program: ProgramHandle, name: &str) -> Option<i32> {
        self.programs
            .get(&program)?
            .uniforms
            .iter()
            .position(|u| u == name)
            .map(|i| i as i32)
    }

    fn next_handle(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

/// Uniform names declared in `source` outside disabled `#ifdef` blocks.
fn active_uniforms(source: &str) -> Vec<String> {
    let mut defined: HashSet<String> = HashSet::new();
    // (parent active, this branch active)
    let mut stack: Vec<(bool, bool)> = Vec::new();
    let mut uniforms = Vec::new();

    for line in source.lines().map(str::trim) {
        let active = stack.last().map_or(true, |&(_, branch)| branch);
        let mut words = line.split_whitespace();
        match words.next() {
            Some("#ifdef") | Some("#ifndef") => {
                let name = words.next().unwrap_or_default();
                let is_defined = defined.contains(name);
                let branch = if line.starts_with("#ifdef") {
                    is_defined
                } else {
                    !is_defined
                };
                stack.push((active, active && branch));
            }
            Some("#else") => {
                if let Some((parent, branch)) = stack.pop() {
                    stack.push((parent, parent && !branch));
                }
            }
            Some("#endif") => {
                stack.pop();
            }
            Some("#define") if active => {
                if let Some(name) = words.next() {
                    defined.insert(name.to_owned());
                }
            }
            Some("uniform") if active => {
                if let Some(name) = words.last() {
                    uniforms.push(name.trim_end_matches(';').to_owned());
                }
            }
            _ => {}
        }
    }
    uniforms
}

impl GpuDevice for RecordingDevice {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn compile_shader(&mut self, stage: ShaderStage, sources: &[&str]) -> Result<ShaderHandle, String> {
        let text = sources.concat();
        if let Some(needle) = &self.fail_compile {
            if text.contains(needle.as_str()) {
                return Err(format!("0:1: injected failure ({needle})"));
            }
        }
        let shader = ShaderHandle(self.next_handle());
        self.shaders.insert(shader, (stage, text));
        self.commands.push(Command::CompileShader { stage, shader });
        Ok(shader)
    }

    fn link_program(&mut self, shaders: &[ShaderHandle]) -> Result<ProgramHandle, String> {
        if self.fail_link {
            return Err("injected link failure".into());
        }
        let mut sources = Vec::with_capacity(shaders.len());
        let mut uniforms = Vec::new();
        for shader in shaders {
            let (_, text) = self
                .shaders
                .get(shader)
                .ok_or_else(|| format!("unknown shader {}", shader.0))?;
            for name in active_uniforms(text) {
                if !uniforms.contains(&name) {
                    uniforms.push(name);
                }
            }
            sources.push(text.clone());
        }
        let program = ProgramHandle(self.next_handle());
        self.programs.insert(program, ProgramRecord { sources, uniforms });
        self.commands.push(Command::LinkProgram {
            program,
            shaders: shaders.to_vec(),
        });
        Ok(program)
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.current_program = program;
        self.commands.push(Command::UseProgram(program));
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<i32> {
        self.uniform_location_of(program, name)
    }

    fn set_uniform(&mut self, location: i32, value: Uniform) {
        self.commands.push(Command::SetUniform {
            program: self.current_program,
            location,
            value,
        });
    }

    fn create_texture(&mut self) -> TextureHandle {
        let texture = TextureHandle(self.next_handle());
        self.textures.insert(texture);
        self.commands.push(Command::CreateTexture(texture));
        texture
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
        self.bound_textures.retain(|_, t| *t != texture);
        self.commands.push(Command::DeleteTexture(texture));
    }

    fn upload_texture(
        &mut self,
        texture: TextureHandle,
        frame: &Frame,
        internal_format: Option<u32>,
    ) {
        self.commands.push(Command::UploadTexture {
            texture,
            width: frame.width,
            height: frame.height,
            format: frame.format,
            internal_format,
        });
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        self.bound_textures.insert(unit, texture);
        self.commands.push(Command::BindTexture { unit, texture });
    }

    fn set_blend(&mut self, mode: BlendMode) {
        self.blend = mode;
        self.commands.push(Command::SetBlend(mode));
    }

    fn set_color_mask(&mut self, mask: ColorMask) {
        self.color_mask = mask;
        self.commands.push(Command::SetColorMask(mask));
    }

    fn color_mask(&self) -> ColorMask {
        self.color_mask
    }

    fn draw_textured_strip(&mut self, vertices: &[[f32; 2]; 4], tex_coords: &[[f32; 2]; 4]) {
        self.commands.push(Command::DrawStrip(DrawRecord {
            program: self.current_program,
            texture: self.bound_textures.get(&0).copied(),
            blend: self.blend,
            color_mask: self.color_mask,
            vertices: *vertices,
            tex_coords: *tex_coords,
        }));
    }

    fn draw_lines(&mut self, points: &[[f32; 2]]) {
        self.commands.push(Command::DrawLines {
            program: self.current_program,
            points: points.to_vec(),
        });
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.commands.push(Command::Viewport { width, height });
    }

    fn clear(&mut self, color: [f32; 3]) {
        self.commands.push(Command::Clear(color));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ifdef_blocks_hide_uniforms() {
        let src = "#define DEBAYER\nuniform sampler2D image;\n#ifdef DEBAYER\nuniform vec4 sourceSize;\n#else\nuniform float unused;\n#endif\n#ifdef ANAGLYPH\nuniform vec3 tint;\n#endif\n";
        assert_eq!(active_uniforms(src), vec!["image", "sourceSize"]);
    }

    #[test]
    fn nested_conditionals_respect_parent() {
        let src = "#ifdef A\n#ifndef B\nuniform int x;\n#endif\n#endif\nuniform int y;\n";
        assert_eq!(active_uniforms(src), vec!["y"]);
    }

    #[test]
    fn draws_capture_state() {
        let mut device = RecordingDevice::new();
        let texture = device.create_texture();
        device.bind_texture(0, texture);
        device.set_color_mask(ColorMask::RED);
        device.draw_textured_strip(&[[0.0; 2]; 4], &[[0.0; 2]; 4]);

        let draws = device.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].texture, Some(texture));
        assert_eq!(draws[0].color_mask, ColorMask::RED);
        assert_eq!(draws[0].program, None);
    }
}
