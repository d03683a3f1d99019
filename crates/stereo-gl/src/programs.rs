//! Shader program manager.
//!
//! Compiles and links the fixed set of program variants once, when the
//! graphics context is initialised, and tracks which program is installed.
//! Only one program can be active in a context at a time, so the "current
//! program" register lives here rather than in each caller.

use stereo_core::{ShaderError, ShaderStage};
use tracing::{debug, trace};

use crate::device::{GpuDevice, ProgramHandle, ShaderHandle, Uniform};
use crate::glsl::GlslVersion;

pub const STD_VERTEX_SOURCE: &str = include_str!("shaders/std_vert.glsl");
pub const VIDEO_FRAGMENT_SOURCE: &str = include_str!("shaders/video_frag.glsl");
pub const FLAT_FRAGMENT_SOURCE: &str = include_str!("shaders/flat_frag.glsl");

/// Preprocessor switch selecting the demosaic path.
pub const DEBAYER: &str = "DEBAYER";
/// Preprocessor switch selecting luminance output for anaglyph views.
pub const ANAGLYPH: &str = "ANAGLYPH";

/// Sampler uniform of the video programs, always texture unit 0.
pub const IMAGE_SAMPLER: &str = "image";
/// Colour uniform of the flat program.
pub const FLAT_COLOR: &str = "color";

/// The program variants built at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKey {
    Flat,
    Rgb,
    RgbAnaglyph,
    Bayer,
    BayerAnaglyph,
}

impl ProgramKey {
    pub const ALL: [ProgramKey; 5] = [
        ProgramKey::Flat,
        ProgramKey::Rgb,
        ProgramKey::RgbAnaglyph,
        ProgramKey::Bayer,
        ProgramKey::BayerAnaglyph,
    ];

    /// Video program for a source format and output.
    pub fn video(bayer: bool, anaglyph: bool) -> Self {
        match (bayer, anaglyph) {
            (false, false) => ProgramKey::Rgb,
            (false, true) => ProgramKey::RgbAnaglyph,
            (true, false) => ProgramKey::Bayer,
            (true, true) => ProgramKey::BayerAnaglyph,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ProgramKey::Flat => "Flat",
            ProgramKey::Rgb => "RGB",
            ProgramKey::RgbAnaglyph => "RGB-Anaglyph",
            ProgramKey::Bayer => "Bayer",
            ProgramKey::BayerAnaglyph => "Bayer-Anaglyph",
        }
    }

    pub fn is_bayer(self) -> bool {
        matches!(self, ProgramKey::Bayer | ProgramKey::BayerAnaglyph)
    }

    fn vertex_defines(self) -> &'static [&'static str] {
        if self.is_bayer() {
            &[DEBAYER]
        } else {
            &[]
        }
    }

    fn fragment_defines(self) -> &'static [&'static str] {
        match self {
            ProgramKey::Flat | ProgramKey::Rgb => &[],
            ProgramKey::RgbAnaglyph => &[ANAGLYPH],
            ProgramKey::Bayer => &[DEBAYER],
            ProgramKey::BayerAnaglyph => &[DEBAYER, ANAGLYPH],
        }
    }

    fn fragment_source(self) -> &'static str {
        match self {
            ProgramKey::Flat => FLAT_FRAGMENT_SOURCE,
            _ => VIDEO_FRAGMENT_SOURCE,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy)]
struct ProgramEntry {
    key: ProgramKey,
    handle: ProgramHandle,
}

/// Compiled program registry plus the current-program register.
#[derive(Debug)]
pub struct ShaderProgramManager {
    glsl: GlslVersion,
    registry: Vec<ProgramEntry>,
    flat_color: Option<i32>,
    current: Option<ProgramHandle>,
}

impl ShaderProgramManager {
    /// Empty manager; programs can be built with [`compile`](Self::compile)
    /// and [`link`](Self::link).
    pub fn new(glsl: GlslVersion) -> Self {
        Self {
            glsl,
            registry: Vec::new(),
            flat_color: None,
            current: None,
        }
    }

    /// Build every variant in [`ProgramKey::ALL`].
    ///
    /// Video programs get their `image` sampler bound to texture unit 0.
    pub fn initialize(device: &mut dyn GpuDevice, glsl: GlslVersion) -> Result<Self, ShaderError> {
        let mut manager = Self::new(glsl);

        let std_vertex = manager.compile(device, ShaderStage::Vertex, STD_VERTEX_SOURCE, &[])?;
        let bayer_vertex =
            manager.compile(device, ShaderStage::Vertex, STD_VERTEX_SOURCE, &[DEBAYER])?;

        for key in ProgramKey::ALL {
            let vertex = if key.vertex_defines().is_empty() {
                std_vertex
            } else {
                bayer_vertex
            };
            let fragment = manager.compile(
                device,
                ShaderStage::Fragment,
                key.fragment_source(),
                key.fragment_defines(),
            )?;
            let handle = manager.link(device, Some(vertex), Some(fragment), None)?;

            if key == ProgramKey::Flat {
                manager.flat_color = Some(manager.uniform_location(device, handle, FLAT_COLOR)?);
            } else {
                let sampler = manager.uniform_location(device, handle, IMAGE_SAMPLER)?;
                device.set_uniform(sampler, Uniform::Int(0));
            }

            debug!(program = key.name(), handle = handle.0, "built shader program");
            manager.registry.push(ProgramEntry { key, handle });
        }

        manager.bind(device, None);
        Ok(manager)
    }

    pub fn glsl(&self) -> GlslVersion {
        self.glsl
    }

    /// Compile one stage: version prelude, one `#define` per entry in
    /// `defines`, then `source`.
    pub fn compile(
        &self,
        device: &mut dyn GpuDevice,
        stage: ShaderStage,
        source: &str,
        defines: &[&str],
    ) -> Result<ShaderHandle, ShaderError> {
        let define_lines: String = defines.iter().map(|d| format!("#define {d}\n")).collect();
        let sources = [self.glsl.prelude(stage), define_lines.as_str(), source];

        device
            .compile_shader(stage, &sources)
            .map_err(|log| ShaderError::Compile { stage, log })
    }

    /// Link a program from the given stages and make it current.
    pub fn link(
        &mut self,
        device: &mut dyn GpuDevice,
        vertex: Option<ShaderHandle>,
        fragment: Option<ShaderHandle>,
        geometry: Option<ShaderHandle>,
    ) -> Result<ProgramHandle, ShaderError> {
        let stages: Vec<ShaderHandle> = [vertex, fragment, geometry].into_iter().flatten().collect();
        if stages.is_empty() {
            return Err(ShaderError::Configuration(
                "program requested without any shaders".into(),
            ));
        }

        let program = device
            .link_program(&stages)
            .map_err(|log| ShaderError::Link { log })?;

        // Current, so fixed uniforms can be set straight away.
        self.bind(device, Some(program));
        Ok(program)
    }

    /// Install `program`, or switch programmable shading off.
    pub fn bind(&mut self, device: &mut dyn GpuDevice, program: Option<ProgramHandle>) {
        trace!(?program, "use program");
        device.use_program(program);
        self.current = program;
    }

    /// Install the program built for `key`.
    pub fn use_variant(&mut self, device: &mut dyn GpuDevice, key: ProgramKey) {
        let program = self.program(key);
        self.bind(device, program);
    }

    pub fn current_program(&self) -> Option<ProgramHandle> {
        self.current
    }

    /// Program built for `key`, or `None` before [`initialize`](Self::initialize).
    pub fn program(&self, key: ProgramKey) -> Option<ProgramHandle> {
        self.registry
            .get(key.index())
            .filter(|entry| entry.key == key)
            .map(|entry| entry.handle)
    }

    /// Location of the flat program's colour uniform.
    pub fn flat_color_location(&self) -> Option<i32> {
        self.flat_color
    }

    pub fn uniform_location(
        &self,
        device: &mut dyn GpuDevice,
        program: ProgramHandle,
        name: &str,
    ) -> Result<i32, ShaderError> {
        device
            .uniform_location(program, name)
            .ok_or_else(|| ShaderError::UniformNotFound { name: name.into() })
    }
}
