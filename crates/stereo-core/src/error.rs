//! Error taxonomy shared by the GL and view crates.

use std::fmt;

/// Programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Geometry => "geometry",
        };
        f.write_str(name)
    }
}

/// Failures building or driving shader programs.
///
/// All of these are fatal: the shaders are fixed assets, so a failure means a
/// driver problem or a mismatch between the program manager and the GLSL
/// sources.
#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("shader configuration error: {0}")]
    Configuration(String),

    #[error("compiling {stage} shader: {log}")]
    Compile { stage: ShaderStage, log: String },

    #[error("linking shaders: {log}")]
    Link { log: String },

    #[error("{name}: no such uniform in shader")]
    UniformNotFound { name: String },
}

/// A frame source could not be attached to a video texture.
///
/// Reported to the user at stream setup; the stream is simply not created.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unable to attach `{descriptor}`: {reason}")]
pub struct SourceConnectError {
    pub descriptor: String,
    pub reason: String,
}

impl SourceConnectError {
    pub fn new(descriptor: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            reason: reason.into(),
        }
    }
}
