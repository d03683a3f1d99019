//! OpenGL side of the stereo preview.
//!
//! - [`GpuDevice`] is the seam between the compositor and the graphics
//!   context. [`GlDevice`] drives a real context through raw `gl` calls;
//!   [`RecordingDevice`] records commands when there is none.
//! - [`ShaderProgramManager`] builds the fixed program variants and owns the
//!   current-program register.
//! - [`glsl`] detects the GLSL dialect through glium's capabilities.
//!
//! ### Warning
//!
//! [`GlDevice`] assumes the shell keeps the GL context current on the render
//! thread for as long as the device lives.

pub mod device;
pub mod gl_backend;
pub mod gl_device;
pub mod glsl;
pub mod programs;
pub mod recording;

pub use device::{
    BlendMode, ColorMask, GpuDevice, ProgramHandle, ShaderHandle, TextureHandle, Uniform,
};
pub use gl_device::GlDevice;
pub use glsl::{best_glsl_version, GlslVersion};
pub use programs::{ProgramKey, ShaderProgramManager};
pub use recording::{Command, DrawRecord, RecordingDevice};

/// Everything a draw needs: the device plus the program manager that tracks
/// which of its programs is installed.
pub struct RenderContext {
    pub device: Box<dyn GpuDevice>,
    pub programs: ShaderProgramManager,
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("programs", &self.programs)
            .finish_non_exhaustive()
    }
}

impl RenderContext {
    /// Build the program registry on `device`.
    pub fn new(
        mut device: Box<dyn GpuDevice>,
        glsl: GlslVersion,
    ) -> Result<Self, stereo_core::ShaderError> {
        let programs = ShaderProgramManager::initialize(device.as_mut(), glsl)?;
        Ok(Self { device, programs })
    }

    /// Install the program for `key`.
    pub fn use_variant(&mut self, key: ProgramKey) {
        self.programs.use_variant(self.device.as_mut(), key);
    }

    /// Borrow the device as a concrete type.
    pub fn device_as<T: 'static>(&self) -> Option<&T> {
        self.device.as_any().downcast_ref::<T>()
    }

    pub fn device_as_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.device.as_any_mut().downcast_mut::<T>()
    }
}
