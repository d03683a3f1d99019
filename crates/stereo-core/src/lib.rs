//! Core types for the stereo video preview.
//!
//! Nothing in this crate touches OpenGL. It holds the layout math shared by
//! the compositor, the error taxonomy, the display mode that the shell
//! persists, and the plumbing frame sources use to hand decoded frames to the
//! render thread.

pub mod error;
pub mod frame;
pub mod geometry;
pub mod mode;
pub mod pipeline;

pub use error::{ShaderError, ShaderStage, SourceConnectError};
pub use frame::{frame_slot, Frame, FramePublisher, FrameReader, PixelFormat};
pub use geometry::{fit, lerp, CanvasSize, Rect};
pub use mode::DisplayMode;
pub use pipeline::{SinkParams, SourceKind, SourceRequest};
