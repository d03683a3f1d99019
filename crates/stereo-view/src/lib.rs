//! Stereo pair compositing.
//!
//! [`StereoCompositor`] owns up to two [`VideoTexture`]s, lays them out for
//! the current [`DisplayMode`](stereo_core::DisplayMode) and draws them
//! through a [`RenderContext`](stereo_gl::RenderContext). Frames arrive
//! through a [`FrameSource`].

pub mod compositor;
pub mod config;
pub mod source;
pub mod video_texture;

pub use compositor::{Anchor, Side, StereoCompositor, StreamSetup, OVERLAY, SPLIT_LEFT, SPLIT_RIGHT};
pub use config::ViewConfig;
pub use source::{FrameSource, PublishedBinding, PushSource, SourceBinding};
pub use video_texture::{Animation, Placement, VideoTexture, ANIMATION_STEP};
