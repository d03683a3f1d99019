//! Layout and animation math.
//!
//! Positions are in canvas units: the origin is the canvas midpoint and one
//! unit equals the canvas height, on both axes, so that aspect ratio survives
//! non-square viewports.

/// Candidate scale factors tried by [`fit`], largest first.
pub const FIT_SCALES: [f32; 5] = [1.0, 2.0 / 3.0, 0.5, 1.0 / 3.0, 0.25];

/// Scale returned by [`fit`] when no candidate fits.
pub const FALLBACK_SCALE: f32 = 0.1;

/// Vertical overflow accepted by [`fit`]. Clipping a little off the top and
/// bottom beats a much smaller image.
pub const VERTICAL_TOLERANCE: f32 = 1.05;

/// Interpolate between two values, `a` in `[0, 1]`.
pub fn lerp(x: f32, y: f32, a: f32) -> f32 {
    x * (1.0 - a) + y * a
}

/// Pick the scale factor that fits `content` within `max`.
///
/// Only the fixed candidates in [`FIT_SCALES`] are considered, in order.
pub fn fit(content_w: f32, content_h: f32, max_w: f32, max_h: f32) -> f32 {
    FIT_SCALES
        .iter()
        .copied()
        .find(|s| content_w * s <= max_w && content_h * s <= max_h * VERTICAL_TOLERANCE)
        .unwrap_or(FALLBACK_SCALE)
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Rect in between `a` and `b`.
    ///
    /// `t` is clamped, and the endpoints are returned exactly rather than
    /// through the blend.
    pub fn interpolate(a: Rect, b: Rect, t: f32) -> Rect {
        if t <= 0.0 {
            a
        } else if t >= 1.0 {
            b
        } else {
            Rect {
                x: lerp(a.x, b.x, t),
                y: lerp(a.y, b.y, t),
                w: lerp(a.w, b.w, t),
                h: lerp(a.h, b.h, t),
            }
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn top(&self) -> f32 {
        self.y + self.h
    }
}

/// Pixel dimensions of the drawing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width over height, or zero for a collapsed canvas.
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}
