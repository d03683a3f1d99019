/// Presentation settings supplied by the shell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewConfig {
    /// Canvas clear colour.
    pub background: [f32; 3],
    /// Colour of the line between the two halves in split mode.
    pub separator: [f32; 3],
    /// Weight of the right stream in blended mode.
    pub blend_alpha: f32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            background: [0.0, 0.0, 0.0],
            separator: [0.0, 0.0, 0.0],
            blend_alpha: 0.5,
        }
    }
}

impl ViewConfig {
    /// Use `color` for both the background and the separator, so the split
    /// reads as a gap.
    pub fn with_background(color: [f32; 3]) -> Self {
        Self {
            background: color,
            separator: color,
            ..Self::default()
        }
    }
}
