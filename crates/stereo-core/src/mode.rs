//! Display mode for a stereo pair.

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};

/// How two streams share the canvas.
///
/// The discriminants are persisted by the shell as the "overlay" preference,
/// so existing values must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromPrimitive, ToPrimitive)]
pub enum DisplayMode {
    /// Side by side, separated by a line.
    #[default]
    Split = 0,
    /// Right stream at 50% over the left.
    Blended = 1,
    /// Left in red, right in green + blue.
    Anaglyph = 2,
}

impl DisplayMode {
    pub const ALL: [DisplayMode; 3] = [DisplayMode::Split, DisplayMode::Blended, DisplayMode::Anaglyph];

    /// Restore a persisted preference, falling back to [`DisplayMode::Split`]
    /// for unknown values.
    pub fn from_preference(value: u32) -> Self {
        DisplayMode::from_u32(value).unwrap_or_else(|| {
            tracing::warn!(value, "unknown overlay preference, using split view");
            DisplayMode::Split
        })
    }

    pub fn to_preference(self) -> u32 {
        self.to_u32().unwrap_or(0)
    }

    /// Both streams drawn over the same area.
    pub fn is_overlay(self) -> bool {
        !matches!(self, DisplayMode::Split)
    }

    pub fn name(self) -> &'static str {
        match self {
            DisplayMode::Split => "split",
            DisplayMode::Blended => "blended",
            DisplayMode::Anaglyph => "anaglyph",
        }
    }
}

impl std::str::FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DisplayMode::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown display mode `{s}` (expected split, blended or anaglyph)"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preference_round_trips_known_values() {
        for mode in DisplayMode::ALL {
            assert_eq!(DisplayMode::from_preference(mode.to_preference()), mode);
        }
    }

    #[test]
    fn unknown_preference_means_split() {
        assert_eq!(DisplayMode::from_preference(5999), DisplayMode::Split);
    }

    #[test]
    fn parses_mode_names() {
        assert_eq!("Anaglyph".parse::<DisplayMode>(), Ok(DisplayMode::Anaglyph));
        assert!("quad".parse::<DisplayMode>().is_err());
    }
}
