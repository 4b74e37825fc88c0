//! Built-in EQ Presets

use serde::{Deserialize, Serialize};

use crate::eq::NUM_BANDS;
use crate::error::DspError;

/// Named EQ preset with 10 band gains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub gains: [f32; NUM_BANDS],
}

impl Preset {
    pub fn new(name: impl Into<String>, gains: [f32; NUM_BANDS]) -> Self {
        Self {
            name: name.into(),
            gains,
        }
    }

    /// Look up a built-in preset by name (case-insensitive)
    pub fn builtin(name: &str) -> Result<Self, DspError> {
        PRESETS
            .iter()
            .find(|(preset_name, _)| preset_name.eq_ignore_ascii_case(name))
            .map(|(preset_name, gains)| Self::new(*preset_name, *gains))
            .ok_or_else(|| DspError::UnknownPreset(name.to_string()))
    }
}

/// List of built-in presets
pub const PRESETS: &[(&str, [f32; NUM_BANDS])] = &[
    ("Flat", [0.0; NUM_BANDS]),
    ("Rock", [4.0, 3.0, -1.0, -2.0, -1.0, 2.0, 3.0, 4.0, 3.0, 2.0]),
    ("Pop", [-1.0, 2.0, 4.0, 3.0, 0.0, -1.0, -1.0, 0.0, 2.0, 3.0]),
    ("Jazz", [0.0, 2.0, 1.0, 2.0, -2.0, -2.0, 0.0, 1.0, 2.0, 3.0]),
    ("Classical", [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -2.0, -2.0, -2.0, -3.0]),
    ("Electronic", [4.0, 3.0, 1.0, 0.0, -2.0, 2.0, 1.0, 1.0, 3.0, 4.0]),
    ("Vocal Boost", [-2.0, -1.0, 0.0, 2.0, 4.0, 4.0, 3.0, 2.0, 0.0, -1.0]),
    ("Bass Boost", [6.0, 5.0, 4.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
    ("Treble Boost", [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2.0, 4.0, 5.0, 6.0]),
    ("Loudness", [5.0, 3.0, 0.0, -1.0, -2.0, -2.0, -1.0, 0.0, 3.0, 5.0]),
];
