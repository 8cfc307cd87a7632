// Shared types module - Colors, coordinates and animation modes used across modules

use anyhow::Result;

// Gradient interpolation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationMode {
    Linear,
    Basis,
    CatmullRom,
}

impl InterpolationMode {
    pub fn from_string(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "basis" => InterpolationMode::Basis,
            "catmullrom" | "catmull_rom" | "catmull-rom" => InterpolationMode::CatmullRom,
            _ => InterpolationMode::Linear,
        }
    }
}

// RGB color representation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };
    pub const WHITE: Rgb = Rgb { r: 255, g: 255, b: 255 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if hex.len() != 6 {
            anyhow::bail!("Invalid hex color: {}", hex);
        }
        Ok(Rgb {
            r: u8::from_str_radix(&hex[0..2], 16)?,
            g: u8::from_str_radix(&hex[2..4], 16)?,
            b: u8::from_str_radix(&hex[4..6], 16)?,
        })
    }

    /// Clamp arbitrary integer channels into a color
    pub fn clamped(r: i64, g: i64, b: i64) -> Self {
        Rgb {
            r: r.clamp(0, 255) as u8,
            g: g.clamp(0, 255) as u8,
            b: b.clamp(0, 255) as u8,
        }
    }

    pub fn is_black(&self) -> bool {
        self.r == 0 && self.g == 0 && self.b == 0
    }

    /// Scale every channel by `factor`, truncating toward zero.
    /// Factors outside [0, 1] are clamped.
    pub fn scale(&self, factor: f32) -> Rgb {
        let factor = if factor.is_nan() { 0.0 } else { factor.clamp(0.0, 1.0) };
        Rgb {
            r: (self.r as f32 * factor) as u8,
            g: (self.g as f32 * factor) as u8,
            b: (self.b as f32 * factor) as u8,
        }
    }

    /// Additive blend, saturating each channel at 255
    pub fn saturating_add(&self, other: Rgb) -> Rgb {
        Rgb {
            r: self.r.saturating_add(other.r),
            g: self.g.saturating_add(other.g),
            b: self.b.saturating_add(other.b),
        }
    }

    // Packed 0x00RRGGBB, used to keep colors in atomics
    pub fn to_u32(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    pub fn from_u32(packed: u32) -> Self {
        Rgb {
            r: (packed >> 16) as u8,
            g: (packed >> 8) as u8,
            b: packed as u8,
        }
    }
}

/// One logical cell of a frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub row: usize,
    pub column: usize,
}

impl Coordinate {
    pub const fn new(row: usize, column: usize) -> Self {
        Coordinate { row, column }
    }
}

// Animation mode driven by the command source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationMode {
    Unset,
    FixedColor,
    Rainbow,
    Patterns,
    Music,
    Notification,
    Alarm,
}

impl AnimationMode {
    pub fn as_u8(self) -> u8 {
        match self {
            AnimationMode::Unset => 0,
            AnimationMode::FixedColor => 1,
            AnimationMode::Rainbow => 2,
            AnimationMode::Patterns => 3,
            AnimationMode::Music => 4,
            AnimationMode::Notification => 5,
            AnimationMode::Alarm => 6,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => AnimationMode::FixedColor,
            2 => AnimationMode::Rainbow,
            3 => AnimationMode::Patterns,
            4 => AnimationMode::Music,
            5 => AnimationMode::Notification,
            6 => AnimationMode::Alarm,
            _ => AnimationMode::Unset,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AnimationMode::Unset => "unset",
            AnimationMode::FixedColor => "fixed-color",
            AnimationMode::Rainbow => "rainbow",
            AnimationMode::Patterns => "patterns",
            AnimationMode::Music => "music",
            AnimationMode::Notification => "notification",
            AnimationMode::Alarm => "alarm",
        }
    }
}
