// Gradients Module - Cyclic color palettes for the rainbow pattern
use anyhow::Result;
use colorgrad::Color;
use std::ops::Index;
use std::sync::Arc;

use crate::types::{InterpolationMode, Rgb};

/// Number of entries in the classic hue sweep (6 ramps of 255 steps)
pub const CLASSIC_LEN: usize = 6 * 255;

/// Get list of all available palette names
pub fn get_palette_names() -> Vec<&'static str> {
    vec!["classic", "sinebow", "rainbow", "turbo", "spectral"]
}

/// Immutable cyclic palette, cheap to clone and share between patterns
#[derive(Clone, Debug)]
pub struct Palette {
    colors: Arc<[Rgb]>,
}

impl Palette {
    /// Full hue sweep: red -> yellow -> green -> cyan -> blue -> magenta -> red,
    /// one channel stepping by 1 per entry.
    pub fn classic() -> Self {
        let mut colors = Vec::with_capacity(CLASSIC_LEN);
        colors.extend((0..255u8).map(|g| Rgb::new(255, g, 0)));
        colors.extend((1..=255u8).rev().map(|r| Rgb::new(r, 255, 0)));
        colors.extend((0..255u8).map(|b| Rgb::new(0, 255, b)));
        colors.extend((1..=255u8).rev().map(|g| Rgb::new(0, g, 255)));
        colors.extend((0..255u8).map(|r| Rgb::new(r, 0, 255)));
        colors.extend((1..=255u8).rev().map(|b| Rgb::new(255, 0, b)));

        Palette { colors: colors.into() }
    }

    #[cfg(test)]
    pub fn from_colors(colors: Vec<Rgb>) -> Result<Self> {
        if colors.is_empty() {
            anyhow::bail!("Palette needs at least one color");
        }
        Ok(Palette { colors: colors.into() })
    }

    /// Resolve a palette by name or comma-separated hex list. Non-classic
    /// palettes are sampled cyclically into `CLASSIC_LEN` entries.
    pub fn resolve(name: &str, interpolation: InterpolationMode) -> Result<Self> {
        let name = name.trim();
        let gradient = match name.to_lowercase().as_str() {
            "" | "classic" => return Ok(Self::classic()),
            "sinebow" => colorgrad::sinebow(),
            "rainbow" => colorgrad::rainbow(),
            "turbo" => colorgrad::turbo(),
            "spectral" => colorgrad::spectral(),
            _ => build_cyclic_gradient(name, interpolation)?,
        };
        Ok(Self::sample(&gradient, CLASSIC_LEN))
    }

    fn sample(gradient: &colorgrad::Gradient, len: usize) -> Self {
        let (start, end) = gradient.domain();
        let colors: Vec<Rgb> = (0..len)
            .map(|i| {
                let t = start + (end - start) * (i as f64 / len as f64);
                let [r, g, b, _] = gradient.at(t).to_rgba8();
                Rgb::new(r, g, b)
            })
            .collect();
        Palette { colors: colors.into() }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Wrapping lookup
    pub fn at(&self, index: usize) -> Rgb {
        self.colors[index % self.colors.len()]
    }
}

impl Index<usize> for Palette {
    type Output = Rgb;

    fn index(&self, index: usize) -> &Rgb {
        &self.colors[index]
    }
}

// Build a gradient from a hex color string, repeating the first color at the end
// so that sampling wraps without a seam
fn build_cyclic_gradient(color_str: &str, interpolation_mode: InterpolationMode) -> Result<colorgrad::Gradient> {
    let mut rgb_colors = Vec::new();
    for hex in color_str.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        rgb_colors.push(Rgb::from_hex(hex)?);
    }
    if rgb_colors.len() < 2 {
        anyhow::bail!(
            "Palette '{}' needs one of [{}] or at least two hex colors",
            color_str,
            get_palette_names().join(", ")
        );
    }

    let mut colorgrad_colors: Vec<Color> = rgb_colors
        .iter()
        .map(|rgb| Color::from_rgba8(rgb.r, rgb.g, rgb.b, 255))
        .collect();
    if let Some(first) = rgb_colors.first() {
        colorgrad_colors.push(Color::from_rgba8(first.r, first.g, first.b, 255));
    }

    let cg_interpolation = match interpolation_mode {
        InterpolationMode::Basis => colorgrad::Interpolation::Basis,
        InterpolationMode::CatmullRom => colorgrad::Interpolation::CatmullRom,
        InterpolationMode::Linear => colorgrad::Interpolation::Linear,
    };

    let gradient = colorgrad::CustomGradient::new()
        .colors(&colorgrad_colors)
        .interpolation(cg_interpolation)
        .build()?;

    Ok(gradient)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_palette_shape() {
        let palette = Palette::classic();
        assert_eq!(palette.len(), 1530);
        assert_eq!(palette[0], Rgb::new(255, 0, 0));
        assert_eq!(palette[254], Rgb::new(255, 254, 0));
        assert_eq!(palette[255], Rgb::new(255, 255, 0));
        assert_eq!(palette[509], Rgb::new(1, 255, 0));
        assert_eq!(palette[510], Rgb::new(0, 255, 0));
        assert_eq!(palette[765], Rgb::new(0, 255, 255));
        assert_eq!(palette[1020], Rgb::new(0, 0, 255));
        assert_eq!(palette[1275], Rgb::new(255, 0, 255));
        assert_eq!(palette[1529], Rgb::new(255, 0, 1));
    }

    #[test]
    fn test_classic_palette_steps_by_one() {
        let palette = Palette::classic();
        for i in 0..palette.len() {
            let a = palette.at(i);
            let b = palette.at(i + 1);
            let diff = (a.r as i32 - b.r as i32).abs()
                + (a.g as i32 - b.g as i32).abs()
                + (a.b as i32 - b.b as i32).abs();
            assert_eq!(diff, 1, "step {} -> {}", i, i + 1);
        }
    }

    #[test]
    fn test_resolve_named_and_hex() {
        let palette = Palette::resolve("classic", InterpolationMode::Linear).unwrap();
        assert_eq!(palette.len(), CLASSIC_LEN);

        let turbo = Palette::resolve("Turbo", InterpolationMode::Linear).unwrap();
        assert_eq!(turbo.len(), CLASSIC_LEN);

        let custom = Palette::resolve("FF0000,0000FF", InterpolationMode::Linear).unwrap();
        assert_eq!(custom.len(), CLASSIC_LEN);
        assert_eq!(custom[0], Rgb::new(255, 0, 0));

        assert!(Palette::resolve("FF0000", InterpolationMode::Linear).is_err());
        assert!(Palette::resolve("not-a-palette", InterpolationMode::Linear).is_err());
    }

    #[test]
    fn test_palette_is_shared_not_copied() {
        let palette = Palette::classic();
        let other = palette.clone();
        assert!(Arc::ptr_eq(&palette.colors, &other.colors));
    }
}
