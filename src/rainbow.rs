// Rainbow Module - Scrolling column-wise palette sweep
use std::time::Instant;

use crate::frame::Frame;
use crate::gradients::Palette;
use crate::pattern::Pattern;

/// Each column shows one palette entry; the offset scrolls over time.
/// Never terminates.
pub struct RainbowPattern {
    palette: Palette,
    frame: Frame,
    /// Palette entries per second
    velocity: f32,
    /// Palette distance between adjacent columns
    density: usize,
    progress: f32,
    last_update: Option<Instant>,
}

impl RainbowPattern {
    pub const DEFAULT_VELOCITY: f32 = 400.0;
    pub const DEFAULT_DENSITY: usize = 20;

    pub fn new(width: usize, height: usize, palette: Palette) -> Self {
        RainbowPattern {
            palette,
            frame: Frame::new(width, height),
            velocity: Self::DEFAULT_VELOCITY,
            density: Self::DEFAULT_DENSITY,
            progress: 0.0,
            last_update: None,
        }
    }

    pub fn with_velocity(mut self, velocity: f32) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_density(mut self, density: usize) -> Self {
        self.density = density;
        self
    }

    #[cfg(test)]
    pub fn progress(&self) -> f32 {
        self.progress
    }
}

impl Pattern for RainbowPattern {
    fn advance(&mut self, now: Instant) -> Option<&Frame> {
        let elapsed = self
            .last_update
            .map(|last| now.saturating_duration_since(last).as_secs_f32())
            .unwrap_or(0.0);
        self.last_update = Some(now);

        let len = self.palette.len().max(1) as f32;
        self.progress = (self.progress + elapsed * self.velocity).rem_euclid(len);

        let offset = self.progress as usize;
        for column in 0..self.frame.width() {
            let color = self.palette.at(offset + column * self.density);
            for row in 0..self.frame.height() {
                self.frame.set(row, column, color);
            }
        }

        Some(&self.frame)
    }
}
