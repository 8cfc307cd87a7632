// Background Module - Endless dim layer built from background shape variants
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

use crate::frame::Frame;
use crate::pattern::Pattern;
use crate::pool::PatternKind;

struct Layer {
    kind: PatternKind,
    pattern: Box<dyn Pattern>,
}

/// One dim dot, wall and wave at all times. A layer that expires is
/// replaced by a fresh one of the same kind, so the background never ends.
pub struct BackgroundPattern {
    width: usize,
    height: usize,
    layers: Vec<Layer>,
    frame: Frame,
    rng: StdRng,
}

impl BackgroundPattern {
    pub fn new(width: usize, height: usize, seed_source: &mut impl Rng) -> Self {
        let mut rng = StdRng::seed_from_u64(seed_source.gen());
        let layers = [PatternKind::Dot, PatternKind::Wall, PatternKind::Wave]
            .into_iter()
            .map(|kind| Layer {
                kind,
                pattern: kind.spawn_background(width, height, &mut rng),
            })
            .collect();

        BackgroundPattern {
            width,
            height,
            layers,
            frame: Frame::new(width, height),
            rng,
        }
    }

    #[cfg(test)]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

impl Pattern for BackgroundPattern {
    fn advance(&mut self, now: Instant) -> Option<&Frame> {
        self.frame.clear();

        for layer in &mut self.layers {
            if let Some(picture) = layer.pattern.advance(now) {
                self.frame.blend_lit(picture);
                continue;
            }

            layer.pattern = layer.kind.spawn_background(self.width, self.height, &mut self.rng);
            if let Some(picture) = layer.pattern.advance(now) {
                self.frame.blend_lit(picture);
            }
        }

        Some(&self.frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_background_never_terminates() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut background = BackgroundPattern::new(39, 15, &mut rng);
        assert_eq!(background.layer_count(), 3);

        let start = Instant::now();
        let mut lit_frames = 0;
        // 40 simulated seconds outlives every background lifespan
        for tick in 0..800u64 {
            let frame = background.advance(start + Duration::from_millis(tick * 50));
            let frame = frame.expect("background always yields a frame");
            if !frame.is_black() {
                lit_frames += 1;
            }
        }
        assert_eq!(background.layer_count(), 3);
        assert!(lit_frames > 0);
    }

    #[test]
    fn test_background_stays_dim() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut background = BackgroundPattern::new(39, 15, &mut rng);
        let start = Instant::now();
        for tick in 0..200u64 {
            let frame = background.advance(start + Duration::from_millis(tick * 50)).unwrap();
            // three layers of at most (5, 5, 12) each
            assert!(frame.cells().iter().all(|c| c.r <= 15 && c.g <= 15 && c.b <= 36));
        }
    }
}
