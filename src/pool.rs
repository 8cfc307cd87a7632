// Pool Module - Random spawning and compositing of localized patterns
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;
use tracing::debug;

use crate::background::BackgroundPattern;
use crate::frame::Frame;
use crate::pattern::Pattern;
use crate::shapes::{Dot, Wall, Wave};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Dot,
    Wall,
    Wave,
}

impl PatternKind {
    /// Map a roll in 0..100 to a kind: 45% dots, 35% walls, 20% waves
    pub fn from_roll(roll: u32) -> Self {
        match roll {
            0..=44 => PatternKind::Dot,
            45..=79 => PatternKind::Wall,
            _ => PatternKind::Wave,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PatternKind::Dot => "dot",
            PatternKind::Wall => "wall",
            PatternKind::Wave => "wave",
        }
    }

    pub fn spawn(self, width: usize, height: usize, rng: &mut impl Rng) -> Box<dyn Pattern> {
        match self {
            PatternKind::Dot => Box::new(Dot::spawn(width, height, rng)),
            PatternKind::Wall => Box::new(Wall::spawn(width, height, rng)),
            PatternKind::Wave => Box::new(Wave::spawn(width, height, rng)),
        }
    }

    pub fn spawn_background(self, width: usize, height: usize, rng: &mut impl Rng) -> Box<dyn Pattern> {
        match self {
            PatternKind::Dot => Box::new(Dot::background(width, height, rng)),
            PatternKind::Wall => Box::new(Wall::background(width, height, rng)),
            PatternKind::Wave => Box::new(Wave::background(width, height, rng)),
        }
    }
}

/// Spawn tuning for the pattern pool
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolSettings {
    /// Probability of a spontaneous spawn per frame
    pub spawn_chance: f64,
    /// Spawn every frame while fewer foreground patterns than this are alive
    pub min_patterns: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        PoolSettings {
            spawn_chance: 0.02,
            min_patterns: 2,
        }
    }
}

/// The live set of patterns: the background plus transient foreground shapes
pub struct PatternPool {
    width: usize,
    height: usize,
    background: BackgroundPattern,
    patterns: Vec<Box<dyn Pattern>>,
    frame: Frame,
    rng: StdRng,
    settings: PoolSettings,
}

impl PatternPool {
    pub fn new(width: usize, height: usize, settings: PoolSettings, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let background = BackgroundPattern::new(width, height, &mut rng);

        PatternPool {
            width,
            height,
            background,
            patterns: Vec::new(),
            frame: Frame::new(width, height),
            rng,
            settings,
        }
    }

    /// Number of live patterns, the background included
    pub fn len(&self) -> usize {
        self.patterns.len() + 1
    }

    pub fn foreground_len(&self) -> usize {
        self.patterns.len()
    }

    /// Add one randomly chosen foreground pattern
    pub fn spawn(&mut self) -> PatternKind {
        let kind = PatternKind::from_roll(self.rng.gen_range(0..100));
        self.spawn_kind(kind);
        kind
    }

    pub fn spawn_kind(&mut self, kind: PatternKind) {
        let pattern = kind.spawn(self.width, self.height, &mut self.rng);
        self.patterns.push(pattern);
        debug!("Spawned {} pattern ({} live)", kind.name(), self.len());
    }

    /// Maybe spawn, advance every pattern, drop the terminated ones and
    /// blend the survivors over the background.
    pub fn next_frame(&mut self, now: Instant) -> &Frame {
        let chance = self.settings.spawn_chance.clamp(0.0, 1.0);
        if self.patterns.len() < self.settings.min_patterns || self.rng.gen_bool(chance) {
            self.spawn();
        }

        self.frame.clear();
        if let Some(picture) = self.background.advance(now) {
            self.frame.blend_lit(picture);
        }

        let frame = &mut self.frame;
        self.patterns.retain_mut(|pattern| match pattern.advance(now) {
            Some(picture) => {
                frame.blend_lit(picture);
                true
            }
            None => false,
        });

        &self.frame
    }
}
