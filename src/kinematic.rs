// Kinematic Module - Shared motion, fade and lifetime state for localized patterns
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::{PI, TAU};
use std::time::Duration;

use crate::frame::Frame;
use crate::types::Rgb;

/// Length of the fade-in at birth and the fade-out before death
pub const FADE_WINDOW: Duration = Duration::from_millis(1000);

// Rows a pattern jumps when it crosses a horizontal edge
const ROW_SHIFT: i64 = 8;
// Vertical motion is damped relative to horizontal motion
const VERTICAL_DAMPING: f32 = 0.8;
// Acceleration and steering are redrawn when age % PERIOD lands past WINDOW
const STEER_PERIOD_MS: u128 = 1551;
const STEER_WINDOW_MS: u128 = 1500;
// Cells dimmer than this on every channel are cleared while fading
const RESIDUE: u8 = 6;

/// A configurable upper bound for one kinematic parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound<T> {
    /// Parameter is zeroed (size falls back to its default instead)
    Off,
    /// Use the built-in default range
    Default,
    /// Draw from a range derived from this maximum. Values below the
    /// parameter's validity threshold fall back to the default range.
    Max(T),
}

/// Bounds used to seed a new pattern body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    /// Lifetimes below 2000ms select the default 6-13s range
    pub max_lifetime_ms: u32,
    pub size: Bound<i32>,
    pub velocity: Bound<f32>,
    pub acceleration: Bound<f32>,
    pub glow: Bound<f32>,
}

impl Limits {
    pub const DEFAULT: Limits = Limits {
        max_lifetime_ms: 0,
        size: Bound::Default,
        velocity: Bound::Default,
        acceleration: Bound::Default,
        glow: Bound::Default,
    };

    pub const fn new(
        max_lifetime_ms: u32,
        size: Bound<i32>,
        velocity: Bound<f32>,
        acceleration: Bound<f32>,
        glow: Bound<f32>,
    ) -> Self {
        Limits {
            max_lifetime_ms,
            size,
            velocity,
            acceleration,
            glow,
        }
    }
}

/// Position, motion and picture of one localized pattern.
///
/// Positions are continuous; `x` runs along the frame width and `y` along
/// the frame height. Every field is owned and mutated by a single pattern.
pub struct Body {
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) size: i32,
    pub(crate) thickness: i32,
    pub(crate) glow: f32,
    pub(crate) velocity: f32,
    pub(crate) max_velocity: f32,
    pub(crate) acceleration: f32,
    pub(crate) max_acceleration: f32,
    /// Radians
    pub(crate) direction: f32,
    /// Radians per second
    pub(crate) direction_change: f32,
    pub(crate) color: Rgb,
    pub(crate) lifespan: Duration,
    pub(crate) picture: Frame,
    pub(crate) rng: StdRng,
}

impl Body {
    /// Seed a body inside a `width` x `height` frame. The body gets its own
    /// RNG stream derived from `seed_source`.
    pub fn new(width: usize, height: usize, limits: &Limits, seed_source: &mut impl Rng) -> Self {
        let mut rng = StdRng::seed_from_u64(seed_source.gen());

        let x = rng.gen_range(0..width.max(1)) as f32;
        let y = rng.gen_range(0..height.max(1)) as f32;
        let direction = rng.gen::<f32>() * TAU;
        let color = random_color(&mut rng);

        let lifespan_ms = if limits.max_lifetime_ms >= 2000 {
            rng.gen_range(0..limits.max_lifetime_ms * 2 / 3) + limits.max_lifetime_ms / 3
        } else {
            rng.gen_range(0..7000) + 6000
        };

        let size = match limits.size {
            Bound::Max(max) if max >= 1 => rng.gen_range(0..=max / 2) + max / 2,
            _ => rng.gen_range(0..4) + 3,
        };

        let (velocity, max_velocity) = match limits.velocity {
            Bound::Off => (0.0, 0.0),
            Bound::Max(max) if max >= 2.0 => {
                let spread = ((max * 70.0) as u32).max(1);
                (rng.gen_range(0..spread) as f32 / 100.0 + max * 0.3, max)
            }
            _ => (rng.gen_range(0..50) as f32 / 10.0 + 3.0, 8.0),
        };

        let (acceleration, max_acceleration) = match limits.acceleration {
            Bound::Off => (0.0, 0.0),
            Bound::Max(max) if max >= 0.0 => (rng.gen::<f32>() * 2.0 * max - max, max),
            _ => (rng.gen::<f32>() * 5.0 - 2.5, 2.5),
        };

        let glow = match limits.glow {
            Bound::Off => 0.0,
            Bound::Max(average) if (0.1..0.9).contains(&average) => rng.gen::<f32>() / 5.0 + average - 0.1,
            _ => rng.gen::<f32>() / 5.0 + 0.4,
        };

        Body {
            width,
            height,
            x,
            y,
            size,
            thickness: 0,
            glow,
            velocity,
            max_velocity,
            acceleration,
            max_acceleration,
            direction,
            direction_change: 0.0,
            color,
            lifespan: Duration::from_millis(lifespan_ms as u64),
            picture: Frame::new(width, height),
            rng,
        }
    }

    /// Switch to a dim, blue-tinted color for the background layer
    pub fn use_background_color(&mut self) {
        self.color = background_color(&mut self.rng);
    }

    pub fn lifespan(&self) -> Duration {
        self.lifespan
    }

    pub fn picture(&self) -> &Frame {
        &self.picture
    }

    /// True while more than the fade window of lifetime remains
    pub fn is_active(&self, age: Duration) -> bool {
        age + FADE_WINDOW < self.lifespan
    }

    /// Dim the previous picture: by `glow` while active, then linearly
    /// toward black over the last second.
    pub fn fade_out(&mut self, age: Duration) {
        let factor = if self.is_active(age) {
            self.glow
        } else {
            self.lifespan.saturating_sub(age).as_secs_f32() / FADE_WINDOW.as_secs_f32()
        };

        self.picture.map(|color| {
            if color.r < RESIDUE && color.g < RESIDUE && color.b < RESIDUE {
                Rgb::BLACK
            } else {
                color.scale(factor)
            }
        });
    }

    /// Linear ramp to full brightness over the first second
    pub fn fade_in(&mut self, age: Duration) {
        let factor = age.as_secs_f32() / FADE_WINDOW.as_secs_f32();
        self.picture.fade(factor);
    }

    /// Move along the current direction. Crossing a horizontal edge folds the
    /// position back inside, shifts it down by `ROW_SHIFT` rows and mirrors
    /// the direction.
    pub fn advance_coordinates(&mut self, dt: f32) {
        let width = self.width as f32;
        let height = self.height.max(1) as f32;
        let dx = dt * self.velocity * self.direction.cos();
        let dy = dt * self.velocity * self.direction.sin() * VERTICAL_DAMPING;
        let next_x = self.x + dx;

        if next_x > width - 1.0 {
            let overshoot = if width > 1.0 { next_x % (width - 1.0) } else { 0.0 };
            self.x = (width - 1.0 - overshoot).max(0.0);
            self.y = (self.y + dy + ROW_SHIFT as f32).rem_euclid(height);
            self.mirror_direction();
        } else if next_x < 0.0 {
            self.x = (-next_x) % width.max(1.0);
            self.y = (self.y + dy + ROW_SHIFT as f32).rem_euclid(height);
            self.mirror_direction();
        } else {
            self.x = next_x;
            self.y = (self.y + dy).rem_euclid(height);
        }
    }

    fn mirror_direction(&mut self) {
        self.direction = (PI - self.direction).rem_euclid(TAU);
    }

    /// Integrate velocity and direction over `dt` seconds
    pub fn integrate(&mut self, dt: f32) {
        self.velocity += self.acceleration * dt;
        self.direction = (self.direction + self.direction_change * dt).rem_euclid(TAU);
    }

    /// Keep the speed inside [0.3, 1.0] x max velocity: below the envelope
    /// accelerate up to 1.5x max, above it brake, otherwise wander.
    pub fn update_acceleration(&mut self) {
        let max = self.max_acceleration;
        let roll: f32 = self.rng.gen();
        let speed = self.velocity.abs();

        self.acceleration = if speed < self.max_velocity * 0.3 {
            if self.velocity > 0.0 {
                roll * max + 0.5 * max
            } else {
                roll * max - 1.5 * max
            }
        } else if speed > self.max_velocity {
            if self.velocity > 0.0 {
                roll * max - 1.5 * max
            } else {
                roll * max + 0.5 * max
            }
        } else {
            roll * 2.0 * max - max
        };
    }

    /// Uniform steering rate in [-0.3pi, 0.3pi] rad/s
    pub fn wander(&mut self) -> f32 {
        (self.rng.gen::<f32>() * 6.0 - 3.0) / 10.0 * PI
    }

    /// Paint one cell in the body's color, applying the wrap policy
    pub fn draw_pixel(&mut self, x: i64, y: i64) {
        if let Some((row, column)) = wrap_cell(x, y, self.width, self.height) {
            self.picture.set(row, column, self.color);
        }
    }
}

/// Whether acceleration and steering should be redrawn at this age
pub fn steer_due(age: Duration) -> bool {
    age.as_millis() % STEER_PERIOD_MS > STEER_WINDOW_MS
}

/// Map a raster position to a frame cell.
///
/// Rows wrap around the height. A column past the right edge maps to
/// `width - 1 - (x % width)`, a column left of zero maps to `(-x) % width`,
/// and both also shift the row down by 8 (mod height).
pub fn wrap_cell(x: i64, y: i64, width: usize, height: usize) -> Option<(usize, usize)> {
    if width == 0 || height == 0 {
        return None;
    }
    let w = width as i64;
    let h = height as i64;
    let row = y.rem_euclid(h);

    let (row, column) = if x >= w {
        ((row + ROW_SHIFT).rem_euclid(h), w - 1 - x.rem_euclid(w))
    } else if x < 0 {
        ((row + ROW_SHIFT).rem_euclid(h), (-x).rem_euclid(w))
    } else {
        (row, x)
    };

    Some((row as usize, column as usize))
}

/// Random color with at least one lit channel
pub fn random_color(rng: &mut impl Rng) -> Rgb {
    loop {
        let mut channel = || if rng.gen::<bool>() { rng.gen_range(0..250u8) } else { 0 };
        let color = Rgb::new(channel(), channel(), channel());
        if !color.is_black() {
            return color;
        }
    }
}

/// Dim color with a blue bias
pub fn background_color(rng: &mut impl Rng) -> Rgb {
    let r = rng.gen_range(0..6u8);
    let g = rng.gen_range(0..6u8);
    let b = 3 + rng.gen_range(0..5u8) + (r + g) / 2;
    Rgb::new(r, g, b)
}
