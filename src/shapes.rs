// Shapes Module - Dot, wall and wave patterns
use rand::Rng;
use std::f32::consts::PI;

use crate::kinematic::{Body, Bound, Limits};
use crate::pattern::{LocalPattern, Shape};

const DOT_BACKGROUND: Limits = Limits::new(0, Bound::Max(11), Bound::Max(6.0), Bound::Max(1.0), Bound::Max(0.7));
const WALL: Limits = Limits::new(13000, Bound::Max(12), Bound::Max(7.0), Bound::Max(2.0), Bound::Max(0.3));
const WALL_BACKGROUND: Limits = Limits::new(0, Bound::Max(17), Bound::Max(6.0), Bound::Max(1.5), Bound::Max(0.6));
const WAVE: Limits = Limits::new(8000, Bound::Default, Bound::Off, Bound::Off, Bound::Max(0.6));

// Vertical distances are stretched for the wave ring
const WAVE_ASPECT: f32 = 1.2;

/// Filled disk of diameter `size`
pub struct Dot;

impl Dot {
    pub fn spawn(width: usize, height: usize, rng: &mut impl Rng) -> LocalPattern<Dot> {
        LocalPattern::new(Body::new(width, height, &Limits::DEFAULT, rng), Dot)
    }

    /// Larger, slower, dim blue variant
    pub fn background(width: usize, height: usize, rng: &mut impl Rng) -> LocalPattern<Dot> {
        let mut body = Body::new(width, height, &DOT_BACKGROUND, rng);
        body.use_background_color();
        LocalPattern::new(body, Dot)
    }
}

impl Shape for Dot {
    fn draw(&self, body: &mut Body) {
        let radius = body.size as f32 / 2.0;
        let (cx, cy) = (body.x, body.y);

        for y in (cy - radius) as i64..=(cy + radius).floor() as i64 {
            for x in (cx - radius) as i64..=(cx + radius).floor() as i64 {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                if (dx * dx + dy * dy).sqrt() < radius {
                    body.draw_pixel(x, y);
                }
            }
        }
    }
}

/// Bar of length `size` and width `thickness`, oriented perpendicular to
/// its direction of travel
pub struct Wall;

impl Wall {
    pub fn spawn(width: usize, height: usize, rng: &mut impl Rng) -> LocalPattern<Wall> {
        let mut body = Body::new(width, height, &WALL, rng);
        Self::orient(&mut body);
        LocalPattern::new(body, Wall)
    }

    pub fn background(width: usize, height: usize, rng: &mut impl Rng) -> LocalPattern<Wall> {
        let mut body = Body::new(width, height, &WALL_BACKGROUND, rng);
        body.use_background_color();
        Self::orient(&mut body);
        LocalPattern::new(body, Wall)
    }

    // Pick a thickness and a travel direction away from the vertical axis
    fn orient(body: &mut Body) {
        body.thickness = if body.size > 9 {
            body.rng.gen_range(0..3) + 2
        } else {
            body.rng.gen_range(0..2) + 2
        };

        let spread = body.rng.gen::<f32>() * 10.0 / 12.0;
        body.direction = if body.rng.gen::<bool>() {
            PI * (spread + 1.0 / 12.0)
        } else {
            PI * (spread + 13.0 / 12.0)
        };
    }
}

impl Shape for Wall {
    fn draw(&self, body: &mut Body) {
        let half_length = body.size as f32 / 2.0;
        let half_thickness = body.thickness as f32 / 2.0;
        let (cx, cy) = (body.x, body.y);
        let (sin_dir, cos_dir) = body.direction.sin_cos();

        // Axis-aligned extent of the rotated bar
        let half_x = (half_length * sin_dir).abs() + (half_thickness * cos_dir).abs();
        let half_y = (half_length * cos_dir).abs() + (half_thickness * sin_dir).abs();

        // The length axis is the travel direction rotated by -pi/2
        let (sin_phi, cos_phi) = (body.direction - PI / 2.0).sin_cos();

        for y in (cy - half_y).floor() as i64..=(cy + half_y).floor() as i64 {
            for x in (cx - half_x).floor() as i64..=(cx + half_x).floor() as i64 {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                let along = (dx * cos_phi + dy * sin_phi).abs();
                let across = (dy * cos_phi - dx * sin_phi).abs();
                if along <= half_length && across <= half_thickness {
                    body.draw_pixel(x, y);
                }
            }
        }
    }

    // Nudge away from travel that is nearly parallel to the x axis
    fn direction_change(&self, body: &mut Body) -> f32 {
        let d = body.direction;
        let step = PI / 24.0;
        if (d > 0.0 && d < 3.0 * step) || (d > PI && d < 27.0 * step) {
            0.2 * PI
        } else if (d > 21.0 * step && d < PI) || (d > 45.0 * step && d < 2.0 * PI) {
            -0.2 * PI
        } else {
            body.wander()
        }
    }
}

/// Expanding ring centred near the middle columns
pub struct Wave {
    radius: f32,
}

impl Wave {
    pub fn spawn(width: usize, height: usize, rng: &mut impl Rng) -> LocalPattern<Wave> {
        let mut body = Body::new(width, height, &WAVE, rng);
        Self::place(&mut body);
        LocalPattern::new(body, Wave { radius: 2.0 })
    }

    /// Slower ring with a longer trail
    pub fn background(width: usize, height: usize, rng: &mut impl Rng) -> LocalPattern<Wave> {
        let mut body = Body::new(width, height, &WAVE, rng);
        Self::place(&mut body);
        body.use_background_color();
        body.glow += 0.15;
        body.velocity -= 0.6;
        LocalPattern::new(body, Wave { radius: 2.0 })
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    // Centre away from the side edges and derive the expansion speed from the lifespan
    fn place(body: &mut Body) {
        if body.width > 20 {
            body.x = (body.rng.gen_range(0..body.width - 20) + 10) as f32;
        }
        body.thickness = body.rng.gen_range(0..3) + 2;
        let lifespan_ms = body.lifespan().as_millis().max(1) as f32;
        body.velocity = body.rng.gen_range(0..30) as f32 * 350.0 / lifespan_ms + 1.5;
    }
}

impl Shape for Wave {
    fn draw(&self, body: &mut Body) {
        let radius = self.radius;
        let inner = radius - body.thickness as f32;
        let (cx, cy) = (body.x, body.y);
        let height = body.height as f32;

        for y in (cy - radius) as i64..=(cy + radius) as i64 {
            let dy = (y as f32 - cy) * WAVE_ASPECT;
            let dy2 = dy * dy;
            if dy2 > height {
                continue;
            }
            for x in (cx - radius) as i64..=(cx + radius).floor() as i64 {
                let dx = x as f32 - cx;
                let distance = (dx * dx + dy2).sqrt();
                if distance < radius && distance >= inner {
                    body.draw_pixel(x, y);
                }
            }
        }
    }

    fn steers(&self) -> bool {
        false
    }

    // Rings grow in place instead of travelling
    fn step(&mut self, body: &mut Body, dt: f32) {
        self.radius += dt * body.velocity;
        self.draw(body);
    }
}
