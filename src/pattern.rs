// Pattern Module - Frame-producing capability and the shared driver for localized shapes
use std::time::Instant;

use crate::frame::Frame;
use crate::kinematic::{steer_due, Body, FADE_WINDOW};

/// Anything that can produce one frame per tick.
///
/// `advance` returns `None` once the pattern has terminated; every later
/// call keeps returning `None`.
pub trait Pattern: Send {
    fn advance(&mut self, now: Instant) -> Option<&Frame>;
}

/// Geometry and motion rules of one localized shape
pub trait Shape: Send {
    /// Paint the shape at the body's current position
    fn draw(&self, body: &mut Body);

    /// New steering rate (rad/s) picked at each steering tick
    fn direction_change(&self, body: &mut Body) -> f32 {
        body.wander()
    }

    /// Whether acceleration and steering are periodically redrawn
    fn steers(&self) -> bool {
        true
    }

    /// One tick of motion: translate, draw, then integrate velocity and direction
    fn step(&mut self, body: &mut Body, dt: f32) {
        body.advance_coordinates(dt);
        self.draw(body);
        body.integrate(dt);
    }
}

/// A shape with a finite lifetime: it fades in over the first second,
/// leaves a glowing trail while it moves, and fades out over the last second.
pub struct LocalPattern<S: Shape> {
    pub(crate) body: Body,
    pub(crate) shape: S,
    started: Option<Instant>,
    last_tick: Option<Instant>,
    terminated: bool,
}

impl<S: Shape> LocalPattern<S> {
    pub fn new(body: Body, shape: S) -> Self {
        LocalPattern {
            body,
            shape,
            started: None,
            last_tick: None,
            terminated: false,
        }
    }

    #[cfg(test)]
    pub fn body(&self) -> &Body {
        &self.body
    }

    #[cfg(test)]
    pub fn shape(&self) -> &S {
        &self.shape
    }

    #[cfg(test)]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

impl<S: Shape> Pattern for LocalPattern<S> {
    fn advance(&mut self, now: Instant) -> Option<&Frame> {
        if self.terminated {
            return None;
        }

        // The lifetime clock starts on the first call
        let started = *self.started.get_or_insert(now);
        let last_tick = self.last_tick.unwrap_or(started);
        let age = now.saturating_duration_since(started);

        if age > self.body.lifespan() {
            self.terminated = true;
            return None;
        }

        self.body.fade_out(age);

        if self.body.is_active(age) {
            let dt = now.saturating_duration_since(last_tick).as_secs_f32();
            self.shape.step(&mut self.body, dt);
            self.last_tick = Some(now);

            if self.shape.steers() && steer_due(age) {
                self.body.update_acceleration();
                self.body.direction_change = self.shape.direction_change(&mut self.body);
            }
        }

        if age < FADE_WINDOW {
            self.body.fade_in(age);
        }

        Some(self.body.picture())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematic::Limits;
    use crate::types::Rgb;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;

    // Single lit pixel at the body position
    struct Spot;

    impl Shape for Spot {
        fn draw(&self, body: &mut Body) {
            let (x, y) = (body.x as i64, body.y as i64);
            body.draw_pixel(x, y);
        }
    }

    fn spot(lifespan_ms: u64) -> LocalPattern<Spot> {
        let mut rng = StdRng::seed_from_u64(42);
        let mut body = Body::new(10, 10, &Limits::DEFAULT, &mut rng);
        body.lifespan = Duration::from_millis(lifespan_ms);
        body.velocity = 0.0;
        body.acceleration = 0.0;
        body.x = 4.0;
        body.y = 4.0;
        body.color = Rgb::new(200, 200, 200);
        LocalPattern::new(body, Spot)
    }

    #[test]
    fn test_first_frame_is_black() {
        let mut pattern = spot(6000);
        let frame = pattern.advance(Instant::now()).unwrap();
        assert!(frame.is_black());
    }

    #[test]
    fn test_fades_in_over_first_second() {
        let mut pattern = spot(6000);
        let start = Instant::now();
        pattern.advance(start);

        let frame = pattern.advance(start + Duration::from_millis(500)).unwrap();
        assert_eq!(frame.get(4, 4), Some(Rgb::new(100, 100, 100)));

        let frame = pattern.advance(start + Duration::from_millis(1500)).unwrap();
        assert_eq!(frame.get(4, 4), Some(Rgb::new(200, 200, 200)));
    }

    #[test]
    fn test_terminates_after_lifespan_and_stays_terminated() {
        let mut pattern = spot(6000);
        let start = Instant::now();
        pattern.advance(start);
        assert!(pattern.advance(start + Duration::from_millis(6000)).is_some());
        assert!(pattern.advance(start + Duration::from_millis(6001)).is_none());
        assert!(pattern.is_terminated());
        assert!(pattern.advance(start + Duration::from_millis(100)).is_none());
    }

    #[test]
    fn test_stops_moving_in_last_second_and_fades() {
        let mut pattern = spot(6000);
        let start = Instant::now();
        pattern.advance(start);
        pattern.advance(start + Duration::from_millis(4900));
        let before = pattern.advance(start + Duration::from_millis(4990)).unwrap().get(4, 4);
        assert_eq!(before, Some(Rgb::new(200, 200, 200)));

        // 500ms remain: the lit cell only dims
        let frame = pattern.advance(start + Duration::from_millis(5500)).unwrap();
        assert_eq!(frame.get(4, 4), Some(Rgb::new(100, 100, 100)));
        assert_eq!(frame.cells().iter().filter(|c| !c.is_black()).count(), 1);

        let frame = pattern.advance(start + Duration::from_millis(6000)).unwrap();
        assert!(frame.is_black());
    }
}
