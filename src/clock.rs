// Clock Module - Monotonic time, local time of day and sleeping behind one seam
use std::time::{Duration, Instant};
use time::{OffsetDateTime, Time};

pub trait Clock: Send {
    fn now(&self) -> Instant;

    /// Local wall-clock time of day
    fn time_of_day(&self) -> Time;

    fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn time_of_day(&self) -> Time {
        // The local offset can be unavailable in multi-threaded processes
        OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()).time()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Duration until the next occurrence of `target` after `now`, wrapping past midnight
pub fn until_time_of_day(now: Time, target: Time) -> Duration {
    let delta = target - now;
    let day = time::Duration::DAY;
    let delta = if delta.is_negative() { delta + day } else { delta };
    Duration::try_from(delta).unwrap_or_default()
}
