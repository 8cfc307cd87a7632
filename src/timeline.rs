// Timeline Module - Timed light sequences for notifications and alarms
use std::time::Duration;

use crate::clock::until_time_of_day;
use crate::types::Rgb;
use time::Time;

/// Write cadence of color and picture fades
pub const FADE_INTERVAL: Duration = Duration::from_millis(50);

// Alarm phases
const ALARM_PICTURE_FADE: Duration = Duration::from_millis(1000);
const ALARM_LEAD: Duration = Duration::from_secs(120);
const SUNRISE: Duration = Duration::from_secs(240);
const SUNRISE_INTERVAL: Duration = Duration::from_secs(1);
const SUNRISE_WHITE: Rgb = Rgb::new(250, 250, 250);
const DAYLIGHT: Duration = Duration::from_secs(120);
const DUSK: Duration = Duration::from_secs(10);
const RAMP: Duration = Duration::from_secs(240);
const RAMP_SPAN_MS: u128 = 24_000;
const FLASH_HALF_PERIOD: Duration = Duration::from_millis(200);

/// One blocking step of a timed sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Dim the last displayed picture to black
    FadeOutPicture(Duration),
    /// Ramp a color up from black, writing every `interval`
    FadeIn { color: Rgb, duration: Duration, interval: Duration },
    /// Ramp a color down to black, writing every `interval`
    FadeOut { color: Rgb, duration: Duration, interval: Duration },
    /// Show one color at once
    Fill(Rgb),
    /// Keep the current output
    Wait(Duration),
}

impl Step {
    pub fn fade_in(color: Rgb, duration: Duration) -> Self {
        Step::FadeIn {
            color,
            duration,
            interval: FADE_INTERVAL,
        }
    }

    pub fn fade_out(color: Rgb, duration: Duration) -> Self {
        Step::FadeOut {
            color,
            duration,
            interval: FADE_INTERVAL,
        }
    }

    /// The same step drawing `color`. Only fades carry a color.
    pub fn with_color(self, color: Rgb) -> Self {
        match self {
            Step::FadeIn { duration, interval, .. } => Step::FadeIn {
                color,
                duration,
                interval,
            },
            Step::FadeOut { duration, interval, .. } => Step::FadeOut {
                color,
                duration,
                interval,
            },
            other => other,
        }
    }

    #[cfg(test)]
    pub fn duration(&self) -> Duration {
        match *self {
            Step::FadeOutPicture(duration)
            | Step::FadeIn { duration, .. }
            | Step::FadeOut { duration, .. }
            | Step::Wait(duration) => duration,
            Step::Fill(_) => Duration::ZERO,
        }
    }
}

/// Brightness of a rising or falling ramp at `elapsed` into `duration`
pub fn ramp_factor(elapsed: Duration, duration: Duration, rising: bool) -> f32 {
    if duration.is_zero() {
        return if rising { 1.0 } else { 0.0 };
    }
    let t = (elapsed.as_secs_f32() / duration.as_secs_f32()).clamp(0.0, 1.0);
    if rising {
        t
    } else {
        1.0 - t
    }
}

/// Fade the picture out, then flash `color` twice
pub fn notification(color: Rgb) -> Vec<Step> {
    let mut steps = vec![Step::FadeOutPicture(Duration::from_millis(400))];
    for _ in 0..2 {
        steps.push(Step::fade_in(color, Duration::from_millis(600)));
        steps.push(Step::fade_out(color, Duration::from_millis(500)));
    }
    steps
}

/// How long to stay dark before the sunrise starts: the sunrise begins two
/// minutes before `target`, or immediately when less than that remains.
pub fn alarm_lead(now: Time, target: Time) -> Duration {
    until_time_of_day(now, target).saturating_sub(ALARM_LEAD)
}

/// Half-period of the alarm flashing `elapsed` after the dusk fade started.
/// Shrinks linearly from 24.2s to 0.2s over four minutes.
pub fn ramp_half_period(elapsed: Duration) -> Duration {
    let ramp_ms = RAMP.as_millis();
    let remaining_ms = ramp_ms.saturating_sub(elapsed.as_millis());
    FLASH_HALF_PERIOD + Duration::from_millis((RAMP_SPAN_MS * remaining_ms / ramp_ms) as u64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlarmStage {
    FadePicture,
    Blackout,
    Lead,
    Sunrise,
    Daylight,
    Dusk,
    Ramp,
    Flash,
}

/// Endless alarm sequence: fade to black, wait for the lead time, four
/// minute sunrise, two minutes of daylight, then flashing that speeds up
/// over four minutes and continues at 2.5Hz.
#[derive(Debug, Clone)]
pub struct AlarmTimeline {
    stage: AlarmStage,
    lead: Duration,
    // Time since the dusk fade started
    ramp_elapsed: Duration,
    pending_fade_out: Option<Duration>,
}

impl AlarmTimeline {
    pub fn new(lead: Duration) -> Self {
        AlarmTimeline {
            stage: AlarmStage::FadePicture,
            lead,
            ramp_elapsed: Duration::ZERO,
            pending_fade_out: None,
        }
    }
}

impl Iterator for AlarmTimeline {
    type Item = Step;

    fn next(&mut self) -> Option<Step> {
        let step = match self.stage {
            AlarmStage::FadePicture => {
                self.stage = AlarmStage::Blackout;
                Step::FadeOutPicture(ALARM_PICTURE_FADE)
            }
            AlarmStage::Blackout => {
                self.stage = AlarmStage::Lead;
                Step::Fill(Rgb::BLACK)
            }
            AlarmStage::Lead => {
                self.stage = AlarmStage::Sunrise;
                if self.lead.is_zero() {
                    return self.next();
                }
                Step::Wait(self.lead)
            }
            AlarmStage::Sunrise => {
                self.stage = AlarmStage::Daylight;
                Step::FadeIn {
                    color: SUNRISE_WHITE,
                    duration: SUNRISE,
                    interval: SUNRISE_INTERVAL,
                }
            }
            AlarmStage::Daylight => {
                self.stage = AlarmStage::Dusk;
                Step::Wait(DAYLIGHT)
            }
            AlarmStage::Dusk => {
                self.stage = AlarmStage::Ramp;
                self.ramp_elapsed = DUSK;
                Step::fade_out(Rgb::WHITE, DUSK)
            }
            AlarmStage::Ramp => {
                if let Some(half) = self.pending_fade_out.take() {
                    self.ramp_elapsed += half;
                    return Some(Step::fade_out(Rgb::WHITE, half));
                }
                if self.ramp_elapsed >= RAMP {
                    self.stage = AlarmStage::Flash;
                    return self.next();
                }
                // Both halves of a pulse share one period
                let half = ramp_half_period(self.ramp_elapsed);
                self.ramp_elapsed += half;
                self.pending_fade_out = Some(half);
                Step::fade_in(Rgb::WHITE, half)
            }
            AlarmStage::Flash => match self.pending_fade_out.take() {
                Some(half) => Step::fade_out(Rgb::WHITE, half),
                None => {
                    self.pending_fade_out = Some(FLASH_HALF_PERIOD);
                    Step::fade_in(Rgb::WHITE, FLASH_HALF_PERIOD)
                }
            },
        };
        Some(step)
    }
}
