// State Module - Mode, color and alarm fields shared between the command path and the animation thread
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use time::Time;
use tracing::info;

use crate::command::Command;
use crate::types::{AnimationMode, Rgb};

/// Consistent-enough view of the shared fields, read once per tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSnapshot {
    pub mode: AnimationMode,
    pub color: Rgb,
    pub alarm: Option<Time>,
    pub generation: u64,
}

/// Latest-value-wins shared state. Every field is an independent atomic;
/// a tick may observe a mode/color pair mid-update and corrects itself on
/// the next one.
#[derive(Debug, Default)]
pub struct CloudState {
    mode: AtomicU8,
    color: AtomicU32,
    cached_mode: AtomicU8,
    cached_color: AtomicU32,
    // Seconds since midnight + 1, 0 when unset
    alarm: AtomicU32,
    add_pattern: AtomicBool,
    generation: AtomicU64,
    settled_generation: AtomicU64,
}

impl CloudState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> AnimationMode {
        AnimationMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    pub fn color(&self) -> Rgb {
        Rgb::from_u32(self.color.load(Ordering::Acquire))
    }

    pub fn alarm(&self) -> Option<Time> {
        match self.alarm.load(Ordering::Acquire) {
            0 => None,
            encoded => {
                let seconds = encoded - 1;
                Time::from_hms((seconds / 3600) as u8, (seconds / 60 % 60) as u8, (seconds % 60) as u8).ok()
            }
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> ModeSnapshot {
        ModeSnapshot {
            generation: self.generation(),
            mode: self.mode(),
            color: self.color(),
            alarm: self.alarm(),
        }
    }

    fn set_mode(&self, mode: AnimationMode) {
        self.mode.store(mode.as_u8(), Ordering::Release);
    }

    fn set_color(&self, color: Rgb) {
        self.color.store(color.to_u32(), Ordering::Release);
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn set_fixed_color(&self, color: Rgb) {
        self.set_color(color);
        self.set_mode(AnimationMode::FixedColor);
        self.bump();
    }

    pub fn set_rainbow(&self) {
        self.set_mode(AnimationMode::Rainbow);
        self.bump();
    }

    pub fn set_patterns(&self) {
        self.set_mode(AnimationMode::Patterns);
        self.bump();
    }

    pub fn set_music(&self) {
        self.set_mode(AnimationMode::Music);
        self.bump();
    }

    pub fn set_alarm(&self, time: Time) {
        let seconds = time.hour() as u32 * 3600 + time.minute() as u32 * 60 + time.second() as u32;
        self.alarm.store(seconds + 1, Ordering::Release);
        self.set_mode(AnimationMode::Alarm);
        self.bump();
    }

    /// Flash `color`, then return to the current mode. A notification that
    /// arrives while one is already playing keeps the original restore slot.
    pub fn play_notification(&self, color: Rgb) {
        let current = self.mode();
        if current != AnimationMode::Notification {
            self.cached_mode.store(current.as_u8(), Ordering::Release);
            self.cached_color.store(self.color.load(Ordering::Acquire), Ordering::Release);
        }
        self.set_color(color);
        self.set_mode(AnimationMode::Notification);
        self.bump();
    }

    /// Put back the mode and color saved when the notification started.
    /// Does nothing if another command has already replaced the notification.
    pub fn restore_after_notification(&self) -> bool {
        let cached_mode = self.cached_mode.load(Ordering::Acquire);
        let restored = self
            .mode
            .compare_exchange(
                AnimationMode::Notification.as_u8(),
                cached_mode,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if restored {
            self.color.store(self.cached_color.load(Ordering::Acquire), Ordering::Release);
            self.bump();
        }
        restored
    }

    pub fn request_pattern(&self) {
        self.add_pattern.store(true, Ordering::Release);
    }

    /// Consume a pending add-pattern request
    pub fn take_add_pattern(&self) -> bool {
        self.add_pattern.swap(false, Ordering::AcqRel)
    }

    /// Mark `generation` as fully displayed
    pub fn settle(&self, generation: u64) {
        self.settled_generation.store(generation, Ordering::Release);
    }

    /// Nothing to render: no mode yet, or the fixed color is already showing
    pub fn is_idle(&self, snapshot: &ModeSnapshot) -> bool {
        match snapshot.mode {
            AnimationMode::Unset => true,
            AnimationMode::FixedColor => self.settled_generation.load(Ordering::Acquire) == snapshot.generation,
            _ => false,
        }
    }

    /// Apply one parsed command
    pub fn apply(&self, command: Command) {
        match command {
            Command::FixedColor(color) => self.set_fixed_color(color),
            Command::Rainbow => self.set_rainbow(),
            Command::Patterns => self.set_patterns(),
            Command::AddPattern => self.request_pattern(),
            Command::Music => self.set_music(),
            Command::Notification(color) => self.play_notification(color),
            Command::Alarm(time) => self.set_alarm(time),
        }
        info!("Applied {} (mode: {})", command.name(), self.mode().name());
    }
}
