// Director Module - Mode state machine, timed sequences and frame pacing
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::frame::Frame;
use crate::mesh::MeshCoordinator;
use crate::output::LedOutput;
use crate::pattern::Pattern;
use crate::pool::PatternPool;
use crate::rainbow::RainbowPattern;
use crate::state::{CloudState, ModeSnapshot};
use crate::timeline::{self, ramp_factor, AlarmTimeline, Step};
use crate::types::{AnimationMode, Rgb};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectorSettings {
    /// Target frame period
    pub tick: Duration,
    /// Rest between checks while nothing needs rendering
    pub idle_rest: Duration,
    /// Longest sleep inside a timed sequence between mode checks
    pub poll_interval: Duration,
    pub intro: Duration,
}

impl Default for DirectorSettings {
    fn default() -> Self {
        DirectorSettings {
            tick: Duration::from_millis(50),
            idle_rest: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(500),
            intro: Duration::from_secs(5),
        }
    }
}

// Per-second frame timing for debug logs
struct FrameStats {
    window_start: Option<Instant>,
    frames: u32,
    slowest: Duration,
    last: Duration,
}

impl FrameStats {
    fn new() -> Self {
        FrameStats {
            window_start: None,
            frames: 0,
            slowest: Duration::ZERO,
            last: Duration::ZERO,
        }
    }

    fn record(&mut self, now: Instant, spent: Duration, mode: AnimationMode) {
        let window_start = *self.window_start.get_or_insert(now);
        self.frames += 1;
        self.slowest = self.slowest.max(spent);
        self.last = spent;

        if now.saturating_duration_since(window_start) >= Duration::from_secs(1) {
            debug!(
                "{}: {} frames, last {}ms, slowest {}ms",
                mode.name(),
                self.frames,
                self.last.as_millis(),
                self.slowest.as_millis()
            );
            self.window_start = Some(now);
            self.frames = 0;
            self.slowest = Duration::ZERO;
        }
    }
}

/// Owns the render path and decides every tick what the cloud shows.
/// Runs on a single thread; commands reach it only through `CloudState`.
pub struct Director<O: LedOutput, C: Clock> {
    state: Arc<CloudState>,
    shutdown: Arc<AtomicBool>,
    mesh: MeshCoordinator<O>,
    clock: C,
    rainbow: RainbowPattern,
    pool: PatternPool,
    // Last picture sent to the mesh, source of picture fades
    last_frame: Frame,
    settings: DirectorSettings,
    stats: FrameStats,
}

impl<O: LedOutput, C: Clock> Director<O, C> {
    pub fn new(
        state: Arc<CloudState>,
        shutdown: Arc<AtomicBool>,
        mesh: MeshCoordinator<O>,
        clock: C,
        rainbow: RainbowPattern,
        pool: PatternPool,
        settings: DirectorSettings,
    ) -> Self {
        let last_frame = Frame::new(mesh.table().width(), mesh.table().height());
        Director {
            state,
            shutdown,
            mesh,
            clock,
            rainbow,
            pool,
            last_frame,
            settings,
            stats: FrameStats::new(),
        }
    }

    #[cfg(test)]
    pub fn pool(&self) -> &PatternPool {
        &self.pool
    }

    fn running(&self) -> bool {
        !self.shutdown.load(Ordering::Acquire)
    }

    // A timed sequence may keep writing only while its mode is current
    fn still(&self, mode: AnimationMode) -> bool {
        self.running() && self.state.mode() == mode
    }

    /// Intro (unless skipped), then tick until shutdown
    pub fn run(&mut self, skip_intro: bool) {
        if !skip_intro {
            self.play_intro();
        }
        while self.running() {
            self.tick();
        }
        info!("Animation loop stopped");
    }

    /// Rainbow for the intro duration, then black
    pub fn play_intro(&mut self) {
        let start = self.clock.now();
        while self.running() && self.clock.now().saturating_duration_since(start) < self.settings.intro {
            self.render_rainbow();
            self.clock.sleep(self.settings.tick);
        }
        info!("Intro finished");
        self.state.set_fixed_color(Rgb::BLACK);
    }

    /// One pass of the main loop
    pub fn tick(&mut self) {
        let started = self.clock.now();

        if self.state.take_add_pattern() {
            let kind = self.pool.spawn();
            info!("Added {} pattern on request ({} in the pool)", kind.name(), self.pool.foreground_len());
        }

        let snapshot = self.state.snapshot();
        if self.state.is_idle(&snapshot) {
            self.rest(snapshot.generation);
            return;
        }

        match snapshot.mode {
            AnimationMode::FixedColor => self.show_fixed_color(&snapshot),
            AnimationMode::Rainbow => self.render_rainbow(),
            AnimationMode::Patterns => self.render_patterns(),
            // Placeholder until audio capture exists
            AnimationMode::Music => {}
            AnimationMode::Notification => self.play_notification(&snapshot),
            AnimationMode::Alarm => self.play_alarm(&snapshot),
            AnimationMode::Unset => {}
        }

        let now = self.clock.now();
        let spent = now.saturating_duration_since(started);
        self.stats.record(now, spent, snapshot.mode);
        if spent < self.settings.tick {
            self.clock.sleep(self.settings.tick - spent);
        }
    }

    // Sleep up to the idle rest, waking early on any state change
    fn rest(&mut self, generation: u64) {
        let start = self.clock.now();
        while self.running() && self.state.generation() == generation {
            let elapsed = self.clock.now().saturating_duration_since(start);
            if elapsed >= self.settings.idle_rest {
                break;
            }
            self.mesh.keepalive();
            self.clock.sleep((self.settings.idle_rest - elapsed).min(self.settings.tick));
        }
    }

    fn show_fixed_color(&mut self, snapshot: &ModeSnapshot) {
        self.show_color(snapshot.color);
        self.state.settle(snapshot.generation);
        info!("Showing fixed color ({}, {}, {})", snapshot.color.r, snapshot.color.g, snapshot.color.b);
    }

    fn show_color(&mut self, color: Rgb) {
        self.mesh.fill(color);
        self.last_frame.fill(color);
    }

    fn render_rainbow(&mut self) {
        let now = self.clock.now();
        if let Some(frame) = self.rainbow.advance(now) {
            self.mesh.render(frame);
            self.last_frame.clone_from(frame);
        }
    }

    fn render_patterns(&mut self) {
        let now = self.clock.now();
        let frame = self.pool.next_frame(now);
        self.mesh.render(frame);
        self.last_frame.clone_from(frame);
    }

    fn play_notification(&mut self, snapshot: &ModeSnapshot) {
        info!("Playing notification");
        for step in timeline::notification(snapshot.color) {
            // A newer notification replaces the flash color mid-sequence
            let step = step.with_color(self.state.color());
            if !self.run_step(step, AnimationMode::Notification) {
                debug!("Notification interrupted");
                return;
            }
        }
        if self.state.restore_after_notification() {
            info!("Notification finished, back to {}", self.state.mode().name());
        }
    }

    fn play_alarm(&mut self, snapshot: &ModeSnapshot) {
        let Some(target) = snapshot.alarm else {
            warn!("Alarm mode without an alarm time");
            self.pause(self.settings.idle_rest, AnimationMode::Alarm);
            return;
        };

        let lead = timeline::alarm_lead(self.clock.time_of_day(), target);
        info!("Alarm set for {}, sunrise starts in {}s", target, lead.as_secs());

        for step in AlarmTimeline::new(lead) {
            if !self.run_step(step, AnimationMode::Alarm) {
                info!("Alarm cancelled");
                return;
            }
        }
    }

    /// Execute one timed step. Returns false when `mode` stopped being
    /// current; no further writes happen after that.
    pub fn run_step(&mut self, step: Step, mode: AnimationMode) -> bool {
        match step {
            Step::Fill(color) => {
                if !self.still(mode) {
                    return false;
                }
                self.show_color(color);
                true
            }
            Step::Wait(duration) => self.pause(duration, mode),
            Step::FadeOutPicture(duration) => {
                let picture = self.last_frame.clone();
                self.fade(duration, timeline::FADE_INTERVAL, mode, |factor| Fill::Picture(picture.faded(factor)), false)
            }
            Step::FadeIn {
                color,
                duration,
                interval,
            } => self.fade(duration, interval, mode, |factor| Fill::Color(color.scale(factor)), true),
            Step::FadeOut {
                color,
                duration,
                interval,
            } => self.fade(duration, interval, mode, |factor| Fill::Color(color.scale(factor)), false),
        }
    }

    // Write `render(factor)` every `interval` until `duration` has passed
    fn fade(
        &mut self,
        duration: Duration,
        interval: Duration,
        mode: AnimationMode,
        render: impl Fn(f32) -> Fill,
        rising: bool,
    ) -> bool {
        let start = self.clock.now();
        loop {
            let elapsed = self.clock.now().saturating_duration_since(start);
            if elapsed >= duration {
                return true;
            }
            if !self.still(mode) {
                return false;
            }

            let factor = ramp_factor(elapsed, duration, rising);
            if factor > 0.0 {
                match render(factor) {
                    Fill::Color(color) => self.show_color(color),
                    Fill::Picture(picture) => {
                        self.mesh.render(&picture);
                        self.last_frame = picture;
                    }
                }
            }

            let spent = self.clock.now().saturating_duration_since(start) - elapsed;
            let remaining = duration.saturating_sub(elapsed + spent);
            if !self.pause(interval.saturating_sub(spent).min(remaining), mode) {
                return false;
            }
        }
    }

    /// Sleep for `duration` in slices of at most the poll interval.
    /// Returns false as soon as `mode` is no longer current.
    fn pause(&mut self, duration: Duration, mode: AnimationMode) -> bool {
        let deadline = self.clock.now() + duration;
        loop {
            if !self.still(mode) {
                return false;
            }
            let now = self.clock.now();
            if now >= deadline {
                return true;
            }
            self.mesh.keepalive();
            self.clock.sleep((deadline - now).min(self.settings.poll_interval));
        }
    }
}

enum Fill {
    Color(Rgb),
    Picture(Frame),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;
    use crate::gradients::Palette;
    use crate::mesh::MeshTable;
    use crate::output::testing::RecordingOutput;
    use crate::pool::PoolSettings;
    use crate::types::Coordinate;
    use std::sync::atomic::AtomicUsize;
    use time::macros::time;

    struct Rig {
        director: Director<RecordingOutput, ManualClock>,
        state: Arc<CloudState>,
        shutdown: Arc<AtomicBool>,
        output: RecordingOutput,
        clock: ManualClock,
    }

    fn rig(now: time::Time) -> Rig {
        let coordinates = (0..4)
            .flat_map(|row| (0..6).map(move |column| Coordinate::new(row, column)))
            .collect();
        let table = MeshTable::new(coordinates).unwrap();
        let output = RecordingOutput::new(table.len());
        let clock = ManualClock::new(now);
        let state = Arc::new(CloudState::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let rainbow = RainbowPattern::new(table.width(), table.height(), Palette::classic());
        let pool = PatternPool::new(table.width(), table.height(), PoolSettings::default(), Some(5));
        let director = Director::new(
            Arc::clone(&state),
            Arc::clone(&shutdown),
            MeshCoordinator::new(table, output.clone()),
            clock.clone(),
            rainbow,
            pool,
            DirectorSettings::default(),
        );
        Rig {
            director,
            state,
            shutdown,
            output,
            clock,
        }
    }

    fn brightest(commit: &[Rgb]) -> u8 {
        commit.iter().map(|c| c.r.max(c.g).max(c.b)).max().unwrap_or(0)
    }

    #[test]
    fn test_unset_mode_rests_without_writing() {
        let mut rig = rig(time!(12:00));
        rig.director.tick();
        assert_eq!(rig.output.commit_count(), 0);
        assert_eq!(rig.clock.elapsed(), Duration::from_millis(1000));
    }

    #[test]
    fn test_fixed_color_renders_once_then_idles() {
        let mut rig = rig(time!(12:00));
        rig.state.set_fixed_color(Rgb::new(0, 0, 200));
        rig.director.tick();
        assert_eq!(rig.output.commit_count(), 1);
        assert_eq!(rig.output.last().unwrap(), vec![Rgb::new(0, 0, 200); 24]);

        let before = rig.clock.elapsed();
        rig.director.tick();
        assert_eq!(rig.output.commit_count(), 1);
        assert_eq!(rig.clock.elapsed() - before, Duration::from_millis(1000));
    }

    #[test]
    fn test_fixed_color_is_kept_alive_while_idle() {
        let mut rig = rig(time!(12:00));
        rig.state.set_fixed_color(Rgb::new(40, 0, 0));
        while rig.clock.elapsed() < Duration::from_secs(30) {
            rig.director.tick();
        }
        assert_eq!(rig.output.commit_count(), 1);
        // at least one keepalive per idle second
        assert!(rig.output.keepalive_count() >= 30);
    }

    #[test]
    fn test_idle_rest_wakes_on_command() {
        let mut rig = rig(time!(12:00));
        rig.state.set_fixed_color(Rgb::BLACK);
        rig.director.tick();

        let state = Arc::clone(&rig.state);
        let start = rig.clock.elapsed();
        rig.clock.at(start + Duration::from_millis(200), move |_| state.set_rainbow());
        rig.director.tick();
        assert!(rig.clock.elapsed() - start <= Duration::from_millis(250));

        rig.director.tick();
        assert_eq!(rig.output.commit_count(), 2);
    }

    #[test]
    fn test_intro_plays_rainbow_then_black() {
        let mut rig = rig(time!(12:00));
        rig.director.play_intro();
        assert_eq!(rig.output.commit_count(), 100);
        assert!(brightest(&rig.output.last().unwrap()) > 0);
        assert_eq!(rig.state.mode(), AnimationMode::FixedColor);
        assert_eq!(rig.state.color(), Rgb::BLACK);

        rig.director.tick();
        assert_eq!(rig.output.last().unwrap(), vec![Rgb::BLACK; 24]);
    }

    #[test]
    fn test_patterns_mode_paces_frames() {
        let mut rig = rig(time!(12:00));
        rig.state.set_patterns();
        for _ in 0..10 {
            rig.director.tick();
        }
        assert_eq!(rig.output.commit_count(), 10);
        assert_eq!(rig.clock.elapsed(), Duration::from_millis(500));
        assert!(rig.director.pool().len() >= 3);
    }

    #[test]
    fn test_add_pattern_request_spawns() {
        let mut rig = rig(time!(12:00));
        rig.state.set_music();
        rig.state.request_pattern();
        rig.director.tick();
        assert_eq!(rig.director.pool().foreground_len(), 1);
        // music is a placeholder: nothing is written
        assert_eq!(rig.output.commit_count(), 0);
    }

    #[test]
    fn test_notification_flashes_and_restores() {
        let mut rig = rig(time!(12:00));
        rig.state.set_fixed_color(Rgb::new(0, 0, 100));
        rig.director.tick();

        rig.state.play_notification(Rgb::new(255, 0, 0));
        let start = rig.clock.elapsed();
        rig.director.tick();

        let elapsed = rig.clock.elapsed() - start;
        assert!(elapsed >= Duration::from_millis(2600));
        assert!(elapsed < Duration::from_millis(2800));

        let history = rig.output.history();
        let peak_red = history.iter().map(|c| c[0].r).max().unwrap();
        assert!(peak_red > 200);
        assert!(history[1..].iter().all(|c| c[0].g == 0));

        assert_eq!(rig.state.mode(), AnimationMode::FixedColor);
        assert_eq!(rig.state.color(), Rgb::new(0, 0, 100));
        rig.director.tick();
        assert_eq!(rig.output.last().unwrap(), vec![Rgb::new(0, 0, 100); 24]);
    }

    #[test]
    fn test_second_notification_flashes_its_own_color() {
        let mut rig = rig(time!(12:00));
        rig.state.set_fixed_color(Rgb::new(0, 0, 100));
        rig.director.tick();

        rig.state.play_notification(Rgb::new(255, 0, 0));
        {
            let state = Arc::clone(&rig.state);
            let at = rig.clock.elapsed() + Duration::from_millis(1200);
            rig.clock.at(at, move |_| state.play_notification(Rgb::new(0, 255, 0)));
        }
        rig.director.tick();

        let history = rig.output.history();
        assert!(history.iter().map(|c| c[0].r).max().unwrap() > 200);
        assert!(history.iter().map(|c| c[0].g).max().unwrap() > 200);

        // the first notification's restore slot survives
        assert_eq!(rig.state.mode(), AnimationMode::FixedColor);
        assert_eq!(rig.state.color(), Rgb::new(0, 0, 100));
    }

    #[test]
    fn test_notification_interrupted_by_mode_change() {
        let mut rig = rig(time!(12:00));
        rig.state.set_patterns();
        rig.director.tick();
        rig.state.play_notification(Rgb::WHITE);

        let state = Arc::clone(&rig.state);
        let start = rig.clock.elapsed();
        rig.clock.at(start + Duration::from_millis(700), move |_| state.set_rainbow());
        rig.director.tick();

        assert!(rig.clock.elapsed() - start < Duration::from_millis(800));
        assert_eq!(rig.state.mode(), AnimationMode::Rainbow);
    }

    #[test]
    fn test_alarm_abort_during_wait_stops_writes() {
        let mut rig = rig(time!(6:00));
        rig.state.set_alarm(time!(6:30));

        let writes_at_abort = Arc::new(AtomicUsize::new(usize::MAX));
        let keepalives_at_abort = Arc::new(AtomicUsize::new(usize::MAX));
        let abort_at = Duration::from_secs(10 * 60);
        {
            let state = Arc::clone(&rig.state);
            let output = rig.output.clone();
            let writes = Arc::clone(&writes_at_abort);
            let keepalives = Arc::clone(&keepalives_at_abort);
            rig.clock.at(abort_at, move |_| {
                writes.store(output.commit_count(), Ordering::SeqCst);
                keepalives.store(output.keepalive_count(), Ordering::SeqCst);
                state.set_patterns();
            });
        }

        rig.director.tick();

        let elapsed = rig.clock.elapsed();
        assert!(elapsed >= abort_at);
        assert!(elapsed - abort_at <= Duration::from_millis(500));
        assert_eq!(rig.output.commit_count(), writes_at_abort.load(Ordering::SeqCst));
        // the blackout was held through the wait, and nothing follows the abort
        let keepalives = keepalives_at_abort.load(Ordering::SeqCst);
        assert!(keepalives >= 1000);
        assert_eq!(rig.output.keepalive_count(), keepalives);
        // black after the picture fade
        assert_eq!(rig.output.last().unwrap(), vec![Rgb::BLACK; 24]);
    }

    #[test]
    fn test_alarm_sunrise_reaches_daylight() {
        // less than two minutes out: the sunrise starts right away
        let mut rig = rig(time!(6:29));
        rig.state.set_alarm(time!(6:30));

        let daylight = Arc::new(AtomicUsize::new(0));
        {
            let state = Arc::clone(&rig.state);
            let output = rig.output.clone();
            let daylight = Arc::clone(&daylight);
            rig.clock.at(Duration::from_secs(300), move |_| {
                let last = output.last().unwrap_or_default();
                daylight.store(brightest(&last) as usize, Ordering::SeqCst);
                state.set_fixed_color(Rgb::BLACK);
            });
        }

        rig.director.tick();
        assert!(daylight.load(Ordering::SeqCst) >= 245);
        assert!(rig.clock.elapsed() < Duration::from_millis(300_500));
    }

    #[test]
    fn test_alarm_reissue_keeps_running() {
        let mut rig = rig(time!(6:29));
        rig.state.set_alarm(time!(6:30));
        {
            let state = Arc::clone(&rig.state);
            rig.clock.at(Duration::from_secs(60), move |_| state.set_alarm(time!(7:00)));
        }
        {
            let state = Arc::clone(&rig.state);
            rig.clock.at(Duration::from_secs(200), move |_| state.set_rainbow());
        }
        rig.director.tick();
        // the running sunrise ignored the new time and ran until the mode change
        assert!(rig.clock.elapsed() >= Duration::from_secs(200));
    }

    #[test]
    fn test_shutdown_stops_run_loop() {
        let mut rig = rig(time!(12:00));
        let shutdown = Arc::clone(&rig.shutdown);
        rig.clock.at(Duration::from_secs(2), move |_| shutdown.store(true, Ordering::SeqCst));
        rig.state.set_rainbow();
        rig.director.run(true);
        assert!(rig.clock.elapsed() >= Duration::from_secs(2));
        assert!(rig.clock.elapsed() < Duration::from_millis(2100));
    }
}
