//! The per-frame loop. Owns every piece of mutable state; the detectors it
//! calls are pure functions over fields of [`SessionState`].

use log::{debug, error, info, warn};
use std::{
    thread,
    time::{Duration, Instant},
};

use crate::backlight::{BrightnessController, Level};
use crate::config::{Levels, Settings};
use crate::cooldown::Cooldown;
use crate::frame::FrameSource;
use crate::gestures::{self, HandSkeleton};
use crate::landmarks::LandmarkSource;
use crate::luminance::{self, BrightnessSample};
use crate::overlay::{Overlay, StatusReport};
use crate::trend::TrendState;

/// Pause after a frame could not be read.
const IDLE_BACKOFF: Duration = Duration::from_millis(5);

/// What the display was last successfully set to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayStatus {
    Default,
    Maximum,
    ResetByGesture,
}

impl DisplayStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Default => "Default",
            Self::Maximum => "Maximum",
            Self::ResetByGesture => "Default (reset by gesture)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionState {
    pub trend: TrendState,
    pub status: DisplayStatus,
    pub cooldown: Cooldown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// No frame this tick; nothing changed.
    Skipped,
    Continue,
    Stop,
}

pub struct Session<F, L, B, O> {
    frames: F,
    hands: L,
    controller: B,
    overlay: O,
    drop_ratio: f64,
    levels: Levels,
    mirror: bool,
    state: SessionState,
}

impl<F, L, B, O> Session<F, L, B, O>
where
    F: FrameSource,
    L: LandmarkSource,
    B: BrightnessController,
    O: Overlay,
{
    pub fn new(settings: &Settings, frames: F, hands: L, controller: B, overlay: O) -> Self {
        let t = &settings.thresholds;
        Self {
            frames,
            hands,
            controller,
            overlay,
            drop_ratio: t.drop_ratio,
            levels: settings.levels.clone(),
            mirror: settings.camera.mirror,
            state: SessionState {
                trend: TrendState::new(BrightnessSample::new(t.initial_brightness)),
                status: DisplayStatus::Default,
                cooldown: Cooldown::new(t.cooldown()),
            },
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// True on success. Failures are logged and never escalate.
    fn apply(&mut self, level: Level) -> bool {
        match self.controller.set_brightness(level) {
            Ok(()) => true,
            Err(e) => {
                error!("failed to set display brightness to {level}: {e}");
                false
            }
        }
    }

    /// One loop iteration at monotonic time `now`.
    pub fn step(&mut self, now: Duration) -> Step {
        let Some(mut frame) = self.frames.read_frame() else {
            return Step::Skipped;
        };
        if self.mirror {
            frame.mirror();
        }

        let sample = luminance::estimate(&frame);
        debug!(
            "ambient brightness {sample}, previous {}",
            self.state.trend.previous()
        );
        let at_max = self.state.status == DisplayStatus::Maximum;
        if self.state.trend.observe(sample, self.drop_ratio, at_max) {
            info!("sudden brightness drop detected, ambient brightness {sample}");
            if self.apply(self.levels.maximum) {
                self.state.status = DisplayStatus::Maximum;
                info!("display brightness raised to {}", self.levels.maximum);
            }
        }

        let mut hands = self.hands.detect_hands(&frame);
        if self.mirror {
            hands.iter_mut().for_each(HandSkeleton::mirror);
        }
        if !hands.is_empty() && self.state.cooldown.is_open(now) {
            let overlay = &mut self.overlay;
            let fist = gestures::first_fist(&hands, |hand| overlay.draw(&mut frame, hand));
            if let Some((idx, _)) = fist {
                info!("closed fist detected (hand {idx})");
                if self.apply(self.levels.default) {
                    self.state.status = DisplayStatus::ResetByGesture;
                    self.state.cooldown.mark(now);
                    info!("display brightness returned to {}", self.levels.default);
                }
            }
        }

        let report = StatusReport {
            status: self.state.status,
            ambient: sample,
        };
        self.overlay.show(&frame, &report);

        if self.overlay.quit_requested() {
            Step::Stop
        } else {
            Step::Continue
        }
    }

    /// Sets the default level, loops until the camera closes or the user
    /// quits, then puts the default level back.
    pub fn run(&mut self) -> SessionState {
        info!("brightness assistant started; Ctrl-C to quit");
        if let Err(e) = self.controller.set_brightness(self.levels.default) {
            warn!("could not set initial brightness: {e}");
        }

        let start = Instant::now();
        while self.frames.is_open() {
            match self.step(start.elapsed()) {
                Step::Continue => {}
                Step::Stop => {
                    info!("stop requested");
                    break;
                }
                Step::Skipped => {
                    if self.overlay.quit_requested() {
                        info!("stop requested");
                        break;
                    }
                    thread::sleep(IDLE_BACKOFF);
                }
            }
        }

        match self.controller.set_brightness(self.levels.default) {
            Ok(()) => info!("display brightness returned to {} on exit", self.levels.default),
            Err(e) => warn!("could not restore brightness on exit: {e}"),
        }
        self.state
    }
}
