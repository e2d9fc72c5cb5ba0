//! Sudden-darkening detector.
//!
//! The threshold is a ratio of the previous sample, so a 30% drop reads the
//! same in a dim room as in daylight.
use crate::luminance::BrightnessSample;

/// True iff `current < previous * threshold_ratio` and the display is not
/// already at maximum.
pub fn detect_drop(
    previous: BrightnessSample,
    current: BrightnessSample,
    threshold_ratio: f64,
    already_at_max: bool,
) -> bool {
    !already_at_max && current.value() < previous.value() * threshold_ratio
}

/// The previous sample, carried across iterations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendState {
    previous: BrightnessSample,
}

impl TrendState {
    pub fn new(seed: BrightnessSample) -> Self {
        Self { previous: seed }
    }

    pub fn previous(&self) -> BrightnessSample {
        self.previous
    }

    /// Compare against the stored sample, then replace it. The replacement
    /// happens whether or not a drop fired.
    pub fn observe(
        &mut self,
        current: BrightnessSample,
        threshold_ratio: f64,
        already_at_max: bool,
    ) -> bool {
        let fired = detect_drop(self.previous, current, threshold_ratio, already_at_max);
        self.previous = current;
        fired
    }
}
