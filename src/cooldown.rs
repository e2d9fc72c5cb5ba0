//! Debounce for gesture-triggered actions.
//!
//! A fist stays in view for many frames; the gate turns that into a single
//! reset per `cooldown` window.

use std::time::Duration;

/// True iff nothing has fired yet or more than `cooldown` has elapsed.
pub fn may_trigger(last_trigger: Option<Duration>, now: Duration, cooldown: Duration) -> bool {
    match last_trigger {
        None => true,
        Some(last) => now.saturating_sub(last) > cooldown,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cooldown {
    duration: Duration,
    last_trigger: Option<Duration>,
}

impl Cooldown {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            last_trigger: None,
        }
    }

    #[cfg(test)]
    pub fn last_trigger(&self) -> Option<Duration> {
        self.last_trigger
    }

    pub fn is_open(&self, now: Duration) -> bool {
        may_trigger(self.last_trigger, now, self.duration)
    }

    pub fn mark(&mut self, now: Duration) {
        self.last_trigger = Some(now);
    }
}
