//! `DelayNs` on top of a [`Clock`].

use std::sync::Arc;

use embedded_hal::delay::DelayNs;

use super::Clock;

/// Delay provider that sleeps on a [`Clock`]'s timeline.
///
/// On hardware this is a thread sleep; on a manual simulator clock it
/// advances simulated time instead.
#[derive(Clone)]
pub struct ClockDelay {
    clock: Arc<dyn Clock>,
}

impl ClockDelay {
    /// Delay on `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl DelayNs for ClockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.clock.sleep_us((u64::from(ns) + 999) / 1000);
    }

    fn delay_us(&mut self, us: u32) {
        self.clock.sleep_us(u64::from(us));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.clock.sleep_us(u64::from(ms) * 1000);
    }
}
