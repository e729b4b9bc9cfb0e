//! Edge-detected digital inputs.
//!
//! An input is "active" when its raw level equals the configured active
//! level. `poll` reports the transition into the active state exactly
//! once; buttons additionally ignore reads within the debounce window of
//! the last accepted transition. The owning loop must poll at least every
//! millisecond or fast transitions are lost.

use std::sync::Arc;

use embedded_hal::digital::InputPin;

use crate::port::{Clock, Level};

/// Debounce window applied to buttons.
pub const BUTTON_DEBOUNCE_US: u64 = 50_000;

/// Input class, which decides debounce gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Push button, debounced.
    Button {
        /// Debounce window in microseconds.
        debounce_us: u64,
    },
    /// Limit or safety switch, assumed electrically clean.
    Switch,
}

impl InputKind {
    /// Button with the default 50 ms debounce.
    pub const fn button() -> Self {
        InputKind::Button {
            debounce_us: BUTTON_DEBOUNCE_US,
        }
    }
}

/// Polled input with rising-edge detection.
pub struct EdgeInput<P: InputPin> {
    pin: P,
    clock: Arc<dyn Clock>,
    name: heapless::String<16>,
    kind: InputKind,
    active: Level,
    last_state: Level,
    last_change_us: u64,
}

impl<P: InputPin> EdgeInput<P> {
    /// Create an input and latch its current level as the baseline.
    pub fn new(
        mut pin: P,
        clock: Arc<dyn Clock>,
        name: &str,
        kind: InputKind,
        active: Level,
    ) -> Self {
        let last_state = match pin.is_high() {
            Ok(high) => Level::from_bool(high),
            Err(_) => !active,
        };
        let last_change_us = clock.ticks_us();
        Self {
            pin,
            clock,
            name: short_name(name),
            kind,
            active,
            last_state,
            last_change_us,
        }
    }

    /// Input name for logging.
    #[inline]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Level that counts as active.
    #[inline]
    pub fn active_level(&self) -> Level {
        self.active
    }

    /// Returns `true` once per transition into the active state.
    pub fn poll(&mut self) -> bool {
        let now = self.clock.ticks_us();
        if let InputKind::Button { debounce_us } = self.kind {
            if now.saturating_sub(self.last_change_us) < debounce_us {
                return false;
            }
        }

        let current = self.read_level();
        if current == self.last_state {
            return false;
        }

        self.last_state = current;
        self.last_change_us = now;
        if current == self.active {
            log::debug!("input '{}' activated", self.name);
            true
        } else {
            false
        }
    }

    /// Whether the input reads active right now. Does not touch edge state.
    pub fn is_active(&mut self) -> bool {
        self.read_level() == self.active
    }

    /// Re-latch the baseline to the current level, discarding any pending edge.
    pub fn resync(&mut self) {
        self.last_state = self.read_level();
    }

    fn read_level(&mut self) -> Level {
        match self.pin.is_high() {
            Ok(high) => Level::from_bool(high),
            Err(_) => {
                log::warn!("input '{}' read failed, keeping {:?}", self.name, self.last_state);
                self.last_state
            }
        }
    }
}

/// Fit `name` into the fixed-capacity name, cutting at a char boundary.
fn short_name(name: &str) -> heapless::String<16> {
    let mut out = heapless::String::new();
    for c in name.chars() {
        if out.push(c).is_err() {
            log::warn!("input name '{}' truncated to '{}'", name, out);
            break;
        }
    }
    out
}
