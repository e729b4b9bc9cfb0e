//! Digital I/O port abstraction.
//!
//! The controller never touches GPIO directly. It consumes a [`DigitalPort`]
//! (numbered pins, mode/pull configuration, reads, writes, and a monotonic
//! microsecond tick) supplied either by real hardware or by [`SimPort`].
//!
//! Reads and writes are infallible at this seam: a backend that cannot
//! reach its pins logs the fault and reports the last known value.

mod delay;
mod pin;
#[cfg(feature = "rpi")]
pub mod rpi;
mod sim;

pub use delay::ClockDelay;
pub use pin::PortPin;
pub use sim::{AxisModel, SimPort};

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// GPIO pin number (BCM numbering on the Raspberry Pi).
pub type PinId = u8;

/// Logical level of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    /// Logic 0
    Low,
    /// Logic 1
    High,
}

impl Level {
    /// Create from a boolean (`true` = High).
    #[inline]
    pub fn from_bool(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }

    /// `true` for High.
    #[inline]
    pub fn is_high(self) -> bool {
        self == Level::High
    }

    /// Raw 0/1 value.
    #[inline]
    pub fn bit(self) -> u8 {
        self as u8
    }
}

impl core::ops::Not for Level {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

/// Pin direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinMode {
    /// Input
    Input,
    /// Output
    Output,
}

/// Pull resistor configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Pull {
    /// No pull resistor
    #[default]
    Off,
    /// Pull-up
    Up,
    /// Pull-down
    Down,
}

/// Monotonic microsecond time source.
pub trait Clock: Send + Sync {
    /// Microseconds since an arbitrary fixed origin. Never goes backwards.
    fn ticks_us(&self) -> u64;

    /// Let `us` microseconds pass on this clock's timeline.
    fn sleep_us(&self, us: u64) {
        thread::sleep(Duration::from_micros(us));
    }
}

/// Numbered digital I/O.
///
/// Must be callable at sub-millisecond rates; no call may block for more
/// than a few milliseconds.
pub trait DigitalPort: Clock {
    /// Configure a pin as input or output.
    fn set_mode(&self, pin: PinId, mode: PinMode);

    /// Configure the pull resistor of an input pin.
    fn set_pull(&self, pin: PinId, pull: Pull);

    /// Read the current level of a pin.
    fn read(&self, pin: PinId) -> Level;

    /// Drive an output pin.
    fn write(&self, pin: PinId, level: Level);

    /// Configure a pin as output and drive it to `initial`.
    fn set_output(&self, pin: PinId, initial: Level) {
        self.set_mode(pin, PinMode::Output);
        self.write(pin, initial);
    }

    /// Configure a pin as input with the given pull.
    fn set_input(&self, pin: PinId, pull: Pull) {
        self.set_mode(pin, PinMode::Input);
        self.set_pull(pin, pull);
    }
}

/// A port together with its clock.
///
/// Both point at the same backend; they are kept as two trait objects so
/// the clock can be handed to inputs and steppers on its own.
#[derive(Clone)]
pub struct PortHandle {
    /// Digital I/O
    pub io: Arc<dyn DigitalPort>,
    /// Time source of the same backend
    pub clock: Arc<dyn Clock>,
}

impl PortHandle {
    /// Wrap a concrete backend.
    pub fn new<P: DigitalPort + 'static>(port: Arc<P>) -> Self {
        Self {
            io: port.clone(),
            clock: port,
        }
    }

    /// Handle for one pin.
    pub fn pin(&self, pin: PinId) -> PortPin {
        PortPin::new(self.io.clone(), pin)
    }

    /// Delay provider on this backend's clock.
    pub fn delay(&self) -> ClockDelay {
        ClockDelay::new(self.clock.clone())
    }
}
