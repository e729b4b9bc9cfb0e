//! Analog joystick for manual jogging.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Raw analog sample source (10-bit ADC on the rig).
pub trait AnalogInput: Send + Sync {
    /// Latest raw sample.
    fn read_raw(&self) -> u16;
}

impl<T: AnalogInput + ?Sized> AnalogInput for Arc<T> {
    fn read_raw(&self) -> u16 {
        (**self).read_raw()
    }
}

/// Settable analog value for simulation and tests.
#[derive(Debug)]
pub struct SimAnalog(AtomicU16);

impl SimAnalog {
    /// Create with an initial sample.
    pub fn new(value: u16) -> Self {
        Self(AtomicU16::new(value))
    }

    /// Replace the sample.
    pub fn set(&self, value: u16) {
        self.0.store(value, Ordering::Relaxed);
    }
}

impl AnalogInput for SimAnalog {
    fn read_raw(&self) -> u16 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Calibration of the joystick axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoystickBounds {
    /// Lower edge of the center deadzone.
    pub center_min: u16,
    /// Upper edge of the center deadzone.
    pub center_max: u16,
    /// Smallest ADC reading.
    pub adc_min: u16,
    /// Largest ADC reading.
    pub adc_max: u16,
}

impl Default for JoystickBounds {
    fn default() -> Self {
        Self {
            center_min: 352,
            center_max: 652,
            adc_min: 0,
            adc_max: 1023,
        }
    }
}

impl JoystickBounds {
    /// `adc_min <= center_min < center_max <= adc_max`.
    pub fn is_valid(&self) -> bool {
        self.adc_min <= self.center_min
            && self.center_min < self.center_max
            && self.center_max <= self.adc_max
    }
}

/// Joystick position relative to the deadzone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deflection {
    /// Toward home.
    Backward,
    /// Inside the deadzone.
    Center,
    /// Toward the final limit.
    Forward,
}

impl Deflection {
    /// -1, 0 or 1.
    #[inline]
    pub fn sign(self) -> i8 {
        match self {
            Deflection::Backward => -1,
            Deflection::Center => 0,
            Deflection::Forward => 1,
        }
    }
}

/// Joystick on an analog input.
pub struct Joystick {
    adc: Arc<dyn AnalogInput>,
    bounds: JoystickBounds,
}

impl Joystick {
    /// Create a joystick reading from `adc`.
    pub fn new(adc: Arc<dyn AnalogInput>, bounds: JoystickBounds) -> Self {
        Self { adc, bounds }
    }

    /// Raw sample.
    #[inline]
    pub fn read_raw(&self) -> u16 {
        self.adc.read_raw()
    }

    /// Current deflection.
    pub fn deflection(&self) -> Deflection {
        self.deflection_of(self.read_raw())
    }

    /// Deflection for a given sample.
    pub fn deflection_of(&self, value: u16) -> Deflection {
        if value < self.bounds.center_min {
            Deflection::Backward
        } else if value > self.bounds.center_max {
            Deflection::Forward
        } else {
            Deflection::Center
        }
    }

    /// Half-pulse interval for the current position.
    ///
    /// `fastest` and `slowest` are microsecond intervals (`fastest < slowest`).
    pub fn speed_mapped(&self, fastest: u32, slowest: u32) -> u32 {
        self.speed_for(self.read_raw(), fastest, slowest)
    }

    /// Half-pulse interval for a given sample: the deadzone maps to
    /// `slowest`, full deflection either way to `fastest`.
    pub fn speed_for(&self, value: u16, fastest: u32, slowest: u32) -> u32 {
        let b = &self.bounds;
        let mapped = match self.deflection_of(value) {
            Deflection::Center => return slowest,
            Deflection::Backward => map_range(value, b.adc_min, b.center_min, fastest, slowest),
            Deflection::Forward => map_range(value, b.center_max, b.adc_max, slowest, fastest),
        };
        mapped.clamp(fastest.min(slowest), fastest.max(slowest))
    }
}

fn map_range(value: u16, in_min: u16, in_max: u16, out_min: u32, out_max: u32) -> u32 {
    if in_max == in_min {
        return out_min;
    }
    let (v, i0, i1) = (i64::from(value), i64::from(in_min), i64::from(in_max));
    let (o0, o1) = (i64::from(out_min), i64::from(out_max));
    let mapped = (v - i0) * (o1 - o0) / (i1 - i0) + o0;
    mapped.max(0) as u32
}
