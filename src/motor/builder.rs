//! Builder pattern for StepperMotor.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::error::{ConfigError, Error, Result};

use super::driver::StepperMotor;

/// Builder for creating StepperMotor instances.
pub struct StepperMotorBuilder<STEP, DIR, DELAY>
where
    STEP: OutputPin,
    DIR: OutputPin,
    DELAY: DelayNs,
{
    step_pin: Option<STEP>,
    dir_pin: Option<DIR>,
    delay: Option<DELAY>,
    name: Option<heapless::String<32>>,
    initial_direction: bool,
}

impl<STEP, DIR, DELAY> Default for StepperMotorBuilder<STEP, DIR, DELAY>
where
    STEP: OutputPin,
    DIR: OutputPin,
    DELAY: DelayNs,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<STEP, DIR, DELAY> StepperMotorBuilder<STEP, DIR, DELAY>
where
    STEP: OutputPin,
    DIR: OutputPin,
    DELAY: DelayNs,
{
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            step_pin: None,
            dir_pin: None,
            delay: None,
            name: None,
            initial_direction: false,
        }
    }

    /// Set the STEP pin.
    pub fn step_pin(mut self, pin: STEP) -> Self {
        self.step_pin = Some(pin);
        self
    }

    /// Set the DIR pin.
    pub fn dir_pin(mut self, pin: DIR) -> Self {
        self.dir_pin = Some(pin);
        self
    }

    /// Set the delay provider.
    pub fn delay(mut self, delay: DELAY) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set the motor name.
    pub fn name(mut self, name: &str) -> Self {
        self.name = heapless::String::try_from(name).ok();
        self
    }

    /// Direction level driven when the motor is built.
    pub fn initial_direction(mut self, direction: bool) -> Self {
        self.initial_direction = direction;
        self
    }

    /// Build the StepperMotor, driving STEP low and DIR to the initial level.
    ///
    /// # Errors
    ///
    /// Returns an error if a pin or the delay is missing, or if the first
    /// pin writes fail.
    pub fn build(self) -> Result<StepperMotor<STEP, DIR, DELAY>> {
        let step_pin = self.step_pin.ok_or_else(|| missing("step_pin"))?;
        let dir_pin = self.dir_pin.ok_or_else(|| missing("dir_pin"))?;
        let delay = self.delay.ok_or_else(|| missing("delay"))?;
        let name = self
            .name
            .unwrap_or_else(|| heapless::String::try_from("motor").unwrap_or_default());

        let mut motor = StepperMotor::new(step_pin, dir_pin, delay, name, self.initial_direction);
        motor.step_pulse(false)?;
        motor.set_direction(self.initial_direction)?;
        Ok(motor)
    }
}

fn missing(field: &'static str) -> Error {
    Error::Config(ConfigError::InvalidValue {
        field,
        reason: "is required",
    })
}
