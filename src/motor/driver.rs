//! Blocking step/direction stepper driver.
//!
//! Generic over embedded-hal 1.0 pin and delay types.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::error::{MotorError, Result};

/// Stepper motor driven by a STEP and a DIR output.
///
/// Generic over:
/// - `STEP`: STEP pin type (must implement `OutputPin`)
/// - `DIR`: DIR pin type (must implement `OutputPin`)
/// - `DELAY`: Delay provider (must implement `DelayNs`)
pub struct StepperMotor<STEP, DIR, DELAY>
where
    STEP: OutputPin,
    DIR: OutputPin,
    DELAY: DelayNs,
{
    /// STEP pin (one rising edge per step).
    step_pin: STEP,

    /// DIR pin.
    dir_pin: DIR,

    /// Delay provider for pulse timing.
    delay: DELAY,

    /// Motor name for logging.
    name: heapless::String<32>,

    /// Last commanded direction level.
    direction: bool,

    /// Last level written to the STEP pin.
    pulse_high: bool,
}

impl<STEP, DIR, DELAY> StepperMotor<STEP, DIR, DELAY>
where
    STEP: OutputPin,
    DIR: OutputPin,
    DELAY: DelayNs,
{
    pub(crate) fn new(
        step_pin: STEP,
        dir_pin: DIR,
        delay: DELAY,
        name: heapless::String<32>,
        direction: bool,
    ) -> Self {
        Self {
            step_pin,
            dir_pin,
            delay,
            name,
            direction,
            pulse_high: false,
        }
    }

    /// Get the motor name.
    #[inline]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Last commanded direction level.
    #[inline]
    pub fn direction(&self) -> bool {
        self.direction
    }

    /// Last level written to the STEP pin.
    #[inline]
    pub fn is_pulse_high(&self) -> bool {
        self.pulse_high
    }

    /// Drive the DIR pin and remember the level.
    pub fn set_direction(&mut self, direction: bool) -> Result<()> {
        write_level(&mut self.dir_pin, direction)?;
        self.direction = direction;
        Ok(())
    }

    /// Write the STEP pin immediately. The caller times both edges.
    pub fn step_pulse(&mut self, high: bool) -> Result<()> {
        write_level(&mut self.step_pin, high)?;
        self.pulse_high = high;
        Ok(())
    }

    /// Emit up to `steps` full pulses, `interval_us` per half period.
    ///
    /// `interrupt` is checked before every step with the STEP pin low;
    /// returning `true` ends the move early. Returns the number of steps
    /// actually emitted.
    pub fn step_blocking<I>(
        &mut self,
        steps: u32,
        interval_us: u32,
        direction: Option<bool>,
        mut interrupt: I,
    ) -> Result<u32>
    where
        I: FnMut() -> bool,
    {
        if let Some(dir) = direction {
            self.set_direction(dir)?;
        }

        let mut done = 0;
        while done < steps {
            if interrupt() {
                log::debug!("{}: move interrupted after {} of {} steps", self.name, done, steps);
                break;
            }
            self.step_pulse(true)?;
            self.delay.delay_us(interval_us);
            self.step_pulse(false)?;
            self.delay.delay_us(interval_us);
            done += 1;
        }
        Ok(done)
    }

    /// Force both outputs low. The remembered direction is kept so the
    /// next `set_direction` query still reflects the commanded leg.
    pub fn stop(&mut self) -> Result<()> {
        write_level(&mut self.step_pin, false)?;
        write_level(&mut self.dir_pin, false)?;
        self.pulse_high = false;
        Ok(())
    }

    /// Sleep on the motor's delay provider.
    #[inline]
    pub fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }

    /// Release the pins and delay provider.
    pub fn release(self) -> (STEP, DIR, DELAY) {
        (self.step_pin, self.dir_pin, self.delay)
    }
}

fn write_level<P: OutputPin>(pin: &mut P, high: bool) -> Result<()> {
    let res = if high { pin.set_high() } else { pin.set_low() };
    res.map_err(|_| MotorError::PinError.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction as PinTransaction};

    fn motor(step: &PinMock, dir: &PinMock) -> StepperMotor<PinMock, PinMock, NoopDelay> {
        StepperMotor::new(
            step.clone(),
            dir.clone(),
            NoopDelay::new(),
            heapless::String::try_from("test").unwrap(),
            false,
        )
    }

    #[test]
    fn test_step_blocking_emits_full_pulses() {
        let mut step = PinMock::new(&[
            PinTransaction::set(State::High),
            PinTransaction::set(State::Low),
            PinTransaction::set(State::High),
            PinTransaction::set(State::Low),
            PinTransaction::set(State::High),
            PinTransaction::set(State::Low),
        ]);
        let mut dir = PinMock::new(&[PinTransaction::set(State::High)]);

        let mut m = motor(&step, &dir);
        let done = m.step_blocking(3, 100, Some(true), || false).unwrap();

        assert_eq!(done, 3);
        assert!(m.direction());
        assert!(!m.is_pulse_high());
        step.done();
        dir.done();
    }

    #[test]
    fn test_step_blocking_stops_on_interrupt() {
        let mut step = PinMock::new(&[
            PinTransaction::set(State::High),
            PinTransaction::set(State::Low),
            PinTransaction::set(State::High),
            PinTransaction::set(State::Low),
        ]);
        let mut dir = PinMock::new(&[]);

        let mut m = motor(&step, &dir);
        let mut checks = 0;
        let done = m
            .step_blocking(10, 100, None, || {
                checks += 1;
                checks > 2
            })
            .unwrap();

        assert_eq!(done, 2);
        step.done();
        dir.done();
    }

    #[test]
    fn test_stop_keeps_logical_direction() {
        let mut step = PinMock::new(&[
            PinTransaction::set(State::High),
            PinTransaction::set(State::Low),
        ]);
        let mut dir = PinMock::new(&[
            PinTransaction::set(State::High),
            PinTransaction::set(State::Low),
        ]);

        let mut m = motor(&step, &dir);
        m.set_direction(true).unwrap();
        m.step_pulse(true).unwrap();
        m.stop().unwrap();

        assert!(m.direction());
        assert!(!m.is_pulse_high());
        step.done();
        dir.done();
    }

    #[test]
    fn test_zero_steps_touches_only_direction() {
        let mut step = PinMock::new(&[]);
        let mut dir = PinMock::new(&[PinTransaction::set(State::Low)]);

        let mut m = motor(&step, &dir);
        assert_eq!(m.step_blocking(0, 100, Some(false), || false).unwrap(), 0);
        step.done();
        dir.done();
    }
}
