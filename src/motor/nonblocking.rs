//! Tick-driven stepper for cooperative multi-motor loops.
//!
//! Each [`NonBlockingStepper`] keeps its own deadline, so two motors
//! stepped from one polling loop never wait on each other. Tick math is
//! 32-bit and wraparound-safe.

use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::error::Result;
use crate::port::Clock;

use super::driver::StepperMotor;

/// Half-pulse emitter over a [`StepperMotor`].
pub struct NonBlockingStepper<STEP, DIR, DELAY>
where
    STEP: OutputPin,
    DIR: OutputPin,
    DELAY: DelayNs,
{
    motor: StepperMotor<STEP, DIR, DELAY>,
    clock: Arc<dyn Clock>,
    interval_us: u32,
    enabled: bool,
    last_tick: u32,
}

impl<STEP, DIR, DELAY> NonBlockingStepper<STEP, DIR, DELAY>
where
    STEP: OutputPin,
    DIR: OutputPin,
    DELAY: DelayNs,
{
    /// Wrap a motor. Starts disabled with a 1 ms half period.
    pub fn new(motor: StepperMotor<STEP, DIR, DELAY>, clock: Arc<dyn Clock>) -> Self {
        let last_tick = clock.ticks_us() as u32;
        Self {
            motor,
            clock,
            interval_us: 1000,
            enabled: false,
            last_tick,
        }
    }

    /// Half-pulse interval in microseconds.
    #[inline]
    pub fn speed(&self) -> u32 {
        self.interval_us
    }

    /// Set the half-pulse interval. Zero is treated as one microsecond.
    pub fn set_speed(&mut self, interval_us: u32) {
        self.interval_us = interval_us.max(1);
    }

    /// Drive the DIR pin.
    pub fn set_direction(&mut self, direction: bool) -> Result<()> {
        self.motor.set_direction(direction)
    }

    /// Start emitting pulses from now.
    pub fn enable(&mut self) {
        self.enabled = true;
        self.last_tick = self.now();
    }

    /// Stop emitting pulses. Pin levels are left as they are.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.last_tick = self.now();
    }

    /// `true` while enabled.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Toggle the STEP pin if the half period has elapsed.
    /// Returns `true` when an edge was written.
    pub fn update(&mut self) -> Result<bool> {
        let now = self.now();
        self.update_at(now)
    }

    /// [`update`](Self::update) against an explicit 32-bit tick.
    pub fn update_at(&mut self, now: u32) -> Result<bool> {
        if !self.enabled {
            return Ok(false);
        }
        if now.wrapping_sub(self.last_tick) < self.interval_us {
            return Ok(false);
        }
        let next = !self.motor.is_pulse_high();
        self.motor.step_pulse(next)?;
        self.last_tick = now;
        Ok(true)
    }

    /// Microseconds until the next edge is due; `None` while disabled.
    pub fn next_due_in(&self, now: u32) -> Option<u32> {
        if !self.enabled {
            return None;
        }
        let elapsed = now.wrapping_sub(self.last_tick);
        Some(self.interval_us.saturating_sub(elapsed))
    }

    /// Current 32-bit tick of the clock this stepper runs on.
    #[inline]
    pub fn now(&self) -> u32 {
        self.clock.ticks_us() as u32
    }

    /// Disable and force both outputs low.
    pub fn stop(&mut self) -> Result<()> {
        self.disable();
        self.motor.stop()
    }

    /// The underlying motor.
    #[inline]
    pub fn motor(&self) -> &StepperMotor<STEP, DIR, DELAY> {
        &self.motor
    }

    /// The underlying motor, for blocking moves.
    #[inline]
    pub fn motor_mut(&mut self) -> &mut StepperMotor<STEP, DIR, DELAY> {
        &mut self.motor
    }
}
