//! Stepper motor drivers.
//!
//! [`StepperMotor`] emits blocking, software-timed pulses;
//! [`NonBlockingStepper`] wraps one for interval-driven polling loops.

mod builder;
mod driver;
mod nonblocking;

pub use builder::StepperMotorBuilder;
pub use driver::StepperMotor;
pub use nonblocking::NonBlockingStepper;
