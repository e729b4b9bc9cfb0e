//! # drill-rig
//!
//! Controller for a two-axis stepper drill rig: a linear axis carrying a
//! drill motor, run through homing, a five-phase automatic cycle or
//! joystick jogging, with two interchangeable control logics.
//!
//! ## Features
//!
//! - **embedded-hal 1.0**: Stepper drivers use `OutputPin` for STEP/DIR and
//!   `DelayNs` for timing; inputs use `InputPin`
//! - **Two logics**: Logic A, and Logic B gated on a calendar date lockout
//! - **Mutual exclusion**: An [`ExecutionMediator`] keeps at most one logic active
//! - **Safety first**: Stop button and safety switch pause motion in every phase
//! - **Configuration-driven**: One JSON document per logic, dotted-path updates,
//!   backup on save
//! - **Simulation**: In-memory GPIO port with a linear-axis model
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use drill_rig::{CycleController, ExecutionMediator, LogicId, NullObserver};
//! use drill_rig::config::CycleConfig;
//! use drill_rig::port::{PortHandle, SimPort};
//!
//! let port = PortHandle::new(Arc::new(SimPort::new()));
//! let logic_a = CycleController::builder(LogicId::A)
//!     .port(port.clone())
//!     .config(CycleConfig::default())
//!     .build()?;
//! let logic_b = CycleController::builder(LogicId::B)
//!     .port(port)
//!     .config(CycleConfig::default())
//!     .build()?;
//!
//! let mediator = ExecutionMediator::new(logic_a, logic_b, Arc::new(NullObserver))?;
//! mediator.select_logic(LogicId::A)?;
//! mediator.select_mode(2)?;
//! # Ok::<(), drill_rig::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `rpi`: Raspberry Pi GPIO and MCP3008 joystick ADC through rppal

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]

pub mod config;
pub mod controller;
pub mod error;
pub mod execution;
pub mod input;
pub mod motor;
pub mod port;

pub use config::{load_config, validate_config, CycleConfig, Mode};
pub use controller::{
    ChannelObserver, CycleController, CycleControllerBuilder, CyclePhase, DateGate, LogicId,
    NullObserver, OperationMode, StatusObserver, StatusSnapshot,
};
pub use error::{Error, Result};
pub use execution::{ExecutionMediator, ExecutionState};
pub use motor::{NonBlockingStepper, StepperMotor};
