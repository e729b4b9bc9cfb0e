//! Operator and machine inputs.
//!
//! Edge-detected buttons and limit switches, plus the analog joystick
//! used in manual mode.

mod edge;
mod joystick;

pub use edge::{EdgeInput, InputKind, BUTTON_DEBOUNCE_US};
pub use joystick::{AnalogInput, Deflection, Joystick, JoystickBounds, SimAnalog};
