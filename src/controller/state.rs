//! Controller state types.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{LevelParams, Mode};
use crate::error::{CommandError, Error};

/// Identifier of a control logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicId {
    /// Logic A: no date gate
    A,
    /// Logic B: date-gated
    B,
}

impl LogicId {
    /// The other logic.
    pub fn other(self) -> Self {
        match self {
            LogicId::A => LogicId::B,
            LogicId::B => LogicId::A,
        }
    }
}

impl fmt::Display for LogicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicId::A => write!(f, "A"),
            LogicId::B => write!(f, "B"),
        }
    }
}

impl FromStr for LogicId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(LogicId::A),
            "B" | "b" => Ok(LogicId::B),
            other => Err(CommandError::InvalidLogic(other.to_string()).into()),
        }
    }
}

/// Top-level controller mode.
///
/// `Manual` is exclusive with `Waiting` and `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    /// Homed, nothing selected
    #[default]
    Idle,
    /// Level selected, waiting for the start button
    Waiting,
    /// Automatic cycle in progress or complete
    Running,
    /// Joystick jogging
    Manual,
}

/// Phase of the automatic cycle. Strictly sequential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    /// Drill spins before Cycle 1
    InitialDelay,
    /// Back and forth with continuous drilling
    Cycle1,
    /// Single move toward the far end
    Intermediate,
    /// Back and forth with drill bursts
    Cycle2,
    /// Halted, waiting for reset
    Complete,
}

/// Why motion is paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseKind {
    /// Stop button pressed
    Stop,
    /// Safety switch open
    Safety,
}

/// Mutable state of one controller, shared between its threads.
#[derive(Debug, Clone, Default)]
pub struct ControllerState {
    /// Current mode
    pub mode: OperationMode,
    /// Cycle phase while running
    pub phase: Option<CyclePhase>,
    /// Human-readable position
    pub position: heapless::String<48>,
    /// Drill revolutions counted in Cycle 1
    pub cycle_count: u32,
    /// Drill bursts fired in Cycle 2
    pub cycle2_passes: u32,
    /// Selected level
    pub level: Option<LevelParams>,
    /// Manual drill spinning
    pub drill_on: bool,
    /// Active pause, if any
    pub paused: Option<PauseKind>,
    /// Startup or reset homing in progress
    pub homing: bool,
}

impl ControllerState {
    /// Replace the position text, truncating to capacity.
    pub fn set_position(&mut self, text: &str) {
        self.position.clear();
        for c in text.chars() {
            if self.position.push(c).is_err() {
                break;
            }
        }
    }

    /// Selected mode number.
    pub fn selected_mode(&self) -> Option<Mode> {
        self.level.map(|l| l.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logic_id_parsing() {
        assert_eq!("a".parse::<LogicId>().unwrap(), LogicId::A);
        assert_eq!(" B ".parse::<LogicId>().unwrap(), LogicId::B);
        assert_eq!(
            "C".parse::<LogicId>(),
            Err(Error::Command(CommandError::InvalidLogic("C".into())))
        );
    }

    #[test]
    fn test_position_truncates() {
        let mut state = ControllerState::default();
        state.set_position(&"x".repeat(100));
        assert_eq!(state.position.len(), 48);
    }
}
