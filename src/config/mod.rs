//! Configuration module for drill-rig.
//!
//! Per-logic cycle documents (JSON) with validation, dotted-path updates
//! and backup-on-save, plus the process-level rig file (TOML).

mod cycle;
mod loader;
mod params;
mod rig;
mod validation;

pub use cycle::{
    CycleConfig, DrillSpeeds, HomeSteps, InputPins, InputPolarity, LevelParams, LevelTable,
    LinearSpeeds, ManualSpeeds, Mode, MotorParameters, MotorPins, Rebound, RtcConfig, TargetDate,
    Timings,
};
pub use loader::{backup_path, load_config, load_rig_config, parse_config, parse_rig_config, save_config};
pub use rig::{Backend, LogSection, LogicSection, PortSection, RigConfig, SimulatorSection, StatusSection};
pub use validation::validate_config;
