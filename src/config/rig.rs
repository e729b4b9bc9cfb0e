//! Process-level rig configuration (TOML).

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Which digital port backend drives the rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-memory simulator
    #[default]
    Sim,
    /// Raspberry Pi GPIO (feature `rpi`)
    Rpi,
}

/// `[port]` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PortSection {
    /// Backend selection
    #[serde(default)]
    pub backend: Backend,
}

/// `[logic_a]` / `[logic_b]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct LogicSection {
    /// Path of the logic's JSON document
    pub config: PathBuf,
}

/// `[log]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct LogSection {
    /// env_logger filter, e.g. `info` or `drill_rig=debug`
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

/// `[status]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusSection {
    /// Capacity of the snapshot channel
    #[serde(default = "default_capacity")]
    pub channel_capacity: usize,
}

impl Default for StatusSection {
    fn default() -> Self {
        Self {
            channel_capacity: default_capacity(),
        }
    }
}

/// `[simulator]` table: geometry of the simulated linear axis.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SimulatorSection {
    /// Carriage start position, in steps from the home switch
    #[serde(default = "default_start")]
    pub start_position: i64,
    /// Steps over which the home switch stays closed
    #[serde(default)]
    pub home_travel: i64,
    /// Position of the final switch
    #[serde(default = "default_length")]
    pub length: i64,
}

impl Default for SimulatorSection {
    fn default() -> Self {
        Self {
            start_position: default_start(),
            home_travel: 0,
            length: default_length(),
        }
    }
}

/// Root of `rig.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct RigConfig {
    /// Port backend
    #[serde(default)]
    pub port: PortSection,
    /// Logic A document
    pub logic_a: LogicSection,
    /// Logic B document
    pub logic_b: LogicSection,
    /// Logging
    #[serde(default)]
    pub log: LogSection,
    /// Status channel
    #[serde(default)]
    pub status: StatusSection,
    /// Simulated axis
    #[serde(default)]
    pub simulator: SimulatorSection,
}

impl RigConfig {
    /// Make relative document paths relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for section in [&mut self.logic_a, &mut self.logic_b] {
            if section.config.is_relative() {
                section.config = base.join(&section.config);
            }
        }
    }
}

fn default_level() -> String {
    "info".into()
}

fn default_capacity() -> usize {
    64
}

fn default_start() -> i64 {
    1500
}

fn default_length() -> i64 {
    6000
}
