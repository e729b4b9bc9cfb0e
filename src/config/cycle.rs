//! Per-logic cycle parameter document.
//!
//! One JSON document per logic. Field names are the document keys used
//! on the rig, so dotted update paths (`velocidades_lineal.nivel2`) match
//! the serialized form directly.

use serde::{Deserialize, Serialize};

use crate::error::{CommandError, Result};
use crate::input::JoystickBounds;
use crate::port::PinId;

/// Operating level selected by the operator (1 to 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mode(u8);

impl Mode {
    /// Validate a mode number.
    pub fn new(n: u8) -> Result<Self> {
        if (1..=5).contains(&n) {
            Ok(Mode(n))
        } else {
            Err(CommandError::InvalidMode(n).into())
        }
    }

    /// Mode number.
    #[inline]
    pub fn get(self) -> u8 {
        self.0
    }

    /// Document key (`nivelN`).
    pub fn key(self) -> &'static str {
        match self.0 {
            1 => "nivel1",
            2 => "nivel2",
            3 => "nivel3",
            4 => "nivel4",
            _ => "nivel5",
        }
    }
}

impl core::fmt::Display for Mode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One value per operating level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelTable {
    /// Level 1
    pub nivel1: u32,
    /// Level 2
    pub nivel2: u32,
    /// Level 3
    pub nivel3: u32,
    /// Level 4
    pub nivel4: u32,
    /// Level 5
    pub nivel5: u32,
}

impl LevelTable {
    /// Same value for every level.
    pub const fn splat(v: u32) -> Self {
        Self {
            nivel1: v,
            nivel2: v,
            nivel3: v,
            nivel4: v,
            nivel5: v,
        }
    }

    /// Value for a mode.
    pub fn get(&self, mode: Mode) -> u32 {
        match mode.get() {
            1 => self.nivel1,
            2 => self.nivel2,
            3 => self.nivel3,
            4 => self.nivel4,
            _ => self.nivel5,
        }
    }

    pub(crate) fn values(&self) -> [u32; 5] {
        [self.nivel1, self.nivel2, self.nivel3, self.nivel4, self.nivel5]
    }
}

/// Linear half-pulse intervals per level, plus the homing speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearSpeeds {
    /// Per-level values
    #[serde(flatten)]
    pub levels: LevelTable,
    /// Homing speed
    pub home: u32,
}

/// Drill half-pulse intervals per level, plus the default used for the
/// initial delay and manual spinning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrillSpeeds {
    /// Per-level values
    #[serde(flatten)]
    pub levels: LevelTable,
    /// Initial-delay and manual spin speed
    pub default: u32,
}

/// Motor output pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorPins {
    /// Linear STEP
    pub pulsos1: PinId,
    /// Linear DIR
    pub dir1: PinId,
    /// Drill STEP
    pub pulsos2: PinId,
    /// Drill DIR
    pub dir2: PinId,
}

/// Input pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputPins {
    /// Reset button
    pub btn_reset: PinId,
    /// Start button
    pub btn_start: PinId,
    /// Stop button
    pub btn_stop: PinId,
    /// Drill toggle button (manual mode).
    pub btn_tala: PinId,
    /// Home limit switch
    pub fin_home: PinId,
    /// Final limit switch
    pub fin_final: PinId,
    /// Safety interlock.
    pub switch_s: PinId,
    /// ADC channel of the joystick
    #[serde(default)]
    pub joystick_adc_channel: u8,
}

/// Electrical convention shared by all buttons and switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputPolarity {
    /// `true` when a closed contact reads High
    #[serde(default = "default_true")]
    pub active_high: bool,
}

impl Default for InputPolarity {
    fn default() -> Self {
        Self { active_high: true }
    }
}

/// Direction levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorParameters {
    /// Linear DIR level that moves toward home.
    pub sentido_giro_lineal: bool,
    /// Drill DIR level.
    pub sentido_giro_taladro: bool,
    /// Cycle passes drive the far-end leg with DIR = !sentido_ciclos.
    pub sentido_ciclos: bool,
}

/// Homing offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeSteps {
    /// Steps moved away from the home switch after it triggers.
    pub pasos_despues_home: u32,
}

/// Manual jog speed range (half-pulse microseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualSpeeds {
    /// Fastest interval, at full deflection.
    pub limite_inferior: u32,
    /// Slowest interval, at the deadzone edge.
    pub limite_superior: u32,
}

/// Timing constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timings {
    /// Drill spin before Cycle 1.
    pub tiempo_antes_de_girar_ms: u64,
    /// Settle delay after a stop or safety pause is released.
    pub tiempo_para_empezar_despues_stop_ms: u64,
    #[serde(default = "default_phase_pause")]
    pub pausa_entre_fases_ms: u64,
}

/// Bounce-back move at a travel limit in manual mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rebound {
    /// Steps moved back from the limit
    pub pasos: u32,
    /// Half-pulse interval of the move
    pub velocidad: u32,
}

impl Default for Rebound {
    fn default() -> Self {
        Self {
            pasos: 50,
            velocidad: 2000,
        }
    }
}

/// Calendar date as stored in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDate {
    /// Year
    pub year: i32,
    /// Month (1-12)
    pub month: u32,
    /// Day of month
    pub day: u32,
}

/// Date lockout settings (Logic B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtcConfig {
    /// Whether the date is checked at all
    #[serde(default)]
    pub enabled: bool,
    /// Lockout date
    pub target_date: TargetDate,
    /// Lock out once the target date is reached
    #[serde(default = "default_true")]
    pub lockout_on_target_date: bool,
    /// Period of the running check
    #[serde(default = "default_check_interval")]
    pub check_interval_ms: u64,
}

/// Complete parameter set for one logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Display name
    pub logic_name: String,
    /// Motor outputs
    pub motor_pins: MotorPins,
    /// Inputs
    pub input_pins: InputPins,
    /// Input polarity
    #[serde(default)]
    pub input_polarity: InputPolarity,
    /// Direction levels
    pub motor_parameters: MotorParameters,
    /// Post-home offset
    pub pasos_home: HomeSteps,
    /// Cycle 1 pass length
    pub pasos_primer_nivel: LevelTable,
    /// Cycle 1 revolution target
    pub vueltas_primer_nivel: LevelTable,
    /// Intermediate move length
    pub pasos_acomodo_segundo_nivel: LevelTable,
    /// Cycle 2 pass length
    pub pasos_segundo_nivel: LevelTable,
    /// Cycle 2 burst target
    pub vueltas_segundo_nivel: LevelTable,
    /// Linear speeds
    pub velocidades_lineal: LinearSpeeds,
    /// Drill speeds
    pub velocidades_taladro: DrillSpeeds,
    /// Manual jog range
    pub velocidades_manual: ManualSpeeds,
    /// Drill half-pulses per revolution
    pub pasos_por_vuelta_taladro: u32,
    /// Steps in one Cycle 2 drill burst
    pub pasos_taladro_ciclo2: u32,
    /// Half-pulse interval of a Cycle 2 burst
    pub velocidad_pasos_taladro_ciclo2: u32,
    /// Timing constants
    pub tiempos: Timings,
    /// Joystick calibration
    #[serde(default)]
    pub joystick: JoystickBounds,
    /// Bounce-back at travel limits
    #[serde(default)]
    pub rebote: Rebound,
    /// Date lockout, Logic B only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtc_config: Option<RtcConfig>,
}

/// Parameters of one operating level, resolved from the tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelParams {
    /// Level these values belong to
    pub mode: Mode,
    /// Steps per pass in Cycle 1.
    pub pasos_ciclo1: u32,
    /// Drill revolutions Cycle 1 runs for.
    pub vueltas_ciclo1: u32,
    /// Steps of the intermediate move.
    pub pasos_intermedio: u32,
    /// Steps per pass in Cycle 2.
    pub pasos_ciclo2: u32,
    /// Drill bursts Cycle 2 runs for.
    pub vueltas_ciclo2: u32,
    /// Linear half-pulse interval
    pub velocidad_lineal: u32,
    /// Drill half-pulse interval
    pub velocidad_taladro: u32,
}

impl CycleConfig {
    /// Resolve the level tables for `mode`.
    pub fn level(&self, mode: Mode) -> LevelParams {
        LevelParams {
            mode,
            pasos_ciclo1: self.pasos_primer_nivel.get(mode),
            vueltas_ciclo1: self.vueltas_primer_nivel.get(mode),
            pasos_intermedio: self.pasos_acomodo_segundo_nivel.get(mode),
            pasos_ciclo2: self.pasos_segundo_nivel.get(mode),
            vueltas_ciclo2: self.vueltas_segundo_nivel.get(mode),
            velocidad_lineal: self.velocidades_lineal.levels.get(mode),
            velocidad_taladro: self.velocidades_taladro.levels.get(mode),
        }
    }

    /// Every output pin of this logic.
    pub fn output_pins(&self) -> [PinId; 4] {
        let p = &self.motor_pins;
        [p.pulsos1, p.dir1, p.pulsos2, p.dir2]
    }
}

impl Default for CycleConfig {
    /// Bench defaults on the simulator pin map.
    fn default() -> Self {
        Self {
            logic_name: "Logic A".into(),
            motor_pins: MotorPins {
                pulsos1: 18,
                dir1: 23,
                pulsos2: 24,
                dir2: 25,
            },
            input_pins: InputPins {
                btn_reset: 17,
                btn_start: 27,
                btn_stop: 22,
                btn_tala: 5,
                fin_home: 13,
                fin_final: 19,
                switch_s: 6,
                joystick_adc_channel: 0,
            },
            input_polarity: InputPolarity::default(),
            motor_parameters: MotorParameters {
                sentido_giro_lineal: true,
                sentido_giro_taladro: true,
                sentido_ciclos: true,
            },
            pasos_home: HomeSteps {
                pasos_despues_home: 100,
            },
            pasos_primer_nivel: LevelTable {
                nivel1: 400,
                nivel2: 500,
                nivel3: 600,
                nivel4: 700,
                nivel5: 800,
            },
            vueltas_primer_nivel: LevelTable {
                nivel1: 1,
                nivel2: 2,
                nivel3: 3,
                nivel4: 4,
                nivel5: 5,
            },
            pasos_acomodo_segundo_nivel: LevelTable::splat(200),
            pasos_segundo_nivel: LevelTable::splat(300),
            vueltas_segundo_nivel: LevelTable {
                nivel1: 1,
                nivel2: 2,
                nivel3: 2,
                nivel4: 3,
                nivel5: 3,
            },
            velocidades_lineal: LinearSpeeds {
                levels: LevelTable::splat(800),
                home: 1000,
            },
            velocidades_taladro: DrillSpeeds {
                levels: LevelTable::splat(500),
                default: 600,
            },
            velocidades_manual: ManualSpeeds {
                limite_inferior: 400,
                limite_superior: 2000,
            },
            pasos_por_vuelta_taladro: 400,
            pasos_taladro_ciclo2: 200,
            velocidad_pasos_taladro_ciclo2: 500,
            tiempos: Timings {
                tiempo_antes_de_girar_ms: 2000,
                tiempo_para_empezar_despues_stop_ms: 500,
                pausa_entre_fases_ms: default_phase_pause(),
            },
            joystick: JoystickBounds::default(),
            rebote: Rebound::default(),
            rtc_config: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_phase_pause() -> u64 {
    1000
}

fn default_check_interval() -> u64 {
    1000
}
