//! Cycle controllers.
//!
//! A [`CycleController`] owns the hardware of one control logic and runs
//! it on a dedicated thread between [`start`](CycleController::start) and
//! [`stop`](CycleController::stop). Logic A and Logic B differ only in
//! their [`DateGate`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use drill_rig::controller::{CycleController, LogicId};
//! use drill_rig::config::CycleConfig;
//! use drill_rig::port::{PortHandle, SimPort};
//!
//! let port = PortHandle::new(Arc::new(SimPort::new()));
//! let mut controller = CycleController::builder(LogicId::A)
//!     .port(port)
//!     .config(CycleConfig::default())
//!     .build()?;
//!
//! controller.start()?;
//! controller.select_mode(2)?;
//! // press start on the rig...
//! controller.stop();
//! # Ok::<(), drill_rig::Error>(())
//! ```

mod cycle;
mod gate;
mod guards;
mod homing;
mod manual;
mod rig;
mod runner;
mod shared;
mod state;
mod status;

pub use gate::{
    target_date_string, DateGate, DateSource, ManualDateSource, RtcGate, SystemDateSource,
    MIN_PLAUSIBLE_YEAR,
};
pub use rig::{force_outputs_low, Guards, Hardware, Input, Operator, Rig, Stepper};
pub use state::{ControllerState, CyclePhase, LogicId, OperationMode, PauseKind};
pub use status::{ChannelObserver, NullObserver, StatusObserver, StatusSnapshot};

#[cfg(test)]
pub(crate) use status::blank_snapshot;

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError};
use std::thread::{self, JoinHandle};

use chrono::NaiveDateTime;
use serde_json::{Map, Value};

use crate::config::{load_config, save_config, validate_config, CycleConfig, Mode};
use crate::error::{CommandError, ConfigError, Result};
use crate::input::{AnalogInput, SimAnalog};
use crate::port::PortHandle;

use runner::Runner;
use shared::Shared;

/// One control logic: its hardware, configuration and controller thread.
pub struct CycleController {
    shared: Arc<Shared>,
    port: PortHandle,
    adc: Arc<dyn AnalogInput>,
    config_path: Option<PathBuf>,
    hardware: Option<Hardware>,
    hardware_stale: bool,
    thread: Option<JoinHandle<Option<Hardware>>>,
}

impl CycleController {
    /// Start building a controller for `logic`.
    pub fn builder(logic: LogicId) -> CycleControllerBuilder {
        CycleControllerBuilder::new(logic)
    }

    /// Logic this controller runs.
    pub fn logic(&self) -> LogicId {
        self.shared.logic
    }

    /// Launch the controller thread. It homes the axis, then waits for a
    /// mode selection or manual mode.
    ///
    /// Logic B refuses to start while its date lockout applies.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(CommandError::AlreadyRunning.into());
        }
        self.join_thread();

        let admitted = {
            let config = self.shared.config();
            self.shared.gate().admit(config.rtc_config.as_ref())
        };
        if let Err(e) = admitted {
            log::error!("[{}] start refused: {}", self.logic(), e);
            self.shared.reset_state("Locked out");
            return Err(e);
        }

        let hardware = match self.hardware.take() {
            Some(hw) if !self.hardware_stale => hw,
            _ => {
                let config = self.shared.config_snapshot();
                Hardware::build(&self.port, self.adc.clone(), &config)?
            }
        };
        self.hardware_stale = false;

        self.shared.abort.store(false, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.reset_state("Starting");

        let runner = Runner::new(self.shared.clone(), self.port.clone(), self.adc.clone(), hardware);
        let spawned = thread::Builder::new()
            .name(format!("logic-{}", self.logic()))
            .spawn(move || runner.run());
        match spawned {
            Ok(handle) => {
                self.thread = Some(handle);
                log::info!("[{}] started", self.logic());
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                self.hardware_stale = true;
                self.shared.reset_state("Fault");
                Err(CommandError::ThreadSpawn(e.to_string()).into())
            }
        }
    }

    /// Stop the controller thread, wait for it and force every output low.
    /// Safe to call when already stopped.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.abort.store(true, Ordering::SeqCst);
        self.join_thread();
        self.force_outputs_low();
        self.shared.abort.store(false, Ordering::SeqCst);
        self.shared.update(|s| {
            s.mode = OperationMode::Idle;
            s.phase = None;
            s.paused = None;
            s.drill_on = false;
            s.homing = false;
        });
    }

    fn join_thread(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            log::warn!("[{}] stop requested from its own thread", self.logic());
            return;
        }
        match handle.join() {
            Ok(Some(hw)) => self.hardware = Some(hw),
            Ok(None) => self.hardware_stale = true,
            Err(_) => {
                log::error!("[{}] controller thread panicked", self.logic());
                self.hardware_stale = true;
            }
        }
        log::info!("[{}] stopped", self.logic());
    }

    /// Whether the controller thread is alive.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Select automatic level `n` (1-5) and wait for the start button.
    pub fn select_mode(&self, n: u8) -> Result<()> {
        let mode = Mode::new(n)?;
        if !self.is_running() {
            return Err(CommandError::NoActiveLogic.into());
        }
        let level = self.shared.config().level(mode);

        self.shared.update(|s| {
            if s.homing {
                return Err(CommandError::NotHomed);
            }
            match s.mode {
                OperationMode::Running => Err(CommandError::CycleBusy),
                OperationMode::Manual => Err(CommandError::ManualActive),
                OperationMode::Idle | OperationMode::Waiting => {
                    s.mode = OperationMode::Waiting;
                    s.level = Some(level);
                    s.phase = None;
                    s.cycle_count = 0;
                    s.cycle2_passes = 0;
                    s.set_position("Waiting for start");
                    Ok(())
                }
            }
        })?;
        log::info!("[{}] mode {} selected, waiting for start", self.logic(), mode);
        Ok(())
    }

    /// Enter manual jog mode.
    pub fn enable_manual(&self) -> Result<()> {
        if !self.is_running() {
            return Err(CommandError::NoActiveLogic.into());
        }
        self.shared.update(|s| {
            if s.homing {
                return Err(CommandError::NotHomed);
            }
            match s.mode {
                OperationMode::Waiting | OperationMode::Running => Err(CommandError::CycleBusy),
                OperationMode::Manual => Ok(()),
                OperationMode::Idle => {
                    s.mode = OperationMode::Manual;
                    s.level = None;
                    s.set_position("Manual");
                    Ok(())
                }
            }
        })?;
        log::info!("[{}] manual mode on", self.logic());
        Ok(())
    }

    /// Leave manual jog mode. The controller loop stops the motors.
    pub fn disable_manual(&self) -> Result<()> {
        self.shared.update(|s| {
            if s.mode != OperationMode::Manual {
                return Err(CommandError::ManualInactive);
            }
            s.mode = OperationMode::Idle;
            s.drill_on = false;
            s.set_position("Idle");
            Ok(())
        })?;
        log::info!("[{}] manual mode off", self.logic());
        Ok(())
    }

    /// Set one parameter by dotted path. Returns the previous value.
    pub fn update_parameter(&mut self, path: &str, value: Value) -> Result<Value> {
        if self.is_running() {
            return Err(CommandError::LogicActive.into());
        }
        let mut config = self.shared.config.write().unwrap_or_else(PoisonError::into_inner);
        let (updated, old) = config.with_parameter(path, value)?;
        *config = updated;
        drop(config);

        self.hardware_stale = true;
        log::info!("[{}] parameter {} updated (was {})", self.logic(), path, old);
        self.shared.notify();
        Ok(old)
    }

    /// Apply several dotted-path updates at once. Nothing changes if any
    /// of them fails.
    pub fn update_parameters(&mut self, updates: &Map<String, Value>) -> Result<()> {
        if self.is_running() {
            return Err(CommandError::LogicActive.into());
        }
        let mut config = self.shared.config.write().unwrap_or_else(PoisonError::into_inner);
        *config = config.with_parameters(updates)?;
        drop(config);

        self.hardware_stale = true;
        log::info!("[{}] {} parameters updated", self.logic(), updates.len());
        self.shared.notify();
        Ok(())
    }

    /// Copy of the current configuration.
    pub fn config(&self) -> CycleConfig {
        self.shared.config_snapshot()
    }

    /// File the configuration was loaded from, if any.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Persist the current configuration to its file, keeping a backup.
    pub fn save(&self) -> Result<()> {
        let path = self.config_path.as_deref().ok_or_else(|| {
            ConfigError::IoError(format!("logic {} has no configuration file", self.logic()))
        })?;
        save_config(&*self.shared.config(), path)
    }

    /// Current status.
    pub fn status(&self) -> StatusSnapshot {
        self.shared.snapshot()
    }

    /// Program the Logic B date source. Clears a latched lockout when
    /// the new date passes the check.
    pub fn set_rtc_datetime(&self, datetime: NaiveDateTime) -> Result<()> {
        let rtc = self.shared.config().rtc_config;
        let result = match &mut *self.shared.gate() {
            DateGate::AlwaysAllow => Err(CommandError::NoDateGate.into()),
            DateGate::Rtc(gate) => gate.reprogram(datetime, rtc.as_ref()),
        };
        self.shared.notify();
        result
    }

    /// Replace the status observer.
    pub fn set_observer(&self, observer: Arc<dyn StatusObserver>) {
        *self
            .shared
            .observer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = observer;
    }

    /// Drive every output of this logic low. Works with the thread running.
    pub fn force_outputs_low(&self) {
        force_outputs_low(&self.port, &self.shared.config());
    }
}

impl Drop for CycleController {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
        }
    }
}

/// Builder for [`CycleController`].
pub struct CycleControllerBuilder {
    logic: LogicId,
    port: Option<PortHandle>,
    adc: Option<Arc<dyn AnalogInput>>,
    config: Option<CycleConfig>,
    config_path: Option<PathBuf>,
    gate: Option<DateGate>,
    observer: Option<Arc<dyn StatusObserver>>,
}

impl CycleControllerBuilder {
    /// Builder for `logic` with nothing set.
    pub fn new(logic: LogicId) -> Self {
        Self {
            logic,
            port: None,
            adc: None,
            config: None,
            config_path: None,
            gate: None,
            observer: None,
        }
    }

    /// GPIO port and clock (required).
    pub fn port(mut self, port: PortHandle) -> Self {
        self.port = Some(port);
        self
    }

    /// Joystick ADC. Defaults to a centered [`SimAnalog`].
    pub fn adc(mut self, adc: Arc<dyn AnalogInput>) -> Self {
        self.adc = Some(adc);
        self
    }

    /// In-memory configuration.
    pub fn config(mut self, config: CycleConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Configuration file. Loaded at build time unless a configuration
    /// was also given, and used by [`CycleController::save`].
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Start/run admission policy. Defaults to [`DateGate::AlwaysAllow`].
    pub fn date_gate(mut self, gate: DateGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Status observer. Defaults to [`NullObserver`].
    pub fn observer(mut self, observer: Arc<dyn StatusObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Validate the configuration, claim the pins and drive outputs low.
    pub fn build(self) -> Result<CycleController> {
        let port = self.port.ok_or(ConfigError::InvalidValue {
            field: "port",
            reason: "is required",
        })?;
        let config = match (self.config, &self.config_path) {
            (Some(config), _) => {
                validate_config(&config)?;
                config
            }
            (None, Some(path)) => load_config(path)?,
            (None, None) => {
                return Err(ConfigError::InvalidValue {
                    field: "config",
                    reason: "is required",
                }
                .into())
            }
        };
        let adc = self
            .adc
            .unwrap_or_else(|| Arc::new(SimAnalog::new(512)) as Arc<dyn AnalogInput>);

        let hardware = Hardware::build(&port, adc.clone(), &config)?;
        log::info!("[{}] controller ready ({})", self.logic, config.logic_name);

        let shared = Shared::new(
            self.logic,
            config,
            self.gate.unwrap_or(DateGate::AlwaysAllow),
            self.observer.unwrap_or_else(|| Arc::new(NullObserver)),
            port.clock.clone(),
        );
        Ok(CycleController {
            shared: Arc::new(shared),
            port,
            adc,
            config_path: self.config_path,
            hardware: Some(hardware),
            hardware_stale: false,
            thread: None,
        })
    }
}
