//! State shared between a controller's handle and its threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};

use crate::config::CycleConfig;
use crate::port::Clock;

use super::gate::{target_date_string, DateGate};
use super::state::{ControllerState, CyclePhase, LogicId, OperationMode, PauseKind};
use super::status::{StatusObserver, StatusSnapshot};

/// Polling period of the pause and wait loops.
pub(crate) const WAIT_POLL_MS: u64 = 10;

pub(crate) struct Shared {
    pub logic: LogicId,
    /// Controller lifetime. Cleared by `stop()` and on self-termination.
    pub running: AtomicBool,
    /// Current cycle only. Set by reset and lockout.
    pub abort: AtomicBool,
    pub state: Mutex<ControllerState>,
    pub config: RwLock<CycleConfig>,
    pub gate: Mutex<DateGate>,
    pub observer: RwLock<Arc<dyn StatusObserver>>,
    pub clock: Arc<dyn Clock>,
}

impl Shared {
    pub fn new(
        logic: LogicId,
        config: CycleConfig,
        gate: DateGate,
        observer: Arc<dyn StatusObserver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            logic,
            running: AtomicBool::new(false),
            abort: AtomicBool::new(false),
            state: Mutex::new(ControllerState::default()),
            config: RwLock::new(config),
            gate: Mutex::new(gate),
            observer: RwLock::new(observer),
            clock,
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// `true` once the controller is stopping or the cycle is aborted.
    #[inline]
    pub fn cancelled(&self) -> bool {
        !self.is_running() || self.abort.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn gate(&self) -> MutexGuard<'_, DateGate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> RwLockReadGuard<'_, CycleConfig> {
        self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config_snapshot(&self) -> CycleConfig {
        self.config().clone()
    }

    /// Apply `f` to the state, then publish a snapshot.
    pub fn update<R>(&self, f: impl FnOnce(&mut ControllerState) -> R) -> R {
        let r = f(&mut self.state());
        self.notify();
        r
    }

    pub fn set_phase(&self, phase: Option<CyclePhase>, position: &str) {
        if let Some(p) = phase {
            log::info!("[{}] phase {:?}", self.logic, p);
        }
        self.update(|s| {
            s.phase = phase;
            s.set_position(position);
        });
    }

    pub fn set_position(&self, position: &str) {
        self.update(|s| s.set_position(position));
    }

    pub fn set_paused(&self, paused: Option<PauseKind>) {
        self.update(|s| s.paused = paused);
    }

    /// Return to IDLE with no level, phase or pause.
    pub fn reset_state(&self, position: &str) {
        self.update(|s| {
            s.mode = OperationMode::Idle;
            s.phase = None;
            s.level = None;
            s.paused = None;
            s.drill_on = false;
            s.set_position(position);
        });
    }

    /// Sleep up to `ms`, returning `false` early when cancelled.
    pub fn wait_ms(&self, ms: u64) -> bool {
        let deadline = self.clock.ticks_us().saturating_add(ms * 1000);
        loop {
            if self.cancelled() {
                return false;
            }
            let now = self.clock.ticks_us();
            if now >= deadline {
                return true;
            }
            self.clock
                .sleep_us((deadline - now).min(WAIT_POLL_MS * 1000));
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let state = self.state().clone();
        let (lockout, rtc_datetime) = {
            let gate = self.gate();
            (gate.is_locked(), gate.datetime_string())
        };
        let target_date = if rtc_datetime.is_some() {
            target_date_string(self.config().rtc_config.as_ref())
        } else {
            None
        };

        StatusSnapshot {
            logic: self.logic,
            selected_logic: None,
            active_logic: None,
            mode: state.mode,
            phase: state.phase,
            position: state.position.as_str().to_string(),
            cycle_count: state.cycle_count,
            cycle2_passes: state.cycle2_passes,
            selected_mode: state.selected_mode().map(|m| m.get()),
            manual_mode: state.mode == OperationMode::Manual,
            running: state.mode == OperationMode::Running,
            waiting: state.mode == OperationMode::Waiting,
            drill_on: state.drill_on,
            paused: state.paused,
            homing: state.homing,
            active: self.is_running(),
            lockout,
            rtc_datetime,
            target_date,
        }
    }

    /// Publish a snapshot. No lock is held while the observer runs.
    pub fn notify(&self) {
        let snapshot = self.snapshot();
        let observer = self
            .observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        observer.on_status(&snapshot);
    }
}
