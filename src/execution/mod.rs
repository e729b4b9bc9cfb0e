//! Execution mediator.
//!
//! Owns both controllers and guarantees at most one of them is active.
//! Every command takes the mediator lock, so selection, start, stop and
//! configuration changes are serialized. A lock-free [`StateMirror`]
//! carries the selected/active ids into status snapshots without the
//! observer ever touching the lock.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDateTime;
use serde_json::{Map, Value};

use crate::config::CycleConfig;
use crate::controller::{CycleController, LogicId, StatusObserver, StatusSnapshot};
use crate::error::{CommandError, Result};

/// Selected and active logic.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionState {
    /// Last logic chosen with `select_logic`
    pub selected: Option<LogicId>,
    /// Logic whose controller thread is running
    pub active: Option<LogicId>,
}

/// Atomic copy of [`ExecutionState`] for observers.
#[derive(Debug, Default)]
pub struct StateMirror {
    selected: AtomicU8,
    active: AtomicU8,
}

fn encode(id: Option<LogicId>) -> u8 {
    match id {
        None => 0,
        Some(LogicId::A) => 1,
        Some(LogicId::B) => 2,
    }
}

fn decode(v: u8) -> Option<LogicId> {
    match v {
        1 => Some(LogicId::A),
        2 => Some(LogicId::B),
        _ => None,
    }
}

impl StateMirror {
    fn store(&self, state: ExecutionState) {
        self.selected.store(encode(state.selected), Ordering::SeqCst);
        self.active.store(encode(state.active), Ordering::SeqCst);
    }

    /// Last published state.
    pub fn load(&self) -> ExecutionState {
        ExecutionState {
            selected: decode(self.selected.load(Ordering::SeqCst)),
            active: decode(self.active.load(Ordering::SeqCst)),
        }
    }
}

/// Fills in the mediator fields of each snapshot before forwarding it.
pub struct MediatedObserver {
    mirror: Arc<StateMirror>,
    inner: Arc<dyn StatusObserver>,
}

impl MediatedObserver {
    /// Wrap `inner`.
    pub fn new(mirror: Arc<StateMirror>, inner: Arc<dyn StatusObserver>) -> Self {
        Self { mirror, inner }
    }
}

impl StatusObserver for MediatedObserver {
    fn on_status(&self, status: &StatusSnapshot) {
        let mut status = status.clone();
        decorate(&mut status, self.mirror.load());
        self.inner.on_status(&status);
    }
}

fn decorate(status: &mut StatusSnapshot, state: ExecutionState) {
    status.selected_logic = state.selected;
    // A controller that halted itself is not active, whatever was recorded.
    status.active_logic = match state.active {
        Some(id) if id == status.logic && !status.active => None,
        other => other,
    };
}

struct Inner {
    state: ExecutionState,
    logic_a: CycleController,
    logic_b: CycleController,
}

impl Inner {
    fn controller(&mut self, id: LogicId) -> &mut CycleController {
        match id {
            LogicId::A => &mut self.logic_a,
            LogicId::B => &mut self.logic_b,
        }
    }

    fn safe_reset(&self) {
        self.logic_a.force_outputs_low();
        self.logic_b.force_outputs_low();
    }

    /// Drop `active` when its controller has stopped on its own.
    fn reconcile(&mut self, mirror: &StateMirror) {
        if let Some(id) = self.state.active {
            if !self.controller(id).is_running() {
                log::info!("[{}] controller ended by itself", id);
                self.controller(id).stop();
                self.state.active = None;
                mirror.store(self.state);
            }
        }
    }

    fn emergency_stop(&mut self, mirror: &StateMirror) {
        self.logic_a.stop();
        self.logic_b.stop();
        self.safe_reset();
        self.state.active = None;
        mirror.store(self.state);
    }

    fn active(&mut self) -> Result<&mut CycleController> {
        match self.state.active {
            Some(id) => Ok(self.controller(id)),
            None if self.state.selected.is_none() => Err(CommandError::NoLogicSelected.into()),
            None => Err(CommandError::NoActiveLogic.into()),
        }
    }
}

/// Serializes operator commands across both logics.
pub struct ExecutionMediator {
    inner: Mutex<Inner>,
    mirror: Arc<StateMirror>,
}

impl ExecutionMediator {
    /// Take ownership of both controllers and route their status through
    /// `observer`.
    pub fn new(
        logic_a: CycleController,
        logic_b: CycleController,
        observer: Arc<dyn StatusObserver>,
    ) -> Result<Self> {
        for (controller, expected) in [(&logic_a, LogicId::A), (&logic_b, LogicId::B)] {
            if controller.logic() != expected {
                return Err(CommandError::InvalidLogic(controller.logic().to_string()).into());
            }
        }

        let mirror = Arc::new(StateMirror::default());
        for controller in [&logic_a, &logic_b] {
            controller.set_observer(Arc::new(MediatedObserver::new(
                mirror.clone(),
                observer.clone(),
            )));
        }

        Ok(Self {
            inner: Mutex::new(Inner {
                state: ExecutionState::default(),
                logic_a,
                logic_b,
            }),
            mirror,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.reconcile(&self.mirror);
        inner
    }

    /// Current selected/active state.
    pub fn state(&self) -> ExecutionState {
        self.lock().state
    }

    /// Stop the active logic, reset outputs and start `id`.
    ///
    /// Selecting the logic that is already active restarts it.
    pub fn select_logic(&self, id: LogicId) -> Result<()> {
        let mut inner = self.lock();
        if let Some(previous) = inner.state.active {
            log::info!("switching from logic {} to {}", previous, id);
            inner.controller(previous).stop();
        }
        inner.safe_reset();

        inner.state = ExecutionState {
            selected: Some(id),
            active: Some(id),
        };
        self.mirror.store(inner.state);

        if let Err(e) = inner.controller(id).start() {
            inner.state.active = None;
            self.mirror.store(inner.state);
            log::warn!("logic {} could not start: {}", id, e);
            return Err(e);
        }
        log::info!("logic {} selected and started", id);
        Ok(())
    }

    /// [`select_logic`](Self::select_logic) from operator text.
    pub fn select_logic_str(&self, id: &str) -> Result<()> {
        self.select_logic(id.parse()?)
    }

    /// Start the selected logic.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.lock();
        let id = inner.state.selected.ok_or(CommandError::NoLogicSelected)?;
        if inner.state.active.is_some() {
            return Err(CommandError::AlreadyRunning.into());
        }
        inner.safe_reset();

        inner.state.active = Some(id);
        self.mirror.store(inner.state);
        if let Err(e) = inner.controller(id).start() {
            inner.state.active = None;
            self.mirror.store(inner.state);
            return Err(e);
        }
        Ok(())
    }

    /// Stop the active logic.
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.lock();
        let id = inner.state.active.ok_or(CommandError::NoActiveLogic)?;
        inner.controller(id).stop();
        inner.safe_reset();
        inner.state.active = None;
        self.mirror.store(inner.state);
        log::info!("logic {} stopped", id);
        Ok(())
    }

    /// Stop both logics and drive every output low. Always succeeds.
    pub fn emergency_stop_all(&self) {
        log::warn!("emergency stop");
        self.lock().emergency_stop(&self.mirror);
    }

    /// Forward a mode selection to the active logic.
    pub fn select_mode(&self, mode: u8) -> Result<()> {
        self.lock().active()?.select_mode(mode)
    }

    /// Forward manual mode entry to the active logic.
    pub fn enable_manual_mode(&self) -> Result<()> {
        self.lock().active()?.enable_manual()
    }

    /// Forward manual mode exit to the active logic.
    pub fn disable_manual_mode(&self) -> Result<()> {
        self.lock().active()?.disable_manual()
    }

    /// Change one parameter of `logic`. Rejected while any logic is
    /// active. Returns the previous value.
    pub fn update_parameter(&self, logic: LogicId, path: &str, value: Value) -> Result<Value> {
        let mut inner = self.lock();
        if inner.state.active.is_some() {
            log::warn!("parameter {} of logic {} rejected: a logic is running", path, logic);
            return Err(CommandError::LogicActive.into());
        }
        inner.controller(logic).update_parameter(path, value)
    }

    /// Emergency stop, apply every update to `logic` atomically, then
    /// persist its configuration.
    pub fn bulk_update_and_save(&self, logic: LogicId, updates: &Map<String, Value>) -> Result<()> {
        let mut inner = self.lock();
        inner.emergency_stop(&self.mirror);
        let controller = inner.controller(logic);
        controller.update_parameters(updates)?;
        controller.save()
    }

    /// Persist the configuration of `logic`.
    pub fn save(&self, logic: LogicId) -> Result<()> {
        self.lock().controller(logic).save()
    }

    /// Current configuration of `logic`.
    pub fn get_configuration(&self, logic: LogicId) -> CycleConfig {
        self.lock().controller(logic).config()
    }

    /// Status of `logic`, including the mediator fields.
    pub fn status(&self, logic: LogicId) -> StatusSnapshot {
        let mut inner = self.lock();
        let state = inner.state;
        let mut status = inner.controller(logic).status();
        decorate(&mut status, state);
        status
    }

    /// Program Logic B's date source.
    pub fn set_rtc_datetime(&self, datetime: NaiveDateTime) -> Result<()> {
        self.lock().controller(LogicId::B).set_rtc_datetime(datetime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::blank_snapshot;

    #[test]
    fn test_mirror_round_trips_every_state() {
        let mirror = StateMirror::default();
        for selected in [None, Some(LogicId::A), Some(LogicId::B)] {
            for active in [None, Some(LogicId::A), Some(LogicId::B)] {
                let state = ExecutionState { selected, active };
                mirror.store(state);
                assert_eq!(mirror.load(), state);
            }
        }
    }

    #[test]
    fn test_decorate_hides_self_stopped_logic() {
        let state = ExecutionState {
            selected: Some(LogicId::B),
            active: Some(LogicId::B),
        };

        let mut alive = blank_snapshot(LogicId::B);
        alive.active = true;
        decorate(&mut alive, state);
        assert_eq!(alive.active_logic, Some(LogicId::B));

        let mut halted = blank_snapshot(LogicId::B);
        decorate(&mut halted, state);
        assert_eq!(halted.selected_logic, Some(LogicId::B));
        assert_eq!(halted.active_logic, None);

        let mut other = blank_snapshot(LogicId::A);
        decorate(&mut other, state);
        assert_eq!(other.active_logic, Some(LogicId::B));
    }
}
