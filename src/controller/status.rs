//! Status snapshots for the presentation layer.
//!
//! Controllers publish a [`StatusSnapshot`] on every meaningful state
//! change. Observers run on the controller's threads and must not call
//! back into the controller or the mediator.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::Serialize;

use super::state::{CyclePhase, LogicId, OperationMode, PauseKind};

/// Point-in-time view of one controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    /// Logic this snapshot describes
    pub logic: LogicId,
    /// Logic selected in the mediator
    pub selected_logic: Option<LogicId>,
    /// Logic currently running in the mediator
    pub active_logic: Option<LogicId>,
    /// Controller mode
    pub mode: OperationMode,
    /// Cycle phase
    pub phase: Option<CyclePhase>,
    /// Position description
    pub position: String,
    /// Cycle 1 revolutions
    pub cycle_count: u32,
    /// Cycle 2 bursts
    pub cycle2_passes: u32,
    /// Selected level (1-5)
    pub selected_mode: Option<u8>,
    /// Manual mode active
    pub manual_mode: bool,
    /// Automatic cycle running
    pub running: bool,
    /// Waiting for the start button
    pub waiting: bool,
    /// Manual drill spinning
    pub drill_on: bool,
    /// Current pause
    pub paused: Option<PauseKind>,
    /// Startup or reset homing in progress
    pub homing: bool,
    /// Controller thread alive
    pub active: bool,
    /// Date lockout latched
    pub lockout: bool,
    /// Date source reading, `YYYY/MM/DD HH:MM:SS`
    pub rtc_datetime: Option<String>,
    /// Lockout date, `YYYY/MM/DD`
    pub target_date: Option<String>,
}

impl StatusSnapshot {
    /// One-line summary for consoles and logs.
    pub fn summary(&self) -> String {
        let phase = self
            .phase
            .map(|p| format!("{:?}", p))
            .unwrap_or_else(|| "-".into());
        let pause = match self.paused {
            Some(PauseKind::Stop) => " PAUSED",
            Some(PauseKind::Safety) => " SAFETY PAUSE",
            None => "",
        };
        format!(
            "[{}] {:?} phase={} pos='{}' count={} c2={} mode={}{}{}",
            self.logic,
            self.mode,
            phase,
            self.position,
            self.cycle_count,
            self.cycle2_passes,
            self.selected_mode.map_or_else(|| "-".into(), |m| m.to_string()),
            pause,
            if self.lockout { " LOCKOUT" } else { "" },
        )
    }
}

/// Receives status snapshots.
pub trait StatusObserver: Send + Sync {
    /// Called on every state change. Must return quickly.
    fn on_status(&self, status: &StatusSnapshot);
}

/// Drops every snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl StatusObserver for NullObserver {
    fn on_status(&self, _status: &StatusSnapshot) {}
}

/// Forwards snapshots into a bounded channel. When the consumer falls
/// behind, new snapshots are dropped rather than blocking the controller.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: Sender<StatusSnapshot>,
}

impl ChannelObserver {
    /// Create an observer and the receiving end of its channel.
    pub fn bounded(capacity: usize) -> (Self, Receiver<StatusSnapshot>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl StatusObserver for ChannelObserver {
    fn on_status(&self, status: &StatusSnapshot) {
        match self.tx.try_send(status.clone()) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => {
                log::debug!("status channel full, dropping snapshot for logic {}", status.logic);
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn blank_snapshot(logic: LogicId) -> StatusSnapshot {
    StatusSnapshot {
        logic,
        selected_logic: None,
        active_logic: None,
        mode: OperationMode::Idle,
        phase: None,
        position: String::new(),
        cycle_count: 0,
        cycle2_passes: 0,
        selected_mode: None,
        manual_mode: false,
        running: false,
        waiting: false,
        drill_on: false,
        paused: None,
        homing: false,
        active: false,
        lockout: false,
        rtc_datetime: None,
        target_date: None,
    }
}
