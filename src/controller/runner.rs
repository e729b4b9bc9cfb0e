//! Controller main loop.
//!
//! Runs on the controller thread from `start()` until `stop()`, a reset,
//! or a date lockout. Each iteration checks the date gate, reaps a
//! finished cycle thread, handles the reset button and then serves the
//! current mode. The [`Rig`] is lent to a cycle thread while a cycle
//! runs and handed back when it ends.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::{CycleConfig, LevelParams};
use crate::error::Result;
use crate::input::AnalogInput;
use crate::port::PortHandle;

use super::cycle::{run_cycle, CycleEnd, POLL_US};
use super::homing::find_home;
use super::manual::manual_tick;
use super::rig::{force_outputs_low, Hardware, Operator, Rig};
use super::shared::Shared;
use super::state::{CyclePhase, OperationMode};

type CycleHandle = JoinHandle<(Rig, Result<CycleEnd>)>;

pub(crate) struct Runner {
    ctx: Arc<Shared>,
    port: PortHandle,
    adc: Arc<dyn AnalogInput>,
    config: CycleConfig,
    rig: Option<Rig>,
    operator: Operator,
    cycle: Option<CycleHandle>,
}

impl Runner {
    pub fn new(
        ctx: Arc<Shared>,
        port: PortHandle,
        adc: Arc<dyn AnalogInput>,
        hardware: Hardware,
    ) -> Self {
        let config = ctx.config_snapshot();
        let Hardware { rig, operator } = hardware;
        Self {
            ctx,
            port,
            adc,
            config,
            rig: Some(rig),
            operator,
            cycle: None,
        }
    }

    /// Loop until the controller stops. Gives the hardware back when it
    /// is still intact.
    pub fn run(mut self) -> Option<Hardware> {
        log::info!("[{}] controller loop started", self.ctx.logic);
        if self.home("Home") {
            if let Err(e) = self.on_reset() {
                log::error!("[{}] reset failed: {}", self.ctx.logic, e);
                self.fault();
            }
        }

        while self.ctx.is_running() {
            if let Err(e) = self.tick() {
                log::error!("[{}] controller fault: {}", self.ctx.logic, e);
                self.fault();
            }
        }

        self.shutdown()
    }

    fn tick(&mut self) -> Result<()> {
        if self.lockout_due() {
            return Ok(());
        }
        self.reap_cycle();

        if self.operator.reset.poll() {
            return self.on_reset();
        }

        let mode = self.ctx.state().mode;
        let mut sleep_us = POLL_US;
        match mode {
            OperationMode::Waiting => self.waiting_tick()?,
            OperationMode::Manual => {
                if let Some(rig) = self.rig.as_mut() {
                    sleep_us = manual_tick(rig, &mut self.operator, &self.ctx, &self.config)?;
                }
            }
            OperationMode::Idle | OperationMode::Running => self.leave_manual()?,
        }

        if sleep_us > 0 {
            self.ctx.clock.sleep_us(u64::from(sleep_us));
        }
        Ok(())
    }

    /// Periodic date check. On lockout the controller halts and ends.
    fn lockout_due(&mut self) -> bool {
        let now = self.ctx.clock.ticks_us();
        let verdict = self
            .ctx
            .gate()
            .periodic(self.config.rtc_config.as_ref(), now);
        let Err(e) = verdict else {
            return false;
        };

        log::error!("[{}] halting: {}", self.ctx.logic, e);
        self.ctx.abort.store(true, Ordering::SeqCst);
        self.join_cycle();
        self.halt();
        self.ctx.running.store(false, Ordering::SeqCst);
        self.ctx.reset_state("Locked out");
        true
    }

    fn waiting_tick(&mut self) -> Result<()> {
        let Some(rig) = self.rig.as_mut() else {
            return Ok(());
        };
        if !rig.guards.start.poll() {
            return Ok(());
        }

        if !rig.guards.safety.is_active() {
            log::warn!("[{}] start pressed with the safety switch open", self.ctx.logic);
            let settle = self.config.tiempos.tiempo_para_empezar_despues_stop_ms;
            let ctx = &self.ctx;
            let reset = &mut self.operator.reset;
            let mut reset_seen = false;
            rig.guards.safety_pause(ctx, settle, &mut || {
                reset_seen = reset_seen || reset.poll();
                reset_seen || ctx.cancelled()
            });
            if reset_seen {
                return self.on_reset();
            }
            self.ctx.set_position("Waiting for start");
            return Ok(());
        }

        let level = self.ctx.state().level;
        match level {
            Some(level) => self.launch_cycle(level),
            None => log::warn!("[{}] start pressed with no mode selected", self.ctx.logic),
        }
        Ok(())
    }

    fn launch_cycle(&mut self, level: LevelParams) {
        let Some(mut rig) = self.rig.take() else {
            return;
        };
        self.ctx.update(|s| {
            s.mode = OperationMode::Running;
            s.phase = None;
            s.set_position("Starting");
        });

        let ctx = self.ctx.clone();
        let config = self.config.clone();
        let spawned = thread::Builder::new()
            .name(format!("logic-{}-cycle", self.ctx.logic))
            .spawn(move || {
                let result = run_cycle(&mut rig, &ctx, &config, level);
                if result.is_err() {
                    let _ = rig.stop_motors();
                }
                (rig, result)
            });

        match spawned {
            Ok(handle) => self.cycle = Some(handle),
            Err(e) => {
                log::error!("[{}] cannot spawn cycle thread: {}", self.ctx.logic, e);
                self.rebuild_rig();
                self.ctx.reset_state("Fault");
            }
        }
    }

    fn reap_cycle(&mut self) {
        if self.cycle.as_ref().map_or(false, |h| h.is_finished()) {
            self.join_cycle();
        }
    }

    /// Wait for the cycle thread and take the rig back.
    fn join_cycle(&mut self) {
        let Some(handle) = self.cycle.take() else {
            return;
        };
        match handle.join() {
            Ok((rig, result)) => {
                self.rig = Some(rig);
                if let Err(e) = result {
                    log::error!("[{}] cycle failed: {}", self.ctx.logic, e);
                    self.fault();
                }
            }
            Err(_) => {
                log::error!("[{}] cycle thread panicked", self.ctx.logic);
                force_outputs_low(&self.port, &self.config);
                self.rebuild_rig();
                self.ctx.reset_state("Fault");
            }
        }
    }

    fn rebuild_rig(&mut self) {
        match Hardware::build(&self.port, self.adc.clone(), &self.config) {
            Ok(hw) => self.rig = Some(hw.rig),
            Err(e) => {
                log::error!("[{}] cannot rebuild hardware: {}", self.ctx.logic, e);
                self.ctx.running.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Reset button. In COMPLETE it needs the safety switch closed.
    fn on_reset(&mut self) -> Result<()> {
        if self.ctx.state().phase == Some(CyclePhase::Complete) {
            self.join_cycle();
            let safe = self
                .rig
                .as_mut()
                .map_or(false, |rig| rig.guards.safety.is_active());
            if !safe {
                log::warn!("[{}] reset ignored, safety switch open", self.ctx.logic);
                return Ok(());
            }
        }

        log::info!("[{}] reset", self.ctx.logic);
        self.ctx.abort.store(true, Ordering::SeqCst);
        self.join_cycle();
        self.ctx.abort.store(false, Ordering::SeqCst);
        if let Some(rig) = self.rig.as_mut() {
            rig.stop_motors()?;
        }
        self.ctx.reset_state("Resetting");
        while self.home("Home") {
            log::info!("[{}] reset pressed while homing, homing again", self.ctx.logic);
        }
        self.ctx.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Home the linear axis, refusing mode selection meanwhile.
    ///
    /// Returns `true` when a reset press cut homing short.
    fn home(&mut self, done: &str) -> bool {
        let Some(rig) = self.rig.as_mut() else {
            return false;
        };
        self.ctx.update(|s| s.homing = true);
        let ctx = &self.ctx;
        let reset = &mut self.operator.reset;
        let mut reset_seen = false;
        let homed = find_home(rig, ctx, &self.config, &mut || {
            reset_seen = reset_seen || reset.poll();
            reset_seen || ctx.cancelled()
        });
        if let Err(e) = homed {
            log::error!("[{}] homing failed: {}", ctx.logic, e);
        }
        let _ = rig.stop_motors();
        self.ctx.update(|s| {
            s.homing = false;
            if s.mode == OperationMode::Idle && !reset_seen {
                s.set_position(done);
            }
        });
        reset_seen
    }

    /// Stop anything manual mode left running.
    fn leave_manual(&mut self) -> Result<()> {
        if let Some(rig) = self.rig.as_mut() {
            if rig.linear.is_enabled() || rig.drill.is_enabled() {
                rig.stop_motors()?;
                self.ctx.update(|s| s.drill_on = false);
            }
        }
        Ok(())
    }

    fn halt(&mut self) {
        match self.rig.as_mut() {
            Some(rig) => {
                if let Err(e) = rig.stop_motors() {
                    log::error!("[{}] cannot stop motors: {}", self.ctx.logic, e);
                    force_outputs_low(&self.port, &self.config);
                }
            }
            None => force_outputs_low(&self.port, &self.config),
        }
    }

    fn fault(&mut self) {
        self.halt();
        self.ctx.reset_state("Fault");
    }

    fn shutdown(mut self) -> Option<Hardware> {
        self.ctx.abort.store(true, Ordering::SeqCst);
        self.join_cycle();
        self.ctx.abort.store(false, Ordering::SeqCst);
        self.halt();
        self.ctx.update(|s| {
            s.mode = OperationMode::Idle;
            s.phase = None;
            s.paused = None;
            s.drill_on = false;
            s.homing = false;
        });
        log::info!("[{}] controller loop ended", self.ctx.logic);

        let operator = self.operator;
        self.rig.map(|rig| Hardware { rig, operator })
    }
}
