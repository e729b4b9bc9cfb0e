//! Automatic cycle: initial delay, Cycle 1, intermediate move, Cycle 2.
//!
//! The linear axis and the drill each run on their own
//! [`NonBlockingStepper`](crate::motor::NonBlockingStepper) deadline; the
//! loop sleeps until the earlier one is due, never longer than one
//! polling tick.

use crate::config::{CycleConfig, LevelParams};
use crate::error::Result;

use super::guards::Guard;
use super::homing::{find_home, HomeOutcome};
use super::rig::{Guards, Rig, Stepper};
use super::shared::Shared;
use super::state::CyclePhase;

/// Longest sleep between two guard checks.
pub(crate) const POLL_US: u32 = 1000;

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CycleEnd {
    /// All phases done, waiting for reset
    Completed,
    /// Cancelled by reset, stop or lockout
    Aborted,
}

/// Counters from Cycle 1.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cycle1Report {
    /// Drill half-pulses emitted
    pub drill_toggles: u32,
    /// Drill half-pulse count when the revolution target was met
    pub toggles_at_target: Option<u32>,
    /// Linear reversals
    pub direction_changes: u32,
}

/// Counters from Cycle 2.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cycle2Report {
    /// Drill bursts fired
    pub bursts: u32,
    /// Linear reversals
    pub direction_changes: u32,
}

/// Run every phase from a fresh homing to COMPLETE.
pub(crate) fn run_cycle(
    rig: &mut Rig,
    ctx: &Shared,
    config: &CycleConfig,
    level: LevelParams,
) -> Result<CycleEnd> {
    log::info!("[{}] automatic cycle, mode {}", ctx.logic, level.mode);
    ctx.update(|s| {
        s.cycle_count = 0;
        s.cycle2_passes = 0;
    });

    if find_home(rig, ctx, config, &mut || ctx.cancelled())? == HomeOutcome::Aborted {
        return aborted(rig, ctx);
    }

    let pause = config.tiempos.pausa_entre_fases_ms;
    if !initial_delay(rig, ctx, config)? || !ctx.wait_ms(pause) {
        return aborted(rig, ctx);
    }
    if cycle_1(rig, ctx, config, level)?.is_none() || !ctx.wait_ms(pause) {
        return aborted(rig, ctx);
    }
    if !intermediate(rig, ctx, config, level)? || !ctx.wait_ms(pause) {
        return aborted(rig, ctx);
    }
    if cycle_2(rig, ctx, config, level)?.is_none() {
        return aborted(rig, ctx);
    }

    rig.stop_motors()?;
    ctx.set_phase(Some(CyclePhase::Complete), "Complete - Press Reset");
    log::info!("[{}] cycle complete", ctx.logic);
    Ok(CycleEnd::Completed)
}

fn aborted(rig: &mut Rig, ctx: &Shared) -> Result<CycleEnd> {
    rig.stop_motors()?;
    log::warn!("[{}] cycle aborted", ctx.logic);
    Ok(CycleEnd::Aborted)
}

fn check(guards: &mut Guards, ctx: &Shared, config: &CycleConfig) -> Guard {
    let settle = config.tiempos.tiempo_para_empezar_despues_stop_ms;
    guards.check(ctx, settle, &mut || ctx.cancelled())
}

/// Re-arm a stepper after a pause so its next edge is a rising one.
///
/// Returns `true` when the pause caught STEP high: the halt then wrote
/// the falling edge of a pulse already started, and the caller counts it.
fn resume(stepper: &mut Stepper) -> Result<bool> {
    if !stepper.is_enabled() {
        return Ok(false);
    }
    let cut = stepper.motor().is_pulse_high();
    stepper.motor_mut().step_pulse(false)?;
    stepper.enable();
    Ok(cut)
}

/// `true` when the linear axis completed a step: on a falling edge, or
/// when a pause wrote that edge for it.
fn linear_step(linear: &mut Stepper, cut: bool) -> Result<bool> {
    Ok(cut || (linear.update()? && !linear.motor().is_pulse_high()))
}

/// `true` for every drill half-pulse, including one a pause finished.
fn drill_toggled(drill: &mut Stepper, cut: bool) -> Result<bool> {
    Ok(cut || drill.update()?)
}

fn sleep_until_due(guards: &Guards, linear: &Stepper, drill: &Stepper) {
    let now = linear.now();
    let due = [linear.next_due_in(now), drill.next_due_in(now)]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(POLL_US)
        .min(POLL_US);
    if due > 0 {
        guards.clock.sleep_us(u64::from(due));
    }
}

/// Spin the drill for `tiempo_antes_de_girar_ms`, not counting pauses.
pub(crate) fn initial_delay(rig: &mut Rig, ctx: &Shared, config: &CycleConfig) -> Result<bool> {
    ctx.set_phase(Some(CyclePhase::InitialDelay), "Initial Delay");
    let Rig { linear, drill, guards } = rig;

    let duration_us = config.tiempos.tiempo_antes_de_girar_ms * 1000;
    linear.disable();
    drill.set_direction(config.motor_parameters.sentido_giro_taladro)?;
    drill.set_speed(config.velocidades_taladro.default);
    drill.enable();

    let mut elapsed = 0u64;
    let mut last = guards.clock.ticks_us();
    while elapsed < duration_us {
        match check(guards, ctx, config) {
            Guard::Abort => {
                drill.stop()?;
                return Ok(false);
            }
            Guard::Resumed => {
                // Half-pulses are not counted here; only the time matters.
                resume(drill)?;
                last = guards.clock.ticks_us();
            }
            Guard::Clear => {}
        }
        drill.update()?;

        let now = guards.clock.ticks_us();
        elapsed += now.saturating_sub(last);
        last = now;
        if elapsed < duration_us {
            let left = (duration_us - elapsed).min(u64::from(POLL_US)) as u32;
            let due = drill.next_due_in(drill.now()).unwrap_or(left).min(left);
            if due > 0 {
                guards.clock.sleep_us(u64::from(due));
            }
        }
    }

    drill.stop()?;
    Ok(true)
}

/// Back and forth over `pasos_ciclo1` while the drill spins, until the
/// revolution target is met and the axis is back on the forward leg.
pub(crate) fn cycle_1(
    rig: &mut Rig,
    ctx: &Shared,
    config: &CycleConfig,
    level: LevelParams,
) -> Result<Option<Cycle1Report>> {
    ctx.set_phase(Some(CyclePhase::Cycle1), "Cycle 1");
    ctx.update(|s| s.cycle_count = 0);
    let Rig { linear, drill, guards } = rig;

    let ppv = config.pasos_por_vuelta_taladro;
    let target = level.vueltas_ciclo1.saturating_mul(ppv);
    let forward = !config.motor_parameters.sentido_ciclos;

    let mut report = Cycle1Report::default();
    linear.set_direction(forward)?;
    linear.set_speed(level.velocidad_lineal);
    linear.enable();
    drill.set_direction(config.motor_parameters.sentido_giro_taladro)?;
    drill.set_speed(level.velocidad_taladro);
    if target == 0 {
        report.toggles_at_target = Some(0);
    } else {
        drill.enable();
    }

    let mut dir = forward;
    let mut pass_steps = 0u32;
    loop {
        let (mut linear_cut, mut drill_cut) = (false, false);
        match check(guards, ctx, config) {
            Guard::Abort => {
                linear.stop()?;
                drill.stop()?;
                return Ok(None);
            }
            Guard::Resumed => {
                linear_cut = resume(linear)?;
                drill_cut = resume(drill)?;
            }
            Guard::Clear => {}
        }

        if drill_toggled(drill, drill_cut)? {
            report.drill_toggles += 1;
            let toggles = report.drill_toggles;
            if toggles % ppv == 0 {
                ctx.update(|s| s.cycle_count = toggles / ppv);
            }
            if toggles >= target {
                report.toggles_at_target = Some(toggles);
                drill.stop()?;
                log::info!(
                    "[{}] cycle 1 target of {} revolutions reached, finishing pass",
                    ctx.logic,
                    level.vueltas_ciclo1
                );
            }
        }

        if linear_step(linear, linear_cut)? {
            pass_steps += 1;
            if pass_steps >= level.pasos_ciclo1 {
                pass_steps = 0;
                dir = !dir;
                linear.set_direction(dir)?;
                report.direction_changes += 1;
                if report.toggles_at_target.is_some() && dir == forward {
                    break;
                }
            }
        }

        sleep_until_due(guards, linear, drill);
    }

    linear.stop()?;
    drill.stop()?;
    ctx.update(|s| s.cycle_count = level.vueltas_ciclo1);
    log::info!(
        "[{}] cycle 1 done: {} drill half-pulses, {} reversals",
        ctx.logic,
        report.drill_toggles,
        report.direction_changes
    );
    Ok(Some(report))
}

/// Single move of `pasos_intermedio` toward the far end.
pub(crate) fn intermediate(
    rig: &mut Rig,
    ctx: &Shared,
    config: &CycleConfig,
    level: LevelParams,
) -> Result<bool> {
    ctx.set_phase(Some(CyclePhase::Intermediate), "Intermediate");
    let Rig { linear, guards, .. } = rig;

    linear.disable();
    let forward = !config.motor_parameters.sentido_ciclos;
    let steps = level.pasos_intermedio;
    let done = linear.motor_mut().step_blocking(
        steps,
        level.velocidad_lineal,
        Some(forward),
        || check(guards, ctx, config) == Guard::Abort,
    )?;
    Ok(done == steps)
}

/// Back and forth over `pasos_ciclo2`, firing one drill burst at the end
/// of every full back-and-forth pass until `vueltas_ciclo2` bursts.
pub(crate) fn cycle_2(
    rig: &mut Rig,
    ctx: &Shared,
    config: &CycleConfig,
    level: LevelParams,
) -> Result<Option<Cycle2Report>> {
    ctx.set_phase(Some(CyclePhase::Cycle2), "Cycle 2");
    ctx.update(|s| s.cycle2_passes = 0);
    let Rig { linear, drill, guards } = rig;

    let forward = !config.motor_parameters.sentido_ciclos;
    let burst_steps = config.pasos_taladro_ciclo2;
    let burst_speed = config.velocidad_pasos_taladro_ciclo2;
    let target = level.vueltas_ciclo2;

    let mut report = Cycle2Report::default();
    drill.disable();
    linear.set_direction(forward)?;
    linear.set_speed(level.velocidad_lineal);
    linear.enable();

    let mut dir = forward;
    let mut pass_steps = 0u32;
    loop {
        let linear_cut = match check(guards, ctx, config) {
            Guard::Abort => {
                linear.stop()?;
                return Ok(None);
            }
            Guard::Resumed => resume(linear)?,
            Guard::Clear => false,
        };

        if linear_step(linear, linear_cut)? {
            pass_steps += 1;
            if pass_steps >= level.pasos_ciclo2 {
                pass_steps = 0;
                dir = !dir;
                linear.set_direction(dir)?;
                report.direction_changes += 1;

                if dir == forward {
                    if report.bursts < target {
                        linear.disable();
                        let done = drill.motor_mut().step_blocking(
                            burst_steps,
                            burst_speed,
                            Some(config.motor_parameters.sentido_giro_taladro),
                            || check(guards, ctx, config) == Guard::Abort,
                        )?;
                        if done < burst_steps {
                            linear.stop()?;
                            drill.stop()?;
                            return Ok(None);
                        }
                        report.bursts += 1;
                        let bursts = report.bursts;
                        ctx.update(|s| s.cycle2_passes = bursts);
                        log::debug!("[{}] cycle 2 burst {}/{}", ctx.logic, bursts, target);
                        linear.enable();
                    }
                    if report.bursts >= target {
                        break;
                    }
                }
            }
        }

        sleep_until_due(guards, linear, drill);
    }

    linear.stop()?;
    drill.stop()?;
    log::info!("[{}] cycle 2 done: {} bursts", ctx.logic, report.bursts);
    Ok(Some(report))
}
