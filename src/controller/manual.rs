//! Manual jog: joystick on the linear axis, toggle button on the drill.

use crate::config::CycleConfig;
use crate::error::Result;
use crate::input::Deflection;

use super::cycle::POLL_US;
use super::rig::{Operator, Rig, Stepper};
use super::shared::Shared;

/// One manual-mode iteration. Returns the time until the next step edge
/// is due, capped at one polling tick.
pub(crate) fn manual_tick(
    rig: &mut Rig,
    operator: &mut Operator,
    ctx: &Shared,
    config: &CycleConfig,
) -> Result<u32> {
    let Rig { linear, drill, guards } = rig;
    let params = &config.motor_parameters;
    let toward_home = params.sentido_giro_lineal;

    if operator.drill_toggle.poll() {
        let on = ctx.update(|s| {
            s.drill_on = !s.drill_on;
            s.drill_on
        });
        if on {
            drill.set_direction(params.sentido_giro_taladro)?;
            drill.set_speed(config.velocidades_taladro.default);
            drill.enable();
        } else {
            drill.stop()?;
        }
        log::info!("[{}] manual drill {}", ctx.logic, if on { "on" } else { "off" });
    }

    let speeds = config.velocidades_manual;
    let deflection = operator.joystick.deflection();
    match deflection {
        Deflection::Center => {
            if linear.is_enabled() {
                linear.stop()?;
            }
        }
        Deflection::Backward | Deflection::Forward => {
            let (dir, at_limit) = if deflection == Deflection::Backward {
                (toward_home, guards.home.is_active())
            } else {
                (!toward_home, guards.final_limit.is_active())
            };
            if at_limit {
                rebound(linear, ctx, config, !dir)?;
            } else {
                let speed = operator
                    .joystick
                    .speed_mapped(speeds.limite_inferior, speeds.limite_superior);
                jog(linear, dir, speed)?;
            }
        }
    }

    linear.update()?;
    drill.update()?;

    let now = linear.now();
    Ok([linear.next_due_in(now), drill.next_due_in(now)]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(POLL_US)
        .min(POLL_US))
}

fn jog(linear: &mut Stepper, dir: bool, speed: u32) -> Result<()> {
    if !linear.is_enabled() || linear.motor().direction() != dir {
        linear.set_direction(dir)?;
    }
    linear.set_speed(speed);
    if !linear.is_enabled() {
        linear.enable();
    }
    Ok(())
}

/// Back off a limit switch by `rebote.pasos`.
fn rebound(linear: &mut Stepper, ctx: &Shared, config: &CycleConfig, away: bool) -> Result<()> {
    linear.disable();
    let motor = linear.motor_mut();
    motor.step_pulse(false)?;
    let done = motor.step_blocking(
        config.rebote.pasos,
        config.rebote.velocidad,
        Some(away),
        || ctx.cancelled(),
    )?;
    log::debug!("[{}] limit reached, rebounded {} steps", ctx.logic, done);
    Ok(())
}
