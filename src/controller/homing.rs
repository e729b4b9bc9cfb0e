//! Homing of the linear axis.

use crate::config::CycleConfig;
use crate::error::Result;

use super::guards::{Cancel, Guard};
use super::rig::Rig;
use super::shared::Shared;

/// How homing ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HomeOutcome {
    /// At the post-home offset
    Homed,
    /// Home switch was already closed; nothing moved
    AlreadyHome,
    /// Cancelled part way
    Aborted,
}

/// Drive toward the home switch, then back off the post-home offset.
///
/// Safety interruptions resume on their own; a stop press needs start.
pub(crate) fn find_home(
    rig: &mut Rig,
    ctx: &Shared,
    config: &CycleConfig,
    cancel: Cancel<'_>,
) -> Result<HomeOutcome> {
    rig.guards.home.resync();
    if rig.guards.home.is_active() {
        log::info!("[{}] already at home", ctx.logic);
        ctx.set_position("Home");
        return Ok(HomeOutcome::AlreadyHome);
    }

    log::info!("[{}] homing", ctx.logic);
    ctx.set_position("Homing");

    let toward_home = config.motor_parameters.sentido_giro_lineal;
    let speed = config.velocidades_lineal.home;
    let settle = config.tiempos.tiempo_para_empezar_despues_stop_ms;
    let Rig { linear, guards, .. } = rig;

    linear.disable();
    let motor = linear.motor_mut();
    motor.set_direction(toward_home)?;
    loop {
        if guards.check_homing(ctx, settle, &mut *cancel) == Guard::Abort {
            motor.stop()?;
            return Ok(HomeOutcome::Aborted);
        }
        if guards.home.poll() {
            break;
        }
        motor.step_pulse(true)?;
        motor.delay_us(speed);
        motor.step_pulse(false)?;
        motor.delay_us(speed);
    }
    log::debug!("[{}] home switch reached", ctx.logic);

    let offset = config.pasos_home.pasos_despues_home;
    let done = motor.step_blocking(offset, speed, Some(!toward_home), || {
        guards.check_homing(ctx, settle, &mut *cancel) == Guard::Abort
    })?;
    if done < offset {
        motor.stop()?;
        return Ok(HomeOutcome::Aborted);
    }

    ctx.set_position("Home");
    log::info!("[{}] homed, {} steps off the switch", ctx.logic, offset);
    Ok(HomeOutcome::Homed)
}
