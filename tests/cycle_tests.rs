//! Threaded controller and mediator scenarios on a real-clock simulator.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{datetime, fast_config, wait_until, Bench};
use drill_rig::controller::{
    ChannelObserver, CycleController, CyclePhase, DateSource, LogicId, ManualDateSource,
    OperationMode, PauseKind,
};
use drill_rig::error::{CommandError, Error, LockoutError};
use drill_rig::port::{PortHandle, SimPort};
use drill_rig::ExecutionMediator;
use serde_json::Value;

fn default_bench() -> Bench {
    Bench::new(fast_config("Logic A"), fast_config("Logic B"))
}

/// Select logic A, wait for homing, select `mode` and press start.
fn run_mode(bench: &Bench, mode: u8) {
    bench.mediator.select_logic(LogicId::A).unwrap();
    bench.wait_ready(LogicId::A);
    bench.mediator.select_mode(mode).unwrap();
    assert!(bench.status(LogicId::A).waiting);
    bench.click_start();
}

// =============================================================================
// Automatic cycle
// =============================================================================

#[test]
fn test_mode_2_runs_to_complete() {
    let mut config = fast_config("Logic A");
    config.pasos_primer_nivel.nivel2 = 500;
    config.vueltas_primer_nivel.nivel2 = 2;
    config.vueltas_segundo_nivel.nivel2 = 2;
    let bench = Bench::new(config, fast_config("Logic B"));

    run_mode(&bench, 2);
    assert!(
        wait_until(|| bench.status(LogicId::A).phase == Some(CyclePhase::Complete)),
        "cycle never completed: {}",
        bench.status(LogicId::A).summary()
    );

    let status = bench.status(LogicId::A);
    assert_eq!(status.cycle_count, 2);
    assert_eq!(status.cycle2_passes, 2);
    assert_eq!(status.position, "Complete - Press Reset");
    assert_eq!(status.selected_mode, Some(2));
    assert_eq!(status.active_logic, Some(LogicId::A));
    assert!(bench.step_pins_low());

    // Reset in COMPLETE re-homes and ends the session.
    bench.click_reset();
    assert!(wait_until(|| bench.mediator.state().active.is_none()));
    let status = bench.status(LogicId::A);
    assert_eq!(status.mode, OperationMode::Idle);
    assert_eq!(status.phase, None);
}

#[test]
fn test_reset_during_cycle_2_returns_to_idle() {
    let mut config = fast_config("Logic A");
    config.vueltas_segundo_nivel.nivel1 = 10_000;
    let bench = Bench::new(config, fast_config("Logic B"));

    run_mode(&bench, 1);
    assert!(wait_until(|| bench.status(LogicId::A).phase == Some(CyclePhase::Cycle2)));

    bench.click_reset();
    assert!(wait_until(|| bench.mediator.state().active.is_none()));

    let status = bench.status(LogicId::A);
    assert_eq!(status.mode, OperationMode::Idle);
    assert_eq!(status.phase, None);
    assert_eq!(status.active_logic, None);
    assert!(!status.active);
    assert!(bench.step_pins_low());
}

#[test]
fn test_reset_during_startup_homing_ends_the_session() {
    let mut config = fast_config("Logic A");
    // 40 steps at 10 ms each: homing is still running when reset lands.
    config.velocidades_lineal.home = 5000;
    let bench = Bench::new(config, fast_config("Logic B"));

    bench.mediator.select_logic(LogicId::A).unwrap();
    bench.click_reset();
    assert!(
        wait_until(|| bench.mediator.state().active.is_none()),
        "reset during homing was missed: {}",
        bench.status(LogicId::A).summary()
    );

    let status = bench.status(LogicId::A);
    assert!(!status.homing);
    assert_eq!(status.mode, OperationMode::Idle);
    assert_eq!(status.position, "Home");
    assert_eq!(bench.sim.axis_position(0), Some(10));
    assert!(bench.step_pins_low());
}

#[test]
fn test_reset_in_complete_needs_safety() {
    let bench = default_bench();
    run_mode(&bench, 1);
    assert!(wait_until(|| bench.status(LogicId::A).phase == Some(CyclePhase::Complete)));

    bench.sim.release(bench.config.input_pins.switch_s);
    bench.click_reset();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(bench.status(LogicId::A).phase, Some(CyclePhase::Complete));
    assert_eq!(bench.mediator.state().active, Some(LogicId::A));

    bench.sim.press(bench.config.input_pins.switch_s);
    bench.click_reset();
    assert!(wait_until(|| bench.mediator.state().active.is_none()));
}

// =============================================================================
// Pauses
// =============================================================================

#[test]
fn test_safety_open_freezes_motion_until_start() {
    let mut config = fast_config("Logic A");
    config.vueltas_primer_nivel.nivel1 = 10_000;
    let bench = Bench::new(config, fast_config("Logic B"));
    let linear_step = bench.config.motor_pins.pulsos1;

    run_mode(&bench, 1);
    assert!(wait_until(|| bench.status(LogicId::A).phase == Some(CyclePhase::Cycle1)));

    bench.sim.release(bench.config.input_pins.switch_s);
    assert!(wait_until(|| bench.status(LogicId::A).paused == Some(PauseKind::Safety)));
    thread::sleep(Duration::from_millis(20));
    assert!(bench.step_pins_low());
    let frozen = bench.sim.rising_edges(linear_step);

    // Closing the switch alone does not resume.
    bench.sim.press(bench.config.input_pins.switch_s);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(bench.sim.rising_edges(linear_step), frozen);
    assert_eq!(bench.status(LogicId::A).phase, Some(CyclePhase::Cycle1));

    bench.click_start();
    assert!(wait_until(|| bench.sim.rising_edges(linear_step) > frozen));
    assert_eq!(bench.status(LogicId::A).paused, None);
    bench.mediator.emergency_stop_all();
}

#[test]
fn test_stop_button_pauses_until_start() {
    let mut config = fast_config("Logic A");
    config.vueltas_primer_nivel.nivel1 = 10_000;
    let bench = Bench::new(config, fast_config("Logic B"));
    let linear_step = bench.config.motor_pins.pulsos1;

    run_mode(&bench, 1);
    assert!(wait_until(|| bench.status(LogicId::A).phase == Some(CyclePhase::Cycle1)));

    bench.click(bench.config.input_pins.btn_stop);
    assert!(wait_until(|| bench.status(LogicId::A).paused == Some(PauseKind::Stop)));
    thread::sleep(Duration::from_millis(20));
    let frozen = bench.sim.rising_edges(linear_step);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(bench.sim.rising_edges(linear_step), frozen);

    bench.click_start();
    assert!(wait_until(|| bench.sim.rising_edges(linear_step) > frozen));
    bench.mediator.emergency_stop_all();
}

#[test]
fn test_start_with_safety_open_stays_waiting() {
    let bench = default_bench();
    bench.mediator.select_logic(LogicId::A).unwrap();
    bench.wait_ready(LogicId::A);
    bench.mediator.select_mode(1).unwrap();

    bench.sim.release(bench.config.input_pins.switch_s);
    bench.click_start();
    assert!(wait_until(|| bench.status(LogicId::A).paused == Some(PauseKind::Safety)));

    bench.sim.press(bench.config.input_pins.switch_s);
    bench.click_start();
    assert!(wait_until(|| bench.status(LogicId::A).paused.is_none()));
    let status = bench.status(LogicId::A);
    assert_eq!(status.mode, OperationMode::Waiting);
    assert_eq!(status.phase, None);

    bench.click_start();
    assert!(wait_until(|| bench.status(LogicId::A).mode == OperationMode::Running));
    bench.mediator.emergency_stop_all();
}

// =============================================================================
// Mediator
// =============================================================================

#[test]
fn test_emergency_stop_always_leaves_pins_low() {
    let mut config = fast_config("Logic A");
    config.vueltas_primer_nivel.nivel1 = 10_000;
    let bench = Bench::new(config, fast_config("Logic B"));

    // Nothing running yet.
    bench.mediator.emergency_stop_all();
    assert_eq!(bench.mediator.state().active, None);

    run_mode(&bench, 1);
    assert!(wait_until(|| bench.status(LogicId::A).phase == Some(CyclePhase::Cycle1)));

    bench.mediator.emergency_stop_all();
    assert_eq!(bench.mediator.state().active, None);
    assert!(bench.step_pins_low());
    assert!(!bench.status(LogicId::A).active);
    assert!(!bench.status(LogicId::B).active);

    bench.mediator.emergency_stop_all();
    assert!(bench.step_pins_low());
}

#[test]
fn test_select_logic_keeps_one_logic_active() {
    let bench = default_bench();
    for id in [LogicId::A, LogicId::B, LogicId::B, LogicId::A, LogicId::B] {
        bench.mediator.select_logic(id).unwrap();
        let a = bench.status(LogicId::A).active;
        let b = bench.status(LogicId::B).active;
        assert!(!(a && b), "both logics active after selecting {}", id);
        assert_eq!(bench.mediator.state().active, Some(id));
        assert_eq!(bench.mediator.state().selected, Some(id));
        thread::sleep(Duration::from_millis(5));
    }
    bench.mediator.emergency_stop_all();
}

#[test]
fn test_update_rejected_while_active() {
    let bench = default_bench();
    bench.mediator.select_logic(LogicId::A).unwrap();

    for target in [LogicId::A, LogicId::B] {
        let err = bench
            .mediator
            .update_parameter(target, "velocidades_lineal.nivel1", Value::from(900))
            .unwrap_err();
        assert_eq!(err, Error::Command(CommandError::LogicActive));
    }
    assert_eq!(
        bench.mediator.get_configuration(LogicId::A).velocidades_lineal.levels.nivel1,
        20
    );

    bench.mediator.stop().unwrap();
    let old = bench
        .mediator
        .update_parameter(LogicId::A, "velocidades_lineal.nivel1", Value::from(900))
        .unwrap();
    assert_eq!(old, Value::from(20));
    assert_eq!(
        bench.mediator.get_configuration(LogicId::A).velocidades_lineal.levels.nivel1,
        900
    );
}

#[test]
fn test_commands_without_active_logic_are_rejected() {
    let bench = default_bench();
    assert_eq!(
        bench.mediator.select_mode(1).unwrap_err(),
        Error::Command(CommandError::NoLogicSelected)
    );
    assert_eq!(
        bench.mediator.start().unwrap_err(),
        Error::Command(CommandError::NoLogicSelected)
    );
    assert_eq!(
        bench.mediator.stop().unwrap_err(),
        Error::Command(CommandError::NoActiveLogic)
    );

    bench.mediator.select_logic(LogicId::A).unwrap();
    bench.mediator.stop().unwrap();
    assert_eq!(
        bench.mediator.enable_manual_mode().unwrap_err(),
        Error::Command(CommandError::NoActiveLogic)
    );
    bench.mediator.start().unwrap();
    assert_eq!(bench.mediator.state().active, Some(LogicId::A));
    bench.mediator.emergency_stop_all();
}

#[test]
fn test_mode_and_manual_are_exclusive() {
    let bench = default_bench();
    bench.mediator.select_logic(LogicId::A).unwrap();
    bench.wait_ready(LogicId::A);

    assert_eq!(
        bench.mediator.select_mode(9).unwrap_err(),
        Error::Command(CommandError::InvalidMode(9))
    );

    bench.mediator.enable_manual_mode().unwrap();
    assert!(bench.status(LogicId::A).manual_mode);
    assert_eq!(
        bench.mediator.select_mode(1).unwrap_err(),
        Error::Command(CommandError::ManualActive)
    );

    bench.mediator.disable_manual_mode().unwrap();
    bench.mediator.select_mode(1).unwrap();
    assert_eq!(
        bench.mediator.enable_manual_mode().unwrap_err(),
        Error::Command(CommandError::CycleBusy)
    );
    bench.mediator.emergency_stop_all();
}

#[test]
fn test_snapshots_carry_mediator_fields() {
    let port = PortHandle::new(Arc::new(SimPort::new()));
    let build = |id: LogicId| {
        CycleController::builder(id)
            .port(port.clone())
            .config(fast_config("bench"))
            .build()
            .unwrap()
    };
    let (observer, rx) = ChannelObserver::bounded(4096);
    let mediator = ExecutionMediator::new(build(LogicId::A), build(LogicId::B), Arc::new(observer))
        .unwrap();

    // The simulated home switch is open and never closes, so stop
    // while homing is still running.
    mediator.select_logic(LogicId::A).unwrap();
    thread::sleep(Duration::from_millis(20));
    mediator.emergency_stop_all();

    let snapshots: Vec<_> = rx.try_iter().collect();
    assert!(!snapshots.is_empty());
    assert!(snapshots
        .iter()
        .any(|s| s.logic == LogicId::A && s.active_logic == Some(LogicId::A)));
    assert!(snapshots
        .iter()
        .all(|s| s.selected_logic == Some(LogicId::A)));
}

// =============================================================================
// Logic B date lockout
// =============================================================================

#[test]
fn test_logic_b_refuses_to_start_after_target_date() {
    let dates = Arc::new(ManualDateSource::new(datetime(2031, 1, 1)));
    let bench = Bench::with_dates(fast_config("Logic A"), fast_config("Logic B"), dates);

    let err = bench.mediator.select_logic(LogicId::B).unwrap_err();
    assert!(matches!(
        err,
        Error::Lockout(LockoutError::TargetDateReached { .. })
    ));
    assert_eq!(bench.mediator.state().active, None);
    let status = bench.status(LogicId::B);
    assert!(status.lockout);
    assert_eq!(status.target_date.as_deref(), Some("2030/12/31"));

    // Latched until the date source is reprogrammed.
    assert_eq!(
        bench.mediator.start().unwrap_err(),
        Error::Lockout(LockoutError::Latched)
    );
    bench.mediator.set_rtc_datetime(datetime(2030, 1, 1)).unwrap();
    assert!(!bench.status(LogicId::B).lockout);
    bench.mediator.start().unwrap();
    assert_eq!(bench.mediator.state().active, Some(LogicId::B));
    bench.mediator.emergency_stop_all();
}

#[test]
fn test_logic_b_halts_when_date_passes_while_running() {
    let bench = default_bench();
    bench.mediator.select_logic(LogicId::B).unwrap();
    bench.wait_ready(LogicId::B);

    bench.dates.set(datetime(2031, 1, 1)).unwrap();
    assert!(wait_until(|| bench.mediator.state().active.is_none()));

    let status = bench.status(LogicId::B);
    assert!(status.lockout);
    assert!(!status.active);
    assert!(bench.step_pins_low());
}

#[test]
fn test_logic_a_has_no_date_source() {
    let bench = default_bench();
    let controller_err = {
        let port = PortHandle::new(Arc::new(SimPort::new()));
        let logic_a = CycleController::builder(LogicId::A)
            .port(port)
            .config(fast_config("solo"))
            .build()
            .unwrap();
        logic_a.set_rtc_datetime(datetime(2030, 1, 1)).unwrap_err()
    };
    assert_eq!(controller_err, Error::Command(CommandError::NoDateGate));
    assert!(bench.status(LogicId::A).rtc_datetime.is_none());
    assert!(bench.status(LogicId::B).rtc_datetime.is_some());
}
