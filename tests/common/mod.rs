//! Shared fixtures for the threaded controller tests.
//!
//! Everything runs against a real-clock `SimPort` with microsecond
//! speeds, so a full automatic cycle takes well under a second.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime};

use drill_rig::config::{CycleConfig, LevelTable, RtcConfig, TargetDate, Timings};
use drill_rig::controller::{
    CycleController, DateGate, LogicId, ManualDateSource, NullObserver, StatusSnapshot,
};
use drill_rig::port::{AxisModel, Level, PortHandle, SimPort};
use drill_rig::ExecutionMediator;

pub const TIMEOUT: Duration = Duration::from_secs(20);

/// Cycle parameters small enough for threaded tests.
pub fn fast_config(name: &str) -> CycleConfig {
    let mut config = CycleConfig::default();
    config.logic_name = name.into();
    config.velocidades_lineal.levels = LevelTable::splat(20);
    config.velocidades_lineal.home = 20;
    config.velocidades_taladro.levels = LevelTable::splat(20);
    config.velocidades_taladro.default = 20;
    config.velocidades_manual.limite_inferior = 20;
    config.velocidades_manual.limite_superior = 200;
    config.pasos_taladro_ciclo2 = 20;
    config.velocidad_pasos_taladro_ciclo2 = 20;
    config.pasos_acomodo_segundo_nivel = LevelTable::splat(20);
    config.pasos_segundo_nivel = LevelTable::splat(20);
    config.pasos_home.pasos_despues_home = 10;
    config.tiempos = Timings {
        tiempo_antes_de_girar_ms: 5,
        tiempo_para_empezar_despues_stop_ms: 5,
        pausa_entre_fases_ms: 1,
    };
    config
}

pub fn target_date() -> TargetDate {
    TargetDate {
        year: 2030,
        month: 12,
        day: 31,
    }
}

pub fn rtc_config() -> RtcConfig {
    RtcConfig {
        enabled: true,
        target_date: target_date(),
        lockout_on_target_date: true,
        check_interval_ms: 10,
    }
}

pub fn datetime(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .unwrap()
}

pub struct Bench {
    pub sim: Arc<SimPort>,
    pub mediator: ExecutionMediator,
    pub config: CycleConfig,
    pub dates: Arc<ManualDateSource>,
}

impl Bench {
    /// Both logics on one simulated rig, safety closed.
    pub fn new(config_a: CycleConfig, config_b: CycleConfig) -> Self {
        Self::with_dates(config_a, config_b, Arc::new(ManualDateSource::new(datetime(2030, 6, 1))))
    }

    pub fn with_dates(
        config_a: CycleConfig,
        mut config_b: CycleConfig,
        dates: Arc<ManualDateSource>,
    ) -> Self {
        if config_b.rtc_config.is_none() {
            config_b.rtc_config = Some(rtc_config());
        }
        let sim = Arc::new(SimPort::new());
        sim.attach_axis(AxisModel {
            step: config_a.motor_pins.pulsos1,
            dir: config_a.motor_pins.dir1,
            toward_home: Level::High,
            position: 40,
            home_travel: 0,
            length: 1_000_000,
            home_pin: config_a.input_pins.fin_home,
            final_pin: config_a.input_pins.fin_final,
            active: Level::High,
        });
        let port = PortHandle::new(sim.clone());

        let logic_a = CycleController::builder(LogicId::A)
            .port(port.clone())
            .config(config_a.clone())
            .build()
            .unwrap();
        let logic_b = CycleController::builder(LogicId::B)
            .port(port)
            .config(config_b)
            .date_gate(DateGate::rtc(dates.clone()))
            .build()
            .unwrap();
        let mediator = ExecutionMediator::new(logic_a, logic_b, Arc::new(NullObserver)).unwrap();

        sim.press(config_a.input_pins.switch_s);
        Self {
            sim,
            mediator,
            config: config_a,
            dates,
        }
    }

    pub fn status(&self, logic: LogicId) -> StatusSnapshot {
        self.mediator.status(logic)
    }

    /// Wait for startup homing of `logic` to finish.
    pub fn wait_ready(&self, logic: LogicId) {
        assert!(
            wait_until(|| {
                let s = self.status(logic);
                s.active && !s.homing && s.position == "Home"
            }),
            "logic {} never finished homing: {}",
            logic,
            self.status(logic).summary()
        );
    }

    /// Press and release a button long enough to clear the debounce.
    pub fn click(&self, pin: u8) {
        thread::sleep(Duration::from_millis(60));
        self.sim.press(pin);
        thread::sleep(Duration::from_millis(60));
        self.sim.release(pin);
        thread::sleep(Duration::from_millis(10));
    }

    pub fn click_start(&self) {
        self.click(self.config.input_pins.btn_start);
    }

    pub fn click_reset(&self) {
        self.click(self.config.input_pins.btn_reset);
    }

    pub fn step_pins_low(&self) -> bool {
        self.sim.level(self.config.motor_pins.pulsos1) == Level::Low
            && self.sim.level(self.config.motor_pins.pulsos2) == Level::Low
    }
}

/// Poll `f` until it holds or [`TIMEOUT`] passes.
pub fn wait_until(mut f: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    f()
}
