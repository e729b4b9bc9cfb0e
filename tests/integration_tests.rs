//! Integration tests for drill-rig configuration and persistence.
//!
//! These tests cover the shipped documents, validation, dotted-path
//! updates and save-with-backup through the public API.

mod common;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use common::fast_config;
use drill_rig::config::{
    backup_path, load_config, load_rig_config, parse_config, save_config, Backend, CycleConfig, Mode,
};
use drill_rig::controller::{CycleController, LogicId, NullObserver};
use drill_rig::error::{ConfigError, Error};
use drill_rig::port::{PortHandle, SimPort};
use drill_rig::ExecutionMediator;
use serde_json::{json, Map, Value};

fn shipped(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config").join(name)
}

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("drill-rig-it-{}-{}", tag, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

// =============================================================================
// Shipped documents
// =============================================================================

#[test]
fn test_shipped_logic_documents_load() {
    let a = load_config(shipped("logic_a.json")).expect("logic_a.json should load");
    let b = load_config(shipped("logic_b.json")).expect("logic_b.json should load");

    assert_eq!(a.logic_name, "Logic A");
    assert!(a.rtc_config.is_none());

    let rtc = b.rtc_config.expect("Logic B carries a date lockout");
    assert!(rtc.enabled);
    assert_eq!(rtc.target_date.year, 2030);

    let level = a.level(Mode::new(3).unwrap());
    assert_eq!(level.pasos_ciclo1, 600);
    assert_eq!(level.vueltas_ciclo1, 3);
    assert_eq!(level.velocidad_lineal, 700);
    assert_eq!(level.velocidad_taladro, 450);
}

#[test]
fn test_shipped_rig_file_resolves_documents() {
    let rig = load_rig_config(shipped("rig.toml")).expect("rig.toml should load");
    assert_eq!(rig.port.backend, Backend::Sim);
    assert_eq!(rig.log.level, "info");
    assert!(rig.logic_a.config.ends_with("config/logic_a.json"));
    assert!(rig.logic_b.config.is_absolute());
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_document_with_zero_speed_rejected() {
    let mut doc = serde_json::to_value(CycleConfig::default()).unwrap();
    doc["velocidades_lineal"]["nivel4"] = json!(0);

    let result = parse_config(&doc.to_string());
    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::InvalidValue { .. }))
    ));
}

#[test]
fn test_document_with_impossible_date_rejected() {
    let mut doc = serde_json::to_value(CycleConfig::default()).unwrap();
    doc["rtc_config"] = json!({
        "enabled": true,
        "target_date": { "year": 2030, "month": 2, "day": 30 }
    });

    let result = parse_config(&doc.to_string());
    assert_eq!(
        result.unwrap_err(),
        Error::Config(ConfigError::InvalidDate {
            year: 2030,
            month: 2,
            day: 30
        })
    );
}

#[test]
fn test_malformed_json_is_a_parse_error() {
    assert!(matches!(
        parse_config("{ \"logic_name\": "),
        Err(Error::Config(ConfigError::ParseError(_)))
    ));
}

// =============================================================================
// Dotted-path updates
// =============================================================================

fn controller(config: CycleConfig, path: Option<PathBuf>) -> CycleController {
    let port = PortHandle::new(Arc::new(SimPort::new()));
    let mut builder = CycleController::builder(LogicId::A).port(port).config(config);
    if let Some(path) = path {
        builder = builder.config_path(path);
    }
    builder.build().unwrap()
}

#[test]
fn test_update_parameter_returns_previous_value() {
    let mut c = controller(CycleConfig::default(), None);

    let old = c
        .update_parameter("vueltas_primer_nivel.nivel2", json!(7))
        .unwrap();
    assert_eq!(old, json!(2));
    assert_eq!(c.config().vueltas_primer_nivel.nivel2, 7);

    let old = c.update_parameter("tiempos.pausa_entre_fases_ms", json!(250)).unwrap();
    assert_eq!(old, json!(1000));
}

#[test]
fn test_failed_update_changes_nothing() {
    let mut c = controller(CycleConfig::default(), None);
    let before = c.config();

    assert!(matches!(
        c.update_parameter("velocidades_lineal.nivel9", json!(100)),
        Err(Error::Config(ConfigError::UnknownParameter(_)))
    ));
    assert!(matches!(
        c.update_parameter("velocidades_lineal.nivel1", json!("fast")),
        Err(Error::Config(ConfigError::TypeMismatch { .. }))
    ));
    assert!(matches!(
        c.update_parameter("pasos_por_vuelta_taladro", json!(0)),
        Err(Error::Config(ConfigError::InvalidValue { .. }))
    ));

    assert_eq!(c.config(), before);
}

#[test]
fn test_bulk_update_is_all_or_nothing() {
    let mut c = controller(CycleConfig::default(), None);
    let before = c.config();

    let mut updates = Map::new();
    updates.insert("velocidades_lineal.nivel1".into(), json!(900));
    updates.insert("velocidades_manual.limite_inferior".into(), json!(5000));
    assert!(c.update_parameters(&updates).is_err());
    assert_eq!(c.config(), before);

    updates.insert("velocidades_manual.limite_inferior".into(), json!(300));
    c.update_parameters(&updates).unwrap();
    assert_eq!(c.config().velocidades_lineal.levels.nivel1, 900);
    assert_eq!(c.config().velocidades_manual.limite_inferior, 300);
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_save_keeps_backup_of_previous_file() {
    let dir = scratch_dir("save");
    let path = dir.join("logic_a.json");
    save_config(&CycleConfig::default(), &path).unwrap();

    let mut c = controller(load_config(&path).unwrap(), Some(path.clone()));
    c.update_parameter("pasos_home.pasos_despues_home", json!(42)).unwrap();
    c.save().unwrap();

    let saved = load_config(&path).unwrap();
    assert_eq!(saved.pasos_home.pasos_despues_home, 42);
    let backup = load_config(backup_path(&path)).unwrap();
    assert_eq!(backup.pasos_home.pasos_despues_home, 100);

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("\n  \"logic_name\""), "saved JSON is pretty-printed");
}

#[test]
fn test_save_without_path_is_rejected() {
    let c = controller(CycleConfig::default(), None);
    assert!(matches!(c.save(), Err(Error::Config(ConfigError::IoError(_)))));
}

#[test]
fn test_bulk_update_and_save_stops_everything_first() {
    let dir = scratch_dir("bulk");
    let path_a = dir.join("logic_a.json");
    let path_b = dir.join("logic_b.json");
    save_config(&fast_config("Logic A"), &path_a).unwrap();
    save_config(&fast_config("Logic B"), &path_b).unwrap();

    let port = PortHandle::new(Arc::new(SimPort::new()));
    let build = |id: LogicId, path: &PathBuf| {
        CycleController::builder(id)
            .port(port.clone())
            .config_path(path)
            .build()
            .unwrap()
    };
    let mediator = ExecutionMediator::new(
        build(LogicId::A, &path_a),
        build(LogicId::B, &path_b),
        Arc::new(NullObserver),
    )
    .unwrap();

    mediator.select_logic(LogicId::A).unwrap();
    assert_eq!(mediator.state().active, Some(LogicId::A));

    let mut updates = Map::new();
    updates.insert("velocidades_taladro.default".into(), Value::from(321));
    mediator.bulk_update_and_save(LogicId::A, &updates).unwrap();

    assert_eq!(mediator.state().active, None);
    assert_eq!(mediator.get_configuration(LogicId::A).velocidades_taladro.default, 321);
    assert_eq!(load_config(&path_a).unwrap().velocidades_taladro.default, 321);
    assert!(backup_path(&path_a).exists());
}
