//! Dotted-path parameter access.
//!
//! A path such as `velocidades_lineal.nivel2` names a value in the
//! serialized document. Updates go through the JSON form and are rebuilt
//! into a typed, validated [`CycleConfig`]; on any failure the original
//! stays untouched.

use serde_json::{Map, Value};

use crate::error::{ConfigError, Error, Result};

use super::validation::validate_config;
use super::CycleConfig;

impl CycleConfig {
    /// Read the value at a dotted path.
    pub fn parameter(&self, path: &str) -> Result<Value> {
        let doc = to_document(self)?;
        lookup(&doc, path).cloned()
    }

    /// Return a copy with one value replaced, plus the previous value.
    pub fn with_parameter(&self, path: &str, value: Value) -> Result<(CycleConfig, Value)> {
        let mut doc = to_document(self)?;
        let old = replace(&mut doc, path, value)?;
        let config = from_document(doc, path)?;
        Ok((config, old))
    }

    /// Return a copy with every update applied. All or nothing.
    ///
    /// Validation runs once after all values are in place, so related
    /// fields (joystick bounds, manual limits) can move together.
    pub fn with_parameters(&self, updates: &Map<String, Value>) -> Result<CycleConfig> {
        let mut doc = to_document(self)?;
        for (path, value) in updates {
            replace(&mut doc, path, value.clone())?;
        }
        let paths: Vec<&str> = updates.keys().map(String::as_str).collect();
        from_document(doc, &paths.join(", "))
    }
}

fn to_document(config: &CycleConfig) -> Result<Value> {
    serde_json::to_value(config)
        .map_err(|e| Error::Config(ConfigError::SerializeError(e.to_string())))
}

fn from_document(doc: Value, path: &str) -> Result<CycleConfig> {
    let config: CycleConfig = serde_json::from_value(doc).map_err(|e| {
        Error::Config(ConfigError::TypeMismatch {
            path: path.to_string(),
            reason: e.to_string(),
        })
    })?;
    validate_config(&config)?;
    Ok(config)
}

fn unknown(path: &str) -> Error {
    Error::Config(ConfigError::UnknownParameter(path.to_string()))
}

fn lookup<'a>(doc: &'a Value, path: &str) -> Result<&'a Value> {
    path.split('.').try_fold(doc, |node, key| {
        node.as_object()
            .and_then(|obj| obj.get(key))
            .ok_or_else(|| unknown(path))
    })
}

fn replace(doc: &mut Value, path: &str, value: Value) -> Result<Value> {
    let slot = path.split('.').try_fold(doc, |node, key| {
        node.as_object_mut()
            .and_then(|obj| obj.get_mut(key))
            .ok_or_else(|| unknown(path))
    })?;
    Ok(std::mem::replace(slot, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_returns_previous_value() {
        let config = CycleConfig::default();
        let (updated, old) = config
            .with_parameter("velocidades_lineal.nivel2", json!(650))
            .unwrap();

        assert_eq!(old, json!(800));
        assert_eq!(updated.velocidades_lineal.levels.nivel2, 650);
        assert_eq!(config.velocidades_lineal.levels.nivel2, 800);
    }

    #[test]
    fn test_unknown_path_rejected() {
        let config = CycleConfig::default();
        for path in ["velocidades_lineal.nivel9", "nope", "tiempos..x", ""] {
            let err = config.with_parameter(path, json!(1)).unwrap_err();
            assert_eq!(err, Error::Config(ConfigError::UnknownParameter(path.into())));
        }
    }

    #[test]
    fn test_wrong_type_rejected() {
        let config = CycleConfig::default();
        let err = config
            .with_parameter("tiempos.pausa_entre_fases_ms", json!("soon"))
            .unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::TypeMismatch { .. })));
    }

    #[test]
    fn test_update_is_validated() {
        let config = CycleConfig::default();
        assert!(config
            .with_parameter("pasos_por_vuelta_taladro", json!(0))
            .is_err());
    }

    #[test]
    fn test_bulk_update_validates_after_all_values() {
        let config = CycleConfig::default();
        let mut updates = Map::new();
        // Moving center_min above the old center_max is only valid together.
        updates.insert("joystick.center_max".into(), json!(900));
        updates.insert("joystick.center_min".into(), json!(700));

        let updated = config.with_parameters(&updates).unwrap();
        assert_eq!(updated.joystick.center_min, 700);
        assert_eq!(updated.joystick.center_max, 900);
    }

    #[test]
    fn test_bulk_update_all_or_nothing() {
        let config = CycleConfig::default();
        let mut updates = Map::new();
        updates.insert("pasos_home.pasos_despues_home".into(), json!(42));
        updates.insert("missing.key".into(), json!(1));

        assert!(config.with_parameters(&updates).is_err());
        assert_eq!(config.pasos_home.pasos_despues_home, 100);
    }

    #[test]
    fn test_read_parameter() {
        let config = CycleConfig::default();
        assert_eq!(config.parameter("rebote.pasos").unwrap(), json!(50));
    }
}
