//! Configuration validation.

use chrono::NaiveDate;

use crate::error::{ConfigError, Error, Result};

use super::{CycleConfig, LevelTable};

/// Validate a cycle configuration.
///
/// Checks:
/// - All speeds are non-zero
/// - Cycle pass lengths and the revolution size are non-zero
/// - Joystick bounds are ordered
/// - Manual speed range is ordered
/// - The lockout date is a real calendar date
pub fn validate_config(config: &CycleConfig) -> Result<()> {
    nonzero_table("velocidades_lineal", &config.velocidades_lineal.levels)?;
    nonzero("velocidades_lineal.home", config.velocidades_lineal.home)?;
    nonzero_table("velocidades_taladro", &config.velocidades_taladro.levels)?;
    nonzero("velocidades_taladro.default", config.velocidades_taladro.default)?;
    nonzero(
        "velocidad_pasos_taladro_ciclo2",
        config.velocidad_pasos_taladro_ciclo2,
    )?;
    nonzero("rebote.velocidad", config.rebote.velocidad)?;

    nonzero_table("pasos_primer_nivel", &config.pasos_primer_nivel)?;
    nonzero_table("pasos_segundo_nivel", &config.pasos_segundo_nivel)?;
    nonzero("pasos_por_vuelta_taladro", config.pasos_por_vuelta_taladro)?;

    let manual = &config.velocidades_manual;
    nonzero("velocidades_manual.limite_inferior", manual.limite_inferior)?;
    if manual.limite_inferior > manual.limite_superior {
        return Err(invalid(
            "velocidades_manual",
            "limite_inferior must not exceed limite_superior",
        ));
    }

    if !config.joystick.is_valid() {
        return Err(invalid(
            "joystick",
            "bounds must satisfy adc_min <= center_min < center_max <= adc_max",
        ));
    }

    if let Some(rtc) = &config.rtc_config {
        let d = rtc.target_date;
        if NaiveDate::from_ymd_opt(d.year, d.month, d.day).is_none() {
            return Err(Error::Config(ConfigError::InvalidDate {
                year: d.year,
                month: d.month,
                day: d.day,
            }));
        }
        nonzero_u64("rtc_config.check_interval_ms", rtc.check_interval_ms)?;
    }

    Ok(())
}

fn invalid(field: &'static str, reason: &'static str) -> Error {
    Error::Config(ConfigError::InvalidValue { field, reason })
}

fn nonzero(field: &'static str, value: u32) -> Result<()> {
    if value == 0 {
        return Err(invalid(field, "must be greater than zero"));
    }
    Ok(())
}

fn nonzero_u64(field: &'static str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(invalid(field, "must be greater than zero"));
    }
    Ok(())
}

fn nonzero_table(field: &'static str, table: &LevelTable) -> Result<()> {
    if table.values().contains(&0) {
        return Err(invalid(field, "every level must be greater than zero"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RtcConfig, TargetDate};

    #[test]
    fn test_default_is_valid() {
        assert!(validate_config(&CycleConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_speed_rejected() {
        let mut config = CycleConfig::default();
        config.velocidades_lineal.levels.nivel4 = 0;

        let err = validate_config(&config).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidValue {
                field: "velocidades_lineal",
                ..
            })
        ));
    }

    #[test]
    fn test_unordered_joystick_rejected() {
        let mut config = CycleConfig::default();
        config.joystick.center_max = config.joystick.center_min;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_impossible_target_date_rejected() {
        let mut config = CycleConfig::default();
        config.rtc_config = Some(RtcConfig {
            enabled: true,
            target_date: TargetDate {
                year: 2025,
                month: 2,
                day: 30,
            },
            lockout_on_target_date: true,
            check_interval_ms: 1000,
        });

        assert_eq!(
            validate_config(&config),
            Err(Error::Config(ConfigError::InvalidDate {
                year: 2025,
                month: 2,
                day: 30
            }))
        );
    }
}
