//! Date lockout gate.
//!
//! Logic B refuses to start, and halts while running, once a configured
//! target date is reached or its date source reads implausibly. The
//! lockout latches; only reprogramming the date source clears it.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, TimeDelta};

use crate::config::RtcConfig;
use crate::error::{Error, LockoutError, Result};

/// Earliest year a date source may plausibly report.
pub const MIN_PLAUSIBLE_YEAR: i32 = 2000;

/// Wall-clock date provider.
pub trait DateSource: Send + Sync {
    /// Current local date and time.
    fn now(&self) -> Result<NaiveDateTime>;

    /// Program the source to read `datetime` from now on.
    fn set(&self, datetime: NaiveDateTime) -> Result<()>;
}

/// System clock with a programmable offset.
#[derive(Debug, Default)]
pub struct SystemDateSource {
    offset: Mutex<TimeDelta>,
}

impl SystemDateSource {
    /// System time, no offset.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DateSource for SystemDateSource {
    fn now(&self) -> Result<NaiveDateTime> {
        let offset = *self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        Local::now()
            .naive_local()
            .checked_add_signed(offset)
            .ok_or_else(|| LockoutError::ImplausibleClock("date out of range".into()).into())
    }

    fn set(&self, datetime: NaiveDateTime) -> Result<()> {
        let offset = datetime - Local::now().naive_local();
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) = offset;
        log::info!("date source programmed to {}", datetime.format("%Y/%m/%d %H:%M:%S"));
        Ok(())
    }
}

/// Fixed, settable date for tests and benches.
#[derive(Debug)]
pub struct ManualDateSource {
    now: Mutex<Option<NaiveDateTime>>,
}

impl ManualDateSource {
    /// Source that reads `datetime`.
    pub fn new(datetime: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(Some(datetime)),
        }
    }

    /// Source whose reads fail until it is programmed.
    pub fn unreadable() -> Self {
        Self {
            now: Mutex::new(None),
        }
    }
}

impl DateSource for ManualDateSource {
    fn now(&self) -> Result<NaiveDateTime> {
        self.now
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ok_or_else(|| LockoutError::ImplausibleClock("date source unreadable".into()).into())
    }

    fn set(&self, datetime: NaiveDateTime) -> Result<()> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = Some(datetime);
        Ok(())
    }
}

/// Latching date check over a [`DateSource`].
pub struct RtcGate {
    source: Arc<dyn DateSource>,
    latched: bool,
    last_check_us: Option<u64>,
}

impl RtcGate {
    /// Gate over `source`, initially unlatched.
    pub fn new(source: Arc<dyn DateSource>) -> Self {
        Self {
            source,
            latched: false,
            last_check_us: None,
        }
    }

    /// Whether the lockout has latched.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.latched
    }

    /// Check the date now. A failure latches.
    pub fn evaluate(&mut self, config: Option<&RtcConfig>) -> Result<()> {
        if self.latched {
            return Err(LockoutError::Latched.into());
        }
        let config = match config {
            Some(c) if c.enabled => c,
            _ => return Ok(()),
        };

        let result = self.source.now().and_then(|now| check_date(now, config));
        if let Err(e) = &result {
            log::error!("date lockout: {}", e);
            self.latched = true;
        }
        result
    }

    /// Run [`evaluate`](Self::evaluate) when the check interval has elapsed.
    pub fn check_due(&mut self, config: Option<&RtcConfig>, now_us: u64) -> Result<()> {
        let interval_us = config.map_or(1000, |c| c.check_interval_ms) * 1000;
        match self.last_check_us {
            Some(last) if now_us.saturating_sub(last) < interval_us => Ok(()),
            _ => {
                self.last_check_us = Some(now_us);
                self.evaluate(config)
            }
        }
    }

    /// Program the source, clear the latch and re-evaluate.
    pub fn reprogram(&mut self, datetime: NaiveDateTime, config: Option<&RtcConfig>) -> Result<()> {
        self.source.set(datetime)?;
        self.latched = false;
        self.last_check_us = None;
        self.evaluate(config)
    }

    /// Current source reading, formatted.
    pub fn datetime_string(&self) -> Option<String> {
        self.source
            .now()
            .ok()
            .map(|dt| dt.format("%Y/%m/%d %H:%M:%S").to_string())
    }
}

fn check_date(now: NaiveDateTime, config: &RtcConfig) -> Result<()> {
    if now.year() < MIN_PLAUSIBLE_YEAR {
        return Err(LockoutError::ImplausibleClock(format!("year {}", now.year())).into());
    }
    if !config.lockout_on_target_date {
        return Ok(());
    }
    let target = target_date(config)?;
    if now.date() >= target {
        return Err(LockoutError::TargetDateReached { target }.into());
    }
    Ok(())
}

fn target_date(config: &RtcConfig) -> Result<NaiveDate> {
    let d = config.target_date;
    NaiveDate::from_ymd_opt(d.year, d.month, d.day).ok_or_else(|| {
        Error::Config(crate::error::ConfigError::InvalidDate {
            year: d.year,
            month: d.month,
            day: d.day,
        })
    })
}

/// Start/run admission policy of a controller.
pub enum DateGate {
    /// Never refuses (Logic A)
    AlwaysAllow,
    /// Date-checked (Logic B)
    Rtc(RtcGate),
}

impl DateGate {
    /// Date-checked gate over `source`.
    pub fn rtc(source: Arc<dyn DateSource>) -> Self {
        DateGate::Rtc(RtcGate::new(source))
    }

    /// Checked at `start()`.
    pub fn admit(&mut self, config: Option<&RtcConfig>) -> Result<()> {
        match self {
            DateGate::AlwaysAllow => Ok(()),
            DateGate::Rtc(gate) => gate.evaluate(config),
        }
    }

    /// Checked from the running loop.
    pub fn periodic(&mut self, config: Option<&RtcConfig>, now_us: u64) -> Result<()> {
        match self {
            DateGate::AlwaysAllow => Ok(()),
            DateGate::Rtc(gate) => gate.check_due(config, now_us),
        }
    }

    /// Whether a lockout is latched.
    pub fn is_locked(&self) -> bool {
        match self {
            DateGate::AlwaysAllow => false,
            DateGate::Rtc(gate) => gate.is_locked(),
        }
    }

    /// Formatted date source reading, Logic B only.
    pub fn datetime_string(&self) -> Option<String> {
        match self {
            DateGate::AlwaysAllow => None,
            DateGate::Rtc(gate) => gate.datetime_string(),
        }
    }
}

/// Formatted lockout date.
pub fn target_date_string(config: Option<&RtcConfig>) -> Option<String> {
    config
        .and_then(|c| target_date(c).ok())
        .map(|d| d.format("%Y/%m/%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetDate;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn rtc_config() -> RtcConfig {
        RtcConfig {
            enabled: true,
            target_date: TargetDate {
                year: 2030,
                month: 6,
                day: 1,
            },
            lockout_on_target_date: true,
            check_interval_ms: 1000,
        }
    }

    #[test]
    fn test_before_target_is_allowed() {
        let source = Arc::new(ManualDateSource::new(at(2030, 5, 31)));
        let mut gate = RtcGate::new(source);
        assert!(gate.evaluate(Some(&rtc_config())).is_ok());
        assert!(!gate.is_locked());
    }

    #[test]
    fn test_target_day_locks_and_latches() {
        let source = Arc::new(ManualDateSource::new(at(2030, 6, 1)));
        let mut gate = RtcGate::new(source.clone());
        let config = rtc_config();

        assert!(matches!(
            gate.evaluate(Some(&config)),
            Err(Error::Lockout(LockoutError::TargetDateReached { .. }))
        ));

        // Moving the source back alone does not clear the latch.
        source.set(at(2029, 1, 1)).unwrap();
        assert_eq!(
            gate.evaluate(Some(&config)),
            Err(Error::Lockout(LockoutError::Latched))
        );

        gate.reprogram(at(2029, 1, 1), Some(&config)).unwrap();
        assert!(!gate.is_locked());
    }

    #[test]
    fn test_implausible_clock_locks() {
        let mut gate = RtcGate::new(Arc::new(ManualDateSource::new(at(1970, 1, 1))));
        assert!(matches!(
            gate.evaluate(Some(&rtc_config())),
            Err(Error::Lockout(LockoutError::ImplausibleClock(_)))
        ));

        let mut gate = RtcGate::new(Arc::new(ManualDateSource::unreadable()));
        assert!(gate.evaluate(Some(&rtc_config())).is_err());
        assert!(gate.is_locked());
    }

    #[test]
    fn test_disabled_config_never_locks() {
        let mut config = rtc_config();
        config.enabled = false;
        let mut gate = RtcGate::new(Arc::new(ManualDateSource::new(at(2040, 1, 1))));
        assert!(gate.evaluate(Some(&config)).is_ok());
        assert!(gate.evaluate(None).is_ok());
    }

    #[test]
    fn test_periodic_check_respects_interval() {
        let source = Arc::new(ManualDateSource::new(at(2030, 5, 31)));
        let mut gate = RtcGate::new(source.clone());
        let config = rtc_config();

        gate.check_due(Some(&config), 0).unwrap();
        source.set(at(2030, 6, 2)).unwrap();
        assert!(gate.check_due(Some(&config), 999_999).is_ok());
        assert!(gate.check_due(Some(&config), 1_000_000).is_err());
    }

    #[test]
    fn test_always_allow() {
        let mut gate = DateGate::AlwaysAllow;
        assert!(gate.admit(Some(&rtc_config())).is_ok());
        assert!(gate.datetime_string().is_none());
    }

    #[test]
    fn test_system_source_offset() {
        let source = SystemDateSource::new();
        source.set(at(2031, 3, 4)).unwrap();
        assert_eq!(source.now().unwrap().date(), NaiveDate::from_ymd_opt(2031, 3, 4).unwrap());
    }
}
