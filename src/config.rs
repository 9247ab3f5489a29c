use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{TimeOfDay, TimeRange};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("malformed configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Business policy knobs for the availability service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingPolicy {
    pub opening_time: TimeOfDay,
    pub closing_time: TimeOfDay,
    /// Unconverted holds older than this stop counting as conflicts.
    pub hold_expiration_minutes: u32,
    pub default_buffer_minutes: u32,
    /// Step between candidate starts in the slot calendar.
    pub slot_interval_minutes: u32,
    /// Offset of the operator's local time, used to decide what "today" is.
    pub utc_offset_minutes: i32,
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self {
            opening_time: TimeOfDay::from_minutes(8 * 60).unwrap_or(TimeOfDay::MIDNIGHT),
            closing_time: TimeOfDay::from_minutes(22 * 60).unwrap_or(TimeOfDay::END_OF_DAY),
            hold_expiration_minutes: 15,
            default_buffer_minutes: 60,
            slot_interval_minutes: 60,
            utc_offset_minutes: 0,
        }
    }
}

impl SchedulingPolicy {
    /// Read `FLEET_*` environment variables, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let policy = Self {
            opening_time: lookup("FLEET_OPENING_TIME")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.opening_time),
            closing_time: lookup("FLEET_CLOSING_TIME")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.closing_time),
            hold_expiration_minutes: lookup("FLEET_HOLD_EXPIRATION_MINUTES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.hold_expiration_minutes),
            default_buffer_minutes: lookup("FLEET_BUFFER_MINUTES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_buffer_minutes),
            slot_interval_minutes: lookup("FLEET_SLOT_INTERVAL_MINUTES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.slot_interval_minutes),
            utc_offset_minutes: lookup("FLEET_UTC_OFFSET_MINUTES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.utc_offset_minutes),
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let policy: Self = serde_json::from_str(json)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.opening_time >= self.closing_time {
            return Err(ConfigError::Invalid(format!(
                "opening time {} must be before closing time {}",
                self.opening_time, self.closing_time
            )));
        }
        if self.hold_expiration_minutes == 0 {
            return Err(ConfigError::Invalid("hold expiration must be positive".into()));
        }
        if self.slot_interval_minutes == 0 {
            return Err(ConfigError::Invalid("slot interval must be positive".into()));
        }
        if self.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(ConfigError::Invalid("UTC offset must be within one day".into()));
        }
        Ok(())
    }

    pub fn operating_hours(&self) -> Option<TimeRange> {
        TimeRange::new(self.opening_time, self.closing_time)
    }

    pub fn hold_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.hold_expiration_minutes))
    }

    /// Holds created before this instant are expired.
    pub fn hold_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.hold_ttl()
    }

    /// The operator's calendar date at `now`.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        match FixedOffset::east_opt(self.utc_offset_minutes * 60) {
            Some(offset) => now.with_timezone(&offset).date_naive(),
            None => now.date_naive(),
        }
    }
}

/// Settings for a long-running host of the in-process ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSettings {
    /// Directory for the WAL; `None` keeps the ledger in memory only.
    pub data_dir: Option<PathBuf>,
    pub compact_threshold: u64,
    pub sweep_interval: Duration,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            data_dir: None,
            compact_threshold: 1000,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl LedgerSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("FLEET_DATA_DIR").map(PathBuf::from),
            compact_threshold: lookup("FLEET_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compact_threshold),
            sweep_interval: lookup("FLEET_SWEEP_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
        }
    }

    pub fn wal_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join("availability.wal"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_house_policy() {
        let p = SchedulingPolicy::default();
        assert_eq!(p.opening_time.to_string(), "08:00");
        assert_eq!(p.closing_time.to_string(), "22:00");
        assert_eq!(p.hold_expiration_minutes, 15);
        assert_eq!(p.default_buffer_minutes, 60);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn env_overrides_and_ignores_garbage() {
        let p = SchedulingPolicy::from_lookup(lookup(&[
            ("FLEET_OPENING_TIME", "07:30"),
            ("FLEET_HOLD_EXPIRATION_MINUTES", "not-a-number"),
            ("FLEET_BUFFER_MINUTES", "30"),
        ]))
        .unwrap();
        assert_eq!(p.opening_time.to_string(), "07:30");
        assert_eq!(p.hold_expiration_minutes, 15);
        assert_eq!(p.default_buffer_minutes, 30);
    }

    #[test]
    fn inverted_hours_rejected() {
        let result = SchedulingPolicy::from_lookup(lookup(&[
            ("FLEET_OPENING_TIME", "22:00"),
            ("FLEET_CLOSING_TIME", "08:00"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn json_partial_document_uses_defaults() {
        let p = SchedulingPolicy::from_json_str(r#"{"closing_time": "20:00"}"#).unwrap();
        assert_eq!(p.closing_time.to_string(), "20:00");
        assert_eq!(p.opening_time.to_string(), "08:00");

        assert!(matches!(
            SchedulingPolicy::from_json_str(r#"{"closing_time": "26:00"}"#),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            SchedulingPolicy::from_json_str(r#"{"slot_interval_minutes": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn today_respects_offset() {
        let now = DateTime::parse_from_rfc3339("2026-06-15T02:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let utc = SchedulingPolicy::default();
        assert_eq!(utc.today(now), NaiveDate::from_ymd_opt(2026, 6, 15).unwrap());

        let pacific = SchedulingPolicy {
            utc_offset_minutes: -7 * 60,
            ..SchedulingPolicy::default()
        };
        assert_eq!(pacific.today(now), NaiveDate::from_ymd_opt(2026, 6, 14).unwrap());
    }

    #[test]
    fn ledger_settings_from_env() {
        let s = LedgerSettings::from_lookup(lookup(&[
            ("FLEET_DATA_DIR", "/var/lib/fleet"),
            ("FLEET_SWEEP_INTERVAL_SECS", "5"),
        ]));
        assert_eq!(s.wal_path(), Some(PathBuf::from("/var/lib/fleet/availability.wal")));
        assert_eq!(s.sweep_interval, Duration::from_secs(5));
        assert_eq!(s.compact_threshold, 1000);
        assert_eq!(LedgerSettings::default().wal_path(), None);
    }
}
