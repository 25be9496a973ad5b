//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`VolconSettings::default()`]
//! 2. If `~/.volcon/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `VOLCON_*` environment variable overrides (highest priority)

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::VolconSettings;

const SEND_QUEUE: RangeInclusive<u64> = 1..=65_536;
const KEEPALIVE_SECS: RangeInclusive<u64> = 1..=3600;
const SWEEP_SECS: RangeInclusive<u64> = 1..=86_400;
const TIMEOUT_MS: RangeInclusive<u64> = 0..=3_600_000;

/// Resolve the path to the settings file (`~/.volcon/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".volcon").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<VolconSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an out-of-range value
/// in the file is an error.
pub fn load_settings_from_path(path: &Path) -> Result<VolconSettings> {
    let defaults = serde_json::to_value(VolconSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: VolconSettings = serde_json::from_value(merged)?;
    validate(&settings)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Range-check the numeric settings.
pub fn validate(settings: &VolconSettings) -> Result<()> {
    check("server.maxSendQueue", settings.server.max_send_queue as u64, &SEND_QUEUE)?;
    check(
        "liveness.keepaliveIntervalSecs",
        settings.liveness.keepalive_interval_secs,
        &KEEPALIVE_SECS,
    )?;
    check("liveness.sweepIntervalSecs", settings.liveness.sweep_interval_secs, &SWEEP_SECS)?;
    check("requests.timeoutMs", settings.requests.timeout_ms, &TIMEOUT_MS)
}

fn check(key: &'static str, value: u64, range: &RangeInclusive<u64>) -> Result<()> {
    if range.contains(&value) {
        return Ok(());
    }
    Err(SettingsError::InvalidValue {
        key,
        value,
        min: *range.start(),
        max: *range.end(),
    })
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per key, everything else is replaced by `source`.
/// Nulls in `source` leave `target` untouched.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `VOLCON_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut VolconSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary lookup. Invalid values are logged and ignored.
pub fn apply_overrides<F>(settings: &mut VolconSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.string("VOLCON_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("VOLCON_PORT", |s| parse_u16_range(s, 0, 65535)) {
        settings.server.port = v;
    }
    if let Some(v) = env.parsed("VOLCON_MAX_SEND_QUEUE", |s| in_range(s, &SEND_QUEUE)) {
        settings.server.max_send_queue = v as usize;
    }
    if let Some(v) = env.parsed("VOLCON_KEEPALIVE_INTERVAL_SECS", |s| in_range(s, &KEEPALIVE_SECS)) {
        settings.liveness.keepalive_interval_secs = v;
    }
    if let Some(v) = env.parsed("VOLCON_SWEEP_INTERVAL_SECS", |s| in_range(s, &SWEEP_SECS)) {
        settings.liveness.sweep_interval_secs = v;
    }
    if let Some(v) = env.parsed("VOLCON_REQUEST_TIMEOUT_MS", |s| in_range(s, &TIMEOUT_MS)) {
        settings.requests.timeout_ms = v;
    }
    if let Some(v) = env.string("VOLCON_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("VOLCON_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(val.trim());
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn in_range(val: &str, range: &RangeInclusive<u64>) -> Option<u64> {
    parse_u64_range(val, *range.start(), *range.end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 3000, "host": "0.0.0.0"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn merge_skips_nulls() {
        let merged = deep_merge(
            serde_json::json!({"logging": {"level": "info"}}),
            serde_json::json!({"logging": {"level": null}}),
        );
        assert_eq!(merged["logging"]["level"], "info");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.requests.timeout_ms, 30_000);
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"liveness":{"keepaliveIntervalSecs":5}}"#).unwrap();
        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.liveness.keepalive_interval_secs, 5);
        assert_eq!(settings.liveness.sweep_interval_secs, 60);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn out_of_range_file_value_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server":{"maxSendQueue":0}}"#).unwrap();

        match load_settings_from_path(&path) {
            Err(SettingsError::InvalidValue { key, value, min, .. }) => {
                assert_eq!(key, "server.maxSendQueue");
                assert_eq!(value, 0);
                assert_eq!(min, 1);
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn defaults_pass_validation() {
        assert!(validate(&VolconSettings::default()).is_ok());
        let mut settings = VolconSettings::default();
        settings.requests.timeout_ms = 3_600_001;
        assert!(matches!(
            validate(&settings),
            Err(SettingsError::InvalidValue { key: "requests.timeoutMs", .. })
        ));
    }

    #[test]
    fn unreadable_path_reports_io_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory exists but cannot be read as a file.
        assert!(matches!(
            load_settings_from_path(dir.path()),
            Err(SettingsError::Io { .. })
        ));
    }

    #[test]
    fn overrides_apply_valid_values() {
        let mut settings = VolconSettings::default();
        apply_overrides(
            &mut settings,
            lookup(&[
                ("VOLCON_HOST", "127.0.0.1"),
                ("VOLCON_PORT", "8080"),
                ("VOLCON_REQUEST_TIMEOUT_MS", "0"),
                ("VOLCON_LOG_JSON", "yes"),
            ]),
        );
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.requests.timeout(), None);
        assert!(settings.logging.json);
    }

    #[test]
    fn overrides_ignore_invalid_values() {
        let mut settings = VolconSettings::default();
        apply_overrides(
            &mut settings,
            lookup(&[
                ("VOLCON_PORT", "99999"),
                ("VOLCON_KEEPALIVE_INTERVAL_SECS", "0"),
                ("VOLCON_LOG_JSON", "maybe"),
                ("VOLCON_HOST", ""),
            ]),
        );
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.liveness.keepalive_interval_secs, 20);
        assert!(!settings.logging.json);
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    #[test]
    fn parse_helpers() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("2"), None);
        assert_eq!(parse_u16_range("0", 0, 10), Some(0));
        assert_eq!(parse_u64_range("11", 0, 10), None);
        assert_eq!(in_range("-1", &SEND_QUEUE), None);
        assert_eq!(in_range("65536", &SEND_QUEUE), Some(65_536));
    }
}
