//! Layered settings loading.
//!
//! Defaults are serialized to JSON, the user file is deep-merged over them,
//! and the result is deserialized back before `CUBELINK_*` variables are
//! applied on top. Merge semantics:
//! - objects merge per key, recursively
//! - arrays and primitives from the file replace the default
//! - `null` in the file keeps the default

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::ClientSettings;

/// `~/.cubelink/settings.json`, falling back to `/tmp` without `HOME`.
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".cubelink").join("settings.json")
}

/// Load from [`settings_path`] and the process environment.
pub fn load_settings() -> Result<ClientSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path` and the process environment.
///
/// A missing file yields defaults; unreadable JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ClientSettings> {
    load_layered(path, |name| std::env::var(name).ok())
}

fn load_layered(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<ClientSettings> {
    let defaults = serde_json::to_value(ClientSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "no settings file, using defaults");
        defaults
    };

    let mut settings: ClientSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, &EnvReader { lookup });
    settings.validate()?;
    Ok(settings)
}

/// Merge `source` over `target`.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, incoming) in source_map.into_iter().filter(|(_, v)| !v.is_null()) {
                let merged = match target_map.remove(&key) {
                    Some(existing) => deep_merge(existing, incoming),
                    None => incoming,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CUBELINK_*` variables to `settings`; invalid values are logged
/// and skipped.
fn apply_overrides<F: Fn(&str) -> Option<String>>(settings: &mut ClientSettings, env: &EnvReader<F>) {
    // ── Connection ──────────────────────────────────────────────────
    let conn = &mut settings.connection;
    if let Some(v) = env.string("CUBELINK_HOST") {
        conn.host = v;
    }
    if let Some(v) = env.u16("CUBELINK_PORT", 1, u16::MAX) {
        conn.port = v;
    }
    if let Some(v) = env.raw("CUBELINK_PASSWORD") {
        conn.password = v;
    }
    if let Some(v) = env.bool("CUBELINK_TLS") {
        conn.tls_enabled = v;
    }
    if let Some(v) = env.bool("CUBELINK_CERT_VALIDATION_DISABLED") {
        conn.cert_validation_disabled = v;
    }
    if let Some(v) = env.bool("CUBELINK_COMPRESSION") {
        conn.compression_enabled = v;
    }

    // ── Timing ──────────────────────────────────────────────────────
    let timing = &mut settings.timing;
    if let Some(v) = env.u64("CUBELINK_CONNECT_TIMEOUT_MS", 100, 120_000) {
        timing.connect_timeout_ms = v;
    }
    if let Some(v) = env.u64("CUBELINK_PING_INTERVAL_MS", 100, 600_000) {
        timing.ping_interval_ms = v;
    }
    if let Some(v) = env.u64("CUBELINK_AUTO_RECONNECT_INTERVAL_MS", 100, 600_000) {
        timing.auto_reconnect_interval_ms = v;
    }
    if let Some(v) = env.u64("CUBELINK_RECONNECT_FAILSAFE_MS", 0, 600_000) {
        timing.reconnect_failsafe_ms = v;
    }
    if let Some(v) = env.u64("CUBELINK_AUTO_DISCONNECT_DELAY_MS", 0, 3_600_000) {
        timing.auto_disconnect_delay_ms = v;
    }
    if let Some(v) = env.u64("CUBELINK_CALL_TIMEOUT_MS", 1_000, 3_600_000) {
        timing.call_timeout_ms = v;
    }
}

// ── Pure parsers ────────────────────────────────────────────────────────────

/// Parse `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, ignoring case.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u16` within `min..=max`.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    val.trim().parse().ok().filter(|n| (min..=max).contains(n))
}

/// Parse a `u64` within `min..=max`.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    val.trim().parse().ok().filter(|n| (min..=max).contains(n))
}

// ── Variable lookup ─────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
    }

    fn string(&self, name: &str) -> Option<String> {
        self.raw(name).filter(|v| !v.trim().is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let val = self.raw(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "bool", parse_bool)
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_u64_range(v, min, max))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
