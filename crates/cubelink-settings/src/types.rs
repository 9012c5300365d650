//! Settings types.
//!
//! All structs deserialize from the camelCase JSON used in
//! `~/.cubelink/settings.json`; missing fields fall back to [`Default`].

use std::fmt;
use std::time::Duration;

use cubelink_core::constants::{
    DEFAULT_AUTO_DISCONNECT_DELAY_MS, DEFAULT_AUTO_RECONNECT_INTERVAL_MS,
    DEFAULT_CALL_TIMEOUT_MS, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_PING_INTERVAL_MS, DEFAULT_PORT,
    DEFAULT_RECONNECT_FAILSAFE_MS,
};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Where and how to connect.
    pub connection: ConnectionSettings,
    /// Timer durations.
    pub timing: TimingSettings,
}

impl ClientSettings {
    /// Reject values the client cannot run with.
    ///
    /// An unconfigured host is not an error here; it surfaces as a failed
    /// connect attempt instead.
    pub fn validate(&self) -> Result<()> {
        self.timing.validate()
    }
}

/// URL scheme selected by [`ConnectionSettings::tls_enabled`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme {
    /// Plain `ws://`.
    Ws,
    /// TLS `wss://`.
    Wss,
}

impl Scheme {
    /// Scheme string without the separator.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ws => "ws",
            Self::Wss => "wss",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server address, credentials and transport flags.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Password sent in the `authenticate` request.
    pub password: String,
    /// Connect with `wss://`.
    pub tls_enabled: bool,
    /// Accept any server certificate when TLS is enabled.
    pub cert_validation_disabled: bool,
    /// Ask the server for per-message compression.
    pub compression_enabled: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            password: String::new(),
            tls_enabled: false,
            cert_validation_disabled: false,
            compression_enabled: false,
        }
    }
}

// Password stays out of logs.
impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("tls_enabled", &self.tls_enabled)
            .field("cert_validation_disabled", &self.cert_validation_disabled)
            .field("compression_enabled", &self.compression_enabled)
            .finish()
    }
}

impl ConnectionSettings {
    /// Whether a host and a usable port are set.
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty() && self.port != 0
    }

    /// Scheme implied by the TLS flag.
    pub fn scheme(&self) -> Scheme {
        if self.tls_enabled { Scheme::Wss } else { Scheme::Ws }
    }

    /// Full server URL, e.g. `ws://127.0.0.1:7905`.
    pub fn url(&self) -> String {
        let host = self.host.trim();
        if host.contains(':') && !host.starts_with('[') {
            format!("{}://[{host}]:{}", self.scheme(), self.port)
        } else {
            format!("{}://{host}:{}", self.scheme(), self.port)
        }
    }
}

/// Timer durations in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimingSettings {
    /// Upper bound on opening the socket.
    pub connect_timeout_ms: u64,
    /// Gap between a ping reply and the next ping; also the reply deadline.
    pub ping_interval_ms: u64,
    /// Delay before a scheduled reconnect.
    pub auto_reconnect_interval_ms: u64,
    /// Delay before reconnecting after network availability is signalled.
    pub reconnect_failsafe_ms: u64,
    /// Grace period after the last subscriber leaves.
    pub auto_disconnect_delay_ms: u64,
    /// Age at which an outstanding call times out.
    pub call_timeout_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            ping_interval_ms: DEFAULT_PING_INTERVAL_MS,
            auto_reconnect_interval_ms: DEFAULT_AUTO_RECONNECT_INTERVAL_MS,
            reconnect_failsafe_ms: DEFAULT_RECONNECT_FAILSAFE_MS,
            auto_disconnect_delay_ms: DEFAULT_AUTO_DISCONNECT_DELAY_MS,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
        }
    }
}

impl TimingSettings {
    /// Connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Ping interval.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Auto-reconnect delay.
    pub fn auto_reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.auto_reconnect_interval_ms)
    }

    /// Network-available failsafe delay.
    pub fn reconnect_failsafe(&self) -> Duration {
        Duration::from_millis(self.reconnect_failsafe_ms)
    }

    /// Auto-disconnect grace period.
    pub fn auto_disconnect_delay(&self) -> Duration {
        Duration::from_millis(self.auto_disconnect_delay_ms)
    }

    /// Call timeout.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        let fields = [
            ("connectTimeoutMs", self.connect_timeout_ms),
            ("pingIntervalMs", self.ping_interval_ms),
            ("autoReconnectIntervalMs", self.auto_reconnect_interval_ms),
            ("callTimeoutMs", self.call_timeout_ms),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(SettingsError::ZeroDuration { field: name });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn camel_case_round_trip() {
        let json = serde_json::to_value(ClientSettings::default()).unwrap();
        assert_eq!(json["connection"]["tlsEnabled"], false);
        assert_eq!(json["connection"]["certValidationDisabled"], false);
        assert_eq!(json["timing"]["autoDisconnectDelayMs"], 10_000);
        assert_eq!(json["timing"]["reconnectFailsafeMs"], 2_000);
        let back: ClientSettings = serde_json::from_value(json).unwrap();
        assert_eq!(back, ClientSettings::default());
    }

    #[test]
    fn partial_document_fills_defaults() {
        let settings: ClientSettings =
            serde_json::from_str(r#"{"connection":{"host":"media.local"}}"#).unwrap();
        assert_eq!(settings.connection.host, "media.local");
        assert_eq!(settings.connection.port, DEFAULT_PORT);
        assert_eq!(settings.timing, TimingSettings::default());
    }

    #[test]
    fn url_follows_tls_flag() {
        let mut conn = ConnectionSettings {
            host: "media.local".into(),
            port: 7905,
            ..ConnectionSettings::default()
        };
        assert_eq!(conn.url(), "ws://media.local:7905");
        conn.tls_enabled = true;
        assert_eq!(conn.scheme(), Scheme::Wss);
        assert_eq!(conn.url(), "wss://media.local:7905");
    }

    #[test]
    fn url_brackets_ipv6() {
        let conn = ConnectionSettings {
            host: "::1".into(),
            ..ConnectionSettings::default()
        };
        assert_eq!(conn.url(), "ws://[::1]:7905");
    }

    #[test]
    fn configured_needs_host_and_port() {
        let mut conn = ConnectionSettings::default();
        assert!(conn.is_configured());
        conn.host = "  ".into();
        assert!(!conn.is_configured());
        conn.host = "h".into();
        conn.port = 0;
        assert!(!conn.is_configured());
    }

    #[test]
    fn debug_hides_password() {
        let conn = ConnectionSettings {
            password: "hunter2".into(),
            ..ConnectionSettings::default()
        };
        let rendered = format!("{conn:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn durations() {
        let timing = TimingSettings::default();
        assert_eq!(timing.connect_timeout(), Duration::from_secs(5));
        assert_eq!(timing.ping_interval(), Duration::from_millis(3_500));
        assert_eq!(timing.auto_reconnect_interval(), Duration::from_secs(2));
        assert_eq!(timing.reconnect_failsafe(), Duration::from_secs(2));
        assert_eq!(timing.auto_disconnect_delay(), Duration::from_secs(10));
        assert_eq!(timing.call_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn zero_ping_interval_is_invalid() {
        let mut settings = ClientSettings::default();
        settings.timing.ping_interval_ms = 0;
        assert_matches!(
            settings.validate(),
            Err(SettingsError::ZeroDuration {
                field: "pingIntervalMs"
            })
        );
    }

    #[test]
    fn zero_grace_period_is_allowed() {
        let mut settings = ClientSettings::default();
        settings.timing.auto_disconnect_delay_ms = 0;
        settings.timing.reconnect_failsafe_ms = 0;
        assert!(settings.validate().is_ok());
    }
}
