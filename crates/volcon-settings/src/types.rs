//! Settings sections.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings object, stored as `~/.volcon/settings.json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VolconSettings {
    pub server: ServerSettings,
    pub liveness: LivenessSettings,
    pub requests: RequestSettings,
    pub logging: LoggingSettings,
}

/// HTTP + WebSocket listener.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Port serving both the HTTP API and device WebSockets.
    pub port: u16,
    /// Outbound frames buffered per connection before sends fail.
    pub max_send_queue: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_send_queue: 64,
        }
    }
}

/// Keep-alive probing and stale-connection pruning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LivenessSettings {
    /// Per-connection keep-alive period.
    pub keepalive_interval_secs: u64,
    /// Registry-wide sweep period for closed handles.
    pub sweep_interval_secs: u64,
}

impl Default for LivenessSettings {
    fn default() -> Self {
        Self {
            keepalive_interval_secs: 20,
            sweep_interval_secs: 60,
        }
    }
}

impl LivenessSettings {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs.max(1))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Outstanding command policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestSettings {
    /// Reject a command that has no reply after this long. `0` disables.
    pub timeout_ms: u64,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

impl RequestSettings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level. `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
