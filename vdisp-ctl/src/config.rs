//! Control CLI configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vdisp_core::ClientOptions;

/// Top-level configuration for the control CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CtlConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Which display server to drive.
    pub server: ServerConfig,
    /// Mode broadcast waits.
    pub wait: WaitConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Display server address (IP:port).
    pub server_address: String,
    /// Connect and per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

/// Display server selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server name; relative names resolve under `/`.
    pub name: String,
    /// Read geometry from the parameter store instead of the server.
    pub prefer_param_store: bool,
    /// Block until the server's endpoints appear.
    pub wait_for_server: bool,
}

/// Mode broadcast waits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    /// Give up waiting for a mode broadcast after this long. 0 waits forever.
    pub timeout_ms: u64,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1:7340".into(),
            timeout_ms: 5000,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "display_server".into(),
            prefer_param_store: false,
            wait_for_server: false,
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl CtlConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// The default configuration as TOML, for `--gen-config`.
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&Self::default())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.network.timeout_ms)
    }

    /// Client options for the configured server.
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            prefer_param_store: self.server.prefer_param_store,
            wait_for_server: self.server.wait_for_server,
            wait_timeout: (self.wait.timeout_ms > 0)
                .then(|| Duration::from_millis(self.wait.timeout_ms)),
            ..ClientOptions::default()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
