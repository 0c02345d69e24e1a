//! Configuration for the simulated display server.

use std::path::Path;

use serde::{Deserialize, Serialize};

use vdisp_core::transport::resolve_name;
use vdisp_core::{
    BLIT_2D_MODE, DisplayInfo, Point, STANDBY_BROADCAST_MODE, ServerOptions, VirtualDisplay,
};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Protocol behaviour.
    pub server: ServerConfig,
    /// Declared geometry.
    pub display: DisplayConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP address to accept control clients on.
    pub listen_address: String,
}

/// Protocol behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server name; relative names resolve under `/`.
    pub name: String,
    /// Modes accepted by `set_display_server_mode`.
    pub modes: Vec<String>,
    /// Mode broadcast at startup.
    pub initial_mode: String,
    /// Set to `false` to make `get_display_info` fail.
    pub serve_display_info: bool,
}

/// Framebuffer and virtual display layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    /// Viewports as `[x, y]` vertex lists.
    pub virtual_displays: Vec<VirtualDisplay>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:7340".into(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "display_server".into(),
            modes: vec![STANDBY_BROADCAST_MODE.into(), BLIT_2D_MODE.into()],
            initial_mode: STANDBY_BROADCAST_MODE.into(),
            serve_display_info: true,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        let quad = |x0, x1| {
            vec![
                Point::new(x0, 0),
                Point::new(x1, 0),
                Point::new(x1, 1079),
                Point::new(x0, 1079),
            ]
        };
        Self {
            width: 1920,
            height: 1080,
            virtual_displays: vec![
                VirtualDisplay::new("left", quad(0, 959)),
                VirtualDisplay::new("right", quad(960, 1919)),
            ],
        }
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

impl SimConfig {
    /// Load configuration from a TOML file, falling back to defaults.
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

    pub fn display_info(&self) -> DisplayInfo {
        DisplayInfo::new(
            self.display.width,
            self.display.height,
            self.display.virtual_displays.clone(),
        )
    }

    /// Convert into the server's construction options.
    pub fn to_server_options(&self) -> ServerOptions {
        for vd in &self.display.virtual_displays {
            if !vd.is_valid_for(self.display.width, self.display.height) {
                tracing::warn!("virtual display {} lies outside the framebuffer", vd.id);
            }
        }
        ServerOptions {
            name: resolve_name("/", &self.server.name),
            info: self.display_info(),
            modes: self.server.modes.clone(),
            initial_mode: self.server.initial_mode.clone(),
            serve_display_info: self.server.serve_display_info,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = SimConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("listen_address"));
        assert!(text.contains("virtual_displays"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = SimConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: SimConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.display.width, 1920);
        assert_eq!(parsed.display.virtual_displays, cfg.display.virtual_displays);
        assert_eq!(parsed.server.modes, cfg.server.modes);
    }

    #[test]
    fn viewports_parse_as_pairs() {
        let text = r#"
            [display]
            width = 100
            height = 50

            [[display.virtual_displays]]
            id = "full"
            viewport = [[0, 0], [99, 0], [99, 49], [0, 49]]
        "#;
        let cfg: SimConfig = toml::from_str(text).unwrap();
        let info = cfg.display_info();
        assert_eq!(info.virtual_displays[0].viewport[2], Point::new(99, 49));
        assert_eq!(cfg.network.listen_address, "0.0.0.0:7340");
    }

    #[test]
    fn server_name_is_resolved() {
        let mut cfg = SimConfig::default();
        assert_eq!(cfg.to_server_options().name, "/display_server");
        cfg.server.name = "/lab/dome".into();
        assert_eq!(cfg.to_server_options().name, "/lab/dome");
        cfg.server.name = String::new();
        assert_eq!(cfg.to_server_options().name, "/display_server");
    }

    #[test]
    fn generated_default_loads_back() {
        let path = std::env::temp_dir().join(format!("vdisp-sim-{}.toml", std::process::id()));
        std::fs::write(&path, SimConfig::default_toml().unwrap()).unwrap();
        let cfg = SimConfig::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(cfg.display.virtual_displays.len(), 2);
    }
}
