use std::fs;
use std::path::Path;

use switchboard_core::BusConfig;

/// Message type bits used by the demo
pub mod types {
    pub const READING: u64 = 0b001;
    pub const ALARM: u64 = 0b010;
    pub const CONTROL: u64 = 0b100;
}

/// Message kind bits used by the demo
pub mod kinds {
    pub const TEMPERATURE: u64 = 0b01;
    pub const HUMIDITY: u64 = 0b10;
}

/// High-level configuration for the relay demo
#[derive(Clone, Debug)]
pub struct DemoConfig {
    pub bus: BusConfig,
    /// Number of sensor nodes
    pub sensors: usize,
    /// Readings emitted per sensor
    pub readings_per_sensor: u32,
    /// Readings above this value are forwarded as alarms
    pub alarm_threshold: f64,
    /// Whether the monitor subscribes to broadcasts
    pub monitor_broadcasts: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::load(),
            sensors: std::env::var("DEMO_SENSORS")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(3),
            readings_per_sensor: std::env::var("DEMO_READINGS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(5),
            alarm_threshold: std::env::var("DEMO_ALARM_THRESHOLD")
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(30.0),
            monitor_broadcasts: true,
        }
    }
}

impl DemoConfig {
    /// Load configuration from a TOML file (path via RELAY_DEMO_CONFIG or ./relay_demo.toml),
    /// overlaying values onto defaults and env-driven defaults. The bus starts
    /// from `BusConfig::load()`; a `[bus]` table in the demo file overlays it.
    pub fn load() -> Self {
        let default = Self::default();
        let path =
            std::env::var("RELAY_DEMO_CONFIG").unwrap_or_else(|_| "relay_demo.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target = "relay_demo", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match toml::from_str::<DemoToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target = "relay_demo", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target = "relay_demo", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct DemoToml {
    pub sensors: Option<usize>,
    pub readings_per_sensor: Option<u32>,
    pub alarm_threshold: Option<f64>,
    pub monitor_broadcasts: Option<bool>,
    pub bus: Option<toml::Table>,
}

impl DemoToml {
    fn overlay(self, mut base: DemoConfig) -> DemoConfig {
        if let Some(v) = self.sensors {
            base.sensors = v;
        }
        if let Some(v) = self.readings_per_sensor {
            base.readings_per_sensor = v;
        }
        if let Some(v) = self.alarm_threshold {
            base.alarm_threshold = v;
        }
        if let Some(v) = self.monitor_broadcasts {
            base.monitor_broadcasts = v;
        }
        if let Some(table) = self.bus {
            match base.bus.clone().overlay_table(table) {
                Ok(bus) => base.bus = bus,
                Err(e) => {
                    tracing::warn!(target = "relay_demo", error = %e, "Invalid [bus] table; keeping bus defaults");
                }
            }
        }
        base
    }
}
