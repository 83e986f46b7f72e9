use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::{BusError, EdgeMask, Result};

/// Bus-wide settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusConfig {
    /// Name used in log fields to tell buses apart.
    pub name: String,
    /// Masks applied by `listen_to_all` and `set_receives_all_broadcasts`.
    pub default_type_mask: u64,
    pub default_message_mask: u64,
    /// Log operations naming an unknown node at warn instead of debug.
    pub warn_on_unknown_node: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            name: std::env::var("SWITCHBOARD_BUS_NAME")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "switchboard".to_string()),
            default_type_mask: !0,
            default_message_mask: !0,
            warn_on_unknown_node: std::env::var("SWITCHBOARD_WARN_UNKNOWN")
                .ok()
                .and_then(|v| v.parse::<bool>().ok())
                .unwrap_or(false),
        }
    }
}

impl BusConfig {
    /// Default edge mask built from the configured type/message masks.
    pub fn default_mask(&self) -> EdgeMask {
        EdgeMask::new(self.default_type_mask, self.default_message_mask)
    }

    /// Parses a TOML document and overlays it onto the env-driven defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let t: BusToml = toml::from_str(s)?;
        t.overlay(Self::default())
    }

    /// Overlays an already parsed TOML table, e.g. a `[bus]` section embedded
    /// in an application's own config file.
    pub fn overlay_table(self, table: toml::Table) -> Result<Self> {
        let t: BusToml = toml::Value::Table(table).try_into()?;
        t.overlay(self)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    /// Load configuration from a TOML file (path via SWITCHBOARD_CONFIG or
    /// ./switchboard.toml), falling back to defaults when it is missing or broken.
    pub fn load() -> Self {
        let path =
            std::env::var("SWITCHBOARD_CONFIG").unwrap_or_else(|_| "switchboard.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target = "switchboard", path = %path, "No TOML config found; using defaults/env");
            return Self::default();
        }
        match Self::from_file(p) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(target = "switchboard", error = %e, "Failed to load TOML; using defaults");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BusToml {
    name: Option<String>,
    default_type_mask: Option<u64>,
    default_message_mask: Option<u64>,
    warn_on_unknown_node: Option<bool>,
}

impl BusToml {
    fn overlay(self, mut base: BusConfig) -> Result<BusConfig> {
        if let Some(name) = self.name {
            if name.trim().is_empty() {
                return Err(BusError::Config("bus name must not be empty".into()));
            }
            base.name = name;
        }
        if let Some(v) = self.default_type_mask {
            base.default_type_mask = v;
        }
        if let Some(v) = self.default_message_mask {
            base.default_message_mask = v;
        }
        if let Some(v) = self.warn_on_unknown_node {
            base.warn_on_unknown_node = v;
        }
        Ok(base)
    }
}
