// config.rs

use crate::midi::{ClockMode, PortOptions, Result, DEFAULT_CLOCK_MOD, DEFAULT_PPQN};
use ::config::{Config, Environment, File};
use log::{debug, info};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CLIENT_NAME: &str = "midibusrs";
pub const DEFAULT_MANUAL_PORT_COUNT: usize = 16;
pub const DEFAULT_WATCH_INTERVAL_MS: u64 = 1000;

/// Clock mode wanted for one output port, matched by port name.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputPortSetting {
    pub port: String,
    #[serde(default)]
    pub clock: ClockMode,
}

/// Input state wanted for one input port, matched by port name.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InputPortSetting {
    pub port: String,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortSettings {
    pub client_name: String,
    pub ppqn: u32,
    pub clock_mod: i64,
    /// Create virtual ports instead of connecting to hardware
    pub manual_ports: bool,
    pub manual_port_count: usize,
    pub log_dir: Option<PathBuf>,
    pub log_level: String,
    pub watch_interval_ms: u64,
    #[serde(default)]
    pub outputs: Vec<OutputPortSetting>,
    #[serde(default)]
    pub inputs: Vec<InputPortSetting>,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            ppqn: DEFAULT_PPQN,
            clock_mod: DEFAULT_CLOCK_MOD,
            manual_ports: false,
            manual_port_count: DEFAULT_MANUAL_PORT_COUNT,
            log_dir: None,
            log_level: "debug".to_string(),
            watch_interval_ms: DEFAULT_WATCH_INTERVAL_MS,
            outputs: Vec::new(),
            inputs: Vec::new(),
        }
    }
}

impl PortSettings {
    /// Loads settings from defaults, then the optional file, then
    /// `MIDIBUS_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("client_name", DEFAULT_CLIENT_NAME)?
            .set_default("ppqn", i64::from(DEFAULT_PPQN))?
            .set_default("clock_mod", DEFAULT_CLOCK_MOD)?
            .set_default("manual_ports", false)?
            .set_default("manual_port_count", DEFAULT_MANUAL_PORT_COUNT as i64)?
            .set_default("log_level", "debug")?
            .set_default("watch_interval_ms", DEFAULT_WATCH_INTERVAL_MS as i64)?;

        if let Some(path) = path {
            info!("Loading port settings from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(Environment::with_prefix("MIDIBUS"));

        let settings: PortSettings = builder.build()?.try_deserialize()?;
        debug!(
            "Port settings: ppqn={}, clock_mod={}, {} output and {} input entries",
            settings.ppqn,
            settings.clock_mod,
            settings.outputs.len(),
            settings.inputs.len()
        );
        Ok(settings)
    }

    /// Configured clock for a port; `Off` when the port is not listed.
    pub fn clock_for(&self, port_name: &str) -> ClockMode {
        self.outputs
            .iter()
            .find(|setting| setting.port == port_name)
            .map(|setting| setting.clock)
            .unwrap_or_default()
    }

    /// Configured input state for a port; disabled when not listed.
    pub fn input_enabled(&self, port_name: &str) -> bool {
        self.inputs
            .iter()
            .find(|setting| setting.port == port_name)
            .is_some_and(|setting| setting.enabled)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms.max(10))
    }

    /// Backend options with a fresh port id table. Build them once and
    /// clone, so every user of the backend shares the table.
    pub fn port_options(&self) -> PortOptions {
        PortOptions {
            client_name: self.client_name.clone(),
            ppqn: self.ppqn,
            clock_mod: self.clock_mod,
            ..PortOptions::default()
        }
    }
}
