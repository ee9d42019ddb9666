use crate::capture::{CaptureMode, ControllerConfig, DeviceFilter, DISCARD_WINDOW};
use crate::error::ConfigError;
use crate::storage::writer::DEFAULT_QUEUE_DEPTH;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:data/amua.db";
pub const DEFAULT_RECORDINGS_DIR: &str = "recordings";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub recordings_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub discard_window: Duration,
    pub queue_depth: usize,
    /// Bluetooth addresses allowed to connect; empty allows any device.
    pub device_addresses: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let recordings_dir = PathBuf::from(DEFAULT_RECORDINGS_DIR);
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            temp_dir: recordings_dir.join(".capture"),
            recordings_dir,
            discard_window: DISCARD_WINDOW,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            device_addresses: Vec::new(),
        }
    }
}

fn parse<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    let parsed = value.trim().parse::<T>();
    parsed.map_err(|_| ConfigError::InvalidValue { key, value })
}

impl Config {
    /// Read settings from the process environment (after `.env` has been
    /// loaded by the caller).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(url) = lookup("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(dir) = lookup("RECORDINGS_DIR") {
            config.recordings_dir = PathBuf::from(dir);
            config.temp_dir = config.recordings_dir.join(".capture");
        }
        if let Some(dir) = lookup("CAPTURE_TEMP_DIR") {
            config.temp_dir = PathBuf::from(dir);
        }
        if let Some(ms) = lookup("DISCARD_WINDOW_MS") {
            config.discard_window = Duration::from_millis(parse("DISCARD_WINDOW_MS", ms)?);
        }
        if let Some(depth) = lookup("WRITE_QUEUE_DEPTH") {
            let depth: usize = parse("WRITE_QUEUE_DEPTH", depth)?;
            if depth == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "WRITE_QUEUE_DEPTH",
                    value: depth.to_string(),
                });
            }
            config.queue_depth = depth;
        }
        if let Some(addresses) = lookup("DEVICE_ADDRESSES") {
            config.device_addresses = addresses
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(config)
    }

    pub fn device_filter(&self) -> DeviceFilter {
        DeviceFilter::new(&self.device_addresses)
    }

    pub fn controller_config(&self, mode: CaptureMode) -> ControllerConfig {
        let mut config = ControllerConfig::new(&self.temp_dir);
        config.discard_window = self.discard_window;
        config.queue_depth = self.queue_depth;
        config.mode = mode;
        config
    }
}
