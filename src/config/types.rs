//! Configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

use herder_core::prelude::*;
use herder_core::parse_size;

/// Daemon settings (herder.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub process: ProcessSettings,

    #[serde(default)]
    pub watch: WatchSettings,
}

/// Listener settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    /// Address the command socket binds to
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Defaults applied to every `process` command
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessSettings {
    /// Output buffer size, e.g. `64k` or `1m`
    #[serde(default = "default_output")]
    pub output: String,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            output: default_output(),
        }
    }
}

impl ProcessSettings {
    pub fn output_size(&self) -> Result<usize> {
        parse_size(&self.output)
    }
}

/// Watch session settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchSettings {
    /// Sleep between polls when no watched process has new output
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl WatchSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

fn default_listen() -> String {
    "127.0.0.1:20202".to_string()
}

fn default_output() -> String {
    "1m".to_string()
}

fn default_poll_interval_ms() -> u64 {
    herder_daemon::DEFAULT_POLL_INTERVAL.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use herder_daemon::DEFAULT_OUTPUT_SIZE;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.listen, "127.0.0.1:20202");
        assert_eq!(settings.process.output_size().unwrap(), DEFAULT_OUTPUT_SIZE);
        assert_eq!(settings.watch.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings: Settings = toml::from_str("[process]\noutput = \"64k\"\n").unwrap();
        assert_eq!(settings.process.output_size().unwrap(), 64 * 1024);
        assert_eq!(settings.server.listen, "127.0.0.1:20202");
        assert_eq!(settings.watch.poll_interval_ms, 100);
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let settings: Settings = toml::from_str("[watch]\npoll_interval_ms = 0\n").unwrap();
        assert_eq!(settings.watch.poll_interval(), Duration::from_millis(1));
    }
}
