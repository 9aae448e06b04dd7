//! Settings file loader

use std::path::{Path, PathBuf};

use herder_core::prelude::*;

use super::types::Settings;

pub const CONFIG_FILENAME: &str = "herder.toml";

/// `<config_dir>/herder/herder.toml`, if the platform has a config directory
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("herder").join(CONFIG_FILENAME))
}

/// Load settings from `config_path`
///
/// Returns default settings if the file doesn't exist or can't be parsed.
/// An unparseable `process.output` size falls back to the default size.
pub fn load_settings(config_path: &Path) -> Settings {
    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    let mut settings: Settings = match std::fs::read_to_string(config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                return Settings::default();
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            return Settings::default();
        }
    };

    if let Err(e) = settings.process.output_size() {
        warn!("{} in {:?}; using the default output size", e, config_path);
        settings.process = Default::default();
    }

    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let settings = load_settings(&dir.path().join(CONFIG_FILENAME));
        assert_eq!(settings.server.listen, "127.0.0.1:20202");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            r#"
[server]
listen = "0.0.0.0:9000"

[process]
output = "2k"

[watch]
poll_interval_ms = 25
"#,
        )
        .unwrap();

        let settings = load_settings(&path);
        assert_eq!(settings.server.listen, "0.0.0.0:9000");
        assert_eq!(settings.process.output_size().unwrap(), 2048);
        assert_eq!(settings.watch.poll_interval_ms, 25);
    }

    #[test]
    fn test_invalid_toml_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[server\nlisten = ").unwrap();

        let settings = load_settings(&path);
        assert_eq!(settings.server.listen, "127.0.0.1:20202");
    }

    #[test]
    fn test_invalid_output_size_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[process]\noutput = \"lots\"\n[watch]\npoll_interval_ms = 5\n")
            .unwrap();

        let settings = load_settings(&path);
        assert_eq!(settings.process.output, "1m");
        assert_eq!(settings.watch.poll_interval_ms, 5);
    }

    #[test]
    fn test_default_config_path_file_name() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("herder/herder.toml"));
        }
    }
}
