//! Configuration file parsing for herder
//!
//! Supports:
//! - `herder.toml` - Daemon settings (listen address, default buffer size,
//!   watch polling)

pub mod settings;
pub mod types;

pub use settings::{default_config_path, load_settings, CONFIG_FILENAME};
pub use types::*;
