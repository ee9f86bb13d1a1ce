//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Config struct definitions (Config, BotConfig, ServerConfig, LoginConfig, LogConfig)
//! - [`defaults`]: serde default value functions
//! - [`validation`]: startup checks returning every problem found
//! - [`rooms`]: the saved list of rooms joined at runtime

mod defaults;
mod rooms;
mod types;
mod validation;

pub use types::{
    BotConfig, Config, ConfigError, LogConfig, LogFormat, LoginConfig, ServerConfig,
};
pub use rooms::{DEFAULT_ROOMS_FILE, RoomsFile};
pub use validation::{ValidationError, validate};
