//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use ps_proto::to_id;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("bot.name is required")]
    MissingBotName,
    #[error("bot.command_token must not be empty")]
    EmptyCommandToken,
    #[error("bot.command_token must not contain whitespace, got '{0}'")]
    InvalidCommandToken(String),
    #[error("bot.rooms entry '{0}' has no valid room id")]
    InvalidRoom(String),
    #[error("server.host is required")]
    MissingHost,
    #[error("server.port must be non-zero")]
    InvalidPort,
    #[error("login.url must be an http(s) URL, got '{0}'")]
    InvalidLoginUrl(String),
    #[error("log.level is not a valid filter: {0}")]
    InvalidLogLevel(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Bot identity
    if to_id(&config.bot.name).is_empty() {
        errors.push(ValidationError::MissingBotName);
    }
    let token = &config.bot.command_token;
    if token.is_empty() {
        errors.push(ValidationError::EmptyCommandToken);
    } else if token.chars().any(char::is_whitespace) {
        errors.push(ValidationError::InvalidCommandToken(token.clone()));
    }
    for room in &config.bot.rooms {
        if to_id(room).is_empty() {
            errors.push(ValidationError::InvalidRoom(room.clone()));
        }
    }

    // Server
    if config.server.host.trim().is_empty() {
        errors.push(ValidationError::MissingHost);
    }
    if config.server.port == 0 {
        errors.push(ValidationError::InvalidPort);
    }

    // Login endpoint
    let url = &config.login.url;
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        errors.push(ValidationError::InvalidLoginUrl(url.clone()));
    }

    if let Err(e) = EnvFilter::try_new(&config.log.level) {
        errors.push(ValidationError::InvalidLogLevel(e.to_string()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
