//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

// =============================================================================
// Bot Defaults
// =============================================================================

pub fn default_command_token() -> String {
    "!".to_string()
}

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_host() -> String {
    "sim3".to_string()
}

pub fn default_port() -> u16 {
    443
}

pub fn default_send_delay_ms() -> u64 {
    100
}

pub fn default_reconnect_delay_secs() -> u64 {
    60
}

pub fn default_query_timeout_ms() -> u64 {
    5000
}

// =============================================================================
// Login / Log Defaults
// =============================================================================

pub fn default_login_url() -> String {
    "https://play.pokemonshowdown.com/action.php".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}
