//! Rooms joined at runtime, remembered across restarts.
//!
//! Stored as a JSON array of room ids, by default in `rooms.json` next to
//! the TOML config. A missing or unreadable file means no saved rooms.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::types::ConfigError;

/// File name used when the config does not set `bot.rooms_file`.
pub const DEFAULT_ROOMS_FILE: &str = "rooms.json";

/// Location of the saved room list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomsFile {
    path: PathBuf,
}

impl RoomsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `rooms.json` in the same directory as `config_path`.
    pub fn beside(config_path: impl AsRef<Path>) -> Self {
        Self::new(config_path.as_ref().with_file_name(DEFAULT_ROOMS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Saved room ids. Problems are logged and yield an empty set.
    pub fn load(&self) -> BTreeSet<String> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No saved rooms");
                return BTreeSet::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot read saved rooms");
                return BTreeSet::new();
            }
        };
        match serde_json::from_str::<Vec<String>>(&content) {
            Ok(rooms) => rooms.iter().map(|room| ps_proto::to_id(room)).collect(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring malformed saved rooms");
                BTreeSet::new()
            }
        }
    }

    /// Overwrite the file with `rooms`.
    pub fn save(&self, rooms: &BTreeSet<String>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(rooms)?;
        // Write then rename so a crash never leaves a truncated list
        let staging = self.path.with_extension("json.tmp");
        std::fs::write(&staging, json)?;
        std::fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = RoomsFile::new(dir.path().join("rooms.json"));
        assert!(file.load().is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = RoomsFile::beside(dir.path().join("config.toml"));
        assert_eq!(file.path(), dir.path().join("rooms.json"));

        let rooms: BTreeSet<String> = ["techcode", "lobby"].map(String::from).into();
        file.save(&rooms).unwrap();
        assert_eq!(file.load(), rooms);

        file.save(&BTreeSet::new()).unwrap();
        assert!(file.load().is_empty());
    }

    #[test]
    fn entries_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let file = RoomsFile::new(dir.path().join("rooms.json"));
        std::fs::write(file.path(), r#"["Tech Code", "lobby"]"#).unwrap();
        let loaded: Vec<String> = file.load().into_iter().collect();
        assert_eq!(loaded, vec!["lobby", "techcode"]);
    }

    #[test]
    fn malformed_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let file = RoomsFile::new(dir.path().join("rooms.json"));
        std::fs::write(file.path(), "{not json").unwrap();
        assert!(file.load().is_empty());
    }
}
