//! User cache backed by `userdetails` responses.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ps_proto::{Rank, to_id};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// A user's standing in one room, as listed by `userdetails`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomMembership {
    pub rank: Rank,
    pub is_private: bool,
}

/// A known user.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    /// Global rank.
    pub group: Rank,
    pub avatar: Option<String>,
    /// Rooms the user is in, keyed by room id.
    pub rooms: HashMap<String, RoomMembership>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct UserDetails {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    userid: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    avatar: Option<Value>,
    #[serde(default)]
    rooms: Value,
}

#[derive(Deserialize)]
struct RoomEntry {
    #[serde(default, rename = "isPrivate")]
    is_private: bool,
}

impl User {
    /// A regular-rank user known only by name.
    pub fn new(name: &str) -> Self {
        Self {
            id: to_id(name),
            name: name.to_string(),
            group: Rank::Regular,
            avatar: None,
            rooms: HashMap::new(),
            fetched_at: Utc::now(),
        }
    }

    /// Build a user from a `userdetails` payload.
    ///
    /// Returns `None` for `null` (unknown user), for offline users
    /// (`"rooms": false`) and for payloads without an id.
    pub fn from_details(data: &Value) -> Option<Self> {
        if data.is_null() {
            return None;
        }
        let details = match UserDetails::deserialize(data) {
            Ok(details) => details,
            Err(e) => {
                debug!(error = %e, "Unusable userdetails payload");
                return None;
            }
        };
        if details.rooms == Value::Bool(false) {
            return None;
        }

        let id = to_id(details.id.or(details.userid).as_deref().unwrap_or_default());
        if id.is_empty() {
            return None;
        }

        let mut rooms = HashMap::new();
        if let Value::Object(map) = &details.rooms {
            for (key, entry) in map {
                let room_id = to_id(key);
                let rank = match key.chars().next() {
                    Some(c) if !c.is_ascii_alphanumeric() => Rank::from_char(c),
                    _ => Rank::Regular,
                };
                let is_private = RoomEntry::deserialize(entry)
                    .map(|e| e.is_private)
                    .unwrap_or(false);
                rooms.insert(room_id, RoomMembership { rank, is_private });
            }
        }

        Some(Self {
            name: details.name.unwrap_or_else(|| id.clone()),
            id,
            group: details
                .group
                .as_deref()
                .map(Rank::from_symbol)
                .unwrap_or_default(),
            avatar: details.avatar.and_then(|avatar| match avatar {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }),
            rooms,
            fetched_at: Utc::now(),
        })
    }

    /// Rank in `room` as listed by `userdetails`, falling back to the global rank.
    pub fn rank_in(&self, room: &str) -> Rank {
        self.rooms
            .get(&to_id(room))
            .map(|m| m.rank)
            .unwrap_or(self.group)
    }
}

/// Concurrent user store keyed by user id.
#[derive(Default)]
pub struct UserCache {
    users: DashMap<String, User>,
}

impl UserCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<User> {
        self.users.get(&to_id(id)).map(|entry| entry.clone())
    }

    pub fn insert(&self, user: User) {
        self.users.insert(user.id.clone(), user);
    }

    pub fn remove(&self, id: &str) -> Option<User> {
        self.users.remove(&to_id(id)).map(|(_, user)| user)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
