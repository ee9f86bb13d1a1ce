//! Room cache backed by `roominfo` responses plus observed presence.

use std::collections::HashMap;

use dashmap::DashMap;
use ps_proto::{Identity, Rank, to_id};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// A known room.
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub id: String,
    pub title: String,
    /// `chat` or `battle`.
    pub kind: String,
    pub visibility: String,
    pub modchat: Option<String>,
    /// Present users keyed by id.
    pub users: HashMap<String, Identity>,
    /// Room auth keyed by user id.
    pub auth: HashMap<String, Rank>,
    /// Whether a `roominfo` response has been applied.
    pub loaded: bool,
}

#[derive(Deserialize)]
struct RoomInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    visibility: Option<String>,
    #[serde(default)]
    modchat: Option<Value>,
    #[serde(default)]
    users: Vec<String>,
    #[serde(default)]
    auth: HashMap<String, Vec<String>>,
}

impl Room {
    pub fn new(id: &str) -> Self {
        let id = to_id(id);
        Self {
            title: id.clone(),
            id,
            kind: "chat".to_string(),
            visibility: "public".to_string(),
            modchat: None,
            users: HashMap::new(),
            auth: HashMap::new(),
            loaded: false,
        }
    }

    /// Apply a `roominfo` payload. Returns `false` if the payload was unusable.
    ///
    /// The user list and the auth map are both replaced, so a demotion takes
    /// effect on the next response. Present users keep the rank their listed
    /// identity shows when the auth lists do not name them.
    pub fn apply_info(&mut self, data: &Value) -> bool {
        let info = match RoomInfo::deserialize(data) {
            Ok(info) => info,
            Err(e) => {
                debug!(room = %self.id, error = %e, "Unusable roominfo payload");
                return false;
            }
        };

        if let Some(title) = info.title {
            self.title = title;
        }
        if let Some(kind) = info.kind {
            self.kind = kind;
        }
        if let Some(visibility) = info.visibility {
            self.visibility = visibility;
        }
        self.modchat = match info.modchat {
            Some(Value::String(level)) => Some(level),
            _ => None,
        };

        self.users = info
            .users
            .iter()
            .map(|raw| {
                let identity = Identity::parse(raw);
                (identity.id(), identity)
            })
            .collect();
        let mut auth: HashMap<String, Rank> = self
            .users
            .values()
            .filter(|identity| !matches!(identity.rank, Rank::Regular | Rank::Unknown))
            .map(|identity| (identity.id(), identity.rank))
            .collect();
        for (symbol, ids) in &info.auth {
            let rank = Rank::from_symbol(symbol);
            for id in ids {
                auth.insert(to_id(id), rank);
            }
        }
        self.auth = auth;
        self.loaded = true;
        true
    }

    pub fn rank_of(&self, user_id: &str) -> Option<Rank> {
        self.auth.get(&to_id(user_id)).copied()
    }
}

/// Concurrent room store keyed by room id.
#[derive(Default)]
pub struct RoomCache {
    rooms: DashMap<String, Room>,
}

impl RoomCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Room> {
        self.rooms.get(&to_id(id)).map(|entry| entry.clone())
    }

    pub fn insert(&self, room: Room) {
        self.rooms.insert(room.id.clone(), room);
    }

    pub fn remove(&self, id: &str) -> Option<Room> {
        self.rooms.remove(&to_id(id)).map(|(_, room)| room)
    }

    /// Apply `f` to the room, creating a bare entry first if needed.
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut Room) -> R) -> R {
        let id = to_id(id);
        let mut entry = self.rooms.entry(id.clone()).or_insert_with(|| Room::new(&id));
        f(entry.value_mut())
    }

    /// Room auth of `user_id`, if known.
    pub fn rank_of(&self, room: &str, user_id: &str) -> Option<Rank> {
        self.rooms
            .get(&to_id(room))
            .and_then(|entry| entry.rank_of(user_id))
    }

    /// Record the rank a chat identity showed in `room`.
    pub fn observe(&self, room: &str, identity: &Identity) {
        if identity.rank == Rank::Unknown {
            return;
        }
        self.update(room, |r| {
            let id = identity.id();
            r.auth.insert(id.clone(), identity.rank);
            r.users.insert(id, identity.clone());
        });
    }

    pub fn add_user(&self, room: &str, identity: &Identity) {
        self.update(room, |r| {
            r.users.insert(identity.id(), identity.clone());
        });
    }

    pub fn remove_user(&self, room: &str, user_id: &str) {
        if let Some(mut entry) = self.rooms.get_mut(&to_id(room)) {
            entry.users.remove(&to_id(user_id));
        }
    }

    /// Move a user to a new identity, carrying room auth along.
    pub fn rename_user(&self, room: &str, old_id: &str, identity: &Identity) {
        self.update(room, |r| {
            let old_id = to_id(old_id);
            let new_id = identity.id();
            r.users.remove(&old_id);
            if let Some(rank) = r.auth.remove(&old_id) {
                r.auth.insert(new_id.clone(), rank);
            }
            r.users.insert(new_id, identity.clone());
        });
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn applies_roominfo() {
        let mut room = Room::new("techcode");
        let applied = room.apply_info(&json!({
            "title": "Tech & Code",
            "type": "chat",
            "visibility": "public",
            "modchat": "+",
            "auth": {"#": ["owner1"], "@": ["mod1", "mod2"]},
            "users": ["#owner1", "@mod1", " regular@!"]
        }));
        assert!(applied);
        assert!(room.loaded);
        assert_eq!(room.title, "Tech & Code");
        assert_eq!(room.modchat.as_deref(), Some("+"));
        assert_eq!(room.rank_of("owner1"), Some(Rank::Owner));
        assert_eq!(room.rank_of("Mod 2"), Some(Rank::Moderator));
        assert_eq!(room.rank_of("regular"), None);
        assert!(room.users["regular"].away);
        assert_eq!(room.users.len(), 3);
    }

    #[test]
    fn roominfo_replaces_stale_auth() {
        let cache = RoomCache::new();
        cache.observe("lobby", &Identity::parse("@bob"));
        cache.observe("lobby", &Identity::parse("%carol"));
        cache.update("lobby", |room| {
            room.apply_info(&json!({
                "title": "Lobby",
                "auth": {"@": ["alice"], "+": ["bob"]},
                "users": ["@alice", "+bob", "*dave"]
            }))
        });
        // Demoted since the chat line was seen
        assert_eq!(cache.rank_of("lobby", "bob"), Some(Rank::Voice));
        // No longer staff and not present
        assert_eq!(cache.rank_of("lobby", "carol"), None);
        assert_eq!(cache.rank_of("lobby", "alice"), Some(Rank::Moderator));
        // Present with a rank the auth lists leave out
        assert_eq!(cache.rank_of("lobby", "dave"), Some(Rank::Bot));
    }

    #[test]
    fn presence_updates() {
        let cache = RoomCache::new();
        cache.add_user("lobby", &Identity::parse(" alice"));
        cache.observe("lobby", &Identity::parse("%alice"));
        cache.rename_user("lobby", "alice", &Identity::parse("%Alice2"));
        let room = cache.get("lobby").unwrap();
        assert!(!room.users.contains_key("alice"));
        assert!(room.users.contains_key("alice2"));
        assert_eq!(room.rank_of("alice2"), Some(Rank::Driver));

        cache.remove_user("lobby", "Alice2");
        assert!(cache.get("lobby").unwrap().users.is_empty());
        assert!(!cache.get("lobby").unwrap().loaded);
    }

    #[test]
    fn unknown_rank_is_not_recorded() {
        let cache = RoomCache::new();
        cache.observe("lobby", &Identity::parse("~root"));
        assert!(cache.is_empty());
    }

    #[test]
    fn rejects_malformed_roominfo() {
        let mut room = Room::new("lobby");
        assert!(!room.apply_info(&json!({"users": "nope"})));
        assert!(!room.loaded);
    }
}
