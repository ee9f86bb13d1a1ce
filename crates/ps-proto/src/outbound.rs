//! Outbound command construction.
//!
//! Everything the client sends is a single text frame of the form
//! `ROOMID|TEXT`. Global commands use an empty room id. Commands use the
//! leading-slash convention (`/join`, `/pm`, ...); anything else is chat.

use std::fmt;

use crate::id::to_id;

/// A line ready to be written to the connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outbound {
    /// Target room id; `None` sends globally.
    pub room: Option<String>,
    /// Message or command text.
    pub text: String,
}

impl Outbound {
    /// A global line.
    pub fn global(text: impl Into<String>) -> Self {
        Self {
            room: None,
            text: text.into(),
        }
    }

    /// A line sent in the given room. The pseudo-room `global` maps to a
    /// global send.
    pub fn room(room: &str, text: impl Into<String>) -> Self {
        let room = to_id(room);
        Self {
            room: if room.is_empty() || room == "global" {
                None
            } else {
                Some(room)
            },
            text: text.into(),
        }
    }

    /// `/join ROOM`
    pub fn join(room: &str) -> Self {
        Self::global(format!("/join {}", to_id(room)))
    }

    /// `/leave ROOM`
    pub fn leave(room: &str) -> Self {
        Self::global(format!("/leave {}", to_id(room)))
    }

    /// `/pm USER,TEXT`
    pub fn pm(user: &str, text: &str) -> Self {
        Self::global(format!("/pm {},{}", to_id(user), text))
    }

    /// `/trn NAME,0,ASSERTION` completes login with a signed assertion.
    pub fn trn(name: &str, assertion: &str) -> Self {
        Self::global(format!("/trn {},0,{}", name, assertion))
    }

    /// `/crq TYPE [DATA]` asks the server an out-of-band query. The answer
    /// arrives as an unlabeled `|queryresponse|TYPE|JSON` line.
    pub fn query(kind: &str, data: &str) -> Self {
        if data.is_empty() {
            Self::global(format!("/crq {}", kind))
        } else {
            Self::global(format!("/crq {} {}", kind, data))
        }
    }

    /// `/avatar AVATAR`
    pub fn avatar(avatar: &str) -> Self {
        Self::global(format!("/avatar {}", avatar))
    }

    /// `/status STATUS`
    pub fn status(status: &str) -> Self {
        Self::global(format!("/status {}", status))
    }

    /// `/sendhtmlpage USER,PAGEID,HTML` in `room`.
    pub fn html_page(room: &str, user: &str, page_id: &str, html: &str) -> Self {
        Self::room(
            room,
            format!("/sendhtmlpage {},{},{}", to_id(user), page_id, html),
        )
    }

    /// `!htmlbox HTML` in `room`.
    pub fn html_box(room: &str, html: &str) -> Self {
        Self::room(room, format!("!htmlbox {}", html))
    }
}

impl fmt::Display for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.room.as_deref().unwrap_or(""), self.text)
    }
}

impl From<Outbound> for String {
    fn from(line: Outbound) -> Self {
        line.to_string()
    }
}
