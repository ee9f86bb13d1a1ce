//! Typed views of chat-scoped events.
//!
//! Three line shapes carry user text:
//!
//! ```text
//! |c:|TIMESTAMP|IDENTITY|MESSAGE...      room chat with server timestamp
//! |c|IDENTITY|MESSAGE...                 room chat (also `|chat|`)
//! |pm|SENDER|RECEIVER|MESSAGE...         private message
//! ```
//!
//! Message text may contain pipes, so every field after the header is
//! rejoined. A page request is a private message whose text is
//! `|requestpage|USER|PAGEID`, i.e. the argument list
//! `[SENDER, RECEIVER, "", "requestpage", USER, PAGEID]`.

use crate::event::ProtocolEvent;
use crate::id::to_id;
use crate::identity::Identity;

/// Room assumed for room chat lines that arrive without a scope marker.
pub const DEFAULT_ROOM: &str = "lobby";

/// Where a chat message was said.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatKind {
    /// Said in a room.
    Room {
        /// Room id.
        room: String,
        /// Server timestamp (seconds), present on `c:` lines.
        timestamp: Option<i64>,
    },
    /// Sent privately.
    Private {
        /// Recipient identity.
        receiver: Identity,
    },
}

/// A chat line from a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    /// Room or private.
    pub kind: ChatKind,
    /// The sender, with the rank they hold where the message was said.
    pub sender: Identity,
    /// Message text.
    pub text: String,
}

impl ChatMessage {
    /// Interpret an event as a chat line. Returns `None` for other events
    /// and for lines missing their header fields.
    pub fn from_event(event: &ProtocolEvent) -> Option<ChatMessage> {
        let room = || event.room().unwrap_or(DEFAULT_ROOM).to_owned();
        match event.kind() {
            "c:" => Some(ChatMessage {
                kind: ChatKind::Room {
                    room: room(),
                    timestamp: event.arg(0).and_then(|ts| ts.parse().ok()),
                },
                sender: Identity::parse(event.arg(1)?),
                text: event.rest_from(2),
            }),
            "c" | "chat" => Some(ChatMessage {
                kind: ChatKind::Room {
                    room: room(),
                    timestamp: None,
                },
                sender: Identity::parse(event.arg(0)?),
                text: event.rest_from(1),
            }),
            "pm" => Some(ChatMessage {
                kind: ChatKind::Private {
                    receiver: Identity::parse(event.arg(1)?),
                },
                sender: Identity::parse(event.arg(0)?),
                text: event.rest_from(2),
            }),
            _ => None,
        }
    }

    /// Room id for room chat, `None` for private messages.
    pub fn room(&self) -> Option<&str> {
        match &self.kind {
            ChatKind::Room { room, .. } => Some(room),
            ChatKind::Private { .. } => None,
        }
    }

    /// Returns `true` for private messages.
    pub fn is_private(&self) -> bool {
        matches!(self.kind, ChatKind::Private { .. })
    }
}

/// A request for an HTML page, delivered as a special private message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    /// Who asked.
    pub requester: Identity,
    /// Requested page id, as sent.
    pub page_id: String,
    /// Room scope of the request frame, if any.
    pub room: Option<String>,
}

impl PageRequest {
    /// Marker in the fourth `pm` field.
    pub const MARKER: &'static str = "requestpage";

    /// Interpret a `pm` event as a page request.
    pub fn from_event(event: &ProtocolEvent) -> Option<PageRequest> {
        if event.kind() != "pm" || !event.arg(2)?.is_empty() || event.arg(3)? != Self::MARKER {
            return None;
        }
        Some(PageRequest {
            requester: Identity::parse(event.arg(0)?),
            page_id: event.arg(5)?.to_owned(),
            room: event.room().map(str::to_owned),
        })
    }

    /// Normalized page id used for handler lookup. Only the part before the
    /// first `-` selects the handler; the rest is handler-specific.
    pub fn handler_id(&self) -> String {
        let head = self.page_id.split('-').next().unwrap_or_default();
        to_id(head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::parse_chunk;
    use crate::rank::Rank;

    fn one(raw: &str) -> ProtocolEvent {
        parse_chunk(raw).remove(0)
    }

    #[test]
    fn test_timestamped_room_chat() {
        let msg = ChatMessage::from_event(&one(">mychat\n|c:|1000|+bob|hello|world")).unwrap();
        assert_eq!(msg.room(), Some("mychat"));
        assert_eq!(msg.sender.rank, Rank::Voice);
        assert_eq!(msg.sender.id(), "bob");
        assert_eq!(msg.text, "hello|world");
        assert_eq!(
            msg.kind,
            ChatKind::Room {
                room: "mychat".into(),
                timestamp: Some(1000)
            }
        );
    }

    #[test]
    fn test_unscoped_room_chat_defaults_to_lobby() {
        let msg = ChatMessage::from_event(&one("|c| alice|hi")).unwrap();
        assert_eq!(msg.room(), Some(DEFAULT_ROOM));
        assert_eq!(msg.text, "hi");
    }

    #[test]
    fn test_private_message() {
        let msg = ChatMessage::from_event(&one("|pm| alice|*MyBot|!ping")).unwrap();
        assert!(msg.is_private());
        assert_eq!(msg.room(), None);
        assert_eq!(msg.sender.id(), "alice");
        match msg.kind {
            ChatKind::Private { receiver } => assert_eq!(receiver.id(), "mybot"),
            other => panic!("expected private, got {:?}", other),
        }
        assert_eq!(msg.text, "!ping");
    }

    #[test]
    fn test_missing_header_fields() {
        assert!(ChatMessage::from_event(&one("|c:|1000")).is_none());
        assert!(ChatMessage::from_event(&one("|pm| alice")).is_none());
        assert!(ChatMessage::from_event(&one("|J|+bob")).is_none());
    }

    #[test]
    fn test_page_request() {
        let event = one(">lobby\n|pm| alice|*MyBot||requestpage|alice|help-commands");
        let req = PageRequest::from_event(&event).unwrap();
        assert_eq!(req.requester.id(), "alice");
        assert_eq!(req.page_id, "help-commands");
        assert_eq!(req.handler_id(), "help");
        assert_eq!(req.room.as_deref(), Some("lobby"));
    }

    #[test]
    fn test_plain_pm_is_not_page_request() {
        assert!(PageRequest::from_event(&one("|pm| alice|*MyBot|hello")).is_none());
        assert!(PageRequest::from_event(&one("|pm| a|b||other|a|p")).is_none());
    }
}
