//! Frame parsing.
//!
//! A frame is one delivered unit of transport data and may hold several
//! protocol lines:
//!
//! ```text
//! >roomid              <- optional room scope marker (first line only)
//! |TYPE|arg1|arg2|...  <- one event per line
//! |TYPE|...
//! ```
//!
//! Each content line is split on `|`. The field before the first pipe is
//! always empty and discarded, the next field is the event type and every
//! remaining field becomes an argument, empty strings included.

use serde_json::Value;

use crate::error::{ProtocolError, Result};
use crate::id::to_id;

/// The room scope marker that may open a frame.
pub const ROOM_MARKER: char = '>';

/// Field delimiter on the wire.
pub const DELIMITER: char = '|';

/// A single decoded protocol line.
///
/// `kind` keeps the wire's spelling. Anything that matches on the event
/// type (the dispatcher, watcher registration) must compare
/// [`ProtocolEvent::normalized_kind`] instead, which is lower-case with
/// punctuation stripped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolEvent {
    kind: String,
    args: Vec<String>,
    room: Option<String>,
}

impl ProtocolEvent {
    /// Build an event directly. Mostly useful in tests and for synthesized
    /// events.
    pub fn new(kind: impl Into<String>, args: Vec<String>, room: Option<String>) -> Self {
        Self {
            kind: kind.into(),
            args,
            room,
        }
    }

    /// The wire keyword, exactly as received (`"c:"`, `"J"`, `"queryresponse"`).
    ///
    /// Lines that do not start with a pipe are plain log text; their kind is
    /// the empty string and the whole line is the single argument.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The kind in id form: the canonical dispatch key. The server mixes
    /// case for some presence markers (`J`/`j`, `N`/`n`) and decorates
    /// others (`c:`), so watchers are keyed by this value, never by
    /// [`kind`](Self::kind).
    pub fn normalized_kind(&self) -> String {
        to_id(&self.kind)
    }

    /// All arguments in wire order.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Argument at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Argument at `index`, or a [`ProtocolError::MissingField`].
    pub fn require(&self, index: usize) -> Result<&str> {
        self.arg(index).ok_or_else(|| ProtocolError::MissingField {
            kind: self.kind.clone(),
            index,
        })
    }

    /// Arguments from `index` onwards joined back with the delimiter.
    ///
    /// Message text may itself contain pipes; this reassembles it.
    pub fn rest_from(&self, index: usize) -> String {
        self.args
            .get(index..)
            .map(|rest| rest.join("|"))
            .unwrap_or_default()
    }

    /// The room this event was scoped to, if the frame carried a marker.
    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    /// Returns `true` for plain log lines (no leading pipe).
    pub fn is_raw(&self) -> bool {
        self.kind.is_empty()
    }
}

/// Parse one frame into its events.
///
/// Pure and total: every input yields a (possibly empty) list of events.
/// Empty lines are skipped.
pub fn parse_chunk(raw: &str) -> Vec<ProtocolEvent> {
    let (room, body) = match raw.split_once('\n') {
        Some((first, rest)) if first.starts_with(ROOM_MARKER) => (Some(to_id(first)), rest),
        None if raw.starts_with(ROOM_MARKER) => (Some(to_id(raw)), ""),
        _ => (None, raw),
    };

    body.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(|line| parse_line(line, room.clone()))
        .collect()
}

fn parse_line(line: &str, room: Option<String>) -> ProtocolEvent {
    let Some(content) = line.strip_prefix(DELIMITER) else {
        return ProtocolEvent {
            kind: String::new(),
            args: vec![line.to_owned()],
            room,
        };
    };

    let mut fields = content.split(DELIMITER);
    let kind = fields.next().unwrap_or_default().to_owned();
    let args = fields.map(str::to_owned).collect();
    ProtocolEvent { kind, args, room }
}

/// Decoded `|queryresponse|TYPE|JSON` line.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryResponse {
    /// The query type the response answers.
    pub kind: String,
    /// The decoded payload. The server sends `null` for unknown entities.
    pub data: Value,
}

impl QueryResponse {
    /// The wire keyword for query responses.
    pub const KIND: &'static str = "queryresponse";

    /// Interpret a parsed event as a query response.
    ///
    /// The JSON payload may contain pipes, so every field after the type is
    /// rejoined before decoding.
    pub fn from_event(event: &ProtocolEvent) -> Result<Self> {
        if event.kind() != Self::KIND {
            return Err(ProtocolError::UnexpectedEvent {
                expected: Self::KIND,
                actual: event.kind().to_owned(),
            });
        }
        let kind = event.require(0)?.to_owned();
        let payload = event.rest_from(1);
        let data = if payload.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&payload)?
        };
        Ok(Self { kind, data })
    }
}
