//! # ps-proto
//!
//! A sans-IO library for the pipe-delimited chat protocol spoken by
//! Showdown-style servers.
//!
//! ## Features
//!
//! - Frame parsing into ordered [`ProtocolEvent`]s, with room scoping
//! - Typed views of chat, private-message and page-request lines
//! - Rank-prefixed user identities and the fixed [`Rank`] ordering
//! - Outbound command construction (`/join`, `/pm`, `/crq`, `/trn`, ...)
//! - A sans-IO login state machine driving the challenge/response handshake
//!
//! ## Quick Start
//!
//! ```rust
//! use ps_proto::{parse_chunk, Outbound};
//!
//! let events = parse_chunk(">lobby\n|c:|1000|+bob|hello");
//! assert_eq!(events[0].kind(), "c:");
//! assert_eq!(events[0].room(), Some("lobby"));
//!
//! let join = Outbound::join("techcode");
//! assert_eq!(join.to_string(), "|/join techcode");
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod chat;
pub mod error;
pub mod event;
pub mod id;
pub mod identity;
pub mod login;
pub mod outbound;
pub mod rank;

pub use self::chat::{ChatKind, ChatMessage, PageRequest, DEFAULT_ROOM};
pub use self::error::{LoginError, ProtocolError};
pub use self::event::{parse_chunk, ProtocolEvent, QueryResponse};
pub use self::id::{id_eq, to_id};
pub use self::identity::Identity;
pub use self::login::{
    LoginAction, LoginMachine, LoginRequest, LoginSettings, LoginState, LOGIN_ACTION,
};
pub use self::outbound::Outbound;
pub use self::rank::Rank;
