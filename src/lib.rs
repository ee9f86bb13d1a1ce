//! psbot - chat bot engine for Showdown-style pipe-protocol servers.
//!
//! The protocol itself (parsing, identities, ranks, outbound lines, the
//! login state machine) lives in the sans-IO `ps-proto` crate. This crate
//! adds the I/O: the WebSocket connection, the HTTP login client, the query
//! correlator, dispatch, commands and caches, tied together by [`Bot`].

pub mod bot;
pub mod cache;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod login;
pub mod network;
pub mod query;
pub mod telemetry;

pub use bot::{Bot, BotBuilder, BotSettings};
