//! Integration test common infrastructure.
//!
//! Provides a test bot with a captured outbox, a canned login client, and
//! an in-process WebSocket server speaking the pipe protocol.

pub mod bot;
pub mod server;

#[allow(unused_imports)]
pub use bot::{StubLoginClient, TestBot};
#[allow(unused_imports)]
pub use server::{ServerSide, TestServer};
