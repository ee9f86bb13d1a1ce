//! Network module.
//!
//! Contains the upstream WebSocket Connection, the shared Outbox every
//! component sends through, and the reconnect policy.

mod connection;
mod outbox;
mod reconnect;

pub use connection::{Closer, ConnectOptions, Connection, ConnectionEvent, ConnectionState};
pub use outbox::Outbox;
pub use reconnect::ReconnectPolicy;
