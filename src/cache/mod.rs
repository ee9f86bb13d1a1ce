//! Entity caches.
//!
//! Users and rooms learned from `userdetails` / `roominfo` query responses
//! and from presence and chat lines. Storage only: fetching goes through
//! [`Bot::user`](crate::bot::Bot::user) and [`Bot::room`](crate::bot::Bot::room).

mod rooms;
mod users;

pub use rooms::{Room, RoomCache};
pub use users::{RoomMembership, User, UserCache};
