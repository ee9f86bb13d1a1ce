//! Per-invocation command context.

use ps_proto::{Rank, to_id};

use crate::bot::Bot;
use crate::cache::{Room, User};
use crate::error::CommandError;

/// One command invocation: who ran it, where, and with what text.
pub struct CommandContext<'a> {
    bot: &'a Bot,
    target: String,
    caller_id: String,
    room_id: Option<String>,
}

impl<'a> CommandContext<'a> {
    pub fn new(bot: &'a Bot, target: &str, caller_id: &str, room_id: Option<&str>) -> Self {
        Self {
            bot,
            target: target.to_string(),
            caller_id: to_id(caller_id),
            room_id: room_id.map(to_id),
        }
    }

    pub fn bot(&self) -> &'a Bot {
        self.bot
    }

    /// Everything after the command name.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn set_target(&mut self, target: impl Into<String>) {
        self.target = target.into();
    }

    /// Comma-separated target fields, trimmed. Empty target yields no fields.
    pub fn args(&self) -> Vec<&str> {
        if self.target.trim().is_empty() {
            return Vec::new();
        }
        self.target.split(',').map(str::trim).collect()
    }

    pub fn caller_id(&self) -> &str {
        &self.caller_id
    }

    /// Room the command was said in; `None` for private messages.
    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    /// Reply to the caller.
    ///
    /// Goes to the room when the caller holds a rank above regular there,
    /// otherwise by private message. Uses cached room auth only.
    pub fn send(&self, text: &str) -> bool {
        match self.room_id.as_deref() {
            Some(room)
                if self
                    .bot
                    .rooms()
                    .rank_of(room, &self.caller_id)
                    .is_some_and(Rank::is_staff) =>
            {
                self.bot.say(room, text)
            }
            _ => self.bot.pm(&self.caller_id, text),
        }
    }

    /// The caller, fetched through the user cache.
    pub async fn user(&self) -> Option<User> {
        self.bot.user(&self.caller_id).await
    }

    /// The invoking room, fetched through the room cache.
    pub async fn room(&self) -> Option<Room> {
        match self.room_id.as_deref() {
            Some(room) => self.bot.room(room).await,
            None => None,
        }
    }

    /// Effective rank of the caller in `room`.
    ///
    /// Cached room auth wins. Otherwise the caller's `userdetails` decide:
    /// the rank listed for that room, or the global rank. A caller the
    /// server does not know counts as regular.
    pub async fn rank_in(&self, room: Option<&str>) -> Rank {
        if let Some(room) = room
            && let Some(rank) = self.bot.rooms().rank_of(room, &self.caller_id)
        {
            return rank;
        }
        match self.user().await {
            Some(user) => match room {
                Some(room) => user.rank_in(room),
                None => user.group,
            },
            None => Rank::Regular,
        }
    }

    pub async fn at_least(&self, rank: Rank, room: Option<&str>) -> bool {
        self.rank_in(room).await.at_least(rank)
    }

    /// Require `rank` in the invoking room.
    pub async fn is(&self, rank: Rank) -> Result<(), CommandError> {
        if self.at_least(rank, self.room_id.as_deref()).await {
            Ok(())
        } else {
            Err(CommandError::access_denied())
        }
    }

    pub fn is_sysop(&self) -> bool {
        self.bot.settings().is_sysop(&self.caller_id)
    }

    /// Require the caller to be a configured sysop.
    pub fn require_sysop(&self) -> Result<(), CommandError> {
        if self.is_sysop() {
            Ok(())
        } else {
            Err(CommandError::access_denied())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_publicly_only_for_ranked_callers() {
        let (bot, mut sent) = Bot::for_tests_with_outbox();
        bot.rooms()
            .observe("lobby", &ps_proto::Identity::parse("+voiced"));
        bot.rooms()
            .observe("lobby", &ps_proto::Identity::parse(" plain"));

        CommandContext::new(&bot, "", "voiced", Some("lobby")).send("hi");
        CommandContext::new(&bot, "", "plain", Some("lobby")).send("hi");
        CommandContext::new(&bot, "", "voiced", None).send("hi");

        assert_eq!(sent.try_recv().unwrap(), "lobby|hi");
        assert_eq!(sent.try_recv().unwrap(), "|/pm plain,hi");
        assert_eq!(sent.try_recv().unwrap(), "|/pm voiced,hi");
    }

    #[tokio::test]
    async fn cached_room_auth_decides_rank() {
        let bot = Bot::for_tests();
        bot.rooms()
            .observe("lobby", &ps_proto::Identity::parse("%driver"));
        let ctx = CommandContext::new(&bot, "", "Driver", Some("Lobby"));
        assert_eq!(ctx.rank_in(Some("lobby")).await, Rank::Driver);
        assert!(ctx.is(Rank::Voice).await.is_ok());
        assert_eq!(
            ctx.is(Rank::Moderator).await,
            Err(CommandError::access_denied())
        );
    }

    #[tokio::test]
    async fn splits_args() {
        let bot = Bot::for_tests();
        let ctx = CommandContext::new(&bot, " a, b ,c", "x", None);
        assert_eq!(ctx.args(), vec!["a", "b", "c"]);
        let ctx = CommandContext::new(&bot, "  ", "x", None);
        assert!(ctx.args().is_empty());
    }

    #[tokio::test]
    async fn sysops_by_id() {
        let bot = Bot::for_tests();
        assert!(CommandContext::new(&bot, "", "Sys Op", None).is_sysop());
        assert!(CommandContext::new(&bot, "", "bob", None).require_sysop().is_err());
    }
}
