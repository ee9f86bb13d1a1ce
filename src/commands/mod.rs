//! Chat commands.
//!
//! A chat line starting with the command token is a command invocation:
//!
//! ```text
//!   "!help ping"  ──▶  name "help", target "ping"
//! ```
//!
//! The name is normalized, looked up directly and then as an alias, rank
//! checked, and run with a per-call [`CommandContext`]. A [`CommandError`]
//! raised by the command becomes a reply to the caller; any other error
//! propagates to whoever routed the line.
//!
//! Extension modules add commands, filters and page handlers through
//! [`Bot::register_command`], [`Bot::register_filter`] and
//! [`Bot::register_page`]; see [`builtin::register`] for the pattern.

pub mod builtin;
mod context;
mod filters;
mod pages;

pub use context::CommandContext;
pub use filters::{Filter, FilterChain};
pub use pages::{PageHandler, PageRegistry};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use ps_proto::{Rank, to_id};
use tracing::{Instrument, debug, warn};

use crate::bot::Bot;
use crate::error::{CommandError, HandlerError, HandlerResult};
use crate::telemetry::{CommandTimer, spans};

/// A chat command.
#[async_trait]
pub trait Command: Send + Sync {
    /// Canonical name. Normalized to an id on registration.
    fn name(&self) -> &str;

    fn aliases(&self) -> &[&str] {
        &[]
    }

    fn help(&self) -> Option<&str> {
        None
    }

    /// Minimum effective rank in the invoking room, checked before `init`.
    fn required_rank(&self) -> Option<Rank> {
        None
    }

    /// Per-call setup, run after the rank check and before [`Command::run`].
    async fn init(&self, _ctx: &mut CommandContext<'_>) -> HandlerResult {
        Ok(())
    }

    async fn run(&self, ctx: &mut CommandContext<'_>) -> HandlerResult;
}

#[derive(Default)]
struct Registered {
    commands: HashMap<String, Arc<dyn Command>>,
    aliases: HashMap<String, String>,
}

/// Name and alias tables.
#[derive(Default)]
pub struct CommandRegistry {
    inner: RwLock<Registered>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command under its name and aliases. A later registration
    /// of the same name replaces the earlier one.
    pub fn register(&self, command: Arc<dyn Command>) {
        let name = to_id(command.name());
        let mut inner = self.inner.write();
        for alias in command.aliases() {
            inner.aliases.insert(to_id(alias), name.clone());
        }
        if inner.commands.insert(name.clone(), command).is_some() {
            warn!(command = %name, "Replaced existing command");
        } else {
            debug!(command = %name, "Registered command");
        }
    }

    /// Look a name up directly, then as an alias.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Command>> {
        let id = to_id(name);
        let inner = self.inner.read();
        inner
            .commands
            .get(&id)
            .or_else(|| {
                inner
                    .aliases
                    .get(&id)
                    .and_then(|canonical| inner.commands.get(canonical))
            })
            .cloned()
    }

    /// Registered canonical names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().commands.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.inner.read().commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().commands.is_empty()
    }
}

/// What happened to a chat line offered to the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The line does not start with the command token.
    NotACommand,
    /// No command or alias matches the name.
    NotFound,
    /// The command ran to completion.
    Ran(String),
    /// The command raised a [`CommandError`]; the message was sent to the caller.
    Failed(CommandError),
}

/// Route one chat line.
///
/// `room_id` is `None` for private messages. User-facing command errors
/// never escape: they are replied and reported as
/// [`CommandOutcome::Failed`].
pub async fn try_command(
    bot: &Bot,
    message: &str,
    caller_id: &str,
    room_id: Option<&str>,
) -> Result<CommandOutcome, HandlerError> {
    let Some(body) = message.strip_prefix(bot.settings().command_token.as_str()) else {
        return Ok(CommandOutcome::NotACommand);
    };
    let (name, target) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
    let name = to_id(name);
    if name.is_empty() {
        return Ok(CommandOutcome::NotACommand);
    }

    let Some(command) = bot.commands().resolve(&name) else {
        return Ok(CommandOutcome::NotFound);
    };
    let canonical = to_id(command.name());
    let _timer = CommandTimer::new(canonical.clone());

    let mut ctx = CommandContext::new(bot, target, caller_id, room_id);
    let result = invoke(command.as_ref(), &mut ctx)
        .instrument(spans::command(&canonical, caller_id, room_id))
        .await;

    match result {
        Ok(()) => Ok(CommandOutcome::Ran(canonical)),
        Err(HandlerError::Command(e)) => {
            debug!(command = %canonical, caller = %caller_id, reason = %e, "Command rejected");
            ctx.send(e.message());
            Ok(CommandOutcome::Failed(e))
        }
        Err(e) => Err(e),
    }
}

async fn invoke(command: &dyn Command, ctx: &mut CommandContext<'_>) -> HandlerResult {
    if let Some(rank) = command.required_rank() {
        ctx.is(rank).await?;
    }
    command.init(ctx).await?;
    command.run(ctx).await
}
