//! Commands every bot ships with.

use async_trait::async_trait;
use tracing::warn;

use super::{Command, CommandContext};
use crate::bot::Bot;
use crate::error::HandlerResult;

/// Register the built-in commands.
pub fn register(bot: &Bot) {
    bot.register_command(Ping);
    bot.register_command(Help);
    bot.register_command(Kill);
}

/// Liveness check.
pub struct Ping;

#[async_trait]
impl Command for Ping {
    fn name(&self) -> &str {
        "ping"
    }

    fn help(&self) -> Option<&str> {
        Some("Replies with Pong!")
    }

    async fn run(&self, ctx: &mut CommandContext<'_>) -> HandlerResult {
        ctx.send("Pong!");
        Ok(())
    }
}

/// Show the help text of a command, by name or alias.
pub struct Help;

#[async_trait]
impl Command for Help {
    fn name(&self) -> &str {
        "help"
    }

    fn aliases(&self) -> &[&str] {
        &["guide"]
    }

    fn help(&self) -> Option<&str> {
        Some("Shows help for a command. Usage: help [command]")
    }

    async fn run(&self, ctx: &mut CommandContext<'_>) -> HandlerResult {
        let wanted = match ctx.target().trim() {
            "" => self.name().to_string(),
            name => name.to_string(),
        };
        let reply = match ctx.bot().commands().resolve(&wanted) {
            None => format!("Command {wanted} not found."),
            Some(command) => match command.help() {
                Some(help) => format!("Help for {}: {}", command.name(), help),
                None => "That command has no help info.".to_string(),
            },
        };
        ctx.send(&reply);
        Ok(())
    }
}

/// Stop the bot. Sysops only.
pub struct Kill;

#[async_trait]
impl Command for Kill {
    fn name(&self) -> &str {
        "kill"
    }

    fn aliases(&self) -> &[&str] {
        &["restart"]
    }

    fn help(&self) -> Option<&str> {
        Some("Shuts the bot down. Sysops only.")
    }

    async fn run(&self, ctx: &mut CommandContext<'_>) -> HandlerResult {
        ctx.require_sysop()?;
        warn!(caller = %ctx.caller_id(), "Shutdown requested by command");
        ctx.bot().shutdown();
        Ok(())
    }
}
