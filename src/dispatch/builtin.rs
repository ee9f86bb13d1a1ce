//! Built-in handlers.
//!
//! These run before any watcher and cannot be replaced: login, name
//! tracking, query resolution, chat routing, presence and page requests.

use ps_proto::{
    ChatKind, ChatMessage, DEFAULT_ROOM, Identity, LoginAction, PageRequest, ProtocolError,
    ProtocolEvent, QueryResponse, Rank, to_id,
};
use tracing::{debug, error, info, warn};

use super::isolate;
use super::queue::Routed;
use crate::bot::Bot;
use crate::commands::{self, CommandOutcome};
use crate::error::{EngineError, HandlerError, HandlerResult, QueryError};

/// Reply sent by PM when a command name matches nothing.
pub(crate) const COMMAND_NOT_FOUND: &str = "Command not found.";

pub(super) async fn handle(bot: &Bot, event: &ProtocolEvent) -> HandlerResult {
    match event.normalized_kind().as_str() {
        "challstr" => on_challstr(bot, event).await,
        "updateuser" => {
            on_updateuser(bot, event);
            Ok(())
        }
        "queryresponse" => on_queryresponse(bot, event),
        // `c:` normalizes to `c`
        "c" | "chat" | "pm" => {
            on_chat(bot, event);
            Ok(())
        }
        "j" | "join" => on_join(bot, event),
        "l" | "leave" => on_leave(bot, event),
        "n" | "name" => on_rename(bot, event),
        _ => Ok(()),
    }
}

// ============================================================================
// Login
// ============================================================================

async fn on_challstr(bot: &Bot, event: &ProtocolEvent) -> HandlerResult {
    let actions = bot.login().lock().on_challstr(event.args());
    let actions = match actions {
        Ok(actions) => actions,
        Err(e) => {
            error!(error = %e, "Cannot start login");
            bot.fail(EngineError::Auth(e));
            return Ok(());
        }
    };

    for action in actions {
        let LoginAction::Authenticate(request) = action else {
            apply_login_action(bot, action);
            continue;
        };

        info!(name = %request.name, "Authenticating");
        let body = match bot.login_client().authenticate(&request).await {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "Login server request failed");
                let reason = match e {
                    HandlerError::LoginTransport(reason) => reason,
                    other => other.to_string(),
                };
                bot.fail(EngineError::LoginTransport(reason));
                return Ok(());
            }
        };

        let followup = bot.login().lock().on_login_response(&body);
        match followup {
            Ok(followup) => followup
                .into_iter()
                .for_each(|action| apply_login_action(bot, action)),
            Err(e) => {
                error!(error = %e, "Authentication failed");
                bot.fail(EngineError::Auth(e));
            }
        }
    }
    Ok(())
}

fn on_updateuser(bot: &Bot, event: &ProtocolEvent) {
    let (previous, actions, current) = {
        let mut login = bot.login().lock();
        let previous = login.current_name().map(str::to_owned);
        let actions = login.on_updateuser(event.args());
        (previous, actions, login.current_name().map(str::to_owned))
    };

    if previous != current {
        info!(from = ?previous, to = ?current, "Name changed");
    }
    for action in actions {
        apply_login_action(bot, action);
    }
}

fn apply_login_action(bot: &Bot, action: LoginAction) {
    match action {
        LoginAction::Send(line) => {
            bot.send(line);
        }
        LoginAction::Complete => {
            info!(name = ?bot.login().lock().current_name(), "Logged in");
            bot.rejoin_saved_rooms();
        }
        LoginAction::Authenticate(request) => {
            debug!(name = %request.name, "Ignoring unexpected authenticate action");
        }
    }
}

// ============================================================================
// Queries
// ============================================================================

fn on_queryresponse(bot: &Bot, event: &ProtocolEvent) -> HandlerResult {
    match QueryResponse::from_event(event) {
        Ok(response) => {
            bot.queries().resolve(response);
            Ok(())
        }
        Err(ProtocolError::Json(e)) => {
            // The head still has to settle, or every later query of this type stalls.
            let kind = event.arg(0).unwrap_or_default();
            bot.queries().settle(
                kind,
                Err(QueryError::Malformed {
                    kind: kind.to_string(),
                    reason: e.to_string(),
                }),
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Chat
// ============================================================================

fn on_chat(bot: &Bot, event: &ProtocolEvent) {
    let Some(message) = ChatMessage::from_event(event) else {
        debug!(kind = %event.kind(), "Chat line without sender");
        return;
    };
    let self_id = bot.self_id();
    if message.sender.id() == self_id {
        return;
    }

    match &message.kind {
        ChatKind::Room { room, .. } => bot.rooms().observe(room, &message.sender),
        ChatKind::Private { receiver } => {
            if receiver.id() != self_id {
                return;
            }
            if let Some(request) = PageRequest::from_event(event) {
                enqueue(bot, Routed::Page(request));
                return;
            }
        }
    }

    enqueue(bot, Routed::Chat(message));
}

/// Queue routed work behind anything still being handled, starting the
/// worker if none is running.
fn enqueue(bot: &Bot, item: Routed) {
    if !bot.routing().push(item) {
        debug!(depth = bot.routing().len(), "Routing queued behind running handler");
        return;
    }
    let worker = bot.clone();
    bot.spawn("routing", async move {
        drain_routing(worker).await;
        Ok(())
    });
}

async fn drain_routing(bot: Bot) {
    while let Some(item) = bot.routing().next() {
        let (stage, result) = match item {
            Routed::Chat(message) => ("chat", isolate(route_chat(bot.clone(), message)).await),
            Routed::Page(request) => ("page", isolate(route_page(bot.clone(), request)).await),
        };
        if let Err(e) = result {
            warn!(task = stage, code = e.error_code(), error = %e, "Routed handler failed");
        }
    }
}

async fn route_chat(bot: Bot, message: ChatMessage) -> HandlerResult {
    let caller = message.sender.id();
    let room = message.room().map(str::to_owned);

    match commands::try_command(&bot, &message.text, &caller, room.as_deref()).await? {
        CommandOutcome::NotFound => {
            bot.pm(&caller, COMMAND_NOT_FOUND);
        }
        CommandOutcome::NotACommand if room.is_some() && message.sender.rank == Rank::Regular => {
            bot.filters().run_all(&bot, &message).await;
        }
        _ => {}
    }
    Ok(())
}

async fn route_page(bot: Bot, request: PageRequest) -> HandlerResult {
    let Some(handler) = bot.pages().get(&request.handler_id()) else {
        debug!(page = %request.page_id, "No handler for page");
        return Ok(());
    };
    let html = handler.render(&bot, &request).await?;
    bot.send(ps_proto::Outbound::html_page(
        request.room.as_deref().unwrap_or_default(),
        &request.requester.name,
        &request.page_id,
        &html,
    ));
    Ok(())
}

// ============================================================================
// Presence
// ============================================================================

fn scope(event: &ProtocolEvent) -> &str {
    event.room().unwrap_or(DEFAULT_ROOM)
}

fn on_join(bot: &Bot, event: &ProtocolEvent) -> HandlerResult {
    let identity = Identity::parse(event.require(0)?);
    let room = scope(event);
    bot.rooms().add_user(room, &identity);
    bot.rooms().observe(room, &identity);
    Ok(())
}

fn on_leave(bot: &Bot, event: &ProtocolEvent) -> HandlerResult {
    let identity = Identity::parse(event.require(0)?);
    bot.rooms().remove_user(scope(event), &identity.id());
    Ok(())
}

fn on_rename(bot: &Bot, event: &ProtocolEvent) -> HandlerResult {
    let identity = Identity::parse(event.require(0)?);
    let old_id = to_id(event.require(1)?);
    bot.rooms().rename_user(scope(event), &old_id, &identity);
    bot.users().remove(&old_id);
    Ok(())
}
