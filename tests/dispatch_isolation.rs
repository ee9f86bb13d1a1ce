//! Integration tests for watcher dispatch and failure isolation.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::TestBot;
use parking_lot::Mutex;
use ps_proto::ProtocolEvent;
use psbot::Bot;
use psbot::dispatch::Watcher;
use psbot::error::{HandlerError, HandlerResult};

#[derive(Clone, Default)]
struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

struct Failing;

#[async_trait]
impl Watcher for Failing {
    async fn on_event(&self, _bot: &Bot, _event: &ProtocolEvent) -> HandlerResult {
        Err(HandlerError::Internal("watcher failed".into()))
    }
}

struct Recording(Log);

#[async_trait]
impl Watcher for Recording {
    async fn on_event(&self, _bot: &Bot, event: &ProtocolEvent) -> HandlerResult {
        self.0.push(format!("{}:{}", event.kind(), event.rest_from(0)));
        Ok(())
    }
}

#[tokio::test]
async fn test_failing_watcher_does_not_stop_siblings_or_next_frame() {
    let t = TestBot::new();
    let log = Log::default();
    t.bot.watch("x", Failing);
    t.bot.watch("x", Recording(log.clone()));

    t.feed("|x|first").await;
    t.feed("|x|second").await;

    assert_eq!(log.entries(), vec!["x:first", "x:second"]);
}

#[tokio::test]
async fn test_panicking_closure_is_isolated() {
    let t = TestBot::new();
    let log = Log::default();
    t.bot.on("x", |_, event| {
        if event.arg(0) == Some("boom") {
            panic!("watcher panicked");
        }
        Ok(())
    });
    t.bot.watch("x", Recording(log.clone()));

    t.feed("|x|boom\n|x|calm").await;
    assert_eq!(log.entries(), vec!["x:boom", "x:calm"]);
}

#[tokio::test]
async fn test_watchers_are_keyed_by_normalized_type() {
    let t = TestBot::new();
    let log = Log::default();
    t.bot.watch("N", Recording(log.clone()));

    t.feed(">lobby\n|n|+Bobby|bob\n|N| carol|caroline\n|name| dave|david").await;
    assert_eq!(
        log.entries(),
        vec!["n:+Bobby|bob", "N: carol|caroline"],
        "`name` normalizes to a different key"
    );
}

#[tokio::test]
async fn test_once_watcher_removed_even_when_failing() {
    let t = TestBot::new();
    let log = Log::default();
    t.bot.watch_once("x", Failing);
    t.bot.watch_once("y", Recording(log.clone()));
    assert_eq!(t.bot.dispatcher().watcher_count("x"), 1);

    t.feed("|x|1\n|x|2\n|y|a\n|y|b").await;
    assert_eq!(t.bot.dispatcher().watcher_count("x"), 0);
    assert_eq!(t.bot.dispatcher().watcher_count("y"), 0);
    assert_eq!(log.entries(), vec!["y:a"]);
}

#[tokio::test]
async fn test_events_dispatch_in_frame_order_with_builtins_first() {
    let t = TestBot::new();
    let seen = Log::default();
    let observed = seen.clone();
    // By the time a `j` watcher runs, the built-in has already recorded presence.
    t.bot.on("j", move |bot, event| {
        let room = event.room().unwrap_or_default();
        let present = bot
            .rooms()
            .get(room)
            .is_some_and(|r| r.users.contains_key(&ps_proto::to_id(event.arg(0).unwrap_or_default())));
        observed.push(format!("{}:{}", event.arg(0).unwrap_or_default(), present));
        Ok(())
    });

    t.feed(">techcode\n|j|+alice\n|J| bob\n|l|+alice\n|j|+alice").await;
    assert_eq!(seen.entries(), vec!["+alice:true", " bob:true", "+alice:true"]);

    let room = t.bot.rooms().get("techcode").unwrap();
    assert_eq!(room.users.len(), 2);
    assert_eq!(room.rank_of("alice"), Some(ps_proto::Rank::Voice));
}

#[tokio::test]
async fn test_rename_moves_presence_and_evicts_user() {
    let t = TestBot::new();
    t.bot.users().insert(psbot::cache::User::new("bob"));

    t.feed(">lobby\n|J|%bob\n|N|%Robert|bob").await;

    let room = t.bot.rooms().get("lobby").unwrap();
    assert!(room.users.contains_key("robert"));
    assert!(!room.users.contains_key("bob"));
    assert_eq!(room.rank_of("robert"), Some(ps_proto::Rank::Driver));
    assert!(t.bot.users().get("bob").is_none());
}

#[tokio::test]
async fn test_raw_and_unknown_lines_are_harmless() {
    let mut t = TestBot::new();
    let log = Log::default();
    t.bot.watch("", Recording(log.clone()));
    t.feed("plain log text\n\n|unknowntype|a|b\n|c:|\n|queryresponse").await;

    assert_eq!(log.entries(), vec![":plain log text"]);
    assert!(t.take_sent().is_empty());
}
