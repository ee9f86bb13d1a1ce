//! Event dispatch.
//!
//! Every inbound frame is parsed into events, and each event goes through
//! one sequential pass:
//!
//! ```text
//!   frame ──▶ parse_chunk ──▶ event₁ ──▶ built-in ──▶ watcher₁ ──▶ watcher₂ ...
//!                             event₂ ──▶ built-in ──▶ ...
//! ```
//!
//! Each step is awaited before the next one starts, and each is isolated: an
//! error or panic is logged and the pass continues. Watchers are keyed by
//! the identifier form of the event type (`J` and `j` share watchers) and
//! run in registration order.

mod builtin;
mod queue;

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::RwLock;
use ps_proto::{ProtocolEvent, parse_chunk, to_id};
use tracing::{Instrument, debug, warn};

use crate::bot::Bot;
use crate::error::{HandlerError, HandlerResult};
use crate::telemetry::spans;

pub(crate) use queue::RoutingQueue;

/// Handle returned by watcher registration.
pub type WatcherId = u64;

/// Observer for one event type.
///
/// Watchers run inside the read loop; the next frame is not pulled until
/// they return. A watcher that needs a query response must hand the work to
/// [`Bot::spawn`] instead of awaiting the query inline.
#[async_trait]
pub trait Watcher: Send + Sync {
    async fn on_event(&self, bot: &Bot, event: &ProtocolEvent) -> HandlerResult;
}

/// Adapter for plain synchronous closures.
pub struct FnWatcher<F>(pub F);

#[async_trait]
impl<F> Watcher for FnWatcher<F>
where
    F: Fn(&Bot, &ProtocolEvent) -> HandlerResult + Send + Sync,
{
    async fn on_event(&self, bot: &Bot, event: &ProtocolEvent) -> HandlerResult {
        (self.0)(bot, event)
    }
}

struct Entry {
    id: WatcherId,
    watcher: Arc<dyn Watcher>,
    once: bool,
}

/// Watcher registry plus the dispatch pass.
#[derive(Default)]
pub struct Dispatcher {
    watchers: RwLock<HashMap<String, Vec<Entry>>>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a watcher for every event of `kind`.
    pub fn watch(&self, kind: &str, watcher: Arc<dyn Watcher>) -> WatcherId {
        self.insert(kind, watcher, false)
    }

    /// Register a watcher that is removed after its first invocation,
    /// whether it succeeds or not.
    pub fn watch_once(&self, kind: &str, watcher: Arc<dyn Watcher>) -> WatcherId {
        self.insert(kind, watcher, true)
    }

    fn insert(&self, kind: &str, watcher: Arc<dyn Watcher>, once: bool) -> WatcherId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.watchers
            .write()
            .entry(to_id(kind))
            .or_default()
            .push(Entry { id, watcher, once });
        id
    }

    /// Remove a watcher. Returns `false` if it was not registered.
    pub fn unwatch(&self, id: WatcherId) -> bool {
        let mut watchers = self.watchers.write();
        let mut removed = false;
        watchers.retain(|_, entries| {
            if let Some(position) = entries.iter().position(|e| e.id == id) {
                entries.remove(position);
                removed = true;
            }
            !entries.is_empty()
        });
        removed
    }

    /// Number of watchers registered for `kind`.
    pub fn watcher_count(&self, kind: &str) -> usize {
        self.watchers.read().get(&to_id(kind)).map_or(0, Vec::len)
    }

    /// Parse one frame and dispatch its events in order.
    pub async fn handle_message(&self, bot: &Bot, raw: &str) {
        for event in parse_chunk(raw) {
            let span = spans::event(event.kind(), event.room());
            self.dispatch(bot, &event).instrument(span).await;
        }
    }

    /// Run the built-in handler and then the watchers for one event.
    pub async fn dispatch(&self, bot: &Bot, event: &ProtocolEvent) {
        if event.is_raw() {
            debug!(line = ?event.arg(0), "Raw line");
        }

        if let Err(e) = isolate(builtin::handle(bot, event)).await {
            log_failure("builtin", event, &e);
        }

        let kind = event.normalized_kind();
        let snapshot: Vec<(WatcherId, Arc<dyn Watcher>, bool)> = self
            .watchers
            .read()
            .get(&kind)
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| (e.id, Arc::clone(&e.watcher), e.once))
                    .collect()
            })
            .unwrap_or_default();

        for (id, watcher, once) in snapshot {
            // A once-watcher is claimed before it runs so it can never fire twice.
            if once && !self.unwatch(id) {
                continue;
            }
            if let Err(e) = isolate(watcher.on_event(bot, event)).await {
                log_failure("watcher", event, &e);
            }
        }
    }
}

/// Run a handler future, turning a panic into [`HandlerError::Panicked`].
pub(crate) async fn isolate<F>(future: F) -> HandlerResult
where
    F: Future<Output = HandlerResult>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn log_failure(stage: &'static str, event: &ProtocolEvent, error: &HandlerError) {
    warn!(
        stage,
        kind = %event.kind(),
        args = ?event.args(),
        code = error.error_code(),
        error = %error,
        "Event handler failed"
    );
}
