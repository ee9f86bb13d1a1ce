//! The engine context.
//!
//! [`Bot`] owns every piece of shared state: settings, the outbox, the query
//! correlator, the login machine, the registries and the caches. It is a
//! cheap clone over one `Arc`, handed to every handler.
//!
//! Lifecycle:
//!
//! ```text
//!   Bot::from_config ──▶ register extensions ──▶ supervise()
//!                                                  │
//!                     ┌────────────────────────────┘
//!                     ▼
//!              connect ──▶ run (read loop) ──▶ teardown ──▶ wait ──▶ connect ...
//! ```
//!
//! `run` pulls frames one at a time and dispatches each fully before the
//! next. Work that may wait on the server (command routing, filters, page
//! rendering) runs on a tracked background worker, in arrival order, so the
//! read loop keeps delivering the responses it waits for.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use ps_proto::{LoginMachine, LoginSettings, Outbound, to_id};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, warn};

use crate::cache::{Room, RoomCache, User, UserCache};
use crate::commands::{Command, CommandRegistry, Filter, FilterChain, PageHandler, PageRegistry};
use crate::config::{Config, RoomsFile};
use crate::dispatch::{Dispatcher, FnWatcher, RoutingQueue, Watcher, WatcherId, isolate};
use crate::error::{ConnectionError, EngineError, HandlerResult, QueryError};
use crate::login::{HttpLoginClient, LoginClient};
use crate::network::{ConnectOptions, Connection, ConnectionEvent, Outbox, ReconnectPolicy};
use crate::query::QueryCorrelator;
use crate::telemetry::spans;

/// Immutable settings resolved from configuration.
#[derive(Debug, Clone)]
pub struct BotSettings {
    /// Configured account name.
    pub name: String,
    /// Id form of `name`.
    pub id: String,
    pub command_token: String,
    /// Sysop user ids.
    pub sysops: Vec<String>,
    pub login: LoginSettings,
    pub login_url: String,
    /// `None` waits forever.
    pub query_timeout: Option<Duration>,
}

impl BotSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            name: config.bot.name.clone(),
            id: to_id(&config.bot.name),
            command_token: config.bot.command_token.clone(),
            sysops: config.bot.sysops.iter().map(|s| to_id(s)).collect(),
            login: config.bot.login_settings(),
            login_url: config.login.url.clone(),
            query_timeout: config.server.query_timeout(),
        }
    }

    pub fn is_sysop(&self, user: &str) -> bool {
        let id = to_id(user);
        self.sysops.iter().any(|sysop| *sysop == id)
    }
}

struct BotInner {
    settings: BotSettings,
    outbox: Outbox,
    queries: QueryCorrelator,
    login: Mutex<LoginMachine>,
    login_client: Arc<dyn LoginClient>,
    dispatcher: Dispatcher,
    routing: RoutingQueue,
    commands: CommandRegistry,
    filters: FilterChain,
    pages: PageRegistry,
    users: UserCache,
    rooms: RoomCache,
    /// Rooms joined at runtime, mirrored to `rooms_file`.
    joined: Mutex<BTreeSet<String>>,
    rooms_file: Option<RoomsFile>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
    fatal: Mutex<Option<EngineError>>,
}

/// Builder for [`Bot`].
pub struct BotBuilder {
    settings: BotSettings,
    login_client: Option<Arc<dyn LoginClient>>,
    rooms_file: Option<RoomsFile>,
}

impl BotBuilder {
    /// Replace the HTTP login client.
    pub fn login_client(mut self, client: Arc<dyn LoginClient>) -> Self {
        self.login_client = Some(client);
        self
    }

    /// Remember rooms joined at runtime in `file`, rejoining them after
    /// every login.
    pub fn rooms_file(mut self, file: RoomsFile) -> Self {
        self.rooms_file = Some(file);
        self
    }

    pub fn build(self) -> Bot {
        let outbox = Outbox::default();
        let login_client = self
            .login_client
            .unwrap_or_else(|| Arc::new(HttpLoginClient::new(self.settings.login_url.clone())));
        let joined = self
            .rooms_file
            .as_ref()
            .map(RoomsFile::load)
            .unwrap_or_default();
        Bot {
            inner: Arc::new(BotInner {
                queries: QueryCorrelator::new(outbox.clone(), self.settings.query_timeout),
                login: Mutex::new(LoginMachine::new(self.settings.login.clone())),
                settings: self.settings,
                outbox,
                login_client,
                dispatcher: Dispatcher::new(),
                routing: RoutingQueue::default(),
                commands: CommandRegistry::new(),
                filters: FilterChain::new(),
                pages: PageRegistry::new(),
                users: UserCache::new(),
                rooms: RoomCache::new(),
                joined: Mutex::new(joined),
                rooms_file: self.rooms_file,
                tasks: TaskTracker::new(),
                shutdown: CancellationToken::new(),
                fatal: Mutex::new(None),
            }),
        }
    }
}

/// Shared engine handle.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

impl Bot {
    pub fn builder(settings: BotSettings) -> BotBuilder {
        BotBuilder {
            settings,
            login_client: None,
            rooms_file: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let builder = Self::builder(BotSettings::from_config(config));
        match &config.bot.rooms_file {
            Some(path) => builder.rooms_file(RoomsFile::new(path)).build(),
            None => builder.build(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn settings(&self) -> &BotSettings {
        &self.inner.settings
    }

    pub fn outbox(&self) -> &Outbox {
        &self.inner.outbox
    }

    pub fn queries(&self) -> &QueryCorrelator {
        &self.inner.queries
    }

    pub fn login(&self) -> &Mutex<LoginMachine> {
        &self.inner.login
    }

    pub fn login_client(&self) -> &Arc<dyn LoginClient> {
        &self.inner.login_client
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub(crate) fn routing(&self) -> &RoutingQueue {
        &self.inner.routing
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.inner.commands
    }

    pub fn filters(&self) -> &FilterChain {
        &self.inner.filters
    }

    pub fn pages(&self) -> &PageRegistry {
        &self.inner.pages
    }

    pub fn users(&self) -> &UserCache {
        &self.inner.users
    }

    pub fn rooms(&self) -> &RoomCache {
        &self.inner.rooms
    }

    /// The id the server currently knows us by, falling back to the
    /// configured name before the first `updateuser`.
    pub fn self_id(&self) -> String {
        self.inner
            .login
            .lock()
            .current_name()
            .map(to_id)
            .unwrap_or_else(|| self.inner.settings.id.clone())
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    pub fn register_command(&self, command: impl Command + 'static) {
        self.inner.commands.register(Arc::new(command));
    }

    pub fn register_filter(&self, filter: impl Filter + 'static) {
        self.inner.filters.register(Arc::new(filter));
    }

    pub fn register_page(&self, page: impl PageHandler + 'static) {
        self.inner.pages.register(Arc::new(page));
    }

    pub fn watch(&self, kind: &str, watcher: impl Watcher + 'static) -> WatcherId {
        self.inner.dispatcher.watch(kind, Arc::new(watcher))
    }

    pub fn watch_once(&self, kind: &str, watcher: impl Watcher + 'static) -> WatcherId {
        self.inner.dispatcher.watch_once(kind, Arc::new(watcher))
    }

    /// Watch with a synchronous closure.
    pub fn on<F>(&self, kind: &str, callback: F) -> WatcherId
    where
        F: Fn(&Bot, &ps_proto::ProtocolEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.watch(kind, FnWatcher(callback))
    }

    pub fn unwatch(&self, id: WatcherId) -> bool {
        self.inner.dispatcher.unwatch(id)
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Queue a line. Returns `false` if no session is attached.
    pub fn send(&self, line: Outbound) -> bool {
        self.inner.outbox.send(line)
    }

    pub fn say(&self, room: &str, text: &str) -> bool {
        self.send(Outbound::room(room, text))
    }

    pub fn pm(&self, user: &str, text: &str) -> bool {
        self.send(Outbound::pm(user, text))
    }

    /// Join a room and remember it for the next login.
    pub fn join(&self, room: &str) -> bool {
        self.remember_room(room, true);
        self.send(Outbound::join(room))
    }

    /// Leave a room and forget it.
    pub fn leave(&self, room: &str) -> bool {
        self.remember_room(room, false);
        self.send(Outbound::leave(room))
    }

    /// Rooms joined at runtime, in id form.
    pub fn saved_rooms(&self) -> Vec<String> {
        self.inner.joined.lock().iter().cloned().collect()
    }

    fn remember_room(&self, room: &str, joined: bool) {
        let id = to_id(room);
        if id.is_empty() {
            return;
        }
        let mut rooms = self.inner.joined.lock();
        let changed = if joined {
            rooms.insert(id)
        } else {
            rooms.remove(&id)
        };
        // Saved under the lock so concurrent joins cannot write out of order
        if let (true, Some(file)) = (changed, &self.inner.rooms_file)
            && let Err(e) = file.save(&rooms)
        {
            warn!(path = %file.path().display(), error = %e, "Failed to save rooms");
        }
    }

    /// Join saved rooms the login settings do not already cover.
    pub(crate) fn rejoin_saved_rooms(&self) {
        let configured: Vec<String> = self
            .inner
            .settings
            .login
            .rooms
            .iter()
            .map(|room| to_id(room))
            .collect();
        for room in self.saved_rooms() {
            if !configured.contains(&room) {
                debug!(room = %room, "Rejoining saved room");
                self.send(Outbound::join(&room));
            }
        }
    }

    // ------------------------------------------------------------------
    // Entity lookups
    // ------------------------------------------------------------------

    /// Look a user up, querying `userdetails` on a cache miss.
    ///
    /// `None` for unknown or offline users and for failed queries. Offline
    /// users are not cached.
    pub async fn user(&self, name: &str) -> Option<User> {
        let id = to_id(name);
        if id.is_empty() {
            return None;
        }
        if let Some(user) = self.inner.users.get(&id) {
            return Some(user);
        }
        let data = match self.inner.queries.query("userdetails", &id).await {
            Ok(data) => data,
            Err(e) => {
                debug!(user = %id, error = %e, "User lookup failed");
                return None;
            }
        };
        let user = User::from_details(&data)?;
        self.inner.users.insert(user.clone());
        Some(user)
    }

    /// Look a room up, querying `roominfo` unless a response was already applied.
    pub async fn room(&self, name: &str) -> Option<Room> {
        let id = to_id(name);
        if id.is_empty() {
            return None;
        }
        if let Some(room) = self.inner.rooms.get(&id)
            && room.loaded
        {
            return Some(room);
        }
        let data = match self.inner.queries.query("roominfo", &id).await {
            Ok(data) => data,
            Err(e) => {
                debug!(room = %id, error = %e, "Room lookup failed");
                return None;
            }
        };
        if data.is_null() {
            return None;
        }
        self.inner
            .rooms
            .update(&id, |room| room.apply_info(&data).then(|| room.clone()))
    }

    // ------------------------------------------------------------------
    // Tasks and lifecycle
    // ------------------------------------------------------------------

    /// Run a handler off the read loop. Failures and panics are logged.
    pub fn spawn<F>(&self, label: &'static str, future: F)
    where
        F: Future<Output = HandlerResult> + Send + 'static,
    {
        self.inner.tasks.spawn(async move {
            if let Err(e) = isolate(future).await {
                warn!(task = label, code = e.error_code(), error = %e, "Background handler failed");
            }
        });
    }

    /// Wait until every background handler spawned so far has finished.
    pub async fn drain_tasks(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
    }

    /// Feed one raw frame through the dispatcher.
    pub async fn handle_message(&self, raw: &str) {
        self.inner.dispatcher.handle_message(self, raw).await;
    }

    /// Stop the read loop and the supervisor.
    pub fn shutdown(&self) {
        if !self.inner.shutdown.is_cancelled() {
            info!("Shutting down");
            self.inner.shutdown.cancel();
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Record an error that ends the current session. The read loop
    /// returns it after the current frame. The first error wins.
    pub fn fail(&self, error: EngineError) {
        let mut fatal = self.inner.fatal.lock();
        if fatal.is_none() {
            *fatal = Some(error);
        }
    }

    pub fn take_fatal(&self) -> Option<EngineError> {
        self.inner.fatal.lock().take()
    }

    /// Drive one connected session until it ends.
    ///
    /// On return the outbox is detached, outstanding queries are rejected
    /// and the connection is destroyed. `Ok` means shutdown or a local
    /// destroy; a server close or transport failure is an error.
    pub async fn run(&self, connection: &mut Connection) -> Result<(), EngineError> {
        let Some(sender) = connection.sender() else {
            return Err(ConnectionError::NotConnected.into());
        };
        self.inner.outbox.attach(sender);
        self.inner.login.lock().reset();
        self.inner.fatal.lock().take();

        let span = spans::session(&connection.options().url);
        let result = self.pump(connection).instrument(span).await;

        self.inner.outbox.detach();
        let rejected = self.inner.queries.reject_all(QueryError::Closed);
        connection.destroy();
        info!(rejected, "Session ended");
        result
    }

    async fn pump(&self, connection: &mut Connection) -> Result<(), EngineError> {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.inner.shutdown.cancelled() => return Ok(()),
                event = connection.next_event() => event?,
            };
            match event {
                None => return Ok(()),
                Some(ConnectionEvent::Open) => info!("Session open"),
                Some(ConnectionEvent::Frame(raw)) => {
                    self.handle_message(&raw).await;
                    if let Some(e) = self.take_fatal() {
                        return Err(e);
                    }
                }
                Some(ConnectionEvent::Error(e)) => {
                    warn!(error = %e, "Recoverable transport error");
                }
                Some(ConnectionEvent::Closed { code, reason }) => {
                    return Err(ConnectionError::Closed { code, reason }.into());
                }
            }
        }
    }

    /// Connect, run, and reconnect per `policy` until shutdown or a
    /// non-retryable error. Waits for background handlers before returning.
    pub async fn supervise(
        &self,
        options: ConnectOptions,
        policy: ReconnectPolicy,
    ) -> Result<(), EngineError> {
        let mut connection = Connection::new(options);
        let outcome = loop {
            let connected = tokio::select! {
                biased;
                _ = self.inner.shutdown.cancelled() => break Ok(()),
                connected = connection.connect() => connected,
            };
            let result = match connected {
                Ok(()) => self.run(&mut connection).await,
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(()) if self.is_stopping() => break Ok(()),
                Ok(()) => info!("Session closed locally"),
                Err(e) if !e.is_retryable() => {
                    error!(error = %e, "Giving up");
                    break Err(e);
                }
                Err(e) => warn!(error = %e, "Session failed"),
            }
            if !policy.wait(&self.inner.shutdown).await {
                break Ok(());
            }
        };

        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        outcome
    }
}

#[cfg(test)]
struct NoLoginServer;

#[cfg(test)]
#[async_trait::async_trait]
impl LoginClient for NoLoginServer {
    async fn authenticate(
        &self,
        _request: &ps_proto::LoginRequest,
    ) -> Result<String, crate::error::HandlerError> {
        Err(crate::error::HandlerError::LoginTransport(
            "no login server in unit tests".into(),
        ))
    }
}

#[cfg(test)]
impl Bot {
    pub(crate) fn for_tests() -> Self {
        let settings = BotSettings {
            name: "MyBot".into(),
            id: "mybot".into(),
            command_token: "!".into(),
            sysops: vec!["sysop".into()],
            login: LoginSettings {
                name: "MyBot".into(),
                ..LoginSettings::default()
            },
            login_url: String::new(),
            query_timeout: Some(Duration::from_millis(200)),
        };
        Self::builder(settings)
            .login_client(Arc::new(NoLoginServer))
            .build()
    }

    pub(crate) fn for_tests_with_outbox() -> (Self, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let bot = Self::for_tests();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        bot.outbox().attach(tx);
        (bot, rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn user_lookup_queries_and_caches() {
        let (bot, mut sent) = Bot::for_tests_with_outbox();
        let lookup = {
            let bot = bot.clone();
            tokio::spawn(async move { bot.user("Bob").await })
        };
        assert_eq!(sent.recv().await.unwrap(), "|/crq userdetails bob");
        bot.handle_message(&format!(
            "|queryresponse|userdetails|{}",
            json!({"id": "bob", "name": "Bob", "group": "+", "rooms": {}})
        ))
        .await;

        let user = lookup.await.unwrap().unwrap();
        assert_eq!(user.group, ps_proto::Rank::Voice);
        assert!(bot.users().get("bob").is_some());
        // Cached: no second query.
        assert!(bot.user("bob").await.is_some());
        assert!(sent.try_recv().is_err());
    }

    #[tokio::test]
    async fn offline_user_is_not_cached() {
        let (bot, mut sent) = Bot::for_tests_with_outbox();
        let lookup = {
            let bot = bot.clone();
            tokio::spawn(async move { bot.user("ghost").await })
        };
        sent.recv().await.unwrap();
        bot.handle_message(r#"|queryresponse|userdetails|{"id":"ghost","rooms":false}"#)
            .await;
        assert!(lookup.await.unwrap().is_none());
        assert!(bot.users().is_empty());
    }

    #[tokio::test]
    async fn room_lookup_times_out_to_none() {
        let bot = Bot::for_tests();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        bot.outbox().attach(tx);
        assert!(bot.room("nowhere").await.is_none());
        assert_eq!(bot.queries().outstanding("roominfo"), 0);
    }

    #[tokio::test]
    async fn first_fatal_error_wins() {
        let bot = Bot::for_tests();
        bot.fail(EngineError::LoginTransport("first".into()));
        bot.fail(EngineError::LoginTransport("second".into()));
        assert!(matches!(
            bot.take_fatal(),
            Some(EngineError::LoginTransport(reason)) if reason == "first"
        ));
        assert!(bot.take_fatal().is_none());
    }

    #[test]
    fn sysops_are_ids() {
        let mut config: Config = toml::from_str("[bot]\nname = \"MyBot\"\nsysops = [\"Sys Op\"]\n").unwrap();
        config.server.query_timeout_ms = 0;
        let settings = BotSettings::from_config(&config);
        assert!(settings.is_sysop("sysop"));
        assert!(settings.is_sysop("SYS OP"));
        assert!(!settings.is_sysop("bob"));
        assert_eq!(settings.query_timeout, None);
        assert_eq!(settings.id, "mybot");
    }
}
