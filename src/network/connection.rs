//! Connection - the single upstream WebSocket session.
//!
//! Each session runs two tasks and exposes a pull-based event sequence:
//!
//! ```text
//!   ┌───────────────┐  Frame/Closed/Error   ┌──────────────┐
//!   │  read task    │ ────────────────────▶ │ next_event() │ ◀── read loop (Bot::run)
//!   └───────────────┘                       └──────────────┘
//!   ┌───────────────┐  one line, then sleep(send_delay)
//!   │  write task   │ ◀──────────────────── Outbox / send()
//!   └───────────────┘
//! ```
//!
//! At most one session is active. `connect()` tears down the previous one
//! first. `destroy()` is idempotent: it stops both tasks and ends the event
//! sequence without delivering any further frames.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::ConnectionError;

/// Upper bound on waiting for the close handshake during teardown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// How to reach the server.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Full WebSocket URL.
    pub url: String,
    /// Minimum delay between outbound frames.
    pub send_delay: Duration,
    /// Deliver transient transport errors as events instead of ending the session.
    pub recover_errors: bool,
}

impl ConnectOptions {
    pub fn from_config(server: &ServerConfig) -> Self {
        Self {
            url: server.url(),
            send_delay: server.send_delay(),
            recover_errors: server.recover_errors,
        }
    }
}

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
    Errored,
}

/// One item of the inbound sequence.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// The session is established.
    Open,
    /// One text frame from the server.
    Frame(String),
    /// A recoverable transport error; the session continues.
    Error(ConnectionError),
    /// The server closed the session. No further events follow.
    Closed { code: Option<u16>, reason: String },
}

type Inbound = Result<ConnectionEvent, ConnectionError>;

/// Classification of transport read errors.
enum ReadErrorAction {
    /// Report and keep reading.
    Recoverable,
    /// End the session.
    Fatal,
}

fn classify_read_error(e: &WsError, recover_errors: bool) -> ReadErrorAction {
    if !recover_errors {
        return ReadErrorAction::Fatal;
    }
    match e {
        WsError::Utf8 | WsError::Capacity(_) | WsError::WriteBufferFull(_) => {
            ReadErrorAction::Recoverable
        }
        _ => ReadErrorAction::Fatal,
    }
}

struct Shared {
    state: Mutex<ConnectionState>,
    cancel: Mutex<CancellationToken>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) {
        let mut state = self.state.lock();
        if *state == from {
            *state = to;
        }
    }

    fn close(&self) {
        let token = self.cancel.lock().clone();
        if token.is_cancelled() {
            return;
        }
        {
            let mut state = self.state.lock();
            if matches!(*state, ConnectionState::Open | ConnectionState::Connecting) {
                *state = ConnectionState::Closing;
            }
        }
        token.cancel();
    }
}

struct Session {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    finished: bool,
}

/// Handle that destroys whichever session is current, from any task.
#[derive(Clone)]
pub struct Closer {
    shared: Arc<Shared>,
}

impl Closer {
    pub fn close(&self) {
        self.shared.close();
    }
}

/// The upstream connection.
pub struct Connection {
    options: ConnectOptions,
    shared: Arc<Shared>,
    session: Option<Session>,
}

impl Connection {
    pub fn new(options: ConnectOptions) -> Self {
        let cancel = CancellationToken::new();
        cancel.cancel();
        Self {
            options,
            shared: Arc::new(Shared {
                state: Mutex::new(ConnectionState::Disconnected),
                cancel: Mutex::new(cancel),
            }),
            session: None,
        }
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    pub fn closer(&self) -> Closer {
        Closer {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Open a session, closing any existing one first.
    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        self.destroy();

        // The session token exists before the handshake so a close while
        // Connecting aborts it.
        let cancel = CancellationToken::new();
        *self.shared.cancel.lock() = cancel.clone();
        self.shared.set_state(ConnectionState::Connecting);

        let url = self.options.url.clone();
        let handshake = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = connect_async(url.as_str()) => Some(result),
        };
        let (ws, _response) = match handshake {
            Some(Ok(ok)) => ok,
            Some(Err(source)) => {
                cancel.cancel();
                self.shared.set_state(ConnectionState::Errored);
                return Err(ConnectionError::Connect { url, source });
            }
            None => {
                info!(url = %url, "Connect aborted");
                self.shared.set_state(ConnectionState::Disconnected);
                return Err(ConnectionError::Aborted);
            }
        };
        if cancel.is_cancelled() {
            self.shared.set_state(ConnectionState::Disconnected);
            return Err(ConnectionError::Aborted);
        }

        let (sink, stream) = ws.split();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let _ = in_tx.send(Ok(ConnectionEvent::Open));

        tokio::spawn(read_loop(
            stream,
            in_tx.clone(),
            cancel.clone(),
            self.options.recover_errors,
            Arc::clone(&self.shared),
        ));
        tokio::spawn(write_loop(
            sink,
            out_rx,
            in_tx,
            cancel.clone(),
            self.options.send_delay,
            Arc::clone(&self.shared),
        ));

        self.shared.set_state(ConnectionState::Open);
        self.session = Some(Session {
            inbound: in_rx,
            outbound: out_tx,
            cancel,
            finished: false,
        });
        info!(url = %url, "Connected");
        Ok(())
    }

    /// Pull the next inbound event.
    ///
    /// `Ok(None)` means the sequence has ended (destroyed or never
    /// connected). A fatal transport error is returned once as `Err`, after
    /// which the sequence is ended.
    pub async fn next_event(&mut self) -> Result<Option<ConnectionEvent>, ConnectionError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };
        if session.finished {
            return Ok(None);
        }

        let item = tokio::select! {
            biased;
            _ = session.cancel.cancelled() => None,
            item = session.inbound.recv() => item,
        };

        match item {
            Some(Ok(event)) => {
                if matches!(event, ConnectionEvent::Closed { .. }) {
                    session.finished = true;
                }
                Ok(Some(event))
            }
            Some(Err(e)) => {
                session.finished = true;
                Err(e)
            }
            None => {
                session.finished = true;
                Ok(None)
            }
        }
    }

    /// Queue a raw `ROOM|TEXT` line on the current session.
    pub fn send(&self, raw: impl Into<String>) -> Result<(), ConnectionError> {
        let session = self
            .session
            .as_ref()
            .filter(|s| !s.finished)
            .ok_or(ConnectionError::NotConnected)?;
        session
            .outbound
            .send(raw.into())
            .map_err(|_| ConnectionError::NotConnected)
    }

    /// Sender feeding the current session's write task, for attaching an
    /// [`Outbox`](super::Outbox).
    pub fn sender(&self) -> Option<mpsc::UnboundedSender<String>> {
        self.session
            .as_ref()
            .filter(|s| !s.finished)
            .map(|s| s.outbound.clone())
    }

    /// Tear down the current session. Idempotent.
    pub fn destroy(&mut self) {
        self.shared.close();
        if let Some(session) = self.session.as_mut() {
            session.finished = true;
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shared.close();
    }
}

async fn read_loop<S>(
    mut stream: SplitStream<WebSocketStream<S>>,
    tx: mpsc::UnboundedSender<Inbound>,
    cancel: CancellationToken,
    recover_errors: bool,
    shared: Arc<Shared>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(WsMessage::Text(text))) => {
                if tx.send(Ok(ConnectionEvent::Frame(text))).is_err() {
                    return;
                }
            }
            Some(Ok(WsMessage::Close(frame))) => {
                let (code, reason) = frame
                    .map(|f| (Some(u16::from(f.code)), f.reason.into_owned()))
                    .unwrap_or_default();
                info!(code = ?code, reason = %reason, "Server closed the connection");
                if !cancel.is_cancelled() {
                    shared.set_state(ConnectionState::Disconnected);
                }
                let _ = tx.send(Ok(ConnectionEvent::Closed { code, reason }));
                return;
            }
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {
                // Control frames are answered by tungstenite
                continue;
            }
            Some(Ok(WsMessage::Binary(_))) => {
                // Text-only protocol, skip binary frames
                continue;
            }
            Some(Err(e)) => match classify_read_error(&e, recover_errors) {
                ReadErrorAction::Recoverable => {
                    warn!(error = %e, "Recoverable transport error");
                    let _ = tx.send(Ok(ConnectionEvent::Error(ConnectionError::Transport(e))));
                }
                ReadErrorAction::Fatal => {
                    if cancel.is_cancelled() {
                        return;
                    }
                    error!(error = %e, "Transport read failed");
                    shared.set_state(ConnectionState::Errored);
                    let _ = tx.send(Err(ConnectionError::Transport(e)));
                    return;
                }
            },
            None => {
                if !cancel.is_cancelled() {
                    shared.set_state(ConnectionState::Disconnected);
                }
                let _ = tx.send(Ok(ConnectionEvent::Closed {
                    code: None,
                    reason: "stream ended".to_string(),
                }));
                return;
            }
        }
    }
}

async fn write_loop<S>(
    mut sink: SplitSink<WebSocketStream<S>, WsMessage>,
    mut rx: mpsc::UnboundedReceiver<String>,
    errors: mpsc::UnboundedSender<Inbound>,
    cancel: CancellationToken,
    send_delay: Duration,
    shared: Arc<Shared>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = rx.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        debug!(line = %line, "Sending");
        if let Err(e) = sink.send(WsMessage::Text(line)).await {
            if !cancel.is_cancelled() {
                error!(error = %e, "Transport write failed");
                shared.set_state(ConnectionState::Errored);
                let _ = errors.send(Err(ConnectionError::Transport(e)));
            }
            return;
        }

        if !send_delay.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(send_delay) => {}
            }
        }
    }

    if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
        debug!("Close handshake timed out");
    }
    shared.transition(ConnectionState::Closing, ConnectionState::Disconnected);
}
