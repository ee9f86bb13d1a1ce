//! Sans-IO login state machine.
//!
//! The login handshake does not run over the chat connection itself:
//!
//! ```text
//!   server ── |challstr|KEY|CHALLENGE ──▶ machine ── Authenticate(request) ──▶ caller
//!   caller ── POST request to login server, body ──▶ machine ── Send(/trn ...) ──▶ server
//!   server ── |updateuser|NAME|... ──▶ machine ── Send(/join ...), Complete
//! ```
//!
//! Like the rest of this crate the machine performs no I/O. It consumes
//! events and response bodies and produces [`LoginAction`]s; the caller does
//! the HTTP exchange and the sending.
//!
//! # Example
//!
//! ```
//! use ps_proto::{parse_chunk, LoginAction, LoginMachine, LoginSettings, LoginState};
//!
//! let mut machine = LoginMachine::new(LoginSettings {
//!     name: "MyBot".into(),
//!     rooms: vec!["lobby".into()],
//!     ..Default::default()
//! });
//!
//! let challstr = parse_chunk("|challstr|4|abcdef").remove(0);
//! let actions = machine.on_challstr(challstr.args()).unwrap();
//! assert!(matches!(actions[0], LoginAction::Authenticate(_)));
//!
//! let actions = machine.on_login_response(r#"]{"assertion":"signed"}"#).unwrap();
//! assert!(matches!(&actions[0], LoginAction::Send(line) if line.text == "/trn MyBot,0,signed"));
//!
//! let update = parse_chunk("|updateuser| MyBot|1|1|{}").remove(0);
//! let actions = machine.on_updateuser(update.args());
//! assert_eq!(machine.state(), &LoginState::Named);
//! assert!(actions.iter().any(|a| matches!(a, LoginAction::Complete)));
//! ```

use serde::Deserialize;
use serde_json::Value;

use crate::error::LoginError;
use crate::identity::Identity;
use crate::outbound::Outbound;

/// The `act` value sent to the login server.
pub const LOGIN_ACTION: &str = "login";

/// Prefix of an assertion that is really an error message.
pub const ASSERTION_ESCAPE: &str = ";;";

/// Login progress within one session.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum LoginState {
    /// No challenge seen yet.
    #[default]
    Idle,
    /// Challenge received; credential exchange or rename confirmation pending.
    Authenticating,
    /// The server confirmed the configured name.
    Named,
}

/// What the machine needs to know about the account and post-login setup.
#[derive(Clone, Debug, Default)]
pub struct LoginSettings {
    /// Account name.
    pub name: String,
    /// Password; `None` logs in without one.
    pub pass: Option<String>,
    /// Rooms joined once the name is confirmed.
    pub rooms: Vec<String>,
    /// Avatar set once the name is confirmed.
    pub avatar: Option<String>,
    /// Status set once the name is confirmed.
    pub status: Option<String>,
}

/// Form fields for the credential exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginRequest {
    /// Account name.
    pub name: String,
    /// Password, empty when none is configured.
    pub pass: String,
    /// Always [`LOGIN_ACTION`].
    pub act: &'static str,
    /// The challenge string.
    pub challstr: String,
    /// The challenge key id.
    pub challengekeyid: String,
}

impl LoginRequest {
    /// The request as form-encodable key/value pairs.
    pub fn form(&self) -> [(&'static str, &str); 5] {
        [
            ("name", &self.name),
            ("pass", &self.pass),
            ("act", self.act),
            ("challstr", &self.challstr),
            ("challengekeyid", &self.challengekeyid),
        ]
    }
}

/// Actions produced by the login machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginAction {
    /// Perform the out-of-band credential exchange and feed the response
    /// body back through [`LoginMachine::on_login_response`].
    Authenticate(LoginRequest),
    /// Send this line over the connection.
    Send(Outbound),
    /// Login finished; post-login lines have been emitted.
    Complete,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    actionerror: Option<String>,
    #[serde(default)]
    assertion: Option<Value>,
}

/// Sans-IO state machine for the challenge/response login.
#[derive(Clone, Debug)]
pub struct LoginMachine {
    settings: LoginSettings,
    state: LoginState,
    current: Option<Identity>,
    assertion_sent: bool,
    post_login_done: bool,
}

impl LoginMachine {
    /// Create a machine in [`LoginState::Idle`].
    #[must_use]
    pub fn new(settings: LoginSettings) -> Self {
        Self {
            settings,
            state: LoginState::Idle,
            current: None,
            assertion_sent: false,
            post_login_done: false,
        }
    }

    /// Current login state.
    #[must_use]
    pub fn state(&self) -> &LoginState {
        &self.state
    }

    /// The settings this machine was built with.
    pub fn settings(&self) -> &LoginSettings {
        &self.settings
    }

    /// Name the server last reported for this client.
    pub fn current_name(&self) -> Option<&str> {
        self.current.as_ref().map(|identity| identity.name.as_str())
    }

    /// Forget all session progress. Call when a new connection starts.
    pub fn reset(&mut self) {
        self.state = LoginState::Idle;
        self.current = None;
        self.assertion_sent = false;
        self.post_login_done = false;
    }

    /// Handle `|challstr|KEY|CHALLENGE`.
    ///
    /// The challenge itself may contain pipes, so every field after the key
    /// is part of it.
    pub fn on_challstr(&mut self, args: &[String]) -> Result<Vec<LoginAction>, LoginError> {
        let (key, challenge) = match args.split_first() {
            Some((key, rest)) if !key.is_empty() && !rest.is_empty() => (key, rest.join("|")),
            _ => return Err(LoginError::BadChallenge(args.join("|"))),
        };

        self.state = LoginState::Authenticating;
        self.assertion_sent = false;

        Ok(vec![LoginAction::Authenticate(LoginRequest {
            name: self.settings.name.clone(),
            pass: self.settings.pass.clone().unwrap_or_default(),
            act: LOGIN_ACTION,
            challstr: challenge,
            challengekeyid: key.clone(),
        })])
    }

    /// Handle the login server's response body.
    ///
    /// The body starts with one throwaway character before the JSON.
    pub fn on_login_response(&mut self, body: &str) -> Result<Vec<LoginAction>, LoginError> {
        let result = Self::extract_assertion(body);
        match result {
            Ok(assertion) => {
                self.assertion_sent = true;
                Ok(vec![LoginAction::Send(Outbound::trn(
                    &self.settings.name,
                    &assertion,
                ))])
            }
            Err(e) => {
                self.state = LoginState::Idle;
                Err(e)
            }
        }
    }

    fn extract_assertion(body: &str) -> Result<String, LoginError> {
        let mut chars = body.chars();
        if chars.next().is_none() {
            return Err(LoginError::Malformed("empty response".to_string()));
        }
        let json = chars.as_str();

        let response: LoginResponse =
            serde_json::from_str(json).map_err(|e| LoginError::Malformed(e.to_string()))?;

        if let Some(error) = response.actionerror {
            return Err(LoginError::Rejected(error));
        }

        match response.assertion {
            Some(Value::String(assertion)) => match assertion.strip_prefix(ASSERTION_ESCAPE) {
                Some(reason) => Err(LoginError::Refused(reason.to_string())),
                None => Ok(assertion),
            },
            _ => Err(LoginError::MissingAssertion(json.to_string())),
        }
    }

    /// Handle `|updateuser|NAME|NAMED|AVATAR|SETTINGS`.
    ///
    /// The first confirmation of a non-guest name after the assertion was
    /// sent completes login. Post-login lines are emitted once per session.
    pub fn on_updateuser(&mut self, args: &[String]) -> Vec<LoginAction> {
        let Some(raw) = args.first() else {
            return Vec::new();
        };
        let identity = Identity::parse_bare(raw);
        let confirmed = !identity.is_guest();
        self.current = Some(identity);

        if self.state != LoginState::Authenticating || !self.assertion_sent || !confirmed {
            return Vec::new();
        }

        self.state = LoginState::Named;
        if self.post_login_done {
            return Vec::new();
        }
        self.post_login_done = true;

        let mut actions: Vec<LoginAction> = self
            .settings
            .rooms
            .iter()
            .map(|room| LoginAction::Send(Outbound::join(room)))
            .collect();
        if let Some(avatar) = &self.settings.avatar {
            actions.push(LoginAction::Send(Outbound::avatar(avatar)));
        }
        if let Some(status) = &self.settings.status {
            actions.push(LoginAction::Send(Outbound::status(status)));
        }
        actions.push(LoginAction::Complete);
        actions
    }
}
