//! Test bot with a captured outbox.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use ps_proto::{LoginRequest, LoginSettings};
use psbot::config::RoomsFile;
use psbot::error::HandlerError;
use psbot::login::LoginClient;
use psbot::{Bot, BotSettings};
use tokio::sync::mpsc;

/// Login client returning a fixed response body and recording requests.
pub struct StubLoginClient {
    response: Result<String, String>,
    requests: Mutex<Vec<LoginRequest>>,
}

#[allow(dead_code)]
impl StubLoginClient {
    pub fn accepting(assertion: &str) -> Arc<Self> {
        Self::responding(&format!("]{{\"assertion\":\"{assertion}\"}}"))
    }

    pub fn responding(body: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Ok(body.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            response: Err("connection refused".to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<LoginRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LoginClient for StubLoginClient {
    async fn authenticate(&self, request: &LoginRequest) -> Result<String, HandlerError> {
        self.requests.lock().push(request.clone());
        self.response.clone().map_err(HandlerError::LoginTransport)
    }
}

/// Settings used by every test bot.
pub fn settings() -> BotSettings {
    BotSettings {
        name: "MyBot".to_string(),
        id: "mybot".to_string(),
        command_token: "!".to_string(),
        sysops: vec!["sysop".to_string()],
        login: LoginSettings {
            name: "MyBot".to_string(),
            pass: Some("hunter2".to_string()),
            rooms: vec!["lobby".to_string(), "techcode".to_string()],
            avatar: Some("167".to_string()),
            status: Some("Online".to_string()),
        },
        login_url: "http://127.0.0.1:1/action.php".to_string(),
        query_timeout: Some(Duration::from_millis(300)),
    }
}

/// A bot whose outbound lines land in `sent`.
pub struct TestBot {
    pub bot: Bot,
    pub login: Arc<StubLoginClient>,
    pub sent: mpsc::UnboundedReceiver<String>,
}

#[allow(dead_code)]
impl TestBot {
    pub fn new() -> Self {
        Self::with(settings(), StubLoginClient::accepting("signed-assertion"))
    }

    pub fn with(settings: BotSettings, login: Arc<StubLoginClient>) -> Self {
        let bot = Bot::builder(settings)
            .login_client(Arc::clone(&login) as Arc<dyn LoginClient>)
            .build();
        Self::attached(bot, login)
    }

    /// A default bot that saves runtime joins to `file`.
    pub fn with_rooms_file(file: RoomsFile) -> Self {
        let login = StubLoginClient::accepting("signed-assertion");
        let bot = Bot::builder(settings())
            .login_client(Arc::clone(&login) as Arc<dyn LoginClient>)
            .rooms_file(file)
            .build();
        Self::attached(bot, login)
    }

    fn attached(bot: Bot, login: Arc<StubLoginClient>) -> Self {
        let (tx, sent) = mpsc::unbounded_channel();
        bot.outbox().attach(tx);
        Self { bot, login, sent }
    }

    /// Dispatch a frame and wait for every background handler it started.
    pub async fn feed(&self, raw: &str) {
        self.bot.handle_message(raw).await;
        self.bot.drain_tasks().await;
    }

    /// Everything sent so far.
    pub fn take_sent(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.sent.try_recv() {
            lines.push(line);
        }
        lines
    }

    /// Wait for the next outbound line.
    pub async fn next_sent(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(2), self.sent.recv())
            .await
            .expect("timed out waiting for an outbound line")
            .expect("outbox closed")
    }
}
