//! In-process WebSocket server for connection tests.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{WebSocketStream, accept_async};

const WAIT: Duration = Duration::from_secs(3);

/// Listens on an ephemeral port and hands over each accepted session.
pub struct TestServer {
    addr: SocketAddr,
    sessions: mpsc::UnboundedReceiver<ServerSide>,
}

/// The server end of one session.
pub struct ServerSide {
    ws: WebSocketStream<TcpStream>,
}

#[allow(dead_code)]
impl TestServer {
    pub async fn spawn() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, sessions) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                match accept_async(stream).await {
                    Ok(ws) => {
                        if tx.send(ServerSide { ws }).is_err() {
                            return;
                        }
                    }
                    Err(e) => eprintln!("test server handshake failed: {e}"),
                }
            }
        });
        Ok(Self { addr, sessions })
    }

    pub fn url(&self) -> String {
        format!("ws://{}/showdown/websocket", self.addr)
    }

    /// Wait for the next client session.
    pub async fn accept(&mut self) -> ServerSide {
        tokio::time::timeout(WAIT, self.sessions.recv())
            .await
            .expect("timed out waiting for a client")
            .expect("listener stopped")
    }
}

#[allow(dead_code)]
impl ServerSide {
    pub async fn send(&mut self, frame: &str) {
        self.ws
            .send(Message::Text(frame.to_string()))
            .await
            .expect("server send failed");
    }

    /// Next text frame from the client, `None` once the client closed.
    pub async fn recv(&mut self) -> Option<String> {
        loop {
            let next = tokio::time::timeout(WAIT, self.ws.next())
                .await
                .expect("timed out waiting for a client frame");
            match next {
                Some(Ok(Message::Text(text))) => return Some(text),
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
                Some(Ok(_)) => continue,
            }
        }
    }

    /// Read frames until one satisfies `pred`.
    pub async fn recv_until(&mut self, pred: impl Fn(&str) -> bool) -> String {
        loop {
            match self.recv().await {
                Some(frame) if pred(&frame) => return frame,
                Some(_) => continue,
                None => panic!("client closed before the expected frame"),
            }
        }
    }

    /// Close from the server side with a reason.
    pub async fn close(mut self, reason: &str) {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: reason.to_string().into(),
        };
        let _ = self.ws.close(Some(frame)).await;
        // Drain until the client acknowledges.
        while let Ok(Some(Ok(_))) = tokio::time::timeout(WAIT, self.ws.next()).await {}
    }
}
