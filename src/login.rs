//! Login server client.
//!
//! The credential exchange happens over HTTP, outside the chat connection.
//! [`LoginClient`] is the seam: production uses [`HttpLoginClient`], tests
//! substitute a canned responder.

use async_trait::async_trait;
use ps_proto::LoginRequest;
use tracing::debug;

use crate::error::HandlerError;

/// Performs the out-of-band credential exchange.
#[async_trait]
pub trait LoginClient: Send + Sync {
    /// Submit the request and return the raw response body.
    async fn authenticate(&self, request: &LoginRequest) -> Result<String, HandlerError>;
}

/// Form-encoded POST to the login server's action endpoint.
pub struct HttpLoginClient {
    http: reqwest::Client,
    url: String,
}

impl HttpLoginClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl LoginClient for HttpLoginClient {
    async fn authenticate(&self, request: &LoginRequest) -> Result<String, HandlerError> {
        debug!(url = %self.url, name = %request.name, "Submitting login request");
        let response = self
            .http
            .post(&self.url)
            .form(&request.form())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| HandlerError::LoginTransport(e.to_string()))?;
        response
            .text()
            .await
            .map_err(|e| HandlerError::LoginTransport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn request() -> LoginRequest {
        LoginRequest {
            name: "MyBot".into(),
            pass: "pw".into(),
            act: ps_proto::LOGIN_ACTION,
            challstr: "abc|def".into(),
            challengekeyid: "4".into(),
        }
    }

    #[tokio::test]
    async fn posts_form_and_returns_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut received = String::new();
            while !received.contains("challengekeyid=") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.push_str(&String::from_utf8_lossy(&buf[..n]));
            }
            let body = r#"]{"assertion":"signed"}"#;
            let reply = format!(
                "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            received
        });

        let client = HttpLoginClient::new(format!("http://{addr}/action.php"));
        let body = client.authenticate(&request()).await.unwrap();
        assert_eq!(body, r#"]{"assertion":"signed"}"#);

        let received = server.await.unwrap();
        assert!(received.starts_with("POST /action.php"));
        assert!(received.contains("application/x-www-form-urlencoded"));
        assert!(received.contains("act=login"));
        assert!(received.contains("challstr=abc%7Cdef"));
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpLoginClient::new(format!("http://{addr}/action.php"));
        let err = client.authenticate(&request()).await.unwrap_err();
        assert_eq!(err.error_code(), "login_transport");
    }
}
