//! In-process test driver.
//!
//! [`TestClient`] plays the transport: it builds scopes, feeds the inbound
//! messages and collects the outbound ones, without a socket.
//!
//! ```rust
//! use hius::{App, Func, Request};
//! use hius::testing::TestClient;
//!
//! async fn home(_req: Request) -> &'static str { "home" }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), hius::Error> {
//! let client = TestClient::new(App::builder().route("/", Func::new(home)).build()?);
//! let res = client.get("/").await?;
//! assert_eq!(res.status(), 200);
//! assert_eq!(res.text(), "home");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::StatusCode;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use crate::error::Error;
use crate::method::Method;
use crate::protocol::{Application, Frame, Message, Receiver, Scope, Sender, channel};

// ── TestResponse ──────────────────────────────────────────────────────────────

/// A response collected from the application.
#[derive(Debug)]
pub struct TestResponse {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl TestResponse {
    pub fn status(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

// ── TestClient ────────────────────────────────────────────────────────────────

/// Drives an [`Application`] through the message protocol.
pub struct TestClient {
    app: Arc<dyn Application>,
    lifespan: Option<Connection>,
}

struct Connection {
    send: Sender,
    receive: Receiver,
    task: JoinHandle<Result<(), Error>>,
}

impl Connection {
    fn open(app: &Arc<dyn Application>, scope: Scope) -> Self {
        let (send, app_receive) = channel(16);
        let (app_send, receive) = channel(16);
        let app = Arc::clone(app);
        let task = tokio::spawn(async move { app.call(scope, app_receive, app_send).await });
        Self { send, receive, task }
    }

    /// Waits for the application task, surfacing its error.
    async fn join(self) -> Result<(), Error> {
        drop(self.send);
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(Error::ChannelClosed),
        }
    }
}

impl TestClient {
    pub fn new(app: impl Application) -> Self {
        Self { app: Arc::new(app), lifespan: None }
    }

    pub async fn get(&self, target: &str) -> Result<TestResponse, Error> {
        self.request(Method::Get, target, &[], Bytes::new()).await
    }

    pub async fn post(&self, target: &str, body: impl Into<Bytes>) -> Result<TestResponse, Error> {
        self.request(Method::Post, target, &[], body.into()).await
    }

    pub async fn put(&self, target: &str, body: impl Into<Bytes>) -> Result<TestResponse, Error> {
        self.request(Method::Put, target, &[], body.into()).await
    }

    pub async fn delete(&self, target: &str) -> Result<TestResponse, Error> {
        self.request(Method::Delete, target, &[], Bytes::new()).await
    }

    /// Sends one request. Fails with the application's own error when it
    /// returns one, or [`Error::ChannelClosed`] when it never responds.
    pub async fn request(
        &self,
        method: Method,
        target: &str,
        headers: &[(&str, &str)],
        body: Bytes,
    ) -> Result<TestResponse, Error> {
        let scope = headers.iter().fold(Scope::http(method, target), |scope, (k, v)| scope.with_header(k, v));
        let mut conn = Connection::open(&self.app, scope);
        conn.send.send(Message::HttpRequest { body, more_body: false }).await?;

        let mut head = None;
        let mut body = BytesMut::new();
        while let Ok(message) = conn.receive.recv().await {
            match message {
                Message::HttpResponseStart { status, headers } => head = Some((status, headers)),
                Message::HttpResponseBody { body: chunk, more_body } => {
                    body.extend_from_slice(&chunk);
                    if !more_body {
                        break;
                    }
                }
                _ => {}
            }
        }
        conn.join().await?;

        let (status, headers) = head.ok_or(Error::ChannelClosed)?;
        Ok(TestResponse { status, headers, body: body.freeze() })
    }

    /// Opens a websocket. Fails with [`Error::Disconnect`] when the
    /// application closes the connection instead of accepting it.
    pub async fn websocket_connect(&self, target: &str) -> Result<TestWebSocket, Error> {
        let mut conn = Connection::open(&self.app, Scope::websocket(target));
        conn.send.send(Message::WebsocketConnect).await?;

        match conn.receive.recv().await {
            Ok(Message::WebsocketAccept) => Ok(TestWebSocket { conn }),
            Ok(Message::WebsocketClose { code }) => {
                conn.join().await?;
                Err(Error::Disconnect(code))
            }
            _ => {
                conn.join().await?;
                Err(Error::ChannelClosed)
            }
        }
    }

    /// Sends `lifespan.startup` and returns the application's answer.
    pub async fn startup(&mut self) -> Result<Message, Error> {
        let mut conn = Connection::open(&self.app, Scope::lifespan());
        conn.send.send(Message::LifespanStartup).await?;
        let reply = conn.receive.recv().await?;
        self.lifespan = Some(conn);
        Ok(reply)
    }

    /// Sends `lifespan.shutdown` and returns the application's answer.
    pub async fn shutdown(&mut self) -> Result<Message, Error> {
        let mut conn = self.lifespan.take().ok_or(Error::ChannelClosed)?;
        conn.send.send(Message::LifespanShutdown).await?;
        let reply = conn.receive.recv().await?;
        conn.join().await?;
        Ok(reply)
    }
}

// ── TestWebSocket ─────────────────────────────────────────────────────────────

/// Client side of an accepted websocket.
pub struct TestWebSocket {
    conn: Connection,
}

impl TestWebSocket {
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), Error> {
        self.conn.send.send(Message::WebsocketReceive(Frame::Text(text.into()))).await
    }

    pub async fn send_bytes(&self, bytes: impl Into<Bytes>) -> Result<(), Error> {
        self.conn.send.send(Message::WebsocketReceive(Frame::Binary(bytes.into()))).await
    }

    /// Next frame from the application; [`Error::Disconnect`] once it
    /// closes the connection.
    pub async fn receive(&mut self) -> Result<Frame, Error> {
        loop {
            match self.conn.receive.recv().await? {
                Message::WebsocketSend(frame) => return Ok(frame),
                Message::WebsocketClose { code } => return Err(Error::Disconnect(code)),
                _ => {}
            }
        }
    }

    pub async fn receive_text(&mut self) -> Result<String, Error> {
        match self.receive().await? {
            Frame::Text(text) => Ok(text),
            Frame::Binary(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        }
    }

    /// Disconnects with `code` and waits for the handler to finish. A
    /// handler that ends by propagating this disconnect counts as clean.
    pub async fn close(self, code: u16) -> Result<(), Error> {
        // The handler may already be gone.
        let _ = self.conn.send.send(Message::WebsocketDisconnect { code }).await;
        match self.conn.join().await {
            Err(Error::Disconnect(c)) if c == code => Ok(()),
            other => other,
        }
    }
}
