//! Websocket connection handle.

use bytes::Bytes;

use crate::error::Error;
use crate::params::{FromValue, Params};
use crate::protocol::{Frame, Message, Receiver, Scope, Sender};
use crate::route::UrlPath;

/// Close code sent when a connection is refused before the handshake
/// completes because its parameters did not validate.
pub const POLICY_VIOLATION: u16 = 1008;

/// Close code for a normal closure, also used when no route matched.
pub const NORMAL_CLOSURE: u16 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Connecting,
    Connected,
    Closed,
}

/// A websocket connection, as seen by a handler.
///
/// The handler decides when to [`accept`](WebSocket::accept). Frames can only
/// be exchanged after that.
pub struct WebSocket {
    scope: Scope,
    receive: Receiver,
    send: Sender,
    params: Params,
    phase: Phase,
}

impl WebSocket {
    pub(crate) fn new(scope: Scope, receive: Receiver, send: Sender, params: Params) -> Self {
        Self { scope, receive, send, params, phase: Phase::Connecting }
    }

    pub fn path(&self) -> &str { self.scope.path() }
    pub fn scope(&self) -> &Scope { &self.scope }
    pub fn path_params(&self) -> &Params { self.scope.path_params() }
    pub fn params(&self) -> &Params { &self.params }

    pub fn param<T: FromValue>(&self, name: &str) -> Option<T> {
        self.params.get(name)
    }

    pub fn state<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.scope.state().get::<T>()
    }

    pub fn url_for(&self, name: &str, params: &[(&str, &str)]) -> Result<UrlPath, Error> {
        match &self.scope.router {
            Some(router) => router.url_path_for(name, params),
            None => Err(Error::NoMatchFound(name.to_owned())),
        }
    }

    /// Completes the handshake.
    pub async fn accept(&mut self) -> Result<(), Error> {
        if self.phase != Phase::Connecting {
            return Ok(());
        }
        loop {
            match self.receive.recv().await? {
                Message::WebsocketConnect => break,
                Message::WebsocketDisconnect { code } => {
                    self.phase = Phase::Closed;
                    return Err(Error::Disconnect(code));
                }
                _ => {}
            }
        }
        self.send.send(Message::WebsocketAccept).await?;
        self.phase = Phase::Connected;
        Ok(())
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), Error> {
        self.send_frame(Frame::Text(text.into())).await
    }

    pub async fn send_bytes(&self, bytes: impl Into<Bytes>) -> Result<(), Error> {
        self.send_frame(Frame::Binary(bytes.into())).await
    }

    async fn send_frame(&self, frame: Frame) -> Result<(), Error> {
        if self.phase != Phase::Connected {
            return Err(Error::ChannelClosed);
        }
        self.send.send(Message::WebsocketSend(frame)).await
    }

    /// Waits for the next frame. A client disconnect surfaces as
    /// [`Error::Disconnect`] with the client's close code.
    pub async fn receive(&mut self) -> Result<Frame, Error> {
        loop {
            match self.receive.recv().await? {
                Message::WebsocketReceive(frame) => return Ok(frame),
                Message::WebsocketDisconnect { code } => {
                    self.phase = Phase::Closed;
                    return Err(Error::Disconnect(code));
                }
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

    pub async fn close(&mut self, code: u16) -> Result<(), Error> {
        if self.phase == Phase::Closed {
            return Ok(());
        }
        self.phase = Phase::Closed;
        self.send.send(Message::WebsocketClose { code }).await
    }
}
