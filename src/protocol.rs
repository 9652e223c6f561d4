//! The connection contract.
//!
//! Every layer of hius (application, router, mount, endpoint, lifespan)
//! speaks the same three-argument shape:
//!
//! ```text
//! call(scope, receive, send)
//!        │       │       └─ Sender:   messages out (response start/body, accept, close, …)
//!        │       └───────── Receiver: messages in  (request body, socket frames, lifespan signals)
//!        └───────────────── Scope:    what this connection is: kind, method, path, query, …
//! ```
//!
//! The transport (the hyper server, or the in-process test client) owns the
//! other ends of the two channels. Nothing here knows about sockets.

use std::any::type_name;
use std::future::Future;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use tokio::sync::mpsc;

use crate::error::Error;
use crate::handler::{BoxFuture, short_name};
use crate::params::Params;
use crate::method::Method;
use crate::router::Router;

// ── Scope ─────────────────────────────────────────────────────────────────────

/// What kind of connection a [`Scope`] describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScopeKind {
    Http,
    Websocket,
    Lifespan,
}

/// Per-connection context.
///
/// `path` is the path as the client sent it and is never rewritten.
/// `working_path` starts equal to it; every mount the request passes
/// through strips its prefix from `working_path` and appends it to
/// `root_path`, so nested routers match on what is left while the
/// client path stays available for diagnostics.
#[derive(Clone)]
pub struct Scope {
    pub(crate) kind: ScopeKind,
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) root_path: String,
    pub(crate) working_path: String,
    pub(crate) query_string: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) path_params: Params,
    pub(crate) state: State,
    pub(crate) router: Option<Arc<Router>>,
}

impl Scope {
    /// An HTTP scope for `target` (`/path?query`).
    pub fn http(method: Method, target: &str) -> Self {
        Self::new(ScopeKind::Http, method, target)
    }

    /// A websocket scope for `target`. The handshake is always a `GET`.
    pub fn websocket(target: &str) -> Self {
        Self::new(ScopeKind::Websocket, Method::Get, target)
    }

    pub fn lifespan() -> Self {
        Self::new(ScopeKind::Lifespan, Method::Get, "/")
    }

    fn new(kind: ScopeKind, method: Method, target: &str) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        Self {
            kind,
            method,
            path: path.to_owned(),
            root_path: String::new(),
            working_path: path.to_owned(),
            query_string: query.to_owned(),
            headers: Vec::new(),
            path_params: Params::new(),
            state: State::default(),
            router: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.to_owned()));
        self
    }

    pub fn kind(&self) -> ScopeKind { self.kind }
    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn root_path(&self) -> &str { &self.root_path }
    pub fn working_path(&self) -> &str { &self.working_path }
    pub fn query_string(&self) -> &str { &self.query_string }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn path_params(&self) -> &Params { &self.path_params }
    pub fn state(&self) -> &State { &self.state }

    /// Query parameters in the order they appear, `+` and `%XX` decoded.
    pub fn query_params(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(self.query_string.as_bytes())
            .into_owned()
            .collect()
    }

    /// Moves `prefix` from the working path onto the root path.
    pub(crate) fn descend(&mut self, prefix: &str) {
        let rest = self.working_path.get(prefix.len()..).unwrap_or_default().to_owned();
        self.root_path.push_str(prefix);
        self.working_path = rest;
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("kind", &self.kind)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("root_path", &self.root_path)
            .field("working_path", &self.working_path)
            .field("query_string", &self.query_string)
            .field("path_params", &self.path_params)
            .finish_non_exhaustive()
    }
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Application-wide shared values, keyed by type.
///
/// Filled while the app is assembled, then frozen behind an `Arc` and
/// handed to every scope and lifecycle hook. Read-only from then on.
#[derive(Clone, Default)]
pub struct State(Arc<http::Extensions>);

impl State {
    pub(crate) fn new(extensions: http::Extensions) -> Self {
        Self(Arc::new(extensions))
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.0.get::<T>()
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State").finish_non_exhaustive()
    }
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// A websocket data frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

/// Everything that travels over the receive and send channels.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    LifespanStartup,
    LifespanStartupComplete,
    LifespanStartupFailed { message: String },
    LifespanShutdown,
    LifespanShutdownComplete,
    LifespanShutdownFailed { message: String },

    HttpRequest { body: Bytes, more_body: bool },
    HttpDisconnect,
    HttpResponseStart { status: StatusCode, headers: Vec<(String, String)> },
    HttpResponseBody { body: Bytes, more_body: bool },

    WebsocketConnect,
    WebsocketAccept,
    WebsocketReceive(Frame),
    WebsocketSend(Frame),
    WebsocketDisconnect { code: u16 },
    WebsocketClose { code: u16 },
}

impl Message {
    /// The dotted message type, e.g. `"lifespan.startup.complete"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LifespanStartup             => "lifespan.startup",
            Self::LifespanStartupComplete     => "lifespan.startup.complete",
            Self::LifespanStartupFailed { .. } => "lifespan.startup.failed",
            Self::LifespanShutdown            => "lifespan.shutdown",
            Self::LifespanShutdownComplete    => "lifespan.shutdown.complete",
            Self::LifespanShutdownFailed { .. } => "lifespan.shutdown.failed",
            Self::HttpRequest { .. }          => "http.request",
            Self::HttpDisconnect              => "http.disconnect",
            Self::HttpResponseStart { .. }    => "http.response.start",
            Self::HttpResponseBody { .. }     => "http.response.body",
            Self::WebsocketConnect            => "websocket.connect",
            Self::WebsocketAccept             => "websocket.accept",
            Self::WebsocketReceive(_)         => "websocket.receive",
            Self::WebsocketSend(_)            => "websocket.send",
            Self::WebsocketDisconnect { .. }  => "websocket.disconnect",
            Self::WebsocketClose { .. }       => "websocket.close",
        }
    }
}

// ── Channels ──────────────────────────────────────────────────────────────────

/// Inbound half of a connection.
pub struct Receiver(mpsc::Receiver<Message>);

impl Receiver {
    /// Waits for the next message. Fails once the transport hung up.
    pub async fn recv(&mut self) -> Result<Message, Error> {
        self.0.recv().await.ok_or(Error::ChannelClosed)
    }
}

/// Outbound half of a connection. Cheap to clone.
#[derive(Clone)]
pub struct Sender(mpsc::Sender<Message>);

impl Sender {
    pub async fn send(&self, message: Message) -> Result<(), Error> {
        self.0.send(message).await.map_err(|_| Error::ChannelClosed)
    }
}

/// A bounded message channel. The transport keeps one end of each pair.
pub fn channel(buffer: usize) -> (Sender, Receiver) {
    let (tx, rx) = mpsc::channel(buffer);
    (Sender(tx), Receiver(rx))
}

// ── Application ───────────────────────────────────────────────────────────────

/// Anything that can serve a connection: the [`App`](crate::App), a
/// [`Router`], or a foreign application mounted under a prefix.
pub trait Application: Send + Sync + 'static {
    fn call(&self, scope: Scope, receive: Receiver, send: Sender) -> BoxFuture<'_, Result<(), Error>>;

    /// Default name of a mount wrapping this application.
    fn name(&self) -> &str {
        short_name(type_name::<Self>())
    }

    /// Routers expose themselves so matching and reverse lookup can
    /// descend into them instead of treating them as opaque.
    fn as_router(&self) -> Option<&Router> {
        None
    }
}

/// Adapts an async function into an [`Application`].
///
/// ```rust
/// use hius::{Message, Receiver, Scope, Sender, app_fn};
///
/// let static_files = app_fn(|_scope: Scope, _rx: Receiver, tx: Sender| async move {
///     tx.send(Message::WebsocketClose { code: 1000 }).await
/// });
/// ```
pub fn app_fn<F, Fut>(f: F) -> AppFn<F>
where
    F: Fn(Scope, Receiver, Sender) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    AppFn(f)
}

/// See [`app_fn`].
pub struct AppFn<F>(F);

impl<F, Fut> Application for AppFn<F>
where
    F: Fn(Scope, Receiver, Sender) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn call(&self, scope: Scope, receive: Receiver, send: Sender) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin((self.0)(scope, receive, send))
    }

    fn name(&self) -> &str {
        short_name(type_name::<F>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_target() {
        let scope = Scope::http(Method::Get, "/users/42?flag=1&name=a%20b");
        assert_eq!(scope.path(), "/users/42");
        assert_eq!(scope.working_path(), "/users/42");
        assert_eq!(scope.query_string(), "flag=1&name=a%20b");
        assert_eq!(
            scope.query_params(),
            [("flag".to_owned(), "1".to_owned()), ("name".to_owned(), "a b".to_owned())]
        );
    }

    #[test]
    fn descend_moves_prefix() {
        let mut scope = Scope::http(Method::Get, "/users/alice");
        scope.descend("/users");
        assert_eq!(scope.working_path(), "/alice");
        assert_eq!(scope.root_path(), "/users");
        assert_eq!(scope.path(), "/users/alice");

        let mut scope = Scope::http(Method::Get, "/users");
        scope.descend("/users");
        assert_eq!(scope.working_path(), "");
    }

    #[test]
    fn message_kinds() {
        assert_eq!(Message::LifespanStartupComplete.kind(), "lifespan.startup.complete");
        assert_eq!(
            Message::LifespanShutdownFailed { message: String::new() }.kind(),
            "lifespan.shutdown.failed"
        );
    }
}
