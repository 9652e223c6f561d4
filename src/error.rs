//! Unified error type.

use std::fmt;

/// A boxed, thread-safe error. Lifecycle hooks return it.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by hius' fallible operations.
///
/// Three families live here:
///
/// - **Construction** errors (`InvalidPath`, `DuplicateParams`, `Signature`,
///   `Mount`) are returned while routes are registered and are never
///   recovered from. A route that fails here is simply not bound.
/// - **Routing** conditions (`NotFound`, `MethodNotAllowed`, `Disconnect`)
///   come out of [`Router`](crate::Router) dispatch. The [`App`](crate::App)
///   error boundary turns them into 404 / 405 responses or a socket close.
/// - **Infrastructure** failures: I/O, a closed protocol channel, a
///   lifecycle failure reported by the server.
///
/// Parameter validation failures are not in this enum. The endpoint adapter
/// answers them itself (400 / close 1008) and they never propagate.
#[derive(Debug)]
pub enum Error {
    /// The route path is malformed: no leading `/`, or a custom converter
    /// pattern that does not compile.
    InvalidPath { path: String, reason: String },
    /// The same parameter name is bound more than once in one path.
    DuplicateParams { path: String, names: Vec<String> },
    /// A handler signature could not be turned into a parameter schema.
    Signature { endpoint: String, reason: String },
    /// A mount was given both an application and a route list.
    Mount(String),
    /// Reverse lookup found no route with that name.
    NoMatchFound(String),
    /// Reverse lookup was given parameters but not the one the path needs.
    MissingParam { name: String, param: String },
    /// An absolute URL could not be built from the given base.
    Url(url::ParseError),
    /// No route matches the path.
    NotFound,
    /// A route matches the path but not the method.
    MethodNotAllowed,
    /// A websocket connection was refused with the given close code.
    Disconnect(u16),
    /// The peer end of a protocol channel went away.
    ChannelClosed,
    /// The application reported `lifespan.<phase>.failed`.
    Lifespan(String),
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPath { path, reason } => write!(f, "invalid path `{path}`: {reason}"),
            Self::DuplicateParams { path, names } => {
                write!(f, "duplicated params at path `{path}`: {}", names.join(", "))
            }
            Self::Signature { endpoint, reason } => {
                write!(f, "invalid signature for `{endpoint}`: {reason}")
            }
            Self::Mount(path) => {
                write!(f, "mount `{path}`: either an app or routes must be specified, not both")
            }
            Self::NoMatchFound(name) => write!(f, "no route named `{name}`"),
            Self::MissingParam { name, param } => {
                write!(f, "route `{name}` requires path parameter `{param}`")
            }
            Self::Url(e) => write!(f, "url: {e}"),
            Self::NotFound => f.write_str("Not Found"),
            Self::MethodNotAllowed => f.write_str("Method Not Allowed"),
            Self::Disconnect(code) => write!(f, "websocket disconnected with code {code}"),
            Self::ChannelClosed => f.write_str("protocol channel closed"),
            Self::Lifespan(message) => write!(f, "lifespan failed: {message}"),
            Self::Io(e) => write!(f, "io: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Url(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::Url(e)
    }
}
