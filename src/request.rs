//! Incoming HTTP request type.

use bytes::{Bytes, BytesMut};

use crate::error::Error;
use crate::method::Method;
use crate::params::{FromValue, Params};
use crate::protocol::{Message, Receiver, Scope, State};
use crate::route::UrlPath;

/// An incoming HTTP request, as seen by a handler.
///
/// Built by the endpoint adapter after the body has been read and the
/// handler's signature has been validated. Everything in it belongs to this
/// one request.
pub struct Request {
    scope: Scope,
    body: Bytes,
    params: Params,
}

impl Request {
    pub(crate) fn new(scope: Scope, body: Bytes, params: Params) -> Self {
        Self { scope, body, params }
    }

    pub fn method(&self) -> Method { self.scope.method() }
    pub fn path(&self) -> &str { self.scope.path() }
    pub fn headers(&self) -> &[(String, String)] { self.scope.headers() }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn scope(&self) -> &Scope { &self.scope }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.scope.headers().iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Path parameters as the route's converters produced them.
    ///
    /// For a route `/users/{id:int}`, `req.path_params().get::<i64>("id")`
    /// on `/users/42` returns `Some(42)`.
    pub fn path_params(&self) -> &Params {
        self.scope.path_params()
    }

    /// The arguments declared by the handler's signature, validated.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Shorthand for `req.params().get::<T>(name)`.
    pub fn param<T: FromValue>(&self, name: &str) -> Option<T> {
        self.params.get(name)
    }

    pub fn query_params(&self) -> Vec<(String, String)> {
        self.scope.query_params()
    }

    /// Application state registered with [`AppBuilder::state`](crate::AppBuilder::state).
    pub fn state<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.scope.state().get::<T>()
    }

    /// Reverse lookup through the router serving this request.
    pub fn url_for(&self, name: &str, params: &[(&str, &str)]) -> Result<UrlPath, Error> {
        match &self.scope.router {
            Some(router) => router.url_path_for(name, params),
            None => Err(Error::NoMatchFound(name.to_owned())),
        }
    }
}

/// Collects `http.request` chunks until `more_body` is false.
pub(crate) async fn read_body(receive: &mut Receiver) -> Result<Bytes, Error> {
    let mut buf = BytesMut::new();
    loop {
        match receive.recv().await? {
            Message::HttpRequest { body, more_body } => {
                buf.extend_from_slice(&body);
                if !more_body {
                    return Ok(buf.freeze());
                }
            }
            Message::HttpDisconnect => return Err(Error::ChannelClosed),
            _ => {}
        }
    }
}
