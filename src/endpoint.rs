//! Endpoint adapters.
//!
//! A route points at an endpoint, and an endpoint is one of two shapes:
//!
//! - a **function**, wrapped in [`Func`]: one handler serves every method
//!   the route allows;
//! - a **view**, wrapped in [`ViewEndpoint`]: a value whose type registers
//!   one action per HTTP verb ([`View`]) or a single socket action
//!   ([`SocketView`]).
//!
//! Either way the shape is resolved once, when the route is bound, into a
//! table of actions. Each action carries its own parsed [`Signature`].
//! At request time the adapter reads the body, validates the merged query
//! and path parameters against the action's signature and only then hands
//! a [`Request`] (or a [`WebSocket`]) to user code.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use http::StatusCode;
use tracing::debug;

use crate::error::Error;
use crate::handler::{
    BoxedHandler, BoxedSocketHandler, Handler, SocketHandler, blocking, short_name,
};
use crate::method::Method;
use crate::protocol::{Message, Receiver, Scope, Sender};
use crate::request::{Request, read_body};
use crate::response::{IntoResponse, Response};
use crate::signature::{FieldError, Signature};
use crate::websocket::{POLICY_VIOLATION, WebSocket};

// ── Registration traits ───────────────────────────────────────────────────────

/// Anything that can be bound as the endpoint of an HTTP route.
pub trait IntoHttpEndpoint {
    fn into_http_endpoint(self) -> Result<HttpEndpoint, Error>;
}

/// Anything that can be bound as the endpoint of a websocket route.
pub trait IntoWebsocketEndpoint {
    fn into_websocket_endpoint(self) -> Result<WebsocketEndpoint, Error>;
}

impl IntoHttpEndpoint for HttpEndpoint {
    fn into_http_endpoint(self) -> Result<HttpEndpoint, Error> { Ok(self) }
}

impl IntoWebsocketEndpoint for WebsocketEndpoint {
    fn into_websocket_endpoint(self) -> Result<WebsocketEndpoint, Error> { Ok(self) }
}

// ── Func ──────────────────────────────────────────────────────────────────────

/// A function endpoint.
///
/// ```rust
/// use hius::{Func, Request, Response};
///
/// async fn greet(req: Request) -> Response {
///     let name: String = req.param("name").unwrap_or_default();
///     Response::text(format!("hello {name}"))
/// }
///
/// let endpoint = Func::new(greet).signature("name: str");
/// ```
///
/// The endpoint name defaults to the function name (`greet` here) and is
/// what [`Router::url_path_for`](crate::Router::url_path_for) looks up unless
/// the route is given its own name.
pub struct Func<H> {
    handler: H,
    name: Option<String>,
    signature: String,
}

impl<H> Func<H> {
    pub fn new(handler: H) -> Self {
        Self { handler, name: None, signature: String::new() }
    }

    /// Declares the parameters the handler reads, e.g.
    /// `"name: str, flag: bool = false"`.
    pub fn signature(mut self, signature: &str) -> Self {
        self.signature = signature.to_owned();
        self
    }

    /// Overrides the inferred endpoint name.
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }
}

impl<H: Handler> IntoHttpEndpoint for Func<H> {
    fn into_http_endpoint(self) -> Result<HttpEndpoint, Error> {
        let handler = self.handler.into_boxed_handler();
        let name = self.name.unwrap_or_else(|| short_name(handler.type_name()).to_owned());
        let action = HttpAction {
            model: model_name(&name, None),
            signature: parse_signature(&name, &self.signature)?,
            handler,
        };
        Ok(HttpEndpoint { name, target: HttpTarget::Function(action) })
    }
}

impl<H: SocketHandler> IntoWebsocketEndpoint for Func<H> {
    fn into_websocket_endpoint(self) -> Result<WebsocketEndpoint, Error> {
        let handler = self.handler.into_boxed_handler();
        let name = self.name.unwrap_or_else(|| short_name(handler.type_name()).to_owned());
        Ok(WebsocketEndpoint {
            model: model_name(&name, None),
            signature: parse_signature(&name, &self.signature)?,
            handler,
            name,
        })
    }
}

// ── Views ─────────────────────────────────────────────────────────────────────

/// A handler type with one action per HTTP verb.
///
/// ```rust
/// use std::sync::Arc;
/// use hius::{Actions, Request, Response, View, ViewEndpoint};
///
/// #[derive(Default)]
/// struct Users;
///
/// impl View for Users {
///     fn actions(actions: &mut Actions<Self>) {
///         actions
///             .get("id: int", |_users: Arc<Users>, req: Request| async move {
///                 Response::text(format!("user {}", req.param::<i64>("id").unwrap_or_default()))
///             })
///             .post("", |_users: Arc<Users>, _req: Request| async move { "created" });
///     }
/// }
///
/// let endpoint = ViewEndpoint::<Users>::default();
/// ```
///
/// A method the route allows but the view does not declare answers
/// `405 Method Not Allowed`.
pub trait View: Send + Sync + Sized + 'static {
    fn actions(actions: &mut Actions<Self>);
}

/// A handler type with a single websocket action.
pub trait SocketView: Send + Sync + Sized + 'static {
    /// Parameters the action reads, in signature syntax.
    const SIGNATURE: &'static str = "";

    fn call(self: Arc<Self>, ws: WebSocket) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Wraps a view value so it can be bound to a route.
///
/// Built from an instance with [`ViewEndpoint::new`], or from the type alone
/// with `ViewEndpoint::<V>::default()` when `V: Default`.
pub struct ViewEndpoint<V> {
    view: V,
    name: Option<String>,
}

impl<V> ViewEndpoint<V> {
    pub fn new(view: V) -> Self {
        Self { view, name: None }
    }

    /// Overrides the inferred endpoint name (the type name of `V`).
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    fn resolved_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| short_name(std::any::type_name::<V>()).to_owned())
    }
}

impl<V: Default> Default for ViewEndpoint<V> {
    fn default() -> Self {
        Self::new(V::default())
    }
}

/// Per-verb action table filled by [`View::actions`].
pub struct Actions<V> {
    view: Arc<V>,
    table: Vec<(Method, String, BoxedHandler)>,
}

impl<V: Send + Sync + 'static> Actions<V> {
    /// Registers an async action for `method`. A later registration for the
    /// same method replaces the earlier one.
    pub fn on<F, Fut, R>(&mut self, method: Method, signature: &str, action: F) -> &mut Self
    where
        F: Fn(Arc<V>, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse + Send + 'static,
    {
        let view = Arc::clone(&self.view);
        let handler = move |req: Request| action(Arc::clone(&view), req);
        self.push(method, signature, handler.into_boxed_handler())
    }

    /// Registers a synchronous action, run on the blocking pool.
    pub fn on_blocking<F, R>(&mut self, method: Method, signature: &str, action: F) -> &mut Self
    where
        F: Fn(&V, Request) -> R + Send + Sync + 'static,
        R: IntoResponse + Send + 'static,
    {
        let view = Arc::clone(&self.view);
        let handler = blocking(move |req: Request| action(&*view, req));
        self.push(method, signature, handler.into_boxed_handler())
    }

    pub fn get<F, Fut, R>(&mut self, signature: &str, action: F) -> &mut Self
    where
        F: Fn(Arc<V>, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse + Send + 'static,
    {
        self.on(Method::Get, signature, action)
    }

    pub fn post<F, Fut, R>(&mut self, signature: &str, action: F) -> &mut Self
    where
        F: Fn(Arc<V>, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse + Send + 'static,
    {
        self.on(Method::Post, signature, action)
    }

    pub fn put<F, Fut, R>(&mut self, signature: &str, action: F) -> &mut Self
    where
        F: Fn(Arc<V>, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse + Send + 'static,
    {
        self.on(Method::Put, signature, action)
    }

    pub fn delete<F, Fut, R>(&mut self, signature: &str, action: F) -> &mut Self
    where
        F: Fn(Arc<V>, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse + Send + 'static,
    {
        self.on(Method::Delete, signature, action)
    }

    fn push(&mut self, method: Method, signature: &str, handler: BoxedHandler) -> &mut Self {
        self.table.retain(|(m, _, _)| *m != method);
        self.table.push((method, signature.to_owned(), handler));
        self
    }
}

impl<V: View> IntoHttpEndpoint for ViewEndpoint<V> {
    fn into_http_endpoint(self) -> Result<HttpEndpoint, Error> {
        let name = self.resolved_name();
        let mut actions = Actions { view: Arc::new(self.view), table: Vec::new() };
        V::actions(&mut actions);

        let mut table = HashMap::with_capacity(actions.table.len());
        for (method, signature, handler) in actions.table {
            let action = HttpAction {
                model: model_name(&name, Some(method)),
                signature: parse_signature(&name, &signature)?,
                handler,
            };
            table.insert(method, action);
        }
        Ok(HttpEndpoint { name, target: HttpTarget::View(table) })
    }
}

impl<V: SocketView> IntoWebsocketEndpoint for ViewEndpoint<V> {
    fn into_websocket_endpoint(self) -> Result<WebsocketEndpoint, Error> {
        let name = self.resolved_name();
        let view = Arc::new(self.view);
        let handler = crate::handler::socket(move |ws: WebSocket| Arc::clone(&view).call(ws));
        Ok(WebsocketEndpoint {
            model: model_name(&name, None),
            signature: parse_signature(&name, V::SIGNATURE)?,
            handler: handler.into_boxed_handler(),
            name,
        })
    }
}

// ── Adapted endpoints ─────────────────────────────────────────────────────────

struct HttpAction {
    handler: BoxedHandler,
    signature: Signature,
    model: String,
}

enum HttpTarget {
    Function(HttpAction),
    View(HashMap<Method, HttpAction>),
}

/// An HTTP endpoint with its handler shape resolved.
pub struct HttpEndpoint {
    name: String,
    target: HttpTarget,
}

impl HttpEndpoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Diagnostic name of the parameter model serving `method`, e.g.
    /// `GetUserModel` for a function `get_user`, `UsersGetModel` for the
    /// `GET` action of a view `Users`.
    pub fn model_name(&self, method: Method) -> Option<&str> {
        self.action(method).map(|a| a.model.as_str())
    }

    /// Parameter schema of the action serving `method`.
    pub fn signature(&self, method: Method) -> Option<&Signature> {
        self.action(method).map(|a| &a.signature)
    }

    fn action(&self, method: Method) -> Option<&HttpAction> {
        match &self.target {
            HttpTarget::Function(action) => Some(action),
            HttpTarget::View(table) => table.get(&method),
        }
    }

    pub(crate) async fn handle(
        &self,
        scope: Scope,
        mut receive: Receiver,
        send: Sender,
    ) -> Result<(), Error> {
        let action = self.action(scope.method()).ok_or(Error::MethodNotAllowed)?;
        let body = read_body(&mut receive).await?;

        match action.signature.validate(&scope.query_params(), scope.path_params()) {
            Ok(params) => {
                let response = action.handler.call(Request::new(scope, body, params)).await;
                response.send(&send).await
            }
            Err(errors) => {
                debug!(endpoint = %self.name, model = %action.model, errors = errors.len(), "request validation failed");
                validation_response(&errors).send(&send).await
            }
        }
    }
}

/// A websocket endpoint with its handler shape resolved.
pub struct WebsocketEndpoint {
    name: String,
    handler: BoxedSocketHandler,
    signature: Signature,
    model: String,
}

impl WebsocketEndpoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Refuses the connection with close code 1008 when validation fails.
    /// The handler never sees such a connection.
    pub(crate) async fn handle(
        &self,
        scope: Scope,
        receive: Receiver,
        send: Sender,
    ) -> Result<(), Error> {
        match self.signature.validate(&scope.query_params(), scope.path_params()) {
            Ok(params) => self.handler.call(WebSocket::new(scope, receive, send, params)).await,
            Err(errors) => {
                debug!(endpoint = %self.name, model = %self.model, errors = errors.len(), "websocket validation failed");
                send.send(Message::WebsocketClose { code: POLICY_VIOLATION }).await
            }
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn parse_signature(endpoint: &str, source: &str) -> Result<Signature, Error> {
    Signature::parse(source).map_err(|reason| Error::Signature {
        endpoint: endpoint.to_owned(),
        reason,
    })
}

fn validation_response(errors: &[FieldError]) -> Response {
    Response::builder()
        .status(StatusCode::BAD_REQUEST)
        .json(serde_json::to_vec(errors).unwrap_or_default())
}

/// `get_user` → `GetUserModel`; `Users` + `GET` → `UsersGetModel`.
fn model_name(name: &str, method: Option<Method>) -> String {
    let mut model = String::with_capacity(name.len() + 10);
    let mut boundary = true;
    for c in name.chars() {
        if c.is_alphabetic() {
            if boundary {
                model.extend(c.to_uppercase());
            } else {
                model.extend(c.to_lowercase());
            }
            boundary = false;
        } else {
            boundary = true;
            if c != '_' {
                model.push(c);
            }
        }
    }
    if let Some(method) = method {
        model.push_str(method.title());
    }
    model.push_str("Model");
    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::channel;
    use bytes::Bytes;

    async fn get_user(req: Request) -> Response {
        Response::text(format!("user {}", req.param::<i64>("id").unwrap_or_default()))
    }

    #[derive(Default)]
    struct Users;

    impl View for Users {
        fn actions(actions: &mut Actions<Self>) {
            actions
                .get("flag: bool = false", |_: Arc<Users>, req: Request| async move {
                    format!("flag={}", req.param::<bool>("flag").unwrap_or_default())
                })
                .on_blocking(Method::Post, "", |_: &Users, req: Request| {
                    format!("posted {} bytes", req.body().len())
                });
        }
    }

    async fn call(endpoint: &HttpEndpoint, scope: Scope, body: &'static [u8]) -> Result<(u16, Bytes), Error> {
        let (in_tx, in_rx) = channel(2);
        let (out_tx, mut out_rx) = channel(4);
        in_tx.send(Message::HttpRequest { body: Bytes::from_static(body), more_body: false }).await?;
        endpoint.handle(scope, in_rx, out_tx).await?;

        let Message::HttpResponseStart { status, .. } = out_rx.recv().await? else { panic!("no start") };
        let Message::HttpResponseBody { body, .. } = out_rx.recv().await? else { panic!("no body") };
        Ok((status.as_u16(), body))
    }

    #[test]
    fn names_are_inferred() {
        let endpoint = Func::new(get_user).into_http_endpoint().unwrap();
        assert_eq!(endpoint.name(), "get_user");
        assert_eq!(endpoint.model_name(Method::Get), Some("GetUserModel"));

        let endpoint = ViewEndpoint::<Users>::default().into_http_endpoint().unwrap();
        assert_eq!(endpoint.name(), "Users");
        assert_eq!(endpoint.model_name(Method::Get), Some("UsersGetModel"));
        assert_eq!(endpoint.model_name(Method::Put), None);

        let endpoint = Func::new(get_user).name("profile").into_http_endpoint().unwrap();
        assert_eq!(endpoint.name(), "profile");
    }

    #[test]
    fn bad_signature_fails_at_construction() {
        let err = Func::new(get_user).signature("param").into_http_endpoint().err().unwrap();
        assert!(matches!(err, Error::Signature { ref endpoint, .. } if endpoint == "get_user"));
    }

    #[tokio::test]
    async fn function_endpoint_validates_then_calls() {
        let endpoint = Func::new(get_user).signature("id: int").into_http_endpoint().unwrap();

        let (status, body) = call(&endpoint, Scope::http(Method::Get, "/?id=5"), b"").await.unwrap();
        assert_eq!((status, &body[..]), (200, &b"user 5"[..]));

        let (status, body) = call(&endpoint, Scope::http(Method::Get, "/"), b"").await.unwrap();
        assert_eq!(status, 400);
        let errors: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            errors,
            serde_json::json!([{"loc": ["id"], "msg": "field required", "type": "value_error.missing"}])
        );
    }

    #[tokio::test]
    async fn view_dispatches_per_method() {
        let endpoint = ViewEndpoint::<Users>::default().into_http_endpoint().unwrap();

        let (_, body) = call(&endpoint, Scope::http(Method::Get, "/?flag=yes"), b"").await.unwrap();
        assert_eq!(&body[..], b"flag=true");

        let (_, body) = call(&endpoint, Scope::http(Method::Post, "/"), b"abc").await.unwrap();
        assert_eq!(&body[..], b"posted 3 bytes");

        let err = call(&endpoint, Scope::http(Method::Delete, "/"), b"").await.unwrap_err();
        assert!(matches!(err, Error::MethodNotAllowed));
    }
}
