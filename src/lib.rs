//! # hius
//!
//! A micro web framework: routing, parameter validation and lifecycle
//! hooks over a small message protocol.
//!
//! ## The contract
//!
//! Every layer speaks one shape, `call(scope, receive, send)`: the
//! [`App`], the [`Router`], a [`Mount`]ed foreign application, an endpoint.
//! The transport owns the other ends of the channels. [`Server`] bridges
//! hyper connections into it; [`testing::TestClient`] drives it in process.
//!
//! What hius does:
//!
//! - Path templates: `/users/{id:int}`, with `str`, `int`, `float`, `path`,
//!   `uuid` and custom regex converters
//! - Plain routes before dynamic ones before mounts; a path served under
//!   other methods is a 405, never shadowed by a mount
//! - Declarative handler signatures, validated per request (400 on failure)
//! - Reverse lookup through nested mounts: [`Router::url_path_for`]
//! - Startup, shutdown and suspending lifespan hooks
//!
//! What it does not: templating, sessions, ORMs, authentication.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use hius::{App, Func, Method, Request, Response, Server, route};
//! use http::StatusCode;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), hius::Error> {
//!     let app = App::builder()
//!         .route("/users/{id:int}", Func::new(get_user).signature("id: int, verbose: bool = false"))
//!         .bind(route("/users", Func::new(create_user)).methods([Method::Post]))
//!         .build()?;
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id: i64 = req.param("id").unwrap_or_default();
//!     Response::json(format!(r#"{{"id":{id}}}"#).into_bytes())
//! }
//!
//! async fn create_user(req: Request) -> Response {
//!     if req.body().is_empty() {
//!         return Response::status(StatusCode::BAD_REQUEST);
//!     }
//!     Response::builder()
//!         .status(StatusCode::CREATED)
//!         .header("location", "/users/99")
//!         .json(br#"{"id":99}"#.to_vec())
//! }
//! ```

mod app;
mod convert;
mod endpoint;
mod error;
mod handler;
mod lifespan;
mod method;
mod params;
mod parser;
mod protocol;
mod request;
mod response;
mod route;
mod router;
mod server;
mod signature;
mod websocket;

pub mod testing;

pub use app::{App, AppBuilder};
pub use convert::Converter;
pub use endpoint::{
    Actions, Func, HttpEndpoint, IntoHttpEndpoint, IntoWebsocketEndpoint, SocketView, View,
    ViewEndpoint, WebsocketEndpoint,
};
pub use error::{BoxError, Error};
pub use handler::{Blocking, Handler, SocketFn, SocketHandler, blocking, socket};
pub use lifespan::{Lifespan, LifespanContext, Suspend, SuspendPoint};
pub use method::Method;
pub use params::{FromValue, Params, Value};
pub use parser::{ParsedPath, parse_path};
pub use protocol::{
    AppFn, Application, Frame, Message, Receiver, Scope, ScopeKind, Sender, State, app_fn, channel,
};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use route::{Endpoint, Mount, Protocol, Route, RouteBuilder, UrlPath, route, websocket};
pub use router::{Bind, Match, Matched, Router};
pub use server::Server;
pub use signature::{Field, FieldError, Kind, Signature};
pub use websocket::{NORMAL_CLOSURE, POLICY_VIOLATION, WebSocket};
