//! Handler traits and type erasure.
//!
//! # How handlers are stored
//!
//! The router holds handlers of *different* types in the same route table.
//! Rust collections hold one concrete type, so every handler is hidden
//! behind a trait object (`dyn ErasedHandler`) and stored uniformly.
//!
//! The chain from user code to vtable call is:
//!
//! ```text
//! async fn hello(req: Request) -> Response { … }   ← user writes this
//!        ↓ Func::new(hello)
//! hello.into_boxed_handler()                       ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                       ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(req)  at request time               ← one vtable dispatch
//!        ↓
//! Box::pin(async { hello(req).await.into_response() })  ← BoxFuture
//! ```
//!
//! # Blocking handlers
//!
//! A plain `fn(Request) -> R` wrapped in [`blocking`] is dispatched through
//! `tokio::task::spawn_blocking`, so a handler that sleeps, hashes a
//! password or reads a file never stalls the reactor. The choice between
//! awaiting in place and offloading is made once, when the handler is
//! boxed, never per request.

use std::any::type_name;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::StatusCode;
use tracing::warn;

use crate::error::Error;
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::websocket::WebSocket;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
///
/// `Pin<Box<…>>` is required because the runtime polls the future in
/// place. `Send` lets tokio move it across worker threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Internal dispatch interface for HTTP handlers.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture<'static, Response>;

    /// Type name of the user function, for inferred route names.
    fn type_name(&self) -> &'static str;
}

/// A type-erased HTTP handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Internal dispatch interface for websocket handlers.
#[doc(hidden)]
pub trait ErasedSocketHandler {
    fn call(&self, ws: WebSocket) -> BoxFuture<'static, Result<(), Error>>;

    fn type_name(&self) -> &'static str;
}

#[doc(hidden)]
pub type BoxedSocketHandler = Arc<dyn ErasedSocketHandler + Send + Sync + 'static>;

// ── Public traits ─────────────────────────────────────────────────────────────

/// Implemented for every valid HTTP handler.
///
/// You never implement this yourself. It is satisfied by any
///
/// ```text
/// async fn name(req: Request) -> impl IntoResponse
/// ```
///
/// and by any `fn(Request) -> impl IntoResponse` wrapped in [`blocking`].
/// The trait is sealed: only the impls in this module can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

/// Implemented for every valid websocket handler:
///
/// ```text
/// async fn name(ws: WebSocket) -> Result<(), hius::Error>
/// ```
pub trait SocketHandler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedSocketHandler;
}

mod private {
    pub trait Sealed {}
}

// ── Async functions ───────────────────────────────────────────────────────────

/// Marker for the HTTP blanket impls: one argument of type [`Request`].
impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Newtype bridging a concrete async function to [`ErasedHandler`].
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<'static, Response> {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }

    fn type_name(&self) -> &'static str {
        type_name::<F>()
    }
}

// ── Blocking functions ────────────────────────────────────────────────────────

/// Marks a synchronous handler to be run on the blocking thread pool.
///
/// ```rust
/// use hius::{Func, Request, blocking};
///
/// fn report(_req: Request) -> String {
///     std::thread::sleep(std::time::Duration::from_millis(5));
///     "done".to_owned()
/// }
///
/// let endpoint = Func::new(blocking(report));
/// ```
pub fn blocking<F, R>(f: F) -> Blocking<F>
where
    F: Fn(Request) -> R + Send + Sync + 'static,
    R: IntoResponse + Send + 'static,
{
    Blocking(Arc::new(f))
}

/// See [`blocking`].
pub struct Blocking<F>(Arc<F>);

impl<F, R> private::Sealed for Blocking<F>
where
    F: Fn(Request) -> R + Send + Sync + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, R> Handler for Blocking<F>
where
    F: Fn(Request) -> R + Send + Sync + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(self)
    }
}

impl<F, R> ErasedHandler for Blocking<F>
where
    F: Fn(Request) -> R + Send + Sync + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<'static, Response> {
        let f = Arc::clone(&self.0);
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || (*f)(req).into_response()).await {
                Ok(response) => response,
                // A panicking handler is not ours to handle: re-raise it on
                // the calling task, exactly as an async handler would.
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => {
                    warn!("blocking handler cancelled: {e}");
                    Response::status(StatusCode::SERVICE_UNAVAILABLE)
                }
            }
        })
    }

    fn type_name(&self) -> &'static str {
        type_name::<F>()
    }
}

// ── Websocket functions ───────────────────────────────────────────────────────

impl<F, Fut> private::Sealed for SocketFn<F>
where
    F: Fn(WebSocket) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
}

/// Newtype for async websocket functions.
///
/// A bare `F: Fn(WebSocket)` cannot share the sealing trait with the
/// `Fn(Request)` blanket impl, so socket functions go through [`socket`].
pub struct SocketFn<F>(F);

/// Marks an async function as a websocket handler.
pub fn socket<F, Fut>(f: F) -> SocketFn<F>
where
    F: Fn(WebSocket) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    SocketFn(f)
}

impl<F, Fut> SocketHandler for SocketFn<F>
where
    F: Fn(WebSocket) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedSocketHandler {
        Arc::new(self)
    }
}

impl<F, Fut> ErasedSocketHandler for SocketFn<F>
where
    F: Fn(WebSocket) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn call(&self, ws: WebSocket) -> BoxFuture<'static, Result<(), Error>> {
        Box::pin((self.0)(ws))
    }

    fn type_name(&self) -> &'static str {
        type_name::<F>()
    }
}

// ── Names ─────────────────────────────────────────────────────────────────────

/// `my_app::users::get_user` → `get_user`; `a::B<c::D>` → `B`.
pub(crate) fn short_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names() {
        assert_eq!(short_name("my_app::users::get_user"), "get_user");
        assert_eq!(short_name("my_app::views::Users<alloc::string::String>"), "Users");
        assert_eq!(short_name("plain"), "plain");
    }
}
