//! The application: router, lifecycle hooks and shared state in one place.

use std::future::Future;
use std::sync::Arc;

use http::StatusCode;

use crate::endpoint::{IntoHttpEndpoint, IntoWebsocketEndpoint};
use crate::error::{BoxError, Error};
use crate::handler::BoxFuture;
use crate::lifespan::{Lifespan, LifespanContext, Suspend};
use crate::protocol::{Application, Message, Receiver, Scope, ScopeKind, Sender, State};
use crate::response::Response;
use crate::route::UrlPath;
use crate::router::{Bind, Router};

/// A built application.
///
/// ```rust
/// use hius::{App, Func, Request, Response};
///
/// async fn home(_req: Request) -> Response { Response::text("home") }
///
/// let app = App::builder()
///     .route("/", Func::new(home))
///     .build()?;
/// assert_eq!(app.url_path_for("home", &[])?, "/");
/// # Ok::<(), hius::Error>(())
/// ```
///
/// The app is the error boundary for routing: an unmatched path answers
/// `404 Not Found`, a path served under other methods answers
/// `405 Method Not Allowed`, and a websocket with no route is closed with
/// code 1000.
pub struct App {
    router: Arc<Router>,
    state: State,
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder::default()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn url_path_for(&self, name: &str, params: &[(&str, &str)]) -> Result<UrlPath, Error> {
        self.router.url_path_for(name, params)
    }

    async fn serve(&self, mut scope: Scope, receive: Receiver, send: Sender) -> Result<(), Error> {
        if scope.router.is_none() {
            scope.router = Some(Arc::clone(&self.router));
        }
        scope.state = self.state.clone();
        let kind = scope.kind();

        match (self.router.call(scope, receive, send.clone()).await, kind) {
            (Err(Error::NotFound), ScopeKind::Http) => {
                Response::builder().status(StatusCode::NOT_FOUND).text("Not Found").send(&send).await
            }
            (Err(Error::MethodNotAllowed), ScopeKind::Http) => {
                Response::builder()
                    .status(StatusCode::METHOD_NOT_ALLOWED)
                    .text("Method Not Allowed")
                    .send(&send)
                    .await
            }
            (Err(Error::Disconnect(code)), ScopeKind::Websocket) => {
                send.send(Message::WebsocketClose { code }).await
            }
            (result, _) => result,
        }
    }
}

impl Application for App {
    fn call(&self, scope: Scope, receive: Receiver, send: Sender) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(self.serve(scope, receive, send))
    }

    fn name(&self) -> &str {
        "App"
    }

    fn as_router(&self) -> Option<&Router> {
        Some(&self.router)
    }
}

/// Assembles an [`App`].
///
/// Registration errors are kept and returned by [`build`](AppBuilder::build);
/// the first one wins.
#[derive(Default)]
pub struct AppBuilder {
    router: Router,
    lifespan: Lifespan,
    state: http::Extensions,
    error: Option<Error>,
}

impl AppBuilder {
    /// Stores a shared value, reachable as `req.state::<T>()`.
    pub fn state<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.state.insert(value);
        self
    }

    /// Replaces the router built so far.
    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    pub fn route(self, path: &str, endpoint: impl IntoHttpEndpoint) -> Self {
        self.bind(crate::route::route(path, endpoint))
    }

    pub fn websocket(self, path: &str, endpoint: impl IntoWebsocketEndpoint) -> Self {
        self.bind(crate::route::websocket(path, endpoint))
    }

    pub fn mount(self, path: &str, app: impl Application) -> Self {
        self.bind(crate::route::Mount::new(path).app(app))
    }

    pub fn bind(mut self, item: impl Bind) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.router.bind(item) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn on_startup<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(State) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.lifespan.on_startup(hook);
        self
    }

    pub fn on_startup_blocking<F>(mut self, hook: F) -> Self
    where
        F: Fn(&State) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.lifespan.on_startup_blocking(hook);
        self
    }

    pub fn on_shutdown<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(State) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.lifespan.on_shutdown(hook);
        self
    }

    pub fn on_shutdown_blocking<F>(mut self, hook: F) -> Self
    where
        F: Fn(&State) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.lifespan.on_shutdown_blocking(hook);
        self
    }

    pub fn on_lifespan<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(State, Suspend) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.lifespan.on_lifespan(hook);
        self
    }

    pub fn on_lifespan_blocking<F, C>(mut self, make: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: LifespanContext,
    {
        self.lifespan.on_lifespan_blocking(make);
        self
    }

    /// Freezes the routes and hooks.
    pub fn build(self) -> Result<App, Error> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let mut router = self.router;
        router.set_lifespan(self.lifespan);
        Ok(App { router: Arc::new(router), state: State::new(self.state) })
    }
}
