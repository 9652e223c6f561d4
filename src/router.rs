//! Request router.
//!
//! Three collections per protocol, checked in a fixed order:
//!
//! 1. **plain** routes, keyed by their literal path;
//! 2. **dynamic** routes, tried in registration order; the first whose
//!    pattern matches decides the outcome;
//! 3. **mounts**, tried in registration order; the first whose prefix
//!    qualifies decides the outcome.
//!
//! A plain or dynamic route that matches the path but not the method is a
//! partial match (405). It is never shadowed by a later mount.
//!
//! The router is assembled mutably, then frozen behind an `Arc` by
//! [`AppBuilder::build`](crate::AppBuilder::build). Nothing on the request
//! path takes a lock.

use std::collections::HashMap;

use tracing::debug;

use crate::endpoint::{IntoHttpEndpoint, IntoWebsocketEndpoint};
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::lifespan::Lifespan;
use crate::method::Method;
use crate::params::Params;
use crate::protocol::{Application, Receiver, Scope, ScopeKind, Sender};
use crate::route::{Endpoint, Mount, MountTarget, Mounted, Route, RouteBuilder, UrlPath, route, websocket};
use crate::websocket::NORMAL_CLOSURE;

// ── Match ─────────────────────────────────────────────────────────────────────

/// What a full match resolved to.
pub enum Matched<'r> {
    Route { route: &'r Route, params: Params },
    /// A foreign application behind a mount. It gets the request with the
    /// mount prefix stripped.
    App(&'r dyn Application),
}

/// Outcome of matching a request against a router.
pub enum Match<'r> {
    Full(Matched<'r>),
    /// The path matched a route whose methods do not include the request's.
    Partial,
    None,
}

impl<'r> Match<'r> {
    pub fn is_full(&self) -> bool { matches!(self, Self::Full(_)) }
    pub fn is_partial(&self) -> bool { matches!(self, Self::Partial) }
    pub fn is_none(&self) -> bool { matches!(self, Self::None) }

    pub fn route(&self) -> Option<&'r Route> {
        match self {
            Self::Full(Matched::Route { route, .. }) => Some(*route),
            _ => None,
        }
    }

    pub fn params(&self) -> Option<&Params> {
        match self {
            Self::Full(Matched::Route { params, .. }) => Some(params),
            _ => None,
        }
    }
}

// ── Tables ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Table {
    plain: HashMap<String, Vec<Route>>,
    /// Plain paths in first-registration order, for reverse lookup.
    order: Vec<String>,
    dynamic: Vec<Route>,
}

impl Table {
    fn insert(&mut self, route: Route) {
        if route.is_dynamic() {
            self.dynamic.push(route);
            return;
        }
        let path = route.path().to_owned();
        if !self.plain.contains_key(&path) {
            self.order.push(path.clone());
        }
        self.plain.entry(path).or_default().push(route);
    }

    fn plain_routes(&self) -> impl Iterator<Item = &Route> {
        self.order.iter().filter_map(|p| self.plain.get(p)).flatten()
    }

    fn routes(&self) -> impl Iterator<Item = &Route> {
        self.plain_routes().chain(&self.dynamic)
    }

    fn resolve(&self, method: Method, path: &str) -> Option<Match<'_>> {
        if let Some(routes) = self.plain.get(path) {
            return Some(
                routes.iter()
                    .find(|r| r.allows(method))
                    .map_or(Match::Partial, |route| {
                        Match::Full(Matched::Route { route, params: Params::new() })
                    }),
            );
        }

        self.dynamic.iter().find_map(|route| {
            let params = route.capture(path)?;
            Some(if route.allows(method) {
                Match::Full(Matched::Route { route, params })
            } else {
                Match::Partial
            })
        })
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

/// The application router.
///
/// ```rust
/// use hius::{Func, Request, Response, Router};
///
/// async fn get_user(req: Request) -> Response {
///     Response::text(format!("user {}", req.param::<i64>("id").unwrap_or_default()))
/// }
///
/// let mut router = Router::new();
/// router.add_route("/users/{id:int}", Func::new(get_user).signature("id: int"))?;
///
/// let found = router.matches(hius::Method::Get, "/users/42");
/// assert_eq!(found.params().and_then(|p| p.get::<i64>("id")), Some(42));
/// # Ok::<(), hius::Error>(())
/// ```
#[derive(Default)]
pub struct Router {
    http: Table,
    websocket: Table,
    mounts: Vec<Mounted>,
    lifespan: Lifespan,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Registration ──────────────────────────────────────────────────────────

    /// Binds an HTTP route serving `GET` and `HEAD`.
    pub fn add_route(&mut self, path: &str, endpoint: impl IntoHttpEndpoint) -> Result<&mut Self, Error> {
        self.bind(route(path, endpoint))
    }

    pub fn add_websocket(&mut self, path: &str, endpoint: impl IntoWebsocketEndpoint) -> Result<&mut Self, Error> {
        self.bind(websocket(path, endpoint))
    }

    /// Mounts a foreign application under `path`.
    pub fn mount(&mut self, path: &str, app: impl Application) -> Result<&mut Self, Error> {
        self.bind(Mount::new(path).app(app))
    }

    /// Binds a route built with [`route`] / [`websocket`], or a [`Mount`].
    pub fn bind(&mut self, item: impl Bind) -> Result<&mut Self, Error> {
        item.bind_into(self)?;
        Ok(self)
    }

    pub(crate) fn insert_route(&mut self, route: Route) {
        debug!(path = %route.path(), name = %route.name(), websocket = route.is_websocket(), "route bound");
        match route.endpoint() {
            Endpoint::Http(_)      => self.http.insert(route),
            Endpoint::Websocket(_) => self.websocket.insert(route),
        }
    }

    pub(crate) fn insert_mount(&mut self, mounted: Mounted) {
        debug!(path = %mounted.path, name = %mounted.name, "mount bound");
        self.mounts.push(mounted);
    }

    pub(crate) fn set_lifespan(&mut self, lifespan: Lifespan) {
        self.lifespan = lifespan;
    }

    // ── Matching ──────────────────────────────────────────────────────────────

    /// Matches an HTTP request for `path`.
    pub fn matches(&self, method: Method, path: &str) -> Match<'_> {
        let mut scope = Scope::http(method, path);
        self.resolve(&mut scope)
    }

    /// Matches a websocket connection for `path`.
    pub fn matches_websocket(&self, path: &str) -> Match<'_> {
        let mut scope = Scope::websocket(path);
        self.resolve(&mut scope)
    }

    /// Resolves `scope` against this router, descending through mounts.
    /// Every mount passed moves its prefix from the working path to the
    /// root path.
    pub(crate) fn resolve(&self, scope: &mut Scope) -> Match<'_> {
        let table = match scope.kind() {
            ScopeKind::Websocket => &self.websocket,
            _ => &self.http,
        };
        if let Some(found) = table.resolve(scope.method(), scope.working_path()) {
            return found;
        }

        let Some(mounted) = self.mounts.iter().find(|m| m.qualifies(scope.working_path())) else {
            return Match::None;
        };
        scope.descend(&mounted.path);
        match (&mounted.target, mounted.router()) {
            (_, Some(router)) => router.resolve(scope),
            (MountTarget::App(app), None) => Match::Full(Matched::App(app.as_ref())),
            (MountTarget::Router(_), None) => Match::None,
        }
    }

    // ── Reverse lookup ────────────────────────────────────────────────────────

    /// Builds the path of the route called `name`.
    ///
    /// Placeholders are filled from `params`; every placeholder must be
    /// supplied once any parameter is. With no parameters the template is
    /// returned as is.
    pub fn url_path_for(&self, name: &str, params: &[(&str, &str)]) -> Result<UrlPath, Error> {
        let found = self.lookup(name).ok_or_else(|| Error::NoMatchFound(name.to_owned()))?;
        if params.is_empty() {
            return Ok(found);
        }
        let path = fill(found.path(), name, params)?;
        Ok(found.with_path(path))
    }

    fn lookup(&self, name: &str) -> Option<UrlPath> {
        let routed = self.http.plain_routes()
            .chain(&self.http.dynamic)
            .chain(self.websocket.plain_routes())
            .chain(&self.websocket.dynamic)
            .find(|r| r.name() == name);
        if let Some(route) = routed {
            return Some(route.url_path());
        }

        self.mounts.iter().find_map(|mounted| match mounted.router() {
            Some(router) => router.lookup(name).map(|found| found.prepend(&mounted.path)),
            None if mounted.name == name => Some(UrlPath::new(mounted.path.clone(), None)),
            None => None,
        })
    }

    /// Every HTTP route with the chain of mount prefixes leading to it.
    /// Mounted routes come first, then this router's own.
    pub fn http_routes(&self) -> Vec<(Vec<&str>, &Route)> {
        let mut out = Vec::new();
        self.collect_http_routes(&mut Vec::new(), &mut out);
        out
    }

    fn collect_http_routes<'r>(&'r self, prefixes: &mut Vec<&'r str>, out: &mut Vec<(Vec<&'r str>, &'r Route)>) {
        for mounted in &self.mounts {
            let Some(router) = mounted.router() else { continue };
            prefixes.push(&mounted.path);
            router.collect_http_routes(prefixes, out);
            prefixes.pop();
        }
        for route in self.http.routes() {
            out.push((prefixes.clone(), route));
        }
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    async fn dispatch(&self, mut scope: Scope, receive: Receiver, send: Sender) -> Result<(), Error> {
        let websocket = scope.kind() == ScopeKind::Websocket;

        match self.resolve(&mut scope) {
            Match::Full(Matched::Route { route, params }) => {
                debug!(path = %scope.path(), route = %route.name(), "matched");
                scope.path_params = params;
                match route.endpoint() {
                    Endpoint::Http(endpoint)      => endpoint.handle(scope, receive, send).await,
                    Endpoint::Websocket(endpoint) => endpoint.handle(scope, receive, send).await,
                }
            }
            Match::Full(Matched::App(app)) => app.call(scope, receive, send).await,
            Match::Partial if !websocket => Err(Error::MethodNotAllowed),
            Match::None if !websocket => Err(Error::NotFound),
            _ => {
                debug!(path = %scope.path(), "websocket route not found");
                Err(Error::Disconnect(NORMAL_CLOSURE))
            }
        }
    }
}

impl Application for Router {
    fn call(&self, scope: Scope, receive: Receiver, send: Sender) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async move {
            match scope.kind() {
                ScopeKind::Lifespan => {
                    let state = scope.state().clone();
                    self.lifespan.run(state, receive, send).await
                }
                _ => self.dispatch(scope, receive, send).await,
            }
        })
    }

    fn name(&self) -> &str {
        "Router"
    }

    fn as_router(&self) -> Option<&Router> {
        Some(self)
    }
}

// ── Bind ──────────────────────────────────────────────────────────────────────

/// Something [`Router::bind`] accepts: a route description or a mount.
pub trait Bind {
    fn bind_into(self, router: &mut Router) -> Result<(), Error>;
}

impl Bind for RouteBuilder {
    fn bind_into(self, router: &mut Router) -> Result<(), Error> {
        router.insert_route(self.build()?);
        Ok(())
    }
}

impl Bind for Route {
    fn bind_into(self, router: &mut Router) -> Result<(), Error> {
        router.insert_route(self);
        Ok(())
    }
}

impl Bind for Mount {
    fn bind_into(self, router: &mut Router) -> Result<(), Error> {
        router.insert_mount(self.build()?);
        Ok(())
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Substitutes every `{param}` in `template`.
fn fill(template: &str, name: &str, params: &[(&str, &str)]) -> Result<String, Error> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else { break };
        let param = &rest[open + 1..open + close];
        let value = params.iter()
            .find(|(k, _)| *k == param)
            .map(|(_, v)| *v)
            .ok_or_else(|| Error::MissingParam { name: name.to_owned(), param: param.to_owned() })?;
        out.push_str(&rest[..open]);
        out.push_str(value);
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Func;
    use crate::params::Value;
    use crate::request::Request;

    async fn home(_req: Request) -> &'static str { "home" }
    async fn user(_req: Request) -> &'static str { "user" }

    #[test]
    fn fills_placeholders() {
        assert_eq!(fill("/a/{x}/b/{y}", "r", &[("y", "2"), ("x", "1")]).unwrap(), "/a/1/b/2");
        assert!(matches!(
            fill("/a/{x}", "r", &[("z", "1")]),
            Err(Error::MissingParam { ref param, .. }) if param == "x"
        ));
    }

    #[test]
    fn plain_routes_win_over_dynamic() {
        let mut router = Router::new();
        router.add_route("/users/{name}", Func::new(user)).unwrap();
        router.add_route("/users/me", Func::new(home)).unwrap();

        let found = router.matches(Method::Get, "/users/me");
        assert_eq!(found.route().map(Route::name), Some("home"));

        let found = router.matches(Method::Get, "/users/bob");
        assert_eq!(found.params().and_then(|p| p.value("name")), Some(&Value::Str("bob".into())));
    }

    #[test]
    fn first_dynamic_pattern_hit_decides() {
        let mut router = Router::new();
        router.add_route("/items/{id:int}", Func::new(user)).unwrap();
        router.bind(route("/items/{name}", Func::new(home)).methods([Method::Post])).unwrap();

        assert_eq!(router.matches(Method::Get, "/items/3").route().map(Route::name), Some("user"));
        assert!(router.matches(Method::Post, "/items/3").is_partial());
        assert_eq!(router.matches(Method::Post, "/items/x").route().map(Route::name), Some("home"));
        assert!(router.matches(Method::Get, "/items/x").is_partial());
        assert!(router.matches(Method::Get, "/things/3").is_none());
    }

    #[test]
    fn unnamed_lookup_fails() {
        let router = Router::new();
        assert!(matches!(router.url_path_for("nope", &[]), Err(Error::NoMatchFound(_))));
    }
}
