//! Route and mount descriptors.
//!
//! A [`Route`] binds one path template to one endpoint. It is *plain* when
//! the template has no placeholders (matched by string equality) and
//! *dynamic* otherwise (matched by the compiled pattern). Routes are built
//! once, when bound, and never change afterwards.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::convert::Converter;
use crate::endpoint::{HttpEndpoint, IntoHttpEndpoint, IntoWebsocketEndpoint, WebsocketEndpoint};
use crate::error::Error;
use crate::method::Method;
use crate::params::Params;
use crate::parser::parse_path;
use crate::protocol::Application;
use crate::router::Router;

// ── Route ─────────────────────────────────────────────────────────────────────

/// The endpoint a route dispatches to.
pub enum Endpoint {
    Http(HttpEndpoint),
    Websocket(WebsocketEndpoint),
}

impl Endpoint {
    pub fn name(&self) -> &str {
        match self {
            Self::Http(e)      => e.name(),
            Self::Websocket(e) => e.name(),
        }
    }
}

struct Pattern {
    regex: Regex,
    converters: Vec<(String, Converter)>,
}

/// A compiled route.
pub struct Route {
    path: String,
    name: String,
    methods: Vec<Method>,
    endpoint: Endpoint,
    pattern: Option<Pattern>,
}

impl Route {
    /// Display path, placeholders normalised to `{name}`.
    pub fn path(&self) -> &str { &self.path }
    pub fn name(&self) -> &str { &self.name }
    pub fn endpoint(&self) -> &Endpoint { &self.endpoint }

    /// Allowed methods. Empty for websocket routes.
    pub fn methods(&self) -> &[Method] { &self.methods }

    pub fn is_dynamic(&self) -> bool { self.pattern.is_some() }

    pub fn is_websocket(&self) -> bool {
        matches!(self.endpoint, Endpoint::Websocket(_))
    }

    pub(crate) fn allows(&self, method: Method) -> bool {
        self.is_websocket() || self.methods.contains(&method)
    }

    /// Matches `path` against a dynamic route's pattern and converts the
    /// captures. A capture the converter rejects means no match.
    pub(crate) fn capture(&self, path: &str) -> Option<Params> {
        let pattern = self.pattern.as_ref()?;
        let caps = pattern.regex.captures(path)?;
        let mut params = Params::new();
        for (name, converter) in &pattern.converters {
            let raw = caps.name(name)?.as_str();
            params.insert(name.clone(), converter.convert(raw)?);
        }
        Some(params)
    }

    pub(crate) fn url_path(&self) -> UrlPath {
        let protocol = if self.is_websocket() { Protocol::Websocket } else { Protocol::Http };
        UrlPath::new(self.path.clone(), Some(protocol))
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("methods", &self.methods)
            .field("websocket", &self.is_websocket())
            .finish_non_exhaustive()
    }
}

/// Describes an HTTP route; bind it with [`Router::bind`].
///
/// ```rust
/// use hius::{Func, Method, Request, Router, route};
///
/// async fn create_user(_req: Request) -> &'static str { "created" }
///
/// let mut router = Router::new();
/// router.bind(route("/users", Func::new(create_user)).methods([Method::Post]).name("users:create"))?;
/// # Ok::<(), hius::Error>(())
/// ```
pub fn route(path: &str, endpoint: impl IntoHttpEndpoint) -> RouteBuilder {
    RouteBuilder {
        path: path.to_owned(),
        endpoint: endpoint.into_http_endpoint().map(Endpoint::Http),
        methods: None,
        name: None,
    }
}

/// Describes a websocket route; bind it with [`Router::bind`].
pub fn websocket(path: &str, endpoint: impl IntoWebsocketEndpoint) -> RouteBuilder {
    RouteBuilder {
        path: path.to_owned(),
        endpoint: endpoint.into_websocket_endpoint().map(Endpoint::Websocket),
        methods: None,
        name: None,
    }
}

/// Pending route. Construction errors surface when it is built.
pub struct RouteBuilder {
    path: String,
    endpoint: Result<Endpoint, Error>,
    methods: Option<Vec<Method>>,
    name: Option<String>,
}

impl RouteBuilder {
    /// Replaces the default `{GET, HEAD}`. Ignored for websocket routes.
    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = Some(methods.into_iter().collect());
        self
    }

    /// Overrides the endpoint's inferred name.
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    pub fn build(self) -> Result<Route, Error> {
        let endpoint = self.endpoint?;
        let path = check_path(&self.path)?;
        let parsed = parse_path(path)?;

        let methods = match (&endpoint, self.methods) {
            (Endpoint::Websocket(_), _) => Vec::new(),
            (Endpoint::Http(_), None) => vec![Method::Get, Method::Head],
            (Endpoint::Http(_), Some(mut methods)) => {
                methods.sort_unstable();
                methods.dedup();
                methods
            }
        };
        let pattern = (!parsed.converters.is_empty())
            .then(|| Pattern { regex: parsed.pattern, converters: parsed.converters });

        Ok(Route {
            name: self.name.unwrap_or_else(|| endpoint.name().to_owned()),
            path: parsed.path,
            methods,
            endpoint,
            pattern,
        })
    }
}

fn check_path(path: &str) -> Result<&str, Error> {
    if !path.starts_with('/') {
        return Err(Error::InvalidPath {
            path: path.to_owned(),
            reason: "routed path must start with \"/\"".to_owned(),
        });
    }
    Ok(path.trim_end())
}

// ── Mount ─────────────────────────────────────────────────────────────────────

pub(crate) enum MountTarget {
    Router(Arc<Router>),
    App(Arc<dyn Application>),
}

/// Binds a path prefix to a nested router or a foreign application.
///
/// ```rust
/// use hius::{Func, Mount, Request, Router};
///
/// async fn profile(_req: Request) -> &'static str { "profile" }
///
/// let mut users = Router::new();
/// users.add_route("/{name}", Func::new(profile))?;
///
/// let mut router = Router::new();
/// router.bind(Mount::new("/users").routes(users))?;
/// assert_eq!(router.url_path_for("profile", &[("name", "alice")])?, "/users/alice");
/// # Ok::<(), hius::Error>(())
/// ```
///
/// A trailing `/` on the prefix is dropped, so `Mount::new("/")` qualifies
/// every path.
pub struct Mount {
    path: String,
    routes: Option<Router>,
    app: Option<Arc<dyn Application>>,
    name: Option<String>,
}

impl Mount {
    pub fn new(path: &str) -> Self {
        Self { path: path.to_owned(), routes: None, app: None, name: None }
    }

    pub fn routes(mut self, router: Router) -> Self {
        self.routes = Some(router);
        self
    }

    pub fn app(mut self, app: impl Application) -> Self {
        self.app = Some(Arc::new(app));
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    pub(crate) fn build(self) -> Result<Mounted, Error> {
        let path = check_path(&self.path)?.trim_end_matches('/').to_owned();
        let target = match (self.app, self.routes) {
            (Some(_), Some(_)) => return Err(Error::Mount(self.path)),
            (Some(app), None) => MountTarget::App(app),
            (None, routes) => MountTarget::Router(Arc::new(routes.unwrap_or_default())),
        };
        let name = self.name.unwrap_or_else(|| match &target {
            MountTarget::Router(_) => "Router".to_owned(),
            MountTarget::App(app) => app.name().to_owned(),
        });
        Ok(Mounted { path, name, target })
    }
}

/// A mount, validated and bound.
pub(crate) struct Mounted {
    pub(crate) path: String,
    pub(crate) name: String,
    pub(crate) target: MountTarget,
}

impl Mounted {
    /// Exact prefix, or prefix followed by `/`.
    pub(crate) fn qualifies(&self, path: &str) -> bool {
        match path.strip_prefix(self.path.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// The nested router, when there is one to descend into.
    pub(crate) fn router(&self) -> Option<&Router> {
        match &self.target {
            MountTarget::Router(router) => Some(router),
            MountTarget::App(app) => app.as_router(),
        }
    }
}

// ── UrlPath ───────────────────────────────────────────────────────────────────

/// Protocol a reverse-looked-up path is served over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Websocket,
}

/// Result of a reverse lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrlPath {
    path: String,
    protocol: Option<Protocol>,
}

impl UrlPath {
    pub fn new(path: impl Into<String>, protocol: Option<Protocol>) -> Self {
        Self { path: path.into(), protocol }
    }

    pub fn path(&self) -> &str { &self.path }

    /// `None` for a foreign application mount.
    pub fn protocol(&self) -> Option<Protocol> { self.protocol }

    pub(crate) fn prepend(mut self, prefix: &str) -> Self {
        self.path.insert_str(0, prefix);
        self
    }

    pub(crate) fn with_path(mut self, path: String) -> Self {
        self.path = path;
        self
    }

    /// Joins this path onto `base`, switching the scheme to match the
    /// protocol: `http`/`https` for HTTP routes, `ws`/`wss` for websocket
    /// routes, depending on whether `base` is secure. The base path is kept.
    ///
    /// ```rust
    /// use hius::{Protocol, UrlPath};
    ///
    /// let url = UrlPath::new("/ws", Some(Protocol::Websocket))
    ///     .make_absolute_url("https://example.com/api/")?;
    /// assert_eq!(url.as_str(), "wss://example.com/api/ws");
    /// # Ok::<(), hius::Error>(())
    /// ```
    pub fn make_absolute_url(&self, base: &str) -> Result<url::Url, Error> {
        let base = url::Url::parse(base)?;
        let secure = matches!(base.scheme(), "https" | "wss");
        let scheme = match (self.protocol, secure) {
            (Some(Protocol::Http), false)      => "http",
            (Some(Protocol::Http), true)       => "https",
            (Some(Protocol::Websocket), false) => "ws",
            (Some(Protocol::Websocket), true)  => "wss",
            (None, _) => base.scheme(),
        };

        let mut authority = base.host_str().unwrap_or_default().to_owned();
        if let Some(port) = base.port() {
            authority.push_str(&format!(":{port}"));
        }
        let path = format!("{}{}", base.path().trim_end_matches('/'), self.path);
        Ok(url::Url::parse(&format!("{scheme}://{authority}{path}"))?)
    }
}

impl fmt::Display for UrlPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl PartialEq<str> for UrlPath {
    fn eq(&self, other: &str) -> bool { self.path == other }
}

impl PartialEq<&str> for UrlPath {
    fn eq(&self, other: &&str) -> bool { self.path == *other }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Func;
    use crate::request::Request;
    use crate::params::Value;

    async fn users(_req: Request) -> &'static str { "users" }

    #[test]
    fn plain_and_dynamic() {
        let plain = route("/users", Func::new(users)).build().unwrap();
        assert!(!plain.is_dynamic());
        assert_eq!(plain.methods(), [Method::Get, Method::Head]);
        assert_eq!(plain.name(), "users");

        let dynamic = route("/users/{id:int}", Func::new(users)).name("user").build().unwrap();
        assert!(dynamic.is_dynamic());
        assert_eq!(dynamic.path(), "/users/{id}");
        assert_eq!(dynamic.capture("/users/42").unwrap().value("id"), Some(&Value::Int(42)));
        assert!(dynamic.capture("/users/abc").is_none());
        assert!(dynamic.capture("/users/99999999999999999999999").is_none());
    }

    #[test]
    fn path_must_start_with_slash() {
        let err = route("users", Func::new(users)).build().unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));
    }

    #[test]
    fn methods_are_normalised() {
        let r = route("/x", Func::new(users))
            .methods([Method::Post, Method::Get, Method::Post])
            .build()
            .unwrap();
        assert_eq!(r.methods(), [Method::Get, Method::Post]);
        assert!(r.allows(Method::Post));
        assert!(!r.allows(Method::Put));
    }

    #[test]
    fn mount_rejects_app_and_routes() {
        let app = Router::new();
        let err = Mount::new("/x").routes(Router::new()).app(app).build().err().unwrap();
        assert!(matches!(err, Error::Mount(_)));
    }

    #[test]
    fn mount_prefix_qualification() {
        let mounted = Mount::new("/users/").build().unwrap();
        assert_eq!(mounted.path, "/users");
        assert_eq!(mounted.name, "Router");
        assert!(mounted.qualifies("/users"));
        assert!(mounted.qualifies("/users/alice"));
        assert!(!mounted.qualifies("/usersx"));
        assert!(Mount::new("/").build().unwrap().qualifies("/anything"));
    }

    #[test]
    fn absolute_urls() {
        let http = UrlPath::new("/users/1", Some(Protocol::Http));
        assert_eq!(http.make_absolute_url("https://example.org").unwrap().as_str(), "https://example.org/users/1");
        assert_eq!(http.make_absolute_url("ws://localhost:8000/").unwrap().as_str(), "http://localhost:8000/users/1");

        let plain = UrlPath::new("/static", None);
        assert_eq!(plain.make_absolute_url("https://example.org/app").unwrap().as_str(), "https://example.org/app/static");
    }
}
