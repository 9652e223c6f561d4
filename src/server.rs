//! HTTP server and graceful shutdown.
//!
//! The server is a thin transport: every hyper request becomes an `http`
//! scope plus one `http.request` message, and whatever the application
//! sends back is folded into a hyper response. The application's lifespan
//! runs around the accept loop:
//!
//! 1. `lifespan.startup` is sent before the listener accepts anything; a
//!    `lifespan.startup.failed` answer aborts [`Server::serve`].
//! 2. On SIGTERM / Ctrl-C the listener stops accepting and every in-flight
//!    connection runs to completion.
//! 3. `lifespan.shutdown` is sent last.
//!
//! Websocket upgrades are not handled here. Websocket routes are served by
//! transports that speak the websocket messages, such as
//! [`TestClient`](crate::testing::TestClient).

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::method::Method;
use crate::protocol::{Application, Message, Receiver, Scope, Sender, channel};

/// The HTTP server.
pub struct Server<A> {
    addr: A,
}

impl<A: ToSocketAddrs + std::fmt::Debug> Server<A> {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust,no_run
    /// use hius::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: A) -> Self {
        Self { addr }
    }

    /// Runs the lifespan, then serves `app` until SIGTERM or Ctrl-C.
    ///
    /// Returns after graceful shutdown, or with [`Error::Lifespan`] when the
    /// application reports a failed startup or shutdown.
    pub async fn serve(self, app: impl Application) -> Result<(), Error> {
        self.serve_with_shutdown(app, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), stopping when `signal` resolves.
    pub async fn serve_with_shutdown(
        self,
        app: impl Application,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let app: Arc<dyn Application> = Arc::new(app);
        let mut lifespan = LifespanChannel::start(Arc::clone(&app));
        lifespan.startup().await?;

        let listener = TcpListener::bind(&self.addr).await?;
        info!(addr = ?self.addr, "hius listening");

        let mut tasks = tokio::task::JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let app = Arc::clone(&app);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let app = Arc::clone(&app);
                            async move { dispatch(app.as_ref(), req).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        lifespan.shutdown().await?;
        info!("hius stopped");
        Ok(())
    }
}

// ── Lifespan ──────────────────────────────────────────────────────────────────

/// The server's end of the application's lifespan connection.
struct LifespanChannel {
    send: Sender,
    receive: Receiver,
    task: JoinHandle<Result<(), Error>>,
}

impl LifespanChannel {
    fn start(app: Arc<dyn Application>) -> Self {
        let (send, app_receive) = channel(4);
        let (app_send, receive) = channel(4);
        let task = tokio::spawn(async move { app.call(Scope::lifespan(), app_receive, app_send).await });
        Self { send, receive, task }
    }

    async fn startup(&mut self) -> Result<(), Error> {
        self.send.send(Message::LifespanStartup).await?;
        match self.receive.recv().await? {
            Message::LifespanStartupFailed { message } => {
                error!(%message, "application startup failed");
                Err(Error::Lifespan(message))
            }
            _ => Ok(()),
        }
    }

    async fn shutdown(self) -> Result<(), Error> {
        self.send.send(Message::LifespanShutdown).await?;
        let mut receive = self.receive;
        let reply = receive.recv().await?;
        match self.task.await {
            Ok(Err(e)) => warn!(error = %e, "lifespan task ended with an error"),
            Err(e) => warn!(error = %e, "lifespan task did not finish"),
            Ok(Ok(())) => {}
        }
        match reply {
            Message::LifespanShutdownFailed { message } => Err(Error::Lifespan(message)),
            _ => Ok(()),
        }
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Bridges one hyper request through the application.
///
/// Never fails towards hyper: unknown methods answer 405, unreadable
/// bodies 400, an application that errors before starting a response 500.
pub(crate) async fn dispatch<B>(
    app: &dyn Application,
    req: http::Request<B>,
) -> Result<http::Response<Full<Bytes>>, Infallible>
where
    B: hyper::body::Body,
    B::Error: std::fmt::Display,
{
    let Ok(method) = Method::try_from(req.method()) else {
        return Ok(plain(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"));
    };
    let target = req.uri().path_and_query().map_or("/", |pq| pq.as_str()).to_owned();

    let mut scope = Scope::http(method, &target);
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            scope = scope.with_header(name.as_str(), value);
        }
    }

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(path = %scope.path(), "failed to read request body: {e}");
            return Ok(plain(StatusCode::BAD_REQUEST, "Bad Request"));
        }
    };

    let (in_tx, in_rx) = channel(1);
    let (out_tx, mut out_rx) = channel(8);
    if in_tx.send(Message::HttpRequest { body, more_body: false }).await.is_err() {
        return Ok(plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"));
    }

    let path = scope.path().to_owned();
    let (result, response) = tokio::join!(app.call(scope, in_rx, out_tx), collect_response(&mut out_rx));
    if let Err(e) = result {
        error!(%path, error = %e, "application error");
    }

    Ok(response.unwrap_or_else(|| plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")))
}

/// Reads `http.response.start` and the body chunks that follow. `None`
/// when the application never started a response.
async fn collect_response(receive: &mut Receiver) -> Option<http::Response<Full<Bytes>>> {
    let mut head = None;
    let mut body = BytesMut::new();

    while let Ok(message) = receive.recv().await {
        match message {
            Message::HttpResponseStart { status, headers } => head = Some((status, headers)),
            Message::HttpResponseBody { body: chunk, more_body } => {
                body.extend_from_slice(&chunk);
                if !more_body {
                    break;
                }
            }
            _ => {}
        }
    }

    let (status, headers) = head?;
    let mut response = http::Response::new(Full::new(body.freeze()));
    *response.status_mut() = status;
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
            response.headers_mut().append(name, value);
        }
    }
    Some(response)
}

fn plain(status: StatusCode, text: &'static str) -> http::Response<Full<Bytes>> {
    let mut response = http::Response::new(Full::new(Bytes::from_static(text.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C). A handler that cannot
/// be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
