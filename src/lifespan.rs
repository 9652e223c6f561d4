//! Startup / shutdown coordination.
//!
//! Three kinds of hooks, run in a fixed order:
//!
//! ```text
//! lifespan.startup   → on_startup[0..n]  → on_lifespan[0..n] (up to their suspension point)
//!                    → lifespan.startup.complete | lifespan.startup.failed
//! lifespan.shutdown  → on_lifespan[n..0] (resumed)  → on_shutdown[0..n]
//!                    → lifespan.shutdown.complete | lifespan.shutdown.failed
//! ```
//!
//! A lifespan hook is a future that receives a [`Suspend`] handle. Whatever
//! it does before awaiting [`Suspend::until_shutdown`] is its startup half,
//! whatever follows is its shutdown half:
//!
//! ```rust
//! use hius::{BoxError, Lifespan, State, Suspend};
//!
//! let mut lifespan = Lifespan::default();
//! lifespan.on_lifespan(|_state: State, suspend: Suspend| async move {
//!     let pool = "connected";
//!     suspend.until_shutdown().await;
//!     drop(pool);
//!     Ok::<(), BoxError>(())
//! });
//! ```
//!
//! A hook must suspend at most once. One that suspends again is reported
//! as a failure of the phase in which the second suspension is observed.

use std::fmt;
use std::future::{Future, poll_fn};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Waker};

use tracing::{debug, error, info};

use crate::error::{BoxError, Error};
use crate::handler::BoxFuture;
use crate::protocol::{Message, Receiver, Sender, State};

type Hook = Box<dyn Fn(State) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;
type LifespanHook = Box<dyn Fn(State, Suspend) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

const YIELDED_TWICE: &str = "lifespan context yielded multiple times";

// ── Suspend ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Gate {
    /// Suspension points reached so far.
    yields: usize,
    /// Suspension points allowed to complete.
    released: usize,
    wakers: Vec<Waker>,
}

/// Suspension handle passed to a lifespan hook.
#[derive(Clone, Default)]
pub struct Suspend(Arc<Mutex<Gate>>);

impl Suspend {
    /// Marks the end of the hook's startup half. Completes when the
    /// application shuts down.
    pub fn until_shutdown(&self) -> SuspendPoint {
        SuspendPoint { gate: Arc::clone(&self.0), ticket: None }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Gate) -> R) -> R {
        let mut gate = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut gate)
    }

    fn yields(&self) -> usize {
        self.with(|g| g.yields)
    }

    fn release(&self) {
        let wakers = self.with(|g| {
            g.released = g.yields;
            std::mem::take(&mut g.wakers)
        });
        wakers.into_iter().for_each(Waker::wake);
    }
}

/// Future returned by [`Suspend::until_shutdown`].
pub struct SuspendPoint {
    gate: Arc<Mutex<Gate>>,
    ticket: Option<usize>,
}

impl Future for SuspendPoint {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let gate = Arc::clone(&self.gate);
        let mut gate = gate.lock().unwrap_or_else(PoisonError::into_inner);
        let ticket = *self.ticket.get_or_insert_with(|| {
            gate.yields += 1;
            gate.yields
        });
        if gate.released >= ticket {
            return Poll::Ready(());
        }
        gate.wakers.push(cx.waker().clone());
        Poll::Pending
    }
}

// ── Blocking context ──────────────────────────────────────────────────────────

/// Two-phase synchronous lifespan hook, run on the blocking pool.
pub trait LifespanContext: Send + 'static {
    fn enter(&mut self, state: &State) -> Result<(), BoxError>;
    fn exit(&mut self, state: &State) -> Result<(), BoxError>;
}

// ── Lifespan ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug)]
enum Phase {
    Idle,
    Starting,
    Started,
    Stopping,
    Stopped,
    Failed(&'static str),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle          => f.write_str("idle"),
            Self::Starting      => f.write_str("starting"),
            Self::Started       => f.write_str("started"),
            Self::Stopping      => f.write_str("stopping"),
            Self::Stopped       => f.write_str("stopped"),
            Self::Failed(phase) => write!(f, "failed ({phase})"),
        }
    }
}

/// A hook driven to its suspension point and waiting for shutdown.
struct Launched {
    future: BoxFuture<'static, Result<(), BoxError>>,
    suspend: Suspend,
}

enum Step {
    Finished(Result<(), BoxError>),
    Suspended(usize),
}

/// Polls `future` until it completes or reaches a suspension point past
/// `seen`.
async fn drive(future: &mut BoxFuture<'static, Result<(), BoxError>>, suspend: &Suspend, seen: usize) -> Step {
    poll_fn(|cx| {
        if let Poll::Ready(result) = future.as_mut().poll(cx) {
            return Poll::Ready(Step::Finished(result));
        }
        let yields = suspend.yields();
        if yields > seen { Poll::Ready(Step::Suspended(yields)) } else { Poll::Pending }
    })
    .await
}

/// The lifecycle hooks of an application.
#[derive(Default)]
pub struct Lifespan {
    on_startup: Vec<Hook>,
    on_shutdown: Vec<Hook>,
    on_lifespan: Vec<LifespanHook>,
}

impl Lifespan {
    pub fn on_startup<F, Fut>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(State) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.on_startup.push(async_hook(hook));
        self
    }

    /// Synchronous startup hook, run on the blocking pool.
    pub fn on_startup_blocking<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&State) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on_startup.push(blocking_hook(hook));
        self
    }

    pub fn on_shutdown<F, Fut>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(State) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.on_shutdown.push(async_hook(hook));
        self
    }

    pub fn on_shutdown_blocking<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&State) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on_shutdown.push(blocking_hook(hook));
        self
    }

    pub fn on_lifespan<F, Fut>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(State, Suspend) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.on_lifespan.push(Box::new(
            move |state: State, suspend: Suspend| -> BoxFuture<'static, Result<(), BoxError>> {
                Box::pin(hook(state, suspend))
            },
        ));
        self
    }

    /// Registers a two-phase synchronous hook. `make` builds a fresh
    /// context for every run.
    pub fn on_lifespan_blocking<F, C>(&mut self, make: F) -> &mut Self
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: LifespanContext,
    {
        self.on_lifespan(move |state: State, suspend: Suspend| {
            let mut context = make();
            async move {
                let entered = state.clone();
                let mut context = tokio::task::spawn_blocking(move || {
                    context.enter(&entered).map(|()| context)
                })
                .await??;

                suspend.until_shutdown().await;

                tokio::task::spawn_blocking(move || context.exit(&state)).await?
            }
        })
    }

    /// Serves one lifespan connection: waits for `lifespan.startup`, runs
    /// startup, waits for `lifespan.shutdown`, runs shutdown. Hook failures
    /// are reported as `lifespan.*.failed` messages, not as errors.
    pub async fn run(&self, state: State, mut receive: Receiver, send: Sender) -> Result<(), Error> {
        let mut phase = Phase::Idle;
        let mut launched = Vec::new();

        wait_for(&mut receive, &Message::LifespanStartup).await?;
        phase = advance(phase, Phase::Starting);

        if let Err(e) = self.startup(&state, &mut launched).await {
            phase = advance(phase, Phase::Failed("startup"));
            error!(error = %e, %phase, "lifespan startup failed");
            return send.send(Message::LifespanStartupFailed { message: e.to_string() }).await;
        }
        send.send(Message::LifespanStartupComplete).await?;
        phase = advance(phase, Phase::Started);
        info!(hooks = self.on_startup.len() + launched.len(), %phase, "application started");

        wait_for(&mut receive, &Message::LifespanShutdown).await?;
        phase = advance(phase, Phase::Stopping);

        if let Err(e) = self.shutdown(&state, launched).await {
            phase = advance(phase, Phase::Failed("shutdown"));
            error!(error = %e, %phase, "lifespan shutdown failed");
            return send.send(Message::LifespanShutdownFailed { message: e.to_string() }).await;
        }
        phase = advance(phase, Phase::Stopped);
        info!(%phase, "application stopped");
        send.send(Message::LifespanShutdownComplete).await
    }

    async fn startup(&self, state: &State, launched: &mut Vec<Launched>) -> Result<(), BoxError> {
        for hook in &self.on_startup {
            hook(state.clone()).await?;
        }

        for hook in &self.on_lifespan {
            let suspend = Suspend::default();
            let mut future = hook(state.clone(), suspend.clone());
            match drive(&mut future, &suspend, 0).await {
                Step::Finished(result) => result?,
                Step::Suspended(1) => launched.push(Launched { future, suspend }),
                Step::Suspended(_) => return Err(YIELDED_TWICE.into()),
            }
        }
        Ok(())
    }

    async fn shutdown(&self, state: &State, launched: Vec<Launched>) -> Result<(), BoxError> {
        for Launched { mut future, suspend } in launched.into_iter().rev() {
            let seen = suspend.yields();
            suspend.release();
            match drive(&mut future, &suspend, seen).await {
                Step::Finished(result) => result?,
                Step::Suspended(_) => return Err(YIELDED_TWICE.into()),
            }
        }

        for hook in &self.on_shutdown {
            hook(state.clone()).await?;
        }
        Ok(())
    }
}

fn advance(from: Phase, to: Phase) -> Phase {
    debug!(from = %from, to = %to, "lifespan phase");
    to
}

/// Skips anything that is not `expected`.
async fn wait_for(receive: &mut Receiver, expected: &Message) -> Result<(), Error> {
    loop {
        if receive.recv().await? == *expected {
            return Ok(());
        }
    }
}

fn async_hook<F, Fut>(hook: F) -> Hook
where
    F: Fn(State) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    Box::new(move |state: State| -> BoxFuture<'static, Result<(), BoxError>> {
        Box::pin(hook(state))
    })
}

fn blocking_hook<F>(hook: F) -> Hook
where
    F: Fn(&State) -> Result<(), BoxError> + Send + Sync + 'static,
{
    let hook = Arc::new(hook);
    Box::new(move |state: State| -> BoxFuture<'static, Result<(), BoxError>> {
        let hook = Arc::clone(&hook);
        Box::pin(async move { tokio::task::spawn_blocking(move || hook(&state)).await? })
    })
}
