use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use hius::testing::TestClient;
use hius::{App, BoxError, Error, Func, LifespanContext, Message, Request, Server, State, Suspend};

#[derive(Clone, Default)]
struct Flags {
    started: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl Flags {
    fn started(&self) -> bool { self.started.load(Ordering::SeqCst) }
    fn stopped(&self) -> bool { self.stopped.load(Ordering::SeqCst) }
}

async fn home(req: Request) -> String {
    let started = req.state::<Flags>().is_some_and(Flags::started);
    format!("started={started}")
}

fn failed(message: &str, shutdown: bool) -> Message {
    let message = message.to_owned();
    if shutdown {
        Message::LifespanShutdownFailed { message }
    } else {
        Message::LifespanStartupFailed { message }
    }
}

#[tokio::test]
async fn async_hooks_run_in_order() {
    let flags = Flags::default();
    let app = App::builder()
        .state(flags.clone())
        .route("/", Func::new(home))
        .on_startup(|state: State| async move {
            if let Some(flags) = state.get::<Flags>() {
                flags.started.store(true, Ordering::SeqCst);
            }
            Ok::<(), BoxError>(())
        })
        .on_shutdown(|state: State| async move {
            if let Some(flags) = state.get::<Flags>() {
                flags.stopped.store(true, Ordering::SeqCst);
            }
            Ok::<(), BoxError>(())
        })
        .build()
        .unwrap();

    let mut client = TestClient::new(app);
    assert!(!flags.started());
    assert_eq!(client.startup().await.unwrap(), Message::LifespanStartupComplete);
    assert!(flags.started() && !flags.stopped());
    assert_eq!(client.get("/").await.unwrap().text(), "started=true");

    assert_eq!(client.shutdown().await.unwrap(), Message::LifespanShutdownComplete);
    assert!(flags.stopped());
}

#[tokio::test]
async fn blocking_hooks() {
    let flags = Flags::default();
    let app = App::builder()
        .state(flags.clone())
        .on_startup_blocking(|state: &State| {
            let flags = state.get::<Flags>().ok_or("flags missing")?;
            flags.started.store(true, Ordering::SeqCst);
            Ok(())
        })
        .on_shutdown_blocking(|state: &State| {
            let flags = state.get::<Flags>().ok_or("flags missing")?;
            flags.stopped.store(true, Ordering::SeqCst);
            Ok(())
        })
        .build()
        .unwrap();

    let mut client = TestClient::new(app);
    client.startup().await.unwrap();
    assert!(flags.started() && !flags.stopped());
    client.shutdown().await.unwrap();
    assert!(flags.stopped());
}

#[tokio::test]
async fn async_startup_with_blocking_shutdown() {
    let started = Arc::new(AtomicUsize::new(0));
    let stopped = Arc::new(AtomicUsize::new(0));
    let (on_start, on_stop) = (Arc::clone(&started), Arc::clone(&stopped));
    let app = App::builder()
        .on_startup(move |_: State| {
            let on_start = Arc::clone(&on_start);
            async move {
                on_start.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            }
        })
        .on_shutdown_blocking(move |_: &State| {
            on_stop.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .build()
        .unwrap();

    let counts = || (started.load(Ordering::SeqCst), stopped.load(Ordering::SeqCst));
    let mut client = TestClient::new(app);
    assert_eq!(counts(), (0, 0));
    assert_eq!(client.startup().await.unwrap(), Message::LifespanStartupComplete);
    assert_eq!(counts(), (1, 0));
    assert_eq!(client.shutdown().await.unwrap(), Message::LifespanShutdownComplete);
    assert_eq!(counts(), (1, 1));
}

#[tokio::test]
async fn suspending_hook_brackets_the_application() {
    let flags = Flags::default();
    let app = App::builder()
        .state(flags.clone())
        .on_lifespan(|state: State, suspend: Suspend| async move {
            let flags = state.get::<Flags>().cloned().ok_or("flags missing")?;
            flags.started.store(true, Ordering::SeqCst);
            suspend.until_shutdown().await;
            flags.stopped.store(true, Ordering::SeqCst);
            Ok::<(), BoxError>(())
        })
        .build()
        .unwrap();

    let mut client = TestClient::new(app);
    client.startup().await.unwrap();
    assert!(flags.started() && !flags.stopped());
    client.shutdown().await.unwrap();
    assert!(flags.stopped());
}

#[tokio::test]
async fn suspending_hooks_unwind_in_reverse() {
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut builder = App::builder();
    for id in 0..3 {
        let order = Arc::clone(&order);
        builder = builder.on_lifespan(move |_: State, suspend: Suspend| {
            let order = Arc::clone(&order);
            async move {
                order.lock().map_err(|e| e.to_string())?.push(format!("enter {id}"));
                suspend.until_shutdown().await;
                order.lock().map_err(|e| e.to_string())?.push(format!("exit {id}"));
                Ok::<(), BoxError>(())
            }
        });
    }

    let mut client = TestClient::new(builder.build().unwrap());
    client.startup().await.unwrap();
    client.shutdown().await.unwrap();
    assert_eq!(
        *order.lock().unwrap(),
        ["enter 0", "enter 1", "enter 2", "exit 2", "exit 1", "exit 0"]
    );
}

struct Pool {
    open: Arc<AtomicUsize>,
}

impl LifespanContext for Pool {
    fn enter(&mut self, _: &State) -> Result<(), BoxError> {
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn exit(&mut self, _: &State) -> Result<(), BoxError> {
        self.open.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn blocking_context() {
    let open = Arc::new(AtomicUsize::new(0));
    let shared = Arc::clone(&open);
    let app = App::builder()
        .on_lifespan_blocking(move || Pool { open: Arc::clone(&shared) })
        .build()
        .unwrap();

    let mut client = TestClient::new(app);
    client.startup().await.unwrap();
    assert_eq!(open.load(Ordering::SeqCst), 1);
    client.shutdown().await.unwrap();
    assert_eq!(open.load(Ordering::SeqCst), 0);
}

// ── Failures ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn startup_failure() {
    let app = App::builder()
        .on_startup(|_: State| async { Err::<(), BoxError>("database unreachable".into()) })
        .build()
        .unwrap();

    let mut client = TestClient::new(app);
    assert_eq!(client.startup().await.unwrap(), failed("database unreachable", false));
}

#[tokio::test]
async fn suspending_hook_failing_before_suspension() {
    let app = App::builder()
        .on_lifespan(|_: State, _: Suspend| async { Err::<(), BoxError>("no".into()) })
        .build()
        .unwrap();

    let mut client = TestClient::new(app);
    assert_eq!(client.startup().await.unwrap(), failed("no", false));
}

#[tokio::test]
async fn shutdown_failure() {
    let app = App::builder()
        .on_shutdown_blocking(|_: &State| Err("flush failed".into()))
        .build()
        .unwrap();

    let mut client = TestClient::new(app);
    assert_eq!(client.startup().await.unwrap(), Message::LifespanStartupComplete);
    assert_eq!(client.shutdown().await.unwrap(), failed("flush failed", true));
}

#[tokio::test]
async fn second_suspension_fails_shutdown() {
    let app = App::builder()
        .on_lifespan(|_: State, suspend: Suspend| async move {
            suspend.until_shutdown().await;
            suspend.until_shutdown().await;
            Ok::<(), BoxError>(())
        })
        .build()
        .unwrap();

    let mut client = TestClient::new(app);
    assert_eq!(client.startup().await.unwrap(), Message::LifespanStartupComplete);
    assert_eq!(
        client.shutdown().await.unwrap(),
        failed("lifespan context yielded multiple times", true)
    );
}

#[tokio::test]
async fn server_refuses_to_start_when_startup_fails() {
    let app = App::builder()
        .on_startup(|_: State| async { Err::<(), BoxError>("boom".into()) })
        .build()
        .unwrap();

    let result = Server::bind("127.0.0.1:0")
        .serve_with_shutdown(app, std::future::pending())
        .await;
    assert!(matches!(result, Err(Error::Lifespan(ref message)) if message == "boom"));
}

#[tokio::test]
async fn server_runs_lifespan_around_the_accept_loop() {
    let flags = Flags::default();
    let app = App::builder()
        .state(flags.clone())
        .on_startup(|state: State| async move {
            if let Some(flags) = state.get::<Flags>() {
                flags.started.store(true, Ordering::SeqCst);
            }
            Ok::<(), BoxError>(())
        })
        .on_shutdown(|state: State| async move {
            if let Some(flags) = state.get::<Flags>() {
                flags.stopped.store(true, Ordering::SeqCst);
            }
            Ok::<(), BoxError>(())
        })
        .build()
        .unwrap();

    Server::bind("127.0.0.1:0")
        .serve_with_shutdown(app, async {})
        .await
        .unwrap();
    assert!(flags.started() && flags.stopped());
}
