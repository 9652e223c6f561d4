//! Minimal hius example: typed path parameters, a view, a mounted router
//! and lifespan hooks.
//!
//! Run with:
//!   RUST_LOG=hius=debug,info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42?verbose=yes
//!   curl -X POST 'http://localhost:3000/users?name=alice'
//!   curl http://localhost:3000/users/alice          # 404, id is an int
//!   curl -X DELETE http://localhost:3000/           # 405
//!   curl http://localhost:3000/api/v1/status

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use hius::{
    Actions, App, BoxError, Func, Method, Mount, Request, Response, Router, Server, State, Suspend,
    View, ViewEndpoint, route,
};
use http::StatusCode;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Default)]
struct Ids(Arc<AtomicI64>);

#[tokio::main]
async fn main() -> Result<(), hius::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut api = Router::new();
    api.add_route("/status", Func::new(status))?;

    let app = App::builder()
        .state(Ids::default())
        .route("/", Func::new(home))
        .route("/users/{id:int}", Func::new(get_user).signature("id: int, verbose: bool = false"))
        .bind(route("/users", ViewEndpoint::<Users>::default()).methods([Method::Get, Method::Post]))
        .bind(Mount::new("/api/v1").routes(api))
        .on_lifespan(|state: State, suspend: Suspend| async move {
            let first = state.get::<Ids>().map_or(0, |ids| ids.0.load(Ordering::Relaxed));
            tracing::info!(first, "id sequence ready");
            suspend.until_shutdown().await;
            tracing::info!("id sequence released");
            Ok::<(), BoxError>(())
        })
        .build()?;

    tracing::info!(user = %app.url_path_for("get_user", &[("id", "1")])?, "routes bound");
    Server::bind("0.0.0.0:3000").serve(app).await
}

async fn home(_req: Request) -> &'static str {
    "hius"
}

// GET /users/{id:int}
//
// `id` arrives already converted by the path template, `verbose` comes
// from the query string and defaults to false.
async fn get_user(req: Request) -> Response {
    let id: i64 = req.param("id").unwrap_or_default();
    let body = if req.param("verbose").unwrap_or(false) {
        json!({ "id": id, "name": "alice", "roles": ["admin"] })
    } else {
        json!({ "id": id })
    };
    Response::json_value(&body)
}

#[derive(Default)]
struct Users;

impl View for Users {
    fn actions(actions: &mut Actions<Self>) {
        actions
            .get("", |_: Arc<Users>, _req: Request| async { Response::json_value(&json!([])) })
            .post("name: str", |_: Arc<Users>, req: Request| async move {
                let name: String = req.param("name").unwrap_or_default();
                let id = req.state::<Ids>().map_or(0, |ids| ids.0.fetch_add(1, Ordering::Relaxed) + 1);
                let id_param = id.to_string();
                let location = req.url_for("get_user", &[("id", id_param.as_str())])
                    .map(|url| url.to_string())
                    .unwrap_or_default();
                Response::builder()
                    .status(StatusCode::CREATED)
                    .header("location", &location)
                    .json(serde_json::to_vec(&json!({ "id": id, "name": name })).unwrap_or_default())
            });
    }
}

async fn status(req: Request) -> Response {
    Response::json_value(&json!({
        "path": req.path(),
        "root_path": req.scope().root_path(),
    }))
}
