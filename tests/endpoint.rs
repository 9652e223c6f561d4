use std::sync::Arc;

use hius::testing::TestClient;
use hius::{
    Actions, App, Error, Func, Method, Request, Response, Router, SocketView, View, ViewEndpoint,
    WebSocket, route, socket, websocket,
};
use http::StatusCode;
use serde_json::json;

async fn greet(req: Request) -> Response {
    let name: String = req.param("name").unwrap_or_default();
    let flag: bool = req.param("flag").unwrap_or_default();
    Response::text(format!("Hello, {name}! Flag {flag}"))
}

#[derive(Default)]
struct Greeter;

impl View for Greeter {
    fn actions(actions: &mut Actions<Self>) {
        actions.get("name: str, flag: bool = false", |_: Arc<Greeter>, req: Request| greet(req));
    }
}

/// A view built from a configured instance.
struct Counter {
    label: String,
}

impl View for Counter {
    fn actions(actions: &mut Actions<Self>) {
        actions
            .get("", |view: Arc<Counter>, _req: Request| async move { view.label.clone() })
            .on_blocking(Method::Post, "n: int", |view: &Counter, req: Request| {
                format!("{} {}", view.label, req.param::<i64>("n").unwrap_or_default() * 2)
            });
    }
}

fn app() -> App {
    App::builder()
        .route("/func", Func::new(greet).signature("name: str, flag: bool = false"))
        .route("/view", ViewEndpoint::<Greeter>::default())
        .bind(
            route("/counter", ViewEndpoint::new(Counter { label: "count".to_owned() }))
                .methods([Method::Get, Method::Post, Method::Put]),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn http_endpoints_validate_params() {
    let client = TestClient::new(app());

    for path in ["/func", "/view"] {
        let res = client.get(&format!("{path}?name=Alice")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK, "{path}");
        assert_eq!(res.text(), "Hello, Alice! Flag false", "{path}");

        let res = client.get(&format!("{path}?name=Bob&flag=yes")).await.unwrap();
        assert_eq!(res.text(), "Hello, Bob! Flag true", "{path}");

        let res = client.get(path).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{path}");
        assert_eq!(res.header("content-type"), Some("application/json"));
        assert_eq!(
            res.json::<serde_json::Value>().unwrap(),
            json!([{"loc": ["name"], "msg": "field required", "type": "value_error.missing"}]),
        );
    }
}

#[tokio::test]
async fn invalid_values_are_reported_per_field() {
    let client = TestClient::new(app());
    let res = client.get("/func?name=Alice&flag=maybe").await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        res.json::<serde_json::Value>().unwrap(),
        json!([{"loc": ["flag"], "msg": "value could not be parsed to a boolean", "type": "type_error.bool"}]),
    );
}

#[tokio::test]
async fn instance_view_actions() {
    let client = TestClient::new(app());

    assert_eq!(client.get("/counter").await.unwrap().text(), "count");
    assert_eq!(client.post("/counter?n=21", "").await.unwrap().text(), "count 42");

    // Allowed by the route, not declared by the view.
    let res = client.put("/counter", "").await.unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[test]
fn model_names() {
    let endpoint = hius::IntoHttpEndpoint::into_http_endpoint(Func::new(greet)).unwrap();
    assert_eq!(endpoint.model_name(Method::Get), Some("GreetModel"));

    let endpoint = hius::IntoHttpEndpoint::into_http_endpoint(ViewEndpoint::<Greeter>::default()).unwrap();
    assert_eq!(endpoint.model_name(Method::Get), Some("GreeterGetModel"));
    assert_eq!(endpoint.signature(Method::Get).map(|s| s.fields().len()), Some(2));
}

#[test]
fn bad_signatures_fail_at_registration() {
    let mut router = Router::new();

    let err = router.add_route("/", Func::new(greet).signature("name")).err().unwrap();
    assert!(matches!(err, Error::Signature { ref reason, .. } if reason.contains("not specified")));

    let err = router.add_route("/", Func::new(greet).signature("name: Widget")).err().unwrap();
    assert!(matches!(err, Error::Signature { ref endpoint, .. } if endpoint == "greet"));

    let err = router.add_route("/", Func::new(greet).signature("n: int = ten")).err().unwrap();
    assert!(matches!(err, Error::Signature { .. }));

    assert!(router.matches(Method::Get, "/").is_none());
}

#[test]
fn bad_signature_surfaces_from_app_build() {
    let built = App::builder()
        .route("/ok", Func::new(greet))
        .route("/bad", Func::new(greet).signature("name"))
        .build();
    assert!(matches!(built, Err(Error::Signature { .. })));
}

// ── Websockets ────────────────────────────────────────────────────────────────

async fn ws_greet(mut ws: WebSocket) -> Result<(), Error> {
    ws.accept().await?;
    let name: String = ws.param("name").unwrap_or_default();
    ws.send_text(format!("Hello, {name}!")).await?;
    ws.close(1000).await
}

#[derive(Default)]
struct Echo;

impl SocketView for Echo {
    const SIGNATURE: &'static str = "prefix: str = echo";

    async fn call(self: Arc<Self>, mut ws: WebSocket) -> Result<(), Error> {
        ws.accept().await?;
        let prefix: String = ws.param("prefix").unwrap_or_default();
        loop {
            let text = ws.receive_text().await?;
            ws.send_text(format!("{prefix}: {text}")).await?;
        }
    }
}

fn socket_app() -> App {
    App::builder()
        .websocket("/ws", Func::new(socket(ws_greet)).signature("name: str"))
        .bind(websocket("/echo", ViewEndpoint::<Echo>::default()))
        .build()
        .unwrap()
}

#[tokio::test]
async fn websocket_endpoint_validates_params() {
    let client = TestClient::new(socket_app());

    let mut session = client.websocket_connect("/ws?name=Alice").await.unwrap();
    assert_eq!(session.receive_text().await.unwrap(), "Hello, Alice!");
    assert!(matches!(session.receive().await, Err(Error::Disconnect(1000))));

    assert!(matches!(client.websocket_connect("/ws").await, Err(Error::Disconnect(1008))));
}

#[tokio::test]
async fn websocket_view_runs_until_client_disconnects() {
    let client = TestClient::new(socket_app());

    let mut session = client.websocket_connect("/echo?prefix=re").await.unwrap();
    session.send_text("one").await.unwrap();
    assert_eq!(session.receive_text().await.unwrap(), "re: one");
    session.send_text("two").await.unwrap();
    assert_eq!(session.receive_text().await.unwrap(), "re: two");
    session.close(1000).await.unwrap();

    let mut session = client.websocket_connect("/echo").await.unwrap();
    session.send_text("hi").await.unwrap();
    assert_eq!(session.receive_text().await.unwrap(), "echo: hi");
}
