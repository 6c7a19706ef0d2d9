use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use clap::Parser;
use edge_gateway::config::GatewayArgs;
use edge_gateway::handlers;
use edge_gateway::models::TokenMetadata;
use edge_gateway::state::AppState;
use edge_gateway::verifier::{BrokerVerdict, TokenVerifier, VerifyError};
use serde_json::json;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tower::ServiceExt;
use wiremock::matchers::{body_json, header as has_header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// Broker stand-in: knows a fixed set of active tokens, can be taken offline
struct FakeBroker {
    active: HashSet<String>,
    calls: AtomicUsize,
    offline: AtomicBool,
}

impl FakeBroker {
    fn with_active(tokens: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            active: tokens.iter().map(|t| t.to_string()).collect(),
            calls: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenVerifier for FakeBroker {
    async fn verify_token(&self, token: &str) -> Result<BrokerVerdict, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(VerifyError::Transport("connection refused".into()));
        }
        if self.active.contains(token) {
            Ok(BrokerVerdict::Active(TokenMetadata {
                sub: Some("user-1".into()),
                ..Default::default()
            }))
        } else {
            Ok(BrokerVerdict::Inactive)
        }
    }
}

fn gateway(backend: &str, auth: &str, broker: Arc<FakeBroker>, extra: &[&str]) -> Router {
    let mut argv = vec![
        "edge-gateway".to_string(),
        "--route".to_string(),
        format!("/api/service1={backend}"),
        "--public-route".to_string(),
        format!("/api/auth={auth}"),
    ];
    argv.extend(extra.iter().map(|s| s.to_string()));

    let args = GatewayArgs::parse_from(argv);
    let state = AppState::with_verifier(&args, broker).unwrap();
    handlers::router(Arc::new(state))
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn public_route_passes_without_token_and_keeps_json_body() {
    let backend = MockServer::start().await;
    let auth = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(has_header("content-type", "application/json"))
        .and(body_json(json!({"username": "alice", "password": "pw"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "at"})))
        .expect(1)
        .mount(&auth)
        .await;

    let broker = FakeBroker::with_active(&[]);
    let app = gateway(&backend.uri(), &auth.uri(), broker.clone(), &[]);

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"username":"alice","password":"pw"}"#))
        .unwrap();
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("accessToken"));
    assert_eq!(broker.calls(), 0);
}

#[tokio::test]
async fn protected_route_without_header_is_rejected_before_broker() {
    let backend = MockServer::start().await;
    let auth = MockServer::start().await;
    let broker = FakeBroker::with_active(&["good"]);
    let app = gateway(&backend.uri(), &auth.uri(), broker.clone(), &[]);

    let response = send(&app, get("/api/service1/orders", None)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_text(response).await, "Missing authorization header");
    assert_eq!(broker.calls(), 0);
    assert!(backend.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn valid_token_reaches_backend_with_rewritten_path() {
    let backend = MockServer::start().await;
    let auth = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(query_param("page", "2"))
        .and(has_header("authorization", "Bearer good"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-backend", "service1")
                .set_body_string("orders"),
        )
        .expect(1)
        .mount(&backend)
        .await;

    let broker = FakeBroker::with_active(&["good"]);
    let app = gateway(&backend.uri(), &auth.uri(), broker, &[]);

    let mut request = get("/api/service1/orders?page=2", Some("good"));
    let peer: SocketAddr = "192.0.2.10:40000".parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-backend"], "service1");
    assert_eq!(body_text(response).await, "orders");

    let received = backend.received_requests().await.unwrap();
    assert_eq!(received[0].headers["x-forwarded-for"], "192.0.2.10");
}

#[tokio::test]
async fn valid_token_is_verified_once_then_cached() {
    let backend = MockServer::start().await;
    let auth = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&backend)
        .await;

    let broker = FakeBroker::with_active(&["good"]);
    let app = gateway(&backend.uri(), &auth.uri(), broker.clone(), &[]);

    for _ in 0..3 {
        let response = send(&app, get("/api/service1/orders", Some("good"))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(broker.calls(), 1);
}

#[tokio::test]
async fn inactive_token_is_rejected_and_rechecked_each_time() {
    let backend = MockServer::start().await;
    let auth = MockServer::start().await;
    let broker = FakeBroker::with_active(&["good"]);
    let app = gateway(&backend.uri(), &auth.uri(), broker.clone(), &[]);

    for _ in 0..2 {
        let response = send(&app, get("/api/service1/orders", Some("revoked"))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_text(response).await, "Invalid or expired token");
    }
    assert_eq!(broker.calls(), 2);
    assert!(backend.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn broker_outage_fails_closed() {
    let backend = MockServer::start().await;
    let auth = MockServer::start().await;
    let broker = FakeBroker::with_active(&["good"]);
    broker.offline.store(true, Ordering::SeqCst);
    let app = gateway(&backend.uri(), &auth.uri(), broker, &[]);

    let response = send(&app, get("/api/service1/orders", Some("good"))).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(backend.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn cached_token_outlives_broker_outage() {
    let backend = MockServer::start().await;
    let auth = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&backend)
        .await;
    let broker = FakeBroker::with_active(&["T1"]);
    let app = gateway(&backend.uri(), &auth.uri(), broker.clone(), &["--cache-ttl", "30"]);

    let first = send(&app, get("/api/service1/x", Some("T1"))).await;
    assert_eq!(first.status(), StatusCode::OK);

    broker.offline.store(true, Ordering::SeqCst);
    let second = send(&app, get("/api/service1/x", Some("T1"))).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(broker.calls(), 1);
}

#[tokio::test]
async fn unknown_prefix_is_not_found() {
    let backend = MockServer::start().await;
    let auth = MockServer::start().await;
    let broker = FakeBroker::with_active(&[]);
    let app = gateway(&backend.uri(), &auth.uri(), broker.clone(), &[]);

    let response = send(&app, get("/api/unknown/x", Some("anything"))).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(broker.calls(), 0);
}

#[tokio::test]
async fn third_request_in_window_gets_429() {
    let backend = MockServer::start().await;
    let auth = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&auth)
        .await;

    let broker = FakeBroker::with_active(&[]);
    let app = gateway(
        &backend.uri(),
        &auth.uri(),
        broker,
        &["--rate-limit", "2", "--rate-window", "60"],
    );

    let mut statuses = Vec::new();
    let mut last = None;
    for _ in 0..3 {
        let response = send(&app, get("/api/auth/ping", None)).await;
        statuses.push(response.status().as_u16());
        last = Some(response);
    }

    assert_eq!(statuses, vec![200, 200, 429]);
    let last = last.unwrap();
    assert!(last.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(
        body_text(last).await,
        "Too many requests, please try again later."
    );
}

#[tokio::test]
async fn backend_status_and_body_are_relayed_verbatim() {
    let backend = MockServer::start().await;
    let auth = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/orders/7"))
        .respond_with(ResponseTemplate::new(409).set_body_string("order already shipped"))
        .mount(&backend)
        .await;

    let broker = FakeBroker::with_active(&["good"]);
    let app = gateway(&backend.uri(), &auth.uri(), broker, &[]);

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/service1/orders/7")
        .header(header::AUTHORIZATION, "Bearer good")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_text(response).await, "order already shipped");
}

#[tokio::test]
async fn large_request_body_is_streamed_through() {
    let backend = MockServer::start().await;
    let auth = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/blobs/1"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&backend)
        .await;

    let broker = FakeBroker::with_active(&["good"]);
    let app = gateway(&backend.uri(), &auth.uri(), broker, &[]);

    let payload = vec![b'x'; 2 * 1024 * 1024];
    let request = Request::builder()
        .method("PUT")
        .uri("/api/service1/blobs/1")
        .header(header::AUTHORIZATION, "Bearer good")
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(payload.clone()))
        .unwrap();
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let received = backend.received_requests().await.unwrap();
    assert_eq!(received[0].body.len(), payload.len());
    assert_eq!(
        received[0].headers["content-type"],
        "application/octet-stream"
    );
}

#[tokio::test]
async fn unreachable_backend_is_bad_gateway() {
    let auth = MockServer::start().await;
    let broker = FakeBroker::with_active(&["good"]);
    let app = gateway("http://127.0.0.1:1", &auth.uri(), broker, &[]);

    let response = send(&app, get("/api/service1/orders", Some("good"))).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_text(response).await, "Backend service1 unavailable");
}

#[tokio::test]
async fn slow_backend_times_out() {
    let backend = MockServer::start().await;
    let auth = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&backend)
        .await;

    let broker = FakeBroker::with_active(&["good"]);
    let app = gateway(&backend.uri(), &auth.uri(), broker, &["--backend-timeout", "1"]);

    let response = send(&app, get("/api/service1/slow", Some("good"))).await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn overlapping_prefixes_route_deterministically() {
    let general = MockServer::start().await;
    let special = MockServer::start().await;
    let auth = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/x"))
        .respond_with(ResponseTemplate::new(200).set_body_string("special"))
        .expect(3)
        .mount(&special)
        .await;

    let broker = FakeBroker::with_active(&["good"]);
    let route = format!("/api/service1/special={}", special.uri());
    let app = gateway(&general.uri(), &auth.uri(), broker, &["--route", route.as_str()]);

    for _ in 0..3 {
        let response = send(&app, get("/api/service1/special/x", Some("good"))).await;
        assert_eq!(body_text(response).await, "special");
    }
    assert!(general.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn successful_signout_evicts_cached_token() {
    let backend = MockServer::start().await;
    let auth = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&backend)
        .await;
    Mock::given(method("POST"))
        .and(path("/signout"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"signedOut": true})))
        .mount(&auth)
        .await;

    let broker = FakeBroker::with_active(&["good"]);
    let app = gateway(&backend.uri(), &auth.uri(), broker.clone(), &[]);

    send(&app, get("/api/service1/a", Some("good"))).await;
    send(&app, get("/api/service1/b", Some("good"))).await;
    assert_eq!(broker.calls(), 1);

    let signout = Request::builder()
        .method("POST")
        .uri("/api/auth/signout")
        .header(header::AUTHORIZATION, "Bearer good")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"refreshToken":"rt"}"#))
        .unwrap();
    assert_eq!(send(&app, signout).await.status(), StatusCode::OK);

    send(&app, get("/api/service1/c", Some("good"))).await;
    assert_eq!(broker.calls(), 2);
}

#[tokio::test]
async fn health_and_metrics_are_served_locally() {
    let backend = MockServer::start().await;
    let auth = MockServer::start().await;
    let app = gateway(&backend.uri(), &auth.uri(), FakeBroker::with_active(&[]), &[]);

    let health = send(&app, get("/health", None)).await;
    assert_eq!(health.status(), StatusCode::OK);
    assert!(body_text(health).await.contains("healthy"));

    // populate at least one labelled series
    send(&app, get("/nowhere", None)).await;
    let metrics = send(&app, get("/metrics", None)).await;
    assert_eq!(metrics.status(), StatusCode::OK);
    assert!(body_text(metrics).await.contains("gateway_request_outcomes_total"));
}

// Backend that promises 100 bytes, sends 5, then goes quiet
async fn spawn_stalling_backend() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\nhello")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(socket);
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn backend_stalling_mid_body_is_cut_off() {
    let backend = spawn_stalling_backend().await;
    let auth = MockServer::start().await;
    let broker = FakeBroker::with_active(&["good"]);
    let app = gateway(&backend, &auth.uri(), broker, &["--backend-timeout", "1"]);

    let response = send(&app, get("/api/service1/stream", Some("good"))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = tokio::time::timeout(
        Duration::from_secs(10),
        axum::body::to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .expect("relay should end once the backend goes idle");
    assert!(body.is_err());
}

#[tokio::test]
async fn local_endpoints_share_the_rate_budget() {
    let backend = MockServer::start().await;
    let auth = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&auth)
        .await;
    let app = gateway(
        &backend.uri(),
        &auth.uri(),
        FakeBroker::with_active(&[]),
        &["--rate-limit", "2"],
    );

    assert_eq!(send(&app, get("/health", None)).await.status(), StatusCode::OK);
    assert_eq!(send(&app, get("/metrics", None)).await.status(), StatusCode::OK);

    let proxied = send(&app, get("/api/auth/ping", None)).await;
    assert_eq!(proxied.status(), StatusCode::TOO_MANY_REQUESTS);

    let health = send(&app, get("/health", None)).await;
    assert_eq!(health.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(health.headers().contains_key(header::RETRY_AFTER));
}
