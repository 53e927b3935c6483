//! Portal HTTP behaviour, driven through the router without a socket.

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{Request, StatusCode};
use axum::Router;
use ipgate::botscore::BotScoreGate;
use ipgate::gatekeeper::{
    AuthorizationIssuer, IssuerSettings, RenewalCoordinator, ValidateOutcome,
};
use ipgate::model::Owner;
use ipgate::notify::NoopNotifier;
use ipgate::store::MemoryStore;
use ipgate::web::{router, AppState, TrustedProxies};
use serde_json::Value;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn state(store: Arc<MemoryStore>, settings: IssuerSettings, proxies: Vec<IpAddr>) -> AppState<MemoryStore> {
    let session_ttl = settings.session_ttl;
    AppState {
        issuer: Arc::new(AuthorizationIssuer::new(store.clone(), settings)),
        renewal: Arc::new(RenewalCoordinator::new(
            store,
            BotScoreGate::disabled(),
            Arc::new(NoopNotifier),
            session_ttl,
        )),
        proxies: Arc::new(TrustedProxies::new(proxies)),
        site_key: Some("site-key".to_string()),
    }
}

/// Router whose requests appear to come from `peer`.
fn app(state: &AppState<MemoryStore>, peer: &str) -> Router {
    let peer: SocketAddr = format!("{}:40000", peer).parse().unwrap();
    router(state.clone()).layer(MockConnectInfo(peer))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, cookie, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn renew_request(cookie: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/renew")
        .header(CONTENT_TYPE, "application/json")
        .header(COOKIE, cookie)
        .body(Body::from(r#"{"recaptcha_token":""}"#))
        .unwrap()
}

/// `name=value` from a `Set-Cookie` header.
fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn test_full_portal_flow() {
    let store = Arc::new(MemoryStore::new());
    let state = state(store, IssuerSettings::default(), vec![]);

    // First visit: a code
    let (status, cookie, body) = send(app(&state, "203.0.113.7"), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(cookie.is_none());
    assert_eq!(body["state"], "code");
    assert_eq!(body["ip"], "203.0.113.7");
    assert_eq!(body["expires_in_secs"], 300);
    let code = body["code"].as_str().unwrap().to_string();

    // Typed into chat
    let outcome = state
        .issuer
        .validate_code(&code, &Owner::new("42", "alice"))
        .await
        .unwrap();
    assert!(matches!(outcome, ValidateOutcome::Promoted(_)));

    // Next visit picks up the session cookie once
    let (status, cookie, body) = send(app(&state, "203.0.113.7"), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "already_authorized");
    let set_cookie = cookie.expect("session cookie handed off");
    assert!(set_cookie.contains("HttpOnly"));
    let session = cookie_pair(&set_cookie);

    let (_, cookie, body) = send(app(&state, "203.0.113.7"), get("/")).await;
    assert_eq!(body["state"], "already_authorized");
    assert!(cookie.is_none());

    // From a new address the session offers renewal instead of a code
    let mut request = get("/");
    request
        .headers_mut()
        .insert(COOKIE, session.parse().unwrap());
    let (_, _, body) = send(app(&state, "198.51.100.23"), request).await;
    assert_eq!(body["state"], "renewal_available");
    assert_eq!(body["owner_name"], "alice");
    assert_eq!(body["site_key"], "site-key");

    let (status, cookie, body) =
        send(app(&state, "198.51.100.23"), renew_request(&session)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["ip"], "198.51.100.23");
    assert_eq!(body["previous_ip"], "203.0.113.7");
    assert_eq!(body["migrated"], true);
    assert!(cookie.is_some());

    let (_, _, body) = send(app(&state, "10.9.9.9"), get("/status?ip=198.51.100.23")).await;
    assert_eq!(body["whitelisted"], true);
    let (_, _, body) = send(app(&state, "10.9.9.9"), get("/status?ip=203.0.113.7")).await;
    assert_eq!(body["whitelisted"], false);
}

#[tokio::test]
async fn test_rate_limited_visit() {
    let store = Arc::new(MemoryStore::new());
    let settings = IssuerSettings {
        rate_limit_max: 1,
        rate_limit_window: Duration::from_secs(60),
        ..IssuerSettings::default()
    };
    let state = state(store, settings, vec![]);

    let (status, _, _) = send(app(&state, "203.0.113.7"), get("/")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(app(&state, "203.0.113.7"), get("/")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["state"], "rate_limited");
    assert_eq!(body["retry_after_secs"], 60);
}

#[tokio::test]
async fn test_renew_without_session_is_unauthorized() {
    let store = Arc::new(MemoryStore::new());
    let state = state(store, IssuerSettings::default(), vec![]);

    let (status, _, body) = send(
        app(&state, "203.0.113.7"),
        renew_request("wl_session=0123456789abcdef0123456789abcdef"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn test_forwarded_for_only_from_trusted_proxy() {
    let store = Arc::new(MemoryStore::new());
    let state = state(store, IssuerSettings::default(), vec!["127.0.0.1".parse().unwrap()]);

    let forwarded = || {
        Request::builder()
            .uri("/status")
            .header("X-Forwarded-For", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap()
    };

    let (_, _, body) = send(app(&state, "127.0.0.1"), forwarded()).await;
    assert_eq!(body["ip"], "203.0.113.7");

    // Untrusted peers cannot spoof their address
    let (_, _, body) = send(app(&state, "198.51.100.1"), forwarded()).await;
    assert_eq!(body["ip"], "198.51.100.1");
}

#[tokio::test]
async fn test_store_outage_is_unavailable() {
    let store = Arc::new(MemoryStore::new());
    let state = state(store.clone(), IssuerSettings::default(), vec![]);
    store.set_offline(true);

    let (status, _, body) = send(app(&state, "203.0.113.7"), get("/")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn test_health() {
    let store = Arc::new(MemoryStore::new());
    let state = state(store, IssuerSettings::default(), vec![]);

    let (status, _, body) = send(app(&state, "127.0.0.1"), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
