//! End-to-end whitelist flow: portal code request, chat validation, and the
//! enforcement agent applying the resulting firewall command.

use ipgate::enforcement::{AgentSettings, EnforcementAgent, MemoryAllowSet};
use ipgate::gatekeeper::{AuthorizationIssuer, CodeOutcome, IssuerSettings, ValidateOutcome};
use ipgate::model::Owner;
use ipgate::store::{keys, MemoryStore, RecordStore};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

fn agent_settings() -> AgentSettings {
    AgentSettings {
        pop_timeout: Duration::from_millis(20),
        reconnect_backoff: Duration::from_millis(10),
    }
}

fn setup(
    settings: IssuerSettings,
) -> (
    Arc<MemoryStore>,
    AuthorizationIssuer<MemoryStore>,
    EnforcementAgent<MemoryStore, MemoryAllowSet>,
) {
    let store = Arc::new(MemoryStore::new());
    let issuer = AuthorizationIssuer::new(store.clone(), settings);
    let agent = EnforcementAgent::new(store.clone(), MemoryAllowSet::new(), agent_settings());
    (store, issuer, agent)
}

fn visitor() -> IpAddr {
    "203.0.113.7".parse().unwrap()
}

async fn issue(issuer: &AuthorizationIssuer<MemoryStore>, ip: IpAddr) -> String {
    match issuer.request_code(ip).await.unwrap() {
        CodeOutcome::Issued { code, .. } => code.to_string(),
        other => panic!("Expected a code, got {:?}", other),
    }
}

#[tokio::test]
async fn test_code_to_firewall_add() {
    let (store, issuer, agent) = setup(IssuerSettings::default());
    agent.start().await.unwrap();

    let code = issue(&issuer, visitor()).await;
    let owner = Owner::new("42", "alice");

    match issuer.validate_code(&code, &owner).await.unwrap() {
        ValidateOutcome::Promoted(promotion) => {
            assert_eq!(promotion.ip, visitor());
            assert_eq!(promotion.owner, owner);
        }
        ValidateOutcome::Invalid => panic!("Expected promotion"),
    }

    // Exactly one command was queued
    assert_eq!(store.list(keys::QUEUE).len(), 1);
    assert!(agent.step().await.unwrap());
    assert!(!agent.step().await.unwrap());

    assert!(agent.allow_set().contains(visitor()));
    assert_eq!(agent.allow_set().applied(), 1);

    let entry = issuer.active_entry(visitor()).await.unwrap().unwrap();
    assert_eq!(entry.owner(), owner);
}

#[tokio::test]
async fn test_code_is_single_use() {
    let (store, issuer, _agent) = setup(IssuerSettings::default());
    let code = issue(&issuer, visitor()).await;
    let owner = Owner::new("42", "alice");

    assert!(matches!(
        issuer.validate_code(&code, &owner).await.unwrap(),
        ValidateOutcome::Promoted(_)
    ));
    assert_eq!(
        issuer.validate_code(&code, &owner).await.unwrap(),
        ValidateOutcome::Invalid
    );
    assert_eq!(store.list(keys::QUEUE).len(), 1);
}

#[tokio::test]
async fn test_lowercase_submission_is_accepted() {
    let (_store, issuer, _agent) = setup(IssuerSettings::default());
    let code = issue(&issuer, visitor()).await;

    let outcome = issuer
        .validate_code(&code.to_lowercase(), &Owner::new("1", "bob"))
        .await
        .unwrap();
    assert!(matches!(outcome, ValidateOutcome::Promoted(_)));
}

#[tokio::test]
async fn test_expired_code_is_invalid() {
    let (store, issuer, _agent) = setup(IssuerSettings::default());
    let code = issue(&issuer, visitor()).await;

    store.advance(issuer.settings().code_ttl + Duration::from_secs(1));

    assert_eq!(
        issuer
            .validate_code(&code, &Owner::new("42", "alice"))
            .await
            .unwrap(),
        ValidateOutcome::Invalid
    );
    assert!(store.list(keys::QUEUE).is_empty());
    assert!(!issuer.is_active(visitor()).await.unwrap());
}

#[tokio::test]
async fn test_active_ip_gets_no_code() {
    let (store, issuer, _agent) = setup(IssuerSettings::default());
    let code = issue(&issuer, visitor()).await;
    issuer
        .validate_code(&code, &Owner::new("42", "alice"))
        .await
        .unwrap();

    let before = store.scan_prefix(keys::CODE_PREFIX).await.unwrap();
    assert_eq!(
        issuer.request_code(visitor()).await.unwrap(),
        CodeOutcome::AlreadyActive
    );
    assert_eq!(store.scan_prefix(keys::CODE_PREFIX).await.unwrap(), before);
}

#[tokio::test]
async fn test_rate_limit_resets_after_window() {
    let settings = IssuerSettings {
        rate_limit_max: 2,
        rate_limit_window: Duration::from_secs(60),
        ..IssuerSettings::default()
    };
    let (store, issuer, _agent) = setup(settings);

    issue(&issuer, visitor()).await;
    issue(&issuer, visitor()).await;
    assert!(matches!(
        issuer.request_code(visitor()).await.unwrap(),
        CodeOutcome::RateLimited { .. }
    ));

    // Another address has its own budget
    let other: IpAddr = "198.51.100.1".parse().unwrap();
    issue(&issuer, other).await;

    store.advance(Duration::from_secs(61));
    issue(&issuer, visitor()).await;
}

#[tokio::test]
async fn test_enqueue_failure_keeps_code() {
    let (store, issuer, _agent) = setup(IssuerSettings::default());
    let code = issue(&issuer, visitor()).await;
    let owner = Owner::new("42", "alice");

    store.reject_pushes(true);
    assert!(issuer.validate_code(&code, &owner).await.is_err());
    assert!(!issuer.is_active(visitor()).await.unwrap());

    // The user can retry once the queue accepts commands again
    store.reject_pushes(false);
    assert!(matches!(
        issuer.validate_code(&code, &owner).await.unwrap(),
        ValidateOutcome::Promoted(_)
    ));
}

#[tokio::test]
async fn test_handoff_is_single_use() {
    let (_store, issuer, _agent) = setup(IssuerSettings::default());
    let code = issue(&issuer, visitor()).await;

    let promotion = match issuer
        .validate_code(&code, &Owner::new("42", "alice"))
        .await
        .unwrap()
    {
        ValidateOutcome::Promoted(promotion) => promotion,
        ValidateOutcome::Invalid => panic!("Expected promotion"),
    };

    assert_eq!(
        issuer.consume_handoff(visitor()).await.unwrap(),
        Some(promotion.session_token)
    );
    assert_eq!(issuer.consume_handoff(visitor()).await.unwrap(), None);
}
