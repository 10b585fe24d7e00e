// lib/secret-store-client/tests/renewal.rs

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use secret_store_client::{ClientState, ManualScheduler, MockClock, SecretStoreClient};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
}

struct Harness {
    client: SecretStoreClient,
    scheduler: Arc<ManualScheduler>,
    failures: Arc<AtomicUsize>,
}

fn token_client(server: &MockServer) -> Harness {
    let scheduler = Arc::new(ManualScheduler::new());
    let failures = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&failures);

    let client = SecretStoreClient::builder()
        .address(server.uri())
        .token("t1")
        .retry_delay(Duration::from_millis(10))
        .max_retries(0)
        .clock(Arc::new(MockClock::new(fixed_now())))
        .scheduler(scheduler.clone())
        .on_renewal_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();

    Harness {
        client,
        scheduler,
        failures,
    }
}

fn lookup_self_response(expires_in_secs: i64) -> ResponseTemplate {
    let expire_time = fixed_now() + TimeDelta::seconds(expires_in_secs);
    ResponseTemplate::new(200).set_body_json(json!({
        "data": {"expire_time": expire_time.to_rfc3339(), "ttl": expires_in_secs}
    }))
}

fn renew_self_response(lease_secs: u64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "auth": {"client_token": "t1", "lease_duration": lease_secs, "renewable": true}
    }))
}

#[tokio::test]
async fn test_initialize_schedules_renewal_at_eighty_percent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/auth/token/lookup-self"))
        .and(header("X-Vault-Token", "t1"))
        .respond_with(lookup_self_response(3600))
        .expect(1)
        .mount(&server)
        .await;

    let h = token_client(&server);
    h.client.initialize().await.unwrap();

    assert_eq!(h.client.state(), ClientState::Ready);
    assert_eq!(h.scheduler.pending(), vec![Duration::from_secs(2880)]);

    let metrics = h.client.get_metrics();
    assert_eq!(metrics.auth_renewals, 1);
    assert_eq!(metrics.last_auth_time, Some(fixed_now()));
    assert_eq!(metrics.token_expires_at, Some(fixed_now() + TimeDelta::seconds(3600)));
}

#[tokio::test]
async fn test_short_lease_uses_minimum_delay() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/auth/token/lookup-self"))
        .respond_with(lookup_self_response(30))
        .mount(&server)
        .await;

    let h = token_client(&server);
    h.client.initialize().await.unwrap();

    assert_eq!(h.scheduler.pending(), vec![Duration::from_secs(60)]);
}

#[tokio::test]
async fn test_non_expiring_token_arms_no_timer() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/auth/token/lookup-self"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"expire_time": null, "ttl": 0}
        })))
        .mount(&server)
        .await;

    let h = token_client(&server);
    h.client.initialize().await.unwrap();

    assert_eq!(h.client.state(), ClientState::Ready);
    assert!(h.scheduler.pending().is_empty());
    assert_eq!(h.client.get_metrics().token_expires_at, None);
}

#[tokio::test]
async fn test_successful_renewal_reschedules() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/auth/token/lookup-self"))
        .respond_with(lookup_self_response(3600))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/token/renew-self"))
        .and(header("X-Vault-Token", "t1"))
        .respond_with(renew_self_response(1800))
        .expect(2)
        .mount(&server)
        .await;

    let h = token_client(&server);
    h.client.initialize().await.unwrap();

    assert!(h.scheduler.fire_next().await);
    assert_eq!(h.client.state(), ClientState::Ready);
    assert_eq!(h.scheduler.pending(), vec![Duration::from_secs(1440)]);

    assert!(h.scheduler.fire_next().await);
    assert_eq!(h.scheduler.pending().len(), 1, "exactly one timer stays armed");

    assert_eq!(h.client.get_metrics().auth_renewals, 3);
    assert_eq!(h.failures.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_renewal_falls_back_to_reauthentication() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/auth/token/lookup-self"))
        .respond_with(lookup_self_response(3600))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/token/renew-self"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"errors": ["permission denied"]})))
        .expect(1)
        .mount(&server)
        .await;

    let h = token_client(&server);
    h.client.initialize().await.unwrap();

    assert!(h.scheduler.fire_next().await);

    assert_eq!(h.client.state(), ClientState::Ready);
    assert_eq!(h.scheduler.pending(), vec![Duration::from_secs(2880)]);
    assert_eq!(h.client.get_metrics().auth_renewals, 2);
    assert_eq!(h.failures.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_renewal_and_reauthentication_failure_degrades() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/auth/token/lookup-self"))
        .respond_with(lookup_self_response(3600))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/auth/token/lookup-self"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"errors": ["permission denied"]})))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/token/renew-self"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"errors": ["permission denied"]})))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/secret/data/app/db"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"data": {"user": "u"}, "metadata": {"version": 1}}
        })))
        .mount(&server)
        .await;

    let h = token_client(&server);
    h.client.initialize().await.unwrap();

    assert!(h.scheduler.fire_next().await);

    assert_eq!(h.client.state(), ClientState::Degraded);
    assert!(h.scheduler.pending().is_empty());
    assert_eq!(h.failures.load(Ordering::SeqCst), 1);

    // Degraded clients keep serving with the stale session
    let secret = h.client.get_secret("secret/app/db", None).await.unwrap();
    assert_eq!(secret.get("user"), Some(&json!("u")));

    // An explicit initialize retries authentication
    assert!(h.client.initialize().await.is_err());
    assert_eq!(h.client.state(), ClientState::Degraded);
}

#[tokio::test]
async fn test_explicit_initialize_recovers_from_degraded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/auth/token/lookup-self"))
        .respond_with(lookup_self_response(3600))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/auth/token/lookup-self"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/token/renew-self"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/auth/token/lookup-self"))
        .respond_with(lookup_self_response(600))
        .mount(&server)
        .await;

    let h = token_client(&server);
    h.client.initialize().await.unwrap();
    h.scheduler.fire_next().await;
    assert_eq!(h.client.state(), ClientState::Degraded);

    h.client.initialize().await.expect("recovery");

    assert_eq!(h.client.state(), ClientState::Ready);
    assert_eq!(h.scheduler.pending(), vec![Duration::from_secs(480)]);
}

#[tokio::test]
async fn test_approle_lease_drives_renewal_delay() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/approle/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "auth": {"client_token": "approle-token", "lease_duration": 600}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let scheduler = Arc::new(ManualScheduler::new());
    let client = SecretStoreClient::builder()
        .address(server.uri())
        .app_role("role", "secret")
        .clock(Arc::new(MockClock::new(fixed_now())))
        .scheduler(scheduler.clone())
        .build()
        .unwrap();

    client.initialize().await.unwrap();

    assert_eq!(scheduler.pending(), vec![Duration::from_secs(480)]);
    assert_eq!(
        client.get_metrics().token_expires_at,
        Some(fixed_now() + TimeDelta::seconds(600))
    );
}

#[tokio::test]
async fn test_shutdown_cancels_pending_renewal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/auth/token/lookup-self"))
        .respond_with(lookup_self_response(3600))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/token/renew-self"))
        .respond_with(renew_self_response(3600))
        .expect(0)
        .mount(&server)
        .await;

    let h = token_client(&server);
    h.client.initialize().await.unwrap();
    assert_eq!(h.scheduler.pending().len(), 1);

    h.client.shutdown().await;

    assert!(h.scheduler.pending().is_empty());
    assert!(!h.scheduler.fire_next().await);
    assert_eq!(h.client.state(), ClientState::ShutDown);
}

#[tokio::test]
async fn test_dropping_client_cancels_pending_renewal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/auth/token/lookup-self"))
        .respond_with(lookup_self_response(3600))
        .mount(&server)
        .await;

    let h = token_client(&server);
    h.client.initialize().await.unwrap();
    let scheduler = h.scheduler.clone();

    drop(h);

    assert!(scheduler.pending().is_empty());
}
