//! Gateway-level admission control behavior, driven through the router.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use consentd::broker::{MemoryBroker, TopicSet};
use consentd::config::AdmissionConfig;
use consentd::context::RuntimeContext;
use consentd::domain::DaemonStores;
use consentd::http::{router, GatewayState};
use consentd::lifecycle::{Lifecycle, LifecycleState};
use consentd::session::StaticKeySession;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

fn gateway(
    broker: Arc<MemoryBroker>,
    admission: AdmissionConfig,
) -> (axum::Router, Arc<Lifecycle>) {
    let context = Arc::new(RuntimeContext::new(
        broker,
        Arc::new(StaticKeySession::with_key("key")),
        TopicSet::new(None),
    ));
    let lifecycle = Arc::new(Lifecycle::new());
    lifecycle.advance(LifecycleState::Running);

    let state = GatewayState::new(
        context,
        DaemonStores::new(),
        lifecycle.subscribe(),
        &admission,
    );
    (router(state), lifecycle)
}

fn reject_config(max_rps: u32) -> AdmissionConfig {
    AdmissionConfig {
        max_requests_per_sec: max_rps,
        max_request_ms: 60_000,
        delay_ms: -1,
    }
}

fn consent_search_request() -> Request<Body> {
    let payload = json!({ "recipient": "user@example.com", "channel": "email" });
    Request::builder()
        .method("POST")
        .uri("/consent/search")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request")
}

/// Sleep past the current one-second window boundary if a burst might
/// otherwise straddle it.
async fn align_to_window_start() {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch");
    let into_window = Duration::from_nanos(u64::from(now.subsec_nanos()));
    if into_window > Duration::from_millis(600) {
        tokio::time::sleep(Duration::from_secs(1) - into_window + Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn excess_requests_are_rejected_without_reaching_the_handler() {
    let broker = Arc::new(MemoryBroker::new());
    let (app, _lifecycle) = gateway(broker.clone(), reject_config(5));

    align_to_window_start().await;

    let mut accepted = 0;
    let mut rejected = 0;
    for _ in 0..8 {
        let response = app
            .clone()
            .oneshot(consent_search_request())
            .await
            .expect("response");
        match response.status() {
            StatusCode::ACCEPTED => accepted += 1,
            StatusCode::TOO_MANY_REQUESTS => rejected += 1,
            other => panic!("unexpected status {other}"),
        }
    }

    assert_eq!(accepted, 5);
    assert_eq!(rejected, 3);
    // Rejected requests never enqueued broker work
    assert_eq!(broker.backlog_of("consent-search"), 5);
}

#[tokio::test]
async fn probes_are_not_admission_controlled() {
    let broker = Arc::new(MemoryBroker::new());
    let (app, _lifecycle) = gateway(broker, reject_config(1));

    for _ in 0..10 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn draining_gateway_refuses_business_requests() {
    let broker = Arc::new(MemoryBroker::new());
    let (app, lifecycle) = gateway(broker.clone(), reject_config(100));

    lifecycle.advance(LifecycleState::Draining);

    let response = app
        .clone()
        .oneshot(consent_search_request())
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(broker.backlog_of("consent-search"), 0);

    // Liveness stays up; readiness reports not-ready
    let live = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(live.status(), StatusCode::OK);

    let ready = app
        .oneshot(
            Request::builder()
                .uri("/readyz")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn delay_policy_holds_excess_requests_instead_of_rejecting() {
    let broker = Arc::new(MemoryBroker::new());
    let admission = AdmissionConfig {
        max_requests_per_sec: 1,
        max_request_ms: 60_000,
        delay_ms: 1_100,
    };
    let (app, _lifecycle) = gateway(broker, admission);

    align_to_window_start().await;

    let first = app
        .clone()
        .oneshot(consent_search_request())
        .await
        .expect("response");
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    // The excess request is delayed past the window and then admitted
    let started = Instant::now();
    let second = app
        .oneshot(consent_search_request())
        .await
        .expect("response");
    assert_eq!(second.status(), StatusCode::ACCEPTED);
    assert!(started.elapsed() >= Duration::from_millis(1_100));
}
