//! Startup and shutdown behavior of the whole daemon.

use consentd::broker::{BrokerClient, MemoryBroker, TopicSet};
use consentd::config::{
    AdmissionConfig, AgentConfig, AppConfig, BrokerConfig, DrainConfig, FailurePolicy, HttpConfig,
    LoggingConfig,
};
use consentd::context::RuntimeContext;
use consentd::domain::{ConsentChannel, ConsentStatus, DaemonStores, SyncBatch, SyncEntry};
use consentd::error::DaemonError;
use consentd::lifecycle::{LifecycleController, LifecycleState};
use consentd::session::StaticKeySession;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn test_config(port: u16) -> AppConfig {
    AppConfig {
        broker: BrokerConfig {
            host: "localhost".to_string(),
            port: 6650,
            admin_host: "localhost".to_string(),
            admin_port: 8080,
            partition_count: 1,
            namespace: None,
        },
        agents: AgentConfig {
            thread_count: 4,
            response_queue_size: 8,
            failure_policy: FailurePolicy::AckOnFailure,
            pool_drain_timeout_secs: 5,
        },
        http: HttpConfig {
            port,
            worker_threads: None,
        },
        admission: AdmissionConfig {
            max_requests_per_sec: 100,
            max_request_ms: 60_000,
            delay_ms: -1,
        },
        drain: DrainConfig {
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
        },
        logging: LoggingConfig::default(),
    }
}

async fn wait_until<F: Fn() -> bool>(cond: F, what: &str) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn missing_crypto_session_fails_fast() {
    let context = Arc::new(RuntimeContext::new(
        Arc::new(MemoryBroker::new()),
        Arc::new(StaticKeySession::absent()),
        TopicSet::new(None),
    ));
    let controller =
        LifecycleController::new(context.clone(), DaemonStores::new(), test_config(39111));

    let result = controller.start().await;
    assert!(matches!(result, Err(DaemonError::SessionUnavailable)));

    // Nothing was started: no consumer was ever registered
    assert!(context.active_consumers().await.is_empty());
    assert!(
        tokio::net::TcpStream::connect(("127.0.0.1", 39111))
            .await
            .is_err(),
        "gateway port must never be bound"
    );
}

#[tokio::test]
async fn failed_subscription_aborts_startup() {
    let broker = Arc::new(MemoryBroker::new());
    let topics = TopicSet::new(None);

    // Steal the sync topic's only subscription slot so the first agent
    // subscription fails
    let _stolen = broker.subscribe(&topics.sync).await.expect("subscribe");

    let context = Arc::new(RuntimeContext::new(
        broker,
        Arc::new(StaticKeySession::with_key("key")),
        topics,
    ));
    let controller =
        LifecycleController::new(context.clone(), DaemonStores::new(), test_config(39112));

    let result = controller.start().await;
    assert!(matches!(result, Err(DaemonError::Subscribe { .. })));
    assert!(context.active_consumers().await.is_empty());
    assert!(tokio::net::TcpStream::connect(("127.0.0.1", 39112))
        .await
        .is_err());
}

#[tokio::test]
async fn daemon_runs_processes_and_drains_to_a_clean_stop() {
    let port = 39113;
    let broker = Arc::new(MemoryBroker::new());
    let context = Arc::new(RuntimeContext::new(
        broker.clone(),
        Arc::new(StaticKeySession::with_key("key")),
        TopicSet::new(None),
    ));
    let stores = DaemonStores::new();

    let controller =
        LifecycleController::new(context.clone(), stores.clone(), test_config(port));
    let lifecycle = controller.lifecycle();

    let daemon = tokio::spawn(async move { controller.start().await });

    let lifecycle_probe = lifecycle.clone();
    wait_until(
        || lifecycle_probe.current() == LifecycleState::Running,
        "daemon to reach running",
    )
    .await;

    // The gateway port is reachable while running
    tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("gateway should accept connections");

    // Work arriving through the sync topic is applied by its agent
    let batch = SyncBatch {
        request_id: Uuid::new_v4(),
        entries: vec![SyncEntry {
            recipient: "+905551112233".to_string(),
            channel: ConsentChannel::Sms,
            status: ConsentStatus::Approved,
            source: None,
        }],
    };
    broker
        .publish(
            "consent-sync",
            serde_json::to_vec(&batch).expect("encode"),
        )
        .await
        .expect("publish");

    let consent_store = stores.consents.clone();
    wait_until(|| consent_store.len() == 1, "sync batch to be applied").await;
    wait_until(
        || broker.backlog_of("consent-sync") == 0,
        "sync message acknowledged",
    )
    .await;

    // Trigger shutdown and let the protocol run to completion
    lifecycle.advance(LifecycleState::Draining);
    let result = daemon.await.expect("daemon task");
    assert!(result.is_ok(), "daemon exit: {result:?}");

    assert_eq!(lifecycle.current(), LifecycleState::Stopped);
    assert!(!context.has_crypto_session(), "session must be closed");
    assert!(context.active_consumers().await.is_empty());
    assert!(
        tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .is_err(),
        "gateway port must be released after shutdown"
    );
}

#[tokio::test]
async fn shutdown_waits_for_stubborn_backlog() {
    let port = 39114;
    let broker = Arc::new(MemoryBroker::new());
    let context = Arc::new(RuntimeContext::new(
        broker.clone(),
        Arc::new(StaticKeySession::with_key("key")),
        TopicSet::new(None),
    ));

    let controller = LifecycleController::new(
        context.clone(),
        DaemonStores::new(),
        test_config(port),
    );
    let lifecycle = controller.lifecycle();

    let daemon = tokio::spawn(async move { controller.start().await });

    let lifecycle_probe = lifecycle.clone();
    wait_until(
        || lifecycle_probe.current() == LifecycleState::Running,
        "daemon to reach running",
    )
    .await;

    // One topic reports unprocessed messages; no consumer will clear it
    broker.set_backlog("brand-search", 2);

    lifecycle.advance(LifecycleState::Draining);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        lifecycle.current(),
        LifecycleState::Draining,
        "coordinator must hold in draining while any backlog is nonzero"
    );

    broker.set_backlog("brand-search", 0);
    let result = daemon.await.expect("daemon task");
    assert!(result.is_ok());
    assert_eq!(lifecycle.current(), LifecycleState::Stopped);
}
