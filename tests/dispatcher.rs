//! Integration tests for the outbound dispatcher.

use lookup_throttle::infrastructure::mocks::{
    MockCaptureLayer, MockClock, MockItem, MockLookupService, MockPostingService, MockStore,
    RecordingSink,
};
use lookup_throttle::{
    DispatchOutcome, DisplayNames, Metrics, OutboundDispatcher, OutboundMessage, RateLimitGate,
    RequestCoalescer, Sender, ServiceError, TickOutcome, TracingSink,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

const NOW: i64 = 1_700_000_000;
const COOLDOWN_KEY: &str = "cooldown-until";

struct Harness {
    dispatcher: OutboundDispatcher,
    service: Arc<MockPostingService>,
    store: Arc<MockStore>,
    clock: Arc<MockClock>,
    sink: Arc<RecordingSink>,
    metrics: Metrics,
}

fn harness() -> Harness {
    let service = Arc::new(MockPostingService::new());
    let store = Arc::new(MockStore::new());
    let clock = Arc::new(MockClock::new(NOW));
    let sink = Arc::new(RecordingSink::new());
    let metrics = Metrics::new();
    let gate = RateLimitGate::new(store.clone(), clock.clone(), sink.clone());

    let dispatcher = OutboundDispatcher::builder(service.clone(), gate)
        .with_display_names(DisplayNames::new("dicebot", "dicebot (resting)"))
        .with_metrics(metrics.clone())
        .build();

    Harness {
        dispatcher,
        service,
        store,
        clock,
        sink,
        metrics,
    }
}

/// Wait until the dispatcher has taken `count` messages off the queue.
async fn wait_for_messages(metrics: &Metrics, count: u64) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while metrics.snapshot().total_messages() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("dispatcher did not process messages in time");
}

#[tokio::test]
async fn test_messages_are_sent_in_order() {
    let h = harness();
    let (outbox, handle) = h.dispatcher.spawn();

    outbox.broadcast("first").unwrap();
    outbox.reply(42, "second").unwrap();
    outbox.broadcast("third").unwrap();

    wait_for_messages(&h.metrics, 3).await;
    handle.shutdown().await.unwrap();

    assert_eq!(
        h.service.posted(),
        vec![
            OutboundMessage::broadcast("first"),
            OutboundMessage::reply(42, "second"),
            OutboundMessage::broadcast("third"),
        ]
    );
}

#[tokio::test]
async fn test_rate_limit_skips_following_messages() {
    let h = harness();
    h.service.fail_next_post(ServiceError::rate_limited(NOW + 900));
    let (outbox, handle) = h.dispatcher.spawn();

    for body in ["a", "b", "c"] {
        outbox.broadcast(body).unwrap();
    }

    wait_for_messages(&h.metrics, 3).await;

    // Only the first message reached the service; the others were dropped
    assert_eq!(h.service.attempts(), 1);
    assert!(h.service.posted().is_empty());
    assert_eq!(h.metrics.messages_skipped(), 2);
    assert_eq!(h.store.value(COOLDOWN_KEY), Some((NOW + 900).to_string()));
    assert_eq!(
        h.service.display_names(),
        vec!["dicebot (resting)".to_string()]
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_recovery_restores_display_name_once() {
    let h = harness();
    h.service.fail_next_post(ServiceError::rate_limited(NOW + 60));
    let (outbox, handle) = h.dispatcher.spawn();

    outbox.broadcast("limited").unwrap();
    wait_for_messages(&h.metrics, 1).await;

    h.clock.advance(Duration::from_secs(61));
    outbox.broadcast("after").unwrap();
    outbox.broadcast("later").unwrap();
    wait_for_messages(&h.metrics, 3).await;

    assert_eq!(
        h.service.posted(),
        vec![
            OutboundMessage::broadcast("after"),
            OutboundMessage::broadcast("later"),
        ]
    );
    assert_eq!(
        h.service.display_names(),
        vec!["dicebot (resting)".to_string(), "dicebot".to_string()]
    );
    assert_eq!(h.store.value(COOLDOWN_KEY), Some("0".to_string()));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_loop_survives_failed_sends() {
    let h = harness();
    h.service.fail_next_post(ServiceError::transport("502 bad gateway"));
    let (outbox, handle) = h.dispatcher.spawn();

    outbox.broadcast("lost").unwrap();
    outbox.broadcast("delivered").unwrap();
    wait_for_messages(&h.metrics, 2).await;

    assert_eq!(
        h.service.posted(),
        vec![OutboundMessage::broadcast("delivered")]
    );
    assert_eq!(h.metrics.messages_failed(), 1);
    assert!(!handle.is_finished());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_send_as_answers_each_sender_kind() {
    let h = harness();
    let (outbox, handle) = h.dispatcher.spawn();

    let mention = Sender::Timeline {
        status_id: 1001,
        screen_name: "alice".to_string(),
        name: "Alice".to_string(),
    };
    let direct = Sender::Direct {
        user_id: 77,
        screen_name: "bob".to_string(),
        name: "Bob".to_string(),
    };

    outbox.send_as(&mention, "rolled 4").unwrap();
    outbox.send_as(&direct, "rolled 6").unwrap();
    wait_for_messages(&h.metrics, 2).await;

    assert_eq!(
        h.service.posted(),
        vec![
            OutboundMessage::reply(1001, "@alice rolled 4"),
            OutboundMessage::direct(77, "rolled 6"),
        ]
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_direct_messages_flow_during_cooldown() {
    let h = harness();
    h.store.insert(COOLDOWN_KEY, &(NOW + 300).to_string());
    let (outbox, handle) = h.dispatcher.spawn();

    outbox.broadcast("public").unwrap();
    outbox.send(OutboundMessage::direct(77, "private")).unwrap();
    wait_for_messages(&h.metrics, 2).await;

    assert_eq!(
        h.service.posted(),
        vec![OutboundMessage::direct(77, "private")]
    );
    assert_eq!(h.metrics.messages_skipped(), 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_corrupt_cooldown_is_reset_and_send_proceeds() {
    let h = harness();
    h.store.insert(COOLDOWN_KEY, "abc");
    let (outbox, handle) = h.dispatcher.spawn();

    outbox.broadcast("hello").unwrap();
    wait_for_messages(&h.metrics, 1).await;

    assert_eq!(h.service.posted(), vec![OutboundMessage::broadcast("hello")]);
    assert_eq!(h.store.value(COOLDOWN_KEY), Some("0".to_string()));
    assert_eq!(h.sink.kinds(), vec!["corrupt_cooldown"]);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unlock_reaches_dispatcher_sharing_key_with_coalescer() {
    let h = harness();
    h.store.insert(COOLDOWN_KEY, &(NOW - 5).to_string());

    let lookups = Arc::new(MockLookupService::with_items([MockItem::new(1)]));
    let gate = RateLimitGate::new(h.store.clone(), h.clock.clone(), h.sink.clone());
    let coalescer = RequestCoalescer::<MockItem>::builder(lookups, gate)
        .build()
        .unwrap();

    // Ticks keep running before anything is posted
    assert_eq!(coalescer.tick().await, TickOutcome::Idle);
    coalescer.enqueue(1, |_| {});
    assert!(matches!(
        coalescer.tick().await,
        TickOutcome::Completed { .. }
    ));
    assert_eq!(h.store.value(COOLDOWN_KEY), Some((NOW - 5).to_string()));

    let outcome = h
        .dispatcher
        .process(OutboundMessage::broadcast("back"))
        .await;

    assert_eq!(outcome, DispatchOutcome::Sent { unlocked: true });
    assert_eq!(h.service.display_names(), vec!["dicebot".to_string()]);
    assert_eq!(h.store.value(COOLDOWN_KEY), Some("0".to_string()));
}

#[tokio::test]
async fn test_loop_ends_when_every_outbox_is_dropped() {
    let h = harness();
    let (outbox, handle) = h.dispatcher.spawn();
    let second = outbox.clone();

    drop(outbox);
    drop(second);

    tokio::time::timeout(Duration::from_secs(2), async {
        while !handle.is_finished() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("dispatcher loop did not stop");

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failures_are_logged_through_tracing_sink() {
    let capture = MockCaptureLayer::new();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let service = Arc::new(MockPostingService::new());
    service.fail_next_post(ServiceError::transport("connection refused"));
    let gate = RateLimitGate::new(
        Arc::new(MockStore::new()),
        Arc::new(MockClock::new(NOW)),
        Arc::new(TracingSink::new()),
    );
    let dispatcher = OutboundDispatcher::builder(service, gate).build();

    dispatcher
        .process(OutboundMessage::broadcast("hello"))
        .await;

    let failures: Vec<_> = capture
        .get_captured()
        .into_iter()
        .filter(|event| event.field("anomaly") == Some("send_failed"))
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].level, Level::ERROR);
}
