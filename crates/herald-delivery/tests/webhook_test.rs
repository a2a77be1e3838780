//! Webhook dispatcher tests against mock receivers.
//!
//! Retry backoff runs on a virtual clock, so the three-attempt cases
//! finish immediately while still proving the delay schedule.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use herald_core::{
    AttemptState, Clock, Event, InMemorySubscriptions, RetryPolicy, SubscriptionId, TestClock,
    WebhookSubscription,
};
use herald_delivery::{signing, DeliveryClient, WebhookDispatcher};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

const SECRET: &str = "whsec_test";

fn subscription(endpoint_url: String, topic: &str) -> WebhookSubscription {
    WebhookSubscription {
        id: SubscriptionId::new(),
        endpoint_url,
        secret: SECRET.to_string(),
        subscribed_topics: [topic.to_string()].into_iter().collect(),
        active: true,
    }
}

fn test_event(clock: &TestClock) -> Event {
    let payload = serde_json::json!({ "item_id": 7, "name": "widget" }).to_string();
    Event::new("item.created", "user-1", Bytes::from(payload), clock.now_utc())
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(30),
        ..Default::default()
    }
    .without_jitter()
}

fn dispatcher(
    subscriptions: Arc<InMemorySubscriptions>,
    clock: Arc<TestClock>,
    policy: RetryPolicy,
) -> WebhookDispatcher {
    let client = DeliveryClient::with_defaults().expect("client");
    WebhookDispatcher::new(client, subscriptions, clock).with_retry_policy(policy)
}

#[tokio::test]
async fn delivers_payload_with_verifiable_signature() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let subscriptions = Arc::new(InMemorySubscriptions::new());
    subscriptions.insert(subscription(format!("{}/hook", server.uri()), "item.created"));

    let clock = Arc::new(TestClock::new());
    let event = test_event(&clock);
    let attempts = dispatcher(subscriptions, clock, fast_policy(3))
        .dispatch(&event)
        .await
        .expect("dispatch");

    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].state, AttemptState::Delivered);
    assert_eq!(attempts[0].attempt_number, 1);
    assert!(attempts[0].last_error.is_none());

    let requests = server.received_requests().await.expect("recorded requests");
    assert_eq!(requests.len(), 1);

    let request = &requests[0];
    assert_eq!(request.body, event.payload);
    assert_eq!(header(request, "X-Herald-Topic"), "item.created");
    assert_eq!(header(request, "X-Herald-Event-Key"), "user-1");

    let timestamp: u64 = header(request, signing::TIMESTAMP_HEADER).parse().expect("timestamp");
    let signature = header(request, signing::SIGNATURE_HEADER);
    assert!(
        signing::verify(SECRET.as_bytes(), timestamp, &request.body, &signature),
        "receiver-side verification must succeed"
    );
}

#[tokio::test]
async fn failing_receiver_is_retried_with_backoff_then_abandoned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let subscriptions = Arc::new(InMemorySubscriptions::new());
    subscriptions.insert(subscription(format!("{}/hook", server.uri()), "item.created"));

    let clock = Arc::new(TestClock::new());
    let event = test_event(&clock);
    let attempts = dispatcher(subscriptions, clock.clone(), fast_policy(3))
        .dispatch(&event)
        .await
        .expect("dispatch");

    assert_eq!(attempts.len(), 1);
    let attempt = &attempts[0];
    assert_eq!(attempt.state, AttemptState::Abandoned);
    assert_eq!(attempt.attempt_number, 3);
    assert!(attempt.next_retry_at.is_none());
    assert!(attempt.last_error.as_deref().unwrap_or_default().contains("500"));

    // 1s after the first failure plus 2s after the second.
    assert_eq!(clock.elapsed(), Duration::from_secs(3));
}

#[tokio::test]
async fn subscriptions_are_delivered_independently() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/good"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bad"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let subscriptions = Arc::new(InMemorySubscriptions::new());
    let good = subscription(format!("{}/good", server.uri()), "item.created");
    let bad = subscription(format!("{}/bad", server.uri()), "item.created");
    let good_id = good.id;
    subscriptions.insert(good);
    subscriptions.insert(bad);

    let clock = Arc::new(TestClock::new());
    let event = test_event(&clock);
    let attempts = dispatcher(subscriptions, clock, fast_policy(2))
        .dispatch(&event)
        .await
        .expect("dispatch");

    assert_eq!(attempts.len(), 2);
    let delivered =
        attempts.iter().find(|a| a.subscription_id == good_id).expect("good attempt");
    assert_eq!(delivered.state, AttemptState::Delivered);

    let abandoned =
        attempts.iter().find(|a| a.subscription_id != good_id).expect("bad attempt");
    assert_eq!(abandoned.state, AttemptState::Abandoned);
    assert_eq!(abandoned.attempt_number, 2);
}

#[tokio::test]
async fn events_without_subscribers_are_a_noop() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let subscriptions = Arc::new(InMemorySubscriptions::new());
    subscriptions.insert(subscription(format!("{}/hook", server.uri()), "user.created"));

    let clock = Arc::new(TestClock::new());
    let event = test_event(&clock);
    let attempts =
        dispatcher(subscriptions, clock, fast_policy(3)).dispatch(&event).await.expect("dispatch");

    assert!(attempts.is_empty());
}

fn header(request: &wiremock::Request, name: &str) -> String {
    request
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
