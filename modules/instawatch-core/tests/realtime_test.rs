use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use instawatch_core::testing::{json_response, tag_page, Method, MockSink, MockTransport, TEST_API_BASE};
use instawatch_core::{
    PollError, PollerConfig, Query, QuerySet, RealTimePoller, TriggerDecision,
};

const TAGS: &str = "https://api.test/v1/tags/";
const TAG_A: &str = "https://api.test/v1/tags/a/";
const SUBSCRIPTIONS: &str = "https://api.test/v1/subscriptions";
const CALLBACK: &str = "https://hooks.test/instagram";
const INTERVAL: Duration = Duration::from_secs(10);

fn transport() -> Arc<MockTransport> {
    Arc::new(
        MockTransport::new()
            .on_get_json(TAGS, tag_page(json!([{"id": "1"}]), None, Some(1)))
            .on_post(SUBSCRIPTIONS, json_response(200, json!({"data": {"id": "101"}})))
            .on_post(SUBSCRIPTIONS, json_response(200, json!({"data": {"id": 102}})))
            .on_delete(SUBSCRIPTIONS, json_response(200, json!({"meta": {"code": 200}}))),
    )
}

async fn started(transport: &Arc<MockTransport>) -> Arc<RealTimePoller> {
    let config = PollerConfig {
        api_base: TEST_API_BASE.to_string(),
        client_id: "cid".to_string(),
        client_secret: "secret".to_string(),
        polling_interval: INTERVAL,
        ..PollerConfig::default()
    };
    let poller = RealTimePoller::new(
        QuerySet::tags(["a", "b"]),
        transport.clone(),
        Arc::new(MockSink::new()),
        config,
        CALLBACK,
    )
    .unwrap();
    let poller = Arc::new(poller);
    assert_eq!(poller.start().await.unwrap(), 2);
    poller
}

/// Let spawned tasks run without moving the paused clock meaningfully.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn start_creates_one_subscription_per_tag() {
    let transport = transport();
    let poller = started(&transport).await;

    assert_eq!(poller.subscription_ids(), vec![101, 102]);
    assert_eq!(transport.count(Method::Get, TAG_A), 2);

    let post = transport
        .requests()
        .into_iter()
        .find(|r| r.method == Method::Post)
        .unwrap();
    assert_eq!(post.url, "https://api.test/v1/subscriptions/");
    for field in [
        ("client_id", "cid"),
        ("client_secret", "secret"),
        ("object", "tag"),
        ("aspect", "media"),
        ("object_id", "a"),
        ("callback_url", CALLBACK),
    ] {
        assert!(
            post.form.contains(&(field.0.to_string(), field.1.to_string())),
            "missing {field:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn burst_of_triggers_arms_one_follow_up() {
    let transport = transport();
    let poller = started(&transport).await;

    assert_eq!(
        poller.handle_trigger(101).unwrap(),
        TriggerDecision::Poll { index: 0 }
    );
    for _ in 0..5 {
        assert_eq!(
            poller.handle_trigger(101).unwrap(),
            TriggerDecision::Coalesced { index: 0 }
        );
    }
    assert_eq!(poller.scheduled_count(), 1);

    settle().await;
    // Two warm-up probes plus the immediate poll.
    assert_eq!(transport.count(Method::Get, TAG_A), 3);

    tokio::time::sleep(INTERVAL).await;
    assert_eq!(transport.count(Method::Get, TAG_A), 4);
    assert!(!poller.is_scheduled(0));

    tokio::time::sleep(INTERVAL * 6).await;
    assert_eq!(transport.count(Method::Get, TAG_A), 4);

    // Released: the next trigger polls again.
    assert_eq!(
        poller.handle_trigger(101).unwrap(),
        TriggerDecision::Poll { index: 0 }
    );
}

#[tokio::test(start_paused = true)]
async fn triggers_for_different_queries_arm_independently() {
    let transport = transport();
    let poller = started(&transport).await;

    assert_eq!(poller.handle_trigger(101).unwrap(), TriggerDecision::Poll { index: 0 });
    assert_eq!(poller.handle_trigger(102).unwrap(), TriggerDecision::Poll { index: 1 });
    assert_eq!(poller.scheduled_count(), 2);
    settle().await;

    let state = poller.poller().query_state(1).await.unwrap();
    assert_eq!(state.query(), &Query::Tag("b".to_string()));
    assert_eq!(poller.poller().current_index().await, 0);
}

#[tokio::test(start_paused = true)]
async fn unknown_subscription_is_deleted() {
    let transport = transport();
    let poller = started(&transport).await;

    let err = poller.handle_trigger(999).unwrap_err();
    assert!(matches!(err, PollError::UnknownSubscription(999)));
    settle().await;

    let deletes: Vec<String> = transport
        .requests()
        .into_iter()
        .filter(|r| r.method == Method::Delete)
        .map(|r| r.url)
        .collect();
    assert_eq!(
        deletes,
        vec!["https://api.test/v1/subscriptions?client_secret=secret&client_id=cid&id=999"]
    );
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_follow_ups_then_deletes_subscriptions() {
    let transport = transport();
    let poller = started(&transport).await;

    poller.handle_trigger(101).unwrap();
    poller.stop().await;
    assert_eq!(poller.scheduled_count(), 0);
    assert!(poller.subscription_ids().is_empty());
    assert_eq!(transport.count(Method::Delete, SUBSCRIPTIONS), 2);

    let polls_at_stop = transport.count(Method::Get, TAG_A);
    tokio::time::sleep(INTERVAL * 3).await;
    assert_eq!(transport.count(Method::Get, TAG_A), polls_at_stop);

    assert!(matches!(poller.handle_trigger(101), Err(PollError::Stopped)));
}

#[tokio::test]
async fn only_tag_queries_can_subscribe() {
    let queries = QuerySet::new(vec![
        Query::Tag("a".to_string()),
        Query::User("42".to_string()),
    ]);
    let result = RealTimePoller::new(
        queries,
        transport(),
        Arc::new(MockSink::new()),
        PollerConfig::default(),
        CALLBACK,
    );
    assert!(matches!(result, Err(PollError::Config(_))));
}
