//! Happy-path publishing and non-retried failures.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::json;

use super::harness::{ConnectBehavior, Event, StubBroker};
use crate::options::{PublishSettings, RetryPolicy};
use crate::publisher::ReliablePublisher;
use crate::supervisor::LinkState;
use wms_messaging_core::{DeliveryMode, KnownQueue, QueuePublisher, QueueSpec};

fn publisher(broker: &StubBroker) -> ReliablePublisher<StubBroker> {
    ReliablePublisher::new(
        broker.clone(),
        PublishSettings {
            retry: RetryPolicy {
                max_attempts: 3,
                delay: Duration::from_secs(2),
            },
            publish_timeout: Duration::from_secs(5),
        },
    )
}

#[tokio::test]
async fn round_trip_to_order_delivery_queue() {
    let broker = StubBroker::new();
    let publisher = publisher(&broker);

    assert!(publisher.publish_json("sale_order_add_back", &json!({"a": 1, "b": [1, 2, 3]})).await);

    assert_eq!(broker.declarations(), vec![QueueSpec::durable("sale_order_add_back")]);

    let published = broker.published();
    assert_eq!(published.len(), 1);
    let message = &published[0];
    assert_eq!(message.routing_key, "sale_order_add_back");
    assert_eq!(message.delivery_mode, DeliveryMode::Persistent);
    assert_eq!(message.content_type, "application/json");
    assert!(message.mandatory);
    let body: serde_json::Value = serde_json::from_slice(&message.body).unwrap();
    assert_eq!(body, json!({"a": 1, "b": [1, 2, 3]}));

    assert_eq!(publisher.link_state().await, LinkState::Open);
}

#[tokio::test]
async fn dead_letter_arguments_follow_the_queue_table() {
    let broker = StubBroker::new();
    let publisher = publisher(&broker);

    assert!(publisher.publish_json(KnownQueue::OrderDownload.name(), &json!({"tid": "T1"})).await);
    assert!(publisher.publish_json(KnownQueue::RefundOrder.name(), &json!({"tid": "T2"})).await);

    let declared = broker.declarations();
    assert_eq!(declared[0], KnownQueue::OrderDownload.spec());
    assert!(declared[0].dead_letter.is_some());
    assert_eq!(declared[1], QueueSpec::durable("oms_return_order_download_queue"));
    assert!(declared[1].dead_letter.is_none());
}

#[tokio::test]
async fn second_publish_reuses_confirm_mode_and_connection() {
    let broker = StubBroker::new();
    let publisher = publisher(&broker);

    assert!(publisher.publish_json("stock_out_back", &json!({"n": 1})).await);
    // confirm mode is already on for this channel; that is not an error
    assert!(publisher.publish_json("stock_out_back", &json!({"n": 2})).await);

    assert_eq!(broker.connect_calls(), 1);
    assert_eq!(broker.published().len(), 2);
}

#[tokio::test]
async fn body_keeps_caller_key_order() {
    let broker = StubBroker::new();
    let publisher = publisher(&broker);

    let payload = json!({"warehouseCode": "WH01", "deliveryOrderCode": "DO-1", "actualQty": 2.0});
    assert!(publisher.publish_json("sale_order_add_back", &payload).await);

    let body = String::from_utf8(broker.published()[0].body.clone()).unwrap();
    assert_eq!(body, r#"{"warehouseCode":"WH01","deliveryOrderCode":"DO-1","actualQty":2.0}"#);
}

#[tokio::test]
async fn unserializable_payload_never_reaches_the_broker() {
    let broker = StubBroker::new();
    let publisher = publisher(&broker);

    let mut payload = HashMap::new();
    payload.insert((1u8, 2u8), "tuple keys");
    assert!(!publisher.publish_json("any_queue", &payload).await);

    assert_eq!(broker.connect_calls(), 0);
    assert!(broker.published().is_empty());
}

#[tokio::test(start_paused = true)]
async fn queue_conflict_is_not_retried() {
    let broker = StubBroker::new();
    broker.existing_queue(QueueSpec::durable("oms_sales_order_download_queue"));
    let publisher = publisher(&broker);

    assert!(!publisher.publish_json("oms_sales_order_download_queue", &json!({})).await);

    assert_eq!(broker.declarations().len(), 1);
    assert_eq!(broker.connect_calls(), 1);
    assert!(broker.published().is_empty());
}

#[tokio::test(start_paused = true)]
async fn access_refused_fails_without_publish_retries() {
    let broker = StubBroker::new();
    broker.set_default_connect(ConnectBehavior::AccessRefused);
    let publisher = publisher(&broker);

    assert!(!publisher.publish_json("any_queue", &json!({"a": 1})).await);
    assert_eq!(broker.connect_calls(), 1);
}

#[tokio::test]
async fn reconnects_transparently_after_a_dropped_connection() {
    let broker = StubBroker::new();
    let publisher = publisher(&broker);

    assert!(publisher.publish_json("stock_out_back", &json!({"n": 1})).await);
    broker.drop_connections();
    assert!(publisher.publish_json("stock_out_back", &json!({"n": 2})).await);

    assert_eq!(broker.connect_calls(), 2);
    assert_eq!(
        broker
            .events()
            .iter()
            .filter(|e| matches!(e, Event::Published(_)))
            .count(),
        2
    );
}

#[tokio::test]
async fn usable_through_the_queue_publisher_trait() {
    async fn forward<P: QueuePublisher>(publisher: &P) -> bool {
        publisher
            .publish("entry_order_add_back_other", &json!({"entryOrderCode": "E-1"}))
            .await
    }

    let broker = StubBroker::new();
    let publisher = publisher(&broker);
    assert!(forward(&publisher).await);
    assert_eq!(broker.published()[0].routing_key, "entry_order_add_back_other");
}

#[tokio::test]
async fn close_releases_the_connection() {
    let broker = StubBroker::new();
    let publisher = publisher(&broker);

    assert!(publisher.publish_json("stock_out_back", &json!({})).await);
    publisher.close().await;
    publisher.close().await;

    assert_eq!(broker.open_connections(), 0);
    assert_eq!(publisher.link_state().await, LinkState::Absent);
}
