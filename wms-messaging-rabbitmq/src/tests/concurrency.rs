//! Concurrent callers share one connection.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use super::harness::{ConfirmBehavior, StubBroker};
use crate::options::{PublishSettings, RetryPolicy};
use crate::publisher::ReliablePublisher;

fn shared_publisher(broker: &StubBroker) -> Arc<ReliablePublisher<StubBroker>> {
    Arc::new(ReliablePublisher::new(
        broker.clone(),
        PublishSettings {
            retry: RetryPolicy {
                max_attempts: 3,
                delay: Duration::from_millis(50),
            },
            publish_timeout: Duration::from_secs(1),
        },
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_publishes_open_one_connection() {
    let broker = StubBroker::new();
    let publisher = shared_publisher(&broker);

    let handles: Vec<_> = (0..16)
        .map(|n| {
            let publisher = Arc::clone(&publisher);
            tokio::spawn(async move {
                publisher
                    .publish_json("sale_order_add_back", &json!({"n": n}))
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap());
    }

    assert_eq!(broker.connect_calls(), 1);
    assert_eq!(broker.max_open_connections(), 1);
    assert_eq!(broker.published().len(), 16);
}

#[tokio::test(start_paused = true)]
async fn reconnects_under_contention_never_overlap() {
    let broker = StubBroker::new();
    // at most two failures, so even one unlucky caller succeeds on its last attempt
    broker.queue_confirm(ConfirmBehavior::Return);
    broker.queue_confirm(ConfirmBehavior::Hang);
    let publisher = shared_publisher(&broker);

    let handles: Vec<_> = (0..6)
        .map(|n| {
            let publisher = Arc::clone(&publisher);
            tokio::spawn(async move { publisher.publish_json("stock_out_back", &json!({"n": n})).await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap());
    }

    assert!(broker.connect_calls() > 1);
    assert_eq!(broker.max_open_connections(), 1);
}

#[tokio::test]
async fn messages_keep_lock_acquisition_order_for_one_caller() {
    let broker = StubBroker::new();
    let publisher = shared_publisher(&broker);

    for n in 0..5 {
        assert!(publisher.publish_json("stock_out_back", &json!({"n": n})).await);
    }

    let order: Vec<i64> = broker
        .published()
        .iter()
        .map(|m| serde_json::from_slice::<serde_json::Value>(&m.body).unwrap()["n"].as_i64().unwrap())
        .collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4]);
}
