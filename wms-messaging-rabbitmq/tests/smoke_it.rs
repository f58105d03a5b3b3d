use lapin::options::{BasicGetOptions, QueueDeleteOptions};
use lapin::{Connection, ConnectionProperties};
use wms_messaging_rabbitmq::{LinkState, RabbitMqOptions, ReliablePublisher};

fn amqp_url(opts: &RabbitMqOptions) -> String {
    let vhost = if opts.vhost.is_empty() || opts.vhost == "/" {
        "%2f".to_string()
    } else {
        opts.vhost.clone()
    };
    format!(
        "amqp://{}:{}@{}:{}/{}",
        opts.username, opts.password, opts.host, opts.port, vhost
    )
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker (RABBITMQ_* variables)"]
async fn publish_is_confirmed_and_lands_on_queue() -> Result<(), Box<dyn std::error::Error>> {
    let opts = RabbitMqOptions::from_env()?;
    let url = amqp_url(&opts);
    let queue = format!("wms_smoke_{}", uuid::Uuid::new_v4().simple());

    let publisher = ReliablePublisher::from_options(opts);
    let payload = serde_json::json!({"orderCode": "SO20240001", "warehouse": "仓库A"});
    assert!(publisher.publish_json(&queue, &payload).await);
    assert_eq!(publisher.link_state().await, LinkState::Open);

    // read it back on a separate connection
    let conn = Connection::connect(&url, ConnectionProperties::default()).await?;
    let channel = conn.create_channel().await?;
    let got = channel
        .basic_get(&queue, BasicGetOptions { no_ack: true })
        .await?
        .ok_or("queue is empty")?;
    let body: serde_json::Value = serde_json::from_slice(&got.delivery.data)?;
    assert_eq!(body, payload);

    channel.queue_delete(&queue, QueueDeleteOptions::default()).await?;
    conn.close(200, "done").await?;

    publisher.close().await;
    assert_eq!(publisher.link_state().await, LinkState::Absent);
    Ok(())
}
