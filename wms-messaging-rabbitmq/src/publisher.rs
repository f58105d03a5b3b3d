use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::lapin_broker::LapinBroker;
use crate::options::{PublishSettings, RabbitMqOptions};
use crate::supervisor::{ConnectionSupervisor, LinkState};
use wms_messaging_core::{
    Broker, BrokerChannel, DeliveryOutcome, MessagingError, OutgoingMessage, QueuePublisher,
};

/// Publishes JSON documents with broker confirmation, retrying transient
/// failures over a fresh connection.
///
/// Every publish holds one lock for its whole duration, retries and sleeps
/// included, so all traffic goes through a single connection and channel.
pub struct ReliablePublisher<B: Broker> {
    link: Mutex<ConnectionSupervisor<B>>,
    settings: PublishSettings,
}

impl ReliablePublisher<LapinBroker> {
    pub fn from_options(opts: RabbitMqOptions) -> Self {
        info!(
            endpoint = %opts.endpoint(),
            max_retries = opts.max_retries,
            retry_delay = ?opts.retry_delay,
            publish_timeout = ?opts.publish_timeout,
            "RabbitMQ publisher configured"
        );
        let settings = opts.publish_settings();
        Self::new(LapinBroker::new(opts), settings)
    }
}

impl<B: Broker> ReliablePublisher<B> {
    pub fn new(broker: B, settings: PublishSettings) -> Self {
        Self {
            link: Mutex::new(ConnectionSupervisor::new(broker, settings.retry)),
            settings,
        }
    }

    pub async fn link_state(&self) -> LinkState {
        self.link.lock().await.state()
    }

    /// Sends `payload` to `queue` and waits for the broker to confirm it.
    ///
    /// Returns `false` when the payload cannot be serialized, on a
    /// non-transient broker error, or once the retry budget is spent.
    pub async fn publish_json<T>(&self, queue: &str, payload: &T) -> bool
    where
        T: Serialize + ?Sized,
    {
        let message = match OutgoingMessage::json(queue, payload) {
            Ok(m) => m,
            Err(e) => {
                error!(queue = %queue, error = %e, "payload is not serializable");
                return false;
            }
        };

        match AssertUnwindSafe(self.publish_message(&message))
            .catch_unwind()
            .await
        {
            Ok(published) => published,
            Err(_) => {
                error!(queue = %queue, message_id = %message.message_id, "publish panicked");
                false
            }
        }
    }

    pub async fn close(&self) {
        self.link.lock().await.close().await;
    }

    async fn publish_message(&self, message: &OutgoingMessage) -> bool {
        let queue = message.routing_key.as_str();
        let attempts = self.settings.retry.attempts();
        let started = Instant::now();
        let mut link = self.link.lock().await;

        for attempt in 1..=attempts {
            if !link.ensure_channel().await {
                error!(queue = %queue, attempt, "no usable broker channel");
                return false;
            }

            match self.attempt(&mut link, message).await {
                Ok(()) => {
                    info!(
                        queue = %queue,
                        message_id = %message.message_id,
                        attempt,
                        bytes = message.body.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "message published and confirmed"
                    );
                    return true;
                }
                Err(e) if e.is_transient() => {
                    warn!(queue = %queue, message_id = %message.message_id, attempt, error = %e, "publish attempt failed");
                    link.discard().await;
                    if attempt < attempts {
                        info!(queue = %queue, delay = ?self.settings.retry.delay, "retrying over a new connection");
                        sleep(self.settings.retry.delay).await;
                    }
                }
                Err(e) => {
                    error!(queue = %queue, message_id = %message.message_id, attempt, error = %e, "publish failed, not retrying");
                    return false;
                }
            }
        }

        error!(
            queue = %queue,
            message_id = %message.message_id,
            attempts,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "publish retries exhausted"
        );
        false
    }

    async fn attempt(
        &self,
        link: &mut ConnectionSupervisor<B>,
        message: &OutgoingMessage,
    ) -> Result<(), MessagingError> {
        let queue = message.routing_key.as_str();
        link.ensure_queue_exists(queue).await?;

        let channel = link
            .channel()
            .ok_or_else(|| MessagingError::Channel("channel closed after declare".into()))?;

        match channel.enable_confirms().await {
            Ok(()) => debug!("publisher confirms enabled"),
            Err(MessagingError::ConfirmsAlreadyEnabled) => {
                debug!("publisher confirms already enabled on channel")
            }
            Err(e) => return Err(e),
        }

        let pending = channel.publish(message).await?;
        debug!(queue = %queue, message_id = %message.message_id, "waiting for broker confirmation");

        match timeout(self.settings.publish_timeout, pending).await {
            Ok(Ok(DeliveryOutcome::Acked)) => Ok(()),
            Ok(Ok(DeliveryOutcome::Returned)) => Err(MessagingError::Unroutable(queue.to_string())),
            Ok(Ok(DeliveryOutcome::Nacked)) => Err(MessagingError::Nacked(queue.to_string())),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(MessagingError::ConfirmTimeout {
                queue: queue.to_string(),
                timeout: self.settings.publish_timeout,
            }),
        }
    }
}

#[async_trait]
impl<B: Broker> QueuePublisher for ReliablePublisher<B> {
    async fn publish<T: Serialize + Send + Sync + ?Sized>(&self, queue: &str, payload: &T) -> bool {
        self.publish_json(queue, payload).await
    }
}
