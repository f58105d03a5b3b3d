// wms-messaging-core/src/types.rs
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::Serialize;
use uuid::Uuid;

use crate::MessagingError;

pub const ARG_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";
pub const ARG_DEAD_LETTER_ROUTING_KEY: &str = "x-dead-letter-routing-key";

/// Dead-letter routing for a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadLetter {
    pub exchange: &'static str,
    pub routing_key: &'static str,
}

/// Declaration parameters for a target queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
    pub dead_letter: Option<DeadLetter>,
}

impl QueueSpec {
    /// A durable queue with no extra arguments.
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            dead_letter: None,
        }
    }

    pub fn with_dead_letter(mut self, dead_letter: DeadLetter) -> Self {
        self.dead_letter = Some(dead_letter);
        self
    }

    /// `x-*` declaration arguments, in declaration order.
    pub fn arguments(&self) -> Vec<(&'static str, &'static str)> {
        match self.dead_letter {
            Some(dl) => vec![
                (ARG_DEAD_LETTER_EXCHANGE, dl.exchange),
                (ARG_DEAD_LETTER_ROUTING_KEY, dl.routing_key),
            ],
            None => Vec::new(),
        }
    }

    /// Arguments rendered for log lines and error messages.
    pub fn arguments_display(&self) -> String {
        let pairs: serde_json::Map<String, serde_json::Value> = self
            .arguments()
            .into_iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::from(v)))
            .collect();
        serde_json::Value::Object(pairs).to_string()
    }
}

/// AMQP delivery mode. Gateway messages are always persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Persistent = 2,
}

/// One message on its way to the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub message_id: Uuid,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub content_type: &'static str,
    pub delivery_mode: DeliveryMode,
    pub mandatory: bool,
    pub created_at_utc: DateTime<Utc>,
}

impl OutgoingMessage {
    /// Serializes `payload` as a persistent, mandatory JSON message for `queue`.
    pub fn json<T>(queue: &str, payload: &T) -> Result<Self, MessagingError>
    where
        T: Serialize + ?Sized,
    {
        let body =
            serde_json::to_vec(payload).map_err(|e| MessagingError::Serialization(e.to_string()))?;
        Ok(Self {
            message_id: Uuid::new_v4(),
            routing_key: queue.to_string(),
            body,
            content_type: "application/json",
            delivery_mode: DeliveryMode::Persistent,
            mandatory: true,
            created_at_utc: Utc::now(),
        })
    }
}

/// Broker verdict for one published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acked,
    Nacked,
    /// Mandatory message that no queue accepted.
    Returned,
}

/// Resolves once the broker has confirmed (or refused) a published message.
pub type PendingConfirm = BoxFuture<'static, Result<DeliveryOutcome, MessagingError>>;
