use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions},
    protocol::{AMQPErrorKind, AMQPHardError, AMQPSoftError},
    publisher_confirm::Confirmation,
    types::{AMQPValue, FieldTable},
    uri::AMQPUri,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tracing::debug;

use crate::options::RabbitMqOptions;
use wms_messaging_core::{
    Broker, BrokerChannel, BrokerConnection, DeliveryOutcome, MessagingError, OutgoingMessage,
    PendingConfirm, QueueSpec,
};

const REPLY_SUCCESS: u16 = 200;

/// [`Broker`] backed by a real RabbitMQ server.
pub struct LapinBroker {
    opts: RabbitMqOptions,
}

impl LapinBroker {
    pub fn new(opts: RabbitMqOptions) -> Self {
        Self { opts }
    }

    fn uri(&self) -> AMQPUri {
        let mut uri = AMQPUri::default();
        uri.authority.host = self.opts.host.clone();
        uri.authority.port = self.opts.port;
        uri.authority.userinfo.username = self.opts.username.clone();
        uri.authority.userinfo.password = self.opts.password.clone();
        uri.vhost = self.opts.vhost.clone();
        uri.query.heartbeat = Some(u16::try_from(self.opts.heartbeat.as_secs()).unwrap_or(u16::MAX));
        uri.query.connection_timeout =
            Some(u64::try_from(self.opts.connection_timeout.as_millis()).unwrap_or(u64::MAX));
        uri
    }
}

#[async_trait]
impl Broker for LapinBroker {
    type Connection = LapinConnection;

    async fn connect(&self) -> Result<LapinConnection, MessagingError> {
        let conn = Connection::connect_uri(self.uri(), ConnectionProperties::default())
            .await
            .map_err(|e| classify(e, MessagingError::Connection))?;
        Ok(LapinConnection { inner: conn })
    }

    fn endpoint(&self) -> String {
        self.opts.endpoint()
    }
}

pub struct LapinConnection {
    inner: Connection,
}

#[async_trait]
impl BrokerConnection for LapinConnection {
    type Channel = LapinChannel;

    fn is_open(&self) -> bool {
        self.inner.status().connected()
    }

    async fn open_channel(&self) -> Result<LapinChannel, MessagingError> {
        let ch = self
            .inner
            .create_channel()
            .await
            .map_err(|e| classify(e, MessagingError::Channel))?;
        Ok(LapinChannel { inner: ch })
    }

    async fn close(&self) -> Result<(), MessagingError> {
        self.inner
            .close(REPLY_SUCCESS, "publisher closing")
            .await
            .map_err(|e| MessagingError::Connection(e.to_string()))
    }
}

pub struct LapinChannel {
    inner: Channel,
}

#[async_trait]
impl BrokerChannel for LapinChannel {
    fn is_open(&self) -> bool {
        self.inner.status().connected()
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), MessagingError> {
        let mut args = FieldTable::default();
        for (key, value) in spec.arguments() {
            args.insert(key.into(), AMQPValue::LongString(value.to_string().into()));
        }

        self.inner
            .queue_declare(
                &spec.name,
                QueueDeclareOptions {
                    durable: spec.durable,
                    auto_delete: false,
                    exclusive: false,
                    nowait: false,
                    passive: false,
                },
                args,
            )
            .await
            .map_err(|e| {
                if precondition_failed(&e) {
                    MessagingError::QueueConflict {
                        queue: spec.name.clone(),
                        arguments: spec.arguments_display(),
                        reason: e.to_string(),
                    }
                } else {
                    classify(e, MessagingError::Channel)
                }
            })?;
        Ok(())
    }

    async fn enable_confirms(&self) -> Result<(), MessagingError> {
        if self.inner.status().confirm() {
            return Err(MessagingError::ConfirmsAlreadyEnabled);
        }
        self.inner
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| classify(e, MessagingError::Channel))
    }

    async fn publish(&self, message: &OutgoingMessage) -> Result<PendingConfirm, MessagingError> {
        let properties = BasicProperties::default()
            .with_content_type(message.content_type.into())
            .with_delivery_mode(message.delivery_mode as u8)
            .with_message_id(message.message_id.to_string().into())
            .with_timestamp(message.created_at_utc.timestamp().max(0) as u64);

        let confirm = self
            .inner
            .basic_publish(
                "",
                &message.routing_key,
                BasicPublishOptions {
                    mandatory: message.mandatory,
                    immediate: false,
                },
                &message.body,
                properties,
            )
            .await
            .map_err(|e| classify(e, MessagingError::Publish))?;

        let queue = message.routing_key.clone();
        Ok(Box::pin(async move {
            let outcome = confirm
                .await
                .map(outcome)
                .map_err(|e| classify(e, MessagingError::Publish))?;
            if outcome == DeliveryOutcome::Returned {
                debug!(queue = %queue, "message returned by broker");
            }
            Ok(outcome)
        }))
    }

    async fn close(&self) -> Result<(), MessagingError> {
        self.inner
            .close(REPLY_SUCCESS, "publisher closing")
            .await
            .map_err(|e| MessagingError::Channel(e.to_string()))
    }
}

/// A confirmation carrying the message back means the broker returned it.
fn outcome(confirmation: Confirmation) -> DeliveryOutcome {
    match confirmation {
        Confirmation::Ack(None) => DeliveryOutcome::Acked,
        Confirmation::Ack(Some(_)) | Confirmation::Nack(Some(_)) => DeliveryOutcome::Returned,
        Confirmation::Nack(None) => DeliveryOutcome::Nacked,
        // confirm mode is always enabled before publishing
        Confirmation::NotRequested => DeliveryOutcome::Acked,
    }
}

/// Maps a lapin error onto the messaging taxonomy; `fallback` covers the
/// transient cases for the operation at hand.
fn classify(err: lapin::Error, fallback: fn(String) -> MessagingError) -> MessagingError {
    if let lapin::Error::ProtocolError(amqp) = &err {
        if matches!(
            amqp.kind(),
            AMQPErrorKind::Soft(AMQPSoftError::ACCESSREFUSED)
                | AMQPErrorKind::Hard(AMQPHardError::NOTALLOWED)
        ) {
            return MessagingError::AccessRefused(err.to_string());
        }
    }
    fallback(err.to_string())
}

fn precondition_failed(err: &lapin::Error) -> bool {
    matches!(
        err,
        lapin::Error::ProtocolError(amqp)
            if matches!(amqp.kind(), AMQPErrorKind::Soft(AMQPSoftError::PRECONDITIONFAILED))
    )
}
