// wms-messaging-core/src/broker.rs
use async_trait::async_trait;

use crate::{MessagingError, OutgoingMessage, PendingConfirm, QueueSpec};

/// Opens connections to a message broker.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    type Connection: BrokerConnection;

    /// One connection attempt, no retries.
    async fn connect(&self) -> Result<Self::Connection, MessagingError>;

    /// Where connections go, safe to log (no credentials).
    fn endpoint(&self) -> String;
}

#[async_trait]
pub trait BrokerConnection: Send + Sync + 'static {
    type Channel: BrokerChannel;

    fn is_open(&self) -> bool;

    async fn open_channel(&self) -> Result<Self::Channel, MessagingError>;

    async fn close(&self) -> Result<(), MessagingError>;
}

#[async_trait]
pub trait BrokerChannel: Send + Sync + 'static {
    /// False once either the channel or its connection has closed.
    fn is_open(&self) -> bool;

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), MessagingError>;

    /// Puts the channel in publisher-confirm mode.
    ///
    /// Returns [`MessagingError::ConfirmsAlreadyEnabled`] when it already is.
    async fn enable_confirms(&self) -> Result<(), MessagingError>;

    /// Hands the message to the broker; the returned future tracks its confirm.
    async fn publish(&self, message: &OutgoingMessage) -> Result<PendingConfirm, MessagingError>;

    async fn close(&self) -> Result<(), MessagingError>;
}

pub type ChannelOf<B> = <<B as Broker>::Connection as BrokerConnection>::Channel;
