pub mod broker;
pub mod bus;
pub mod error;
pub mod queues;
pub mod types;

pub use broker::{Broker, BrokerChannel, BrokerConnection, ChannelOf};
pub use bus::QueuePublisher;
pub use error::MessagingError;
pub use queues::KnownQueue;
pub use types::{
    DeadLetter, DeliveryMode, DeliveryOutcome, OutgoingMessage, PendingConfirm, QueueSpec,
    ARG_DEAD_LETTER_EXCHANGE, ARG_DEAD_LETTER_ROUTING_KEY,
};
