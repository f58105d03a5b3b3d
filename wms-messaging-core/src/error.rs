// wms-messaging-core/src/error.rs
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("access refused: {0}")]
    AccessRefused(String),

    #[error("queue `{queue}` rejected declaration with arguments {arguments}: {reason}")]
    QueueConflict {
        queue: String,
        arguments: String,
        reason: String,
    },

    #[error("publish error: {0}")]
    Publish(String),

    #[error("message for `{0}` was returned as unroutable")]
    Unroutable(String),

    #[error("broker nacked message for `{0}`")]
    Nacked(String),

    #[error("no confirmation for `{queue}` within {timeout:?}")]
    ConfirmTimeout { queue: String, timeout: Duration },

    #[error("confirm mode already enabled on channel")]
    ConfirmsAlreadyEnabled,

    #[error("broker unavailable after {0} attempt(s)")]
    Unavailable(u32),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl MessagingError {
    /// Whether a reconnect-and-retry can reasonably succeed.
    ///
    /// Authentication failures, conflicting queue arguments and bad input
    /// are fatal.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MessagingError::Connection(_)
                | MessagingError::Channel(_)
                | MessagingError::Publish(_)
                | MessagingError::Unroutable(_)
                | MessagingError::Nacked(_)
                | MessagingError::ConfirmTimeout { .. }
        )
    }
}
