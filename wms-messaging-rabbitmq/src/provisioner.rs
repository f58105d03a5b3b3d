use tracing::{error, info};

use crate::supervisor::ConnectionSupervisor;
use wms_messaging_core::{Broker, BrokerChannel, MessagingError, QueueSpec};

impl<B: Broker> ConnectionSupervisor<B> {
    /// Declares `queue` durable, with dead-letter arguments when the queue
    /// table has them.
    ///
    /// Redeclaring with identical arguments is a no-op on the broker. A
    /// conflicting redeclaration comes back as [`MessagingError::QueueConflict`].
    pub async fn ensure_queue_exists(&mut self, queue: &str) -> Result<QueueSpec, MessagingError> {
        if !self.ensure_channel().await {
            return Err(MessagingError::Unavailable(self.retry_policy().attempts()));
        }
        let channel = self
            .channel()
            .ok_or_else(|| MessagingError::Channel("channel closed before declare".into()))?;

        let spec = QueueSpec::for_name(queue);
        match channel.declare_queue(&spec).await {
            Ok(()) => {
                info!(queue = %spec.name, arguments = %spec.arguments_display(), "queue declared");
                Ok(spec)
            }
            Err(e) => {
                error!(
                    queue = %spec.name,
                    arguments = %spec.arguments_display(),
                    error = %e,
                    "queue declaration failed"
                );
                Err(e)
            }
        }
    }
}
