// wms-messaging-core/src/bus.rs
use async_trait::async_trait;

/// What request handlers see: push a JSON document onto a named queue.
///
/// `true` means the broker confirmed the message and the caller must not
/// send it again. `false` is a retryable failure.
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    async fn publish<T: serde::Serialize + Send + Sync + ?Sized>(
        &self,
        queue: &str,
        payload: &T,
    ) -> bool;
}
