use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn, Level};

use crate::lapin_broker::LapinBroker;
use crate::options::RabbitMqOptions;
use crate::publisher::ReliablePublisher;
use wms_messaging_core::{Broker, MessagingError};

type Factory<B> = Box<dyn Fn() -> Result<ReliablePublisher<B>, MessagingError> + Send + Sync>;

/// Lends out one shared publisher, built on first use.
pub struct PublisherRegistry<B: Broker> {
    factory: Factory<B>,
    slot: Mutex<Option<Arc<ReliablePublisher<B>>>>,
}

impl<B: Broker> PublisherRegistry<B> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<ReliablePublisher<B>, MessagingError> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            slot: Mutex::new(None),
        }
    }

    /// The shared publisher, constructing it if this is the first call since
    /// startup or since the last [`reset_publisher`](Self::reset_publisher).
    pub fn get_publisher(&self) -> Result<Arc<ReliablePublisher<B>>, MessagingError> {
        let mut slot = self.lock();
        if let Some(publisher) = slot.as_ref() {
            return Ok(Arc::clone(publisher));
        }
        let publisher = Arc::new((self.factory)()?);
        *slot = Some(Arc::clone(&publisher));
        debug!("publisher constructed");
        Ok(publisher)
    }

    /// The memoized publisher, without constructing one.
    pub fn current(&self) -> Option<Arc<ReliablePublisher<B>>> {
        self.lock().clone()
    }

    /// Forgets the memoized publisher; the next `get_publisher` builds a new
    /// one with a new connection. Returns the old instance, if any.
    pub fn reset_publisher(&self) -> Option<Arc<ReliablePublisher<B>>> {
        self.lock().take()
    }

    /// Closes the current publisher's connection, then resets the registry.
    ///
    /// Closing waits behind any in-flight publish; after `grace` the close is
    /// abandoned and the registry is reset anyway. Returns whether the
    /// connection was closed.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let closed = match self.current() {
            Some(publisher) => match timeout(grace, publisher.close()).await {
                Ok(()) => true,
                Err(_) => {
                    warn!(grace = ?grace, "publish still in flight, abandoning connection close");
                    false
                }
            },
            None => true,
        };
        if self.reset_publisher().is_some() {
            info!("publisher registry reset");
        }
        closed
    }

    /// Publishes through the shared publisher.
    ///
    /// Never fails loudly: configuration problems and broker failures are
    /// logged and reported as `false`.
    pub async fn push<T>(&self, queue: &str, payload: &T) -> bool
    where
        T: Serialize + Sync + ?Sized,
    {
        if tracing::enabled!(Level::DEBUG) {
            match serde_json::to_string_pretty(payload) {
                Ok(rendered) => debug!(queue = %queue, payload = %rendered, "pushing message"),
                Err(e) => debug!(queue = %queue, error = %e, "pushing unrenderable payload"),
            }
        }

        let publisher = match self.get_publisher() {
            Ok(p) => p,
            Err(e) => {
                error!(queue = %queue, error = %e, "publisher unavailable");
                return false;
            }
        };

        let started = Instant::now();
        let published = publisher.publish_json(queue, payload).await;
        info!(
            queue = %queue,
            published,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "push finished"
        );
        published
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<ReliablePublisher<B>>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

static GLOBAL: OnceLock<Arc<PublisherRegistry<LapinBroker>>> = OnceLock::new();

/// The process-wide registry, configured from `RABBITMQ_*` variables.
pub fn global() -> Arc<PublisherRegistry<LapinBroker>> {
    Arc::clone(GLOBAL.get_or_init(|| {
        Arc::new(PublisherRegistry::new(|| {
            let opts = RabbitMqOptions::from_env()?;
            Ok(ReliablePublisher::from_options(opts))
        }))
    }))
}

/// Publishes through the process-wide publisher.
pub async fn push_message<T>(queue: &str, payload: &T) -> bool
where
    T: Serialize + Sync + ?Sized,
{
    global().push(queue, payload).await
}
