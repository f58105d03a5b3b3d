use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::options::RetryPolicy;
use wms_messaging_core::{Broker, BrokerChannel, BrokerConnection, ChannelOf, MessagingError};

/// Observable lifecycle of the supervised connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Absent,
    Open,
    Closed,
}

/// Owns the single connection/channel pair and rebuilds it on demand.
///
/// Closure is detected lazily: every `ensure_*` call checks the current
/// state before use. Callers serialize access (the publisher holds it behind
/// one mutex), so methods take `&mut self`.
pub struct ConnectionSupervisor<B: Broker> {
    broker: B,
    retry: RetryPolicy,
    connection: Option<B::Connection>,
    channel: Option<ChannelOf<B>>,
}

impl<B: Broker> ConnectionSupervisor<B> {
    pub fn new(broker: B, retry: RetryPolicy) -> Self {
        Self {
            broker,
            retry,
            connection: None,
            channel: None,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn state(&self) -> LinkState {
        match &self.connection {
            None => LinkState::Absent,
            Some(conn) if conn.is_open() => LinkState::Open,
            Some(_) => LinkState::Closed,
        }
    }

    /// The live channel, if [`ensure_channel`](Self::ensure_channel) succeeded.
    pub fn channel(&self) -> Option<&ChannelOf<B>> {
        self.channel.as_ref().filter(|ch| ch.is_open())
    }

    pub async fn ensure_connection(&mut self) -> bool {
        match self.state() {
            LinkState::Open => return true,
            LinkState::Closed => {
                info!(endpoint = %self.broker.endpoint(), "broker connection closed, reconnecting");
                self.channel = None;
                self.connection = None;
            }
            LinkState::Absent => {}
        }

        match self.connect_with_retry().await {
            Ok(conn) => {
                self.connection = Some(conn);
                true
            }
            Err(e) => {
                error!(endpoint = %self.broker.endpoint(), error = %e, "giving up on broker connection");
                false
            }
        }
    }

    pub async fn ensure_channel(&mut self) -> bool {
        if !self.ensure_connection().await {
            return false;
        }
        if self.channel().is_some() {
            return true;
        }

        let Some(conn) = self.connection.as_ref() else {
            return false;
        };
        if self.channel.is_some() {
            info!("broker channel closed, reopening");
        }
        match conn.open_channel().await {
            Ok(ch) => {
                self.channel = Some(ch);
                true
            }
            Err(e) => {
                error!(endpoint = %self.broker.endpoint(), error = %e, "could not open channel");
                self.channel = None;
                false
            }
        }
    }

    /// Drops the current pair so the next `ensure_channel` starts from scratch.
    ///
    /// The old connection is closed first, so a fresh one never overlaps it.
    pub async fn discard(&mut self) {
        self.close().await;
        self.channel = None;
        self.connection = None;
    }

    /// Closes channel then connection. Idempotent, never fails.
    pub async fn close(&mut self) {
        if let Some(ch) = self.channel.take() {
            if ch.is_open() {
                match ch.close().await {
                    Ok(()) => info!("broker channel closed"),
                    Err(e) => warn!(error = %e, "error closing broker channel"),
                }
            }
        }
        if let Some(conn) = self.connection.take() {
            if conn.is_open() {
                match conn.close().await {
                    Ok(()) => info!(endpoint = %self.broker.endpoint(), "broker connection closed"),
                    Err(e) => warn!(error = %e, "error closing broker connection"),
                }
            }
        }
    }

    async fn connect_with_retry(&self) -> Result<B::Connection, MessagingError> {
        let attempts = self.retry.attempts();
        for attempt in 1..=attempts {
            info!(attempt, endpoint = %self.broker.endpoint(), "connecting to broker");
            match self.broker.connect().await {
                Ok(conn) => {
                    info!(attempt, endpoint = %self.broker.endpoint(), "broker connected");
                    return Ok(conn);
                }
                Err(e) if e.is_transient() => {
                    error!(attempt, endpoint = %self.broker.endpoint(), error = %e, "broker connection attempt failed");
                    if attempt < attempts {
                        info!(delay = ?self.retry.delay, "waiting before reconnecting");
                        sleep(self.retry.delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(MessagingError::Unavailable(attempts))
    }
}
