use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use wms_messaging_core::MessagingError;

/// Broker connection and publish settings, read once at startup.
#[derive(Clone)]
pub struct RabbitMqOptions {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    /// Socket/handshake timeout for a single connection attempt.
    pub connection_timeout: Duration,
    pub heartbeat: Duration,
    /// How long a broker-blocked connection may stall. lapin has no knob for
    /// this; a blocked broker stops confirming, so `publish_timeout` bounds it.
    pub blocked_connection_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub publish_timeout: Duration,
    /// Informational only, not applied to declarations.
    pub message_ttl: Duration,
}

impl Default for RabbitMqOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            connection_timeout: Duration::from_secs(10),
            heartbeat: Duration::from_secs(600),
            blocked_connection_timeout: Duration::from_secs(300),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            publish_timeout: Duration::from_secs(5),
            message_ttl: Duration::from_millis(86_400_000),
        }
    }
}

impl RabbitMqOptions {
    /// Loads options from `RABBITMQ_*` environment variables, falling back
    /// to defaults for unset ones.
    pub fn from_env() -> Result<Self, MessagingError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, MessagingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str, default: String| lookup(key).unwrap_or(default);

        Ok(Self {
            host: text("RABBITMQ_HOST", defaults.host),
            port: parse(&lookup, "RABBITMQ_PORT", defaults.port)?,
            username: text("RABBITMQ_USERNAME", defaults.username),
            password: text("RABBITMQ_PASSWORD", defaults.password),
            vhost: text("RABBITMQ_VHOST", defaults.vhost),
            connection_timeout: secs(&lookup, "RABBITMQ_CONNECTION_TIMEOUT", defaults.connection_timeout)?,
            heartbeat: secs(&lookup, "RABBITMQ_HEARTBEAT", defaults.heartbeat)?,
            blocked_connection_timeout: secs(
                &lookup,
                "RABBITMQ_BLOCKED_TIMEOUT",
                defaults.blocked_connection_timeout,
            )?,
            max_retries: parse(&lookup, "RABBITMQ_MAX_RETRIES", defaults.max_retries)?,
            retry_delay: secs(&lookup, "RABBITMQ_RETRY_DELAY", defaults.retry_delay)?,
            publish_timeout: secs(&lookup, "RABBITMQ_PUBLISH_TIMEOUT", defaults.publish_timeout)?,
            message_ttl: Duration::from_millis(parse(
                &lookup,
                "RABBITMQ_MESSAGE_TTL",
                defaults.message_ttl.as_millis() as u64,
            )?),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            delay: self.retry_delay,
        }
    }

    pub fn publish_settings(&self) -> PublishSettings {
        PublishSettings {
            retry: self.retry_policy(),
            publish_timeout: self.publish_timeout,
        }
    }

    /// `host:port/vhost`, without credentials.
    pub fn endpoint(&self) -> String {
        format!("{}:{}{}", self.host, self.port, vhost_path(&self.vhost))
    }
}

impl fmt::Debug for RabbitMqOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RabbitMqOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("vhost", &self.vhost)
            .field("connection_timeout", &self.connection_timeout)
            .field("heartbeat", &self.heartbeat)
            .field("blocked_connection_timeout", &self.blocked_connection_timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("publish_timeout", &self.publish_timeout)
            .field("message_ttl", &self.message_ttl)
            .finish()
    }
}

/// Fixed-delay retry: `max_attempts` tries in total, `delay` between them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Never fewer than one attempt, even with `RABBITMQ_MAX_RETRIES=0`.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RabbitMqOptions::default().retry_policy()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublishSettings {
    pub retry: RetryPolicy,
    /// Upper bound on waiting for one message's broker confirmation.
    pub publish_timeout: Duration,
}

impl Default for PublishSettings {
    fn default() -> Self {
        RabbitMqOptions::default().publish_settings()
    }
}

fn vhost_path(vhost: &str) -> String {
    if vhost.starts_with('/') {
        vhost.to_string()
    } else {
        format!("/{vhost}")
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T, MessagingError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| MessagingError::Config(format!("{key}={raw:?}: {e}"))),
        None => Ok(default),
    }
}

fn secs<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, MessagingError>
where
    F: Fn(&str) -> Option<String>,
{
    parse(lookup, key, default.as_secs()).map(Duration::from_secs)
}
