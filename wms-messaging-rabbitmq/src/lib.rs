mod lapin_broker;
mod options;
mod provisioner;
mod publisher;
mod registry;
mod shutdown;
mod supervisor;
mod telemetry;

#[cfg(test)]
mod tests;

pub use lapin_broker::{LapinBroker, LapinChannel, LapinConnection};
pub use options::{PublishSettings, RabbitMqOptions, RetryPolicy};
pub use publisher::ReliablePublisher;
pub use registry::{global, push_message, PublisherRegistry};
pub use shutdown::ShutdownHook;
pub use supervisor::{ConnectionSupervisor, LinkState};
pub use telemetry::init_tracing;
