//! Releases the broker connection when the process stops.
//!
//! A `main` that finishes normally calls [`ShutdownHook::run`] itself.
//! [`ShutdownHook::install`] additionally covers SIGINT, SIGTERM and SIGQUIT:
//! the hook runs, then the process exits with `128 + signo`. The hook runs at
//! most once either way, and never waits longer than its grace period for an
//! in-flight publish to release the connection.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::registry::PublisherRegistry;
use wms_messaging_core::Broker;

const DEFAULT_GRACE: Duration = Duration::from_secs(5);

pub struct ShutdownHook<B: Broker> {
    registry: Arc<PublisherRegistry<B>>,
    grace: Duration,
    installed: AtomicBool,
    fired: AtomicBool,
}

impl<B: Broker> ShutdownHook<B> {
    pub fn new(registry: Arc<PublisherRegistry<B>>) -> Arc<Self> {
        Self::with_grace(registry, DEFAULT_GRACE)
    }

    /// `grace` bounds how long [`run`](Self::run) waits for the connection
    /// to be closed.
    pub fn with_grace(registry: Arc<PublisherRegistry<B>>, grace: Duration) -> Arc<Self> {
        Arc::new(Self {
            registry,
            grace,
            installed: AtomicBool::new(false),
            fired: AtomicBool::new(false),
        })
    }

    /// Spawns the signal listener. Only the first call installs anything.
    ///
    /// On a termination signal the hook runs and the process exits.
    pub fn install(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.installed.swap(true, Ordering::SeqCst) {
            return None;
        }
        let hook = Arc::clone(self);
        Some(tokio::spawn(async move {
            match termination_signal().await {
                Ok(signo) => {
                    info!(signal = signo, "termination signal received");
                    hook.run().await;
                    std::process::exit(128 + signo);
                }
                Err(e) => warn!(error = %e, "cannot listen for termination signals"),
            }
        }))
    }

    pub fn has_run(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Closes the shared publisher and resets the registry. Never panics.
    pub async fn run(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        match AssertUnwindSafe(self.registry.shutdown(self.grace))
            .catch_unwind()
            .await
        {
            Ok(true) => info!("broker connection released"),
            Ok(false) => warn!("broker connection left to the in-flight publish"),
            Err(_) => error!("panic while releasing broker connection"),
        }
    }
}

/// Waits for SIGINT, SIGTERM or SIGQUIT and returns its number.
#[cfg(unix)]
async fn termination_signal() -> std::io::Result<i32> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut listeners = Vec::new();
    for (kind, signo) in [
        (SignalKind::interrupt(), 2),
        (SignalKind::terminate(), 15),
        (SignalKind::quit(), 3),
    ] {
        listeners.push((signal(kind)?, signo));
    }

    let waits = listeners.iter_mut().map(|(stream, signo)| {
        let signo = *signo;
        Box::pin(async move {
            stream.recv().await;
            signo
        })
    });
    let (signo, _, _) = futures_util::future::select_all(waits).await;
    Ok(signo)
}

#[cfg(not(unix))]
async fn termination_signal() -> std::io::Result<i32> {
    tokio::signal::ctrl_c().await.map(|()| 2)
}
