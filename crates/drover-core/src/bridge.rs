//! Routes shutdown signals into the coordinator

use async_trait::async_trait;
use drover_api::{ControlMessage, ShutdownSignal};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::{ShutdownCoordinator, SignalSource, WorkerPool};

/// Exit code for a shutdown requested by signal
pub const SIGNAL_EXIT_CODE: i32 = 0;

/// Relays a signal onward before the local shutdown starts
#[async_trait]
pub trait SignalForward: Send + Sync {
    async fn forward(&self, signal: ShutdownSignal);
}

#[async_trait]
impl SignalForward for WorkerPool {
    async fn forward(&self, signal: ShutdownSignal) {
        let sent = self.broadcast(&ControlMessage::shutdown(signal)).await;
        debug!(%signal, workers = sent, "Forwarded signal to workers");
    }
}

/// Listens on every signal source and starts a shutdown on the first signal.
///
/// Every signal triggers `shutdown(0)`; repeats are harmless because the
/// coordinator ignores requests after the first.
#[derive(Clone)]
pub struct SignalBridge {
    coordinator: Arc<ShutdownCoordinator>,
    forward: Option<Arc<dyn SignalForward>>,
}

impl SignalBridge {
    pub fn new(coordinator: Arc<ShutdownCoordinator>) -> Self {
        Self {
            coordinator,
            forward: None,
        }
    }

    /// Where to relay signals from sources that ask for it
    pub fn with_forward(mut self, forward: Arc<dyn SignalForward>) -> Self {
        self.forward = Some(forward);
        self
    }

    /// Start one listener task per source
    pub fn spawn(&self, sources: Vec<Box<dyn SignalSource>>) -> Vec<JoinHandle<()>> {
        sources
            .into_iter()
            .map(|mut source| {
                let bridge = self.clone();
                tokio::spawn(async move {
                    debug!(source = source.name(), "Listening for shutdown signals");
                    while let Some(signal) = source.recv().await {
                        bridge
                            .deliver(signal, source.name(), source.forwards_to_workers())
                            .await;
                    }
                    debug!(source = source.name(), "Signal source closed");
                })
            })
            .collect()
    }

    /// Handle one signal. The shutdown itself runs on its own task so the
    /// source keeps draining.
    pub async fn deliver(&self, signal: ShutdownSignal, source: &str, forward: bool) {
        info!(%signal, source, "Received shutdown signal");

        if forward && let Some(target) = &self.forward {
            target.forward(signal).await;
        }

        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            coordinator.shutdown(SIGNAL_EXIT_CODE).await;
        });
    }
}
