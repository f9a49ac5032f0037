//! Shutdown signal sources

use async_trait::async_trait;
use drover_api::ShutdownSignal;
use tokio::sync::mpsc;

/// Something that produces shutdown requests: OS signals, a terminal, or
/// the master's control channel.
#[async_trait]
pub trait SignalSource: Send {
    fn name(&self) -> &'static str;

    /// Whether signals from this source should also be relayed to workers.
    ///
    /// Only the master's terminal interrupt needs relaying; OS signals reach
    /// the whole process group already.
    fn forwards_to_workers(&self) -> bool {
        false
    }

    /// Next signal, or `None` once the source is exhausted
    async fn recv(&mut self) -> Option<ShutdownSignal>;
}

/// Signal source fed by hand, for tests and embedding
#[derive(Debug)]
pub struct ChannelSignals {
    name: &'static str,
    forwards: bool,
    rx: mpsc::UnboundedReceiver<ShutdownSignal>,
}

impl ChannelSignals {
    pub fn new(name: &'static str) -> (mpsc::UnboundedSender<ShutdownSignal>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                name,
                forwards: false,
                rx,
            },
        )
    }

    pub fn forwarding(mut self) -> Self {
        self.forwards = true;
        self
    }
}

#[async_trait]
impl SignalSource for ChannelSignals {
    fn name(&self) -> &'static str {
        self.name
    }

    fn forwards_to_workers(&self) -> bool {
        self.forwards
    }

    async fn recv(&mut self) -> Option<ShutdownSignal> {
        self.rx.recv().await
    }
}
