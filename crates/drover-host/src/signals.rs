//! Platform signal sources
//!
//! Which sources a process listens on depends on its role and on what the
//! platform delivers by itself; see [`SignalPlan`].

use async_trait::async_trait;
use drover_api::{ControlMessage, ShutdownSignal};
use drover_core::SignalSource;
use drover_ipc::{ControlReader, IpcError};
use tokio::io::{AsyncBufRead, BufReader, Stdin};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::HostResult;

/// Whether a terminal interrupt reaches every process attached to the
/// terminal without help. False on Windows.
pub fn platform_delivers_terminal_interrupt() -> bool {
    !cfg!(windows)
}

/// SIGINT and SIGTERM from the operating system
pub struct NativeSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl NativeSignals {
    #[cfg(unix)]
    pub fn new() -> HostResult<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn new() -> HostResult<Self> {
        Ok(Self {})
    }
}

#[async_trait]
impl SignalSource for NativeSignals {
    fn name(&self) -> &'static str {
        "native"
    }

    #[cfg(unix)]
    async fn recv(&mut self) -> Option<ShutdownSignal> {
        tokio::select! {
            s = self.interrupt.recv() => s.map(|_| ShutdownSignal::Interrupt),
            s = self.terminate.recv() => s.map(|_| ShutdownSignal::Terminate),
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> Option<ShutdownSignal> {
        tokio::signal::ctrl_c()
            .await
            .ok()
            .map(|_| ShutdownSignal::Interrupt)
    }
}

/// Ctrl+C read straight from a raw-mode terminal.
///
/// Raw mode is restored when the source is dropped.
pub struct TerminalInterrupt {
    rx: mpsc::UnboundedReceiver<ShutdownSignal>,
}

impl TerminalInterrupt {
    pub fn new() -> HostResult<Self> {
        use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};

        crossterm::terminal::enable_raw_mode()?;
        let (tx, rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("drover-terminal".into())
            .spawn(move || {
                loop {
                    match event::read() {
                        Ok(Event::Key(key))
                            if key.kind == KeyEventKind::Press
                                && key.code == KeyCode::Char('c')
                                && key.modifiers.contains(KeyModifiers::CONTROL) =>
                        {
                            if tx.send(ShutdownSignal::Interrupt).is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "Terminal input failed");
                            break;
                        }
                    }
                }
            })?;

        Ok(Self { rx })
    }
}

impl Drop for TerminalInterrupt {
    fn drop(&mut self) {
        if let Err(e) = crossterm::terminal::disable_raw_mode() {
            warn!(error = %e, "Failed to restore terminal mode");
        }
    }
}

#[async_trait]
impl SignalSource for TerminalInterrupt {
    fn name(&self) -> &'static str {
        "terminal"
    }

    fn forwards_to_workers(&self) -> bool {
        true
    }

    async fn recv(&mut self) -> Option<ShutdownSignal> {
        self.rx.recv().await
    }
}

/// Shutdown requests from the master, read from the worker's stdin.
///
/// When the master goes away the channel closes; that counts as one final
/// `Terminate`.
pub struct ControlChannel<R = BufReader<Stdin>> {
    reader: Option<ControlReader<R>>,
}

impl ControlChannel {
    pub fn stdin() -> Self {
        Self::new(ControlReader::stdin())
    }
}

impl<R> ControlChannel<R> {
    pub fn new(reader: ControlReader<R>) -> Self {
        Self {
            reader: Some(reader),
        }
    }
}

#[async_trait]
impl<R> SignalSource for ControlChannel<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    fn name(&self) -> &'static str {
        "control"
    }

    async fn recv(&mut self) -> Option<ShutdownSignal> {
        let reader = self.reader.as_mut()?;

        match reader.next().await {
            Ok(ControlMessage::Shutdown { signal }) => {
                debug!(%signal, "Shutdown requested by master");
                Some(signal)
            }
            Err(IpcError::ConnectionClosed) => {
                info!("Control channel closed by master");
                self.reader = None;
                Some(ShutdownSignal::Terminate)
            }
            Err(e) => {
                warn!(error = %e, "Control channel failed");
                self.reader = None;
                Some(ShutdownSignal::Terminate)
            }
        }
    }
}

/// Which signal sources a process needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalPlan {
    pub native: bool,
    pub terminal: bool,
    pub control_channel: bool,
}

impl SignalPlan {
    /// `top_level` is false for processes spawned by a master
    pub fn for_role(top_level: bool, terminal_delivers_interrupt: bool) -> Self {
        Self {
            native: true,
            terminal: top_level && !terminal_delivers_interrupt,
            control_channel: !top_level,
        }
    }

    /// Plan for this process on this platform
    pub fn detect() -> Self {
        Self::for_role(
            drover_util::is_top_level(),
            platform_delivers_terminal_interrupt(),
        )
    }

    /// Open the planned sources
    pub fn sources(&self) -> HostResult<Vec<Box<dyn SignalSource>>> {
        let mut sources: Vec<Box<dyn SignalSource>> = Vec::new();

        if self.native {
            sources.push(Box::new(NativeSignals::new()?));
        }
        if self.terminal {
            sources.push(Box::new(TerminalInterrupt::new()?));
        }
        if self.control_channel {
            sources.push(Box::new(ControlChannel::stdin()));
        }

        debug!(
            sources = ?sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "Signal sources ready"
        );
        Ok(sources)
    }
}
