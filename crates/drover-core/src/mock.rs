//! Mock worker spawner for testing

use async_trait::async_trait;
use drover_api::{ControlMessage, ExitStatus};
use drover_util::{DroverError, Result, WorkerId};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

use crate::{WorkerEvent, WorkerHandle, WorkerSpawner, WorkerTemplate};

/// Mock spawner for unit/integration testing
pub struct MockSpawner {
    next_pid: AtomicU32,
    spawned: Mutex<Vec<(WorkerHandle, WorkerTemplate)>>,
    sent: Mutex<Vec<(u32, ControlMessage)>>,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<WorkerEvent>>>,

    /// Configure spawn to fail
    pub fail_spawn: AtomicBool,

    /// Workers exit with code 0 as soon as they are sent a shutdown message
    pub exit_on_shutdown: AtomicBool,

    /// Workers report an exit with code 1 before `spawn` returns
    pub exit_on_spawn: AtomicBool,
}

impl MockSpawner {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            next_pid: AtomicU32::new(1000),
            spawned: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            event_tx: tx,
            event_rx: Mutex::new(Some(rx)),
            fail_spawn: AtomicBool::new(false),
            exit_on_shutdown: AtomicBool::new(false),
            exit_on_spawn: AtomicBool::new(false),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of successful spawns so far
    pub fn spawn_count(&self) -> usize {
        self.spawned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.spawned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(h, _)| h.pid)
            .collect()
    }

    /// Templates passed to each spawn, in order
    pub fn templates(&self) -> Vec<WorkerTemplate> {
        self.spawned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn sent(&self) -> Vec<(u32, ControlMessage)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Simulate a worker process exiting
    pub fn simulate_exit(&self, pid: u32, status: ExitStatus) {
        let _ = self.event_tx.send(WorkerEvent::Exited { pid, status });
    }
}

impl Default for MockSpawner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerSpawner for MockSpawner {
    async fn spawn(&self, id: WorkerId, template: &WorkerTemplate) -> Result<WorkerHandle> {
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(DroverError::spawn("Mock spawn failure"));
        }

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let handle = WorkerHandle { id, pid };
        self.spawned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((handle, template.clone()));

        if self.exit_on_spawn.load(Ordering::SeqCst) {
            self.simulate_exit(pid, ExitStatus::with_code(1));
            tokio::task::yield_now().await;
        }

        Ok(handle)
    }

    async fn send(&self, pid: u32, message: &ControlMessage) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((pid, message.clone()));

        if self.exit_on_shutdown.load(Ordering::SeqCst)
            && matches!(message, ControlMessage::Shutdown { .. })
        {
            self.simulate_exit(pid, ExitStatus::success());
        }

        Ok(())
    }

    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<WorkerEvent>> {
        self.event_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
