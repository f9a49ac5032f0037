//! Process-backed worker spawner

use async_trait::async_trait;
use drover_api::ControlMessage;
use drover_core::{WorkerEvent, WorkerHandle, WorkerSpawner, WorkerTemplate};
use drover_util::{Result, WorkerId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{HostError, ManagedProcess, StdinMode};

/// How often the monitor polls children for exit
pub const MONITOR_INTERVAL: Duration = Duration::from_millis(100);

/// Spawns workers as real child processes.
///
/// Each worker's stdin is a pipe the master writes control messages to.
pub struct ProcessHost {
    processes: Arc<Mutex<HashMap<u32, ManagedProcess>>>,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<WorkerEvent>>>,
}

impl ProcessHost {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            processes: Arc::new(Mutex::new(HashMap::new())),
            event_tx: tx,
            event_rx: Mutex::new(Some(rx)),
        }
    }

    /// Start the background process monitor
    pub fn start_monitor(&self) -> tokio::task::JoinHandle<()> {
        let processes = self.processes.clone();
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(MONITOR_INTERVAL).await;

                let mut exited = Vec::new();

                {
                    let mut procs = processes.lock().unwrap_or_else(PoisonError::into_inner);
                    for (pid, proc) in procs.iter_mut() {
                        match proc.try_wait() {
                            Ok(Some(status)) => exited.push((*pid, status)),
                            Ok(None) => {}
                            Err(e) => {
                                warn!(pid = pid, error = %e, "Error checking process status");
                            }
                        }
                    }

                    for (pid, _) in &exited {
                        procs.remove(pid);
                    }
                }

                for (pid, status) in exited {
                    info!(pid = pid, status = ?status, "Worker process exited");
                    if event_tx.send(WorkerEvent::Exited { pid, status }).is_err() {
                        return;
                    }
                }
            }
        })
    }
}

impl Default for ProcessHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerSpawner for ProcessHost {
    async fn spawn(&self, id: WorkerId, template: &WorkerTemplate) -> Result<WorkerHandle> {
        let proc = ManagedProcess::spawn(
            &template.program,
            &template.args,
            &template.env_for(id),
            StdinMode::Piped,
        )?;

        let pid = proc.pid;
        self.processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pid, proc);

        info!(worker = %id, pid = pid, "Spawned worker process");

        Ok(WorkerHandle { id, pid })
    }

    async fn send(&self, pid: u32, message: &ControlMessage) -> Result<()> {
        let mut procs = self.processes.lock().unwrap_or_else(PoisonError::into_inner);
        let proc = procs.get_mut(&pid).ok_or(HostError::NotRunning(pid))?;
        proc.send(message)?;
        Ok(())
    }

    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<WorkerEvent>> {
        self.event_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
