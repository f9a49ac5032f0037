//! Worker pool supervision
//!
//! The master owns one [`WorkerPool`]. It sizes the pool from configuration,
//! spawns the initial workers, and reacts to each worker exit: after a short
//! grace period it either schedules a respawn with backoff or, when no worker
//! is left at all, gives up and exits the process.

use drover_api::{ControlMessage, ExitStatus, ShutdownSignal};
use drover_config::{ClusterConfig, available_cpus};
use drover_util::{DroverError, HEAP_LIMIT_ENV, Result, WorkerId, WorkerIdAllocator};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::{
    BACKOFF_DECAY, RespawnBackoff, ShutdownCoordinator, WorkerEvent, WorkerSpawner,
    WorkerTemplate, listener,
};

/// Delay between an exit notification and reacting to it
pub const EXIT_GRACE_PERIOD: Duration = Duration::from_millis(100);

/// Process exit code when every worker has died
pub const POOL_COLLAPSE_EXIT_CODE: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Exited,
}

/// One supervised worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub pid: u32,
    pub state: WorkerState,
}

/// Live workers, plus exits that arrived before their spawn returned
#[derive(Default)]
struct Roster {
    live: HashMap<u32, WorkerRecord>,
    early_exits: HashMap<u32, ExitStatus>,
}

/// The master's pool of worker processes
pub struct WorkerPool {
    config: Arc<ClusterConfig>,
    spawner: Arc<dyn WorkerSpawner>,
    coordinator: Arc<ShutdownCoordinator>,
    base_template: WorkerTemplate,
    /// Pool-wide launch template, fixed by `initialize`
    template: OnceLock<WorkerTemplate>,
    workers: Mutex<Roster>,
    live: watch::Sender<usize>,
    ids: WorkerIdAllocator,
    backoff: RespawnBackoff,
    available_cpus: usize,
}

impl WorkerPool {
    pub fn new(
        config: Arc<ClusterConfig>,
        spawner: Arc<dyn WorkerSpawner>,
        coordinator: Arc<ShutdownCoordinator>,
        template: WorkerTemplate,
    ) -> Self {
        let (live, _) = watch::channel(0);

        Self {
            config,
            spawner,
            coordinator,
            base_template: template,
            template: OnceLock::new(),
            workers: Mutex::new(Roster::default()),
            live,
            ids: WorkerIdAllocator::new(),
            backoff: RespawnBackoff::new(),
            available_cpus: available_cpus(),
        }
    }

    /// Override the detected CPU count used for `Threads::Auto`
    pub fn with_available_cpus(mut self, cpus: usize) -> Self {
        self.available_cpus = cpus;
        self
    }

    /// Start supervising: fix the launch template, subscribe to exits, hook
    /// into shutdown and spawn the initial workers.
    ///
    /// Returns the number of workers spawned. May only be called once.
    pub async fn initialize(self: &Arc<Self>) -> Result<usize> {
        let template = self.pool_template();
        if self.template.set(template).is_err() {
            return Err(DroverError::internal("Worker pool already initialized"));
        }

        let events = self
            .spawner
            .subscribe()
            .ok_or_else(|| DroverError::internal("Worker exit events already taken"))?;
        tokio::spawn(self.clone().watch_exits(events));

        self.register_drain_listener();

        let count = self.config.worker_count(self.available_cpus);
        info!(
            workers = count,
            threads = ?self.config.threads,
            cpus = self.available_cpus,
            "Spawning initial workers"
        );

        for _ in 0..count {
            self.spawn_worker().await?;
        }

        Ok(count)
    }

    pub fn live_count(&self) -> usize {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .live
            .len()
    }

    pub fn live_pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .live
            .keys()
            .copied()
            .collect();
        pids.sort_unstable();
        pids
    }

    pub fn workers(&self) -> Vec<WorkerRecord> {
        let mut workers: Vec<WorkerRecord> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .live
            .values()
            .copied()
            .collect();
        workers.sort_by_key(|w| w.id);
        workers
    }

    pub fn backoff(&self) -> &RespawnBackoff {
        &self.backoff
    }

    /// Send `message` to every live worker; returns how many accepted it
    pub async fn broadcast(&self, message: &ControlMessage) -> usize {
        let mut delivered = 0;
        for pid in self.live_pids() {
            match self.spawner.send(pid, message).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(pid, error = %e, "Failed to deliver control message"),
            }
        }
        delivered
    }

    /// Resolves once no worker is live
    pub async fn wait_until_empty(&self) {
        let mut rx = self.live.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    fn pool_template(&self) -> WorkerTemplate {
        let mut template = self.base_template.clone();
        if let Some(mb) = self.config.heap_size_mb {
            debug!(heap_size_mb = mb, "Applying worker heap ceiling");
            template = template.with_env(HEAP_LIMIT_ENV, mb.to_string());
        }
        template
    }

    /// On shutdown, tell every worker to stop and wait for the pool to drain
    fn register_drain_listener(self: &Arc<Self>) {
        let pool: Weak<Self> = Arc::downgrade(self);
        self.coordinator.add_on_shutdown(listener(move || {
            let pool = pool.clone();
            async move {
                if let Some(pool) = pool.upgrade() {
                    let sent = pool
                        .broadcast(&ControlMessage::shutdown(ShutdownSignal::Terminate))
                        .await;
                    info!(workers = sent, "Waiting for workers to exit");
                    pool.wait_until_empty().await;
                }
                Ok(())
            }
        }));
    }

    async fn spawn_worker(self: &Arc<Self>) -> Result<WorkerRecord> {
        let template = self
            .template
            .get()
            .ok_or_else(|| DroverError::internal("Worker pool not initialized"))?;

        let id = self.ids.next_id();
        let handle = self.spawner.spawn(id, template).await?;
        let mut record = WorkerRecord {
            id: handle.id,
            pid: handle.pid,
            state: WorkerState::Running,
        };

        let early_exit = {
            let mut roster = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            let early_exit = roster.early_exits.remove(&record.pid);
            if early_exit.is_none() {
                roster.live.insert(record.pid, record);
                self.live.send_replace(roster.live.len());
            }
            early_exit
        };

        info!(worker = %record.id, pid = record.pid, "Worker spawned");

        if let Some(status) = early_exit {
            debug!(pid = record.pid, "Worker exited before its spawn completed");
            record.state = WorkerState::Exited;
            self.schedule_death(record, status);
        }
        Ok(record)
    }

    async fn watch_exits(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<WorkerEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                WorkerEvent::Exited { pid, status } => self.on_worker_exit(pid, status),
            }
        }
        debug!("Worker event stream closed");
    }

    fn on_worker_exit(self: &Arc<Self>, pid: u32, status: ExitStatus) {
        let record = {
            let mut roster = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            let record = roster.live.remove(&pid);
            if record.is_none() {
                // Possibly a spawn still in flight; it picks this up on return
                roster.early_exits.insert(pid, status);
            }
            self.live.send_replace(roster.live.len());
            record
        };

        let Some(mut record) = record else {
            debug!(pid, "Exit of unregistered worker held back");
            return;
        };
        record.state = WorkerState::Exited;
        self.schedule_death(record, status);
    }

    fn schedule_death(self: &Arc<Self>, record: WorkerRecord, status: ExitStatus) {
        let pool = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(EXIT_GRACE_PERIOD).await;
            pool.handle_worker_death(record, status);
        });
    }

    fn handle_worker_death(self: &Arc<Self>, record: WorkerRecord, status: ExitStatus) {
        info!(
            worker = %record.id,
            pid = record.pid,
            code = ?status.code,
            signal = ?status.signal,
            "Worker exited"
        );
        self.config.log.emit(
            "Cluster worker shutdown",
            Some(json!({
                "pid": record.pid,
                "code": status.code,
                "signal": status.signal,
            })),
        );

        let shutting_down = self.coordinator.is_shutting_down();

        if self.live_count() == 0 {
            if shutting_down {
                info!("All workers exited during shutdown");
                return;
            }

            error!("All workers have exited; exiting");
            self.config
                .log
                .emit("All cluster workers have shutdown; Exiting", None);
            self.coordinator
                .process_exit()
                .exit(POOL_COLLAPSE_EXIT_CODE);
            return;
        }

        if shutting_down {
            debug!(pid = record.pid, "Not respawning during shutdown");
            return;
        }

        self.respawn();
    }

    fn respawn(self: &Arc<Self>) {
        let (backoff, delay) = self.backoff.next_delay();

        info!(backoff, delay_ms = delay.as_millis() as u64, "Scheduling worker respawn");
        self.config.log.emit(
            "Scheduling cluster worker respawn",
            Some(json!({ "delay": format!("{}ms", delay.as_millis()) })),
        );

        let pool = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            if pool.coordinator.is_shutting_down() {
                debug!("Dropping scheduled respawn, shutdown in progress");
                pool.backoff.finish();
                return;
            }

            let decay = tokio::time::sleep(BACKOFF_DECAY);
            if let Err(e) = pool.spawn_worker().await {
                error!(error = %e, "Failed to respawn worker");
                pool.config.log.emit(
                    "Failed to respawn cluster worker",
                    Some(json!({ "error": e.to_string() })),
                );
                pool.respawn();
            }

            decay.await;
            pool.backoff.finish();
        });
    }
}
