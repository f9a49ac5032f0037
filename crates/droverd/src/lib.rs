//! droverd: run a program as a supervised pool of worker processes
//!
//! The same binary plays both parts. The top-level process becomes the
//! master and re-executes itself once per worker; each worker then hosts the
//! configured program. [`Cluster`] decides the role and wires the pool,
//! the shutdown coordinator and the signal sources together.

mod role;
mod worker;

pub use role::*;
pub use worker::*;

use drover_config::ClusterConfig;
use drover_core::{
    ProcessExit, ShutdownCoordinator, ShutdownState, SignalBridge, SignalSource, WorkerPool,
    WorkerSpawner, WorkerTemplate,
};
use drover_host::{ProcessHost, SignalPlan, StdinMode};
use drover_util::{DroverError, Result};
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// A process about to join the cluster
pub struct Cluster {
    config: Arc<ClusterConfig>,
    role: Role,
    coordinator: Arc<ShutdownCoordinator>,
    spawner: Option<Arc<dyn WorkerSpawner>>,
    template: Option<WorkerTemplate>,
    signal_sources: Option<Vec<Box<dyn SignalSource>>>,
    available_cpus: Option<usize>,
}

impl Cluster {
    pub fn new(config: ClusterConfig) -> Self {
        let role = Role::detect(&config);
        let coordinator = Arc::new(Self::coordinator_for(&config));

        Self {
            config: Arc::new(config),
            role,
            coordinator,
            spawner: None,
            template: None,
            signal_sources: None,
            available_cpus: None,
        }
    }

    fn coordinator_for(config: &ClusterConfig) -> ShutdownCoordinator {
        ShutdownCoordinator::new(config.log.clone()).with_timeout(config.shutdown_timeout)
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Replace how the process exits.
    ///
    /// This installs a fresh coordinator; handles taken earlier with
    /// [`Cluster::shutdown_handle`] no longer apply.
    pub fn with_exit(mut self, exit: Arc<dyn ProcessExit>) -> Self {
        self.coordinator = Arc::new(Self::coordinator_for(&self.config).with_exit(exit));
        self
    }

    /// Spawn workers through `spawner` from `template` instead of
    /// re-executing the current binary
    pub fn with_spawner(mut self, spawner: Arc<dyn WorkerSpawner>, template: WorkerTemplate) -> Self {
        self.spawner = Some(spawner);
        self.template = Some(template);
        self
    }

    /// Listen on these sources instead of the platform's
    pub fn with_signal_sources(mut self, sources: Vec<Box<dyn SignalSource>>) -> Self {
        self.signal_sources = Some(sources);
        self
    }

    pub fn with_available_cpus(mut self, cpus: usize) -> Self {
        self.available_cpus = Some(cpus);
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// This process's shutdown coordinator, for registering cleanup
    pub fn shutdown_handle(&self) -> Arc<ShutdownCoordinator> {
        self.coordinator.clone()
    }

    /// Take up the detected role and return once it is running
    pub async fn start(self) -> Result<ClusterHandle> {
        let Cluster {
            config,
            role,
            coordinator,
            spawner,
            template,
            signal_sources,
            available_cpus,
        } = self;

        let sources = match signal_sources {
            Some(sources) => sources,
            None => SignalPlan::detect().sources()?,
        };
        let pid = std::process::id();

        match role {
            Role::Master => {
                info!(pid, threads = ?config.threads, "Master started");
                config.log.emit("Master started", Some(json!({ "pid": pid })));

                let spawner: Arc<dyn WorkerSpawner> = match spawner {
                    Some(spawner) => spawner,
                    None => {
                        let host = Arc::new(ProcessHost::new());
                        host.start_monitor();
                        host
                    }
                };
                let template = match template {
                    Some(template) => template,
                    None => WorkerTemplate::current_process().map_err(|e| {
                        DroverError::spawn(format!("Cannot locate current executable: {}", e))
                    })?,
                };

                let mut pool = WorkerPool::new(config.clone(), spawner, coordinator.clone(), template);
                if let Some(cpus) = available_cpus {
                    pool = pool.with_available_cpus(cpus);
                }
                let pool = Arc::new(pool);

                let signals = SignalBridge::new(coordinator.clone())
                    .with_forward(pool.clone())
                    .spawn(sources);

                pool.initialize().await?;

                Ok(ClusterHandle {
                    role,
                    coordinator,
                    pool: Some(pool),
                    program: None,
                    signals,
                })
            }
            Role::Worker { id } => {
                info!(pid, worker = ?id, "Worker started");
                config.log.emit("Worker started", Some(json!({ "pid": pid })));

                let signals = SignalBridge::new(coordinator.clone()).spawn(sources);

                let stdin = if role.has_master() {
                    StdinMode::Null
                } else {
                    StdinMode::Inherit
                };
                let program = start_worker(&config.worker, &coordinator, stdin)?;

                Ok(ClusterHandle {
                    role,
                    coordinator,
                    pool: None,
                    program: Some(program),
                    signals,
                })
            }
        }
    }

    /// Start, then wait until this process has shut down
    pub async fn run(self) -> Result<()> {
        let handle = self.start().await?;
        handle.wait().await;
        Ok(())
    }
}

/// A running master or worker
pub struct ClusterHandle {
    role: Role,
    coordinator: Arc<ShutdownCoordinator>,
    pool: Option<Arc<WorkerPool>>,
    program: Option<Arc<HostedProgram>>,
    signals: Vec<JoinHandle<()>>,
}

impl ClusterHandle {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn shutdown_handle(&self) -> Arc<ShutdownCoordinator> {
        self.coordinator.clone()
    }

    /// The worker pool, on the master
    pub fn pool(&self) -> Option<&Arc<WorkerPool>> {
        self.pool.as_ref()
    }

    /// The hosted program, on a worker
    pub fn program(&self) -> Option<&Arc<HostedProgram>> {
        self.program.as_ref()
    }

    /// Resolves once shutdown has finished
    pub async fn wait(&self) {
        let mut state = self.coordinator.subscribe();
        let _ = state.wait_for(|s| *s == ShutdownState::Terminated).await;
    }
}

impl Drop for ClusterHandle {
    fn drop(&mut self) {
        for task in &self.signals {
            task.abort();
        }
    }
}

/// Start this process's part in the cluster described by `config`
pub async fn init_cluster(config: ClusterConfig) -> Result<ClusterHandle> {
    Cluster::new(config).start().await
}
