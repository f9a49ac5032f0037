//! Which part a process plays in the cluster

use drover_config::{ClusterConfig, Threads};
use drover_util::{WorkerId, worker_id_from_env};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Supervises the worker pool
    Master,
    /// Hosts the configured program. `id` is `None` when running
    /// single-process, without a master.
    Worker { id: Option<WorkerId> },
}

impl Role {
    /// Role of the current process
    pub fn detect(config: &ClusterConfig) -> Self {
        Self::resolve(config.threads, worker_id_from_env())
    }

    /// A process spawned by a master is always a worker; otherwise
    /// `threads = 0` means running the program directly.
    pub fn resolve(threads: Threads, worker_id: Option<WorkerId>) -> Self {
        match worker_id {
            Some(id) => Role::Worker { id: Some(id) },
            None if !threads.is_clustered() => Role::Worker { id: None },
            None => Role::Master,
        }
    }

    pub fn is_master(&self) -> bool {
        matches!(self, Role::Master)
    }

    /// Whether this process was started by a master
    pub fn has_master(&self) -> bool {
        matches!(self, Role::Worker { id: Some(_) })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Master => write!(f, "master"),
            Role::Worker { id: Some(id) } => write!(f, "{}", id),
            Role::Worker { id: None } => write!(f, "worker"),
        }
    }
}
