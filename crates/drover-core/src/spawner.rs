//! Worker spawner trait - implemented by platform-specific hosts

use async_trait::async_trait;
use drover_api::{ControlMessage, ExitStatus};
use drover_util::{Result, WORKER_ID_ENV, WorkerId};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// How to launch a worker. Built once per pool and reused for every spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerTemplate {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl WorkerTemplate {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Re-run the current executable with the arguments it was started with
    pub fn current_process() -> std::io::Result<Self> {
        let program = std::env::current_exe()?;
        Ok(Self {
            program,
            args: std::env::args().skip(1).collect(),
            env: Vec::new(),
        })
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Environment for one concrete worker: the template's plus its ID marker
    pub fn env_for(&self, id: WorkerId) -> Vec<(String, String)> {
        let mut env = self.env.clone();
        env.push((WORKER_ID_ENV.to_string(), id.get().to_string()));
        env
    }
}

/// A worker the spawner has started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerHandle {
    pub id: WorkerId,
    pub pid: u32,
}

/// Events from the spawner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Worker process has exited
    Exited { pid: u32, status: ExitStatus },
}

/// Starts worker processes, observes their exits and delivers control messages
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    /// Start one worker from `template`
    async fn spawn(&self, id: WorkerId, template: &WorkerTemplate) -> Result<WorkerHandle>;

    /// Deliver a control message to a live worker
    async fn send(&self, pid: u32, message: &ControlMessage) -> Result<()>;

    /// Take the exit event stream. Returns `None` after the first call.
    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<WorkerEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_for_appends_worker_marker() {
        let template = WorkerTemplate::new("/bin/server").with_env("DROVER_HEAP_LIMIT_MB", "256");
        let env = template.env_for(WorkerId::new(4));
        assert_eq!(
            env,
            vec![
                ("DROVER_HEAP_LIMIT_MB".to_string(), "256".to_string()),
                (WORKER_ID_ENV.to_string(), "4".to_string()),
            ]
        );
        assert_eq!(template.env.len(), 1);
    }

    #[test]
    fn current_process_points_at_this_binary() {
        let template = WorkerTemplate::current_process().unwrap();
        assert!(template.program.is_absolute());
    }
}
