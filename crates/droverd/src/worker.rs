//! Worker runner: hosts the configured program as a child process

use drover_api::ExitStatus;
use drover_config::WorkerCommand;
use drover_core::{ListenerError, ShutdownCoordinator, listener};
use drover_host::{HostResult, MONITOR_INTERVAL, ManagedProcess, StdinMode, apply_heap_limit};
use drover_util::{Result, heap_limit_from_env};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// The program a worker runs
pub struct HostedProgram {
    pid: u32,
    process: Arc<Mutex<ManagedProcess>>,
    exited: watch::Receiver<Option<ExitStatus>>,
}

impl HostedProgram {
    /// Start `command` and begin watching for its exit
    pub fn launch(command: &WorkerCommand, stdin: StdinMode) -> Result<Arc<Self>> {
        let process = ManagedProcess::spawn(&command.program, &command.args, &[], stdin)?;
        let pid = process.pid;
        let process = Arc::new(Mutex::new(process));
        let (tx, exited) = watch::channel(None);

        let monitored = process.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(MONITOR_INTERVAL).await;

                let status = match monitored
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .try_wait()
                {
                    Ok(status) => status,
                    Err(e) => {
                        warn!(pid, error = %e, "Error checking program status");
                        None
                    }
                };

                if let Some(status) = status {
                    info!(pid, status = ?status, "Program exited");
                    let _ = tx.send(Some(status));
                    return;
                }
            }
        });

        info!(pid, program = %command.program.display(), "Program started");
        Ok(Arc::new(Self { pid, process, exited }))
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// `None` while the program is running
    pub fn exit_status(&self) -> Option<ExitStatus> {
        *self.exited.borrow()
    }

    /// Ask the program to stop; no-op once it has exited
    pub fn terminate(&self) -> HostResult<()> {
        if self.exit_status().is_some() {
            return Ok(());
        }
        self.process
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .terminate()
    }

    /// Resolves with the program's exit status
    pub async fn wait(&self) -> ExitStatus {
        let mut rx = self.exited.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(status) => (*status).unwrap_or(ExitStatus::with_code(1)),
            // Monitor gone without a status
            Err(_) => ExitStatus::with_code(1),
        }
    }
}

/// Run the worker side of the cluster.
///
/// Applies any heap ceiling handed down by the master, launches the program,
/// stops it when this process shuts down, and shuts this process down with
/// the program's exit code when it exits by itself.
pub fn start_worker(
    command: &WorkerCommand,
    coordinator: &Arc<ShutdownCoordinator>,
    stdin: StdinMode,
) -> Result<Arc<HostedProgram>> {
    if let Some(mb) = heap_limit_from_env()
        && let Err(e) = apply_heap_limit(mb)
    {
        warn!(heap_size_mb = mb, error = %e, "Could not apply heap ceiling");
    }

    let program = HostedProgram::launch(command, stdin)?;

    let stopping = program.clone();
    coordinator.add_on_shutdown(listener(move || {
        let program = stopping.clone();
        async move {
            program.terminate()?;
            let status = program.wait().await;
            debug!(status = ?status, "Program stopped");
            Ok::<(), ListenerError>(())
        }
    }));

    let finished = program.clone();
    let coordinator = coordinator.clone();
    tokio::spawn(async move {
        let status = finished.wait().await;
        coordinator.shutdown(status.exit_code()).await;
    });

    Ok(program)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use drover_api::EventLog;
    use drover_core::{RecordingExit, ShutdownState};
    use std::time::Duration;

    fn coordinator() -> (Arc<ShutdownCoordinator>, Arc<RecordingExit>) {
        let exit = Arc::new(RecordingExit::new());
        let coordinator = Arc::new(
            ShutdownCoordinator::new(EventLog::none())
                .with_exit(exit.clone())
                .with_timeout(Duration::from_secs(5)),
        );
        (coordinator, exit)
    }

    fn sh(script: &str) -> WorkerCommand {
        WorkerCommand::new("sh").with_args(["-c", script])
    }

    async fn terminated(coordinator: &ShutdownCoordinator) {
        let mut state = coordinator.subscribe();
        tokio::time::timeout(
            Duration::from_secs(10),
            state.wait_for(|s| *s == ShutdownState::Terminated),
        )
        .await
        .expect("shutdown did not finish")
        .unwrap();
    }

    #[tokio::test]
    async fn program_exit_code_is_mirrored() {
        let (coordinator, exit) = coordinator();
        let program = start_worker(&sh("exit 3"), &coordinator, StdinMode::Null).unwrap();

        terminated(&coordinator).await;
        assert_eq!(program.exit_status(), Some(ExitStatus::with_code(3)));
        assert_eq!(exit.codes(), vec![3]);
    }

    #[tokio::test]
    async fn shutdown_stops_program() {
        let (coordinator, exit) = coordinator();
        let program = start_worker(&sh("exec sleep 60"), &coordinator, StdinMode::Null).unwrap();

        coordinator.shutdown(0).await;

        assert_eq!(program.exit_status().and_then(|s| s.signal), Some(15));
        assert_eq!(exit.codes(), vec![0]);
    }

    #[tokio::test]
    async fn launch_failure_is_an_error() {
        let (coordinator, exit) = coordinator();
        let result = start_worker(
            &WorkerCommand::new("/nonexistent/drover-program"),
            &coordinator,
            StdinMode::Null,
        );

        assert!(result.is_err());
        assert_eq!(coordinator.listener_count(), 0);
        assert!(exit.codes().is_empty());
    }
}
