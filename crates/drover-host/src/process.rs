//! Process management utilities

use drover_api::{ControlMessage, ExitStatus};
use drover_ipc::write_message;
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use tracing::debug;

use crate::{HostError, HostResult};

/// What a spawned process reads on stdin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinMode {
    /// Nothing to read
    Null,
    /// A pipe owned by the parent; used as the control channel
    Piped,
    /// The parent's own stdin
    Inherit,
}

impl From<StdinMode> for Stdio {
    fn from(mode: StdinMode) -> Self {
        match mode {
            StdinMode::Null => Stdio::null(),
            StdinMode::Piped => Stdio::piped(),
            StdinMode::Inherit => Stdio::inherit(),
        }
    }
}

/// Child process, optionally holding the write end of its stdin.
///
/// Children stay in the parent's process group so a terminal interrupt
/// reaches the whole tree. stdout/stderr are inherited.
pub struct ManagedProcess {
    pub child: Child,
    pub pid: u32,
    stdin: Option<ChildStdin>,
}

impl ManagedProcess {
    /// Spawn `program` with `args`, the parent's environment plus `env`
    pub fn spawn(
        program: &Path,
        args: &[String],
        env: &[(String, String)],
        stdin: StdinMode,
    ) -> HostResult<Self> {
        if program.as_os_str().is_empty() {
            return Err(HostError::SpawnFailed("Empty program path".into()));
        }

        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd.stdin(stdin);
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|e| {
            HostError::SpawnFailed(format!("Failed to spawn {}: {}", program.display(), e))
        })?;

        let pid = child.id();
        let stdin = child.stdin.take();

        debug!(pid = pid, program = %program.display(), "Process spawned");

        Ok(Self { child, pid, stdin })
    }

    /// Write one control message to the child's stdin
    pub fn send(&mut self, message: &ControlMessage) -> HostResult<()> {
        let stdin = self.stdin.as_mut().ok_or(HostError::NotRunning(self.pid))?;
        write_message(stdin, message)?;
        Ok(())
    }

    /// Ask the process to stop (SIGTERM)
    #[cfg(unix)]
    pub fn terminate(&mut self) -> HostResult<()> {
        self.signal(nix::sys::signal::Signal::SIGTERM)
    }

    /// Ask the process to stop. Without signals this is a hard kill.
    #[cfg(not(unix))]
    pub fn terminate(&mut self) -> HostResult<()> {
        self.kill()
    }

    /// Stop the process immediately
    pub fn kill(&mut self) -> HostResult<()> {
        match self.child.kill() {
            Ok(()) => {
                debug!(pid = self.pid, "Killed process");
                Ok(())
            }
            // Already reaped
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(HostError::SignalFailed(format!("Failed to kill: {}", e))),
        }
    }

    #[cfg(unix)]
    fn signal(&self, signal: nix::sys::signal::Signal) -> HostResult<()> {
        use nix::unistd::Pid;

        match nix::sys::signal::kill(Pid::from_raw(self.pid as i32), signal) {
            Ok(()) => {
                debug!(pid = self.pid, signal = %signal, "Sent signal");
                Ok(())
            }
            Err(nix::errno::Errno::ESRCH) => {
                // Process already gone
                Ok(())
            }
            Err(e) => Err(HostError::SignalFailed(format!(
                "Failed to send {}: {}",
                signal, e
            ))),
        }
    }

    /// Check if the process has exited (non-blocking)
    pub fn try_wait(&mut self) -> HostResult<Option<ExitStatus>> {
        Ok(self.child.try_wait()?.map(ExitStatus::from))
    }
}

/// Cap this process's data segment at `mb` megabytes.
///
/// Children spawned afterwards inherit the ceiling. The hard limit is left
/// untouched unless it is already lower.
#[cfg(unix)]
pub fn apply_heap_limit(mb: u64) -> HostResult<()> {
    use nix::sys::resource::{Resource, getrlimit, setrlimit};

    let bytes = mb.saturating_mul(1024 * 1024);
    let (_, hard) =
        getrlimit(Resource::RLIMIT_DATA).map_err(|e| HostError::LimitFailed(e.to_string()))?;
    let soft = bytes.min(hard);

    setrlimit(Resource::RLIMIT_DATA, soft, hard)
        .map_err(|e| HostError::LimitFailed(e.to_string()))?;

    debug!(heap_size_mb = mb, "Applied data segment limit");
    Ok(())
}

#[cfg(not(unix))]
pub fn apply_heap_limit(mb: u64) -> HostResult<()> {
    tracing::warn!(heap_size_mb = mb, "Heap ceiling is not supported on this platform");
    Ok(())
}
