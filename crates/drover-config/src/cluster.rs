//! Validated cluster configuration

use crate::parse_threads_keyword;
use crate::schema::{RawConfig, RawThreads, RawWorker};
use drover_api::EventLog;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default time shutdown listeners get before the process is forced down
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(30_000);

/// How many workers the master should run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threads {
    /// Exactly this many workers; 0 runs the program single-process, unsupervised
    Fixed(usize),
    /// Derive the count from the number of logical CPUs
    Auto,
}

impl Threads {
    /// True when the process should act as a supervisor at all
    pub fn is_clustered(&self) -> bool {
        !matches!(self, Threads::Fixed(0))
    }
}

/// Parses a worker count or the `auto` keyword, as on the command line
impl FromStr for Threads {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<usize>() {
            Ok(n) => Ok(Threads::Fixed(n)),
            Err(_) => parse_threads_keyword(s).map(|()| Threads::Auto),
        }
    }
}

/// The program a worker runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// argv form: program followed by its arguments
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![self.program.to_string_lossy().into_owned()];
        argv.extend(self.args.iter().cloned());
        argv
    }
}

impl From<RawWorker> for WorkerCommand {
    fn from(raw: RawWorker) -> Self {
        Self {
            program: raw.program,
            args: raw.args,
        }
    }
}

/// Cluster configuration, fixed once constructed.
///
/// Components receive it behind an `Arc` and never mutate it.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub threads: Threads,

    /// Max heap size per worker, in MB
    pub heap_size_mb: Option<u64>,

    /// CPUs to leave free; only consulted with [`Threads::Auto`]
    pub extra_cpus: Option<usize>,

    pub worker: WorkerCommand,

    /// Lifecycle logging callback
    pub log: EventLog,

    /// Initial shutdown timeout for the process's coordinator
    pub shutdown_timeout: Duration,
}

impl ClusterConfig {
    pub fn new(threads: Threads, worker: WorkerCommand) -> Self {
        Self {
            threads,
            heap_size_mb: None,
            extra_cpus: None,
            worker,
            log: EventLog::none(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let threads = match raw.cluster.threads {
            Some(RawThreads::Count(n)) => Threads::Fixed(n),
            Some(RawThreads::Keyword(_)) => Threads::Auto,
            // Unset runs single-process
            None => Threads::Fixed(0),
        };

        Self {
            threads,
            heap_size_mb: raw.cluster.heap_size_mb,
            extra_cpus: raw.cluster.extra_cpus,
            worker: raw.worker.into(),
            log: EventLog::none(),
            shutdown_timeout: raw
                .cluster
                .shutdown_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT),
        }
    }

    pub fn with_heap_size_mb(mut self, mb: u64) -> Self {
        self.heap_size_mb = Some(mb);
        self
    }

    pub fn with_extra_cpus(mut self, cpus: usize) -> Self {
        self.extra_cpus = Some(cpus);
        self
    }

    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Number of workers to run given `available_cpus` logical CPUs.
    ///
    /// A fixed count is used verbatim. In auto mode the reservation is
    /// subtracted from the CPU count and the result never drops below 1.
    pub fn worker_count(&self, available_cpus: usize) -> usize {
        match self.threads {
            Threads::Fixed(n) => n,
            Threads::Auto => match self.extra_cpus {
                Some(extra) => available_cpus.saturating_sub(extra).max(1),
                None => available_cpus.max(1),
            },
        }
    }
}

/// Logical CPUs available to this process
pub fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threads: Threads) -> ClusterConfig {
        ClusterConfig::new(threads, WorkerCommand::new("/srv/app.js"))
    }

    #[test]
    fn fixed_count_is_verbatim() {
        assert_eq!(config(Threads::Fixed(4)).worker_count(64), 4);
        assert_eq!(config(Threads::Fixed(0)).worker_count(8), 0);
    }

    #[test]
    fn auto_uses_cpu_count() {
        assert_eq!(config(Threads::Auto).worker_count(8), 8);
    }

    #[test]
    fn auto_subtracts_reservation() {
        let config = config(Threads::Auto).with_extra_cpus(2);
        assert_eq!(config.worker_count(8), 6);
        assert_eq!(config.worker_count(1), 1);
    }

    #[test]
    fn auto_never_below_one() {
        for extra in [0, 1, 7, 8, 100, usize::MAX] {
            let config = config(Threads::Auto).with_extra_cpus(extra);
            for cpus in [1, 2, 8, 128] {
                assert!(config.worker_count(cpus) >= 1);
            }
        }
    }

    #[test]
    fn extra_cpus_ignored_for_fixed() {
        let config = config(Threads::Fixed(3)).with_extra_cpus(2);
        assert_eq!(config.worker_count(8), 3);
    }

    #[test]
    fn clustered_only_when_nonzero() {
        assert!(!Threads::Fixed(0).is_clustered());
        assert!(Threads::Fixed(1).is_clustered());
        assert!(Threads::Auto.is_clustered());
    }

    #[test]
    fn threads_from_str() {
        assert_eq!("4".parse::<Threads>(), Ok(Threads::Fixed(4)));
        assert_eq!(" 0 ".parse::<Threads>(), Ok(Threads::Fixed(0)));
        assert_eq!("AUTO".parse::<Threads>(), Ok(Threads::Auto));
        assert!("-1".parse::<Threads>().is_err());
        assert!("many".parse::<Threads>().is_err());
    }

    #[test]
    fn argv_includes_args() {
        let cmd = WorkerCommand::new("/usr/bin/server").with_args(["--port", "8080"]);
        assert_eq!(cmd.argv(), vec!["/usr/bin/server", "--port", "8080"]);
    }
}
