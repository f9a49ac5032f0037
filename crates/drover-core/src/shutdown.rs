//! Graceful shutdown coordination
//!
//! Each process owns exactly one [`ShutdownCoordinator`], shared behind an
//! `Arc` with everything that needs to register cleanup or check whether the
//! process is on its way out.
//!
//! Shutdown runs every registered listener concurrently and races them
//! against a single timeout. Whichever finishes first decides the log line;
//! either way the process exits with the requested code.

use drover_api::EventLog;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::{ProcessExit, StdProcessExit};

pub use drover_config::DEFAULT_SHUTDOWN_TIMEOUT;

/// Error type a shutdown listener may fail with
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Future returned by a shutdown listener
pub type ListenerFuture = Pin<Box<dyn Future<Output = Result<(), ListenerError>> + Send>>;

/// Asynchronous cleanup callback. Identity is the `Arc` allocation.
pub type ShutdownListener = Arc<dyn Fn() -> ListenerFuture + Send + Sync>;

/// Wrap an async closure as a [`ShutdownListener`]
pub fn listener<F, Fut>(f: F) -> ShutdownListener
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

/// Lifecycle of a process with respect to shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
    Terminated,
}

/// Process-wide shutdown state, listener registry and timeout
pub struct ShutdownCoordinator {
    state: watch::Sender<ShutdownState>,
    timeout: Mutex<Duration>,
    listeners: Mutex<Vec<ShutdownListener>>,
    log: EventLog,
    exit: Arc<dyn ProcessExit>,
}

impl ShutdownCoordinator {
    pub fn new(log: EventLog) -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);

        Self {
            state,
            timeout: Mutex::new(DEFAULT_SHUTDOWN_TIMEOUT),
            listeners: Mutex::new(Vec::new()),
            log,
            exit: Arc::new(StdProcessExit),
        }
    }

    /// Replace how the process is terminated
    pub fn with_exit(mut self, exit: Arc<dyn ProcessExit>) -> Self {
        self.exit = exit;
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.set_shutdown_timeout(timeout);
        self
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    /// `false` until the first shutdown request, `true` forever after
    pub fn is_shutting_down(&self) -> bool {
        self.state() != ShutdownState::Running
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    /// Resolves once shutdown has begun
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|s| *s != ShutdownState::Running).await;
    }

    /// Set how long listeners get. Only shutdowns that start afterwards see it.
    pub fn set_shutdown_timeout(&self, timeout: Duration) {
        *self.timeout.lock().unwrap_or_else(PoisonError::into_inner) = timeout;
    }

    pub fn shutdown_timeout(&self) -> Duration {
        *self.timeout.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener. The same listener may be registered more than once.
    pub fn add_on_shutdown(&self, listener: ShutdownListener) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Unregister every entry that is this exact listener
    pub fn remove_on_shutdown(&self, listener: &ShutdownListener) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Handle used to terminate the process outside a graceful shutdown
    pub fn process_exit(&self) -> Arc<dyn ProcessExit> {
        self.exit.clone()
    }

    /// Run shutdown and exit with `exit_code`.
    ///
    /// Only the first call does anything; later calls return immediately
    /// without re-running listeners or re-arming the timeout. Listeners
    /// registered after this point are not run.
    pub async fn shutdown(&self, exit_code: i32) {
        let began = self.state.send_if_modified(|state| {
            if *state == ShutdownState::Running {
                *state = ShutdownState::ShuttingDown;
                true
            } else {
                false
            }
        });

        if !began {
            debug!(exit_code, "Shutdown already in progress");
            return;
        }

        let timeout = self.shutdown_timeout();
        let listeners: Vec<ShutdownListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        info!(
            exit_code,
            timeout_ms = timeout.as_millis() as u64,
            listeners = listeners.len(),
            "Beginning shutdown"
        );
        self.log.emit(
            "Beginning shutdown process",
            Some(json!({
                "exitCode": exit_code,
                "timeout": timeout.as_millis() as u64,
            })),
        );

        let mut tasks = JoinSet::new();
        for listener in &listeners {
            tasks.spawn(listener());
        }

        let all_done = async {
            while let Some(result) = tasks.join_next().await {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(error = %e, "Shutdown listener failed");
                        self.log.emit(
                            "Shutdown listener failed",
                            Some(json!({ "error": e.to_string() })),
                        );
                    }
                    Err(e) => {
                        warn!(error = %e, "Shutdown listener panicked");
                        self.log.emit(
                            "Shutdown listener failed",
                            Some(json!({ "error": e.to_string() })),
                        );
                    }
                }
            }
        };

        let outcome = tokio::time::timeout(timeout, all_done).await;
        match outcome {
            Ok(()) => {
                info!(exit_code, "Shutdown complete");
            }
            Err(_) => {
                warn!(exit_code, remaining = tasks.len(), "Shutdown timed out");
                self.log.emit(
                    "Failed to shutdown within the allotted time, forcing shutdown",
                    Some(json!({ "exitCode": exit_code })),
                );
                tasks.abort_all();
            }
        }

        self.state.send_replace(ShutdownState::Terminated);
        self.exit.exit(exit_code);
    }
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("state", &self.state())
            .field("timeout", &self.shutdown_timeout())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordingExit;
    use drover_api::MemoryLog;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn coordinator() -> (Arc<ShutdownCoordinator>, Arc<RecordingExit>, MemoryLog) {
        let exit = Arc::new(RecordingExit::new());
        let memory = MemoryLog::new();
        let coordinator =
            ShutdownCoordinator::new(memory.event_log()).with_exit(exit.clone());
        (Arc::new(coordinator), exit, memory)
    }

    fn counting(counter: &Arc<AtomicUsize>) -> ShutdownListener {
        let counter = counter.clone();
        listener(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[test]
    fn default_timeout_is_thirty_seconds() {
        let (coordinator, _, _) = coordinator();
        assert_eq!(coordinator.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(coordinator.shutdown_timeout(), DEFAULT_SHUTDOWN_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn state_is_monotonic() {
        let (coordinator, exit, _) = coordinator();
        assert!(!coordinator.is_shutting_down());
        assert_eq!(coordinator.state(), ShutdownState::Running);

        coordinator.shutdown(0).await;

        assert!(coordinator.is_shutting_down());
        assert_eq!(coordinator.state(), ShutdownState::Terminated);
        assert_eq!(exit.codes(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn listeners_complete_before_timeout() {
        let (coordinator, exit, log) = coordinator();
        let counter = Arc::new(AtomicUsize::new(0));
        coordinator.add_on_shutdown(counting(&counter));
        coordinator.add_on_shutdown(counting(&counter));

        let started = tokio::time::Instant::now();
        coordinator.shutdown(3).await;

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(exit.codes(), vec![3]);
        assert!(started.elapsed() < Duration::from_millis(1));
        assert_eq!(log.count("Beginning shutdown process"), 1);
        assert_eq!(
            log.count("Failed to shutdown within the allotted time, forcing shutdown"),
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_listener_is_forced_after_timeout() {
        let (coordinator, exit, log) = coordinator();
        coordinator.set_shutdown_timeout(Duration::from_millis(500));
        coordinator.add_on_shutdown(listener(|| async {
            tokio::time::sleep(Duration::from_millis(10_000)).await;
            Ok(())
        }));

        let started = tokio::time::Instant::now();
        coordinator.shutdown(0).await;

        assert_eq!(started.elapsed(), Duration::from_millis(500));
        assert_eq!(exit.codes(), vec![0]);
        assert_eq!(
            log.count("Failed to shutdown within the allotted time, forcing shutdown"),
            1
        );
        assert!(coordinator.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn listeners_run_concurrently() {
        let (coordinator, _exit, _) = coordinator();
        for _ in 0..3 {
            coordinator.add_on_shutdown(listener(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            }));
        }

        let started = tokio::time::Instant::now();
        coordinator.shutdown(0).await;

        assert_eq!(started.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn removed_listener_never_runs() {
        let (coordinator, _exit, _) = coordinator();
        let counter = Arc::new(AtomicUsize::new(0));
        let l = counting(&counter);

        coordinator.add_on_shutdown(l.clone());
        coordinator.remove_on_shutdown(&l);
        assert_eq!(coordinator.listener_count(), 0);

        coordinator.shutdown(0).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_handles_duplicates_and_absent() {
        let (coordinator, _exit, _) = coordinator();
        let counter = Arc::new(AtomicUsize::new(0));
        let a = counting(&counter);
        let b = counting(&counter);

        coordinator.remove_on_shutdown(&a);
        coordinator.add_on_shutdown(a.clone());
        coordinator.add_on_shutdown(b.clone());
        coordinator.add_on_shutdown(a.clone());
        coordinator.remove_on_shutdown(&a);
        assert_eq!(coordinator.listener_count(), 1);

        coordinator.shutdown(0).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn second_shutdown_is_a_no_op() {
        let (coordinator, exit, log) = coordinator();
        let counter = Arc::new(AtomicUsize::new(0));
        coordinator.add_on_shutdown(counting(&counter));

        coordinator.shutdown(0).await;
        coordinator.shutdown(5).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(exit.codes(), vec![0]);
        assert_eq!(log.count("Beginning shutdown process"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_second_request_does_not_rerun() {
        let (coordinator, exit, _) = coordinator();
        let counter = Arc::new(AtomicUsize::new(0));
        let slow = counter.clone();
        coordinator.add_on_shutdown(listener(move || {
            let slow = slow.clone();
            async move {
                slow.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(())
            }
        }));

        let first = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.shutdown(0).await }
        });
        tokio::task::yield_now().await;
        assert!(coordinator.is_shutting_down());

        coordinator.shutdown(9).await;
        first.await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(exit.codes(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn late_registration_is_not_run() {
        let (coordinator, _exit, _) = coordinator();
        let counter = Arc::new(AtomicUsize::new(0));
        let late = counting(&counter);
        let registry = coordinator.clone();
        coordinator.add_on_shutdown(listener(move || {
            registry.add_on_shutdown(late.clone());
            async { Ok(()) }
        }));

        coordinator.shutdown(0).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_listener_does_not_stop_others() {
        let (coordinator, exit, log) = coordinator();
        let counter = Arc::new(AtomicUsize::new(0));
        coordinator.add_on_shutdown(listener(|| async {
            Err::<(), ListenerError>("database flush failed".into())
        }));
        let slow = counter.clone();
        coordinator.add_on_shutdown(listener(move || {
            let slow = slow.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                slow.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));

        coordinator.shutdown(2).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(exit.codes(), vec![2]);
        assert_eq!(log.count("Shutdown listener failed"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_listener_still_bounded_by_timeout() {
        let (coordinator, exit, log) = coordinator();
        coordinator.set_shutdown_timeout(Duration::from_millis(300));
        coordinator.add_on_shutdown(listener(|| async { Err::<(), ListenerError>("boom".into()) }));
        coordinator.add_on_shutdown(listener(|| async {
            std::future::pending::<()>().await;
            Ok(())
        }));

        let started = tokio::time::Instant::now();
        coordinator.shutdown(0).await;

        assert_eq!(started.elapsed(), Duration::from_millis(300));
        assert_eq!(exit.codes(), vec![0]);
        assert_eq!(
            log.count("Failed to shutdown within the allotted time, forcing shutdown"),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_change_after_start_is_ignored() {
        let (coordinator, _exit, _) = coordinator();
        coordinator.set_shutdown_timeout(Duration::from_millis(100));
        let registry = coordinator.clone();
        coordinator.add_on_shutdown(listener(move || {
            registry.set_shutdown_timeout(Duration::from_secs(60));
            async {
                std::future::pending::<()>().await;
                Ok(())
            }
        }));

        let started = tokio::time::Instant::now();
        coordinator.shutdown(0).await;
        assert_eq!(started.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn begin_event_carries_code_and_timeout() {
        let (coordinator, _exit, log) = coordinator();
        coordinator.set_shutdown_timeout(Duration::from_millis(1234));
        coordinator.shutdown(7).await;

        let (_, meta) = log
            .events()
            .into_iter()
            .find(|(m, _)| m == "Beginning shutdown process")
            .unwrap();
        assert_eq!(meta, Some(json!({ "exitCode": 7, "timeout": 1234 })));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_shutdown_resolves_on_begin() {
        let (coordinator, _exit, _) = coordinator();
        let waiter = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.wait_for_shutdown().await }
        });

        coordinator.shutdown(0).await;
        waiter.await.unwrap();
    }
}
