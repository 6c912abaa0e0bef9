//! Worker runtime
//!
//! Cooperative stop signal, supervised worker handles and the periodic task
//! abstraction shared by the capture loop and the level monitor.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Default bound on how long shutdown waits for a worker
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Cooperative stop flag
///
/// Clones share the same flag; once stopped it stays stopped.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// Create a signal in the running state
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Request stop
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    /// Check if stop was requested
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once stop is requested
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as `self`, so this cannot fail while awaited.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// How a worker ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Returned normally
    Completed,
    /// Panicked; the panic was captured and logged
    Panicked,
    /// Aborted by the runtime
    Cancelled,
    /// Did not exit within the join timeout and was left detached
    TimedOut,
}

/// Supervised worker task
///
/// Joined with a bounded timeout; panics are captured rather than lost.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    stop: StopSignal,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// Spawn `future` on the runtime as a named worker
    pub fn spawn<F>(name: impl Into<String>, stop: StopSignal, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        debug!(worker = %name, "spawning worker");
        Self {
            name,
            stop,
            handle: tokio::spawn(future),
        }
    }

    /// Worker name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the task has finished
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal stop, then join
    pub async fn shutdown(self, timeout: Duration) -> WorkerExit {
        self.stop.stop();
        self.join(timeout).await
    }

    /// Wait for the worker to exit, at most `timeout`
    pub async fn join(self, timeout: Duration) -> WorkerExit {
        let name = self.name;
        match tokio::time::timeout(timeout, self.handle).await {
            Ok(Ok(())) => {
                debug!(worker = %name, "worker exited");
                WorkerExit::Completed
            }
            Ok(Err(e)) if e.is_panic() => {
                error!(worker = %name, "worker panicked");
                WorkerExit::Panicked
            }
            Ok(Err(_)) => {
                warn!(worker = %name, "worker cancelled");
                WorkerExit::Cancelled
            }
            Err(_) => {
                warn!(
                    worker = %name,
                    timeout_ms = timeout.as_millis() as u64,
                    "worker did not exit in time"
                );
                WorkerExit::TimedOut
            }
        }
    }
}

/// What a periodic task wants after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Run again after the regular period
    Continue,
    /// Run again after the given delay
    Delay(Duration),
    /// Exit the loop
    Stop,
}

/// Timer-driven unit of work
///
/// Independent of any UI loop: `spawn_periodic` drives it on the runtime.
#[trait_variant::make(PeriodicTask: Send)]
pub trait LocalPeriodicTask {
    /// Task name (used for logging)
    fn name(&self) -> &str;

    /// Regular interval between ticks
    fn period(&self) -> Duration;

    /// Run one tick
    async fn tick(&mut self) -> TickOutcome;
}

/// Drive `task` until it returns `Stop` or `stop` is signalled
pub fn spawn_periodic<T>(mut task: T, stop: StopSignal) -> WorkerHandle
where
    T: PeriodicTask + 'static,
{
    let name = task.name().to_string();
    let signal = stop.clone();
    WorkerHandle::spawn(name.clone(), stop, async move {
        while !signal.is_stopped() {
            let wait = match task.tick().await {
                TickOutcome::Continue => task.period(),
                TickOutcome::Delay(delay) => delay,
                TickOutcome::Stop => break,
            };
            tokio::select! {
                _ = signal.stopped() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        debug!(task = %name, "periodic task finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingTask {
        ticks: Arc<AtomicU32>,
        stop_after: u32,
    }

    impl PeriodicTask for CountingTask {
        fn name(&self) -> &str {
            "counting"
        }

        fn period(&self) -> Duration {
            Duration::from_millis(1)
        }

        async fn tick(&mut self) -> TickOutcome {
            let n = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.stop_after {
                TickOutcome::Stop
            } else {
                TickOutcome::Continue
            }
        }
    }

    #[tokio::test]
    async fn stop_signal_wakes_waiters() {
        let stop = StopSignal::new();
        assert!(!stop.is_stopped());

        let waiter = stop.clone();
        let task = tokio::spawn(async move { waiter.stopped().await });
        stop.stop();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(stop.is_stopped());
    }

    #[tokio::test]
    async fn periodic_task_runs_until_stop_outcome() {
        let ticks = Arc::new(AtomicU32::new(0));
        let task = CountingTask {
            ticks: ticks.clone(),
            stop_after: 3,
        };
        let handle = spawn_periodic(task, StopSignal::new());

        assert_eq!(handle.join(Duration::from_secs(1)).await, WorkerExit::Completed);
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn shutdown_interrupts_long_period() {
        struct Slow;
        impl PeriodicTask for Slow {
            fn name(&self) -> &str {
                "slow"
            }
            fn period(&self) -> Duration {
                Duration::from_secs(3600)
            }
            async fn tick(&mut self) -> TickOutcome {
                TickOutcome::Continue
            }
        }

        let handle = spawn_periodic(Slow, StopSignal::new());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            handle.shutdown(Duration::from_secs(1)).await,
            WorkerExit::Completed
        );
    }

    #[tokio::test]
    async fn join_reports_panic() {
        let handle = WorkerHandle::spawn("boom", StopSignal::new(), async {
            panic!("worker failure");
        });
        assert_eq!(handle.join(Duration::from_secs(1)).await, WorkerExit::Panicked);
    }

    #[tokio::test]
    async fn join_times_out_without_aborting() {
        let handle = WorkerHandle::spawn("stuck", StopSignal::new(), async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        assert_eq!(
            handle.join(Duration::from_millis(20)).await,
            WorkerExit::TimedOut
        );
    }
}
