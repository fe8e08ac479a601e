use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{ChaosError, ChaosResult};
use crate::progress::WaitProgress;
use crate::shutdown::ShutdownHandle;

/// Source of wall clock time and blocking waits for an experiment.
pub trait Clock: Send + Sync {
    /// Current UTC time in whole seconds since the Unix epoch.
    fn now_epoch(&self) -> i64;

    /// Block the calling thread for `duration`.
    ///
    /// Returns [ChaosError::Cancelled] if the wait was interrupted.
    fn sleep(&self, duration: Duration) -> ChaosResult<()>;
}

/// The real clock. Waits block on a Tokio runtime and race a cancellation listener.
#[derive(Debug)]
pub struct SystemClock {
    runtime: tokio::runtime::Runtime,
    shutdown_handle: ShutdownHandle,
    show_progress: bool,
}

impl SystemClock {
    pub fn new(shutdown_handle: ShutdownHandle) -> ChaosResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("chaos-clock")
            .enable_all()
            .build()?;

        Ok(Self {
            runtime,
            shutdown_handle,
            show_progress: false,
        })
    }

    /// Show a progress bar on stderr while waiting.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Request cancellation of waits when the process receives Ctrl-C.
    pub fn listen_for_ctrl_c(&self) {
        let handle = self.shutdown_handle.clone();
        self.runtime.spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    log::warn!("Received Ctrl-C, cancelling the current wait and cleaning up");
                    handle.shutdown();
                }
                Err(e) => log::error!("Failed to listen for Ctrl-C: {e}"),
            }
        });
    }
}

impl Clock for SystemClock {
    fn now_epoch(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn sleep(&self, duration: Duration) -> ChaosResult<()> {
        let mut listener = self.shutdown_handle.new_listener();
        if listener.is_cancelled() {
            return Err(ChaosError::Cancelled);
        }

        let progress = self.show_progress.then(|| WaitProgress::start(duration));
        let started = Instant::now();
        let outcome = self.runtime.block_on(async {
            let deadline = tokio::time::sleep(duration);
            tokio::pin!(deadline);
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = &mut deadline => break Ok(()),
                    _ = listener.cancelled() => break Err(ChaosError::Cancelled),
                    _ = ticker.tick() => {
                        if let Some(progress) = &progress {
                            progress.update(started.elapsed());
                        }
                    }
                }
            }
        });

        if let Some(progress) = progress {
            progress.finish();
        }
        outcome
    }
}

/// A clock that never blocks. Sleeping advances its time instantly.
///
/// Used for dry runs and tests. Every requested sleep is remembered so callers can check the
/// schedule that would have been followed.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

#[derive(Debug)]
struct ManualState {
    now: i64,
    sleeps: Vec<Duration>,
    cancel_at_sleep: Option<usize>,
}

impl ManualClock {
    pub fn starting_at(epoch: i64) -> Self {
        Self {
            state: Mutex::new(ManualState {
                now: epoch,
                sleeps: Vec::new(),
                cancel_at_sleep: None,
            }),
        }
    }

    /// Start at the current wall clock time.
    pub fn from_now() -> Self {
        Self::starting_at(chrono::Utc::now().timestamp())
    }

    /// Make the sleep with the given zero-based index fail with [ChaosError::Cancelled].
    pub fn cancel_at_sleep(self, index: usize) -> Self {
        self.state.lock().cancel_at_sleep = Some(index);
        self
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }
}

impl Clock for ManualClock {
    fn now_epoch(&self) -> i64 {
        self.state.lock().now
    }

    fn sleep(&self, duration: Duration) -> ChaosResult<()> {
        let mut state = self.state.lock();
        let index = state.sleeps.len();
        state.sleeps.push(duration);
        if state.cancel_at_sleep == Some(index) {
            return Err(ChaosError::Cancelled);
        }
        state.now += duration.as_secs() as i64;
        Ok(())
    }
}
