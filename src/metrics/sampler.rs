use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{error, info};
use tokio::select;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use super::collector::Collector;
use super::history::HistoryStore;
use super::types::{unix_now_secs, Sample};
use crate::error::LoopError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl LoopState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LoopState::Idle,
            1 => LoopState::Running,
            2 => LoopState::Stopping,
            _ => LoopState::Stopped,
        }
    }
}

/// Background producer that appends one [`Sample`] per cycle to a
/// [`HistoryStore`].
///
/// `run_interval` is the total cycle time: the time spent collecting is
/// subtracted from the sleep that follows. Cancellation is cooperative; an
/// in-flight collection round always completes and is appended.
pub struct SamplingLoop {
    inner: Arc<SamplingLoopInner>,
    task: Mutex<Option<JoinHandle<()>>>,
    runtime_guard: Mutex<Option<Arc<tokio::runtime::Runtime>>>,
}

struct SamplingLoopInner {
    collector: Arc<Collector>,
    history: HistoryStore,
    run_interval: Duration,
    state: AtomicU8,
    ready: AtomicBool,
    notify_ready: Notify,
    cancel: CancellationToken,
}

impl SamplingLoop {
    pub fn new(collector: Arc<Collector>, history: HistoryStore, run_interval: Duration) -> Self {
        SamplingLoop {
            inner: Arc::new(SamplingLoopInner {
                collector,
                history,
                run_interval,
                state: AtomicU8::new(LoopState::Idle as u8),
                ready: AtomicBool::new(false),
                notify_ready: Notify::new(),
                cancel: CancellationToken::new(),
            }),
            task: Mutex::new(None),
            runtime_guard: Mutex::new(None),
        }
    }

    pub fn state(&self) -> LoopState {
        self.inner.state()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.inner.history
    }

    /// Idle -> Running. Spawns onto the current tokio runtime, or onto a
    /// runtime owned by the loop when called outside one.
    pub fn start(&self) -> Result<(), LoopError> {
        self.inner
            .state
            .compare_exchange(
                LoopState::Idle as u8,
                LoopState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|current| LoopError::AlreadyStarted(LoopState::from_u8(current)))?;

        let fut = SamplingLoopInner::run(Arc::clone(&self.inner));
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle.spawn(fut),
            Err(_) => {
                let runtime = match tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => Arc::new(runtime),
                    Err(err) => {
                        self.inner.state.store(LoopState::Idle as u8, Ordering::SeqCst);
                        return Err(LoopError::Runtime(err));
                    }
                };
                let handle = runtime.spawn(fut);
                if let Ok(mut slot) = self.runtime_guard.lock() {
                    *slot = Some(runtime);
                }
                handle
            }
        };
        if let Ok(mut slot) = self.task.lock() {
            *slot = Some(handle);
        }
        info!(
            "sampling loop started (interval {}s)",
            self.inner.run_interval.as_secs_f64()
        );
        Ok(())
    }

    /// Running -> Stopping. The loop observes the request at the top of its
    /// next iteration, or immediately if it is sleeping.
    pub fn stop(&self) {
        let previous = self.inner.state.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |state| {
            match LoopState::from_u8(state) {
                LoopState::Running => Some(LoopState::Stopping as u8),
                LoopState::Idle => Some(LoopState::Stopped as u8),
                _ => None,
            }
        });
        if previous == Ok(LoopState::Running as u8) {
            info!("sampling loop stop requested");
        }
        self.inner.cancel.cancel();
    }

    /// Waits for the loop task to finish. After this returns the history
    /// receives no further appends.
    pub async fn join(&self) {
        let handle = self.task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!("sampling loop task failed: {}", err);
                self.inner.state.store(LoopState::Stopped as u8, Ordering::SeqCst);
            }
        }
    }

    /// Resolves once the first sample has been appended.
    pub async fn wait_until_ready(&self) {
        let notified = self.inner.notify_ready.notified();
        if self.inner.ready.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }
}

impl SamplingLoopInner {
    fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::SeqCst))
    }

    async fn run(self: Arc<Self>) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            // Stamped when the round begins, not when collection returns.
            let started = Instant::now();
            let timestamp = unix_now_secs();
            let payload = self.collector.collect_sample().await;
            self.history.append(Sample::new(timestamp, payload)).await;
            if !self.ready.swap(true, Ordering::SeqCst) {
                self.notify_ready.notify_waiters();
            }

            let remaining = self.run_interval.saturating_sub(started.elapsed());
            select! {
                _ = self.cancel.cancelled() => {
                    break;
                }
                _ = sleep(remaining) => {}
            }
        }
        self.state.store(LoopState::Stopped as u8, Ordering::SeqCst);
        info!("sampling loop stopped");
    }
}

impl Drop for SamplingLoop {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}
