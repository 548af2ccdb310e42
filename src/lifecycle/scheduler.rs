//! Periodic refresh of the active session.
//!
//! The scheduler runs on its own named thread, driving a current-thread
//! tokio runtime with a fixed-period interval. Every tick brackets itself
//! on the slot, takes a snapshot and, if a session is present, asks its
//! renderer for a redraw. It never changes what the slot holds.
//!
//! Key properties:
//! - A failing or panicking tick is logged and counted; the loop continues
//! - Stopping is cooperative: a tick already running finishes
//! - After `stop()` returns no new tick begins (the slot's tick gate is shut)

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use super::slot::{SessionSlot, TickGuard};
use crate::error::{RenderError, TickFailure};

/// Tick counters (for monitoring and tests).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Ticks that began.
    pub ticks: u64,
    /// Ticks that found a session and had its redraw accepted.
    pub redraws: u64,
    /// Ticks that failed or panicked.
    pub failures: u64,
}

#[derive(Debug, Default)]
struct TickCounters {
    ticks: AtomicU64,
    redraws: AtomicU64,
    failures: AtomicU64,
}

impl TickCounters {
    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            redraws: self.redraws.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Background task that repaints the active session at a fixed cadence.
pub struct RefreshScheduler {
    slot: Arc<SessionSlot>,
    period: Duration,
    stop_tx: watch::Sender<bool>,
    /// Disconnects when the refresh thread exits.
    finished_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
    counters: Arc<TickCounters>,
}

impl RefreshScheduler {
    /// Spawn the refresh thread. The first tick fires one period from now.
    ///
    /// A zero period is refused with `InvalidInput` before any thread is
    /// spawned.
    pub fn start(slot: Arc<SessionSlot>, period: Duration) -> std::io::Result<Self> {
        if period.is_zero() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "refresh period must be greater than zero",
            ));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let (stop_tx, stop_rx) = watch::channel(false);
        let (finished_tx, finished_rx) = bounded::<()>(1);
        let counters = Arc::new(TickCounters::default());

        let handle = std::thread::Builder::new()
            .name("mapview-refresh".to_string())
            .spawn({
                let slot = slot.clone();
                let counters = counters.clone();
                move || {
                    // Dropped on exit, including unwinding.
                    let _finished = finished_tx;
                    runtime.block_on(refresh_loop(slot, period, stop_rx, counters));
                }
            })?;

        info!(
            period_ms = period.as_millis() as u64,
            "Refresh scheduler started"
        );

        Ok(Self {
            slot,
            period,
            stop_tx,
            finished_rx,
            handle: Some(handle),
            counters,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stats(&self) -> SchedulerStats {
        self.counters.snapshot()
    }

    pub fn is_stopped(&self) -> bool {
        !self.slot.ticks_open()
    }

    /// Prevent any further tick from beginning.
    ///
    /// Does not wait for a tick already in progress; see
    /// `SessionSlot::wait_for_idle`.
    pub fn stop(&self) {
        self.slot.close_ticks();
        // Err only means the loop has already exited.
        let _ = self.stop_tx.send(true);
        debug!("Refresh scheduler stop requested");
    }

    /// Release the refresh thread, waiting at most `timeout` for it.
    ///
    /// Returns false if the thread was still busy and has been detached.
    pub fn join(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };

        match self.finished_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Refresh thread still busy, detaching"
                );
                false
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    error!("Refresh thread panicked");
                }
                info!(stats = ?self.stats(), "Refresh scheduler stopped");
                true
            }
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
            self.join(self.period);
        }
    }
}

async fn refresh_loop(
    slot: Arc<SessionSlot>,
    period: Duration,
    mut stop_rx: watch::Receiver<bool>,
    counters: Arc<TickCounters>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the first immediate tick
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if !run_tick(&slot, &counters) {
                    break;
                }
            }
        }
    }

    debug!("Refresh loop exited");
}

/// Run one tick. Returns false if the slot no longer accepts ticks.
fn run_tick(slot: &SessionSlot, counters: &TickCounters) -> bool {
    let Some(mut tick) = slot.begin_tick() else {
        return false;
    };
    counters.ticks.fetch_add(1, Ordering::Relaxed);

    let failure = match panic::catch_unwind(AssertUnwindSafe(|| redraw(&mut tick))) {
        Ok(Ok(true)) => {
            counters.redraws.fetch_add(1, Ordering::Relaxed);
            None
        }
        Ok(Ok(false)) => None,
        Ok(Err(failure)) => Some(failure),
        Err(payload) => Some(TickFailure::Panicked(panic_message(payload.as_ref()))),
    };
    // End the tick before logging.
    drop(tick);

    if let Some(failure) = failure {
        counters.failures.fetch_add(1, Ordering::Relaxed);
        match failure {
            TickFailure::Panicked(_) => error!(error = %failure, "Tick panicked (non-fatal)"),
            TickFailure::Redraw { .. } => warn!(error = %failure, "Tick failed (non-fatal)"),
        }
    }
    true
}

fn redraw(tick: &mut TickGuard<'_>) -> Result<bool, TickFailure> {
    let Some(snapshot) = tick.snapshot() else {
        return Ok(false);
    };
    let generation = snapshot.generation();

    match snapshot.session().request_redraw() {
        Ok(()) => {
            trace!(generation, "Redraw requested");
            Ok(true)
        }
        Err(RenderError::Disposed(session_id)) => {
            debug!(generation, %session_id, "Skipped redraw of disposed session");
            Ok(false)
        }
        Err(source) => Err(TickFailure::Redraw { generation, source }),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
