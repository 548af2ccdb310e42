//! Non-blocking audit emitter.
//!
//! The coordinator emits audit events from the foreground thread while it
//! is in the middle of lifecycle transitions, so `emit()` must:
//!
//! - Never block (uses `try_send`, not `send`)
//! - Never fail (returns `()`, drops are counted)
//!
//! If the buffer is full or the writer has gone away, the event is dropped,
//! the drop counter is incremented and a warning is logged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::warn;

use super::types::AuditEvent;

/// Bounded, non-blocking audit event sender.
pub struct AuditEmitter {
    sender: Sender<AuditEvent>,

    // Stats (atomic, no locks)
    events_emitted: AtomicU64,
    events_dropped: AtomicU64,
}

impl AuditEmitter {
    /// Create a new emitter with the given buffer size.
    ///
    /// Returns the emitter and a receiver for the writer.
    pub fn new(buffer_size: usize) -> (Self, AuditReceiver) {
        let (sender, receiver) = bounded(buffer_size);

        let emitter = Self {
            sender,
            events_emitted: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
        };

        (emitter, AuditReceiver { receiver })
    }

    /// Emit an event - never blocks, never fails.
    pub fn emit(&self, event: AuditEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {
                self.events_emitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(event)) => {
                self.events_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    event_type = event.payload.event_type_str(),
                    "Audit buffer full, event dropped"
                );
            }
            Err(TrySendError::Disconnected(event)) => {
                self.events_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    event_type = event.payload.event_type_str(),
                    "Audit writer gone, event dropped"
                );
            }
        }
    }

    /// Get current stats.
    pub fn stats(&self) -> EmitterStats {
        EmitterStats {
            emitted: self.events_emitted.load(Ordering::Relaxed),
            dropped: self.events_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Emitter statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitterStats {
    /// Events accepted by the channel
    pub emitted: u64,
    /// Events dropped (buffer full or writer disconnected)
    pub dropped: u64,
}

/// Receiving end, held by the writer (or a test).
#[derive(Clone)]
pub struct AuditReceiver {
    receiver: Receiver<AuditEvent>,
}

impl AuditReceiver {
    /// Blocking receive. `None` once every emitter is dropped and the
    /// channel is drained.
    pub fn recv(&self) -> Option<AuditEvent> {
        self.receiver.recv().ok()
    }

    /// Try to receive without blocking.
    pub fn try_recv(&self) -> Option<AuditEvent> {
        self.receiver.try_recv().ok()
    }

    /// Receive up to `max` already-queued events without blocking.
    pub fn try_recv_batch(&self, max: usize) -> Vec<AuditEvent> {
        let mut batch = Vec::with_capacity(max.min(64));
        while batch.len() < max {
            match self.receiver.try_recv() {
                Ok(event) => batch.push(event),
                Err(_) => break,
            }
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// Shared emitter handle for use across threads.
pub type SharedAuditEmitter = Arc<AuditEmitter>;
