//! Background writer that drains audit events into the history store.
//!
//! Runs on its own thread so file I/O never happens on the foreground
//! thread. It blocks on the channel, writes whatever has queued up in one
//! batch, flushes, and exits once every emitter has been dropped.

use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use super::emitter::AuditReceiver;
use super::store::{AppendOutcome, HistoryStore};

/// Drains the audit channel into a `HistoryStore`.
pub struct AuditWriter {
    receiver: AuditReceiver,
    store: HistoryStore,
    batch_size: usize,
}

impl AuditWriter {
    /// Create a writer with the default batch size (100 events).
    pub fn new(receiver: AuditReceiver, store: HistoryStore) -> Self {
        Self::with_batch_size(receiver, store, 100)
    }

    pub fn with_batch_size(receiver: AuditReceiver, store: HistoryStore, batch_size: usize) -> Self {
        Self {
            receiver,
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Run until every emitter is dropped. Returns the number of events
    /// written.
    pub fn run(mut self) -> u64 {
        info!(
            path = %self.store.path().display(),
            batch_size = self.batch_size,
            "Audit writer started"
        );

        let mut written = 0u64;
        while let Some(first) = self.receiver.recv() {
            let mut batch = vec![first];
            batch.extend(self.receiver.try_recv_batch(self.batch_size - 1));
            written += self.write_batch(&batch);

            if let Err(e) = self.store.flush() {
                warn!(error = %e, "History flush failed (non-fatal)");
            }
        }

        info!(written, "Audit writer exited");
        written
    }

    fn write_batch(&mut self, batch: &[super::AuditEvent]) -> u64 {
        let mut written = 0;
        for event in batch {
            match self.store.append(event) {
                Ok(AppendOutcome::Written) => written += 1,
                Ok(AppendOutcome::Skipped) => {}
                Err(e) => {
                    // Continue - one bad write must not stop the writer
                    warn!(
                        error = %e,
                        event_type = event.payload.event_type_str(),
                        "History write failed (non-fatal)"
                    );
                }
            }
        }
        if written > 0 {
            debug!(events = written, "Wrote audit events");
        }
        written
    }
}

/// Spawn the writer on a named thread.
pub fn spawn_audit_writer(
    receiver: AuditReceiver,
    store: HistoryStore,
) -> std::io::Result<JoinHandle<u64>> {
    std::thread::Builder::new()
        .name("mapview-audit".to_string())
        .spawn(move || AuditWriter::new(receiver, store).run())
}
