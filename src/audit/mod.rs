//! Audit trail for session lifecycle events.
//!
//! The coordinator records notable events (session opened, session
//! disposed, grace period exceeded) through a non-blocking emitter. A
//! background writer appends them to the history file, one JSON line each.
//!
//! ```text
//! LifecycleCoordinator ──emit()──► bounded channel ──► AuditWriter ──► history.jsonl
//!      (never blocks)                                  (own thread)
//! ```

pub mod emitter;
pub mod store;
pub mod types;
pub mod writer;

pub use emitter::{AuditEmitter, AuditReceiver, EmitterStats, SharedAuditEmitter};
pub use store::{AppendOutcome, HistoryStore, HistoryStoreError, DEFAULT_HISTORY_FILE};
pub use types::{AuditEvent, AuditPayload};
pub use writer::{spawn_audit_writer, AuditWriter};
