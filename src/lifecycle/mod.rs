//! Session lifecycle: the slot, the refresh scheduler and the coordinator.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐          ┌──────────────────────────┐
//! │  LifecycleCoordinator    │          │  RefreshScheduler        │
//! │  (foreground, &mut self) │          │  (mapview-refresh thread)│
//! │  open / switch_to /      │          │  every period:           │
//! │  shutdown                │          │  begin_tick → snapshot → │
//! └────────────┬─────────────┘          │  request_redraw → end    │
//!              │ swap / clear           └────────────┬─────────────┘
//!              ▼                                     │ read-only
//! ┌─────────────────────────────────────────────────┴───────────────┐
//! │  SessionSlot: Option<Session>, generation, in-flight ticks,     │
//! │  per-generation holds, tick gate                                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A session removed at generation G is only disposed after every tick
//! holding a G snapshot has ended, or after the grace period elapses.

pub mod coordinator;
pub mod scheduler;
pub mod slot;

pub use coordinator::LifecycleCoordinator;
pub use scheduler::{RefreshScheduler, SchedulerStats};
pub use slot::{Retired, SessionSlot, SessionSnapshot, SlotStatus, TickGuard};
