//! The single-occupancy, generation-tagged session slot.
//!
//! All state lives behind one mutex so that a tick's snapshot and its hold
//! registration are a single step relative to `swap`/`clear`. No renderer
//! code ever runs while the lock is held, so critical sections stay short.
//!
//! The foreground thread mutates contents; the refresh thread only reads
//! through a `TickGuard`, whose drop is the end of the tick.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use smallvec::SmallVec;

use crate::error::DisposalTimeout;
use crate::session::{SessionHandle, SessionId};

#[derive(Debug)]
struct SlotInner {
    session: Option<SessionHandle>,
    generation: u64,
    /// Ticks between `begin_tick` and guard drop.
    in_flight: usize,
    /// (generation, ticks holding a snapshot taken under it)
    holds: SmallVec<[(u64, usize); 4]>,
    /// Cleared when the scheduler stops; no tick may begin afterwards.
    ticks_open: bool,
}

impl SlotInner {
    fn holders_at_or_below(&self, generation: u64) -> usize {
        self.holds
            .iter()
            .filter(|(held, _)| *held <= generation)
            .map(|(_, count)| *count)
            .sum()
    }

    fn add_hold(&mut self, generation: u64) {
        match self.holds.iter_mut().find(|(held, _)| *held == generation) {
            Some((_, count)) => *count += 1,
            None => self.holds.push((generation, 1)),
        }
    }

    fn release_hold(&mut self, generation: u64) {
        if let Some((_, count)) = self.holds.iter_mut().find(|(held, _)| *held == generation) {
            *count = count.saturating_sub(1);
        }
        self.holds.retain(|(_, count)| *count > 0);
    }
}

/// A session read by a tick, tagged with the generation it was read under.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    session: SessionHandle,
    generation: u64,
}

impl SessionSnapshot {
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// A session removed from the slot, owed a disposal.
#[derive(Debug)]
pub struct Retired {
    pub session: SessionHandle,
    /// Generation the session occupied the slot under.
    pub generation: u64,
}

/// Point-in-time view of the slot, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotStatus {
    pub generation: u64,
    pub session_id: Option<SessionId>,
    pub in_flight: usize,
}

impl SlotStatus {
    pub fn is_empty(&self) -> bool {
        self.session_id.is_none()
    }
}

/// Holds at most one live session.
#[derive(Debug)]
pub struct SessionSlot {
    inner: Mutex<SlotInner>,
    released: Condvar,
}

impl Default for SessionSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSlot {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SlotInner {
                session: None,
                generation: 0,
                in_flight: 0,
                holds: SmallVec::new(),
                ticks_open: true,
            }),
            released: Condvar::new(),
        }
    }

    /// Current generation. Advances on every swap and clear.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn status(&self) -> SlotStatus {
        let inner = self.lock();
        SlotStatus {
            generation: inner.generation,
            session_id: inner.session.as_ref().map(|s| s.id()),
            in_flight: inner.in_flight,
        }
    }

    /// The occupant, for foreground operations on the active session.
    pub fn current(&self) -> Option<SessionHandle> {
        self.lock().session.clone()
    }

    /// Occupy an empty slot.
    ///
    /// Returns the new generation, or the current one if the slot was
    /// already occupied (in which case nothing changes).
    pub fn try_fill(&self, session: SessionHandle) -> Result<u64, u64> {
        let mut inner = self.lock();
        if inner.session.is_some() {
            return Err(inner.generation);
        }
        inner.session = Some(session);
        inner.generation += 1;
        Ok(inner.generation)
    }

    /// Replace the contents, returning the previous occupant for disposal.
    pub fn swap(&self, session: SessionHandle) -> Option<Retired> {
        self.replace(Some(session))
    }

    /// Empty the slot. Equivalent to swapping in nothing.
    pub fn clear(&self) -> Option<Retired> {
        self.replace(None)
    }

    fn replace(&self, session: Option<SessionHandle>) -> Option<Retired> {
        let mut inner = self.lock();
        let previous_generation = inner.generation;
        let previous = std::mem::replace(&mut inner.session, session);
        inner.generation += 1;
        previous.map(|session| Retired {
            session,
            generation: previous_generation,
        })
    }

    /// Start a tick. `None` once ticks have been closed.
    pub fn begin_tick(&self) -> Option<TickGuard<'_>> {
        let mut inner = self.lock();
        if !inner.ticks_open {
            return None;
        }
        inner.in_flight += 1;
        Some(TickGuard {
            slot: self,
            held: None,
        })
    }

    fn end_tick(&self, held: Option<u64>) {
        let mut inner = self.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        if let Some(generation) = held {
            inner.release_hold(generation);
        }
        drop(inner);
        self.released.notify_all();
    }

    /// Refuse all future ticks. Ticks already begun are unaffected.
    pub fn close_ticks(&self) {
        self.lock().ticks_open = false;
    }

    pub fn ticks_open(&self) -> bool {
        self.lock().ticks_open
    }

    /// Block until no tick holds a snapshot from `generation` or earlier.
    ///
    /// Returns how long the wait took, or the timeout if `grace` elapsed
    /// first.
    pub fn wait_for_release(
        &self,
        generation: u64,
        grace: Duration,
    ) -> Result<Duration, DisposalTimeout> {
        let started = Instant::now();
        let inner = self.lock();
        let (inner, _) = self
            .released
            .wait_timeout_while(inner, grace, |inner| {
                inner.holders_at_or_below(generation) > 0
            })
            .unwrap_or_else(PoisonError::into_inner);

        match inner.holders_at_or_below(generation) {
            0 => Ok(started.elapsed()),
            in_flight => Err(DisposalTimeout {
                generation,
                grace,
                in_flight,
            }),
        }
    }

    /// Block until no tick is in flight at all.
    pub fn wait_for_idle(&self, grace: Duration) -> Result<Duration, DisposalTimeout> {
        let started = Instant::now();
        let inner = self.lock();
        let (inner, _) = self
            .released
            .wait_timeout_while(inner, grace, |inner| inner.in_flight > 0)
            .unwrap_or_else(PoisonError::into_inner);

        match inner.in_flight {
            0 => Ok(started.elapsed()),
            in_flight => Err(DisposalTimeout {
                generation: inner.generation,
                grace,
                in_flight,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Bracket around one tick. Dropping it ends the tick.
#[derive(Debug)]
pub struct TickGuard<'a> {
    slot: &'a SessionSlot,
    held: Option<u64>,
}

impl TickGuard<'_> {
    /// Read the slot and hold the generation until the guard drops.
    pub fn snapshot(&mut self) -> Option<SessionSnapshot> {
        let mut inner = self.slot.lock();
        if let Some(previous) = self.held.take() {
            inner.release_hold(previous);
        }
        let session = inner.session.clone()?;
        let generation = inner.generation;
        inner.add_hold(generation);
        self.held = Some(generation);
        Some(SessionSnapshot {
            session,
            generation,
        })
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.slot.end_tick(self.held.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::session::{Renderer, Session, WorldInfo, WorldType};
    use crate::viewport::Viewport;
    use std::sync::Arc;

    struct NullRenderer;

    impl Renderer for NullRenderer {
        fn request_redraw(&self, _viewport: &Viewport) -> Result<(), RenderError> {
            Ok(())
        }

        fn dispose(&self) {}
    }

    fn session(seed: i64) -> SessionHandle {
        Arc::new(Session::new(
            WorldInfo::from_seed(seed, WorldType::Default, "test"),
            NullRenderer,
        ))
    }

    #[test]
    fn test_generation_advances_on_every_swap() {
        let slot = SessionSlot::new();
        assert_eq!(slot.generation(), 0);
        assert!(slot.status().is_empty());

        assert!(slot.swap(session(1)).is_none());
        assert_eq!(slot.generation(), 1);

        let retired = slot.swap(session(2)).unwrap();
        assert_eq!(retired.generation, 1);
        assert_eq!(retired.session.world().seed, 1);
        assert_eq!(slot.generation(), 2);

        let retired = slot.clear().unwrap();
        assert_eq!(retired.generation, 2);
        assert_eq!(slot.generation(), 3);
        assert!(slot.clear().is_none());
        assert_eq!(slot.generation(), 4);
    }

    #[test]
    fn test_try_fill_only_when_empty() {
        let slot = SessionSlot::new();
        assert_eq!(slot.try_fill(session(1)), Ok(1));
        assert_eq!(slot.try_fill(session(2)), Err(1));
        assert_eq!(slot.generation(), 1);
    }

    #[test]
    fn test_snapshot_of_empty_slot() {
        let slot = SessionSlot::new();
        let mut tick = slot.begin_tick().unwrap();
        assert!(tick.snapshot().is_none());
        assert_eq!(slot.status().in_flight, 1);
        drop(tick);
        assert_eq!(slot.status().in_flight, 0);
    }

    #[test]
    fn test_tick_guard_holds_generation_until_drop() {
        let slot = SessionSlot::new();
        let s1 = session(1);
        slot.swap(s1.clone());

        let mut tick = slot.begin_tick().unwrap();
        let snapshot = tick.snapshot().unwrap();
        assert_eq!(snapshot.generation(), 1);
        assert_eq!(snapshot.session().id(), s1.id());

        slot.swap(session(2));
        let err = slot
            .wait_for_release(1, Duration::from_millis(20))
            .unwrap_err();
        assert_eq!(err.generation, 1);
        assert_eq!(err.in_flight, 1);

        // Later generations are not held by this tick.
        assert!(slot.wait_for_release(0, Duration::from_millis(20)).is_ok());

        drop(tick);
        assert!(slot.wait_for_release(1, Duration::ZERO).is_ok());
    }

    #[test]
    fn test_wait_for_release_wakes_on_tick_end() {
        let slot = SessionSlot::new();
        slot.swap(session(1));

        std::thread::scope(|scope| {
            let (held_tx, held_rx) = crossbeam_channel::bounded(1);
            let slot = &slot;
            scope.spawn(move || {
                let mut tick = slot.begin_tick().unwrap();
                tick.snapshot();
                held_tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(30));
            });

            held_rx.recv().unwrap();
            slot.swap(session(2));
            let waited = slot.wait_for_release(1, Duration::from_secs(5)).unwrap();
            assert!(waited < Duration::from_secs(5));
        });
    }

    #[test]
    fn test_closed_slot_refuses_ticks() {
        let slot = SessionSlot::new();
        let tick = slot.begin_tick().unwrap();
        slot.close_ticks();
        assert!(!slot.ticks_open());
        assert!(slot.begin_tick().is_none());

        assert!(slot.wait_for_idle(Duration::from_millis(10)).is_err());
        drop(tick);
        assert!(slot.wait_for_idle(Duration::ZERO).is_ok());
    }

    #[test]
    fn test_resnapshot_moves_hold() {
        let slot = SessionSlot::new();
        slot.swap(session(1));
        let mut tick = slot.begin_tick().unwrap();
        tick.snapshot();
        slot.swap(session(2));
        assert_eq!(tick.snapshot().unwrap().generation(), 2);
        assert!(slot.wait_for_release(1, Duration::ZERO).is_ok());
    }
}
