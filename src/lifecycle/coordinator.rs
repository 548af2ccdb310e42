//! Foreground-facing lifecycle API.
//!
//! The coordinator is the only writer of the slot. Every method that
//! changes what the slot holds takes `&mut self`, so the single-writer rule
//! is enforced by the borrow checker rather than by convention.
//!
//! Disposal of a removed session is two-phase: the session is marked
//! `Disposing` the moment it leaves the slot, then the coordinator waits
//! (bounded by the grace period) for ticks still holding its generation
//! before releasing the renderer. When the grace period runs out, disposal
//! goes ahead and the overrun is logged and audited.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::scheduler::{RefreshScheduler, SchedulerStats};
use super::slot::{Retired, SessionSlot, SlotStatus};
use crate::audit::{AuditEvent, SharedAuditEmitter};
use crate::config::RefreshConfig;
use crate::coordinates::ensure_png_extension;
use crate::error::{DisposalTimeout, LifecycleError};
use crate::session::{Session, SessionHandle};
use crate::viewport::{ScreenPoint, WorldPoint};

/// Owns the session slot and the refresh scheduler.
pub struct LifecycleCoordinator {
    slot: Arc<SessionSlot>,
    scheduler: RefreshScheduler,
    grace: Duration,
    audit: Option<SharedAuditEmitter>,
    shut_down: bool,
}

impl LifecycleCoordinator {
    /// Create the slot and start refreshing it.
    pub fn start(
        config: &RefreshConfig,
        audit: Option<SharedAuditEmitter>,
    ) -> Result<Self, LifecycleError> {
        let slot = Arc::new(SessionSlot::new());
        let scheduler = RefreshScheduler::start(slot.clone(), config.period())?;
        let grace = config.grace_period();

        info!(
            period_ms = config.period_ms,
            grace_ms = grace.as_millis() as u64,
            audit = audit.is_some(),
            "Lifecycle coordinator started"
        );

        Ok(Self {
            slot,
            scheduler,
            grace,
            audit,
            shut_down: false,
        })
    }

    pub fn grace_period(&self) -> Duration {
        self.grace
    }

    pub fn status(&self) -> SlotStatus {
        self.slot.status()
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// The active session, if any.
    pub fn active(&self) -> Option<SessionHandle> {
        self.slot.current()
    }

    /// Place a session in an empty slot.
    ///
    /// Fails with `AlreadyActive` if a session is present; the rejected
    /// session never became active and is disposed here.
    pub fn open(&mut self, session: Session) -> Result<SessionHandle, LifecycleError> {
        self.ensure_running()?;

        let occupied = self.slot.status();
        if !occupied.is_empty() {
            return Err(self.reject(session, occupied.generation));
        }

        let handle = Arc::new(session);
        handle.activate();
        match self.slot.try_fill(handle.clone()) {
            Ok(generation) => {
                self.opened(&handle, generation);
                Ok(handle)
            }
            Err(generation) => {
                handle.begin_disposal();
                handle.dispose();
                Err(LifecycleError::AlreadyActive { generation })
            }
        }
    }

    /// Replace whatever is active with a new session.
    ///
    /// Returns once the previous session (if any) has been disposed, which
    /// takes at most the grace period.
    pub fn switch_to(&mut self, session: Session) -> Result<SessionHandle, LifecycleError> {
        self.ensure_running()?;

        let handle = Arc::new(session);
        handle.activate();
        let retired = self.slot.swap(handle.clone());
        self.opened(&handle, self.slot.generation());

        if let Some(retired) = retired {
            retired.session.begin_disposal();
            let wait = self.slot.wait_for_release(retired.generation, self.grace);
            self.finish_disposal(retired, wait);
        }

        Ok(handle)
    }

    /// Stop refreshing, dispose the active session and release the
    /// refresh thread.
    ///
    /// A second call does nothing and reports `NoActiveSession`.
    pub fn shutdown(&mut self) -> Result<(), LifecycleError> {
        if self.shut_down {
            debug!("Shutdown already completed");
            return Err(LifecycleError::NoActiveSession);
        }
        self.shut_down = true;

        self.scheduler.stop();
        // Nothing else moves the generation while we hold `&mut self`, so
        // an overrun here is reported against the generation cleared below.
        let idle = self.slot.wait_for_idle(self.grace);

        match self.slot.clear() {
            Some(retired) => {
                retired.session.begin_disposal();
                self.finish_disposal(retired, idle);
            }
            None => {
                if let Err(timeout) = idle {
                    self.grace_exceeded(None, &timeout);
                }
            }
        }

        self.scheduler.join(self.grace);
        info!(
            generation = self.slot.generation(),
            stats = ?self.scheduler.stats(),
            "Lifecycle coordinator shut down"
        );
        Ok(())
    }

    /// Move the active session's viewport to world coordinates.
    pub fn center_on(&self, point: WorldPoint) -> Result<(), LifecycleError> {
        let session = self.require_active()?;
        session.center_on(point);
        debug!(x = point.x, y = point.y, "Centered on coordinates");
        Ok(())
    }

    /// Drag the active session's map by a screen-space delta.
    pub fn pan(&self, delta: ScreenPoint) -> Result<(), LifecycleError> {
        self.require_active()?.pan(delta);
        Ok(())
    }

    /// Zoom the active session around a screen point.
    pub fn adjust_zoom(&self, anchor: ScreenPoint, notches: i32) -> Result<(), LifecycleError> {
        self.require_active()?.adjust_zoom(anchor, notches);
        Ok(())
    }

    /// Write the active session's current frame as a PNG.
    ///
    /// Returns the path actually written, with `.png` appended if needed.
    pub fn capture(&self, path: &Path) -> Result<PathBuf, LifecycleError> {
        let session = self.require_active()?;
        let path = ensure_png_extension(path);
        session.capture(&path)?;
        info!(path = %path.display(), session_id = %session.id(), "Captured map image");
        Ok(path)
    }

    /// Regenerate the active session's layers. Does nothing when empty.
    pub fn repaint_layers(&self) {
        if let Some(session) = self.slot.current() {
            session.repaint_layers();
        }
    }

    fn ensure_running(&self) -> Result<(), LifecycleError> {
        if self.shut_down {
            return Err(LifecycleError::ShutDown);
        }
        Ok(())
    }

    fn require_active(&self) -> Result<SessionHandle, LifecycleError> {
        self.slot.current().ok_or(LifecycleError::NoActiveSession)
    }

    fn reject(&self, session: Session, generation: u64) -> LifecycleError {
        debug!(
            generation,
            session_id = %session.id(),
            "Rejected open while a session is active"
        );
        session.begin_disposal();
        session.dispose();
        LifecycleError::AlreadyActive { generation }
    }

    fn opened(&self, session: &SessionHandle, generation: u64) {
        info!(
            generation,
            session_id = %session.id(),
            seed = session.world().seed,
            world_type = %session.world().world_type,
            "Session opened"
        );
        self.emit(AuditEvent::session_opened(
            session.id(),
            generation,
            session.world().clone(),
        ));
    }

    fn finish_disposal(&self, retired: Retired, wait: Result<Duration, DisposalTimeout>) {
        let Retired {
            session,
            generation,
        } = retired;

        let (waited, forced) = match wait {
            Ok(waited) => (waited, false),
            Err(timeout) => {
                self.grace_exceeded(Some(&session), &timeout);
                (timeout.grace, true)
            }
        };

        session.dispose();
        let waited_ms = waited.as_millis() as u64;
        info!(
            generation,
            session_id = %session.id(),
            waited_ms,
            forced,
            "Session disposed"
        );
        self.emit(AuditEvent::session_disposed(
            session.id(),
            generation,
            waited_ms,
            forced,
        ));
    }

    fn grace_exceeded(&self, session: Option<&SessionHandle>, timeout: &DisposalTimeout) {
        warn!(
            error = %timeout,
            session_id = ?session.map(|s| s.id()),
            "Disposing with a tick still in flight"
        );
        self.emit(AuditEvent::grace_period_exceeded(
            session.map(|s| s.id()),
            timeout,
        ));
    }

    fn emit(&self, event: AuditEvent) {
        if let Some(audit) = &self.audit {
            audit.emit(event);
        }
    }
}

impl Drop for LifecycleCoordinator {
    fn drop(&mut self) {
        if !self.shut_down {
            let _ = self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditEmitter, AuditPayload};
    use crate::error::RenderError;
    use crate::session::{Renderer, SessionState, WorldInfo, WorldType};
    use crate::viewport::Viewport;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRenderer {
        captured: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl Renderer for RecordingRenderer {
        fn request_redraw(&self, _viewport: &Viewport) -> Result<(), RenderError> {
            Ok(())
        }

        fn dispose(&self) {}

        fn capture(&self, path: &Path, _viewport: &Viewport) -> Result<(), RenderError> {
            self.captured.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    fn session(seed: i64) -> Session {
        Session::new(
            WorldInfo::from_seed(seed, WorldType::Default, "test"),
            RecordingRenderer::default(),
        )
    }

    fn coordinator() -> LifecycleCoordinator {
        LifecycleCoordinator::start(&RefreshConfig::default(), None).unwrap()
    }

    #[test]
    fn test_open_twice_is_rejected() {
        let mut coordinator = coordinator();
        let first = coordinator.open(session(1)).unwrap();
        assert_eq!(first.state(), SessionState::Active);

        let err = coordinator.open(session(2)).unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadyActive { generation: 1 }));
        assert_eq!(coordinator.status().session_id, Some(first.id()));
        assert_eq!(coordinator.status().generation, 1);

        coordinator.shutdown().unwrap();
    }

    #[test]
    fn test_zero_period_fails_to_start() {
        let config = RefreshConfig {
            period_ms: 0,
            ..RefreshConfig::default()
        };
        let err = LifecycleCoordinator::start(&config, None)
            .err()
            .expect("zero period should be refused");
        assert!(matches!(
            err,
            LifecycleError::Scheduler(ref e) if e.kind() == std::io::ErrorKind::InvalidInput
        ));
    }

    #[test]
    fn test_switch_on_empty_slot_opens() {
        let mut coordinator = coordinator();
        let handle = coordinator.switch_to(session(1)).unwrap();
        assert_eq!(coordinator.status().generation, 1);
        assert_eq!(coordinator.active().unwrap().id(), handle.id());
        coordinator.shutdown().unwrap();
        assert_eq!(handle.state(), SessionState::Disposed);
    }

    #[test]
    fn test_operations_after_shutdown() {
        let mut coordinator = coordinator();
        coordinator.shutdown().unwrap();

        assert!(matches!(
            coordinator.shutdown(),
            Err(LifecycleError::NoActiveSession)
        ));
        assert!(matches!(
            coordinator.open(session(1)),
            Err(LifecycleError::ShutDown)
        ));
        assert!(matches!(
            coordinator.switch_to(session(2)),
            Err(LifecycleError::ShutDown)
        ));
        assert!(coordinator.is_shut_down());
    }

    #[test]
    fn test_viewport_operations_need_a_session() {
        let mut coordinator = coordinator();
        assert!(matches!(
            coordinator.center_on(WorldPoint::new(1, 2)),
            Err(LifecycleError::NoActiveSession)
        ));
        assert!(matches!(
            coordinator.pan(ScreenPoint::new(4.0, 4.0)),
            Err(LifecycleError::NoActiveSession)
        ));
        assert!(matches!(
            coordinator.adjust_zoom(ScreenPoint::default(), 1),
            Err(LifecycleError::NoActiveSession)
        ));
        assert!(matches!(
            coordinator.capture(Path::new("shot")),
            Err(LifecycleError::NoActiveSession)
        ));
        coordinator.repaint_layers();

        let handle = coordinator.open(session(1)).unwrap();
        coordinator.center_on(WorldPoint::new(100, -50)).unwrap();
        coordinator.pan(ScreenPoint::new(30.0, -20.0)).unwrap();
        let viewport = handle.viewport();
        assert_eq!(viewport.movement.center_x, 100.0 - 30.0 / viewport.zoom.scale);
        assert_eq!(viewport.movement.center_y, -50.0 + 20.0 / viewport.zoom.scale);

        coordinator.center_on(WorldPoint::new(100, -50)).unwrap();
        coordinator
            .adjust_zoom(ScreenPoint::new(10.0, 10.0), -1)
            .unwrap();
        let viewport = handle.viewport();
        assert_eq!(viewport.zoom.level, -1);
        assert_eq!(viewport.movement.center_y, -50.0);

        coordinator.shutdown().unwrap();
    }

    #[test]
    fn test_capture_appends_png_extension() {
        let renderer = RecordingRenderer::default();
        let captured = renderer.captured.clone();
        let mut coordinator = coordinator();
        coordinator
            .open(Session::new(
                WorldInfo::from_seed(9, WorldType::Default, "test"),
                renderer,
            ))
            .unwrap();

        let written = coordinator.capture(Path::new("/tmp/world")).unwrap();
        assert_eq!(written, PathBuf::from("/tmp/world.png"));
        assert_eq!(*captured.lock().unwrap(), vec![written]);

        coordinator.shutdown().unwrap();
    }

    #[test]
    fn test_audit_events_for_open_and_dispose() {
        let (emitter, receiver) = AuditEmitter::new(16);
        let mut coordinator =
            LifecycleCoordinator::start(&RefreshConfig::default(), Some(Arc::new(emitter)))
                .unwrap();

        coordinator.open(session(1)).unwrap();
        coordinator.switch_to(session(2)).unwrap();
        coordinator.shutdown().unwrap();

        let kinds: Vec<&'static str> = receiver
            .try_recv_batch(16)
            .iter()
            .map(|event| event.payload.event_type_str())
            .collect();
        assert_eq!(
            kinds,
            vec![
                "session_opened",
                "session_opened",
                "session_disposed",
                "session_disposed"
            ]
        );
    }

    #[test]
    fn test_drop_shuts_down() {
        let (emitter, receiver) = AuditEmitter::new(16);
        {
            let mut coordinator =
                LifecycleCoordinator::start(&RefreshConfig::default(), Some(Arc::new(emitter)))
                    .unwrap();
            coordinator.open(session(1)).unwrap();
        }
        let events = receiver.try_recv_batch(16);
        assert!(matches!(
            events.last().map(|e| &e.payload),
            Some(AuditPayload::SessionDisposed {
                generation: 1,
                forced: false,
                ..
            })
        ));
    }
}
