//! A session is one open world in the viewer window.
//!
//! It owns the renderer for that world plus the viewport state the user
//! moves around with. Sessions are created by the caller, handed to the
//! lifecycle coordinator, and disposed exactly once by it.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RenderError;
use crate::viewport::{ScreenPoint, Viewport, WorldPoint};

/// Session identifier.
pub type SessionId = Uuid;

/// Shared handle to a session.
///
/// The slot holds one, each tick borrows one for its duration, and the
/// coordinator returns one to callers of `open`/`switch_to`.
pub type SessionHandle = Arc<Session>;

/// Generator preset of a world.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorldType {
    #[default]
    Default,
    Flat,
    LargeBiomes,
    Amplified,
    Customized,
}

impl WorldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorldType::Default => "default",
            WorldType::Flat => "flat",
            WorldType::LargeBiomes => "large_biomes",
            WorldType::Amplified => "amplified",
            WorldType::Customized => "customized",
        }
    }
}

impl fmt::Display for WorldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The world a session shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldInfo {
    /// Numeric seed used by world generation.
    pub seed: i64,
    /// Text the seed was derived from, when the user typed one.
    pub seed_text: Option<String>,
    pub world_type: WorldType,
    /// Game version label the world was opened with.
    pub version: String,
}

impl WorldInfo {
    pub fn from_seed(seed: i64, world_type: WorldType, version: impl Into<String>) -> Self {
        Self {
            seed,
            seed_text: None,
            world_type,
            version: version.into(),
        }
    }

    /// Build from user input.
    ///
    /// Input that parses as an integer is used as the seed directly; any
    /// other text is hashed the way the game hashes text seeds.
    pub fn from_user_input(input: &str, world_type: WorldType, version: impl Into<String>) -> Self {
        let trimmed = input.trim();
        match trimmed.parse::<i64>() {
            Ok(seed) => Self::from_seed(seed, world_type, version),
            Err(_) => Self {
                seed: text_seed_hash(trimmed),
                seed_text: Some(trimmed.to_string()),
                world_type,
                version: version.into(),
            },
        }
    }
}

/// 31-based rolling hash over UTF-16 code units, widened to i64.
fn text_seed_hash(text: &str) -> i64 {
    text.encode_utf16()
        .fold(0i32, |hash, unit| {
            hash.wrapping_mul(31).wrapping_add(unit as i32)
        })
        .into()
}

/// The presentation side of a session.
///
/// Implementations are supplied by the window layer. `request_redraw` is
/// called from the refresh thread and must not block; everything else is
/// called from the foreground thread.
pub trait Renderer: Send + Sync {
    /// Schedule a repaint of the given frame.
    fn request_redraw(&self, viewport: &Viewport) -> Result<(), RenderError>;

    /// Release native resources. Called once, after the last redraw.
    fn dispose(&self);

    /// Write the current frame to a PNG file.
    fn capture(&self, _path: &Path, _viewport: &Viewport) -> Result<(), RenderError> {
        Err(RenderError::Unsupported("capture"))
    }

    /// Drop cached layer images so they are regenerated on the next redraw.
    fn repaint_layers(&self) {}
}

/// Lifecycle position of a session. Never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SessionState {
    /// Built but not yet placed in the slot.
    Created = 0,
    /// Occupying the slot.
    Active = 1,
    /// Removed from the slot, waiting for in-flight ticks.
    Disposing = 2,
    /// Renderer released. Terminal.
    Disposed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Created,
            1 => SessionState::Active,
            2 => SessionState::Disposing,
            _ => SessionState::Disposed,
        }
    }
}

/// One open world.
pub struct Session {
    id: SessionId,
    world: WorldInfo,
    renderer: Box<dyn Renderer>,
    state: AtomicU8,
    viewport: Mutex<Viewport>,
}

impl Session {
    pub fn new(world: WorldInfo, renderer: impl Renderer + 'static) -> Self {
        Self::with_renderer(world, Box::new(renderer))
    }

    pub fn with_renderer(world: WorldInfo, renderer: Box<dyn Renderer>) -> Self {
        Self {
            id: Uuid::new_v4(),
            world,
            renderer,
            state: AtomicU8::new(SessionState::Created as u8),
            viewport: Mutex::new(Viewport::default()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn world(&self) -> &WorldInfo {
        &self.world
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == SessionState::Disposed
    }

    /// Copy of the current viewport.
    pub fn viewport(&self) -> Viewport {
        *self.lock_viewport()
    }

    /// Ask the renderer to draw the next frame.
    ///
    /// Advances movement and zoom animation by one step first. Refused once
    /// the session is disposed.
    pub fn request_redraw(&self) -> Result<(), RenderError> {
        if self.is_disposed() {
            return Err(RenderError::Disposed(self.id));
        }
        let frame = self.lock_viewport().advance();
        self.renderer.request_redraw(&frame)
    }

    pub(crate) fn center_on(&self, point: WorldPoint) {
        self.lock_viewport().movement.center_on(point);
    }

    /// Drag at the scale currently drawn.
    pub(crate) fn pan(&self, delta: ScreenPoint) {
        let mut viewport = self.lock_viewport();
        let scale = viewport.zoom.scale;
        viewport.movement.pan_screen(delta, scale);
    }

    pub(crate) fn adjust_zoom(&self, anchor: ScreenPoint, notches: i32) {
        self.lock_viewport().zoom.adjust(anchor, notches);
    }

    pub(crate) fn capture(&self, path: &Path) -> Result<(), RenderError> {
        if self.is_disposed() {
            return Err(RenderError::Disposed(self.id));
        }
        let frame = self.viewport();
        self.renderer.capture(path, &frame)
    }

    pub(crate) fn repaint_layers(&self) {
        if !self.is_disposed() {
            self.renderer.repaint_layers();
        }
    }

    /// Created -> Active. Returns false if the session was used before.
    pub(crate) fn activate(&self) -> bool {
        self.transition(SessionState::Created, SessionState::Active)
    }

    /// Active (or never-activated Created) -> Disposing.
    pub(crate) fn begin_disposal(&self) {
        if !self.transition(SessionState::Active, SessionState::Disposing) {
            self.transition(SessionState::Created, SessionState::Disposing);
        }
    }

    /// Release the renderer and reset the viewport. Runs at most once.
    pub(crate) fn dispose(&self) -> bool {
        let previous = self
            .state
            .swap(SessionState::Disposed as u8, Ordering::AcqRel);
        if previous == SessionState::Disposed as u8 {
            return false;
        }
        self.renderer.dispose();
        let mut viewport = self.lock_viewport();
        viewport.zoom.skip_fading();
        viewport.reset();
        true
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn lock_viewport(&self) -> std::sync::MutexGuard<'_, Viewport> {
        self.viewport.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("world", &self.world)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
