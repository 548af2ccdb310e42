//! mapview - session lifecycle core of the map viewer window
//!
//! The viewer shows one world at a time. A background thread repaints it at
//! a fixed cadence while the foreground thread opens, switches and closes
//! worlds. This crate owns the "currently active session" and guarantees
//! that the refresh thread never touches a session after its renderer has
//! been released.
//!
//! # Usage
//!
//! ```ignore
//! use mapview::{LifecycleCoordinator, Session, ViewerConfig, WorldInfo, WorldType};
//!
//! let config = ViewerConfig::from_file("config/viewer.yaml")?;
//! let mut coordinator = LifecycleCoordinator::start(&config.refresh, None)?;
//!
//! let world = WorldInfo::from_user_input("glacier", WorldType::Default, "1.20.4");
//! coordinator.open(Session::new(world, my_renderer))?;
//! // ...
//! coordinator.shutdown()?;
//! ```

pub mod audit;
pub mod config;
pub mod coordinates;
pub mod error;
pub mod lifecycle;
pub mod session;
pub mod viewport;

// Re-export main types
pub use config::{AuditConfig, RefreshConfig, ViewerConfig};
pub use coordinates::{ensure_png_extension, parse_coordinates};
pub use error::{
    ConfigError, CoordinateError, DisposalTimeout, LifecycleError, RenderError, TickFailure,
};
pub use lifecycle::{LifecycleCoordinator, RefreshScheduler, SchedulerStats, SessionSlot, SlotStatus};
pub use session::{
    Renderer, Session, SessionHandle, SessionId, SessionState, WorldInfo, WorldType,
};
pub use viewport::{MovementState, ScreenPoint, Viewport, WorldPoint, ZoomState};
