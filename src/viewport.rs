//! Viewport value state owned by a session.
//!
//! `MovementState` tracks where the map is centred, `ZoomState` how far it
//! is zoomed and whether a zoom change is still fading in. Both are plain
//! `Copy` values; a session hands its renderer a `Viewport` copy on every
//! redraw and resets both to their defaults when it is disposed.

use serde::{Deserialize, Serialize};

/// Most zoomed-in level (negative levels magnify).
pub const MIN_ZOOM_LEVEL: i32 = -20;

/// Most zoomed-out level.
pub const MAX_ZOOM_LEVEL: i32 = 10;

/// Fraction of the remaining distance covered per redraw while fading.
const FADE_SPEED: f64 = 0.2;

/// A point in world (block) coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldPoint {
    pub x: i64,
    pub y: i64,
}

impl WorldPoint {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// A point in screen pixels, relative to the map panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Where the map is centred.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MovementState {
    /// Centre of the view in world coordinates.
    pub center_x: f64,
    pub center_y: f64,
}

impl MovementState {
    /// Jump to a world position.
    pub fn center_on(&mut self, point: WorldPoint) {
        self.center_x = point.x as f64;
        self.center_y = point.y as f64;
    }

    /// Drag the map by a screen-space delta at the given scale (pixels per
    /// block). Dragging right moves the centre left.
    pub fn pan_screen(&mut self, delta: ScreenPoint, scale: f64) {
        self.center_x -= delta.x / scale;
        self.center_y -= delta.y / scale;
    }

    /// Back to the origin.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Zoom level and the fade between the shown and requested scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomState {
    /// Discrete zoom level, clamped to `MIN_ZOOM_LEVEL..=MAX_ZOOM_LEVEL`.
    pub level: i32,
    /// Scale currently drawn (pixels per block).
    pub scale: f64,
    /// Scale the fade is heading towards.
    pub target_scale: f64,
    /// Screen point the last zoom was anchored on.
    pub anchor: Option<ScreenPoint>,
}

impl Default for ZoomState {
    fn default() -> Self {
        Self {
            level: 0,
            scale: 1.0,
            target_scale: 1.0,
            anchor: None,
        }
    }
}

impl ZoomState {
    /// Scale for a zoom level: every four levels halves or doubles.
    pub fn scale_for_level(level: i32) -> f64 {
        2f64.powf(-(level as f64) / 4.0)
    }

    /// Zoom around a screen point. Negative notches zoom in.
    pub fn adjust(&mut self, anchor: ScreenPoint, notches: i32) {
        self.level = self
            .level
            .saturating_add(notches)
            .clamp(MIN_ZOOM_LEVEL, MAX_ZOOM_LEVEL);
        self.target_scale = Self::scale_for_level(self.level);
        self.anchor = Some(anchor);
    }

    pub fn is_fading(&self) -> bool {
        self.scale != self.target_scale
    }

    /// Move the drawn scale one redraw closer to the target.
    pub fn advance(&mut self) {
        if !self.is_fading() {
            return;
        }
        self.scale += (self.target_scale - self.scale) * FADE_SPEED;
        if (self.scale - self.target_scale).abs() < 1e-4 {
            self.scale = self.target_scale;
        }
    }

    /// Finish any fade immediately.
    pub fn skip_fading(&mut self) {
        self.scale = self.target_scale;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// What a renderer needs to draw one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub movement: MovementState,
    pub zoom: ZoomState,
}

impl Viewport {
    /// Advance the zoom fade by one redraw and return the frame to draw.
    pub fn advance(&mut self) -> Viewport {
        self.zoom.advance();
        *self
    }

    pub fn reset(&mut self) {
        self.movement.reset();
        self.zoom.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoom_level_is_clamped() {
        let mut zoom = ZoomState::default();
        zoom.adjust(ScreenPoint::new(10.0, 10.0), -100);
        assert_eq!(zoom.level, MIN_ZOOM_LEVEL);

        zoom.adjust(ScreenPoint::new(10.0, 10.0), 1000);
        assert_eq!(zoom.level, MAX_ZOOM_LEVEL);
    }

    #[test]
    fn test_zoom_fades_towards_target() {
        let mut zoom = ZoomState::default();
        zoom.adjust(ScreenPoint::default(), -4);
        assert_eq!(zoom.target_scale, 2.0);
        assert!(zoom.is_fading());

        zoom.advance();
        assert!(zoom.scale > 1.0 && zoom.scale < 2.0);

        zoom.skip_fading();
        assert!(!zoom.is_fading());
        assert_eq!(zoom.scale, 2.0);
    }

    #[test]
    fn test_center_on_moves_centre() {
        let mut movement = MovementState::default();
        movement.pan_screen(ScreenPoint::new(40.0, 40.0), 1.0);
        movement.center_on(WorldPoint::new(123, -456));
        assert_eq!(movement.center_x, 123.0);
        assert_eq!(movement.center_y, -456.0);
    }

    #[test]
    fn test_pan_screen_respects_scale() {
        let mut movement = MovementState::default();
        movement.pan_screen(ScreenPoint::new(20.0, -10.0), 2.0);
        assert_eq!(movement.center_x, -10.0);
        assert_eq!(movement.center_y, 5.0);
    }

    #[test]
    fn test_reset_returns_to_defaults() {
        let mut viewport = Viewport::default();
        viewport.movement.center_on(WorldPoint::new(5, 5));
        viewport.zoom.adjust(ScreenPoint::new(1.0, 1.0), 3);

        viewport.reset();
        assert_eq!(viewport, Viewport::default());
    }
}
