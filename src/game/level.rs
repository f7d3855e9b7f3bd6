//! Level Geometry
//!
//! Immutable static collision data and spawn points. Loaded once before the
//! simulation starts and shared read-only (`Arc<LevelData>`) between the
//! server and every client predictor.

use std::path::Path;
use serde::{Serialize, Deserialize};

use crate::core::vec2::{Rect, Vec2};

/// Level loading errors.
#[derive(Debug, thiserror::Error)]
pub enum LevelError {
    /// Level file could not be read.
    #[error("Failed to read level: {0}")]
    Io(#[from] std::io::Error),

    /// Level file is not valid JSON.
    #[error("Invalid level JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Geometry is malformed.
    #[error("Invalid level geometry: {0}")]
    Invalid(String),
}

/// Kind of static collision shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolidKind {
    /// Blocks from every side
    Solid,
    /// One-way: only blocks while falling onto its top edge
    Platform,
    /// 45° ramp rising to the right
    #[serde(rename = "45_up_right")]
    Slope45UpRight,
    /// 45° ramp rising to the left
    #[serde(rename = "45_up_left")]
    Slope45UpLeft,
}

impl SolidKind {
    /// Whether this shape is a ramp.
    pub fn is_ramp(self) -> bool {
        matches!(self, SolidKind::Slope45UpRight | SolidKind::Slope45UpLeft)
    }
}

/// One static collision rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolidRect {
    /// Bounds
    #[serde(flatten)]
    pub rect: Rect,
    /// Shape kind
    #[serde(default = "default_kind")]
    pub kind: SolidKind,
}

fn default_kind() -> SolidKind {
    SolidKind::Solid
}

impl SolidRect {
    /// Create a shape.
    pub const fn new(x: f64, y: f64, w: f64, h: f64, kind: SolidKind) -> Self {
        Self {
            rect: Rect::new(x, y, w, h),
            kind,
        }
    }
}

/// Player spawn location (top-left of the player box).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    /// X
    pub x: f64,
    /// Y
    pub y: f64,
}

/// Static level collision data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelData {
    /// Level name announced to clients
    pub name: String,
    /// Map width in pixels
    pub map_width: f64,
    /// Map height in pixels
    pub map_height: f64,
    /// Collision shapes
    pub solids: Vec<SolidRect>,
    /// Spawn points, assigned round-robin
    #[serde(default)]
    pub spawn_points: Vec<SpawnPoint>,
}

impl LevelData {
    /// Spawn used when a level defines none.
    pub const FALLBACK_SPAWN: Vec2 = Vec2::new(100.0, 100.0);

    /// Load a level from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LevelError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse and validate a level from JSON.
    pub fn from_json(text: &str) -> Result<Self, LevelError> {
        let level: Self = serde_json::from_str(text)?;
        level.validate()?;
        Ok(level)
    }

    /// Reject non-finite or degenerate geometry.
    pub fn validate(&self) -> Result<(), LevelError> {
        if !(self.map_width > 0.0 && self.map_height > 0.0) {
            return Err(LevelError::Invalid(format!(
                "map size {}x{} must be positive",
                self.map_width, self.map_height
            )));
        }
        for (i, solid) in self.solids.iter().enumerate() {
            let r = solid.rect;
            let finite = r.x.is_finite() && r.y.is_finite() && r.w.is_finite() && r.h.is_finite();
            if !finite || r.w <= 0.0 || r.h <= 0.0 {
                return Err(LevelError::Invalid(format!("solid #{i} has bad bounds {r:?}")));
            }
        }
        Ok(())
    }

    /// Spawn point for the n-th join (round-robin).
    pub fn spawn_point(&self, n: usize) -> Vec2 {
        if self.spawn_points.is_empty() {
            return Self::FALLBACK_SPAWN;
        }
        let p = self.spawn_points[n % self.spawn_points.len()];
        Vec2::new(p.x, p.y)
    }

    /// Built-in test arena: floor, side walls, a one-way platform and a ramp.
    pub fn arena() -> Self {
        use SolidKind::*;
        Self {
            name: "arena".to_string(),
            map_width: 640.0,
            map_height: 360.0,
            solids: vec![
                SolidRect::new(0.0, 320.0, 640.0, 40.0, Solid),
                SolidRect::new(0.0, 0.0, 16.0, 320.0, Solid),
                SolidRect::new(624.0, 0.0, 16.0, 320.0, Solid),
                SolidRect::new(200.0, 240.0, 96.0, 8.0, Platform),
                SolidRect::new(400.0, 288.0, 32.0, 32.0, Slope45UpRight),
                SolidRect::new(432.0, 288.0, 64.0, 32.0, Solid),
            ],
            spawn_points: vec![
                SpawnPoint { x: 64.0, y: 280.0 },
                SpawnPoint { x: 560.0, y: 280.0 },
                SpawnPoint { x: 240.0, y: 200.0 },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_round_robin() {
        let level = LevelData::arena();
        assert_eq!(level.spawn_point(0), Vec2::new(64.0, 280.0));
        assert_eq!(level.spawn_point(1), Vec2::new(560.0, 280.0));
        assert_eq!(level.spawn_point(3), Vec2::new(64.0, 280.0));
    }

    #[test]
    fn test_spawn_fallback() {
        let level = LevelData {
            name: "empty".to_string(),
            map_width: 100.0,
            map_height: 100.0,
            solids: vec![],
            spawn_points: vec![],
        };
        assert_eq!(level.spawn_point(5), LevelData::FALLBACK_SPAWN);
    }

    #[test]
    fn test_level_json() {
        let json = r#"{
            "name": "test",
            "map_width": 320,
            "map_height": 240,
            "solids": [
                {"x": 0, "y": 200, "w": 320, "h": 40},
                {"x": 64, "y": 168, "w": 32, "h": 32, "kind": "45_up_left"},
                {"x": 128, "y": 120, "w": 64, "h": 8, "kind": "platform"}
            ],
            "spawn_points": [{"x": 10, "y": 160}]
        }"#;
        let level = LevelData::from_json(json).unwrap();
        assert_eq!(level.solids.len(), 3);
        assert_eq!(level.solids[0].kind, SolidKind::Solid);
        assert_eq!(level.solids[1].kind, SolidKind::Slope45UpLeft);
        assert_eq!(level.solids[2].kind, SolidKind::Platform);
    }

    #[test]
    fn test_level_rejects_degenerate_solid() {
        let json = r#"{"name":"bad","map_width":10,"map_height":10,
            "solids":[{"x":0,"y":0,"w":0,"h":4}]}"#;
        assert!(matches!(LevelData::from_json(json), Err(LevelError::Invalid(_))));
    }
}
