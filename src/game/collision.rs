//! Collision Space
//!
//! Grid-partitioned broad-phase over static level geometry. Answers
//! "would a rectangle moved by (dx, dy) overlap anything tagged T, and how
//! far could it move before touching it?".
//!
//! The same space is built from the same [`LevelData`] on the server and in
//! every client predictor. Queries visit objects in insertion order, so
//! results are identical on both sides.

use std::collections::BTreeSet;

use crate::core::vec2::{Rect, Vec2};
use crate::game::level::{LevelData, SolidKind};

/// Grid cell size used for level spaces.
pub const CELL_SIZE: f64 = 16.0;

/// Index of an object inside a [`CollisionSpace`]. Stable for the space's lifetime.
pub type ObjectId = u32;

/// Query tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Full solids
    Solid,
    /// Any 45° ramp
    Ramp,
    /// One-way platforms
    Platform,
}

/// One static object.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollisionObject {
    /// Object id
    pub id: ObjectId,
    /// Bounds
    pub rect: Rect,
    /// Shape kind
    pub kind: SolidKind,
}

impl CollisionObject {
    /// Does this object carry `tag`?
    #[inline]
    pub fn has_tag(&self, tag: Tag) -> bool {
        match tag {
            Tag::Solid => self.kind == SolidKind::Solid,
            Tag::Ramp => self.kind.is_ramp(),
            Tag::Platform => self.kind == SolidKind::Platform,
        }
    }

    /// Ramp surface height under the centre of `body`.
    ///
    /// The centre is clamped to the ramp's horizontal extent. Non-ramp
    /// objects report their top edge.
    pub fn surface_y(&self, body: &Rect) -> f64 {
        let ramp = &self.rect;
        let rel = (body.center().x - ramp.x).clamp(0.0, ramp.w);
        let s = rel / ramp.w;
        match self.kind {
            SolidKind::Slope45UpRight => ramp.y + ramp.h * (1.0 - s),
            SolidKind::Slope45UpLeft => ramp.y + ramp.h * s,
            SolidKind::Solid | SolidKind::Platform => ramp.y,
        }
    }
}

/// Result of a [`CollisionSpace::check`] that hit something.
#[derive(Debug)]
pub struct Collision<'a> {
    /// Rectangle that was queried (before the move)
    pub rect: Rect,
    /// Queried horizontal move
    pub dx: f64,
    /// Queried vertical move
    pub dy: f64,
    /// Matching objects in insertion order
    pub objects: Vec<&'a CollisionObject>,
}

impl<'a> Collision<'a> {
    /// Matching objects carrying `tag`, in insertion order.
    pub fn objects_by_tag(&self, tag: Tag) -> Vec<&'a CollisionObject> {
        self.objects.iter().copied().filter(|o| o.has_tag(tag)).collect()
    }

    /// First matching object carrying `tag`.
    pub fn first_by_tag(&self, tag: Tag) -> Option<&'a CollisionObject> {
        self.objects.iter().copied().find(|o| o.has_tag(tag))
    }

    /// Displacement along the queried direction that brings the rectangle
    /// flush against `object`. Zero on an axis with no movement.
    pub fn contact_with(&self, object: &CollisionObject) -> Vec2 {
        let me = &self.rect;
        let other = &object.rect;

        let x = if self.dx > 0.0 {
            other.x - me.right()
        } else if self.dx < 0.0 {
            other.right() - me.x
        } else {
            0.0
        };

        let y = if self.dy > 0.0 {
            other.y - me.bottom()
        } else if self.dy < 0.0 {
            other.bottom() - me.y
        } else {
            0.0
        };

        Vec2::new(x, y)
    }
}

/// Uniform-grid spatial index over static geometry.
#[derive(Clone, Debug)]
pub struct CollisionSpace {
    width: f64,
    height: f64,
    cell_size: f64,
    cols: usize,
    rows: usize,
    cells: Vec<Vec<ObjectId>>,
    objects: Vec<CollisionObject>,
}

impl CollisionSpace {
    /// Create an empty space covering `width` x `height`.
    pub fn new(width: f64, height: f64, cell_size: f64) -> Self {
        let cell_size = if cell_size > 0.0 { cell_size } else { CELL_SIZE };
        let cols = (width.max(0.0) / cell_size).ceil() as usize;
        let rows = (height.max(0.0) / cell_size).ceil() as usize;
        Self {
            width,
            height,
            cell_size,
            cols,
            rows,
            cells: vec![Vec::new(); cols * rows],
            objects: Vec::new(),
        }
    }

    /// Build a space from level geometry.
    pub fn from_level(level: &LevelData) -> Self {
        let mut space = Self::new(level.map_width, level.map_height, CELL_SIZE);
        for solid in &level.solids {
            space.add(solid.rect, solid.kind);
        }
        space
    }

    /// Insert an object. Parts outside the grid are not indexed.
    pub fn add(&mut self, rect: Rect, kind: SolidKind) -> ObjectId {
        let id = self.objects.len() as ObjectId;
        self.objects.push(CollisionObject { id, rect, kind });
        if let Some((c0, r0, c1, r1)) = self.cell_range(&rect) {
            for row in r0..=r1 {
                for col in c0..=c1 {
                    self.cells[row * self.cols + col].push(id);
                }
            }
        }
        id
    }

    /// Look up an object by id.
    pub fn object(&self, id: ObjectId) -> Option<&CollisionObject> {
        self.objects.get(id as usize)
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the space holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Would `rect` moved by `(dx, dy)` overlap any object carrying one of `tags`?
    ///
    /// Returns `None` when nothing matches or when the moved rectangle lies
    /// entirely outside the grid.
    pub fn check(&self, rect: &Rect, dx: f64, dy: f64, tags: &[Tag]) -> Option<Collision<'_>> {
        let moved = rect.translated(dx, dy);
        let (c0, r0, c1, r1) = self.cell_range(&moved)?;

        let mut candidates = BTreeSet::new();
        for row in r0..=r1 {
            for col in c0..=c1 {
                candidates.extend(self.cells[row * self.cols + col].iter().copied());
            }
        }

        let objects: Vec<&CollisionObject> = candidates
            .into_iter()
            .filter_map(|id| self.objects.get(id as usize))
            .filter(|o| tags.iter().any(|t| o.has_tag(*t)))
            .filter(|o| moved.overlaps(&o.rect))
            .collect();

        if objects.is_empty() {
            None
        } else {
            Some(Collision {
                rect: *rect,
                dx,
                dy,
                objects,
            })
        }
    }

    /// Inclusive cell range covered by `rect`, clipped to the grid.
    fn cell_range(&self, rect: &Rect) -> Option<(usize, usize, usize, usize)> {
        let finite = rect.x.is_finite() && rect.y.is_finite() && rect.w.is_finite() && rect.h.is_finite();
        if !finite || self.cols == 0 || self.rows == 0 {
            return None;
        }
        if rect.right() <= 0.0 || rect.bottom() <= 0.0 || rect.x >= self.width || rect.y >= self.height {
            return None;
        }

        let max_col = (self.cols - 1) as f64;
        let max_row = (self.rows - 1) as f64;
        let c0 = (rect.x / self.cell_size).floor().clamp(0.0, max_col) as usize;
        let r0 = (rect.y / self.cell_size).floor().clamp(0.0, max_row) as usize;
        let c1 = ((rect.right() / self.cell_size).ceil() - 1.0).clamp(0.0, max_col) as usize;
        let r1 = ((rect.bottom() / self.cell_size).ceil() - 1.0).clamp(0.0, max_row) as usize;
        Some((c0, r0, c1.max(c0), r1.max(r0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor_space() -> CollisionSpace {
        let mut space = CollisionSpace::new(320.0, 240.0, CELL_SIZE);
        space.add(Rect::new(0.0, 200.0, 320.0, 40.0), SolidKind::Solid);
        space.add(Rect::new(160.0, 168.0, 32.0, 32.0), SolidKind::Slope45UpRight);
        space.add(Rect::new(64.0, 120.0, 64.0, 8.0), SolidKind::Platform);
        space
    }

    #[test]
    fn test_check_hits_floor() {
        let space = floor_space();
        let body = Rect::new(20.0, 160.0, 16.0, 40.0);

        assert!(space.check(&body, 0.0, 0.0, &[Tag::Solid]).is_none());

        let hit = space.check(&body, 0.0, 1.0, &[Tag::Solid]).unwrap();
        let floor = hit.first_by_tag(Tag::Solid).unwrap();
        assert_eq!(floor.id, 0);
        assert_eq!(hit.contact_with(floor), Vec2::new(0.0, 0.0));
    }

    #[test]
    fn test_contact_distance_falling() {
        let space = floor_space();
        let body = Rect::new(20.0, 155.0, 16.0, 40.0);
        let hit = space.check(&body, 0.0, 10.0, &[Tag::Solid]).unwrap();
        let floor = hit.first_by_tag(Tag::Solid).unwrap();
        assert_eq!(hit.contact_with(floor).y, 5.0);
    }

    #[test]
    fn test_contact_distance_horizontal() {
        let mut space = CollisionSpace::new(320.0, 240.0, CELL_SIZE);
        space.add(Rect::new(100.0, 0.0, 16.0, 200.0), SolidKind::Solid);
        let body = Rect::new(80.0, 50.0, 16.0, 40.0);

        let hit = space.check(&body, 6.0, 0.0, &[Tag::Solid]).unwrap();
        let wall = hit.first_by_tag(Tag::Solid).unwrap();
        assert_eq!(hit.contact_with(wall).x, 4.0);

        let body = Rect::new(120.0, 50.0, 16.0, 40.0);
        let hit = space.check(&body, -6.0, 0.0, &[Tag::Solid]).unwrap();
        let wall = hit.first_by_tag(Tag::Solid).unwrap();
        assert_eq!(hit.contact_with(wall).x, -4.0);
    }

    #[test]
    fn test_tag_filter() {
        let space = floor_space();
        let on_ramp = Rect::new(168.0, 150.0, 16.0, 40.0);
        assert!(space.check(&on_ramp, 0.0, 0.0, &[Tag::Platform]).is_none());

        let hit = space.check(&on_ramp, 0.0, 0.0, &[Tag::Ramp, Tag::Solid]).unwrap();
        assert_eq!(hit.objects_by_tag(Tag::Ramp).len(), 1);
        assert!(hit.objects_by_tag(Tag::Solid).is_empty());
    }

    #[test]
    fn test_out_of_grid_is_no_collision() {
        let space = floor_space();
        let far = Rect::new(-500.0, -500.0, 16.0, 40.0);
        assert!(space.check(&far, 0.0, 0.0, &[Tag::Solid, Tag::Ramp, Tag::Platform]).is_none());
        let below = Rect::new(20.0, 1000.0, 16.0, 40.0);
        assert!(space.check(&below, 0.0, 5.0, &[Tag::Solid]).is_none());
        let nan = Rect::new(f64::NAN, 0.0, 16.0, 40.0);
        assert!(space.check(&nan, 0.0, 0.0, &[Tag::Solid]).is_none());
    }

    #[test]
    fn test_slope_surface() {
        let ramp = CollisionObject {
            id: 0,
            rect: Rect::new(100.0, 100.0, 32.0, 32.0),
            kind: SolidKind::Slope45UpRight,
        };
        // Centre at left edge -> bottom of the ramp
        let body = Rect::new(92.0, 0.0, 16.0, 40.0);
        assert_eq!(ramp.surface_y(&body), 132.0);
        // Centre in the middle -> halfway
        let body = Rect::new(108.0, 0.0, 16.0, 40.0);
        assert_eq!(ramp.surface_y(&body), 116.0);
        // Past the right edge clamps to the top
        let body = Rect::new(200.0, 0.0, 16.0, 40.0);
        assert_eq!(ramp.surface_y(&body), 100.0);

        let left = CollisionObject { kind: SolidKind::Slope45UpLeft, ..ramp };
        let body = Rect::new(92.0, 0.0, 16.0, 40.0);
        assert_eq!(left.surface_y(&body), 100.0);
    }

    #[test]
    fn test_from_level_indexes_everything() {
        let level = LevelData::arena();
        let space = CollisionSpace::from_level(&level);
        assert_eq!(space.len(), level.solids.len());
        let floor_box = Rect::new(300.0, 300.0, 16.0, 40.0);
        assert!(space.check(&floor_box, 0.0, 0.0, &[Tag::Solid]).is_some());
    }
}
