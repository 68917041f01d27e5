//! Spatial queries - bounding boxes and distances

use glam::Vec3;

/// Axis-aligned bounding box built from an entity's current position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collider {
    pub center: Vec3,
    pub half_extents: Vec3,
}

impl Collider {
    pub fn new(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            center,
            half_extents,
        }
    }

    pub fn min(&self) -> Vec3 {
        self.center - self.half_extents
    }

    pub fn max(&self) -> Vec3 {
        self.center + self.half_extents
    }
}

/// Geometric questions the simulation asks each tick
pub trait SpatialQuery {
    /// Whether two bounding volumes overlap
    fn intersects(&self, a: &Collider, b: &Collider) -> bool;

    /// Distance between two points
    fn distance(&self, a: Vec3, b: Vec3) -> f32;

    /// Whether a point lies inside a bounding volume
    fn contains(&self, collider: &Collider, point: Vec3) -> bool;
}

/// Box-vs-box tests on freshly computed bounds (no caching)
#[derive(Debug, Clone, Copy, Default)]
pub struct AabbSpatial;

impl SpatialQuery for AabbSpatial {
    fn intersects(&self, a: &Collider, b: &Collider) -> bool {
        let (a_min, a_max) = (a.min(), a.max());
        let (b_min, b_max) = (b.min(), b.max());
        a_min.cmple(b_max).all() && b_min.cmple(a_max).all()
    }

    fn distance(&self, a: Vec3, b: Vec3) -> f32 {
        a.distance(b)
    }

    fn contains(&self, collider: &Collider, point: Vec3) -> bool {
        collider.min().cmple(point).all() && point.cmple(collider.max()).all()
    }
}
