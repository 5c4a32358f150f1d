// Copyright 2024 The grindrail authors. This file is part of grindrail.
//
// grindrail is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// grindrail is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with grindrail. If not, see <http://www.gnu.org/licenses/>.

use std::any::Any;

use cgmath::{Point3, Vector3};

use crate::bounds::*;
use crate::collision::*;
use crate::distance::*;
use crate::error::{Error, Result};
use crate::geom::*;
use crate::intersectable::*;
use crate::precision::ScenePos;

/// Shrunk boxes thinner than this along any axis are rejected.
const MIN_SMALL_SIZE: ScenePos = 1e-3;

/// A box with rounded edges: the set of points within `radius` of a smaller
/// box. Think of it as a sphere swept over the small box.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SweptSphereAabb {
    aabb_small: AxisAlignedBoundingBox,
    aabb_large: AxisAlignedBoundingBox,
    radius: ScenePos,
    bounding_sphere: BoundingSphere,
}

impl SweptSphereAabb {
    /// `min` and `max` describe the outer box. Fails if shrinking it by
    /// `radius` on every side leaves nothing.
    pub fn new(min: Point3<ScenePos>, max: Point3<ScenePos>, radius: ScenePos) -> Result<Self> {
        let r = Vector3::new(radius, radius, radius);
        let aabb_small = AxisAlignedBoundingBox::from_min_max(min + r, max - r);
        let size = aabb_small.size();
        if size.x < MIN_SMALL_SIZE || size.y < MIN_SMALL_SIZE || size.z < MIN_SMALL_SIZE {
            return Err(Error::AabbTooSmall { radius, size });
        }
        Ok(SweptSphereAabb {
            aabb_small,
            aabb_large: AxisAlignedBoundingBox::from_min_max(min, max),
            radius,
            bounding_sphere: BoundingSphere::from_diameter(min, max),
        })
    }

    pub fn radius(&self) -> ScenePos {
        self.radius
    }

    pub fn aabb_small(&self) -> &AxisAlignedBoundingBox {
        &self.aabb_small
    }

    fn hit(&self, cp: &ClosestPoint) -> Option<IntersectableHit> {
        if cp.distance <= self.radius {
            Some(IntersectableHit {
                point: cp.closest_point0,
                normal: cp.normal,
                overlap: self.radius - cp.distance,
                ray_t: ScenePos::NAN,
            })
        } else {
            None
        }
    }

    fn intersects_polygon<const N: usize>(&self, p: &CollisionPolygonSphere<N>) -> Option<IntersectableHit> {
        if !self.aabb_large.intersects(&p.aabb()) {
            return None;
        }
        let mut cp = ClosestPoint::new();
        distance_polygon_aabb(&p.polygon, &self.aabb_small, &mut cp);
        self.hit(&cp)
    }

    fn intersects_segment(&self, line: &[Point3<ScenePos>; 2]) -> Option<IntersectableHit> {
        if !self.aabb_large.intersects(&AxisAlignedBoundingBox::from_points(line.iter())) {
            return None;
        }
        let mut cp = ClosestPoint::new();
        distance_line_aabb(line, &self.aabb_small, &mut cp);
        self.hit(&cp)
    }
}

impl Intersectable for SweptSphereAabb {
    fn bounding_sphere(&self) -> BoundingSphere {
        self.bounding_sphere
    }

    fn aabb(&self) -> AxisAlignedBoundingBox {
        self.aabb_large
    }

    fn intersects_quad(&self, q: &CollisionQuadSphere) -> Option<IntersectableHit> {
        self.intersects_polygon(q)
    }

    fn intersects_triangle(&self, t: &CollisionTriangleSphere) -> Option<IntersectableHit> {
        self.intersects_polygon(t)
    }

    fn intersects_ridge(&self, r: &CollisionRidgeSphere) -> Option<IntersectableHit> {
        self.intersects_segment(&r.edge)
    }

    /// The hit has no ray parameter.
    fn intersects_line(&self, l: &CollisionLineSphere) -> Option<IntersectableHit> {
        self.intersects_segment(&l.line)
    }

    fn intersects_intersectable(&self, _other: &dyn Intersectable) -> Option<IntersectableHit> {
        panic!("Sphere swept AABB called without transformation");
    }

    fn intersects_intersectable_transformed(
        &self,
        other: &dyn Intersectable,
        trafo: &TransformationMatrix,
    ) -> Option<IntersectableHit> {
        let other = match other.as_any().downcast_ref::<SweptSphereAabb>() {
            Some(o) => o,
            None => panic!("SweptSphereAabb can only intersect objects of type SweptSphereAabb"),
        };
        let mut cp = ClosestPoint::new();
        distance_aabb_aabb(&self.aabb_small, &other.aabb_small, trafo, &mut cp);
        let sum_radius = self.radius + other.radius;
        if cp.distance > sum_radius {
            return None;
        }
        let alpha = self.radius / sum_radius;
        Some(IntersectableHit {
            point: cp.closest_point0 + (cp.closest_point1 - cp.closest_point0) * alpha,
            normal: cp.normal,
            overlap: sum_radius - cp.distance,
            ray_t: ScenePos::NAN,
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
