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

//! Closest points between primitives and axis aligned boxes.
//!
//! Every search feeds candidate point pairs into a `ClosestPoint`, which
//! keeps the nearest one. The candidates are chosen so that the true closest
//! pair is always among them as long as the primitive stays outside of the
//! box. A primitive that passes straight through the box is not detected;
//! one that touches it is a fatal error.

use cgmath::{InnerSpace, Point3, Vector3};

use crate::bounds::AxisAlignedBoundingBox;
use crate::geom::*;
use crate::precision::ScenePos;

/// The closest pair found so far. `closest_point0` lies on the primitive,
/// `closest_point1` on the box, and `normal` points from the box towards the
/// primitive.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ClosestPoint {
    pub closest_point0: Point3<ScenePos>,
    pub closest_point1: Point3<ScenePos>,
    pub normal: Vector3<ScenePos>,
    pub distance: ScenePos,
}

impl ClosestPoint {
    pub fn new() -> Self {
        let nan = ScenePos::NAN;
        ClosestPoint {
            closest_point0: Point3::new(nan, nan, nan),
            closest_point1: Point3::new(nan, nan, nan),
            normal: Vector3::new(nan, nan, nan),
            distance: ScenePos::INFINITY,
        }
    }

    /// True once at least one candidate has been recorded.
    pub fn is_valid(&self) -> bool {
        self.distance != ScenePos::INFINITY
    }

    pub fn update(&mut self, c0: Point3<ScenePos>, c1: Point3<ScenePos>) {
        let dir = c0 - c1;
        let dist2 = dir.magnitude2();
        if dist2 < COLLISION_EPSILON {
            panic!("polygon intersects AABB at {:?}", c1);
        }
        if dist2 < self.distance * self.distance {
            let distance = dist2.sqrt();
            self.closest_point0 = c0;
            self.closest_point1 = c1;
            self.normal = dir / distance;
            self.distance = distance;
        }
    }
}

impl Default for ClosestPoint {
    fn default() -> Self {
        ClosestPoint::new()
    }
}

pub fn distance_point_aabb(p: Point3<ScenePos>, aabb: &AxisAlignedBoundingBox, cp: &mut ClosestPoint) {
    cp.update(p, aabb.closest_point(p));
}

/// Candidates from the interior of the line: box corners projected onto the
/// line and the closest interior points between the line and box edges.
pub fn distance_interior_line_aabb(line: &[Point3<ScenePos>; 2], aabb: &AxisAlignedBoundingBox, cp: &mut ClosestPoint) {
    let ray = RaySegment3D::from_points(line[0], line[1]);
    for c in aabb.corners().iter() {
        let (t, q) = ray.closest_point_to_line(*c);
        if t >= 0.0 && t <= ray.length {
            cp.update(q, *c);
        }
    }
    for edge in aabb.edges().iter() {
        let edge_ray = RaySegment3D::from_points(edge[0], edge[1]);
        if let Some((p0, p1)) = ray.closest_interior_points(&edge_ray) {
            cp.update(p0, p1);
        }
    }
}

pub fn distance_line_aabb(line: &[Point3<ScenePos>; 2], aabb: &AxisAlignedBoundingBox, cp: &mut ClosestPoint) {
    distance_point_aabb(line[0], aabb, cp);
    distance_point_aabb(line[1], aabb, cp);
    distance_interior_line_aabb(line, aabb, cp);
}

/// Box corners inside the polygon's prism, projected onto its plane.
pub fn distance_interior_polygon_aabb<const N: usize>(
    polygon: &ConvexPolygon3D<N>,
    aabb: &AxisAlignedBoundingBox,
    cp: &mut ClosestPoint,
) {
    for c in aabb.corners().iter() {
        if polygon.contains(*c) {
            cp.update(polygon.plane.project(*c), *c);
        }
    }
}

pub fn distance_polygon_aabb<const N: usize>(
    polygon: &ConvexPolygon3D<N>,
    aabb: &AxisAlignedBoundingBox,
    cp: &mut ClosestPoint,
) {
    for c in polygon.corners.iter() {
        distance_point_aabb(*c, aabb, cp);
    }
    for i in 0..N {
        distance_interior_line_aabb(&[polygon.corners[i], polygon.corners[(i + 1) % N]], aabb, cp);
    }
    distance_interior_polygon_aabb(polygon, aabb, cp);
}

/// Distance between `aabb0` and `aabb1` placed in `aabb0`'s frame by
/// `trafo1`. The primitive side of the result is `aabb1`.
pub fn distance_aabb_aabb(
    aabb0: &AxisAlignedBoundingBox,
    aabb1: &AxisAlignedBoundingBox,
    trafo1: &TransformationMatrix,
    cp: &mut ClosestPoint,
) {
    for c in aabb1.transformed_corners(trafo1).iter() {
        distance_point_aabb(*c, aabb0, cp);
    }
    for e in aabb1.edges().iter() {
        distance_interior_line_aabb(&[trafo1.transform(e[0]), trafo1.transform(e[1])], aabb0, cp);
    }
    for f in aabb1.faces().iter() {
        if let Some(f) = f.transformed(trafo1) {
            distance_interior_polygon_aabb(&f, aabb0, cp);
        }
    }
}
