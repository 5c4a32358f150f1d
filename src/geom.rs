// Copyright 2017 Matthew Plant, 2024 The grindrail authors. This file is part of grindrail.
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

use std::ops::Neg;

use cgmath::{BaseFloat, EuclideanSpace, InnerSpace, Matrix3, Point3, SquareMatrix,
             Vector3, Zero};
use serde::{Deserialize, Serialize};

use crate::precision::*;

/// Squared lengths below this are treated as zero.
pub const COLLISION_EPSILON: ScenePos = 1e-12;

/// A plane in Hessian normal form: `normal · x + intercept = 0`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaneNd {
    pub normal: Vector3<ScenePos>,
    pub intercept: ScenePos,
}

impl PlaneNd {
    pub fn new(normal: Vector3<ScenePos>, intercept: ScenePos) -> Self {
        PlaneNd { normal, intercept }
    }

    pub fn from_normal_and_point(normal: Vector3<ScenePos>, p: Point3<ScenePos>) -> Self {
        PlaneNd {
            normal,
            intercept: -normal.dot(p.to_vec()),
        }
    }

    /// The plane through three points, oriented counter-clockwise. Returns
    /// None for collinear points.
    pub fn from_points(a: Point3<ScenePos>, b: Point3<ScenePos>, c: Point3<ScenePos>) -> Option<Self> {
        let n = (b - a).cross(c - a);
        let l2 = n.magnitude2();
        if l2 < COLLISION_EPSILON * COLLISION_EPSILON {
            return None;
        }
        Some(PlaneNd::from_normal_and_point(n / l2.sqrt(), a))
    }

    /// Signed distance of a point to the plane. Positive values are on the
    /// side the normal points to.
    #[inline(always)]
    pub fn distance(&self, p: Point3<ScenePos>) -> ScenePos {
        self.normal.dot(p.to_vec()) + self.intercept
    }

    pub fn project(&self, p: Point3<ScenePos>) -> Point3<ScenePos> {
        p - self.normal * self.distance(p)
    }

    pub fn transformed(&self, m: &TransformationMatrix) -> Self {
        let n = m.rotate(self.normal).normalize();
        let p = m.transform(Point3::from_vec(self.normal * -self.intercept));
        PlaneNd::from_normal_and_point(n, p)
    }
}

impl Neg for PlaneNd {
    type Output = PlaneNd;

    fn neg(self) -> PlaneNd {
        PlaneNd {
            normal: -self.normal,
            intercept: -self.intercept,
        }
    }
}

/// A rotation (possibly scaled) followed by a translation.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformationMatrix<S: BaseFloat = ScenePos> {
    pub r: Matrix3<S>,
    pub t: Vector3<S>,
}

impl<S: BaseFloat> TransformationMatrix<S> {
    pub fn new(r: Matrix3<S>, t: Vector3<S>) -> Self {
        TransformationMatrix { r, t }
    }

    pub fn identity() -> Self {
        TransformationMatrix {
            r: Matrix3::identity(),
            t: Vector3::zero(),
        }
    }

    pub fn from_translation(t: Vector3<S>) -> Self {
        TransformationMatrix {
            r: Matrix3::identity(),
            t,
        }
    }

    #[inline(always)]
    pub fn transform(&self, p: Point3<S>) -> Point3<S> {
        Point3::from_vec(self.r * p.to_vec() + self.t)
    }

    #[inline(always)]
    pub fn rotate(&self, v: Vector3<S>) -> Vector3<S> {
        self.r * v
    }

    /// Returns `self ∘ other`, i.e. `other` is applied first.
    pub fn compose(&self, other: &TransformationMatrix<S>) -> Self {
        TransformationMatrix {
            r: self.r * other.r,
            t: self.r * other.t + self.t,
        }
    }

    pub fn inverse(&self) -> Option<Self> {
        let r = self.r.invert()?;
        Some(TransformationMatrix { r, t: -(r * self.t) })
    }

    /// Root mean square of the singular values of the linear part.
    ///
    /// For a pure rotation this is one. For anisotropic scales it lies
    /// between the smallest and the largest axis scale, so it does not
    /// bound the transformed extent from above.
    pub fn get_scale(&self) -> S {
        let three = S::one() + S::one() + S::one();
        ((self.r.x.magnitude2() + self.r.y.magnitude2() + self.r.z.magnitude2()) / three).sqrt()
    }
}

impl TransformationMatrix<ScenePos> {
    pub fn to_render(&self) -> TransformationMatrix<SceneDir> {
        TransformationMatrix {
            r: matrix_to_dir(self.r),
            t: scene_to_dir(self.t),
        }
    }
}

impl TransformationMatrix<SceneDir> {
    pub fn to_scene(&self) -> TransformationMatrix<ScenePos> {
        TransformationMatrix {
            r: matrix_to_scene(self.r),
            t: dir_to_scene(self.t),
        }
    }
}

/// A finite segment stored as start point, unit direction and length.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaySegment3D {
    pub start: Point3<ScenePos>,
    pub direction: Vector3<ScenePos>,
    pub length: ScenePos,
}

impl RaySegment3D {
    pub fn from_points(a: Point3<ScenePos>, b: Point3<ScenePos>) -> Self {
        let d = b - a;
        let l2 = d.magnitude2();
        if l2 < COLLISION_EPSILON {
            panic!("ray segment from {:?} to {:?} has zero length", a, b);
        }
        let length = l2.sqrt();
        RaySegment3D {
            start: a,
            direction: d / length,
            length,
        }
    }

    #[inline(always)]
    pub fn stop(&self) -> Point3<ScenePos> {
        self.start + self.direction * self.length
    }

    pub fn transformed(&self, m: &TransformationMatrix) -> Self {
        RaySegment3D::from_points(m.transform(self.start), m.transform(self.stop()))
    }

    /// Cast the segment against a convex polygon. Returns the ray parameter
    /// and the intersection point. A segment parallel to the polygon plane
    /// never intersects.
    pub fn intersects<const N: usize>(&self, polygon: &ConvexPolygon3D<N>) -> Option<(ScenePos, Point3<ScenePos>)> {
        let denom = polygon.plane.normal.dot(self.direction);
        if denom.abs() < COLLISION_EPSILON {
            return None;
        }
        let t = -polygon.plane.distance(self.start) / denom;
        if t < 0.0 || t > self.length {
            return None;
        }
        let p = self.start + self.direction * t;
        if !polygon.contains(p) {
            return None;
        }
        Some((t, p))
    }

    /// Closest point on the infinite line through the segment, along with
    /// its unclamped ray parameter.
    pub fn closest_point_to_line(&self, q: Point3<ScenePos>) -> (ScenePos, Point3<ScenePos>) {
        let t = (q - self.start).dot(self.direction);
        (t, self.start + self.direction * t)
    }

    /// Closest points between the interiors of two segments. Returns None if
    /// the segments are parallel or if the closest points of the infinite
    /// lines fall outside either segment.
    pub fn closest_interior_points(&self, other: &RaySegment3D) -> Option<(Point3<ScenePos>, Point3<ScenePos>)> {
        let b = self.direction.dot(other.direction);
        let denom = 1.0 - b * b;
        if denom < COLLISION_EPSILON {
            return None;
        }
        let r = self.start - other.start;
        let c = self.direction.dot(r);
        let f = other.direction.dot(r);
        let s = (b * f - c) / denom;
        let t = b * s + f;
        if s < 0.0 || s > self.length || t < 0.0 || t > other.length {
            return None;
        }
        Some((self.start + self.direction * s, other.start + other.direction * t))
    }
}

/// Often times we want to determine how close to objects are, or what pair of
/// points on their surfaces are closest.
pub trait MinDistance<To = Point3<ScenePos>, Result = Point3<ScenePos>> {
    fn min_dist(&self, to: &To) -> Result;
}

impl MinDistance<Point3<ScenePos>> for PlaneNd {
    fn min_dist(&self, q: &Point3<ScenePos>) -> Point3<ScenePos> {
        self.project(*q)
    }
}

impl MinDistance<Point3<ScenePos>> for RaySegment3D {
    /// Returns closest point on segment to q
    fn min_dist(&self, q: &Point3<ScenePos>) -> Point3<ScenePos> {
        let (t, _) = self.closest_point_to_line(*q);
        self.start + self.direction * t.max(0.0).min(self.length)
    }
}

/// A planar convex polygon with precomputed supporting plane and outward
/// edge planes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ConvexPolygon3D<const N: usize> {
    pub corners: [Point3<ScenePos>; N],
    pub plane: PlaneNd,
    edge_planes: [PlaneNd; N],
}

impl<const N: usize> ConvexPolygon3D<N> {
    /// Build from counter-clockwise corners. Returns None for degenerate
    /// polygons.
    pub fn new(corners: [Point3<ScenePos>; N]) -> Option<Self> {
        assert!(N >= 3, "a polygon needs at least three corners");
        // Newell's method, robust for slightly non-planar quads.
        let mut n = Vector3::zero();
        for i in 0..N {
            let a = corners[i];
            let b = corners[(i + 1) % N];
            n += Vector3::new(
                (a.y - b.y) * (a.z + b.z),
                (a.z - b.z) * (a.x + b.x),
                (a.x - b.x) * (a.y + b.y),
            );
        }
        let l2 = n.magnitude2();
        if l2 < COLLISION_EPSILON * COLLISION_EPSILON {
            return None;
        }
        let normal = n / l2.sqrt();
        let centroid = corners.iter().fold(Vector3::zero(), |s, c| s + c.to_vec()) / N as ScenePos;
        let plane = PlaneNd::from_normal_and_point(normal, Point3::from_vec(centroid));
        let mut degenerate = false;
        let edge_planes = std::array::from_fn(|i| {
            let a = corners[i];
            let e = corners[(i + 1) % N] - a;
            let en = e.cross(normal);
            let el2 = en.magnitude2();
            if el2 < COLLISION_EPSILON * COLLISION_EPSILON {
                degenerate = true;
                return plane;
            }
            PlaneNd::from_normal_and_point(en / el2.sqrt(), a)
        });
        if degenerate {
            return None;
        }
        Some(ConvexPolygon3D { corners, plane, edge_planes })
    }

    /// True if the point lies inside the infinite prism spanned by the
    /// polygon along its normal.
    pub fn contains(&self, p: Point3<ScenePos>) -> bool {
        self.edge_planes.iter().all(|e| e.distance(p) <= COLLISION_EPSILON.sqrt())
    }

    pub fn transformed(&self, m: &TransformationMatrix) -> Option<Self> {
        ConvexPolygon3D::new(self.corners.map(|c| m.transform(c)))
    }

    /// The same polygon with reversed winding and flipped normal.
    pub fn negated(&self) -> Self {
        let mut corners = self.corners;
        corners.reverse();
        let mut edge_planes = self.edge_planes;
        edge_planes.reverse();
        // Edge i of the reversed polygon runs from corner N-1-i to N-2-i,
        // which is the former edge N-2-i.
        edge_planes.rotate_left(1);
        ConvexPolygon3D {
            corners,
            plane: -self.plane,
            edge_planes,
        }
    }

    pub fn center(&self) -> Point3<ScenePos> {
        let s = self.corners.iter().fold(Vector3::zero(), |s, c| s + c.to_vec());
        Point3::from_vec(s / N as ScenePos)
    }
}

#[cfg(test)]
mod tests {
    mod geom {
        use approx::assert_relative_eq;
        use cgmath::{Matrix3, Point3, Rad, SquareMatrix, Vector3};
        use crate::geom::*;

        fn unit_triangle() -> ConvexPolygon3D<3> {
            ConvexPolygon3D::new([
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ]).unwrap()
        }

        #[test]
        fn test_plane_intercept() {
            let p = PlaneNd::from_normal_and_point(Vector3::new(0.0, 1.0, 0.0), Point3::new(5.0, 2.0, -1.0));
            assert_relative_eq!(p.intercept, -2.0);
            assert_relative_eq!(p.distance(Point3::new(0.0, 3.0, 0.0)), 1.0);
            assert_relative_eq!((-p).distance(Point3::new(0.0, 3.0, 0.0)), -1.0);
        }

        #[test]
        fn test_polygon_contains() {
            let t = unit_triangle();
            assert_relative_eq!(t.plane.normal, Vector3::new(0.0, 0.0, 1.0));
            assert!(t.contains(Point3::new(0.2, 0.2, 5.0)));
            assert!(!t.contains(Point3::new(0.8, 0.8, 0.0)));
            assert!(!t.contains(Point3::new(-0.1, 0.5, 0.0)));
        }

        #[test]
        fn test_polygon_negated() {
            let t = unit_triangle().negated();
            assert_relative_eq!(t.plane.normal, Vector3::new(0.0, 0.0, -1.0));
            assert!(t.contains(Point3::new(0.2, 0.2, 5.0)));
            assert!(!t.contains(Point3::new(0.8, 0.8, 0.0)));
            assert!(!t.contains(Point3::new(0.5, -0.1, 0.0)));
        }

        #[test]
        fn test_ray_polygon() {
            let t = unit_triangle();
            let r = RaySegment3D::from_points(Point3::new(0.25, 0.25, 1.0), Point3::new(0.25, 0.25, -1.0));
            let (rt, p) = r.intersects(&t).unwrap();
            assert_relative_eq!(rt, 1.0);
            assert_relative_eq!(p, Point3::new(0.25, 0.25, 0.0));
            // Too short.
            let r = RaySegment3D::from_points(Point3::new(0.25, 0.25, 1.0), Point3::new(0.25, 0.25, 0.5));
            assert!(r.intersects(&t).is_none());
            // Coplanar.
            let r = RaySegment3D::from_points(Point3::new(-1.0, 0.25, 0.0), Point3::new(2.0, 0.25, 0.0));
            assert!(r.intersects(&t).is_none());
            // Misses the bounds.
            let r = RaySegment3D::from_points(Point3::new(2.0, 2.0, 1.0), Point3::new(2.0, 2.0, -1.0));
            assert!(r.intersects(&t).is_none());
        }

        #[test]
        fn test_closest_interior_points() {
            let a = RaySegment3D::from_points(Point3::new(-1.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0));
            let b = RaySegment3D::from_points(Point3::new(0.0, -1.0, 1.0), Point3::new(0.0, 1.0, 1.0));
            let (p0, p1) = a.closest_interior_points(&b).unwrap();
            assert_relative_eq!(p0, Point3::new(0.0, 0.0, 0.0));
            assert_relative_eq!(p1, Point3::new(0.0, 0.0, 1.0));
            let c = RaySegment3D::from_points(Point3::new(-1.0, 1.0, 0.0), Point3::new(1.0, 1.0, 0.0));
            assert!(a.closest_interior_points(&c).is_none());
        }

        #[test]
        fn test_transformation_scale() {
            let rot = TransformationMatrix::new(
                Matrix3::from_angle_y(Rad(0.7)),
                Vector3::new(1.0, 2.0, 3.0),
            );
            assert_relative_eq!(rot.get_scale(), 1.0, epsilon = 1e-12);
            let scaled = TransformationMatrix::new(Matrix3::from_diagonal(Vector3::new(2.0, 2.0, 2.0)), Vector3::new(0.0, 0.0, 0.0));
            assert_relative_eq!(scaled.get_scale(), 2.0);
            let inv = rot.inverse().unwrap();
            let p = Point3::new(4.0, -2.0, 0.5);
            assert_relative_eq!(inv.transform(rot.transform(p)), p, epsilon = 1e-12);
            assert_relative_eq!(rot.compose(&inv).transform(p), p, epsilon = 1e-12);
        }

        #[test]
        fn test_plane_transformed() {
            let p = PlaneNd::from_normal_and_point(Vector3::new(0.0, 1.0, 0.0), Point3::new(0.0, 1.0, 0.0));
            let m = TransformationMatrix::from_translation(Vector3::new(0.0, 2.0, 0.0));
            let q = p.transformed(&m);
            assert_relative_eq!(q.distance(Point3::new(0.0, 3.0, 0.0)), 0.0);
        }
    }
}
