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

use cgmath::{EuclideanSpace, InnerSpace, Point3, Vector3, Zero};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::geom::*;
use crate::precision::ScenePos;

/// A type that can be decomposed into a bound.
pub trait BoundedBy<B> {
    fn bounds(&self) -> B;
}

/// A center and a radius. Generic over the point type so that the same
/// volume serves 2D and 3D callers.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere<P = Point3<ScenePos>> {
    pub center: P,
    pub radius: ScenePos,
}

impl<P> BoundingSphere<P>
where
    P: EuclideanSpace<Scalar = ScenePos>,
    P::Diff: InnerSpace<Scalar = ScenePos>,
{
    pub fn new(center: P, radius: ScenePos) -> Self {
        assert!(radius >= 0.0, "bounding sphere radius must be non-negative, got {}", radius);
        BoundingSphere { center, radius }
    }

    /// The sphere that has the segment `a`-`b` as its diameter.
    pub fn from_diameter(a: P, b: P) -> Self {
        let half = (b - a) * 0.5;
        BoundingSphere {
            center: a + half,
            radius: half.magnitude(),
        }
    }

    /// The sphere around `center` that just encloses every point.
    pub fn from_center_and_points<'a, I>(center: P, points: I) -> Self
    where
        I: IntoIterator<Item = &'a P>,
        P: 'a,
    {
        let r2 = points
            .into_iter()
            .fold(0.0, |r2: ScenePos, p| r2.max((*p - center).magnitude2()));
        BoundingSphere {
            center,
            radius: r2.sqrt(),
        }
    }

    /// True if the point lies inside the sphere grown by `tolerance`.
    pub fn contains_with_tolerance(&self, p: P, tolerance: ScenePos) -> bool {
        let r = self.radius + tolerance;
        (p - self.center).magnitude2() <= r * r
    }

    pub fn contains(&self, p: P) -> bool {
        self.contains_with_tolerance(p, 0.0)
    }

    pub fn intersects(&self, other: &BoundingSphere<P>) -> bool {
        let r = self.radius + other.radius;
        (other.center - self.center).magnitude2() <= r * r
    }
}

impl BoundingSphere<Point3<ScenePos>> {
    /// A cheap enclosing sphere centered at the mean of the points. Not
    /// minimal; see `welzl_from_iterator` for that.
    pub fn from_points(points: &[Point3<ScenePos>]) -> Self {
        assert!(!points.is_empty(), "cannot bound an empty point set");
        let mean = points.iter().fold(Vector3::zero(), |s, p| s + p.to_vec()) / points.len() as ScenePos;
        BoundingSphere::from_center_and_points(Point3::from_vec(mean), points.iter())
    }

    pub fn intersects_plane(&self, plane: &PlaneNd) -> bool {
        plane.distance(self.center).abs() <= self.radius
    }

    pub fn intersects_aabb(&self, aabb: &AxisAlignedBoundingBox) -> bool {
        (aabb.closest_point(self.center) - self.center).magnitude2() <= self.radius * self.radius
    }

    /// Transform the center and rescale the radius by the RMS scale of the
    /// transformation. Only conservative for similarity transforms.
    pub fn transformed(&self, m: &TransformationMatrix) -> Self {
        BoundingSphere {
            center: m.transform(self.center),
            radius: self.radius * m.get_scale(),
        }
    }
}

/// Corner index bit layout: bit 0 selects max x, bit 1 max y, bit 2 max z.
const FACE_CORNERS: [[usize; 4]; 6] = [
    [0, 4, 6, 2], // -x
    [1, 3, 7, 5], // +x
    [0, 1, 5, 4], // -y
    [2, 6, 7, 3], // +y
    [0, 2, 3, 1], // -z
    [4, 5, 7, 6], // +z
];

/// An axis aligned box stored as its two extreme corners.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisAlignedBoundingBox {
    pub min: Point3<ScenePos>,
    pub max: Point3<ScenePos>,
}

impl AxisAlignedBoundingBox {
    /// No ordering check is done here; callers that shrink boxes inspect
    /// `size()` themselves.
    pub fn from_min_max(min: Point3<ScenePos>, max: Point3<ScenePos>) -> Self {
        AxisAlignedBoundingBox { min, max }
    }

    pub fn from_points<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a Point3<ScenePos>>,
    {
        let mut it = points.into_iter();
        let first = match it.next() {
            Some(p) => *p,
            None => panic!("cannot bound an empty point set"),
        };
        it.fold(
            AxisAlignedBoundingBox { min: first, max: first },
            |b, p| AxisAlignedBoundingBox {
                min: Point3::new(b.min.x.min(p.x), b.min.y.min(p.y), b.min.z.min(p.z)),
                max: Point3::new(b.max.x.max(p.x), b.max.y.max(p.y), b.max.z.max(p.z)),
            },
        )
    }

    pub fn from_center_and_radius(center: Point3<ScenePos>, radius: ScenePos) -> Self {
        let r = Vector3::new(radius, radius, radius);
        AxisAlignedBoundingBox {
            min: center - r,
            max: center + r,
        }
    }

    #[inline(always)]
    pub fn size(&self) -> Vector3<ScenePos> {
        self.max - self.min
    }

    pub fn intersects(&self, other: &AxisAlignedBoundingBox) -> bool {
        self.min.x <= other.max.x && other.min.x <= self.max.x
            && self.min.y <= other.max.y && other.min.y <= self.max.y
            && self.min.z <= other.max.z && other.min.z <= self.max.z
    }

    pub fn contains_point(&self, p: Point3<ScenePos>) -> bool {
        self.min.x <= p.x && p.x <= self.max.x
            && self.min.y <= p.y && p.y <= self.max.y
            && self.min.z <= p.z && p.z <= self.max.z
    }

    pub fn closest_point(&self, p: Point3<ScenePos>) -> Point3<ScenePos> {
        Point3::new(
            p.x.max(self.min.x).min(self.max.x),
            p.y.max(self.min.y).min(self.max.y),
            p.z.max(self.min.z).min(self.max.z),
        )
    }

    #[inline]
    pub fn corner(&self, i: usize) -> Point3<ScenePos> {
        Point3::new(
            if i & 1 == 0 { self.min.x } else { self.max.x },
            if i & 2 == 0 { self.min.y } else { self.max.y },
            if i & 4 == 0 { self.min.z } else { self.max.z },
        )
    }

    pub fn corners(&self) -> [Point3<ScenePos>; 8] {
        std::array::from_fn(|i| self.corner(i))
    }

    /// The twelve edges as corner pairs.
    pub fn edges(&self) -> SmallVec<[[Point3<ScenePos>; 2]; 12]> {
        let mut edges = SmallVec::new();
        for i in 0..8 {
            for &bit in &[1, 2, 4] {
                if i & bit == 0 {
                    edges.push([self.corner(i), self.corner(i | bit)]);
                }
            }
        }
        edges
    }

    /// The faces with outward normals. Faces of a flat box are skipped.
    pub fn faces(&self) -> SmallVec<[ConvexPolygon3D<4>; 6]> {
        FACE_CORNERS
            .iter()
            .filter_map(|f| ConvexPolygon3D::new(f.map(|i| self.corner(i))))
            .collect()
    }

    pub fn transformed_corners(&self, m: &TransformationMatrix) -> [Point3<ScenePos>; 8] {
        self.corners().map(|c| m.transform(c))
    }
}

impl BoundedBy<BoundingSphere> for AxisAlignedBoundingBox {
    fn bounds(&self) -> BoundingSphere {
        BoundingSphere::from_diameter(self.min, self.max)
    }
}

impl BoundedBy<AxisAlignedBoundingBox> for BoundingSphere {
    fn bounds(&self) -> AxisAlignedBoundingBox {
        AxisAlignedBoundingBox::from_center_and_radius(self.center, self.radius)
    }
}
