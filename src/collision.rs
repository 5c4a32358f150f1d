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

//! Collision shapes fed to the narrow phase.
//!
//! Every shape carries a bounding sphere for broad-phase rejection and the
//! physics material of the mesh it was taken from. Lines and ridges also
//! carry a `LineId`, which is how per-tick records refer to them.

use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::sync::atomic::{AtomicU64, Ordering};

use cgmath::{InnerSpace, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::bounds::*;
use crate::geom::*;
use crate::precision::ScenePos;

/// Stable identity of a line or ridge. Issued once when the shape is built
/// and never reused.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineId(u64);

impl LineId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        LineId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Material flags of a collision mesh.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysicsMaterial(u32);

impl PhysicsMaterial {
    pub const NONE: PhysicsMaterial = PhysicsMaterial(0);
    pub const ATTR_CONVEX: PhysicsMaterial = PhysicsMaterial(1 << 0);
    pub const ATTR_CONCAVE: PhysicsMaterial = PhysicsMaterial(1 << 1);
    pub const ATTR_TWO_SIDED: PhysicsMaterial = PhysicsMaterial(1 << 2);
    pub const ATTR_ROUND: PhysicsMaterial = PhysicsMaterial(1 << 3);
    pub const ATTR_ALIGN_STRICT: PhysicsMaterial = PhysicsMaterial(1 << 4);
    pub const OBJ_BULLET_LINE_SEGMENT: PhysicsMaterial = PhysicsMaterial(1 << 5);
    pub const OBJ_ALIGNMENT_PLANE: PhysicsMaterial = PhysicsMaterial(1 << 6);
    pub const OBJ_ALIGNMENT_CONTACT: PhysicsMaterial = PhysicsMaterial(1 << 7);
    /// Polygons a body grinds with.
    pub const OBJ_GRIND_CONTACT: PhysicsMaterial = PhysicsMaterial(1 << 8);
    /// Lines that act as rails.
    pub const OBJ_GRIND_LINE: PhysicsMaterial = PhysicsMaterial(1 << 9);

    /// True if any of the flags in `other` are set.
    #[inline(always)]
    pub fn any(self, other: PhysicsMaterial) -> bool {
        self.0 & other.0 != 0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for PhysicsMaterial {
    type Output = PhysicsMaterial;

    fn bitor(self, rhs: PhysicsMaterial) -> PhysicsMaterial {
        PhysicsMaterial(self.0 | rhs.0)
    }
}

impl BitOrAssign for PhysicsMaterial {
    fn bitor_assign(&mut self, rhs: PhysicsMaterial) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for PhysicsMaterial {
    type Output = PhysicsMaterial;

    fn bitand(self, rhs: PhysicsMaterial) -> PhysicsMaterial {
        PhysicsMaterial(self.0 & rhs.0)
    }
}

/// A convex polygon (triangle or quad) with its bounding sphere.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CollisionPolygonSphere<const N: usize> {
    pub bounding_sphere: BoundingSphere,
    pub polygon: ConvexPolygon3D<N>,
    pub physics_material: PhysicsMaterial,
}

pub type CollisionTriangleSphere = CollisionPolygonSphere<3>;
pub type CollisionQuadSphere = CollisionPolygonSphere<4>;

impl<const N: usize> CollisionPolygonSphere<N> {
    /// Returns None if the corners are degenerate.
    pub fn new(corners: [Point3<ScenePos>; N], physics_material: PhysicsMaterial) -> Option<Self> {
        let polygon = ConvexPolygon3D::new(corners)?;
        Some(CollisionPolygonSphere {
            bounding_sphere: BoundingSphere::from_points(&corners),
            polygon,
            physics_material,
        })
    }

    #[inline(always)]
    pub fn corners(&self) -> &[Point3<ScenePos>; N] {
        &self.polygon.corners
    }

    #[inline(always)]
    pub fn plane(&self) -> &PlaneNd {
        &self.polygon.plane
    }

    pub fn transformed(&self, m: &TransformationMatrix) -> Option<Self> {
        Some(CollisionPolygonSphere {
            bounding_sphere: self.bounding_sphere.transformed(m),
            polygon: self.polygon.transformed(m)?,
            physics_material: self.physics_material,
        })
    }

    pub fn negated(&self) -> Self {
        CollisionPolygonSphere {
            polygon: self.polygon.negated(),
            ..*self
        }
    }

    pub fn aabb(&self) -> AxisAlignedBoundingBox {
        AxisAlignedBoundingBox::from_points(self.polygon.corners.iter())
    }
}

/// An edge between two faces that meet at a sharp enough angle to be
/// collided as a two-sided ray.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CollisionRidgeSphere {
    pub bounding_sphere: BoundingSphere,
    pub edge: [Point3<ScenePos>; 2],
    pub ray: RaySegment3D,
    /// Mean of the two face normals.
    pub normal: Vector3<ScenePos>,
    /// Cosine between the two face normals.
    pub min_cos: ScenePos,
    pub physics_material: PhysicsMaterial,
    pub id: LineId,
}

impl CollisionRidgeSphere {
    pub fn new(
        edge: [Point3<ScenePos>; 2],
        normal: Vector3<ScenePos>,
        min_cos: ScenePos,
        physics_material: PhysicsMaterial,
    ) -> Self {
        CollisionRidgeSphere {
            bounding_sphere: BoundingSphere::from_diameter(edge[0], edge[1]),
            edge,
            ray: RaySegment3D::from_points(edge[0], edge[1]),
            normal: normal.normalize(),
            min_cos,
            physics_material,
            id: LineId::next(),
        }
    }

    pub fn transformed(&self, m: &TransformationMatrix) -> Self {
        CollisionRidgeSphere::new(
            self.edge.map(|p| m.transform(p)),
            m.rotate(self.normal),
            self.min_cos,
            self.physics_material,
        )
    }

    pub fn aabb(&self) -> AxisAlignedBoundingBox {
        AxisAlignedBoundingBox::from_points(self.edge.iter())
    }
}

/// A line segment, either part of a mesh or a raycast such as a bullet
/// trace.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CollisionLineSphere {
    pub bounding_sphere: BoundingSphere,
    pub line: [Point3<ScenePos>; 2],
    pub ray: RaySegment3D,
    pub physics_material: PhysicsMaterial,
    pub id: LineId,
}

impl CollisionLineSphere {
    pub fn new(line: [Point3<ScenePos>; 2], physics_material: PhysicsMaterial) -> Self {
        CollisionLineSphere {
            bounding_sphere: BoundingSphere::from_diameter(line[0], line[1]),
            line,
            ray: RaySegment3D::from_points(line[0], line[1]),
            physics_material,
            id: LineId::next(),
        }
    }

    /// The transformed line is a new shape and gets a new id.
    pub fn transformed(&self, m: &TransformationMatrix) -> Self {
        CollisionLineSphere::new(self.line.map(|p| m.transform(p)), self.physics_material)
    }

    pub fn aabb(&self) -> AxisAlignedBoundingBox {
        AxisAlignedBoundingBox::from_points(self.line.iter())
    }
}

impl<const N: usize> BoundedBy<BoundingSphere> for CollisionPolygonSphere<N> {
    fn bounds(&self) -> BoundingSphere {
        self.bounding_sphere
    }
}

impl BoundedBy<BoundingSphere> for CollisionRidgeSphere {
    fn bounds(&self) -> BoundingSphere {
        self.bounding_sphere
    }
}

impl BoundedBy<BoundingSphere> for CollisionLineSphere {
    fn bounds(&self) -> BoundingSphere {
        self.bounding_sphere
    }
}
