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
use std::fmt;
use std::sync::Arc;

use cgmath::{InnerSpace, Point3, Vector3};

use crate::bounds::*;
use crate::collision::*;
use crate::geom::*;
use crate::precision::ScenePos;

/// A hit reported by an opaque convex shape. The normal points from the
/// intersectable towards the other operand.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntersectableHit {
    pub point: Point3<ScenePos>,
    pub normal: Vector3<ScenePos>,
    pub overlap: ScenePos,
    /// NaN unless the shape knows where along a line the hit happened.
    pub ray_t: ScenePos,
}

/// An opaque convex shape that can be tested against every collision
/// primitive.
pub trait Intersectable: fmt::Debug + Send + Sync + 'static {
    fn bounding_sphere(&self) -> BoundingSphere;

    fn aabb(&self) -> AxisAlignedBoundingBox;

    fn intersects_quad(&self, q: &CollisionQuadSphere) -> Option<IntersectableHit>;

    fn intersects_triangle(&self, t: &CollisionTriangleSphere) -> Option<IntersectableHit>;

    fn intersects_ridge(&self, r: &CollisionRidgeSphere) -> Option<IntersectableHit>;

    fn intersects_line(&self, l: &CollisionLineSphere) -> Option<IntersectableHit>;

    /// Test against another intersectable expressed in the same frame.
    fn intersects_intersectable(&self, other: &dyn Intersectable) -> Option<IntersectableHit>;

    /// Test against another intersectable placed in this one's frame by
    /// `trafo`.
    fn intersects_intersectable_transformed(
        &self,
        other: &dyn Intersectable,
        trafo: &TransformationMatrix,
    ) -> Option<IntersectableHit>;

    fn as_any(&self) -> &dyn Any;
}

/// An intersectable in local coordinates together with its placement in the
/// world. Operands are pulled into the local frame, tested there, and the
/// result is pushed back out.
#[derive(Clone, Debug)]
pub struct TransformedIntersectable {
    child: Arc<dyn Intersectable>,
    trafo: TransformationMatrix,
    inverse: TransformationMatrix,
}

impl TransformedIntersectable {
    /// Returns None if the transformation is singular.
    pub fn new(child: Arc<dyn Intersectable>, trafo: TransformationMatrix) -> Option<Self> {
        let inverse = trafo.inverse()?;
        Some(TransformedIntersectable { child, trafo, inverse })
    }

    pub fn trafo(&self) -> &TransformationMatrix {
        &self.trafo
    }

    fn to_world(&self, hit: IntersectableHit) -> IntersectableHit {
        IntersectableHit {
            point: self.trafo.transform(hit.point),
            normal: self.trafo.rotate(hit.normal).normalize(),
            ..hit
        }
    }

    fn reaches(&self, bs: &BoundingSphere) -> bool {
        bs.transformed(&self.inverse).intersects_aabb(&self.child.aabb())
    }
}

impl Intersectable for TransformedIntersectable {
    fn bounding_sphere(&self) -> BoundingSphere {
        self.child.bounding_sphere().transformed(&self.trafo)
    }

    fn aabb(&self) -> AxisAlignedBoundingBox {
        AxisAlignedBoundingBox::from_points(self.child.aabb().transformed_corners(&self.trafo).iter())
    }

    fn intersects_quad(&self, q: &CollisionQuadSphere) -> Option<IntersectableHit> {
        if !self.reaches(&q.bounding_sphere) {
            return None;
        }
        self.child
            .intersects_quad(&q.transformed(&self.inverse)?)
            .map(|h| self.to_world(h))
    }

    fn intersects_triangle(&self, t: &CollisionTriangleSphere) -> Option<IntersectableHit> {
        if !self.reaches(&t.bounding_sphere) {
            return None;
        }
        self.child
            .intersects_triangle(&t.transformed(&self.inverse)?)
            .map(|h| self.to_world(h))
    }

    fn intersects_ridge(&self, r: &CollisionRidgeSphere) -> Option<IntersectableHit> {
        if !self.reaches(&r.bounding_sphere) {
            return None;
        }
        self.child
            .intersects_ridge(&r.transformed(&self.inverse))
            .map(|h| self.to_world(h))
    }

    fn intersects_line(&self, l: &CollisionLineSphere) -> Option<IntersectableHit> {
        if !self.reaches(&l.bounding_sphere) {
            return None;
        }
        self.child
            .intersects_line(&l.transformed(&self.inverse))
            .map(|h| self.to_world(h))
    }

    fn intersects_intersectable(&self, other: &dyn Intersectable) -> Option<IntersectableHit> {
        let other = match other.as_any().downcast_ref::<TransformedIntersectable>() {
            Some(o) => o,
            None => panic!("TransformedIntersectable can only intersect children of the same type"),
        };
        let relative = self.inverse.compose(&other.trafo);
        self.child
            .intersects_intersectable_transformed(other.child.as_ref(), &relative)
            .map(|h| self.to_world(h))
    }

    fn intersects_intersectable_transformed(
        &self,
        _other: &dyn Intersectable,
        _trafo: &TransformationMatrix,
    ) -> Option<IntersectableHit> {
        panic!("TransformedIntersectable received an additional transformation matrix");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
