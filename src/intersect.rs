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

//! Narrow-phase dispatch over every pair of collision operands.
//!
//! The first operand is the surface side (quad, triangle or intersectable),
//! the second one the probing side (line, ridge or intersectable). Whenever
//! an intersectable reports a hit on behalf of the first operand its normal
//! is negated, so that swapping two intersectables flips the sign of the
//! reported normal.

use cgmath::{Point3, Vector3};

use crate::bounds::BoundingSphere;
use crate::collision::*;
use crate::geom::*;
use crate::intersectable::*;
use crate::precision::ScenePos;

/// Surface-side operand.
#[derive(Copy, Clone, Debug)]
pub enum Operand0<'a> {
    Quad(&'a CollisionQuadSphere),
    Triangle(&'a CollisionTriangleSphere),
    Intersectable(&'a dyn Intersectable),
}

/// Probing-side operand.
#[derive(Copy, Clone, Debug)]
pub enum Operand1<'a> {
    Line(&'a CollisionLineSphere),
    Ridge(&'a CollisionRidgeSphere),
    Intersectable(&'a dyn Intersectable),
}

impl<'a> Operand0<'a> {
    /// The supporting plane, if the operand is a polygon.
    pub fn plane(&self) -> Option<&'a PlaneNd> {
        match *self {
            Operand0::Quad(q) => Some(&q.polygon.plane),
            Operand0::Triangle(t) => Some(&t.polygon.plane),
            Operand0::Intersectable(_) => None,
        }
    }

    pub fn bounding_sphere(&self) -> BoundingSphere {
        match *self {
            Operand0::Quad(q) => q.bounding_sphere,
            Operand0::Triangle(t) => t.bounding_sphere,
            Operand0::Intersectable(i) => i.bounding_sphere(),
        }
    }
}

impl<'a> Operand1<'a> {
    /// The ray of a line or ridge.
    pub fn ray(&self) -> Option<&'a RaySegment3D> {
        match *self {
            Operand1::Line(l) => Some(&l.ray),
            Operand1::Ridge(r) => Some(&r.ray),
            Operand1::Intersectable(_) => None,
        }
    }

    /// Identity of a line or ridge.
    pub fn line_id(&self) -> Option<LineId> {
        match *self {
            Operand1::Line(l) => Some(l.id),
            Operand1::Ridge(r) => Some(r.id),
            Operand1::Intersectable(_) => None,
        }
    }

    pub fn bounding_sphere(&self) -> BoundingSphere {
        match *self {
            Operand1::Line(l) => l.bounding_sphere,
            Operand1::Ridge(r) => r.bounding_sphere,
            Operand1::Intersectable(i) => i.bounding_sphere(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NormalAndOverlap {
    pub normal: Vector3<ScenePos>,
    pub overlap: ScenePos,
}

/// Result of one narrow-phase test.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum IntersectionInfo {
    /// A line or ridge pierced a polygon. Only the polygon normal is known.
    PolygonLine {
        point: Point3<ScenePos>,
        ray_t: ScenePos,
        polygon_normal: Vector3<ScenePos>,
    },
    /// A hit involving an intersectable. `ray_t` is NaN unless the
    /// intersectable computed one.
    Static {
        point: Point3<ScenePos>,
        normal: Vector3<ScenePos>,
        overlap: ScenePos,
        ray_t: ScenePos,
    },
}

impl IntersectionInfo {
    pub fn intersection_point(&self) -> Point3<ScenePos> {
        match *self {
            IntersectionInfo::PolygonLine { point, .. } => point,
            IntersectionInfo::Static { point, .. } => point,
        }
    }

    pub fn has_normal_and_overlap(&self) -> bool {
        match *self {
            IntersectionInfo::PolygonLine { .. } => false,
            IntersectionInfo::Static { .. } => true,
        }
    }

    pub fn normal_and_overlap(&self) -> Option<NormalAndOverlap> {
        match *self {
            IntersectionInfo::PolygonLine { .. } => None,
            IntersectionInfo::Static { normal, overlap, .. } => Some(NormalAndOverlap { normal, overlap }),
        }
    }

    /// The ray parameter, or None if the test could not compute one.
    pub fn try_ray_t(&self) -> Option<ScenePos> {
        let t = match *self {
            IntersectionInfo::PolygonLine { ray_t, .. } => ray_t,
            IntersectionInfo::Static { ray_t, .. } => ray_t,
        };
        if t.is_nan() {
            None
        } else {
            Some(t)
        }
    }

    pub fn ray_t(&self) -> ScenePos {
        match self.try_ray_t() {
            Some(t) => t,
            None => panic!("ray t is NaN"),
        }
    }

    /// The first operand's normal. For polygon hits this is the plane
    /// normal.
    pub fn normal0(&self) -> Vector3<ScenePos> {
        match *self {
            IntersectionInfo::PolygonLine { polygon_normal, .. } => polygon_normal,
            IntersectionInfo::Static { normal, .. } => normal,
        }
    }

    pub fn normal(&self) -> Vector3<ScenePos> {
        match *self {
            IntersectionInfo::PolygonLine { .. } => panic!("polygon-line intersection has no contact normal"),
            IntersectionInfo::Static { normal, .. } => normal,
        }
    }

    pub fn overlap(&self) -> ScenePos {
        match *self {
            IntersectionInfo::PolygonLine { .. } => panic!("polygon-line intersection has no overlap"),
            IntersectionInfo::Static { overlap, .. } => overlap,
        }
    }
}

fn polygon_line<const N: usize>(polygon: &ConvexPolygon3D<N>, ray: &RaySegment3D) -> Option<IntersectionInfo> {
    ray.intersects(polygon).map(|(ray_t, point)| IntersectionInfo::PolygonLine {
        point,
        ray_t,
        polygon_normal: polygon.plane.normal,
    })
}

fn static_info(hit: IntersectableHit, negate: bool, ray_t: ScenePos) -> IntersectionInfo {
    IntersectionInfo::Static {
        point: hit.point,
        normal: if negate { -hit.normal } else { hit.normal },
        overlap: hit.overlap,
        ray_t,
    }
}

/// Run the narrow-phase test for one operand pair.
pub fn intersect(o0: Operand0, o1: Operand1) -> Option<IntersectionInfo> {
    use self::Operand0 as A;
    use self::Operand1 as B;
    let nan = ScenePos::NAN;
    match (o0, o1) {
        (A::Quad(q), B::Line(l)) => polygon_line(&q.polygon, &l.ray),
        (A::Quad(q), B::Ridge(r)) => polygon_line(&q.polygon, &r.ray),
        (A::Triangle(t), B::Line(l)) => polygon_line(&t.polygon, &l.ray),
        (A::Triangle(t), B::Ridge(r)) => polygon_line(&t.polygon, &r.ray),
        (A::Quad(q), B::Intersectable(i1)) => i1.intersects_quad(q).map(|h| static_info(h, true, nan)),
        (A::Triangle(t), B::Intersectable(i1)) => i1.intersects_triangle(t).map(|h| static_info(h, true, nan)),
        (A::Intersectable(i0), B::Ridge(r)) => i0.intersects_ridge(r).map(|h| static_info(h, false, nan)),
        (A::Intersectable(i0), B::Line(l)) => i0.intersects_line(l).map(|h| static_info(h, false, h.ray_t)),
        (A::Intersectable(i0), B::Intersectable(i1)) => {
            i0.intersects_intersectable(i1).map(|h| static_info(h, true, nan))
        }
    }
}
