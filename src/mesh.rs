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

//! Base meshes and their world-space instances.
//!
//! A `ColoredVertexArray` is loaded once and shared. Each placement of it in
//! the world is a `TransformedMesh`, which materializes its collision shapes
//! on first use and keeps them for the rest of its life.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use cgmath::{InnerSpace, Point2, Point3, Vector3, Zero};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::debug;

use crate::bounds::*;
use crate::collision::*;
use crate::geom::*;
use crate::intersectable::*;
use crate::precision::*;
use crate::welzl::welzl_from_iterator;

/// A vertex as handed to the renderer.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColoredVertex {
    pub position: Point3<SceneDir>,
    pub normal: Vector3<SceneDir>,
    pub uv: Point2<SceneDir>,
    pub color: Vector3<SceneDir>,
}

impl ColoredVertex {
    /// A white vertex without normal or texture coordinates.
    pub fn new(position: Point3<SceneDir>) -> Self {
        ColoredVertex {
            position,
            normal: Vector3::zero(),
            uv: Point2::new(0.0, 0.0),
            color: Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

/// An immutable base mesh. Shared between any number of transformed
/// instances.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColoredVertexArray {
    pub name: String,
    pub physics_material: PhysicsMaterial,
    pub triangles: Vec<[ColoredVertex; 3]>,
    pub quads: Vec<[ColoredVertex; 4]>,
    pub lines: Vec<[ColoredVertex; 2]>,
}

impl ColoredVertexArray {
    pub fn new<S: Into<String>>(name: S, physics_material: PhysicsMaterial) -> Self {
        ColoredVertexArray {
            name: name.into(),
            physics_material,
            triangles: Vec::new(),
            quads: Vec::new(),
            lines: Vec::new(),
        }
    }

    pub fn push_triangle(&mut self, t: [ColoredVertex; 3]) -> usize {
        let id = self.triangles.len();
        self.triangles.push(t);
        id
    }

    pub fn push_quad(&mut self, q: [ColoredVertex; 4]) -> usize {
        let id = self.quads.len();
        self.quads.push(q);
        id
    }

    pub fn push_line(&mut self, l: [ColoredVertex; 2]) -> usize {
        let id = self.lines.len();
        self.lines.push(l);
        id
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty() && self.quads.is_empty() && self.lines.is_empty()
    }

    /// Every vertex position in world precision.
    pub fn positions(&self) -> Vec<Point3<ScenePos>> {
        self.triangles
            .iter()
            .flat_map(|t| t.iter())
            .chain(self.quads.iter().flat_map(|q| q.iter()))
            .chain(self.lines.iter().flat_map(|l| l.iter()))
            .map(|v| to_scene_point(v.position))
            .collect()
    }

    /// Minimal bounding sphere in local coordinates.
    pub fn bounding_sphere(&self) -> BoundingSphere {
        welzl_from_iterator(self.positions().iter())
    }

    pub fn aabb(&self) -> AxisAlignedBoundingBox {
        AxisAlignedBoundingBox::from_points(self.positions().iter())
    }

    /// Triangles placed by `m`. Degenerate triangles are dropped.
    pub fn transformed_triangles(&self, m: &TransformationMatrix) -> Vec<CollisionTriangleSphere> {
        self.triangles
            .iter()
            .filter_map(|t| CollisionTriangleSphere::new(t.map(|v| m.transform(to_scene_point(v.position))), self.physics_material))
            .collect()
    }

    /// Quads placed by `m`. Degenerate quads are dropped.
    pub fn transformed_quads(&self, m: &TransformationMatrix) -> Vec<CollisionQuadSphere> {
        self.quads
            .iter()
            .filter_map(|q| CollisionQuadSphere::new(q.map(|v| m.transform(to_scene_point(v.position))), self.physics_material))
            .collect()
    }

    /// Lines placed by `m`. Zero length lines are dropped.
    pub fn transformed_lines(&self, m: &TransformationMatrix) -> Vec<CollisionLineSphere> {
        self.lines
            .iter()
            .filter(|l| l[0].position != l[1].position)
            .map(|l| CollisionLineSphere::new(l.map(|v| m.transform(to_scene_point(v.position))), self.physics_material))
            .collect()
    }
}

type EdgeKey = ([u64; 3], [u64; 3]);

fn point_key(p: Point3<ScenePos>) -> [u64; 3] {
    [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()]
}

fn edge_key(a: Point3<ScenePos>, b: Point3<ScenePos>) -> EdgeKey {
    let (ka, kb) = (point_key(a), point_key(b));
    if ka <= kb {
        (ka, kb)
    } else {
        (kb, ka)
    }
}

struct EdgeIncidence {
    edge: [Point3<ScenePos>; 2],
    normals: SmallVec<[Vector3<ScenePos>; 2]>,
}

fn add_polygon_edges<const N: usize>(
    polygon: &ConvexPolygon3D<N>,
    edges: &mut BTreeMap<EdgeKey, EdgeIncidence>,
) {
    for i in 0..N {
        let a = polygon.corners[i];
        let b = polygon.corners[(i + 1) % N];
        edges
            .entry(edge_key(a, b))
            .or_insert_with(|| EdgeIncidence { edge: [a, b], normals: SmallVec::new() })
            .normals
            .push(polygon.plane.normal);
    }
}

/// Edges shared by exactly two polygons whose normals meet at a cosine of at
/// most `max_min_cos_ridge`.
pub fn extract_ridges(
    triangles: &[CollisionTriangleSphere],
    quads: &[CollisionQuadSphere],
    max_min_cos_ridge: ScenePos,
    physics_material: PhysicsMaterial,
) -> Vec<CollisionRidgeSphere> {
    let mut edges = BTreeMap::new();
    for t in triangles {
        add_polygon_edges(&t.polygon, &mut edges);
    }
    for q in quads {
        add_polygon_edges(&q.polygon, &mut edges);
    }
    let mut ridges = Vec::new();
    for e in edges.values() {
        if e.normals.len() != 2 {
            continue;
        }
        let cos = e.normals[0].dot(e.normals[1]);
        if cos > max_min_cos_ridge {
            continue;
        }
        let n = e.normals[0] + e.normals[1];
        // Folded back onto itself.
        if n.magnitude2() < 1e-12 {
            continue;
        }
        ridges.push(CollisionRidgeSphere::new(e.edge, n, cos, physics_material));
    }
    ridges
}

/// A base mesh placed in the world.
///
/// Collision shapes are materialized lazily, at most once, and can then be
/// read from any number of threads without locking.
#[derive(Debug)]
pub struct TransformedMesh {
    name: String,
    physics_material: PhysicsMaterial,
    trafo: TransformationMatrix,
    bounding_sphere: BoundingSphere,
    mesh: Option<Arc<ColoredVertexArray>>,
    max_min_cos_ridge: ScenePos,
    intersectable: Option<TransformedIntersectable>,
    triangles: OnceLock<Vec<CollisionTriangleSphere>>,
    quads: OnceLock<Vec<CollisionQuadSphere>>,
    ridges: OnceLock<Vec<CollisionRidgeSphere>>,
    lines: OnceLock<Vec<CollisionLineSphere>>,
}

impl TransformedMesh {
    /// Place `mesh` by `trafo`. `bounding_sphere` is in mesh coordinates and
    /// is rescaled by the RMS scale of the transformation, which is not a
    /// tight bound for anisotropic scales.
    pub fn new(
        trafo: TransformationMatrix,
        bounding_sphere: &BoundingSphere,
        mesh: Arc<ColoredVertexArray>,
        max_min_cos_ridge: ScenePos,
    ) -> Self {
        TransformedMesh {
            name: mesh.name.clone(),
            physics_material: mesh.physics_material,
            trafo,
            bounding_sphere: bounding_sphere.transformed(&trafo),
            mesh: Some(mesh),
            max_min_cos_ridge,
            intersectable: None,
            triangles: OnceLock::new(),
            quads: OnceLock::new(),
            ridges: OnceLock::new(),
            lines: OnceLock::new(),
        }
    }

    /// Wrap shapes that are already in world space. No ridges are
    /// extracted.
    pub fn from_transformed<S: Into<String>>(
        name: S,
        physics_material: PhysicsMaterial,
        bounding_sphere: BoundingSphere,
        triangles: Vec<CollisionTriangleSphere>,
        lines: Vec<CollisionLineSphere>,
    ) -> Self {
        TransformedMesh {
            name: name.into(),
            physics_material,
            trafo: TransformationMatrix::identity(),
            bounding_sphere,
            mesh: None,
            max_min_cos_ridge: -1.0,
            intersectable: None,
            triangles: OnceLock::from(triangles),
            quads: OnceLock::from(Vec::new()),
            ridges: OnceLock::from(Vec::new()),
            lines: OnceLock::from(lines),
        }
    }

    /// A mesh that consists of a single opaque convex shape.
    pub fn from_intersectable<S: Into<String>>(
        name: S,
        physics_material: PhysicsMaterial,
        intersectable: TransformedIntersectable,
    ) -> Self {
        TransformedMesh {
            name: name.into(),
            physics_material,
            trafo: *intersectable.trafo(),
            bounding_sphere: intersectable.bounding_sphere(),
            mesh: None,
            max_min_cos_ridge: -1.0,
            intersectable: Some(intersectable),
            triangles: OnceLock::from(Vec::new()),
            quads: OnceLock::from(Vec::new()),
            ridges: OnceLock::from(Vec::new()),
            lines: OnceLock::from(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn physics_material(&self) -> PhysicsMaterial {
        self.physics_material
    }

    pub fn trafo(&self) -> &TransformationMatrix {
        &self.trafo
    }

    pub fn bounding_sphere(&self) -> &BoundingSphere {
        &self.bounding_sphere
    }

    pub fn intersectable(&self) -> Option<&TransformedIntersectable> {
        self.intersectable.as_ref()
    }

    pub fn intersects(&self, other: &TransformedMesh) -> bool {
        self.bounding_sphere.intersects(&other.bounding_sphere)
    }

    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.bounding_sphere.intersects(sphere)
    }

    pub fn intersects_plane(&self, plane: &PlaneNd) -> bool {
        self.bounding_sphere.intersects_plane(plane)
    }

    pub fn get_triangles_sphere(&self) -> &[CollisionTriangleSphere] {
        self.triangles.get_or_init(|| {
            let triangles = match self.mesh {
                Some(ref mesh) => mesh.transformed_triangles(&self.trafo),
                None => Vec::new(),
            };
            debug!(name = %self.name, ntriangles = triangles.len(), "materialized triangles");
            triangles
        })
    }

    pub fn get_quads_sphere(&self) -> &[CollisionQuadSphere] {
        self.quads.get_or_init(|| {
            let quads = match self.mesh {
                Some(ref mesh) => mesh.transformed_quads(&self.trafo),
                None => Vec::new(),
            };
            debug!(name = %self.name, nquads = quads.len(), "materialized quads");
            quads
        })
    }

    pub fn get_ridges_sphere(&self) -> &[CollisionRidgeSphere] {
        self.ridges.get_or_init(|| {
            let ridges = extract_ridges(
                self.get_triangles_sphere(),
                self.get_quads_sphere(),
                self.max_min_cos_ridge,
                self.physics_material,
            );
            debug!(name = %self.name, nridges = ridges.len(), "materialized ridges");
            ridges
        })
    }

    pub fn get_lines(&self) -> &[CollisionLineSphere] {
        self.lines.get_or_init(|| {
            let lines = match self.mesh {
                Some(ref mesh) => mesh.transformed_lines(&self.trafo),
                None => Vec::new(),
            };
            debug!(name = %self.name, nlines = lines.len(), "materialized lines");
            lines
        })
    }

    /// Box around every world-space shape, or around the bounding sphere if
    /// there are none.
    pub fn aabb(&self) -> AxisAlignedBoundingBox {
        if let Some(ref i) = self.intersectable {
            return i.aabb();
        }
        let points: Vec<Point3<ScenePos>> = self
            .get_triangles_sphere()
            .iter()
            .flat_map(|t| t.corners().iter().copied())
            .chain(self.get_quads_sphere().iter().flat_map(|q| q.corners().iter().copied()))
            .chain(self.get_lines().iter().flat_map(|l| l.line.iter().copied()))
            .collect();
        if points.is_empty() {
            self.bounding_sphere.bounds()
        } else {
            AxisAlignedBoundingBox::from_points(points.iter())
        }
    }
}

#[cfg(test)]
mod tests {
    mod mesh {
        use std::sync::Arc;
        use std::thread;
        use approx::assert_relative_eq;
        use cgmath::{InnerSpace, Matrix3, Point3, SquareMatrix, Vector3};
        use crate::bounds::AxisAlignedBoundingBox;
        use crate::collision::PhysicsMaterial;
        use crate::geom::TransformationMatrix;
        use crate::mesh::*;
        use crate::precision::to_render_point;

        fn cube() -> ColoredVertexArray {
            let mut cva = ColoredVertexArray::new("cube", PhysicsMaterial::ATTR_CONVEX);
            let aabb = AxisAlignedBoundingBox::from_min_max(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
            for f in aabb.faces().iter() {
                cva.push_quad(f.corners.map(|c| ColoredVertex::new(to_render_point(c))));
            }
            cva
        }

        fn flat_pair() -> ColoredVertexArray {
            let v = |x, y| ColoredVertex::new(Point3::new(x, y, 0.0));
            let mut cva = ColoredVertexArray::new("floor", PhysicsMaterial::ATTR_CONCAVE);
            cva.push_triangle([v(0.0, 0.0), v(1.0, 0.0), v(1.0, 1.0)]);
            cva.push_triangle([v(0.0, 0.0), v(1.0, 1.0), v(0.0, 1.0)]);
            cva
        }

        #[test]
        fn test_cube_ridges() {
            let cva = Arc::new(cube());
            let bs = cva.bounding_sphere();
            let m = TransformedMesh::new(TransformationMatrix::identity(), &bs, cva, 0.5);
            assert_eq!(m.get_quads_sphere().len(), 6);
            let ridges = m.get_ridges_sphere();
            assert_eq!(ridges.len(), 12);
            for r in ridges {
                assert_relative_eq!(r.min_cos, 0.0);
                assert_relative_eq!(r.normal.magnitude(), 1.0);
                // Ridge normals point away from the cube center.
                let mid = r.bounding_sphere.center;
                assert!(r.normal.dot(mid - Point3::new(0.5, 0.5, 0.5)) > 0.0);
            }
        }

        #[test]
        fn test_flat_pair_has_no_ridges() {
            let cva = Arc::new(flat_pair());
            let bs = cva.bounding_sphere();
            let m = TransformedMesh::new(TransformationMatrix::identity(), &bs, cva, 0.5);
            assert_eq!(m.get_triangles_sphere().len(), 2);
            assert!(m.get_ridges_sphere().is_empty());
        }

        #[test]
        fn test_transformed_mesh() {
            let cva = Arc::new(flat_pair());
            let bs = cva.bounding_sphere();
            let trafo = TransformationMatrix::new(
                Matrix3::from_diagonal(Vector3::new(2.0, 2.0, 2.0)),
                Vector3::new(10.0, 0.0, 0.0),
            );
            let m = TransformedMesh::new(trafo, &bs, cva, 0.5);
            assert_eq!(m.name(), "floor");
            assert_relative_eq!(m.bounding_sphere().radius, 2.0 * bs.radius);
            assert_relative_eq!(m.bounding_sphere().center, Point3::new(11.0, 1.0, 0.0), epsilon = 1e-9);
            let aabb = m.aabb();
            assert_relative_eq!(aabb.min, Point3::new(10.0, 0.0, 0.0));
            assert_relative_eq!(aabb.max, Point3::new(12.0, 2.0, 0.0));
            assert_relative_eq!(m.get_triangles_sphere()[0].corners()[1], Point3::new(12.0, 0.0, 0.0));
        }

        #[test]
        fn test_concurrent_materialization() {
            let cva = Arc::new(cube());
            let bs = cva.bounding_sphere();
            let m = Arc::new(TransformedMesh::new(TransformationMatrix::identity(), &bs, cva, 0.5));
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let m = m.clone();
                    thread::spawn(move || m.get_ridges_sphere().as_ptr() as usize)
                })
                .collect();
            let ptrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            assert!(ptrs.iter().all(|&p| p == ptrs[0]));
            // Ids are issued once, so they survive repeated reads.
            let ids: Vec<_> = m.get_ridges_sphere().iter().map(|r| r.id).collect();
            let again: Vec<_> = m.get_ridges_sphere().iter().map(|r| r.id).collect();
            assert_eq!(ids, again);
        }

        #[test]
        fn test_from_transformed() {
            let cva = flat_pair();
            let triangles = cva.transformed_triangles(&TransformationMatrix::identity());
            let m = TransformedMesh::from_transformed(
                "baked",
                PhysicsMaterial::ATTR_CONCAVE,
                cva.bounding_sphere(),
                triangles,
                Vec::new(),
            );
            assert_eq!(m.get_triangles_sphere().len(), 2);
            assert!(m.get_quads_sphere().is_empty());
            assert!(m.intersectable().is_none());
        }
    }
}
