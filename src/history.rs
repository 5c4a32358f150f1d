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

//! Per-substep accumulation of collision records.
//!
//! Narrow-phase hits are merged into three keyed maps. For each key only the
//! closest record is kept, so the result does not depend on the order in
//! which pairs were tested. Deferred hits keep shared handles to their
//! meshes so that they can be resolved later in the substep exactly as if
//! they had been handled immediately.

use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use cgmath::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::collision::*;
use crate::config::PhysicsEngineConfig;
use crate::handle::IntersectionScene;
use crate::intersect::{IntersectionInfo, Operand0, Operand1};
use crate::intersectable::TransformedIntersectable;
use crate::mesh::TransformedMesh;
use crate::observer::{CollisionType, StaticWorld};
use crate::precision::ScenePos;
use crate::rigid_body::BodyId;
use crate::solver::Solver;

/// Closest rail a body could grind on.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GrindInfo {
    /// Squared distance between the body's grind point and the rail.
    pub squared_distance: ScenePos,
    pub intersection_point: Point3<ScenePos>,
    /// Unit direction of the rail.
    pub rail_direction: Vector3<ScenePos>,
    pub rail_rb: BodyId,
}

/// First surface hit by a raycast line.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaycastIntersection {
    pub ray_t: ScenePos,
    pub intersection_point: Point3<ScenePos>,
    /// Normal of the surface that was hit.
    pub normal: Vector3<ScenePos>,
    /// The body that was hit.
    pub target: BodyId,
    /// The body owning the line.
    pub source: BodyId,
}

/// Surface operand of a stored contact. Intersectables are read back from
/// the mesh.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum StoredSurface {
    Quad(CollisionQuadSphere),
    Triangle(CollisionTriangleSphere),
    Intersectable,
}

/// Line, ridge or intersectable operand of a stored contact.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum StoredFeeler {
    Line(CollisionLineSphere),
    Ridge(CollisionRidgeSphere),
    Intersectable,
}

impl StoredFeeler {
    pub fn line_id(&self) -> Option<LineId> {
        match self {
            StoredFeeler::Line(l) => Some(l.id),
            StoredFeeler::Ridge(r) => Some(r.id),
            StoredFeeler::Intersectable => None,
        }
    }
}

fn mesh_intersectable(mesh: &TransformedMesh) -> &TransformedIntersectable {
    match mesh.intersectable() {
        Some(i) => i,
        None => panic!("Mesh \"{}\" has no intersectable", mesh.name()),
    }
}

/// An owned copy of an `IntersectionScene` and its result.
#[derive(Clone, Debug)]
pub struct StoredContact {
    pub o0: BodyId,
    pub o1: BodyId,
    pub mesh0: Arc<TransformedMesh>,
    pub mesh1: Arc<TransformedMesh>,
    pub surface: StoredSurface,
    pub feeler: StoredFeeler,
    pub l1_is_normal: bool,
    pub default_collision_type: CollisionType,
    pub info: IntersectionInfo,
}

impl StoredContact {
    /// Rebuild the scene the contact was recorded from.
    ///
    /// # Panics
    ///
    /// If an intersectable operand's mesh no longer carries one.
    pub fn scene(&self) -> IntersectionScene<'_> {
        let operand0 = match self.surface {
            StoredSurface::Quad(ref q) => Operand0::Quad(q),
            StoredSurface::Triangle(ref t) => Operand0::Triangle(t),
            StoredSurface::Intersectable => Operand0::Intersectable(mesh_intersectable(&self.mesh0)),
        };
        let operand1 = match self.feeler {
            StoredFeeler::Line(ref l) => Operand1::Line(l),
            StoredFeeler::Ridge(ref r) => Operand1::Ridge(r),
            StoredFeeler::Intersectable => Operand1::Intersectable(mesh_intersectable(&self.mesh1)),
        };
        IntersectionScene {
            o0: self.o0,
            o1: self.o1,
            mesh0: &self.mesh0,
            mesh1: &self.mesh1,
            operand0,
            operand1,
            l1_is_normal: self.l1_is_normal,
            default_collision_type: self.default_collision_type,
        }
    }

    /// The ray parameter, infinite if unknown.
    fn sort_key(&self) -> ScenePos {
        self.info.try_ray_t().unwrap_or(ScenePos::INFINITY)
    }

    /// Report of a raycast hit. The line belongs to `o1`.
    pub fn raycast(&self) -> RaycastIntersection {
        RaycastIntersection {
            ray_t: self.info.ray_t(),
            intersection_point: self.info.intersection_point(),
            normal: self.info.normal0(),
            target: self.o0,
            source: self.o1,
        }
    }
}

/// Mutable record of one substep.
#[derive(Debug)]
pub struct CollisionHistory {
    pub cfg: PhysicsEngineConfig,
    pub world: StaticWorld,
    pub raycast_intersections: BTreeMap<LineId, StoredContact>,
    pub concave_t0_intersections: BTreeMap<BodyId, Vec<StoredContact>>,
    pub grind_infos: BTreeMap<BodyId, GrindInfo>,
    pub contact_infos: Solver,
}

impl CollisionHistory {
    pub fn new(cfg: PhysicsEngineConfig, world: StaticWorld) -> Self {
        CollisionHistory {
            cfg,
            world,
            raycast_intersections: BTreeMap::new(),
            concave_t0_intersections: BTreeMap::new(),
            grind_infos: BTreeMap::new(),
            contact_infos: Solver::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raycast_intersections.is_empty()
            && self.concave_t0_intersections.is_empty()
            && self.grind_infos.is_empty()
            && self.contact_infos.is_empty()
    }

    /// Keep the hit if it is the closest one of its line so far.
    ///
    /// # Panics
    ///
    /// If the line already has a hit and the new one has no ray parameter.
    pub fn insert_raycast(&mut self, line: LineId, contact: StoredContact) {
        match self.raycast_intersections.entry(line) {
            Entry::Vacant(e) => {
                trace!(?line, ray_t = contact.sort_key(), "first raycast hit");
                e.insert(contact);
            }
            Entry::Occupied(e) => {
                let t = match contact.info.try_ray_t() {
                    Some(t) => t,
                    None => panic!("l1_is_normal but ray_t not given"),
                };
                let old = e.get().sort_key();
                if t < old {
                    trace!(?line, old, new = t, "closer raycast hit");
                    e.remove();
                    self.raycast_intersections.insert(line, contact);
                }
            }
        }
    }

    /// Keep the rail if it is the closest one of the body so far.
    pub fn insert_grind_info(&mut self, rb: BodyId, info: GrindInfo) {
        match self.grind_infos.entry(rb) {
            Entry::Vacant(e) => {
                e.insert(info);
            }
            Entry::Occupied(mut e) => {
                if info.squared_distance < e.get().squared_distance {
                    trace!(%rb, old = e.get().squared_distance, new = info.squared_distance, "closer rail");
                    e.insert(info);
                }
            }
        }
    }

    pub fn push_concave(&mut self, rb: BodyId, contact: StoredContact) {
        self.concave_t0_intersections.entry(rb).or_insert_with(Vec::new).push(contact);
    }

    /// Take the concave hits, ordered by body, sorted by ray parameter and
    /// reduced to the closest hit per line or ridge. Hits of intersectables
    /// have no line and are all kept.
    pub fn take_concave(&mut self) -> Vec<StoredContact> {
        let all = std::mem::replace(&mut self.concave_t0_intersections, BTreeMap::new());
        let mut result = Vec::new();
        for (rb, mut hits) in all {
            hits.sort_by(|a, b| a.sort_key().partial_cmp(&b.sort_key()).unwrap_or(Ordering::Equal));
            let nhits = hits.len();
            let mut seen = Vec::with_capacity(nhits);
            for h in hits {
                if let Some(id) = h.feeler.line_id() {
                    if seen.contains(&id) {
                        continue;
                    }
                    seen.push(id);
                }
                result.push(h);
            }
            debug!(%rb, nhits, nlines = seen.len(), "concave hits");
        }
        result
    }

    pub fn take_raycasts(&mut self) -> BTreeMap<LineId, StoredContact> {
        std::mem::replace(&mut self.raycast_intersections, BTreeMap::new())
    }

    pub fn take_grind_infos(&mut self) -> BTreeMap<BodyId, GrindInfo> {
        std::mem::replace(&mut self.grind_infos, BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    mod history {
        use std::sync::Arc;
        use approx::assert_relative_eq;
        use cgmath::{Point3, Vector3};
        use crate::bounds::BoundingSphere;
        use crate::collision::*;
        use crate::config::PhysicsEngineConfig;
        use crate::history::*;
        use crate::intersect::{intersect, IntersectionInfo, Operand0, Operand1};
        use crate::mesh::TransformedMesh;
        use crate::observer::{CollisionType, StaticWorld};
        use crate::pool::Pool;
        use crate::rigid_body::BodyId;

        fn ids() -> (BodyId, BodyId) {
            let mut pool = Pool::new();
            (pool.push(()), pool.push(()))
        }

        fn triangle(y: f64) -> CollisionTriangleSphere {
            CollisionTriangleSphere::new(
                [Point3::new(-1.0, y, -1.0), Point3::new(1.0, y, 1.0), Point3::new(1.0, y, -1.0)],
                PhysicsMaterial::ATTR_CONCAVE,
            ).unwrap()
        }

        fn vertical_line(x: f64, z: f64) -> CollisionLineSphere {
            CollisionLineSphere::new(
                [Point3::new(x, 1.0, z), Point3::new(x, -1.0, z)],
                PhysicsMaterial::ATTR_CONVEX,
            )
        }

        fn mesh(material: PhysicsMaterial) -> Arc<TransformedMesh> {
            Arc::new(TransformedMesh::from_transformed(
                "m",
                material,
                BoundingSphere::new(Point3::new(0.0, 0.0, 0.0), 2.0),
                Vec::new(),
                Vec::new(),
            ))
        }

        fn contact(t: &CollisionTriangleSphere, l: &CollisionLineSphere) -> StoredContact {
            let (a, b) = ids();
            let info = intersect(Operand0::Triangle(t), Operand1::Line(l)).unwrap();
            StoredContact {
                o0: a,
                o1: b,
                mesh0: mesh(PhysicsMaterial::ATTR_CONCAVE),
                mesh1: mesh(PhysicsMaterial::ATTR_CONVEX),
                surface: StoredSurface::Triangle(*t),
                feeler: StoredFeeler::Line(*l),
                l1_is_normal: true,
                default_collision_type: CollisionType::Reflect,
                info,
            }
        }

        fn history() -> CollisionHistory {
            CollisionHistory::new(PhysicsEngineConfig::default(), StaticWorld::default())
        }

        #[test]
        fn test_closest_raycast_wins_in_any_order() {
            let l = vertical_line(0.5, -0.5);
            let orders = [[0.7, 0.5, 0.2], [0.2, 0.5, 0.7], [0.5, 0.2, 0.7], [0.7, 0.2, 0.5]];
            for order in orders.iter() {
                let mut h = history();
                for &y in order.iter() {
                    h.insert_raycast(l.id, contact(&triangle(y), &l));
                }
                assert_eq!(h.raycast_intersections.len(), 1);
                // The line starts at y = 1, so the highest triangle is hit first.
                let best = h.raycast_intersections[&l.id].raycast();
                assert_relative_eq!(best.intersection_point.y, 0.7, epsilon = 1e-12);
            }
        }

        #[test]
        fn test_worse_raycast_is_ignored() {
            let l = vertical_line(0.5, -0.5);
            let mut h = history();
            h.insert_raycast(l.id, contact(&triangle(0.3), &l));
            h.insert_raycast(l.id, contact(&triangle(-0.9), &l));
            let r = h.take_raycasts()[&l.id].raycast();
            assert_relative_eq!(r.intersection_point.y, 0.3, epsilon = 1e-12);
            assert_relative_eq!(r.ray_t, 0.7, epsilon = 1e-12);
            assert_relative_eq!(r.normal, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
            assert!(h.is_empty());
        }

        #[test]
        #[should_panic(expected = "ray_t not given")]
        fn test_raycast_without_t() {
            let l = vertical_line(0.5, -0.5);
            let mut h = history();
            h.insert_raycast(l.id, contact(&triangle(0.3), &l));
            let mut c = contact(&triangle(0.1), &l);
            c.info = IntersectionInfo::Static {
                point: Point3::new(0.0, 0.0, 0.0),
                normal: Vector3::new(0.0, 1.0, 0.0),
                overlap: 0.1,
                ray_t: f64::NAN,
            };
            h.insert_raycast(l.id, c);
        }

        #[test]
        fn test_closest_rail_wins() {
            let (a, b) = ids();
            let mut h = history();
            let info = |d: f64| GrindInfo {
                squared_distance: d,
                intersection_point: Point3::new(0.0, 0.0, 0.0),
                rail_direction: Vector3::new(1.0, 0.0, 0.0),
                rail_rb: b,
            };
            h.insert_grind_info(a, info(4.0));
            h.insert_grind_info(a, info(1.0));
            h.insert_grind_info(a, info(2.0));
            assert_eq!(h.grind_infos[&a].squared_distance, 1.0);
            let taken = h.take_grind_infos();
            assert_eq!(taken.len(), 1);
            assert!(h.is_empty());
        }

        #[test]
        fn test_concave_hits_are_deduplicated_per_line() {
            let (_, b) = ids();
            let mut h = history();
            let l0 = vertical_line(0.5, -0.5);
            let l1 = vertical_line(0.6, -0.2);
            // The same line pierces two triangles of the concave mesh.
            h.push_concave(b, contact(&triangle(-0.2), &l0));
            h.push_concave(b, contact(&triangle(0.0), &l0));
            h.push_concave(b, contact(&triangle(-0.1), &l1));
            let hits = h.take_concave();
            assert_eq!(hits.len(), 2);
            assert_eq!(hits[0].feeler.line_id(), Some(l0.id));
            assert_eq!(hits[0].surface, StoredSurface::Triangle(triangle(0.0)));
            assert_eq!(hits[1].feeler.line_id(), Some(l1.id));
            assert!(h.concave_t0_intersections.is_empty());
        }

        #[test]
        fn test_stored_scene_round_trip() {
            let l = vertical_line(0.5, -0.5);
            let t = triangle(0.0);
            let c = contact(&t, &l);
            let scene = c.scene();
            assert!(scene.l1_is_normal);
            assert_eq!(scene.operand1.line_id(), Some(l.id));
            assert_eq!(scene.mesh0_material(), PhysicsMaterial::ATTR_CONCAVE);
            assert_eq!(intersect(scene.operand0, scene.operand1), Some(c.info));
        }
    }
}
