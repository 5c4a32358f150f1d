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

//! Routing of a single narrow-phase test.
//!
//! A hit is either kept as the closest raycast of its line, deferred as a
//! concave contact, or resolved at once: observers are notified and the
//! resulting `CollisionType` decides between reflection and grinding.

use std::sync::Arc;

use cgmath::InnerSpace;
use tracing::trace;

use crate::collision::*;
use crate::history::*;
use crate::intersect::{intersect, IntersectionInfo, Operand0, Operand1};
use crate::mesh::TransformedMesh;
use crate::observer::{CollisionRole, CollisionType};
use crate::pool::Pool;
use crate::precision::{any_nan, dir_to_scene};
use crate::reflection::handle_reflection;
use crate::rigid_body::{BodyId, RigidBody, VehicleDomain};

/// Everything needed to test and resolve one operand pair. `o0` owns the
/// surface operand, `o1` the probing operand.
#[derive(Copy, Clone, Debug)]
pub struct IntersectionScene<'a> {
    pub o0: BodyId,
    pub o1: BodyId,
    pub mesh0: &'a Arc<TransformedMesh>,
    pub mesh1: &'a Arc<TransformedMesh>,
    pub operand0: Operand0<'a>,
    pub operand1: Operand1<'a>,
    /// The line feels along a surface normal and only its closest hit
    /// counts.
    pub l1_is_normal: bool,
    pub default_collision_type: CollisionType,
}

impl<'a> IntersectionScene<'a> {
    /// A reflecting scene. Lines are treated as feelers.
    pub fn new(
        o0: BodyId,
        o1: BodyId,
        mesh0: &'a Arc<TransformedMesh>,
        mesh1: &'a Arc<TransformedMesh>,
        operand0: Operand0<'a>,
        operand1: Operand1<'a>,
    ) -> Self {
        let l1_is_normal = match operand1 {
            Operand1::Line(_) => true,
            Operand1::Ridge(_) | Operand1::Intersectable(_) => false,
        };
        IntersectionScene {
            o0,
            o1,
            mesh0,
            mesh1,
            operand0,
            operand1,
            l1_is_normal,
            default_collision_type: CollisionType::Reflect,
        }
    }

    /// A grind polygon of `o0` crossed by a rail of `o1`.
    pub fn rail(
        o0: BodyId,
        o1: BodyId,
        mesh0: &'a Arc<TransformedMesh>,
        mesh1: &'a Arc<TransformedMesh>,
        operand0: Operand0<'a>,
        rail: &'a CollisionLineSphere,
    ) -> Self {
        IntersectionScene {
            l1_is_normal: false,
            default_collision_type: CollisionType::Grind,
            ..IntersectionScene::new(o0, o1, mesh0, mesh1, operand0, Operand1::Line(rail))
        }
    }

    #[inline(always)]
    pub fn mesh0_material(&self) -> PhysicsMaterial {
        self.mesh0.physics_material()
    }

    #[inline(always)]
    pub fn mesh1_material(&self) -> PhysicsMaterial {
        self.mesh1.physics_material()
    }

    /// Copy the scene and its result into an owned record.
    pub fn store(&self, info: IntersectionInfo) -> StoredContact {
        StoredContact {
            o0: self.o0,
            o1: self.o1,
            mesh0: Arc::clone(self.mesh0),
            mesh1: Arc::clone(self.mesh1),
            surface: match self.operand0 {
                Operand0::Quad(q) => StoredSurface::Quad(*q),
                Operand0::Triangle(t) => StoredSurface::Triangle(*t),
                Operand0::Intersectable(_) => StoredSurface::Intersectable,
            },
            feeler: match self.operand1 {
                Operand1::Line(l) => StoredFeeler::Line(*l),
                Operand1::Ridge(r) => StoredFeeler::Ridge(*r),
                Operand1::Intersectable(_) => StoredFeeler::Intersectable,
            },
            l1_is_normal: self.l1_is_normal,
            default_collision_type: self.default_collision_type,
            info,
        }
    }
}

/// Test the scene's operands and record or resolve the hit. Returns true
/// if the operands intersect.
///
/// # Panics
///
/// If both operands belong to the same body, if an intersectable meets a
/// bullet line, or if a bullet line is not a feeler.
pub fn handle_line_triangle_intersection(
    c: &IntersectionScene,
    bodies: &mut Pool<RigidBody>,
    history: &mut CollisionHistory,
) -> bool {
    if c.o0 == c.o1 {
        panic!("Collision of identical objects");
    }
    let bullet = c.mesh1_material().any(PhysicsMaterial::OBJ_BULLET_LINE_SEGMENT);
    if let Operand0::Intersectable(_) = c.operand0 {
        if bullet {
            panic!(
                "Intersectable \"{}\" unexpectedly collides with bullet line segment \"{}\"",
                bodies[c.o0].name, bodies[c.o1].name
            );
        }
    }
    let info = match intersect(c.operand0, c.operand1) {
        Some(info) => info,
        None => return false,
    };
    if bullet && !c.l1_is_normal {
        panic!("Unexpected l1_is_normal value");
    }
    bodies[c.o0].next_vehicle_domain = VehicleDomain::Ground;
    bodies[c.o1].next_vehicle_domain = VehicleDomain::Ground;
    if c.l1_is_normal {
        let line = match c.operand1.line_id() {
            Some(line) => line,
            None => panic!("l1_is_normal requires a line"),
        };
        history.insert_raycast(line, c.store(info));
    } else if c.mesh0_material().any(PhysicsMaterial::ATTR_CONCAVE)
        && c.mesh1_material().any(PhysicsMaterial::ATTR_CONVEX)
    {
        trace!(o0 = %c.o0, o1 = %c.o1, "deferring concave contact");
        history.push_concave(c.o1, c.store(info));
    } else {
        handle_intersection(c, &info, bodies, history);
    }
    true
}

/// Notify the observers of both bodies and resolve the contact according
/// to the collision type they agreed on.
pub fn handle_intersection(
    c: &IntersectionScene,
    info: &IntersectionInfo,
    bodies: &mut Pool<RigidBody>,
    history: &mut CollisionHistory,
) {
    let mut collision_type = c.default_collision_type;
    let mut abort = false;
    {
        let p = info.intersection_point();
        let (rb0, rb1) = (&bodies[c.o0], &bodies[c.o1]);
        for o in rb0.observers() {
            o.notify_collided(p, &history.world, rb1, CollisionRole::Primary, &mut collision_type, &mut abort);
        }
        for o in rb1.observers() {
            o.notify_collided(p, &history.world, rb0, CollisionRole::Secondary, &mut collision_type, &mut abort);
        }
    }
    if abort {
        trace!(o0 = %c.o0, o1 = %c.o1, "collision aborted by observer");
        return;
    }
    match collision_type {
        CollisionType::GoThrough => (),
        CollisionType::Reflect => handle_reflection(c, info, bodies, history),
        CollisionType::Grind => handle_grind(c, info, bodies, history),
    }
}

fn handle_grind(c: &IntersectionScene, info: &IntersectionInfo, bodies: &Pool<RigidBody>, history: &mut CollisionHistory) {
    let rb = &bodies[c.o0];
    if !rb.grind_state.wants_to_grind {
        return;
    }
    let plane = match c.operand0.plane() {
        Some(plane) => plane,
        None => panic!("Grind collision requires a plane normal"),
    };
    let ray = match c.operand1.ray() {
        Some(ray) => ray,
        None => panic!("Grind collision requires a ray"),
    };
    let cfg = &history.cfg;
    if ray.direction.dot(plane.normal).abs() < cfg.max_grind_cos {
        return;
    }
    let previous = rb.grind_state.previous.grind_direction;
    let direction_ok = !any_nan(previous)
        && dir_to_scene(previous).dot(ray.direction).abs() > cfg.continuos_grind_cos_threshold;
    if !direction_ok && rb.grind_state.wants_to_grind_counter > cfg.nframes_straight_grind {
        let v = rb.pulses.v_com;
        let v_len2 = v.magnitude2();
        let threshold = cfg.continuos_grind_velocity_threshold;
        if v_len2 > threshold * threshold && v.dot(ray.direction).abs() / v_len2.sqrt() < cfg.continuos_grind_cos_threshold {
            return;
        }
    }
    let p = info.intersection_point();
    let gi = GrindInfo {
        squared_distance: (p - rb.abs_grind_point()).magnitude2(),
        intersection_point: p,
        rail_direction: ray.direction,
        rail_rb: c.o1,
    };
    history.insert_grind_info(c.o0, gi);
}

#[cfg(test)]
mod tests {
    mod handle {
        use std::sync::Arc;
        use approx::assert_relative_eq;
        use cgmath::{EuclideanSpace, InnerSpace, Matrix3, Point3, SquareMatrix, Vector3};
        use parking_lot::Mutex;
        use crate::bounds::BoundingSphere;
        use crate::collision::*;
        use crate::config::PhysicsEngineConfig;
        use crate::handle::*;
        use crate::history::CollisionHistory;
        use crate::intersect::{intersect, Operand0, Operand1};
        use crate::mesh::TransformedMesh;
        use crate::observer::*;
        use crate::pool::Pool;
        use crate::precision::ScenePos;
        use crate::rigid_body::*;

        #[derive(Debug, Default)]
        struct Recorder {
            abort: bool,
            replace: Option<CollisionType>,
            roles: Mutex<Vec<CollisionRole>>,
        }

        impl CollisionObserver for Recorder {
            fn notify_collided(
                &self,
                _intersection_point: Point3<ScenePos>,
                _world: &StaticWorld,
                _other: &RigidBody,
                role: CollisionRole,
                collision_type: &mut CollisionType,
                abort: &mut bool,
            ) {
                self.roles.lock().push(role);
                if let Some(t) = self.replace {
                    *collision_type = t;
                }
                *abort |= self.abort;
            }
        }

        fn mesh(material: PhysicsMaterial) -> Arc<TransformedMesh> {
            Arc::new(TransformedMesh::from_transformed(
                "m",
                material,
                BoundingSphere::new(Point3::origin(), 10.0),
                Vec::new(),
                Vec::new(),
            ))
        }

        fn body(position: Point3<f64>) -> RigidBody {
            let pulses = RigidBodyPulses::new(
                1.0,
                Vector3::new(1.0, 1.0, 1.0),
                Point3::origin(),
                position,
                Matrix3::identity(),
            );
            RigidBody::new("body", pulses)
        }

        fn ground() -> RigidBody {
            RigidBody::new("ground", RigidBodyPulses::new_static(Point3::origin(), Matrix3::identity()))
        }

        fn floor() -> CollisionTriangleSphere {
            CollisionTriangleSphere::new(
                [Point3::new(-5.0, 0.0, -5.0), Point3::new(0.0, 0.0, 5.0), Point3::new(5.0, 0.0, -5.0)],
                PhysicsMaterial::ATTR_CONCAVE,
            ).unwrap()
        }

        fn feeler() -> CollisionLineSphere {
            CollisionLineSphere::new([Point3::new(0.0, 0.5, 0.0), Point3::new(0.0, -0.1, 0.0)], PhysicsMaterial::ATTR_CONVEX)
        }

        fn history() -> CollisionHistory {
            CollisionHistory::new(PhysicsEngineConfig::default(), StaticWorld::default())
        }

        #[test]
        fn test_normal_line_is_recorded_as_raycast() {
            let mut bodies = Pool::new();
            let g = bodies.push(ground());
            let b = bodies.push(body(Point3::new(0.0, 0.5, 0.0)));
            let (m0, m1) = (mesh(PhysicsMaterial::ATTR_CONCAVE), mesh(PhysicsMaterial::ATTR_CONVEX));
            let (t, l) = (floor(), feeler());
            let c = IntersectionScene::new(g, b, &m0, &m1, Operand0::Triangle(&t), Operand1::Line(&l));
            let mut h = history();
            assert!(handle_line_triangle_intersection(&c, &mut bodies, &mut h));
            assert!(h.contact_infos.is_empty());
            assert_eq!(bodies[g].next_vehicle_domain, VehicleDomain::Ground);
            assert_eq!(bodies[b].next_vehicle_domain, VehicleDomain::Ground);
            let raycasts = h.take_raycasts();
            assert_eq!(raycasts.len(), 1);
            let r = raycasts[&l.id].raycast();
            assert_eq!((r.target, r.source), (g, b));
            assert_relative_eq!(r.intersection_point, Point3::new(0.0, 0.0, 0.0), epsilon = 1e-12);
        }

        #[test]
        fn test_miss_changes_nothing() {
            let mut bodies = Pool::new();
            let g = bodies.push(ground());
            let b = bodies.push(body(Point3::new(0.0, 2.0, 0.0)));
            let (m0, m1) = (mesh(PhysicsMaterial::ATTR_CONCAVE), mesh(PhysicsMaterial::ATTR_CONVEX));
            let t = floor();
            let l = CollisionLineSphere::new([Point3::new(0.0, 2.0, 0.0), Point3::new(0.0, 1.0, 0.0)], PhysicsMaterial::ATTR_CONVEX);
            let c = IntersectionScene::new(g, b, &m0, &m1, Operand0::Triangle(&t), Operand1::Line(&l));
            let mut h = history();
            assert!(!handle_line_triangle_intersection(&c, &mut bodies, &mut h));
            assert!(h.is_empty());
            assert_eq!(bodies[b].next_vehicle_domain, VehicleDomain::Undefined);
        }

        #[test]
        fn test_concave_contact_is_deferred() {
            let mut bodies = Pool::new();
            let g = bodies.push(ground());
            let b = bodies.push(body(Point3::new(0.0, 0.4, 0.0)));
            let (m0, m1) = (mesh(PhysicsMaterial::ATTR_CONCAVE), mesh(PhysicsMaterial::ATTR_CONVEX));
            let t = floor();
            let r = CollisionRidgeSphere::new(
                [Point3::new(-0.5, 0.1, 0.0), Point3::new(0.5, -0.1, 0.0)],
                Vector3::new(0.0, -1.0, 1.0),
                0.0,
                PhysicsMaterial::ATTR_CONVEX,
            );
            let c = IntersectionScene::new(g, b, &m0, &m1, Operand0::Triangle(&t), Operand1::Ridge(&r));
            let mut h = history();
            assert!(handle_line_triangle_intersection(&c, &mut bodies, &mut h));
            assert!(h.contact_infos.is_empty());
            let deferred = h.take_concave();
            assert_eq!(deferred.len(), 1);
            assert_eq!(deferred[0].o1, b);

            // Replaying the stored contact resolves it.
            let stored = &deferred[0];
            handle_intersection(&stored.scene(), &stored.info, &mut bodies, &mut h);
            assert_eq!(h.contact_infos.len(), 2);
        }

        #[test]
        fn test_observers_see_both_roles() {
            let mut bodies = Pool::new();
            let mut rg = ground();
            let recorder = Arc::new(Recorder::default());
            rg.add_observer(recorder.clone());
            let g = bodies.push(rg);
            let mut rb = body(Point3::new(0.0, 0.5, 0.0));
            rb.add_observer(recorder.clone());
            let b = bodies.push(rb);
            let (m0, m1) = (mesh(PhysicsMaterial::ATTR_CONCAVE), mesh(PhysicsMaterial::ATTR_CONVEX));
            let (t, l) = (floor(), feeler());
            let c = IntersectionScene::new(g, b, &m0, &m1, Operand0::Triangle(&t), Operand1::Line(&l));
            let info = intersect(c.operand0, c.operand1).unwrap();
            let mut h = history();
            handle_intersection(&c, &info, &mut bodies, &mut h);
            assert_eq!(*recorder.roles.lock(), vec![CollisionRole::Primary, CollisionRole::Secondary]);
            assert_eq!(h.contact_infos.len(), 2);
        }

        #[test]
        fn test_abort_and_go_through_skip_resolution() {
            for recorder in vec![
                Recorder { abort: true, ..Default::default() },
                Recorder { replace: Some(CollisionType::GoThrough), ..Default::default() },
            ] {
                let mut bodies = Pool::new();
                let g = bodies.push(ground());
                let mut rb = body(Point3::new(0.0, 0.5, 0.0));
                rb.add_observer(Arc::new(recorder));
                let b = bodies.push(rb);
                let (m0, m1) = (mesh(PhysicsMaterial::ATTR_CONCAVE), mesh(PhysicsMaterial::ATTR_CONVEX));
                let (t, l) = (floor(), feeler());
                let c = IntersectionScene::new(g, b, &m0, &m1, Operand0::Triangle(&t), Operand1::Line(&l));
                let info = intersect(c.operand0, c.operand1).unwrap();
                let mut h = history();
                handle_intersection(&c, &info, &mut bodies, &mut h);
                assert!(h.contact_infos.is_empty());
            }
        }

        /// Grind polygon in the plane x = 0 and a rail through the origin.
        fn grind_scene(rail_direction: Vector3<f64>, wants_to_grind: bool) -> (Pool<RigidBody>, BodyId, BodyId, CollisionHistory) {
            let mut bodies = Pool::new();
            let mut rb = body(Point3::new(0.0, 0.5, 0.0)).with_grind_point(Point3::new(0.0, -0.5, 0.0));
            rb.set_wants_to_grind(wants_to_grind);
            let b = bodies.push(rb);
            let g = bodies.push(ground());
            let (mb, mg) = (mesh(PhysicsMaterial::OBJ_GRIND_CONTACT), mesh(PhysicsMaterial::OBJ_GRIND_LINE));
            let t = CollisionTriangleSphere::new(
                [Point3::new(0.0, -1.0, -1.0), Point3::new(0.0, -1.0, 1.0), Point3::new(0.0, 1.0, 0.0)],
                PhysicsMaterial::OBJ_GRIND_CONTACT,
            ).unwrap();
            let d = rail_direction.normalize();
            let rail = CollisionLineSphere::new([Point3::origin() - d, Point3::origin() + d], PhysicsMaterial::OBJ_GRIND_LINE);
            let c = IntersectionScene::rail(b, g, &mb, &mg, Operand0::Triangle(&t), &rail);
            assert!(!c.l1_is_normal);
            assert_eq!(c.default_collision_type, CollisionType::Grind);
            let mut h = history();
            assert!(handle_line_triangle_intersection(&c, &mut bodies, &mut h));
            (bodies, b, g, h)
        }

        #[test]
        fn test_rail_through_grind_polygon() {
            let (_, b, g, mut h) = grind_scene(Vector3::new(1.0, 0.0, 0.0), true);
            assert!(h.contact_infos.is_empty());
            let infos = h.take_grind_infos();
            let gi = infos[&b];
            assert_eq!(gi.rail_rb, g);
            assert_relative_eq!(gi.intersection_point, Point3::new(0.0, 0.0, 0.0), epsilon = 1e-12);
            assert_relative_eq!(gi.rail_direction, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
            assert_relative_eq!(gi.squared_distance, 0.0, epsilon = 1e-12);
        }

        #[test]
        fn test_rail_ignored_unless_wanted_and_steep() {
            let (_, _, _, h) = grind_scene(Vector3::new(1.0, 0.0, 0.0), false);
            assert!(h.grind_infos.is_empty());
            let (_, _, _, h) = grind_scene(Vector3::new(0.3, 0.0, 1.0), true);
            assert!(h.grind_infos.is_empty());
        }

        #[test]
        #[should_panic(expected = "identical objects")]
        fn test_identical_objects() {
            let mut bodies = Pool::new();
            let b = bodies.push(body(Point3::new(0.0, 0.5, 0.0)));
            let m = mesh(PhysicsMaterial::ATTR_CONVEX);
            let (t, l) = (floor(), feeler());
            let c = IntersectionScene::new(b, b, &m, &m, Operand0::Triangle(&t), Operand1::Line(&l));
            handle_line_triangle_intersection(&c, &mut bodies, &mut history());
        }

        #[test]
        #[should_panic(expected = "Unexpected l1_is_normal value")]
        fn test_bullet_ridge() {
            let mut bodies = Pool::new();
            let g = bodies.push(ground());
            let b = bodies.push(body(Point3::new(0.0, 0.4, 0.0)));
            let (m0, m1) = (mesh(PhysicsMaterial::ATTR_CONCAVE), mesh(PhysicsMaterial::OBJ_BULLET_LINE_SEGMENT));
            let t = floor();
            let r = CollisionRidgeSphere::new(
                [Point3::new(-0.5, 0.1, 0.0), Point3::new(0.5, -0.1, 0.0)],
                Vector3::new(0.0, -1.0, 1.0),
                0.0,
                PhysicsMaterial::OBJ_BULLET_LINE_SEGMENT,
            );
            let c = IntersectionScene::new(g, b, &m0, &m1, Operand0::Triangle(&t), Operand1::Ridge(&r));
            handle_line_triangle_intersection(&c, &mut bodies, &mut history());
        }
    }
}
