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

//! The tick driver.
//!
//! Every substep places the attached meshes of all bodies in the world,
//! records the hits between them into a fresh `CollisionHistory`, turns the
//! recorded hits into contacts and solves them:
//!
//! 1. gravity;
//! 2. broad phase on mesh spheres, then on shape spheres;
//! 3. narrow phase through `handle_line_triangle_intersection`;
//! 4. closest raycast hits, reported to the caller and resolved;
//! 5. deferred concave hits, closest first, once per line or ridge;
//! 6. rail constraints and jumps;
//! 7. `solve_contacts`, time advance and the roll-over of per-body state.

use std::collections::BTreeMap;
use std::sync::Arc;

use cgmath::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bounds::BoundingSphere;
use crate::collision::PhysicsMaterial;
use crate::config::PhysicsEngineConfig;
use crate::error::{Error, Result};
use crate::grind::collide_grind_infos;
use crate::handle::{handle_intersection, handle_line_triangle_intersection, IntersectionScene};
use crate::history::{CollisionHistory, RaycastIntersection};
use crate::intersect::{Operand0, Operand1};
use crate::intersectable::{Intersectable, TransformedIntersectable};
use crate::mesh::{ColoredVertexArray, TransformedMesh};
use crate::observer::StaticWorld;
use crate::pool::Pool;
use crate::precision::ScenePos;
use crate::rigid_body::{BodyId, RigidBody};

/// Collision geometry attached to a body, in body coordinates.
#[derive(Clone, Debug)]
enum Attachment {
    Mesh {
        mesh: Arc<ColoredVertexArray>,
        bounding_sphere: BoundingSphere,
    },
    Intersectable {
        name: String,
        physics_material: PhysicsMaterial,
        child: Arc<dyn Intersectable>,
    },
}

/// What the caller learns from one tick.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    /// Closest hit of every probing line, for every substep.
    pub raycasts: Vec<RaycastIntersection>,
    /// Number of solver rows, summed over the substeps.
    pub ncontacts: usize,
}

/// The meshes of one body, placed in the world for the current substep.
struct PlacedBody {
    id: BodyId,
    is_static: bool,
    meshes: Vec<Arc<TransformedMesh>>,
}

pub struct PhysicsEngine {
    cfg: PhysicsEngineConfig,
    world: StaticWorld,
    bodies: Pool<RigidBody>,
    attachments: BTreeMap<BodyId, Vec<Attachment>>,
}

impl PhysicsEngine {
    pub fn new(cfg: PhysicsEngineConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(PhysicsEngine {
            cfg,
            world: StaticWorld::default(),
            bodies: Pool::new(),
            attachments: BTreeMap::new(),
        })
    }

    pub fn config(&self) -> &PhysicsEngineConfig {
        &self.cfg
    }

    pub fn world(&self) -> &StaticWorld {
        &self.world
    }

    pub fn set_gravity(&mut self, acceleration: Vector3<ScenePos>) {
        self.world = StaticWorld::with_gravity(acceleration);
    }

    pub fn add_rigid_body(&mut self, rb: RigidBody) -> BodyId {
        let id = self.bodies.push(rb);
        debug!(body = %id, name = %self.bodies[id].name, "added rigid body");
        id
    }

    /// Remove a body together with its attached geometry.
    pub fn remove_rigid_body(&mut self, id: BodyId) -> Result<RigidBody> {
        if !self.bodies.contains(id) {
            return Err(Error::UnknownBody(id));
        }
        self.attachments.remove(&id);
        Ok(self.bodies.remove(id))
    }

    pub fn body(&self, id: BodyId) -> Option<&RigidBody> {
        self.bodies.get(id)
    }

    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut RigidBody> {
        self.bodies.get_mut(id)
    }

    pub fn bodies(&self) -> &Pool<RigidBody> {
        &self.bodies
    }

    fn attach(&mut self, id: BodyId, attachment: Attachment) -> Result<()> {
        if !self.bodies.contains(id) {
            return Err(Error::UnknownBody(id));
        }
        self.attachments.entry(id).or_insert_with(Vec::new).push(attachment);
        Ok(())
    }

    /// Attach a mesh given in body coordinates. Its physics material
    /// decides how it collides.
    pub fn attach_mesh(&mut self, id: BodyId, mesh: Arc<ColoredVertexArray>) -> Result<()> {
        if !self.bodies.contains(id) {
            return Err(Error::UnknownBody(id));
        }
        let bounding_sphere = mesh.bounding_sphere();
        self.attach(id, Attachment::Mesh { mesh, bounding_sphere })
    }

    pub fn attach_intersectable<S: Into<String>>(
        &mut self,
        id: BodyId,
        name: S,
        physics_material: PhysicsMaterial,
        child: Arc<dyn Intersectable>,
    ) -> Result<()> {
        self.attach(
            id,
            Attachment::Intersectable {
                name: name.into(),
                physics_material,
                child,
            },
        )
    }

    /// Advance the simulation by `cfg.dt`.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        for substep in 0..self.cfg.nsubsteps {
            self.substep(substep + 1 == self.cfg.nsubsteps, &mut report);
        }
        report
    }

    fn substep(&mut self, end_of_tick: bool, report: &mut TickReport) {
        let dt = self.cfg.dt_substeps();
        if let Some(gravity) = self.world.gravity {
            for (_, rb) in self.bodies.iter_mut() {
                rb.integrate_gravity(gravity.acceleration(), dt);
            }
        }
        let placed = self.place_meshes();
        let mut history = CollisionHistory::new(self.cfg, self.world);
        self.collide(&placed, &mut history);

        let raycasts = history.take_raycasts();
        for contact in raycasts.values() {
            report.raycasts.push(contact.raycast());
            handle_intersection(&contact.scene(), &contact.info, &mut self.bodies, &mut history);
        }
        for contact in history.take_concave() {
            handle_intersection(&contact.scene(), &contact.info, &mut self.bodies, &mut history);
        }
        collide_grind_infos(&mut self.bodies, &mut history);

        debug!(nraycasts = raycasts.len(), ncontacts = history.contact_infos.len(), "solving substep");
        report.ncontacts += history.contact_infos.len();
        history.contact_infos.solve_contacts(&mut self.bodies, dt, &self.cfg);
        for (_, rb) in self.bodies.iter_mut() {
            rb.advance_time(dt);
            rb.reset_forces(end_of_tick);
        }
    }

    fn place_meshes(&self) -> Vec<PlacedBody> {
        let mut placed = Vec::with_capacity(self.attachments.len());
        for (&id, attachments) in &self.attachments {
            let rb = &self.bodies[id];
            let trafo = rb.pulses.abs_transformation();
            let mut meshes = Vec::with_capacity(attachments.len());
            for a in attachments {
                match *a {
                    Attachment::Mesh { ref mesh, ref bounding_sphere } => meshes.push(Arc::new(TransformedMesh::new(
                        trafo,
                        bounding_sphere,
                        Arc::clone(mesh),
                        self.cfg.max_min_cos_ridge,
                    ))),
                    Attachment::Intersectable { ref name, physics_material, ref child } => {
                        match TransformedIntersectable::new(Arc::clone(child), trafo) {
                            Some(ti) => meshes.push(Arc::new(TransformedMesh::from_intersectable(
                                name.as_str(),
                                physics_material,
                                ti,
                            ))),
                            None => warn!(body = %id, name = %name, "skipping intersectable with singular placement"),
                        }
                    }
                }
            }
            placed.push(PlacedBody {
                id,
                is_static: rb.pulses.is_static(),
                meshes,
            });
        }
        placed
    }

    /// Every movable body is tested against every other body. The body
    /// whose lines, ridges or intersectable feel the other is `o1`.
    fn collide(&mut self, placed: &[PlacedBody], history: &mut CollisionHistory) {
        for (ib, b) in placed.iter().enumerate() {
            if b.is_static {
                continue;
            }
            for (ia, a) in placed.iter().enumerate() {
                if ia == ib {
                    continue;
                }
                let intersectables_once = a.is_static || ia < ib;
                for mesh_b in &b.meshes {
                    for mesh_a in &a.meshes {
                        if mesh_a.intersects(mesh_b) {
                            collide_meshes(a.id, b.id, mesh_a, mesh_b, intersectables_once, &mut self.bodies, history);
                        }
                    }
                }
            }
        }
    }
}

fn polygons(mesh: &TransformedMesh) -> Vec<Operand0<'_>> {
    mesh.get_triangles_sphere()
        .iter()
        .map(Operand0::Triangle)
        .chain(mesh.get_quads_sphere().iter().map(Operand0::Quad))
        .collect()
}

fn feelers(mesh: &TransformedMesh) -> Vec<Operand1<'_>> {
    let mut feelers: Vec<Operand1> = mesh
        .get_lines()
        .iter()
        .map(Operand1::Line)
        .chain(mesh.get_ridges_sphere().iter().map(Operand1::Ridge))
        .collect();
    if let Some(i) = mesh.intersectable() {
        feelers.push(Operand1::Intersectable(i));
    }
    feelers
}

/// Test the surfaces of `mesh_a` against the feelers of `mesh_b`.
fn collide_meshes(
    a: BodyId,
    b: BodyId,
    mesh_a: &Arc<TransformedMesh>,
    mesh_b: &Arc<TransformedMesh>,
    intersectables_once: bool,
    bodies: &mut Pool<RigidBody>,
    history: &mut CollisionHistory,
) {
    let (ma, mb) = (mesh_a.physics_material(), mesh_b.physics_material());
    let grind = PhysicsMaterial::OBJ_GRIND_CONTACT | PhysicsMaterial::OBJ_GRIND_LINE;
    if ma.any(grind) || mb.any(grind) {
        if mb.any(PhysicsMaterial::OBJ_GRIND_CONTACT) && ma.any(PhysicsMaterial::OBJ_GRIND_LINE) {
            let contacts = polygons(mesh_b);
            for rail in mesh_a.get_lines() {
                if !mesh_b.intersects_sphere(&rail.bounding_sphere) {
                    continue;
                }
                for &c in &contacts {
                    if c.bounding_sphere().intersects(&rail.bounding_sphere) {
                        let scene = IntersectionScene::rail(b, a, mesh_b, mesh_a, c, rail);
                        handle_line_triangle_intersection(&scene, bodies, history);
                    }
                }
            }
        }
        return;
    }
    let feelers_b: Vec<(Operand1, BoundingSphere)> = feelers(mesh_b)
        .into_iter()
        .map(|p| (p, p.bounding_sphere()))
        .filter(|(_, bs)| mesh_a.intersects_sphere(bs))
        .collect();
    for s in polygons(mesh_a) {
        let bs = s.bounding_sphere();
        if !mesh_b.intersects_sphere(&bs) {
            continue;
        }
        for &(p, ref pbs) in &feelers_b {
            if bs.intersects(pbs) {
                let scene = IntersectionScene::new(a, b, mesh_a, mesh_b, s, p);
                handle_line_triangle_intersection(&scene, bodies, history);
            }
        }
    }
    if let Some(i) = mesh_a.intersectable() {
        if !mb.any(PhysicsMaterial::OBJ_BULLET_LINE_SEGMENT) {
            for &(p, _) in &feelers_b {
                if let Operand1::Intersectable(_) = p {
                    if !intersectables_once {
                        continue;
                    }
                }
                let scene = IntersectionScene::new(a, b, mesh_a, mesh_b, Operand0::Intersectable(i), p);
                handle_line_triangle_intersection(&scene, bodies, history);
            }
        }
    }
    if ma.any(PhysicsMaterial::ATTR_CONCAVE) && mb.any(PhysicsMaterial::ATTR_CONVEX) {
        let surfaces_b = polygons(mesh_b);
        for r in mesh_a.get_ridges_sphere() {
            if !mesh_b.intersects_sphere(&r.bounding_sphere) {
                continue;
            }
            for &s in &surfaces_b {
                if s.bounding_sphere().intersects(&r.bounding_sphere) {
                    let scene = IntersectionScene::new(b, a, mesh_b, mesh_a, s, Operand1::Ridge(r));
                    handle_line_triangle_intersection(&scene, bodies, history);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    mod engine {
        use std::sync::Arc;
        use approx::assert_relative_eq;
        use cgmath::{EuclideanSpace, Matrix3, Point3, SquareMatrix, Vector3};
        use crate::collision::PhysicsMaterial;
        use crate::config::PhysicsEngineConfig;
        use crate::engine::*;
        use crate::error::Error;
        use crate::mesh::{ColoredVertex, ColoredVertexArray};
        use crate::rigid_body::*;
        use crate::swept::SweptSphereAabb;

        fn v(x: f32, y: f32, z: f32) -> ColoredVertex {
            ColoredVertex::new(Point3::new(x, y, z))
        }

        fn body(position: Point3<f64>) -> RigidBody {
            RigidBody::new(
                "body",
                RigidBodyPulses::new(1.0, Vector3::new(1.0, 1.0, 1.0), Point3::origin(), position, Matrix3::identity()),
            )
        }

        fn add_ground(engine: &mut PhysicsEngine) -> BodyId {
            let id = engine.add_rigid_body(RigidBody::new(
                "ground",
                RigidBodyPulses::new_static(Point3::origin(), Matrix3::identity()),
            ));
            let mut cva = ColoredVertexArray::new("ground", PhysicsMaterial::ATTR_CONCAVE);
            cva.push_triangle([v(-10.0, 0.0, -10.0), v(0.0, 0.0, 10.0), v(10.0, 0.0, -10.0)]);
            engine.attach_mesh(id, Arc::new(cva)).unwrap();
            id
        }

        fn engine() -> PhysicsEngine {
            let mut engine = PhysicsEngine::new(PhysicsEngineConfig::default()).unwrap();
            engine.set_gravity(Vector3::new(0.0, -9.8, 0.0));
            engine
        }

        #[test]
        fn test_invalid_config() {
            let cfg = PhysicsEngineConfig {
                dt: -1.0,
                ..Default::default()
            };
            assert!(PhysicsEngine::new(cfg).is_err());
        }

        #[test]
        fn test_unknown_body() {
            let mut engine = engine();
            let id = engine.add_rigid_body(body(Point3::origin()));
            assert_eq!(engine.remove_rigid_body(id).unwrap().name, "body");
            assert_eq!(engine.remove_rigid_body(id).unwrap_err(), Error::UnknownBody(id));
            let cva = Arc::new(ColoredVertexArray::new("empty", PhysicsMaterial::ATTR_CONVEX));
            assert_eq!(engine.attach_mesh(id, cva), Err(Error::UnknownBody(id)));
            assert!(engine.body(id).is_none());
        }

        #[test]
        fn test_free_fall() {
            let mut engine = engine();
            let id = engine.add_rigid_body(body(Point3::new(0.0, 10.0, 0.0)));
            let report = engine.tick();
            assert!(report.raycasts.is_empty());
            assert_eq!(report.ncontacts, 0);
            let rb = engine.body(id).unwrap();
            assert_relative_eq!(rb.pulses.v_com.y, -9.8 / 60.0, epsilon = 1e-9);
            assert!(rb.abs_position().y < 10.0);
            assert_eq!(rb.current_vehicle_domain, VehicleDomain::Air);
        }

        #[test]
        fn test_line_rests_on_ground() {
            let mut engine = engine();
            let ground = add_ground(&mut engine);
            let id = engine.add_rigid_body(body(Point3::new(0.0, 0.45, 0.0)));
            let mut cva = ColoredVertexArray::new("feeler", PhysicsMaterial::ATTR_CONVEX);
            cva.push_line([v(0.0, 0.5, 0.0), v(0.0, -0.5, 0.0)]);
            engine.attach_mesh(id, Arc::new(cva)).unwrap();

            let report = (0..60).map(|_| engine.tick()).last().unwrap();
            assert_eq!(report.raycasts.len(), engine.config().nsubsteps);
            let r = report.raycasts[0];
            assert_eq!((r.target, r.source), (ground, id));
            assert_relative_eq!(r.normal, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);

            let rb = engine.body(id).unwrap();
            let y = rb.abs_position().y;
            assert!(y > 0.45 && y < 0.55, "y = {}", y);
            assert!(rb.pulses.v_com.y.abs() < 0.1);
            assert_eq!(rb.current_vehicle_domain, VehicleDomain::Ground);
        }

        #[test]
        fn test_overlap_correction_is_bounded() {
            let mut engine = engine();
            add_ground(&mut engine);
            let id = engine.add_rigid_body(body(Point3::new(0.0, 0.45, 0.0)));
            let mut cva = ColoredVertexArray::new("feeler", PhysicsMaterial::ATTR_CONVEX);
            cva.push_line([v(0.0, 0.5, 0.0), v(0.0, -0.5, 0.0)]);
            engine.attach_mesh(id, Arc::new(cva)).unwrap();

            let cfg = *engine.config();
            let bound = cfg.plane_inequality_beta / cfg.dt_substeps() * 0.05;
            engine.tick();
            let rb = engine.body(id).unwrap();
            // Pushed out, but no faster than one Baumgarte step of the initial overlap.
            assert!(rb.pulses.v_com.y > 0.0, "v_y = {}", rb.pulses.v_com.y);
            assert!(rb.pulses.v_com.y <= bound + 1e-9, "v_y = {}, bound = {}", rb.pulses.v_com.y, bound);
            assert!(rb.abs_position().y < 0.5);
        }

        #[test]
        fn test_box_rests_on_ground() {
            let mut engine = engine();
            add_ground(&mut engine);
            // Large inertia keeps the single corner contact from tipping the box.
            let id = engine.add_rigid_body(RigidBody::new(
                "box",
                RigidBodyPulses::new(
                    1.0,
                    Vector3::new(1e6, 1e6, 1e6),
                    Point3::origin(),
                    Point3::new(0.0, 0.45, 0.0),
                    Matrix3::identity(),
                ),
            ));
            let swept = SweptSphereAabb::new(Point3::new(-0.5, -0.5, -0.5), Point3::new(0.5, 0.5, 0.5), 0.1).unwrap();
            engine
                .attach_intersectable(id, "box", PhysicsMaterial::ATTR_CONVEX, Arc::new(swept))
                .unwrap();
            for _ in 0..60 {
                engine.tick();
            }
            let rb = engine.body(id).unwrap();
            let y = rb.abs_position().y;
            assert!(y > 0.4 && y < 0.6, "y = {}", y);
            assert!(rb.pulses.v_com.y.abs() < 0.1, "v_y = {}", rb.pulses.v_com.y);
        }

        #[test]
        fn test_body_grinds_on_rail() {
            let mut engine = PhysicsEngine::new(PhysicsEngineConfig::default()).unwrap();
            let rail = engine.add_rigid_body(RigidBody::new(
                "rail",
                RigidBodyPulses::new_static(Point3::origin(), Matrix3::identity()),
            ));
            let mut cva = ColoredVertexArray::new("rail", PhysicsMaterial::OBJ_GRIND_LINE);
            cva.push_line([v(-2.0, 0.0, 0.0), v(2.0, 0.0, 0.0)]);
            engine.attach_mesh(rail, Arc::new(cva)).unwrap();

            let mut skater = body(Point3::origin()).with_grind_point(Point3::origin());
            skater.set_wants_to_grind(true);
            let id = engine.add_rigid_body(skater);
            let mut cva = ColoredVertexArray::new("board", PhysicsMaterial::OBJ_GRIND_CONTACT);
            cva.push_triangle([v(0.0, -1.0, -1.0), v(0.0, -1.0, 1.0), v(0.0, 1.0, 0.0)]);
            engine.attach_mesh(id, Arc::new(cva)).unwrap();

            let report = engine.tick();
            assert!(report.raycasts.is_empty());
            assert!(report.ncontacts > 0);
            let gs = engine.body(id).unwrap().grind_state;
            assert!(gs.wants_to_grind);
            assert!(gs.previous.grinding);
            assert_eq!(gs.previous.grind_direction, Vector3::new(1.0, 0.0, 0.0));
            assert_eq!(gs.wants_to_grind_counter, engine.config().nsubsteps);
        }
    }
}
