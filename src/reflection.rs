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

//! Contact constraints of reflecting collisions.

use cgmath::{InnerSpace, Point3, Vector3};
use tracing::trace;

use crate::collision::*;
use crate::config::PhysicsEngineConfig;
use crate::geom::PlaneNd;
use crate::handle::IntersectionScene;
use crate::history::CollisionHistory;
use crate::intersect::{IntersectionInfo, NormalAndOverlap, Operand0, Operand1};
use crate::pool::Pool;
use crate::precision::{any_nan, scene_to_dir, ScenePos, SceneDir};
use crate::rigid_body::RigidBody;
use crate::solver::*;

/// Slop of contacts against static surfaces.
const STATIC_SLOP: ScenePos = 0.001;

/// Overlaps below this are treated as touching one-sided planes.
const ONE_SIDED_EPSILON: ScenePos = 1e-6;

/// Largest gap tolerated between two operands that reported a hit.
const MAX_GAP: ScenePos = 1e-3;

fn polygon_corners<'a>(operand: &Operand0<'a>) -> &'a [Point3<ScenePos>] {
    match *operand {
        Operand0::Quad(q) => q.corners(),
        Operand0::Triangle(t) => t.corners(),
        Operand0::Intersectable(_) => &[],
    }
}

/// Separating-axis test between a polygon and a ridge, restricted to the
/// polygon normal and the ridge normal. The returned normal points from
/// the polygon towards the ridge.
pub fn ridge_overlap(plane: &PlaneNd, corners: &[Point3<ScenePos>], ridge: &CollisionRidgeSphere) -> NormalAndOverlap {
    let plane_overlap = -ridge
        .edge
        .iter()
        .map(|e| plane.distance(*e))
        .fold(ScenePos::INFINITY, ScenePos::min);
    let ridge_overlap = -corners
        .iter()
        .map(|c| ridge.normal.dot(c - ridge.edge[0]))
        .fold(ScenePos::INFINITY, ScenePos::min);
    if ridge_overlap < plane_overlap {
        NormalAndOverlap {
            normal: -ridge.normal,
            overlap: ridge_overlap,
        }
    } else {
        NormalAndOverlap {
            normal: plane.normal,
            overlap: plane_overlap,
        }
    }
}

/// Normal and overlap of a polygon pierced by a ridge, or None if the
/// contact should be ignored.
fn compute_edge_overlap(
    c: &IntersectionScene,
    plane: &PlaneNd,
    p: Point3<ScenePos>,
    bodies: &Pool<RigidBody>,
    cfg: &PhysicsEngineConfig,
) -> Option<NormalAndOverlap> {
    let ridge = match c.operand1 {
        Operand1::Ridge(r) => r,
        _ => panic!("Edge overlap requires a ridge"),
    };
    let corners = polygon_corners(&c.operand0);
    let (m0, m1) = (c.mesh0_material(), c.mesh1_material());
    if m1.any(PhysicsMaterial::ATTR_CONVEX) && m0.any(PhysicsMaterial::ATTR_CONVEX | PhysicsMaterial::ATTR_CONCAVE) {
        let o1_position = bodies[c.o1].abs_position();
        if m0.any(PhysicsMaterial::ATTR_CONCAVE) && plane.distance(o1_position) < 0.0 {
            return None;
        }
        let no = ridge_overlap(plane, corners, ridge);
        if no.normal.dot(plane.normal) < cfg.min_cos_ridge_triangle {
            return None;
        }
        if (o1_position - p).dot(no.normal) < 0.0 {
            return None;
        }
        Some(no)
    } else if m0.any(PhysicsMaterial::ATTR_CONVEX) && m1.any(PhysicsMaterial::ATTR_CONCAVE) {
        let no = ridge_overlap(plane, corners, ridge);
        if (p - bodies[c.o0].abs_position()).dot(no.normal) < 0.0 {
            return None;
        }
        Some(no)
    } else {
        panic!("Physics material of all objects is not convex");
    }
}

/// Update the surface alignment state of `o1`. Returns true if the contact
/// is consumed by the alignment logic.
fn handle_alignment(c: &IntersectionScene, bodies: &mut Pool<RigidBody>, cfg: &PhysicsEngineConfig) -> bool {
    let (m0, m1) = (c.mesh0_material(), c.mesh1_material());
    let rb1 = &mut bodies[c.o1];
    if m0.any(PhysicsMaterial::OBJ_ALIGNMENT_PLANE) {
        if rb1.grind_state.wants_to_grind {
            // While grinding, the flag only switches the rail constraint
            // from plane to line.
            rb1.align_to_surface_state.touches_alignment_plane = true;
            return true;
        }
        let plane = match c.operand0.plane() {
            Some(plane) => plane,
            None => panic!("Alignment object has no plane normal"),
        };
        if plane.normal.dot(rb1.pulses.rotation.y) < cfg.alignment_plane_cos {
            return true;
        }
    }
    if !m1.any(PhysicsMaterial::OBJ_ALIGNMENT_CONTACT) {
        return false;
    }
    let n = match c.operand0.plane() {
        Some(plane) => scene_to_dir(plane.normal),
        None => panic!("Alignment contact touches an object without a plane normal"),
    };
    let st = &mut rb1.align_to_surface_state;
    if st.align_to_surface_relaxation == 0.0 {
        return true;
    }
    if m0.any(PhysicsMaterial::OBJ_ALIGNMENT_PLANE) {
        if !st.touches_alignment_plane || n.y > st.surface_normal.y {
            st.touches_alignment_plane = true;
            st.surface_normal = n;
        }
    } else if !st.touches_alignment_plane
        && n.y.abs() > cfg.alignment_surface_cos as SceneDir
        && (!m0.any(PhysicsMaterial::ATTR_ALIGN_STRICT) || n.y > cfg.alignment_surface_cos_strict as SceneDir)
        && (any_nan(st.surface_normal) || n.y > st.surface_normal.y)
    {
        st.surface_normal = n;
    }
    true
}

/// Convert a reflecting contact into normal and friction constraints.
///
/// # Panics
///
/// If the operands report a hit but are separated by a gap, or if the
/// materials do not allow computing a contact normal.
pub fn handle_reflection(
    c: &IntersectionScene,
    info: &IntersectionInfo,
    bodies: &mut Pool<RigidBody>,
    history: &mut CollisionHistory,
) {
    let cfg = history.cfg;
    if handle_alignment(c, bodies, &cfg) {
        return;
    }
    let (m0, m1) = (c.mesh0_material(), c.mesh1_material());
    let p = info.intersection_point();
    let two_sided = m0.any(PhysicsMaterial::ATTR_TWO_SIDED);

    let mut sat_used = false;
    let (mut normal, overlap) = if let Some(no) = info.normal_and_overlap() {
        sat_used = true;
        (no.normal, no.overlap)
    } else if !c.l1_is_normal {
        let mut plane = match c.operand0.plane() {
            Some(plane) => *plane,
            None => panic!("Ridges require a collision partner with a plane normal"),
        };
        if two_sided {
            if !m1.any(PhysicsMaterial::ATTR_CONVEX) {
                panic!("Two-sided materials require a convex collision partner");
            }
            if plane.distance(bodies[c.o1].abs_position()) < 0.0 {
                plane = -plane;
            }
        }
        match compute_edge_overlap(c, &plane, p, bodies, &cfg) {
            Some(no) => {
                sat_used = true;
                (no.normal, no.overlap)
            }
            None => return,
        }
    } else {
        let line = match c.operand1 {
            Operand1::Line(l) => l,
            _ => panic!("l1_is_normal requires a line"),
        };
        let plane = match c.operand0.plane() {
            Some(plane) => plane,
            None => panic!("Lines require a collision partner with a plane normal"),
        };
        let overlap = -plane.distance(line.line[1]);
        if two_sided {
            if overlap < 0.0 {
                (-plane.normal, -overlap)
            } else {
                (plane.normal, overlap)
            }
        } else if overlap < ONE_SIDED_EPSILON {
            return;
        } else {
            (plane.normal, overlap)
        }
    };
    if overlap < -MAX_GAP {
        if sat_used {
            panic!("Line and triangle do not overlap. Are the objects non-convex? Gap: {}", -overlap);
        } else {
            panic!("Line and triangle do not overlap. Gap: {}", -overlap);
        }
    }
    if !c.l1_is_normal {
        if m0.any(PhysicsMaterial::ATTR_ROUND) || m1.any(PhysicsMaterial::ATTR_ROUND) {
            normal = round_normal(c, normal, &cfg);
        } else {
            let dv = bodies[c.o0].velocity_at_position(p) - bodies[c.o1].velocity_at_position(p);
            let ds = normal.dot(dv) * cfg.dt_substeps();
            if overlap < ds * cfg.slide_factor {
                trace!(overlap, ds, "contact slides");
                return;
            }
        }
    }
    if bodies[c.o0].mass() != ScenePos::INFINITY && bodies[c.o1].mass() == ScenePos::INFINITY {
        handle_standard_reflection(c, normal, p, overlap, bodies, history);
    } else {
        handle_extended_reflection(c, normal, p, overlap, bodies, history);
    }
}

fn round_normal(c: &IntersectionScene, normal: Vector3<ScenePos>, cfg: &PhysicsEngineConfig) -> Vector3<ScenePos> {
    let ridge = match c.operand1 {
        Operand1::Ridge(r) => r,
        _ => panic!("Round materials require a ridge"),
    };
    let round0 = c.mesh0_material().any(PhysicsMaterial::ATTR_ROUND);
    let round1 = c.mesh1_material().any(PhysicsMaterial::ATTR_ROUND);
    let plane_normal = || match c.operand0.plane() {
        Some(plane) => plane.normal,
        None => panic!("Round materials require a plane normal"),
    };
    let rn = if round0 && round1 {
        let n = plane_normal() - ridge.normal;
        let l2 = n.magnitude2();
        if l2 < 1e-12 {
            panic!("Normal is too small in collision of round objects (objects might be unseparated)");
        }
        n / l2.sqrt()
    } else if round0 {
        plane_normal()
    } else {
        -ridge.normal
    };
    if rn.dot(normal) < cfg.max_cos_round_normal {
        rn
    } else {
        normal
    }
}

/// A movable `o0` against a static `o1`.
fn handle_standard_reflection(
    c: &IntersectionScene,
    normal: Vector3<ScenePos>,
    p: Point3<ScenePos>,
    overlap: ScenePos,
    bodies: &Pool<RigidBody>,
    history: &mut CollisionHistory,
) {
    let cfg = history.cfg;
    let rb0 = &bodies[c.o0];
    let index = history.contact_infos.add_contact(ContactInfo::Normal1(NormalContactInfo1 {
        rb: c.o0,
        pc: BoundedPlaneInequalityConstraint {
            constraint: PlaneInequalityConstraint::new(-normal, overlap, STATIC_SLOP, cfg.plane_inequality_beta),
            lambda_min: rb0.mass() * cfg.velocity_lambda_min,
            lambda_max: 0.0,
        },
        p,
    }));
    history.contact_infos.add_contact(ContactInfo::Friction1(FrictionContactInfo1 {
        rb: c.o0,
        friction: Friction::new(
            index,
            p,
            cfg.stiction_coefficient,
            cfg.friction_coefficient,
            bodies[c.o1].velocity_at_position(p),
        ),
    }));
}

/// Two movable bodies, or a static `o0` against a movable `o1`.
fn handle_extended_reflection(
    c: &IntersectionScene,
    normal: Vector3<ScenePos>,
    p: Point3<ScenePos>,
    overlap: ScenePos,
    bodies: &Pool<RigidBody>,
    history: &mut CollisionHistory,
) {
    let cfg = history.cfg;
    let (m0, m1) = (bodies[c.o0].mass(), bodies[c.o1].mass());
    let index = if m0 != ScenePos::INFINITY {
        history.contact_infos.add_contact(ContactInfo::Normal2(NormalContactInfo2 {
            rb0: c.o1,
            rb1: c.o0,
            pc: BoundedPlaneInequalityConstraint {
                constraint: PlaneInequalityConstraint::new(normal, overlap, 0.0, cfg.plane_inequality_beta),
                lambda_min: reduced_mass(m0, m1) * cfg.velocity_lambda_min,
                lambda_max: 0.0,
            },
            p,
            impact: Some(ImpactNotification {
                primary: c.o0,
                secondary: c.o1,
            }),
        }))
    } else {
        history.contact_infos.add_contact(ContactInfo::Normal1(NormalContactInfo1 {
            rb: c.o1,
            pc: BoundedPlaneInequalityConstraint {
                constraint: PlaneInequalityConstraint::new(normal, overlap, STATIC_SLOP, cfg.plane_inequality_beta),
                lambda_min: m1 * cfg.velocity_lambda_min,
                lambda_max: 0.0,
            },
            p,
        }))
    };
    let (stiction, friction) = if c.mesh0_material().any(PhysicsMaterial::OBJ_ALIGNMENT_PLANE) {
        (0.0, 0.0)
    } else {
        (cfg.stiction_coefficient, cfg.friction_coefficient)
    };
    let contact = if m0 == ScenePos::INFINITY && m1 != ScenePos::INFINITY {
        ContactInfo::Friction1(FrictionContactInfo1 {
            rb: c.o1,
            friction: Friction::new(index, p, stiction, friction, bodies[c.o0].velocity_at_position(p)),
        })
    } else {
        ContactInfo::Friction2(FrictionContactInfo2 {
            rb0: c.o1,
            rb1: c.o0,
            friction: Friction::new(index, p, stiction, friction, Vector3::new(0.0, 0.0, 0.0)),
        })
    };
    history.contact_infos.add_contact(contact);
}
