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

//! Rail constraints and jumps off rails.

use cgmath::{InnerSpace, Matrix, Vector3};
use tracing::{debug, trace};

use crate::geom::PlaneNd;
use crate::history::{CollisionHistory, GrindInfo};
use crate::pool::Pool;
use crate::precision::{scene_to_dir, sign, SceneDir, ScenePos};
use crate::rigid_body::{BodyId, RigidBody, VectorAtPosition};
use crate::solver::*;

/// Apply a single impulse along `line.vector` so that the normal velocity
/// of `body` relative to `rail` grows by at most `dv`. A body that already
/// separates faster than `dv` is left alone.
pub fn jump<T: ConstrainedSet<BodyId>>(bodies: &mut T, rail: BodyId, body: BodyId, dv: ScenePos, line: &VectorAtPosition) {
    let n = line.vector;
    let (v_body, m_body) = {
        let rbp = bodies.pulses(body);
        (rbp.velocity_at_position(line.position).dot(n), rbp.effective_mass(line))
    };
    let (v_rail, m_rail, rail_is_static) = {
        let rbp = bodies.pulses(rail);
        (rbp.velocity_at_position(line.position).dot(n), rbp.effective_mass(line), rbp.is_static())
    };
    let delta = (dv - (v_body - v_rail)).max(0.0).min(dv);
    if delta == 0.0 {
        return;
    }
    let lambda = if rail_is_static {
        m_body * delta
    } else {
        reduced_mass(m_body, m_rail) * delta
    };
    bodies.pulses_mut(body).integrate_impulse(&VectorAtPosition {
        vector: n * lambda,
        position: line.position,
    });
    if !rail_is_static {
        bodies.pulses_mut(rail).integrate_impulse(&VectorAtPosition {
            vector: -n * lambda,
            position: line.position,
        });
    }
}

/// Body axis (0 or 2) most aligned with the rail. Ties go to 2.
fn grind_axis(pv: Vector3<SceneDir>) -> usize {
    if pv.x.abs() > pv.z.abs() {
        0
    } else {
        2
    }
}

/// Turn the closest rail of every grinding body into constraints, or
/// into a jump if the body asked for one.
///
/// # Panics
///
/// If a body jumps off a rail in a world without gravity, or if a rail is
/// vertical.
pub fn collide_grind_infos(bodies: &mut Pool<RigidBody>, history: &mut CollisionHistory) {
    let cfg = history.cfg;
    let grind_infos = history.take_grind_infos();
    debug!(n = grind_infos.len(), "colliding grind infos");
    for (id, g) in grind_infos {
        let d = g.rail_direction;
        let (axis, wants_to_jump) = {
            let rb = &mut bodies[id];
            let pv = scene_to_dir(rb.pulses.rotation.transpose() * d);
            rb.grind_state.grind_pv = pv;
            rb.grind_state.grind_axis = grind_axis(pv);
            (rb.grind_state.grind_axis, rb.jump_state.wants_to_jump_oversampled)
        };
        if wants_to_jump {
            let gravity = match history.world.gravity {
                Some(gravity) if gravity.magnitude != 0.0 => gravity,
                _ => panic!("Collide grind infos without gravity"),
            };
            let pulses = &bodies[id].pulses;
            let mut point_dir = pulses.rotation[axis];
            point_dir *= sign(point_dir.dot(pulses.v_com));
            point_dir -= d * point_dir.dot(d);
            let n = (-gravity.direction + point_dir * 2.0).normalize();
            trace!(body = %id, rail = %g.rail_rb, "jumping off rail");
            jump(
                bodies,
                g.rail_rb,
                id,
                cfg.grind_jump_dv,
                &VectorAtPosition {
                    vector: n,
                    position: g.intersection_point,
                },
            );
            continue;
        }
        if !bodies[id].jump_state.cooled_down(cfg.grind_jump_cooldown_substeps()) {
            continue;
        }
        let n = d.cross(Vector3::unit_y());
        let l2 = n.magnitude2();
        if l2 < 1e-12 {
            panic!("Rail normal too small");
        }
        let n = n / l2.sqrt();
        let rb = &bodies[id];
        let rail = &bodies[g.rail_rb];
        let grind_point = rb.abs_grind_point();
        let pec = PointEqualityConstraint {
            p0: grind_point,
            p1: g.intersection_point,
            beta: cfg.plane_equality_beta,
        };
        let lec = LineEqualityConstraint {
            pec: PointEqualityConstraint {
                beta: cfg.point_equality_beta,
                ..pec
            },
            null_space: Some(d),
        };
        let top = PlaneNd::from_normal_and_point(n.cross(d), g.intersection_point);
        let single = rail.pulses.is_static();
        let mass = if single { rb.mass() } else { reduced_mass(rb.mass(), rail.mass()) };
        let pec = BoundedPlaneEqualityConstraint::new(
            PlaneEqualityConstraint { pec, plane_normal: n },
            mass * cfg.velocity_lambda_min,
            -mass * cfg.velocity_lambda_min,
        );
        let pc = BoundedPlaneInequalityConstraint {
            constraint: PlaneInequalityConstraint::new(top.normal, -top.distance(grind_point), 0.0, cfg.plane_inequality_beta),
            lambda_min: mass * cfg.velocity_lambda_min,
            lambda_max: 0.0,
        };
        let aligned = rb.align_to_surface_state.touches_alignment_plane;
        let contacts = &mut history.contact_infos;
        match (single, aligned) {
            (true, false) => {
                let v1 = rail.velocity_at_position(g.intersection_point);
                contacts.add_contact(ContactInfo::Plane1(PlaneContactInfo1 { rb: id, v1, pec }));
                contacts.add_contact(ContactInfo::Normal1(NormalContactInfo1 { rb: id, pc, p: grind_point }));
            }
            (true, true) => {
                let v1 = rail.velocity_at_position(g.intersection_point);
                contacts.add_contact(ContactInfo::Line1(LineContactInfo1 { rb: id, v1, lec }));
            }
            (false, false) => {
                contacts.add_contact(ContactInfo::Plane2(PlaneContactInfo2 { rb0: id, rb1: g.rail_rb, pec }));
                contacts.add_contact(ContactInfo::Normal2(NormalContactInfo2 {
                    rb0: id,
                    rb1: g.rail_rb,
                    pc,
                    p: grind_point,
                    impact: None,
                }));
            }
            (false, true) => {
                contacts.add_contact(ContactInfo::Line2(LineContactInfo2 { rb0: id, rb1: g.rail_rb, lec }));
            }
        }
        let state = &mut bodies[id].grind_state;
        state.grinding = true;
        state.grind_direction = scene_to_dir(d);
    }
}
