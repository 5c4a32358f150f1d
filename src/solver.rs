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

//! Sequential impulse solver.
//!
//! Contacts are built fresh every substep from the collision history, solved
//! for a fixed number of passes and then discarded. Every impulse is a
//! scalar or vector `lambda`; normal impulses are accumulated and clamped to
//! `[lambda_min, lambda_max]` over all passes.

use cgmath::{InnerSpace, Point3, Vector3, Zero};
use smallvec::SmallVec;
use tracing::debug;

use crate::config::PhysicsEngineConfig;
use crate::observer::CollisionRole;
use crate::pool::Pool;
use crate::precision::ScenePos;
use crate::rigid_body::{BodyId, RigidBody, RigidBodyPulses, VectorAtPosition};

/// Relaxation of the first solver pass. Later passes use 1.
pub const FIRST_PASS_RELAXATION: ScenePos = 0.2;

const LAMBDA_LIMIT: ScenePos = 1e6;

const MIN_VELOCITY2: ScenePos = 1e-12;

/// Storage the solver reads and integrates body pulses through.
pub trait ConstrainedSet<Index: Copy> {
    fn pulses(&self, index: Index) -> &RigidBodyPulses;
    fn pulses_mut(&mut self, index: Index) -> &mut RigidBodyPulses;
}

impl ConstrainedSet<BodyId> for Pool<RigidBody> {
    fn pulses(&self, id: BodyId) -> &RigidBodyPulses {
        &self[id].pulses
    }

    fn pulses_mut(&mut self, id: BodyId) -> &mut RigidBodyPulses {
        &mut self[id].pulses
    }
}

/// Reduced mass of two effective masses. A static partner contributes
/// nothing, so the result is the other mass.
#[inline(always)]
pub fn reduced_mass(m0: ScenePos, m1: ScenePos) -> ScenePos {
    if m0 == ScenePos::INFINITY {
        m1
    } else if m1 == ScenePos::INFINITY {
        m0
    } else {
        m0 * m1 / (m0 + m1)
    }
}

#[inline(always)]
fn clamp(n: ScenePos, min: ScenePos, max: ScenePos) -> ScenePos {
    if n < min {
        min
    } else if n > max {
        max
    } else {
        n
    }
}

/// Drives `p0` towards `p1`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PointEqualityConstraint {
    pub p0: Point3<ScenePos>,
    pub p1: Point3<ScenePos>,
    pub beta: ScenePos,
}

impl PointEqualityConstraint {
    /// Correction velocity.
    pub fn v(&self, dt: ScenePos) -> Vector3<ScenePos> {
        (self.p1 - self.p0) * (self.beta / dt)
    }
}

/// A point equality that ignores errors along `null_space`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LineEqualityConstraint {
    pub pec: PointEqualityConstraint,
    /// Unit direction along which the points may slide.
    pub null_space: Option<Vector3<ScenePos>>,
}

/// A point equality restricted to `plane_normal`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PlaneEqualityConstraint {
    pub pec: PointEqualityConstraint,
    pub plane_normal: Vector3<ScenePos>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NormalImpulse {
    pub normal: Vector3<ScenePos>,
    pub lambda_total: ScenePos,
}

impl NormalImpulse {
    pub fn new(normal: Vector3<ScenePos>) -> Self {
        NormalImpulse { normal, lambda_total: 0.0 }
    }
}

/// Non-penetration along a normal, with Baumgarte correction of the part
/// of the overlap that exceeds `slop`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PlaneInequalityConstraint {
    pub normal_impulse: NormalImpulse,
    pub overlap: ScenePos,
    pub b: ScenePos,
    pub slop: ScenePos,
    pub beta: ScenePos,
}

impl PlaneInequalityConstraint {
    pub fn new(normal: Vector3<ScenePos>, overlap: ScenePos, slop: ScenePos, beta: ScenePos) -> Self {
        PlaneInequalityConstraint {
            normal_impulse: NormalImpulse::new(normal),
            overlap,
            b: 0.0,
            slop,
            beta,
        }
    }

    pub fn bias(&self) -> ScenePos {
        (self.overlap - self.slop).max(0.0)
    }

    pub fn v(&self, dt: ScenePos) -> ScenePos {
        self.b + self.beta / dt * self.bias()
    }
}

fn clamp_accumulated(total: &mut ScenePos, lambda: ScenePos, min: ScenePos, max: ScenePos) -> ScenePos {
    let lambda = clamp(*total + lambda, min, max) - *total;
    if lambda.abs() > LAMBDA_LIMIT {
        panic!("Lambda out of bounds: {}", lambda);
    }
    *total += lambda;
    if total.abs() > LAMBDA_LIMIT {
        panic!("Lambda-total out of bounds: {}", total);
    }
    lambda
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundedPlaneInequalityConstraint {
    pub constraint: PlaneInequalityConstraint,
    pub lambda_min: ScenePos,
    pub lambda_max: ScenePos,
}

impl BoundedPlaneInequalityConstraint {
    /// Clamp the accumulated impulse and return the increment that remains.
    pub fn clamped_lambda(&mut self, lambda: ScenePos) -> ScenePos {
        clamp_accumulated(
            &mut self.constraint.normal_impulse.lambda_total,
            lambda,
            self.lambda_min,
            self.lambda_max,
        )
    }

    pub fn normal_impulse(&self) -> &NormalImpulse {
        &self.constraint.normal_impulse
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundedPlaneEqualityConstraint {
    pub constraint: PlaneEqualityConstraint,
    pub lambda_min: ScenePos,
    pub lambda_max: ScenePos,
    pub lambda_total: ScenePos,
}

impl BoundedPlaneEqualityConstraint {
    pub fn new(constraint: PlaneEqualityConstraint, lambda_min: ScenePos, lambda_max: ScenePos) -> Self {
        BoundedPlaneEqualityConstraint {
            constraint,
            lambda_min,
            lambda_max,
            lambda_total: 0.0,
        }
    }

    pub fn clamped_lambda(&mut self, lambda: ScenePos) -> ScenePos {
        clamp_accumulated(&mut self.lambda_total, lambda, self.lambda_min, self.lambda_max)
    }
}

/// Bodies whose observers hear about the final impulse of a two-body
/// normal contact.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ImpactNotification {
    pub primary: BodyId,
    pub secondary: BodyId,
}

/// Normal contact of one body against a static surface.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NormalContactInfo1 {
    pub rb: BodyId,
    pub pc: BoundedPlaneInequalityConstraint,
    pub p: Point3<ScenePos>,
}

impl NormalContactInfo1 {
    fn solve<T: ConstrainedSet<BodyId>>(&mut self, bodies: &mut T, dt: ScenePos, relaxation: ScenePos) {
        let n = self.pc.constraint.normal_impulse.normal;
        let rbp = bodies.pulses(self.rb);
        let v = rbp.velocity_at_position(self.p).dot(n);
        let mc = rbp.effective_mass(&VectorAtPosition { vector: n, position: self.p });
        let lambda = self.pc.clamped_lambda(relaxation * -mc * (-v + self.pc.constraint.v(dt)));
        bodies.pulses_mut(self.rb).integrate_impulse(&VectorAtPosition {
            vector: -n * lambda,
            position: self.p,
        });
    }
}

/// Normal contact between two bodies. `rb0` is pushed along the normal,
/// `rb1` against it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NormalContactInfo2 {
    pub rb0: BodyId,
    pub rb1: BodyId,
    pub pc: BoundedPlaneInequalityConstraint,
    pub p: Point3<ScenePos>,
    pub impact: Option<ImpactNotification>,
}

impl NormalContactInfo2 {
    fn solve<T: ConstrainedSet<BodyId>>(&mut self, bodies: &mut T, dt: ScenePos, relaxation: ScenePos) {
        let n = self.pc.constraint.normal_impulse.normal;
        let line = VectorAtPosition { vector: n, position: self.p };
        let (v0, mc0) = {
            let rbp = bodies.pulses(self.rb0);
            (rbp.velocity_at_position(self.p).dot(n), rbp.effective_mass(&line))
        };
        let (v1, mc1) = {
            let rbp = bodies.pulses(self.rb1);
            (rbp.velocity_at_position(self.p).dot(n), rbp.effective_mass(&line))
        };
        let lambda = -reduced_mass(mc0, mc1) * (-v0 + v1 + self.pc.constraint.v(dt));
        let lambda = self.pc.clamped_lambda(relaxation * lambda);
        bodies.pulses_mut(self.rb0).integrate_impulse(&VectorAtPosition {
            vector: -n * lambda,
            position: self.p,
        });
        bodies.pulses_mut(self.rb1).integrate_impulse(&VectorAtPosition {
            vector: n * lambda,
            position: self.p,
        });
    }

    fn finalize(&self, bodies: &Pool<RigidBody>) {
        let impact = match self.impact {
            Some(impact) => impact,
            None => return,
        };
        let n = self.pc.constraint.normal_impulse.normal;
        let lambda_final = self.pc.constraint.normal_impulse.lambda_total;
        let primary = &bodies[impact.primary];
        let secondary = &bodies[impact.secondary];
        for o in primary.observers() {
            o.notify_impact(secondary, CollisionRole::Primary, n, lambda_final);
        }
        for o in secondary.observers() {
            o.notify_impact(primary, CollisionRole::Secondary, n, lambda_final);
        }
    }
}

fn line_error(lec: &LineEqualityConstraint, v0: Vector3<ScenePos>, v1: Vector3<ScenePos>, dt: ScenePos) -> Vector3<ScenePos> {
    let mut dv = -v0 + v1 + lec.pec.v(dt);
    if let Some(d) = lec.null_space {
        dv -= d * dv.dot(d);
    }
    dv
}

/// Keeps a body point on a line moving with velocity `v1`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LineContactInfo1 {
    pub rb: BodyId,
    pub v1: Vector3<ScenePos>,
    pub lec: LineEqualityConstraint,
}

impl LineContactInfo1 {
    fn solve<T: ConstrainedSet<BodyId>>(&mut self, bodies: &mut T, dt: ScenePos, relaxation: ScenePos) {
        let p0 = self.lec.pec.p0;
        let rbp = bodies.pulses(self.rb);
        let dv = line_error(&self.lec, rbp.velocity_at_position(p0), self.v1, dt);
        let len2 = dv.magnitude2();
        if len2 > MIN_VELOCITY2 {
            let n = dv / len2.sqrt();
            let mc0 = rbp.effective_mass(&VectorAtPosition { vector: n, position: p0 });
            let lambda = dv * (-relaxation * mc0);
            bodies.pulses_mut(self.rb).integrate_impulse(&VectorAtPosition {
                vector: -lambda,
                position: p0,
            });
        }
    }
}

/// Keeps a point of `rb0` on a line attached to `rb1`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LineContactInfo2 {
    pub rb0: BodyId,
    pub rb1: BodyId,
    pub lec: LineEqualityConstraint,
}

impl LineContactInfo2 {
    fn solve<T: ConstrainedSet<BodyId>>(&mut self, bodies: &mut T, dt: ScenePos, relaxation: ScenePos) {
        let PointEqualityConstraint { p0, p1, .. } = self.lec.pec;
        let v0 = bodies.pulses(self.rb0).velocity_at_position(p0);
        let v1 = bodies.pulses(self.rb1).velocity_at_position(p1);
        let dv = line_error(&self.lec, v0, v1, dt);
        let len2 = dv.magnitude2();
        if len2 > MIN_VELOCITY2 {
            let n = dv / len2.sqrt();
            let mc0 = bodies.pulses(self.rb0).effective_mass(&VectorAtPosition { vector: n, position: p0 });
            let mc1 = bodies.pulses(self.rb1).effective_mass(&VectorAtPosition { vector: n, position: p1 });
            let lambda = dv * (-relaxation * reduced_mass(mc0, mc1));
            bodies.pulses_mut(self.rb0).integrate_impulse(&VectorAtPosition {
                vector: -lambda,
                position: p0,
            });
            bodies.pulses_mut(self.rb1).integrate_impulse(&VectorAtPosition {
                vector: lambda,
                position: p1,
            });
        }
    }
}

/// Keeps a body point on a plane moving with velocity `v1`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PlaneContactInfo1 {
    pub rb: BodyId,
    pub v1: Vector3<ScenePos>,
    pub pec: BoundedPlaneEqualityConstraint,
}

impl PlaneContactInfo1 {
    fn solve<T: ConstrainedSet<BodyId>>(&mut self, bodies: &mut T, dt: ScenePos, relaxation: ScenePos) {
        let PlaneEqualityConstraint { pec, plane_normal } = self.pec.constraint;
        let rbp = bodies.pulses(self.rb);
        let dv = -rbp.velocity_at_position(pec.p0) + self.v1 + pec.v(dt);
        let mc0 = rbp.effective_mass(&VectorAtPosition { vector: plane_normal, position: pec.p0 });
        let lambda = self.pec.clamped_lambda(relaxation * -mc0 * dv.dot(plane_normal));
        bodies.pulses_mut(self.rb).integrate_impulse(&VectorAtPosition {
            vector: -plane_normal * lambda,
            position: pec.p0,
        });
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PlaneContactInfo2 {
    pub rb0: BodyId,
    pub rb1: BodyId,
    pub pec: BoundedPlaneEqualityConstraint,
}

impl PlaneContactInfo2 {
    fn solve<T: ConstrainedSet<BodyId>>(&mut self, bodies: &mut T, dt: ScenePos, relaxation: ScenePos) {
        let PlaneEqualityConstraint { pec, plane_normal } = self.pec.constraint;
        let (v0, mc0) = {
            let rbp = bodies.pulses(self.rb0);
            let line = VectorAtPosition { vector: plane_normal, position: pec.p0 };
            (rbp.velocity_at_position(pec.p0), rbp.effective_mass(&line))
        };
        let (v1, mc1) = {
            let rbp = bodies.pulses(self.rb1);
            let line = VectorAtPosition { vector: plane_normal, position: pec.p1 };
            (rbp.velocity_at_position(pec.p1), rbp.effective_mass(&line))
        };
        let dv = -v0 + v1 + pec.v(dt);
        let lambda = -reduced_mass(mc0, mc1) * dv.dot(plane_normal);
        let lambda = self.pec.clamped_lambda(relaxation * lambda);
        bodies.pulses_mut(self.rb0).integrate_impulse(&VectorAtPosition {
            vector: -plane_normal * lambda,
            position: pec.p0,
        });
        bodies.pulses_mut(self.rb1).integrate_impulse(&VectorAtPosition {
            vector: plane_normal * lambda,
            position: pec.p1,
        });
    }
}

/// Index of a contact in a `Solver`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContactIndex(usize);

/// Coulomb friction tied to a normal contact. The accumulated impulse is
/// bounded by the stiction cone of the normal impulse and falls back to the
/// friction cone once it slips.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Friction {
    pub normal: ContactIndex,
    pub p: Point3<ScenePos>,
    pub stiction_coefficient: ScenePos,
    pub friction_coefficient: ScenePos,
    /// Velocity of the surface the body slides on.
    pub b: Vector3<ScenePos>,
    pub lambda_total: Vector3<ScenePos>,
}

impl Friction {
    pub fn new(
        normal: ContactIndex,
        p: Point3<ScenePos>,
        stiction_coefficient: ScenePos,
        friction_coefficient: ScenePos,
        b: Vector3<ScenePos>,
    ) -> Self {
        Friction {
            normal,
            p,
            stiction_coefficient,
            friction_coefficient,
            b,
            lambda_total: Vector3::zero(),
        }
    }

    /// Tangential slip velocity.
    fn slip(&self, ni: &NormalImpulse, v: Vector3<ScenePos>) -> Vector3<ScenePos> {
        let v3 = v - self.b;
        v3 - ni.normal * v3.dot(ni.normal)
    }

    /// Accumulate `lambda` and return the increment after clamping.
    fn accumulate(&mut self, ni: &NormalImpulse, lambda: Vector3<ScenePos>) -> Vector3<ScenePos> {
        let old = self.lambda_total;
        self.lambda_total += lambda;
        let max_stiction = (-self.stiction_coefficient * ni.lambda_total).max(0.0);
        let l2 = self.lambda_total.magnitude2();
        if l2 > max_stiction * max_stiction {
            let max_friction = (-self.friction_coefficient * ni.lambda_total).max(0.0);
            self.lambda_total *= max_friction / l2.sqrt();
        }
        self.lambda_total - old
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrictionContactInfo1 {
    pub rb: BodyId,
    pub friction: Friction,
}

impl FrictionContactInfo1 {
    fn solve<T: ConstrainedSet<BodyId>>(&mut self, bodies: &mut T, ni: &NormalImpulse, relaxation: ScenePos) {
        let p = self.friction.p;
        let rbp = bodies.pulses(self.rb);
        let v3 = self.friction.slip(ni, rbp.velocity_at_position(p));
        let vl2 = v3.magnitude2();
        if vl2 > MIN_VELOCITY2 {
            let v = vl2.sqrt();
            let n3 = v3 / v;
            let mc = rbp.effective_mass(&VectorAtPosition { vector: n3, position: p });
            let lambda = self.friction.accumulate(ni, n3 * (relaxation * mc * v));
            bodies.pulses_mut(self.rb).integrate_impulse(&VectorAtPosition {
                vector: -lambda,
                position: p,
            });
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrictionContactInfo2 {
    pub rb0: BodyId,
    pub rb1: BodyId,
    pub friction: Friction,
}

impl FrictionContactInfo2 {
    fn solve<T: ConstrainedSet<BodyId>>(&mut self, bodies: &mut T, ni: &NormalImpulse, relaxation: ScenePos) {
        let p = self.friction.p;
        let v = bodies.pulses(self.rb0).velocity_at_position(p) - bodies.pulses(self.rb1).velocity_at_position(p);
        let v3 = self.friction.slip(ni, v);
        let vl2 = v3.magnitude2();
        if vl2 > MIN_VELOCITY2 {
            let v = vl2.sqrt();
            let n3 = v3 / v;
            let line = VectorAtPosition { vector: n3, position: p };
            let mc0 = bodies.pulses(self.rb0).effective_mass(&line);
            let mc1 = bodies.pulses(self.rb1).effective_mass(&line);
            let lambda = self.friction.accumulate(ni, n3 * (relaxation * reduced_mass(mc0, mc1) * v));
            bodies.pulses_mut(self.rb0).integrate_impulse(&VectorAtPosition {
                vector: -lambda,
                position: p,
            });
            bodies.pulses_mut(self.rb1).integrate_impulse(&VectorAtPosition {
                vector: lambda,
                position: p,
            });
        }
    }
}

/// One solver row.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ContactInfo {
    Normal1(NormalContactInfo1),
    Normal2(NormalContactInfo2),
    Line1(LineContactInfo1),
    Line2(LineContactInfo2),
    Plane1(PlaneContactInfo1),
    Plane2(PlaneContactInfo2),
    Friction1(FrictionContactInfo1),
    Friction2(FrictionContactInfo2),
}

impl ContactInfo {
    /// The accumulated impulse of a normal contact.
    pub fn normal_impulse(&self) -> Option<&NormalImpulse> {
        match self {
            ContactInfo::Normal1(ci) => Some(ci.pc.normal_impulse()),
            ContactInfo::Normal2(ci) => Some(ci.pc.normal_impulse()),
            _ => None,
        }
    }

    fn friction_normal(&self) -> Option<ContactIndex> {
        match self {
            ContactInfo::Friction1(ci) => Some(ci.friction.normal),
            ContactInfo::Friction2(ci) => Some(ci.friction.normal),
            _ => None,
        }
    }
}

/// The contacts of one substep.
#[derive(Clone, Debug, Default)]
pub struct Solver {
    contacts: SmallVec<[ContactInfo; 8]>,
}

impl Solver {
    pub fn new() -> Self {
        Solver {
            contacts: SmallVec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Add a contact. Friction contacts must refer to a normal contact that
    /// was added before them.
    ///
    /// # Panics
    ///
    /// If a friction contact refers to anything but a normal contact.
    pub fn add_contact(&mut self, contact: ContactInfo) -> ContactIndex {
        if let Some(normal) = contact.friction_normal() {
            match self.contacts.get(normal.0) {
                Some(c) if c.normal_impulse().is_some() => (),
                _ => panic!("friction contact refers to {:?}, which is not a normal contact", normal),
            }
        }
        self.contacts.push(contact);
        ContactIndex(self.contacts.len() - 1)
    }

    pub fn get(&self, index: ContactIndex) -> &ContactInfo {
        &self.contacts[index.0]
    }

    pub fn contacts(&self) -> &[ContactInfo] {
        &self.contacts
    }

    /// Run a single pass over all contacts.
    pub fn solve_pass<T: ConstrainedSet<BodyId>>(&mut self, bodies: &mut T, dt: ScenePos, relaxation: ScenePos) {
        for i in 0..self.contacts.len() {
            let ni = match self.contacts[i].friction_normal() {
                Some(n) => self.contacts[n.0].normal_impulse().copied(),
                None => None,
            };
            match (&mut self.contacts[i], ni) {
                (ContactInfo::Normal1(ci), _) => ci.solve(bodies, dt, relaxation),
                (ContactInfo::Normal2(ci), _) => ci.solve(bodies, dt, relaxation),
                (ContactInfo::Line1(ci), _) => ci.solve(bodies, dt, relaxation),
                (ContactInfo::Line2(ci), _) => ci.solve(bodies, dt, relaxation),
                (ContactInfo::Plane1(ci), _) => ci.solve(bodies, dt, relaxation),
                (ContactInfo::Plane2(ci), _) => ci.solve(bodies, dt, relaxation),
                (ContactInfo::Friction1(ci), Some(ni)) => ci.solve(bodies, &ni, relaxation),
                (ContactInfo::Friction2(ci), Some(ni)) => ci.solve(bodies, &ni, relaxation),
                (ContactInfo::Friction1(_), None) | (ContactInfo::Friction2(_), None) => {
                    unreachable!("friction contacts always refer to a normal contact")
                }
            }
        }
    }

    /// Report final impulses to the observers.
    pub fn finalize(&self, bodies: &Pool<RigidBody>) {
        for c in self.contacts.iter() {
            if let ContactInfo::Normal2(ci) = c {
                ci.finalize(bodies);
            }
        }
    }

    /// Solve all contacts against `bodies` and drop them.
    pub fn solve_contacts(&mut self, bodies: &mut Pool<RigidBody>, dt: ScenePos, cfg: &PhysicsEngineConfig) {
        debug!(ncontacts = self.contacts.len(), niterations = cfg.solver_iterations, "solving contacts");
        for i in 0..cfg.solver_iterations {
            let relaxation = if i < 1 { FIRST_PASS_RELAXATION } else { 1.0 };
            self.solve_pass(bodies, dt, relaxation);
        }
        self.finalize(bodies);
        self.contacts.clear();
    }
}
