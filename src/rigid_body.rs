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

use std::fmt;
use std::sync::Arc;

use cgmath::{EuclideanSpace, InnerSpace, Matrix, Matrix3, Point3, Rad, Vector3, Zero};
use serde::{Deserialize, Serialize};

use crate::geom::TransformationMatrix;
use crate::observer::CollisionObserver;
use crate::pool::PoolId;
use crate::precision::{SceneDir, ScenePos};

/// Bodies are stored in a `Pool` and referred to by id.
pub type BodyId = PoolId;

/// Largest impulse component a single integration step accepts, in
/// kg * m/s (1000 kg at 10000 km/h).
pub const IMPULSE_THRESHOLD: ScenePos = 1e4 * 1000.0 / 3.6;

/// A direction anchored at a world-space point.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorAtPosition {
    pub vector: Vector3<ScenePos>,
    pub position: Point3<ScenePos>,
}

/// Linear and angular state of a rigid body.
///
/// The inertia tensor is diagonal in body coordinates. A body with infinite
/// mass and inertia is static: impulses leave it untouched and its
/// effective mass is infinite along every direction.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyPulses {
    pub mass: ScenePos,
    /// Diagonal of the inertia tensor in body coordinates.
    pub inertia: Vector3<ScenePos>,
    /// Center of mass in body coordinates.
    pub com: Point3<ScenePos>,
    /// Center of mass in world coordinates.
    pub abs_com: Point3<ScenePos>,
    pub rotation: Matrix3<ScenePos>,
    pub v_com: Vector3<ScenePos>,
    pub w: Vector3<ScenePos>,
}

impl RigidBodyPulses {
    /// Create a body whose origin is placed at `position`.
    pub fn new(
        mass: ScenePos,
        inertia: Vector3<ScenePos>,
        com: Point3<ScenePos>,
        position: Point3<ScenePos>,
        rotation: Matrix3<ScenePos>,
    ) -> Self {
        RigidBodyPulses {
            mass,
            inertia,
            com,
            abs_com: position + rotation * com.to_vec(),
            rotation,
            v_com: Vector3::zero(),
            w: Vector3::zero(),
        }
    }

    /// An immovable body.
    pub fn new_static(position: Point3<ScenePos>, rotation: Matrix3<ScenePos>) -> Self {
        let inf = ScenePos::INFINITY;
        RigidBodyPulses::new(inf, Vector3::new(inf, inf, inf), Point3::origin(), position, rotation)
    }

    #[inline(always)]
    pub fn is_static(&self) -> bool {
        self.mass == ScenePos::INFINITY
    }

    /// World position of the body origin.
    pub fn abs_position(&self) -> Point3<ScenePos> {
        self.abs_com - self.rotation * self.com.to_vec()
    }

    pub fn abs_transformation(&self) -> TransformationMatrix {
        TransformationMatrix::new(self.rotation, self.abs_position().to_vec())
    }

    /// Map a point from body to world coordinates.
    pub fn transform_to_world(&self, p: Point3<ScenePos>) -> Point3<ScenePos> {
        self.abs_com + self.rotation * (p - self.com)
    }

    pub fn velocity_at_position(&self, p: Point3<ScenePos>) -> Vector3<ScenePos> {
        self.v_com + self.w.cross(p - self.abs_com)
    }

    /// Multiply by the inverse of the world-space inertia tensor.
    #[allow(non_snake_case)]
    pub fn solve_abs_I(&self, x: Vector3<ScenePos>) -> Vector3<ScenePos> {
        let local = self.rotation.transpose() * x;
        self.rotation * Vector3::new(local.x / self.inertia.x, local.y / self.inertia.y, local.z / self.inertia.z)
    }

    /// Multiply by the world-space inertia tensor.
    #[allow(non_snake_case)]
    pub fn dot_abs_I(&self, x: Vector3<ScenePos>) -> Vector3<ScenePos> {
        let local = self.rotation.transpose() * x;
        self.rotation * Vector3::new(local.x * self.inertia.x, local.y * self.inertia.y, local.z * self.inertia.z)
    }

    /// Mass felt by an impulse along `line.vector` applied at
    /// `line.position`. `line.vector` must be a unit vector.
    pub fn effective_mass(&self, line: &VectorAtPosition) -> ScenePos {
        let j2 = (line.position - self.abs_com).cross(line.vector);
        1.0 / (1.0 / self.mass + j2.dot(self.solve_abs_I(j2)))
    }

    /// Apply the impulse `line.vector` at `line.position`.
    ///
    /// # Panics
    ///
    /// If any impulse component exceeds `IMPULSE_THRESHOLD`.
    pub fn integrate_impulse(&mut self, line: &VectorAtPosition) {
        let j = line.vector;
        if j.x.abs() > IMPULSE_THRESHOLD || j.y.abs() > IMPULSE_THRESHOLD || j.z.abs() > IMPULSE_THRESHOLD {
            panic!("impulse too large: {:?}", j);
        }
        self.v_com += j / self.mass;
        let torque = (line.position - self.abs_com).cross(j);
        self.w += self.solve_abs_I(torque);
    }

    pub fn advance_time(&mut self, dt: ScenePos) {
        if self.is_static() {
            return;
        }
        self.abs_com += self.v_com * dt;
        let angle = self.w.magnitude() * dt;
        if angle > 1e-12 {
            let dr = Matrix3::from_axis_angle(self.w.normalize(), Rad(angle));
            self.rotation = orthonormalized(dr * self.rotation);
        }
    }

    pub fn energy(&self) -> ScenePos {
        0.5 * (self.mass * self.v_com.magnitude2() + self.w.dot(self.dot_abs_I(self.w)))
    }
}

/// Gram-Schmidt on the columns.
fn orthonormalized(m: Matrix3<ScenePos>) -> Matrix3<ScenePos> {
    let x = m.x.normalize();
    let y = (m.y - x * x.dot(m.y)).normalize();
    let z = x.cross(y);
    Matrix3::from_cols(x, y, z)
}

/// The grind state of the previous substep. Read by the collision handlers,
/// while the current state is written by the grind resolution.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GrindSnapshot {
    pub grinding: bool,
    /// NaN unless the body was grinding.
    pub grind_direction: Vector3<SceneDir>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GrindState {
    pub wants_to_grind: bool,
    /// Number of consecutive substeps in which the body wanted to grind.
    pub wants_to_grind_counter: usize,
    pub grinding: bool,
    /// NaN unless grinding.
    pub grind_direction: Vector3<SceneDir>,
    /// Rail direction in body coordinates.
    pub grind_pv: Vector3<SceneDir>,
    /// Body axis (0 or 2) most aligned with the rail.
    pub grind_axis: usize,
    pub previous: GrindSnapshot,
}

impl Default for GrindState {
    fn default() -> Self {
        let nan = Vector3::new(SceneDir::NAN, SceneDir::NAN, SceneDir::NAN);
        GrindState {
            wants_to_grind: false,
            wants_to_grind_counter: 0,
            grinding: false,
            grind_direction: nan,
            grind_pv: nan,
            grind_axis: 0,
            previous: GrindSnapshot {
                grinding: false,
                grind_direction: nan,
            },
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct JumpState {
    /// Cleared at the end of each tick.
    pub wants_to_jump: bool,
    /// Cleared at the end of each substep.
    pub wants_to_jump_oversampled: bool,
    /// Substeps since the last jump, `None` if the body never jumped.
    pub jumping_counter: Option<usize>,
}

impl JumpState {
    /// True if more than `cooldown` substeps passed since the last jump.
    pub fn cooled_down(&self, cooldown: usize) -> bool {
        match self.jumping_counter {
            Some(n) => n > cooldown,
            None => true,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AlignToSurfaceState {
    /// Zero disables surface alignment.
    pub align_to_surface_relaxation: SceneDir,
    pub touches_alignment_plane: bool,
    /// NaN unless a surface was found this substep.
    pub surface_normal: Vector3<SceneDir>,
}

impl Default for AlignToSurfaceState {
    fn default() -> Self {
        AlignToSurfaceState {
            align_to_surface_relaxation: 0.0,
            touches_alignment_plane: false,
            surface_normal: Vector3::new(SceneDir::NAN, SceneDir::NAN, SceneDir::NAN),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleDomain {
    Undefined,
    Air,
    Ground,
}

/// A simulated object: its pulses, its grind, jump and alignment state and
/// the observers to notify about its collisions.
#[derive(Clone)]
pub struct RigidBody {
    pub name: String,
    pub pulses: RigidBodyPulses,
    /// Body-frame point that slides along rails.
    pub grind_point: Option<Point3<ScenePos>>,
    /// Velocity change of a jump off a surface.
    pub jump_dv: ScenePos,
    pub grind_state: GrindState,
    pub jump_state: JumpState,
    pub align_to_surface_state: AlignToSurfaceState,
    pub current_vehicle_domain: VehicleDomain,
    pub next_vehicle_domain: VehicleDomain,
    observers: Vec<Arc<dyn CollisionObserver>>,
}

impl fmt::Debug for RigidBody {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RigidBody")
            .field("name", &self.name)
            .field("mass", &self.pulses.mass)
            .field("abs_com", &self.pulses.abs_com)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl RigidBody {
    pub fn new<S: Into<String>>(name: S, pulses: RigidBodyPulses) -> Self {
        RigidBody {
            name: name.into(),
            pulses,
            grind_point: None,
            jump_dv: 0.0,
            grind_state: GrindState::default(),
            jump_state: JumpState::default(),
            align_to_surface_state: AlignToSurfaceState::default(),
            current_vehicle_domain: VehicleDomain::Undefined,
            next_vehicle_domain: VehicleDomain::Undefined,
            observers: Vec::new(),
        }
    }

    pub fn with_grind_point(mut self, grind_point: Point3<ScenePos>) -> Self {
        self.grind_point = Some(grind_point);
        self
    }

    pub fn add_observer(&mut self, observer: Arc<dyn CollisionObserver>) {
        self.observers.push(observer);
    }

    pub fn observers(&self) -> &[Arc<dyn CollisionObserver>] {
        &self.observers
    }

    #[inline(always)]
    pub fn mass(&self) -> ScenePos {
        self.pulses.mass
    }

    pub fn velocity_at_position(&self, p: Point3<ScenePos>) -> Vector3<ScenePos> {
        self.pulses.velocity_at_position(p)
    }

    pub fn abs_position(&self) -> Point3<ScenePos> {
        self.pulses.abs_position()
    }

    /// World position of the grind point.
    ///
    /// # Panics
    ///
    /// If the body has no grind point.
    pub fn abs_grind_point(&self) -> Point3<ScenePos> {
        match self.grind_point {
            Some(p) => self.pulses.transform_to_world(p),
            None => panic!("rigid body \"{}\" has no grind point", self.name),
        }
    }

    pub fn set_wants_to_jump(&mut self) {
        self.jump_state.wants_to_jump = true;
        self.jump_state.wants_to_jump_oversampled = true;
        self.jump_state.jumping_counter = Some(0);
    }

    pub fn set_wants_to_grind(&mut self, value: bool) {
        self.grind_state.wants_to_grind = value;
    }

    pub fn integrate_gravity(&mut self, acceleration: Vector3<ScenePos>, dt: ScenePos) {
        if !self.pulses.is_static() {
            self.pulses.v_com += acceleration * dt;
        }
    }

    pub fn advance_time(&mut self, dt: ScenePos) {
        self.pulses.advance_time(dt);
    }

    /// Roll the per-substep state over once a substep is resolved.
    /// One-shot requests are only cleared at the end of a tick, so that
    /// requests made between ticks are seen by the first substep.
    pub fn reset_forces(&mut self, end_of_tick: bool) {
        let nan = Vector3::new(SceneDir::NAN, SceneDir::NAN, SceneDir::NAN);
        let gs = &mut self.grind_state;
        gs.wants_to_grind_counter = if gs.wants_to_grind { gs.wants_to_grind_counter + 1 } else { 0 };
        if !gs.grinding {
            gs.grind_direction = nan;
        }
        gs.previous = GrindSnapshot {
            grinding: gs.grinding,
            grind_direction: gs.grind_direction,
        };
        if let Some(n) = self.jump_state.jumping_counter.as_mut() {
            *n += 1;
        }
        if end_of_tick {
            self.jump_state.wants_to_jump = false;
            if !gs.grinding {
                gs.wants_to_grind = false;
            }
        }
        self.jump_state.wants_to_jump_oversampled = false;
        gs.grinding = false;
        self.align_to_surface_state.touches_alignment_plane = false;
        self.align_to_surface_state.surface_normal = nan;
        self.current_vehicle_domain = self.next_vehicle_domain;
        self.next_vehicle_domain = VehicleDomain::Air;
    }
}
