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

use cgmath::{InnerSpace, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::precision::ScenePos;
use crate::rigid_body::RigidBody;

/// How a contact is resolved.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollisionType {
    /// Observers are notified but nothing is resolved.
    GoThrough,
    Reflect,
    /// The line or ridge is a rail the other body may slide along.
    Grind,
}

impl Default for CollisionType {
    fn default() -> Self {
        CollisionType::Reflect
    }
}

/// Which side of a contact an observer's body is on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CollisionRole {
    /// The body owning the polygon or the first intersectable.
    Primary,
    /// The body owning the line, ridge or second intersectable.
    Secondary,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gravity {
    /// Unit vector.
    pub direction: Vector3<ScenePos>,
    pub magnitude: ScenePos,
}

impl Gravity {
    pub fn new(acceleration: Vector3<ScenePos>) -> Self {
        let magnitude = acceleration.magnitude();
        Gravity {
            direction: if magnitude == 0.0 { acceleration } else { acceleration / magnitude },
            magnitude,
        }
    }

    #[inline(always)]
    pub fn acceleration(&self) -> Vector3<ScenePos> {
        self.direction * self.magnitude
    }
}

/// Global environment passed to observers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticWorld {
    pub gravity: Option<Gravity>,
}

impl StaticWorld {
    pub fn with_gravity(acceleration: Vector3<ScenePos>) -> Self {
        StaticWorld {
            gravity: Some(Gravity::new(acceleration)),
        }
    }
}

/// Callback interface attached to rigid bodies.
pub trait CollisionObserver: fmt::Debug + Send + Sync {
    /// Called once per resolved contact for each observer on either body.
    /// Observers may change `collision_type` or set `abort`, which cancels
    /// the physical response once every observer has run.
    fn notify_collided(
        &self,
        intersection_point: Point3<ScenePos>,
        world: &StaticWorld,
        other: &RigidBody,
        role: CollisionRole,
        collision_type: &mut CollisionType,
        abort: &mut bool,
    );

    /// Called when a two-body normal contact has been solved.
    fn notify_impact(
        &self,
        _other: &RigidBody,
        _role: CollisionRole,
        _normal: Vector3<ScenePos>,
        _lambda_final: ScenePos,
    ) {
    }
}
