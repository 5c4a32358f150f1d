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

//! Scalar precisions used throughout the crate.
//!
//! World-space positions are stored as `ScenePos` so that objects far away
//! from the origin do not lose precision. Directions, velocities and
//! render-space vertices use the narrower `SceneDir`. Conversions between the
//! two are always explicit.

use cgmath::{Matrix3, Point3, Vector3};

/// High precision world-space scalar.
pub type ScenePos = f64;

/// Render-space / direction scalar.
pub type SceneDir = f32;

#[inline(always)]
pub fn to_scene_point(p: Point3<SceneDir>) -> Point3<ScenePos> {
    Point3::new(p.x as ScenePos, p.y as ScenePos, p.z as ScenePos)
}

#[inline(always)]
pub fn to_render_point(p: Point3<ScenePos>) -> Point3<SceneDir> {
    Point3::new(p.x as SceneDir, p.y as SceneDir, p.z as SceneDir)
}

/// Widen a direction to world precision.
#[inline(always)]
pub fn dir_to_scene(v: Vector3<SceneDir>) -> Vector3<ScenePos> {
    Vector3::new(v.x as ScenePos, v.y as ScenePos, v.z as ScenePos)
}

/// Narrow a world-space difference to a direction.
#[inline(always)]
pub fn scene_to_dir(v: Vector3<ScenePos>) -> Vector3<SceneDir> {
    Vector3::new(v.x as SceneDir, v.y as SceneDir, v.z as SceneDir)
}

pub fn matrix_to_scene(m: Matrix3<SceneDir>) -> Matrix3<ScenePos> {
    Matrix3::from_cols(dir_to_scene(m.x), dir_to_scene(m.y), dir_to_scene(m.z))
}

pub fn matrix_to_dir(m: Matrix3<ScenePos>) -> Matrix3<SceneDir> {
    Matrix3::from_cols(scene_to_dir(m.x), scene_to_dir(m.y), scene_to_dir(m.z))
}

/// -1, 0 or 1. Unlike `f64::signum`, zero maps to zero.
#[inline(always)]
pub fn sign(x: ScenePos) -> ScenePos {
    if x == 0.0 {
        0.0
    } else if x < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Returns true if any component is NaN.
#[inline(always)]
pub fn any_nan(v: Vector3<SceneDir>) -> bool {
    v.x.is_nan() || v.y.is_nan() || v.z.is_nan()
}
