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

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::precision::ScenePos;

/// Tuning knobs of the physics engine.
///
/// Cosine thresholds compare unit vectors. Betas are Baumgarte factors in
/// `[0, 1]`: the fraction of a position error corrected per substep.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsEngineConfig {
    /// Length of one tick in seconds.
    pub dt: ScenePos,
    /// Number of substeps per tick.
    pub nsubsteps: usize,
    pub solver_iterations: usize,

    /// Lower bound of every normal impulse, per kilogram of effective mass.
    /// Must not be positive.
    pub velocity_lambda_min: ScenePos,
    pub plane_inequality_beta: ScenePos,
    pub plane_equality_beta: ScenePos,
    pub point_equality_beta: ScenePos,
    pub stiction_coefficient: ScenePos,
    pub friction_coefficient: ScenePos,

    /// Contacts whose overlap is below the distance travelled in one
    /// substep times this factor are ignored.
    pub slide_factor: ScenePos,
    pub min_cos_ridge_triangle: ScenePos,
    pub max_cos_round_normal: ScenePos,
    /// Edges whose face normals have a cosine at most this large become
    /// ridges.
    pub max_min_cos_ridge: ScenePos,

    pub alignment_plane_cos: ScenePos,
    pub alignment_surface_cos: ScenePos,
    pub alignment_surface_cos_strict: ScenePos,

    /// Rails that meet the grind polygon at a smaller cosine are ignored.
    pub max_grind_cos: ScenePos,
    pub continuos_grind_cos_threshold: ScenePos,
    pub continuos_grind_velocity_threshold: ScenePos,
    pub nframes_straight_grind: usize,
    pub grind_jump_dv: ScenePos,
    /// Frames that must pass after a jump before a rail catches the body
    /// again. Scaled by `nsubsteps`.
    pub grind_jump_cooldown_frames: usize,
}

impl Default for PhysicsEngineConfig {
    fn default() -> Self {
        PhysicsEngineConfig {
            dt: 1.0 / 60.0,
            nsubsteps: 8,
            solver_iterations: 5,
            velocity_lambda_min: -100.0,
            plane_inequality_beta: 0.02,
            plane_equality_beta: 0.02,
            point_equality_beta: 0.02,
            stiction_coefficient: 1.0,
            friction_coefficient: 0.5,
            slide_factor: 0.0,
            min_cos_ridge_triangle: 0.2,
            max_cos_round_normal: 0.9,
            max_min_cos_ridge: 0.9,
            alignment_plane_cos: 0.7,
            alignment_surface_cos: 0.7,
            alignment_surface_cos_strict: 0.9,
            max_grind_cos: 0.5,
            continuos_grind_cos_threshold: 0.9,
            continuos_grind_velocity_threshold: 2.0,
            nframes_straight_grind: 10,
            grind_jump_dv: 2.0,
            grind_jump_cooldown_frames: 30,
        }
    }
}

fn check(field: &'static str, value: f64, valid: bool) -> Result<()> {
    if value.is_finite() && valid {
        Ok(())
    } else {
        Err(Error::InvalidConfig { field, value })
    }
}

fn check_cos(field: &'static str, value: f64) -> Result<()> {
    check(field, value, (-1.0..=1.0).contains(&value))
}

fn check_beta(field: &'static str, value: f64) -> Result<()> {
    check(field, value, (0.0..=1.0).contains(&value))
}

impl PhysicsEngineConfig {
    /// Duration of one substep.
    #[inline(always)]
    pub fn dt_substeps(&self) -> ScenePos {
        self.dt / self.nsubsteps as ScenePos
    }

    /// Substeps after a jump during which rails are ignored.
    pub fn grind_jump_cooldown_substeps(&self) -> usize {
        self.grind_jump_cooldown_frames * self.nsubsteps
    }

    pub fn validate(&self) -> Result<()> {
        check("dt", self.dt, self.dt > 0.0)?;
        check("nsubsteps", self.nsubsteps as f64, self.nsubsteps > 0)?;
        check("solver_iterations", self.solver_iterations as f64, self.solver_iterations > 0)?;
        check("velocity_lambda_min", self.velocity_lambda_min, self.velocity_lambda_min <= 0.0)?;
        check_beta("plane_inequality_beta", self.plane_inequality_beta)?;
        check_beta("plane_equality_beta", self.plane_equality_beta)?;
        check_beta("point_equality_beta", self.point_equality_beta)?;
        check("stiction_coefficient", self.stiction_coefficient, self.stiction_coefficient >= 0.0)?;
        check("friction_coefficient", self.friction_coefficient, self.friction_coefficient >= 0.0)?;
        check("slide_factor", self.slide_factor, self.slide_factor >= 0.0)?;
        check_cos("min_cos_ridge_triangle", self.min_cos_ridge_triangle)?;
        check_cos("max_cos_round_normal", self.max_cos_round_normal)?;
        check_cos("max_min_cos_ridge", self.max_min_cos_ridge)?;
        check_cos("alignment_plane_cos", self.alignment_plane_cos)?;
        check_cos("alignment_surface_cos", self.alignment_surface_cos)?;
        check_cos("alignment_surface_cos_strict", self.alignment_surface_cos_strict)?;
        check_cos("max_grind_cos", self.max_grind_cos)?;
        check_cos("continuos_grind_cos_threshold", self.continuos_grind_cos_threshold)?;
        check(
            "continuos_grind_velocity_threshold",
            self.continuos_grind_velocity_threshold,
            self.continuos_grind_velocity_threshold >= 0.0,
        )?;
        check("grind_jump_dv", self.grind_jump_dv, self.grind_jump_dv >= 0.0)?;
        Ok(())
    }
}
