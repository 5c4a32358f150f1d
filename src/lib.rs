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

//! Rigid-body collision recording and contact resolution for 3D video
//! games.
//!
//! # Pipeline overview
//!
//! Bodies live in a `Pool` and carry meshes whose physics materials decide
//! how they collide. Each substep of `PhysicsEngine::tick`:
//!
//! - Places the meshes in the world as `TransformedMesh`es, whose
//!   triangles, quads, ridges and lines are materialized lazily.
//! - Tests the surfaces of one body against the feelers of another
//!   (`intersect`) after a bounding-sphere broad phase.
//! - Records hits in a `CollisionHistory`: the closest hit of every probing
//!   line, hits against concave meshes, and the closest rail of every body
//!   that wants to grind. Other hits are resolved at once.
//! - Converts the hits into solver rows (`handle_reflection`,
//!   `collide_grind_infos`) and runs the iterative `Solver`.
//!
//! Large static meshes can be culled with a `SubstitutionInfo`, which keeps
//! only the triangles close to a reference point active.
//!
//! Recoverable problems are reported through `Error`. Broken invariants of
//! the collision pipeline panic.

pub extern crate cgmath;
extern crate smallvec;

mod precision;
pub use precision::*;

mod error;
pub use error::*;

mod geom;
pub use geom::*;

mod bounds;
pub use bounds::*;

mod welzl;
pub use welzl::*;

mod collision;
pub use collision::*;

mod distance;
pub use distance::*;

mod intersectable;
pub use intersectable::*;

mod swept;
pub use swept::*;

mod intersect;
pub use intersect::*;

mod mesh;
pub use mesh::*;

mod substitution;
pub use substitution::*;

mod pool;
pub use pool::*;

mod observer;
pub use observer::*;

mod rigid_body;
pub use rigid_body::*;

mod config;
pub use config::*;

mod solver;
pub use solver::*;

mod history;
pub use history::*;

mod handle;
pub use handle::*;

mod reflection;
pub use reflection::*;

mod grind;
pub use grind::*;

mod engine;
pub use engine::*;
