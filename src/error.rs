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

use cgmath::Vector3;
use thiserror::Error;

use crate::pool::PoolId;
use crate::precision::ScenePos;

/// Recoverable errors. Contract violations inside the collision pipeline are
/// panics instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The box shrunk by the swept radius has no volume left.
    #[error("AABB too small for the given radius {radius}: shrunk size is {size:?}")]
    AabbTooSmall {
        radius: ScenePos,
        size: Vector3<ScenePos>,
    },
    #[error("invalid physics configuration: {field} = {value}")]
    InvalidConfig {
        field: &'static str,
        value: f64,
    },
    #[error("no rigid body with id {0}")]
    UnknownBody(PoolId),
}

pub type Result<T> = std::result::Result<T, Error>;
