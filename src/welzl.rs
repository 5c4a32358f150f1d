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

//! Minimal enclosing spheres with Welzl's randomized algorithm.
//!
//! The recursion is the textbook one: drop a random point, solve the rest,
//! and if the dropped point falls outside, solve again with it pinned to the
//! boundary. Boundaries of up to `ndim + 1` points have closed-form
//! solutions. Nearly degenerate boundaries fall back to a solve in which
//! fewer points may be pinned, which ends in a two-point sphere in the worst
//! case.
//!
//! Floating point edge cases can leave the recursion without a solution.
//! The driver then reshuffles and retries. Running out of retries means the
//! input is corrupt, and the driver panics with the offending points.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;

use cgmath::{EuclideanSpace, InnerSpace, Matrix, Matrix3, Point2, Point3, SquareMatrix, Vector3};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;
use tracing::{error, warn};

use crate::bounds::BoundingSphere;
use crate::precision::ScenePos;

/// Points may lie outside of a solution by this much, relative to its
/// radius, and still count as enclosed.
pub const WELZL_INTERIOR_THRESHOLD: ScenePos = 1e-7;

/// Relative threshold below which a boundary is considered degenerate.
const WELZL_DEGENERACY_THRESHOLD: ScenePos = 1e-10;

const WELZL_MAX_RETRIES: usize = 100;

thread_local! {
    static WELZL_RNG: RefCell<StdRng> = RefCell::new(StdRng::seed_from_u64(43));
}

/// Point types Welzl's algorithm runs on.
pub trait WelzlPoint: EuclideanSpace<Scalar = ScenePos> + fmt::Debug {
    const NDIM: usize;

    /// Center of the sphere through four points. Returns None if they are
    /// (nearly) coplanar.
    fn tetrahedron_center(x: &[Self]) -> Option<Self>;

    /// Bit pattern used to drop exact duplicates.
    fn key(&self) -> [u64; 3];
}

impl WelzlPoint for Point2<ScenePos> {
    const NDIM: usize = 2;

    fn tetrahedron_center(_x: &[Self]) -> Option<Self> {
        panic!("four boundary points require three dimensions");
    }

    fn key(&self) -> [u64; 3] {
        [self.x.to_bits(), self.y.to_bits(), 0]
    }
}

impl WelzlPoint for Point3<ScenePos> {
    const NDIM: usize = 3;

    fn tetrahedron_center(x: &[Self]) -> Option<Self> {
        let a0 = x[1] - x[0];
        let a1 = x[2] - x[0];
        let a2 = x[3] - x[0];
        // Rows of the system are the edge vectors.
        let a = Matrix3::from_cols(a0, a1, a2).transpose();
        let scale = a0.magnitude() * a1.magnitude() * a2.magnitude();
        if a.determinant().abs() <= WELZL_DEGENERACY_THRESHOLD * scale {
            return None;
        }
        let b = Vector3::new(a0.magnitude2(), a1.magnitude2(), a2.magnitude2()) * 0.5;
        let center = a.invert()? * b;
        Some(x[0] + center)
    }

    fn key(&self) -> [u64; 3] {
        [self.x.to_bits(), self.y.to_bits(), self.z.to_bits()]
    }
}

#[inline(always)]
fn cc_1<V: InnerSpace<Scalar = ScenePos>>(a: V, b: V, c: V) -> V {
    b * a.dot(c) - c * a.dot(b)
}

#[inline(always)]
fn cc_2<V: InnerSpace<Scalar = ScenePos>>(a: V, b: V) -> ScenePos {
    let ab = a.dot(b);
    a.magnitude2() * b.magnitude2() - ab * ab
}

fn circumscribed_sphere3<P, R>(x: &[P], rng: &mut R) -> BoundingSphere<P>
where
    P: WelzlPoint,
    P::Diff: InnerSpace<Scalar = ScenePos>,
    R: Rng + ?Sized,
{
    let c = x[2];
    let a = x[0] - c;
    let b = x[1] - c;
    let denom = cc_2(a, b);
    let (aa, bb) = (a.magnitude2(), b.magnitude2());
    if denom.abs() <= WELZL_DEGENERACY_THRESHOLD * aa * bb {
        // Collinear or duplicate points: at most two may define the sphere.
        return welzl_from_slice(x, rng, P::NDIM - 1);
    }
    let radius = (aa * bb * (a - b).magnitude2() / denom).sqrt() / 2.0;
    let center = c + cc_1(b * aa - a * bb, a, b) / (2.0 * denom);
    BoundingSphere { center, radius }
}

fn circumscribed_sphere4<P, R>(x: &[P], rng: &mut R) -> BoundingSphere<P>
where
    P: WelzlPoint,
    P::Diff: InnerSpace<Scalar = ScenePos>,
    R: Rng + ?Sized,
{
    match P::tetrahedron_center(x) {
        Some(center) => BoundingSphere::from_center_and_points(center, x.iter()),
        None => welzl_from_slice(x, rng, 1),
    }
}

/// The sphere through all boundary points.
fn circumscribed_sphere<P, R>(boundary: &[P], rng: &mut R) -> BoundingSphere<P>
where
    P: WelzlPoint,
    P::Diff: InnerSpace<Scalar = ScenePos>,
    R: Rng + ?Sized,
{
    if boundary.len() > P::NDIM + 1 {
        panic!("too many points ({}) for a trivial circumscribed sphere", boundary.len());
    }
    match boundary.len() {
        0 => panic!("cannot compute bounding sphere for empty list"),
        1 => BoundingSphere { center: boundary[0], radius: 0.0 },
        2 => BoundingSphere::from_diameter(boundary[0], boundary[1]),
        3 => circumscribed_sphere3(boundary, rng),
        _ => circumscribed_sphere4(boundary, rng),
    }
}

fn welzl<P, R>(
    points: &mut Vec<P>,
    boundary: &mut SmallVec<[P; 4]>,
    rng: &mut R,
    rank_deficiency: usize,
) -> Option<BoundingSphere<P>>
where
    P: WelzlPoint,
    P::Diff: InnerSpace<Scalar = ScenePos>,
    R: Rng + ?Sized,
{
    if points.is_empty() || boundary.len() == P::NDIM + 1 - rank_deficiency {
        return Some(circumscribed_sphere(boundary, rng));
    }
    let i = rng.gen_range(0..points.len());
    let p = points.swap_remove(i);
    let restore = |points: &mut Vec<P>| {
        points.push(p);
        let last = points.len() - 1;
        points.swap(i, last);
    };
    if !points.is_empty() || !boundary.is_empty() {
        let d = welzl(points, boundary, rng, rank_deficiency)?;
        let tolerance = WELZL_INTERIOR_THRESHOLD * d.radius.max(1.0);
        if d.contains_with_tolerance(p, tolerance) {
            restore(points);
            return Some(d);
        }
    }
    if boundary.len() >= P::NDIM + 1 {
        return None;
    }
    boundary.push(p);
    let result = welzl(points, boundary, rng, rank_deficiency);
    restore(points);
    boundary.pop();
    result
}

/// Minimal enclosing sphere of `points` using the given generator. At most
/// `ndim + 1 - rank_deficiency` points are pinned to the boundary.
pub fn welzl_from_slice<P, R>(points: &[P], rng: &mut R, rank_deficiency: usize) -> BoundingSphere<P>
where
    P: WelzlPoint,
    P::Diff: InnerSpace<Scalar = ScenePos>,
    R: Rng + ?Sized,
{
    if rank_deficiency > P::NDIM {
        panic!("welzl rank deficiency {} too large", rank_deficiency);
    }
    let mut order = points.to_vec();
    for attempt in 0..WELZL_MAX_RETRIES {
        let mut remaining = order.clone();
        let mut boundary = SmallVec::new();
        if let Some(s) = welzl(&mut remaining, &mut boundary, rng, rank_deficiency) {
            return s;
        }
        warn!(attempt, npoints = points.len(), "welzl found no solution, reshuffling");
        order.shuffle(rng);
    }
    error!(?points, "welzl did not converge");
    panic!("welzl did not converge after {} attempts, points: {:?}", WELZL_MAX_RETRIES, points);
}

/// Minimal enclosing sphere of a fixed set of points, using the
/// thread-local generator.
pub fn welzl_from_fixed<P, const N: usize>(points: &[P; N]) -> BoundingSphere<P>
where
    P: WelzlPoint,
    P::Diff: InnerSpace<Scalar = ScenePos>,
{
    WELZL_RNG.with(|rng| welzl_from_slice(&points[..], &mut *rng.borrow_mut(), 0))
}

/// Like `welzl_from_fixed`, but drops exact duplicates first.
pub fn welzl_from_iterator<'a, P, I>(points: I) -> BoundingSphere<P>
where
    P: WelzlPoint + 'a,
    P::Diff: InnerSpace<Scalar = ScenePos>,
    I: IntoIterator<Item = &'a P>,
{
    let mut seen = HashSet::new();
    let unique: Vec<P> = points
        .into_iter()
        .filter(|p| seen.insert(p.key()))
        .cloned()
        .collect();
    WELZL_RNG.with(|rng| welzl_from_slice(&unique, &mut *rng.borrow_mut(), 0))
}

#[cfg(test)]
mod tests {
    mod welzl {
        use approx::assert_relative_eq;
        use cgmath::{MetricSpace, Point2, Point3};
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};
        use crate::bounds::BoundingSphere;
        use crate::welzl::*;

        fn assert_encloses(s: &BoundingSphere<Point3<f64>>, points: &[Point3<f64>]) {
            let mut on_surface = 0;
            for p in points {
                let d = p.distance(s.center);
                assert!(d <= s.radius * (1.0 + 1e-6) + 1e-9, "{:?} outside of {:?}", p, s);
                if (d - s.radius).abs() < 1e-6 {
                    on_surface += 1;
                }
            }
            if points.len() > 1 {
                assert!(on_surface >= 2, "{:?} is not tight around {:?}", s, points);
            }
        }

        #[test]
        fn test_right_triangle() {
            let s = welzl_from_fixed(&[Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.0, 1.0)]);
            assert_relative_eq!(s.center, Point2::new(0.5, 0.5), epsilon = 1e-12);
            assert_relative_eq!(s.radius, 2.0f64.sqrt() / 2.0, epsilon = 1e-12);
        }

        #[test]
        fn test_obtuse_triangle_uses_diameter() {
            let s = welzl_from_fixed(&[Point2::new(-1.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.0, 0.1)]);
            assert_relative_eq!(s.center, Point2::new(0.0, 0.0), epsilon = 1e-12);
            assert_relative_eq!(s.radius, 1.0, epsilon = 1e-12);
        }

        #[test]
        fn test_collinear_falls_back() {
            let pts = [Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)];
            let s = welzl_from_fixed(&pts);
            assert_relative_eq!(s.center, Point3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
            assert_relative_eq!(s.radius, 1.0, epsilon = 1e-12);
        }

        #[test]
        fn test_coplanar_square() {
            let pts = [
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ];
            let s = welzl_from_fixed(&pts);
            assert_relative_eq!(s.center, Point3::new(0.5, 0.5, 0.0), epsilon = 1e-9);
            assert_relative_eq!(s.radius, 2.0f64.sqrt() / 2.0, epsilon = 1e-9);
        }

        #[test]
        fn test_tetrahedron() {
            let pts = [
                Point3::new(1.0, 1.0, 1.0),
                Point3::new(1.0, -1.0, -1.0),
                Point3::new(-1.0, 1.0, -1.0),
                Point3::new(-1.0, -1.0, 1.0),
            ];
            let s = welzl_from_fixed(&pts);
            assert_relative_eq!(s.center, Point3::new(0.0, 0.0, 0.0), epsilon = 1e-9);
            assert_relative_eq!(s.radius, 3.0f64.sqrt(), epsilon = 1e-9);
            assert_encloses(&s, &pts);
        }

        #[test]
        fn test_duplicates_are_dropped() {
            let pts = vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
            ];
            let s = welzl_from_iterator(pts.iter());
            assert_relative_eq!(s.center, Point3::new(1.0, 0.0, 0.0));
            assert_relative_eq!(s.radius, 1.0);
        }

        #[test]
        fn test_random_sets_are_enclosed() {
            let mut rng = StdRng::seed_from_u64(7);
            for n in 1..=4 {
                for _ in 0..50 {
                    let pts: Vec<Point3<f64>> = (0..n)
                        .map(|_| Point3::new(rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0)))
                        .collect();
                    let s = welzl_from_slice(&pts, &mut rng, 0);
                    assert_encloses(&s, &pts);
                }
            }
        }

        #[test]
        fn test_many_points() {
            let mut rng = StdRng::seed_from_u64(11);
            let pts: Vec<Point3<f64>> = (0..200)
                .map(|_| Point3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
                .collect();
            let s = welzl_from_iterator(pts.iter());
            assert_encloses(&s, &pts);
            assert!(s.radius <= 3.0f64.sqrt());
        }
    }
}
