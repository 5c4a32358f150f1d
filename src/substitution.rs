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

//! Distance culling of the triangles of large static meshes.
//!
//! A `SubstitutionInfo` keeps a buffer whose first `ntriangles` slots hold
//! the triangles that are currently close enough to a reference point. Each
//! call looks at a bounded window of triangles, so the cost per frame does
//! not depend on the size of the mesh. Removal swaps the last active slot
//! into the freed one, insertion appends.
//!
//! The classification pass can run on a background thread. Its decisions are
//! queued and applied at the start of the next call once the pass is done.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cgmath::{EuclideanSpace, MetricSpace, Point3};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::geom::TransformationMatrix;
use crate::mesh::{ColoredVertex, ColoredVertexArray};
use crate::precision::SceneDir;

/// Marks a triangle that is not in the active range.
pub const INACTIVE: usize = usize::MAX;

type Task = Box<dyn FnOnce() + Send>;

struct LoopState {
    task: Option<Task>,
    done: bool,
    shutdown: bool,
}

struct LoopShared {
    state: Mutex<LoopState>,
    cond: Condvar,
}

/// A worker thread that runs one task at a time.
pub struct BackgroundLoop {
    shared: Arc<LoopShared>,
    worker: Option<JoinHandle<()>>,
}

impl BackgroundLoop {
    pub fn new() -> Self {
        let shared = Arc::new(LoopShared {
            state: Mutex::new(LoopState {
                task: None,
                done: true,
                shutdown: false,
            }),
            cond: Condvar::new(),
        });
        let worker_shared = shared.clone();
        let worker = thread::spawn(move || loop {
            let task = {
                let mut state = worker_shared.state.lock();
                while state.task.is_none() && !state.shutdown {
                    worker_shared.cond.wait(&mut state);
                }
                match state.task.take() {
                    Some(task) => task,
                    None => return,
                }
            };
            task();
            let mut state = worker_shared.state.lock();
            state.done = true;
            worker_shared.cond.notify_all();
        });
        BackgroundLoop {
            shared,
            worker: Some(worker),
        }
    }

    /// True if no task is pending or running.
    pub fn done(&self) -> bool {
        self.shared.state.lock().done
    }

    /// Schedule `task`. The previous task must be done.
    pub fn run<F: FnOnce() + Send + 'static>(&self, task: F) {
        let mut state = self.shared.state.lock();
        if !state.done {
            panic!("background loop is still busy");
        }
        state.done = false;
        state.task = Some(Box::new(task));
        self.shared.cond.notify_all();
    }

    pub fn wait_until_done(&self) {
        let mut state = self.shared.state.lock();
        while !state.done {
            self.shared.cond.wait(&mut state);
        }
    }
}

impl Default for BackgroundLoop {
    fn default() -> Self {
        BackgroundLoop::new()
    }
}

impl Drop for BackgroundLoop {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.cond.notify_all();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Knobs of one culling call.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubstitutionParams {
    /// Triangles closer than this are added.
    pub draw_distance_add: SceneDir,
    /// Triangles farther than `draw_distance_add + draw_distance_slop` are
    /// removed.
    pub draw_distance_slop: SceneDir,
    /// Number of triangles inspected per call.
    pub noperations: usize,
    pub run_in_background: bool,
    /// If set, triangle centers are transformed once and reused.
    pub is_static: bool,
}

impl Default for SubstitutionParams {
    fn default() -> Self {
        SubstitutionParams {
            draw_distance_add: SceneDir::INFINITY,
            draw_distance_slop: 10.0,
            noperations: 1000,
            run_in_background: false,
            is_static: true,
        }
    }
}

struct SubstitutionIndex {
    /// Global triangle id to active slot, or `INACTIVE`.
    local_ids: Vec<usize>,
    /// Active slot to global triangle id.
    global_ids: Vec<usize>,
    current_triangle_id: usize,
    static_centers: Option<Vec<Point3<SceneDir>>>,
    to_delete: Vec<usize>,
    to_insert: Vec<usize>,
    queue_capacity: usize,
}

enum Sink<'a> {
    Foreground {
        buffer: &'a mut [[ColoredVertex; 3]],
        ntriangles: &'a mut usize,
    },
    Background,
}

fn triangle_center(t: &[ColoredVertex; 3]) -> Point3<SceneDir> {
    Point3::centroid(&[t[0].position, t[1].position, t[2].position])
}

fn delete_triangle(
    index: &mut SubstitutionIndex,
    buffer: &mut [[ColoredVertex; 3]],
    ntriangles: &mut usize,
    id: usize,
) {
    let to = index.local_ids[id];
    assert!(to != INACTIVE, "triangle {} is not active", id);
    let from = *ntriangles - 1;
    if to != from {
        let moved = index.global_ids[from];
        buffer[to] = buffer[from];
        index.local_ids[moved] = to;
        index.global_ids[to] = moved;
    }
    index.local_ids[id] = INACTIVE;
    index.global_ids[from] = INACTIVE;
    *ntriangles -= 1;
}

fn insert_triangle(
    index: &mut SubstitutionIndex,
    cva: &ColoredVertexArray,
    buffer: &mut [[ColoredVertex; 3]],
    ntriangles: &mut usize,
    id: usize,
) {
    assert!(index.local_ids[id] == INACTIVE, "triangle {} is already active", id);
    let slot = *ntriangles;
    index.local_ids[id] = slot;
    index.global_ids[slot] = id;
    buffer[slot] = cva.triangles[id];
    *ntriangles += 1;
}

fn scan(
    index: &mut SubstitutionIndex,
    cva: &ColoredVertexArray,
    position: Point3<SceneDir>,
    m: &TransformationMatrix<SceneDir>,
    params: &SubstitutionParams,
    noperations: usize,
    mut sink: Sink,
) {
    let add2 = params.draw_distance_add * params.draw_distance_add;
    let remove = params.draw_distance_add + params.draw_distance_slop;
    let remove2 = remove * remove;
    let n = cva.triangles.len();
    for _ in 0..noperations {
        let id = index.current_triangle_id;
        let center = match index.static_centers {
            Some(ref centers) => centers[id],
            None => m.transform(triangle_center(&cva.triangles[id])),
        };
        let dist2 = center.distance2(position);
        if index.local_ids[id] != INACTIVE {
            if dist2 > remove2 {
                trace!(id, "triangle out of range");
                match sink {
                    Sink::Foreground { ref mut buffer, ref mut ntriangles } => {
                        delete_triangle(index, buffer, ntriangles, id)
                    }
                    Sink::Background => {
                        if index.to_delete.len() == index.queue_capacity {
                            return;
                        }
                        index.to_delete.push(id);
                    }
                }
            }
        } else if dist2 < add2 {
            trace!(id, "triangle in range");
            match sink {
                Sink::Foreground { ref mut buffer, ref mut ntriangles } => {
                    insert_triangle(index, cva, buffer, ntriangles, id)
                }
                Sink::Background => {
                    if index.to_insert.len() == index.queue_capacity {
                        return;
                    }
                    index.to_insert.push(id);
                }
            }
        }
        index.current_triangle_id = (id + 1) % n;
    }
}

/// The active subset of a mesh's triangles.
pub struct SubstitutionInfo {
    cva: Arc<ColoredVertexArray>,
    buffer: Vec<[ColoredVertex; 3]>,
    ntriangles: usize,
    index: Arc<Mutex<SubstitutionIndex>>,
    background: Option<BackgroundLoop>,
    ran_in_foreground: bool,
}

impl SubstitutionInfo {
    /// Initially every triangle is active.
    pub fn new(cva: Arc<ColoredVertexArray>) -> Self {
        let n = cva.triangles.len();
        SubstitutionInfo {
            buffer: cva.triangles.clone(),
            ntriangles: n,
            index: Arc::new(Mutex::new(SubstitutionIndex {
                local_ids: (0..n).collect(),
                global_ids: (0..n).collect(),
                current_triangle_id: 0,
                static_centers: None,
                to_delete: Vec::new(),
                to_insert: Vec::new(),
                queue_capacity: 0,
            })),
            cva,
            background: None,
            ran_in_foreground: false,
        }
    }

    pub fn ntriangles(&self) -> usize {
        self.ntriangles
    }

    /// The triangles in the active range, in slot order.
    pub fn active_triangles(&self) -> &[[ColoredVertex; 3]] {
        &self.buffer[..self.ntriangles]
    }

    /// Global ids of the active triangles, in slot order.
    pub fn active_ids(&self) -> Vec<usize> {
        let index = self.index.lock();
        index.global_ids[..self.ntriangles].to_vec()
    }

    /// True if the slot and id maps are inverse to each other on the active
    /// range and every other triangle is marked inactive.
    pub fn is_consistent(&self) -> bool {
        let index = self.index.lock();
        let active_ok = (0..self.ntriangles).all(|i| {
            let g = index.global_ids[i];
            g != INACTIVE && index.local_ids[g] == i
        });
        let inactive_ok = index
            .local_ids
            .iter()
            .filter(|&&l| l != INACTIVE)
            .count()
            == self.ntriangles;
        let buffer_ok = (0..self.ntriangles).all(|i| self.buffer[i] == self.cva.triangles[index.global_ids[i]]);
        active_ok && inactive_ok && buffer_ok
    }

    /// Block until a pending background pass has finished. Does nothing in
    /// foreground mode.
    pub fn wait_for_background(&self) {
        if let Some(ref bg) = self.background {
            bg.wait_until_done();
        }
    }

    /// Inspect the next `params.noperations` triangles and move them in or
    /// out of the active range depending on their distance to `position`.
    pub fn delete_triangles_far_away(
        &mut self,
        position: Point3<SceneDir>,
        m: &TransformationMatrix<SceneDir>,
        params: &SubstitutionParams,
    ) {
        assert!(!params.draw_distance_add.is_nan(), "draw distance is NaN");
        assert!(!params.draw_distance_slop.is_nan(), "draw distance slop is NaN");
        if params.draw_distance_add == SceneDir::INFINITY || self.cva.triangles.is_empty() {
            return;
        }
        let n = self.cva.triangles.len();
        let noperations = {
            let mut index = self.index.lock();
            if params.is_static && index.static_centers.is_none() {
                index.static_centers = Some(self.cva.triangles.iter().map(|t| m.transform(triangle_center(t))).collect());
            }
            (index.current_triangle_id + params.noperations).min(n) - index.current_triangle_id
        };
        if params.run_in_background {
            if self.ran_in_foreground {
                panic!("substitution both in foreground and background");
            }
            self.run_in_background(position, m, params, noperations);
        } else {
            if self.background.is_some() {
                panic!("substitution both in foreground and background");
            }
            self.ran_in_foreground = true;
            let mut index = self.index.lock();
            scan(
                &mut index,
                &self.cva,
                position,
                m,
                params,
                noperations,
                Sink::Foreground {
                    buffer: &mut self.buffer,
                    ntriangles: &mut self.ntriangles,
                },
            );
        }
    }

    fn run_in_background(
        &mut self,
        position: Point3<SceneDir>,
        m: &TransformationMatrix<SceneDir>,
        params: &SubstitutionParams,
        noperations: usize,
    ) {
        if self.background.is_none() {
            let mut index = self.index.lock();
            index.queue_capacity = noperations;
            index.to_delete.reserve_exact(noperations);
            index.to_insert.reserve_exact(noperations);
            self.background = Some(BackgroundLoop::new());
        }
        let bg = match self.background {
            Some(ref bg) => bg,
            None => return,
        };
        if !bg.done() {
            return;
        }
        {
            let mut index = self.index.lock();
            if index.queue_capacity < noperations {
                panic!("noperations or triangle list changed");
            }
            let to_delete = std::mem::take(&mut index.to_delete);
            let to_insert = std::mem::take(&mut index.to_insert);
            if !to_delete.is_empty() || !to_insert.is_empty() {
                debug!(
                    name = %self.cva.name,
                    ndelete = to_delete.len(),
                    ninsert = to_insert.len(),
                    "applying background substitution"
                );
            }
            for &id in &to_delete {
                delete_triangle(&mut index, &mut self.buffer, &mut self.ntriangles, id);
            }
            for &id in &to_insert {
                insert_triangle(&mut index, &self.cva, &mut self.buffer, &mut self.ntriangles, id);
            }
            index.to_delete = to_delete;
            index.to_delete.clear();
            index.to_insert = to_insert;
            index.to_insert.clear();
        }
        let index = self.index.clone();
        let cva = self.cva.clone();
        let m = *m;
        let params = *params;
        bg.run(move || {
            let mut index = index.lock();
            scan(&mut index, &cva, position, &m, &params, noperations, Sink::Background);
        });
    }
}

#[cfg(test)]
mod tests {
    mod substitution {
        use std::sync::Arc;
        use cgmath::Point3;
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};
        use crate::collision::PhysicsMaterial;
        use crate::geom::TransformationMatrix;
        use crate::mesh::{ColoredVertex, ColoredVertexArray};
        use crate::substitution::*;

        /// Ten small triangles with centers at x = 0, 10, ..., 90.
        fn strip() -> Arc<ColoredVertexArray> {
            let mut cva = ColoredVertexArray::new("strip", PhysicsMaterial::ATTR_CONCAVE);
            for i in 0..10 {
                let x = 10.0 * i as f32;
                cva.push_triangle([
                    ColoredVertex::new(Point3::new(x - 1.0, -1.0, 0.0)),
                    ColoredVertex::new(Point3::new(x + 1.0, -1.0, 0.0)),
                    ColoredVertex::new(Point3::new(x, 2.0, 0.0)),
                ]);
            }
            Arc::new(cva)
        }

        fn params(noperations: usize, run_in_background: bool) -> SubstitutionParams {
            SubstitutionParams {
                draw_distance_add: 25.0,
                draw_distance_slop: 10.0,
                noperations,
                run_in_background,
                is_static: true,
            }
        }

        fn sorted(mut v: Vec<usize>) -> Vec<usize> {
            v.sort();
            v
        }

        #[test]
        fn test_foreground() {
            let mut s = SubstitutionInfo::new(strip());
            let m = TransformationMatrix::identity();
            s.delete_triangles_far_away(Point3::new(0.0, 0.0, 0.0), &m, &params(10, false));
            // Removal uses the slop, so triangles up to 35 away stay.
            assert_eq!(sorted(s.active_ids()), vec![0, 1, 2, 3]);
            assert!(s.is_consistent());
            s.delete_triangles_far_away(Point3::new(90.0, 0.0, 0.0), &m, &params(10, false));
            assert_eq!(sorted(s.active_ids()), vec![7, 8, 9]);
            assert_eq!(s.ntriangles(), 3);
            assert!(s.is_consistent());
        }

        #[test]
        fn test_bounded_window() {
            let mut s = SubstitutionInfo::new(strip());
            let m = TransformationMatrix::identity();
            s.delete_triangles_far_away(Point3::new(0.0, 0.0, 0.0), &m, &params(6, false));
            // Only triangles 0 to 5 were inspected.
            assert_eq!(sorted(s.active_ids()), vec![0, 1, 2, 3, 6, 7, 8, 9]);
            s.delete_triangles_far_away(Point3::new(0.0, 0.0, 0.0), &m, &params(6, false));
            // The window is clipped at the end of the mesh and then wraps.
            assert_eq!(sorted(s.active_ids()), vec![0, 1, 2, 3]);
            assert!(s.is_consistent());
        }

        #[test]
        fn test_infinite_distance_is_noop() {
            let mut s = SubstitutionInfo::new(strip());
            let mut p = params(10, false);
            p.draw_distance_add = f32::INFINITY;
            s.delete_triangles_far_away(Point3::new(1000.0, 0.0, 0.0), &TransformationMatrix::identity(), &p);
            assert_eq!(s.ntriangles(), 10);
        }

        #[test]
        fn test_background() {
            let mut s = SubstitutionInfo::new(strip());
            let m = TransformationMatrix::identity();
            let p = params(10, true);
            s.delete_triangles_far_away(Point3::new(0.0, 0.0, 0.0), &m, &p);
            s.wait_for_background();
            // Decisions are applied on the next call.
            assert_eq!(s.ntriangles(), 10);
            s.delete_triangles_far_away(Point3::new(0.0, 0.0, 0.0), &m, &p);
            assert_eq!(sorted(s.active_ids()), vec![0, 1, 2, 3]);
            assert!(s.is_consistent());
            s.wait_for_background();
        }

        #[test]
        #[should_panic(expected = "substitution both in foreground and background")]
        fn test_mode_switch_panics() {
            let mut s = SubstitutionInfo::new(strip());
            let m = TransformationMatrix::identity();
            s.delete_triangles_far_away(Point3::new(0.0, 0.0, 0.0), &m, &params(10, true));
            s.wait_for_background();
            s.delete_triangles_far_away(Point3::new(0.0, 0.0, 0.0), &m, &params(10, false));
        }

        #[test]
        #[should_panic(expected = "substitution both in foreground and background")]
        fn test_foreground_then_background_panics() {
            let mut s = SubstitutionInfo::new(strip());
            let m = TransformationMatrix::identity();
            s.delete_triangles_far_away(Point3::new(0.0, 0.0, 0.0), &m, &params(10, false));
            s.delete_triangles_far_away(Point3::new(0.0, 0.0, 0.0), &m, &params(10, true));
        }

        #[test]
        fn test_random_walk_keeps_bijection() {
            let mut rng = StdRng::seed_from_u64(5);
            let mut s = SubstitutionInfo::new(strip());
            let m = TransformationMatrix::identity();
            let mut p = params(3, false);
            p.is_static = false;
            for _ in 0..200 {
                let x = rng.gen_range(-20.0..110.0);
                s.delete_triangles_far_away(Point3::new(x, 0.0, 0.0), &m, &p);
                assert!(s.is_consistent());
            }
        }

        #[test]
        fn test_background_loop() {
            use std::sync::atomic::{AtomicUsize, Ordering};
            let bg = BackgroundLoop::new();
            let counter = Arc::new(AtomicUsize::new(0));
            for _ in 0..3 {
                bg.wait_until_done();
                let c = counter.clone();
                bg.run(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                });
            }
            bg.wait_until_done();
            assert!(bg.done());
            assert_eq!(counter.load(Ordering::SeqCst), 3);
        }
    }
}
