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

use std::fmt;
use std::mem;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// Index of an occupied slot. Stays valid until the slot is removed; a later
/// push may then hand out the same id again.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolId(usize);

impl PoolId {
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone)]
enum PoolEntry<T> {
    Free { next_free: Option<usize> },
    Occupied(T),
}

/// Growable arena that allows items to be removed and inserted without
/// changing the ids of other entries.
#[derive(Clone)]
pub struct Pool<T> {
    len: usize,
    free_list: Option<usize>,
    entries: Vec<PoolEntry<T>>,
}

impl<T> Pool<T> {
    pub fn new() -> Self {
        Pool {
            len: 0,
            free_list: None,
            entries: Vec::new(),
        }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Pool {
            len: 0,
            free_list: None,
            entries: Vec::with_capacity(cap),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Push a new item. Slots left empty by removed items are reused before
    /// the storage grows.
    pub fn push(&mut self, item: T) -> PoolId {
        self.len += 1;
        match self.free_list {
            Some(free) => {
                self.free_list = match self.entries[free] {
                    PoolEntry::Free { next_free } => next_free,
                    PoolEntry::Occupied(_) => panic!("free list points at occupied slot {}", free),
                };
                self.entries[free] = PoolEntry::Occupied(item);
                PoolId(free)
            }
            None => {
                self.entries.push(PoolEntry::Occupied(item));
                PoolId(self.entries.len() - 1)
            }
        }
    }

    /// Free the slot and return its item.
    pub fn remove(&mut self, id: PoolId) -> T {
        let freed = PoolEntry::Free { next_free: self.free_list };
        match mem::replace(&mut self.entries[id.0], freed) {
            PoolEntry::Occupied(item) => {
                self.free_list = Some(id.0);
                self.len -= 1;
                item
            }
            free => {
                self.entries[id.0] = free;
                panic!("pool id {} is not occupied", id);
            }
        }
    }

    /// The id the next push will return, if a slot is free.
    pub fn next_free(&self) -> Option<PoolId> {
        self.free_list.map(PoolId)
    }

    pub fn contains(&self, id: PoolId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: PoolId) -> Option<&T> {
        match self.entries.get(id.0) {
            Some(PoolEntry::Occupied(item)) => Some(item),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: PoolId) -> Option<&mut T> {
        match self.entries.get_mut(id.0) {
            Some(PoolEntry::Occupied(item)) => Some(item),
            _ => None,
        }
    }

    /// Borrow two distinct entries mutably at once.
    pub fn get2_mut(&mut self, a: PoolId, b: PoolId) -> (&mut T, &mut T) {
        if a == b {
            panic!("pool id {} borrowed twice", a);
        }
        let (lo, hi, swapped) = if a.0 < b.0 { (a.0, b.0, false) } else { (b.0, a.0, true) };
        let (head, tail) = self.entries.split_at_mut(hi);
        let first = match head[lo] {
            PoolEntry::Occupied(ref mut item) => item,
            _ => panic!("pool id #{} is not occupied", lo),
        };
        let second = match tail[0] {
            PoolEntry::Occupied(ref mut item) => item,
            _ => panic!("pool id #{} is not occupied", hi),
        };
        if swapped {
            (second, first)
        } else {
            (first, second)
        }
    }

    /// Occupied ids in ascending order.
    pub fn ids(&self) -> Vec<PoolId> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PoolId, &T)> {
        self.entries.iter().enumerate().filter_map(|(i, e)| match e {
            PoolEntry::Occupied(item) => Some((PoolId(i), item)),
            PoolEntry::Free { .. } => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PoolId, &mut T)> {
        self.entries.iter_mut().enumerate().filter_map(|(i, e)| match e {
            PoolEntry::Occupied(item) => Some((PoolId(i), item)),
            PoolEntry::Free { .. } => None,
        })
    }
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Pool::new()
    }
}

impl<T> Index<PoolId> for Pool<T> {
    type Output = T;

    fn index(&self, id: PoolId) -> &T {
        match self.get(id) {
            Some(item) => item,
            None => panic!("pool id {} is not occupied", id),
        }
    }
}

impl<T> IndexMut<PoolId> for Pool<T> {
    fn index_mut(&mut self, id: PoolId) -> &mut T {
        match self.get_mut(id) {
            Some(item) => item,
            None => panic!("pool id {} is not occupied", id),
        }
    }
}

#[cfg(test)]
mod tests {
    mod pool {
        use crate::pool::*;

        fn values(pool: &Pool<usize>) -> Vec<usize> {
            pool.iter().map(|(_, &u)| u).collect()
        }

        #[test]
        fn test_manual_code() {
            let mut pool: Pool<usize> = Pool::new();

            let id0 = pool.push(0);
            let id1 = pool.push(1);
            let id2 = pool.push(2);
            let id3 = pool.push(3);

            assert_eq!(id0.index(), 0);
            assert_eq!(id3.index(), 3);

            pool.remove(id1);
            pool.remove(id2);

            assert_eq!(pool[id0], 0);
            assert_eq!(pool[id3], 3);
            assert!(!pool.contains(id1));
            assert_eq!(pool.len(), 2);

            assert_eq!(values(&pool), vec![0, 3]);
            // The most recently freed slot is reused first.
            assert_eq!(pool.next_free(), Some(id2));
            assert_eq!(pool.push(4), id2);
            assert_eq!(pool.push(5), id1);
            assert_eq!(values(&pool), vec![0, 5, 4, 3]);
        }

        #[test]
        fn test_remove_patterns() {
            // Remove every other item.
            let mut pool: Pool<usize> = Pool::new();
            let ids: Vec<PoolId> = (0..16).map(|i| pool.push(i)).collect();
            for i in 0..8 {
                pool.remove(ids[i * 2]);
            }
            assert_eq!(values(&pool), vec![1, 3, 5, 7, 9, 11, 13, 15]);
            pool.remove(ids[1]);
            assert_eq!(values(&pool), vec![3, 5, 7, 9, 11, 13, 15]);

            // Remove the middle.
            let mut pool: Pool<usize> = Pool::new();
            let ids: Vec<PoolId> = (0..24).map(|i| pool.push(i)).collect();
            for i in 8..16 {
                pool.remove(ids[i]);
            }
            pool.remove(ids[23]);
            pool.remove(ids[18]);
            pool.remove(ids[19]);
            assert_eq!(values(&pool), vec![0, 1, 2, 3, 4, 5, 6, 7, 16, 17, 20, 21, 22]);
            assert_eq!(pool.len(), 13);
        }

        #[test]
        fn test_get2_mut() {
            let mut pool: Pool<usize> = Pool::new();
            let a = pool.push(10);
            let _ = pool.push(20);
            let c = pool.push(30);
            {
                let (x, y) = pool.get2_mut(c, a);
                assert_eq!((*x, *y), (30, 10));
                *x += 1;
                *y += 2;
            }
            assert_eq!(pool[a], 12);
            assert_eq!(pool[c], 31);
        }

        #[test]
        #[should_panic(expected = "borrowed twice")]
        fn test_get2_mut_same_id() {
            let mut pool: Pool<usize> = Pool::new();
            let a = pool.push(10);
            pool.get2_mut(a, a);
        }

        #[test]
        #[should_panic(expected = "is not occupied")]
        fn test_double_remove() {
            let mut pool: Pool<usize> = Pool::new();
            let a = pool.push(10);
            pool.remove(a);
            pool.remove(a);
        }
    }
}
