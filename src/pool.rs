// Copyright 2017 Matthew Plant. This file is part of MGF2D.
//
// MGF2D is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// MGF2D is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with MGF2D. If not, see <http://www.gnu.org/licenses/>.

use std::mem;
use std::ops::{Index, IndexMut};
use std::vec::Vec;

/// Internal storage type used by Pool.
#[derive(Clone, Debug)]
enum PoolEntry<T> {
    FreeListEnd,
    FreeListPtr {
        next_free: usize,
    },
    Occupied(T)
}

/// Growable array type that allows items to be removed and inserted without
/// changing the indices of other entries. Indices of removed items are reused
/// most-recently-freed first.
///
/// A Pool may be given a limit on the number of live items, in which case
/// pushing beyond that limit fails and hands the item back untouched.
#[derive(Clone, Debug)]
pub struct Pool<T> {
    len: usize,
    limit: usize,
    free_list: Option<usize>,
    entries: Vec<PoolEntry<T>>,
}

impl<T> Pool<T> {
    /// Create an empty, unlimited Pool.
    pub fn new() -> Self {
        Pool::with_limit(usize::MAX)
    }

    /// Create an empty Pool that holds at most limit live items.
    pub fn with_limit(limit: usize) -> Self {
        Pool {
            len: 0,
            limit,
            free_list: None,
            entries: Vec::new(),
        }
    }

    /// Determines if the Pool is empty.
    pub fn empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Returns true if n more items can be pushed.
    pub fn has_room(&self, n: usize) -> bool {
        self.limit - self.len >= n
    }

    /// Push a new item to the Pool. Attempts to use spots left empty from
    /// removed items before performing a heap allocation. Returns the item if
    /// the Pool is at its limit.
    pub fn push(&mut self, item: T) -> Result<usize, T> {
        if self.len >= self.limit {
            return Err(item);
        }
        self.len += 1;
        if let Some(free_item) = self.free_list {
            self.free_list = match self.entries[free_item] {
                PoolEntry::FreeListEnd => None,
                PoolEntry::FreeListPtr{ next_free } => Some(next_free),
                PoolEntry::Occupied(_) => unreachable!(),
            };
            self.entries[free_item] = PoolEntry::Occupied(item);
            Ok(free_item)
        } else {
            let i = self.entries.len();
            self.entries.push(PoolEntry::Occupied(item));
            Ok(i)
        }
    }

    /// Marks an index as empty and adds it to the free list, allowing the
    /// spot to be reclaimed later.
    pub fn remove(&mut self, i: usize) -> T {
        let new_entry = if let Some(free_item) = self.free_list {
            PoolEntry::FreeListPtr{ next_free: free_item }
        } else {
            PoolEntry::FreeListEnd
        };
        match mem::replace(&mut self.entries[i], new_entry) {
            PoolEntry::Occupied(item) => {
                self.free_list = Some(i);
                self.len -= 1;
                item
            },
            old => {
                self.entries[i] = old;
                panic!("index {} is not occupied", i);
            }
        }
    }

    pub fn contains(&self, i: usize) -> bool {
        match self.entries.get(i) {
            Some(PoolEntry::Occupied(_)) => true,
            _ => false,
        }
    }

    pub fn get(&self, i: usize) -> Option<&T> {
        match self.entries.get(i) {
            Some(PoolEntry::Occupied(item)) => Some(item),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, i: usize) -> Option<&mut T> {
        match self.entries.get_mut(i) {
            Some(PoolEntry::Occupied(item)) => Some(item),
            _ => None,
        }
    }

    /// Mutably borrow two distinct entries at once.
    pub fn get_pair_mut(&mut self, a: usize, b: usize) -> (&mut T, &mut T) {
        assert!(a != b, "index {} borrowed twice", a);
        let (lo, hi, swapped) = if a < b { (a, b, false) } else { (b, a, true) };
        let (head, tail) = self.entries.split_at_mut(hi);
        let first = match &mut head[lo] {
            PoolEntry::Occupied(item) => item,
            _ => panic!("index {} is not occupied", lo),
        };
        let second = match &mut tail[0] {
            PoolEntry::Occupied(item) => item,
            _ => panic!("index {} is not occupied", hi),
        };
        if swapped {
            (second, first)
        } else {
            (first, second)
        }
    }

    /// Iterate over occupied entries along with their indices, in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.entries.iter().enumerate().filter_map(|(i, entry)| match entry {
            PoolEntry::Occupied(item) => Some((i, item)),
            _ => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.entries.iter_mut().enumerate().filter_map(|(i, entry)| match entry {
            PoolEntry::Occupied(item) => Some((i, item)),
            _ => None,
        })
    }

    /// Indices of all occupied entries, in index order.
    pub fn indices(&self) -> Vec<usize> {
        self.iter().map(|(i, _)| i).collect()
    }
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Pool::new()
    }
}

impl<T> Index<usize> for Pool<T> {
    type Output = T;

    fn index(&self, i: usize) -> &T {
        if let PoolEntry::Occupied(ref item) = self.entries[i] {
            item
        } else {
            panic!("index {} is not occupied", i)
        }
    }
}

impl<T> IndexMut<usize> for Pool<T> {
    fn index_mut(&mut self, i: usize) -> &mut T {
        if let PoolEntry::Occupied(ref mut item) = self.entries[i] {
            item
        } else {
            panic!("index {} is not occupied", i)
        }
    }
}

#[cfg(test)]
mod tests {
    mod pool {
        use crate::pool::*;

        #[test]
        fn test_reuse() {
            let mut pool: Pool<usize> = Pool::new();

            let id0 = pool.push(0).unwrap();
            let id1 = pool.push(1).unwrap();
            let id2 = pool.push(2).unwrap();
            let id3 = pool.push(3).unwrap();

            assert_eq!(id0, 0);
            assert_eq!(id3, 3);

            pool.remove(id1);
            pool.remove(id2);

            assert_eq!(pool[id0], 0);
            assert_eq!(pool[id3], 3);
            assert!(!pool.contains(id1));
            assert!(pool.get(id2).is_none());

            assert_eq!(pool.iter().map(|(_, &u)| u).collect::<Vec<usize>>(), vec![0, 3]);

            // Most recently freed slot comes back first.
            assert_eq!(pool.push(7).unwrap(), id2);
            assert_eq!(pool.push(8).unwrap(), id1);
            assert_eq!(pool.push(9).unwrap(), 4);
        }

        #[test]
        fn test_limit() {
            let mut pool: Pool<&str> = Pool::with_limit(2);
            assert!(pool.has_room(2));
            pool.push("a").unwrap();
            pool.push("b").unwrap();
            assert!(!pool.has_room(1));
            assert_eq!(pool.push("c"), Err("c"));
            assert_eq!(pool.len(), 2);
            pool.remove(0);
            assert_eq!(pool.push("c"), Ok(0));
        }

        #[test]
        fn test_pair_mut() {
            let mut pool: Pool<i32> = Pool::new();
            for i in 0..4 {
                pool.push(i).unwrap();
            }
            {
                let (a, b) = pool.get_pair_mut(3, 1);
                assert_eq!((*a, *b), (3, 1));
                std::mem::swap(a, b);
            }
            assert_eq!(pool[1], 3);
            assert_eq!(pool[3], 1);
        }

        #[test]
        #[should_panic]
        fn test_double_remove() {
            let mut pool: Pool<u8> = Pool::new();
            let id = pool.push(1).unwrap();
            pool.remove(id);
            pool.remove(id);
        }
    }
}
