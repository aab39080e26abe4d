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

use std::cmp;

use smallvec::SmallVec;

use crate::bounds::{Contains, Overlaps, RayCastInput, AABB};
use crate::error::WorldError;
use crate::math::Vec2;
use crate::pool::Pool;

/// A dynamic AABB tree used as the broad phase.
///
/// Leaves hold fattened AABBs so that objects can move a little without the
/// tree being touched. Leaf ids stay valid until the leaf is removed, even
/// when the leaf is moved and reinserted.
#[derive(Clone, Debug)]
pub struct DynamicTree<K> {
    root: Option<usize>,
    num_leaves: usize,
    pool: Pool<TreeNode<K>>,
}

#[derive(Clone, Debug)]
struct TreeNode<K> {
    /// Leaves have height zero.
    height: i32,
    parent: Option<usize>,
    aabb: AABB,
    kind: NodeKind<K>,
}

#[derive(Clone, Debug)]
enum NodeKind<K> {
    Leaf(K),
    Parent(usize, usize),
}

impl<K> DynamicTree<K> {
    pub fn new() -> Self {
        DynamicTree::with_limit(usize::MAX)
    }

    /// Create a tree that holds at most node_limit nodes, internal nodes
    /// included. A tree of n leaves needs 2n - 1 nodes.
    pub fn with_limit(node_limit: usize) -> Self {
        DynamicTree {
            root: None,
            num_leaves: 0,
            pool: Pool::with_limit(node_limit),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Returns the number of leaves in the tree.
    pub fn len(&self) -> usize {
        self.num_leaves
    }

    /// Height of the root, or zero for an empty tree.
    pub fn height(&self) -> i32 {
        self.root.map_or(0, |root| self.pool[root].height)
    }

    pub fn fat_aabb(&self, leaf: usize) -> &AABB {
        &self.pool[leaf].aabb
    }

    pub fn key(&self, leaf: usize) -> &K {
        match self.pool[leaf].kind {
            NodeKind::Leaf(ref key) => key,
            NodeKind::Parent(..) => panic!("node {} is not a leaf", leaf),
        }
    }

    /// Returns true if the fat AABBs of two leaves overlap.
    pub fn test_overlap(&self, a: usize, b: usize) -> bool {
        self.pool[a].aabb.overlaps(&self.pool[b].aabb)
    }

    /// Inserts a leaf and rebalances. On capacity exhaustion the tree is left
    /// untouched.
    pub fn insert(&mut self, aabb: AABB, key: K) -> Result<usize, WorldError> {
        let needed = if self.root.is_some() { 2 } else { 1 };
        if !self.pool.has_room(needed) {
            return Err(WorldError::CapacityExceeded {
                what: "tree nodes",
                limit: self.pool.limit(),
            });
        }
        let leaf = self.alloc(aabb, NodeKind::Leaf(key));
        self.insert_leaf(leaf);
        self.num_leaves += 1;
        Ok(leaf)
    }

    /// Removes a leaf and returns its key.
    pub fn remove(&mut self, leaf: usize) -> K {
        if let NodeKind::Parent(..) = self.pool[leaf].kind {
            panic!("node {} is not a leaf", leaf);
        }
        self.remove_leaf(leaf);
        self.num_leaves -= 1;
        match self.pool.remove(leaf).kind {
            NodeKind::Leaf(key) => key,
            NodeKind::Parent(..) => unreachable!(),
        }
    }

    /// Move a leaf to cover a new tight AABB. Nothing happens if the fat AABB
    /// still contains it. Otherwise the leaf is fattened by extension,
    /// stretched along displacement and reinserted. Returns true if the leaf
    /// was reinserted.
    pub fn update(&mut self, leaf: usize, tight: AABB, displacement: Vec2, extension: f32) -> bool {
        if self.pool[leaf].aabb.contains(&tight) {
            return false;
        }
        self.remove_leaf(leaf);
        self.pool[leaf].aabb = tight.fattened(extension).extended(displacement);
        self.insert_leaf(leaf);
        true
    }

    /// Visit every leaf whose fat AABB overlaps aabb. Returning false from the
    /// visitor ends the query.
    pub fn query<F: FnMut(usize) -> bool>(&self, aabb: &AABB, mut visitor: F) {
        let root = match self.root {
            Some(root) => root,
            None => return,
        };
        let mut stack = SmallVec::<[usize; 64]>::new();
        stack.push(root);
        while let Some(top) = stack.pop() {
            let node = &self.pool[top];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            match node.kind {
                NodeKind::Leaf(_) => {
                    if !visitor(top) {
                        return;
                    }
                },
                NodeKind::Parent(child1, child2) => {
                    stack.push(child1);
                    stack.push(child2);
                },
            }
        }
    }

    /// Visit every leaf whose fat AABB is hit by the ray. The visitor returns
    /// the new max fraction of the ray: zero ends the cast, a negative value
    /// leaves the ray as is and a positive value clips it.
    pub fn ray_cast<F>(&self, input: &RayCastInput, mut visitor: F)
    where
        F: FnMut(&RayCastInput, usize) -> f32,
    {
        let root = match self.root {
            Some(root) => root,
            None => return,
        };
        let mut clipped = *input;
        let mut stack = SmallVec::<[usize; 64]>::new();
        stack.push(root);
        while let Some(top) = stack.pop() {
            let node = &self.pool[top];
            if !node.aabb.overlaps(&clipped.bounds()) || clipped.separates(&node.aabb) {
                continue;
            }
            match node.kind {
                NodeKind::Leaf(_) => {
                    let value = visitor(&clipped, top);
                    if value == 0.0 {
                        return;
                    }
                    if value > 0.0 {
                        clipped.max_fraction = value;
                    }
                },
                NodeKind::Parent(child1, child2) => {
                    stack.push(child1);
                    stack.push(child2);
                },
            }
        }
    }

    /// Iterate over the ids of all leaves.
    pub fn leaves<'a>(&'a self) -> impl Iterator<Item = usize> + 'a {
        self.pool.iter().filter_map(|(i, node)| match node.kind {
            NodeKind::Leaf(_) => Some(i),
            NodeKind::Parent(..) => None,
        })
    }

    /// Panics if a structural invariant is broken: parent links, heights,
    /// containment of children or the leaf count.
    pub fn validate(&self) {
        let root = match self.root {
            Some(root) => root,
            None => {
                assert_eq!(self.num_leaves, 0);
                assert!(self.pool.empty());
                return;
            }
        };
        assert!(self.pool[root].parent.is_none());
        let leaves = self.validate_node(root);
        assert_eq!(leaves, self.num_leaves);
        assert_eq!(self.pool.len(), 2 * leaves - 1);
    }

    fn validate_node(&self, i: usize) -> usize {
        let node = &self.pool[i];
        match node.kind {
            NodeKind::Leaf(_) => {
                assert_eq!(node.height, 0);
                1
            },
            NodeKind::Parent(child1, child2) => {
                let (n1, n2) = (&self.pool[child1], &self.pool[child2]);
                assert_eq!(n1.parent, Some(i));
                assert_eq!(n2.parent, Some(i));
                assert_eq!(node.height, 1 + cmp::max(n1.height, n2.height));
                assert!(node.aabb.contains(&n1.aabb));
                assert!(node.aabb.contains(&n2.aabb));
                self.validate_node(child1) + self.validate_node(child2)
            },
        }
    }

    fn alloc(&mut self, aabb: AABB, kind: NodeKind<K>) -> usize {
        let node = TreeNode {
            height: match kind {
                NodeKind::Leaf(_) => 0,
                NodeKind::Parent(..) => 1,
            },
            parent: None,
            aabb,
            kind,
        };
        match self.pool.push(node) {
            Ok(i) => i,
            // Room is checked before any node is allocated.
            Err(_) => unreachable!("tree node pool exhausted"),
        }
    }

    fn insert_leaf(&mut self, leaf: usize) {
        let root = match self.root {
            Some(root) => root,
            None => {
                self.pool[leaf].parent = None;
                self.root = Some(leaf);
                return;
            }
        };

        // Find the best sibling by perimeter cost.
        let aabb = self.pool[leaf].aabb;
        let mut best = root;
        while let NodeKind::Parent(child1, child2) = self.pool[best].kind {
            let area = self.pool[best].aabb.perimeter();
            let combined_area = AABB::combine(&self.pool[best].aabb, &aabb).perimeter();
            let no_descent_cost = 2.0 * combined_area;
            let inheritance_cost = 2.0 * (combined_area - area);

            let child_cost = |child: usize| -> f32 {
                let node = &self.pool[child];
                let combined = AABB::combine(&aabb, &node.aabb).perimeter();
                match node.kind {
                    NodeKind::Leaf(_) => combined + inheritance_cost,
                    NodeKind::Parent(..) => combined - node.aabb.perimeter() + inheritance_cost,
                }
            };
            let cost1 = child_cost(child1);
            let cost2 = child_cost(child2);

            if no_descent_cost < cost1 && no_descent_cost < cost2 {
                break;
            }
            best = if cost1 < cost2 { child1 } else { child2 };
        }

        let old_parent = self.pool[best].parent;
        let best_aabb = self.pool[best].aabb;
        let new_parent = self.alloc(AABB::combine(&aabb, &best_aabb), NodeKind::Parent(best, leaf));
        self.pool[new_parent].parent = old_parent;
        self.pool[new_parent].height = self.pool[best].height + 1;
        match old_parent {
            Some(p) => self.replace_child(p, best, new_parent),
            None => self.root = Some(new_parent),
        }
        self.pool[best].parent = Some(new_parent);
        self.pool[leaf].parent = Some(new_parent);

        self.refit_ancestors(Some(new_parent));
    }

    /// Detach a leaf from the tree without freeing it.
    fn remove_leaf(&mut self, leaf: usize) {
        let parent = match self.pool[leaf].parent {
            Some(parent) => parent,
            None => {
                self.root = None;
                return;
            }
        };
        let sibling = match self.pool[parent].kind {
            NodeKind::Parent(child1, child2) => if child1 == leaf { child2 } else { child1 },
            NodeKind::Leaf(_) => unreachable!(),
        };
        let grand_parent = self.pool[parent].parent;
        self.pool.remove(parent);
        self.pool[sibling].parent = grand_parent;
        self.pool[leaf].parent = None;
        match grand_parent {
            Some(g) => {
                self.replace_child(g, parent, sibling);
                self.refit_ancestors(Some(g));
            },
            None => self.root = Some(sibling),
        }
    }

    fn replace_child(&mut self, parent: usize, old: usize, new: usize) {
        if let NodeKind::Parent(child1, child2) = self.pool[parent].kind {
            self.pool[parent].kind = if child1 == old {
                NodeKind::Parent(new, child2)
            } else {
                NodeKind::Parent(child1, new)
            };
        }
    }

    /// Walk up from i, rebalancing and fixing heights and bounds.
    fn refit_ancestors(&mut self, mut i: Option<usize>) {
        while let Some(node) = i {
            let node = self.balance(node);
            self.refit(node);
            i = self.pool[node].parent;
        }
    }

    fn refit(&mut self, i: usize) {
        if let NodeKind::Parent(child1, child2) = self.pool[i].kind {
            self.pool[i].height = 1 + cmp::max(self.pool[child1].height, self.pool[child2].height);
            self.pool[i].aabb = AABB::combine(&self.pool[child1].aabb, &self.pool[child2].aabb);
        }
    }

    /// Perform a left or right rotation if node a is imbalanced. Returns the
    /// new root of the subtree.
    fn balance(&mut self, a: usize) -> usize {
        if self.pool[a].height < 2 {
            return a;
        }
        let (b, c) = match self.pool[a].kind {
            NodeKind::Parent(b, c) => (b, c),
            NodeKind::Leaf(_) => return a,
        };
        let balance = self.pool[c].height - self.pool[b].height;
        if balance > 1 {
            self.rotate_up(a, c, b);
            return c;
        }
        if balance < -1 {
            self.rotate_up(a, b, c);
            return b;
        }
        a
    }

    /// Promote up, a child of a, into a's place. The taller child of up stays
    /// with it and the shorter one moves under a next to stay.
    fn rotate_up(&mut self, a: usize, up: usize, stay: usize) {
        let (f, g) = match self.pool[up].kind {
            NodeKind::Parent(f, g) => (f, g),
            NodeKind::Leaf(_) => return,
        };
        let parent = self.pool[a].parent;
        self.pool[up].parent = parent;
        self.pool[a].parent = Some(up);
        match parent {
            Some(p) => self.replace_child(p, a, up),
            None => self.root = Some(up),
        }

        let (keep, give) = if self.pool[f].height > self.pool[g].height {
            (f, g)
        } else {
            (g, f)
        };
        self.pool[up].kind = NodeKind::Parent(a, keep);
        self.pool[a].kind = NodeKind::Parent(stay, give);
        self.pool[give].parent = Some(a);
        self.refit(a);
        self.refit(up);
    }
}

impl<K> Default for DynamicTree<K> {
    fn default() -> Self {
        DynamicTree::new()
    }
}
