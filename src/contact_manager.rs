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

use tracing::warn;

use crate::body::Body;
use crate::bounds::AABB;
use crate::collision::ManifoldConf;
use crate::contact::Contact;
use crate::error::WorldError;
use crate::id::{BodyId, Contactable, ContactId, ShapeId};
use crate::joint::Joint;
use crate::listener::ContactListener;
use crate::math::*;
use crate::pool::Pool;
use crate::shape::Shape;
use crate::step::PreStepStats;
use crate::tree::DynamicTree;

/// Outcome of offering a broad phase pair to the contact manager.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PairResult {
    Added(ContactId),
    /// A contact for the pair already exists.
    Exists,
    /// The pair was filtered out.
    Ignored,
    /// The pair passed filtering but the contact pool is full.
    Dropped,
}

/// Counts from one round of pair finding.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PairCounts {
    pub added: usize,
    pub ignored: usize,
    pub dropped: usize,
}

/// Owns the broad phase tree and every contact, and keeps the two in step:
/// a contact exists for a pair of shape children only while their fattened
/// bounds overlap and the pair passes filtering.
#[derive(Clone, Debug)]
pub struct ContactManager {
    pub(crate) tree: DynamicTree<Contactable>,
    pub(crate) contacts: Pool<Contact>,
    // Leaves whose bounds changed since new pairs were last looked for.
    move_buffer: Vec<usize>,
}

impl ContactManager {
    pub fn new(proxy_limit: usize, contact_limit: usize) -> Self {
        ContactManager {
            // Every leaf needs an internal node above it, except the root.
            tree: DynamicTree::with_limit(proxy_limit.saturating_mul(2)),
            contacts: Pool::with_limit(contact_limit),
            move_buffer: Vec::new(),
        }
    }

    pub fn tree(&self) -> &DynamicTree<Contactable> {
        &self.tree
    }

    pub fn contacts(&self) -> &Pool<Contact> {
        &self.contacts
    }

    /// Insert one leaf per child of the shape. On failure no leaves are left
    /// behind.
    pub(crate) fn create_proxies(
        &mut self,
        body: BodyId,
        shape_id: ShapeId,
        shape: &mut Shape,
        xf: &Transform,
        extension: f32,
    ) -> Result<(), WorldError> {
        debug_assert!(shape.proxies.is_empty());
        for child in 0..shape.child_count() {
            let aabb = shape.geometry.compute_aabb(xf, child).fattened(extension);
            let key = Contactable { body, shape: shape_id, child };
            match self.tree.insert(aabb, key) {
                Ok(leaf) => {
                    shape.proxies.push(leaf);
                    self.move_buffer.push(leaf);
                },
                Err(err) => {
                    self.destroy_proxies(shape);
                    return Err(err);
                },
            }
        }
        Ok(())
    }

    pub(crate) fn destroy_proxies(&mut self, shape: &mut Shape) {
        for leaf in shape.proxies.drain(..) {
            self.tree.remove(leaf);
            self.move_buffer.retain(|&l| l != leaf);
        }
    }

    /// Refit the leaves of a shape that moved from xf1 to xf2 over a step.
    /// Returns how many leaves were reinserted.
    pub(crate) fn synchronize(
        &mut self,
        shape: &Shape,
        xf1: &Transform,
        xf2: &Transform,
        extension: f32,
        multiplier: f32,
    ) -> usize {
        let displacement = (xf2.p - xf1.p) * multiplier;
        let mut moved = 0;
        for (child, &leaf) in shape.proxies.iter().enumerate() {
            let aabb1 = shape.geometry.compute_aabb(xf1, child);
            let aabb2 = shape.geometry.compute_aabb(xf2, child);
            let swept = AABB::combine(&aabb1, &aabb2);
            if self.tree.update(leaf, swept, displacement, extension) {
                self.move_buffer.push(leaf);
                moved += 1;
            }
        }
        moved
    }

    /// Have the shape's leaves looked at again when finding new pairs.
    pub(crate) fn touch_proxies(&mut self, shape: &Shape) {
        self.move_buffer.extend(shape.proxies.iter().cloned());
    }

    /// Whether a pair may collide at all, before the listener is asked.
    pub(crate) fn pair_allowed(
        a: &Contactable,
        b: &Contactable,
        bodies: &Pool<Body>,
        shapes: &Pool<Shape>,
        joints: &Pool<Joint>,
    ) -> bool {
        if a.body == b.body {
            return false;
        }
        let (body_a, body_b) = (&bodies[a.body.0], &bodies[b.body.0]);
        if !body_a.is_accelerable() && !body_b.is_accelerable() {
            return false;
        }
        let connected = body_b.joints.iter().any(|&j| {
            let joint = &joints[j.0];
            joint.other(b.body) == a.body && !joint.collide_connected
        });
        if connected {
            return false;
        }
        shapes[a.shape.0].filter.should_collide(&shapes[b.shape.0].filter)
    }

    /// Create contacts for new overlaps of moved leaves.
    pub(crate) fn find_new_contacts(
        &mut self,
        bodies: &mut Pool<Body>,
        shapes: &Pool<Shape>,
        joints: &Pool<Joint>,
        listener: &mut dyn ContactListener,
    ) -> PairCounts {
        let mut moved = std::mem::replace(&mut self.move_buffer, Vec::new());
        moved.sort();
        moved.dedup();

        let mut pairs = Vec::new();
        for &query_leaf in moved.iter() {
            let fat = *self.tree.fat_aabb(query_leaf);
            self.tree.query(&fat, |leaf| {
                if leaf == query_leaf {
                    return true;
                }
                // Pairs of two moved leaves are found from the lower one.
                if leaf < query_leaf && moved.binary_search(&leaf).is_ok() {
                    return true;
                }
                pairs.push((query_leaf.min(leaf), query_leaf.max(leaf)));
                true
            });
        }
        pairs.sort();
        pairs.dedup();

        let mut counts = PairCounts::default();
        for (l1, l2) in pairs {
            let (a, b) = (*self.tree.key(l1), *self.tree.key(l2));
            match self.add_pair(a, b, bodies, shapes, joints, listener) {
                PairResult::Added(_) => counts.added += 1,
                PairResult::Ignored => counts.ignored += 1,
                PairResult::Dropped => counts.dropped += 1,
                PairResult::Exists => (),
            }
        }
        counts
    }

    pub(crate) fn add_pair(
        &mut self,
        a: Contactable,
        b: Contactable,
        bodies: &mut Pool<Body>,
        shapes: &Pool<Shape>,
        joints: &Pool<Joint>,
        listener: &mut dyn ContactListener,
    ) -> PairResult {
        if a.body == b.body {
            return PairResult::Ignored;
        }
        let exists = bodies[b.body.0]
            .contacts
            .iter()
            .any(|&c| self.contacts[c.0].joins(&a, &b));
        if exists {
            return PairResult::Exists;
        }
        if !ContactManager::pair_allowed(&a, &b, bodies, shapes, joints) || !listener.should_collide(&a, &b) {
            return PairResult::Ignored;
        }

        let contact = Contact::new(
            a,
            &shapes[a.shape.0],
            &bodies[a.body.0],
            b,
            &shapes[b.shape.0],
            &bodies[b.body.0],
        );
        let id = match self.contacts.push(contact) {
            Ok(index) => ContactId(index),
            Err(_) => {
                warn!(limit = self.contacts.limit(), "contact capacity reached, pair dropped");
                return PairResult::Dropped;
            },
        };
        bodies[a.body.0].contacts.push(id);
        bodies[b.body.0].contacts.push(id);
        PairResult::Added(id)
    }

    /// Remove a contact, telling the listener if it was touching.
    pub(crate) fn destroy(&mut self, id: ContactId, bodies: &mut Pool<Body>, listener: &mut dyn ContactListener) {
        let contact = self.contacts.remove(id.0);
        if contact.touching {
            listener.end_contact(id, &contact);
        }
        for body in [contact.a.body, contact.b.body].iter() {
            if let Some(body) = bodies.get_mut(body.0) {
                body.contacts.retain(|&c| c != id);
            }
        }
    }

    /// Update one contact's manifold. Bodies are woken when the contact
    /// starts or stops touching.
    pub(crate) fn update_contact(
        &mut self,
        id: ContactId,
        bodies: &mut Pool<Body>,
        shapes: &Pool<Shape>,
        conf: &ManifoldConf,
        listener: &mut dyn ContactListener,
    ) -> bool {
        let contact = &mut self.contacts[id.0];
        let (a, b) = (contact.a, contact.b);
        let xf_a = bodies[a.body.0].xf;
        let xf_b = bodies[b.body.0].xf;
        let (was_touching, touching) = contact.update(
            id,
            &shapes[a.shape.0],
            &xf_a,
            &shapes[b.shape.0],
            &xf_b,
            conf,
            listener,
        );
        if was_touching != touching {
            bodies[a.body.0].set_awake(true);
            bodies[b.body.0].set_awake(true);
        }
        touching
    }

    /// Filter, update or destroy every contact at the start of a step.
    pub(crate) fn collide(
        &mut self,
        bodies: &mut Pool<Body>,
        shapes: &Pool<Shape>,
        joints: &Pool<Joint>,
        conf: &ManifoldConf,
        listener: &mut dyn ContactListener,
    ) -> PreStepStats {
        let mut stats = PreStepStats::default();
        for index in self.contacts.indices() {
            let id = ContactId(index);
            let (a, b) = (self.contacts[index].a, self.contacts[index].b);

            if self.contacts[index].needs_filtering {
                if !ContactManager::pair_allowed(&a, &b, bodies, shapes, joints) || !listener.should_collide(&a, &b) {
                    self.destroy(id, bodies, listener);
                    stats.contacts_destroyed += 1;
                    continue;
                }
                self.contacts[index].needs_filtering = false;
            }

            if !bodies[a.body.0].is_active() && !bodies[b.body.0].is_active() {
                stats.contacts_skipped += 1;
                continue;
            }

            let leaf_a = shapes[a.shape.0].proxies[a.child];
            let leaf_b = shapes[b.shape.0].proxies[b.child];
            if !self.tree.test_overlap(leaf_a, leaf_b) {
                self.destroy(id, bodies, listener);
                stats.contacts_destroyed += 1;
                continue;
            }

            if self.contacts[index].needs_updating {
                self.update_contact(id, bodies, shapes, conf, listener);
                stats.contacts_updated += 1;
            } else {
                stats.contacts_skipped += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    mod contact_manager {
        use crate::body::{Body, BodyConf, BodyType};
        use crate::collision::ManifoldConf;
        use crate::contact_manager::*;
        use crate::id::*;
        use crate::joint::Joint;
        use crate::listener::NullListener;
        use crate::math::*;
        use crate::pool::Pool;
        use crate::shape::{Filter, Geometry, Shape, ShapeConf};

        struct Scene {
            bodies: Pool<Body>,
            shapes: Pool<Shape>,
            joints: Pool<Joint>,
            cm: ContactManager,
        }

        impl Scene {
            fn new() -> Self {
                Scene {
                    bodies: Pool::new(),
                    shapes: Pool::new(),
                    joints: Pool::new(),
                    cm: ContactManager::new(64, 64),
                }
            }

            fn add(&mut self, body_type: BodyType, position: Vec2, conf: ShapeConf) -> (BodyId, ShapeId) {
                let body_id = BodyId(self.bodies.push(Body::new(&BodyConf::new(body_type, position))).unwrap());
                let shape_id = ShapeId(self.shapes.push(Shape::new(body_id, conf)).unwrap());
                let xf = self.bodies[body_id.0].xf;
                self.cm
                    .create_proxies(body_id, shape_id, &mut self.shapes[shape_id.0], &xf, 0.1)
                    .unwrap();
                self.bodies[body_id.0].shapes.push(shape_id);
                (body_id, shape_id)
            }

            fn find(&mut self) -> (usize, usize) {
                let counts = self.cm.find_new_contacts(&mut self.bodies, &self.shapes, &self.joints, &mut NullListener);
                (counts.added, counts.ignored)
            }
        }

        #[test]
        fn test_lifecycle() {
            let mut scene = Scene::new();
            let (ground, _) = scene.add(BodyType::Static, Vec2::new(0.0, 0.0), ShapeConf::new(Geometry::disk(1.0)));
            let (ball, ball_shape) = scene.add(BodyType::Dynamic, Vec2::new(1.5, 0.0), ShapeConf::new(Geometry::disk(1.0)));
            assert_eq!(scene.find(), (1, 0));
            assert_eq!(scene.cm.contacts().len(), 1);
            assert_eq!(scene.bodies[ground.0].contacts().len(), 1);
            // Nothing moved, so nothing new.
            assert_eq!(scene.find(), (0, 0));

            let stats = scene.cm.collide(
                &mut scene.bodies,
                &scene.shapes,
                &scene.joints,
                &ManifoldConf::default(),
                &mut NullListener,
            );
            assert_eq!(stats.contacts_updated, 1);
            let (_, contact) = scene.cm.contacts().iter().next().unwrap();
            assert!(contact.is_touching());

            // Move the ball away and refit its leaf.
            scene.bodies[ball.0].set_transform(Vec2::new(10.0, 0.0), 0.0);
            let xf2 = scene.bodies[ball.0].xf;
            let moved = scene.cm.synchronize(&scene.shapes[ball_shape.0], &xf2, &xf2, 0.1, 2.0);
            assert_eq!(moved, 1);
            let stats = scene.cm.collide(
                &mut scene.bodies,
                &scene.shapes,
                &scene.joints,
                &ManifoldConf::default(),
                &mut NullListener,
            );
            assert_eq!(stats.contacts_destroyed, 1);
            assert!(scene.cm.contacts().empty());
            assert!(scene.bodies[ball.0].contacts().is_empty());
        }

        #[test]
        fn test_filtering() {
            let mut scene = Scene::new();
            scene.add(BodyType::Static, Vec2::new(0.0, 0.0), ShapeConf::new(Geometry::disk(1.0)));
            scene.add(BodyType::Kinematic, Vec2::new(0.5, 0.0), ShapeConf::new(Geometry::disk(1.0)));
            let solo = ShapeConf {
                filter: Filter { group_index: -1, ..Filter::default() },
                ..ShapeConf::new(Geometry::disk(1.0))
            };
            scene.add(BodyType::Dynamic, Vec2::new(0.0, 0.5), solo.clone());
            scene.add(BodyType::Dynamic, Vec2::new(0.5, 0.5), solo);
            // Static/kinematic never collide and the two dynamic disks share
            // a negative group, leaving the four dynamic vs non-dynamic pairs.
            assert_eq!(scene.find(), (4, 2));
        }
    }
}
