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

use crate::body::Body;
use crate::collision::{collide_shapes, ManifoldConf};
use crate::distance::test_overlap;
use crate::id::{Contactable, ContactId};
use crate::listener::ContactListener;
use crate::manifold::{Manifold, WorldManifold};
use crate::math::Transform;
use crate::shape::{mix_friction, mix_restitution, Shape};

/// A potential or actual touch between two shape children whose fattened
/// bounds overlap in the broad phase.
#[derive(Clone, Debug)]
pub struct Contact {
    pub(crate) a: Contactable,
    pub(crate) b: Contactable,
    pub(crate) manifold: Manifold,
    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    pub(crate) tangent_speed: f32,
    pub(crate) touching: bool,
    pub(crate) enabled: bool,
    pub(crate) sensor: bool,
    pub(crate) impenetrable: bool,
    pub(crate) needs_filtering: bool,
    pub(crate) needs_updating: bool,
    pub(crate) island_flag: bool,
    /// Cached time of impact as a fraction of the step, if still valid.
    pub(crate) toi: Option<f32>,
    /// Number of time of impact resolutions this step.
    pub(crate) toi_count: usize,
}

impl Contact {
    pub(crate) fn new(
        a: Contactable,
        shape_a: &Shape,
        body_a: &Body,
        b: Contactable,
        shape_b: &Shape,
        body_b: &Body,
    ) -> Self {
        Contact {
            a,
            b,
            manifold: Manifold::new(),
            friction: mix_friction(shape_a.friction, shape_b.friction),
            restitution: mix_restitution(shape_a.restitution, shape_b.restitution),
            tangent_speed: 0.0,
            touching: false,
            enabled: true,
            sensor: shape_a.is_sensor || shape_b.is_sensor,
            impenetrable: body_a.is_impenetrable() || body_b.is_impenetrable(),
            needs_filtering: false,
            needs_updating: true,
            island_flag: false,
            toi: None,
            toi_count: 0,
        }
    }

    pub fn contactable_a(&self) -> Contactable {
        self.a
    }

    pub fn contactable_b(&self) -> Contactable {
        self.b
    }

    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    /// World space view of the manifold.
    pub fn world_manifold(&self, xf_a: &Transform, r_a: f32, xf_b: &Transform, r_b: f32) -> WorldManifold {
        WorldManifold::new(&self.manifold, xf_a, r_a, xf_b, r_b)
    }

    pub fn is_touching(&self) -> bool {
        self.touching
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disable the contact for the current step. Meant to be called from
    /// `ContactListener::pre_solve`; updating the contact enables it again.
    pub fn set_enabled(&mut self, flag: bool) {
        self.enabled = flag;
    }

    pub fn is_sensor(&self) -> bool {
        self.sensor
    }

    pub fn is_impenetrable(&self) -> bool {
        self.impenetrable
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    pub fn set_friction(&mut self, friction: f32) {
        self.friction = friction;
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    pub fn set_restitution(&mut self, restitution: f32) {
        self.restitution = restitution;
    }

    pub fn tangent_speed(&self) -> f32 {
        self.tangent_speed
    }

    /// Surface speed along the tangent, for conveyor belts.
    pub fn set_tangent_speed(&mut self, speed: f32) {
        self.tangent_speed = speed;
    }

    pub fn toi(&self) -> Option<f32> {
        self.toi
    }

    pub fn toi_count(&self) -> usize {
        self.toi_count
    }

    pub fn needs_updating(&self) -> bool {
        self.needs_updating
    }

    pub fn needs_filtering(&self) -> bool {
        self.needs_filtering
    }

    /// True if the contact joins the given pair, in either order.
    pub fn joins(&self, a: &Contactable, b: &Contactable) -> bool {
        (self.a == *a && self.b == *b) || (self.a == *b && self.b == *a)
    }

    /// Recompute the manifold, carrying impulses over to points with matching
    /// features, and notify the listener of touch transitions. Returns
    /// whether the contact was touching before and after.
    pub(crate) fn update(
        &mut self,
        id: ContactId,
        shape_a: &Shape,
        xf_a: &Transform,
        shape_b: &Shape,
        xf_b: &Transform,
        conf: &ManifoldConf,
        listener: &mut dyn ContactListener,
    ) -> (bool, bool) {
        let old_manifold = mem::replace(&mut self.manifold, Manifold::new());
        self.enabled = true;
        self.needs_updating = false;

        let was_touching = self.touching;
        let proxy_a = shape_a.geometry.proxy(self.a.child);
        let proxy_b = shape_b.geometry.proxy(self.b.child);

        let touching = if self.sensor {
            // Sensors only report overlap.
            test_overlap(&proxy_a, xf_a, &proxy_b, xf_b)
        } else {
            let mut manifold = collide_shapes(&proxy_a, xf_a, &proxy_b, xf_b, conf);
            manifold.match_impulses(&old_manifold);
            self.manifold = manifold;
            self.manifold.point_count() > 0
        };
        self.touching = touching;

        if !was_touching && touching {
            listener.begin_contact(id, self);
        }
        if was_touching && !touching {
            listener.end_contact(id, self);
        }
        if !self.sensor && touching {
            listener.pre_solve(id, self, &old_manifold);
        }
        (was_touching, touching)
    }
}

#[cfg(test)]
mod tests {
    mod contact {
        use cgmath::Zero;

        use crate::body::{Body, BodyConf};
        use crate::collision::ManifoldConf;
        use crate::contact::*;
        use crate::id::*;
        use crate::listener::ContactListener;
        use crate::manifold::Manifold;
        use crate::math::*;
        use crate::shape::{Geometry, Polygon, Shape, ShapeConf};

        #[derive(Default)]
        struct Recorder {
            begun: usize,
            ended: usize,
            pre_solved: usize,
            disable: bool,
        }

        impl ContactListener for Recorder {
            fn begin_contact(&mut self, _id: ContactId, _contact: &Contact) {
                self.begun += 1;
            }

            fn end_contact(&mut self, _id: ContactId, _contact: &Contact) {
                self.ended += 1;
            }

            fn pre_solve(&mut self, _id: ContactId, contact: &mut Contact, _old: &Manifold) {
                self.pre_solved += 1;
                if self.disable {
                    contact.set_enabled(false);
                }
            }
        }

        fn setup(sensor: bool) -> (Contact, Shape, Shape) {
            let body_a = Body::new(&BodyConf::fixed(Vec2::zero()));
            let body_b = Body::new(&BodyConf::dynamic(Vec2::zero()));
            let shape_a = Shape::new(BodyId(0), ShapeConf::new(Geometry::Polygon(Polygon::new_box(1.0, 1.0))));
            let shape_b = Shape::new(
                BodyId(1),
                ShapeConf {
                    friction: 0.8,
                    restitution: 0.5,
                    is_sensor: sensor,
                    ..ShapeConf::new(Geometry::disk(0.5))
                },
            );
            let a = Contactable { body: BodyId(0), shape: ShapeId(0), child: 0 };
            let b = Contactable { body: BodyId(1), shape: ShapeId(1), child: 0 };
            let contact = Contact::new(a, &shape_a, &body_a, b, &shape_b, &body_b);
            (contact, shape_a, shape_b)
        }

        #[test]
        fn test_transitions() {
            let (mut contact, shape_a, shape_b) = setup(false);
            assert!(contact.is_impenetrable());
            assert!(!contact.is_sensor());
            assert!((contact.friction() - (0.2f32 * 0.8).sqrt()).abs() < 1.0e-6);
            assert_eq!(contact.restitution(), 0.5);

            let conf = ManifoldConf::default();
            let mut rec = Recorder::default();
            let xf_a = Transform::identity();
            let near = Transform::new(Vec2::new(1.4, 0.0), 0.0);
            let far = Transform::new(Vec2::new(3.0, 0.0), 0.0);

            assert_eq!(contact.update(ContactId(0), &shape_a, &xf_a, &shape_b, &near, &conf, &mut rec), (false, true));
            assert_eq!(rec.begun, 1);
            assert_eq!(rec.pre_solved, 1);
            assert!(!contact.needs_updating());

            contact.update(ContactId(0), &shape_a, &xf_a, &shape_b, &near, &conf, &mut rec);
            assert_eq!(rec.begun, 1);
            assert_eq!(rec.pre_solved, 2);

            assert_eq!(contact.update(ContactId(0), &shape_a, &xf_a, &shape_b, &far, &conf, &mut rec), (true, false));
            assert_eq!(rec.ended, 1);
            assert_eq!(contact.manifold().point_count(), 0);
        }

        #[test]
        fn test_pre_solve_disables() {
            let (mut contact, shape_a, shape_b) = setup(false);
            let mut rec = Recorder { disable: true, ..Recorder::default() };
            let near = Transform::new(Vec2::new(1.4, 0.0), 0.0);
            contact.update(ContactId(0), &shape_a, &Transform::identity(), &shape_b, &near, &ManifoldConf::default(), &mut rec);
            assert!(contact.is_touching());
            assert!(!contact.is_enabled());
        }

        #[test]
        fn test_sensor() {
            let (mut contact, shape_a, shape_b) = setup(true);
            assert!(contact.is_sensor());
            let mut rec = Recorder::default();
            let near = Transform::new(Vec2::new(1.4, 0.0), 0.0);
            contact.update(ContactId(0), &shape_a, &Transform::identity(), &shape_b, &near, &ManifoldConf::default(), &mut rec);
            assert!(contact.is_touching());
            assert_eq!(contact.manifold().point_count(), 0);
            assert_eq!(rec.begun, 1);
            assert_eq!(rec.pre_solved, 0);
        }
    }
}
