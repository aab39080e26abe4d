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

use cgmath::{InnerSpace, Zero};
use serde::{Deserialize, Serialize};

use crate::id::{ContactId, JointId, ShapeId};
use crate::math::*;
use crate::shape::{Inertia, Shape};

/// How a body takes part in the simulation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyType {
    /// Zero velocity, infinite mass. Never moved by the solver.
    Static,
    /// Moves with a user set velocity, infinite mass.
    Kinematic,
    /// Fully simulated.
    Dynamic,
}

/// Parameters for creating a body.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BodyConf {
    pub body_type: BodyType,
    pub position: Vec2,
    pub angle: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub allow_sleep: bool,
    pub awake: bool,
    pub fixed_rotation: bool,
    /// Bullets get continuous collision against dynamic bodies too.
    pub bullet: bool,
}

impl BodyConf {
    pub fn new(body_type: BodyType, position: Vec2) -> Self {
        BodyConf {
            body_type,
            position,
            ..BodyConf::default()
        }
    }

    pub fn dynamic(position: Vec2) -> Self {
        BodyConf::new(BodyType::Dynamic, position)
    }

    pub fn fixed(position: Vec2) -> Self {
        BodyConf::new(BodyType::Static, position)
    }
}

impl Default for BodyConf {
    fn default() -> Self {
        BodyConf {
            body_type: BodyType::Static,
            position: Vec2::zero(),
            angle: 0.0,
            linear_velocity: Vec2::zero(),
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            allow_sleep: true,
            awake: true,
            fixed_rotation: false,
            bullet: false,
        }
    }
}

/// A rigid body. Bodies are owned by a `World` and addressed by `BodyId`.
#[derive(Clone, Debug)]
pub struct Body {
    pub(crate) body_type: BodyType,
    pub(crate) xf: Transform,
    pub(crate) sweep: Sweep,
    pub(crate) linear_velocity: Vec2,
    pub(crate) angular_velocity: f32,
    pub(crate) force: Vec2,
    pub(crate) torque: f32,
    pub(crate) mass: f32,
    pub(crate) inv_mass: f32,
    /// Rotational inertia about the center of mass.
    pub(crate) inertia: f32,
    pub(crate) inv_inertia: f32,
    pub(crate) linear_damping: f32,
    pub(crate) angular_damping: f32,
    pub(crate) sleep_time: f32,
    pub(crate) awake: bool,
    pub(crate) allow_sleep: bool,
    pub(crate) bullet: bool,
    pub(crate) fixed_rotation: bool,
    pub(crate) island_flag: bool,
    /// Position in the island being solved.
    pub(crate) island_index: usize,
    pub(crate) shapes: Vec<ShapeId>,
    pub(crate) joints: Vec<JointId>,
    pub(crate) contacts: Vec<ContactId>,
}

impl Body {
    pub(crate) fn new(conf: &BodyConf) -> Self {
        let xf = Transform::new(conf.position, conf.angle);
        let speedable = conf.body_type != BodyType::Static;
        let mut body = Body {
            body_type: conf.body_type,
            xf,
            sweep: Sweep::new(&xf, Vec2::zero()),
            linear_velocity: if speedable { conf.linear_velocity } else { Vec2::zero() },
            angular_velocity: if speedable { conf.angular_velocity } else { 0.0 },
            force: Vec2::zero(),
            torque: 0.0,
            mass: 0.0,
            inv_mass: 0.0,
            inertia: 0.0,
            inv_inertia: 0.0,
            linear_damping: conf.linear_damping,
            angular_damping: conf.angular_damping,
            sleep_time: 0.0,
            awake: conf.awake && speedable,
            allow_sleep: conf.allow_sleep,
            bullet: conf.bullet,
            fixed_rotation: conf.fixed_rotation,
            island_flag: false,
            island_index: 0,
            shapes: Vec::new(),
            joints: Vec::new(),
            contacts: Vec::new(),
        };
        if body.body_type == BodyType::Dynamic {
            body.mass = 1.0;
            body.inv_mass = 1.0;
        }
        body
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn transform(&self) -> Transform {
        self.xf
    }

    /// Position of the body origin.
    pub fn position(&self) -> Vec2 {
        self.xf.p
    }

    pub fn angle(&self) -> f32 {
        self.sweep.a
    }

    pub fn world_center(&self) -> Vec2 {
        self.sweep.c
    }

    pub fn local_center(&self) -> Vec2 {
        self.sweep.local_center
    }

    pub fn sweep(&self) -> &Sweep {
        &self.sweep
    }

    pub fn linear_velocity(&self) -> Vec2 {
        self.linear_velocity
    }

    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn inv_mass(&self) -> f32 {
        self.inv_mass
    }

    /// Rotational inertia about the center of mass.
    pub fn inertia(&self) -> f32 {
        self.inertia
    }

    pub fn inv_inertia(&self) -> f32 {
        self.inv_inertia
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    pub fn is_bullet(&self) -> bool {
        self.bullet
    }

    pub fn is_sleeping_allowed(&self) -> bool {
        self.allow_sleep
    }

    pub fn is_fixed_rotation(&self) -> bool {
        self.fixed_rotation
    }

    /// Kinematic and dynamic bodies can have a velocity.
    pub fn is_speedable(&self) -> bool {
        self.body_type != BodyType::Static
    }

    /// Only dynamic bodies respond to forces and impulses.
    pub fn is_accelerable(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    /// Bullets and bodies with infinite mass get continuous collision.
    pub fn is_impenetrable(&self) -> bool {
        self.bullet || self.body_type != BodyType::Dynamic
    }

    /// Awake and able to move.
    pub fn is_active(&self) -> bool {
        self.awake && self.is_speedable()
    }

    pub fn shapes(&self) -> &[ShapeId] {
        &self.shapes
    }

    pub fn joints(&self) -> &[JointId] {
        &self.joints
    }

    pub fn contacts(&self) -> &[ContactId] {
        &self.contacts
    }

    /// Velocity of a world point attached to this body.
    pub fn velocity_at(&self, world_point: Vec2) -> Vec2 {
        self.linear_velocity + cross_sv(self.angular_velocity, world_point - self.sweep.c)
    }

    pub(crate) fn set_awake(&mut self, flag: bool) {
        if flag {
            if !self.awake && self.is_speedable() {
                self.awake = true;
                self.sleep_time = 0.0;
            }
        } else {
            self.awake = false;
            self.sleep_time = 0.0;
            self.linear_velocity = Vec2::zero();
            self.angular_velocity = 0.0;
            self.force = Vec2::zero();
            self.torque = 0.0;
        }
    }

    pub(crate) fn set_transform(&mut self, position: Vec2, angle: f32) {
        self.xf = Transform::new(position, angle);
        self.sweep.c = self.xf.apply(self.sweep.local_center);
        self.sweep.a = angle;
        self.sweep.c0 = self.sweep.c;
        self.sweep.a0 = angle;
        self.sweep.alpha0 = 0.0;
    }

    /// Recompute the transform from the end of the sweep.
    pub(crate) fn synchronize_transform(&mut self) {
        let q = Rot::new(self.sweep.a);
        self.xf = Transform {
            p: self.sweep.c - q.rotate(self.sweep.local_center),
            q,
        };
    }

    /// Move the body to a fraction of the step, discarding the rest of its
    /// motion.
    pub(crate) fn advance(&mut self, alpha: f32) {
        self.sweep.advance(alpha);
        self.sweep.c = self.sweep.c0;
        self.sweep.a = self.sweep.a0;
        self.synchronize_transform();
    }

    /// Recompute mass, center of mass and inertia from attached shapes.
    /// Shapes with zero density do not contribute.
    pub(crate) fn reset_mass_data<'a, I>(&mut self, shapes: I)
    where
        I: IntoIterator<Item = &'a Shape>,
    {
        self.mass = 0.0;
        self.inv_mass = 0.0;
        self.inertia = 0.0;
        self.inv_inertia = 0.0;
        self.sweep.local_center = Vec2::zero();

        if self.body_type != BodyType::Dynamic {
            self.sweep.c0 = self.xf.p;
            self.sweep.c = self.xf.p;
            self.sweep.a0 = self.sweep.a;
            return;
        }

        let mut local_center = Vec2::zero();
        let mut rot_inertia = 0.0;
        for shape in shapes {
            if shape.density == 0.0 {
                continue;
            }
            let md = shape.geometry.mass_data(shape.density);
            self.mass += md.mass;
            local_center += md.center * md.mass;
            rot_inertia += md.inertia;
        }

        if self.mass > 0.0 {
            self.inv_mass = 1.0 / self.mass;
            local_center *= self.inv_mass;
        } else {
            // Dynamic bodies always get some mass.
            self.mass = 1.0;
            self.inv_mass = 1.0;
        }

        if rot_inertia > 0.0 && !self.fixed_rotation {
            // Shift inertia to the center of mass.
            self.inertia = rot_inertia - self.mass * local_center.magnitude2();
            self.inv_inertia = 1.0 / self.inertia;
        }

        let old_center = self.sweep.c;
        self.sweep.local_center = local_center;
        self.sweep.c = self.xf.apply(local_center);
        self.sweep.c0 = self.sweep.c;

        self.linear_velocity += cross_sv(self.angular_velocity, self.sweep.c - old_center);
    }
}

#[cfg(test)]
mod tests {
    mod body {
        use approx::assert_relative_eq;
        use cgmath::Zero;

        use crate::body::*;
        use crate::id::BodyId;
        use crate::math::*;
        use crate::shape::{Geometry, Polygon, Shape, ShapeConf};

        fn shape(geometry: Geometry, density: f32) -> Shape {
            Shape::new(BodyId(0), ShapeConf { density, ..ShapeConf::new(geometry) })
        }

        #[test]
        fn test_mass_data() {
            let mut body = Body::new(&BodyConf::dynamic(Vec2::new(1.0, 2.0)));
            let disk = shape(Geometry::disk(1.0), 1.0);
            body.reset_mass_data(vec![&disk]);
            assert_relative_eq!(body.mass(), std::f32::consts::PI, epsilon = 1.0e-5);
            assert_relative_eq!(body.inertia(), 0.5 * std::f32::consts::PI, epsilon = 1.0e-5);
            assert_relative_eq!(body.world_center().x, 1.0);
            assert_relative_eq!(body.world_center().y, 2.0);

            // An off center box moves the center of mass.
            let offset = shape(Geometry::Polygon(Polygon::new_oriented_box(0.5, 0.5, Vec2::new(2.0, 0.0), 0.0)), 1.0);
            let mut body = Body::new(&BodyConf::dynamic(Vec2::zero()));
            body.reset_mass_data(vec![&offset]);
            assert_relative_eq!(body.local_center().x, 2.0, epsilon = 1.0e-5);
            assert_relative_eq!(body.inertia(), 1.0 / 6.0, epsilon = 1.0e-4);
        }

        #[test]
        fn test_massless_dynamic() {
            let mut body = Body::new(&BodyConf::dynamic(Vec2::zero()));
            let ghost = shape(Geometry::disk(1.0), 0.0);
            body.reset_mass_data(vec![&ghost]);
            assert_eq!(body.mass(), 1.0);
            assert_eq!(body.inv_inertia(), 0.0);

            let mut fixed = Body::new(&BodyConf::fixed(Vec2::zero()));
            fixed.reset_mass_data(vec![&ghost]);
            assert_eq!(fixed.inv_mass(), 0.0);
            assert!(!fixed.is_awake());
            assert!(fixed.is_impenetrable());
        }

        #[test]
        fn test_advance() {
            let mut body = Body::new(&BodyConf::dynamic(Vec2::zero()));
            body.sweep.c = Vec2::new(4.0, 0.0);
            body.sweep.a = 1.0;
            body.advance(0.25);
            assert_relative_eq!(body.position().x, 1.0);
            assert_relative_eq!(body.angle(), 0.25);
            assert_relative_eq!(body.sweep().alpha0, 0.25);
        }

        #[test]
        fn test_sleep_clears_motion() {
            let mut body = Body::new(&BodyConf {
                linear_velocity: Vec2::new(1.0, 0.0),
                ..BodyConf::dynamic(Vec2::zero())
            });
            assert!(body.is_active());
            body.set_awake(false);
            assert!(!body.is_active());
            assert_eq!(body.linear_velocity(), Vec2::zero());
            body.set_awake(true);
            assert!(body.is_awake());
        }
    }
}
