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

use std::f32;
use std::ops::{Deref, DerefMut};

use cgmath::{InnerSpace, Zero};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use crate::body::{Body, BodyConf, BodyType};
use crate::bounds::{RayCastInput, AABB};
use crate::contact::Contact;
use crate::contact_manager::{ContactManager, PairCounts};
use crate::error::WorldError;
use crate::id::*;
use crate::island::Island;
use crate::joint::{Joint, JointConf};
use crate::listener::{ContactListener, NullListener};
use crate::math::*;
use crate::pool::Pool;
use crate::shape::{Filter, Shape, ShapeConf};
use crate::step::*;
use crate::toi::{time_of_impact, ToiState};

/// World wide settings: gravity and arena limits.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConf {
    pub gravity: Vec2,
    pub max_bodies: usize,
    pub max_shapes: usize,
    pub max_joints: usize,
    pub max_contacts: usize,
    /// Limit on broad phase leaves, one per shape child.
    pub max_proxies: usize,
    /// Broad phase margins used for proxies created or moved between steps.
    /// Every step replaces them with the values of its `StepConf`.
    pub aabb_extension: f32,
    pub displace_multiplier: f32,
}

impl Default for WorldConf {
    fn default() -> Self {
        let limit = u16::max_value() as usize;
        WorldConf {
            gravity: Vec2::new(0.0, -10.0),
            max_bodies: limit,
            max_shapes: limit,
            max_joints: limit,
            max_contacts: limit,
            max_proxies: limit,
            aabb_extension: StepConf::default().aabb_extension,
            displace_multiplier: StepConf::default().displace_multiplier,
        }
    }
}

/// A world of bodies, shapes and joints, and the contacts between them.
///
/// Everything in a world is addressed by id. A world is advanced with
/// `step`, during which it is locked: mutating calls made while a step is
/// running fail with `WorldError::Locked`.
#[derive(Clone, Debug)]
pub struct World {
    conf: WorldConf,
    bodies: Pool<Body>,
    shapes: Pool<Shape>,
    joints: Pool<Joint>,
    contact_manager: ContactManager,
    locked: bool,
}

// Holds the world locked for as long as it lives.
struct StepLock<'a> {
    world: &'a mut World,
}

impl<'a> StepLock<'a> {
    fn new(world: &'a mut World) -> Self {
        world.locked = true;
        StepLock { world }
    }
}

impl Drop for StepLock<'_> {
    fn drop(&mut self) {
        self.world.locked = false;
    }
}

impl Deref for StepLock<'_> {
    type Target = World;

    fn deref(&self) -> &World {
        &*self.world
    }
}

impl DerefMut for StepLock<'_> {
    fn deref_mut(&mut self) -> &mut World {
        &mut *self.world
    }
}

impl Default for World {
    fn default() -> Self {
        World::new(WorldConf::default())
    }
}

impl World {
    pub fn new(conf: WorldConf) -> Self {
        World {
            conf,
            bodies: Pool::with_limit(conf.max_bodies),
            shapes: Pool::with_limit(conf.max_shapes),
            joints: Pool::with_limit(conf.max_joints),
            contact_manager: ContactManager::new(conf.max_proxies, conf.max_contacts),
            locked: false,
        }
    }

    pub fn conf(&self) -> &WorldConf {
        &self.conf
    }

    pub fn gravity(&self) -> Vec2 {
        self.conf.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec2) -> Result<(), WorldError> {
        self.check_unlocked()?;
        self.conf.gravity = gravity;
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    fn check_unlocked(&self) -> Result<(), WorldError> {
        if self.locked {
            Err(WorldError::Locked)
        } else {
            Ok(())
        }
    }

    pub fn body(&self, id: BodyId) -> Result<&Body, WorldError> {
        self.bodies.get(id.0).ok_or(WorldError::InvalidId { what: "body", id: id.0 })
    }

    fn body_mut(&mut self, id: BodyId) -> Result<&mut Body, WorldError> {
        self.check_unlocked()?;
        self.bodies.get_mut(id.0).ok_or(WorldError::InvalidId { what: "body", id: id.0 })
    }

    pub fn shape(&self, id: ShapeId) -> Result<&Shape, WorldError> {
        self.shapes.get(id.0).ok_or(WorldError::InvalidId { what: "shape", id: id.0 })
    }

    pub fn joint(&self, id: JointId) -> Result<&Joint, WorldError> {
        self.joints.get(id.0).ok_or(WorldError::InvalidId { what: "joint", id: id.0 })
    }

    pub fn contact(&self, id: ContactId) -> Result<&Contact, WorldError> {
        self.contact_manager
            .contacts
            .get(id.0)
            .ok_or(WorldError::InvalidId { what: "contact", id: id.0 })
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyId, &Body)> {
        self.bodies.iter().map(|(i, b)| (BodyId(i), b))
    }

    pub fn shapes(&self) -> impl Iterator<Item = (ShapeId, &Shape)> {
        self.shapes.iter().map(|(i, s)| (ShapeId(i), s))
    }

    pub fn joints(&self) -> impl Iterator<Item = (JointId, &Joint)> {
        self.joints.iter().map(|(i, j)| (JointId(i), j))
    }

    pub fn contacts(&self) -> impl Iterator<Item = (ContactId, &Contact)> {
        self.contact_manager.contacts.iter().map(|(i, c)| (ContactId(i), c))
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn contact_count(&self) -> usize {
        self.contact_manager.contacts.len()
    }

    /// Number of bodies that are awake and able to move.
    pub fn awake_count(&self) -> usize {
        self.bodies.iter().filter(|(_, b)| b.is_active()).count()
    }

    /// Fattened bounds of a shape child in the broad phase.
    pub fn fat_aabb(&self, shape: ShapeId, child: usize) -> Result<AABB, WorldError> {
        let shape = self.shape(shape)?;
        let leaf = shape
            .proxies
            .get(child)
            .ok_or(WorldError::InvalidArgument("child index out of range"))?;
        Ok(*self.contact_manager.tree.fat_aabb(*leaf))
    }

    /// Height of the broad phase tree.
    pub fn tree_height(&self) -> i32 {
        self.contact_manager.tree.height()
    }

    /// Check the broad phase tree's structural invariants. Panics if any is
    /// broken.
    pub fn validate_tree(&self) {
        self.contact_manager.tree.validate();
    }

    pub fn create_body(&mut self, conf: &BodyConf) -> Result<BodyId, WorldError> {
        self.check_unlocked()?;
        let limit = self.bodies.limit();
        let index = self
            .bodies
            .push(Body::new(conf))
            .map_err(|_| WorldError::CapacityExceeded { what: "body", limit })?;
        Ok(BodyId(index))
    }

    /// Destroy a body with all of its shapes, joints and contacts.
    pub fn destroy_body(&mut self, id: BodyId) -> Result<(), WorldError> {
        let body = self.body_mut(id)?;
        let joints = body.joints.clone();
        let contacts = body.contacts.clone();
        let shapes = body.shapes.clone();

        for jid in joints {
            self.remove_joint(jid);
        }
        for cid in contacts {
            self.contact_manager.destroy(cid, &mut self.bodies, &mut NullListener);
        }
        for sid in shapes {
            let mut shape = self.shapes.remove(sid.0);
            self.contact_manager.destroy_proxies(&mut shape);
        }
        self.bodies.remove(id.0);
        Ok(())
    }

    /// Attach a shape to a body. Its broad phase leaves are created right
    /// away; contacts for it are created on the next step.
    pub fn create_shape(&mut self, body: BodyId, conf: ShapeConf) -> Result<ShapeId, WorldError> {
        self.check_unlocked()?;
        conf.validate()?;
        let xf = self.body(body)?.xf;
        let density = conf.density;

        let limit = self.shapes.limit();
        let index = self
            .shapes
            .push(Shape::new(body, conf))
            .map_err(|_| WorldError::CapacityExceeded { what: "shape", limit })?;
        let id = ShapeId(index);

        let created = self.contact_manager.create_proxies(
            body,
            id,
            &mut self.shapes[index],
            &xf,
            self.conf.aabb_extension,
        );
        if let Err(err) = created {
            self.shapes.remove(index);
            return Err(match err {
                WorldError::CapacityExceeded { .. } => WorldError::CapacityExceeded {
                    what: "proxy",
                    limit: self.conf.max_proxies,
                },
                other => other,
            });
        }

        self.bodies[body.0].shapes.push(id);
        if density > 0.0 {
            self.reset_mass_data(body);
        }
        Ok(id)
    }

    pub fn destroy_shape(&mut self, id: ShapeId) -> Result<(), WorldError> {
        self.check_unlocked()?;
        let body = self.shape(id)?.body;

        let contacts: Vec<ContactId> = self.bodies[body.0]
            .contacts
            .iter()
            .cloned()
            .filter(|&cid| {
                let c = &self.contact_manager.contacts[cid.0];
                c.a.shape == id || c.b.shape == id
            })
            .collect();
        for cid in contacts {
            self.contact_manager.destroy(cid, &mut self.bodies, &mut NullListener);
        }

        let mut shape = self.shapes.remove(id.0);
        self.contact_manager.destroy_proxies(&mut shape);
        self.bodies[body.0].shapes.retain(|&s| s != id);
        self.reset_mass_data(body);
        Ok(())
    }

    fn reset_mass_data(&mut self, id: BodyId) {
        let shapes = &self.shapes;
        let body = &mut self.bodies[id.0];
        let ids = body.shapes.clone();
        body.reset_mass_data(ids.iter().map(|s| &shapes[s.0]));
    }

    pub fn create_joint(&mut self, conf: JointConf) -> Result<JointId, WorldError> {
        self.check_unlocked()?;
        let (a, b) = (conf.body_a, conf.body_b);
        self.body(a)?;
        self.body(b)?;
        if a == b {
            return Err(WorldError::InvalidArgument("joint needs two different bodies"));
        }
        let collide_connected = conf.collide_connected;

        let limit = self.joints.limit();
        let index = self
            .joints
            .push(Joint::new(conf))
            .map_err(|_| WorldError::CapacityExceeded { what: "joint", limit })?;
        let id = JointId(index);
        self.bodies[a.0].joints.push(id);
        self.bodies[b.0].joints.push(id);

        if !collide_connected {
            self.flag_pair_for_filtering(a, b);
        }
        Ok(id)
    }

    pub fn destroy_joint(&mut self, id: JointId) -> Result<(), WorldError> {
        self.check_unlocked()?;
        self.joint(id)?;
        self.remove_joint(id);
        Ok(())
    }

    fn remove_joint(&mut self, id: JointId) {
        let joint = self.joints.remove(id.0);
        for &body in [joint.body_a, joint.body_b].iter() {
            if let Some(body) = self.bodies.get_mut(body.0) {
                body.joints.retain(|&j| j != id);
                body.set_awake(true);
            }
        }
        // The pair may collide again; let the broad phase find it.
        if !joint.collide_connected {
            if let Some(body) = self.bodies.get(joint.body_a.0) {
                for &sid in body.shapes.iter() {
                    self.contact_manager.touch_proxies(&self.shapes[sid.0]);
                }
            }
        }
    }

    fn flag_pair_for_filtering(&mut self, a: BodyId, b: BodyId) {
        for &cid in self.bodies[b.0].contacts.iter() {
            let contact = &mut self.contact_manager.contacts[cid.0];
            if contact.a.body == a || contact.b.body == a {
                contact.needs_filtering = true;
            }
        }
    }

    /// Teleport a body. Its contacts are updated on the next step.
    pub fn set_transform(&mut self, id: BodyId, position: Vec2, angle: f32) -> Result<(), WorldError> {
        self.body_mut(id)?.set_transform(position, angle);
        let xf = self.bodies[id.0].xf;
        for &sid in self.bodies[id.0].shapes.iter() {
            self.contact_manager.synchronize(
                &self.shapes[sid.0],
                &xf,
                &xf,
                self.conf.aabb_extension,
                self.conf.displace_multiplier,
            );
        }
        self.flag_contacts_for_updating(id);
        Ok(())
    }

    fn flag_contacts_for_updating(&mut self, id: BodyId) {
        for &cid in self.bodies[id.0].contacts.iter() {
            self.contact_manager.contacts[cid.0].needs_updating = true;
        }
    }

    pub fn set_linear_velocity(&mut self, id: BodyId, v: Vec2) -> Result<(), WorldError> {
        let body = self.body_mut(id)?;
        if !body.is_speedable() {
            return Ok(());
        }
        if v.magnitude2() > 0.0 {
            body.set_awake(true);
        }
        body.linear_velocity = v;
        Ok(())
    }

    pub fn set_angular_velocity(&mut self, id: BodyId, w: f32) -> Result<(), WorldError> {
        let body = self.body_mut(id)?;
        if !body.is_speedable() {
            return Ok(());
        }
        if w != 0.0 {
            body.set_awake(true);
        }
        body.angular_velocity = w;
        Ok(())
    }

    pub fn set_awake(&mut self, id: BodyId, flag: bool) -> Result<(), WorldError> {
        let body = self.body_mut(id)?;
        if body.is_speedable() {
            body.set_awake(flag);
        }
        Ok(())
    }

    pub fn set_sleeping_allowed(&mut self, id: BodyId, flag: bool) -> Result<(), WorldError> {
        let body = self.body_mut(id)?;
        body.allow_sleep = flag;
        if !flag {
            body.set_awake(true);
        }
        Ok(())
    }

    pub fn set_bullet(&mut self, id: BodyId, flag: bool) -> Result<(), WorldError> {
        self.body_mut(id)?.bullet = flag;
        self.refresh_impenetrable(id);
        Ok(())
    }

    fn refresh_impenetrable(&mut self, id: BodyId) {
        for &cid in self.bodies[id.0].contacts.iter() {
            let contact = &mut self.contact_manager.contacts[cid.0];
            contact.impenetrable =
                self.bodies[contact.a.body.0].is_impenetrable() || self.bodies[contact.b.body.0].is_impenetrable();
        }
    }

    /// Change a body's type. Its contacts are destroyed and found again on
    /// the next step.
    pub fn set_body_type(&mut self, id: BodyId, body_type: BodyType) -> Result<(), WorldError> {
        let body = self.body_mut(id)?;
        if body.body_type == body_type {
            return Ok(());
        }
        body.body_type = body_type;
        self.reset_mass_data(id);

        let body = &mut self.bodies[id.0];
        if body_type == BodyType::Static {
            body.linear_velocity = Vec2::zero();
            body.angular_velocity = 0.0;
            body.sweep.a0 = body.sweep.a;
            body.sweep.c0 = body.sweep.c;
            body.awake = false;
        } else {
            body.set_awake(true);
        }
        body.force = Vec2::zero();
        body.torque = 0.0;

        let contacts = body.contacts.clone();
        for cid in contacts {
            self.contact_manager.destroy(cid, &mut self.bodies, &mut NullListener);
        }
        for &sid in self.bodies[id.0].shapes.iter() {
            self.contact_manager.touch_proxies(&self.shapes[sid.0]);
        }
        Ok(())
    }

    /// Apply a force at a world point. Wakes the body.
    pub fn apply_force(&mut self, id: BodyId, force: Vec2, point: Vec2) -> Result<(), WorldError> {
        let body = self.body_mut(id)?;
        if !body.is_accelerable() {
            return Ok(());
        }
        body.set_awake(true);
        body.force += force;
        body.torque += cross(point - body.sweep.c, force);
        Ok(())
    }

    pub fn apply_force_to_center(&mut self, id: BodyId, force: Vec2) -> Result<(), WorldError> {
        let center = self.body(id)?.sweep.c;
        self.apply_force(id, force, center)
    }

    pub fn apply_torque(&mut self, id: BodyId, torque: f32) -> Result<(), WorldError> {
        let body = self.body_mut(id)?;
        if !body.is_accelerable() {
            return Ok(());
        }
        body.set_awake(true);
        body.torque += torque;
        Ok(())
    }

    /// Apply an impulse at a world point, changing velocity immediately.
    pub fn apply_linear_impulse(&mut self, id: BodyId, impulse: Vec2, point: Vec2) -> Result<(), WorldError> {
        let body = self.body_mut(id)?;
        if !body.is_accelerable() {
            return Ok(());
        }
        body.set_awake(true);
        body.linear_velocity += impulse * body.inv_mass;
        body.angular_velocity += body.inv_inertia * cross(point - body.sweep.c, impulse);
        Ok(())
    }

    pub fn apply_angular_impulse(&mut self, id: BodyId, impulse: f32) -> Result<(), WorldError> {
        let body = self.body_mut(id)?;
        if !body.is_accelerable() {
            return Ok(());
        }
        body.set_awake(true);
        body.angular_velocity += body.inv_inertia * impulse;
        Ok(())
    }

    /// Change a shape's collision filter. Existing contacts are filtered
    /// again on the next step and new pairs may be found.
    pub fn set_filter(&mut self, id: ShapeId, filter: Filter) -> Result<(), WorldError> {
        self.check_unlocked()?;
        let body = self.shape(id)?.body;
        self.shapes[id.0].filter = filter;
        for &cid in self.bodies[body.0].contacts.iter() {
            let contact = &mut self.contact_manager.contacts[cid.0];
            if contact.a.shape == id || contact.b.shape == id {
                contact.needs_filtering = true;
            }
        }
        self.contact_manager.touch_proxies(&self.shapes[id.0]);
        Ok(())
    }

    /// Visit every shape child whose fattened bounds overlap the given box.
    /// Return false from the visitor to stop early.
    pub fn query_aabb<F>(&self, aabb: &AABB, mut visitor: F)
    where
        F: FnMut(Contactable) -> bool,
    {
        let tree = &self.contact_manager.tree;
        tree.query(aabb, |leaf| visitor(*tree.key(leaf)));
    }

    /// Cast a ray from p1 to p2 against every shape. The visitor gets each
    /// hit's shape child, point, normal and fraction along the ray, and
    /// returns the fraction to clip the ray to: zero ends the cast, a
    /// negative value ignores the hit.
    pub fn ray_cast<F>(&self, p1: Vec2, p2: Vec2, mut visitor: F)
    where
        F: FnMut(Contactable, Vec2, Vec2, f32) -> f32,
    {
        let tree = &self.contact_manager.tree;
        let input = RayCastInput::new(p1, p2);
        tree.ray_cast(&input, |sub_input, leaf| {
            let key = *tree.key(leaf);
            let xf = self.bodies[key.body.0].xf;
            match self.shapes[key.shape.0].geometry.ray_cast(sub_input, &xf, key.child) {
                Some(out) => {
                    let point = p1 * (1.0 - out.fraction) + p2 * out.fraction;
                    visitor(key, point, out.normal, out.fraction)
                },
                None => sub_input.max_fraction,
            }
        });
    }

    /// Advance the world by `conf.delta_time` without contact notifications.
    pub fn step(&mut self, conf: &StepConf) -> Result<StepStats, WorldError> {
        self.step_with(conf, &mut NullListener)
    }

    /// Advance the world by `conf.delta_time`, reporting contact events to
    /// the listener. A zero delta time only maintains contacts.
    #[instrument(level = "debug", skip(self, conf, listener), fields(dt = conf.delta_time))]
    pub fn step_with(&mut self, conf: &StepConf, listener: &mut dyn ContactListener) -> Result<StepStats, WorldError> {
        self.check_unlocked()?;
        if !(conf.delta_time >= 0.0) {
            return Err(WorldError::InvalidArgument("delta time must be non-negative"));
        }

        self.conf.aabb_extension = conf.aabb_extension;
        self.conf.displace_multiplier = conf.displace_multiplier;

        let mut world = StepLock::new(self);
        let mut stats = StepStats::default();

        let pairs = world.find_new_contacts(listener);
        stats.pre = world.collide(conf, listener);
        stats.pre.contacts_added = pairs.added;
        stats.pre.contacts_ignored = pairs.ignored;
        stats.pre.contacts_dropped = pairs.dropped;

        if conf.delta_time > 0.0 {
            stats.reg = world.solve_regular(conf, listener);
            if conf.do_toi {
                stats.toi = world.solve_toi(conf, listener);
            }
            for (_, body) in world.bodies.iter_mut() {
                body.force = Vec2::zero();
                body.torque = 0.0;
            }
        }

        debug!(
            contacts = world.contact_count(),
            islands = stats.reg.islands_found,
            sub_steps = stats.toi.sub_steps,
            awake = world.awake_count(),
            "step done"
        );
        Ok(stats)
    }

    fn find_new_contacts(&mut self, listener: &mut dyn ContactListener) -> PairCounts {
        self.contact_manager
            .find_new_contacts(&mut self.bodies, &self.shapes, &self.joints, listener)
    }

    fn collide(&mut self, conf: &StepConf, listener: &mut dyn ContactListener) -> PreStepStats {
        self.contact_manager.collide(
            &mut self.bodies,
            &self.shapes,
            &self.joints,
            &conf.manifold_conf(),
            listener,
        )
    }

    // Refit the body's leaves over its motion this step and mark its
    // contacts for updating. Returns the number of leaves reinserted.
    fn synchronize_body(&mut self, id: BodyId, conf: &StepConf) -> usize {
        let body = &self.bodies[id.0];
        let xf1 = body.sweep.transform_at(0.0);
        let xf2 = body.xf;
        let mut moved = 0;
        for &sid in body.shapes.iter() {
            moved += self.contact_manager.synchronize(
                &self.shapes[sid.0],
                &xf1,
                &xf2,
                conf.aabb_extension,
                conf.displace_multiplier,
            );
        }
        self.flag_contacts_for_updating(id);
        moved
    }

    fn solve_regular(&mut self, conf: &StepConf, listener: &mut dyn ContactListener) -> RegStepStats {
        let mut stats = RegStepStats::default();

        for (_, body) in self.bodies.iter_mut() {
            body.island_flag = false;
        }
        for (_, contact) in self.contact_manager.contacts.iter_mut() {
            contact.island_flag = false;
        }
        for (_, joint) in self.joints.iter_mut() {
            joint.island_flag = false;
        }

        let mut island = Island::new();
        for seed in self.bodies.indices() {
            let body = &self.bodies[seed];
            if body.island_flag || !body.awake || !body.is_speedable() {
                continue;
            }

            island.build(
                BodyId(seed),
                &mut self.bodies,
                &mut self.contact_manager.contacts,
                &mut self.joints,
            );
            stats.islands_found += 1;

            let solved = island.solve(
                &mut self.bodies,
                &mut self.contact_manager.contacts,
                &mut self.joints,
                &self.shapes,
                self.conf.gravity,
                conf,
                listener,
            );
            trace!(
                bodies = island.bodies.len(),
                contacts = island.contacts.len(),
                joints = island.joints.len(),
                solved = solved.solved,
                "island solved"
            );
            if solved.solved {
                stats.islands_solved += 1;
            }
            stats.min_separation = stats.min_separation.min(solved.min_separation);
            stats.max_inc_impulse = stats.max_inc_impulse.max(solved.max_inc_impulse);
            stats.sum_pos_iters += solved.position_iterations;
            stats.sum_vel_iters += solved.velocity_iterations;
            stats.bodies_slept += solved.bodies_slept;

            // Static bodies may anchor other islands too.
            for &id in island.bodies.iter() {
                let body = &mut self.bodies[id.0];
                if !body.is_speedable() {
                    body.island_flag = false;
                }
            }
        }

        for index in self.bodies.indices() {
            let body = &self.bodies[index];
            if !body.island_flag || !body.is_speedable() {
                continue;
            }
            stats.proxies_moved += self.synchronize_body(BodyId(index), conf);
        }

        let pairs = self.find_new_contacts(listener);
        stats.contacts_added = pairs.added;
        stats.contacts_dropped = pairs.dropped;
        stats
    }

    // Find the contact with the earliest time of impact, computing and
    // caching times of impact where needed.
    fn min_toi_contact(&mut self, conf: &StepConf, stats: &mut ToiStepStats) -> Option<(ContactId, f32)> {
        let toi_conf = conf.toi_conf();
        let mut min: Option<(ContactId, f32)> = None;

        for index in self.contact_manager.contacts.indices() {
            let contact = &self.contact_manager.contacts[index];
            if !contact.enabled || contact.toi_count >= conf.max_sub_steps {
                continue;
            }

            let cached = contact.toi;
            let alpha = match cached {
                Some(alpha) => alpha,
                None => {
                    if contact.sensor {
                        continue;
                    }
                    if contact.touching {
                        stats.contacts_skipped_touching += 1;
                        continue;
                    }
                    let (a, b) = (contact.a, contact.b);
                    let (body_a, body_b) = (&self.bodies[a.body.0], &self.bodies[b.body.0]);
                    if !body_a.is_active() && !body_b.is_active() {
                        continue;
                    }
                    if !contact.impenetrable {
                        continue;
                    }

                    // Bring both sweeps to the same start time.
                    let mut alpha0 = body_a.sweep.alpha0;
                    if body_a.sweep.alpha0 < body_b.sweep.alpha0 {
                        alpha0 = body_b.sweep.alpha0;
                        self.bodies[a.body.0].sweep.advance(alpha0);
                    } else if body_b.sweep.alpha0 < body_a.sweep.alpha0 {
                        self.bodies[b.body.0].sweep.advance(alpha0);
                    }

                    let proxy_a = self.shapes[a.shape.0].geometry.proxy(a.child);
                    let proxy_b = self.shapes[b.shape.0].geometry.proxy(b.child);
                    let output = time_of_impact(
                        &proxy_a,
                        &self.bodies[a.body.0].sweep,
                        &proxy_b,
                        &self.bodies[b.body.0].sweep,
                        &toi_conf,
                    );
                    stats.contacts_found += 1;
                    stats.max_dist_iters = stats.max_dist_iters.max(output.max_dist_iters);
                    stats.max_toi_iters = stats.max_toi_iters.max(output.toi_iters);
                    stats.max_root_iters = stats.max_root_iters.max(output.max_root_iters);
                    if output.state == ToiState::Failed {
                        debug!(contact = index, t = output.t, "time of impact search failed");
                    }

                    let alpha = if output.state == ToiState::Touching {
                        (alpha0 + (1.0 - alpha0) * output.t).min(1.0)
                    } else {
                        1.0
                    };
                    self.contact_manager.contacts[index].toi = Some(alpha);
                    alpha
                },
            };

            if alpha < min.map_or(1.0, |(_, a)| a) {
                min = Some((ContactId(index), alpha));
            }
        }
        min
    }

    // Resolve impacts in time order until none are left before the end of
    // the step or every contact has used its sub step budget.
    fn solve_toi(&mut self, conf: &StepConf, listener: &mut dyn ContactListener) -> ToiStepStats {
        let mut stats = ToiStepStats::default();

        for (_, body) in self.bodies.iter_mut() {
            body.island_flag = false;
            body.sweep.alpha0 = 0.0;
        }
        for (_, contact) in self.contact_manager.contacts.iter_mut() {
            contact.island_flag = false;
            contact.toi = None;
            contact.toi_count = 0;
        }

        let manifold_conf = conf.manifold_conf();
        let mut island = Island::new();
        loop {
            let (cid, alpha) = match self.min_toi_contact(conf, &mut stats) {
                Some((cid, alpha)) if alpha < 1.0 - 10.0 * f32::EPSILON => (cid, alpha),
                _ => break,
            };

            let (a, b) = {
                let contact = &self.contact_manager.contacts[cid.0];
                (contact.a.body, contact.b.body)
            };
            let backup_a = self.bodies[a.0].sweep;
            let backup_b = self.bodies[b.0].sweep;
            self.bodies[a.0].advance(alpha);
            self.bodies[b.0].advance(alpha);

            let touching =
                self.contact_manager
                    .update_contact(cid, &mut self.bodies, &self.shapes, &manifold_conf, listener);
            stats.contacts_updated_toi += 1;
            let contact = &mut self.contact_manager.contacts[cid.0];
            contact.toi = None;
            contact.toi_count += 1;
            if contact.toi_count == conf.max_sub_steps {
                stats.contacts_at_max_sub_steps += 1;
                debug!(contact = cid.0, "contact reached its sub step budget");
            }

            if !contact.enabled || !touching {
                // A false positive. Rewind and keep the contact out of the
                // rest of this step.
                contact.enabled = false;
                for &(id, backup) in [(a, backup_a), (b, backup_b)].iter() {
                    let body = &mut self.bodies[id.0];
                    body.sweep = backup;
                    body.synchronize_transform();
                }
                continue;
            }
            contact.island_flag = true;

            self.bodies[a.0].set_awake(true);
            self.bodies[b.0].set_awake(true);

            island.clear();
            island.bodies.push(a);
            island.bodies.push(b);
            island.contacts.push(cid);
            self.bodies[a.0].island_flag = true;
            self.bodies[b.0].island_flag = true;
            self.gather_toi_neighbors(&mut island, a, alpha, conf, &mut stats, listener);
            self.gather_toi_neighbors(&mut island, b, alpha, conf, &mut stats, listener);
            stats.islands_found += 1;

            let sub_dt = (1.0 - alpha) * conf.delta_time;
            let solved = island.solve_toi(
                &mut self.bodies,
                &self.contact_manager.contacts,
                &self.shapes,
                0,
                1,
                sub_dt,
                conf,
                listener,
            );
            if solved.solved {
                stats.islands_solved += 1;
            }
            stats.sub_steps += 1;
            stats.min_separation = stats.min_separation.min(solved.min_separation);
            stats.max_inc_impulse = stats.max_inc_impulse.max(solved.max_inc_impulse);
            stats.sum_pos_iters += solved.position_iterations;
            stats.sum_vel_iters += solved.velocity_iterations;

            // Bodies in the island moved, so their cached times of impact no
            // longer hold.
            for &id in island.bodies.iter() {
                self.bodies[id.0].island_flag = false;
                if !self.bodies[id.0].is_speedable() {
                    continue;
                }
                stats.proxies_moved += self.synchronize_body(id, conf);
                for &c in self.bodies[id.0].contacts.iter() {
                    let contact = &mut self.contact_manager.contacts[c.0];
                    contact.toi = None;
                    contact.island_flag = false;
                }
            }

            let pairs = self.find_new_contacts(listener);
            stats.contacts_added += pairs.added;
            stats.contacts_dropped += pairs.dropped;
        }
        stats
    }

    // Add the touching contacts of a body at the impact to a time of impact
    // island, advancing the bodies on their other side to the impact time.
    fn gather_toi_neighbors(
        &mut self,
        island: &mut Island,
        id: BodyId,
        alpha: f32,
        conf: &StepConf,
        stats: &mut ToiStepStats,
        listener: &mut dyn ContactListener,
    ) {
        if !self.bodies[id.0].is_accelerable() {
            return;
        }
        let manifold_conf = conf.manifold_conf();
        let contacts = self.bodies[id.0].contacts.clone();
        for cid in contacts {
            let contact = &self.contact_manager.contacts[cid.0];
            if contact.island_flag || contact.sensor {
                continue;
            }
            let other = if contact.a.body == id { contact.b.body } else { contact.a.body };

            // Only bullets get continuous collision against dynamic bodies.
            if self.bodies[other.0].is_accelerable() && !self.bodies[id.0].bullet && !self.bodies[other.0].bullet {
                continue;
            }

            let backup = self.bodies[other.0].sweep;
            if !self.bodies[other.0].island_flag {
                self.bodies[other.0].advance(alpha);
            }

            let touching =
                self.contact_manager
                    .update_contact(cid, &mut self.bodies, &self.shapes, &manifold_conf, listener);
            stats.contacts_updated_touching += 1;

            if !self.contact_manager.contacts[cid.0].enabled || !touching {
                let body = &mut self.bodies[other.0];
                body.sweep = backup;
                body.synchronize_transform();
                continue;
            }

            self.contact_manager.contacts[cid.0].island_flag = true;
            island.contacts.push(cid);

            let body = &mut self.bodies[other.0];
            if body.island_flag {
                continue;
            }
            body.island_flag = true;
            body.set_awake(true);
            island.bodies.push(other);
        }
    }
}

#[cfg(test)]
mod tests {
    mod world {
        use approx::assert_relative_eq;
        use cgmath::Zero;

        use crate::body::{BodyConf, BodyType};
        use crate::bounds::AABB;
        use crate::error::WorldError;
        use crate::joint::{JointConf, JointKind, RopeJoint};
        use crate::math::*;
        use crate::shape::{Geometry, Polygon, ShapeConf};
        use crate::step::StepConf;
        use crate::world::*;

        fn disk(density: f32) -> ShapeConf {
            ShapeConf { density, ..ShapeConf::new(Geometry::disk(0.5)) }
        }

        #[test]
        fn test_entities() {
            let mut world = World::default();
            let body = world.create_body(&BodyConf::dynamic(Vec2::new(0.0, 2.0))).unwrap();
            let shape = world.create_shape(body, disk(1.0)).unwrap();
            assert_eq!(world.body_count(), 1);
            assert_eq!(world.shape(shape).unwrap().body(), body);
            assert_relative_eq!(world.body(body).unwrap().mass(), 0.25 * std::f32::consts::PI, epsilon = 1.0e-5);
            assert!(world.fat_aabb(shape, 0).unwrap().lower.y < 1.5);

            world.destroy_body(body).unwrap();
            assert_eq!(world.body_count(), 0);
            assert_eq!(world.shape_count(), 0);
            assert_eq!(
                world.body(body).unwrap_err(),
                WorldError::InvalidId { what: "body", id: body.index() }
            );
            assert!(world.create_shape(body, disk(1.0)).is_err());
        }

        #[test]
        fn test_capacity() {
            let mut world = World::new(WorldConf { max_bodies: 1, max_proxies: 1, ..WorldConf::default() });
            let body = world.create_body(&BodyConf::dynamic(Vec2::zero())).unwrap();
            assert_eq!(
                world.create_body(&BodyConf::dynamic(Vec2::zero())),
                Err(WorldError::CapacityExceeded { what: "body", limit: 1 })
            );
            world.create_shape(body, disk(1.0)).unwrap();
            match world.create_shape(body, disk(1.0)) {
                Err(WorldError::CapacityExceeded { what: "proxy", .. }) => (),
                other => panic!("unexpected {:?}", other),
            }
            // The failed shape left nothing behind.
            assert_eq!(world.shape_count(), 1);
            assert_eq!(world.body(body).unwrap().shapes().len(), 1);
            world.validate_tree();
        }

        #[test]
        fn test_full_contact_pool_is_reported() {
            let mut world = World::new(WorldConf { max_contacts: 1, ..WorldConf::default() });
            for &x in [0.0, 0.5, 1.0].iter() {
                let body = world.create_body(&BodyConf::dynamic(Vec2::new(x, 0.0))).unwrap();
                world.create_shape(body, disk(1.0)).unwrap();
            }
            let stats = world.step(&StepConf::with_delta_time(0.0)).unwrap();
            assert_eq!(stats.pre.contacts_added, 1);
            assert_eq!(stats.pre.contacts_dropped, 2);
            assert_eq!(stats.pre.contacts_ignored, 0);
            assert_eq!(world.contact_count(), 1);
        }

        #[test]
        fn test_proxy_margins_follow_conf() {
            let mut world = World::new(WorldConf { aabb_extension: 0.5, ..WorldConf::default() });
            let body = world.create_body(&BodyConf::dynamic(Vec2::zero())).unwrap();
            let shape = world.create_shape(body, disk(1.0)).unwrap();
            assert_relative_eq!(world.fat_aabb(shape, 0).unwrap().lower.x, -1.0, epsilon = 1.0e-5);

            // A step adopts its own margins for later edits.
            let conf = StepConf { aabb_extension: 0.3, ..StepConf::with_delta_time(0.0) };
            world.step(&conf).unwrap();
            assert_relative_eq!(world.conf().aabb_extension, 0.3);
            world.set_transform(body, Vec2::new(10.0, 0.0), 0.0).unwrap();
            assert_relative_eq!(world.fat_aabb(shape, 0).unwrap().lower.x, 9.2, epsilon = 1.0e-5);
        }

        #[test]
        fn test_invalid_geometry() {
            let mut world = World::default();
            let body = world.create_body(&BodyConf::dynamic(Vec2::zero())).unwrap();
            let bad = ShapeConf::new(Geometry::disk(-1.0));
            assert!(matches!(world.create_shape(body, bad), Err(WorldError::InvalidArgument(_))));
            assert_eq!(world.shape_count(), 0);
        }

        #[test]
        fn test_free_fall() {
            let mut world = World::default();
            let body = world.create_body(&BodyConf::dynamic(Vec2::zero())).unwrap();
            world.create_shape(body, disk(1.0)).unwrap();
            let conf = StepConf::default();
            for _ in 0..60 {
                world.step(&conf).unwrap();
            }
            let b = world.body(body).unwrap();
            assert_relative_eq!(b.linear_velocity().y, -10.0, epsilon = 1.0e-3);
            // Symplectic Euler runs slightly ahead of the exact -5.
            assert!(b.position().y < -5.0 && b.position().y > -5.2);
        }

        #[test]
        fn test_zero_dt_registers_contacts() {
            let mut world = World::default();
            let ground = world.create_body(&BodyConf::fixed(Vec2::zero())).unwrap();
            world
                .create_shape(ground, ShapeConf::new(Geometry::Polygon(Polygon::new_box(5.0, 0.5))))
                .unwrap();
            let body = world.create_body(&BodyConf::dynamic(Vec2::new(0.0, 0.9))).unwrap();
            world.create_shape(body, disk(1.0)).unwrap();

            let stats = world.step(&StepConf::with_delta_time(0.0)).unwrap();
            assert_eq!(stats.pre.contacts_added, 1);
            assert_eq!(stats.pre.contacts_updated, 1);
            assert_eq!(stats.reg.islands_found, 0);
            assert_eq!(world.contact_count(), 1);
            assert!(world.contacts().all(|(_, c)| c.is_touching()));
            assert_relative_eq!(world.body(body).unwrap().position().y, 0.9);
        }

        #[test]
        fn test_joint_blocks_collision() {
            let mut world = World::default();
            let a = world.create_body(&BodyConf::dynamic(Vec2::zero())).unwrap();
            let b = world.create_body(&BodyConf::dynamic(Vec2::new(0.5, 0.0))).unwrap();
            world.create_shape(a, disk(1.0)).unwrap();
            world.create_shape(b, disk(1.0)).unwrap();
            let rope = JointKind::Rope(RopeJoint::new(Vec2::zero(), Vec2::zero(), 1.0));
            let joint = world.create_joint(JointConf::new(a, b, rope)).unwrap();

            let stats = world.step(&StepConf::with_delta_time(0.0)).unwrap();
            assert_eq!(stats.pre.contacts_ignored, 1);
            assert_eq!(world.contact_count(), 0);

            world.destroy_joint(joint).unwrap();
            world.step(&StepConf::with_delta_time(0.0)).unwrap();
            assert_eq!(world.contact_count(), 1);
            assert!(world.body(a).unwrap().joints().is_empty());
        }

        #[test]
        fn test_queries() {
            let mut world = World::default();
            let body = world.create_body(&BodyConf::fixed(Vec2::new(3.0, 0.0))).unwrap();
            let shape = world
                .create_shape(body, ShapeConf::new(Geometry::Polygon(Polygon::new_box(1.0, 1.0))))
                .unwrap();

            let mut found = Vec::new();
            world.query_aabb(&AABB::new(Vec2::new(1.5, -0.5), Vec2::new(2.5, 0.5)), |key| {
                found.push(key.shape);
                true
            });
            assert_eq!(found, vec![shape]);

            let mut hit = None;
            world.ray_cast(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), |key, point, normal, fraction| {
                hit = Some((key, point, normal));
                fraction
            });
            let (key, point, normal) = hit.unwrap();
            assert_eq!(key.body, body);
            assert_relative_eq!(point.x, 2.0, epsilon = 1.0e-4);
            assert_relative_eq!(normal.x, -1.0, epsilon = 1.0e-5);
        }

        #[test]
        fn test_set_body_type() {
            let mut world = World::default();
            let body = world.create_body(&BodyConf::dynamic(Vec2::zero())).unwrap();
            world.create_shape(body, disk(1.0)).unwrap();
            world.set_linear_velocity(body, Vec2::new(1.0, 0.0)).unwrap();
            world.set_body_type(body, BodyType::Static).unwrap();
            let b = world.body(body).unwrap();
            assert_eq!(b.inv_mass(), 0.0);
            assert_eq!(b.linear_velocity(), Vec2::zero());
            assert!(!b.is_awake());
            assert_eq!(world.awake_count(), 0);
        }

        #[test]
        fn test_impulse() {
            let mut world = World::default();
            let body = world.create_body(&BodyConf::dynamic(Vec2::zero())).unwrap();
            world.create_shape(body, ShapeConf { density: 1.0, ..ShapeConf::new(Geometry::Polygon(Polygon::new_box(0.5, 0.5))) }).unwrap();
            world.set_awake(body, false).unwrap();
            world.apply_linear_impulse(body, Vec2::new(2.0, 0.0), Vec2::new(0.0, 0.0)).unwrap();
            let b = world.body(body).unwrap();
            assert!(b.is_awake());
            assert_relative_eq!(b.linear_velocity().x, 2.0, epsilon = 1.0e-5);
            assert_relative_eq!(b.angular_velocity(), 0.0);

            world.apply_angular_impulse(body, 1.0).unwrap();
            assert_relative_eq!(world.body(body).unwrap().angular_velocity(), 6.0, epsilon = 1.0e-3);
        }

        #[test]
        fn test_lock() {
            let mut world = World::default();
            let body = world.create_body(&BodyConf::dynamic(Vec2::zero())).unwrap();
            world.locked = true;
            assert_eq!(world.create_body(&BodyConf::default()), Err(WorldError::Locked));
            assert_eq!(world.destroy_body(body), Err(WorldError::Locked));
            assert_eq!(world.step(&StepConf::default()), Err(WorldError::Locked));
            assert_eq!(world.body_count(), 1);
            world.locked = false;

            world.step(&StepConf::default()).unwrap();
            assert!(!world.is_locked());
            assert_eq!(
                world.step(&StepConf::with_delta_time(-1.0)),
                Err(WorldError::InvalidArgument("delta time must be non-negative"))
            );
        }
    }
}
