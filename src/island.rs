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

use cgmath::InnerSpace;

use crate::body::Body;
use crate::contact::Contact;
use crate::id::{BodyId, ContactId, JointId};
use crate::joint::{Joint, JointConstraint};
use crate::listener::ContactListener;
use crate::math::Vec2;
use crate::pool::Pool;
use crate::shape::Shape;
use crate::solver::*;
use crate::step::{StepConf, TimeStep};

/// A connected group of bodies, contacts and joints that is solved on its
/// own. Islands only live for the duration of a step.
#[derive(Clone, Debug, Default)]
pub struct Island {
    pub bodies: Vec<BodyId>,
    pub contacts: Vec<ContactId>,
    pub joints: Vec<JointId>,
}

/// What solving an island produced.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IslandStats {
    pub min_separation: f32,
    pub max_inc_impulse: f32,
    pub position_iterations: usize,
    pub velocity_iterations: usize,
    pub bodies_slept: usize,
    pub solved: bool,
}

impl Default for IslandStats {
    fn default() -> Self {
        IslandStats {
            min_separation: f32::INFINITY,
            max_inc_impulse: 0.0,
            position_iterations: 0,
            velocity_iterations: 0,
            bodies_slept: 0,
            solved: false,
        }
    }
}

impl Island {
    pub fn new() -> Self {
        Island::default()
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
    }

    /// Flood fill from an awake, speedable seed across touching, enabled,
    /// non-sensor contacts and joints. Static bodies join the island but do
    /// not carry the fill further. Everything reached gets its island flag
    /// set and is woken.
    pub(crate) fn build(
        &mut self,
        seed: BodyId,
        bodies: &mut Pool<Body>,
        contacts: &mut Pool<Contact>,
        joints: &mut Pool<Joint>,
    ) {
        self.clear();
        let mut stack = vec![seed];
        bodies[seed.0].island_flag = true;

        while let Some(id) = stack.pop() {
            self.bodies.push(id);
            let body = &mut bodies[id.0];
            body.set_awake(true);
            if !body.is_speedable() {
                continue;
            }

            for i in 0..bodies[id.0].contacts.len() {
                let cid = bodies[id.0].contacts[i];
                let contact = &mut contacts[cid.0];
                if contact.island_flag || !contact.enabled || !contact.touching || contact.sensor {
                    continue;
                }
                contact.island_flag = true;
                self.contacts.push(cid);

                let other = if contact.a.body == id { contact.b.body } else { contact.a.body };
                if !bodies[other.0].island_flag {
                    bodies[other.0].island_flag = true;
                    stack.push(other);
                }
            }

            for i in 0..bodies[id.0].joints.len() {
                let jid = bodies[id.0].joints[i];
                let joint = &mut joints[jid.0];
                if joint.island_flag {
                    continue;
                }
                joint.island_flag = true;
                self.joints.push(jid);

                let other = joint.other(id);
                if !bodies[other.0].island_flag {
                    bodies[other.0].island_flag = true;
                    stack.push(other);
                }
            }
        }
    }

    // Working copies of the island's bodies, indexed by island position.
    fn body_constraints(&self, bodies: &mut Pool<Body>) -> Vec<BodyConstraint> {
        self.bodies
            .iter()
            .enumerate()
            .map(|(i, &id)| {
                let body = &mut bodies[id.0];
                body.island_index = i;
                BodyConstraint {
                    inv_mass: body.inv_mass,
                    inv_inertia: body.inv_inertia,
                    local_center: body.sweep.local_center,
                    c: body.sweep.c,
                    a: body.sweep.a,
                    v: body.linear_velocity,
                    w: body.angular_velocity,
                }
            })
            .collect()
    }

    fn contact_defs(&self, bodies: &Pool<Body>, contacts: &Pool<Contact>, shapes: &Pool<Shape>) -> Vec<ContactConstraintDef> {
        self.contacts
            .iter()
            .map(|&cid| {
                let contact = &contacts[cid.0];
                ContactConstraintDef {
                    manifold: contact.manifold.clone(),
                    index_a: bodies[contact.a.body.0].island_index,
                    index_b: bodies[contact.b.body.0].island_index,
                    radius_a: shapes[contact.a.shape.0].geometry.vertex_radius(),
                    radius_b: shapes[contact.b.shape.0].geometry.vertex_radius(),
                    friction: contact.friction,
                    restitution: contact.restitution,
                    tangent_speed: contact.tangent_speed,
                }
            })
            .collect()
    }

    fn write_back(&self, bodies: &mut Pool<Body>, constraints: &[BodyConstraint]) {
        for (&id, bc) in self.bodies.iter().zip(constraints.iter()) {
            let body = &mut bodies[id.0];
            body.sweep.c = bc.c;
            body.sweep.a = bc.a;
            body.linear_velocity = bc.v;
            body.angular_velocity = bc.w;
            body.synchronize_transform();
        }
    }

    /// Solve a regular step: integrate velocities, solve velocity and position
    /// constraints, integrate positions, then put the island to sleep if it
    /// has been still for long enough.
    pub(crate) fn solve(
        &self,
        bodies: &mut Pool<Body>,
        contacts: &mut Pool<Contact>,
        joints: &mut Pool<Joint>,
        shapes: &Pool<Shape>,
        gravity: Vec2,
        conf: &StepConf,
        listener: &mut dyn ContactListener,
    ) -> IslandStats {
        let h = conf.delta_time;
        let step = TimeStep::new(h, conf.dt_ratio, conf.do_warm_start);
        let mut stats = IslandStats::default();

        for &id in self.bodies.iter() {
            let body = &mut bodies[id.0];
            body.sweep.c0 = body.sweep.c;
            body.sweep.a0 = body.sweep.a;
            if body.is_accelerable() {
                let mut v = body.linear_velocity + (gravity + body.force * body.inv_mass) * h;
                let mut w = body.angular_velocity + h * body.inv_inertia * body.torque;
                // Pade approximation of exponential damping.
                v *= 1.0 / (1.0 + h * body.linear_damping);
                w *= 1.0 / (1.0 + h * body.angular_damping);
                body.linear_velocity = v;
                body.angular_velocity = w;
            }
        }

        let mut constraints = self.body_constraints(bodies);
        let defs = self.contact_defs(bodies, contacts, shapes);
        let mut solver = ContactSolver::new(&defs, &constraints, &step);
        solver.initialize_velocity_constraints(&constraints, conf.velocity_threshold, conf.do_block_solve);
        if step.warm_starting {
            solver.warm_start(&mut constraints);
        }

        let joint_ends: Vec<(usize, usize)> = self
            .joints
            .iter()
            .map(|&jid| {
                let joint = &joints[jid.0];
                (bodies[joint.body_a.0].island_index, bodies[joint.body_b.0].island_index)
            })
            .collect();
        for (&jid, &(ia, ib)) in self.joints.iter().zip(joint_ends.iter()) {
            joints[jid.0].kind.init_velocity_constraints(&mut constraints, ia, ib, &step, conf);
        }

        for _ in 0..conf.reg_velocity_iterations {
            for &jid in self.joints.iter() {
                joints[jid.0].kind.solve_velocity_constraints(&mut constraints, &step);
            }
            solver.solve_velocity_constraints(&mut constraints);
            stats.velocity_iterations += 1;
        }
        stats.max_inc_impulse = solver.max_inc_impulse();

        for (i, &cid) in self.contacts.iter().enumerate() {
            solver.store_impulses(i, &mut contacts[cid.0].manifold);
        }

        integrate_positions(&mut constraints, h, conf.max_translation, conf.max_rotation);

        let position_conf = PositionSolverConf {
            resolution_rate: conf.reg_resolution_rate,
            linear_slop: conf.linear_slop,
            max_linear_correction: conf.max_linear_correction,
        };
        for _ in 0..conf.reg_position_iterations {
            stats.position_iterations += 1;
            let min_separation = solver.solve_position_constraints(&mut constraints, &position_conf, |_| true);
            stats.min_separation = stats.min_separation.min(min_separation);
            let contacts_okay = min_separation >= conf.reg_min_separation;
            let joints_okay = self.joints.iter().fold(true, |okay, &jid| {
                joints[jid.0].kind.solve_position_constraints(&mut constraints, conf) && okay
            });
            if contacts_okay && joints_okay {
                stats.solved = true;
                break;
            }
        }

        self.write_back(bodies, &constraints);

        for (i, &cid) in self.contacts.iter().enumerate() {
            listener.post_solve(cid, &contacts[cid.0], &solver.impulse(i), stats.velocity_iterations);
        }

        if conf.allow_sleep {
            stats.bodies_slept = self.update_sleep(bodies, h, conf, stats.solved);
        }
        stats
    }

    // Accumulate still time and put every body to sleep once the stillest
    // body has been still long enough. Returns the number of bodies slept.
    fn update_sleep(&self, bodies: &mut Pool<Body>, h: f32, conf: &StepConf, solved: bool) -> usize {
        let lin_tol_sq = conf.linear_sleep_tolerance * conf.linear_sleep_tolerance;
        let ang_tol_sq = conf.angular_sleep_tolerance * conf.angular_sleep_tolerance;

        let mut min_sleep_time = f32::INFINITY;
        for &id in self.bodies.iter() {
            let body = &mut bodies[id.0];
            if !body.is_speedable() {
                continue;
            }
            if !body.allow_sleep
                || body.angular_velocity * body.angular_velocity > ang_tol_sq
                || body.linear_velocity.magnitude2() > lin_tol_sq
            {
                body.sleep_time = 0.0;
                min_sleep_time = 0.0;
            } else {
                body.sleep_time += h;
                min_sleep_time = min_sleep_time.min(body.sleep_time);
            }
        }

        if min_sleep_time < conf.min_still_time_to_sleep || !solved {
            return 0;
        }
        let mut slept = 0;
        for &id in self.bodies.iter() {
            let body = &mut bodies[id.0];
            if body.is_speedable() {
                body.set_awake(false);
                slept += 1;
            }
        }
        slept
    }

    /// Solve the island around a time of impact event. Only the two bodies
    /// at island positions `toi_a` and `toi_b` are moved by position
    /// correction; the island is then integrated over the rest of the step.
    pub(crate) fn solve_toi(
        &self,
        bodies: &mut Pool<Body>,
        contacts: &Pool<Contact>,
        shapes: &Pool<Shape>,
        toi_a: usize,
        toi_b: usize,
        sub_dt: f32,
        conf: &StepConf,
        listener: &mut dyn ContactListener,
    ) -> IslandStats {
        let mut stats = IslandStats::default();
        let step = TimeStep::new(sub_dt, 1.0, false);
        let mut constraints = self.body_constraints(bodies);
        let defs = self.contact_defs(bodies, contacts, shapes);
        let mut solver = ContactSolver::new(&defs, &constraints, &step);

        let position_conf = PositionSolverConf {
            resolution_rate: conf.toi_resolution_rate,
            linear_slop: conf.linear_slop,
            max_linear_correction: conf.max_linear_correction,
        };
        for _ in 0..conf.toi_position_iterations {
            stats.position_iterations += 1;
            let min_separation =
                solver.solve_position_constraints(&mut constraints, &position_conf, |i| i == toi_a || i == toi_b);
            stats.min_separation = stats.min_separation.min(min_separation);
            if min_separation >= conf.toi_min_separation {
                stats.solved = true;
                break;
            }
        }

        // The corrected positions become the start of the remaining sweep.
        for &index in [toi_a, toi_b].iter() {
            let body = &mut bodies[self.bodies[index].0];
            body.sweep.c0 = constraints[index].c;
            body.sweep.a0 = constraints[index].a;
        }

        // No warm starting: impulses from the impact can be large and would
        // not carry over well to the next step.
        solver.initialize_velocity_constraints(&constraints, conf.velocity_threshold, conf.do_block_solve);
        for _ in 0..conf.toi_velocity_iterations {
            solver.solve_velocity_constraints(&mut constraints);
            stats.velocity_iterations += 1;
        }
        stats.max_inc_impulse = solver.max_inc_impulse();

        integrate_positions(&mut constraints, sub_dt, conf.max_translation, conf.max_rotation);
        self.write_back(bodies, &constraints);

        for (i, &cid) in self.contacts.iter().enumerate() {
            listener.post_solve(cid, &contacts[cid.0], &solver.impulse(i), stats.velocity_iterations);
        }
        stats
    }
}
