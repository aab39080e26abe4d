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

use cgmath::{InnerSpace, Zero};

use crate::id::BodyId;
use crate::math::*;
use crate::solver::BodyConstraint;
use crate::step::{StepConf, TimeStep};

/// The protocol every joint kind follows so islands can solve joints without
/// knowing their math. Bodies are addressed by their index in the island.
pub trait JointConstraint {
    /// Prepare the solver state and apply warm starting impulses.
    fn init_velocity_constraints(
        &mut self,
        bodies: &mut [BodyConstraint],
        index_a: usize,
        index_b: usize,
        step: &TimeStep,
        conf: &StepConf,
    );

    fn solve_velocity_constraints(&mut self, bodies: &mut [BodyConstraint], step: &TimeStep);

    /// Returns true when the position error is within tolerance.
    fn solve_position_constraints(&mut self, bodies: &mut [BodyConstraint], conf: &StepConf) -> bool;
}

// Solver state common to joints between two anchor points.
#[derive(Copy, Clone, Debug)]
struct AnchorState {
    index_a: usize,
    index_b: usize,
    local_center_a: Vec2,
    local_center_b: Vec2,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_i_a: f32,
    inv_i_b: f32,
    r_a: Vec2,
    r_b: Vec2,
    u: Vec2,
    length: f32,
}

impl Default for AnchorState {
    fn default() -> Self {
        AnchorState {
            index_a: 0,
            index_b: 0,
            local_center_a: Vec2::zero(),
            local_center_b: Vec2::zero(),
            inv_mass_a: 0.0,
            inv_mass_b: 0.0,
            inv_i_a: 0.0,
            inv_i_b: 0.0,
            r_a: Vec2::zero(),
            r_b: Vec2::zero(),
            u: Vec2::zero(),
            length: 0.0,
        }
    }
}

impl AnchorState {
    fn load(&mut self, bodies: &[BodyConstraint], index_a: usize, index_b: usize, anchor_a: Vec2, anchor_b: Vec2) {
        let (a, b) = (&bodies[index_a], &bodies[index_b]);
        self.index_a = index_a;
        self.index_b = index_b;
        self.local_center_a = a.local_center;
        self.local_center_b = b.local_center;
        self.inv_mass_a = a.inv_mass;
        self.inv_mass_b = b.inv_mass;
        self.inv_i_a = a.inv_inertia;
        self.inv_i_b = b.inv_inertia;
        self.r_a = Rot::new(a.a).rotate(anchor_a - a.local_center);
        self.r_b = Rot::new(b.a).rotate(anchor_b - b.local_center);
        let d = b.c + self.r_b - a.c - self.r_a;
        self.length = d.magnitude();
        self.u = d;
    }

    fn effective_mass(&self) -> f32 {
        let cr_a = cross(self.r_a, self.u);
        let cr_b = cross(self.r_b, self.u);
        self.inv_mass_a + self.inv_i_a * cr_a * cr_a + self.inv_mass_b + self.inv_i_b * cr_b * cr_b
    }

    fn apply_velocity(&self, bodies: &mut [BodyConstraint], p: Vec2) {
        let a = &mut bodies[self.index_a];
        a.v -= p * self.inv_mass_a;
        a.w -= self.inv_i_a * cross(self.r_a, p);
        let b = &mut bodies[self.index_b];
        b.v += p * self.inv_mass_b;
        b.w += self.inv_i_b * cross(self.r_b, p);
    }

    fn relative_velocity(&self, bodies: &[BodyConstraint]) -> f32 {
        let (a, b) = (&bodies[self.index_a], &bodies[self.index_b]);
        let vp_a = a.v + cross_sv(a.w, self.r_a);
        let vp_b = b.v + cross_sv(b.w, self.r_b);
        self.u.dot(vp_b - vp_a)
    }

    // Recompute the axis from current positions and push the bodies along it.
    // Returns the signed error before correction.
    fn push_positions<F>(
        &self,
        bodies: &mut [BodyConstraint],
        anchor_a: Vec2,
        anchor_b: Vec2,
        correction: F,
    ) -> f32
    where
        F: Fn(f32) -> f32,
    {
        let (ca, aa) = (bodies[self.index_a].c, bodies[self.index_a].a);
        let (cb, ab) = (bodies[self.index_b].c, bodies[self.index_b].a);
        let r_a = Rot::new(aa).rotate(anchor_a - self.local_center_a);
        let r_b = Rot::new(ab).rotate(anchor_b - self.local_center_b);
        let d = cb + r_b - ca - r_a;
        let length = d.magnitude();
        let u = normalize_or_none(d).unwrap_or(Vec2::zero());
        let c = correction(length);

        let cr_a = cross(r_a, u);
        let cr_b = cross(r_b, u);
        let k = self.inv_mass_a + self.inv_i_a * cr_a * cr_a + self.inv_mass_b + self.inv_i_b * cr_b * cr_b;
        let impulse = if k > 0.0 { -c / k } else { 0.0 };
        let p = u * impulse;

        let a = &mut bodies[self.index_a];
        a.c -= p * self.inv_mass_a;
        a.a -= self.inv_i_a * cross(r_a, p);
        let b = &mut bodies[self.index_b];
        b.c += p * self.inv_mass_b;
        b.a += self.inv_i_b * cross(r_b, p);
        length
    }
}

/// Keeps two anchor points at a fixed distance, optionally acting as a
/// spring when given a frequency.
#[derive(Clone, Debug)]
pub struct DistanceJoint {
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub length: f32,
    /// Spring frequency in Hz. Zero makes the joint rigid.
    pub frequency: f32,
    pub damping_ratio: f32,
    impulse: f32,
    gamma: f32,
    bias: f32,
    mass: f32,
    state: AnchorState,
}

impl DistanceJoint {
    pub fn new(local_anchor_a: Vec2, local_anchor_b: Vec2, length: f32) -> Self {
        DistanceJoint {
            local_anchor_a,
            local_anchor_b,
            length,
            frequency: 0.0,
            damping_ratio: 0.0,
            impulse: 0.0,
            gamma: 0.0,
            bias: 0.0,
            mass: 0.0,
            state: AnchorState::default(),
        }
    }

    pub fn soft(mut self, frequency: f32, damping_ratio: f32) -> Self {
        self.frequency = frequency;
        self.damping_ratio = damping_ratio;
        self
    }

    pub fn impulse(&self) -> f32 {
        self.impulse
    }
}

impl JointConstraint for DistanceJoint {
    fn init_velocity_constraints(
        &mut self,
        bodies: &mut [BodyConstraint],
        index_a: usize,
        index_b: usize,
        step: &TimeStep,
        conf: &StepConf,
    ) {
        self.state.load(bodies, index_a, index_b, self.local_anchor_a, self.local_anchor_b);
        let length = self.state.length;
        self.state.u = if length > conf.linear_slop {
            self.state.u / length
        } else {
            Vec2::zero()
        };

        let mut inv_mass = self.state.effective_mass();
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if self.frequency > 0.0 {
            let c = length - self.length;
            let omega = 2.0 * f32::consts::PI * self.frequency;
            let d = 2.0 * self.mass * self.damping_ratio * omega;
            let k = self.mass * omega * omega;
            let h = step.dt;
            self.gamma = h * (d + h * k);
            self.gamma = if self.gamma != 0.0 { 1.0 / self.gamma } else { 0.0 };
            self.bias = c * h * k * self.gamma;
            inv_mass += self.gamma;
            self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };
        } else {
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if step.warm_starting {
            self.impulse *= step.dt_ratio;
            let p = self.state.u * self.impulse;
            self.state.apply_velocity(bodies, p);
        } else {
            self.impulse = 0.0;
        }
    }

    fn solve_velocity_constraints(&mut self, bodies: &mut [BodyConstraint], _step: &TimeStep) {
        let cdot = self.state.relative_velocity(bodies);
        let impulse = -self.mass * (cdot + self.bias + self.gamma * self.impulse);
        self.impulse += impulse;
        let p = self.state.u * impulse;
        self.state.apply_velocity(bodies, p);
    }

    fn solve_position_constraints(&mut self, bodies: &mut [BodyConstraint], conf: &StepConf) -> bool {
        if self.frequency > 0.0 {
            // Soft joints do not correct position.
            return true;
        }
        let rest = self.length;
        let max = conf.max_linear_correction;
        let length = self
            .state
            .push_positions(bodies, self.local_anchor_a, self.local_anchor_b, |l| clamp(l - rest, -max, max));
        (length - rest).abs() < conf.linear_slop
    }
}

/// Limits the distance between two anchor points to a maximum, like a rope.
#[derive(Clone, Debug)]
pub struct RopeJoint {
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub max_length: f32,
    impulse: f32,
    mass: f32,
    state: AnchorState,
}

impl RopeJoint {
    pub fn new(local_anchor_a: Vec2, local_anchor_b: Vec2, max_length: f32) -> Self {
        RopeJoint {
            local_anchor_a,
            local_anchor_b,
            max_length,
            impulse: 0.0,
            mass: 0.0,
            state: AnchorState::default(),
        }
    }

    pub fn impulse(&self) -> f32 {
        self.impulse
    }
}

impl JointConstraint for RopeJoint {
    fn init_velocity_constraints(
        &mut self,
        bodies: &mut [BodyConstraint],
        index_a: usize,
        index_b: usize,
        step: &TimeStep,
        conf: &StepConf,
    ) {
        self.state.load(bodies, index_a, index_b, self.local_anchor_a, self.local_anchor_b);
        let length = self.state.length;
        if length > conf.linear_slop {
            self.state.u /= length;
        } else {
            self.state.u = Vec2::zero();
            self.mass = 0.0;
            self.impulse = 0.0;
            return;
        }

        let inv_mass = self.state.effective_mass();
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if step.warm_starting {
            self.impulse *= step.dt_ratio;
            let p = self.state.u * self.impulse;
            self.state.apply_velocity(bodies, p);
        } else {
            self.impulse = 0.0;
        }
    }

    fn solve_velocity_constraints(&mut self, bodies: &mut [BodyConstraint], step: &TimeStep) {
        let c = self.state.length - self.max_length;
        let mut cdot = self.state.relative_velocity(bodies);

        // Predictive constraint.
        if c < 0.0 {
            cdot += step.inv_dt * c;
        }

        let impulse = -self.mass * cdot;
        let old_impulse = self.impulse;
        self.impulse = (self.impulse + impulse).min(0.0);
        let impulse = self.impulse - old_impulse;

        let p = self.state.u * impulse;
        self.state.apply_velocity(bodies, p);
    }

    fn solve_position_constraints(&mut self, bodies: &mut [BodyConstraint], conf: &StepConf) -> bool {
        let max_length = self.max_length;
        let max = conf.max_linear_correction;
        let length = self
            .state
            .push_positions(bodies, self.local_anchor_a, self.local_anchor_b, |l| clamp(l - max_length, 0.0, max));
        length - max_length < conf.linear_slop
    }
}

/// The kinds of joint a world can hold.
#[derive(Clone, Debug)]
pub enum JointKind {
    Distance(DistanceJoint),
    Rope(RopeJoint),
}

impl JointConstraint for JointKind {
    fn init_velocity_constraints(
        &mut self,
        bodies: &mut [BodyConstraint],
        index_a: usize,
        index_b: usize,
        step: &TimeStep,
        conf: &StepConf,
    ) {
        match *self {
            JointKind::Distance(ref mut j) => j.init_velocity_constraints(bodies, index_a, index_b, step, conf),
            JointKind::Rope(ref mut j) => j.init_velocity_constraints(bodies, index_a, index_b, step, conf),
        }
    }

    fn solve_velocity_constraints(&mut self, bodies: &mut [BodyConstraint], step: &TimeStep) {
        match *self {
            JointKind::Distance(ref mut j) => j.solve_velocity_constraints(bodies, step),
            JointKind::Rope(ref mut j) => j.solve_velocity_constraints(bodies, step),
        }
    }

    fn solve_position_constraints(&mut self, bodies: &mut [BodyConstraint], conf: &StepConf) -> bool {
        match *self {
            JointKind::Distance(ref mut j) => j.solve_position_constraints(bodies, conf),
            JointKind::Rope(ref mut j) => j.solve_position_constraints(bodies, conf),
        }
    }
}

/// Parameters for creating a joint.
#[derive(Clone, Debug)]
pub struct JointConf {
    pub body_a: BodyId,
    pub body_b: BodyId,
    /// Whether the two bodies may still collide with each other.
    pub collide_connected: bool,
    pub kind: JointKind,
}

impl JointConf {
    pub fn new(body_a: BodyId, body_b: BodyId, kind: JointKind) -> Self {
        JointConf {
            body_a,
            body_b,
            collide_connected: false,
            kind,
        }
    }
}

/// A joint between two bodies, owned by a `World`.
#[derive(Clone, Debug)]
pub struct Joint {
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,
    pub(crate) collide_connected: bool,
    pub(crate) kind: JointKind,
    pub(crate) island_flag: bool,
}

impl Joint {
    pub(crate) fn new(conf: JointConf) -> Self {
        Joint {
            body_a: conf.body_a,
            body_b: conf.body_b,
            collide_connected: conf.collide_connected,
            kind: conf.kind,
            island_flag: false,
        }
    }

    pub fn body_a(&self) -> BodyId {
        self.body_a
    }

    pub fn body_b(&self) -> BodyId {
        self.body_b
    }

    pub fn collide_connected(&self) -> bool {
        self.collide_connected
    }

    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    /// The body on the other end of the joint from `body`.
    pub fn other(&self, body: BodyId) -> BodyId {
        if body == self.body_a {
            self.body_b
        } else {
            self.body_a
        }
    }
}

#[cfg(test)]
mod tests {
    mod joint {
        use approx::assert_relative_eq;
        use cgmath::Zero;

        use crate::joint::*;
        use crate::math::*;
        use crate::solver::BodyConstraint;
        use crate::step::{StepConf, TimeStep};

        fn particle(c: Vec2, v: Vec2) -> BodyConstraint {
            BodyConstraint {
                inv_mass: 1.0,
                inv_inertia: 0.0,
                local_center: Vec2::zero(),
                c,
                a: 0.0,
                v,
                w: 0.0,
            }
        }

        #[test]
        fn test_new_joints_start_at_rest() {
            let distance = DistanceJoint::new(Vec2::new(1.0, 0.0), Vec2::zero(), 2.0);
            assert_eq!(distance.impulse(), 0.0);
            assert_eq!(distance.state.u, Vec2::zero());
            assert_eq!(distance.state.r_a, Vec2::zero());

            let rope = RopeJoint::new(Vec2::zero(), Vec2::zero(), 2.0);
            assert_eq!(rope.impulse(), 0.0);
            assert_eq!(rope.state.local_center_b, Vec2::zero());
        }

        #[test]
        fn test_distance_removes_relative_velocity() {
            let mut bodies = [
                particle(Vec2::new(0.0, 0.0), Vec2::zero()),
                particle(Vec2::new(2.0, 0.0), Vec2::new(1.0, 0.0)),
            ];
            let conf = StepConf::default();
            let step = TimeStep::new(conf.delta_time, 1.0, false);
            let mut joint = JointKind::Distance(DistanceJoint::new(Vec2::zero(), Vec2::zero(), 2.0));
            joint.init_velocity_constraints(&mut bodies, 0, 1, &step, &conf);
            joint.solve_velocity_constraints(&mut bodies, &step);
            assert_relative_eq!(bodies[0].v.x, 0.5, epsilon = 1.0e-6);
            assert_relative_eq!(bodies[1].v.x, 0.5, epsilon = 1.0e-6);
            assert!(joint.solve_position_constraints(&mut bodies, &conf));
        }

        #[test]
        fn test_rope_pulls_in() {
            let mut bodies = [
                particle(Vec2::new(0.0, 0.0), Vec2::zero()),
                particle(Vec2::new(3.0, 0.0), Vec2::zero()),
            ];
            let conf = StepConf::default();
            let step = TimeStep::new(conf.delta_time, 1.0, false);
            let mut rope = RopeJoint::new(Vec2::zero(), Vec2::zero(), 2.0);
            rope.init_velocity_constraints(&mut bodies, 0, 1, &step, &conf);
            rope.solve_velocity_constraints(&mut bodies, &step);
            assert_relative_eq!(rope.impulse(), 0.0);

            assert!(!rope.solve_position_constraints(&mut bodies, &conf));
            // Each side moves half of the capped correction.
            assert_relative_eq!(bodies[0].c.x, 0.1, epsilon = 1.0e-6);
            assert_relative_eq!(bodies[1].c.x, 2.9, epsilon = 1.0e-6);
        }

        #[test]
        fn test_slack_rope() {
            let mut bodies = [
                particle(Vec2::new(0.0, 0.0), Vec2::zero()),
                particle(Vec2::new(1.0, 0.0), Vec2::new(0.5, 0.0)),
            ];
            let conf = StepConf::default();
            let step = TimeStep::new(conf.delta_time, 1.0, false);
            let mut rope = RopeJoint::new(Vec2::zero(), Vec2::zero(), 2.0);
            rope.init_velocity_constraints(&mut bodies, 0, 1, &step, &conf);
            rope.solve_velocity_constraints(&mut bodies, &step);
            // Not reaching the limit within the step, so no impulse.
            assert_relative_eq!(bodies[1].v.x, 0.5);
            assert!(rope.solve_position_constraints(&mut bodies, &conf));
        }
    }
}
