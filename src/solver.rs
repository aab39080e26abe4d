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

//! Sequential impulse contact solver.
//!
//! Contacts are solved one at a time, repeatedly, on a working copy of the
//! island's body state. Friction is solved before the normal constraint
//! since the normal impulse bounds friction. When a manifold has two points
//! the normal impulses are solved together as a 2x2 linear complementarity
//! problem by enumerating the four possible active sets.

use std::f32;

use cgmath::{InnerSpace, Matrix2, SquareMatrix, Zero};
use smallvec::SmallVec;

use crate::manifold::*;
use crate::math::*;
use crate::step::TimeStep;

/// Per body working state for one island solve.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BodyConstraint {
    pub inv_mass: f32,
    pub inv_inertia: f32,
    pub local_center: Vec2,
    /// Center of mass.
    pub c: Vec2,
    pub a: f32,
    pub v: Vec2,
    pub w: f32,
}

impl BodyConstraint {
    pub fn transform(&self) -> Transform {
        let q = Rot::new(self.a);
        Transform {
            p: self.c - q.rotate(self.local_center),
            q,
        }
    }
}

/// What the solver needs to know about one contact.
#[derive(Clone, Debug)]
pub struct ContactConstraintDef {
    pub manifold: Manifold,
    pub index_a: usize,
    pub index_b: usize,
    pub radius_a: f32,
    pub radius_b: f32,
    pub friction: f32,
    pub restitution: f32,
    pub tangent_speed: f32,
}

/// Parameters for one round of position correction.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PositionSolverConf {
    pub resolution_rate: f32,
    pub linear_slop: f32,
    pub max_linear_correction: f32,
}

#[derive(Copy, Clone, Debug)]
struct VelocityConstraintPoint {
    r_a: Vec2,
    r_b: Vec2,
    normal_impulse: f32,
    tangent_impulse: f32,
    normal_mass: f32,
    tangent_mass: f32,
    velocity_bias: f32,
}

impl Default for VelocityConstraintPoint {
    fn default() -> Self {
        VelocityConstraintPoint {
            r_a: Vec2::zero(),
            r_b: Vec2::zero(),
            normal_impulse: 0.0,
            tangent_impulse: 0.0,
            normal_mass: 0.0,
            tangent_mass: 0.0,
            velocity_bias: 0.0,
        }
    }
}

#[derive(Clone, Debug)]
struct VelocityConstraint {
    points: SmallVec<[VelocityConstraintPoint; MAX_MANIFOLD_POINTS]>,
    normal: Vec2,
    normal_mass: Matrix2<f32>,
    k: Matrix2<f32>,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_i_a: f32,
    inv_i_b: f32,
    friction: f32,
    restitution: f32,
    tangent_speed: f32,
    block: bool,
}

#[derive(Clone, Debug)]
struct PositionConstraint {
    local_points: SmallVec<[Vec2; MAX_MANIFOLD_POINTS]>,
    local_normal: Vec2,
    local_point: Vec2,
    kind: ManifoldType,
    index_a: usize,
    index_b: usize,
    radius_a: f32,
    radius_b: f32,
}

// Normal, point and separation of one manifold point at the current
// positions.
fn position_manifold(pc: &PositionConstraint, xf_a: &Transform, xf_b: &Transform, i: usize) -> (Vec2, Vec2, f32) {
    let radii = pc.radius_a + pc.radius_b;
    match pc.kind {
        ManifoldType::Circles => {
            let point_a = xf_a.apply(pc.local_point);
            let point_b = xf_b.apply(pc.local_points[0]);
            let normal = normalize_or_none(point_b - point_a).unwrap_or(Vec2::new(1.0, 0.0));
            let point = (point_a + point_b) * 0.5;
            (normal, point, (point_b - point_a).dot(normal) - radii)
        },
        ManifoldType::FaceA => {
            let normal = xf_a.q.rotate(pc.local_normal);
            let plane_point = xf_a.apply(pc.local_point);
            let clip_point = xf_b.apply(pc.local_points[i]);
            (normal, clip_point, (clip_point - plane_point).dot(normal) - radii)
        },
        ManifoldType::FaceB => {
            let normal = xf_b.q.rotate(pc.local_normal);
            let plane_point = xf_b.apply(pc.local_point);
            let clip_point = xf_a.apply(pc.local_points[i]);
            // Keep the normal pointing from A to B.
            (-normal, clip_point, (clip_point - plane_point).dot(normal) - radii)
        },
        ManifoldType::Unset => (Vec2::new(1.0, 0.0), Vec2::zero(), 0.0),
    }
}

/// Contact constraints of one island.
#[derive(Clone, Debug)]
pub struct ContactSolver {
    velocity: Vec<VelocityConstraint>,
    position: Vec<PositionConstraint>,
    max_inc_impulse: f32,
}

impl ContactSolver {
    /// Build constraints for the given contacts. Accumulated impulses are
    /// carried over, scaled by the step ratio, when warm starting; otherwise
    /// they start at zero.
    pub fn new(defs: &[ContactConstraintDef], bodies: &[BodyConstraint], step: &TimeStep) -> Self {
        let mut velocity = Vec::with_capacity(defs.len());
        let mut position = Vec::with_capacity(defs.len());
        for def in defs {
            let (body_a, body_b) = (&bodies[def.index_a], &bodies[def.index_b]);
            let points = def
                .manifold
                .points
                .iter()
                .map(|mp| {
                    let (normal_impulse, tangent_impulse) = if step.warm_starting {
                        (step.dt_ratio * mp.normal_impulse, step.dt_ratio * mp.tangent_impulse)
                    } else {
                        (0.0, 0.0)
                    };
                    VelocityConstraintPoint {
                        normal_impulse,
                        tangent_impulse,
                        ..VelocityConstraintPoint::default()
                    }
                })
                .collect();
            velocity.push(VelocityConstraint {
                points,
                normal: Vec2::zero(),
                normal_mass: Matrix2::zero(),
                k: Matrix2::zero(),
                index_a: def.index_a,
                index_b: def.index_b,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                inv_i_a: body_a.inv_inertia,
                inv_i_b: body_b.inv_inertia,
                friction: def.friction,
                restitution: def.restitution,
                tangent_speed: def.tangent_speed,
                block: false,
            });
            position.push(PositionConstraint {
                local_points: def.manifold.points.iter().map(|mp| mp.local_point).collect(),
                local_normal: def.manifold.local_normal,
                local_point: def.manifold.local_point,
                kind: def.manifold.kind,
                index_a: def.index_a,
                index_b: def.index_b,
                radius_a: def.radius_a,
                radius_b: def.radius_b,
            });
        }
        ContactSolver {
            velocity,
            position,
            max_inc_impulse: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.velocity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.velocity.is_empty()
    }

    /// Largest impulse increment applied by velocity iterations so far.
    pub fn max_inc_impulse(&self) -> f32 {
        self.max_inc_impulse
    }

    /// Compute the world space anchors, effective masses and restitution
    /// bias from the current positions and velocities.
    pub fn initialize_velocity_constraints(
        &mut self,
        bodies: &[BodyConstraint],
        velocity_threshold: f32,
        block_solve: bool,
    ) {
        for (vc, pc) in self.velocity.iter_mut().zip(self.position.iter()) {
            let (body_a, body_b) = (&bodies[vc.index_a], &bodies[vc.index_b]);
            let manifold = Manifold {
                kind: pc.kind,
                local_normal: pc.local_normal,
                local_point: pc.local_point,
                points: pc
                    .local_points
                    .iter()
                    .map(|&p| ManifoldPoint::new(p, ContactFeature::default()))
                    .collect(),
            };
            let wm = WorldManifold::new(
                &manifold,
                &body_a.transform(),
                pc.radius_a,
                &body_b.transform(),
                pc.radius_b,
            );
            vc.normal = wm.normal;
            let tangent = cross_vs(vc.normal, 1.0);

            let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);
            for (vcp, &point) in vc.points.iter_mut().zip(wm.points.iter()) {
                vcp.r_a = point - body_a.c;
                vcp.r_b = point - body_b.c;

                let rn_a = cross(vcp.r_a, vc.normal);
                let rn_b = cross(vcp.r_b, vc.normal);
                let k_normal = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                vcp.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

                let rt_a = cross(vcp.r_a, tangent);
                let rt_b = cross(vcp.r_b, tangent);
                let k_tangent = m_a + m_b + i_a * rt_a * rt_a + i_b * rt_b * rt_b;
                vcp.tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

                // Bounce only on real impacts so resting contacts stay still.
                vcp.velocity_bias = 0.0;
                let v_rel = vc.normal.dot(
                    body_b.v + cross_sv(body_b.w, vcp.r_b) - body_a.v - cross_sv(body_a.w, vcp.r_a),
                );
                if v_rel < -velocity_threshold {
                    vcp.velocity_bias = -vc.restitution * v_rel;
                }
            }

            vc.block = false;
            if vc.points.len() == 2 && block_solve {
                let (p1, p2) = (vc.points[0], vc.points[1]);
                let rn1_a = cross(p1.r_a, vc.normal);
                let rn1_b = cross(p1.r_b, vc.normal);
                let rn2_a = cross(p2.r_a, vc.normal);
                let rn2_b = cross(p2.r_b, vc.normal);

                let k11 = m_a + m_b + i_a * rn1_a * rn1_a + i_b * rn1_b * rn1_b;
                let k22 = m_a + m_b + i_a * rn2_a * rn2_a + i_b * rn2_b * rn2_b;
                let k12 = m_a + m_b + i_a * rn1_a * rn2_a + i_b * rn1_b * rn2_b;

                // Guard against an ill-conditioned K.
                const MAX_CONDITION_NUMBER: f32 = 1000.0;
                if k11 * k11 < MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12) {
                    vc.k = Matrix2::new(k11, k12, k12, k22);
                    if let Some(inv) = vc.k.invert() {
                        vc.normal_mass = inv;
                        vc.block = true;
                    }
                }
                if !vc.block {
                    // The points are redundant; solve only the first one.
                    vc.points.truncate(1);
                }
            }
        }
    }

    pub fn warm_start(&self, bodies: &mut [BodyConstraint]) {
        for vc in self.velocity.iter() {
            let tangent = cross_vs(vc.normal, 1.0);
            let (mut a, mut b) = (bodies[vc.index_a], bodies[vc.index_b]);
            for vcp in vc.points.iter() {
                let p = vc.normal * vcp.normal_impulse + tangent * vcp.tangent_impulse;
                a.w -= vc.inv_i_a * cross(vcp.r_a, p);
                a.v -= p * vc.inv_mass_a;
                b.w += vc.inv_i_b * cross(vcp.r_b, p);
                b.v += p * vc.inv_mass_b;
            }
            write_velocities(bodies, vc, a, b);
        }
    }

    /// One Gauss-Seidel sweep over all contacts.
    pub fn solve_velocity_constraints(&mut self, bodies: &mut [BodyConstraint]) {
        let mut max_inc = self.max_inc_impulse;
        for vc in self.velocity.iter_mut() {
            let (mut a, mut b) = (bodies[vc.index_a], bodies[vc.index_b]);
            let normal = vc.normal;
            let tangent = cross_vs(normal, 1.0);
            let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);

            for vcp in vc.points.iter_mut() {
                let dv = b.v + cross_sv(b.w, vcp.r_b) - a.v - cross_sv(a.w, vcp.r_a);
                let vt = dv.dot(tangent) - vc.tangent_speed;
                let lambda = vcp.tangent_mass * -vt;

                let max_friction = vc.friction * vcp.normal_impulse;
                let new_impulse = clamp(vcp.tangent_impulse + lambda, -max_friction, max_friction);
                let lambda = new_impulse - vcp.tangent_impulse;
                vcp.tangent_impulse = new_impulse;
                max_inc = max_inc.max(lambda.abs());

                let p = tangent * lambda;
                a.v -= p * m_a;
                a.w -= i_a * cross(vcp.r_a, p);
                b.v += p * m_b;
                b.w += i_b * cross(vcp.r_b, p);
            }

            if !vc.block {
                for vcp in vc.points.iter_mut() {
                    let dv = b.v + cross_sv(b.w, vcp.r_b) - a.v - cross_sv(a.w, vcp.r_a);
                    let vn = dv.dot(normal);
                    let lambda = -vcp.normal_mass * (vn - vcp.velocity_bias);

                    let new_impulse = (vcp.normal_impulse + lambda).max(0.0);
                    let lambda = new_impulse - vcp.normal_impulse;
                    vcp.normal_impulse = new_impulse;
                    max_inc = max_inc.max(lambda.abs());

                    let p = normal * lambda;
                    a.v -= p * m_a;
                    a.w -= i_a * cross(vcp.r_a, p);
                    b.v += p * m_b;
                    b.w += i_b * cross(vcp.r_b, p);
                }
            } else {
                max_inc = max_inc.max(solve_block(vc, &mut a, &mut b));
            }

            write_velocities(bodies, vc, a, b);
        }
        self.max_inc_impulse = max_inc;
    }

    /// Copy accumulated impulses back into a manifold for warm starting next
    /// step. Returns the impulses that were applied.
    pub fn store_impulses(&self, index: usize, manifold: &mut Manifold) -> ContactImpulse {
        let vc = &self.velocity[index];
        for (i, mp) in manifold.points.iter_mut().enumerate() {
            // Points dropped as redundant start cold next step.
            let (normal, tangent) = vc
                .points
                .get(i)
                .map_or((0.0, 0.0), |vcp| (vcp.normal_impulse, vcp.tangent_impulse));
            mp.normal_impulse = normal;
            mp.tangent_impulse = tangent;
        }
        self.impulse(index)
    }

    pub fn impulse(&self, index: usize) -> ContactImpulse {
        let vc = &self.velocity[index];
        ContactImpulse {
            normal_impulses: vc.points.iter().map(|p| p.normal_impulse).collect(),
            tangent_impulses: vc.points.iter().map(|p| p.tangent_impulse).collect(),
        }
    }

    /// One sweep of position correction. Only bodies for which `movable`
    /// returns true are pushed. Returns the smallest separation seen.
    pub fn solve_position_constraints<F>(
        &self,
        bodies: &mut [BodyConstraint],
        conf: &PositionSolverConf,
        movable: F,
    ) -> f32
    where
        F: Fn(usize) -> bool,
    {
        let mut min_separation = f32::INFINITY;
        for (pc, vc) in self.position.iter().zip(self.velocity.iter()) {
            let (mut a, mut b) = (bodies[pc.index_a], bodies[pc.index_b]);
            let (m_a, i_a) = if movable(pc.index_a) {
                (vc.inv_mass_a, vc.inv_i_a)
            } else {
                (0.0, 0.0)
            };
            let (m_b, i_b) = if movable(pc.index_b) {
                (vc.inv_mass_b, vc.inv_i_b)
            } else {
                (0.0, 0.0)
            };

            for i in 0..pc.local_points.len() {
                let (normal, point, separation) = position_manifold(pc, &a.transform(), &b.transform(), i);
                let r_a = point - a.c;
                let r_b = point - b.c;
                min_separation = min_separation.min(separation);

                // Prevent large corrections and allow slop.
                let c = clamp(
                    conf.resolution_rate * (separation + conf.linear_slop),
                    -conf.max_linear_correction,
                    0.0,
                );

                let rn_a = cross(r_a, normal);
                let rn_b = cross(r_b, normal);
                let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                let impulse = if k > 0.0 { -c / k } else { 0.0 };
                let p = normal * impulse;

                a.c -= p * m_a;
                a.a -= i_a * cross(r_a, p);
                b.c += p * m_b;
                b.a += i_b * cross(r_b, p);
            }

            bodies[pc.index_a].c = a.c;
            bodies[pc.index_a].a = a.a;
            bodies[pc.index_b].c = b.c;
            bodies[pc.index_b].a = b.a;
        }
        min_separation
    }
}

fn write_velocities(bodies: &mut [BodyConstraint], vc: &VelocityConstraint, a: BodyConstraint, b: BodyConstraint) {
    bodies[vc.index_a].v = a.v;
    bodies[vc.index_a].w = a.w;
    bodies[vc.index_b].v = b.v;
    bodies[vc.index_b].w = b.w;
}

// Solve both normal constraints at once. With impulses x, relative normal
// velocities vn = A x + b must satisfy vn >= 0, x >= 0 and vn_i x_i = 0.
// The four active sets are tried in turn. Returns the largest increment.
fn solve_block(vc: &mut VelocityConstraint, a: &mut BodyConstraint, b: &mut BodyConstraint) -> f32 {
    let normal = vc.normal;
    let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);
    let (cp1, cp2) = (vc.points[0], vc.points[1]);

    let old = Vec2::new(cp1.normal_impulse, cp2.normal_impulse);

    let dv1 = b.v + cross_sv(b.w, cp1.r_b) - a.v - cross_sv(a.w, cp1.r_a);
    let dv2 = b.v + cross_sv(b.w, cp2.r_b) - a.v - cross_sv(a.w, cp2.r_a);
    let vn1 = dv1.dot(normal);
    let vn2 = dv2.dot(normal);

    let rhs = Vec2::new(vn1 - cp1.velocity_bias, vn2 - cp2.velocity_bias) - vc.k * old;

    let candidates = [
        // Both points active.
        -(vc.normal_mass * rhs),
        // Only the first point active.
        Vec2::new(-cp1.normal_mass * rhs.x, 0.0),
        // Only the second point active.
        Vec2::new(0.0, -cp2.normal_mass * rhs.y),
        // Neither.
        Vec2::zero(),
    ];

    let solution = candidates.iter().cloned().find(|x| {
        if x.x < 0.0 || x.y < 0.0 {
            return false;
        }
        let vn = vc.k * *x + rhs;
        // Velocities at active points are zero by construction.
        (x.x > 0.0 || vn.x >= 0.0) && (x.y > 0.0 || vn.y >= 0.0)
    });

    let x = match solution {
        Some(x) => x,
        // No solution; keep the old impulses. Happens only with degenerate
        // input.
        None => return 0.0,
    };

    let d = x - old;
    let p1 = normal * d.x;
    let p2 = normal * d.y;
    a.v -= (p1 + p2) * m_a;
    a.w -= i_a * (cross(cp1.r_a, p1) + cross(cp2.r_a, p2));
    b.v += (p1 + p2) * m_b;
    b.w += i_b * (cross(cp1.r_b, p1) + cross(cp2.r_b, p2));

    vc.points[0].normal_impulse = x.x;
    vc.points[1].normal_impulse = x.y;
    d.x.abs().max(d.y.abs())
}

/// Impulses applied to a contact during a step, reported to listeners after
/// solving.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContactImpulse {
    pub normal_impulses: SmallVec<[f32; MAX_MANIFOLD_POINTS]>,
    pub tangent_impulses: SmallVec<[f32; MAX_MANIFOLD_POINTS]>,
}

/// Integrate velocities into positions, clamping motion that would be too
/// large for one step.
pub fn integrate_positions(bodies: &mut [BodyConstraint], h: f32, max_translation: f32, max_rotation: f32) {
    for body in bodies.iter_mut() {
        let translation = body.v * h;
        if translation.magnitude2() > max_translation * max_translation {
            let ratio = max_translation / translation.magnitude();
            body.v *= ratio;
        }

        let rotation = h * body.w;
        if rotation * rotation > max_rotation * max_rotation {
            let ratio = max_rotation / rotation.abs();
            body.w *= ratio;
        }

        body.c += body.v * h;
        body.a += h * body.w;
    }
}
