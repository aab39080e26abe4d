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
use std::ops::Mul;

use cgmath::{InnerSpace, Vector2, Zero};

/// All positions, directions and velocities are two dimensional single
/// precision vectors.
pub type Vec2 = Vector2<f32>;

/// Maximum tolerence for error, i.e. what we consider the x86 floating
/// point epsilon.
pub const COLLISION_EPSILON: f32 = f32::EPSILON;

/// Two dimensional cross product. Returns the z component of the 3D cross
/// product of the two vectors.
#[inline(always)]
pub fn cross(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Cross product of a vector and a scalar (a vector pointing out of the
/// plane). Produces the vector rotated clockwise and scaled by s.
#[inline(always)]
pub fn cross_vs(v: Vec2, s: f32) -> Vec2 {
    Vec2::new(s * v.y, -s * v.x)
}

/// Cross product of a scalar and a vector. Produces the vector rotated
/// counter-clockwise and scaled by s.
#[inline(always)]
pub fn cross_sv(s: f32, v: Vec2) -> Vec2 {
    Vec2::new(-s * v.y, s * v.x)
}

/// Normalizes v, returning None if v is too short to have a direction.
pub fn normalize_or_none(v: Vec2) -> Option<Vec2> {
    let len = v.magnitude();
    if len < COLLISION_EPSILON {
        None
    } else {
        Some(v / len)
    }
}

#[inline(always)]
pub fn clamp(n: f32, min: f32, max: f32) -> f32 {
    if n < min {
        min
    } else if n > max {
        max
    } else {
        n
    }
}

/// A rotation stored as the sine and cosine of its angle.
///
/// Kept instead of `Basis2` so that `rotate` and `inv_rotate` share one
/// cached pair and the sweep can rebuild it from an angle without a matrix.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Rot {
    pub s: f32,
    pub c: f32,
}

impl Rot {
    pub fn new(angle: f32) -> Self {
        Rot {
            s: angle.sin(),
            c: angle.cos(),
        }
    }

    pub fn identity() -> Self {
        Rot { s: 0.0, c: 1.0 }
    }

    pub fn angle(&self) -> f32 {
        self.s.atan2(self.c)
    }

    /// The rotated x axis.
    pub fn x_axis(&self) -> Vec2 {
        Vec2::new(self.c, self.s)
    }

    /// Rotate a vector.
    #[inline(always)]
    pub fn rotate(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    /// Rotate a vector by the inverse of the rotation.
    #[inline(always)]
    pub fn inv_rotate(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }

    /// Compose the inverse of self with r.
    pub fn inv_mul(&self, r: Rot) -> Rot {
        Rot {
            s: self.c * r.s - self.s * r.c,
            c: self.c * r.c + self.s * r.s,
        }
    }
}

impl Mul for Rot {
    type Output = Rot;

    fn mul(self, r: Rot) -> Rot {
        Rot {
            s: self.s * r.c + self.c * r.s,
            c: self.c * r.c - self.s * r.s,
        }
    }
}

/// A rigid transformation: a translation and a rotation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Transform {
    pub p: Vec2,
    pub q: Rot,
}

impl Transform {
    pub fn new(p: Vec2, angle: f32) -> Self {
        Transform { p, q: Rot::new(angle) }
    }

    pub fn identity() -> Self {
        Transform {
            p: Vec2::zero(),
            q: Rot::identity(),
        }
    }

    /// Transform a point from local space to world space.
    #[inline(always)]
    pub fn apply(&self, v: Vec2) -> Vec2 {
        self.q.rotate(v) + self.p
    }

    /// Transform a point from world space to local space.
    #[inline(always)]
    pub fn apply_inv(&self, v: Vec2) -> Vec2 {
        self.q.inv_rotate(v - self.p)
    }

    /// Returns the transform taking points in the local space of b into the
    /// local space of self.
    pub fn inv_mul(&self, b: &Transform) -> Transform {
        Transform {
            p: self.q.inv_rotate(b.p - self.p),
            q: self.q.inv_mul(b.q),
        }
    }
}

/// Describes the motion of a body over a time step for time of impact
/// computation. Shapes are defined relative to the body origin, which may not
/// coincide with the center of mass, but rotation happens about the center of
/// mass.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sweep {
    /// Center of mass in body coordinates.
    pub local_center: Vec2,
    /// Center of mass at the start of the interval.
    pub c0: Vec2,
    /// Center of mass at the end of the interval.
    pub c: Vec2,
    pub a0: f32,
    pub a: f32,
    /// Fraction of the current time step at which c0 and a0 hold.
    pub alpha0: f32,
}

impl Sweep {
    pub fn new(xf: &Transform, local_center: Vec2) -> Self {
        let c = xf.apply(local_center);
        let a = xf.q.angle();
        Sweep {
            local_center,
            c0: c,
            c,
            a0: a,
            a,
            alpha0: 0.0,
        }
    }

    /// Get the interpolated transform at a specific fraction of the time step.
    /// beta is 0 at alpha0 and 1 at the end of the step.
    pub fn transform_at(&self, beta: f32) -> Transform {
        let c = self.c0 * (1.0 - beta) + self.c * beta;
        let q = Rot::new((1.0 - beta) * self.a0 + beta * self.a);
        Transform {
            p: c - q.rotate(self.local_center),
            q,
        }
    }

    /// Advance the start of the sweep forward to a new fraction of the step,
    /// yielding a new starting state.
    pub fn advance(&mut self, alpha: f32) {
        debug_assert!(self.alpha0 < 1.0);
        let beta = (alpha - self.alpha0) / (1.0 - self.alpha0);
        self.c0 += (self.c - self.c0) * beta;
        self.a0 += beta * (self.a - self.a0);
        self.alpha0 = alpha;
    }

    /// Normalize the angles into [0, 2pi) to keep precision over long runs.
    pub fn normalize(&mut self) {
        let two_pi = 2.0 * f32::consts::PI;
        let d = two_pi * (self.a0 / two_pi).floor();
        self.a0 -= d;
        self.a -= d;
    }
}

#[cfg(test)]
mod tests {
    mod math {
        use approx::assert_relative_eq;
        use cgmath::InnerSpace;

        use crate::math::*;

        #[test]
        fn test_rot() {
            let q = Rot::new(std::f32::consts::FRAC_PI_2);
            let v = q.rotate(Vec2::new(1.0, 0.0));
            assert_relative_eq!(v.x, 0.0, epsilon = 1.0e-6);
            assert_relative_eq!(v.y, 1.0, epsilon = 1.0e-6);
            let w = q.inv_rotate(v);
            assert_relative_eq!(w.x, 1.0, epsilon = 1.0e-6);
            assert_relative_eq!(w.y, 0.0, epsilon = 1.0e-6);
            assert_relative_eq!((q * q).angle(), std::f32::consts::PI, epsilon = 1.0e-6);
        }

        #[test]
        fn test_transform() {
            let a = Transform::new(Vec2::new(1.0, 2.0), 0.3);
            let b = Transform::new(Vec2::new(-4.0, 0.5), -1.1);
            let p = Vec2::new(0.25, 7.0);
            let rel = a.inv_mul(&b);
            let direct = a.apply_inv(b.apply(p));
            let composed = rel.apply(p);
            assert_relative_eq!((direct - composed).magnitude(), 0.0, epsilon = 1.0e-5);
            assert_relative_eq!(a.apply_inv(a.apply(p)).y, p.y, epsilon = 1.0e-5);
        }

        #[test]
        fn test_cross() {
            let a = Vec2::new(1.0, 0.0);
            let b = Vec2::new(0.0, 1.0);
            assert_eq!(cross(a, b), 1.0);
            assert_eq!(cross_sv(1.0, a), b);
            assert_eq!(cross_vs(b, 1.0), a);
        }

        #[test]
        fn test_sweep() {
            let xf = Transform::new(Vec2::new(0.0, 0.0), 0.0);
            let mut sweep = Sweep::new(&xf, Vec2::new(0.0, 0.0));
            sweep.c = Vec2::new(10.0, 0.0);
            let mid = sweep.transform_at(0.5);
            assert_relative_eq!(mid.p.x, 5.0);
            sweep.advance(0.5);
            assert_relative_eq!(sweep.c0.x, 5.0);
            assert_relative_eq!(sweep.alpha0, 0.5);
            // After advancing, beta is relative to the remaining interval.
            let end = sweep.transform_at(1.0);
            assert_relative_eq!(end.p.x, 10.0);
        }
    }
}
