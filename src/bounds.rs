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

use crate::math::*;

/// A type that can overlap another.
pub trait Overlaps<RHS> {
    /// Returns true if the two objects overlap and false otherwise.
    fn overlaps(&self, rhs: &RHS) -> bool;
}

/// A type that can completely subsume another.
pub trait Contains<RHS> {
    /// Returns true if the current object contains the argument.
    fn contains(&self, rhs: &RHS) -> bool;
}

/// Axis Aligned Bounding Boxes are closed boxes aligned to the axes of the
/// coordinate system, described by their lower and upper corners.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AABB {
    pub lower: Vec2,
    pub upper: Vec2,
}

impl AABB {
    pub fn new(lower: Vec2, upper: Vec2) -> Self {
        AABB { lower, upper }
    }

    /// The smallest AABB enclosing both points.
    pub fn from_points(a: Vec2, b: Vec2) -> Self {
        AABB {
            lower: Vec2::new(a.x.min(b.x), a.y.min(b.y)),
            upper: Vec2::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Produce a bound that encloses the two arguments.
    pub fn combine(a: &AABB, b: &AABB) -> AABB {
        AABB {
            lower: Vec2::new(a.lower.x.min(b.lower.x), a.lower.y.min(b.lower.y)),
            upper: Vec2::new(a.upper.x.max(b.upper.x), a.upper.y.max(b.upper.y)),
        }
    }

    /// The 2D equivalent of surface area, used as the insertion cost metric.
    pub fn perimeter(&self) -> f32 {
        2.0 * ((self.upper.x - self.lower.x) + (self.upper.y - self.lower.y))
    }

    pub fn center(&self) -> Vec2 {
        (self.lower + self.upper) * 0.5
    }

    /// Half widths.
    pub fn extents(&self) -> Vec2 {
        (self.upper - self.lower) * 0.5
    }

    pub fn is_valid(&self) -> bool {
        let d = self.upper - self.lower;
        d.x >= 0.0 && d.y >= 0.0 && self.lower.x.is_finite() && self.lower.y.is_finite()
            && self.upper.x.is_finite() && self.upper.y.is_finite()
    }

    /// Enlarge the AABB by r in every direction.
    pub fn fattened(&self, r: f32) -> AABB {
        let r = Vec2::new(r, r);
        AABB {
            lower: self.lower - r,
            upper: self.upper + r,
        }
    }

    /// Stretch the AABB along a displacement, keeping the original volume.
    /// This predicts where a moving object will be next step.
    pub fn extended(&self, d: Vec2) -> AABB {
        let mut out = *self;
        if d.x < 0.0 {
            out.lower.x += d.x;
        } else {
            out.upper.x += d.x;
        }
        if d.y < 0.0 {
            out.lower.y += d.y;
        } else {
            out.upper.y += d.y;
        }
        out
    }

    /// Returns the fraction along the ray at which it enters the box, or None
    /// if the ray misses within its max fraction.
    pub fn ray_cast(&self, input: &RayCastInput) -> Option<f32> {
        let mut t_min = -f32::MAX;
        let mut t_max = f32::MAX;
        let p = input.p1;
        let d = input.p2 - input.p1;
        for dim in 0..2 {
            if d[dim].abs() < COLLISION_EPSILON {
                if p[dim] < self.lower[dim] || self.upper[dim] < p[dim] {
                    return None;
                }
            } else {
                let ood = 1.0 / d[dim];
                let mut t1 = (self.lower[dim] - p[dim]) * ood;
                let mut t2 = (self.upper[dim] - p[dim]) * ood;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                }
                t_min = t_min.max(t1);
                t_max = t_max.min(t2);
                if t_min > t_max {
                    return None;
                }
            }
        }
        // Starting inside the box counts as a hit at the origin.
        let t = t_min.max(0.0);
        if t > input.max_fraction || t_max < 0.0 {
            return None;
        }
        Some(t)
    }
}

impl Overlaps<AABB> for AABB {
    fn overlaps(&self, rhs: &AABB) -> bool {
        !(rhs.lower.x > self.upper.x
          || rhs.lower.y > self.upper.y
          || self.lower.x > rhs.upper.x
          || self.lower.y > rhs.upper.y)
    }
}

impl Contains<AABB> for AABB {
    fn contains(&self, rhs: &AABB) -> bool {
        self.lower.x <= rhs.lower.x
            && self.lower.y <= rhs.lower.y
            && rhs.upper.x <= self.upper.x
            && rhs.upper.y <= self.upper.y
    }
}

impl Contains<Vec2> for AABB {
    fn contains(&self, p: &Vec2) -> bool {
        self.lower.x <= p.x && p.x <= self.upper.x && self.lower.y <= p.y && p.y <= self.upper.y
    }
}

/// A ray from p1 towards p2, limited to max_fraction of the segment.
#[derive(Copy, Clone, Debug)]
pub struct RayCastInput {
    pub p1: Vec2,
    pub p2: Vec2,
    pub max_fraction: f32,
}

/// Where a ray hit a shape.
#[derive(Copy, Clone, Debug)]
pub struct RayCastOutput {
    pub normal: Vec2,
    pub fraction: f32,
}

impl RayCastInput {
    pub fn new(p1: Vec2, p2: Vec2) -> Self {
        RayCastInput {
            p1,
            p2,
            max_fraction: 1.0,
        }
    }

    pub fn direction(&self) -> Vec2 {
        self.p2 - self.p1
    }

    /// The bounding box of the clipped ray.
    pub fn bounds(&self) -> AABB {
        let end = self.p1 + (self.p2 - self.p1) * self.max_fraction;
        AABB::from_points(self.p1, end)
    }

    /// Returns true if the ray's supporting line separates the box from the
    /// ray, which lets tree traversal prune whole subtrees.
    pub fn separates(&self, aabb: &AABB) -> bool {
        let d = self.direction();
        let len = d.magnitude();
        if len < COLLISION_EPSILON {
            return false;
        }
        let v = cross_sv(1.0, d / len);
        let abs_v = Vec2::new(v.x.abs(), v.y.abs());
        let separation = v.dot(self.p1 - aabb.center()).abs() - abs_v.dot(aabb.extents());
        separation > 0.0
    }
}

#[cfg(test)]
mod tests {
    mod bounds {
        use approx::assert_relative_eq;

        use crate::bounds::*;
        use crate::math::Vec2;

        fn square(x: f32, y: f32) -> AABB {
            AABB::new(Vec2::new(x - 1.0, y - 1.0), Vec2::new(x + 1.0, y + 1.0))
        }

        #[test]
        fn test_aabb() {
            let bound1 = square(0.0, 0.0);
            let bound2 = square(0.0, 2.0);
            let bound3 = square(0.0, 3.5);
            let combined = AABB::combine(&bound1, &bound2);
            assert!(bound1.overlaps(&bound2));
            assert!(!bound1.overlaps(&bound3));
            assert!(!bound1.contains(&bound2));
            assert!(combined.contains(&bound1));
            assert!(combined.contains(&bound2));
            assert!(!combined.contains(&bound3));
            assert_relative_eq!(combined.perimeter(), 12.0);
        }

        #[test]
        fn test_fatten_and_extend() {
            let b = square(0.0, 0.0).fattened(0.5);
            assert_eq!(b.lower, Vec2::new(-1.5, -1.5));
            let e = b.extended(Vec2::new(-2.0, 1.0));
            assert_eq!(e.lower, Vec2::new(-3.5, -1.5));
            assert_eq!(e.upper, Vec2::new(1.5, 2.5));
            assert!(e.contains(&b));
        }

        #[test]
        fn test_ray_cast() {
            let b = square(5.0, 0.0);
            let hit = RayCastInput::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0));
            assert_relative_eq!(b.ray_cast(&hit).unwrap(), 0.4);
            let miss = RayCastInput::new(Vec2::new(0.0, 2.0), Vec2::new(10.0, 2.0));
            assert!(b.ray_cast(&miss).is_none());
            let short = RayCastInput { max_fraction: 0.3, ..hit };
            assert!(b.ray_cast(&short).is_none());
            assert!(miss.separates(&b));
            assert!(!hit.separates(&b));
        }
    }
}
