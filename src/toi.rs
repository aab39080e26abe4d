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

use cgmath::InnerSpace;

use crate::distance::distance;
use crate::math::*;
use crate::shape::{DistanceProxy, MAX_POLYGON_VERTICES};
use crate::simplex::SimplexCache;

/// Outcome of a time of impact query.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ToiState {
    Unknown,
    /// The iteration budget ran out or the root finder could not make
    /// progress. The returned time is still a safe lower bound.
    Failed,
    /// The cores overlap at the start of the interval.
    Overlapped,
    /// The shapes come within the target distance at the returned time.
    Touching,
    /// The shapes never come within the target distance.
    Separated,
}

/// Tolerances and budgets for time of impact queries.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ToiConf {
    pub linear_slop: f32,
    /// How far the rounded shapes are allowed to sink into each other.
    pub target_depth: f32,
    pub tolerance: f32,
    /// Final time of the interval to search, in [0, 1].
    pub t_max: f32,
    pub max_toi_iters: usize,
    pub max_root_iters: usize,
    pub max_distance_iters: usize,
}

impl Default for ToiConf {
    fn default() -> Self {
        let linear_slop = 0.005;
        ToiConf {
            linear_slop,
            target_depth: 3.0 * linear_slop,
            tolerance: linear_slop / 4.0,
            t_max: 1.0,
            max_toi_iters: 20,
            max_root_iters: 50,
            max_distance_iters: 20,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ToiOutput {
    pub state: ToiState,
    pub t: f32,
    pub toi_iters: usize,
    pub max_dist_iters: usize,
    pub max_root_iters: usize,
}

#[derive(Copy, Clone, Debug)]
enum SeparationKind {
    Points,
    FaceA,
    FaceB,
}

/// The separation of two swept proxies along a fixed axis, parameterized by
/// time. Built from the simplex of the last distance query.
struct SeparationFunction<'a> {
    proxy_a: &'a DistanceProxy,
    proxy_b: &'a DistanceProxy,
    sweep_a: Sweep,
    sweep_b: Sweep,
    kind: SeparationKind,
    local_point: Vec2,
    axis: Vec2,
}

impl<'a> SeparationFunction<'a> {
    fn new(
        cache: &SimplexCache,
        proxy_a: &'a DistanceProxy,
        sweep_a: Sweep,
        proxy_b: &'a DistanceProxy,
        sweep_b: Sweep,
        t1: f32,
    ) -> Self {
        let xf_a = sweep_a.transform_at(t1);
        let xf_b = sweep_b.transform_at(t1);
        let fallback = Vec2::new(1.0, 0.0);

        if cache.count == 1 {
            let point_a = xf_a.apply(proxy_a.vertex(cache.index_a[0]));
            let point_b = xf_b.apply(proxy_b.vertex(cache.index_b[0]));
            return SeparationFunction {
                proxy_a,
                proxy_b,
                sweep_a,
                sweep_b,
                kind: SeparationKind::Points,
                local_point: Vec2::new(0.0, 0.0),
                axis: normalize_or_none(point_b - point_a).unwrap_or(fallback),
            };
        }

        if cache.index_a[0] == cache.index_a[1] {
            // Two points on B and one on A.
            let b1 = proxy_b.vertex(cache.index_b[0]);
            let b2 = proxy_b.vertex(cache.index_b[1]);
            let mut axis = normalize_or_none(cross_vs(b2 - b1, 1.0)).unwrap_or(fallback);
            let normal = xf_b.q.rotate(axis);
            let local_point = (b1 + b2) * 0.5;
            let point_b = xf_b.apply(local_point);
            let point_a = xf_a.apply(proxy_a.vertex(cache.index_a[0]));
            if (point_a - point_b).dot(normal) < 0.0 {
                axis = -axis;
            }
            SeparationFunction {
                proxy_a,
                proxy_b,
                sweep_a,
                sweep_b,
                kind: SeparationKind::FaceB,
                local_point,
                axis,
            }
        } else {
            // Two points on A and one or two points on B.
            let a1 = proxy_a.vertex(cache.index_a[0]);
            let a2 = proxy_a.vertex(cache.index_a[1]);
            let mut axis = normalize_or_none(cross_vs(a2 - a1, 1.0)).unwrap_or(fallback);
            let normal = xf_a.q.rotate(axis);
            let local_point = (a1 + a2) * 0.5;
            let point_a = xf_a.apply(local_point);
            let point_b = xf_b.apply(proxy_b.vertex(cache.index_b[0]));
            if (point_b - point_a).dot(normal) < 0.0 {
                axis = -axis;
            }
            SeparationFunction {
                proxy_a,
                proxy_b,
                sweep_a,
                sweep_b,
                kind: SeparationKind::FaceA,
                local_point,
                axis,
            }
        }
    }

    /// Deepest points along the axis at time t, and their separation.
    fn find_min_separation(&self, t: f32) -> (f32, usize, usize) {
        let xf_a = self.sweep_a.transform_at(t);
        let xf_b = self.sweep_b.transform_at(t);
        match self.kind {
            SeparationKind::Points => {
                let index_a = self.proxy_a.support(xf_a.q.inv_rotate(self.axis));
                let index_b = self.proxy_b.support(xf_b.q.inv_rotate(-self.axis));
                (self.evaluate(index_a, index_b, t), index_a, index_b)
            },
            SeparationKind::FaceA => {
                let normal = xf_a.q.rotate(self.axis);
                let index_b = self.proxy_b.support(xf_b.q.inv_rotate(-normal));
                (self.evaluate(0, index_b, t), 0, index_b)
            },
            SeparationKind::FaceB => {
                let normal = xf_b.q.rotate(self.axis);
                let index_a = self.proxy_a.support(xf_a.q.inv_rotate(-normal));
                (self.evaluate(index_a, 0, t), index_a, 0)
            },
        }
    }

    /// Separation of the given vertices along the axis at time t.
    fn evaluate(&self, index_a: usize, index_b: usize, t: f32) -> f32 {
        let xf_a = self.sweep_a.transform_at(t);
        let xf_b = self.sweep_b.transform_at(t);
        match self.kind {
            SeparationKind::Points => {
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(self.axis)
            },
            SeparationKind::FaceA => {
                let normal = xf_a.q.rotate(self.axis);
                let point_a = xf_a.apply(self.local_point);
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(normal)
            },
            SeparationKind::FaceB => {
                let normal = xf_b.q.rotate(self.axis);
                let point_b = xf_b.apply(self.local_point);
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                (point_a - point_b).dot(normal)
            },
        }
    }
}

/// Compute the upper bound on time before two swept shapes penetrate, using
/// conservative advancement: separating axes from the distance routine are
/// pushed back in time until no vertex crosses them, solving for the root of
/// each axis with alternating bisection and secant steps.
///
/// Time is expressed as a fraction of the sweeps' interval.
pub fn time_of_impact(
    proxy_a: &DistanceProxy,
    sweep_a: &Sweep,
    proxy_b: &DistanceProxy,
    sweep_b: &Sweep,
    conf: &ToiConf,
) -> ToiOutput {
    let mut output = ToiOutput {
        state: ToiState::Unknown,
        t: conf.t_max,
        toi_iters: 0,
        max_dist_iters: 0,
        max_root_iters: 0,
    };

    // Large rotations can make the root finder fail, so normalize angles.
    let mut sweep_a = *sweep_a;
    let mut sweep_b = *sweep_b;
    sweep_a.normalize();
    sweep_b.normalize();

    let total_radius = proxy_a.radius + proxy_b.radius;
    let target = conf.linear_slop.max(total_radius - conf.target_depth);
    let tolerance = conf.tolerance;
    debug_assert!(target > tolerance);

    let mut t1 = 0.0;
    let mut cache = SimplexCache::default();

    // The outer loop progressively attempts to compute new separating axes.
    loop {
        let xf_a = sweep_a.transform_at(t1);
        let xf_b = sweep_b.transform_at(t1);

        // Get the distance between the cores at t1.
        let dist = distance(proxy_a, &xf_a, proxy_b, &xf_b, &mut cache, conf.max_distance_iters);
        output.max_dist_iters = cmp::max(output.max_dist_iters, dist.iterations);

        if dist.distance <= 0.0 {
            output.state = ToiState::Overlapped;
            output.t = 0.0;
            break;
        }

        if dist.distance < target + tolerance {
            output.state = ToiState::Touching;
            output.t = t1;
            break;
        }

        let fcn = SeparationFunction::new(&cache, proxy_a, sweep_a, proxy_b, sweep_b, t1);

        // Resolve the deepest point along this axis. The loop ends when the
        // axis is repeated, so it is bounded by the vertex count.
        let mut done = false;
        let mut t2 = conf.t_max;
        for _ in 0..MAX_POLYGON_VERTICES {
            let (mut s2, index_a, index_b) = fcn.find_min_separation(t2);

            if s2 > target + tolerance {
                output.state = ToiState::Separated;
                output.t = conf.t_max;
                done = true;
                break;
            }

            // Has the separation reached tolerance?
            if s2 > target - tolerance {
                t1 = t2;
                break;
            }

            let mut s1 = fcn.evaluate(index_a, index_b, t1);

            // The initial separation must be above the target, or the root
            // finder has nothing to bracket.
            if s1 < target - tolerance {
                output.state = ToiState::Failed;
                output.t = t1;
                done = true;
                break;
            }

            if s1 <= target + tolerance {
                output.state = ToiState::Touching;
                output.t = t1;
                done = true;
                break;
            }

            // 1D root of f(t) - target = 0.
            let mut a1 = t1;
            let mut a2 = t2;
            let mut root_iters = 0;
            while root_iters < conf.max_root_iters {
                // Mix secant and bisection steps.
                let t = if root_iters & 1 == 1 {
                    a1 + (target - s1) * (a2 - a1) / (s2 - s1)
                } else {
                    0.5 * (a1 + a2)
                };
                root_iters += 1;

                let s = fcn.evaluate(index_a, index_b, t);
                if (s - target).abs() < tolerance {
                    t2 = t;
                    break;
                }

                if s > target {
                    a1 = t;
                    s1 = s;
                } else {
                    a2 = t;
                    s2 = s;
                }
            }
            output.max_root_iters = cmp::max(output.max_root_iters, root_iters);
        }

        output.toi_iters += 1;
        if done {
            break;
        }

        if output.toi_iters == conf.max_toi_iters {
            // Root finder got stuck. Semi-victory.
            output.state = ToiState::Failed;
            output.t = t1;
            break;
        }
    }

    output
}

#[cfg(test)]
mod tests {
    mod toi {
        use approx::assert_relative_eq;

        use crate::math::*;
        use crate::shape::{Geometry, Polygon};
        use crate::toi::*;

        fn moving(from: Vec2, to: Vec2) -> Sweep {
            let mut sweep = Sweep::new(&Transform::new(from, 0.0), Vec2::new(0.0, 0.0));
            sweep.c = to;
            sweep
        }

        #[test]
        fn test_touching() {
            let wall = Geometry::Polygon(Polygon::new_box(0.5, 5.0)).proxy(0);
            let bullet = Geometry::disk(0.5).proxy(0);
            let still = moving(Vec2::new(0.0, 0.0), Vec2::new(0.0, 0.0));
            let fast = moving(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0));

            let conf = ToiConf::default();
            let out = time_of_impact(&wall, &still, &bullet, &fast, &conf);
            assert_eq!(out.state, ToiState::Touching);

            // Core gap closes to the target of radius sum minus target depth.
            let target = wall.radius + bullet.radius - conf.target_depth;
            let expected = (9.5 - target) / 20.0;
            assert_relative_eq!(out.t, expected, epsilon = 1.0e-3);
            assert!(out.toi_iters >= 1);
            assert!(out.toi_iters <= conf.max_toi_iters);
        }

        #[test]
        fn test_separated() {
            let wall = Geometry::Polygon(Polygon::new_box(0.5, 5.0)).proxy(0);
            let bullet = Geometry::disk(0.5).proxy(0);
            let still = moving(Vec2::new(0.0, 0.0), Vec2::new(0.0, 0.0));
            let passing = moving(Vec2::new(-10.0, 8.0), Vec2::new(10.0, 8.0));
            let out = time_of_impact(&wall, &still, &bullet, &passing, &ToiConf::default());
            assert_eq!(out.state, ToiState::Separated);
            assert_eq!(out.t, 1.0);
        }

        #[test]
        fn test_overlapped() {
            let wall = Geometry::Polygon(Polygon::new_box(0.5, 5.0)).proxy(0);
            let bullet = Geometry::disk(0.5).proxy(0);
            let still = moving(Vec2::new(0.0, 0.0), Vec2::new(0.0, 0.0));
            let inside = moving(Vec2::new(0.1, 0.0), Vec2::new(5.0, 0.0));
            let out = time_of_impact(&wall, &still, &bullet, &inside, &ToiConf::default());
            assert_eq!(out.state, ToiState::Overlapped);
            assert_eq!(out.t, 0.0);
        }

        #[test]
        fn test_rotating_boxes() {
            let a = Geometry::Polygon(Polygon::new_box(0.5, 0.5)).proxy(0);
            let still = moving(Vec2::new(0.0, 0.0), Vec2::new(0.0, 0.0));
            let mut spinning = moving(Vec2::new(-5.0, 0.3), Vec2::new(5.0, 0.3));
            spinning.a = 3.0;
            let conf = ToiConf::default();
            let out = time_of_impact(&a, &still, &a, &spinning, &conf);
            assert_eq!(out.state, ToiState::Touching);
            assert!(out.t > 0.3 && out.t < 0.5, "t = {}", out.t);
        }
    }
}
