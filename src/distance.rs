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
use crate::shape::DistanceProxy;
use crate::simplex::{Simplex, SimplexCache, SimplexVertex};

/// Default cap on GJK iterations.
pub const DEFAULT_MAX_DISTANCE_ITERS: usize = 20;

/// Result of a distance query between the cores of two proxies.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DistanceOutput {
    /// Closest point on A.
    pub point_a: Vec2,
    /// Closest point on B.
    pub point_b: Vec2,
    pub distance: f32,
    pub iterations: usize,
}

impl DistanceOutput {
    /// Move the witness points out to the rounded surfaces of the proxies.
    pub fn with_radii(mut self, r_a: f32, r_b: f32) -> Self {
        if self.distance > r_a + r_b && self.distance > f32::EPSILON {
            self.distance -= r_a + r_b;
            let normal = (self.point_b - self.point_a).normalize();
            self.point_a += normal * r_a;
            self.point_b -= normal * r_b;
        } else {
            // Shapes are overlapping when radii are considered.
            let p = (self.point_a + self.point_b) * 0.5;
            self.point_a = p;
            self.point_b = p;
            self.distance = 0.0;
        }
        self
    }
}

/// Compute the closest points between the cores of two convex proxies with
/// GJK. The cache is read to warm start the simplex and written back with
/// the final simplex.
pub fn distance(
    proxy_a: &DistanceProxy,
    xf_a: &Transform,
    proxy_b: &DistanceProxy,
    xf_b: &Transform,
    cache: &mut SimplexCache,
    max_iters: usize,
) -> DistanceOutput {
    let mut simplex = Simplex::from_cache(cache, proxy_a, xf_a, proxy_b, xf_b);

    let mut save_a = [0usize; 3];
    let mut save_b = [0usize; 3];

    let mut iter = 0;
    while iter < max_iters {
        let save_count = simplex.count;
        for i in 0..save_count {
            save_a[i] = simplex.vertices[i].index_a;
            save_b[i] = simplex.vertices[i].index_b;
        }

        simplex.solve();

        // The origin is inside the triangle, so the shapes overlap.
        if simplex.count == 3 {
            break;
        }

        let d = simplex.search_direction();
        // The origin is probably on the simplex. Stop rather than risk a
        // direction built from noise.
        if d.magnitude2() < f32::EPSILON * f32::EPSILON {
            break;
        }

        let index_a = proxy_a.support(xf_a.q.inv_rotate(-d));
        let index_b = proxy_b.support(xf_b.q.inv_rotate(d));
        let vertex = SimplexVertex::new(proxy_a, xf_a, index_a, proxy_b, xf_b, index_b);

        iter += 1;

        // A repeated support point means no progress is possible.
        let duplicate = (0..save_count).any(|i| index_a == save_a[i] && index_b == save_b[i]);
        if duplicate {
            break;
        }

        simplex.vertices[simplex.count] = vertex;
        simplex.count += 1;
    }

    let (point_a, point_b) = simplex.witness_points();
    simplex.write_cache(cache);
    DistanceOutput {
        point_a,
        point_b,
        distance: (point_b - point_a).magnitude(),
        iterations: iter,
    }
}

/// Returns true if the rounded shapes overlap.
pub fn test_overlap(
    proxy_a: &DistanceProxy,
    xf_a: &Transform,
    proxy_b: &DistanceProxy,
    xf_b: &Transform,
) -> bool {
    let mut cache = SimplexCache::default();
    let output = distance(proxy_a, xf_a, proxy_b, xf_b, &mut cache, DEFAULT_MAX_DISTANCE_ITERS);
    output.distance < 10.0 * f32::EPSILON + proxy_a.radius + proxy_b.radius
}

#[cfg(test)]
mod tests {
    mod distance {
        use approx::assert_relative_eq;

        use crate::distance::*;
        use crate::math::*;
        use crate::shape::{Geometry, Polygon};
        use crate::simplex::SimplexCache;

        #[test]
        fn test_disks() {
            let a = Geometry::disk(1.0).proxy(0);
            let b = Geometry::disk(0.5).proxy(0);
            let xf_a = Transform::new(Vec2::new(0.0, 0.0), 0.0);
            let xf_b = Transform::new(Vec2::new(4.0, 0.0), 0.0);
            let mut cache = SimplexCache::default();
            let out = distance(&a, &xf_a, &b, &xf_b, &mut cache, DEFAULT_MAX_DISTANCE_ITERS);
            assert_relative_eq!(out.distance, 4.0);
            let out = out.with_radii(a.radius, b.radius);
            assert_relative_eq!(out.distance, 2.5);
            assert_relative_eq!(out.point_a.x, 1.0);
            assert_relative_eq!(out.point_b.x, 3.5);
            assert!(!test_overlap(&a, &xf_a, &b, &xf_b));
        }

        #[test]
        fn test_boxes() {
            let a = Geometry::Polygon(Polygon::new_box(1.0, 1.0)).proxy(0);
            let xf_a = Transform::identity();
            let xf_b = Transform::new(Vec2::new(3.0, 0.5), 0.0);
            let mut cache = SimplexCache::default();
            let out = distance(&a, &xf_a, &a, &xf_b, &mut cache, DEFAULT_MAX_DISTANCE_ITERS);
            assert_relative_eq!(out.distance, 1.0, epsilon = 1.0e-5);
            assert_relative_eq!(out.point_a.x, 1.0, epsilon = 1.0e-5);
            assert_relative_eq!(out.point_b.x, 2.0, epsilon = 1.0e-5);
            assert!(out.iterations <= DEFAULT_MAX_DISTANCE_ITERS);

            // Warm starting from the cache of an identical query converges at
            // least as fast.
            let again = distance(&a, &xf_a, &a, &xf_b, &mut cache, DEFAULT_MAX_DISTANCE_ITERS);
            assert!(again.iterations <= out.iterations);
            assert_relative_eq!(again.distance, out.distance, epsilon = 1.0e-5);
        }

        #[test]
        fn test_overlapping() {
            let a = Geometry::Polygon(Polygon::new_box(1.0, 1.0)).proxy(0);
            let b = Geometry::disk(0.5).proxy(0);
            let xf_a = Transform::identity();
            let xf_b = Transform::new(Vec2::new(0.25, 0.25), 0.0);
            let mut cache = SimplexCache::default();
            let out = distance(&a, &xf_a, &b, &xf_b, &mut cache, DEFAULT_MAX_DISTANCE_ITERS);
            assert_relative_eq!(out.distance, 0.0, epsilon = 1.0e-5);
            assert!(test_overlap(&a, &xf_a, &b, &xf_b));

            // Separated cores but overlapping radii.
            let xf_b = Transform::new(Vec2::new(1.4, 0.0), 0.0);
            assert!(test_overlap(&a, &xf_a, &b, &xf_b));
        }
    }
}
