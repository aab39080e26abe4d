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
use std::fmt;

use cgmath::{InnerSpace, Zero};

use crate::math::*;
use crate::shape::DistanceProxy;

/// Remembers which vertices made up the last simplex of a pair so the next
/// distance query can start from it.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SimplexCache {
    /// Length or area of the cached simplex, used to detect large changes.
    pub metric: f32,
    pub count: usize,
    pub index_a: [usize; 3],
    pub index_b: [usize; 3],
}

/// A point of the Minkowski difference B - A along with the support points
/// that produced it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SimplexVertex {
    pub w_a: Vec2,
    pub w_b: Vec2,
    /// w_b - w_a
    pub w: Vec2,
    /// Barycentric coordinate of the closest point.
    pub a: f32,
    pub index_a: usize,
    pub index_b: usize,
}

impl SimplexVertex {
    pub fn new(
        proxy_a: &DistanceProxy,
        xf_a: &Transform,
        index_a: usize,
        proxy_b: &DistanceProxy,
        xf_b: &Transform,
        index_b: usize,
    ) -> Self {
        let w_a = xf_a.apply(proxy_a.vertex(index_a));
        let w_b = xf_b.apply(proxy_b.vertex(index_b));
        SimplexVertex {
            w_a,
            w_b,
            w: w_b - w_a,
            a: 1.0,
            index_a,
            index_b,
        }
    }
}

/// A point, segment or triangle in Minkowski space.
#[derive(Copy, Clone)]
pub struct Simplex {
    pub vertices: [SimplexVertex; 3],
    pub count: usize,
}

impl fmt::Debug for Simplex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        #[derive(Debug)]
        enum StateName {
            Vertex,
            Edge,
            Face,
        }
        let state = match self.count {
            1 => StateName::Vertex,
            2 => StateName::Edge,
            _ => StateName::Face,
        };
        write!(f, "Simplex {{ state: {:?}, vertices: {:?} }}", state, &self.vertices[..self.count])
    }
}

impl Simplex {
    /// Rebuild a simplex from the cache, falling back to a single vertex if
    /// the cached simplex has changed shape too much to be useful.
    pub fn from_cache(
        cache: &SimplexCache,
        proxy_a: &DistanceProxy,
        xf_a: &Transform,
        proxy_b: &DistanceProxy,
        xf_b: &Transform,
    ) -> Self {
        let first = SimplexVertex::new(proxy_a, xf_a, 0, proxy_b, xf_b, 0);
        let mut simplex = Simplex {
            vertices: [first; 3],
            count: 0,
        };
        for i in 0..cache.count.min(3) {
            let (ia, ib) = (cache.index_a[i], cache.index_b[i]);
            if ia >= proxy_a.count() || ib >= proxy_b.count() {
                simplex.count = 0;
                break;
            }
            simplex.vertices[i] = SimplexVertex::new(proxy_a, xf_a, ia, proxy_b, xf_b, ib);
            simplex.count = i + 1;
        }

        if simplex.count > 1 {
            let metric1 = cache.metric;
            let metric2 = simplex.metric();
            if metric2 < 0.5 * metric1 || 2.0 * metric1 < metric2 || metric2 < f32::EPSILON {
                simplex.count = 0;
            }
        }

        if simplex.count == 0 {
            simplex.vertices[0] = first;
            simplex.count = 1;
        }
        simplex
    }

    pub fn write_cache(&self, cache: &mut SimplexCache) {
        cache.metric = self.metric();
        cache.count = self.count;
        for i in 0..self.count {
            cache.index_a[i] = self.vertices[i].index_a;
            cache.index_b[i] = self.vertices[i].index_b;
        }
    }

    pub fn metric(&self) -> f32 {
        let v = &self.vertices;
        match self.count {
            2 => (v[0].w - v[1].w).magnitude(),
            3 => cross(v[1].w - v[0].w, v[2].w - v[0].w),
            _ => 0.0,
        }
    }

    /// Direction from the simplex towards the origin.
    pub fn search_direction(&self) -> Vec2 {
        let v = &self.vertices;
        match self.count {
            1 => -v[0].w,
            2 => {
                let e12 = v[1].w - v[0].w;
                let sgn = cross(e12, -v[0].w);
                if sgn > 0.0 {
                    // Origin is left of e12.
                    cross_sv(1.0, e12)
                } else {
                    cross_vs(e12, 1.0)
                }
            },
            _ => Vec2::zero(),
        }
    }

    /// Witness points on A and B.
    pub fn witness_points(&self) -> (Vec2, Vec2) {
        let v = &self.vertices;
        match self.count {
            1 => (v[0].w_a, v[0].w_b),
            2 => (
                v[0].w_a * v[0].a + v[1].w_a * v[1].a,
                v[0].w_b * v[0].a + v[1].w_b * v[1].a,
            ),
            _ => {
                let p = v[0].w_a * v[0].a + v[1].w_a * v[1].a + v[2].w_a * v[2].a;
                (p, p)
            },
        }
    }

    /// Reduce the simplex to the sub-simplex closest to the origin, updating
    /// barycentric coordinates.
    pub fn solve(&mut self) {
        match self.count {
            2 => self.solve2(),
            3 => self.solve3(),
            _ => (),
        }
    }

    // Closest point on a segment, using barycentric coordinates. Voronoi
    // regions are tested for each vertex, then the edge.
    fn solve2(&mut self) {
        let w1 = self.vertices[0].w;
        let w2 = self.vertices[1].w;
        let e12 = w2 - w1;

        let d12_2 = -w1.dot(e12);
        if d12_2 <= 0.0 {
            self.vertices[0].a = 1.0;
            self.count = 1;
            return;
        }

        let d12_1 = w2.dot(e12);
        if d12_1 <= 0.0 {
            self.vertices[1].a = 1.0;
            self.count = 1;
            self.vertices[0] = self.vertices[1];
            return;
        }

        let inv_d12 = 1.0 / (d12_1 + d12_2);
        self.vertices[0].a = d12_1 * inv_d12;
        self.vertices[1].a = d12_2 * inv_d12;
        self.count = 2;
    }

    fn solve3(&mut self) {
        let w1 = self.vertices[0].w;
        let w2 = self.vertices[1].w;
        let w3 = self.vertices[2].w;

        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        let n123 = cross(e12, e13);
        let d123_1 = n123 * cross(w2, w3);
        let d123_2 = n123 * cross(w3, w1);
        let d123_3 = n123 * cross(w1, w2);

        // w1 region
        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.vertices[0].a = 1.0;
            self.count = 1;
            return;
        }

        // e12
        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv_d12 = 1.0 / (d12_1 + d12_2);
            self.vertices[0].a = d12_1 * inv_d12;
            self.vertices[1].a = d12_2 * inv_d12;
            self.count = 2;
            return;
        }

        // e13
        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv_d13 = 1.0 / (d13_1 + d13_2);
            self.vertices[0].a = d13_1 * inv_d13;
            self.vertices[2].a = d13_2 * inv_d13;
            self.count = 2;
            self.vertices[1] = self.vertices[2];
            return;
        }

        // w2 region
        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.vertices[1].a = 1.0;
            self.count = 1;
            self.vertices[0] = self.vertices[1];
            return;
        }

        // w3 region
        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.vertices[2].a = 1.0;
            self.count = 1;
            self.vertices[0] = self.vertices[2];
            return;
        }

        // e23
        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv_d23 = 1.0 / (d23_1 + d23_2);
            self.vertices[1].a = d23_1 * inv_d23;
            self.vertices[2].a = d23_2 * inv_d23;
            self.count = 2;
            self.vertices[0] = self.vertices[2];
            return;
        }

        // Must be in the triangle.
        let inv_d123 = 1.0 / (d123_1 + d123_2 + d123_3);
        self.vertices[0].a = d123_1 * inv_d123;
        self.vertices[1].a = d123_2 * inv_d123;
        self.vertices[2].a = d123_3 * inv_d123;
        self.count = 3;
    }
}

#[cfg(test)]
mod tests {
    mod simplex {
        use approx::assert_relative_eq;
        use cgmath::InnerSpace;

        use crate::math::*;
        use crate::shape::Geometry;
        use crate::simplex::*;

        #[test]
        fn test_solve2() {
            // Segment from (-1, 1) to (1, 1); the closest point to the origin
            // is its midpoint.
            let a = Geometry::disk(0.5).proxy(0);
            let b = Geometry::edge(Vec2::new(-1.0, 1.0), Vec2::new(1.0, 1.0)).proxy(0);
            let xf = Transform::identity();
            let mut simplex = Simplex {
                vertices: [
                    SimplexVertex::new(&a, &xf, 0, &b, &xf, 0),
                    SimplexVertex::new(&a, &xf, 0, &b, &xf, 1),
                    SimplexVertex::new(&a, &xf, 0, &b, &xf, 1),
                ],
                count: 2,
            };
            simplex.solve();
            assert_eq!(simplex.count, 2);
            let (pa, pb) = simplex.witness_points();
            assert_relative_eq!(pa.magnitude(), 0.0);
            assert_relative_eq!(pb.x, 0.0, epsilon = 1.0e-6);
            assert_relative_eq!(pb.y, 1.0, epsilon = 1.0e-6);
            let d = simplex.search_direction();
            assert!(d.dot(Vec2::new(0.0, -1.0)) > 0.0);
        }

        #[test]
        fn test_cache_rejects_stale_metric() {
            let a = Geometry::disk(0.5).proxy(0);
            let b = Geometry::edge(Vec2::new(-1.0, 1.0), Vec2::new(1.0, 1.0)).proxy(0);
            let xf = Transform::identity();
            let cache = SimplexCache {
                metric: 100.0,
                count: 2,
                index_a: [0, 0, 0],
                index_b: [0, 1, 0],
            };
            let simplex = Simplex::from_cache(&cache, &a, &xf, &b, &xf);
            assert_eq!(simplex.count, 1);

            let cache = SimplexCache { metric: 2.0, ..cache };
            let simplex = Simplex::from_cache(&cache, &a, &xf, &b, &xf);
            assert_eq!(simplex.count, 2);
        }
    }
}
