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

//! Narrow phase manifold generation.
//!
//! Every shape is reduced to a `DistanceProxy`. Proxies with one vertex are
//! treated as disks and everything else as a (possibly two sided) polygon, so
//! three routines cover every pair of shape kinds.

use std::f32;

use cgmath::InnerSpace;

use crate::manifold::*;
use crate::math::*;
use crate::shape::DistanceProxy;

/// Tolerances used while building manifolds.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ManifoldConf {
    pub linear_slop: f32,
}

impl Default for ManifoldConf {
    fn default() -> Self {
        ManifoldConf { linear_slop: 0.005 }
    }
}

/// Compute the contact manifold between two proxies. The manifold is empty
/// when the rounded shapes are further apart than their combined radius.
pub fn collide_shapes(
    proxy_a: &DistanceProxy,
    xf_a: &Transform,
    proxy_b: &DistanceProxy,
    xf_b: &Transform,
    conf: &ManifoldConf,
) -> Manifold {
    match (proxy_a.count(), proxy_b.count()) {
        (1, 1) => collide_circles(proxy_a, xf_a, proxy_b, xf_b),
        (1, _) => collide_polygon_circle(proxy_b, xf_b, proxy_a, xf_a).flipped(),
        (_, 1) => collide_polygon_circle(proxy_a, xf_a, proxy_b, xf_b),
        _ => collide_polygons(proxy_a, xf_a, proxy_b, xf_b, conf),
    }
}

pub fn collide_circles(
    proxy_a: &DistanceProxy,
    xf_a: &Transform,
    proxy_b: &DistanceProxy,
    xf_b: &Transform,
) -> Manifold {
    let p_a = xf_a.apply(proxy_a.vertex(0));
    let p_b = xf_b.apply(proxy_b.vertex(0));
    let total_radius = proxy_a.radius + proxy_b.radius;
    if (p_b - p_a).magnitude2() > total_radius * total_radius {
        return Manifold::new();
    }
    let mut manifold = Manifold::with_kind(ManifoldType::Circles, Vec2::new(0.0, 0.0), proxy_a.vertex(0));
    manifold.points.push(ManifoldPoint::new(
        proxy_b.vertex(0),
        ContactFeature::new(0, FeatureType::Vertex, 0, FeatureType::Vertex),
    ));
    manifold
}

/// Polygon A against disk B.
pub fn collide_polygon_circle(
    polygon: &DistanceProxy,
    xf_a: &Transform,
    circle: &DistanceProxy,
    xf_b: &Transform,
) -> Manifold {
    // Circle center in the frame of the polygon.
    let c_local = xf_a.apply_inv(xf_b.apply(circle.vertex(0)));
    let total_radius = polygon.radius + circle.radius;
    let count = polygon.count();

    // Find the face of minimum penetration.
    let mut normal_index = 0;
    let mut separation = -f32::MAX;
    for i in 0..count {
        let s = polygon.normals[i].dot(c_local - polygon.vertices[i]);
        if s > total_radius {
            return Manifold::new();
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    let i1 = normal_index;
    let i2 = if i1 + 1 < count { i1 + 1 } else { 0 };
    let v1 = polygon.vertices[i1];
    let v2 = polygon.vertices[i2];

    let face_contact = |local_normal: Vec2, local_point: Vec2, feature: ContactFeature| {
        let mut manifold = Manifold::with_kind(ManifoldType::FaceA, local_normal, local_point);
        manifold.points.push(ManifoldPoint::new(circle.vertex(0), feature));
        manifold
    };

    // Center is inside the polygon core.
    if separation < f32::EPSILON {
        return face_contact(
            polygon.normals[i1],
            (v1 + v2) * 0.5,
            ContactFeature::new(i1, FeatureType::Face, 0, FeatureType::Vertex),
        );
    }

    // Voronoi regions of the face's two vertices, then the face itself.
    let u1 = (c_local - v1).dot(v2 - v1);
    let u2 = (c_local - v2).dot(v1 - v2);
    if u1 <= 0.0 {
        if (c_local - v1).magnitude2() > total_radius * total_radius {
            return Manifold::new();
        }
        match normalize_or_none(c_local - v1) {
            Some(n) => face_contact(n, v1, ContactFeature::new(i1, FeatureType::Vertex, 0, FeatureType::Vertex)),
            None => Manifold::new(),
        }
    } else if u2 <= 0.0 {
        if (c_local - v2).magnitude2() > total_radius * total_radius {
            return Manifold::new();
        }
        match normalize_or_none(c_local - v2) {
            Some(n) => face_contact(n, v2, ContactFeature::new(i2, FeatureType::Vertex, 0, FeatureType::Vertex)),
            None => Manifold::new(),
        }
    } else {
        let face_center = (v1 + v2) * 0.5;
        if (c_local - face_center).dot(polygon.normals[i1]) > total_radius {
            return Manifold::new();
        }
        face_contact(
            polygon.normals[i1],
            face_center,
            ContactFeature::new(i1, FeatureType::Face, 0, FeatureType::Vertex),
        )
    }
}

/// Find the edge normal of poly1 that gives the greatest separation from
/// poly2. Returns the separation and the edge index.
pub fn max_separation(
    poly1: &DistanceProxy,
    xf1: &Transform,
    poly2: &DistanceProxy,
    xf2: &Transform,
) -> (f32, usize) {
    // Work in the frame of poly2.
    let xf = xf2.inv_mul(xf1);

    let mut best_index = 0;
    let mut max_separation = -f32::MAX;
    for (i, (&n, &v)) in poly1.normals.iter().zip(poly1.vertices.iter()).enumerate() {
        let n = xf.q.rotate(n);
        let v1 = xf.apply(v);
        let si = poly2
            .vertices
            .iter()
            .map(|&v2| n.dot(v2 - v1))
            .fold(f32::MAX, f32::min);
        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }
    (max_separation, best_index)
}

#[derive(Copy, Clone, Debug)]
struct ClipVertex {
    v: Vec2,
    id: ContactFeature,
}

/// The edge of poly2 most anti-parallel to edge1 of poly1, in world space.
fn find_incident_edge(
    poly1: &DistanceProxy,
    xf1: &Transform,
    edge1: usize,
    poly2: &DistanceProxy,
    xf2: &Transform,
) -> [ClipVertex; 2] {
    let normal1 = xf2.q.inv_rotate(xf1.q.rotate(poly1.normals[edge1]));

    let mut index = 0;
    let mut min_dot = f32::MAX;
    for (i, n) in poly2.normals.iter().enumerate() {
        let dot = normal1.dot(*n);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = if i1 + 1 < poly2.count() { i1 + 1 } else { 0 };
    [
        ClipVertex {
            v: xf2.apply(poly2.vertices[i1]),
            id: ContactFeature::new(edge1, FeatureType::Face, i1, FeatureType::Vertex),
        },
        ClipVertex {
            v: xf2.apply(poly2.vertices[i2]),
            id: ContactFeature::new(edge1, FeatureType::Face, i2, FeatureType::Vertex),
        },
    ]
}

/// Sutherland-Hodgman clipping of a segment against the half plane
/// dot(normal, v) <= offset.
fn clip_segment_to_line(
    v_in: &[ClipVertex; 2],
    normal: Vec2,
    offset: f32,
    vertex_index_a: usize,
) -> Option<[ClipVertex; 2]> {
    let mut v_out = [v_in[0]; 2];
    let mut count = 0;

    let distance0 = normal.dot(v_in[0].v) - offset;
    let distance1 = normal.dot(v_in[1].v) - offset;

    if distance0 <= 0.0 {
        v_out[count] = v_in[0];
        count += 1;
    }
    if distance1 <= 0.0 {
        v_out[count] = v_in[1];
        count += 1;
    }

    // The points are on opposite sides of the plane.
    if distance0 * distance1 < 0.0 {
        let interp = distance0 / (distance0 - distance1);
        v_out[count] = ClipVertex {
            v: v_in[0].v + (v_in[1].v - v_in[0].v) * interp,
            id: ContactFeature::new(
                vertex_index_a,
                FeatureType::Vertex,
                v_in[0].id.index_b as usize,
                FeatureType::Face,
            ),
        };
        count += 1;
    }

    if count == 2 {
        Some(v_out)
    } else {
        None
    }
}

/// Polygon (or edge) A against polygon (or edge) B.
pub fn collide_polygons(
    poly_a: &DistanceProxy,
    xf_a: &Transform,
    poly_b: &DistanceProxy,
    xf_b: &Transform,
    conf: &ManifoldConf,
) -> Manifold {
    let total_radius = poly_a.radius + poly_b.radius;

    let (separation_a, edge_a) = max_separation(poly_a, xf_a, poly_b, xf_b);
    if separation_a > total_radius {
        return Manifold::new();
    }
    let (separation_b, edge_b) = max_separation(poly_b, xf_b, poly_a, xf_a);
    if separation_b > total_radius {
        return Manifold::new();
    }

    // Prefer A's face unless B's is clearly better, to keep the reference
    // face from flickering between steps.
    let k_tol = 0.1 * conf.linear_slop;
    let (poly1, xf1, poly2, xf2, edge1, kind, flip) = if separation_b > separation_a + k_tol {
        (poly_b, xf_b, poly_a, xf_a, edge_b, ManifoldType::FaceB, true)
    } else {
        (poly_a, xf_a, poly_b, xf_b, edge_a, ManifoldType::FaceA, false)
    };

    let incident_edge = find_incident_edge(poly1, xf1, edge1, poly2, xf2);

    let count1 = poly1.count();
    let iv1 = edge1;
    let iv2 = if edge1 + 1 < count1 { edge1 + 1 } else { 0 };
    let mut v11 = poly1.vertices[iv1];
    let mut v12 = poly1.vertices[iv2];

    let local_tangent = match normalize_or_none(v12 - v11) {
        Some(t) => t,
        None => return Manifold::new(),
    };
    let local_normal = cross_vs(local_tangent, 1.0);
    let plane_point = (v11 + v12) * 0.5;

    let tangent = xf1.q.rotate(local_tangent);
    let normal = cross_vs(tangent, 1.0);

    v11 = xf1.apply(v11);
    v12 = xf1.apply(v12);

    let front_offset = normal.dot(v11);

    // Side offsets, extended by the rounding radius.
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    let clip_points1 = match clip_segment_to_line(&incident_edge, -tangent, side_offset1, iv1) {
        Some(points) => points,
        None => return Manifold::new(),
    };
    let clip_points2 = match clip_segment_to_line(&clip_points1, tangent, side_offset2, iv2) {
        Some(points) => points,
        None => return Manifold::new(),
    };

    let mut manifold = Manifold::with_kind(kind, local_normal, plane_point);
    for cp in clip_points2.iter() {
        let separation = normal.dot(cp.v) - front_offset;
        if separation <= total_radius {
            let id = if flip { cp.id.flipped() } else { cp.id };
            manifold.points.push(ManifoldPoint::new(xf2.apply_inv(cp.v), id));
        }
    }
    manifold
}

#[cfg(test)]
mod tests {
    mod collision {
        use approx::assert_relative_eq;

        use crate::collision::*;
        use crate::manifold::*;
        use crate::math::*;
        use crate::shape::{Geometry, Polygon, DEFAULT_VERTEX_RADIUS};

        fn world(
            a: &Geometry,
            xf_a: &Transform,
            b: &Geometry,
            xf_b: &Transform,
        ) -> (Manifold, WorldManifold) {
            let (pa, pb) = (a.proxy(0), b.proxy(0));
            let m = collide_shapes(&pa, xf_a, &pb, xf_b, &ManifoldConf::default());
            let wm = WorldManifold::new(&m, xf_a, pa.radius, xf_b, pb.radius);
            (m, wm)
        }

        fn assert_symmetric(a: &Geometry, xf_a: &Transform, b: &Geometry, xf_b: &Transform) {
            let (m_ab, wm_ab) = world(a, xf_a, b, xf_b);
            let (m_ba, wm_ba) = world(b, xf_b, a, xf_a);
            assert_eq!(m_ab.point_count(), m_ba.point_count());
            assert!(m_ab.point_count() <= 2);
            if m_ab.point_count() > 0 {
                assert_relative_eq!(
                    wm_ab.min_separation().unwrap(),
                    wm_ba.min_separation().unwrap(),
                    epsilon = 1.0e-5
                );
                assert_relative_eq!(wm_ab.normal.x, -wm_ba.normal.x, epsilon = 1.0e-5);
                assert_relative_eq!(wm_ab.normal.y, -wm_ba.normal.y, epsilon = 1.0e-5);
            }
        }

        #[test]
        fn test_circles() {
            let a = Geometry::disk(1.0);
            let xf_a = Transform::identity();
            let xf_b = Transform::new(Vec2::new(1.5, 0.0), 0.0);
            let (m, wm) = world(&a, &xf_a, &a, &xf_b);
            assert_eq!(m.kind, ManifoldType::Circles);
            assert_eq!(m.point_count(), 1);
            assert_relative_eq!(wm.separations[0], -0.5, epsilon = 1.0e-6);
            assert_relative_eq!(wm.normal.x, 1.0);
            assert_relative_eq!(wm.points[0].x, 0.75, epsilon = 1.0e-6);

            let far = Transform::new(Vec2::new(2.5, 0.0), 0.0);
            assert_eq!(world(&a, &xf_a, &a, &far).0.point_count(), 0);
        }

        #[test]
        fn test_box_on_box() {
            let a = Geometry::Polygon(Polygon::new_box(1.0, 1.0));
            let b = Geometry::Polygon(Polygon::new_box(0.5, 0.5));
            let xf_a = Transform::identity();
            // B rests slightly sunk into the top of A.
            let xf_b = Transform::new(Vec2::new(0.3, 1.5 + 2.0 * DEFAULT_VERTEX_RADIUS - 0.01), 0.0);
            let (m, wm) = world(&a, &xf_a, &b, &xf_b);
            assert_eq!(m.point_count(), 2);
            assert_relative_eq!(wm.normal.y, 1.0, epsilon = 1.0e-5);
            for s in wm.separations.iter() {
                assert_relative_eq!(*s, -0.01, epsilon = 1.0e-4);
            }
            assert_ne!(m.points[0].id, m.points[1].id);
            assert_symmetric(&a, &xf_a, &b, &xf_b);

            // Feature ids survive a small slide.
            let nudged = Transform::new(xf_b.p + Vec2::new(0.01, 0.0), 0.0);
            let (m2, _) = world(&a, &xf_a, &b, &nudged);
            let ids: Vec<_> = m.points.iter().map(|p| p.id).collect();
            for p in m2.points.iter() {
                assert!(ids.contains(&p.id));
            }
        }

        #[test]
        fn test_rotated_boxes() {
            let a = Geometry::Polygon(Polygon::new_box(1.0, 0.5));
            let b = Geometry::Polygon(Polygon::new_box(0.5, 0.5));
            let xf_a = Transform::new(Vec2::new(0.0, 0.0), 0.1);
            let xf_b = Transform::new(Vec2::new(0.2, 1.1), 0.7);
            assert_symmetric(&a, &xf_a, &b, &xf_b);
        }

        #[test]
        fn test_disk_and_box() {
            let a = Geometry::Polygon(Polygon::new_box(1.0, 1.0));
            let b = Geometry::disk(0.5);
            let xf_a = Transform::identity();

            // Face region.
            let xf_b = Transform::new(Vec2::new(0.2, 1.4), 0.0);
            let (m, wm) = world(&a, &xf_a, &b, &xf_b);
            assert_eq!(m.kind, ManifoldType::FaceA);
            assert_eq!(m.point_count(), 1);
            assert_relative_eq!(wm.separations[0], 1.4 - 1.0 - 0.5 - DEFAULT_VERTEX_RADIUS, epsilon = 1.0e-5);
            assert_symmetric(&a, &xf_a, &b, &xf_b);

            let (m, _) = world(&b, &xf_b, &a, &xf_a);
            assert_eq!(m.kind, ManifoldType::FaceB);

            // Vertex region.
            let xf_b = Transform::new(Vec2::new(1.3, 1.3), 0.0);
            let (m, wm) = world(&a, &xf_a, &b, &xf_b);
            assert_eq!(m.point_count(), 1);
            assert_relative_eq!(wm.normal.x, wm.normal.y, epsilon = 1.0e-5);
            assert_symmetric(&a, &xf_a, &b, &xf_b);

            // Out of reach of the corner.
            let xf_b = Transform::new(Vec2::new(1.45, 1.45), 0.0);
            assert_eq!(world(&a, &xf_a, &b, &xf_b).0.point_count(), 0);
        }

        #[test]
        fn test_edge() {
            let ground = Geometry::edge(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0));
            let disk = Geometry::disk(1.0);
            let xf = Transform::identity();
            let xf_b = Transform::new(Vec2::new(0.0, 1.0), 0.0);
            let (m, wm) = world(&ground, &xf, &disk, &xf_b);
            assert_eq!(m.point_count(), 1);
            assert_relative_eq!(wm.normal.y, 1.0, epsilon = 1.0e-6);
            assert_relative_eq!(wm.separations[0], -DEFAULT_VERTEX_RADIUS, epsilon = 1.0e-6);

            // Edges are two sided.
            let below = Transform::new(Vec2::new(0.0, -1.0), 0.0);
            let (_, wm) = world(&ground, &xf, &disk, &below);
            assert_relative_eq!(wm.normal.y, -1.0, epsilon = 1.0e-6);

            let block = Geometry::Polygon(Polygon::new_box(0.5, 0.5));
            let xf_b = Transform::new(Vec2::new(1.0, 0.51), 0.0);
            let (m, _) = world(&ground, &xf, &block, &xf_b);
            assert_eq!(m.point_count(), 2);
            assert_symmetric(&ground, &xf, &block, &xf_b);
        }
    }
}
