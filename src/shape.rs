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
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use crate::bounds::{RayCastInput, RayCastOutput, AABB};
use crate::error::WorldError;
use crate::id::BodyId;
use crate::math::*;

/// The most vertices a polygon may have.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Rounding radius given to polygons and edges. Twice the default linear
/// slop, so that resting contacts keep a little skin between the cores.
pub const DEFAULT_VERTEX_RADIUS: f32 = 0.01;

/// Points closer than this are welded together when building a hull.
const WELD_DISTANCE: f32 = 0.0025;

/// A convex shape reduced to what the distance and manifold routines need:
/// a vertex list, the outward normal of each edge and a rounding radius.
///
/// A single vertex is a disk. Two vertices are an edge whose two normals face
/// opposite ways.
#[derive(Clone, Debug)]
pub struct DistanceProxy {
    pub vertices: SmallVec<[Vec2; MAX_POLYGON_VERTICES]>,
    pub normals: SmallVec<[Vec2; MAX_POLYGON_VERTICES]>,
    pub radius: f32,
}

impl DistanceProxy {
    pub fn count(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertex(&self, i: usize) -> Vec2 {
        self.vertices[i]
    }

    /// Index of the vertex furthest along d.
    pub fn support(&self, d: Vec2) -> usize {
        let mut best = 0;
        let mut best_value = self.vertices[0].dot(d);
        for (i, v) in self.vertices.iter().enumerate().skip(1) {
            let value = v.dot(d);
            if value > best_value {
                best = i;
                best_value = value;
            }
        }
        best
    }
}

/// Mass properties of a shape. Inertia is about the shape's origin.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MassData {
    pub mass: f32,
    pub center: Vec2,
    pub inertia: f32,
}

/// A type that has mass and rotational inertia given a density.
pub trait Inertia {
    fn mass_data(&self, density: f32) -> MassData;
}

/// A convex polygon of 3 to 8 vertices in counter-clockwise order.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    vertices: SmallVec<[Vec2; MAX_POLYGON_VERTICES]>,
    normals: SmallVec<[Vec2; MAX_POLYGON_VERTICES]>,
    centroid: Vec2,
    pub radius: f32,
}

impl Polygon {
    /// Build the convex hull of a set of points. Fails if fewer than three
    /// distinct, non-collinear points remain after welding close points.
    pub fn new(points: &[Vec2]) -> Result<Self, WorldError> {
        if points.len() < 3 || points.len() > MAX_POLYGON_VERTICES {
            return Err(WorldError::InvalidArgument("polygon needs 3 to 8 points"));
        }

        let mut ps: SmallVec<[Vec2; MAX_POLYGON_VERTICES]> = SmallVec::new();
        for &p in points {
            if ps.iter().all(|q| (p - *q).magnitude2() > WELD_DISTANCE * WELD_DISTANCE) {
                ps.push(p);
            }
        }
        if ps.len() < 3 {
            return Err(WorldError::InvalidArgument("polygon points are too close together"));
        }

        // Gift wrap starting from the rightmost, lowest point.
        let mut i0 = 0;
        for i in 1..ps.len() {
            let (x, x0) = (ps[i].x, ps[i0].x);
            if x > x0 || (x == x0 && ps[i].y < ps[i0].y) {
                i0 = i;
            }
        }
        let mut hull: SmallVec<[usize; MAX_POLYGON_VERTICES]> = SmallVec::new();
        let mut ih = i0;
        loop {
            if hull.len() >= MAX_POLYGON_VERTICES {
                return Err(WorldError::InvalidArgument("polygon hull did not close"));
            }
            hull.push(ih);
            let mut ie = 0;
            for j in 1..ps.len() {
                if ie == ih {
                    ie = j;
                    continue;
                }
                let r = ps[ie] - ps[ih];
                let v = ps[j] - ps[ih];
                let c = cross(r, v);
                if c < 0.0 || (c == 0.0 && v.magnitude2() > r.magnitude2()) {
                    ie = j;
                }
            }
            ih = ie;
            if ie == i0 {
                break;
            }
        }
        if hull.len() < 3 {
            return Err(WorldError::InvalidArgument("polygon points are collinear"));
        }

        let vertices: SmallVec<[Vec2; MAX_POLYGON_VERTICES]> = hull.iter().map(|&i| ps[i]).collect();
        Polygon::from_hull(vertices)
    }

    /// An axis aligned box with the given half widths, centered on the origin.
    pub fn new_box(hx: f32, hy: f32) -> Self {
        Polygon::new_oriented_box(hx, hy, Vec2::zero(), 0.0)
    }

    /// A box with the given half widths, centered at center and rotated by angle.
    pub fn new_oriented_box(hx: f32, hy: f32, center: Vec2, angle: f32) -> Self {
        let xf = Transform::new(center, angle);
        let corners = [
            Vec2::new(-hx, -hy),
            Vec2::new(hx, -hy),
            Vec2::new(hx, hy),
            Vec2::new(-hx, hy),
        ];
        let normals = [
            Vec2::new(0.0, -1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(-1.0, 0.0),
        ];
        Polygon {
            vertices: corners.iter().map(|&v| xf.apply(v)).collect(),
            normals: normals.iter().map(|&n| xf.q.rotate(n)).collect(),
            centroid: center,
            radius: DEFAULT_VERTEX_RADIUS,
        }
    }

    fn from_hull(vertices: SmallVec<[Vec2; MAX_POLYGON_VERTICES]>) -> Result<Self, WorldError> {
        let n = vertices.len();
        let mut normals = SmallVec::new();
        for i in 0..n {
            let edge = vertices[(i + 1) % n] - vertices[i];
            match normalize_or_none(cross_vs(edge, 1.0)) {
                Some(normal) => normals.push(normal),
                None => return Err(WorldError::InvalidArgument("polygon has a zero length edge")),
            }
        }
        let centroid = polygon_centroid(&vertices);
        Ok(Polygon {
            vertices,
            normals,
            centroid,
            radius: DEFAULT_VERTEX_RADIUS,
        })
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    pub fn normals(&self) -> &[Vec2] {
        &self.normals
    }

    pub fn centroid(&self) -> Vec2 {
        self.centroid
    }
}

fn polygon_centroid(vs: &[Vec2]) -> Vec2 {
    let origin = vs[0];
    let mut c = Vec2::zero();
    let mut area = 0.0;
    for i in 1..vs.len() - 1 {
        let e1 = vs[i] - origin;
        let e2 = vs[i + 1] - origin;
        let tri_area = 0.5 * cross(e1, e2);
        area += tri_area;
        c += (e1 + e2) * (tri_area / 3.0);
    }
    c / area + origin
}

impl Inertia for Polygon {
    fn mass_data(&self, density: f32) -> MassData {
        // Triangle fan about the first vertex keeps the sums well conditioned.
        let s = self.vertices[0];
        let mut center = Vec2::zero();
        let mut area = 0.0;
        let mut inertia = 0.0;
        for i in 0..self.vertices.len() {
            let e1 = self.vertices[i] - s;
            let e2 = self.vertices[(i + 1) % self.vertices.len()] - s;
            let d = cross(e1, e2);
            let tri_area = 0.5 * d;
            area += tri_area;
            center += (e1 + e2) * (tri_area / 3.0);

            let intx2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
            let inty2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
            inertia += (0.25 / 3.0 * d) * (intx2 + inty2);
        }
        let mass = density * area;
        center /= area;
        let world_center = center + s;
        // Shift from the fan origin to the shape origin.
        let inertia = density * inertia + mass * (world_center.dot(world_center) - center.dot(center));
        MassData {
            mass,
            center: world_center,
            inertia,
        }
    }
}

/// The geometry of a shape.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    Disk {
        center: Vec2,
        radius: f32,
    },
    Polygon(Polygon),
    /// A line segment with rounded ends.
    Edge {
        v1: Vec2,
        v2: Vec2,
        radius: f32,
    },
    /// A sequence of connected edges. Each edge is a separate child.
    Chain {
        vertices: Vec<Vec2>,
        radius: f32,
    },
}

impl Geometry {
    pub fn disk(radius: f32) -> Self {
        Geometry::Disk {
            center: Vec2::zero(),
            radius,
        }
    }

    pub fn edge(v1: Vec2, v2: Vec2) -> Self {
        Geometry::Edge {
            v1,
            v2,
            radius: DEFAULT_VERTEX_RADIUS,
        }
    }

    pub fn chain(vertices: Vec<Vec2>) -> Self {
        Geometry::Chain {
            vertices,
            radius: DEFAULT_VERTEX_RADIUS,
        }
    }

    /// A closed chain: the last vertex connects back to the first.
    pub fn chain_loop(mut vertices: Vec<Vec2>) -> Self {
        if let Some(&first) = vertices.first() {
            vertices.push(first);
        }
        Geometry::chain(vertices)
    }

    /// Check that the geometry can be simulated.
    pub fn validate(&self) -> Result<(), WorldError> {
        match *self {
            Geometry::Disk { radius, center } => {
                if !(radius > 0.0) || !radius.is_finite() || !center.x.is_finite() || !center.y.is_finite() {
                    return Err(WorldError::InvalidArgument("disk radius must be positive"));
                }
            },
            Geometry::Polygon(ref p) => {
                if p.vertices.len() < 3 || p.radius < 0.0 {
                    return Err(WorldError::InvalidArgument("polygon is degenerate"));
                }
            },
            Geometry::Edge { v1, v2, radius } => {
                if (v2 - v1).magnitude2() <= WELD_DISTANCE * WELD_DISTANCE || radius < 0.0 {
                    return Err(WorldError::InvalidArgument("edge is too short"));
                }
            },
            Geometry::Chain { ref vertices, radius } => {
                if vertices.len() < 2 || radius < 0.0 {
                    return Err(WorldError::InvalidArgument("chain needs at least 2 vertices"));
                }
                for pair in vertices.windows(2) {
                    if (pair[1] - pair[0]).magnitude2() <= WELD_DISTANCE * WELD_DISTANCE {
                        return Err(WorldError::InvalidArgument("chain has a zero length edge"));
                    }
                }
            },
        }
        Ok(())
    }

    /// Number of children: one for every kind but chains, which have one per edge.
    pub fn child_count(&self) -> usize {
        match *self {
            Geometry::Chain { ref vertices, .. } => vertices.len().saturating_sub(1),
            _ => 1,
        }
    }

    pub fn vertex_radius(&self) -> f32 {
        match *self {
            Geometry::Disk { radius, .. } => radius,
            Geometry::Polygon(ref p) => p.radius,
            Geometry::Edge { radius, .. } => radius,
            Geometry::Chain { radius, .. } => radius,
        }
    }

    /// The distance proxy of one child, in shape coordinates.
    pub fn proxy(&self, child: usize) -> DistanceProxy {
        match *self {
            Geometry::Disk { center, radius } => DistanceProxy {
                vertices: smallvec![center],
                normals: SmallVec::new(),
                radius,
            },
            Geometry::Polygon(ref p) => DistanceProxy {
                vertices: p.vertices.clone(),
                normals: p.normals.clone(),
                radius: p.radius,
            },
            Geometry::Edge { v1, v2, radius } => edge_proxy(v1, v2, radius),
            Geometry::Chain { ref vertices, radius } => {
                edge_proxy(vertices[child], vertices[child + 1], radius)
            },
        }
    }

    /// Bounds of one child under the transform, rounding radius included.
    pub fn compute_aabb(&self, xf: &Transform, child: usize) -> AABB {
        let proxy = self.proxy(child);
        let first = xf.apply(proxy.vertices[0]);
        let mut aabb = AABB::new(first, first);
        for &v in proxy.vertices.iter().skip(1) {
            let v = xf.apply(v);
            aabb = AABB::combine(&aabb, &AABB::new(v, v));
        }
        aabb.fattened(proxy.radius)
    }

    /// Cast a ray against one child's core shape. The rounding radius of
    /// polygons and edges is ignored.
    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform, child: usize) -> Option<RayCastOutput> {
        match *self {
            Geometry::Disk { center, radius } => ray_cast_disk(input, xf.apply(center), radius),
            Geometry::Polygon(ref p) => ray_cast_polygon(input, xf, p),
            Geometry::Edge { v1, v2, .. } => ray_cast_edge(input, xf, v1, v2),
            Geometry::Chain { ref vertices, .. } => {
                ray_cast_edge(input, xf, vertices[child], vertices[child + 1])
            },
        }
    }
}

impl Inertia for Geometry {
    fn mass_data(&self, density: f32) -> MassData {
        match *self {
            Geometry::Disk { center, radius } => {
                let mass = density * f32::consts::PI * radius * radius;
                MassData {
                    mass,
                    center,
                    inertia: mass * (0.5 * radius * radius + center.dot(center)),
                }
            },
            Geometry::Polygon(ref p) => p.mass_data(density),
            // Edges and chains have no area.
            Geometry::Edge { v1, v2, .. } => MassData {
                mass: 0.0,
                center: (v1 + v2) * 0.5,
                inertia: 0.0,
            },
            Geometry::Chain { .. } => MassData {
                mass: 0.0,
                center: Vec2::zero(),
                inertia: 0.0,
            },
        }
    }
}

fn edge_proxy(v1: Vec2, v2: Vec2, radius: f32) -> DistanceProxy {
    let n = normalize_or_none(cross_vs(v2 - v1, 1.0)).unwrap_or(Vec2::new(0.0, 1.0));
    DistanceProxy {
        vertices: smallvec![v1, v2],
        normals: smallvec![n, -n],
        radius,
    }
}

fn ray_cast_disk(input: &RayCastInput, position: Vec2, radius: f32) -> Option<RayCastOutput> {
    let s = input.p1 - position;
    let b = s.dot(s) - radius * radius;
    let r = input.p2 - input.p1;
    let c = s.dot(r);
    let rr = r.dot(r);
    let sigma = c * c - rr * b;
    if sigma < 0.0 || rr < COLLISION_EPSILON {
        return None;
    }
    let a = -(c + sigma.sqrt());
    if 0.0 <= a && a <= input.max_fraction * rr {
        let fraction = a / rr;
        let normal = normalize_or_none(s + r * fraction)?;
        Some(RayCastOutput { normal, fraction })
    } else {
        None
    }
}

fn ray_cast_polygon(input: &RayCastInput, xf: &Transform, polygon: &Polygon) -> Option<RayCastOutput> {
    let p1 = xf.apply_inv(input.p1);
    let p2 = xf.apply_inv(input.p2);
    let d = p2 - p1;

    let mut lower = 0.0;
    let mut upper = input.max_fraction;
    let mut index = None;
    for (i, (&v, &n)) in polygon.vertices.iter().zip(polygon.normals.iter()).enumerate() {
        let numerator = n.dot(v - p1);
        let denominator = n.dot(d);
        if denominator == 0.0 {
            if numerator < 0.0 {
                return None;
            }
        } else if denominator < 0.0 && numerator < lower * denominator {
            lower = numerator / denominator;
            index = Some(i);
        } else if denominator > 0.0 && numerator < upper * denominator {
            upper = numerator / denominator;
        }
        if upper < lower {
            return None;
        }
    }
    index.map(|i| RayCastOutput {
        normal: xf.q.rotate(polygon.normals[i]),
        fraction: lower,
    })
}

fn ray_cast_edge(input: &RayCastInput, xf: &Transform, v1: Vec2, v2: Vec2) -> Option<RayCastOutput> {
    let p1 = xf.apply_inv(input.p1);
    let p2 = xf.apply_inv(input.p2);
    let d = p2 - p1;
    let e = v2 - v1;
    let normal = normalize_or_none(cross_vs(e, 1.0))?;

    let numerator = normal.dot(v1 - p1);
    let denominator = normal.dot(d);
    if denominator == 0.0 {
        return None;
    }
    let t = numerator / denominator;
    if t < 0.0 || input.max_fraction < t {
        return None;
    }
    let q = p1 + d * t;
    let s = (q - v1).dot(e) / e.magnitude2();
    if s < 0.0 || 1.0 < s {
        return None;
    }
    let normal = if numerator > 0.0 { -normal } else { normal };
    Some(RayCastOutput {
        normal: xf.q.rotate(normal),
        fraction: t,
    })
}

/// Collision filtering data. Two shapes in the same nonzero group always
/// collide if the group is positive and never if it is negative. Otherwise
/// each shape's category must be in the other's mask.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub category_bits: u16,
    pub mask_bits: u16,
    pub group_index: i16,
}

impl Default for Filter {
    fn default() -> Self {
        Filter {
            category_bits: 0x0001,
            mask_bits: 0xFFFF,
            group_index: 0,
        }
    }
}

impl Filter {
    pub fn should_collide(&self, other: &Filter) -> bool {
        if self.group_index == other.group_index && self.group_index != 0 {
            return self.group_index > 0;
        }
        (self.mask_bits & other.category_bits) != 0 && (self.category_bits & other.mask_bits) != 0
    }
}

/// Friction of a contact from the friction of its two shapes.
pub fn mix_friction(a: f32, b: f32) -> f32 {
    (a * b).sqrt()
}

/// Restitution of a contact from the restitution of its two shapes.
pub fn mix_restitution(a: f32, b: f32) -> f32 {
    a.max(b)
}

/// Everything needed to attach a shape to a body.
#[derive(Clone, Debug)]
pub struct ShapeConf {
    pub geometry: Geometry,
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    pub is_sensor: bool,
    pub filter: Filter,
}

impl ShapeConf {
    pub fn new(geometry: Geometry) -> Self {
        ShapeConf {
            geometry,
            density: 0.0,
            friction: 0.2,
            restitution: 0.0,
            is_sensor: false,
            filter: Filter::default(),
        }
    }

    pub fn validate(&self) -> Result<(), WorldError> {
        self.geometry.validate()?;
        if !(self.density >= 0.0) || !self.density.is_finite() {
            return Err(WorldError::InvalidArgument("density must be non-negative"));
        }
        if !(self.friction >= 0.0) || !self.friction.is_finite() {
            return Err(WorldError::InvalidArgument("friction must be non-negative"));
        }
        if !(self.restitution >= 0.0) || !self.restitution.is_finite() {
            return Err(WorldError::InvalidArgument("restitution must be non-negative"));
        }
        Ok(())
    }
}

/// A shape attached to a body.
#[derive(Clone, Debug)]
pub struct Shape {
    pub(crate) body: BodyId,
    pub(crate) geometry: Geometry,
    pub(crate) density: f32,
    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    pub(crate) is_sensor: bool,
    pub(crate) filter: Filter,
    /// Tree leaf of each child.
    pub(crate) proxies: Vec<usize>,
}

impl Shape {
    pub(crate) fn new(body: BodyId, conf: ShapeConf) -> Self {
        Shape {
            body,
            geometry: conf.geometry,
            density: conf.density,
            friction: conf.friction,
            restitution: conf.restitution,
            is_sensor: conf.is_sensor,
            filter: conf.filter,
            proxies: Vec::new(),
        }
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn density(&self) -> f32 {
        self.density
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn child_count(&self) -> usize {
        self.geometry.child_count()
    }
}

#[cfg(test)]
mod tests {
    mod shape {
        use approx::assert_relative_eq;
        use cgmath::InnerSpace;

        use crate::bounds::RayCastInput;
        use crate::math::*;
        use crate::shape::*;

        #[test]
        fn test_hull() {
            // Unordered points with an interior point that must be dropped.
            let points = [
                Vec2::new(1.0, 1.0),
                Vec2::new(-1.0, -1.0),
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, -1.0),
                Vec2::new(-1.0, 1.0),
            ];
            let p = Polygon::new(&points).unwrap();
            assert_eq!(p.vertices().len(), 4);
            let n = p.vertices().len();
            for i in 0..n {
                let a = p.vertices()[i];
                let b = p.vertices()[(i + 1) % n];
                let c = p.vertices()[(i + 2) % n];
                assert!(cross(b - a, c - b) > 0.0, "hull must wind counter-clockwise");
                assert_relative_eq!(p.normals()[i].magnitude(), 1.0, epsilon = 1.0e-6);
            }
            assert_relative_eq!(p.centroid().magnitude(), 0.0, epsilon = 1.0e-6);

            assert!(Polygon::new(&[Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(2.0, 0.0)]).is_err());
            assert!(Polygon::new(&[Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0)]).is_err());
        }

        #[test]
        fn test_mass() {
            let b = Geometry::Polygon(Polygon::new_box(1.0, 0.5));
            let md = b.mass_data(2.0);
            assert_relative_eq!(md.mass, 4.0, epsilon = 1.0e-5);
            assert_relative_eq!(md.center.magnitude(), 0.0, epsilon = 1.0e-6);
            // m (w^2 + h^2) / 12 with w = 2, h = 1.
            assert_relative_eq!(md.inertia, 4.0 * 5.0 / 12.0, epsilon = 1.0e-4);

            let d = Geometry::disk(1.0).mass_data(1.0);
            assert_relative_eq!(d.mass, std::f32::consts::PI, epsilon = 1.0e-5);
            assert_relative_eq!(d.inertia, 0.5 * std::f32::consts::PI, epsilon = 1.0e-5);

            let e = Geometry::edge(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0)).mass_data(1.0);
            assert_eq!(e.mass, 0.0);
        }

        #[test]
        fn test_proxies() {
            let e = Geometry::edge(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0));
            let proxy = e.proxy(0);
            assert_eq!(proxy.count(), 2);
            assert_relative_eq!(proxy.normals[0].y, -1.0);
            assert_relative_eq!(proxy.normals[1].y, 1.0);
            assert_eq!(proxy.support(Vec2::new(1.0, 0.2)), 1);

            let chain = Geometry::chain_loop(vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(1.0, 1.0),
            ]);
            assert_eq!(chain.child_count(), 3);
            assert_eq!(chain.proxy(2).vertices[1], Vec2::new(0.0, 0.0));

            let aabb = Geometry::Polygon(Polygon::new_box(1.0, 1.0))
                .compute_aabb(&Transform::new(Vec2::new(3.0, 0.0), 0.0), 0);
            assert_relative_eq!(aabb.lower.x, 2.0 - DEFAULT_VERTEX_RADIUS);
            assert_relative_eq!(aabb.upper.y, 1.0 + DEFAULT_VERTEX_RADIUS);
        }

        #[test]
        fn test_ray_cast() {
            let input = RayCastInput::new(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0));
            let xf = Transform::identity();

            let hit = Geometry::disk(1.0).ray_cast(&input, &xf, 0).unwrap();
            assert_relative_eq!(hit.fraction, 0.4, epsilon = 1.0e-6);
            assert_relative_eq!(hit.normal.x, -1.0, epsilon = 1.0e-6);

            let hit = Geometry::Polygon(Polygon::new_box(2.0, 2.0)).ray_cast(&input, &xf, 0).unwrap();
            assert_relative_eq!(hit.fraction, 0.3, epsilon = 1.0e-6);
            assert_relative_eq!(hit.normal.x, -1.0, epsilon = 1.0e-6);

            let wall = Geometry::edge(Vec2::new(1.0, -1.0), Vec2::new(1.0, 1.0));
            let hit = wall.ray_cast(&input, &xf, 0).unwrap();
            assert_relative_eq!(hit.fraction, 0.6, epsilon = 1.0e-6);
            assert_relative_eq!(hit.normal.x, -1.0, epsilon = 1.0e-6);

            let miss = RayCastInput::new(Vec2::new(-5.0, 3.0), Vec2::new(5.0, 3.0));
            assert!(wall.ray_cast(&miss, &xf, 0).is_none());
        }

        #[test]
        fn test_filter() {
            let a = Filter::default();
            let mut b = Filter::default();
            assert!(a.should_collide(&b));
            b.mask_bits = 0x0002;
            assert!(!a.should_collide(&b));
            let c = Filter { group_index: 3, ..b };
            let d = Filter { group_index: 3, ..b };
            assert!(c.should_collide(&d));
            let e = Filter { group_index: -3, ..Filter::default() };
            assert!(!e.should_collide(&e));
        }
    }
}
