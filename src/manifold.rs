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

use cgmath::{InnerSpace, Zero};
use smallvec::SmallVec;

use crate::math::*;

/// A manifold never holds more than two points in 2D.
pub const MAX_MANIFOLD_POINTS: usize = 2;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FeatureType {
    Vertex,
    Face,
}

/// The features of two shapes that produced a contact point. Points from
/// consecutive steps with equal features are considered the same point.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContactFeature {
    pub index_a: u8,
    pub type_a: FeatureType,
    pub index_b: u8,
    pub type_b: FeatureType,
}

impl ContactFeature {
    pub fn new(index_a: usize, type_a: FeatureType, index_b: usize, type_b: FeatureType) -> Self {
        ContactFeature {
            index_a: index_a as u8,
            type_a,
            index_b: index_b as u8,
            type_b,
        }
    }

    /// The same feature pair seen from the other shape.
    pub fn flipped(self) -> Self {
        ContactFeature {
            index_a: self.index_b,
            type_a: self.type_b,
            index_b: self.index_a,
            type_b: self.type_a,
        }
    }
}

impl Default for ContactFeature {
    fn default() -> Self {
        ContactFeature::new(0, FeatureType::Vertex, 0, FeatureType::Vertex)
    }
}

/// A contact point in the local space of one of the shapes, carrying the
/// impulses accumulated for it so far.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ManifoldPoint {
    /// For Circles, the center of B. For FaceA, the clip point on B. For
    /// FaceB, the clip point on A.
    pub local_point: Vec2,
    pub normal_impulse: f32,
    pub tangent_impulse: f32,
    pub id: ContactFeature,
}

impl ManifoldPoint {
    pub fn new(local_point: Vec2, id: ContactFeature) -> Self {
        ManifoldPoint {
            local_point,
            normal_impulse: 0.0,
            tangent_impulse: 0.0,
            id,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ManifoldType {
    /// No contact.
    Unset,
    /// local_point is the center of A.
    Circles,
    /// local_normal and local_point describe a face of A.
    FaceA,
    /// local_normal and local_point describe a face of B.
    FaceB,
}

/// How two shapes touch, described in local coordinates so that it stays
/// meaningful while the bodies move within a step.
#[derive(Clone, Debug, PartialEq)]
pub struct Manifold {
    pub kind: ManifoldType,
    pub local_normal: Vec2,
    pub local_point: Vec2,
    pub points: SmallVec<[ManifoldPoint; MAX_MANIFOLD_POINTS]>,
}

impl Manifold {
    pub fn new() -> Self {
        Manifold {
            kind: ManifoldType::Unset,
            local_normal: Vec2::zero(),
            local_point: Vec2::zero(),
            points: SmallVec::new(),
        }
    }

    pub fn with_kind(kind: ManifoldType, local_normal: Vec2, local_point: Vec2) -> Self {
        Manifold {
            kind,
            local_normal,
            local_point,
            points: SmallVec::new(),
        }
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Swap the roles of A and B. Only valid for manifolds where one side
    /// is described by a face.
    pub fn flipped(mut self) -> Self {
        self.kind = match self.kind {
            ManifoldType::FaceA => ManifoldType::FaceB,
            ManifoldType::FaceB => ManifoldType::FaceA,
            other => other,
        };
        for point in self.points.iter_mut() {
            point.id = point.id.flipped();
        }
        self
    }

    /// Copy accumulated impulses over from points of an older manifold that
    /// have the same features.
    pub fn match_impulses(&mut self, old: &Manifold) {
        for point in self.points.iter_mut() {
            point.normal_impulse = 0.0;
            point.tangent_impulse = 0.0;
            if let Some(prev) = old.points.iter().find(|p| p.id == point.id) {
                point.normal_impulse = prev.normal_impulse;
                point.tangent_impulse = prev.tangent_impulse;
            }
        }
    }
}

impl Default for Manifold {
    fn default() -> Self {
        Manifold::new()
    }
}

/// A manifold evaluated in world space.
#[derive(Clone, Debug, PartialEq)]
pub struct WorldManifold {
    /// Points from A to B.
    pub normal: Vec2,
    /// Midway between the two rounded surfaces.
    pub points: SmallVec<[Vec2; MAX_MANIFOLD_POINTS]>,
    /// Negative when overlapping.
    pub separations: SmallVec<[f32; MAX_MANIFOLD_POINTS]>,
}

impl WorldManifold {
    pub fn new(manifold: &Manifold, xf_a: &Transform, r_a: f32, xf_b: &Transform, r_b: f32) -> Self {
        let mut out = WorldManifold {
            normal: Vec2::zero(),
            points: SmallVec::new(),
            separations: SmallVec::new(),
        };
        if manifold.points.is_empty() {
            return out;
        }
        match manifold.kind {
            ManifoldType::Unset => (),
            ManifoldType::Circles => {
                let point_a = xf_a.apply(manifold.local_point);
                let point_b = xf_b.apply(manifold.points[0].local_point);
                let normal = normalize_or_none(point_b - point_a).unwrap_or(Vec2::new(1.0, 0.0));
                let c_a = point_a + normal * r_a;
                let c_b = point_b - normal * r_b;
                out.normal = normal;
                out.points.push((c_a + c_b) * 0.5);
                out.separations.push((c_b - c_a).dot(normal));
            },
            ManifoldType::FaceA => {
                let normal = xf_a.q.rotate(manifold.local_normal);
                let plane_point = xf_a.apply(manifold.local_point);
                out.normal = normal;
                for point in manifold.points.iter() {
                    let clip_point = xf_b.apply(point.local_point);
                    let c_a = clip_point + normal * (r_a - (clip_point - plane_point).dot(normal));
                    let c_b = clip_point - normal * r_b;
                    out.points.push((c_a + c_b) * 0.5);
                    out.separations.push((c_b - c_a).dot(normal));
                }
            },
            ManifoldType::FaceB => {
                let normal = xf_b.q.rotate(manifold.local_normal);
                let plane_point = xf_b.apply(manifold.local_point);
                for point in manifold.points.iter() {
                    let clip_point = xf_a.apply(point.local_point);
                    let c_b = clip_point + normal * (r_b - (clip_point - plane_point).dot(normal));
                    let c_a = clip_point - normal * r_a;
                    out.points.push((c_a + c_b) * 0.5);
                    out.separations.push((c_a - c_b).dot(normal));
                }
                // Keep the normal pointing from A to B.
                out.normal = -normal;
            },
        }
        out
    }

    pub fn min_separation(&self) -> Option<f32> {
        self.separations.iter().cloned().fold(None, |acc, s| match acc {
            Some(m) if m <= s => Some(m),
            _ => Some(s),
        })
    }
}

#[cfg(test)]
mod tests {
    mod manifold {
        use approx::assert_relative_eq;
        use smallvec::smallvec;

        use crate::manifold::*;
        use crate::math::*;

        #[test]
        fn test_match_impulses() {
            let f0 = ContactFeature::new(0, FeatureType::Face, 1, FeatureType::Vertex);
            let f1 = ContactFeature::new(0, FeatureType::Face, 2, FeatureType::Vertex);
            let mut old = Manifold::with_kind(ManifoldType::FaceA, Vec2::new(0.0, 1.0), Vec2::new(0.0, 0.0));
            old.points.push(ManifoldPoint {
                normal_impulse: 3.0,
                tangent_impulse: -1.0,
                ..ManifoldPoint::new(Vec2::new(0.0, 0.0), f0)
            });
            let mut new = old.clone();
            new.points = smallvec![
                ManifoldPoint::new(Vec2::new(1.0, 0.0), f1),
                ManifoldPoint::new(Vec2::new(0.5, 0.0), f0),
            ];
            new.match_impulses(&old);
            assert_eq!(new.points[0].normal_impulse, 0.0);
            assert_eq!(new.points[1].normal_impulse, 3.0);
            assert_eq!(new.points[1].tangent_impulse, -1.0);
        }

        #[test]
        fn test_world_manifold() {
            // A face of A at y = 0 pointing up, with B's point 0.1 below it.
            let mut m = Manifold::with_kind(ManifoldType::FaceA, Vec2::new(0.0, 1.0), Vec2::new(0.0, 0.0));
            m.points.push(ManifoldPoint::new(Vec2::new(0.0, -0.1), ContactFeature::default()));
            let xf = Transform::identity();
            let wm = WorldManifold::new(&m, &xf, 0.0, &xf, 0.0);
            assert_relative_eq!(wm.normal.y, 1.0);
            assert_relative_eq!(wm.separations[0], -0.1, epsilon = 1.0e-6);

            let flipped = WorldManifold::new(&m.clone().flipped(), &xf, 0.0, &xf, 0.0);
            assert_relative_eq!(flipped.normal.y, -1.0);
            assert_relative_eq!(flipped.separations[0], -0.1, epsilon = 1.0e-6);
            assert_relative_eq!(flipped.min_separation().unwrap(), -0.1, epsilon = 1.0e-6);
        }
    }
}
