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


//! A 2D rigid body physics library intended for use in video games.
//!
//! # Overview
//!
//! A `World` owns bodies, the shapes attached to them and the joints between
//! them. Calling `World::step` advances the simulation by one fixed time step:
//!
//! 1. The broad phase, a dynamic AABB tree over fattened shape bounds, reports
//!    new overlapping pairs and contacts are created for them.
//! 2. Every contact's manifold is recomputed with GJK based narrow phase
//!    routines. Contacts whose bounds no longer overlap are destroyed.
//! 3. Awake bodies are grouped into islands of touching contacts and joints.
//!    Each island is solved with sequential impulses and may fall asleep.
//! 4. Fast moving bodies are swept by a time of impact search and resolved
//!    in sub steps so that they cannot tunnel through thin geometry.
//!
//! Contact events are delivered through the `ContactListener` trait, and
//! each step reports what it did in a `StepStats`.
//!
//! The lower level pieces (`DynamicTree`, `distance`, `collide_shapes`,
//! `time_of_impact` and `ContactSolver`) are public and usable on their own.

pub extern crate cgmath;
extern crate smallvec;

mod math;
pub use math::*;

mod bounds;
pub use bounds::*;

mod pool;
pub use pool::*;

mod error;
pub use error::*;

mod id;
pub use id::*;

mod tree;
pub use tree::*;

mod shape;
pub use shape::*;

mod simplex;
pub use simplex::*;

mod distance;
pub use distance::*;

mod manifold;
pub use manifold::*;

mod collision;
pub use collision::*;

mod toi;
pub use toi::*;

mod step;
pub use step::*;

mod body;
pub use body::*;

mod joint;
pub use joint::*;

mod solver;
pub use solver::*;

mod listener;
pub use listener::*;

mod contact;
pub use contact::*;

mod contact_manager;
pub use contact_manager::*;

mod island;
pub use island::*;

mod world;
pub use world::*;
