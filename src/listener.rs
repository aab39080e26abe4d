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

use crate::contact::Contact;
use crate::id::{Contactable, ContactId};
use crate::manifold::Manifold;
use crate::solver::ContactImpulse;

/// Receives contact events while a world steps. All methods default to doing
/// nothing. Callbacks run with the world locked, so they can only inspect the
/// contact they are handed and, in `pre_solve`, disable it for the step.
pub trait ContactListener {
    /// Veto a new pair after the shape filters accept it.
    fn should_collide(&mut self, _a: &Contactable, _b: &Contactable) -> bool {
        true
    }

    /// Two shapes started touching.
    fn begin_contact(&mut self, _id: ContactId, _contact: &Contact) {}

    /// Two shapes stopped touching, or a touching contact was destroyed.
    fn end_contact(&mut self, _id: ContactId, _contact: &Contact) {}

    /// Called for touching contacts after their manifold is updated and
    /// before they are solved.
    fn pre_solve(&mut self, _id: ContactId, _contact: &mut Contact, _old_manifold: &Manifold) {}

    /// Called after the solver with the impulses it applied.
    fn post_solve(&mut self, _id: ContactId, _contact: &Contact, _impulse: &ContactImpulse, _iterations: usize) {}
}

/// A listener that ignores every event.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullListener;

impl ContactListener for NullListener {}
