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

use thiserror::Error;

/// Errors returned by the world's entity and step API.
///
/// Solver non-convergence is never an error; it shows up in the step
/// statistics instead.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum WorldError {
    /// The world is in the middle of a step.
    #[error("world is locked while stepping")]
    Locked,
    /// An arena ran out of room. Nothing was created.
    #[error("{what} capacity of {limit} exceeded")]
    CapacityExceeded {
        what: &'static str,
        limit: usize,
    },
    /// An id did not name a live entity.
    #[error("invalid {what} id {id}")]
    InvalidId {
        what: &'static str,
        id: usize,
    },
    /// Malformed geometry or configuration.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

#[cfg(test)]
mod tests {
    mod error {
        use crate::error::WorldError;

        #[test]
        fn test_display() {
            let e = WorldError::CapacityExceeded { what: "bodies", limit: 4 };
            assert_eq!(e.to_string(), "bodies capacity of 4 exceeded");
            let e = WorldError::InvalidId { what: "shape", id: 3 };
            assert_eq!(e.to_string(), "invalid shape id 3");
            assert_eq!(WorldError::Locked.to_string(), "world is locked while stepping");
        }
    }
}
