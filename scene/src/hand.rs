#[cfg(test)]
#[path = "hand_test.rs"]
mod hand_test;

use crate::consts::{LEFT_HAND_ORIGIN, RIGHT_HAND_ORIGIN};

/// Which hand a branch of the scene graph hangs from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Hand {
    /// Not attached to a hand.
    #[default]
    Invalid,
    Left,
    Right,
}

impl Hand {
    /// Hand named by an origin path; any non-hand origin is `Invalid`.
    #[must_use]
    pub fn from_origin(path: &str) -> Self {
        match path {
            LEFT_HAND_ORIGIN => Self::Left,
            RIGHT_HAND_ORIGIN => Self::Right,
            _ => Self::Invalid,
        }
    }

    /// Two participants may interact unless both hang from the same hand.
    #[must_use]
    pub fn may_interact(self, other: Hand) -> bool {
        self == Self::Invalid || other == Self::Invalid || self != other
    }
}
