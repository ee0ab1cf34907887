//! Fixed registry of named home bases.

use serde::{Deserialize, Serialize};

use crate::Position;

/// Outline drawn for a base by front ends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BaseShape {
    Square,
    Circle,
    Triangle,
}

/// A named base with a fixed coordinate.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Base {
    pub id: &'static str,
    pub position: Position,
    pub shape: BaseShape,
}

pub const BASES: [Base; 3] = [
    Base {
        id: "alpha",
        position: Position::new(100.0, 100.0),
        shape: BaseShape::Square,
    },
    Base {
        id: "bravo",
        position: Position::new(900.0, 100.0),
        shape: BaseShape::Circle,
    },
    Base {
        id: "charlie",
        position: Position::new(500.0, 900.0),
        shape: BaseShape::Triangle,
    },
];

/// Look up a base by id.
#[must_use]
pub fn find_base(id: &str) -> Option<&'static Base> {
    BASES.iter().find(|base| base.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_exact() {
        assert_eq!(find_base("bravo").map(|b| b.shape), Some(BaseShape::Circle));
        assert!(find_base("Bravo").is_none());
        assert!(find_base("delta").is_none());
    }
}
