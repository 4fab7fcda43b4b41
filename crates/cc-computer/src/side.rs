use std::fmt;

use serde::{Deserialize, Serialize};

/// A face of the computer, as the redstone API names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Top,
    Bottom,
    Left,
    Right,
    Front,
    Back,
}

impl Side {
    pub const ALL: [Side; 6] = [
        Side::Top,
        Side::Bottom,
        Side::Left,
        Side::Right,
        Side::Front,
        Side::Back,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Top => "top",
            Side::Bottom => "bottom",
            Side::Left => "left",
            Side::Right => "right",
            Side::Front => "front",
            Side::Back => "back",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a turtle world action points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Front,
    Up,
    Down,
}

impl Direction {
    /// `turtle.<verb>`, `turtle.<verb>Up` or `turtle.<verb>Down`.
    pub(crate) fn command(&self, verb: &str) -> String {
        match self {
            Direction::Front => format!("turtle.{verb}"),
            Direction::Up => format!("turtle.{verb}Up"),
            Direction::Down => format!("turtle.{verb}Down"),
        }
    }
}
