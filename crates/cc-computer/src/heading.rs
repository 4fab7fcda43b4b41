use serde::{Deserialize, Serialize};

use crate::computer::Position;

/// A world axis direction. North is -z and east is +x, as in Minecraft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Heading {
    North,
    East,
    South,
    West,
    Up,
    Down,
}

impl Heading {
    /// Unit offset of one block in this direction.
    pub fn vector(self) -> Position {
        let (x, y, z) = match self {
            Heading::North => (0, 0, -1),
            Heading::East => (1, 0, 0),
            Heading::South => (0, 0, 1),
            Heading::West => (-1, 0, 0),
            Heading::Up => (0, 1, 0),
            Heading::Down => (0, -1, 0),
        };
        Position { x, y, z }
    }

    /// Heading after `turtle.turnRight()`. Up and down are unchanged.
    pub fn right(self) -> Self {
        match self {
            Heading::North => Heading::East,
            Heading::East => Heading::South,
            Heading::South => Heading::West,
            Heading::West => Heading::North,
            vertical => vertical,
        }
    }

    pub fn left(self) -> Self {
        match self {
            Heading::North => Heading::West,
            Heading::West => Heading::South,
            Heading::South => Heading::East,
            Heading::East => Heading::North,
            vertical => vertical,
        }
    }

    /// The heading that moves `from` to `to`, if they are neighbours.
    pub fn between(from: Position, to: Position) -> Option<Self> {
        match (to.x - from.x, to.y - from.y, to.z - from.z) {
            (0, 0, -1) => Some(Heading::North),
            (1, 0, 0) => Some(Heading::East),
            (0, 0, 1) => Some(Heading::South),
            (-1, 0, 0) => Some(Heading::West),
            (0, 1, 0) => Some(Heading::Up),
            (0, -1, 0) => Some(Heading::Down),
            _ => None,
        }
    }
}

impl Position {
    /// The block `blocks` steps along `heading`.
    pub fn step(self, heading: Heading, blocks: i64) -> Position {
        let v = heading.vector();
        Position {
            x: self.x + v.x * blocks,
            y: self.y + v.y * blocks,
            z: self.z + v.z * blocks,
        }
    }
}
